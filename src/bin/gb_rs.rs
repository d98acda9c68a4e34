//! Reference frontend: a `minifb` window presenting the core's framebuffer
//! and supplying joypad state, with `rfd` for interactive ROM selection.
//! Everything hardware-specific lives here; `gb_core` never sees a `Window`.

use gb_core::cartridge::BOOT_ROM_SIZE;
use gb_core::config::Config;
use gb_core::interfaces::{FrameSink, JoypadSource};
use gb_core::ppu::{FRAME_PIXELS, SCREEN_HEIGHT, SCREEN_WIDTH};
use gb_core::GameBoy;
use minifb::{Key, Window, WindowOptions};
use std::path::PathBuf;

const SCALE: usize = 4;

struct MinifbFrontend {
    window: Window,
    scratch: Vec<u32>,
    keys: Vec<Key>,
    bindings: [Key; 8],
}

/// Bit order the joypad trait expects: Right, Left, Up, Down, A, B, Select,
/// Start packed into the low byte, 0 = pressed, matching FF00's two nibbles.
const fn joypad_bit_order() -> [usize; 8] {
    [0, 1, 2, 3, 4, 5, 6, 7]
}

impl MinifbFrontend {
    fn new(config: &Config) -> Self {
        let window = Window::new(
            "gb_rs",
            SCREEN_WIDTH * SCALE,
            SCREEN_HEIGHT * SCALE,
            WindowOptions::default(),
        )
        .unwrap_or_else(|e| panic!("failed to open window: {e}"));

        let parse = |name: &str| key_from_name(name).unwrap_or_else(|| panic!("unknown key binding {name:?}"));
        Self {
            window,
            scratch: vec![0u32; SCREEN_WIDTH * SCALE * SCREEN_HEIGHT * SCALE],
            keys: Vec::new(),
            bindings: [
                parse(&config.keys.right),
                parse(&config.keys.left),
                parse(&config.keys.up),
                parse(&config.keys.down),
                parse(&config.keys.a),
                parse(&config.keys.b),
                parse(&config.keys.select),
                parse(&config.keys.start),
            ],
        }
    }

    fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }
}

impl FrameSink for MinifbFrontend {
    fn present(&mut self, buf: &[u8; FRAME_PIXELS]) {
        for y in 0..SCREEN_HEIGHT * SCALE {
            for x in 0..SCREEN_WIDTH * SCALE {
                let shade = buf[(y / SCALE) * SCREEN_WIDTH + (x / SCALE)] as u32;
                self.scratch[y * SCREEN_WIDTH * SCALE + x] = (shade << 16) | (shade << 8) | shade;
            }
        }
        self.window
            .update_with_buffer(&self.scratch, SCREEN_WIDTH * SCALE, SCREEN_HEIGHT * SCALE)
            .expect("minifb buffer update failed");
    }
}

impl JoypadSource for MinifbFrontend {
    fn read(&mut self) -> u8 {
        self.keys.clear();
        self.keys.extend(self.window.get_keys());
        let order = joypad_bit_order();
        let mut lines = 0x0Fu8;
        for (bit, binding) in order.iter().zip(self.bindings.iter()) {
            if self.keys.contains(binding) {
                lines &= !(1 << bit);
            }
        }
        lines
    }
}

fn key_from_name(name: &str) -> Option<Key> {
    use Key::*;
    Some(match name {
        "Up" => Up,
        "Down" => Down,
        "Left" => Left,
        "Right" => Right,
        "Return" => Enter,
        "RightShift" => RightShift,
        "X" => X,
        "Z" => Z,
        "A" => A,
        "S" => S,
        _ => return None,
    })
}

fn pick_rom_path(cli_arg: Option<String>) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }
    rfd::FileDialog::new()
        .add_filter("Game ROM", &["gb", "gbc"])
        .pick_file()
        .unwrap_or_else(|| {
            eprintln!("no ROM selected, exiting");
            std::process::exit(1);
        })
}

fn load_boot_rom(path: &Option<PathBuf>) -> Option<[u8; BOOT_ROM_SIZE]> {
    let path = path.as_ref()?;
    let bytes = std::fs::read(path).unwrap_or_else(|e| panic!("reading boot ROM {}: {e}", path.display()));
    let mut boot = [0u8; BOOT_ROM_SIZE];
    let len = bytes.len().min(BOOT_ROM_SIZE);
    boot[..len].copy_from_slice(&bytes[..len]);
    Some(boot)
}

fn main() {
    env_logger::init();

    let config = Config::load("gb_rs.json").unwrap_or_else(|e| {
        log::warn!("config load failed, using defaults: {e}");
        Config::default()
    });

    let rom_path = pick_rom_path(std::env::args().nth(1));
    let rom = std::fs::read(&rom_path).unwrap_or_else(|e| panic!("reading ROM {}: {e}", rom_path.display()));
    let boot_rom = load_boot_rom(&config.boot_rom);

    let frontend = MinifbFrontend::new(&config);
    let mut gameboy = GameBoy::new(rom, boot_rom, frontend).unwrap_or_else(|e| {
        log::error!("failed to start cartridge: {e}");
        std::process::exit(1);
    });

    log::info!("loaded {}", rom_path.display());

    let mut frames: u64 = 0;
    loop {
        if let Some(limit) = config.frame_limit {
            if frames >= limit {
                break;
            }
        }
        if !gameboy.frontend_mut().is_open() {
            break;
        }
        if let Err(e) = gameboy.run_frame() {
            log::error!("{e}");
            break;
        }
        frames += 1;
    }
}
