//! Core crate: register file, instruction set, memory bus, PPU, and the
//! frame driver that pumps them. No windowing, audio, or input backend
//! lives here; those cross the `FrameSink`/`JoypadSource` boundary from
//! `src/bin/gb_rs.rs`.

pub mod cartridge;
pub mod config;
pub mod cpu;
pub mod error;
pub mod interfaces;
pub mod io;
pub mod mmu;
pub mod ppu;
pub mod registers;

use cartridge::{CartridgeHeader, BOOT_ROM_SIZE};
use cpu::Cpu;
use error::{GbError, GbResult};
use interfaces::{FrameSink, JoypadSource};

/// Master cycles in one 59.7 Hz frame: 154 scanlines * 456 cycles.
pub const CYCLES_PER_FRAME: u32 = 70_224;

/// Owns the `Cpu` (and through it, the bus/PPU) and drives it one frame at
/// a time. This is the component the distilled spec calls the Frame Driver:
/// it accumulates a 70,224-cycle budget per call to `run_frame` and presents
/// the framebuffer through `FrameSink` whenever the PPU signals VBlank.
pub struct GameBoy<J: JoypadSource + FrameSink> {
    cpu: Cpu<J>,
}

impl<J: JoypadSource + FrameSink> GameBoy<J> {
    /// Builds a cartridge from `rom` and boots it with `joypad_source`
    /// supplying input. `boot_rom`, if given, overlays bank 0 until the
    /// game disables it by writing FF50.
    pub fn new(rom: Vec<u8>, boot_rom: Option<[u8; BOOT_ROM_SIZE]>, joypad_source: J) -> GbResult<Self> {
        let header = CartridgeHeader::parse(&rom)?;
        let cart = cartridge::build(header, rom, boot_rom)?;
        Ok(Self { cpu: Cpu::new(cart, joypad_source) })
    }

    pub fn cpu(&self) -> &Cpu<J> {
        &self.cpu
    }

    /// The owned frontend object, for frontend-specific polling (window
    /// open state, and the like) the core has no opinion on.
    pub fn frontend_mut(&mut self) -> &mut J {
        self.cpu.bus.joypad_source_mut()
    }

    /// Runs instructions until the master cycle budget for one frame is
    /// spent, presenting the framebuffer on every VBlank the PPU raised
    /// along the way. Returns the fatal decode fault, if any, without
    /// rolling back cycles already clocked.
    pub fn run_frame(&mut self) -> Result<(), GbError> {
        let mut budget: i64 = CYCLES_PER_FRAME as i64;
        while budget > 0 {
            let spent = self
                .cpu
                .step()
                .map_err(|f| GbError::FatalDecode { pc: f.pc, opcode: f.opcode })?;
            budget -= spent as i64;

            if self.cpu.bus.ppu.frame_ready {
                self.cpu.bus.ppu.frame_ready = false;
                let frame = *self.cpu.bus.ppu.framebuffer();
                self.cpu.bus.joypad_source_mut().present(&frame);
            }
        }
        Ok(())
    }

    pub fn serial_result(&self) -> Option<io::SerialTestResult> {
        self.cpu.bus.serial().last_result
    }
}
