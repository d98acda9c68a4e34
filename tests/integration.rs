//! Whole-core scenarios that exercise the CPU, bus, and PPU together across
//! a full frame budget, the way `GameBoy::run_frame` is actually driven by a
//! frontend. Single-module unit tests already cover component-local
//! invariants (flags, timer edges, MBC bank math); this file checks the
//! cross-component wiring the spec's end-to-end scenarios describe.

use gb_core::interfaces::{FrameSink, JoypadSource};
use gb_core::ppu::FRAME_PIXELS;
use gb_core::GameBoy;

/// Counts `present` calls and records the last joypad poll without doing
/// anything else; stands in for a real window/input backend in these tests.
#[derive(Default)]
struct RecordingFrontend {
    presents: u32,
    last_frame: Option<[u8; FRAME_PIXELS]>,
}

impl FrameSink for RecordingFrontend {
    fn present(&mut self, buf: &[u8; FRAME_PIXELS]) {
        self.presents += 1;
        self.last_frame = Some(*buf);
    }
}

impl JoypadSource for RecordingFrontend {
    fn read(&mut self) -> u8 {
        0x0F
    }
}

/// A 32 KiB MBC0 ROM with cartridge type 0x00 and ROM size code 0x00,
/// header checksum bytes left at 0 (the core does not verify them).
fn rom_with_code(code_at_0x100: &[u8]) -> Vec<u8> {
    let mut rom = vec![0u8; 0x8000];
    rom[0x100..0x100 + code_at_0x100.len()].copy_from_slice(code_at_0x100);
    rom[0x147] = 0x00;
    rom[0x148] = 0x00;
    rom[0x149] = 0x00;
    rom
}

#[test]
fn one_frame_presents_exactly_once() {
    // EI; loop: JR -2 (spins forever, burning the frame budget on NOPs).
    let rom = rom_with_code(&[0xFB, 0x18, 0xFE]);
    let mut gb = GameBoy::new(rom, None, RecordingFrontend::default()).unwrap();
    gb.run_frame().unwrap();
    assert_eq!(gb.frontend_mut().presents, 1);
    assert!(gb.frontend_mut().last_frame.is_some());
}

#[test]
fn vblank_interrupt_is_serviced_once_per_frame_when_enabled() {
    // EI; IE = 0x01 (VBlank only); loop forever, letting the ISR run.
    let mut rom = vec![0u8; 0x8000];
    // 0x100: EI
    rom[0x100] = 0xFB;
    // 0x101: LD A,0x01 ; 0x103: LDH (FF), A  -> IE = 0x01
    rom[0x101] = 0x3E;
    rom[0x102] = 0x01;
    rom[0x103] = 0xE0;
    rom[0x104] = 0xFF;
    // 0x105: JR -2 (spin)
    rom[0x105] = 0x18;
    rom[0x106] = 0xFE;
    rom[0x147] = 0x00;
    rom[0x148] = 0x00;

    let mut gb = GameBoy::new(rom, None, RecordingFrontend::default()).unwrap();
    gb.run_frame().unwrap();
    // The ISR (vector 0x40) is reached via CALL-style dispatch with no
    // handler installed there, so it falls straight back into the NOPs at
    // 0x00 that fill the rest of bank 0 and keeps running rather than
    // faulting; one present() call still proves VBlank fired once.
    assert_eq!(gb.frontend_mut().presents, 1);
}

#[test]
fn fatal_decode_reports_pc_and_opcode_without_panicking() {
    let rom = rom_with_code(&[0xD3]); // undocumented opcode
    let mut gb = GameBoy::new(rom, None, RecordingFrontend::default()).unwrap();
    let err = gb.run_frame().unwrap_err();
    match err {
        gb_core::error::GbError::FatalDecode { pc, opcode } => {
            assert_eq!(pc, 0x0100);
            assert_eq!(opcode, 0xD3);
        }
        other => panic!("expected FatalDecode, got {other:?}"),
    }
}

#[test]
fn bad_rom_header_is_rejected_before_boot() {
    let mut rom = vec![0u8; 0x8000];
    rom[0x147] = 0xFE; // no such MBC type
    let err = GameBoy::new(rom, None, RecordingFrontend::default()).unwrap_err();
    assert!(matches!(err, gb_core::error::GbError::BadRom(_)));
}

#[test]
fn serial_test_rom_pass_string_is_recognized_end_to_end() {
    // Writes "Passed\n" one byte at a time to SB/SC (0xFF01/0xFF02=0x81),
    // then spins. Built by hand rather than assembled since there is no
    // assembler in this crate's dependency stack.
    let mut code = Vec::new();
    for byte in b"Passed\n" {
        code.push(0x3E); // LD A, byte
        code.push(*byte);
        code.push(0xE0); // LDH (FF01), A
        code.push(0x01);
        code.push(0x3E); // LD A, 0x81
        code.push(0x81);
        code.push(0xE0); // LDH (FF02), A
        code.push(0x02);
    }
    code.push(0x18); // JR -2 (spin)
    code.push(0xFE);

    let rom = rom_with_code(&code);
    let mut gb = GameBoy::new(rom, None, RecordingFrontend::default()).unwrap();
    gb.run_frame().unwrap();
    assert_eq!(gb.serial_result(), Some(gb_core::io::SerialTestResult::Passed));
}
