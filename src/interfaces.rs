//! The three boundaries the core crosses into host-provided code. The core
//! never blocks on these and never assumes anything about the host's
//! windowing, input, or storage stack beyond these signatures.

use crate::ppu::FRAME_PIXELS;

/// Receives one 160x144 greyscale framebuffer per VBlank.
pub trait FrameSink {
    fn present(&mut self, buf: &[u8; FRAME_PIXELS]);
}

/// Supplies the joypad line state whenever the bus reads FF00. The lower
/// 4 bits are the currently selected input lines, 0 = pressed.
pub trait JoypadSource {
    fn read(&mut self) -> u8;
}

/// A `FrameSink`/`JoypadSource` pair that does nothing, useful for headless
/// test-ROM runs that only care about the serial debug stream.
#[derive(Debug, Default)]
pub struct NullFrontend;

impl FrameSink for NullFrontend {
    fn present(&mut self, _buf: &[u8; FRAME_PIXELS]) {}
}

impl JoypadSource for NullFrontend {
    fn read(&mut self) -> u8 {
        0x0F
    }
}
