use thiserror::Error;

/// Crate-wide error type surfaced at the boundaries the core cannot recover
/// from: a bad cartridge image, or an opcode the instruction tables don't
/// cover. Everything else (bus reads outside `0..=0xFFFF`, serial test
/// output) is nominal per the core's error taxonomy and is not modeled here.
#[derive(Debug, Error)]
pub enum GbError {
    #[error("cannot read ROM: {0}")]
    RomIo(String),

    #[error("unrecognized cartridge: {0}")]
    BadRom(String),

    #[error("fatal decode: opcode {opcode:#04X} at PC {pc:#06X}")]
    FatalDecode { pc: u16, opcode: u8 },
}

pub type GbResult<T> = Result<T, GbError>;
