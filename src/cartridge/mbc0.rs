use super::{Mbc, BOOT_ROM_SIZE};

/// No banking: the whole ROM (up to 32 KiB) is directly addressable, and
/// cartridge RAM writes are ignored since there is no RAM chip to enable.
#[derive(Debug)]
pub struct Mbc0 {
    rom: Vec<u8>,
    boot_rom: Option<[u8; BOOT_ROM_SIZE]>,
}

impl Mbc0 {
    pub fn new(rom: Vec<u8>, boot_rom: Option<[u8; BOOT_ROM_SIZE]>) -> Self {
        Self { rom, boot_rom }
    }
}

impl Mbc for Mbc0 {
    fn read_rom(&self, addr: u16) -> u8 {
        if let Some(boot) = &self.boot_rom {
            if addr < BOOT_ROM_SIZE as u16 {
                return boot[addr as usize];
            }
        }
        self.rom.get(addr as usize).copied().unwrap_or(0xFF)
    }

    fn write_control(&mut self, _addr: u16, _val: u8) {}

    fn read_ram(&self, _addr: u16) -> u8 {
        0xFF
    }

    fn write_ram(&mut self, _addr: u16, _val: u8) {}

    fn ram_enabled(&self) -> bool {
        false
    }

    fn disable_boot_rom(&mut self) {
        self.boot_rom = None;
    }
}
