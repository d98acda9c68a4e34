//! Fetch-decode-execute loop, interrupt dispatch, and `clock(n)` fanout.
//!
//! Dispatch follows the shape spec'd for the instruction table: a static
//! metadata table per opcode (`{cycles, argbytes}`) drives how many
//! immediate bytes the fetch stage consumes before the operation runs, the
//! same separation a `{cycles, argbytes, op}` record array would give.
//! The operations themselves live in one `execute` match rather than 256
//! one-line closures bound into that array — `rustc` lowers a dense
//! byte match to the same jump table a function-pointer array would need,
//! and a match keeps the ALU/flag logic next to the opcode that uses it
//! instead of scattered across 256 top-level `fn`s.

use crate::cartridge::Mbc;
use crate::interfaces::JoypadSource;
use crate::io::Interrupt;
use crate::mmu::Mmu;
use crate::registers::{Registers, FLAG_C, FLAG_H, FLAG_N, FLAG_Z};

/// Base (untaken, for branches) cycle cost of each primary opcode, in master
/// cycles. Unmapped opcodes carry `0` and are never consulted: `execute`
/// treats them as `FatalDecode` before this table would matter.
#[rustfmt::skip]
const CYCLES: [u8; 256] = [
    4,12, 8, 8, 4, 4, 8, 4,  20, 8, 8, 8, 4, 4, 8, 4, // 0x0_
    4,12, 8, 8, 4, 4, 8, 4,  12, 8, 8, 8, 4, 4, 8, 4, // 0x1_
    8,12, 8, 8, 4, 4, 8, 4,   8, 8, 8, 8, 4, 4, 8, 4, // 0x2_
    8,12, 8, 8,12,12,12, 4,   8, 8, 8, 8, 4, 4, 8, 4, // 0x3_
    4, 4, 4, 4, 4, 4, 8, 4,   4, 4, 4, 4, 4, 4, 8, 4, // 0x4_
    4, 4, 4, 4, 4, 4, 8, 4,   4, 4, 4, 4, 4, 4, 8, 4, // 0x5_
    4, 4, 4, 4, 4, 4, 8, 4,   4, 4, 4, 4, 4, 4, 8, 4, // 0x6_
    8, 8, 8, 8, 8, 8, 4, 8,   4, 4, 4, 4, 4, 4, 8, 4, // 0x7_
    4, 4, 4, 4, 4, 4, 8, 4,   4, 4, 4, 4, 4, 4, 8, 4, // 0x8_
    4, 4, 4, 4, 4, 4, 8, 4,   4, 4, 4, 4, 4, 4, 8, 4, // 0x9_
    4, 4, 4, 4, 4, 4, 8, 4,   4, 4, 4, 4, 4, 4, 8, 4, // 0xA_
    4, 4, 4, 4, 4, 4, 8, 4,   4, 4, 4, 4, 4, 4, 8, 4, // 0xB_
    8,12,12,16,12,16, 8,16,   8,16,12, 0,12,24, 8,16, // 0xC_
    8,12,12, 0,12,16, 8,16,   8,16,12, 0,12, 0, 8,16, // 0xD_
   12,12, 8, 0, 0,16, 8,16,  16, 4,16, 0, 0, 0, 8,16, // 0xE_
   12,12, 8, 4, 0,16, 8,16,  12, 8,16, 4, 0, 0, 8,16, // 0xF_
];

/// Number of immediate bytes following each primary opcode (0, 1, or 2).
/// `0xCB` itself is one: the byte it consumes selects the CB-table entry
/// rather than being an operand.
#[rustfmt::skip]
const ARGBYTES: [u8; 256] = [
    0,2,0,0,0,0,1,0,  2,0,0,0,0,0,1,0, // 0x0_
    1,2,0,0,0,0,1,0,  1,0,0,0,0,0,1,0, // 0x1_
    1,2,0,0,0,0,1,0,  1,0,0,0,0,0,1,0, // 0x2_
    1,2,0,0,0,0,1,0,  1,0,0,0,0,0,1,0, // 0x3_
    0,0,0,0,0,0,0,0,  0,0,0,0,0,0,0,0, // 0x4_
    0,0,0,0,0,0,0,0,  0,0,0,0,0,0,0,0, // 0x5_
    0,0,0,0,0,0,0,0,  0,0,0,0,0,0,0,0, // 0x6_
    0,0,0,0,0,0,0,0,  0,0,0,0,0,0,0,0, // 0x7_
    0,0,0,0,0,0,0,0,  0,0,0,0,0,0,0,0, // 0x8_
    0,0,0,0,0,0,0,0,  0,0,0,0,0,0,0,0, // 0x9_
    0,0,0,0,0,0,0,0,  0,0,0,0,0,0,0,0, // 0xA_
    0,0,0,0,0,0,0,0,  0,0,0,0,0,0,0,0, // 0xB_
    0,0,2,2,2,0,1,0,  0,0,2,1,2,2,1,0, // 0xC_
    0,0,2,0,2,0,1,0,  0,0,2,0,2,0,1,0, // 0xD_
    1,0,0,0,0,0,1,0,  1,0,2,0,0,0,1,0, // 0xE_
    1,0,0,0,0,0,1,0,  1,0,2,0,0,0,1,0, // 0xF_
];

const INVALID: [u8; 11] = [0xD3, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD];

/// A non-recoverable decode fault: an opcode absent from both tables.
#[derive(Debug, Clone, Copy)]
pub struct FatalDecode {
    pub pc: u16,
    pub opcode: u8,
}

pub struct Cpu<J: JoypadSource> {
    pub registers: Registers,
    pub bus: Mmu<J>,
    pub ime: bool,
    pub halted: bool,
    pub stopped: bool,
    /// Counts down from 1 after `EI`; IME becomes true once it reaches 0
    /// at the start of the instruction *after* the one following EI.
    ei_delay: u8,
}

impl<J: JoypadSource> Cpu<J> {
    pub fn new(cart: Box<dyn Mbc>, joypad_source: J) -> Self {
        Self {
            registers: Registers::new(),
            bus: Mmu::new(cart, joypad_source),
            ime: false,
            halted: false,
            stopped: false,
            ei_delay: 0,
        }
    }

    /// Runs one fetch-decode-execute-clock cycle and returns the master
    /// cycles it consumed. On an undecodable opcode, returns the fault
    /// instead of running past it (policy: report and halt, no recovery).
    pub fn step(&mut self) -> Result<u8, FatalDecode> {
        if self.halted {
            self.clock(4);
            return Ok(4);
        }

        let start_pc = self.registers.pc;
        let opcode = self.fetch_byte();

        if INVALID.contains(&opcode) {
            return Err(FatalDecode { pc: start_pc, opcode });
        }

        let argbytes = ARGBYTES[opcode as usize];
        let arg = match argbytes {
            0 => 0,
            1 => self.fetch_byte() as u16,
            _ => self.fetch_word(),
        };

        let total = if opcode == 0xCB {
            self.execute_cb(arg as u8)
        } else {
            let extra = self.execute(opcode, arg);
            CYCLES[opcode as usize] + extra
        };

        self.clock(total);
        self.retire_ei_delay();
        Ok(total)
    }

    fn retire_ei_delay(&mut self) {
        if self.ei_delay > 0 {
            self.ei_delay -= 1;
            if self.ei_delay == 0 {
                self.ime = true;
            }
        }
    }

    /// Advances DIV/TIMA/PPU, wakes a halted CPU on any pending interrupt,
    /// and services the highest-priority enabled interrupt if IME is set.
    fn clock(&mut self, cycles: u8) {
        self.bus.advance(cycles);

        if self.bus.pending_interrupts() != 0 {
            self.halted = false;
        }

        if !self.ime {
            return;
        }

        for interrupt in Interrupt::ALL {
            if self.bus.pending_interrupts() & interrupt.mask() != 0 {
                self.ime = false;
                self.bus.ack_interrupt(interrupt);
                self.push_word_and_jump(interrupt.vector());
                break;
            }
        }
    }

    fn fetch_byte(&mut self) -> u8 {
        let byte = self.bus.read_byte(self.registers.pc);
        self.registers.pc = self.registers.pc.wrapping_add(1);
        byte
    }

    fn fetch_word(&mut self) -> u16 {
        let lo = self.fetch_byte() as u16;
        let hi = self.fetch_byte() as u16;
        (hi << 8) | lo
    }

    fn push_word(&mut self, value: u16) {
        self.registers.sp = self.registers.sp.wrapping_sub(1);
        self.bus.write_byte(self.registers.sp, (value >> 8) as u8);
        self.registers.sp = self.registers.sp.wrapping_sub(1);
        self.bus.write_byte(self.registers.sp, (value & 0xFF) as u8);
    }

    fn pop_word(&mut self) -> u16 {
        let lo = self.bus.read_byte(self.registers.sp) as u16;
        self.registers.sp = self.registers.sp.wrapping_add(1);
        let hi = self.bus.read_byte(self.registers.sp) as u16;
        self.registers.sp = self.registers.sp.wrapping_add(1);
        (hi << 8) | lo
    }

    /// Shared by `CALL`/`RST` and interrupt servicing: push the current PC,
    /// then jump. Factored out per the design note that both call sites
    /// should reuse one primitive instead of duplicating the push+jump.
    fn push_word_and_jump(&mut self, addr: u16) {
        let pc = self.registers.pc;
        self.push_word(pc);
        self.registers.pc = addr;
    }

    fn read_r8(&mut self, index: u8) -> u8 {
        match index {
            0 => self.registers.b,
            1 => self.registers.c,
            2 => self.registers.d,
            3 => self.registers.e,
            4 => self.registers.h,
            5 => self.registers.l,
            6 => self.bus.read_byte(self.registers.hl()),
            _ => self.registers.a,
        }
    }

    fn write_r8(&mut self, index: u8, val: u8) {
        match index {
            0 => self.registers.b = val,
            1 => self.registers.c = val,
            2 => self.registers.d = val,
            3 => self.registers.e = val,
            4 => self.registers.h = val,
            5 => self.registers.l = val,
            6 => self.bus.write_byte(self.registers.hl(), val),
            _ => self.registers.a = val,
        }
    }

    // ---- 8-bit ALU ----------------------------------------------------

    fn add_a(&mut self, val: u8, carry_in: u8) {
        let a = self.registers.a;
        let sum = a as u16 + val as u16 + carry_in as u16;
        let res = sum as u8;
        self.registers.f = 0;
        self.registers.set_flag(FLAG_Z, res == 0);
        self.registers
            .set_flag(FLAG_H, (a & 0x0F) + (val & 0x0F) + carry_in > 0x0F);
        self.registers.set_flag(FLAG_C, sum > 0xFF);
        self.registers.a = res;
    }

    fn sub_a(&mut self, val: u8, carry_in: u8, writeback: bool) {
        let a = self.registers.a;
        let res = a.wrapping_sub(val).wrapping_sub(carry_in);
        self.registers.f = FLAG_N;
        self.registers.set_flag(FLAG_Z, res == 0);
        self.registers
            .set_flag(FLAG_H, (a & 0x0F) < (val & 0x0F) + carry_in);
        self.registers
            .set_flag(FLAG_C, (a as u16) < val as u16 + carry_in as u16);
        if writeback {
            self.registers.a = res;
        }
    }

    fn and_a(&mut self, val: u8) {
        self.registers.a &= val;
        self.registers.f = FLAG_H;
        self.registers.set_flag(FLAG_Z, self.registers.a == 0);
    }

    fn or_a(&mut self, val: u8) {
        self.registers.a |= val;
        self.registers.f = 0;
        self.registers.set_flag(FLAG_Z, self.registers.a == 0);
    }

    fn xor_a(&mut self, val: u8) {
        self.registers.a ^= val;
        self.registers.f = 0;
        self.registers.set_flag(FLAG_Z, self.registers.a == 0);
    }

    fn inc8(&mut self, val: u8) -> u8 {
        let res = val.wrapping_add(1);
        self.registers.set_flag(FLAG_Z, res == 0);
        self.registers.set_flag(FLAG_N, false);
        self.registers.set_flag(FLAG_H, val & 0x0F == 0x0F);
        res
    }

    fn dec8(&mut self, val: u8) -> u8 {
        let res = val.wrapping_sub(1);
        self.registers.set_flag(FLAG_Z, res == 0);
        self.registers.set_flag(FLAG_N, true);
        self.registers.set_flag(FLAG_H, val & 0x0F == 0x00);
        res
    }

    /// Classical BCD-adjust table: after addition, add back 0x06/0x60 where
    /// a nibble overflowed decimal or the H/C flags say it did; after
    /// subtraction, subtract them. C can only be set here, never cleared,
    /// since it also reflects whether the prior add/sub already carried.
    fn daa(&mut self) {
        let mut a = self.registers.a;
        let n = self.registers.flag(FLAG_N);
        let mut carry = self.registers.flag(FLAG_C);
        let half_carry = self.registers.flag(FLAG_H);

        if !n {
            if carry || a > 0x99 {
                a = a.wrapping_add(0x60);
                carry = true;
            }
            if half_carry || (a & 0x0F) > 0x09 {
                a = a.wrapping_add(0x06);
            }
        } else {
            if carry {
                a = a.wrapping_sub(0x60);
            }
            if half_carry {
                a = a.wrapping_sub(0x06);
            }
        }

        self.registers.set_flag(FLAG_Z, a == 0);
        self.registers.set_flag(FLAG_H, false);
        self.registers.set_flag(FLAG_C, carry);
        self.registers.a = a;
    }

    fn add_hl(&mut self, val: u16) {
        let hl = self.registers.hl();
        let res = hl.wrapping_add(val);
        self.registers.set_flag(FLAG_N, false);
        self.registers
            .set_flag(FLAG_H, (hl & 0x0FFF) + (val & 0x0FFF) > 0x0FFF);
        self.registers
            .set_flag(FLAG_C, hl as u32 + val as u32 > 0xFFFF);
        self.registers.set_hl(res);
    }

    /// Shared by `ADD SP,e8` and `LD HL,SP+e8`: H/C are computed over the
    /// low byte of SP against the unsigned operand byte; Z and N both clear.
    fn sp_plus_e8(&mut self, offset: u8) -> u16 {
        let sp = self.registers.sp;
        let low = sp as u8;
        self.registers.f = 0;
        self.registers
            .set_flag(FLAG_H, (low & 0x0F) + (offset & 0x0F) > 0x0F);
        self.registers
            .set_flag(FLAG_C, low as u16 + offset as u16 > 0xFF);
        sp.wrapping_add(offset as i8 as i16 as u16)
    }

    fn rlc(&mut self, val: u8) -> u8 {
        let carry = val & 0x80 != 0;
        let res = val.rotate_left(1);
        self.registers.f = 0;
        self.registers.set_flag(FLAG_Z, res == 0);
        self.registers.set_flag(FLAG_C, carry);
        res
    }

    fn rrc(&mut self, val: u8) -> u8 {
        let carry = val & 0x01 != 0;
        let res = val.rotate_right(1);
        self.registers.f = 0;
        self.registers.set_flag(FLAG_Z, res == 0);
        self.registers.set_flag(FLAG_C, carry);
        res
    }

    fn rl(&mut self, val: u8) -> u8 {
        let carry_in = self.registers.flag(FLAG_C) as u8;
        let carry_out = val & 0x80 != 0;
        let res = (val << 1) | carry_in;
        self.registers.f = 0;
        self.registers.set_flag(FLAG_Z, res == 0);
        self.registers.set_flag(FLAG_C, carry_out);
        res
    }

    fn rr(&mut self, val: u8) -> u8 {
        let carry_in = self.registers.flag(FLAG_C) as u8;
        let carry_out = val & 0x01 != 0;
        let res = (val >> 1) | (carry_in << 7);
        self.registers.f = 0;
        self.registers.set_flag(FLAG_Z, res == 0);
        self.registers.set_flag(FLAG_C, carry_out);
        res
    }

    fn sla(&mut self, val: u8) -> u8 {
        let carry = val & 0x80 != 0;
        let res = val << 1;
        self.registers.f = 0;
        self.registers.set_flag(FLAG_Z, res == 0);
        self.registers.set_flag(FLAG_C, carry);
        res
    }

    fn sra(&mut self, val: u8) -> u8 {
        let carry = val & 0x01 != 0;
        let res = (val >> 1) | (val & 0x80);
        self.registers.f = 0;
        self.registers.set_flag(FLAG_Z, res == 0);
        self.registers.set_flag(FLAG_C, carry);
        res
    }

    fn srl(&mut self, val: u8) -> u8 {
        let carry = val & 0x01 != 0;
        let res = val >> 1;
        self.registers.f = 0;
        self.registers.set_flag(FLAG_Z, res == 0);
        self.registers.set_flag(FLAG_C, carry);
        res
    }

    fn swap(&mut self, val: u8) -> u8 {
        let res = (val << 4) | (val >> 4);
        self.registers.f = 0;
        self.registers.set_flag(FLAG_Z, res == 0);
        res
    }

    fn bit(&mut self, bit: u8, val: u8) {
        self.registers.set_flag(FLAG_Z, val & (1 << bit) == 0);
        self.registers.set_flag(FLAG_N, false);
        self.registers.set_flag(FLAG_H, true);
    }

    // ---- control flow ---------------------------------------------------

    /// `cond` has already been evaluated; returns the cycle delta to add on
    /// top of the table's untaken base (0 if `taken` is false).
    fn jr(&mut self, taken: bool, offset: u8) -> u8 {
        if taken {
            self.registers.pc = self.registers.pc.wrapping_add(offset as i8 as i16 as u16);
            4
        } else {
            0
        }
    }

    fn jp(&mut self, taken: bool, addr: u16) -> u8 {
        if taken {
            self.registers.pc = addr;
            4
        } else {
            0
        }
    }

    fn call(&mut self, taken: bool, addr: u16) -> u8 {
        if taken {
            self.push_word_and_jump(addr);
            12
        } else {
            0
        }
    }

    fn ret(&mut self, taken: bool) -> u8 {
        if taken {
            self.registers.pc = self.pop_word();
            12
        } else {
            0
        }
    }

    /// Runs the primary opcode and returns the extra cycles beyond the
    /// table's base cost (branch-taken deltas only; 0 for every
    /// unconditional or non-branching instruction).
    fn execute(&mut self, opcode: u8, arg: u16) -> u8 {
        let z = self.registers.flag(FLAG_Z);
        let c = self.registers.flag(FLAG_C);

        match opcode {
            0x00 => 0, // NOP
            0x01 => { self.registers.set_bc(arg); 0 }
            0x02 => { self.bus.write_byte(self.registers.bc(), self.registers.a); 0 }
            0x03 => { self.registers.set_bc(self.registers.bc().wrapping_add(1)); 0 }
            0x04 => { self.registers.b = self.inc8(self.registers.b); 0 }
            0x05 => { self.registers.b = self.dec8(self.registers.b); 0 }
            0x06 => { self.registers.b = arg as u8; 0 }
            0x07 => { self.registers.a = self.rlc(self.registers.a); self.registers.set_flag(FLAG_Z, false); 0 }
            0x08 => { let addr = arg; self.bus.write_byte(addr, (self.registers.sp & 0xFF) as u8); self.bus.write_byte(addr.wrapping_add(1), (self.registers.sp >> 8) as u8); 0 }
            0x09 => { self.add_hl(self.registers.bc()); 0 }
            0x0A => { self.registers.a = self.bus.read_byte(self.registers.bc()); 0 }
            0x0B => { self.registers.set_bc(self.registers.bc().wrapping_sub(1)); 0 }
            0x0C => { self.registers.c = self.inc8(self.registers.c); 0 }
            0x0D => { self.registers.c = self.dec8(self.registers.c); 0 }
            0x0E => { self.registers.c = arg as u8; 0 }
            0x0F => { self.registers.a = self.rrc(self.registers.a); self.registers.set_flag(FLAG_Z, false); 0 }

            0x10 => { self.stopped = true; 0 } // STOP
            0x11 => { self.registers.set_de(arg); 0 }
            0x12 => { self.bus.write_byte(self.registers.de(), self.registers.a); 0 }
            0x13 => { self.registers.set_de(self.registers.de().wrapping_add(1)); 0 }
            0x14 => { self.registers.d = self.inc8(self.registers.d); 0 }
            0x15 => { self.registers.d = self.dec8(self.registers.d); 0 }
            0x16 => { self.registers.d = arg as u8; 0 }
            0x17 => { self.registers.a = self.rl(self.registers.a); self.registers.set_flag(FLAG_Z, false); 0 }
            0x18 => { self.registers.pc = self.registers.pc.wrapping_add(arg as u8 as i8 as i16 as u16); 0 }
            0x19 => { self.add_hl(self.registers.de()); 0 }
            0x1A => { self.registers.a = self.bus.read_byte(self.registers.de()); 0 }
            0x1B => { self.registers.set_de(self.registers.de().wrapping_sub(1)); 0 }
            0x1C => { self.registers.e = self.inc8(self.registers.e); 0 }
            0x1D => { self.registers.e = self.dec8(self.registers.e); 0 }
            0x1E => { self.registers.e = arg as u8; 0 }
            0x1F => { self.registers.a = self.rr(self.registers.a); self.registers.set_flag(FLAG_Z, false); 0 }

            0x20 => self.jr(!z, arg as u8),
            0x21 => { self.registers.set_hl(arg); 0 }
            0x22 => { let a = self.registers.hl(); self.bus.write_byte(a, self.registers.a); self.registers.set_hl(a.wrapping_add(1)); 0 }
            0x23 => { self.registers.set_hl(self.registers.hl().wrapping_add(1)); 0 }
            0x24 => { self.registers.h = self.inc8(self.registers.h); 0 }
            0x25 => { self.registers.h = self.dec8(self.registers.h); 0 }
            0x26 => { self.registers.h = arg as u8; 0 }
            0x27 => { self.daa(); 0 }
            0x28 => self.jr(z, arg as u8),
            0x29 => { self.add_hl(self.registers.hl()); 0 }
            0x2A => { let a = self.registers.hl(); self.registers.a = self.bus.read_byte(a); self.registers.set_hl(a.wrapping_add(1)); 0 }
            0x2B => { self.registers.set_hl(self.registers.hl().wrapping_sub(1)); 0 }
            0x2C => { self.registers.l = self.inc8(self.registers.l); 0 }
            0x2D => { self.registers.l = self.dec8(self.registers.l); 0 }
            0x2E => { self.registers.l = arg as u8; 0 }
            0x2F => { self.registers.a = !self.registers.a; self.registers.set_flag(FLAG_N, true); self.registers.set_flag(FLAG_H, true); 0 }

            0x30 => self.jr(!c, arg as u8),
            0x31 => { self.registers.sp = arg; 0 }
            0x32 => { let a = self.registers.hl(); self.bus.write_byte(a, self.registers.a); self.registers.set_hl(a.wrapping_sub(1)); 0 }
            0x33 => { self.registers.sp = self.registers.sp.wrapping_add(1); 0 }
            0x34 => { let v = self.bus.read_byte(self.registers.hl()); let r = self.inc8(v); self.bus.write_byte(self.registers.hl(), r); 0 }
            0x35 => { let v = self.bus.read_byte(self.registers.hl()); let r = self.dec8(v); self.bus.write_byte(self.registers.hl(), r); 0 }
            0x36 => { self.bus.write_byte(self.registers.hl(), arg as u8); 0 }
            0x37 => { self.registers.set_flag(FLAG_N, false); self.registers.set_flag(FLAG_H, false); self.registers.set_flag(FLAG_C, true); 0 }
            0x38 => self.jr(c, arg as u8),
            0x39 => { self.add_hl(self.registers.sp); 0 }
            0x3A => { let a = self.registers.hl(); self.registers.a = self.bus.read_byte(a); self.registers.set_hl(a.wrapping_sub(1)); 0 }
            0x3B => { self.registers.sp = self.registers.sp.wrapping_sub(1); 0 }
            0x3C => { self.registers.a = self.inc8(self.registers.a); 0 }
            0x3D => { self.registers.a = self.dec8(self.registers.a); 0 }
            0x3E => { self.registers.a = arg as u8; 0 }
            0x3F => { self.registers.set_flag(FLAG_N, false); self.registers.set_flag(FLAG_H, false); self.registers.set_flag(FLAG_C, !c); 0 }

            0x76 => { self.halted = true; 0 } // HALT
            0x40..=0x7F => {
                let dst = (opcode >> 3) & 0x07;
                let src = opcode & 0x07;
                let v = self.read_r8(src);
                self.write_r8(dst, v);
                0
            }

            0x80..=0x87 => { let v = self.read_r8(opcode & 0x07); self.add_a(v, 0); 0 }
            0x88..=0x8F => { let v = self.read_r8(opcode & 0x07); let carry = c as u8; self.add_a(v, carry); 0 }
            0x90..=0x97 => { let v = self.read_r8(opcode & 0x07); self.sub_a(v, 0, true); 0 }
            0x98..=0x9F => { let v = self.read_r8(opcode & 0x07); let carry = c as u8; self.sub_a(v, carry, true); 0 }
            0xA0..=0xA7 => { let v = self.read_r8(opcode & 0x07); self.and_a(v); 0 }
            0xA8..=0xAF => { let v = self.read_r8(opcode & 0x07); self.xor_a(v); 0 }
            0xB0..=0xB7 => { let v = self.read_r8(opcode & 0x07); self.or_a(v); 0 }
            0xB8..=0xBF => { let v = self.read_r8(opcode & 0x07); self.sub_a(v, 0, false); 0 }

            0xC0 => self.ret(!z),
            0xC1 => { let v = self.pop_word(); self.registers.set_bc(v); 0 }
            0xC2 => self.jp(!z, arg),
            0xC3 => { self.registers.pc = arg; 0 }
            0xC4 => self.call(!z, arg),
            0xC5 => { self.push_word(self.registers.bc()); 0 }
            0xC6 => { let v = arg as u8; self.add_a(v, 0); 0 }
            0xC7 => { self.push_word_and_jump(0x0000); 0 }
            0xC8 => self.ret(z),
            0xC9 => { self.registers.pc = self.pop_word(); 0 }
            0xCA => self.jp(z, arg),
            0xCB => unreachable!("0xCB is dispatched by step() before execute()"),
            0xCC => self.call(z, arg),
            0xCD => { self.push_word_and_jump(arg); 0 }
            0xCE => { let v = arg as u8; let carry = c as u8; self.add_a(v, carry); 0 }
            0xCF => { self.push_word_and_jump(0x0008); 0 }

            0xD0 => self.ret(!c),
            0xD1 => { let v = self.pop_word(); self.registers.set_de(v); 0 }
            0xD2 => self.jp(!c, arg),
            0xD4 => self.call(!c, arg),
            0xD5 => { self.push_word(self.registers.de()); 0 }
            0xD6 => { let v = arg as u8; self.sub_a(v, 0, true); 0 }
            0xD7 => { self.push_word_and_jump(0x0010); 0 }
            0xD8 => self.ret(c),
            0xD9 => { self.registers.pc = self.pop_word(); self.ime = true; self.ei_delay = 0; 0 }
            0xDA => self.jp(c, arg),
            0xDC => self.call(c, arg),
            0xDE => { let v = arg as u8; let carry = c as u8; self.sub_a(v, carry, true); 0 }
            0xDF => { self.push_word_and_jump(0x0018); 0 }

            0xE0 => { let addr = 0xFF00 | arg; self.bus.write_byte(addr, self.registers.a); 0 }
            0xE1 => { let v = self.pop_word(); self.registers.set_hl(v); 0 }
            0xE2 => { let addr = 0xFF00 | self.registers.c as u16; self.bus.write_byte(addr, self.registers.a); 0 }
            0xE5 => { self.push_word(self.registers.hl()); 0 }
            0xE6 => { let v = arg as u8; self.and_a(v); 0 }
            0xE7 => { self.push_word_and_jump(0x0020); 0 }
            0xE8 => { let res = self.sp_plus_e8(arg as u8); self.registers.sp = res; 0 }
            0xE9 => { self.registers.pc = self.registers.hl(); 0 }
            0xEA => { self.bus.write_byte(arg, self.registers.a); 0 }
            0xEE => { let v = arg as u8; self.xor_a(v); 0 }
            0xEF => { self.push_word_and_jump(0x0028); 0 }

            0xF0 => { let addr = 0xFF00 | arg; self.registers.a = self.bus.read_byte(addr); 0 }
            0xF1 => { let v = self.pop_word(); self.registers.set_af(v); 0 }
            0xF2 => { let addr = 0xFF00 | self.registers.c as u16; self.registers.a = self.bus.read_byte(addr); 0 }
            0xF3 => { self.ime = false; self.ei_delay = 0; 0 }
            0xF5 => { self.push_word(self.registers.af()); 0 }
            0xF6 => { let v = arg as u8; self.or_a(v); 0 }
            0xF7 => { self.push_word_and_jump(0x0030); 0 }
            0xF8 => { let res = self.sp_plus_e8(arg as u8); self.registers.set_hl(res); 0 }
            0xF9 => { self.registers.sp = self.registers.hl(); 0 }
            0xFA => { self.registers.a = self.bus.read_byte(arg); 0 }
            0xFB => { self.ei_delay = 2; 0 } // retire_ei_delay decrements once this instruction's clock(); one more on the next
            0xFE => { let v = arg as u8; self.sub_a(v, 0, false); 0 }
            0xFF => { self.push_word_and_jump(0x0038); 0 }

            _ => unreachable!("opcode {opcode:#04X} has no handler but wasn't marked INVALID"),
        }
    }

    /// CB-space ops have no taken/untaken variance; returns the total
    /// cycles for this instruction outright (register form 8, `(HL)` form
    /// 12 for BIT or 16 for the rest).
    fn execute_cb(&mut self, cb_opcode: u8) -> u8 {
        let reg = cb_opcode & 0x07;
        let bit = (cb_opcode >> 3) & 0x07;
        let val = self.read_r8(reg);

        let res = match cb_opcode {
            0x00..=0x07 => Some(self.rlc(val)),
            0x08..=0x0F => Some(self.rrc(val)),
            0x10..=0x17 => Some(self.rl(val)),
            0x18..=0x1F => Some(self.rr(val)),
            0x20..=0x27 => Some(self.sla(val)),
            0x28..=0x2F => Some(self.sra(val)),
            0x30..=0x37 => Some(self.swap(val)),
            0x38..=0x3F => Some(self.srl(val)),
            0x40..=0x7F => { self.bit(bit, val); None }
            0x80..=0xBF => Some(val & !(1 << bit)),
            _ => Some(val | (1 << bit)),
        };

        if let Some(res) = res {
            self.write_r8(reg, res);
        }

        if reg == 6 {
            if (0x40..=0x7F).contains(&cb_opcode) { 12 } else { 16 }
        } else {
            8
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::Mbc0;
    use crate::interfaces::NullFrontend;

    fn cpu_with_rom(rom_tail: &[u8]) -> Cpu<NullFrontend> {
        let mut rom = vec![0u8; 0x8000];
        rom[0x100..0x100 + rom_tail.len()].copy_from_slice(rom_tail);
        let mut cpu = Cpu::new(Box::new(Mbc0::new(rom, None)), NullFrontend);
        cpu.registers.pc = 0x100;
        cpu
    }

    #[test]
    fn rlca_clears_zero_flag_even_when_result_is_zero() {
        let mut cpu = cpu_with_rom(&[0x3E, 0x00, 0x07]);
        cpu.step().unwrap();
        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.registers.a, 0);
        assert!(!cpu.registers.flag(FLAG_Z));
        assert!(!cpu.registers.flag(FLAG_C));
    }

    #[test]
    fn add_overflow_sets_z_c_h() {
        let mut cpu = cpu_with_rom(&[0x3E, 0xFF, 0x06, 0x01, 0x80]);
        for _ in 0..3 {
            cpu.step().unwrap();
        }
        assert_eq!(cpu.registers.a, 0x00);
        assert!(cpu.registers.flag(FLAG_Z));
        assert!(cpu.registers.flag(FLAG_C));
        assert!(cpu.registers.flag(FLAG_H));
        assert!(!cpu.registers.flag(FLAG_N));
    }

    #[test]
    fn daa_after_add_rounds_trips_bcd() {
        let mut cpu = cpu_with_rom(&[0x3E, 0x45, 0x06, 0x38, 0x80, 0x27]);
        for _ in 0..4 {
            cpu.step().unwrap();
        }
        assert_eq!(cpu.registers.a, 0x83);
        assert!(!cpu.registers.flag(FLAG_C));
        assert!(!cpu.registers.flag(FLAG_H));
        assert!(!cpu.registers.flag(FLAG_Z));
    }

    #[test]
    fn cp_leaves_a_unchanged_and_sets_flags() {
        let mut cpu = cpu_with_rom(&[0x3E, 0x10, 0xFE, 0x10]);
        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.registers.a, 0x10);
        assert!(cpu.registers.flag(FLAG_Z));
        assert!(!cpu.registers.flag(FLAG_C));
    }

    #[test]
    fn halt_then_timer_overflow_wakes_cpu_and_raises_if() {
        let mut cpu = cpu_with_rom(&[0x76, 0x00]);
        cpu.bus.write_byte(0xFF06, 0xFF); // TMA
        cpu.bus.write_byte(0xFF05, 0xFF); // TIMA about to overflow
        cpu.bus.write_byte(0xFF07, 0x05); // enabled, mode 1 (every 16 cycles)
        cpu.bus.write_byte(0xFFFF, 0x04); // IE: timer enabled, so the pending IF actually wakes HALT
        cpu.step().unwrap(); // HALT, consumes 4 cycles
        for _ in 0..4 {
            cpu.step().unwrap();
        }
        assert!(!cpu.halted);
        assert_eq!(cpu.bus.read_byte(0xFF0F) & 0x04, 0x04);
    }

    #[test]
    fn ei_takes_effect_after_the_following_instruction() {
        let mut cpu = cpu_with_rom(&[0xFB, 0x00, 0x00]);
        cpu.step().unwrap(); // EI: not yet armed
        assert!(!cpu.ime);
        cpu.step().unwrap(); // the instruction right after EI retires with IME now live
        assert!(cpu.ime);
    }

    #[test]
    fn cb_register_form_costs_8_hl_form_costs_12() {
        let mut cpu = cpu_with_rom(&[0xCB, 0x7C]); // BIT 7,H
        assert_eq!(cpu.step().unwrap(), 8);

        let mut cpu = cpu_with_rom(&[0xCB, 0x7E]); // BIT 7,(HL)
        assert_eq!(cpu.step().unwrap(), 12);
    }
}
