//! A small RV64I interpreter for checking emitted code.
//!
//! Only the integer subset the core itself produces is modelled: upper
//! immediates, jumps, branches, register/immediate ALU operations (including
//! the `*w` forms) and 32/64-bit loads from a read-only memory image.

use alloc::vec::Vec;

use crate::decode;
use crate::opcode::{
    OP_AUIPC, OP_BRANCH, OP_IMM, OP_IMM_32, OP_JAL, OP_JALR, OP_LOAD, OP_LUI, OP_REG, OP_REG_32,
};

/// Why [`Machine::step`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trap {
    /// The word is outside the modelled subset.
    Unsupported(u32),
    /// A load touched memory outside the attached image.
    Fault(u64),
    /// The program counter left the code image.
    PcOutOfRange(u64),
}

/// Architectural state plus a flat read-only image holding code and data.
#[derive(Debug, Clone)]
pub struct Machine {
    /// Integer registers; `x[0]` is forced to zero after every step.
    pub x: [u64; 32],
    /// Program counter, relative to the image base.
    pub pc: u64,
    image: Vec<u8>,
}

impl Machine {
    /// A machine with all registers zero and `image` mapped at address 0.
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            x: [0; 32],
            pc: 0,
            image,
        }
    }

    /// Read register `n`.
    #[inline]
    pub fn reg(&self, n: u32) -> u64 {
        self.x[n as usize & 31]
    }

    fn set(&mut self, n: u32, value: u64) {
        if n != 0 {
            self.x[n as usize & 31] = value;
        }
    }

    fn load(&self, addr: u64, len: usize) -> Result<u64, Trap> {
        let start = usize::try_from(addr).map_err(|_| Trap::Fault(addr))?;
        let bytes = self
            .image
            .get(start..start + len)
            .ok_or(Trap::Fault(addr))?;
        let mut buf = [0u8; 8];
        buf[..len].copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Fetch the word at `pc`.
    pub fn fetch(&self) -> Result<u32, Trap> {
        let word = self
            .load(self.pc, 4)
            .map_err(|_| Trap::PcOutOfRange(self.pc))?;
        Ok(word as u32)
    }

    /// Execute one instruction word at the current `pc`, without fetching.
    pub fn execute(&mut self, word: u32) -> Result<(), Trap> {
        let rd = decode::rd(word);
        let rs1 = self.reg(decode::rs1(word));
        let rs2 = self.reg(decode::rs2(word));
        let f3 = decode::funct3(word);
        let f7 = decode::funct7(word);
        let mut next = self.pc.wrapping_add(4);

        match decode::opcode(word) {
            OP_LUI => self.set(rd, (decode::imm_u(word) << 12) as u64),
            OP_AUIPC => self.set(rd, self.pc.wrapping_add((decode::imm_u(word) << 12) as u64)),
            OP_JAL => {
                self.set(rd, next);
                next = self.pc.wrapping_add(decode::imm_j(word) as u64);
            }
            OP_JALR if f3 == 0 => {
                let target = rs1.wrapping_add(decode::imm_i(word) as u64) & !1;
                self.set(rd, next);
                next = target;
            }
            OP_BRANCH => {
                let taken = match f3 {
                    0b000 => rs1 == rs2,
                    0b001 => rs1 != rs2,
                    0b100 => (rs1 as i64) < (rs2 as i64),
                    0b101 => (rs1 as i64) >= (rs2 as i64),
                    0b110 => rs1 < rs2,
                    0b111 => rs1 >= rs2,
                    _ => return Err(Trap::Unsupported(word)),
                };
                if taken {
                    next = self.pc.wrapping_add(decode::imm_b(word) as u64);
                }
            }
            OP_LOAD => {
                let addr = rs1.wrapping_add(decode::imm_i(word) as u64);
                let value = match f3 {
                    0b010 => self.load(addr, 4)? as u32 as i32 as i64 as u64,
                    0b011 => self.load(addr, 8)?,
                    0b110 => self.load(addr, 4)?,
                    _ => return Err(Trap::Unsupported(word)),
                };
                self.set(rd, value);
            }
            OP_IMM => {
                let imm = decode::imm_i(word) as u64;
                let shamt = (word >> 20) & 0x3F;
                let value = match f3 {
                    0b000 => rs1.wrapping_add(imm),
                    0b001 if (word >> 26) == 0 => rs1 << shamt,
                    0b010 => ((rs1 as i64) < (imm as i64)) as u64,
                    0b011 => (rs1 < imm) as u64,
                    0b100 => rs1 ^ imm,
                    0b101 if (word >> 26) == 0 => rs1 >> shamt,
                    0b101 if (word >> 26) == 0x10 => ((rs1 as i64) >> shamt) as u64,
                    0b110 => rs1 | imm,
                    0b111 => rs1 & imm,
                    _ => return Err(Trap::Unsupported(word)),
                };
                self.set(rd, value);
            }
            OP_IMM_32 => {
                let src = rs1 as u32;
                let shamt = (word >> 20) & 0x1F;
                let value = match (f3, f7) {
                    (0b000, _) => src.wrapping_add(decode::imm_i(word) as u32),
                    (0b001, 0x00) => src << shamt,
                    (0b101, 0x00) => src >> shamt,
                    (0b101, 0x20) => ((src as i32) >> shamt) as u32,
                    _ => return Err(Trap::Unsupported(word)),
                };
                self.set(rd, value as i32 as i64 as u64);
            }
            OP_REG => {
                let value = match (f3, f7) {
                    (0b000, 0x00) => rs1.wrapping_add(rs2),
                    (0b000, 0x20) => rs1.wrapping_sub(rs2),
                    (0b000, 0x01) => rs1.wrapping_mul(rs2),
                    (0b001, 0x00) => rs1 << (rs2 & 0x3F),
                    (0b010, 0x00) => ((rs1 as i64) < (rs2 as i64)) as u64,
                    (0b011, 0x00) => (rs1 < rs2) as u64,
                    (0b100, 0x00) => rs1 ^ rs2,
                    (0b101, 0x00) => rs1 >> (rs2 & 0x3F),
                    (0b101, 0x20) => ((rs1 as i64) >> (rs2 & 0x3F)) as u64,
                    (0b110, 0x00) => rs1 | rs2,
                    (0b111, 0x00) => rs1 & rs2,
                    _ => return Err(Trap::Unsupported(word)),
                };
                self.set(rd, value);
            }
            OP_REG_32 => {
                let (a, b) = (rs1 as u32, rs2 as u32);
                let value = match (f3, f7) {
                    (0b000, 0x00) => a.wrapping_add(b),
                    (0b000, 0x20) => a.wrapping_sub(b),
                    (0b001, 0x00) => a << (b & 0x1F),
                    (0b101, 0x00) => a >> (b & 0x1F),
                    (0b101, 0x20) => ((a as i32) >> (b & 0x1F)) as u32,
                    _ => return Err(Trap::Unsupported(word)),
                };
                self.set(rd, value as i32 as i64 as u64);
            }
            _ => return Err(Trap::Unsupported(word)),
        }

        self.pc = next;
        Ok(())
    }

    /// Fetch and execute one instruction.
    pub fn step(&mut self) -> Result<(), Trap> {
        let word = self.fetch()?;
        self.execute(word)
    }

    /// Step until `pc` equals `stop` or `max_steps` instructions have run.
    /// Returns the number of instructions executed.
    pub fn run_until(&mut self, stop: u64, max_steps: usize) -> Result<usize, Trap> {
        let mut steps = 0;
        while self.pc != stop && steps < max_steps {
            self.step()?;
            steps += 1;
        }
        Ok(steps)
    }
}

/// Run a straight-line sequence of words against a fresh machine whose
/// destination register starts out as `garbage`, and return the final value
/// of register `rd`.
pub fn eval_straight_line(words: &[u32], rd: u32, garbage: u64) -> Result<u64, Trap> {
    let mut m = Machine::new(Vec::new());
    if rd != 0 {
        m.x[rd as usize & 31] = garbage;
    }
    for &w in words {
        m.execute(w)?;
    }
    Ok(m.reg(rd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{b_op, i_op, j_op, u_op};
    use crate::opcode::Opcode;
    use crate::reg::*;

    fn image(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn lui_addiw_builds_32_bit_value() {
        let words = [
            u_op(Opcode::Lui, A0, 0x12345).unwrap(),
            i_op(Opcode::Addiw, A0, A0, 0x678).unwrap(),
        ];
        assert_eq!(
            eval_straight_line(&words, 10, 0xDEAD).unwrap(),
            0x1234_5678
        );
    }

    #[test]
    fn addiw_sign_extends() {
        let words = [
            u_op(Opcode::Lui, A0, 0x80000 - 0x100000).unwrap(),
            i_op(Opcode::Addiw, A0, A0, -1).unwrap(),
        ];
        // 0x8000_0000 - 1 wraps to 0x7FFF_FFFF in 32 bits.
        assert_eq!(eval_straight_line(&words, 10, 0).unwrap(), 0x7FFF_FFFF);
    }

    #[test]
    fn shifts() {
        let words = [
            i_op(Opcode::Addi, A0, ZERO, -1).unwrap(),
            i_op(Opcode::Srli, A0, A0, 4).unwrap(),
        ];
        assert_eq!(
            eval_straight_line(&words, 10, 0).unwrap(),
            0x0FFF_FFFF_FFFF_FFFF
        );
    }

    #[test]
    fn branch_taken_and_not_taken() {
        let code = image(&[
            i_op(Opcode::Addi, A0, ZERO, 1).unwrap(),
            b_op(Opcode::Bne, A0, ZERO, 8).unwrap(),
            i_op(Opcode::Addi, A1, ZERO, 7).unwrap(),
            j_op(Opcode::Jal, ZERO, 0).unwrap(),
        ]);
        let mut m = Machine::new(code);
        m.run_until(12, 16).unwrap();
        assert_eq!(m.reg(11), 0, "skipped instruction must not run");
    }

    #[test]
    fn unsupported_word_traps() {
        let mut m = Machine::new(Vec::new());
        assert_eq!(m.execute(0), Err(Trap::Unsupported(0)));
    }
}
