//! Field extraction, the inverse of [`crate::format`].

use crate::format::sign_extend;
use crate::opcode::Format;

/// Bits 6:0.
#[inline]
pub const fn opcode(word: u32) -> u32 {
    word & 0x7F
}

/// Bits 11:7.
#[inline]
pub const fn rd(word: u32) -> u32 {
    (word >> 7) & 0x1F
}

/// Bits 14:12.
#[inline]
pub const fn funct3(word: u32) -> u32 {
    (word >> 12) & 0x7
}

/// Bits 19:15.
#[inline]
pub const fn rs1(word: u32) -> u32 {
    (word >> 15) & 0x1F
}

/// Bits 24:20.
#[inline]
pub const fn rs2(word: u32) -> u32 {
    (word >> 20) & 0x1F
}

/// Bits 31:25.
#[inline]
pub const fn funct7(word: u32) -> u32 {
    word >> 25
}

/// Sign-extended I-type immediate.
#[inline]
pub const fn imm_i(word: u32) -> i64 {
    sign_extend((word >> 20) as u64, 12)
}

/// Sign-extended S-type immediate.
#[inline]
pub const fn imm_s(word: u32) -> i64 {
    let imm = ((word >> 25) << 5) | ((word >> 7) & 0x1F);
    sign_extend(imm as u64, 12)
}

/// Sign-extended B-type byte offset.
#[inline]
pub const fn imm_b(word: u32) -> i64 {
    let imm = ((word >> 31) & 1) << 12
        | ((word >> 7) & 1) << 11
        | ((word >> 25) & 0x3F) << 5
        | ((word >> 8) & 0xF) << 1;
    sign_extend(imm as u64, 13)
}

/// Sign-extended value of the U-type bits 31:12 (not shifted).
#[inline]
pub const fn imm_u(word: u32) -> i64 {
    sign_extend((word >> 12) as u64, 20)
}

/// Sign-extended J-type byte offset.
#[inline]
pub const fn imm_j(word: u32) -> i64 {
    let imm = ((word >> 31) & 1) << 20
        | ((word >> 12) & 0xFF) << 12
        | ((word >> 20) & 1) << 11
        | ((word >> 21) & 0x3FF) << 1;
    sign_extend(imm as u64, 21)
}

/// All fields of a word, interpreted according to `format`.
///
/// Fields a format does not have are reported as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Fields {
    /// Major opcode.
    pub opcode: u32,
    /// Destination register number.
    pub rd: u32,
    /// Minor opcode.
    pub funct3: u32,
    /// First source register number.
    pub rs1: u32,
    /// Second source register number.
    pub rs2: u32,
    /// R-type function bits.
    pub funct7: u32,
    /// Sign-extended immediate (U-type: the 20-bit value, unshifted).
    pub imm: i64,
}

/// Split `word` into the fields of `format`.
pub fn fields(word: u32, format: Format) -> Fields {
    let base = Fields {
        opcode: opcode(word),
        ..Fields::default()
    };
    match format {
        Format::R => Fields {
            rd: rd(word),
            funct3: funct3(word),
            rs1: rs1(word),
            rs2: rs2(word),
            funct7: funct7(word),
            ..base
        },
        Format::I => Fields {
            rd: rd(word),
            funct3: funct3(word),
            rs1: rs1(word),
            imm: imm_i(word),
            ..base
        },
        Format::S => Fields {
            funct3: funct3(word),
            rs1: rs1(word),
            rs2: rs2(word),
            imm: imm_s(word),
            ..base
        },
        Format::B => Fields {
            funct3: funct3(word),
            rs1: rs1(word),
            rs2: rs2(word),
            imm: imm_b(word),
            ..base
        },
        Format::U => Fields {
            rd: rd(word),
            imm: imm_u(word),
            ..base
        },
        Format::J => Fields {
            rd: rd(word),
            imm: imm_j(word),
            ..base
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_beq_offset() {
        // beq a0, a1, +8
        let f = fields(0x00B5_0463, Format::B);
        assert_eq!((f.rs1, f.rs2, f.imm), (10, 11, 8));
    }

    #[test]
    fn decode_negative_branch() {
        // bne a0, zero, -4
        assert_eq!(imm_b(0xFE05_1EE3), -4);
    }

    #[test]
    fn decode_jal() {
        assert_eq!(imm_j(0xFF9F_F06F), -8);
        assert_eq!(imm_j(0x0010_00EF), 2048);
        assert_eq!(rd(0x0010_00EF), 1);
    }

    #[test]
    fn decode_store() {
        // sw a0, -4(s0)
        let f = fields(0xFEA4_2E23, Format::S);
        assert_eq!((f.rs1, f.rs2, f.imm, f.funct3), (8, 10, -4, 2));
    }

    #[test]
    fn decode_lui() {
        assert_eq!(imm_u(0xFFFF_F537), -1);
        assert_eq!(imm_u(0x1234_5537), 0x12345);
    }
}
