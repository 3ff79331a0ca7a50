//! Bit-packing for the six base instruction formats.
//!
//! The raw `encode_*` functions take field values that the caller has already
//! reduced to their two's-complement bit patterns (see [`trim_signed`]) and
//! reject anything wider than the declared field. The `*_op` helpers on top
//! of them pull the fixed fields out of an [`Opcode`] and do the trimming.

use crate::error::{EmitError, Field, Result};
use crate::opcode::{Format, Opcode, OP_AUIPC, OP_JALR};
use crate::reg::Reg;

// ── Range helpers ───────────────────────────────────────────────────────

/// `true` if `value` is representable as a `bits`-wide two's-complement number.
#[inline]
pub const fn fits_signed(value: i64, bits: u32) -> bool {
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << (bits - 1)) - 1;
    value >= min && value <= max
}

/// `true` if `value` is representable as a `bits`-wide unsigned number.
#[inline]
pub const fn fits_unsigned(value: i64, bits: u32) -> bool {
    value >= 0 && (value as u64) >> bits == 0
}

/// Sign-extend the low `bits` of `value`.
#[inline]
pub const fn sign_extend(value: u64, bits: u32) -> i64 {
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// Check that `value` fits `bits` as a signed number and return its masked
/// bit pattern.
pub fn trim_signed(field: Field, value: i64, bits: u32) -> Result<u32> {
    if !fits_signed(value, bits) {
        return Err(EmitError::FieldOverflow { field, value, bits });
    }
    Ok((value as u32) & mask32(bits))
}

/// Like [`trim_signed`] but additionally require the low bit to be clear, as
/// B and J immediates do not transmit bit 0.
pub fn trim_signed_even(field: Field, value: i64, bits: u32) -> Result<u32> {
    if value & 1 != 0 {
        return Err(EmitError::Misaligned {
            field,
            value,
            align: 2,
        });
    }
    trim_signed(field, value, bits)
}

#[inline]
const fn mask32(bits: u32) -> u32 {
    if bits >= 32 {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    }
}

#[inline]
fn check(field: Field, value: u32, bits: u32) -> Result<u32> {
    if value & !mask32(bits) != 0 {
        return Err(EmitError::FieldOverflow {
            field,
            value: value as i64,
            bits,
        });
    }
    Ok(value)
}

// ── Raw format encoders ─────────────────────────────────────────────────

/// Pack an R-type word.
pub fn encode_r(opcode: u32, rd: u32, funct3: u32, rs1: u32, rs2: u32, funct7: u32) -> Result<u32> {
    Ok(check(Field::Opcode, opcode, 7)?
        | check(Field::Rd, rd, 5)? << 7
        | check(Field::Funct3, funct3, 3)? << 12
        | check(Field::Rs1, rs1, 5)? << 15
        | check(Field::Rs2, rs2, 5)? << 20
        | check(Field::Funct7, funct7, 7)? << 25)
}

/// Pack an I-type word. `imm12` is the masked 12-bit pattern.
pub fn encode_i(opcode: u32, rd: u32, funct3: u32, rs1: u32, imm12: u32) -> Result<u32> {
    Ok(check(Field::Opcode, opcode, 7)?
        | check(Field::Rd, rd, 5)? << 7
        | check(Field::Funct3, funct3, 3)? << 12
        | check(Field::Rs1, rs1, 5)? << 15
        | check(Field::Imm12, imm12, 12)? << 20)
}

/// Pack an S-type word; imm[4:0] goes to bit 7, imm[11:5] to bit 25.
pub fn encode_s(opcode: u32, funct3: u32, rs1: u32, rs2: u32, imm12: u32) -> Result<u32> {
    let imm = check(Field::Imm12, imm12, 12)?;
    Ok(check(Field::Opcode, opcode, 7)?
        | (imm & 0x1F) << 7
        | check(Field::Funct3, funct3, 3)? << 12
        | check(Field::Rs1, rs1, 5)? << 15
        | check(Field::Rs2, rs2, 5)? << 20
        | (imm >> 5) << 25)
}

/// Pack a U-type word. `imm20` is the masked upper-20-bit pattern.
pub fn encode_u(opcode: u32, rd: u32, imm20: u32) -> Result<u32> {
    Ok(check(Field::Opcode, opcode, 7)?
        | check(Field::Rd, rd, 5)? << 7
        | check(Field::Imm20, imm20, 20)? << 12)
}

/// Pack a B-type word. `imm13` is the masked 13-bit offset; bit 0 must be 0.
pub fn encode_b(opcode: u32, funct3: u32, rs1: u32, rs2: u32, imm13: u32) -> Result<u32> {
    let imm = check(Field::Imm13, imm13, 13)?;
    if imm & 1 != 0 {
        return Err(EmitError::Misaligned {
            field: Field::Imm13,
            value: imm as i64,
            align: 2,
        });
    }
    let bit11 = (imm >> 11) & 1;
    let bits4_1 = (imm >> 1) & 0xF;
    let bits10_5 = (imm >> 5) & 0x3F;
    let bit12 = (imm >> 12) & 1;
    Ok(check(Field::Opcode, opcode, 7)?
        | bit11 << 7
        | bits4_1 << 8
        | check(Field::Funct3, funct3, 3)? << 12
        | check(Field::Rs1, rs1, 5)? << 15
        | check(Field::Rs2, rs2, 5)? << 20
        | bits10_5 << 25
        | bit12 << 31)
}

/// Pack a J-type word. `imm21` is the masked 21-bit offset; bit 0 must be 0.
pub fn encode_j(opcode: u32, rd: u32, imm21: u32) -> Result<u32> {
    let imm = check(Field::Imm21, imm21, 21)?;
    if imm & 1 != 0 {
        return Err(EmitError::Misaligned {
            field: Field::Imm21,
            value: imm as i64,
            align: 2,
        });
    }
    let bits19_12 = (imm >> 12) & 0xFF;
    let bit11 = (imm >> 11) & 1;
    let bits10_1 = (imm >> 1) & 0x3FF;
    let bit20 = (imm >> 20) & 1;
    Ok(check(Field::Opcode, opcode, 7)?
        | check(Field::Rd, rd, 5)? << 7
        | bits19_12 << 12
        | bit11 << 20
        | bits10_1 << 21
        | bit20 << 31)
}

// ── Opcode-level helpers ────────────────────────────────────────────────

fn expect(op: Opcode, format: Format) -> Result<crate::opcode::OpFields> {
    let fields = op.fields();
    if fields.format != format {
        return Err(EmitError::FormatMismatch {
            op,
            expected: format,
            actual: fields.format,
        });
    }
    Ok(fields)
}

/// Encode an R-type opcode.
pub fn r_op(op: Opcode, rd: Reg, rs1: Reg, rs2: Reg) -> Result<u32> {
    let f = expect(op, Format::R)?;
    let rs2 = f.fixed_rs2.unwrap_or(rs2.num());
    encode_r(f.opcode, rd.num(), f.funct3, rs1.num(), rs2, f.funct7)
}

/// Encode an I-type opcode with a signed 12-bit immediate, or a shift amount
/// for shift-by-constant opcodes.
pub fn i_op(op: Opcode, rd: Reg, rs1: Reg, imm: i64) -> Result<u32> {
    let f = expect(op, Format::I)?;
    let imm12 = match op.shift() {
        Some(shift) => {
            if !fits_unsigned(imm, shift.shamt_bits) {
                return Err(EmitError::FieldOverflow {
                    field: Field::Shamt,
                    value: imm,
                    bits: shift.shamt_bits,
                });
            }
            shift.high | imm as u32
        }
        None => trim_signed(Field::Imm12, imm, 12)?,
    };
    encode_i(f.opcode, rd.num(), f.funct3, rs1.num(), imm12)
}

/// Encode an S-type opcode (`rs2` is stored at `imm(rs1)`).
pub fn s_op(op: Opcode, rs2: Reg, rs1: Reg, imm: i64) -> Result<u32> {
    let f = expect(op, Format::S)?;
    encode_s(
        f.opcode,
        f.funct3,
        rs1.num(),
        rs2.num(),
        trim_signed(Field::Imm12, imm, 12)?,
    )
}

/// Encode a U-type opcode. `imm20` is the signed value of bits 31:12.
pub fn u_op(op: Opcode, rd: Reg, imm20: i64) -> Result<u32> {
    let f = expect(op, Format::U)?;
    encode_u(f.opcode, rd.num(), trim_signed(Field::Imm20, imm20, 20)?)
}

/// Encode a conditional branch with a byte offset relative to itself.
pub fn b_op(op: Opcode, rs1: Reg, rs2: Reg, offset: i64) -> Result<u32> {
    let f = expect(op, Format::B)?;
    encode_b(
        f.opcode,
        f.funct3,
        rs1.num(),
        rs2.num(),
        trim_signed_even(Field::Imm13, offset, 13)?,
    )
}

/// Encode `jal rd, offset`.
pub fn j_op(op: Opcode, rd: Reg, offset: i64) -> Result<u32> {
    let f = expect(op, Format::J)?;
    encode_j(f.opcode, rd.num(), trim_signed_even(Field::Imm21, offset, 21)?)
}

// ── PC-relative pairs ───────────────────────────────────────────────────

/// Split a PC-relative offset into the `auipc` upper part and the signed
/// low 12 bits consumed by the following I-type instruction.
///
/// `hi20 = (offset + 0x800) >> 12` rounds so that the sign-extended low part
/// lands back on `offset`.
pub fn split_pcrel(offset: i64) -> Result<(i64, i64)> {
    let hi20 = (offset + 0x800) >> 12;
    if !fits_signed(hi20, 20) {
        return Err(EmitError::FunctionTooLarge { offset });
    }
    let lo12 = offset - (hi20 << 12);
    Ok((hi20, lo12))
}

/// `true` if an `auipc` pair can reach `offset`.
#[inline]
pub fn pcrel_reachable(offset: i64) -> bool {
    fits_signed((offset + 0x800) >> 12, 20)
}

/// Encode `auipc tmp, hi` followed by `jalr rd, lo(tmp)`.
pub fn auipc_jalr(rd: Reg, tmp: Reg, offset: i64) -> Result<[u32; 2]> {
    let (hi, lo) = split_pcrel(offset)?;
    Ok([
        encode_u(OP_AUIPC, tmp.num(), trim_signed(Field::Imm20, hi, 20)?)?,
        encode_i(
            OP_JALR,
            rd.num(),
            0,
            tmp.num(),
            trim_signed(Field::Imm12, lo, 12)?,
        )?,
    ])
}
