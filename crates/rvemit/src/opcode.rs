//! The RV64 opcode subset handled by the core and its fixed encoding fields.
//!
//! ```text
//! R-type:  [funct7 | rs2 | rs1 | funct3 | rd  | opcode]
//! I-type:  [  imm[11:0]  | rs1 | funct3 | rd  | opcode]
//! S-type:  [imm[11:5]|rs2| rs1 | funct3 |imm[4:0]|opcode]
//! B-type:  [imm[12|10:5]|rs2|rs1|funct3|imm[4:1|11]|opcode]
//! U-type:  [      imm[31:12]             | rd  | opcode]
//! J-type:  [imm[20|10:1|11|19:12]        | rd  | opcode]
//! ```

use core::fmt;

use crate::reg::RegClass;

// ── Major opcodes ───────────────────────────────────────────────────────

pub(crate) const OP_LUI: u32 = 0b011_0111;
pub(crate) const OP_AUIPC: u32 = 0b001_0111;
pub(crate) const OP_JAL: u32 = 0b110_1111;
pub(crate) const OP_JALR: u32 = 0b110_0111;
pub(crate) const OP_BRANCH: u32 = 0b110_0011;
pub(crate) const OP_LOAD: u32 = 0b000_0011;
pub(crate) const OP_STORE: u32 = 0b010_0011;
pub(crate) const OP_IMM: u32 = 0b001_0011;
pub(crate) const OP_IMM_32: u32 = 0b001_1011; // RV64I W-suffix immediate ops
pub(crate) const OP_REG: u32 = 0b011_0011;
pub(crate) const OP_REG_32: u32 = 0b011_1011; // RV64I W-suffix register ops
pub(crate) const OP_LOAD_FP: u32 = 0b000_0111;
pub(crate) const OP_STORE_FP: u32 = 0b010_0111;
pub(crate) const OP_FP: u32 = 0b101_0011;

/// Dynamic rounding mode, used as funct3 of FP arithmetic.
const RM_DYN: u32 = 0b111;

/// One of the six fixed 32-bit instruction layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Format {
    /// Register-register.
    R,
    /// Register-immediate, loads, `jalr`.
    I,
    /// Stores.
    S,
    /// Conditional branches.
    B,
    /// Upper immediate.
    U,
    /// `jal`.
    J,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Format::R => "R",
            Format::I => "I",
            Format::S => "S",
            Format::B => "B",
            Format::U => "U",
            Format::J => "J",
        };
        f.write_str(s)
    }
}

/// Fixed fields of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpFields {
    /// Layout of the instruction word.
    pub format: Format,
    /// Major opcode, bits 6:0.
    pub opcode: u32,
    /// Minor opcode, bits 14:12 (unused by U/J).
    pub funct3: u32,
    /// Bits 31:25 of R-type words.
    pub funct7: u32,
    /// Fixed `rs2` value of unary R-type operations (`fmv.x.d` and friends).
    pub fixed_rs2: Option<u32>,
}

/// Immediate layout of a shift-by-constant instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftImm {
    /// Width of the shift amount (6 for RV64 shifts, 5 for `*w`).
    pub shamt_bits: u32,
    /// Bits OR-ed into the 12-bit immediate above the shift amount.
    pub high: u32,
}

/// Register file expected by each operand slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandClasses {
    /// Destination.
    pub rd: RegClass,
    /// First source.
    pub rs1: RegClass,
    /// Second source.
    pub rs2: RegClass,
}

/// Instructions the core can encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum Opcode {
    // U / J
    Lui,
    Auipc,
    Jal,
    Jalr,
    // B
    Beq,
    Bne,
    Blt,
    Bge,
    Bltu,
    Bgeu,
    // loads
    Lb,
    Lh,
    Lw,
    Ld,
    Lbu,
    Lhu,
    Lwu,
    // stores
    Sb,
    Sh,
    Sw,
    Sd,
    // OP-IMM
    Addi,
    Slti,
    Sltiu,
    Xori,
    Ori,
    Andi,
    Slli,
    Srli,
    Srai,
    // OP-IMM-32
    Addiw,
    Slliw,
    Srliw,
    Sraiw,
    // OP
    Add,
    Sub,
    Sll,
    Slt,
    Sltu,
    Xor,
    Srl,
    Sra,
    Or,
    And,
    // OP-32
    Addw,
    Subw,
    Sllw,
    Srlw,
    Sraw,
    // M
    Mul,
    Mulh,
    Mulhsu,
    Mulhu,
    Div,
    Divu,
    Rem,
    Remu,
    Mulw,
    Divw,
    Divuw,
    Remw,
    Remuw,
    // F / D
    Flw,
    Fld,
    Fsw,
    Fsd,
    FaddS,
    FsubS,
    FmulS,
    FdivS,
    FaddD,
    FsubD,
    FmulD,
    FdivD,
    FsgnjS,
    FsgnjD,
    FmvXW,
    FmvWX,
    FmvXD,
    FmvDX,
}

const fn r(opcode: u32, funct3: u32, funct7: u32) -> OpFields {
    OpFields {
        format: Format::R,
        opcode,
        funct3,
        funct7,
        fixed_rs2: None,
    }
}

const fn r_unary(opcode: u32, funct3: u32, funct7: u32) -> OpFields {
    OpFields {
        format: Format::R,
        opcode,
        funct3,
        funct7,
        fixed_rs2: Some(0),
    }
}

const fn fmt3(format: Format, opcode: u32, funct3: u32) -> OpFields {
    OpFields {
        format,
        opcode,
        funct3,
        funct7: 0,
        fixed_rs2: None,
    }
}

impl Opcode {
    /// Fixed encoding fields.
    pub const fn fields(self) -> OpFields {
        use Format::*;
        use Opcode::*;
        match self {
            Lui => fmt3(U, OP_LUI, 0),
            Auipc => fmt3(U, OP_AUIPC, 0),
            Jal => fmt3(J, OP_JAL, 0),
            Jalr => fmt3(I, OP_JALR, 0),

            Beq => fmt3(B, OP_BRANCH, 0b000),
            Bne => fmt3(B, OP_BRANCH, 0b001),
            Blt => fmt3(B, OP_BRANCH, 0b100),
            Bge => fmt3(B, OP_BRANCH, 0b101),
            Bltu => fmt3(B, OP_BRANCH, 0b110),
            Bgeu => fmt3(B, OP_BRANCH, 0b111),

            Lb => fmt3(I, OP_LOAD, 0b000),
            Lh => fmt3(I, OP_LOAD, 0b001),
            Lw => fmt3(I, OP_LOAD, 0b010),
            Ld => fmt3(I, OP_LOAD, 0b011),
            Lbu => fmt3(I, OP_LOAD, 0b100),
            Lhu => fmt3(I, OP_LOAD, 0b101),
            Lwu => fmt3(I, OP_LOAD, 0b110),

            Sb => fmt3(S, OP_STORE, 0b000),
            Sh => fmt3(S, OP_STORE, 0b001),
            Sw => fmt3(S, OP_STORE, 0b010),
            Sd => fmt3(S, OP_STORE, 0b011),

            Addi => fmt3(I, OP_IMM, 0b000),
            Slli => fmt3(I, OP_IMM, 0b001),
            Slti => fmt3(I, OP_IMM, 0b010),
            Sltiu => fmt3(I, OP_IMM, 0b011),
            Xori => fmt3(I, OP_IMM, 0b100),
            Srli | Srai => fmt3(I, OP_IMM, 0b101),
            Ori => fmt3(I, OP_IMM, 0b110),
            Andi => fmt3(I, OP_IMM, 0b111),

            Addiw => fmt3(I, OP_IMM_32, 0b000),
            Slliw => fmt3(I, OP_IMM_32, 0b001),
            Srliw | Sraiw => fmt3(I, OP_IMM_32, 0b101),

            Add => r(OP_REG, 0b000, 0x00),
            Sub => r(OP_REG, 0b000, 0x20),
            Sll => r(OP_REG, 0b001, 0x00),
            Slt => r(OP_REG, 0b010, 0x00),
            Sltu => r(OP_REG, 0b011, 0x00),
            Xor => r(OP_REG, 0b100, 0x00),
            Srl => r(OP_REG, 0b101, 0x00),
            Sra => r(OP_REG, 0b101, 0x20),
            Or => r(OP_REG, 0b110, 0x00),
            And => r(OP_REG, 0b111, 0x00),

            Addw => r(OP_REG_32, 0b000, 0x00),
            Subw => r(OP_REG_32, 0b000, 0x20),
            Sllw => r(OP_REG_32, 0b001, 0x00),
            Srlw => r(OP_REG_32, 0b101, 0x00),
            Sraw => r(OP_REG_32, 0b101, 0x20),

            Mul => r(OP_REG, 0b000, 0x01),
            Mulh => r(OP_REG, 0b001, 0x01),
            Mulhsu => r(OP_REG, 0b010, 0x01),
            Mulhu => r(OP_REG, 0b011, 0x01),
            Div => r(OP_REG, 0b100, 0x01),
            Divu => r(OP_REG, 0b101, 0x01),
            Rem => r(OP_REG, 0b110, 0x01),
            Remu => r(OP_REG, 0b111, 0x01),
            Mulw => r(OP_REG_32, 0b000, 0x01),
            Divw => r(OP_REG_32, 0b100, 0x01),
            Divuw => r(OP_REG_32, 0b101, 0x01),
            Remw => r(OP_REG_32, 0b110, 0x01),
            Remuw => r(OP_REG_32, 0b111, 0x01),

            Flw => fmt3(I, OP_LOAD_FP, 0b010),
            Fld => fmt3(I, OP_LOAD_FP, 0b011),
            Fsw => fmt3(S, OP_STORE_FP, 0b010),
            Fsd => fmt3(S, OP_STORE_FP, 0b011),

            FaddS => r(OP_FP, RM_DYN, 0x00),
            FsubS => r(OP_FP, RM_DYN, 0x04),
            FmulS => r(OP_FP, RM_DYN, 0x08),
            FdivS => r(OP_FP, RM_DYN, 0x0C),
            FaddD => r(OP_FP, RM_DYN, 0x01),
            FsubD => r(OP_FP, RM_DYN, 0x05),
            FmulD => r(OP_FP, RM_DYN, 0x09),
            FdivD => r(OP_FP, RM_DYN, 0x0D),
            FsgnjS => r(OP_FP, 0b000, 0x10),
            FsgnjD => r(OP_FP, 0b000, 0x11),
            FmvXW => r_unary(OP_FP, 0b000, 0x70),
            FmvWX => r_unary(OP_FP, 0b000, 0x78),
            FmvXD => r_unary(OP_FP, 0b000, 0x71),
            FmvDX => r_unary(OP_FP, 0b000, 0x79),
        }
    }

    /// Layout of the instruction word.
    #[inline]
    pub const fn format(self) -> Format {
        self.fields().format
    }

    /// `true` for the six conditional branches.
    #[inline]
    pub const fn is_branch(self) -> bool {
        matches!(self.format(), Format::B)
    }

    /// The branch with the opposite condition (`beq`↔`bne`, `blt`↔`bge`,
    /// `bltu`↔`bgeu`). Flipping funct3 bit 0 is exactly this mapping.
    pub const fn inverted(self) -> Option<Opcode> {
        use Opcode::*;
        match self {
            Beq => Some(Bne),
            Bne => Some(Beq),
            Blt => Some(Bge),
            Bge => Some(Blt),
            Bltu => Some(Bgeu),
            Bgeu => Some(Bltu),
            _ => None,
        }
    }

    /// Shift-amount layout for shift-by-constant instructions.
    pub const fn shift(self) -> Option<ShiftImm> {
        use Opcode::*;
        match self {
            Slli | Srli => Some(ShiftImm {
                shamt_bits: 6,
                high: 0,
            }),
            Srai => Some(ShiftImm {
                shamt_bits: 6,
                high: 0x400,
            }),
            Slliw | Srliw => Some(ShiftImm {
                shamt_bits: 5,
                high: 0,
            }),
            Sraiw => Some(ShiftImm {
                shamt_bits: 5,
                high: 0x400,
            }),
            _ => None,
        }
    }

    /// Register file of each operand slot.
    pub const fn operand_classes(self) -> OperandClasses {
        use Opcode::*;
        use RegClass::{Float as F, Int as X};
        let (rd, rs1, rs2) = match self {
            Flw | Fld => (F, X, X),
            Fsw | Fsd => (X, X, F),
            FaddS | FsubS | FmulS | FdivS | FaddD | FsubD | FmulD | FdivD | FsgnjS | FsgnjD => {
                (F, F, F)
            }
            FmvXW | FmvXD => (X, F, X),
            FmvWX | FmvDX => (F, X, X),
            _ => (X, X, X),
        };
        OperandClasses { rd, rs1, rs2 }
    }

    /// Assembly mnemonic.
    pub const fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Lui => "lui",
            Auipc => "auipc",
            Jal => "jal",
            Jalr => "jalr",
            Beq => "beq",
            Bne => "bne",
            Blt => "blt",
            Bge => "bge",
            Bltu => "bltu",
            Bgeu => "bgeu",
            Lb => "lb",
            Lh => "lh",
            Lw => "lw",
            Ld => "ld",
            Lbu => "lbu",
            Lhu => "lhu",
            Lwu => "lwu",
            Sb => "sb",
            Sh => "sh",
            Sw => "sw",
            Sd => "sd",
            Addi => "addi",
            Slti => "slti",
            Sltiu => "sltiu",
            Xori => "xori",
            Ori => "ori",
            Andi => "andi",
            Slli => "slli",
            Srli => "srli",
            Srai => "srai",
            Addiw => "addiw",
            Slliw => "slliw",
            Srliw => "srliw",
            Sraiw => "sraiw",
            Add => "add",
            Sub => "sub",
            Sll => "sll",
            Slt => "slt",
            Sltu => "sltu",
            Xor => "xor",
            Srl => "srl",
            Sra => "sra",
            Or => "or",
            And => "and",
            Addw => "addw",
            Subw => "subw",
            Sllw => "sllw",
            Srlw => "srlw",
            Sraw => "sraw",
            Mul => "mul",
            Mulh => "mulh",
            Mulhsu => "mulhsu",
            Mulhu => "mulhu",
            Div => "div",
            Divu => "divu",
            Rem => "rem",
            Remu => "remu",
            Mulw => "mulw",
            Divw => "divw",
            Divuw => "divuw",
            Remw => "remw",
            Remuw => "remuw",
            Flw => "flw",
            Fld => "fld",
            Fsw => "fsw",
            Fsd => "fsd",
            FaddS => "fadd.s",
            FsubS => "fsub.s",
            FmulS => "fmul.s",
            FdivS => "fdiv.s",
            FaddD => "fadd.d",
            FsubD => "fsub.d",
            FmulD => "fmul.d",
            FdivD => "fdiv.d",
            FsgnjS => "fsgnj.s",
            FsgnjD => "fsgnj.d",
            FmvXW => "fmv.x.w",
            FmvWX => "fmv.w.x",
            FmvXD => "fmv.x.d",
            FmvDX => "fmv.d.x",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_inversion_flips_funct3_bit0() {
        for op in [
            Opcode::Beq,
            Opcode::Bne,
            Opcode::Blt,
            Opcode::Bge,
            Opcode::Bltu,
            Opcode::Bgeu,
        ] {
            let inv = op.inverted().unwrap();
            assert_eq!(inv.fields().funct3, op.fields().funct3 ^ 1, "{op}");
            assert_eq!(inv.inverted(), Some(op));
        }
        assert_eq!(Opcode::Add.inverted(), None);
    }

    #[test]
    fn formats() {
        assert_eq!(Opcode::Lui.format(), Format::U);
        assert_eq!(Opcode::Jal.format(), Format::J);
        assert_eq!(Opcode::Jalr.format(), Format::I);
        assert_eq!(Opcode::Sd.format(), Format::S);
        assert_eq!(Opcode::Bgeu.format(), Format::B);
        assert_eq!(Opcode::Mulw.format(), Format::R);
        assert!(Opcode::Blt.is_branch());
        assert!(!Opcode::Jal.is_branch());
    }

    #[test]
    fn shift_layouts() {
        assert_eq!(Opcode::Srai.shift().unwrap().high, 0x400);
        assert_eq!(Opcode::Slliw.shift().unwrap().shamt_bits, 5);
        assert!(Opcode::Addi.shift().is_none());
    }

    #[test]
    fn float_operand_classes() {
        let c = Opcode::Fld.operand_classes();
        assert_eq!((c.rd, c.rs1), (RegClass::Float, RegClass::Int));
        let c = Opcode::FmvXD.operand_classes();
        assert_eq!((c.rd, c.rs1), (RegClass::Int, RegClass::Float));
        assert_eq!(Opcode::FmvDX.fields().fixed_rs2, Some(0));
    }
}
