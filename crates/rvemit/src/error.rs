//! Error types for encoding, materialization, relaxation and output.
//!
//! Every variant is fatal for the function being emitted: the session stops
//! and the caller discards the partial output.

use alloc::string::String;
use core::fmt;

use crate::group::{GroupId, LabelId};
use crate::opcode::{Format, Opcode};

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, EmitError>;

/// The instruction-word field that failed a width or alignment check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Field {
    /// Major opcode, bits 6:0.
    Opcode,
    /// Destination register, bits 11:7.
    Rd,
    /// Minor opcode, bits 14:12.
    Funct3,
    /// First source register, bits 19:15.
    Rs1,
    /// Second source register, bits 24:20.
    Rs2,
    /// Function bits 31:25 of the R format.
    Funct7,
    /// 12-bit I/S immediate.
    Imm12,
    /// 13-bit B immediate.
    Imm13,
    /// 20-bit U immediate.
    Imm20,
    /// 21-bit J immediate.
    Imm21,
    /// Shift amount of a shift-immediate instruction.
    Shamt,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Opcode => "opcode",
            Field::Rd => "rd",
            Field::Funct3 => "funct3",
            Field::Rs1 => "rs1",
            Field::Rs2 => "rs2",
            Field::Funct7 => "funct7",
            Field::Imm12 => "imm[11:0]",
            Field::Imm13 => "imm[12:1]",
            Field::Imm20 => "imm[31:12]",
            Field::Imm21 => "imm[20:1]",
            Field::Shamt => "shamt",
        };
        f.write_str(name)
    }
}

/// Code-generation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EmitError {
    /// A value does not fit the bit width of its instruction field.
    #[error("{field} value {value} does not fit in {bits} bits")]
    FieldOverflow {
        /// The offending field.
        field: Field,
        /// The value that was rejected.
        value: i64,
        /// Declared width of the field.
        bits: u32,
    },

    /// A PC-relative offset has low bits that the format cannot transmit.
    #[error("{field} value {value} is not a multiple of {align}")]
    Misaligned {
        /// The offending field.
        field: Field,
        /// The value that was rejected.
        value: i64,
        /// Required alignment in bytes.
        align: u32,
    },

    /// The opcode was appended through an entry point for a different format.
    #[error("'{op}' is a {actual}-type instruction, not {expected}-type")]
    FormatMismatch {
        /// The opcode that was appended.
        op: Opcode,
        /// The format of the entry point that was used.
        expected: Format,
        /// The real format of the opcode.
        actual: Format,
    },

    /// An operand is not acceptable for this instruction.
    #[error("invalid operand for '{op}': {detail}")]
    InvalidOperand {
        /// The instruction being appended.
        op: Opcode,
        /// What is wrong with the operand.
        detail: String,
    },

    /// A branch references a label that was never bound to a group.
    #[error("label {label} is referenced but never bound")]
    UnresolvedTarget {
        /// The unbound label.
        label: LabelId,
    },

    /// A label was bound twice.
    #[error("label {label} is already bound to group {group}")]
    DuplicateLabel {
        /// The label.
        label: LabelId,
        /// The group it was first bound to.
        group: GroupId,
    },

    /// An instruction-count branch target lies outside the branch's group.
    #[error("relative target {count:+} from instruction {index} leaves group {group}")]
    RelativeTargetOutOfGroup {
        /// Group holding the branch.
        group: GroupId,
        /// Index of the branch within the group.
        index: usize,
        /// Instruction count relative to the following instruction.
        count: i32,
    },

    /// A constant needs more instructions than a context without data-pool
    /// access allows.
    #[error("constant {value:#x} needs {count} instructions, prolog/epilog limit is {limit}")]
    MaterializeOverflow {
        /// The constant.
        value: i64,
        /// Instructions required by the cheapest sequence.
        count: usize,
        /// The absolute ceiling in effect.
        limit: usize,
    },

    /// An offset cannot be represented even by the longest encoding.
    #[error("method is too large: offset {offset} exceeds the 32-bit PC-relative range")]
    FunctionTooLarge {
        /// The unrepresentable offset.
        offset: i64,
    },

    /// Relaxation failed to reach a fixed point within the pass budget.
    #[error("branch relaxation did not converge within {max} passes")]
    RelaxationLimit {
        /// The pass budget.
        max: usize,
    },

    /// A configured resource limit was exceeded.
    #[error("resource limit exceeded: {resource} (limit: {limit})")]
    ResourceLimitExceeded {
        /// Name of the resource.
        resource: String,
        /// The configured limit.
        limit: usize,
    },

    /// A data-pool alignment is not a power of two.
    #[error("data alignment {align} is not a power of two")]
    BadAlignment {
        /// The requested alignment.
        align: u32,
    },

    /// A data-pool write falls outside the reserved bytes.
    #[error("data write of {len} bytes at pool offset {offset} is out of bounds")]
    DataOutOfBounds {
        /// Pool offset of the write.
        offset: u32,
        /// Length of the write.
        len: usize,
    },

    /// The writer produced a different number of bytes than a descriptor
    /// declared.
    #[error("descriptor declared {expected} bytes but {actual} were written")]
    SizeMismatch {
        /// The size field of the descriptor.
        expected: u32,
        /// Bytes actually written.
        actual: u32,
    },
}

impl EmitError {
    /// Shorthand for [`EmitError::InvalidOperand`].
    pub(crate) fn invalid(op: Opcode, detail: impl Into<String>) -> Self {
        EmitError::InvalidOperand {
            op,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn field_overflow_display() {
        let err = EmitError::FieldOverflow {
            field: Field::Imm12,
            value: 4096,
            bits: 12,
        };
        assert_eq!(
            format!("{}", err),
            "imm[11:0] value 4096 does not fit in 12 bits"
        );
    }

    #[test]
    fn unresolved_target_display() {
        let err = EmitError::UnresolvedTarget {
            label: LabelId::new(7),
        };
        assert_eq!(format!("{}", err), "label L7 is referenced but never bound");
    }

    #[test]
    fn format_mismatch_display() {
        let err = EmitError::FormatMismatch {
            op: Opcode::Addi,
            expected: Format::R,
            actual: Format::I,
        };
        assert_eq!(
            format!("{}", err),
            "'addi' is a I-type instruction, not R-type"
        );
    }

    #[test]
    fn relative_target_display_shows_sign() {
        let err = EmitError::RelativeTargetOutOfGroup {
            group: GroupId::new(2),
            index: 1,
            count: -5,
        };
        assert_eq!(
            format!("{}", err),
            "relative target -5 from instruction 1 leaves group G2"
        );
    }

    #[test]
    fn function_too_large_display() {
        let err = EmitError::FunctionTooLarge {
            offset: 1 << 32,
        };
        assert!(format!("{}", err).starts_with("method is too large"));
    }

    #[test]
    fn relaxation_limit_display() {
        let err = EmitError::RelaxationLimit { max: 20 };
        assert_eq!(
            format!("{}", err),
            "branch relaxation did not converge within 20 passes"
        );
    }

    #[test]
    fn resource_limit_display() {
        let err = EmitError::ResourceLimitExceeded {
            resource: "code bytes".into(),
            limit: 1024,
        };
        assert_eq!(
            format!("{}", err),
            "resource limit exceeded: code bytes (limit: 1024)"
        );
    }
}
