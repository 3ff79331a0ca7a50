//! Pending-instruction descriptors and the jump state machine.

use core::fmt;

use crate::encoder::{RelocKind, RelocTarget};
use crate::group::{GroupId, LabelId};
use crate::materialize::LoadImmSeq;
use crate::opcode::Opcode;
use crate::reg::Reg;

/// One pending instruction. `size` always equals the number of bytes the
/// writer will produce for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrDesc {
    /// What to encode.
    pub kind: InstrKind,
    /// Encoded size in bytes, a multiple of 4.
    pub size: u32,
}

impl InstrDesc {
    /// A descriptor with the initial size of `kind`.
    pub fn new(kind: InstrKind) -> Self {
        let size = kind.initial_size();
        Self { kind, size }
    }
}

/// The closed set of descriptor shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrKind {
    /// Register-register word.
    R {
        /// R-type opcode.
        op: Opcode,
        /// Destination.
        rd: Reg,
        /// First source.
        rs1: Reg,
        /// Second source (ignored by unary operations).
        rs2: Reg,
    },
    /// Register-immediate word: ALU immediates, shifts, loads, `jalr`.
    I {
        /// I-type opcode.
        op: Opcode,
        /// Destination.
        rd: Reg,
        /// Source or base.
        rs1: Reg,
        /// Immediate or shift amount.
        imm: i64,
    },
    /// Store word.
    S {
        /// S-type opcode.
        op: Opcode,
        /// Value stored.
        rs2: Reg,
        /// Base address.
        rs1: Reg,
        /// Byte displacement.
        imm: i64,
    },
    /// Upper-immediate word.
    U {
        /// `lui` or `auipc`.
        op: Opcode,
        /// Destination.
        rd: Reg,
        /// Signed value of bits 31:12.
        imm: i64,
    },
    /// A relaxable branch or jump; the index points into the jump list.
    Jump(JumpId),
    /// An inline constant materialization.
    LoadImm {
        /// Destination.
        rd: Reg,
        /// The chosen sequence.
        seq: LoadImmSeq,
    },
    /// A call.
    Call(CallKind),
    /// `auipc tmp, hi; <load> rd, lo(tmp)` from the data pool.
    DataLoad {
        /// `ld`, `lw`, `lwu`, `fld`, `flw`, ...
        op: Opcode,
        /// Destination.
        rd: Reg,
        /// Register holding the `auipc` result.
        tmp: Reg,
        /// Offset of the datum inside the pool.
        pool_off: u32,
    },
    /// `auipc rd, hi; addi rd, rd, lo` yielding the address of a label.
    LabelAddr {
        /// Destination.
        rd: Reg,
        /// The label.
        label: LabelId,
    },
    /// `auipc rd, 0; addi|ld rd, 0(rd)` left for the linker.
    AddrReloc {
        /// Destination.
        rd: Reg,
        /// Referenced symbol or address.
        target: RelocTarget,
        /// [`RelocKind::PcRelAddi`] or [`RelocKind::PcRelLoad`].
        kind: RelocKind,
        /// Constant added to the target.
        addend: i64,
    },
}

impl InstrKind {
    fn initial_size(&self) -> u32 {
        match self {
            InstrKind::R { .. } | InstrKind::I { .. } | InstrKind::S { .. } | InstrKind::U { .. } => {
                4
            }
            InstrKind::Jump(_) => 4,
            InstrKind::LoadImm { seq, .. } => seq.byte_size(),
            InstrKind::Call(call) => call.size(),
            InstrKind::DataLoad { .. } | InstrKind::LabelAddr { .. } | InstrKind::AddrReloc { .. } => {
                8
            }
        }
    }
}

/// How a call reaches its callee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallKind {
    /// `jalr link, offset(base)`.
    Indirect {
        /// Return-address register.
        link: Reg,
        /// Register holding the callee address.
        base: Reg,
        /// Signed 12-bit displacement.
        offset: i64,
    },
    /// `auipc scratch, 0; jalr link, 0(scratch)` with a call relocation.
    Reloc {
        /// Return-address register.
        link: Reg,
        /// Scratch register for the `auipc`.
        scratch: Reg,
        /// The callee.
        target: RelocTarget,
        /// Constant added to the callee address.
        addend: i64,
    },
    /// The callee address materialized into `scratch`, then `jalr`.
    Absolute {
        /// Return-address register.
        link: Reg,
        /// Register receiving the address.
        scratch: Reg,
        /// Sequence producing the address.
        seq: LoadImmSeq,
    },
    /// `auipc scratch; ld scratch; jalr link, 0(scratch)` through the pool.
    Pooled {
        /// Return-address register.
        link: Reg,
        /// Register receiving the address.
        scratch: Reg,
        /// Pool offset of the 8-byte address.
        pool_off: u32,
    },
}

impl CallKind {
    /// Encoded size in bytes.
    pub fn size(&self) -> u32 {
        match self {
            CallKind::Indirect { .. } => 4,
            CallKind::Reloc { .. } => 8,
            CallKind::Absolute { seq, .. } => seq.byte_size() + 4,
            CallKind::Pooled { .. } => 12,
        }
    }
}

// ── Jumps ───────────────────────────────────────────────────────────────

/// Index into the function's jump list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JumpId(u32);

impl JumpId {
    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Position in the jump list.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for JumpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "J{}", self.0)
    }
}

/// The control transfer a jump performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    /// Conditional branch `op rs1, rs2, target`.
    Cond {
        /// One of the six B-type opcodes.
        op: Opcode,
        /// First compared register.
        rs1: Reg,
        /// Second compared register.
        rs2: Reg,
    },
    /// `jal rd, target`.
    Jal {
        /// Link register (`zero` for a plain jump).
        rd: Reg,
    },
}

/// Where a jump goes, as written by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpTarget {
    /// The start of the group a label is bound to.
    Label(LabelId),
    /// An instruction count relative to the instruction after the jump, in
    /// the jump's own group.
    Relative(i32),
}

/// A jump target after binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    /// The start of a group.
    Group(GroupId),
    /// The descriptor at this position of the jump's group; the group length
    /// denotes its end.
    InGroup(usize),
}

/// Long encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LongForm {
    /// Inverted branch over a `jal` (conditional branches only).
    Near,
    /// `auipc` + `jalr`, behind an inverted branch for conditionals.
    Far,
}

/// Relaxation state of a jump. The order of the variants is the order of
/// transitions; a state never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JumpState {
    /// Not yet visited by relaxation.
    ShortUnbound,
    /// Target resolved, one-word encoding.
    ShortBound,
    /// Upgraded; terminal apart from near → far.
    Long(LongForm),
}

/// Candidate encoding of a jump, ordered from smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Form {
    Short,
    Near,
    Far,
}

/// A branch or jump descriptor, linked into the jump list by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JumpDesc {
    /// Branch condition or link register.
    pub kind: JumpKind,
    /// Symbolic target.
    pub target: JumpTarget,
    /// Force the far form as soon as the jump is bound.
    pub keep_long: bool,
    /// Relaxation state.
    pub state: JumpState,
    /// Owning group.
    pub group: GroupId,
    /// Index of the jump's descriptor.
    pub instr: usize,
    /// Byte offset inside the owning group.
    pub offs: u32,
    /// Target after binding.
    pub resolved: Option<Resolved>,
}

impl JumpDesc {
    pub(crate) fn new(kind: JumpKind, target: JumpTarget, group: GroupId, instr: usize, offs: u32) -> Self {
        Self {
            kind,
            target,
            keep_long: false,
            state: JumpState::ShortUnbound,
            group,
            instr,
            offs,
            resolved: None,
        }
    }

    /// `true` for conditional branches.
    #[inline]
    pub fn is_conditional(&self) -> bool {
        matches!(self.kind, JumpKind::Cond { .. })
    }

    /// `true` once upgraded.
    #[inline]
    pub fn is_long(&self) -> bool {
        matches!(self.state, JumpState::Long(_))
    }

    pub(crate) fn form(&self) -> Form {
        match self.state {
            JumpState::ShortUnbound | JumpState::ShortBound => Form::Short,
            JumpState::Long(LongForm::Near) => Form::Near,
            JumpState::Long(LongForm::Far) => Form::Far,
        }
    }

    /// Forms this jump may take, smallest first.
    pub(crate) fn forms(&self) -> &'static [Form] {
        if self.is_conditional() {
            &[Form::Short, Form::Near, Form::Far]
        } else {
            &[Form::Short, Form::Far]
        }
    }

    /// Encoded size of `form` for this jump.
    pub(crate) fn size_of(&self, form: Form) -> u32 {
        match (form, self.is_conditional()) {
            (Form::Short, _) => 4,
            (Form::Near, _) => 8,
            (Form::Far, true) => 12,
            (Form::Far, false) => 8,
        }
    }

    /// Position, relative to the jump, of the word that encodes the distance
    /// to the target in `form`.
    pub(crate) fn anchor(&self, form: Form) -> u32 {
        match (form, self.is_conditional()) {
            (Form::Short, _) => 0,
            (_, true) => 4,
            (_, false) => 0,
        }
    }

    /// Current encoded size.
    #[inline]
    pub fn size(&self) -> u32 {
        self.size_of(self.form())
    }

    /// Move to a larger form and return the growth in bytes. Requests for a
    /// form that is not larger than the current one are ignored.
    pub(crate) fn upgrade(&mut self, to: Form) -> u32 {
        let from = self.form();
        if to <= from {
            return 0;
        }
        let before = self.size();
        self.state = match to {
            Form::Near => JumpState::Long(LongForm::Near),
            Form::Far => JumpState::Long(LongForm::Far),
            Form::Short => self.state,
        };
        self.size() - before
    }
}
