//! Instruction groups, labels, and the arena that holds a function's layout.
//!
//! Groups are addressed by a stable [`GroupId`] index rather than linked by
//! pointer. Each group owns a contiguous run of instruction descriptors; only
//! the last group receives new descriptors, so the runs never interleave.

use alloc::vec::Vec;
use core::fmt;

use crate::descriptor::{InstrDesc, JumpDesc};

/// Index of an instruction group in program order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupId(u32);

impl GroupId {
    /// Wrap a raw index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Position in the group arena.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}", self.0)
    }
}

/// A symbolic branch target, bound to the start of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LabelId(u32);

impl LabelId {
    /// Wrap a raw index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Position in the label table.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// One instruction group (roughly a basic block).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Byte offset from function start. Updated in place by relaxation.
    pub offset: u32,
    /// Total size of the group's descriptors in bytes.
    pub size: u32,
    /// Index of the first descriptor of the group.
    pub first: usize,
    /// Number of descriptors in the group.
    pub len: usize,
    /// Whether some label is bound to the start of this group.
    pub is_target: bool,
}

impl Group {
    fn at(offset: u32, first: usize) -> Self {
        Self {
            offset,
            size: 0,
            first,
            len: 0,
            is_target: false,
        }
    }

    /// Offset of the first byte past the group.
    #[inline]
    pub fn end(&self) -> u32 {
        self.offset + self.size
    }

    /// Descriptor index range of the group.
    #[inline]
    pub fn instrs(&self) -> core::ops::Range<usize> {
        self.first..self.first + self.len
    }
}

/// Everything the relaxation engine and the writer need: groups, descriptors
/// in program order, the jump list, and label bindings.
#[derive(Debug, Clone)]
pub struct Layout {
    pub(crate) groups: Vec<Group>,
    pub(crate) instrs: Vec<InstrDesc>,
    pub(crate) jumps: Vec<JumpDesc>,
    pub(crate) labels: Vec<Option<GroupId>>,
}

impl Layout {
    /// A layout with one empty group at offset 0.
    pub fn new() -> Self {
        Self {
            groups: alloc::vec![Group::at(0, 0)],
            instrs: Vec::new(),
            jumps: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// The group receiving new descriptors.
    #[inline]
    pub fn current(&self) -> GroupId {
        GroupId::new(self.groups.len() as u32 - 1)
    }

    /// Close the current group and open an empty one after it.
    pub fn open_group(&mut self) -> GroupId {
        let (offset, first) = match self.groups.last() {
            Some(g) => (g.end(), g.first + g.len),
            None => (0, 0),
        };
        self.groups.push(Group::at(offset, first));
        self.current()
    }

    /// Append a descriptor to the current group and return its index.
    pub fn push(&mut self, desc: InstrDesc) -> usize {
        let index = self.instrs.len();
        let size = desc.size;
        self.instrs.push(desc);
        if let Some(g) = self.groups.last_mut() {
            g.len += 1;
            g.size += size;
        }
        index
    }

    /// Offset of the first byte past the last group.
    #[inline]
    pub fn code_size(&self) -> u32 {
        self.groups.last().map_or(0, Group::end)
    }

    /// All groups in program order.
    #[inline]
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// All descriptors in program order.
    #[inline]
    pub fn instrs(&self) -> &[InstrDesc] {
        &self.instrs
    }

    /// The jump list in program order.
    #[inline]
    pub fn jumps(&self) -> &[JumpDesc] {
        &self.jumps
    }

    /// Group a label is bound to, if any.
    #[inline]
    pub fn label_group(&self, label: LabelId) -> Option<GroupId> {
        self.labels.get(label.index()).copied().flatten()
    }

    /// Byte offset of every descriptor, computed from the group offsets.
    pub fn instr_offsets(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.instrs.len());
        for g in &self.groups {
            let mut off = g.offset;
            for desc in &self.instrs[g.instrs()] {
                out.push(off);
                off += desc.size;
            }
        }
        out
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new()
    }
}
