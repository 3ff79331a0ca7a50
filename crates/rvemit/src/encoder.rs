//! Encoded output units: the inline word buffer every descriptor encodes
//! into, and the relocation records handed to the linker.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

// ─── InstrWords: stack-allocated word buffer ─────────────────────────────

/// Longest expansion of a single descriptor, in words.
///
/// A far call through a materialized address needs eight `li` steps plus the
/// `jalr`; every other descriptor is shorter.
pub const MAX_DESC_WORDS: usize = 9;

/// Stack-allocated buffer holding the words of one descriptor, so the writer
/// never allocates per instruction.
#[derive(Clone, Copy)]
pub struct InstrWords {
    data: [u32; MAX_DESC_WORDS],
    len: u8,
}

impl InstrWords {
    /// Create an empty buffer.
    #[inline]
    pub const fn new() -> Self {
        Self {
            data: [0; MAX_DESC_WORDS],
            len: 0,
        }
    }

    /// Append one word.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is already full. Descriptor sizes are bounded by
    /// construction, so this indicates an internal error.
    #[inline]
    pub fn push(&mut self, word: u32) {
        assert!(
            (self.len as usize) < MAX_DESC_WORDS,
            "InstrWords overflow: cannot push beyond {} words",
            MAX_DESC_WORDS
        );
        self.data[self.len as usize] = word;
        self.len += 1;
    }

    /// Append several words.
    #[inline]
    pub fn extend_from_slice(&mut self, words: &[u32]) {
        for &w in words {
            self.push(w);
        }
    }

    /// Number of words in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size in bytes.
    #[inline]
    pub fn byte_len(&self) -> u32 {
        self.len as u32 * 4
    }

    /// Append the words to `out` in little-endian byte order.
    pub fn write_le(&self, out: &mut Vec<u8>) {
        for w in self.iter() {
            out.extend_from_slice(&w.to_le_bytes());
        }
    }
}

impl Default for InstrWords {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl core::ops::Deref for InstrWords {
    type Target = [u32];
    #[inline]
    fn deref(&self) -> &[u32] {
        &self.data[..self.len as usize]
    }
}

impl fmt::Debug for InstrWords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for w in self.iter() {
            list.entry(&format_args!("{w:#010x}"));
        }
        list.finish()
    }
}

impl PartialEq for InstrWords {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl Eq for InstrWords {}

impl PartialEq<[u32]> for InstrWords {
    fn eq(&self, other: &[u32]) -> bool {
        **self == *other
    }
}

// ─── Relocations ─────────────────────────────────────────────────────────

/// How the linker patches an `auipc` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RelocKind {
    /// `auipc rd, %pcrel_hi(sym)` + `addi rd, rd, %pcrel_lo(sym)`.
    PcRelAddi,
    /// `auipc rd, %pcrel_hi(sym)` + `ld rd, %pcrel_lo(sym)(rd)`.
    PcRelLoad,
    /// `auipc t2, %pcrel_hi(sym)` + `jalr link, %pcrel_lo(sym)(t2)`.
    PcRelCall,
}

impl fmt::Display for RelocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelocKind::PcRelAddi => "pcrel-addi",
            RelocKind::PcRelLoad => "pcrel-load",
            RelocKind::PcRelCall => "pcrel-call",
        };
        f.write_str(s)
    }
}

/// What a relocation refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RelocTarget {
    /// A named external symbol.
    Symbol(String),
    /// An absolute address only known to the loader's address space.
    Address(u64),
}

impl fmt::Display for RelocTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelocTarget::Symbol(name) => f.write_str(name),
            RelocTarget::Address(addr) => write!(f, "{addr:#x}"),
        }
    }
}

/// A fixup left for the linker or loader.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Relocation {
    /// Code offset of the `auipc` that starts the pair. Both words of the
    /// pair are emitted with zeroed immediates.
    pub offset: u32,
    /// The referenced symbol or address.
    pub target: RelocTarget,
    /// Which pair shape to patch.
    pub kind: RelocKind,
    /// Constant added to the target address.
    pub addend: i64,
}
