//! The read-only data area placed after a function's code.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::error::{EmitError, Result};

/// Pool-relative byte storage with 8-byte constant deduplication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataPool {
    bytes: Vec<u8>,
    consts: BTreeMap<u64, u32>,
    max_align: u32,
}

impl DataPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing has been reserved.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Pool contents.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Largest alignment requested so far.
    #[inline]
    pub fn max_align(&self) -> u32 {
        self.max_align.max(1)
    }

    /// Reserve `len` zeroed bytes aligned to `align` (a power of two) and
    /// return their pool-relative offset.
    pub fn reserve(&mut self, len: usize, align: u32) -> Result<u32> {
        if align == 0 || !align.is_power_of_two() {
            return Err(EmitError::BadAlignment { align });
        }
        let start = self.bytes.len().next_multiple_of(align as usize);
        let end = start + len;
        let offset = u32::try_from(start).map_err(|_| EmitError::ResourceLimitExceeded {
            resource: "data pool bytes".into(),
            limit: u32::MAX as usize,
        })?;
        u32::try_from(end).map_err(|_| EmitError::ResourceLimitExceeded {
            resource: "data pool bytes".into(),
            limit: u32::MAX as usize,
        })?;
        self.bytes.resize(end, 0);
        self.max_align = self.max_align.max(align);
        Ok(offset)
    }

    /// Overwrite reserved bytes at `offset`.
    ///
    /// Deduplicated constants whose slot overlaps the written range are
    /// forgotten, so a later [`push_u64`](Self::push_u64) of the same value
    /// gets a fresh slot.
    pub fn write(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        let start = offset as usize;
        let end = start
            .checked_add(data.len())
            .ok_or(EmitError::DataOutOfBounds {
                offset,
                len: data.len(),
            })?;
        let dst = self
            .bytes
            .get_mut(start..end)
            .ok_or(EmitError::DataOutOfBounds {
                offset,
                len: data.len(),
            })?;
        dst.copy_from_slice(data);
        if !data.is_empty() {
            self.consts.retain(|_, &mut slot| {
                let slot = slot as usize;
                slot + 8 <= start || slot >= end
            });
        }
        Ok(())
    }

    /// Store an 8-byte little-endian constant, reusing an earlier slot with
    /// the same value.
    pub fn push_u64(&mut self, value: u64) -> Result<u32> {
        if let Some(&off) = self.consts.get(&value) {
            return Ok(off);
        }
        let off = self.reserve(8, 8)?;
        self.write(off, &value.to_le_bytes())?;
        self.consts.insert(value, off);
        Ok(off)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_deduplicated() {
        let mut p = DataPool::new();
        let a = p.push_u64(0x1234_5678_9ABC_DEF0).unwrap();
        let b = p.push_u64(42).unwrap();
        let c = p.push_u64(0x1234_5678_9ABC_DEF0).unwrap();
        assert_eq!(a, c);
        assert_eq!(b, 8);
        assert_eq!(p.len(), 16);
        assert_eq!(&p.bytes()[8..16], &42u64.to_le_bytes());
    }

    #[test]
    fn reserve_aligns() {
        let mut p = DataPool::new();
        assert_eq!(p.reserve(3, 1).unwrap(), 0);
        assert_eq!(p.reserve(4, 4).unwrap(), 4);
        assert_eq!(p.push_u64(1).unwrap(), 8);
        assert_eq!(p.max_align(), 8);
    }

    #[test]
    fn bad_alignment() {
        let mut p = DataPool::new();
        assert_eq!(
            p.reserve(4, 3).unwrap_err(),
            EmitError::BadAlignment { align: 3 }
        );
        assert!(p.reserve(4, 0).is_err());
    }

    #[test]
    fn overwritten_constant_is_not_reused() {
        let mut p = DataPool::new();
        let a = p.push_u64(0x1234_5678_9ABC_DEF0).unwrap();
        p.write(a, &7u64.to_le_bytes()).unwrap();
        let b = p.push_u64(0x1234_5678_9ABC_DEF0).unwrap();
        assert_ne!(a, b);
        assert_eq!(
            &p.bytes()[b as usize..b as usize + 8],
            &0x1234_5678_9ABC_DEF0u64.to_le_bytes()
        );
        assert_eq!(&p.bytes()[a as usize..a as usize + 8], &7u64.to_le_bytes());
    }

    #[test]
    fn partial_overlap_forgets_constant() {
        let mut p = DataPool::new();
        let a = p.push_u64(1).unwrap();
        let b = p.push_u64(2).unwrap();
        p.write(a + 7, &[0xFF]).unwrap();
        assert_ne!(p.push_u64(1).unwrap(), a);
        assert_eq!(p.push_u64(2).unwrap(), b);
    }

    #[test]
    fn write_out_of_bounds() {
        let mut p = DataPool::new();
        p.reserve(4, 4).unwrap();
        assert!(p.write(2, &[0; 4]).is_err());
        assert!(p.write(0, &[1, 2, 3, 4]).is_ok());
    }
}
