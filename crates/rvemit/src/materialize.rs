//! 64-bit constant materialization.
//!
//! A constant that does not fit the 12-bit `addi` immediate is rebuilt as
//!
//! ```text
//! value = high32 << x  (+|-)  offset          offset < 2^x
//! ```
//!
//! where `high32` is loaded with `lui` + `addiw` and `offset` is shifted in
//! with `slli` + `addi` pairs, 11 bits at a time. The split point `x` is
//! chosen from the outermost bit flips of the value so that `high32`,
//! sign-extended, only differs from the value in its low bits. Positive
//! values with a long run of significant bits are also tried shifted up to
//! bit 63 with a single trailing `srli`, and the cheaper sequence wins.

use crate::encoder::InstrWords;
use crate::error::{EmitError, Result};
use crate::format::{fits_signed, i_op, sign_extend, u_op};
use crate::opcode::Opcode;
use crate::reg::{Reg, ZERO};

/// Longest sequence the direct decomposition can produce.
pub const MAX_LOAD_IMM_STEPS: usize = 8;

/// Instruction-count ceilings for constant materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoadImmLimits {
    /// Longest sequence emitted in a function body before falling back to a
    /// data-pool load. Default: 5.
    pub preferred_max: usize,
    /// Longest sequence allowed in prolog/epilog code, where the data pool
    /// cannot be used. Default: 8.
    pub absolute_max: usize,
    /// Minimum significant-bit span before the shifted `srli` form is tried.
    /// Default: 32.
    pub srli_min_span: u32,
}

impl Default for LoadImmLimits {
    fn default() -> Self {
        Self {
            preferred_max: 5,
            absolute_max: MAX_LOAD_IMM_STEPS,
            srli_min_span: 32,
        }
    }
}

// ── Sequences ───────────────────────────────────────────────────────────

/// One instruction of a materialization sequence. The destination is the
/// register the sequence is emitted for; the first step reads `x0`, every
/// later step reads the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Step {
    /// `lui`, `addi`, `addiw`, `slli` or `srli`.
    pub op: Opcode,
    /// Signed immediate (`lui`: the 20-bit upper value, shifts: the amount).
    pub imm: i64,
}

const NO_STEP: Step = Step {
    op: Opcode::Addi,
    imm: 0,
};

/// A register-independent materialization sequence of at most
/// [`MAX_LOAD_IMM_STEPS`] instructions.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct LoadImmSeq {
    steps: [Step; MAX_LOAD_IMM_STEPS],
    len: u8,
}

impl LoadImmSeq {
    /// An empty sequence.
    pub const fn new() -> Self {
        Self {
            steps: [NO_STEP; MAX_LOAD_IMM_STEPS],
            len: 0,
        }
    }

    /// Append a step.
    ///
    /// # Panics
    ///
    /// Panics if the sequence is already [`MAX_LOAD_IMM_STEPS`] long.
    #[inline]
    pub fn push(&mut self, op: Opcode, imm: i64) {
        assert!(
            (self.len as usize) < MAX_LOAD_IMM_STEPS,
            "LoadImmSeq overflow: more than {} steps",
            MAX_LOAD_IMM_STEPS
        );
        self.steps[self.len as usize] = Step { op, imm };
        self.len += 1;
    }

    /// Number of instructions.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the sequence is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The steps in execution order.
    #[inline]
    pub fn steps(&self) -> &[Step] {
        &self.steps[..self.len as usize]
    }

    /// Encoded size in bytes.
    #[inline]
    pub fn byte_size(&self) -> u32 {
        self.len as u32 * 4
    }

    /// The value the sequence leaves in its destination register.
    pub fn value(&self) -> i64 {
        let mut acc: i64 = 0;
        for step in self.steps() {
            acc = match step.op {
                Opcode::Lui => sign_extend((step.imm as u64) << 12, 32),
                Opcode::Addiw => i64::from((acc as i32).wrapping_add(step.imm as i32)),
                Opcode::Addi => acc.wrapping_add(step.imm),
                Opcode::Slli => acc.wrapping_shl(step.imm as u32),
                Opcode::Srli => ((acc as u64) >> step.imm) as i64,
                _ => acc,
            };
        }
        acc
    }

    /// Encode the sequence for destination `rd`, appending to `out`.
    pub fn encode_into(&self, rd: Reg, out: &mut InstrWords) -> Result<()> {
        for (i, step) in self.steps().iter().enumerate() {
            let src = if i == 0 { ZERO } else { rd };
            let word = match step.op {
                Opcode::Lui => u_op(Opcode::Lui, rd, step.imm)?,
                op => i_op(op, rd, src, step.imm)?,
            };
            out.push(word);
        }
        Ok(())
    }
}

impl Default for LoadImmSeq {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for LoadImmSeq {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut list = f.debug_list();
        for s in self.steps() {
            list.entry(&format_args!("{} {}", s.op, s.imm));
        }
        list.finish()
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for LoadImmSeq {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serde::Serialize::serialize(self.steps(), serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for LoadImmSeq {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let steps = <alloc::vec::Vec<Step> as serde::Deserialize>::deserialize(deserializer)?;
        if steps.len() > MAX_LOAD_IMM_STEPS {
            return Err(serde::de::Error::invalid_length(
                steps.len(),
                &"at most 8 load-immediate steps",
            ));
        }
        let mut seq = LoadImmSeq::new();
        for s in steps {
            seq.push(s.op, s.imm);
        }
        Ok(seq)
    }
}

// ── Decomposition ───────────────────────────────────────────────────────

#[inline]
const fn low_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Most significant position where the value differs from its sign pattern,
/// plus one.
#[inline]
fn span_top(value: i64) -> u32 {
    let v = value as u64;
    if value < 0 {
        64 - (!v).leading_zeros()
    } else {
        64 - v.leading_zeros()
    }
}

/// Lowest position where the value differs from its bit 0.
#[inline]
fn span_bottom(value: i64) -> u32 {
    let v = value as u64;
    if v & 1 != 0 {
        (!v).trailing_zeros()
    } else {
        v.trailing_zeros()
    }
}

/// The high/offset split plus chunked offset, without any shift trick.
fn direct(value: i64) -> LoadImmSeq {
    let mut seq = LoadImmSeq::new();
    if fits_signed(value, 12) {
        seq.push(Opcode::Addi, value);
        return seq;
    }

    let bits = value as u64;
    let mut y = span_top(value);
    let mut x = span_bottom(value);

    if y < 32 {
        y = 31;
        x = 0;
    } else if y - x < 31 {
        y = x + 31;
    } else {
        x = y - 31;
    }

    let mut high32 = ((value >> x) as u64) & 0xFFFF_FFFF;
    let offset1 = bits & low_mask(x);
    let mut offset2 = (!offset1.wrapping_sub(1)) & low_mask(x);
    let mut subtract = false;

    if high32 == 0x7FFF_FFFF && y != 63 {
        // Incrementing high32 would flip its sign, so try moving the split
        // one bit up instead.
        let nx = x + 1;
        let n1 = bits & low_mask(nx);
        let n2 = (!n1.wrapping_sub(1)) & low_mask(nx);
        if n2 < offset1 {
            x = nx;
            high32 = ((value >> x) as u64) & 0xFFFF_FFFF;
            offset2 = n2;
            subtract = true;
        }
    } else if offset2 < offset1 {
        subtract = true;
    }

    let offset = if subtract {
        high32 = (high32 + 1) & 0xFFFF_FFFF;
        offset2
    } else {
        offset1
    };

    // High part.
    let lower = high32 & 0xFFF;
    let mut upper = (high32 >> 12) & 0xF_FFFF;
    if lower & 0x800 != 0 {
        upper = (upper + 1) & 0xF_FFFF;
    }
    if upper != 0 {
        seq.push(Opcode::Lui, sign_extend(upper, 20));
    }
    if lower != 0 {
        seq.push(Opcode::Addiw, sign_extend(lower, 12));
    }

    // Offset, most significant chunk first.
    let mut chunk_lsb = x.saturating_sub(11);
    let mut shift = x.min(11);
    let mut chunk_mask = low_mask(x.min(11));
    loop {
        let mut chunk = (offset >> chunk_lsb) & chunk_mask;
        if chunk != 0 {
            let lz = 11 - (64 - chunk.leading_zeros()).min(11);
            if lz > 0 {
                let widen = chunk_lsb.min(lz);
                chunk_lsb -= widen;
                shift += widen;
                chunk = (offset >> chunk_lsb) & chunk_mask;
            }
            seq.push(Opcode::Slli, i64::from(shift));
            let chunk = chunk as i64;
            seq.push(Opcode::Addi, if subtract { -chunk } else { chunk });
            shift = 0;
        }
        if chunk_lsb == 0 {
            break;
        }
        let step = chunk_lsb.min(11);
        shift += step;
        if chunk_lsb < 11 {
            chunk_mask >>= 11 - chunk_lsb;
        }
        chunk_lsb -= step;
    }
    if shift > 0 {
        seq.push(Opcode::Slli, i64::from(shift));
    }
    seq
}

/// The cheapest instruction sequence for `value`, ignoring context limits.
///
/// Non-negative values whose significant span is at least `srli_min_span`
/// bits are also tried shifted left by their leading-zero count; that form
/// pays for one extra `srli`, so it only wins when it saves two instructions.
pub fn synthesize(value: i64, srli_min_span: u32) -> LoadImmSeq {
    let plain = direct(value);
    if value < 0 || fits_signed(value, 12) {
        return plain;
    }

    let span = span_top(value) - span_bottom(value);
    if span < srli_min_span {
        return plain;
    }

    let shift = (value as u64).leading_zeros();
    let mut shifted = direct(((value as u64) << shift) as i64);
    if shifted.len() + 1 < plain.len() {
        shifted.push(Opcode::Srli, i64::from(shift));
        log::trace!(
            "li {:#x}: srli form, {} instead of {} instructions",
            value,
            shifted.len(),
            plain.len()
        );
        return shifted;
    }
    plain
}

/// How a constant ends up in its register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// An inline instruction sequence.
    Inline(LoadImmSeq),
    /// A PC-relative load from the data pool.
    Pool,
}

/// Decide how to materialize `value`.
///
/// With `pool_allowed`, sequences longer than `preferred_max` become data-pool
/// loads. Without it (prolog/epilog code), sequences up to `absolute_max`
/// are accepted and anything longer is [`EmitError::MaterializeOverflow`].
pub fn plan(value: i64, limits: &LoadImmLimits, pool_allowed: bool) -> Result<Plan> {
    let seq = synthesize(value, limits.srli_min_span);
    if pool_allowed {
        if seq.len() > limits.preferred_max {
            log::debug!(
                "li {:#x}: {} instructions exceed {}, using data pool",
                value,
                seq.len(),
                limits.preferred_max
            );
            return Ok(Plan::Pool);
        }
    } else if seq.len() > limits.absolute_max {
        return Err(EmitError::MaterializeOverflow {
            value,
            count: seq.len(),
            limit: limits.absolute_max,
        });
    }
    log::trace!("li {:#x}: {:?}", value, seq);
    Ok(Plan::Inline(seq))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reg::A0;
    use crate::sim::eval_straight_line;

    fn check(value: i64) -> usize {
        let seq = synthesize(value, 32);
        assert_eq!(seq.value(), value, "native value of {value:#x}: {seq:?}");
        let mut words = InstrWords::new();
        seq.encode_into(A0, &mut words).unwrap();
        for garbage in [0, u64::MAX, 0x5555_5555_5555_5555] {
            let got = eval_straight_line(&words, A0.num(), garbage).unwrap();
            assert_eq!(got, value as u64, "{value:#x} via {seq:?}");
        }
        assert!(seq.len() <= MAX_LOAD_IMM_STEPS);
        seq.len()
    }

    #[test]
    fn small_values_are_one_addi() {
        for v in [0, 1, -1, 2047, -2048] {
            assert_eq!(check(v), 1);
            assert_eq!(synthesize(v, 32).steps()[0].op, Opcode::Addi);
        }
    }

    #[test]
    fn debug_lists_steps() {
        assert_eq!(alloc::format!("{:?}", synthesize(5, 32)), "[addi 5]");
        assert_eq!(alloc::format!("{:?}", LoadImmSeq::new()), "[]");
    }

    #[test]
    fn just_outside_simm12() {
        assert_eq!(check(2048), 2);
        assert_eq!(check(-2049), 2);
        let seq = synthesize(-2049, 32);
        assert_eq!(
            seq.steps(),
            &[
                Step {
                    op: Opcode::Lui,
                    imm: -1
                },
                Step {
                    op: Opcode::Addiw,
                    imm: 0x7FF
                }
            ]
        );
    }

    #[test]
    fn thirty_two_bit_edges() {
        assert_eq!(check(i64::from(i32::MAX)), 2);
        assert_eq!(check(i64::from(i32::MIN)), 1);
        assert_eq!(check(0x1234_5678), 2);
        assert_eq!(check(0x8000_0000), 2);
    }

    #[test]
    fn two_to_the_32() {
        let seq = synthesize(0x1_0000_0000, 32);
        assert_eq!(
            seq.steps(),
            &[
                Step {
                    op: Opcode::Addiw,
                    imm: 1
                },
                Step {
                    op: Opcode::Slli,
                    imm: 32
                }
            ]
        );
        check(0x1_0000_0000);
    }

    #[test]
    fn sign_flip_corner_case() {
        check(0x7FFF_FFFF_0000_0000u64 as i64);
        check(0x7FFF_FFFF_FFFF_F800u64 as i64);
        check(0x3FFF_FFFF_C000_0001u64 as i64);
    }

    #[test]
    fn extremes() {
        check(i64::MAX);
        check(i64::MIN);
        check(i64::MIN + 1);
        check(0x5555_5555_5555_5555);
        check(0xAAAA_AAAA_AAAA_AAAAu64 as i64);
        check(0x1234_5678_9ABC_DEF0);
        check(0xDEAD_BEEF_CAFE_BABEu64 as i64);
    }

    #[test]
    fn srli_form_wins_when_it_saves_two() {
        // Shifted left by 8 this is -512, one addi.
        let v = 0x00FF_FFFF_FFFF_FFFE;
        assert_eq!(direct(v).len(), 3);
        let seq = synthesize(v, 32);
        assert_eq!(
            seq.steps(),
            &[
                Step {
                    op: Opcode::Addi,
                    imm: -512
                },
                Step {
                    op: Opcode::Srli,
                    imm: 8
                }
            ]
        );
        check(v);
    }

    #[test]
    fn srli_form_needs_a_long_span() {
        // A plain run of ones has no significant span and stays direct.
        let seq = synthesize(0xFF_FFFF_FFFF, 32);
        assert_eq!(seq.len(), 3);
        check(0xFF_FFFF_FFFF);
    }

    #[test]
    fn srli_threshold_disables_form() {
        let v = 0x00FF_FFFF_FFFF_FFFE;
        let seq = synthesize(v, 64);
        assert!(seq.steps().iter().all(|s| s.op != Opcode::Srli));
        assert_eq!(seq.value(), v);
    }

    #[test]
    fn plan_respects_context() {
        let limits = LoadImmLimits::default();
        let dense = 0x1234_5678_9ABC_DEF0;
        assert!(synthesize(dense, 32).len() > limits.preferred_max);
        assert_eq!(plan(dense, &limits, true).unwrap(), Plan::Pool);
        assert!(matches!(
            plan(dense, &limits, false).unwrap(),
            Plan::Inline(_)
        ));

        let tight = LoadImmLimits {
            absolute_max: 3,
            ..limits
        };
        assert!(matches!(
            plan(dense, &tight, false),
            Err(EmitError::MaterializeOverflow { limit: 3, .. })
        ));
        assert!(matches!(plan(-1, &tight, false).unwrap(), Plan::Inline(s) if s.len() == 1));
    }
}
