//! Branch relaxation.
//!
//! Every pass walks the jump list in program order. Growth found earlier in
//! the pass is carried forward in two accumulators: `adj_ig` shifts every
//! later group, `adj_sj` shifts later jumps of the same group. Backward
//! distances are therefore exact; forward distances see all growth before
//! the jump but none after it, so they are checked with a margin of
//! `branch_growth_reserve` bytes for every still-short jump in between.
//!
//! Jumps only ever grow (short → near → far), so the loop reaches a fixed
//! point. A pass without upgrades measured every distance exactly and ends
//! relaxation.

use alloc::vec::Vec;

use crate::descriptor::{Form, InstrDesc, JumpDesc, JumpState, JumpTarget, LongForm, Resolved};
use crate::error::{EmitError, Result};
use crate::format::{fits_signed, pcrel_reachable};
use crate::group::{Group, Layout};
use crate::session::EmitConfig;

/// Outcome of a relaxation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RelaxStats {
    /// Passes over the jump list, including the final one without upgrades.
    pub passes: usize,
    /// State transitions to a larger form.
    pub upgrades: usize,
    /// Jumps in the near form after convergence.
    pub near: usize,
    /// Jumps in the far form after convergence.
    pub far: usize,
    /// Final code size in bytes.
    pub code_size: u32,
}

/// Run passes until no jump grows.
///
/// # Errors
///
/// [`EmitError::UnresolvedTarget`] and [`EmitError::RelativeTargetOutOfGroup`]
/// from binding, [`EmitError::FunctionTooLarge`] when even the far form
/// cannot reach, [`EmitError::RelaxationLimit`] when the pass budget runs out
/// and [`EmitError::ResourceLimitExceeded`] when growth crosses
/// `max_code_bytes`.
pub fn relax(layout: &mut Layout, config: &EmitConfig) -> Result<RelaxStats> {
    let budget = config
        .max_relax_passes
        .unwrap_or(2 * layout.jumps.len() + 2);
    let mut stats = RelaxStats::default();
    let mut short_prefix = Vec::with_capacity(layout.jumps.len() + 1);

    loop {
        if stats.passes >= budget {
            return Err(EmitError::RelaxationLimit { max: budget });
        }
        stats.passes += 1;
        let upgrades = pass(layout, config, &mut short_prefix)?;
        stats.upgrades += upgrades;
        log::debug!(
            "relax pass {}: {} upgrades, {} code bytes",
            stats.passes,
            upgrades,
            layout.code_size()
        );

        if layout.code_size() as usize > config.max_code_bytes {
            return Err(EmitError::ResourceLimitExceeded {
                resource: "code bytes".into(),
                limit: config.max_code_bytes,
            });
        }
        if upgrades == 0 {
            break;
        }
    }

    for j in &layout.jumps {
        match j.state {
            JumpState::Long(LongForm::Near) => stats.near += 1,
            JumpState::Long(LongForm::Far) => stats.far += 1,
            _ => {}
        }
    }
    stats.code_size = layout.code_size();
    Ok(stats)
}

/// One walk over the jump list. Returns the number of upgrades.
fn pass(layout: &mut Layout, config: &EmitConfig, short_prefix: &mut Vec<u32>) -> Result<usize> {
    let check_range = layout.code_size() > config.small_function_bytes;
    let Layout {
        groups,
        instrs,
        jumps,
        labels,
    } = layout;

    short_prefix.clear();
    short_prefix.push(0);
    let mut short = 0;
    for j in jumps.iter() {
        short += u32::from(!j.is_long());
        short_prefix.push(short);
    }

    let mut upgrades = 0;
    let mut adj_ig: u32 = 0;
    let mut adj_sj: u32 = 0;
    let mut next_group = 0;
    let mut current = None;

    for ji in 0..jumps.len() {
        let g = jumps[ji].group.index();
        if current != Some(g) {
            for grp in &mut groups[next_group..=g] {
                grp.offset += adj_ig;
            }
            next_group = g + 1;
            adj_sj = 0;
            current = Some(g);
        }
        jumps[ji].offs += adj_sj;

        let resolved = match jumps[ji].resolved {
            Some(r) => r,
            None => {
                let r = bind(&jumps[ji], labels, &groups[g])?;
                let jump = &mut jumps[ji];
                jump.resolved = Some(r);
                jump.state = JumpState::ShortBound;
                r
            }
        };

        let want = if jumps[ji].keep_long {
            Form::Far
        } else {
            jumps[ji].form()
        };
        let chosen = if check_range {
            let window = Window {
                groups,
                instrs,
                jumps,
                short_prefix,
                adj_ig,
                reserve: config.branch_growth_reserve,
            };
            window.choose(ji, resolved, want)?
        } else {
            want
        };

        let jump = &mut jumps[ji];
        let from = jump.state;
        let delta = jump.upgrade(chosen);
        if delta > 0 {
            log::trace!(
                "jump {} in {}: {:?} -> {:?} (+{} bytes)",
                ji,
                jump.group,
                from,
                jump.state,
                delta
            );
            instrs[jump.instr].size += delta;
            groups[g].size += delta;
            adj_sj += delta;
            adj_ig += delta;
            upgrades += 1;
        }
    }

    for grp in &mut groups[next_group..] {
        grp.offset += adj_ig;
    }
    Ok(upgrades)
}

fn bind(jump: &JumpDesc, labels: &[Option<crate::group::GroupId>], group: &Group) -> Result<Resolved> {
    match jump.target {
        JumpTarget::Label(label) => labels
            .get(label.index())
            .copied()
            .flatten()
            .map(Resolved::Group)
            .ok_or(EmitError::UnresolvedTarget { label }),
        JumpTarget::Relative(count) => {
            let index = jump.instr - group.first;
            let at = index as i64 + 1 + i64::from(count);
            if at < 0 || at > group.len as i64 {
                return Err(EmitError::RelativeTargetOutOfGroup {
                    group: jump.group,
                    index,
                    count,
                });
            }
            Ok(Resolved::InGroup(at as usize))
        }
    }
}

/// Read-only view of the layout while one jump is being measured.
struct Window<'a> {
    groups: &'a [Group],
    instrs: &'a [InstrDesc],
    jumps: &'a [JumpDesc],
    short_prefix: &'a [u32],
    adj_ig: u32,
    reserve: u32,
}

impl Window<'_> {
    /// Target offset, plus the first descriptor past the margin window for
    /// forward targets.
    fn target(&self, jump: &JumpDesc, resolved: Resolved) -> (i64, Option<usize>) {
        let own = &self.groups[jump.group.index()];
        match resolved {
            Resolved::Group(tg) => {
                let t = &self.groups[tg.index()];
                if tg > jump.group {
                    (i64::from(t.offset) + i64::from(self.adj_ig), Some(t.first))
                } else {
                    (i64::from(t.offset), None)
                }
            }
            Resolved::InGroup(k) => {
                let at = own.first + k;
                let before: u32 = self.instrs[own.first..at].iter().map(|d| d.size).sum();
                let dst = i64::from(own.offset) + i64::from(before);
                (dst, (at > jump.instr).then_some(at))
            }
        }
    }

    /// Smallest form at or above `want` that reaches the target.
    fn choose(&self, ji: usize, resolved: Resolved, want: Form) -> Result<Form> {
        let jump = &self.jumps[ji];
        let src = i64::from(self.groups[jump.group.index()].offset) + i64::from(jump.offs);
        let (dst, window_end) = self.target(jump, resolved);

        let margin = match window_end {
            Some(end) => {
                let stop = self.jumps.partition_point(|k| k.instr < end).max(ji + 1);
                let between = self.short_prefix[stop] - self.short_prefix[ji + 1];
                i64::from(self.reserve) * i64::from(between)
            }
            None => 0,
        };

        let current = i64::from(jump.size());
        let mut dist = 0;
        for &form in jump.forms().iter().filter(|&&f| f >= want) {
            let growth = i64::from(jump.size_of(form)) - current;
            let dst = if window_end.is_some() { dst + growth } else { dst };
            dist = dst - (src + i64::from(jump.anchor(form)));
            let reach = match form {
                Form::Short if jump.is_conditional() => fits_signed(dist + margin, 13),
                Form::Short | Form::Near => fits_signed(dist + margin, 21),
                Form::Far => pcrel_reachable(dist),
            };
            if reach {
                return Ok(form);
            }
        }
        Err(EmitError::FunctionTooLarge { offset: dist })
    }
}
