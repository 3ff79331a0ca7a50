//! Final encoding of a relaxed layout into code bytes, the data pool, and
//! relocation records.

use alloc::vec::Vec;

use crate::datapool::DataPool;
use crate::descriptor::{
    CallKind, InstrDesc, InstrKind, JumpDesc, JumpKind, JumpState, JumpTarget, LongForm, Resolved,
};
use crate::encoder::{InstrWords, RelocKind, Relocation};
use crate::error::{EmitError, Result};
use crate::format::{auipc_jalr, b_op, i_op, j_op, r_op, s_op, split_pcrel, u_op};
use crate::group::{LabelId, Layout};
use crate::opcode::Opcode;
use crate::reg::{Reg, ZERO};
use crate::relax::RelaxStats;
use crate::session::EmitConfig;

/// A finished function.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EmittedCode {
    /// Little-endian instruction bytes.
    pub code: Vec<u8>,
    /// Data-pool bytes, placed at `data_offset`.
    pub data: Vec<u8>,
    /// Offset of the data pool from the start of the code.
    pub data_offset: u32,
    /// Fixups for the linker, in code order.
    pub relocations: Vec<Relocation>,
    /// Final offset of every group.
    pub group_offsets: Vec<u32>,
    /// Final offset of every label, `None` for labels never bound.
    pub label_offsets: Vec<Option<u32>>,
    /// Ascending offsets at which some label-bound group starts.
    pub target_offsets: Vec<u32>,
    /// Relaxation summary.
    pub stats: RelaxStats,
}

impl EmittedCode {
    /// Code, alignment padding and data as one contiguous image.
    pub fn image(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data_offset as usize + self.data.len());
        out.extend_from_slice(&self.code);
        out.resize(self.data_offset as usize, 0);
        out.extend_from_slice(&self.data);
        out
    }

    /// Instruction word at a code offset.
    pub fn word_at(&self, offset: u32) -> Option<u32> {
        let at = offset as usize;
        let bytes = self.code.get(at..at + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Final offset of `label`.
    pub fn label_offset(&self, label: LabelId) -> Option<u32> {
        self.label_offsets.get(label.index()).copied().flatten()
    }
}

struct Writer<'a> {
    layout: &'a Layout,
    config: &'a EmitConfig,
    offsets: Vec<u32>,
    data_offset: u32,
    relocations: Vec<Relocation>,
}

/// Encode every descriptor at its frozen offset.
pub(crate) fn write(
    layout: &Layout,
    pool: &DataPool,
    config: &EmitConfig,
    stats: RelaxStats,
) -> Result<EmittedCode> {
    let code_size = layout.code_size();
    let data_offset = if pool.is_empty() {
        code_size
    } else {
        if !config.pool_align.is_power_of_two() {
            return Err(EmitError::BadAlignment {
                align: config.pool_align,
            });
        }
        let align = config.pool_align.max(pool.max_align());
        code_size
            .checked_next_multiple_of(align)
            .ok_or(EmitError::FunctionTooLarge {
                offset: i64::from(code_size),
            })?
    };

    let mut w = Writer {
        layout,
        config,
        offsets: layout.instr_offsets(),
        data_offset,
        relocations: Vec::new(),
    };
    let mut code = Vec::with_capacity(code_size as usize);

    for group in layout.groups() {
        if group.offset as usize != code.len() {
            return Err(EmitError::SizeMismatch {
                expected: group.offset,
                actual: code.len() as u32,
            });
        }
        for index in group.instrs() {
            let desc = &layout.instrs()[index];
            let words = w.encode(desc, w.offsets[index])?;
            if words.byte_len() != desc.size {
                return Err(EmitError::SizeMismatch {
                    expected: desc.size,
                    actual: words.byte_len(),
                });
            }
            words.write_le(&mut code);
        }
    }

    let label_offsets = layout
        .labels
        .iter()
        .map(|g| g.map(|g| layout.groups()[g.index()].offset))
        .collect();

    let mut target_offsets: Vec<u32> = layout
        .groups()
        .iter()
        .filter(|g| g.is_target)
        .map(|g| g.offset)
        .collect();
    target_offsets.dedup();

    log::debug!(
        "wrote {} code bytes, {} data bytes at {}, {} relocations, {} branch targets",
        code.len(),
        pool.len(),
        data_offset,
        w.relocations.len(),
        target_offsets.len()
    );

    Ok(EmittedCode {
        code,
        data: pool.bytes().to_vec(),
        data_offset,
        relocations: w.relocations,
        group_offsets: layout.groups().iter().map(|g| g.offset).collect(),
        label_offsets,
        target_offsets,
        stats,
    })
}

impl Writer<'_> {
    fn encode(&mut self, desc: &InstrDesc, pc: u32) -> Result<InstrWords> {
        let mut out = InstrWords::new();
        match &desc.kind {
            InstrKind::R { op, rd, rs1, rs2 } => out.push(r_op(*op, *rd, *rs1, *rs2)?),
            InstrKind::I { op, rd, rs1, imm } => out.push(i_op(*op, *rd, *rs1, *imm)?),
            InstrKind::S { op, rs2, rs1, imm } => out.push(s_op(*op, *rs2, *rs1, *imm)?),
            InstrKind::U { op, rd, imm } => out.push(u_op(*op, *rd, *imm)?),
            InstrKind::Jump(id) => {
                let jump = &self.layout.jumps()[id.index()];
                self.jump(jump, pc, &mut out)?;
            }
            InstrKind::LoadImm { rd, seq } => seq.encode_into(*rd, &mut out)?,
            InstrKind::Call(call) => self.call(call, pc, &mut out)?,
            InstrKind::DataLoad {
                op,
                rd,
                tmp,
                pool_off,
            } => {
                let (hi, lo) = self.pool_split(*pool_off, pc)?;
                out.push(u_op(Opcode::Auipc, *tmp, hi)?);
                out.push(i_op(*op, *rd, *tmp, lo)?);
            }
            InstrKind::LabelAddr { rd, label } => {
                let group = self
                    .layout
                    .label_group(*label)
                    .ok_or(EmitError::UnresolvedTarget { label: *label })?;
                let dst = self.layout.groups()[group.index()].offset;
                let (hi, lo) = split_pcrel(i64::from(dst) - i64::from(pc))?;
                out.push(u_op(Opcode::Auipc, *rd, hi)?);
                out.push(i_op(Opcode::Addi, *rd, *rd, lo)?);
            }
            InstrKind::AddrReloc {
                rd,
                target,
                kind,
                addend,
            } => {
                out.push(u_op(Opcode::Auipc, *rd, 0)?);
                let second = match kind {
                    RelocKind::PcRelLoad => Opcode::Ld,
                    _ => Opcode::Addi,
                };
                out.push(i_op(second, *rd, *rd, 0)?);
                self.relocations.push(Relocation {
                    offset: pc,
                    target: target.clone(),
                    kind: *kind,
                    addend: *addend,
                });
            }
        }
        Ok(out)
    }

    fn pool_split(&self, pool_off: u32, pc: u32) -> Result<(i64, i64)> {
        let dst = i64::from(self.data_offset) + i64::from(pool_off);
        split_pcrel(dst - i64::from(pc))
    }

    fn target(&self, jump: &JumpDesc) -> Result<i64> {
        let resolved = jump.resolved.ok_or(match jump.target {
            JumpTarget::Label(label) => EmitError::UnresolvedTarget { label },
            JumpTarget::Relative(count) => EmitError::RelativeTargetOutOfGroup {
                group: jump.group,
                index: jump.instr - self.layout.groups()[jump.group.index()].first,
                count,
            },
        })?;
        let offset = match resolved {
            Resolved::Group(g) => self.layout.groups()[g.index()].offset,
            Resolved::InGroup(k) => {
                let group = &self.layout.groups()[jump.group.index()];
                if k == group.len {
                    group.end()
                } else {
                    self.offsets[group.first + k]
                }
            }
        };
        Ok(i64::from(offset))
    }

    fn jump(&self, jump: &JumpDesc, pc: u32, out: &mut InstrWords) -> Result<()> {
        let dst = self.target(jump)?;
        let pc = i64::from(pc);
        match (jump.kind, jump.state) {
            (JumpKind::Cond { op, rs1, rs2 }, JumpState::ShortUnbound | JumpState::ShortBound) => {
                out.push(b_op(op, rs1, rs2, dst - pc)?);
            }
            (JumpKind::Cond { op, rs1, rs2 }, JumpState::Long(form)) => {
                let inv = op
                    .inverted()
                    .ok_or_else(|| EmitError::invalid(op, "not a conditional branch"))?;
                match form {
                    LongForm::Near => {
                        out.push(b_op(inv, rs1, rs2, 8)?);
                        out.push(j_op(Opcode::Jal, ZERO, dst - (pc + 4))?);
                    }
                    LongForm::Far => {
                        out.push(b_op(inv, rs1, rs2, 12)?);
                        out.extend_from_slice(&auipc_jalr(
                            ZERO,
                            self.config.long_jump_scratch,
                            dst - (pc + 4),
                        )?);
                    }
                }
            }
            (JumpKind::Jal { rd }, JumpState::Long(_)) => {
                let scratch = if rd.is_zero() {
                    self.config.long_jump_scratch
                } else {
                    rd
                };
                out.extend_from_slice(&auipc_jalr(rd, scratch, dst - pc)?);
            }
            (JumpKind::Jal { rd }, _) => out.push(j_op(Opcode::Jal, rd, dst - pc)?),
        }
        Ok(())
    }

    fn call(&mut self, call: &CallKind, pc: u32, out: &mut InstrWords) -> Result<()> {
        let jalr = |link: Reg, base: Reg, offset: i64| i_op(Opcode::Jalr, link, base, offset);
        match call {
            CallKind::Indirect { link, base, offset } => out.push(jalr(*link, *base, *offset)?),
            CallKind::Reloc {
                link,
                scratch,
                target,
                addend,
            } => {
                out.push(u_op(Opcode::Auipc, *scratch, 0)?);
                out.push(jalr(*link, *scratch, 0)?);
                self.relocations.push(Relocation {
                    offset: pc,
                    target: target.clone(),
                    kind: RelocKind::PcRelCall,
                    addend: *addend,
                });
            }
            CallKind::Absolute { link, scratch, seq } => {
                seq.encode_into(*scratch, out)?;
                out.push(jalr(*link, *scratch, 0)?);
            }
            CallKind::Pooled {
                link,
                scratch,
                pool_off,
            } => {
                let (hi, lo) = self.pool_split(*pool_off, pc)?;
                out.push(u_op(Opcode::Auipc, *scratch, hi)?);
                out.push(i_op(Opcode::Ld, *scratch, *scratch, lo)?);
                out.push(jalr(*link, *scratch, 0)?);
            }
        }
        Ok(())
    }
}
