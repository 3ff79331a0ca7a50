//! The emission session: configuration, the front-end append interface and
//! the relax/write pipeline for one function.

use alloc::format;

use crate::datapool::DataPool;
use crate::descriptor::{CallKind, InstrDesc, InstrKind, JumpDesc, JumpId, JumpKind, JumpTarget};
use crate::encoder::{RelocKind, RelocTarget};
use crate::error::{EmitError, Result};
use crate::format::{b_op, i_op, j_op, r_op, s_op, u_op};
use crate::group::{GroupId, LabelId, Layout};
use crate::materialize::{plan, LoadImmLimits, Plan};
use crate::opcode::{Format, Opcode};
use crate::reg::{Reg, RegClass, RA, T2, T6, ZERO};
use crate::relax::{relax, RelaxStats};
use crate::writer::{write, EmittedCode};

// ── Configuration ───────────────────────────────────────────────────────

/// Tunables of a session.
///
/// # Examples
///
/// ```rust
/// use rvemit::EmitConfig;
///
/// let mut config = EmitConfig::default();
/// config.branch_growth_reserve(0).max_code_bytes(1 << 20);
/// assert_eq!(config.load_imm.preferred_max, 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EmitConfig {
    /// Constant-materialization ceilings.
    pub load_imm: LoadImmLimits,
    /// Bytes reserved per still-short jump between a forward jump and its
    /// target. Default: 8.
    pub branch_growth_reserve: u32,
    /// Functions up to this size skip range checks. Default: 0xFFF.
    pub small_function_bytes: u32,
    /// Largest function accepted. Default: 16 MiB.
    pub max_code_bytes: usize,
    /// Pass budget of relaxation. Default: `None`, meaning twice the number
    /// of jumps plus two.
    pub max_relax_passes: Option<usize>,
    /// Alignment of the data pool after the code. Default: 8.
    pub pool_align: u32,
    /// Scratch register of far jumps that do not link. Default: `ra`.
    pub long_jump_scratch: Reg,
    /// Scratch register of relocated, absolute and pooled calls. Default: `t2`.
    pub call_scratch: Reg,
    /// Address register of floating-point data-pool loads. Default: `t6`.
    pub reserved_scratch: Reg,
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            load_imm: LoadImmLimits::default(),
            branch_growth_reserve: 8,
            small_function_bytes: 0xFFF,
            max_code_bytes: 16 * 1024 * 1024,
            max_relax_passes: None,
            pool_align: 8,
            long_jump_scratch: RA,
            call_scratch: T2,
            reserved_scratch: T6,
        }
    }
}

impl EmitConfig {
    /// Set the materialization limits.
    pub fn load_imm(&mut self, limits: LoadImmLimits) -> &mut Self {
        self.load_imm = limits;
        self
    }

    /// Set the per-jump growth reserve; 0 disables the lookahead margin.
    pub fn branch_growth_reserve(&mut self, bytes: u32) -> &mut Self {
        self.branch_growth_reserve = bytes;
        self
    }

    /// Set the size below which range checks are skipped.
    pub fn small_function_bytes(&mut self, bytes: u32) -> &mut Self {
        self.small_function_bytes = bytes;
        self
    }

    /// Set the largest accepted function.
    pub fn max_code_bytes(&mut self, bytes: usize) -> &mut Self {
        self.max_code_bytes = bytes;
        self
    }

    /// Override the relaxation pass budget.
    pub fn max_relax_passes(&mut self, passes: Option<usize>) -> &mut Self {
        self.max_relax_passes = passes;
        self
    }

    /// Set the data-pool alignment.
    pub fn pool_align(&mut self, align: u32) -> &mut Self {
        self.pool_align = align;
        self
    }

    /// Set the scratch register of non-linking far jumps.
    pub fn long_jump_scratch(&mut self, reg: Reg) -> &mut Self {
        self.long_jump_scratch = reg;
        self
    }

    /// Set the call scratch register.
    pub fn call_scratch(&mut self, reg: Reg) -> &mut Self {
        self.call_scratch = reg;
        self
    }

    /// Set the floating-point pool-load address register.
    pub fn reserved_scratch(&mut self, reg: Reg) -> &mut Self {
        self.reserved_scratch = reg;
        self
    }
}

/// Which part of the function is being emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Region {
    /// Ordinary code; the data pool is reachable.
    #[default]
    Body,
    /// Prolog; no data-pool access.
    Prolog,
    /// Epilog; no data-pool access.
    Epilog,
}

/// Operand width of [`EmitSession::emit_mov`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MoveWidth {
    /// 32-bit: `addiw`, `fsgnj.s`, `fmv.x.w`, `fmv.w.x`.
    W32,
    /// 64-bit: `addi`, `fsgnj.d`, `fmv.x.d`, `fmv.d.x`.
    W64,
}

/// Callee of [`EmitSession::emit_call`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    /// `jalr link, offset(base)`.
    Register {
        /// Register holding the callee.
        base: Reg,
        /// Signed 12-bit displacement.
        offset: i64,
    },
    /// A callee the linker resolves.
    Reloc {
        /// Symbol or loader address.
        target: RelocTarget,
        /// Constant added to the callee.
        addend: i64,
    },
    /// A callee at a known absolute address.
    Absolute(u64),
}

// ── Session ─────────────────────────────────────────────────────────────

/// Per-function emission context.
///
/// # Examples
///
/// ```rust
/// use rvemit::{EmitSession, Opcode, reg::{A0, A1}};
///
/// let mut s = EmitSession::default();
/// let done = s.new_label();
/// s.emit_branch(Opcode::Beq, A0, A1, done).unwrap();
/// s.emit_load_imm(A0, 0x1_0000_0000).unwrap();
/// s.bind_label(done).unwrap();
/// let out = s.finish().unwrap();
/// assert_eq!(out.code.len(), 12);
/// ```
#[derive(Debug, Clone)]
pub struct EmitSession {
    config: EmitConfig,
    layout: Layout,
    pool: DataPool,
    region: Region,
}

impl Default for EmitSession {
    fn default() -> Self {
        Self::new(EmitConfig::default())
    }
}

fn class_name(class: RegClass) -> &'static str {
    match class {
        RegClass::Int => "an integer",
        RegClass::Float => "a floating-point",
    }
}

fn require(op: Opcode, slot: &str, reg: Reg, class: RegClass) -> Result<()> {
    if reg.class() != class {
        return Err(EmitError::invalid(
            op,
            format!("{slot} {reg} must be {} register", class_name(class)),
        ));
    }
    Ok(())
}

fn require_format(op: Opcode, format: Format) -> Result<()> {
    if op.format() != format {
        return Err(EmitError::FormatMismatch {
            op,
            expected: format,
            actual: op.format(),
        });
    }
    Ok(())
}

/// Access width of a load opcode.
fn load_width(op: Opcode) -> Option<usize> {
    match op {
        Opcode::Lb | Opcode::Lbu => Some(1),
        Opcode::Lh | Opcode::Lhu => Some(2),
        Opcode::Lw | Opcode::Lwu | Opcode::Flw => Some(4),
        Opcode::Ld | Opcode::Fld => Some(8),
        _ => None,
    }
}

impl EmitSession {
    /// A session with one empty group.
    pub fn new(config: EmitConfig) -> Self {
        Self {
            config,
            layout: Layout::new(),
            pool: DataPool::new(),
            region: Region::Body,
        }
    }

    /// The configuration.
    pub fn config(&self) -> &EmitConfig {
        &self.config
    }

    /// The current layout.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The data pool.
    pub fn pool(&self) -> &DataPool {
        &self.pool
    }

    /// Current code size in bytes.
    pub fn code_size(&self) -> u32 {
        self.layout.code_size()
    }

    /// A jump descriptor by id.
    pub fn jump(&self, id: JumpId) -> Option<&JumpDesc> {
        self.layout.jumps.get(id.index())
    }

    // ── Groups and labels ───────────────────────────────────

    /// Create an unbound label.
    pub fn new_label(&mut self) -> LabelId {
        let id = LabelId::new(self.layout.labels.len() as u32);
        self.layout.labels.push(None);
        id
    }

    /// Bind `label` to the start of a group, reusing the current group if it
    /// is still empty.
    pub fn bind_label(&mut self, label: LabelId) -> Result<GroupId> {
        match self.layout.labels.get(label.index()) {
            None => return Err(EmitError::UnresolvedTarget { label }),
            Some(Some(group)) => {
                return Err(EmitError::DuplicateLabel {
                    label,
                    group: *group,
                })
            }
            Some(None) => {}
        }
        let mut group = self.layout.current();
        if self.layout.groups[group.index()].len != 0 {
            group = self.layout.open_group();
        }
        self.layout.groups[group.index()].is_target = true;
        self.layout.labels[label.index()] = Some(group);
        Ok(group)
    }

    /// Start a new group.
    pub fn new_group(&mut self) -> GroupId {
        self.layout.open_group()
    }

    /// Switch between body and prolog/epilog emission.
    pub fn set_region(&mut self, region: Region) {
        self.region = region;
    }

    /// The current region.
    pub fn region(&self) -> Region {
        self.region
    }

    fn push(&mut self, kind: InstrKind) -> Result<usize> {
        let desc = InstrDesc::new(kind);
        let projected = self.layout.code_size() as usize + desc.size as usize;
        if projected > self.config.max_code_bytes {
            return Err(EmitError::ResourceLimitExceeded {
                resource: "code bytes".into(),
                limit: self.config.max_code_bytes,
            });
        }
        Ok(self.layout.push(desc))
    }

    // ── Plain instructions ──────────────────────────────────

    /// Append an R-type instruction.
    pub fn emit_r(&mut self, op: Opcode, rd: Reg, rs1: Reg, rs2: Reg) -> Result<()> {
        require_format(op, Format::R)?;
        let classes = op.operand_classes();
        require(op, "rd", rd, classes.rd)?;
        require(op, "rs1", rs1, classes.rs1)?;
        let rs2 = match op.fields().fixed_rs2 {
            Some(_) => ZERO,
            None => {
                require(op, "rs2", rs2, classes.rs2)?;
                rs2
            }
        };
        r_op(op, rd, rs1, rs2)?;
        self.push(InstrKind::R { op, rd, rs1, rs2 })?;
        Ok(())
    }

    /// Append an I-type instruction (ALU immediate, shift, load or `jalr`).
    pub fn emit_i(&mut self, op: Opcode, rd: Reg, rs1: Reg, imm: i64) -> Result<()> {
        require_format(op, Format::I)?;
        let classes = op.operand_classes();
        require(op, "rd", rd, classes.rd)?;
        require(op, "rs1", rs1, classes.rs1)?;
        i_op(op, rd, rs1, imm)?;
        self.push(InstrKind::I { op, rd, rs1, imm })?;
        Ok(())
    }

    /// Append a shift by a constant amount.
    pub fn emit_shift(&mut self, op: Opcode, rd: Reg, rs1: Reg, shamt: u32) -> Result<()> {
        if op.shift().is_none() {
            return Err(EmitError::invalid(op, "not a shift-immediate instruction"));
        }
        self.emit_i(op, rd, rs1, i64::from(shamt))
    }

    /// Append a store of `rs2` to `imm(rs1)`.
    pub fn emit_s(&mut self, op: Opcode, rs2: Reg, rs1: Reg, imm: i64) -> Result<()> {
        require_format(op, Format::S)?;
        let classes = op.operand_classes();
        require(op, "rs1", rs1, classes.rs1)?;
        require(op, "rs2", rs2, classes.rs2)?;
        s_op(op, rs2, rs1, imm)?;
        self.push(InstrKind::S { op, rs2, rs1, imm })?;
        Ok(())
    }

    /// Append `lui` or `auipc` with the signed 20-bit upper immediate.
    pub fn emit_u(&mut self, op: Opcode, rd: Reg, imm20: i64) -> Result<()> {
        require_format(op, Format::U)?;
        require(op, "rd", rd, RegClass::Int)?;
        u_op(op, rd, imm20)?;
        self.push(InstrKind::U { op, rd, imm: imm20 })?;
        Ok(())
    }

    /// Append a register move. The opcode depends on the register classes:
    /// `addi`/`addiw` between integer registers, `fsgnj` between float
    /// registers and `fmv` across classes.
    pub fn emit_mov(&mut self, rd: Reg, rs: Reg, width: MoveWidth) -> Result<()> {
        use MoveWidth::*;
        use RegClass::*;
        match (rd.class(), rs.class(), width) {
            (Int, Int, W64) => self.emit_i(Opcode::Addi, rd, rs, 0),
            (Int, Int, W32) => self.emit_i(Opcode::Addiw, rd, rs, 0),
            (Float, Float, W64) => self.emit_r(Opcode::FsgnjD, rd, rs, rs),
            (Float, Float, W32) => self.emit_r(Opcode::FsgnjS, rd, rs, rs),
            (Int, Float, W64) => self.emit_r(Opcode::FmvXD, rd, rs, ZERO),
            (Int, Float, W32) => self.emit_r(Opcode::FmvXW, rd, rs, ZERO),
            (Float, Int, W64) => self.emit_r(Opcode::FmvDX, rd, rs, ZERO),
            (Float, Int, W32) => self.emit_r(Opcode::FmvWX, rd, rs, ZERO),
        }
    }

    // ── Branches and jumps ──────────────────────────────────

    fn push_jump(&mut self, kind: JumpKind, target: JumpTarget) -> Result<JumpId> {
        let group = self.layout.current();
        let offs = self.layout.groups[group.index()].size;
        let id = JumpId::new(self.layout.jumps.len() as u32);
        let instr = self.push(InstrKind::Jump(id))?;
        self.layout
            .jumps
            .push(JumpDesc::new(kind, target, group, instr, offs));
        Ok(id)
    }

    fn check_branch(op: Opcode, rs1: Reg, rs2: Reg) -> Result<JumpKind> {
        require_format(op, Format::B)?;
        require(op, "rs1", rs1, RegClass::Int)?;
        require(op, "rs2", rs2, RegClass::Int)?;
        b_op(op, rs1, rs2, 0)?;
        Ok(JumpKind::Cond { op, rs1, rs2 })
    }

    /// Append a conditional branch to `label`.
    pub fn emit_branch(&mut self, op: Opcode, rs1: Reg, rs2: Reg, label: LabelId) -> Result<JumpId> {
        let kind = Self::check_branch(op, rs1, rs2)?;
        self.push_jump(kind, JumpTarget::Label(label))
    }

    /// Append a conditional branch over `count` instructions of the current
    /// group, counted from the instruction after the branch.
    pub fn emit_branch_rel(&mut self, op: Opcode, rs1: Reg, rs2: Reg, count: i32) -> Result<JumpId> {
        let kind = Self::check_branch(op, rs1, rs2)?;
        self.push_jump(kind, JumpTarget::Relative(count))
    }

    /// Append `jal rd, label`.
    pub fn emit_jal(&mut self, rd: Reg, label: LabelId) -> Result<JumpId> {
        require(Opcode::Jal, "rd", rd, RegClass::Int)?;
        j_op(Opcode::Jal, rd, 0)?;
        self.push_jump(JumpKind::Jal { rd }, JumpTarget::Label(label))
    }

    /// Append an unconditional jump to `label`.
    pub fn emit_jump(&mut self, label: LabelId) -> Result<JumpId> {
        self.emit_jal(ZERO, label)
    }

    /// Force the far form for a jump whose target is known to be distant.
    pub fn keep_long(&mut self, id: JumpId) {
        if let Some(jump) = self.layout.jumps.get_mut(id.index()) {
            jump.keep_long = true;
        }
    }

    // ── Constants, calls and addresses ──────────────────────

    /// Materialize `value` into `rd`, falling back to a data-pool load in the
    /// body when the sequence is too long.
    pub fn emit_load_imm(&mut self, rd: Reg, value: i64) -> Result<()> {
        require(Opcode::Addi, "rd", rd, RegClass::Int)?;
        if rd.is_zero() {
            return Err(EmitError::invalid(Opcode::Addi, "cannot load a constant into zero"));
        }
        match plan(value, &self.config.load_imm, self.region == Region::Body)? {
            Plan::Inline(seq) => {
                self.push(InstrKind::LoadImm { rd, seq })?;
            }
            Plan::Pool => {
                let pool_off = self.pool.push_u64(value as u64)?;
                self.push(InstrKind::DataLoad {
                    op: Opcode::Ld,
                    rd,
                    tmp: rd,
                    pool_off,
                })?;
            }
        }
        Ok(())
    }

    /// Append a call. `link` receives the return address; `zero` makes a
    /// tail call.
    pub fn emit_call(&mut self, link: Reg, target: CallTarget) -> Result<()> {
        require(Opcode::Jalr, "link", link, RegClass::Int)?;
        let scratch = self.config.call_scratch;
        let call = match target {
            CallTarget::Register { base, offset } => {
                require(Opcode::Jalr, "base", base, RegClass::Int)?;
                i_op(Opcode::Jalr, link, base, offset)?;
                CallKind::Indirect { link, base, offset }
            }
            CallTarget::Reloc { target, addend } => CallKind::Reloc {
                link,
                scratch,
                target,
                addend,
            },
            CallTarget::Absolute(addr) => {
                match plan(addr as i64, &self.config.load_imm, self.region == Region::Body)? {
                    Plan::Inline(seq) => CallKind::Absolute { link, scratch, seq },
                    Plan::Pool => CallKind::Pooled {
                        link,
                        scratch,
                        pool_off: self.pool.push_u64(addr)?,
                    },
                }
            }
        };
        self.push(InstrKind::Call(call))?;
        Ok(())
    }

    /// Load from the data pool at `pool_off` with a load opcode.
    pub fn emit_data_load(&mut self, op: Opcode, rd: Reg, pool_off: u32) -> Result<()> {
        let width = load_width(op).ok_or_else(|| EmitError::invalid(op, "not a load"))?;
        if self.region != Region::Body {
            return Err(EmitError::invalid(
                op,
                "the data pool is not reachable from prolog/epilog code",
            ));
        }
        let classes = op.operand_classes();
        require(op, "rd", rd, classes.rd)?;
        let tmp = if rd.is_float() {
            self.config.reserved_scratch
        } else if rd.is_zero() {
            return Err(EmitError::invalid(op, "pool load into zero"));
        } else {
            rd
        };
        if pool_off as usize + width > self.pool.len() {
            return Err(EmitError::DataOutOfBounds {
                offset: pool_off,
                len: width,
            });
        }
        self.push(InstrKind::DataLoad {
            op,
            rd,
            tmp,
            pool_off,
        })?;
        Ok(())
    }

    /// Load the address of `label` into `rd`.
    pub fn emit_label_addr(&mut self, rd: Reg, label: LabelId) -> Result<()> {
        require(Opcode::Auipc, "rd", rd, RegClass::Int)?;
        if label.index() >= self.layout.labels.len() {
            return Err(EmitError::UnresolvedTarget { label });
        }
        self.push(InstrKind::LabelAddr { rd, label })?;
        Ok(())
    }

    /// Load an address only known to the linker into `rd`.
    pub fn emit_addr_reloc(
        &mut self,
        rd: Reg,
        target: RelocTarget,
        kind: RelocKind,
        addend: i64,
    ) -> Result<()> {
        require(Opcode::Auipc, "rd", rd, RegClass::Int)?;
        if rd.is_zero() {
            return Err(EmitError::invalid(Opcode::Auipc, "address into zero"));
        }
        if kind == RelocKind::PcRelCall {
            return Err(EmitError::invalid(
                Opcode::Auipc,
                "call relocations are emitted by emit_call",
            ));
        }
        self.push(InstrKind::AddrReloc {
            rd,
            target,
            kind,
            addend,
        })?;
        Ok(())
    }

    // ── Data pool ───────────────────────────────────────────

    /// Reserve `len` zeroed bytes in the data pool.
    pub fn reserve_data(&mut self, len: usize, align: u32) -> Result<u32> {
        self.pool.reserve(len, align)
    }

    /// Fill previously reserved pool bytes.
    pub fn write_data(&mut self, offset: u32, bytes: &[u8]) -> Result<()> {
        self.pool.write(offset, bytes)
    }

    /// Store a deduplicated 8-byte constant in the pool.
    pub fn data_u64(&mut self, value: u64) -> Result<u32> {
        self.pool.push_u64(value)
    }

    // ── Pipeline ────────────────────────────────────────────

    /// Relax all jumps to a fixed point. Running it again without new
    /// descriptors performs no upgrades.
    pub fn relax(&mut self) -> Result<RelaxStats> {
        relax(&mut self.layout, &self.config)
    }

    /// Relax, then encode everything.
    pub fn finish(mut self) -> Result<EmittedCode> {
        let stats = self.relax()?;
        write(&self.layout, &self.pool, &self.config, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reg::*;

    #[test]
    fn bind_reuses_empty_group() {
        let mut s = EmitSession::default();
        let a = s.new_label();
        let b = s.new_label();
        assert_eq!(s.bind_label(a).unwrap(), GroupId::new(0));
        assert_eq!(s.bind_label(b).unwrap(), GroupId::new(0));
        s.emit_i(Opcode::Addi, A0, A0, 1).unwrap();
        let c = s.new_label();
        assert_eq!(s.bind_label(c).unwrap(), GroupId::new(1));
    }

    #[test]
    fn duplicate_label() {
        let mut s = EmitSession::default();
        let a = s.new_label();
        s.bind_label(a).unwrap();
        assert_eq!(
            s.bind_label(a).unwrap_err(),
            EmitError::DuplicateLabel {
                label: a,
                group: GroupId::new(0)
            }
        );
    }

    #[test]
    fn operand_shape_checked_on_append() {
        let mut s = EmitSession::default();
        assert!(matches!(
            s.emit_r(Opcode::Addi, A0, A0, A0),
            Err(EmitError::FormatMismatch { .. })
        ));
        assert!(matches!(
            s.emit_i(Opcode::Addi, A0, A0, 4096),
            Err(EmitError::FieldOverflow { .. })
        ));
        assert!(matches!(
            s.emit_r(Opcode::FaddD, A0, Reg::f(1), Reg::f(2)),
            Err(EmitError::InvalidOperand { .. })
        ));
        assert!(matches!(
            s.emit_shift(Opcode::Addi, A0, A0, 1),
            Err(EmitError::InvalidOperand { .. })
        ));
        assert_eq!(s.code_size(), 0);
    }

    #[test]
    fn moves_pick_opcode_by_class() {
        let mut s = EmitSession::default();
        s.emit_mov(A0, A1, MoveWidth::W64).unwrap();
        s.emit_mov(Reg::f(1), Reg::f(2), MoveWidth::W64).unwrap();
        s.emit_mov(A0, Reg::f(2), MoveWidth::W32).unwrap();
        s.emit_mov(Reg::f(3), A0, MoveWidth::W64).unwrap();
        let ops: alloc::vec::Vec<Opcode> = s
            .layout()
            .instrs()
            .iter()
            .map(|d| match d.kind {
                InstrKind::I { op, .. } | InstrKind::R { op, .. } => op,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(
            ops,
            [Opcode::Addi, Opcode::FsgnjD, Opcode::FmvXW, Opcode::FmvDX]
        );
    }

    #[test]
    fn load_imm_falls_back_to_pool_in_body_only() {
        let dense = 0x1234_5678_9ABC_DEF0;
        let mut s = EmitSession::default();
        s.emit_load_imm(A0, dense).unwrap();
        assert!(matches!(
            s.layout().instrs()[0].kind,
            InstrKind::DataLoad { op: Opcode::Ld, .. }
        ));
        assert_eq!(s.pool().len(), 8);

        s.set_region(Region::Prolog);
        s.emit_load_imm(A1, dense).unwrap();
        assert!(matches!(
            s.layout().instrs()[1].kind,
            InstrKind::LoadImm { .. }
        ));
    }

    #[test]
    fn data_loads_are_checked() {
        let mut s = EmitSession::default();
        let off = s.data_u64(7).unwrap();
        assert!(s.emit_data_load(Opcode::Ld, ZERO, off).is_err());
        assert!(s.emit_data_load(Opcode::Addi, A0, off).is_err());
        assert!(matches!(
            s.emit_data_load(Opcode::Ld, A0, off + 4),
            Err(EmitError::DataOutOfBounds { .. })
        ));
        s.emit_data_load(Opcode::Fld, Reg::f(0), off).unwrap();
        assert!(matches!(
            s.layout().instrs()[0].kind,
            InstrKind::DataLoad { tmp: T6, .. }
        ));
        s.set_region(Region::Epilog);
        assert!(s.emit_data_load(Opcode::Ld, A0, off).is_err());
    }

    #[test]
    fn code_size_limit() {
        let mut cfg = EmitConfig::default();
        cfg.max_code_bytes(8);
        let mut s = EmitSession::new(cfg);
        s.emit_i(Opcode::Addi, A0, A0, 1).unwrap();
        s.emit_i(Opcode::Addi, A0, A0, 1).unwrap();
        assert!(matches!(
            s.emit_i(Opcode::Addi, A0, A0, 1),
            Err(EmitError::ResourceLimitExceeded { limit: 8, .. })
        ));
        assert_eq!(s.layout().instrs().len(), 2);
        assert_eq!(s.code_size(), 8);
    }

    #[test]
    fn rejected_jump_leaves_no_descriptor() {
        let mut cfg = EmitConfig::default();
        cfg.max_code_bytes(8);
        let mut s = EmitSession::new(cfg);
        let l = s.new_label();
        s.bind_label(l).unwrap();
        s.emit_i(Opcode::Addi, A0, A0, 1).unwrap();
        let first = s.emit_jump(l).unwrap();
        assert!(s.emit_jump(l).is_err());
        assert!(s.emit_branch(Opcode::Beq, A0, A1, l).is_err());
        assert_eq!(s.layout().jumps().len(), 1);
        assert_eq!(s.layout().instrs().len(), 2);
        assert!(s.jump(JumpId::new(1)).is_none());
        assert!(s.jump(first).is_some());
        let out = s.finish().unwrap();
        assert_eq!(out.code.len(), 8);
    }

    #[test]
    fn absolute_call_shapes() {
        let mut s = EmitSession::default();
        s.emit_call(RA, CallTarget::Absolute(0x1000)).unwrap();
        s.emit_call(RA, CallTarget::Absolute(0x1234_5678_9ABC_DEF0))
            .unwrap();
        let sizes: alloc::vec::Vec<u32> = s.layout().instrs().iter().map(|d| d.size).collect();
        assert_eq!(sizes, [8, 12]);
        assert!(matches!(
            s.layout().instrs()[1].kind,
            InstrKind::Call(CallKind::Pooled { .. })
        ));
    }
}
