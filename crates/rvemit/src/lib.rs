//! # rvemit — RV64 code emission core
//!
//! `rvemit` is the machine-code layer of a compiler back end targeting
//! 64-bit RISC-V. It turns a stream of already register-allocated
//! instructions into position-independent code bytes, a trailing data pool,
//! and linker relocations.
//!
//! ## Quick Start
//!
//! ```rust
//! use rvemit::{EmitSession, Opcode, reg::{A0, A1, RA, ZERO}};
//!
//! let mut s = EmitSession::default();
//! let exit = s.new_label();
//! s.emit_branch(Opcode::Bge, A0, A1, exit).unwrap();
//! s.emit_load_imm(A0, 1 << 32).unwrap();
//! s.bind_label(exit).unwrap();
//! s.emit_i(Opcode::Jalr, ZERO, RA, 0).unwrap();
//!
//! let out = s.finish().unwrap();
//! assert_eq!(out.code.len(), 16);
//! ```
//!
//! ## Features
//!
//! - **Format encoders** — R, I, S, B, U and J words with exact field-width
//!   checks.
//! - **Constant materialization** — shortest `lui`/`addiw`/`slli`/`addi`/`srli`
//!   sequence for any 64-bit value, with a data-pool fallback.
//! - **Branch relaxation** — short, near and far jump forms chosen by a
//!   monotone fixed-point pass over instruction groups.
//! - **`no_std` + `alloc`** — embeddable in JITs and firmware.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
// ── Pedantic lint policy ─────────────────────────────────────────────────
// Instruction encoding narrows and re-signs integers constantly (i64→u32
// immediates, u32→i64 offsets) and uses dense hex literals for opcode
// fields. The lints below are expected in this context.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_lossless,
    clippy::cast_possible_wrap,
    clippy::unreadable_literal,
    clippy::match_same_arms,
    clippy::redundant_closure_for_method_calls,
    clippy::wildcard_imports,
    clippy::enum_glob_use,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args,
    clippy::doc_markdown,
    clippy::similar_names,
    clippy::too_many_lines,
    clippy::single_match_else,
    clippy::manual_let_else,
    clippy::many_single_char_names,
    clippy::return_self_not_must_use,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

extern crate alloc;

/// The read-only data area placed after the code.
pub mod datapool;
/// Field extraction from encoded words.
pub mod decode;
/// Pending-instruction descriptors and jump states.
pub mod descriptor;
/// Word buffers and relocation records.
pub mod encoder;
/// Error types.
pub mod error;
/// Bit-exact instruction format encoders.
pub mod format;
/// Instruction groups, labels and the layout arena.
pub mod group;
/// Shortest-sequence 64-bit constant synthesis.
pub mod materialize;
/// The supported opcode subset.
pub mod opcode;
/// Physical registers.
pub mod reg;
/// Fixed-point branch relaxation.
pub mod relax;
/// Configuration and the per-function emission session.
pub mod session;
/// A tiny RV64 interpreter used to check emitted sequences.
pub mod sim;
/// Final byte output.
pub mod writer;

// Re-exports
pub use datapool::DataPool;
pub use descriptor::{JumpId, JumpState, LongForm};
pub use encoder::{RelocKind, RelocTarget, Relocation};
pub use error::{EmitError, Field, Result};
pub use group::{GroupId, LabelId};
pub use materialize::{plan, synthesize, LoadImmLimits, LoadImmSeq, Plan};
pub use opcode::{Format, Opcode};
pub use reg::{Reg, RegClass};
pub use relax::RelaxStats;
pub use session::{CallTarget, EmitConfig, EmitSession, MoveWidth, Region};
pub use writer::EmittedCode;
