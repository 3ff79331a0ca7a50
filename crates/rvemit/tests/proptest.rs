#![cfg(not(target_arch = "wasm32"))]
//! Property-based tests using proptest.
//!
//! These cover the encoder, the materializer and the relaxation engine over
//! randomly generated inputs, complementing the targeted unit tests and the
//! libfuzzer targets.

use proptest::prelude::*;
use rvemit::decode;
use rvemit::encoder::InstrWords;
use rvemit::format::{b_op, i_op, j_op, s_op, u_op};
use rvemit::reg::*;
use rvemit::sim::eval_straight_line;
use rvemit::{synthesize, EmitSession, EmittedCode, JumpState, LabelId, LongForm, Opcode};

// ── Strategies ──────────────────────────────────────────────────────────

fn any_xreg() -> impl Strategy<Value = Reg> {
    (0u8..32).prop_map(Reg::x)
}

/// One jump of a generated function: the filler that follows it, the label
/// it targets, and whether it is an unconditional jump.
#[derive(Debug, Clone)]
struct Item {
    fill: u32,
    label: usize,
    jal: bool,
}

const LABELS: usize = 8;

fn item() -> impl Strategy<Value = Item> {
    (0u32..600, 0..LABELS, prop::bool::weighted(0.25)).prop_map(|(fill, label, jal)| Item {
        fill,
        label,
        jal,
    })
}

/// A function body plus the item index each label is bound before.
fn function() -> impl Strategy<Value = (Vec<Item>, Vec<usize>)> {
    prop::collection::vec(item(), 1..24).prop_flat_map(|items| {
        let n = items.len();
        (Just(items), prop::collection::vec(0..=n, LABELS))
    })
}

fn build(items: &[Item], binds: &[usize]) -> (EmitSession, Vec<LabelId>) {
    let mut s = EmitSession::default();
    let labels: Vec<LabelId> = (0..LABELS).map(|_| s.new_label()).collect();
    for at in 0..=items.len() {
        for (l, &pos) in binds.iter().enumerate() {
            if pos == at {
                s.bind_label(labels[l]).unwrap();
            }
        }
        if let Some(item) = items.get(at) {
            let target = labels[item.label];
            if item.jal {
                s.emit_jump(target).unwrap();
            } else {
                s.emit_branch(Opcode::Bne, A0, A1, target).unwrap();
            }
            for _ in 0..item.fill {
                s.emit_i(Opcode::Addi, T0, T0, 1).unwrap();
            }
        }
    }
    (s, labels)
}

/// Where a generated jump goes.
#[derive(Debug, Clone, Copy)]
enum Dest {
    Label(usize),
    /// Instruction count from the instruction after the branch, always inside
    /// the branch's own filler.
    Rel(i32),
}

/// One jump of a function that may exceed the near range.
#[derive(Debug, Clone)]
struct Wide {
    dest: Dest,
    jal: bool,
    keep_long: bool,
    fill: u32,
}

/// Filler instructions that push a target past the 1 MiB `jal` range.
const HUGE_FILL: u32 = 270_000;

fn wide() -> impl Strategy<Value = Wide> {
    let fill = prop_oneof![8 => 0u32..400, 1 => Just(HUGE_FILL)];
    (fill, 0..LABELS, any::<prop::sample::Index>(), 0u8..4, prop::bool::weighted(0.15))
        .prop_map(|(fill, label, rel, shape, keep_long)| {
            let dest = if shape == 0 {
                Dest::Rel(rel.index(fill as usize + 2) as i32 - 1)
            } else {
                Dest::Label(label)
            };
            Wide {
                dest,
                jal: shape == 1,
                keep_long,
                fill,
            }
        })
}

fn wide_function() -> impl Strategy<Value = (Vec<Wide>, Vec<usize>)> {
    prop::collection::vec(wide(), 1..10).prop_flat_map(|items| {
        let n = items.len();
        (Just(items), prop::collection::vec(0..=n, LABELS))
    })
}

fn build_wide(items: &[Wide], binds: &[usize]) -> (EmitSession, Vec<LabelId>) {
    let mut s = EmitSession::default();
    let labels: Vec<LabelId> = (0..LABELS).map(|_| s.new_label()).collect();
    for at in 0..=items.len() {
        for (l, &pos) in binds.iter().enumerate() {
            if pos == at {
                s.bind_label(labels[l]).unwrap();
            }
        }
        if let Some(item) = items.get(at) {
            let id = match item.dest {
                Dest::Rel(count) => s.emit_branch_rel(Opcode::Bne, A0, A1, count).unwrap(),
                Dest::Label(l) if item.jal => s.emit_jump(labels[l]).unwrap(),
                Dest::Label(l) => s.emit_branch(Opcode::Bne, A0, A1, labels[l]).unwrap(),
            };
            if item.keep_long {
                s.keep_long(id);
            }
            for _ in 0..item.fill {
                s.emit_i(Opcode::Addi, T0, T0, 1).unwrap();
            }
        }
    }
    (s, labels)
}

/// Decode the jump at `pc` and return the offset it transfers control to.
fn landing(out: &EmittedCode, pc: u32, state: JumpState, cond: bool) -> Option<i64> {
    let word = |at: u32| out.word_at(at);
    let base = i64::from(pc);
    Some(match (state, cond) {
        (JumpState::Long(LongForm::Near), true) => {
            if word(pc)? != b_op(Opcode::Beq, A0, A1, 8).ok()? {
                return None;
            }
            base + 4 + decode::imm_j(word(pc + 4)?)
        }
        (JumpState::Long(LongForm::Far), true) => {
            if word(pc)? != b_op(Opcode::Beq, A0, A1, 12).ok()? {
                return None;
            }
            base + 4 + (decode::imm_u(word(pc + 4)?) << 12) + decode::imm_i(word(pc + 8)?)
        }
        (JumpState::Long(LongForm::Far), false) => {
            base + (decode::imm_u(word(pc)?) << 12) + decode::imm_i(word(pc + 4)?)
        }
        (JumpState::Long(LongForm::Near), false) => return None,
        (_, true) => base + decode::imm_b(word(pc)?),
        (_, false) => base + decode::imm_j(word(pc)?),
    })
}

// ── Format encoders ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn i_type_immediate_round_trips(rd in any_xreg(), rs1 in any_xreg(), imm in -2048i64..2048) {
        let w = i_op(Opcode::Addi, rd, rs1, imm).unwrap();
        prop_assert_eq!(decode::imm_i(w), imm);
        prop_assert_eq!(decode::rd(w), rd.num());
        prop_assert_eq!(decode::rs1(w), rs1.num());
    }

    #[test]
    fn s_type_immediate_round_trips(rs2 in any_xreg(), rs1 in any_xreg(), imm in -2048i64..2048) {
        let w = s_op(Opcode::Sd, rs2, rs1, imm).unwrap();
        prop_assert_eq!(decode::imm_s(w), imm);
        prop_assert_eq!(decode::rs2(w), rs2.num());
    }

    #[test]
    fn b_type_offset_round_trips(half in -2048i64..2048) {
        let w = b_op(Opcode::Blt, A0, A1, half * 2).unwrap();
        prop_assert_eq!(decode::imm_b(w), half * 2);
    }

    #[test]
    fn j_type_offset_round_trips(half in -(1i64 << 19)..(1i64 << 19)) {
        let w = j_op(Opcode::Jal, RA, half * 2).unwrap();
        prop_assert_eq!(decode::imm_j(w), half * 2);
    }

    #[test]
    fn u_type_immediate_round_trips(imm in -(1i64 << 19)..(1i64 << 19)) {
        let w = u_op(Opcode::Lui, A0, imm).unwrap();
        prop_assert_eq!(decode::imm_u(w), imm);
    }

    #[test]
    fn out_of_range_immediates_are_rejected(imm in prop_oneof![i64::MIN..-2048, 2048..i64::MAX]) {
        prop_assert!(i_op(Opcode::Addi, A0, A0, imm).is_err());
    }

    #[test]
    fn odd_branch_offsets_are_rejected(half in -2048i64..2047) {
        prop_assert!(b_op(Opcode::Beq, A0, A1, half * 2 + 1).is_err());
    }
}

// ── Materializer ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn materialized_value_is_exact(value in any::<i64>(), garbage in any::<u64>()) {
        let seq = synthesize(value, 32);
        prop_assert!(seq.len() <= 8);
        prop_assert_eq!(seq.value(), value);
        let mut words = InstrWords::new();
        seq.encode_into(A0, &mut words).unwrap();
        prop_assert_eq!(eval_straight_line(&words, A0.num(), garbage).unwrap(), value as u64);
    }

    #[test]
    fn thirty_two_bit_values_take_two(value in any::<i32>()) {
        prop_assert!(synthesize(i64::from(value), 32).len() <= 2);
    }

    #[test]
    fn shifted_small_values_take_two(imm in -2048i64..2048, shift in 0u32..52) {
        let value = imm << shift;
        prop_assert!(synthesize(value, 32).len() <= 2, "{:#x}", value);
    }
}

// ── Relaxation ──────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn relaxation_terminates_within_bound((items, binds) in function()) {
        let (mut s, _) = build(&items, &binds);
        let stats = s.relax().unwrap();
        prop_assert!(stats.passes <= items.len() + 1, "{} passes for {} jumps", stats.passes, items.len());
        prop_assert_eq!(stats.far, 0);
    }

    #[test]
    fn jumps_never_shrink((items, binds) in function()) {
        let (mut s, _) = build(&items, &binds);
        let before = s.code_size();
        let stats = s.relax().unwrap();
        prop_assert!(stats.code_size >= before);
        let long = s.layout().jumps().iter().filter(|j| j.is_long()).count();
        prop_assert_eq!(long, stats.upgrades);
    }

    #[test]
    fn relaxation_is_idempotent((items, binds) in function()) {
        let (mut s, _) = build(&items, &binds);
        let first = s.relax().unwrap();
        let again = s.relax().unwrap();
        prop_assert_eq!(again.upgrades, 0);
        prop_assert_eq!(again.code_size, first.code_size);
    }

    #[test]
    fn encoded_distances_hit_targets((items, binds) in function()) {
        let (mut s, labels) = build(&items, &binds);
        s.relax().unwrap();
        let offsets = s.layout().instr_offsets();
        let jumps: Vec<_> = s
            .layout()
            .jumps()
            .iter()
            .map(|j| (offsets[j.instr], j.state, j.is_conditional()))
            .collect();
        let out = s.finish().unwrap();

        for ((pc, state, cond), item) in jumps.into_iter().zip(&items) {
            let target = i64::from(out.label_offset(labels[item.label]).unwrap());
            let pc = i64::from(pc);
            match state {
                JumpState::Long(LongForm::Near) => {
                    prop_assert!(cond);
                    let w = out.word_at(pc as u32 + 4).unwrap();
                    prop_assert_eq!(pc + 4 + decode::imm_j(w), target);
                }
                JumpState::Long(LongForm::Far) => prop_assert!(false, "unexpected far jump"),
                _ if cond => {
                    let w = out.word_at(pc as u32).unwrap();
                    prop_assert_eq!(pc + decode::imm_b(w), target);
                }
                _ => {
                    let w = out.word_at(pc as u32).unwrap();
                    prop_assert_eq!(pc + decode::imm_j(w), target);
                }
            }
        }
    }
}

// ── Relaxation with far forms and in-group targets ──────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn far_and_relative_jumps_land_on_targets((items, binds) in wide_function()) {
        let (mut s, labels) = build_wide(&items, &binds);
        let stats = s.relax().unwrap();
        let passes_bound = 2 * items.len() + 1;
        prop_assert!(stats.passes <= passes_bound, "{} passes for {} jumps", stats.passes, items.len());

        let offsets = s.layout().instr_offsets();
        let mut expected = Vec::with_capacity(items.len());
        for (j, item) in s.layout().jumps().iter().zip(&items) {
            if item.keep_long {
                prop_assert_eq!(j.state, JumpState::Long(LongForm::Far));
            }
            let dst = match item.dest {
                Dest::Label(_) => None,
                Dest::Rel(count) => {
                    let g = &s.layout().groups()[j.group.index()];
                    let at = (j.instr - g.first) as i64 + 1 + i64::from(count);
                    prop_assert!(at >= 0 && at as usize <= g.len);
                    let at = at as usize;
                    Some(if at == g.len { g.end() } else { offsets[g.first + at] })
                }
            };
            expected.push((offsets[j.instr], j.state, j.is_conditional(), dst));
        }

        let again = s.relax().unwrap();
        prop_assert_eq!(again.upgrades, 0);
        prop_assert_eq!(again.code_size, stats.code_size);

        let out = s.finish().unwrap();
        for ((pc, state, cond, dst), item) in expected.into_iter().zip(&items) {
            let target = match (dst, item.dest) {
                (Some(dst), _) => dst,
                (None, Dest::Label(l)) => out.label_offset(labels[l]).unwrap(),
                (None, Dest::Rel(_)) => unreachable!(),
            };
            let got = landing(&out, pc, state, cond);
            prop_assert_eq!(got, Some(i64::from(target)), "{:?} at {:#x}", state, pc);
        }
    }
}
