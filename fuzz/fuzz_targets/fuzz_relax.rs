#![no_main]
use libfuzzer_sys::fuzz_target;

use rvemit::reg::{A0, A1, T0};
use rvemit::{EmitSession, Opcode};

// Each input byte pair is one jump: the first byte picks the label and the
// jump kind, the second the filler that follows it (in 64-byte units). Labels
// are bound at every eighth jump.
fuzz_target!(|data: &[u8]| {
    let mut s = EmitSession::default();
    let labels: Vec<_> = (0..16).map(|_| s.new_label()).collect();
    let mut bound = 0;

    for (i, pair) in data.chunks_exact(2).take(512).enumerate() {
        if i % 8 == 0 && bound < labels.len() {
            s.bind_label(labels[bound]).unwrap();
            bound += 1;
        }
        let target = labels[usize::from(pair[0] & 15)];
        let id = if pair[0] & 0x80 != 0 {
            s.emit_jump(target).unwrap()
        } else {
            s.emit_branch(Opcode::Beq, A0, A1, target).unwrap()
        };
        if pair[0] & 0x40 != 0 {
            s.keep_long(id);
        }
        for _ in 0..u32::from(pair[1]) * 16 {
            s.emit_i(Opcode::Addi, T0, T0, 1).unwrap();
        }
    }
    while bound < labels.len() {
        s.bind_label(labels[bound]).unwrap();
        bound += 1;
    }

    let before = s.code_size();
    let stats = s.relax().unwrap();
    assert!(stats.code_size >= before);
    let again = s.relax().unwrap();
    assert_eq!(again.upgrades, 0);
    assert_eq!(again.code_size, stats.code_size);
    s.finish().unwrap();
});
