#![no_main]
use libfuzzer_sys::fuzz_target;

use rvemit::encoder::InstrWords;
use rvemit::reg::A0;
use rvemit::sim::eval_straight_line;
use rvemit::{plan, synthesize, LoadImmLimits, Plan};

fuzz_target!(|data: &[u8]| {
    if data.len() < 9 {
        return;
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[..8]);
    let value = i64::from_le_bytes(raw);
    let srli_min_span = u32::from(data[8] % 65);

    let seq = synthesize(value, srli_min_span);
    assert!(seq.len() <= 8, "{value:#x}: {seq:?}");
    assert_eq!(seq.value(), value, "{value:#x}: {seq:?}");

    let mut words = InstrWords::new();
    seq.encode_into(A0, &mut words).unwrap();
    let got = eval_straight_line(&words, A0.num(), u64::MAX).unwrap();
    assert_eq!(got, value as u64, "{value:#x}: {seq:?}");

    let limits = LoadImmLimits::default();
    if let Ok(Plan::Inline(inline)) = plan(value, &limits, true) {
        assert!(inline.len() <= limits.preferred_max);
    }
    assert!(plan(value, &limits, false).is_ok());
});
