#![no_main]

use libfuzzer_sys::fuzz_target;
use xdf2bids::bids::bids_label;
use xdf2bids::segment::{parse_marker, MarkerEvent};

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };

    // Marker text comes straight from recording software; parsing must never panic
    let parsed = parse_marker(raw);
    if let Some(duration) = parsed.duration {
        assert!(duration.is_finite());
    }

    let event = MarkerEvent::from_marker(0.0, raw);
    assert_eq!(event.value, raw);
    if let Some(task) = event.field("task") {
        assert!(bids_label(task).chars().all(|c| c.is_ascii_alphanumeric()));
    }
});
