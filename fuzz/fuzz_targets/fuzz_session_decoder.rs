#![no_main]

use libfuzzer_sys::fuzz_target;
use xdf2bids::ingest::DecodedSession;

fuzz_target!(|data: &[u8]| {
    // Decoding either succeeds or fails gracefully; it must NEVER panic
    let Ok(session) = DecodedSession::from_reader(data) else {
        return;
    };

    // Contract checks index rows by timestamp position
    for stream in &session.streams {
        let _ = stream.validate_contract();
    }
});
