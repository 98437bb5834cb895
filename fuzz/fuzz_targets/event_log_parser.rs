#![no_main]

use calltree::EventLog;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Any input either parses or yields an error, never a panic
        if let Ok(log) = EventLog::parse(input) {
            let mut out = Vec::new();
            log.write(&mut out).unwrap();
            let reparsed = EventLog::parse(std::str::from_utf8(&out).unwrap()).unwrap();
            assert_eq!(reparsed, log);
        }
    }
});
