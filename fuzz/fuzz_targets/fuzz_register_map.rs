#![no_main]

use libfuzzer_sys::fuzz_target;
use modbus_poller::register_map::parse_register_map;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        for spec in parse_register_map(text) {
            assert!(spec.length > 0);
            assert!(spec.multiplier.is_finite());
        }
    }
});
