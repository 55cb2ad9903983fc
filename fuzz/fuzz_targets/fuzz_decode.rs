#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use modbus_poller::{decode, DecodeFailure, Encoding};

#[derive(Debug, Arbitrary)]
struct Input {
    tag: String,
    registers: Vec<u16>,
    length: u16,
    multiplier: f64,
}

fuzz_target!(|input: Input| {
    let encoding = Encoding::parse(&input.tag);
    match decode(&input.registers, &encoding, input.length, input.multiplier) {
        Ok(_) => {}
        Err(DecodeFailure::UnsupportedFormat { .. }) => {}
        Err(DecodeFailure::Truncated {
            needed_bits,
            available_bits,
            ..
        }) => assert!(available_bits < needed_bits || needed_bits == 0),
    }
});
