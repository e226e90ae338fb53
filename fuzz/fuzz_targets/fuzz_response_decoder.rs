//! Fuzz target: `ResponseDecoder::feed`
//!
//! Drives arbitrary byte sequences into the streaming Modbus response
//! decoder, split at a fuzzer-chosen point, and asserts that it never
//! panics and never yields more registers than one read can carry.
//!
//! cargo fuzz run fuzz_response_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use thermoloop::instrument::modbus::{
    FC_READ_HOLDING, FC_WRITE_MULTIPLE, Response, ResponseDecoder,
};

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let function = if selector & 1 == 0 {
        FC_READ_HOLDING
    } else {
        FC_WRITE_MULTIPLE
    };
    let split = usize::from(selector >> 1).min(rest.len());

    let mut decoder = ResponseDecoder::new(1, function);
    for piece in [&rest[..split], &rest[split..]] {
        if let Some(Ok(Response::ReadHolding(regs))) = decoder.feed(piece) {
            assert!(!regs.is_empty() && regs.len() <= 125, "bad register count");
        }
    }

    // After a reset the decoder must accept bytes cleanly again.
    decoder.reset();
    let _ = decoder.feed(rest);
});
