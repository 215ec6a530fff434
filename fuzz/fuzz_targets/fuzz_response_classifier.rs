//! Fuzz target: `classify`
//!
//! The first three bytes pick the request (address, function code, decoding
//! flags); the rest is the reply as it would sit in the RX buffer.  The
//! classifier must return a typed outcome for every input.
//!
//! cargo fuzz run fuzz_response_classifier

#![no_main]

use libfuzzer_sys::fuzz_target;
use modbus_bridge::config::{Endianness, RegisterOrder};
use modbus_bridge::modbus::{Decoding, Reading, RequestContext, classify};
use modbus_bridge::rx::RX_CAPACITY;

fuzz_target!(|data: &[u8]| {
    let [address, function, flags, rx @ ..] = data else {
        return;
    };
    let rx = &rx[..rx.len().min(RX_CAPACITY)];
    let req = RequestContext {
        device_index: 0,
        address: *address,
        function: *function,
        decoding: Decoding {
            combine: flags & 0x01 != 0,
            register_order: if flags & 0x02 != 0 {
                RegisterOrder::HighLow
            } else {
                RegisterOrder::LowHigh
            },
            endianness: if flags & 0x04 != 0 {
                Endianness::Little
            } else {
                Endianness::Big
            },
        },
    };

    if let Ok(reading) = classify(rx, &req) {
        // Only validated replies are decoded.
        assert_eq!(rx[0], *address);
        if let Reading::Diagnostic { function_code, .. } = reading {
            assert_eq!(function_code, *function);
        }
    }
});
