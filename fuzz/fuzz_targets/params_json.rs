//! Fuzz target for building parameter bags from JSON.
//!
//! Arbitrary bytes are parsed as JSON and converted; conversion must never
//! panic, whatever shape the document has.

#![no_main]

use libfuzzer_sys::fuzz_target;
use satchel_core::{ParamBag, ParamClassifier};

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        if let Ok(mut bag) = ParamBag::from_json(value) {
            let _ = ParamClassifier::default().classify(&mut bag);
        }
    }
});
