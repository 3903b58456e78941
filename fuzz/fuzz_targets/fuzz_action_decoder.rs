//! Fuzz target: server action decoding.
//!
//! The action endpoint body comes straight off the network, so the
//! decoder must be total over arbitrary JSON: any input either decodes
//! to a fully populated action or returns a decode error, never panics
//! and never yields a half-built pump command.
//!
//! cargo fuzz run fuzz_action_decoder

#![no_main]

use autobar::protocol::action::{decode_action, DeviceAction};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return;
    };

    match decode_action(&value) {
        Ok(DeviceAction::Pump(cmd)) => {
            let _ = cmd.remaining();
        }
        Ok(_) | Err(_) => {}
    }
});
