//! Fuzz target: captive-portal form parsing.
//!
//! The portal's POST body is attacker-reachable (the softAP is open), so
//! urlencoded parsing and percent-decoding must hold up against any byte
//! soup a client throws at it.
//!
//! cargo fuzz run fuzz_portal_form

#![no_main]

use autobar::adapters::portal::parse_form;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(body) = core::str::from_utf8(data) else {
        return;
    };

    if let Some(submission) = parse_form(body) {
        // Required fields are non-empty whenever parsing succeeds.
        assert!(!submission.ssid.is_empty());
        assert!(!submission.server_url.is_empty());
        assert!(!submission.api_token.is_empty());
    }
});
