//! Integration test harness.
//!
//! Drives the public API of the firmware crate with mock ports; no real
//! hardware, network or sleeping anywhere.

#![cfg(not(target_os = "espidf"))]

mod dosing_tests;
mod mock_hw;
mod protocol_tests;
