//! Platform adapters backing the port traits.
//!
//! Each adapter compiles for two targets: the real ESP-IDF implementation
//! under `target_os = "espidf"` and a simulation backend everywhere else,
//! so the whole crate builds and tests on the host.

pub mod http;
pub mod hx711;
pub mod nvs;
pub mod ota;
pub mod portal;
pub mod pump_pin;
pub mod time;
pub mod wifi;
