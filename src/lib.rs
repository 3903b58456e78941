//! AutoBar — firmware for a networked beverage-dispensing appliance.
//!
//! The device joins WiFi, enrolls with its cloud controller, keeps its
//! firmware and scale calibration in sync with the server, and then polls
//! for dispensing actions: each `pump` action runs a weight-feedback dose
//! on a single pump GPIO, with the load cell closing the loop.
//!
//! Architecture is hexagonal: domain logic (`protocol`, `scale`, `pump`,
//! `app`) talks only to port traits; `adapters` provides the ESP-IDF
//! implementations plus host simulations, so everything above the ports
//! builds and tests on the host.

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod protocol;
pub mod pump;
pub mod scale;
