//! Application layer: port traits, the typed device store and the
//! top-level phase orchestrator.

pub mod orchestrator;
pub mod ports;
pub mod store;
