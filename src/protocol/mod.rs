//! Device ↔ server JSON protocol: retrying transport, action decoding and
//! the typed protocol client.

pub mod action;
pub mod client;
pub mod transport;
