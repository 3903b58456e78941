//! Port traits — the seams between domain logic and platform adapters.
//!
//! Everything the core needs from the outside world goes through one of
//! these traits.  On the device they are backed by ESP-IDF adapters; in
//! tests they are backed by mocks, which is what makes the dosing and
//! orchestration logic host-testable.

use crate::error::{OtaError, SampleError, StorageError};
use core::convert::Infallible;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Monotonic time and blocking delay.
///
/// Injected everywhere a timestamp or sleep is needed so retry pacing,
/// stall detection and re-verification deadlines are testable without
/// real waiting.
pub trait ClockPort {
    /// Milliseconds since boot.  Monotonic, never goes backwards.
    fn now_ms(&self) -> u64;

    /// Block the calling thread for `ms` milliseconds.
    fn sleep_ms(&self, ms: u32);
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Persistent namespaced key-value storage (NVS on the device).
pub trait StoragePort {
    /// Read a value into `buf`, returning the number of bytes read.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write (create or overwrite) a value.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Whether a key exists.
    fn exists(&self, namespace: &str, key: &str) -> bool;

    /// Delete a key.  Deleting a missing key is not an error.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// Network (WiFi station)
// ---------------------------------------------------------------------------

/// WiFi station-mode join.
pub trait NetworkPort {
    /// Connect to the given access point and wait for an IP address.
    /// Blocks up to ~30 s; `false` means no address was obtained.
    fn connect(&mut self, ssid: &str, password: &str) -> bool;
}

// ---------------------------------------------------------------------------
// OTA
// ---------------------------------------------------------------------------

/// Firmware upgrade collaborator.
pub trait OtaPort {
    /// Download the binary at `firmware_url`, flash it and reboot.
    /// `Ok` is unreachable: success restarts the device.
    fn upgrade(&mut self, firmware_url: &str) -> Result<Infallible, OtaError>;
}

// ---------------------------------------------------------------------------
// Load-cell ADC driver
// ---------------------------------------------------------------------------

/// Raw two-wire load-cell ADC (HX711-style).
pub trait ScaleDriverPort {
    /// Block until one raw sample is available, or until `timeout_ms`
    /// elapses without the converter signalling data-ready.
    fn read_sample(&mut self, timeout_ms: u32) -> Result<i32, SampleError>;

    /// Re-bind the driver to a new pin pair (server-issued calibration
    /// may move the ADC to different GPIOs).
    fn reinit(&mut self, signal_pin: u8, clock_pin: u8) -> Result<(), SampleError>;
}

// ---------------------------------------------------------------------------
// Pump output
// ---------------------------------------------------------------------------

/// Single-GPIO pump actuator.  Implementations must drive the output low
/// during initialization, before any dosing decision runs.
pub trait PumpPort {
    /// Drive the pump GPIO high.
    fn energize(&mut self, pin: u8);

    /// Drive the pump GPIO low.  Must be idempotent.
    fn release(&mut self, pin: u8);

    /// Whether the pump output is currently high.
    fn is_on(&self) -> bool;
}
