//! Device configuration values.
//!
//! Provisioning data (WiFi credentials, server URL, API token) lives in NVS
//! and is read through [`DeviceStore`](crate::app::store::DeviceStore); the
//! structs here are the typed views the core works with.

use serde::{Deserialize, Serialize};

/// Firmware version reported to the server during verification and compared
/// against the update manifest (exact string equality).
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Load-cell calibration issued and updated by the server.
///
/// Converts a raw ADC count into grams: `weight = scale * (raw - offset)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleCalibration {
    /// Data-out pin of the two-wire ADC (HX711 DT).
    pub signal_pin: u8,
    /// Clock pin of the two-wire ADC (HX711 SCK).
    pub clock_pin: u8,
    pub offset: i32,
    pub scale: f32,
}

impl ScaleCalibration {
    /// Convert a raw ADC count to a physical weight in grams.
    pub fn weight_of(&self, raw: i32) -> f32 {
        self.scale * (raw - self.offset) as f32
    }

    /// Whether the pin assignment matches `other` (offset/scale ignored).
    /// A pin change requires hardware re-initialization.
    pub fn same_pins(&self, other: &Self) -> bool {
        self.signal_pin == other.signal_pin && self.clock_pin == other.clock_pin
    }
}

impl Default for ScaleCalibration {
    fn default() -> Self {
        // Identity conversion until the server issues real parameters.
        Self {
            signal_pin: 0,
            clock_pin: 0,
            offset: 0,
            scale: 1.0,
        }
    }
}

/// The full provisioning record required before the device can enroll.
/// Present only when every field is stored and non-empty.
#[derive(Debug, Clone)]
pub struct Provisioning {
    pub wifi_ssid: String,
    pub wifi_password: String,
    /// Base URL of the cloud controller, stored without a trailing slash.
    pub server_url: String,
    pub api_token: String,
}
