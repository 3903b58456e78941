//! Typed view over the persistent key-value store.
//!
//! Layout:
//! - `device` namespace: `ssid`, `password`, `server_url`
//! - `auth` namespace: `api_token`
//! - `scale` namespace: `calibration` (postcard blob)
//!
//! Empty values are treated as absent, so clearing a key and never having
//! written it look the same to callers.

use crate::app::ports::StoragePort;
use crate::config::{Provisioning, ScaleCalibration};
use crate::error::StorageError;
use log::warn;

const NS_DEVICE: &str = "device";
const NS_AUTH: &str = "auth";
const NS_SCALE: &str = "scale";

const KEY_SSID: &str = "ssid";
const KEY_PASSWORD: &str = "password";
const KEY_SERVER_URL: &str = "server_url";
const KEY_API_TOKEN: &str = "api_token";
const KEY_CALIBRATION: &str = "calibration";

/// Largest value we ever store.  Reads use a fixed buffer of this size, so
/// anything longer is rejected at write time; a value that went in always
/// comes back whole.
const MAX_VALUE_LEN: usize = 256;

pub struct DeviceStore<S: StoragePort> {
    storage: S,
}

impl<S: StoragePort> DeviceStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    // -- WiFi credentials ---------------------------------------------------

    pub fn wifi_credentials(&self) -> Option<(String, String)> {
        let ssid = self.read_string(NS_DEVICE, KEY_SSID)?;
        let password = self.read_string(NS_DEVICE, KEY_PASSWORD)?;
        Some((ssid, password))
    }

    pub fn set_wifi_credentials(&mut self, ssid: &str, password: &str) -> Result<(), StorageError> {
        // Both checked up front so a bad password can't leave a half-written
        // credential pair behind.
        let ssid = bounded(ssid)?;
        let password = bounded(password)?;
        self.storage.write(NS_DEVICE, KEY_SSID, ssid)?;
        self.storage.write(NS_DEVICE, KEY_PASSWORD, password)
    }

    // -- Server URL ---------------------------------------------------------

    pub fn server_url(&self) -> Option<String> {
        self.read_string(NS_DEVICE, KEY_SERVER_URL)
    }

    /// Store the server base URL.  A trailing slash is stripped so path
    /// concatenation in the protocol client never produces `//`.
    pub fn set_server_url(&mut self, url: &str) -> Result<(), StorageError> {
        let url = url.strip_suffix('/').unwrap_or(url);
        self.storage
            .write(NS_DEVICE, KEY_SERVER_URL, bounded(url)?)
    }

    // -- API token ----------------------------------------------------------

    pub fn api_token(&self) -> Option<String> {
        self.read_string(NS_AUTH, KEY_API_TOKEN)
    }

    pub fn set_api_token(&mut self, token: &str) -> Result<(), StorageError> {
        self.storage.write(NS_AUTH, KEY_API_TOKEN, bounded(token)?)
    }

    /// Forget the enrollment token.  The next boot of the phase machine
    /// falls through to the provisioning portal.
    pub fn clear_api_token(&mut self) -> Result<(), StorageError> {
        self.storage.delete(NS_AUTH, KEY_API_TOKEN)
    }

    // -- Scale calibration --------------------------------------------------

    pub fn scale_calibration(&self) -> Option<ScaleCalibration> {
        let mut buf = [0u8; 64];
        let n = self.storage.read(NS_SCALE, KEY_CALIBRATION, &mut buf).ok()?;
        match postcard::from_bytes(&buf[..n]) {
            Ok(cal) => Some(cal),
            Err(_) => {
                warn!("stored calibration blob is corrupt, ignoring");
                None
            }
        }
    }

    pub fn set_scale_calibration(&mut self, cal: &ScaleCalibration) -> Result<(), StorageError> {
        let bytes = postcard::to_allocvec(cal).map_err(|_| StorageError::IoError)?;
        self.storage.write(NS_SCALE, KEY_CALIBRATION, &bytes)
    }

    // -- Aggregate ----------------------------------------------------------

    /// The full provisioning record, present only when every field exists
    /// and is non-empty.
    pub fn provisioning(&self) -> Option<Provisioning> {
        let (wifi_ssid, wifi_password) = self.wifi_credentials()?;
        Some(Provisioning {
            wifi_ssid,
            wifi_password,
            server_url: self.server_url()?,
            api_token: self.api_token()?,
        })
    }

    fn read_string(&self, namespace: &str, key: &str) -> Option<String> {
        // Writers go through `bounded`, so the fixed buffer always fits.
        let mut buf = [0u8; MAX_VALUE_LEN];
        let n = self.storage.read(namespace, key, &mut buf).ok()?;
        if n == 0 {
            return None;
        }
        match core::str::from_utf8(&buf[..n]) {
            Ok(s) => Some(s.to_owned()),
            Err(_) => {
                warn!("stored value {namespace}/{key} is not valid UTF-8");
                None
            }
        }
    }
}

fn bounded(value: &str) -> Result<&[u8], StorageError> {
    if value.len() > MAX_VALUE_LEN {
        warn!("refusing to store {}-byte value (max {MAX_VALUE_LEN})", value.len());
        return Err(StorageError::ValueTooLong);
    }
    Ok(value.as_bytes())
}
