//! OTA firmware upgrade adapter.
//!
//! Implements [`OtaPort`] over ESP-IDF's HTTPS OTA: download the image
//! into the inactive app partition, mark it bootable and restart.  A
//! successful upgrade therefore never returns.
//!
//! Rollback safety uses the `esp-ota` crate: once a freshly flashed image
//! reaches the main loop it marks itself valid; if it crashes before
//! that, the bootloader falls back to the previous image.

use crate::app::ports::OtaPort;
use crate::error::OtaError;
use core::convert::Infallible;
use log::{info, warn};

pub struct OtaUpdater;

impl OtaUpdater {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OtaUpdater {
    fn default() -> Self {
        Self::new()
    }
}

/// Tell the bootloader the running image works.  Called once at startup,
/// after enough of the system is up that a boot loop is ruled out.
pub fn mark_running_firmware_valid() {
    #[cfg(target_os = "espidf")]
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("ota: running image marked valid"),
        Err(e) => warn!("ota: could not mark image valid: {e}"),
    }

    #[cfg(not(target_os = "espidf"))]
    info!("ota(sim): running image marked valid");
}

impl OtaPort for OtaUpdater {
    #[cfg(target_os = "espidf")]
    fn upgrade(&mut self, firmware_url: &str) -> Result<Infallible, OtaError> {
        use esp_idf_svc::sys::*;

        info!("ota: downloading {firmware_url}");

        let mut url = firmware_url.as_bytes().to_vec();
        url.push(0);

        // SAFETY: config structs are fully zero-initialized and the URL
        // buffer outlives the call; esp_https_ota blocks until the image
        // is flashed or the download fails.
        let ret = unsafe {
            let mut http_config: esp_http_client_config_t = core::mem::zeroed();
            http_config.url = url.as_ptr() as *const _;
            http_config.use_global_ca_store = true;
            http_config.timeout_ms = 30_000;

            let mut ota_config: esp_https_ota_config_t = core::mem::zeroed();
            ota_config.http_config = &http_config;

            esp_https_ota(&ota_config)
        };

        if ret == ESP_OK {
            info!("ota: flash complete, restarting");
            unsafe { esp_restart() };
        }
        warn!("ota: upgrade failed ({ret})");
        Err(OtaError::Failed)
    }

    #[cfg(not(target_os = "espidf"))]
    fn upgrade(&mut self, firmware_url: &str) -> Result<Infallible, OtaError> {
        warn!("ota(sim): pretending {firmware_url} failed");
        Err(OtaError::Failed)
    }
}
