//! WiFi station-mode adapter.
//!
//! Implements [`NetworkPort`]: join an access point and block until an
//! IP address is assigned or ~30 s pass.  Credentials are validated
//! before they touch the driver.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: raw ESP-IDF station bring-up via
//!   `esp_idf_svc::sys` (netif + event loop + `esp_wifi_*`), polling the
//!   default station netif for an address.
//! - **all other targets**: simulation backend for host-side tests.

use crate::app::ports::NetworkPort;
use core::fmt;
use log::{error, info, warn};

/// How long to wait for an IP address after `esp_wifi_connect`.
const IP_WAIT_MS: u32 = 30_000;
const IP_POLL_INTERVAL_MS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiError {
    InvalidSsid,
    InvalidPassword,
    DriverFailed,
}

impl fmt::Display for WifiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::DriverFailed => write!(f, "WiFi driver call failed"),
        }
    }
}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), WifiError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(WifiError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), WifiError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(WifiError::InvalidPassword);
    }
    Ok(())
}

pub struct WifiAdapter {
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    connected: bool,
    /// Simulation: SSIDs the fake radio environment will accept.
    #[cfg(not(target_os = "espidf"))]
    sim_reachable: Vec<String>,
}

impl WifiAdapter {
    pub fn new() -> Self {
        Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            connected: false,
            #[cfg(not(target_os = "espidf"))]
            sim_reachable: Vec::new(),
        }
    }

    /// Simulation only: make an SSID joinable.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_add_network(&mut self, ssid: &str) {
        self.sim_reachable.push(ssid.to_owned());
    }

    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), WifiError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid.push_str(ssid).map_err(|()| WifiError::InvalidSsid)?;
        self.password.clear();
        self.password
            .push_str(password)
            .map_err(|()| WifiError::InvalidPassword)?;
        Ok(())
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<(), WifiError> {
        use esp_idf_svc::sys::*;

        fn check(ret: i32) -> Result<(), WifiError> {
            if ret == ESP_OK {
                Ok(())
            } else {
                Err(WifiError::DriverFailed)
            }
        }

        // SAFETY: station bring-up runs once from the main task; the
        // ESP-IDF calls below are the canonical STA init sequence.
        unsafe {
            check(esp_netif_init())?;
            let ret = esp_event_loop_create_default();
            if ret != ESP_OK && ret != ESP_ERR_INVALID_STATE {
                return Err(WifiError::DriverFailed);
            }
            let netif = esp_netif_create_default_wifi_sta();
            if netif.is_null() {
                return Err(WifiError::DriverFailed);
            }

            let init_cfg = wifi_init_config_t::default();
            check(esp_wifi_init(&init_cfg))?;
            check(esp_wifi_set_mode(wifi_mode_t_WIFI_MODE_STA))?;

            let mut cfg: wifi_config_t = core::mem::zeroed();
            let ssid = self.ssid.as_bytes();
            cfg.sta.ssid[..ssid.len()].copy_from_slice(ssid);
            let password = self.password.as_bytes();
            cfg.sta.password[..password.len()].copy_from_slice(password);
            check(esp_wifi_set_config(wifi_interface_t_WIFI_IF_STA, &mut cfg))?;

            check(esp_wifi_start())?;
            check(esp_wifi_connect())?;

            // Poll for an address rather than wiring event handlers; the
            // boot path is sequential anyway.
            let mut waited: u32 = 0;
            while waited < IP_WAIT_MS {
                let mut ip_info: esp_netif_ip_info_t = core::mem::zeroed();
                if esp_netif_get_ip_info(netif, &mut ip_info) == ESP_OK && ip_info.ip.addr != 0 {
                    info!("WiFi: got address after {waited} ms");
                    return Ok(());
                }
                esp_idf_hal::delay::FreeRtos::delay_ms(IP_POLL_INTERVAL_MS);
                waited += IP_POLL_INTERVAL_MS;
            }
            warn!("WiFi: no address within {IP_WAIT_MS} ms");
            esp_wifi_disconnect();
            Err(WifiError::DriverFailed)
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), WifiError> {
        if self.sim_reachable.iter().any(|s| s == self.ssid.as_str()) {
            info!("WiFi(sim): connected to '{}'", self.ssid);
            Ok(())
        } else {
            warn!("WiFi(sim): '{}' not reachable", self.ssid);
            Err(WifiError::DriverFailed)
        }
    }
}

impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkPort for WifiAdapter {
    fn connect(&mut self, ssid: &str, password: &str) -> bool {
        if self.connected {
            return true;
        }
        if let Err(e) = self.set_credentials(ssid, password) {
            error!("WiFi: rejecting credentials: {e}");
            return false;
        }

        info!("WiFi: connecting to '{}'", self.ssid);
        match self.platform_connect() {
            Ok(()) => {
                self.connected = true;
                true
            }
            Err(e) => {
                error!("WiFi: connection failed: {e}");
                false
            }
        }
    }
}
