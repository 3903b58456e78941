//! Captive provisioning portal.
//!
//! When the device has no (or rejected) provisioning it opens a SoftAP
//! and serves a one-page form asking for WiFi credentials, the server
//! URL and the enrollment token.  On submit the values are persisted and
//! the device restarts into the normal boot path.
//!
//! On the device [`ProvisioningPortal::run`] never returns (it either
//! loops serving the form or restarts).  The simulation backend returns
//! immediately so host tests can drive the lifecycle around it.

use crate::app::ports::StoragePort;
use crate::app::store::DeviceStore;
use log::{info, warn};

/// SSID of the setup network.
pub const PORTAL_SSID: &str = "AutoBar-Setup";

/// One submitted provisioning form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalSubmission {
    pub ssid: String,
    pub password: String,
    pub server_url: String,
    pub api_token: String,
}

/// Parse an `application/x-www-form-urlencoded` body into a submission.
/// All fields except the password must be non-empty.
pub fn parse_form(body: &str) -> Option<PortalSubmission> {
    let mut ssid = None;
    let mut password = None;
    let mut server_url = None;
    let mut api_token = None;

    for pair in body.split('&') {
        let (key, value) = pair.split_once('=')?;
        let value = percent_decode(value)?;
        match key {
            "ssid" => ssid = Some(value),
            "password" => password = Some(value),
            "server_url" => server_url = Some(value),
            "api_token" => api_token = Some(value),
            _ => {}
        }
    }

    let submission = PortalSubmission {
        ssid: ssid?,
        password: password.unwrap_or_default(),
        server_url: server_url?,
        api_token: api_token?,
    };
    if submission.ssid.is_empty()
        || submission.server_url.is_empty()
        || submission.api_token.is_empty()
    {
        return None;
    }
    Some(submission)
}

fn percent_decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                let hex = bytes.get(i + 1..i + 3)?;
                let hi = (hex[0] as char).to_digit(16)?;
                let lo = (hex[1] as char).to_digit(16)?;
                out.push((hi * 16 + lo) as u8);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).ok()
}

fn persist<S: StoragePort>(store: &mut DeviceStore<S>, submission: &PortalSubmission) -> bool {
    let ok = store
        .set_wifi_credentials(&submission.ssid, &submission.password)
        .and_then(|()| store.set_server_url(&submission.server_url))
        .and_then(|()| store.set_api_token(&submission.api_token));
    match ok {
        Ok(()) => {
            info!("portal: provisioning stored (SSID '{}')", submission.ssid);
            true
        }
        Err(e) => {
            warn!("portal: could not persist provisioning: {e}");
            false
        }
    }
}

pub struct ProvisioningPortal;

impl ProvisioningPortal {
    pub fn new() -> Self {
        Self
    }

    /// Serve the portal.  Never returns on the device; the simulation
    /// backend logs and returns.
    #[cfg(target_os = "espidf")]
    pub fn run<S: StoragePort>(&mut self, store: &mut DeviceStore<S>) {
        use esp_idf_svc::http::Method;
        use esp_idf_svc::http::server::{Configuration, EspHttpServer};
        use esp_idf_svc::io::{Read, Write};
        use std::sync::{Arc, Mutex};

        if let Err(e) = self.start_softap() {
            warn!("portal: SoftAP start failed ({e}); restarting");
            unsafe { esp_idf_svc::sys::esp_restart() };
        }

        // Handlers only park the submission; the loop below owns the
        // store and does the persistence.
        let submitted: Arc<Mutex<Option<PortalSubmission>>> = Arc::new(Mutex::new(None));

        let mut server = match EspHttpServer::new(&Configuration::default()) {
            Ok(server) => server,
            Err(e) => {
                warn!("portal: HTTP server failed ({e}); restarting");
                unsafe { esp_idf_svc::sys::esp_restart() };
            }
        };

        let result = server
            .fn_handler("/", Method::Get, |req| {
                req.into_ok_response()?.write_all(FORM_HTML.as_bytes())?;
                Ok::<(), esp_idf_svc::io::EspIOError>(())
            })
            .and_then(|server| {
                let parked = Arc::clone(&submitted);
                server.fn_handler("/save", Method::Post, move |mut req| {
                    let mut body = [0u8; 1024];
                    let n = req.read(&mut body)?;
                    let parsed = core::str::from_utf8(&body[..n])
                        .ok()
                        .and_then(parse_form);
                    match parsed {
                        Some(submission) => {
                            *parked.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
                                Some(submission);
                            req.into_ok_response()?
                                .write_all(b"Saved. The device will restart.")?;
                        }
                        None => {
                            req.into_status_response(400)?
                                .write_all(b"All fields are required.")?;
                        }
                    }
                    Ok::<(), esp_idf_svc::io::EspIOError>(())
                })
            });
        if let Err(e) = result {
            warn!("portal: handler registration failed ({e}); restarting");
            unsafe { esp_idf_svc::sys::esp_restart() };
        }

        info!("portal: serving on AP '{PORTAL_SSID}' at 192.168.4.1");
        loop {
            esp_idf_hal::delay::FreeRtos::delay_ms(500);
            let taken = submitted
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .take();
            if let Some(submission) = taken {
                if persist(store, &submission) {
                    info!("portal: restarting into normal operation");
                    unsafe { esp_idf_svc::sys::esp_restart() };
                }
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn run<S: StoragePort>(&mut self, store: &mut DeviceStore<S>) {
        let _ = store;
        info!("portal(sim): would serve AP '{PORTAL_SSID}'");
    }

    /// Simulation only: feed a submission straight into the store, as if
    /// the form had been posted.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_submit<S: StoragePort>(
        &mut self,
        store: &mut DeviceStore<S>,
        submission: &PortalSubmission,
    ) -> bool {
        persist(store, submission)
    }

    #[cfg(target_os = "espidf")]
    fn start_softap(&mut self) -> Result<(), i32> {
        use esp_idf_svc::sys::*;

        // SAFETY: AP bring-up from the single main task.  STA mode was
        // torn down (or never started) before the portal runs.
        unsafe {
            let netif = esp_netif_create_default_wifi_ap();
            if netif.is_null() {
                return Err(ESP_FAIL);
            }
            let mut cfg: wifi_config_t = core::mem::zeroed();
            let ssid = PORTAL_SSID.as_bytes();
            cfg.ap.ssid[..ssid.len()].copy_from_slice(ssid);
            cfg.ap.ssid_len = ssid.len() as u8;
            cfg.ap.max_connection = 2;
            cfg.ap.authmode = wifi_auth_mode_t_WIFI_AUTH_OPEN;

            let ret = esp_wifi_set_mode(wifi_mode_t_WIFI_MODE_AP);
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = esp_wifi_set_config(wifi_interface_t_WIFI_IF_AP, &mut cfg);
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = esp_wifi_start();
            if ret != ESP_OK {
                return Err(ret);
            }
        }
        Ok(())
    }
}

impl Default for ProvisioningPortal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
const FORM_HTML: &str = r#"<!doctype html>
<title>AutoBar setup</title>
<h1>AutoBar setup</h1>
<form method="post" action="/save">
  <label>WiFi network <input name="ssid"></label><br>
  <label>WiFi password <input name="password" type="password"></label><br>
  <label>Server URL <input name="server_url" placeholder="https://..."></label><br>
  <label>Device token <input name="api_token"></label><br>
  <button>Save</button>
</form>
"#;
