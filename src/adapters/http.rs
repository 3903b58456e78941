//! HTTPS client adapter.
//!
//! Implements [`HttpExchange`] — one physical request per call, no retry
//! logic here (that lives in the transport).
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc` HTTP client over TLS.  The
//!   server's CA certificate is compiled in and registered in the global
//!   CA store, so the device only talks to its own backend.
//! - **all other targets**: scripted simulation backend.

use crate::protocol::transport::{HttpError, HttpExchange, HttpResponse};
use log::{info, warn};

#[cfg(target_os = "espidf")]
use esp_idf_svc::http::client::{Configuration, EspHttpConnection};

/// CA certificate of the dispensing backend (PEM).
#[cfg(target_os = "espidf")]
static SERVER_CA_PEM: &[u8] = include_bytes!("../../certs/server_ca.pem");

/// Per-request network timeout.  Retries are the transport's job, so one
/// attempt is allowed to take a while on a congested link.
#[cfg(target_os = "espidf")]
const REQUEST_TIMEOUT: core::time::Duration = core::time::Duration::from_secs(10);

const MAX_RESPONSE_LEN: usize = 4096;

pub struct HttpClientAdapter {
    #[cfg(not(target_os = "espidf"))]
    sim_responses: std::collections::VecDeque<Result<HttpResponse, HttpError>>,
}

impl HttpClientAdapter {
    pub fn new() -> Result<Self, HttpError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: single-threaded init path; esp_tls copies the PEM
            // into the global store.
            let mut pem = SERVER_CA_PEM.to_vec();
            pem.push(0);
            let ret = unsafe {
                esp_idf_svc::sys::esp_tls_init_global_ca_store();
                esp_idf_svc::sys::esp_tls_set_global_ca_store(pem.as_ptr(), pem.len() as u32)
            };
            if ret != esp_idf_svc::sys::ESP_OK {
                warn!("http: could not register pinned CA ({ret})");
                return Err(HttpError::Connect);
            }
            info!("http: pinned CA registered");
            Ok(Self {})
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("http: simulation backend");
            Ok(Self {
                sim_responses: std::collections::VecDeque::new(),
            })
        }
    }

    /// Simulation only: queue the next response.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_push_response(&mut self, response: Result<HttpResponse, HttpError>) {
        self.sim_responses.push_back(response);
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_request(
        &mut self,
        method: esp_idf_svc::http::Method,
        url: &str,
        body: Option<&str>,
    ) -> Result<HttpResponse, HttpError> {
        let mut conn = EspHttpConnection::new(&Configuration {
            timeout: Some(REQUEST_TIMEOUT),
            use_global_ca_store: true,
            ..Default::default()
        })
        .map_err(|_| HttpError::Connect)?;

        let headers: &[(&str, &str)] = match body {
            Some(_) => &[("content-type", "application/json")],
            None => &[],
        };
        conn.initiate_request(method, url, headers)
            .map_err(|_| HttpError::Connect)?;
        if let Some(body) = body {
            conn.write(body.as_bytes()).map_err(|_| HttpError::Io)?;
        }
        conn.initiate_response().map_err(|_| HttpError::Io)?;

        let status = conn.status();
        let mut collected = Vec::new();
        let mut buf = [0u8; 512];
        loop {
            let n = conn.read(&mut buf).map_err(|_| HttpError::Io)?;
            if n == 0 {
                break;
            }
            if collected.len() + n > MAX_RESPONSE_LEN {
                warn!("http: response exceeds {MAX_RESPONSE_LEN} bytes, truncating");
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }

        Ok(HttpResponse {
            status,
            body: String::from_utf8_lossy(&collected).into_owned(),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_request(
        &mut self,
        url: &str,
        body: Option<&str>,
    ) -> Result<HttpResponse, HttpError> {
        let _ = body;
        match self.sim_responses.pop_front() {
            Some(response) => response,
            None => {
                warn!("http(sim): no scripted response for {url}");
                Err(HttpError::Connect)
            }
        }
    }
}

impl HttpExchange for HttpClientAdapter {
    fn post_json(&mut self, url: &str, body: &str) -> Result<HttpResponse, HttpError> {
        #[cfg(target_os = "espidf")]
        return self.platform_request(esp_idf_svc::http::Method::Post, url, Some(body));

        #[cfg(not(target_os = "espidf"))]
        self.platform_request(url, Some(body))
    }

    fn get(&mut self, url: &str) -> Result<HttpResponse, HttpError> {
        #[cfg(target_os = "espidf")]
        return self.platform_request(esp_idf_svc::http::Method::Get, url, None);

        #[cfg(not(target_os = "espidf"))]
        self.platform_request(url, None)
    }
}
