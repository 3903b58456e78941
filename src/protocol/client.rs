//! Typed client for the device endpoints of the cloud controller.
//!
//! All authenticated calls carry the enrollment token in the JSON body,
//! never in a header.  Token lifecycle lives here and only here: `verify`
//! clears the stored token when the server explicitly rejects it and when
//! the verification request exhausts its retries.  Every other call treats
//! a missing token as a local precondition failure and sends nothing.

use crate::app::ports::{ClockPort, StoragePort};
use crate::app::store::DeviceStore;
use crate::config::{FIRMWARE_VERSION, ScaleCalibration};
use crate::error::ErrorCode;
use crate::protocol::action::{DeviceAction, decode_action};
use crate::protocol::transport::{HttpExchange, RetryPolicy, Transport, TransportError};
use core::fmt;
use log::{info, warn};
use serde_json::{Value, json};

const VERIFY_PATH: &str = "/api/devices/verify";
const WEIGHT_PATH: &str = "/api/devices/weight";
const ACTION_PATH: &str = "/api/devices/action";
const PROGRESS_PATH: &str = "/api/devices/progress";
const ERROR_PATH: &str = "/api/devices/error";
const MANIFEST_PATH: &str = "/firmware/manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// No server URL stored; nothing was sent.
    MissingServerUrl,
    /// No enrollment token stored; nothing was sent.
    MissingToken,
    /// The transport exhausted its retries.
    Transport(TransportError),
    /// The server answered but the body did not match the expected schema.
    Schema(&'static str),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingServerUrl => write!(f, "no server URL configured"),
            Self::MissingToken => write!(f, "no enrollment token"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Schema(what) => write!(f, "malformed response: {what}"),
        }
    }
}

impl From<TransportError> for ProtocolError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

/// Result of a `verify` round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub token_valid: bool,
    /// Server wants a calibration exchange.  Only meaningful when
    /// `token_valid` is true.
    pub needs_calibration: bool,
}

/// Server's answer to a weight report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightReport {
    pub needs_calibration: bool,
    pub calibration: ScaleCalibration,
}

/// Server's answer to a progress report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReply {
    pub message: String,
    /// `false` means the server considers the dose satisfied; stop pumping.
    pub should_continue: bool,
}

pub struct DeviceClient<E: HttpExchange> {
    transport: Transport<E>,
}

impl<E: HttpExchange> DeviceClient<E> {
    pub fn new(exchange: E) -> Self {
        Self {
            transport: Transport::new(exchange),
        }
    }

    pub fn with_policy(exchange: E, policy: RetryPolicy) -> Self {
        Self {
            transport: Transport::with_policy(exchange, policy),
        }
    }

    /// Enroll with the server, reporting our firmware version.
    ///
    /// Clears the stored token on explicit rejection and on retry
    /// exhaustion, so the caller falls back to provisioning.
    pub fn verify<S: StoragePort>(
        &mut self,
        store: &mut DeviceStore<S>,
        clock: &impl ClockPort,
        needs_calibration: bool,
    ) -> Result<VerifyOutcome, ProtocolError> {
        let url = store.server_url().ok_or(ProtocolError::MissingServerUrl)?;
        let token = store.api_token().ok_or(ProtocolError::MissingToken)?;

        let mut payload = json!({
            "token": token,
            "firmwareVersion": FIRMWARE_VERSION,
        });
        if needs_calibration {
            payload["needsCalibration"] = Value::Bool(true);
        }

        let resp = match self
            .transport
            .post(clock, &format!("{url}{VERIFY_PATH}"), &payload)
        {
            Ok(resp) => resp,
            Err(e @ TransportError::Exhausted) => {
                warn!("verification unreachable, dropping enrollment token");
                if store.clear_api_token().is_err() {
                    warn!("failed to clear enrollment token");
                }
                return Err(e.into());
            }
        };

        if let Some(message) = resp.get("message").and_then(Value::as_str) {
            info!("server: {message}");
        }

        let token_valid = resp
            .get("tokenValid")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !token_valid {
            warn!("server rejected enrollment token, dropping it");
            if store.clear_api_token().is_err() {
                warn!("failed to clear enrollment token");
            }
        }

        Ok(VerifyOutcome {
            token_valid,
            needs_calibration: resp
                .get("needCalibration")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    /// Fetch the published firmware version from the static manifest.
    /// Unauthenticated; callers treat failure as non-fatal.
    pub fn fetch_manifest<S: StoragePort>(
        &mut self,
        store: &DeviceStore<S>,
        clock: &impl ClockPort,
    ) -> Result<String, ProtocolError> {
        let url = store.server_url().ok_or(ProtocolError::MissingServerUrl)?;
        let resp = self.transport.get(clock, &format!("{url}{MANIFEST_PATH}"))?;
        resp.get("version")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or(ProtocolError::Schema("manifest version"))
    }

    /// Report a scale reading and receive (possibly updated) calibration.
    /// All five response fields are required.
    pub fn report_weight<S: StoragePort>(
        &mut self,
        store: &DeviceStore<S>,
        clock: &impl ClockPort,
        weight: f32,
        raw: i32,
    ) -> Result<WeightReport, ProtocolError> {
        let resp = self.authed_post(
            store,
            clock,
            WEIGHT_PATH,
            json!({
                "weight": weight,
                "rawMeasure": raw,
            }),
        )?;

        let needs_calibration = resp
            .get("needCalibration")
            .and_then(Value::as_bool)
            .ok_or(ProtocolError::Schema("needCalibration"))?;
        let signal_pin = resp
            .get("hx711Dt")
            .and_then(Value::as_u64)
            .ok_or(ProtocolError::Schema("hx711Dt"))? as u8;
        let clock_pin = resp
            .get("hx711Sck")
            .and_then(Value::as_u64)
            .ok_or(ProtocolError::Schema("hx711Sck"))? as u8;
        let offset = resp
            .get("hx711Offset")
            .and_then(Value::as_i64)
            .ok_or(ProtocolError::Schema("hx711Offset"))? as i32;
        let scale = resp
            .get("hx711Scale")
            .and_then(Value::as_f64)
            .ok_or(ProtocolError::Schema("hx711Scale"))? as f32;

        Ok(WeightReport {
            needs_calibration,
            calibration: ScaleCalibration {
                signal_pin,
                clock_pin,
                offset,
                scale,
            },
        })
    }

    /// Ask the server what to do next.
    pub fn request_action<S: StoragePort>(
        &mut self,
        store: &DeviceStore<S>,
        clock: &impl ClockPort,
    ) -> Result<DeviceAction, ProtocolError> {
        let resp = self.authed_post(store, clock, ACTION_PATH, json!({}))?;
        decode_action(&resp).map_err(|_| ProtocolError::Schema("action"))
    }

    /// Report dosing progress.  The reply's `should_continue` tells the
    /// pump loop whether the server still wants liquid.
    pub fn report_progress<S: StoragePort>(
        &mut self,
        store: &DeviceStore<S>,
        clock: &impl ClockPort,
        order_id: &str,
        dose_id: &str,
        weight_progress: f32,
    ) -> Result<ProgressReply, ProtocolError> {
        let resp = self.authed_post(
            store,
            clock,
            PROGRESS_PATH,
            json!({
                "orderId": order_id,
                "doseId": dose_id,
                "weightProgress": weight_progress,
            }),
        )?;

        let message = resp
            .get("message")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::Schema("progress message"))?
            .to_owned();
        Ok(ProgressReply {
            message,
            should_continue: resp
                .get("continue")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    /// Record a dose failure against the order.  Best-effort: callers log
    /// and move on if this fails too.
    pub fn report_error<S: StoragePort>(
        &mut self,
        store: &DeviceStore<S>,
        clock: &impl ClockPort,
        order_id: &str,
        code: ErrorCode,
        message: &str,
    ) -> Result<(), ProtocolError> {
        self.authed_post(
            store,
            clock,
            ERROR_PATH,
            json!({
                "orderId": order_id,
                "errorCode": code.code(),
                "message": message,
            }),
        )?;
        Ok(())
    }

    fn authed_post<S: StoragePort>(
        &mut self,
        store: &DeviceStore<S>,
        clock: &impl ClockPort,
        path: &str,
        mut payload: Value,
    ) -> Result<Value, ProtocolError> {
        let url = store.server_url().ok_or(ProtocolError::MissingServerUrl)?;
        let token = store.api_token().ok_or(ProtocolError::MissingToken)?;
        payload["token"] = Value::String(token);
        self.transport
            .post(clock, &format!("{url}{path}"), &payload)
            .map_err(Into::into)
    }
}
