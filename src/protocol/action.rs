//! Server action decoding.
//!
//! The `/api/devices/action` endpoint answers with a tagged JSON object.
//! Decoding is strict: a `pump` or `completed` action with any required
//! field missing or mistyped fails the whole call rather than producing a
//! partially built command.  An *unknown* action string is different — the
//! server answered coherently, we just don't know the verb — and maps to
//! [`DeviceAction::ServerError`] so the caller can pause and re-poll.

use core::fmt;

/// Idle time applied when a `standby` action carries no `idle` field.
pub const DEFAULT_STANDBY_IDLE_MS: u32 = 1000;

/// A fully validated pump instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct DoseCommand {
    pub order_id: String,
    pub dose_id: String,
    /// GPIO driving this ingredient's pump.
    pub pump_pin: u8,
    /// Total weight of the dose in grams.
    pub target_weight: f32,
    /// Weight already delivered in a previous, interrupted attempt.
    pub progress_weight: f32,
}

impl DoseCommand {
    /// Grams still to deliver.  Non-positive means the dose is already
    /// satisfied and the pump must not run.
    pub fn remaining(&self) -> f32 {
        self.target_weight - self.progress_weight
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceAction {
    /// Nothing to do; poll again after `idle_ms`.
    Standby { idle_ms: u32 },
    /// Deliver one dose.
    Pump(DoseCommand),
    /// The current order is finished.
    Completed { order_id: String, message: String },
    /// The server answered with a verb this firmware does not know.
    ServerError,
}

/// The response body did not match the action schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionDecodeError {
    /// `action` field missing or not a string.
    MissingAction,
    /// A required field of the named action is missing or mistyped.
    MissingField(&'static str),
}

impl fmt::Display for ActionDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingAction => write!(f, "action field missing"),
            Self::MissingField(field) => write!(f, "required field {field} missing or mistyped"),
        }
    }
}

pub fn decode_action(value: &serde_json::Value) -> Result<DeviceAction, ActionDecodeError> {
    let verb = value
        .get("action")
        .and_then(serde_json::Value::as_str)
        .ok_or(ActionDecodeError::MissingAction)?;

    match verb {
        "standby" => {
            let idle_ms = value
                .get("idle")
                .and_then(serde_json::Value::as_u64)
                .map_or(DEFAULT_STANDBY_IDLE_MS, |v| v as u32);
            Ok(DeviceAction::Standby { idle_ms })
        }
        "pump" => Ok(DeviceAction::Pump(DoseCommand {
            order_id: require_str(value, "orderId")?.to_owned(),
            dose_id: require_str(value, "doseId")?.to_owned(),
            pump_pin: require_u64(value, "pumpGpio")? as u8,
            target_weight: require_f64(value, "doseWeight")? as f32,
            progress_weight: require_f64(value, "doseWeightProgress")? as f32,
        })),
        "completed" => Ok(DeviceAction::Completed {
            order_id: require_str(value, "orderId")?.to_owned(),
            message: require_str(value, "message")?.to_owned(),
        }),
        _ => Ok(DeviceAction::ServerError),
    }
}

fn require_str<'a>(
    value: &'a serde_json::Value,
    field: &'static str,
) -> Result<&'a str, ActionDecodeError> {
    value
        .get(field)
        .and_then(serde_json::Value::as_str)
        .ok_or(ActionDecodeError::MissingField(field))
}

fn require_u64(value: &serde_json::Value, field: &'static str) -> Result<u64, ActionDecodeError> {
    value
        .get(field)
        .and_then(serde_json::Value::as_u64)
        .ok_or(ActionDecodeError::MissingField(field))
}

fn require_f64(value: &serde_json::Value, field: &'static str) -> Result<f64, ActionDecodeError> {
    value
        .get(field)
        .and_then(serde_json::Value::as_f64)
        .ok_or(ActionDecodeError::MissingField(field))
}
