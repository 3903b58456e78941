//! Top-level device lifecycle.
//!
//! The device moves through explicit phases:
//!
//! ```text
//! Provisioning -> Verifying -> Updating -> Calibrating -> ActionLoop
//!      |              |                                       |
//!      v              v  (rejected / unreachable)             | (every 5 min,
//!    Portal       Provisioning  <-----------------------------+  or standby
//!                                                                crossing the
//!                                                                deadline)
//! ```
//!
//! Each phase is a step function taking the ports it needs; the phase
//! enum plus step functions (rather than a God loop) is what makes the
//! whole lifecycle drivable from host tests with mock ports.

use crate::app::ports::{ClockPort, NetworkPort, OtaPort, PumpPort, ScaleDriverPort, StoragePort};
use crate::app::store::DeviceStore;
use crate::config::FIRMWARE_VERSION;
use crate::error::ErrorCode;
use crate::protocol::action::DeviceAction;
use crate::protocol::client::{DeviceClient, ProtocolError};
use crate::protocol::transport::HttpExchange;
use crate::pump::{self, DoseOutcome, DoseReporter};
use crate::scale::{CalibrationStatus, WeightScale};
use log::{error, info, warn};

/// How long a successful verification stays fresh.
pub const VERIFY_INTERVAL_MS: u64 = 300_000;
/// Pause after a failed action poll or dose before polling again.
pub const ACTION_RETRY_DELAY_MS: u32 = 1000;
/// Pause after a `completed` action before the next poll.
pub const COMPLETED_PAUSE_MS: u32 = 1000;
/// Where the server publishes the flashable image.
pub const FIRMWARE_BIN_PATH: &str = "/static/firmware/autobar.bin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Check stored provisioning and join WiFi.
    Provisioning,
    /// Hand off to the captive portal for (re-)configuration.
    Portal,
    /// Enroll with the server.
    Verifying,
    /// Compare the published firmware version and upgrade if it moved.
    Updating,
    /// Initialize the scale and satisfy the server's calibration demand.
    Calibrating,
    /// Poll for actions and execute them.
    ActionLoop,
}

pub struct Orchestrator {
    phase: Phase,
    last_verified_ms: u64,
    scale: Option<WeightScale>,
    server_needs_calibration: bool,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            phase: Phase::Provisioning,
            last_verified_ms: 0,
            scale: None,
            server_needs_calibration: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Drive the lifecycle until the portal is required.  On the device
    /// this only returns when provisioning is missing or enrollment was
    /// rejected; the caller then runs the captive portal.
    pub fn run_until_portal<S, E>(
        &mut self,
        client: &mut DeviceClient<E>,
        store: &mut DeviceStore<S>,
        clock: &impl ClockPort,
        network: &mut impl NetworkPort,
        ota: &mut impl OtaPort,
        driver: &mut impl ScaleDriverPort,
        pump: &mut impl PumpPort,
    ) where
        S: StoragePort,
        E: HttpExchange,
    {
        loop {
            let next = match self.phase {
                Phase::Provisioning => self.step_provisioning(store, network),
                Phase::Portal => {
                    // Next entry restarts the lifecycle from scratch.
                    self.phase = Phase::Provisioning;
                    return;
                }
                Phase::Verifying => self.step_verifying(client, store, clock),
                Phase::Updating => self.step_updating(client, store, clock, ota),
                Phase::Calibrating => self.step_calibrating(client, store, clock, driver),
                Phase::ActionLoop => self.step_action(client, store, clock, driver, pump),
            };
            self.transition(next);
        }
    }

    fn transition(&mut self, next: Phase) {
        if next != self.phase {
            info!("phase {:?} -> {:?}", self.phase, next);
            self.phase = next;
        }
    }

    /// Provisioning: all four fields stored and WiFi joins, or portal.
    pub fn step_provisioning<S: StoragePort>(
        &mut self,
        store: &DeviceStore<S>,
        network: &mut impl NetworkPort,
    ) -> Phase {
        let Some(prov) = store.provisioning() else {
            info!("device not provisioned");
            return Phase::Portal;
        };
        if !network.connect(&prov.wifi_ssid, &prov.wifi_password) {
            warn!("could not join '{}'", prov.wifi_ssid);
            return Phase::Portal;
        }
        Phase::Verifying
    }

    /// Verifying: enroll, or fall back to provisioning (the client has
    /// already cleared the token on rejection/exhaustion, so provisioning
    /// falls through to the portal).
    pub fn step_verifying<S: StoragePort, E: HttpExchange>(
        &mut self,
        client: &mut DeviceClient<E>,
        store: &mut DeviceStore<S>,
        clock: &impl ClockPort,
    ) -> Phase {
        let scale_uninitialized = self.scale.is_none() && store.scale_calibration().is_none();
        match client.verify(store, clock, scale_uninitialized) {
            Ok(outcome) if outcome.token_valid => {
                self.last_verified_ms = clock.now_ms();
                self.server_needs_calibration = outcome.needs_calibration;
                Phase::Updating
            }
            Ok(_) => Phase::Provisioning,
            Err(e) => {
                error!("verification failed: {e}");
                Phase::Provisioning
            }
        }
    }

    /// Updating: any version difference triggers an upgrade.  Manifest or
    /// upgrade failure is logged and the device keeps running what it has.
    pub fn step_updating<S: StoragePort, E: HttpExchange>(
        &mut self,
        client: &mut DeviceClient<E>,
        store: &DeviceStore<S>,
        clock: &impl ClockPort,
        ota: &mut impl OtaPort,
    ) -> Phase {
        match client.fetch_manifest(store, clock) {
            Ok(published) if published == FIRMWARE_VERSION => {
                info!("firmware {FIRMWARE_VERSION} is current");
            }
            Ok(published) => {
                info!("firmware {published} published (running {FIRMWARE_VERSION}), upgrading");
                match store.server_url() {
                    Some(url) => {
                        // Ok is unreachable: a successful upgrade reboots.
                        if let Err(e) = ota.upgrade(&format!("{url}{FIRMWARE_BIN_PATH}")) {
                            warn!("upgrade failed, staying on {FIRMWARE_VERSION}: {e}");
                        }
                    }
                    None => warn!("server URL vanished, skipping upgrade"),
                }
            }
            Err(e) => warn!("manifest check failed: {e}"),
        }
        Phase::Calibrating
    }

    /// Calibrating: one-time scale bring-up, then calibration passes until
    /// the server is satisfied (only when it asked for calibration).
    pub fn step_calibrating<S: StoragePort, E: HttpExchange>(
        &mut self,
        client: &mut DeviceClient<E>,
        store: &mut DeviceStore<S>,
        clock: &impl ClockPort,
        driver: &mut impl ScaleDriverPort,
    ) -> Phase {
        let scale = self.scale.get_or_insert_with(|| {
            let cal = store.scale_calibration().unwrap_or_default();
            if driver.reinit(cal.signal_pin, cal.clock_pin).is_err() {
                warn!(
                    "scale driver init failed on pins {}/{}",
                    cal.signal_pin, cal.clock_pin
                );
            }
            WeightScale::new(cal)
        });

        if self.server_needs_calibration {
            info!("calibrating until the server is satisfied");
            while scale.calibration_pass(driver, client, store, clock)
                == CalibrationStatus::NeedsAnotherPass
            {}
            self.server_needs_calibration = false;
        }
        Phase::ActionLoop
    }

    /// One action-loop iteration: re-verify when due, otherwise poll and
    /// execute a single action.
    pub fn step_action<S: StoragePort, E: HttpExchange>(
        &mut self,
        client: &mut DeviceClient<E>,
        store: &mut DeviceStore<S>,
        clock: &impl ClockPort,
        driver: &mut impl ScaleDriverPort,
        pump: &mut impl PumpPort,
    ) -> Phase {
        let now = clock.now_ms();
        if now.saturating_sub(self.last_verified_ms) >= VERIFY_INTERVAL_MS {
            return Phase::Verifying;
        }

        match client.request_action(store, clock) {
            Ok(DeviceAction::Standby { idle_ms }) => {
                // Don't sleep past the verification deadline.  The poll
                // itself may have slept through transport retries, so the
                // pre-poll timestamp is stale here.
                let now = clock.now_ms();
                if now + u64::from(idle_ms) >= self.last_verified_ms + VERIFY_INTERVAL_MS {
                    return Phase::Verifying;
                }
                clock.sleep_ms(idle_ms);
            }
            Ok(DeviceAction::Pump(cmd)) => {
                let Some(scale) = self.scale.as_ref() else {
                    // Calibrating always runs before the action loop.
                    error!("pump action before scale init, ignoring");
                    clock.sleep_ms(ACTION_RETRY_DELAY_MS);
                    return Phase::ActionLoop;
                };
                let outcome = {
                    let mut reporter = ClientReporter {
                        client: &mut *client,
                        store: &*store,
                        clock,
                    };
                    pump::run_dose(&cmd, scale, driver, pump, &mut reporter, clock)
                };
                match outcome {
                    DoseOutcome::Delivered { progress } => {
                        info!("dose {} delivered ({progress}g)", cmd.dose_id);
                    }
                    DoseOutcome::Stopped { progress } => {
                        info!("dose {} stopped by server ({progress}g)", cmd.dose_id);
                    }
                    DoseOutcome::Failed(code) => {
                        self.report_dose_failure(client, store, clock, &cmd.order_id, code);
                        clock.sleep_ms(ACTION_RETRY_DELAY_MS);
                    }
                }
            }
            Ok(DeviceAction::Completed { order_id, message }) => {
                info!("order {order_id} completed: {message}");
                clock.sleep_ms(COMPLETED_PAUSE_MS);
            }
            Ok(DeviceAction::ServerError) => {
                error!("server answered with an unknown action");
                clock.sleep_ms(ACTION_RETRY_DELAY_MS);
            }
            Err(e) => {
                error!("action poll failed: {e}");
                clock.sleep_ms(ACTION_RETRY_DELAY_MS);
            }
        }
        Phase::ActionLoop
    }

    fn report_dose_failure<S: StoragePort, E: HttpExchange>(
        &self,
        client: &mut DeviceClient<E>,
        store: &DeviceStore<S>,
        clock: &impl ClockPort,
        order_id: &str,
        code: ErrorCode,
    ) {
        error!("dose failed: {code}");
        if let Err(e) = client.report_error(store, clock, order_id, code, &code.to_string()) {
            warn!("could not report dose failure: {e}");
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Bridges the pump loop's progress reports onto the protocol client.
struct ClientReporter<'a, E: HttpExchange, S: StoragePort, C: ClockPort> {
    client: &'a mut DeviceClient<E>,
    store: &'a DeviceStore<S>,
    clock: &'a C,
}

impl<E: HttpExchange, S: StoragePort, C: ClockPort> DoseReporter for ClientReporter<'_, E, S, C> {
    fn report_progress(
        &mut self,
        order_id: &str,
        dose_id: &str,
        progress: f32,
    ) -> Result<bool, ProtocolError> {
        self.client
            .report_progress(self.store, self.clock, order_id, dose_id, progress)
            .map(|reply| reply.should_continue)
    }
}
