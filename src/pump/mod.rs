//! Closed-loop dose delivery.
//!
//! The pump is a dumb GPIO; the scale closes the loop.  A dose runs as:
//! settled baseline reading, energize, then a monitor loop of fast
//! readings that reports progress, watches for stall and regression, and
//! cuts the pump the moment the target is reached — before the final
//! progress report, so a slow network can never cause overpour.
//!
//! Safety rule: whatever path exits a dose, the pump GPIO ends low.

use crate::app::ports::{ClockPort, PumpPort, ScaleDriverPort};
use crate::error::ErrorCode;
use crate::protocol::action::DoseCommand;
use crate::protocol::client::ProtocolError;
use crate::scale::{FAST_SAMPLE_COUNT, SETTLED_SAMPLE_COUNT, WeightScale};
use log::{error, info, warn};

/// No per-sample change of at least this many grams for
/// [`STALL_WINDOW_MS`] while the pump is on means the bottle is empty or
/// the line is blocked.
pub const STALL_DELTA_G: f32 = 1.0;
pub const STALL_WINDOW_MS: u64 = 30_000;
/// Weight this far below the dose baseline means the container was
/// removed from the scale.
pub const REGRESSION_LIMIT_G: f32 = 10.0;
/// Pacing delay between monitor iterations.
pub const MONITOR_PACE_MS: u32 = 100;

/// How a dose ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DoseOutcome {
    /// Target weight reached.
    Delivered { progress: f32 },
    /// Server answered `continue = false` before the target; the dose is
    /// satisfied server-side.  Not an error.
    Stopped { progress: f32 },
    Failed(ErrorCode),
}

/// Where the monitor loop sends progress.  Implemented over the protocol
/// client in the orchestrator and by mocks in tests.
pub trait DoseReporter {
    /// Report delivered grams; `Ok(true)` means keep pumping.
    fn report_progress(
        &mut self,
        order_id: &str,
        dose_id: &str,
        progress: f32,
    ) -> Result<bool, ProtocolError>;
}

/// Mutable state of one running dose.
struct DoseSession {
    /// Scale reading when the dose started (container + prior content).
    baseline: f32,
    /// Last reading that moved the stall detector.
    last_weight: f32,
    last_change_ms: u64,
}

/// Deliver one dose.  The pump GPIO is unconditionally released on exit,
/// whatever the outcome.
pub fn run_dose(
    cmd: &DoseCommand,
    scale: &WeightScale,
    driver: &mut impl ScaleDriverPort,
    pump: &mut impl PumpPort,
    reporter: &mut impl DoseReporter,
    clock: &impl ClockPort,
) -> DoseOutcome {
    let outcome = monitor(cmd, scale, driver, pump, reporter, clock);
    pump.release(cmd.pump_pin);
    outcome
}

fn monitor(
    cmd: &DoseCommand,
    scale: &WeightScale,
    driver: &mut impl ScaleDriverPort,
    pump: &mut impl PumpPort,
    reporter: &mut impl DoseReporter,
    clock: &impl ClockPort,
) -> DoseOutcome {
    if cmd.remaining() <= 0.0 {
        info!(
            "dose {} already satisfied ({}g of {}g)",
            cmd.dose_id, cmd.progress_weight, cmd.target_weight
        );
        return DoseOutcome::Delivered {
            progress: cmd.progress_weight,
        };
    }

    // No baseline, no pumping.
    let baseline = match scale.measure(driver, SETTLED_SAMPLE_COUNT) {
        Ok(m) => m.weight,
        Err(e) => {
            error!("cannot establish dose baseline: {e}");
            return DoseOutcome::Failed(ErrorCode::WeightScale);
        }
    };

    info!(
        "dose {}: pumping {}g on GPIO {} (baseline {baseline}g)",
        cmd.dose_id,
        cmd.remaining(),
        cmd.pump_pin
    );
    pump.energize(cmd.pump_pin);

    let mut session = DoseSession {
        baseline,
        last_weight: baseline,
        last_change_ms: clock.now_ms(),
    };

    loop {
        let weight = match scale.measure(driver, FAST_SAMPLE_COUNT) {
            Ok(m) => m.weight,
            Err(e) => {
                error!("scale failed mid-dose: {e}");
                return DoseOutcome::Failed(ErrorCode::WeightScale);
            }
        };
        let now = clock.now_ms();
        let progress = cmd.progress_weight + (weight - session.baseline);

        if (weight - session.last_weight).abs() >= STALL_DELTA_G {
            session.last_weight = weight;
            session.last_change_ms = now;
        } else if pump.is_on() && now.saturating_sub(session.last_change_ms) > STALL_WINDOW_MS {
            error!(
                "no weight change in {STALL_WINDOW_MS}ms on dose {}, stopping",
                cmd.dose_id
            );
            return DoseOutcome::Failed(ErrorCode::NoWeightChange);
        }

        if weight < session.baseline - REGRESSION_LIMIT_G {
            error!("weight fell {}g below baseline, container removed?", session.baseline - weight);
            return DoseOutcome::Failed(ErrorCode::NegativeWeightChange);
        }

        let reached = progress >= cmd.target_weight;
        if reached {
            // Cut delivery before talking to the network.
            pump.release(cmd.pump_pin);
        }

        match reporter.report_progress(&cmd.order_id, &cmd.dose_id, progress) {
            Ok(should_continue) => {
                if reached {
                    info!("dose {} delivered at {progress}g", cmd.dose_id);
                    return DoseOutcome::Delivered { progress };
                }
                if !should_continue {
                    info!("server stopped dose {} at {progress}g", cmd.dose_id);
                    return DoseOutcome::Stopped { progress };
                }
            }
            Err(e) => {
                if reached {
                    // Liquid is already in the glass; the server will
                    // reconcile at the next action poll.
                    warn!("progress report failed after target reached: {e}");
                    return DoseOutcome::Delivered { progress };
                }
                error!("cannot report progress mid-dose: {e}");
                return DoseOutcome::Failed(ErrorCode::UnableToReportProgress);
            }
        }

        clock.sleep_ms(MONITOR_PACE_MS);
    }
}
