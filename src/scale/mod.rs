//! Weight measurement and server-driven calibration.
//!
//! A measurement is an average of sequential raw ADC samples; any single
//! sample failure fails the whole measurement so a dose never acts on a
//! half-averaged reading.  Calibration is reconciled against the server:
//! every weight report answers with the parameters the server wants the
//! device to use, and the device adopts whatever differs.

use crate::app::ports::{ClockPort, ScaleDriverPort, StoragePort};
use crate::app::store::DeviceStore;
use crate::config::ScaleCalibration;
use crate::error::SampleError;
use crate::protocol::client::DeviceClient;
use crate::protocol::transport::HttpExchange;
use log::{error, info, warn};

/// Samples averaged for a settled reading (baselines, calibration).
pub const SETTLED_SAMPLE_COUNT: u32 = 20;
/// Samples averaged while the pump is running and latency matters.
pub const FAST_SAMPLE_COUNT: u32 = 10;
/// Per-sample data-ready timeout.
pub const SAMPLE_TIMEOUT_MS: u32 = 500;

/// One averaged scale reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub weight: f32,
    pub raw: i32,
}

impl Measurement {
    /// Reported when the hardware cannot produce a reading during
    /// calibration.  The server must still see a report to answer with
    /// (possibly corrected) parameters, so a failed measurement is
    /// substituted with this explicit zero reading rather than dropped.
    pub const ZERO_FALLBACK: Measurement = Measurement { weight: 0.0, raw: 0 };
}

/// Result of one calibration exchange with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStatus {
    /// Measurement succeeded, nothing changed, server is content.
    Satisfied,
    /// Something failed or changed; run another pass.
    NeedsAnotherPass,
}

pub struct WeightScale {
    calibration: ScaleCalibration,
}

impl WeightScale {
    pub fn new(calibration: ScaleCalibration) -> Self {
        Self { calibration }
    }

    pub fn calibration(&self) -> ScaleCalibration {
        self.calibration
    }

    /// Average `sample_count` raw samples and convert to grams.
    pub fn measure(
        &self,
        driver: &mut impl ScaleDriverPort,
        sample_count: u32,
    ) -> Result<Measurement, SampleError> {
        debug_assert!(sample_count > 0);
        let mut sum: i64 = 0;
        for _ in 0..sample_count {
            sum += i64::from(driver.read_sample(SAMPLE_TIMEOUT_MS)?);
        }
        let raw = (sum / i64::from(sample_count)) as i32;
        Ok(Measurement {
            weight: self.calibration.weight_of(raw),
            raw,
        })
    }

    /// One calibration pass: measure, report, reconcile.
    ///
    /// Returns [`CalibrationStatus::Satisfied`] only when the measurement
    /// succeeded, the server issued identical parameters, and the server
    /// no longer asks for calibration.
    pub fn calibration_pass<S: StoragePort, E: HttpExchange>(
        &mut self,
        driver: &mut impl ScaleDriverPort,
        client: &mut DeviceClient<E>,
        store: &mut DeviceStore<S>,
        clock: &impl ClockPort,
    ) -> CalibrationStatus {
        let (measurement, measured) = match self.measure(driver, SETTLED_SAMPLE_COUNT) {
            Ok(m) => (m, true),
            Err(e) => {
                warn!("calibration measurement failed ({e}), reporting zero fallback");
                (Measurement::ZERO_FALLBACK, false)
            }
        };

        let report =
            match client.report_weight(store, clock, measurement.weight, measurement.raw) {
                Ok(report) => report,
                Err(e) => {
                    error!("weight report failed: {e}");
                    return CalibrationStatus::NeedsAnotherPass;
                }
            };

        let changed = report.calibration != self.calibration;
        if changed {
            info!(
                "adopting server calibration: pins {}/{}, offset {}, scale {}",
                report.calibration.signal_pin,
                report.calibration.clock_pin,
                report.calibration.offset,
                report.calibration.scale,
            );
            if store.set_scale_calibration(&report.calibration).is_err() {
                warn!("failed to persist calibration");
            }
            let pins_changed = !report.calibration.same_pins(&self.calibration);
            self.calibration = report.calibration;
            if pins_changed
                && driver
                    .reinit(self.calibration.signal_pin, self.calibration.clock_pin)
                    .is_err()
            {
                warn!("scale driver re-init failed on new pins");
            }
        }

        if measured && !changed && !report.needs_calibration {
            CalibrationStatus::Satisfied
        } else {
            CalibrationStatus::NeedsAnotherPass
        }
    }
}
