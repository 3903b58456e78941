//! Dose delivery wired to the real protocol client: progress reports go
//! over the scripted HTTP exchange, so these tests check the exact wire
//! bodies a dose produces, not just the reporter trait calls.

use crate::mock_hw::{
    MockClock, MockPump, PumpEvent, ScriptedExchange, ScriptedScaleDriver, bodies_for, fast_client,
    provisioned_store,
};
use autobar::app::ports::ClockPort;
use autobar::app::store::DeviceStore;
use autobar::config::ScaleCalibration;
use autobar::error::ErrorCode;
use autobar::protocol::action::DoseCommand;
use autobar::protocol::client::{DeviceClient, ProtocolError};
use autobar::pump::{self, DoseOutcome, DoseReporter, STALL_WINDOW_MS};
use autobar::scale::WeightScale;

/// Forwards progress onto the protocol client, the way the device does.
struct HttpReporter<'a> {
    client: &'a mut DeviceClient<ScriptedExchange>,
    store: &'a DeviceStore<crate::mock_hw::MemStorage>,
    clock: &'a MockClock,
}

impl DoseReporter for HttpReporter<'_> {
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

fn identity_scale() -> WeightScale {
    WeightScale::new(ScaleCalibration {
        signal_pin: 4,
        clock_pin: 5,
        offset: 0,
        scale: 1.0,
    })
}

fn cmd(target: f32, progress: f32) -> DoseCommand {
    DoseCommand {
        order_id: "o-1".to_owned(),
        dose_id: "d-1".to_owned(),
        pump_pin: 26,
        target_weight: target,
        progress_weight: progress,
    }
}

#[test]
fn dose_posts_progress_bodies_with_token_and_ids() {
    let clock = MockClock::new();
    let store = provisioned_store();
    let scale = identity_scale();
    let mut driver = ScriptedScaleDriver::new(130);
    driver
        .push_reading(100, 20) // baseline
        .push_reading(115, 10)
        .push_reading(130, 10);
    let mut pump_gpio = MockPump::new();
    let (mut exchange, requests) = ScriptedExchange::new();
    exchange
        .push_json(r#"{"message": "ok", "continue": true}"#)
        .push_json(r#"{"message": "ok", "continue": true}"#);
    let mut client = fast_client(exchange);
    let mut reporter = HttpReporter {
        client: &mut client,
        store: &store,
        clock: &clock,
    };

    let outcome = pump::run_dose(
        &cmd(30.0, 0.0),
        &scale,
        &mut driver,
        &mut pump_gpio,
        &mut reporter,
        &clock,
    );
    assert_eq!(outcome, DoseOutcome::Delivered { progress: 30.0 });

    let bodies = bodies_for(&requests, "/api/devices/progress");
    assert_eq!(bodies.len(), 2);
    for body in &bodies {
        assert_eq!(body["orderId"], "o-1");
        assert_eq!(body["doseId"], "d-1");
        assert_eq!(body["token"], "tok-abc");
    }
    assert_eq!(bodies[0]["weightProgress"], 15.0);
    assert_eq!(bodies[1]["weightProgress"], 30.0);

    let events = pump_gpio.events.borrow().clone();
    assert_eq!(events[0], PumpEvent::Energize(26));
    assert!(!pump_gpio.left_on());
}

#[test]
fn server_continue_false_over_http_stops_the_dose() {
    let clock = MockClock::new();
    let store = provisioned_store();
    let scale = identity_scale();
    let mut driver = ScriptedScaleDriver::new(100);
    driver.push_reading(100, 20).push_reading(118, 10);
    let mut pump_gpio = MockPump::new();
    let (mut exchange, _) = ScriptedExchange::new();
    exchange.push_json(r#"{"message": "order cancelled", "continue": false}"#);
    let mut client = fast_client(exchange);
    let mut reporter = HttpReporter {
        client: &mut client,
        store: &store,
        clock: &clock,
    };

    let outcome = pump::run_dose(
        &cmd(50.0, 0.0),
        &scale,
        &mut driver,
        &mut pump_gpio,
        &mut reporter,
        &clock,
    );
    assert_eq!(outcome, DoseOutcome::Stopped { progress: 18.0 });
    assert!(!pump_gpio.left_on());
}

#[test]
fn unreachable_server_mid_dose_cuts_the_pump() {
    let clock = MockClock::new();
    let store = provisioned_store();
    let scale = identity_scale();
    let mut driver = ScriptedScaleDriver::new(100);
    driver.push_reading(100, 20).push_reading(110, 10);
    let mut pump_gpio = MockPump::new();
    // No scripted responses: every progress attempt fails.
    let (exchange, requests) = ScriptedExchange::new();
    let mut client = fast_client(exchange);
    let mut reporter = HttpReporter {
        client: &mut client,
        store: &store,
        clock: &clock,
    };

    let outcome = pump::run_dose(
        &cmd(50.0, 0.0),
        &scale,
        &mut driver,
        &mut pump_gpio,
        &mut reporter,
        &clock,
    );
    assert_eq!(
        outcome,
        DoseOutcome::Failed(ErrorCode::UnableToReportProgress)
    );
    assert!(!pump_gpio.left_on());
    assert_eq!(requests.borrow().len(), 4, "one full retry cycle");
}

#[test]
fn flat_weight_stalls_after_the_window_even_with_a_healthy_server() {
    let clock = MockClock::new();
    let store = provisioned_store();
    let scale = identity_scale();
    // Baseline 100, then 100 forever.
    let mut driver = ScriptedScaleDriver::new(100);
    driver.push_reading(100, 20);
    let mut pump_gpio = MockPump::new();
    let (mut exchange, _) = ScriptedExchange::new();
    for _ in 0..400 {
        exchange.push_json(r#"{"message": "ok", "continue": true}"#);
    }
    let mut client = fast_client(exchange);
    let mut reporter = HttpReporter {
        client: &mut client,
        store: &store,
        clock: &clock,
    };

    let outcome = pump::run_dose(
        &cmd(50.0, 0.0),
        &scale,
        &mut driver,
        &mut pump_gpio,
        &mut reporter,
        &clock,
    );
    assert_eq!(outcome, DoseOutcome::Failed(ErrorCode::NoWeightChange));
    assert!(clock.now_ms() > STALL_WINDOW_MS);
    assert!(!pump_gpio.left_on());
}
