//! Protocol-level behavior against a scripted HTTP exchange: retry
//! timing, response validation, and action decoding end to end.

use crate::mock_hw::{MockClock, ScriptedExchange, fast_client, provisioned_store, urls};
use autobar::protocol::action::DeviceAction;
use autobar::protocol::client::{DeviceClient, ProtocolError};
use autobar::protocol::transport::TransportError;

#[test]
fn retries_wait_thirty_seconds_between_attempts() {
    let clock = MockClock::new();
    let store = provisioned_store();
    let (mut exchange, requests) = ScriptedExchange::new();
    exchange
        .push_error()
        .push_error()
        .push_json(r#"{"action": "standby"}"#);
    // Default policy, so the inter-attempt delay is real.
    let mut client = DeviceClient::new(exchange);

    let action = client.request_action(&store, &clock).unwrap();
    assert_eq!(action, DeviceAction::Standby { idle_ms: 1000 });
    assert_eq!(requests.borrow().len(), 3);
    assert_eq!(*clock.sleeps.borrow(), vec![30_000, 30_000]);
}

#[test]
fn four_failed_attempts_exhaust_the_transport() {
    let clock = MockClock::new();
    let store = provisioned_store();
    let (exchange, requests) = ScriptedExchange::new();
    let mut client = fast_client(exchange);

    let err = client.request_action(&store, &clock).unwrap_err();
    assert_eq!(err, ProtocolError::Transport(TransportError::Exhausted));
    assert_eq!(requests.borrow().len(), 4);
}

#[test]
fn non_200_status_counts_as_a_failed_attempt() {
    let clock = MockClock::new();
    let store = provisioned_store();
    let (mut exchange, requests) = ScriptedExchange::new();
    exchange
        .push_status(503, "busy")
        .push_json(r#"{"action": "standby", "idle": 250}"#);
    let mut client = fast_client(exchange);

    let action = client.request_action(&store, &clock).unwrap();
    assert_eq!(action, DeviceAction::Standby { idle_ms: 250 });
    assert_eq!(requests.borrow().len(), 2);
}

#[test]
fn ok_status_with_unparsable_body_counts_as_a_failed_attempt() {
    let clock = MockClock::new();
    let store = provisioned_store();
    let (mut exchange, requests) = ScriptedExchange::new();
    exchange
        .push_json("<html>502 Bad Gateway</html>")
        .push_json(r#"{"action": "standby"}"#);
    let mut client = fast_client(exchange);

    assert!(client.request_action(&store, &clock).is_ok());
    assert_eq!(requests.borrow().len(), 2);
}

#[test]
fn pump_action_decodes_into_a_full_command() {
    let clock = MockClock::new();
    let store = provisioned_store();
    let (mut exchange, _) = ScriptedExchange::new();
    exchange.push_json(
        r#"{"action": "pump", "orderId": "o-9", "doseId": "d-3",
            "pumpGpio": 26, "doseWeight": 40.0, "doseWeightProgress": 12.5}"#,
    );
    let mut client = fast_client(exchange);

    let DeviceAction::Pump(cmd) = client.request_action(&store, &clock).unwrap() else {
        panic!("expected a pump action");
    };
    assert_eq!(cmd.order_id, "o-9");
    assert_eq!(cmd.dose_id, "d-3");
    assert_eq!(cmd.pump_pin, 26);
    assert!((cmd.target_weight - 40.0).abs() < f32::EPSILON);
    assert!((cmd.remaining() - 27.5).abs() < 0.001);
}

#[test]
fn pump_action_missing_a_field_is_a_schema_error_not_a_partial_command() {
    let clock = MockClock::new();
    let store = provisioned_store();
    let (mut exchange, _) = ScriptedExchange::new();
    exchange.push_json(
        r#"{"action": "pump", "orderId": "o-9", "doseId": "d-3",
            "doseWeight": 40.0, "doseWeightProgress": 0.0}"#,
    );
    let mut client = fast_client(exchange);

    let err = client.request_action(&store, &clock).unwrap_err();
    assert_eq!(err, ProtocolError::Schema("action"));
}

#[test]
fn unknown_action_verb_is_a_server_error_value() {
    let clock = MockClock::new();
    let store = provisioned_store();
    let (mut exchange, _) = ScriptedExchange::new();
    exchange.push_json(r#"{"action": "defrost"}"#);
    let mut client = fast_client(exchange);

    let action = client.request_action(&store, &clock).unwrap();
    assert_eq!(action, DeviceAction::ServerError);
}

#[test]
fn stored_trailing_slash_never_doubles_in_request_urls() {
    let clock = MockClock::new();
    let mut store = provisioned_store();
    store.set_server_url("https://bar.example.com/").unwrap();
    let (mut exchange, requests) = ScriptedExchange::new();
    exchange.push_json(r#"{"action": "standby"}"#);
    let mut client = fast_client(exchange);

    client.request_action(&store, &clock).unwrap();
    assert_eq!(
        urls(&requests),
        vec!["https://bar.example.com/api/devices/action".to_owned()]
    );
}
