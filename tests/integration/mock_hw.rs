//! Mock ports for integration tests.
//!
//! Every mock records its call history so tests can assert on full
//! command timelines (what was sent, in what order, with the pump in
//! which state) without touching real GPIO or sockets.

#![allow(dead_code)]

use autobar::app::ports::{ClockPort, NetworkPort, OtaPort, PumpPort, ScaleDriverPort, StoragePort};
use autobar::app::store::DeviceStore;
use autobar::error::{OtaError, SampleError, StorageError};
use autobar::protocol::client::DeviceClient;
use autobar::protocol::transport::{HttpError, HttpExchange, HttpResponse, RetryPolicy};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

// ── Clock ─────────────────────────────────────────────────────

/// Virtual clock: `sleep_ms` advances time instead of waiting.
pub struct MockClock {
    now: Cell<u64>,
    pub sleeps: RefCell<Vec<u32>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            now: Cell::new(0),
            sleeps: RefCell::new(Vec::new()),
        }
    }

    pub fn set_now(&self, ms: u64) {
        self.now.set(ms);
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockPort for MockClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn sleep_ms(&self, ms: u32) {
        self.now.set(self.now.get() + u64::from(ms));
        self.sleeps.borrow_mut().push(ms);
    }
}

// ── Storage ───────────────────────────────────────────────────

pub struct MemStorage {
    store: HashMap<String, Vec<u8>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self {
            store: HashMap::new(),
        }
    }
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StoragePort for MemStorage {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let v = self
            .store
            .get(&format!("{}::{}", namespace, key))
            .ok_or(StorageError::NotFound)?;
        let n = v.len().min(buf.len());
        buf[..n].copy_from_slice(&v[..n]);
        Ok(n)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.store
            .insert(format!("{}::{}", namespace, key), data.to_vec());
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.store.contains_key(&format!("{}::{}", namespace, key))
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.store.remove(&format!("{}::{}", namespace, key));
        Ok(())
    }
}

/// A store with WiFi, server URL and token already configured.
pub fn provisioned_store() -> DeviceStore<MemStorage> {
    let mut store = DeviceStore::new(MemStorage::new());
    store.set_wifi_credentials("BarNet", "password1").unwrap();
    store.set_server_url("https://bar.example.com").unwrap();
    store.set_api_token("tok-abc").unwrap();
    store
}

// ── HTTP exchange ─────────────────────────────────────────────

/// Scripted HTTP exchange; the request log stays accessible through an
/// `Rc` handle after the exchange moves into the client.
pub struct ScriptedExchange {
    responses: VecDeque<Result<HttpResponse, HttpError>>,
    requests: Rc<RefCell<Vec<(String, String)>>>,
}

pub type RequestLog = Rc<RefCell<Vec<(String, String)>>>;

impl ScriptedExchange {
    pub fn new() -> (Self, RequestLog) {
        let requests = RequestLog::default();
        (
            Self {
                responses: VecDeque::new(),
                requests: Rc::clone(&requests),
            },
            requests,
        )
    }

    /// Queue an HTTP 200 with the given JSON body.
    pub fn push_json(&mut self, body: &str) -> &mut Self {
        self.responses.push_back(Ok(HttpResponse {
            status: 200,
            body: body.to_owned(),
        }));
        self
    }

    pub fn push_status(&mut self, status: u16, body: &str) -> &mut Self {
        self.responses.push_back(Ok(HttpResponse {
            status,
            body: body.to_owned(),
        }));
        self
    }

    pub fn push_error(&mut self) -> &mut Self {
        self.responses.push_back(Err(HttpError::Connect));
        self
    }
}

impl HttpExchange for ScriptedExchange {
    fn post_json(&mut self, url: &str, body: &str) -> Result<HttpResponse, HttpError> {
        self.requests
            .borrow_mut()
            .push((url.to_owned(), body.to_owned()));
        self.responses.pop_front().unwrap_or(Err(HttpError::Connect))
    }

    fn get(&mut self, url: &str) -> Result<HttpResponse, HttpError> {
        self.requests.borrow_mut().push((url.to_owned(), String::new()));
        self.responses.pop_front().unwrap_or(Err(HttpError::Connect))
    }
}

/// Client with the standard attempt count but no inter-attempt delay, so
/// exhaustion tests don't advance the virtual clock by minutes.
pub fn fast_client(exchange: ScriptedExchange) -> DeviceClient<ScriptedExchange> {
    DeviceClient::with_policy(
        exchange,
        RetryPolicy {
            max_attempts: 4,
            retry_delay_ms: 0,
        },
    )
}

/// All URLs that were requested, in order.
pub fn urls(log: &RequestLog) -> Vec<String> {
    log.borrow().iter().map(|(url, _)| url.clone()).collect()
}

/// Parsed JSON bodies of requests whose URL contains `fragment`.
pub fn bodies_for(log: &RequestLog, fragment: &str) -> Vec<serde_json::Value> {
    log.borrow()
        .iter()
        .filter(|(url, _)| url.contains(fragment))
        .map(|(_, body)| serde_json::from_str(body).unwrap())
        .collect()
}

// ── Scale driver ──────────────────────────────────────────────

/// Raw-sample script: queued readings first, then `idle_raw` forever.
pub struct ScriptedScaleDriver {
    samples: VecDeque<Result<i32, SampleError>>,
    idle_raw: i32,
    pub reinits: Vec<(u8, u8)>,
}

impl ScriptedScaleDriver {
    pub fn new(idle_raw: i32) -> Self {
        Self {
            samples: VecDeque::new(),
            idle_raw,
            reinits: Vec::new(),
        }
    }

    /// Queue one averaged reading's worth of identical samples.
    pub fn push_reading(&mut self, raw: i32, samples: u32) -> &mut Self {
        for _ in 0..samples {
            self.samples.push_back(Ok(raw));
        }
        self
    }

    pub fn push_failure(&mut self) -> &mut Self {
        self.samples.push_back(Err(SampleError::Timeout));
        self
    }
}

impl ScaleDriverPort for ScriptedScaleDriver {
    fn read_sample(&mut self, _timeout_ms: u32) -> Result<i32, SampleError> {
        self.samples.pop_front().unwrap_or(Ok(self.idle_raw))
    }

    fn reinit(&mut self, signal_pin: u8, clock_pin: u8) -> Result<(), SampleError> {
        self.reinits.push((signal_pin, clock_pin));
        Ok(())
    }
}

// ── Pump ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpEvent {
    Energize(u8),
    Release(u8),
}

pub struct MockPump {
    pub events: Rc<RefCell<Vec<PumpEvent>>>,
    on: bool,
}

impl MockPump {
    pub fn new() -> Self {
        Self {
            events: Rc::default(),
            on: false,
        }
    }

    pub fn left_on(&self) -> bool {
        self.on
    }
}

impl Default for MockPump {
    fn default() -> Self {
        Self::new()
    }
}

impl PumpPort for MockPump {
    fn energize(&mut self, pin: u8) {
        self.on = true;
        self.events.borrow_mut().push(PumpEvent::Energize(pin));
    }

    fn release(&mut self, pin: u8) {
        self.on = false;
        self.events.borrow_mut().push(PumpEvent::Release(pin));
    }

    fn is_on(&self) -> bool {
        self.on
    }
}

// ── Network ───────────────────────────────────────────────────

pub struct MockNetwork {
    pub reachable: bool,
    pub connects: Vec<(String, String)>,
}

impl MockNetwork {
    pub fn reachable() -> Self {
        Self {
            reachable: true,
            connects: Vec::new(),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            connects: Vec::new(),
        }
    }
}

impl NetworkPort for MockNetwork {
    fn connect(&mut self, ssid: &str, password: &str) -> bool {
        self.connects.push((ssid.to_owned(), password.to_owned()));
        self.reachable
    }
}

// ── OTA ───────────────────────────────────────────────────────

pub struct MockOta {
    pub upgrades: Vec<String>,
}

impl MockOta {
    pub fn new() -> Self {
        Self {
            upgrades: Vec::new(),
        }
    }
}

impl Default for MockOta {
    fn default() -> Self {
        Self::new()
    }
}

impl OtaPort for MockOta {
    fn upgrade(&mut self, firmware_url: &str) -> Result<core::convert::Infallible, OtaError> {
        self.upgrades.push(firmware_url.to_owned());
        Err(OtaError::Failed)
    }
}
