//! Shared utilities for integration testing.
#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal_macros::dec;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use btc_checkout::backend::{
    BackendError, BackendResult, CreatedSession, PaymentBackend, Plan, SessionId, SessionStatus,
    SettlementProof, StatusReport,
};
use btc_checkout::clock::{Clock, TokioClock};
use btc_checkout::config::CheckoutConfig;
use btc_checkout::payments::{
    ExpiryCause, PollEvent, PollObserver, UpgradeError, UpgradeFinalizer, UpgradeRequest,
};
use btc_checkout::quoting::Quote;
use btc_checkout::session::{CheckoutError, LifecycleState, SessionObserver};

/// Fixed unix start time for paused-clock tests.
pub const T0: u64 = 1_700_000_000_000;

pub fn test_clock() -> Arc<TokioClock> {
    Arc::new(TokioClock::starting_at(T0))
}

pub fn test_config() -> CheckoutConfig {
    CheckoutConfig::default()
}

pub fn confirmed_proof(secret: &str) -> SettlementProof {
    SettlementProof {
        txid: Some("f4184fc596403b9d638783cf57adfe4c75c605f6356fbc91338530e9831e9e16".to_string()),
        confirmations: 1,
        unlock_secret: Some(secret.to_string()),
        synthetic: false,
    }
}

pub fn confirmed_report(secret: &str) -> StatusReport {
    StatusReport {
        status: SessionStatus::Confirmed,
        confirmations: 1,
        settlement_proof: Some(confirmed_proof(secret)),
    }
}

type StatusScript = Box<dyn FnMut(u32) -> BackendResult<StatusReport> + Send>;

/// In-process backend with scripted behaviour and call counters.
pub struct ScriptedBackend {
    clock: Arc<dyn Clock>,
    quote_validity: Duration,
    window: Duration,
    next_id: AtomicU32,
    create_calls: AtomicU32,
    refresh_calls: AtomicU32,
    status_calls: AtomicU32,
    last_quoted_at: Mutex<u64>,
    create_error: Mutex<Option<BackendError>>,
    create_delay: Mutex<Duration>,
    refresh_error: Mutex<Option<BackendError>>,
    refresh_delay: Mutex<Duration>,
    status_script: Mutex<StatusScript>,
}

impl ScriptedBackend {
    /// 120s quotes, 30 minute window, always pending.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            quote_validity: Duration::from_secs(120),
            window: Duration::from_secs(30 * 60),
            next_id: AtomicU32::new(0),
            create_calls: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
            last_quoted_at: Mutex::new(0),
            create_error: Mutex::new(None),
            create_delay: Mutex::new(Duration::ZERO),
            refresh_error: Mutex::new(None),
            refresh_delay: Mutex::new(Duration::ZERO),
            status_script: Mutex::new(Box::new(|_| Ok(StatusReport::pending(0)))),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn fail_create(&self, error: Option<BackendError>) {
        *self.create_error.lock().unwrap() = error;
    }

    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = delay;
    }

    pub fn fail_refresh(&self, error: Option<BackendError>) {
        *self.refresh_error.lock().unwrap() = error;
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    /// Script status checks by 1-based attempt number.
    pub fn script_status(
        &self,
        script: impl FnMut(u32) -> BackendResult<StatusReport> + Send + 'static,
    ) {
        *self.status_script.lock().unwrap() = Box::new(script);
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    fn next_quote(&self) -> Quote {
        let mut last = self.last_quoted_at.lock().unwrap();
        let quoted_at = self.clock.now_ms().max(*last + 1);
        *last = quoted_at;
        Quote::new(dec!(0.0005), dec!(60000), quoted_at, self.quote_validity).unwrap()
    }
}

#[async_trait]
impl PaymentBackend for ScriptedBackend {
    async fn create_session(&self, _plan: Plan, _payer_email: &str) -> BackendResult<CreatedSession> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.create_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.create_error.lock().unwrap().clone() {
            return Err(error);
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CreatedSession {
            session_id: SessionId::new(format!("sess-{}", n)),
            address: format!("bc1qscripted{}", n),
            quote: self.next_quote(),
            payment_window_expires_at_ms: self.clock.now_ms() + self.window.as_millis() as u64,
        })
    }

    async fn refresh_quote(&self, _session_id: &SessionId) -> BackendResult<Quote> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.refresh_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.refresh_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.next_quote())
    }

    async fn get_status(&self, _session_id: &SessionId) -> BackendResult<StatusReport> {
        let attempt = self.status_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut script = self.status_script.lock().unwrap();
        (*script)(attempt)
    }
}

/// Poll observer that records everything it is told.
#[derive(Default)]
pub struct RecordingPollObserver {
    events: Mutex<Vec<PollEvent>>,
}

impl RecordingPollObserver {
    pub fn events(&self) -> Vec<PollEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&PollEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

impl PollObserver for RecordingPollObserver {
    fn on_status(&self, _session_id: &SessionId, status: SessionStatus, confirmations: u32) {
        self.events.lock().unwrap().push(PollEvent::Status {
            status,
            confirmations,
        });
    }

    fn on_confirmed(&self, _session_id: &SessionId, proof: SettlementProof) {
        self.events.lock().unwrap().push(PollEvent::Confirmed(proof));
    }

    fn on_expired(&self, _session_id: &SessionId, cause: ExpiryCause) {
        self.events.lock().unwrap().push(PollEvent::Expired(cause));
    }

    fn on_error(&self, _session_id: &SessionId, reason: String) {
        self.events.lock().unwrap().push(PollEvent::Failed(reason));
    }
}

/// One controller callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    State(Option<SessionId>, LifecycleState),
    Status(SessionId, SessionStatus, u32),
    Quote(SessionId, u64),
    Confirmed(SessionId, SettlementProof),
    Expired(SessionId, ExpiryCause),
    Error(Option<SessionId>, CheckoutError),
}

impl Recorded {
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Recorded::State(id, _) | Recorded::Error(id, _) => id.as_ref(),
            Recorded::Status(id, _, _)
            | Recorded::Quote(id, _)
            | Recorded::Confirmed(id, _)
            | Recorded::Expired(id, _) => Some(id),
        }
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn count(&self, pred: impl Fn(&Recorded) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    fn push(&self, event: Recorded) {
        self.events.lock().unwrap().push(event);
    }
}

impl SessionObserver for RecordingObserver {
    fn on_state_change(&self, session_id: Option<&SessionId>, state: LifecycleState) {
        self.push(Recorded::State(session_id.cloned(), state));
    }

    fn on_status(&self, session_id: &SessionId, status: SessionStatus, confirmations: u32) {
        self.push(Recorded::Status(session_id.clone(), status, confirmations));
    }

    fn on_quote(&self, session_id: &SessionId, quote: &Quote) {
        self.push(Recorded::Quote(session_id.clone(), quote.expires_at_ms));
    }

    fn on_confirmed(&self, session_id: &SessionId, proof: &SettlementProof) {
        self.push(Recorded::Confirmed(session_id.clone(), proof.clone()));
    }

    fn on_expired(&self, session_id: &SessionId, cause: ExpiryCause) {
        self.push(Recorded::Expired(session_id.clone(), cause));
    }

    fn on_error(&self, session_id: Option<&SessionId>, error: &CheckoutError) {
        self.push(Recorded::Error(session_id.cloned(), error.clone()));
    }
}

/// Upgrade collaborator that records requests and can be told to fail.
#[derive(Default)]
pub struct RecordingFinalizer {
    requests: Mutex<Vec<UpgradeRequest>>,
    failure: Mutex<Option<UpgradeError>>,
}

impl RecordingFinalizer {
    pub fn failing(error: UpgradeError) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            failure: Mutex::new(Some(error)),
        }
    }

    pub fn requests(&self) -> Vec<UpgradeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpgradeFinalizer for RecordingFinalizer {
    async fn finalize(&self, request: &UpgradeRequest) -> Result<(), UpgradeError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Start a programmable HTTP backend on an ephemeral port.
///
/// The handler receives method, path and body and returns status and body.
pub async fn start_http_backend<F>(handler: F) -> SocketAddr
where
    F: Fn(&str, &str, &str) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        let Some((method, path, body)) = read_request(&mut socket).await else {
                            return;
                        };
                        let (status, body) = handler(&method, &path, &body);
                        let response_str = format!(
                            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status,
                            reason_phrase(status),
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a backend that answers every request with a redirect to `location`.
pub async fn start_redirecting_backend(location: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if read_request(&mut socket).await.is_none() {
                    return;
                }
                let response_str = format!(
                    "HTTP/1.1 307 Temporary Redirect\r\nLocation: {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    location
                );
                let _ = socket.write_all(response_str.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Start a backend that accepts connections but never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    addr
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

async fn read_request(socket: &mut TcpStream) -> Option<(String, String, String)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body = String::from_utf8_lossy(&buf[head_end..]).to_string();
    Some((method, path, body))
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        409 => "Conflict",
        410 => "Gone",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
