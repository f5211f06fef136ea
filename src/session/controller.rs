//! Payment session controller.
//!
//! # Data Flow
//! ```text
//! SessionController (cloneable handle)
//!     → Command (mpsc) → actor task, sole owner of session state
//!         → spawned backend calls   ─┐
//!         → ConfirmationPoller      ─┼→ Internal (epoch-tagged) → actor
//!         → window / quote deadlines ┘
//!     ← watch<SessionSnapshot> + SessionObserver callbacks
//! ```
//!
//! # Design Decisions
//! - Every mutation is serialized through the actor; the handle never
//!   touches session state
//! - Results of spawned work carry the epoch they were issued under and are
//!   dropped once that session is discarded or has finished
//! - Observer callbacks run on the actor task, so once `cancel` or `create`
//!   has replied no callback for the previous session can still arrive
//! - When the window timer and the poll budget race, whichever is handled
//!   first decides the expiry cause

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::backend::{
    BackendError, BackendResult, CreatedSession, PaymentBackend, Plan, SessionId, SessionStatus,
    SettlementProof,
};
use crate::clock::Clock;
use crate::config::CheckoutConfig;
use crate::observability::metrics;
use crate::payments::{
    process_settlement, ConfirmationPoller, ExpiryCause, PollEvent, PollHandle, PollObserver,
    UpgradeError, UpgradeFinalizer, UpgradeRequest,
};
use crate::quoting::{Quote, QuoteTracker, RefreshStart};
use crate::session::demo::DemoFallback;
use crate::session::error::{CheckoutError, CheckoutResult};
use crate::session::events::{ObserverId, Observers, SessionObserver};
use crate::session::state::{Lifecycle, LifecycleEvent, LifecycleState, QuoteFreshness};
use crate::session::types::{PaymentSession, SessionMode, SessionSnapshot, UpgradeStatus};

const COMMAND_BUFFER: usize = 32;

type Reply<T> = oneshot::Sender<CheckoutResult<T>>;

/// Collaborators injected into the controller.
pub struct ControllerDeps {
    pub backend: Arc<dyn PaymentBackend>,
    pub finalizer: Arc<dyn UpgradeFinalizer>,
    pub clock: Arc<dyn Clock>,
}

/// Handle to the controller task. Cheap to clone.
#[derive(Clone)]
pub struct SessionController {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
    observers: Arc<Observers>,
}

impl SessionController {
    /// Spawn the controller task. It runs until `shutdown` fires or every
    /// handle is dropped.
    pub fn spawn(
        deps: ControllerDeps,
        config: &CheckoutConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionSnapshot::default());
        let observers = Arc::new(Observers::new());
        let poller = ConfirmationPoller::new(deps.backend.clone(), &config.polling);

        let actor = Actor {
            deps,
            poller,
            demo: DemoFallback::new(config.demo.clone(), config.pricing.clone()),
            refresh_retry: config.quotes.refresh_retry(),
            observers: observers.clone(),
            state_tx,
            internal_tx,
            lifecycle: Lifecycle::new(),
            epoch: 0,
            pending: None,
            active: None,
            last_request: None,
            last_error: None,
            upgrade: UpgradeStatus::NotApplicable,
        };
        tokio::spawn(actor.run(command_rx, internal_rx, shutdown));

        Self {
            commands: command_tx,
            snapshots: state_rx,
            observers,
        }
    }

    /// Create a new session, discarding the current one first.
    ///
    /// Resolves once the session is awaiting payment (live or demo) or
    /// creation has failed.
    pub async fn create(
        &self,
        plan: Plan,
        payer_email: impl Into<String>,
    ) -> CheckoutResult<PaymentSession> {
        let payer_email = payer_email.into();
        self.call(|reply| Command::Create {
            plan,
            payer_email,
            reply,
        })
        .await
    }

    /// Re-create a failed or expired session with a brand-new id.
    pub async fn retry(&self) -> CheckoutResult<PaymentSession> {
        self.call(|reply| Command::Retry { reply }).await
    }

    /// Refresh the quote. Joins a refresh that is already in flight.
    pub async fn refresh(&self) -> CheckoutResult<Quote> {
        self.call(|reply| Command::Refresh { reply }).await
    }

    /// Current quote of `session_id`, without refreshing it.
    pub async fn request_quote(&self, session_id: &SessionId) -> CheckoutResult<Quote> {
        let session_id = session_id.clone();
        self.call(|reply| Command::RequestQuote { session_id, reply })
            .await
    }

    /// Confirm the current demo session.
    pub async fn simulate_confirmation(&self) -> CheckoutResult<SettlementProof> {
        self.call(|reply| Command::SimulateConfirmation { reply })
            .await
    }

    /// Discard the current session. No callback for it fires after this returns.
    pub async fn cancel(&self) -> CheckoutResult<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Cancel { reply })
            .await
            .map_err(|_| CheckoutError::ControllerClosed)?;
        rx.await.map_err(|_| CheckoutError::ControllerClosed)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn state(&self) -> LifecycleState {
        self.snapshots.borrow().state
    }

    /// Receiver that sees every published snapshot.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    pub fn subscribe(&self, observer: Arc<dyn SessionObserver>) -> ObserverId {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Wait for the controller task to exit.
    pub async fn closed(&self) {
        self.commands.closed().await
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> CheckoutResult<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| CheckoutError::ControllerClosed)?;
        rx.await.map_err(|_| CheckoutError::ControllerClosed)?
    }
}

enum Command {
    Create {
        plan: Plan,
        payer_email: String,
        reply: Reply<PaymentSession>,
    },
    Retry {
        reply: Reply<PaymentSession>,
    },
    Refresh {
        reply: Reply<Quote>,
    },
    RequestQuote {
        session_id: SessionId,
        reply: Reply<Quote>,
    },
    SimulateConfirmation {
        reply: Reply<SettlementProof>,
    },
    Cancel {
        reply: oneshot::Sender<()>,
    },
}

enum Internal {
    Created {
        epoch: u64,
        result: BackendResult<CreatedSession>,
    },
    Refreshed {
        epoch: u64,
        result: BackendResult<Quote>,
    },
    Poll {
        epoch: u64,
        event: PollEvent,
    },
    Finalized {
        session_id: SessionId,
        result: Result<(), UpgradeError>,
    },
}

enum Wake {
    Shutdown,
    Command(Command),
    Internal(Internal),
    WindowElapsed,
    QuoteElapsed,
}

struct PendingCreate {
    plan: Plan,
    payer_email: String,
    reply: Reply<PaymentSession>,
    task: JoinHandle<()>,
}

struct ActiveSession {
    session: PaymentSession,
    quotes: QuoteTracker<Reply<Quote>>,
    poll: Option<PollHandle>,
    refresh_task: Option<JoinHandle<()>>,
    window_deadline: Option<Instant>,
    /// Quote expiry while fresh, next retry while stale, unset while a refresh runs.
    quote_deadline: Option<Instant>,
}

impl ActiveSession {
    /// Stop every timer and task of the session, handing back parked refresh callers.
    fn halt(&mut self) -> Vec<Reply<Quote>> {
        if let Some(poll) = self.poll.take() {
            poll.stop();
        }
        if let Some(task) = self.refresh_task.take() {
            task.abort();
        }
        self.window_deadline = None;
        self.quote_deadline = None;
        self.quotes.fail()
    }
}

/// Forwards poller callbacks into the actor's queue.
struct ChannelObserver {
    epoch: u64,
    tx: mpsc::UnboundedSender<Internal>,
}

impl ChannelObserver {
    fn forward(&self, event: PollEvent) {
        let _ = self.tx.send(Internal::Poll {
            epoch: self.epoch,
            event,
        });
    }
}

impl PollObserver for ChannelObserver {
    fn on_status(&self, _session_id: &SessionId, status: SessionStatus, confirmations: u32) {
        self.forward(PollEvent::Status {
            status,
            confirmations,
        });
    }

    fn on_confirmed(&self, _session_id: &SessionId, proof: SettlementProof) {
        self.forward(PollEvent::Confirmed(proof));
    }

    fn on_expired(&self, _session_id: &SessionId, cause: ExpiryCause) {
        self.forward(PollEvent::Expired(cause));
    }

    fn on_error(&self, _session_id: &SessionId, reason: String) {
        self.forward(PollEvent::Failed(reason));
    }
}

struct Actor {
    deps: ControllerDeps,
    poller: ConfirmationPoller,
    demo: DemoFallback,
    refresh_retry: Duration,
    observers: Arc<Observers>,
    state_tx: watch::Sender<SessionSnapshot>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    lifecycle: Lifecycle,
    epoch: u64,
    pending: Option<PendingCreate>,
    active: Option<ActiveSession>,
    last_request: Option<(Plan, String)>,
    last_error: Option<CheckoutError>,
    upgrade: UpgradeStatus,
}

impl Actor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::debug!("Session controller started");

        loop {
            let window = self.active.as_ref().and_then(|a| a.window_deadline);
            let quote = self.active.as_ref().and_then(|a| a.quote_deadline);

            let wake = tokio::select! {
                biased;
                _ = shutdown.recv() => Wake::Shutdown,
                command = commands.recv() => match command {
                    Some(command) => Wake::Command(command),
                    None => Wake::Shutdown,
                },
                Some(message) = internal.recv() => Wake::Internal(message),
                _ = sleep_until(window) => Wake::WindowElapsed,
                _ = sleep_until(quote) => Wake::QuoteElapsed,
            };

            match wake {
                Wake::Shutdown => break,
                Wake::Command(command) => self.handle_command(command),
                Wake::Internal(message) => self.handle_internal(message),
                Wake::WindowElapsed => self.on_window_elapsed(),
                Wake::QuoteElapsed => self.on_quote_elapsed(),
            }
        }

        self.discard();
        self.publish();
        tracing::info!("Session controller stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Create {
                plan,
                payer_email,
                reply,
            } => self.create(plan, payer_email, reply),
            Command::Retry { reply } => self.retry(reply),
            Command::Refresh { reply } => self.refresh(reply),
            Command::RequestQuote { session_id, reply } => {
                let _ = reply.send(self.request_quote(&session_id));
            }
            Command::SimulateConfirmation { reply } => {
                let _ = reply.send(self.simulate_confirmation());
            }
            Command::Cancel { reply } => {
                self.discard();
                self.publish();
                let _ = reply.send(());
            }
        }
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Created { epoch, result } if epoch == self.epoch => self.on_created(result),
            Internal::Refreshed { epoch, result } if epoch == self.epoch => {
                self.finish_refresh(result.map_err(|e| e.to_string()))
            }
            Internal::Poll { epoch, event } if epoch == self.epoch => self.on_poll_event(event),
            Internal::Finalized { session_id, result } => self.on_finalized(session_id, result),
            _ => tracing::trace!("Dropping result issued for a finished session"),
        }
    }

    // Commands

    fn create(&mut self, plan: Plan, payer_email: String, reply: Reply<PaymentSession>) {
        let payer_email = payer_email.trim().to_string();
        if !is_plausible_email(&payer_email) {
            let _ = reply.send(Err(CheckoutError::InvalidRequest(format!(
                "invalid payer email '{}'",
                payer_email
            ))));
            return;
        }

        self.discard();
        self.last_request = Some((plan, payer_email.clone()));
        self.transition(LifecycleEvent::Begin);
        self.publish();
        self.notify_state();

        tracing::info!(plan = %plan, "Creating payment session");

        let epoch = self.epoch;
        let backend = self.deps.backend.clone();
        let tx = self.internal_tx.clone();
        let email = payer_email.clone();
        let task = tokio::spawn(async move {
            let result = backend.create_session(plan, &email).await;
            let _ = tx.send(Internal::Created { epoch, result });
        });

        self.pending = Some(PendingCreate {
            plan,
            payer_email,
            reply,
            task,
        });
    }

    fn retry(&mut self, reply: Reply<PaymentSession>) {
        let state = self.lifecycle.state();
        if !matches!(state, LifecycleState::Error | LifecycleState::Expired { .. }) {
            let _ = reply.send(Err(CheckoutError::InvalidSessionState { state }));
            return;
        }
        match self.last_request.clone() {
            Some((plan, payer_email)) => self.create(plan, payer_email, reply),
            None => {
                let _ = reply.send(Err(CheckoutError::NoActiveSession));
            }
        }
    }

    fn refresh(&mut self, reply: Reply<Quote>) {
        let state = self.lifecycle.state();
        if self.active.is_none() {
            let _ = reply.send(Err(CheckoutError::NoActiveSession));
        } else if !state.is_awaiting_payment() {
            let _ = reply.send(Err(CheckoutError::InvalidSessionState { state }));
        } else {
            self.start_refresh(Some(reply));
        }
    }

    fn request_quote(&self, session_id: &SessionId) -> CheckoutResult<Quote> {
        let active = self
            .active
            .as_ref()
            .filter(|a| &a.session.id == session_id)
            .ok_or_else(|| CheckoutError::NotFound(session_id.clone()))?;

        let state = self.lifecycle.state();
        if !state.is_awaiting_payment() {
            return Err(CheckoutError::InvalidSessionState { state });
        }

        let quote = active.quotes.current();
        if quote.is_expired(self.deps.clock.now_ms()) {
            return Err(CheckoutError::StaleQuote(quote.clone()));
        }
        Ok(quote.clone())
    }

    fn simulate_confirmation(&mut self) -> CheckoutResult<SettlementProof> {
        let active = self.active.as_ref().ok_or(CheckoutError::NoActiveSession)?;
        if !active.session.is_demo() {
            return Err(CheckoutError::NotDemoSession);
        }
        let state = self.lifecycle.state();
        if !state.is_awaiting_payment() {
            return Err(CheckoutError::InvalidSessionState { state });
        }

        let proof = self.demo.simulate_confirmation(&active.session.id);
        self.confirm(proof.clone());
        Ok(proof)
    }

    // Session setup and teardown

    fn on_created(&mut self, result: BackendResult<CreatedSession>) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let now = self.deps.clock.now_ms();

        let outcome = match result {
            Ok(created) => validate_created(&created, now)
                .map(|()| PaymentSession::live(created, pending.plan, pending.payer_email.clone()))
                .map_err(CheckoutError::CreationFailure),
            Err(BackendError::Unreachable(reason)) if self.demo.enabled() => {
                tracing::warn!(
                    error = %reason,
                    "Payment backend unreachable, falling back to demo session"
                );
                self.demo
                    .synthesize(pending.plan, pending.payer_email.clone(), now)
                    .map_err(|e| {
                        CheckoutError::InvalidRequest(format!("cannot build demo quote: {}", e))
                    })
            }
            Err(e) => Err(CheckoutError::CreationFailure(e)),
        };

        match outcome {
            Ok(session) => {
                self.install(session.clone());
                let _ = pending.reply.send(Ok(session));
            }
            Err(error) => {
                tracing::warn!(plan = %pending.plan, error = %error, "Payment session creation failed");
                self.transition(LifecycleEvent::CreationFailed);
                self.last_error = Some(error.clone());
                metrics::record_session_finished("error");
                self.publish();
                self.notify_state();
                self.observers.notify(|o| o.on_error(None, &error));
                let _ = pending.reply.send(Err(error));
            }
        }
    }

    fn install(&mut self, session: PaymentSession) {
        let poll = match session.mode {
            SessionMode::Live => {
                let observer = Arc::new(ChannelObserver {
                    epoch: self.epoch,
                    tx: self.internal_tx.clone(),
                });
                Some(self.poller.start(session.id.clone(), observer))
            }
            SessionMode::Demo => None,
        };

        metrics::record_session_created(session.mode.as_str());
        tracing::info!(
            session_id = %session.id,
            mode = %session.mode,
            amount_sats = session.quote.amount_sats,
            window_expires_at_ms = session.payment_window_expires_at_ms,
            "Payment session created"
        );

        let session_id = session.id.clone();
        let quote = session.quote.clone();
        self.active = Some(ActiveSession {
            window_deadline: Some(self.deps.clock.deadline_for(session.payment_window_expires_at_ms)),
            quote_deadline: Some(self.deps.clock.deadline_for(quote.expires_at_ms)),
            quotes: QuoteTracker::new(quote.clone()),
            poll,
            refresh_task: None,
            session,
        });
        self.transition(LifecycleEvent::Created);
        self.publish();
        self.notify_state();
        self.observers.notify(|o| o.on_quote(&session_id, &quote));
    }

    /// Drop the current session and everything running for it. Silent.
    fn discard(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.task.abort();
            let _ = pending.reply.send(Err(CheckoutError::Cancelled));
        }
        if let Some(mut active) = self.active.take() {
            for waiter in active.halt() {
                let _ = waiter.send(Err(CheckoutError::Cancelled));
            }
            tracing::info!(session_id = %active.session.id, "Payment session discarded");
        }

        self.epoch += 1;
        self.transition(LifecycleEvent::Cancel);
        self.last_error = None;
        self.upgrade = UpgradeStatus::NotApplicable;
    }

    /// Enter a terminal state and stop everything tied to the session.
    fn finish(&mut self, event: LifecycleEvent, status: SessionStatus) -> Option<SessionId> {
        if !self.transition(event) {
            return None;
        }
        self.epoch += 1;

        let state = self.lifecycle.state();
        metrics::record_session_finished(state.as_str());

        let active = self.active.as_mut()?;
        active.session.status = status;
        for waiter in active.halt() {
            let _ = waiter.send(Err(CheckoutError::InvalidSessionState { state }));
        }
        Some(active.session.id.clone())
    }

    // Timers

    fn on_window_elapsed(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.window_deadline = None;
        }
        if self.lifecycle.state().is_awaiting_payment() {
            self.expire(ExpiryCause::PaymentWindowElapsed);
        }
    }

    fn on_quote_elapsed(&mut self) {
        let now = self.deps.clock.now_ms();
        let fresh = self.lifecycle.state()
            == LifecycleState::AwaitingPayment {
                freshness: QuoteFreshness::Fresh,
            };
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.quote_deadline = None;

        let current = active.quotes.current();
        if !current.is_expired(now) && fresh {
            active.quote_deadline = Some(self.deps.clock.deadline_for(current.expires_at_ms));
            return;
        }

        if fresh {
            tracing::info!(
                session_id = %active.session.id,
                expired_at_ms = current.expires_at_ms,
                "Quote expired, refreshing"
            );
            self.transition(LifecycleEvent::QuoteStale);
            self.publish();
            self.notify_state();
        }
        self.start_refresh(None);
    }

    // Quote refresh

    fn start_refresh(&mut self, waiter: Option<Reply<Quote>>) {
        let Some(active) = self.active.as_mut() else {
            if let Some(waiter) = waiter {
                let _ = waiter.send(Err(CheckoutError::NoActiveSession));
            }
            return;
        };

        if active.quotes.begin_refresh(waiter) == RefreshStart::Joined {
            tracing::debug!(session_id = %active.session.id, "Joining in-flight quote refresh");
            return;
        }

        if active.session.is_demo() {
            let now = self.deps.clock.now_ms();
            let candidate = self
                .demo
                .requote(active.session.plan, active.quotes.current(), now)
                .map_err(|e| e.to_string());
            self.finish_refresh(candidate);
            return;
        }

        let epoch = self.epoch;
        let backend = self.deps.backend.clone();
        let tx = self.internal_tx.clone();
        let session_id = active.session.id.clone();
        active.refresh_task = Some(tokio::spawn(async move {
            let result = backend.refresh_quote(&session_id).await;
            let _ = tx.send(Internal::Refreshed { epoch, result });
        }));
    }

    fn finish_refresh(&mut self, outcome: Result<Quote, String>) {
        let now = self.deps.clock.now_ms();
        let fresh = self.lifecycle.state()
            == LifecycleState::AwaitingPayment {
                freshness: QuoteFreshness::Fresh,
            };
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.refresh_task = None;

        let (waiters, verdict) = match outcome {
            Ok(candidate) => {
                let (waiters, verdict) = active.quotes.complete(candidate, now);
                (waiters, verdict.map_err(|e| e.to_string()))
            }
            Err(reason) => (active.quotes.fail(), Err(reason)),
        };
        let session_id = active.session.id.clone();

        match verdict {
            Ok(()) => {
                let quote = active.quotes.current().clone();
                active.session.quote = quote.clone();
                active.quote_deadline = Some(self.deps.clock.deadline_for(quote.expires_at_ms));

                metrics::record_quote_refresh("ok");
                tracing::info!(
                    session_id = %session_id,
                    amount_sats = quote.amount_sats,
                    expires_at_ms = quote.expires_at_ms,
                    "Quote refreshed"
                );

                self.transition(LifecycleEvent::QuoteRefreshed);
                self.publish();
                if !fresh {
                    self.notify_state();
                }
                self.observers.notify(|o| o.on_quote(&session_id, &quote));
                for waiter in waiters {
                    let _ = waiter.send(Ok(quote.clone()));
                }
            }
            Err(reason) => {
                let current = active.quotes.current();
                let run_out = current.is_expired(now);
                active.quote_deadline = Some(if run_out {
                    Instant::now() + self.refresh_retry
                } else {
                    self.deps.clock.deadline_for(current.expires_at_ms)
                });

                metrics::record_quote_refresh("failed");
                tracing::warn!(
                    session_id = %session_id,
                    error = %reason,
                    "Quote refresh failed, keeping previous quote"
                );

                if run_out && fresh {
                    self.transition(LifecycleEvent::QuoteStale);
                    self.publish();
                    self.notify_state();
                }
                let error = CheckoutError::QuoteRefreshFailure(reason);
                for waiter in waiters {
                    let _ = waiter.send(Err(error.clone()));
                }
            }
        }
    }

    // Outcomes

    fn on_poll_event(&mut self, event: PollEvent) {
        match event {
            PollEvent::Status {
                status,
                confirmations,
            } => {
                let Some(active) = self.active.as_mut() else {
                    return;
                };
                active.session.status = status;
                active.session.confirmations = confirmations;
                let session_id = active.session.id.clone();
                self.publish();
                self.observers
                    .notify(|o| o.on_status(&session_id, status, confirmations));
            }
            PollEvent::Confirmed(proof) => self.confirm(proof),
            PollEvent::Expired(cause) => self.expire(cause),
            PollEvent::Failed(reason) => self.fail(reason),
        }
    }

    fn confirm(&mut self, proof: SettlementProof) {
        let Some(session_id) = self.finish(LifecycleEvent::Confirm, SessionStatus::Confirmed) else {
            return;
        };
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.session.confirmations = active.session.confirmations.max(proof.confirmations);
        active.session.settlement_proof = Some(proof.clone());

        tracing::info!(
            session_id = %session_id,
            confirmations = proof.confirmations,
            synthetic = proof.synthetic,
            "Payment confirmed"
        );

        if proof.synthetic || active.session.is_demo() {
            self.upgrade = UpgradeStatus::Skipped;
        } else {
            self.upgrade = UpgradeStatus::Pending;
            let request = UpgradeRequest {
                session_id: session_id.clone(),
                plan: active.session.plan,
                payer_email: active.session.payer_email.clone(),
                proof: proof.clone(),
            };
            let finalizer = self.deps.finalizer.clone();
            let tx = self.internal_tx.clone();
            // Not aborted on discard: the payment has settled either way
            tokio::spawn(async move {
                let result = process_settlement(finalizer.as_ref(), &request).await;
                let _ = tx.send(Internal::Finalized {
                    session_id: request.session_id,
                    result,
                });
            });
        }

        self.publish();
        self.notify_state();
        self.observers.notify(|o| o.on_confirmed(&session_id, &proof));
    }

    fn expire(&mut self, cause: ExpiryCause) {
        let Some(session_id) = self.finish(LifecycleEvent::Expire(cause), SessionStatus::Expired) else {
            return;
        };
        tracing::info!(session_id = %session_id, cause = %cause, "Payment session expired");

        self.last_error = Some(CheckoutError::SessionExpired(cause));
        self.publish();
        self.notify_state();
        self.observers.notify(|o| o.on_expired(&session_id, cause));
    }

    fn fail(&mut self, reason: String) {
        let Some(session_id) = self.finish(LifecycleEvent::Fail, SessionStatus::Error) else {
            return;
        };
        tracing::error!(session_id = %session_id, reason = %reason, "Payment session failed");

        let error = CheckoutError::SessionFailed(reason);
        self.last_error = Some(error.clone());
        self.publish();
        self.notify_state();
        self.observers.notify(|o| o.on_error(Some(&session_id), &error));
    }

    fn on_finalized(&mut self, session_id: SessionId, result: Result<(), UpgradeError>) {
        let current = self.active.as_ref().map(|a| &a.session.id);
        if current != Some(&session_id) {
            return;
        }

        match result {
            Ok(()) => {
                self.upgrade = UpgradeStatus::Completed;
                self.publish();
            }
            Err(e) => {
                self.upgrade = UpgradeStatus::Failed(e.to_string());
                let error = CheckoutError::SettlementUpgradeFailure(e);
                self.last_error = Some(error.clone());
                self.publish();
                self.observers.notify(|o| o.on_error(Some(&session_id), &error));
            }
        }
    }

    // Plumbing

    fn transition(&mut self, event: LifecycleEvent) -> bool {
        match self.lifecycle.apply(event) {
            Ok(state) => {
                tracing::debug!(state = %state, "Lifecycle transition");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring lifecycle event");
                false
            }
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(SessionSnapshot {
            state: self.lifecycle.state(),
            session: self.active.as_ref().map(|a| a.session.clone()),
            last_error: self.last_error.clone(),
            upgrade: self.upgrade.clone(),
        });
    }

    fn notify_state(&self) {
        let state = self.lifecycle.state();
        let session_id = self.active.as_ref().map(|a| &a.session.id);
        self.observers
            .notify(|o| o.on_state_change(session_id, state));
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn validate_created(created: &CreatedSession, now_ms: u64) -> BackendResult<()> {
    created
        .quote
        .validate(now_ms)
        .map_err(|e| BackendError::InvalidResponse(format!("session quote rejected: {}", e)))?;
    if created.payment_window_expires_at_ms <= now_ms {
        return Err(BackendError::InvalidResponse(format!(
            "payment window already closed at {}",
            created.payment_window_expires_at_ms
        )));
    }
    Ok(())
}

fn is_plausible_email(email: &str) -> bool {
    matches!(email.split_once('@'), Some((local, domain)) if !local.is_empty() && !domain.is_empty())
}
