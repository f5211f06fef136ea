//! Confirmation poller integration tests (paused tokio clock).

mod common;

use std::sync::Arc;
use std::time::Duration;

use btc_checkout::backend::{BackendError, SessionId, SessionStatus, StatusReport};
use btc_checkout::config::PollingConfig;
use btc_checkout::payments::{ConfirmationPoller, ExpiryCause, PollEvent};

use common::{confirmed_proof, confirmed_report, test_clock, RecordingPollObserver, ScriptedBackend};

fn poller(backend: Arc<ScriptedBackend>, max_attempts: u32) -> ConfirmationPoller {
    let config = PollingConfig {
        interval_secs: 5,
        max_attempts,
    };
    ConfirmationPoller::new(backend, &config)
}

fn is_status(event: &PollEvent) -> bool {
    matches!(event, PollEvent::Status { .. })
}

#[tokio::test(start_paused = true)]
async fn test_pending_for_whole_budget_expires_exactly_once() {
    let backend = Arc::new(ScriptedBackend::new(test_clock()));
    let observer = Arc::new(RecordingPollObserver::default());

    let handle = poller(backend.clone(), 360).start(SessionId::new("sess-1"), observer.clone());

    // 360 ticks at 5s spacing is 30 minutes; wait well past it
    tokio::time::sleep(Duration::from_secs(30 * 60 + 120)).await;

    assert_eq!(backend.status_calls(), 360);
    assert_eq!(handle.attempts(), 360);
    assert_eq!(observer.count(is_status), 360);
    assert_eq!(
        observer.count(|e| matches!(e, PollEvent::Expired(_))),
        1,
        "expiry must fire exactly once"
    );
    assert_eq!(
        observer.events().last(),
        Some(&PollEvent::Expired(ExpiryCause::PollBudgetExhausted))
    );
    assert!(!handle.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_confirmation_on_tick_twelve_stops_polling() {
    let backend = Arc::new(ScriptedBackend::new(test_clock()));
    backend.script_status(|attempt| {
        if attempt == 12 {
            Ok(confirmed_report("k-12"))
        } else {
            Ok(StatusReport::pending(0))
        }
    });
    let observer = Arc::new(RecordingPollObserver::default());

    let _handle = poller(backend.clone(), 360).start(SessionId::new("sess-1"), observer.clone());

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert_eq!(backend.status_calls(), 11);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(backend.status_calls(), 12, "no tick after confirmation");

    let events = observer.events();
    assert_eq!(events.len(), 13);
    assert_eq!(
        events[11],
        PollEvent::Status {
            status: SessionStatus::Confirmed,
            confirmations: 1
        }
    );
    assert_eq!(events[12], PollEvent::Confirmed(confirmed_proof("k-12")));
}

#[tokio::test(start_paused = true)]
async fn test_failed_checks_are_missed_ticks() {
    let backend = Arc::new(ScriptedBackend::new(test_clock()));
    backend.script_status(|attempt| match attempt {
        1..=3 => Err(BackendError::Timeout(10)),
        6 => Ok(confirmed_report("k-6")),
        _ => Ok(StatusReport::pending(0)),
    });
    let observer = Arc::new(RecordingPollObserver::default());

    let _handle = poller(backend.clone(), 360).start(SessionId::new("sess-1"), observer.clone());
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(backend.status_calls(), 6);
    // Checks 4, 5 and 6 succeeded
    assert_eq!(observer.count(is_status), 3);
    assert_eq!(observer.count(|e| matches!(e, PollEvent::Confirmed(_))), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_backend_degrades_to_expiry() {
    let backend = Arc::new(ScriptedBackend::new(test_clock()));
    backend.script_status(|_| Err(BackendError::Unreachable("connection refused".to_string())));
    let observer = Arc::new(RecordingPollObserver::default());

    let _handle = poller(backend.clone(), 10).start(SessionId::new("sess-1"), observer.clone());
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(backend.status_calls(), 10);
    assert_eq!(
        observer.events(),
        vec![PollEvent::Expired(ExpiryCause::PollBudgetExhausted)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_backend_declared_expiry_and_error() {
    let backend = Arc::new(ScriptedBackend::new(test_clock()));
    backend.script_status(|attempt| {
        let status = if attempt == 3 {
            SessionStatus::Expired
        } else {
            SessionStatus::Pending
        };
        Ok(StatusReport {
            status,
            confirmations: 0,
            settlement_proof: None,
        })
    });
    let observer = Arc::new(RecordingPollObserver::default());
    let _handle = poller(backend.clone(), 360).start(SessionId::new("sess-1"), observer.clone());
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(backend.status_calls(), 3);
    assert_eq!(
        observer.events().last(),
        Some(&PollEvent::Expired(ExpiryCause::BackendDeclared))
    );

    let backend = Arc::new(ScriptedBackend::new(test_clock()));
    backend.script_status(|_| {
        Ok(StatusReport {
            status: SessionStatus::Error,
            confirmations: 0,
            settlement_proof: None,
        })
    });
    let observer = Arc::new(RecordingPollObserver::default());
    let _handle = poller(backend.clone(), 360).start(SessionId::new("sess-2"), observer.clone());
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(backend.status_calls(), 1);
    assert_eq!(observer.count(|e| matches!(e, PollEvent::Failed(_))), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent_and_silences_callbacks() {
    let backend = Arc::new(ScriptedBackend::new(test_clock()));
    let observer = Arc::new(RecordingPollObserver::default());

    let handle = poller(backend.clone(), 360).start(SessionId::new("sess-1"), observer.clone());
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(observer.events().len(), 2);

    handle.stop();
    handle.stop();
    assert!(!handle.is_active());

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(observer.events().len(), 2);
    assert_eq!(backend.status_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_stops_loop() {
    let backend = Arc::new(ScriptedBackend::new(test_clock()));
    let observer = Arc::new(RecordingPollObserver::default());

    let handle = poller(backend.clone(), 360).start(SessionId::new("sess-1"), observer.clone());
    tokio::time::sleep(Duration::from_secs(7)).await;
    drop(handle);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(backend.status_calls(), 1);
}
