use lethe_rs::{deduplicate, DedupGate, Effect, EventId, GateConfig, HandlerError, Outcome};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

// Example service that uses the macro
struct AlarmService {
    gate: Arc<DedupGate>,
    sent: AtomicU32,
}

#[derive(Debug, Clone)]
struct Alarm {
    event_id: String,
    open_id: String,
    fail: bool,
}

impl AlarmService {
    fn new() -> Self {
        Self {
            gate: Arc::new(DedupGate::from_config(&GateConfig::default())),
            sent: AtomicU32::new(0),
        }
    }

    /// Send an alarm card at most once per event
    #[deduplicate(gate = self.gate, id = alarm.event_id.clone())]
    async fn send_alarm(&self, alarm: Alarm) -> Result<Effect, HandlerError> {
        if alarm.fail {
            return Err(HandlerError::transient(format!(
                "could not reach {}",
                alarm.open_id
            )));
        }
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(Effect::Committed)
    }

    /// Identifier computed from the arguments
    #[deduplicate(gate = self.gate, id = Self::menu_key(&open_id, &event_key))]
    async fn on_menu_click(&self, open_id: String, event_key: String) -> Result<Effect, HandlerError> {
        if event_key != "send_alarm" {
            return Ok(Effect::Uncommitted);
        }
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(Effect::Committed)
    }

    fn menu_key(open_id: &str, event_key: &str) -> EventId {
        EventId::new(format!("{open_id}:{event_key}"))
    }
}

fn alarm(event_id: &str) -> Alarm {
    Alarm {
        event_id: event_id.to_string(),
        open_id: "ou_test".to_string(),
        fail: false,
    }
}

#[tokio::test]
async fn test_deduplicate_macro_basic() {
    let service = AlarmService::new();
    let event_id = Uuid::new_v4().to_string();

    let first = service.send_alarm(alarm(&event_id)).await.unwrap();
    assert_eq!(first, Outcome::Success { committed: true });

    let second = service.send_alarm(alarm(&event_id)).await.unwrap();
    assert_eq!(second, Outcome::Duplicate);

    assert_eq!(service.sent.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_deduplicate_macro_failure_releases() {
    let service = AlarmService::new();
    let event_id = Uuid::new_v4().to_string();

    let failing = Alarm {
        fail: true,
        ..alarm(&event_id)
    };
    let first = service.send_alarm(failing).await.unwrap();
    assert_eq!(
        first,
        Outcome::Failure {
            retryable: true,
            reason: "Transient failure: could not reach ou_test".to_string()
        }
    );

    let retry = service.send_alarm(alarm(&event_id)).await.unwrap();
    assert_eq!(retry, Outcome::Success { committed: true });
    assert_eq!(service.sent.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_deduplicate_macro_computed_id() {
    let service = AlarmService::new();

    for _ in 0..3 {
        service
            .on_menu_click("ou_a".to_string(), "send_alarm".to_string())
            .await
            .unwrap();
    }
    let other_user = service
        .on_menu_click("ou_b".to_string(), "send_alarm".to_string())
        .await
        .unwrap();

    assert_eq!(other_user, Outcome::Success { committed: true });
    assert_eq!(service.sent.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_deduplicate_macro_uncommitted_runs_again() {
    let service = AlarmService::new();

    for _ in 0..2 {
        let outcome = service
            .on_menu_click("ou_a".to_string(), "help".to_string())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Success { committed: false });
    }
    assert_eq!(service.sent.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_deduplicate_macro_concurrent() {
    let service = Arc::new(AlarmService::new());
    let event_id = Uuid::new_v4().to_string();

    let mut handles = vec![];
    for _ in 0..20 {
        let service = Arc::clone(&service);
        let event_id = event_id.clone();
        handles.push(tokio::spawn(async move {
            service.send_alarm(alarm(&event_id)).await.unwrap()
        }));
    }

    let outcomes: Vec<Outcome> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(outcomes.iter().filter(|o| o.is_duplicate()).count(), 19);
    assert_eq!(service.sent.load(Ordering::SeqCst), 1);
}
