use std::sync::Arc;

use crate::collaborators::{EVENT_ORPHAN_CLEARED, EventSink, attributes};
use crate::store::StoreError;
use crate::timer::model::Token;
use crate::timer::store::TimerStore;
use crate::wake::WakeSchedulerAdapter;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RecoveryOutcome {
    Idle,
    Consistent(Token),
    OrphanCleared(Token),
    CorruptCleared,
}

/// Startup repair of the persisted timer against the wake scheduler.
///
/// Never re-arms: a lost registration means the deadline can no longer be
/// honoured, so the record is dropped.
pub struct RecoveryReconciler {
    store: Arc<TimerStore>,
    wake: Arc<WakeSchedulerAdapter>,
    events: Arc<dyn EventSink>,
}

impl RecoveryReconciler {
    pub fn new(
        store: Arc<TimerStore>,
        wake: Arc<WakeSchedulerAdapter>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            wake,
            events,
        }
    }

    pub fn reconcile(&self) -> Result<RecoveryOutcome, StoreError> {
        let guard = self.store.lock();
        let timer = match guard.load() {
            Ok(Some(timer)) => timer,
            Ok(None) => return Ok(RecoveryOutcome::Idle),
            Err(err @ (StoreError::Corrupt { .. } | StoreError::InvalidJson { .. })) => {
                tracing::warn!(error = %err, "clearing unreadable timer record");
                guard.clear()?;
                return Ok(RecoveryOutcome::CorruptCleared);
            }
            Err(err) => return Err(err),
        };

        if self.wake.is_armed(&timer.token) {
            tracing::debug!(token = %timer.token, "armed timer is still registered");
            return Ok(RecoveryOutcome::Consistent(timer.token));
        }

        guard.clear()?;
        tracing::warn!(
            token = %timer.token,
            mode = %timer.mode,
            fire_at_epoch_ms = timer.fire_at_epoch_ms,
            "cleared sleep timer whose wake registration was lost"
        );
        self.events.record(
            EVENT_ORPHAN_CLEARED,
            &attributes([("mode", timer.mode.tag().to_string())]),
        );
        Ok(RecoveryOutcome::OrphanCleared(timer.token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{DurableStore, MemoryStore};
    use crate::testing::{FakeEventSink, FakeWakeScheduler};
    use crate::timer::model::{ScheduledTimer, TimerMode};
    use crate::timer::store::{DEFAULT_RECORD_KEY, StoreKeys};
    use crate::wake::WakeScheduler;

    fn setup() -> (
        RecoveryReconciler,
        Arc<MemoryStore>,
        Arc<TimerStore>,
        FakeWakeScheduler,
        FakeEventSink,
    ) {
        let backend = Arc::new(MemoryStore::new());
        let store = Arc::new(TimerStore::new(backend.clone(), StoreKeys::default()));
        let wake = FakeWakeScheduler::new();
        let events = FakeEventSink::new();
        let adapter = Arc::new(WakeSchedulerAdapter::new(
            Arc::new(wake.clone()),
            Arc::new(ManualClock::new(0)),
        ));
        let reconciler =
            RecoveryReconciler::new(Arc::clone(&store), adapter, Arc::new(events.clone()));
        (reconciler, backend, store, wake, events)
    }

    #[test]
    fn idle_store_is_left_alone() {
        let (reconciler, backend, _, wake, _) = setup();
        assert_eq!(reconciler.reconcile().expect("reconcile"), RecoveryOutcome::Idle);
        assert!(backend.is_empty());
        assert!(wake.disarm_calls().is_empty());
    }

    #[test]
    fn live_registration_keeps_timer() {
        let (reconciler, _, store, wake, events) = setup();
        let timer = ScheduledTimer::new(TimerMode::fixed(30), 0, Token::from("live"));
        store.lock().replace(&timer).expect("seed");
        wake.arm(timer.fire_at_epoch_ms, &timer.token).expect("register");

        assert_eq!(
            reconciler.reconcile().expect("reconcile"),
            RecoveryOutcome::Consistent(Token::from("live"))
        );
        assert_eq!(store.read().expect("read"), Some(timer));
        assert!(events.events().is_empty());
    }

    #[test]
    fn orphaned_record_is_cleared_without_rearming() {
        let (reconciler, _, store, wake, events) = setup();
        let timer = ScheduledTimer::new(TimerMode::EndOfContent, 0, Token::from("lost"));
        store.lock().replace(&timer).expect("seed");

        assert_eq!(
            reconciler.reconcile().expect("reconcile"),
            RecoveryOutcome::OrphanCleared(Token::from("lost"))
        );
        assert!(store.read().expect("read").is_none());
        assert!(wake.arm_calls().is_empty());
        assert_eq!(events.names(), vec![EVENT_ORPHAN_CLEARED.to_string()]);
    }

    #[test]
    fn corrupt_record_is_cleared() {
        let (reconciler, backend, _, _, _) = setup();
        backend
            .put(DEFAULT_RECORD_KEY, r#"{"version":1,"is_active":true}"#)
            .expect("put");
        assert_eq!(
            reconciler.reconcile().expect("reconcile"),
            RecoveryOutcome::CorruptCleared
        );
        assert!(backend.is_empty());
    }
}
