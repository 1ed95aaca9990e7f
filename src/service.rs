use std::sync::Arc;

use crate::clock::Clock;
use crate::collaborators::{ContentAdvanceSink, EventSink, PlaybackController};
use crate::store::{DurableStore, StoreError};
use crate::timer::recovery::{RecoveryOutcome, RecoveryReconciler};
use crate::timer::scheduler::TimerScheduler;
use crate::timer::model::Token;
use crate::timer::store::{StoreKeys, TimerStore};
use crate::timer::trigger::{FireOutcome, TriggerHandler};
use crate::wake::{WakeScheduler, WakeSchedulerAdapter};

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ServiceConfig {
    pub keys: StoreKeys,
}

pub struct Collaborators {
    pub store: Arc<dyn DurableStore>,
    pub wake: Arc<dyn WakeScheduler>,
    pub playback: Arc<dyn PlaybackController>,
    pub advance: Arc<dyn ContentAdvanceSink>,
    pub events: Arc<dyn EventSink>,
    pub clock: Arc<dyn Clock>,
}

/// A started sleep timer. Construction reconciles the persisted record with
/// the wake scheduler, so every instance begins from an honest state.
pub struct SleepTimerService {
    scheduler: TimerScheduler,
    trigger: TriggerHandler,
    recovery: RecoveryOutcome,
}

impl SleepTimerService {
    pub fn start(collaborators: Collaborators) -> Result<Self, StoreError> {
        Self::start_with_config(collaborators, ServiceConfig::default())
    }

    pub fn start_with_config(
        collaborators: Collaborators,
        config: ServiceConfig,
    ) -> Result<Self, StoreError> {
        let (service, _) = Self::start_for_wake(collaborators, config, &[])?;
        Ok(service)
    }

    /// Starts a process that was launched to deliver wake-ups.
    ///
    /// The platform drops a one-shot registration as it delivers it, so each
    /// token is handed to the trigger handler before recovery runs. Outcomes
    /// are returned in delivery order.
    pub fn start_for_wake(
        collaborators: Collaborators,
        config: ServiceConfig,
        deliveries: &[Token],
    ) -> Result<(Self, Vec<FireOutcome>), StoreError> {
        let Collaborators {
            store,
            wake,
            playback,
            advance,
            events,
            clock,
        } = collaborators;

        let store = Arc::new(TimerStore::new(store, config.keys));
        let wake = Arc::new(WakeSchedulerAdapter::new(wake, Arc::clone(&clock)));
        let trigger = TriggerHandler::new(
            Arc::clone(&store),
            Arc::clone(&wake),
            playback,
            advance,
            Arc::clone(&events),
        );
        let outcomes = deliveries
            .iter()
            .map(|token| trigger.on_fire(token))
            .collect::<Vec<_>>();

        let recovery =
            RecoveryReconciler::new(Arc::clone(&store), Arc::clone(&wake), Arc::clone(&events))
                .reconcile()?;
        tracing::debug!(?recovery, "sleep timer recovery finished");

        let scheduler = TimerScheduler::new(store, wake, clock, events);
        Ok((
            Self {
                scheduler,
                trigger,
                recovery,
            },
            outcomes,
        ))
    }

    pub fn scheduler(&self) -> &TimerScheduler {
        &self.scheduler
    }

    pub fn trigger(&self) -> &TriggerHandler {
        &self.trigger
    }

    /// What startup recovery found.
    pub fn recovery(&self) -> &RecoveryOutcome {
        &self.recovery
    }
}
