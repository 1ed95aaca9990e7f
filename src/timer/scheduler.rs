use std::sync::Arc;

use thiserror::Error;

use crate::clock::Clock;
use crate::collaborators::{EVENT_ARMED, EVENT_CANCELLED, EventSink, attributes};
use crate::store::StoreError;
use crate::timer::countdown::{self, Remaining};
use crate::timer::model::{ScheduledTimer, TimerConfiguration, TimerMode, Token};
use crate::timer::store::TimerStore;
use crate::wake::{WakeError, WakeSchedulerAdapter};

#[derive(Debug, Error)]
pub enum ArmError {
    #[error("permission to schedule exact wake-ups is required to arm the sleep timer")]
    PermissionDenied,
    #[error("sleep timer would fire at {fire_at_epoch_ms}, which is not after now ({now_epoch_ms})")]
    PastDeadline {
        fire_at_epoch_ms: i64,
        now_epoch_ms: i64,
    },
    #[error("unable to schedule the sleep timer: {0}")]
    AdapterFailure(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<WakeError> for ArmError {
    fn from(err: WakeError) -> Self {
        match err {
            WakeError::PermissionDenied => ArmError::PermissionDenied,
            WakeError::Stale {
                fire_at_epoch_ms,
                now_epoch_ms,
            } => ArmError::PastDeadline {
                fire_at_epoch_ms,
                now_epoch_ms,
            },
            WakeError::Rejected(reason) => ArmError::AdapterFailure(reason),
        }
    }
}

/// Single-slot timer state machine.
///
/// At most one timer is armed. Arming while armed replaces the old timer;
/// a failed arm leaves the stored record and its registration untouched.
pub struct TimerScheduler {
    store: Arc<TimerStore>,
    wake: Arc<WakeSchedulerAdapter>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
}

impl TimerScheduler {
    pub fn new(
        store: Arc<TimerStore>,
        wake: Arc<WakeSchedulerAdapter>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            wake,
            clock,
            events,
        }
    }

    pub fn arm(&self, mode: TimerMode) -> Result<ScheduledTimer, ArmError> {
        let guard = self.store.lock();
        let previous = match guard.load() {
            Ok(previous) => previous,
            Err(err @ (StoreError::Corrupt { .. } | StoreError::InvalidJson { .. })) => {
                tracing::warn!(error = %err, "replacing unreadable timer record");
                None
            }
            Err(err) => return Err(err.into()),
        };

        let now_epoch_ms = self.clock.now_epoch_ms();
        let timer = ScheduledTimer::new(mode, now_epoch_ms, Token::generate());
        if timer.fire_at_epoch_ms <= now_epoch_ms {
            return Err(ArmError::PastDeadline {
                fire_at_epoch_ms: timer.fire_at_epoch_ms,
                now_epoch_ms,
            });
        }

        self.wake.arm(timer.fire_at_epoch_ms, &timer.token)?;
        if let Err(err) = guard.replace(&timer) {
            self.wake.disarm(&timer.token);
            return Err(err.into());
        }
        if let Some(previous) = &previous
            && !self.wake.disarm(&previous.token)
        {
            tracing::debug!(token = %previous.token, "replaced timer had no live registration");
        }
        drop(guard);

        tracing::info!(
            token = %timer.token,
            mode = %timer.mode,
            fire_at_epoch_ms = timer.fire_at_epoch_ms,
            replaced = previous.is_some(),
            "sleep timer armed"
        );
        if let Err(err) = self.store.save_configuration(&TimerConfiguration::from_mode(mode)) {
            tracing::warn!(error = %err, "failed to remember timer selection");
        }
        self.events.record(
            EVENT_ARMED,
            &attributes([
                ("mode", mode.tag().to_string()),
                (
                    "duration_minutes",
                    mode.minutes().map(|m| m.to_string()).unwrap_or_default(),
                ),
            ]),
        );
        Ok(timer)
    }

    /// Disarms and clears the current timer. `Ok(false)` when none was armed.
    pub fn cancel(&self) -> Result<bool, StoreError> {
        let guard = self.store.lock();
        let timer = match guard.load() {
            Ok(Some(timer)) => timer,
            Ok(None) => return Ok(false),
            Err(err @ (StoreError::Corrupt { .. } | StoreError::InvalidJson { .. })) => {
                tracing::warn!(error = %err, "clearing unreadable timer record");
                guard.clear()?;
                return Ok(false);
            }
            Err(err) => return Err(err),
        };

        guard.clear()?;
        let removed = self.wake.disarm(&timer.token);
        drop(guard);

        tracing::info!(token = %timer.token, mode = %timer.mode, removed, "sleep timer cancelled");
        self.events.record(
            EVENT_CANCELLED,
            &attributes([("mode", timer.mode.tag().to_string())]),
        );
        Ok(true)
    }

    pub fn is_active(&self) -> bool {
        self.current().is_some()
    }

    pub fn current(&self) -> Option<ScheduledTimer> {
        match self.store.read() {
            Ok(timer) => timer,
            Err(err) => {
                tracing::warn!(error = %err, "unable to read timer record");
                None
            }
        }
    }

    /// Countdown for the armed timer, if any.
    pub fn remaining(&self) -> Option<Remaining> {
        let timer = self.current()?;
        Some(countdown::remaining(
            timer.fire_at_epoch_ms,
            self.clock.now_epoch_ms(),
        ))
    }

    pub fn last_selection(&self) -> TimerConfiguration {
        self.store.configuration().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "unable to read timer selection");
            TimerConfiguration::default()
        })
    }

    pub fn remember_selection(&self, configuration: &TimerConfiguration) -> Result<(), StoreError> {
        self.store.save_configuration(configuration)
    }

    pub fn reset_selection(&self) -> Result<(), StoreError> {
        self.store.clear_configuration()
    }

    pub fn has_permission(&self) -> bool {
        self.wake.has_permission()
    }

    pub fn request_permission(&self) {
        self.wake.request_permission();
    }
}
