use std::sync::Arc;

use crate::collaborators::{
    ContentAdvanceSink, EVENT_COMPLETED, EventSink, PlaybackController, attributes,
};
use crate::timer::model::{ScheduledTimer, TimerMode, Token};
use crate::timer::store::{TimerStore, TimerStoreGuard};
use crate::wake::WakeSchedulerAdapter;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FireOutcome {
    PlaybackPaused,
    NoActiveSession,
    AdvanceSignalled,
    Ignored,
    StoreUnavailable,
}

/// Reacts to wake deliveries using only what the durable store says.
pub struct TriggerHandler {
    store: Arc<TimerStore>,
    wake: Arc<WakeSchedulerAdapter>,
    playback: Arc<dyn PlaybackController>,
    advance: Arc<dyn ContentAdvanceSink>,
    events: Arc<dyn EventSink>,
}

impl TriggerHandler {
    pub fn new(
        store: Arc<TimerStore>,
        wake: Arc<WakeSchedulerAdapter>,
        playback: Arc<dyn PlaybackController>,
        advance: Arc<dyn ContentAdvanceSink>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            wake,
            playback,
            advance,
            events,
        }
    }

    /// Handles a wake delivery for `token`. Never fails; deliveries that do
    /// not match the armed timer are dropped.
    pub fn on_fire(&self, token: &Token) -> FireOutcome {
        let guard = self.store.lock();
        let timer = match guard.load() {
            Ok(Some(timer)) if timer.token == *token => timer,
            Ok(Some(timer)) => {
                tracing::warn!(%token, armed = %timer.token, "ignoring stale wake delivery");
                return FireOutcome::Ignored;
            }
            Ok(None) => {
                tracing::warn!(%token, "ignoring wake delivery with no armed timer");
                return FireOutcome::Ignored;
            }
            Err(err) => {
                tracing::warn!(%token, error = %err, "unable to read timer record on wake");
                clear(&guard);
                return FireOutcome::StoreUnavailable;
            }
        };
        self.complete(&guard, timer)
    }

    /// Called by the playback layer when the current item ends.
    pub fn on_content_finished(&self) -> FireOutcome {
        let guard = self.store.lock();
        match guard.load() {
            Ok(Some(timer)) if timer.is_end_of_content() => {
                self.wake.disarm(&timer.token);
                self.complete(&guard, timer)
            }
            Ok(_) => FireOutcome::Ignored,
            Err(err) => {
                tracing::warn!(error = %err, "unable to read timer record at end of content");
                clear(&guard);
                FireOutcome::StoreUnavailable
            }
        }
    }

    fn complete(&self, guard: &TimerStoreGuard<'_>, timer: ScheduledTimer) -> FireOutcome {
        let outcome = match timer.mode {
            TimerMode::FixedDuration { minutes } => {
                let paused = self.playback.has_active_session();
                if paused {
                    self.playback.pause();
                }
                self.events.record(
                    EVENT_COMPLETED,
                    &attributes([
                        ("mode", timer.mode.tag().to_string()),
                        ("duration_minutes", minutes.to_string()),
                        ("playback_paused", paused.to_string()),
                    ]),
                );
                if paused {
                    FireOutcome::PlaybackPaused
                } else {
                    FireOutcome::NoActiveSession
                }
            }
            TimerMode::EndOfContent => {
                self.advance.signal_advance();
                self.events.record(
                    EVENT_COMPLETED,
                    &attributes([("mode", timer.mode.tag().to_string())]),
                );
                FireOutcome::AdvanceSignalled
            }
        };
        clear(guard);
        tracing::info!(token = %timer.token, mode = %timer.mode, ?outcome, "sleep timer fired");
        outcome
    }
}

fn clear(guard: &TimerStoreGuard<'_>) {
    if let Err(err) = guard.clear() {
        tracing::error!(error = %err, "failed to clear timer record after wake");
    }
}
