//! Recording fakes for the timer's collaborators.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::collaborators::{ContentAdvanceSink, EventSink, PlaybackController};
use crate::store::{DurableStore, MemoryStore, StoreError};
use crate::timer::model::Token;
use crate::wake::{SchedulerError, WakeScheduler};

#[derive(Default)]
struct FakeWakeState {
    registrations: HashMap<Token, i64>,
    arm_calls: Vec<(i64, Token)>,
    disarm_calls: Vec<Token>,
    permission_denied: bool,
    permission_requests: usize,
    next_arm_error: Option<SchedulerError>,
}

#[derive(Clone, Default)]
pub struct FakeWakeScheduler {
    inner: Arc<Mutex<FakeWakeState>>,
}

impl FakeWakeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_permission(&self, granted: bool) {
        self.inner.lock().permission_denied = !granted;
    }

    pub fn fail_next_arm(&self, err: SchedulerError) {
        self.inner.lock().next_arm_error = Some(err);
    }

    pub fn arm_calls(&self) -> Vec<(i64, Token)> {
        self.inner.lock().arm_calls.clone()
    }

    pub fn disarm_calls(&self) -> Vec<Token> {
        self.inner.lock().disarm_calls.clone()
    }

    pub fn live_registrations(&self) -> Vec<Token> {
        let mut tokens = self
            .inner
            .lock()
            .registrations
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        tokens.sort();
        tokens
    }

    pub fn permission_requests(&self) -> usize {
        self.inner.lock().permission_requests
    }

    /// Forgets every registration without going through `disarm`.
    pub fn lose_all(&self) {
        self.inner.lock().registrations.clear();
    }

    /// Marks a registration as delivered, as the platform does when it fires.
    pub fn consume(&self, token: &Token) {
        self.inner.lock().registrations.remove(token);
    }
}

impl WakeScheduler for FakeWakeScheduler {
    fn arm(&self, fire_at_epoch_ms: i64, token: &Token) -> Result<(), SchedulerError> {
        let mut state = self.inner.lock();
        state.arm_calls.push((fire_at_epoch_ms, token.clone()));
        if let Some(err) = state.next_arm_error.take() {
            return Err(err);
        }
        if state.permission_denied {
            return Err(SchedulerError::PermissionDenied);
        }
        state.registrations.insert(token.clone(), fire_at_epoch_ms);
        Ok(())
    }

    fn disarm(&self, token: &Token) -> bool {
        let mut state = self.inner.lock();
        state.disarm_calls.push(token.clone());
        state.registrations.remove(token).is_some()
    }

    fn is_armed(&self, token: &Token) -> bool {
        self.inner.lock().registrations.contains_key(token)
    }

    fn has_permission(&self) -> bool {
        !self.inner.lock().permission_denied
    }

    fn request_permission(&self) {
        self.inner.lock().permission_requests += 1;
    }
}

#[derive(Default)]
struct FakePlaybackState {
    inactive: bool,
    pauses: usize,
}

#[derive(Clone, Default)]
pub struct FakePlayback {
    inner: Arc<Mutex<FakePlaybackState>>,
}

impl FakePlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active(&self, active: bool) {
        self.inner.lock().inactive = !active;
    }

    pub fn pauses(&self) -> usize {
        self.inner.lock().pauses
    }
}

impl PlaybackController for FakePlayback {
    fn has_active_session(&self) -> bool {
        !self.inner.lock().inactive
    }

    fn pause(&self) {
        self.inner.lock().pauses += 1;
    }
}

#[derive(Clone, Default)]
pub struct FakeAdvanceSink {
    signals: Arc<Mutex<usize>>,
}

impl FakeAdvanceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signals(&self) -> usize {
        *self.signals.lock()
    }
}

impl ContentAdvanceSink for FakeAdvanceSink {
    fn signal_advance(&self) {
        *self.signals.lock() += 1;
    }
}

#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Clone, Default)]
pub struct FakeEventSink {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl FakeEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|event| event.name.clone())
            .collect()
    }
}

impl EventSink for FakeEventSink {
    fn record(&self, name: &str, attributes: &BTreeMap<String, String>) {
        self.events.lock().push(RecordedEvent {
            name: name.to_string(),
            attributes: attributes.clone(),
        });
    }
}

/// Memory store whose writes can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_writes: Mutex<bool>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if *self.fail_writes.lock() {
            return Err(StoreError::Write {
                path: PathBuf::from("flaky"),
                source: io::Error::other("disk full"),
            });
        }
        Ok(())
    }
}

impl DurableStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.put(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.delete(key)
    }
}
