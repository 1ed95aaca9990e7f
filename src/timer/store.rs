use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::store::{DurableStore, StoreError};
use crate::timer::model::{
    ScheduledTimer, TimerConfiguration, encode_configuration, encode_scheduled_timer,
    parse_configuration_text, parse_scheduled_timer_text,
};

pub const DEFAULT_RECORD_KEY: &str = "sleep_timer.scheduled";
pub const DEFAULT_CONFIGURATION_KEY: &str = "sleep_timer.configuration";

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StoreKeys {
    pub record_key: String,
    pub configuration_key: String,
}

impl Default for StoreKeys {
    fn default() -> Self {
        Self {
            record_key: DEFAULT_RECORD_KEY.to_string(),
            configuration_key: DEFAULT_CONFIGURATION_KEY.to_string(),
        }
    }
}

/// Typed access to the persisted timer record and the selection record.
///
/// Every read-modify-write of the timer record goes through [`TimerStore::lock`],
/// which holds the single-writer lock until the returned guard is dropped.
pub struct TimerStore {
    backend: Arc<dyn DurableStore>,
    keys: StoreKeys,
    writer: Mutex<()>,
}

pub struct TimerStoreGuard<'a> {
    store: &'a TimerStore,
    _writer: MutexGuard<'a, ()>,
}

impl TimerStore {
    pub fn new(backend: Arc<dyn DurableStore>, keys: StoreKeys) -> Self {
        Self {
            backend,
            keys,
            writer: Mutex::new(()),
        }
    }

    pub fn lock(&self) -> TimerStoreGuard<'_> {
        TimerStoreGuard {
            store: self,
            _writer: self.writer.lock(),
        }
    }

    pub fn read(&self) -> Result<Option<ScheduledTimer>, StoreError> {
        self.lock().load()
    }

    pub fn configuration(&self) -> Result<TimerConfiguration, StoreError> {
        match self.backend.get(&self.keys.configuration_key)? {
            Some(text) => parse_configuration_text(&self.keys.configuration_key, &text),
            None => Ok(TimerConfiguration::default()),
        }
    }

    pub fn save_configuration(&self, configuration: &TimerConfiguration) -> Result<(), StoreError> {
        let text = encode_configuration(configuration)?;
        self.backend.put(&self.keys.configuration_key, &text)
    }

    pub fn clear_configuration(&self) -> Result<(), StoreError> {
        self.backend.delete(&self.keys.configuration_key)
    }
}

impl TimerStoreGuard<'_> {
    pub fn load(&self) -> Result<Option<ScheduledTimer>, StoreError> {
        let key = &self.store.keys.record_key;
        match self.store.backend.get(key)? {
            Some(text) => parse_scheduled_timer_text(key, &text),
            None => Ok(None),
        }
    }

    pub fn replace(&self, timer: &ScheduledTimer) -> Result<(), StoreError> {
        let text = encode_scheduled_timer(timer)?;
        self.store.backend.put(&self.store.keys.record_key, &text)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.backend.delete(&self.store.keys.record_key)
    }
}
