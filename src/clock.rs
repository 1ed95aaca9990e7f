use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

/// Source of wall-clock time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_epoch_ms(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to. Clones share the same reading.
#[derive(Clone, Debug)]
pub struct ManualClock {
    epoch_ms: Arc<Mutex<i64>>,
}

impl ManualClock {
    pub fn new(epoch_ms: i64) -> Self {
        Self {
            epoch_ms: Arc::new(Mutex::new(epoch_ms)),
        }
    }

    pub fn set(&self, epoch_ms: i64) {
        *self.epoch_ms.lock() = epoch_ms;
    }

    pub fn advance_ms(&self, delta_ms: i64) {
        let mut guard = self.epoch_ms.lock();
        *guard = guard.saturating_add(delta_ms);
    }
}

impl Clock for ManualClock {
    fn now_epoch_ms(&self) -> i64 {
        *self.epoch_ms.lock()
    }
}
