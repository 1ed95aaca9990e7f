use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::clock::Clock;
use crate::store::{DurableStore, JsonFileStore, StoreError};
use crate::timer::model::Token;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum SchedulerError {
    #[error("exact wake scheduling is not permitted")]
    PermissionDenied,
    #[error("wake registration rejected: {0}")]
    Rejected(String),
}

pub trait WakeScheduler: Send + Sync {
    fn arm(&self, fire_at_epoch_ms: i64, token: &Token) -> Result<(), SchedulerError>;
    /// Returns whether a registration was removed. Unknown tokens are not an error.
    fn disarm(&self, token: &Token) -> bool;
    fn is_armed(&self, token: &Token) -> bool;
    fn has_permission(&self) -> bool;
    /// Starts the platform consent flow. Fire-and-forget.
    fn request_permission(&self);
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum WakeError {
    #[error("exact wake scheduling is not permitted")]
    PermissionDenied,
    #[error("fire time {fire_at_epoch_ms} is not after now ({now_epoch_ms})")]
    Stale {
        fire_at_epoch_ms: i64,
        now_epoch_ms: i64,
    },
    #[error("{0}")]
    Rejected(String),
}

/// Narrows the platform wake primitive to what the timer core needs.
pub struct WakeSchedulerAdapter {
    inner: Arc<dyn WakeScheduler>,
    clock: Arc<dyn Clock>,
}

impl WakeSchedulerAdapter {
    pub fn new(inner: Arc<dyn WakeScheduler>, clock: Arc<dyn Clock>) -> Self {
        Self { inner, clock }
    }

    pub fn arm(&self, fire_at_epoch_ms: i64, token: &Token) -> Result<(), WakeError> {
        if !self.inner.has_permission() {
            return Err(WakeError::PermissionDenied);
        }
        let now_epoch_ms = self.clock.now_epoch_ms();
        if fire_at_epoch_ms <= now_epoch_ms {
            return Err(WakeError::Stale {
                fire_at_epoch_ms,
                now_epoch_ms,
            });
        }
        self.inner
            .arm(fire_at_epoch_ms, token)
            .map_err(|err| match err {
                SchedulerError::PermissionDenied => WakeError::PermissionDenied,
                SchedulerError::Rejected(reason) => WakeError::Rejected(reason),
            })
    }

    pub fn disarm(&self, token: &Token) -> bool {
        self.inner.disarm(token)
    }

    pub fn is_armed(&self, token: &Token) -> bool {
        self.inner.is_armed(token)
    }

    pub fn has_permission(&self) -> bool {
        self.inner.has_permission()
    }

    pub fn request_permission(&self) {
        self.inner.request_permission();
    }
}

/// Wake registrations kept in a JSON file, one entry per token.
///
/// Stands in for the platform primitive in hosts without one: a driver calls
/// [`FileWakeScheduler::take_due`] and forwards each token to the trigger
/// handler.
pub struct FileWakeScheduler {
    table: JsonFileStore,
    permission_granted: bool,
}

impl FileWakeScheduler {
    pub fn open(path: impl Into<PathBuf>, permission_granted: bool) -> Self {
        Self {
            table: JsonFileStore::open(path),
            permission_granted,
        }
    }

    pub fn registrations(&self) -> Result<Vec<(Token, i64)>, StoreError> {
        let entries = self.table.entries()?;
        let mut registrations = Vec::with_capacity(entries.len());
        for (token, fire_at) in entries {
            let fire_at_epoch_ms = fire_at.trim().parse::<i64>().map_err(|err| {
                StoreError::Corrupt {
                    key: token.clone(),
                    reason: format!("invalid fire time '{fire_at}': {err}"),
                }
            })?;
            registrations.push((Token::new(token), fire_at_epoch_ms));
        }
        Ok(registrations)
    }

    /// Removes and returns every registration due at `now_epoch_ms`, earliest first.
    pub fn take_due(&self, now_epoch_ms: i64) -> Result<Vec<Token>, StoreError> {
        let mut due = self
            .registrations()?
            .into_iter()
            .filter(|(_, fire_at)| *fire_at <= now_epoch_ms)
            .collect::<Vec<_>>();
        due.sort_by_key(|(_, fire_at)| *fire_at);
        for (token, _) in &due {
            self.table.delete(token.as_str())?;
        }
        Ok(due.into_iter().map(|(token, _)| token).collect())
    }

    /// Drops every registration, as a reboot does to non-persistent alarms.
    pub fn clear_all(&self) -> Result<(), StoreError> {
        self.table.clear()
    }
}

impl WakeScheduler for FileWakeScheduler {
    fn arm(&self, fire_at_epoch_ms: i64, token: &Token) -> Result<(), SchedulerError> {
        if !self.permission_granted {
            return Err(SchedulerError::PermissionDenied);
        }
        self.table
            .put(token.as_str(), &fire_at_epoch_ms.to_string())
            .map_err(|err| SchedulerError::Rejected(err.to_string()))
    }

    fn disarm(&self, token: &Token) -> bool {
        match self.table.get(token.as_str()) {
            Ok(Some(_)) => match self.table.delete(token.as_str()) {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(%token, error = %err, "failed to remove wake registration");
                    false
                }
            },
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(%token, error = %err, "failed to read wake registrations");
                false
            }
        }
    }

    fn is_armed(&self, token: &Token) -> bool {
        match self.table.get(token.as_str()) {
            Ok(entry) => entry.is_some(),
            Err(err) => {
                tracing::warn!(%token, error = %err, "failed to read wake registrations");
                false
            }
        }
    }

    fn has_permission(&self) -> bool {
        self.permission_granted
    }

    fn request_permission(&self) {
        tracing::info!(
            path = %self.table.path().display(),
            "wake permission requested; grant it by running without --deny-permission"
        );
    }
}
