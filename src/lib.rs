//! Single-slot sleep timer that survives process restarts.
//!
//! [`SleepTimerService`] wires the timer core to its collaborators and runs
//! startup recovery exactly once; hosts then drive
//! [`TimerScheduler`](timer::scheduler::TimerScheduler) from the UI and
//! forward wake deliveries to
//! [`TriggerHandler`](timer::trigger::TriggerHandler).

pub mod clock;
pub mod collaborators;
pub mod service;
pub mod store;
pub mod timer;
pub mod wake;

#[cfg(test)]
mod testing;

pub use service::{Collaborators, ServiceConfig, SleepTimerService};
pub use timer::model::{ScheduledTimer, TimerConfiguration, TimerMode, Token};
pub use timer::scheduler::ArmError;
