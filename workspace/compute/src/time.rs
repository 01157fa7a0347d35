use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

/// Source of "now" for listeners, jobs and the scheduler.
///
/// Production code uses the system clock; tests pin the time so balances
/// "as of now" and lock expiry are deterministic.
#[derive(Clone, Debug, Default)]
pub struct TimeSource {
    fixed: Option<Arc<Mutex<DateTime<Utc>>>>,
}

impl TimeSource {
    pub fn system() -> Self {
        Self { fixed: None }
    }

    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self {
            fixed: Some(Arc::new(Mutex::new(at))),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        match &self.fixed {
            Some(time) => match time.lock() {
                Ok(guard) => *guard,
                Err(poisoned) => *poisoned.into_inner(),
            },
            None => Utc::now(),
        }
    }

    /// Sets a fixed clock. No effect on the system clock.
    pub fn set(&self, at: DateTime<Utc>) {
        if let Some(time) = &self.fixed {
            if let Ok(mut guard) = time.lock() {
                *guard = at;
            }
        }
    }
}
