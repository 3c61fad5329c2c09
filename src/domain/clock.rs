use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Wall-clock capability. All elapsed-time math in the engine goes through
/// this so tests can simulate arbitrary deltas without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, delta: Duration) {
        let mut guard = self.now.lock().expect("manual clock lock poisoned");
        *guard = *guard + delta;
    }

    pub fn set(&self, now: DateTime<Utc>) {
        let mut guard = self.now.lock().expect("manual clock lock poisoned");
        *guard = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("manual clock lock poisoned")
    }
}
