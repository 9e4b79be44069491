//! Core engine — cycle evaluation, sizing, and the three-leg executor.

pub mod accountant;
pub mod executor;
pub mod pricing;
pub mod profit;
pub mod scanner;
pub mod sizing;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Trading flag
// ---------------------------------------------------------------------------

/// Single-cycle mutual exclusion with a stopwatch.
///
/// At most one cycle runs at a time; `try_engage` hands out an RAII guard
/// whose drop releases the flag on every exit path, success or failure.
/// The engagement instant feeds the watchdog and lets the wallet worker
/// stand down while capital is in flight.
pub struct TradingFlag {
    engaged: AtomicBool,
    since: Mutex<Option<Instant>>,
}

impl TradingFlag {
    pub fn new() -> Self {
        Self {
            engaged: AtomicBool::new(false),
            since: Mutex::new(None),
        }
    }

    fn set_since(&self, value: Option<Instant>) {
        let mut since = match self.since.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *since = value;
    }

    /// Claim the flag. `None` means another cycle is already running.
    pub fn try_engage(self: &Arc<Self>) -> Option<TradingGuard> {
        if self
            .engaged
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.set_since(Some(Instant::now()));
            Some(TradingGuard { flag: self.clone() })
        } else {
            None
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Acquire)
    }

    /// How long the current engagement has been running.
    pub fn engaged_for(&self) -> Option<Duration> {
        if !self.is_engaged() {
            return None;
        }
        let since = match self.since.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        since.map(|s| s.elapsed())
    }
}

impl Default for TradingFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Held for the duration of one cycle; dropping it releases the flag.
pub struct TradingGuard {
    flag: Arc<TradingFlag>,
}

impl Drop for TradingGuard {
    fn drop(&mut self) {
        self.flag.set_since(None);
        self.flag.engaged.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutual_exclusion() {
        let flag = Arc::new(TradingFlag::new());
        let guard = flag.try_engage();
        assert!(guard.is_some());
        assert!(flag.is_engaged());
        assert!(flag.try_engage().is_none());

        drop(guard);
        assert!(!flag.is_engaged());
        assert!(flag.try_engage().is_some());
    }

    #[test]
    fn test_stopwatch_tracks_current_engagement() {
        let flag = Arc::new(TradingFlag::new());
        assert!(flag.engaged_for().is_none());

        let guard = flag.try_engage().unwrap();
        std::thread::sleep(Duration::from_millis(10));
        let elapsed = flag.engaged_for().unwrap();
        assert!(elapsed >= Duration::from_millis(10));

        drop(guard);
        assert!(flag.engaged_for().is_none());
    }
}
