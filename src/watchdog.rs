//! Stuck-cycle watchdog.
//!
//! Watches the trading flag's stopwatch. While a cycle runs, elapsed time
//! is logged at a fixed cadence; if one single engagement exceeds the
//! configured ceiling, the watchdog resolves and the process exits
//! non-zero so an external supervisor can restart it. Remediation is
//! deliberately not attempted in-process.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use crate::engine::TradingFlag;

// ---------------------------------------------------------------------------
// Stop signal
// ---------------------------------------------------------------------------

/// Latched, broadcast stop flag shared by the worker loops. Once raised it
/// never clears.
pub struct StopSignal {
    tx: watch::Sender<bool>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn raise(&self) {
        let _ = self.tx.send_replace(true);
    }

    pub fn is_raised(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal is raised.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|raised| *raised).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Watchdog
// ---------------------------------------------------------------------------

pub struct Watchdog {
    flag: Arc<TradingFlag>,
    /// Longest a single cycle may run before the process is declared stuck.
    ceiling: Duration,
    poll_interval: Duration,
    progress_interval: Duration,
}

impl Watchdog {
    pub fn new(
        flag: Arc<TradingFlag>,
        ceiling: Duration,
        poll_interval: Duration,
        progress_interval: Duration,
    ) -> Self {
        Self {
            flag,
            ceiling,
            poll_interval,
            progress_interval,
        }
    }

    /// Resolves only when one continuous engagement exceeds the ceiling.
    /// A flag that clears and re-engages restarts the stopwatch.
    pub async fn run(&self) {
        let mut last_logged = Duration::ZERO;
        loop {
            tokio::time::sleep(self.poll_interval).await;
            match self.flag.engaged_for() {
                None => {
                    last_logged = Duration::ZERO;
                }
                Some(elapsed) => {
                    if elapsed >= last_logged + self.progress_interval {
                        info!(
                            elapsed_secs = elapsed.as_secs(),
                            ceiling_secs = self.ceiling.as_secs(),
                            "trading cycle still running"
                        );
                        last_logged = elapsed;
                    }
                    if elapsed > self.ceiling {
                        error!(
                            elapsed_secs = elapsed.as_secs(),
                            ceiling_secs = self.ceiling.as_secs(),
                            "trading cycle exceeded the watchdog ceiling"
                        );
                        return;
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
