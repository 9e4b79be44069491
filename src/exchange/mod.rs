//! Exchange boundary.
//!
//! `ExchangeClient` is the capability trait the engine drives the venue
//! through: order-book reads, wallet reads, and the order lifecycle.
//! Transport concerns (signing, nonces, wire formats) live behind the
//! trait; the engine only sees typed calls and the `ExchangeError`
//! taxonomy below.

pub mod paper;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::types::{Market, Order, OrderBookLevel, OrderBookSnapshot, OrderRequest, WalletSnapshot};

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Why the venue refused an otherwise well-formed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InsufficientFunds,
    BelowMinimumSize,
    InvalidParameters,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InsufficientFunds => write!(f, "insufficient funds"),
            RejectReason::BelowMinimumSize => write!(f, "below minimum order size"),
            RejectReason::InvalidParameters => write!(f, "invalid order parameters"),
        }
    }
}

/// Classified failures from the exchange boundary.
///
/// Transient variants are safe to retry; the rest carry meaning the
/// calling leg must act on.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExchangeError {
    #[error("rate limited by the venue")]
    RateLimited,
    #[error("venue maintenance window")]
    Maintenance,
    #[error("transient venue error: {0}")]
    Transient(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("order rejected: {0}")]
    Rejected(RejectReason),
    #[error("order not found")]
    OrderNotFound,
    #[error("malformed venue data: {0}")]
    Malformed(String),
}

impl ExchangeError {
    /// Whether a retry of the same call can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExchangeError::RateLimited
                | ExchangeError::Maintenance
                | ExchangeError::Transient(_)
                | ExchangeError::Transport(_)
        )
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            ExchangeError::Rejected(r) => Some(*r),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

/// Venue operations the engine needs. One implementation per transport;
/// the paper venue in [`paper`] backs tests and the binary's paper mode.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Top-of-book for each requested asset, in both of its markets.
    async fn fetch_order_book(&self, assets: &[String])
        -> Result<OrderBookSnapshot, ExchangeError>;

    /// Top-of-book for the fiat-quoted bridge pair (e.g. KRW-BTC).
    async fn fetch_bridge_rate(&self) -> Result<OrderBookLevel, ExchangeError>;

    async fn fetch_wallet(&self) -> Result<WalletSnapshot, ExchangeError>;

    /// Submit a limit order; returns the venue order id.
    async fn place_order(&self, request: &OrderRequest) -> Result<String, ExchangeError>;

    async fn fetch_order(&self, order_id: &str) -> Result<Order, ExchangeError>;

    /// Request cancellation. Cancelling an already-terminal order is not an
    /// error; the terminal order is returned as-is.
    async fn cancel_order(&self, order_id: &str) -> Result<Order, ExchangeError>;

    async fn list_open_orders(&self, market: Option<Market>)
        -> Result<Vec<Order>, ExchangeError>;
}

// ---------------------------------------------------------------------------
// Bounded retry
// ---------------------------------------------------------------------------

/// Retry schedule for transient venue failures. Non-transient errors are
/// returned immediately; transient ones are retried up to `max_attempts`
/// with per-class delays.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Base delay for generic transient failures, doubled per attempt.
    pub base_delay: Duration,
    pub rate_limit_delay: Duration,
    pub maintenance_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            rate_limit_delay: Duration::from_secs(1),
            maintenance_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based) of a transient error.
    pub fn delay(&self, error: &ExchangeError, attempt: u32) -> Duration {
        match error {
            ExchangeError::RateLimited => self.rate_limit_delay,
            ExchangeError::Maintenance => self.maintenance_delay,
            _ => self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1)),
        }
    }
}

/// Run `op`, retrying transient [`ExchangeError`]s per `policy`. The last
/// error is surfaced once attempts are exhausted.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, ExchangeError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ExchangeError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                tracing::debug!(
                    error = %e,
                    attempt,
                    max_attempts = policy.max_attempts,
                    "transient venue error, backing off"
                );
                tokio::time::sleep(policy.delay(&e, attempt)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
