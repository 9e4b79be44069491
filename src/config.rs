//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;

use crate::engine::accountant::PlausibilityBand;
use crate::engine::profit::MomentumBaseline;
use crate::engine::sizing::VolumeSizer;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub trading: TradingConfig,
    pub market_data: MarketDataConfig,
    pub wallet: WalletConfig,
    pub watchdog: WatchdogConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    /// Client implementation to wire: currently only "paper".
    pub mode: String,
    pub fiat_currency: String,
    pub bridge_currency: String,
    pub access_key_env: String,
    pub secret_key_env: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TradingConfig {
    pub assets: Vec<String>,
    /// Minimum evaluated cycle return (1.0 = break-even after fees).
    pub profit_threshold: Decimal,
    pub sizing: VolumeSizer,
    /// Momentum gate baseline; omit to disable the gate.
    #[serde(default)]
    pub momentum_baseline: Option<MomentumBaseline>,
    /// Entry-pair ask/bid ceiling; omit to disable the gate.
    #[serde(default)]
    pub max_spread_ratio: Option<Decimal>,
    pub recheck_before_entry: bool,
    pub settle_poll_interval_ms: u64,
    pub settle_poll_budget: u32,
    pub balance_poll_attempts: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarketDataConfig {
    /// "poll" or "stream".
    pub source: MarketDataKind,
    pub poll_interval_ms: u64,
    pub scan_interval_ms: u64,
    /// Snapshots kept for momentum baselines.
    pub history_depth: usize,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MarketDataKind {
    Poll,
    Stream,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WalletConfig {
    pub refresh_interval_secs: u64,
    /// Re-check cadence while a cycle holds the trading flag.
    pub busy_backoff_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchdogConfig {
    /// Longest a single cycle may run before the process exits non-zero.
    pub ceiling_secs: u64,
    pub poll_interval_secs: u64,
    pub progress_log_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditConfig {
    pub plausibility: PlausibilityBand,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
