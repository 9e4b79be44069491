//! TRICYCLE — Triangular-Arbitrage Trading Engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod audit;
pub mod config;
pub mod engine;
pub mod exchange;
pub mod marketdata;
pub mod types;
pub mod wallet;
pub mod watchdog;
