//! Audit sink for executed cycles.
//!
//! One record per completed cycle, after reconciliation. Persistent
//! storage lives outside this crate; the shipped sink writes structured
//! log lines that downstream collectors ingest.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::types::CycleExecutionRecord;

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_cycle(&self, record: &CycleExecutionRecord) -> Result<()>;

    fn name(&self) -> &str;
}

/// Emits audit records as structured log events.
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record_cycle(&self, record: &CycleExecutionRecord) -> Result<()> {
        info!(
            asset = %record.asset,
            topology = record.topology.number(),
            expected_return = %record.expected_return,
            sized_volume = %record.sized_volume,
            fiat_delta = %record.realized_fiat_delta,
            bridge_delta = %record.realized_bridge_delta,
            legs = record.legs.len(),
            record = %serde_json::to_string(record)?,
            "cycle audit record"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
