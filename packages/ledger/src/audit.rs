//! Audit trail for balance-changing events
//!
//! Audit writes happen after the ledger mutation has committed. A failing
//! sink is logged and never fails the operation that triggered it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loyalty_hub_types::{Result, Value, json::json};
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    CouponRedemption,
    CouponConsumption,
    RedemptionReversal,
    PointsCredit,
    TransactionStorno,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CouponRedemption => "coupon_redemption",
            Self::CouponConsumption => "coupon_consumption",
            Self::RedemptionReversal => "redemption_reversal",
            Self::PointsCredit => "points_credit",
            Self::TransactionStorno => "transaction_storno",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub kind: AuditKind,
    pub shop_id: String,
    pub customer_id: Option<String>,
    pub redemption_id: Option<String>,
    pub transaction_id: Option<String>,
    /// Signed change to the customer's balance
    pub points_delta: i64,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(kind: AuditKind, shop_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            shop_id: shop_id.into(),
            customer_id: None,
            redemption_id: None,
            transaction_id: None,
            points_delta: 0,
            metadata: json!({}),
            created_at,
        }
    }

    pub fn customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn redemption(mut self, redemption_id: impl Into<String>) -> Self {
        self.redemption_id = Some(redemption_id.into());
        self
    }

    pub fn transaction(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn points(mut self, delta: i64) -> Self {
        self.points_delta = delta;
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<()>;
}

pub type DynAuditSink = Arc<dyn AuditSink>;

/// Writes the entry and swallows a failure after logging it.
pub async fn record_best_effort(sink: &dyn AuditSink, entry: AuditEntry) {
    let kind = entry.kind;
    if let Err(e) = sink.record(entry).await {
        tracing::warn!(kind = kind.as_str(), error = %e, "Failed to write audit entry");
    }
}

/// Emits every entry as a structured log line.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        tracing::info!(
            target: "audit",
            kind = entry.kind.as_str(),
            shop_id = %entry.shop_id,
            customer_id = entry.customer_id.as_deref(),
            redemption_id = entry.redemption_id.as_deref(),
            transaction_id = entry.transaction_id.as_deref(),
            points_delta = entry.points_delta,
            metadata = %entry.metadata,
        );
        Ok(())
    }
}

/// Keeps entries in memory, for tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryAuditSink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn kinds(&self) -> Vec<AuditKind> {
        self.entries.lock().iter().map(|e| e.kind).collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        self.entries.lock().push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loyalty_hub_types::anyhow;

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn record(&self, _entry: AuditEntry) -> Result<()> {
            Err(anyhow!("audit table unavailable"))
        }
    }

    #[tokio::test]
    async fn test_memory_sink_collects() {
        let sink = MemoryAuditSink::new();
        let entry = AuditEntry::new(AuditKind::CouponRedemption, "s1", Utc::now())
            .customer("u1")
            .redemption("r1")
            .points(-600);
        record_best_effort(&sink, entry).await;

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].points_delta, -600);
        assert_eq!(entries[0].redemption_id.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_best_effort_swallows_failures() {
        let entry = AuditEntry::new(AuditKind::PointsCredit, "s1", Utc::now());
        record_best_effort(&FailingSink, entry).await;
    }

    #[test]
    fn test_kind_wire_name() {
        assert_eq!(
            serde_json::to_value(AuditKind::TransactionStorno).unwrap(),
            json!("transaction_storno")
        );
    }
}
