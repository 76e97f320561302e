//! [`AuditSink`] writing to the `AuditLog` table

use std::sync::Arc;

use async_trait::async_trait;
use loyalty_hub_ledger::{AuditEntry, AuditSink};
use loyalty_hub_types::{Result, create_id};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

use crate::entity::audit_log;

#[derive(Debug, Clone)]
pub struct PostgresAuditSink {
    db: Arc<DatabaseConnection>,
}

impl PostgresAuditSink {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditSink for PostgresAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        let model = audit_log::ActiveModel {
            id: Set(create_id()),
            kind: Set(entry.kind.as_str().to_string()),
            shop_id: Set(entry.shop_id),
            customer_id: Set(entry.customer_id),
            redemption_id: Set(entry.redemption_id),
            transaction_id: Set(entry.transaction_id),
            points_delta: Set(entry.points_delta),
            metadata: Set(entry.metadata),
            created_at: Set(entry.created_at.naive_utc()),
        };
        model.insert(self.db.as_ref()).await?;
        Ok(())
    }
}
