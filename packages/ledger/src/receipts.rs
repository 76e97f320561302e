//! Earn flow: POS sales, receipt claims and transaction storno

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use loyalty_hub_types::json::json;

use crate::audit::{AuditEntry, AuditKind, DynAuditSink, record_best_effort};
use crate::code;
use crate::error::LedgerError;
use crate::store::{
    ClaimInput, ClaimOutcome, LedgerStore, NewTransaction, StornoOutcome, with_timeout,
};
use crate::types::{ReceiptClaim, RedemptionStatus, Storno, Transaction};

/// A sale as pushed by the POS provider
#[derive(Clone, Debug)]
pub struct Sale {
    pub external_id: String,
    pub amount_cents: i64,
    /// Code of a redemption consumed for this sale
    pub redemption_code: Option<String>,
}

#[derive(Clone)]
pub struct ReceiptService {
    store: Arc<dyn LedgerStore>,
    audit: DynAuditSink,
    timeout: Duration,
}

impl ReceiptService {
    pub fn new(store: Arc<dyn LedgerStore>, audit: DynAuditSink, timeout: Duration) -> Self {
        Self {
            store,
            audit,
            timeout,
        }
    }

    /// Stores a sale. Re-sending the same `external_id` returns the stored row.
    #[tracing::instrument(skip(self, sale), fields(external_id = %sale.external_id))]
    pub async fn record_transaction(
        &self,
        shop_id: &str,
        sale: Sale,
        now: DateTime<Utc>,
    ) -> Result<Transaction, LedgerError> {
        if sale.external_id.trim().is_empty() {
            return Err(LedgerError::InvalidInput("externalId is required".into()));
        }
        if sale.amount_cents < 0 {
            return Err(LedgerError::InvalidInput(
                "amount cannot be negative".into(),
            ));
        }
        with_timeout(self.timeout, self.store.get_shop(shop_id))
            .await?
            .ok_or(LedgerError::ShopNotFound)?;

        let coupon_redemption_id = match sale.redemption_code.as_deref() {
            Some(presented) => {
                let code = code::normalize(presented)?;
                let redemption = with_timeout(self.timeout, self.store.find_latest_by_code(&code))
                    .await?
                    .ok_or(LedgerError::RedemptionNotFound)?;
                if redemption.shop_id != shop_id {
                    return Err(LedgerError::ShopMismatch);
                }
                if redemption.status != RedemptionStatus::Used {
                    return Err(LedgerError::InvalidInput(format!(
                        "redemption {code} has not been consumed"
                    )));
                }
                Some(redemption.id)
            }
            None => None,
        };

        let transaction = with_timeout(
            self.timeout,
            self.store.record_transaction(NewTransaction {
                shop_id: shop_id.to_string(),
                external_id: sale.external_id.trim().to_string(),
                amount_cents: sale.amount_cents,
                coupon_redemption_id,
                now,
            }),
        )
        .await?;

        tracing::info!(transaction_id = %transaction.id, shop_id, "Transaction recorded");
        Ok(transaction)
    }

    /// Credits a scanned receipt to the customer's account for the shop.
    #[tracing::instrument(skip(self))]
    pub async fn claim(
        &self,
        customer_id: &str,
        transaction_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ReceiptClaim, LedgerError> {
        let outcome = with_timeout(
            self.timeout,
            self.store.claim_transaction(ClaimInput {
                transaction_id: transaction_id.to_string(),
                customer_id: customer_id.to_string(),
                now,
            }),
        )
        .await?;

        let (transaction, account, points) = match outcome {
            ClaimOutcome::Claimed {
                transaction,
                account,
                points,
            } => (transaction, account, points),
            ClaimOutcome::AlreadyClaimed => return Err(LedgerError::AlreadyClaimed),
            ClaimOutcome::Cancelled => return Err(LedgerError::TransactionCancelled),
            ClaimOutcome::NotFound => return Err(LedgerError::TransactionNotFound),
            ClaimOutcome::ShopMissing => {
                return Err(LedgerError::invariant(format!(
                    "transaction {transaction_id} references a missing shop"
                )));
            }
        };

        metrics::counter!("points_credited_total").increment(points as u64);
        tracing::info!(
            transaction_id,
            points,
            balance = account.points_balance,
            "Receipt claimed"
        );

        record_best_effort(
            self.audit.as_ref(),
            AuditEntry::new(AuditKind::PointsCredit, &transaction.shop_id, now)
                .customer(customer_id)
                .transaction(&transaction.id)
                .points(points)
                .metadata(json!({ "amountCents": transaction.amount_cents })),
        )
        .await;

        Ok(ReceiptClaim {
            transaction_id: transaction.id,
            shop_id: transaction.shop_id,
            points_awarded: points,
            balance_after: account.points_balance,
        })
    }

    /// Cancels a sale: revokes its credit and reverses the linked redemption.
    #[tracing::instrument(skip(self))]
    pub async fn storno(
        &self,
        shop_id: &str,
        transaction_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Storno, LedgerError> {
        let existing = with_timeout(self.timeout, self.store.get_transaction(transaction_id))
            .await?
            .ok_or(LedgerError::TransactionNotFound)?;
        if existing.shop_id != shop_id {
            return Err(LedgerError::ShopMismatch);
        }

        let outcome = with_timeout(
            self.timeout,
            self.store.storno_transaction(transaction_id, now),
        )
        .await?;

        let (storno, reversed_customer_id) = match outcome {
            StornoOutcome::Cancelled {
                transaction,
                points_revoked,
                points_restored,
                reversed_redemption_id,
                reversed_customer_id,
            } => (
                Storno {
                    transaction_id: transaction.id,
                    points_revoked,
                    points_restored,
                    reversed_redemption_id,
                },
                reversed_customer_id,
            ),
            StornoOutcome::AlreadyCancelled => return Err(LedgerError::TransactionCancelled),
            StornoOutcome::NotFound => return Err(LedgerError::TransactionNotFound),
            StornoOutcome::MissingAccount => {
                return Err(LedgerError::invariant(format!(
                    "storno of {transaction_id} found no points account to adjust"
                )));
            }
        };

        tracing::info!(
            transaction_id,
            revoked = storno.points_revoked,
            restored = storno.points_restored,
            "Transaction cancelled"
        );

        let mut entry = AuditEntry::new(AuditKind::TransactionStorno, shop_id, now)
            .transaction(&storno.transaction_id)
            .points(-storno.points_revoked);
        if let Some(customer_id) = &existing.claimed_by {
            entry = entry.customer(customer_id);
        }
        record_best_effort(self.audit.as_ref(), entry).await;

        if let Some(redemption_id) = &storno.reversed_redemption_id {
            let mut entry = AuditEntry::new(AuditKind::RedemptionReversal, shop_id, now)
                .redemption(redemption_id)
                .transaction(&storno.transaction_id)
                .points(storno.points_restored);
            if let Some(customer_id) = &reversed_customer_id {
                entry = entry.customer(customer_id);
            }
            record_best_effort(self.audit.as_ref(), entry).await;
        }

        Ok(storno)
    }
}
