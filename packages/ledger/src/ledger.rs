//! The redemption state machine
//!
//! [`RedemptionLedger`] is the only component that spends points. Every
//! mutation is delegated to one atomic unit of the [`LedgerStore`]; the ledger
//! classifies outcomes, enforces ordering of the validation checks and writes
//! the audit trail once the store has committed.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use loyalty_hub_types::{create_id, json::json};

use crate::audit::{AuditEntry, AuditKind, DynAuditSink, record_best_effort};
use crate::catalog::CouponCatalog;
use crate::code::{self, CodeGenerator, CodeStatsSnapshot};
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::store::{
    ActivationInput, ActivationOutcome, LedgerStore, ReversalOutcome, StoreError, with_timeout,
};
use crate::types::{
    Activation, Consumption, Customer, CustomerIdentity, PointsAccount, RedemptionStatus,
    RedemptionView, Reversal,
};

#[derive(Clone)]
pub struct RedemptionLedger {
    store: Arc<dyn LedgerStore>,
    audit: DynAuditSink,
    codes: Arc<CodeGenerator>,
    config: LedgerConfig,
}

impl RedemptionLedger {
    pub fn new(store: Arc<dyn LedgerStore>, audit: DynAuditSink, config: LedgerConfig) -> Self {
        let codes = Arc::new(CodeGenerator::new(config.code_attempts));
        Self {
            store,
            audit,
            codes,
            config,
        }
    }

    /// Replaces the code generator, e.g. with a seeded one.
    pub fn with_code_generator(mut self, codes: CodeGenerator) -> Self {
        self.codes = Arc::new(codes);
        self
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn catalog(&self) -> CouponCatalog {
        CouponCatalog::new(self.store.clone(), self.config.store_timeout)
    }

    pub fn code_stats(&self) -> CodeStatsSnapshot {
        self.codes.stats().snapshot()
    }

    pub fn reset_code_stats(&self) {
        self.codes.stats().reset();
    }

    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        with_timeout(self.config.store_timeout, fut).await
    }

    /// Looks the customer up by email or phone.
    pub async fn resolve_customer(
        &self,
        identity: &CustomerIdentity,
    ) -> Result<Customer, LedgerError> {
        self.call(self.store.find_customer(identity))
            .await?
            .ok_or(LedgerError::CustomerNotFound)
    }

    pub async fn activate(
        &self,
        customer_id: &str,
        coupon_id: &str,
    ) -> Result<Activation, LedgerError> {
        self.activate_at(customer_id, coupon_id, Utc::now()).await
    }

    /// Spends `points_required` and mints an active redemption code.
    #[tracing::instrument(skip(self), fields(backend = self.store.backend_name()))]
    pub async fn activate_at(
        &self,
        customer_id: &str,
        coupon_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Activation, LedgerError> {
        // Cheap pre-check; the store re-checks under lock.
        let coupon = self
            .call(self.store.get_coupon(coupon_id))
            .await?
            .ok_or(LedgerError::CouponNotFound)?;
        coupon
            .availability(now)
            .map_err(LedgerError::CouponUnavailable)?;

        let redemption_id = create_id();
        let timeout = self.config.store_timeout;
        let mut budget = self.codes.budget();

        let outcome = loop {
            let store = self.store.clone();
            let code = self
                .codes
                .generate_within(&mut budget, move |candidate| {
                    let store = store.clone();
                    async move { with_timeout(timeout, store.is_code_active(&candidate)).await }
                })
                .await?;

            let input = ActivationInput {
                redemption_id: redemption_id.clone(),
                code,
                customer_id: customer_id.to_string(),
                coupon_id: coupon_id.to_string(),
                now,
            };

            match self.call(self.store.activate(input)).await {
                Ok(outcome) => break outcome,
                Err(StoreError::CodeConflict(code)) => {
                    self.codes.note_insert_conflict();
                    tracing::debug!(
                        %code,
                        remaining = budget.remaining(),
                        "Code went active before insert"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        };

        let (redemption, balance_before, balance_after) = match outcome {
            ActivationOutcome::Activated {
                redemption,
                balance_before,
                balance_after,
            } => (redemption, balance_before, balance_after),
            ActivationOutcome::InsufficientPoints { required, current } => {
                tracing::debug!(required, current, "Activation refused, insufficient points");
                return Err(LedgerError::InsufficientPoints { required, current });
            }
            ActivationOutcome::CouponUnavailable(reason) => {
                return Err(LedgerError::CouponUnavailable(reason));
            }
            ActivationOutcome::CouponMissing => return Err(LedgerError::CouponNotFound),
        };

        if balance_after < 0 || balance_before - redemption.points_deducted != balance_after {
            return Err(LedgerError::invariant(format!(
                "activation {} moved balance {balance_before} -> {balance_after} for {} points",
                redemption.id, redemption.points_deducted
            )));
        }

        metrics::counter!("redemptions_activated_total").increment(1);
        tracing::info!(
            redemption_id = %redemption.id,
            shop_id = %redemption.shop_id,
            points = redemption.points_deducted,
            "Coupon activated"
        );

        record_best_effort(
            self.audit.as_ref(),
            AuditEntry::new(AuditKind::CouponRedemption, &redemption.shop_id, now)
                .customer(&redemption.customer_id)
                .redemption(&redemption.id)
                .points(-redemption.points_deducted)
                .metadata(json!({
                    "couponId": redemption.coupon_id,
                    "pointsBefore": balance_before,
                    "pointsAfter": balance_after,
                })),
        )
        .await;

        Ok(Activation {
            expires_at: redemption.expires_at(self.config.validity),
            display_code: code::display(&redemption.code),
            redemption_id: redemption.id,
            code: redemption.code,
            coupon_id: redemption.coupon_id,
            shop_id: redemption.shop_id,
            terms: redemption.terms,
            points_before: balance_before,
            points_after: balance_after,
        })
    }

    pub async fn validate_and_consume(
        &self,
        shop_id: &str,
        presented: &str,
    ) -> Result<Consumption, LedgerError> {
        self.validate_and_consume_at(shop_id, presented, Utc::now())
            .await
    }

    /// Consumes an active code presented at a shop's terminal. Exactly one of
    /// any number of concurrent calls for the same code succeeds.
    #[tracing::instrument(skip(self, presented), fields(backend = self.store.backend_name()))]
    pub async fn validate_and_consume_at(
        &self,
        shop_id: &str,
        presented: &str,
        now: DateTime<Utc>,
    ) -> Result<Consumption, LedgerError> {
        let code = code::normalize(presented)?;

        let Some(redemption) = self.call(self.store.find_active_by_code(&code)).await? else {
            return Err(self.classify_inactive(&code).await?);
        };

        if redemption.is_expired_at(now, self.config.validity) {
            self.call(
                self.store
                    .transition(&redemption.id, RedemptionStatus::Expired, now),
            )
            .await?;
            tracing::info!(redemption_id = %redemption.id, "Redemption expired at validation");
            return Err(LedgerError::Expired);
        }

        let coupon = self
            .call(self.store.get_coupon(&redemption.coupon_id))
            .await?
            .ok_or_else(|| {
                LedgerError::invariant(format!(
                    "redemption {} references missing coupon {}",
                    redemption.id, redemption.coupon_id
                ))
            })?;

        if coupon.shop_id != shop_id {
            tracing::warn!(
                redemption_id = %redemption.id,
                presented_at = shop_id,
                "Redemption presented at another shop"
            );
            return Err(LedgerError::ShopMismatch);
        }
        if coupon.is_expired_at(now) {
            return Err(LedgerError::CouponExpired);
        }

        let won = self
            .call(
                self.store
                    .transition(&redemption.id, RedemptionStatus::Used, now),
            )
            .await?;
        if !won {
            // Lost the race; report whatever the winner left behind.
            let current = self
                .call(self.store.get_redemption(&redemption.id))
                .await?
                .map(|r| r.status);
            return Err(match current {
                Some(RedemptionStatus::Used) => LedgerError::AlreadyUsed,
                Some(RedemptionStatus::Expired) => LedgerError::Expired,
                other => LedgerError::invariant(format!(
                    "redemption {} refused the active -> used transition while {other:?}",
                    redemption.id
                )),
            });
        }

        metrics::counter!("redemptions_consumed_total").increment(1);
        tracing::info!(redemption_id = %redemption.id, shop_id, "Redemption consumed");

        record_best_effort(
            self.audit.as_ref(),
            AuditEntry::new(AuditKind::CouponConsumption, shop_id, now)
                .customer(&redemption.customer_id)
                .redemption(&redemption.id)
                .metadata(json!({ "couponId": redemption.coupon_id })),
        )
        .await;

        Ok(Consumption {
            redemption_id: redemption.id,
            coupon_id: redemption.coupon_id,
            code: redemption.code,
            terms: redemption.terms,
            points_deducted: redemption.points_deducted,
            consumed_at: now,
        })
    }

    /// Failure for a well-formed code with no active row.
    async fn classify_inactive(&self, code: &str) -> Result<LedgerError, LedgerError> {
        let latest = self.call(self.store.find_latest_by_code(code)).await?;
        Ok(match latest.map(|r| r.status) {
            Some(RedemptionStatus::Used) => LedgerError::AlreadyUsed,
            Some(RedemptionStatus::Expired) => LedgerError::Expired,
            _ => LedgerError::RedemptionNotFound,
        })
    }

    /// Restores the recorded `points_deducted` of a terminal redemption once.
    /// With `shop_id` set, the redemption must belong to that shop.
    #[tracing::instrument(skip(self), fields(backend = self.store.backend_name()))]
    pub async fn reverse(
        &self,
        shop_id: Option<&str>,
        redemption_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Reversal, LedgerError> {
        if let Some(shop_id) = shop_id {
            let redemption = self
                .call(self.store.get_redemption(redemption_id))
                .await?
                .ok_or(LedgerError::RedemptionNotFound)?;
            if redemption.shop_id != shop_id {
                return Err(LedgerError::ShopMismatch);
            }
        }

        let cutoff = now - self.config.validity;
        let outcome = self
            .call(self.store.reverse_redemption(redemption_id, cutoff, now))
            .await?;

        let (redemption, account) = match outcome {
            ReversalOutcome::Reversed {
                redemption,
                account,
            } => (redemption, account),
            ReversalOutcome::AlreadyReversed => return Err(LedgerError::AlreadyReversed),
            ReversalOutcome::StillActive => return Err(LedgerError::StillActive),
            ReversalOutcome::NotFound => return Err(LedgerError::RedemptionNotFound),
            ReversalOutcome::MissingAccount => {
                return Err(LedgerError::invariant(format!(
                    "redemption {redemption_id} has no points account to restore to"
                )));
            }
        };

        tracing::info!(
            redemption_id = %redemption.id,
            points = redemption.points_deducted,
            balance = account.points_balance,
            "Redemption reversed"
        );

        record_best_effort(
            self.audit.as_ref(),
            AuditEntry::new(AuditKind::RedemptionReversal, &redemption.shop_id, now)
                .customer(&redemption.customer_id)
                .redemption(&redemption.id)
                .points(redemption.points_deducted),
        )
        .await;

        Ok(Reversal {
            redemption_id: redemption.id,
            points_restored: redemption.points_deducted,
            balance_after: account.points_balance,
        })
    }

    /// Moves every active redemption past its window to expired.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, LedgerError> {
        self.sweep(None, now).await
    }

    /// Same as [`sweep_expired`](Self::sweep_expired), for one shop's redemptions only.
    pub async fn sweep_expired_for_shop(
        &self,
        shop_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, LedgerError> {
        self.sweep(Some(shop_id), now).await
    }

    async fn sweep(&self, shop_id: Option<&str>, now: DateTime<Utc>) -> Result<u64, LedgerError> {
        let expired = self
            .call(
                self.store
                    .expire_issued_before(shop_id, now - self.config.validity),
            )
            .await?;
        if expired > 0 {
            tracing::info!(expired, shop_id, "Swept expired redemptions");
        }
        Ok(expired)
    }

    /// The customer's redemptions, newest first, with their effective status.
    pub async fn history(
        &self,
        customer_id: &str,
        limit: u64,
        now: DateTime<Utc>,
    ) -> Result<Vec<RedemptionView>, LedgerError> {
        let rows = self
            .call(self.store.list_redemptions(customer_id, limit))
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| RedemptionView::new(r, now, self.config.validity))
            .collect())
    }

    pub async fn accounts(&self, customer_id: &str) -> Result<Vec<PointsAccount>, LedgerError> {
        Ok(self.call(self.store.list_accounts(customer_id)).await?)
    }
}
