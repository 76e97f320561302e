//! Storage abstraction for the ledger
//!
//! Each method that mutates state is one atomic unit on the backend: the
//! PostgreSQL backend runs it in a single database transaction with the
//! points account row locked, the in-memory backend under one mutex.
//!
//! | Backend | Crate | Use |
//! |---------|-------|-----|
//! | In-memory | this crate | tests, local development |
//! | PostgreSQL | `loyalty-hub-api` | production |

pub mod memory;

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::UnavailableReason;
use crate::types::{
    Coupon, Customer, CustomerIdentity, PointsAccount, Redemption, RedemptionStatus, Shop,
    Transaction,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redemption code {0} is already active")]
    CodeConflict(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Runs a store call with a deadline. An elapsed deadline is a retryable
/// failure, never an implicit success.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout_ms = limit.as_millis() as u64, "Store call timed out");
            Err(StoreError::Timeout(limit))
        }
    }
}

/// Input for the debit + insert unit of an activation
#[derive(Clone, Debug)]
pub struct ActivationInput {
    pub redemption_id: String,
    pub code: String,
    pub customer_id: String,
    pub coupon_id: String,
    pub now: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub enum ActivationOutcome {
    Activated {
        redemption: Redemption,
        balance_before: i64,
        balance_after: i64,
    },
    InsufficientPoints {
        required: i64,
        current: i64,
    },
    CouponUnavailable(UnavailableReason),
    CouponMissing,
}

#[derive(Clone, Debug)]
pub enum ReversalOutcome {
    Reversed {
        redemption: Redemption,
        account: PointsAccount,
    },
    AlreadyReversed,
    StillActive,
    NotFound,
    /// Points were taken from an account that no longer exists
    MissingAccount,
}

#[derive(Clone, Debug)]
pub struct NewTransaction {
    pub shop_id: String,
    pub external_id: String,
    pub amount_cents: i64,
    pub coupon_redemption_id: Option<String>,
    pub now: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct ClaimInput {
    pub transaction_id: String,
    pub customer_id: String,
    pub now: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub enum ClaimOutcome {
    Claimed {
        transaction: Transaction,
        account: PointsAccount,
        points: i64,
    },
    AlreadyClaimed,
    Cancelled,
    NotFound,
    ShopMissing,
}

#[derive(Clone, Debug)]
pub enum StornoOutcome {
    Cancelled {
        transaction: Transaction,
        points_revoked: i64,
        points_restored: i64,
        reversed_redemption_id: Option<String>,
        /// Owner of the reversed redemption's points
        reversed_customer_id: Option<String>,
    },
    AlreadyCancelled,
    NotFound,
    /// The linked redemption's account no longer exists; nothing was changed
    MissingAccount,
}

#[async_trait]
pub trait LedgerStore: Send + Sync + Debug {
    /// Get backend name for logging
    fn backend_name(&self) -> &'static str;

    // ========================================================================
    // Reads
    // ========================================================================

    async fn find_customer(
        &self,
        identity: &CustomerIdentity,
    ) -> Result<Option<Customer>, StoreError>;

    async fn get_shop(&self, shop_id: &str) -> Result<Option<Shop>, StoreError>;

    async fn get_coupon(&self, coupon_id: &str) -> Result<Option<Coupon>, StoreError>;

    /// All coupons of a shop, including inactive ones
    async fn list_coupons(&self, shop_id: &str) -> Result<Vec<Coupon>, StoreError>;

    async fn get_account(
        &self,
        customer_id: &str,
        shop_id: &str,
    ) -> Result<Option<PointsAccount>, StoreError>;

    async fn list_accounts(&self, customer_id: &str) -> Result<Vec<PointsAccount>, StoreError>;

    async fn get_redemption(&self, redemption_id: &str)
    -> Result<Option<Redemption>, StoreError>;

    async fn is_code_active(&self, code: &str) -> Result<bool, StoreError>;

    async fn find_active_by_code(&self, code: &str) -> Result<Option<Redemption>, StoreError>;

    /// Most recent redemption ever issued with this code
    async fn find_latest_by_code(&self, code: &str) -> Result<Option<Redemption>, StoreError>;

    /// Newest first
    async fn list_redemptions(
        &self,
        customer_id: &str,
        limit: u64,
    ) -> Result<Vec<Redemption>, StoreError>;

    async fn get_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Transaction>, StoreError>;

    // ========================================================================
    // Atomic units
    // ========================================================================

    /// Locks (or lazily opens) the points account, re-checks the coupon,
    /// debits, reserves one use and inserts the active redemption.
    /// Fails with [`StoreError::CodeConflict`] and changes nothing when the
    /// code is already active.
    async fn activate(&self, input: ActivationInput) -> Result<ActivationOutcome, StoreError>;

    /// Conditional `active -> to`. Returns false when the row was no longer active.
    async fn transition(
        &self,
        redemption_id: &str,
        to: RedemptionStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Moves every active redemption issued before `cutoff` to expired,
    /// limited to one shop when `shop_id` is given.
    async fn expire_issued_before(
        &self,
        shop_id: Option<&str>,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Restores `points_deducted` once. An active row issued before
    /// `active_cutoff` counts as expired and is transitioned first.
    async fn reverse_redemption(
        &self,
        redemption_id: &str,
        active_cutoff: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<ReversalOutcome, StoreError>;

    /// Idempotent on `(shop_id, external_id)`.
    async fn record_transaction(&self, input: NewTransaction) -> Result<Transaction, StoreError>;

    /// Credits the purchase to the claiming customer's account for the shop.
    async fn claim_transaction(&self, input: ClaimInput) -> Result<ClaimOutcome, StoreError>;

    /// Cancels the sale, revokes its credit and reverses its linked redemption.
    async fn storno_transaction(
        &self,
        transaction_id: &str,
        at: DateTime<Utc>,
    ) -> Result<StornoOutcome, StoreError>;
}
