use serde::{Deserialize, Serialize};

use crate::store::StoreError;

/// Why a coupon cannot be activated right now
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    Inactive,
    NotStarted,
    Expired,
    Exhausted,
}

/// Error taxonomy. Transports map on this, never on the message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Expired,
    CollisionExhausted,
    Storage,
    InvariantViolation,
}

/// Small wire enum the POS terminal and the customer app switch on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InvalidFormat,
    InvalidInput,
    NotFound,
    InsufficientPoints,
    CouponUnavailable,
    AlreadyUsed,
    ShopMismatch,
    Expired,
    CouponExpired,
    AlreadyReversed,
    StillActive,
    AlreadyClaimed,
    TransactionCancelled,
    ServerError,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "invalid_format",
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::InsufficientPoints => "insufficient_points",
            Self::CouponUnavailable => "coupon_unavailable",
            Self::AlreadyUsed => "already_used",
            Self::ShopMismatch => "shop_mismatch",
            Self::Expired => "expired",
            Self::CouponExpired => "coupon_expired",
            Self::AlreadyReversed => "already_reversed",
            Self::StillActive => "still_active",
            Self::AlreadyClaimed => "already_claimed",
            Self::TransactionCancelled => "transaction_cancelled",
            Self::ServerError => "server_error",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid redemption code format: {0:?}")]
    InvalidFormat(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Customer not found")]
    CustomerNotFound,
    #[error("Shop not found")]
    ShopNotFound,
    #[error("Coupon not found")]
    CouponNotFound,
    #[error("No active redemption for this code")]
    RedemptionNotFound,
    #[error("Transaction not found")]
    TransactionNotFound,
    #[error("Insufficient points: required {required}, current {current}")]
    InsufficientPoints { required: i64, current: i64 },
    #[error("Coupon unavailable: {0:?}")]
    CouponUnavailable(UnavailableReason),
    #[error("Redemption code already used")]
    AlreadyUsed,
    #[error("Redemption belongs to another shop")]
    ShopMismatch,
    #[error("Redemption code expired")]
    Expired,
    #[error("Coupon expired")]
    CouponExpired,
    #[error("Redemption already reversed")]
    AlreadyReversed,
    #[error("Redemption is still active")]
    StillActive,
    #[error("Transaction already claimed")]
    AlreadyClaimed,
    #[error("Transaction was cancelled")]
    TransactionCancelled,
    #[error("No free redemption code after {attempts} attempts")]
    CollisionExhausted { attempts: u32 },
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
}

impl LedgerError {
    /// Builds an [`LedgerError::InvariantViolation`] and logs it at error level.
    pub fn invariant(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!(invariant = %msg, "Ledger invariant violated");
        Self::InvariantViolation(msg)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFormat(_) | Self::InvalidInput(_) => ErrorKind::Validation,
            Self::CustomerNotFound
            | Self::ShopNotFound
            | Self::CouponNotFound
            | Self::RedemptionNotFound
            | Self::TransactionNotFound => ErrorKind::NotFound,
            Self::InsufficientPoints { .. }
            | Self::CouponUnavailable(_)
            | Self::AlreadyUsed
            | Self::ShopMismatch
            | Self::AlreadyReversed
            | Self::StillActive
            | Self::AlreadyClaimed
            | Self::TransactionCancelled => ErrorKind::Conflict,
            Self::Expired | Self::CouponExpired => ErrorKind::Expired,
            Self::CollisionExhausted { .. } => ErrorKind::CollisionExhausted,
            Self::Storage(_) => ErrorKind::Storage,
            Self::InvariantViolation(_) => ErrorKind::InvariantViolation,
        }
    }

    pub fn reason(&self) -> FailureReason {
        match self {
            Self::InvalidFormat(_) => FailureReason::InvalidFormat,
            Self::InvalidInput(_) => FailureReason::InvalidInput,
            Self::CustomerNotFound
            | Self::ShopNotFound
            | Self::CouponNotFound
            | Self::RedemptionNotFound
            | Self::TransactionNotFound => FailureReason::NotFound,
            Self::InsufficientPoints { .. } => FailureReason::InsufficientPoints,
            Self::CouponUnavailable(_) => FailureReason::CouponUnavailable,
            Self::AlreadyUsed => FailureReason::AlreadyUsed,
            Self::ShopMismatch => FailureReason::ShopMismatch,
            Self::Expired => FailureReason::Expired,
            Self::CouponExpired => FailureReason::CouponExpired,
            Self::AlreadyReversed => FailureReason::AlreadyReversed,
            Self::StillActive => FailureReason::StillActive,
            Self::AlreadyClaimed => FailureReason::AlreadyClaimed,
            Self::TransactionCancelled => FailureReason::TransactionCancelled,
            Self::CollisionExhausted { .. } | Self::Storage(_) | Self::InvariantViolation(_) => {
                FailureReason::ServerError
            }
        }
    }

    /// Retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::CollisionExhausted | ErrorKind::Storage
        )
    }

    /// Points still missing for an `InsufficientPoints` failure.
    pub fn deficit(&self) -> Option<i64> {
        match self {
            Self::InsufficientPoints { required, current } => Some(required - current),
            _ => None,
        }
    }
}
