//! Domain records shared by the ledger and its storage backends

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Discount type of a coupon
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl DiscountType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "percentage" | "percent" => Some(Self::Percentage),
            "fixed" | "fixed_amount" => Some(Self::Fixed),
            _ => None,
        }
    }
}

/// One (article scope, discount value) pair of a coupon
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct DiscountEntry {
    /// `None` applies the discount to the whole invoice
    pub article_id: Option<String>,
    /// Percentage (0-100) or fixed amount in cents
    pub value: i64,
}

impl DiscountEntry {
    pub fn invoice_wide(value: i64) -> Self {
        Self {
            article_id: None,
            value,
        }
    }

    pub fn for_article(article_id: impl Into<String>, value: i64) -> Self {
        Self {
            article_id: Some(article_id.into()),
            value,
        }
    }

    pub fn is_invoice_wide(&self) -> bool {
        self.article_id.is_none()
    }
}

/// What the POS terminal applies to the sale. Snapshotted onto every
/// redemption so later coupon edits never change an issued code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CouponTerms {
    pub name: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discounts: Vec<DiscountEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: String,
    pub shop_id: String,
    pub terms: CouponTerms,
    pub points_required: i64,
    pub starts_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i64>,
    pub used_count: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    pub id: String,
    pub name: String,
    /// Points credited per full currency unit spent
    pub points_per_unit: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub display_name: Option<String>,
}

/// How the customer app identifies the customer
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerIdentity {
    Email(String),
    Phone(String),
}

impl CustomerIdentity {
    /// Normalizes whichever of the two was supplied. Email wins when both are.
    pub fn parse(email: Option<&str>, phone: Option<&str>) -> Result<Self, LedgerError> {
        if let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) {
            let email = email.to_lowercase();
            let valid = email
                .split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
            if !valid {
                return Err(LedgerError::InvalidInput(format!("invalid email: {email}")));
            }
            return Ok(Self::Email(email));
        }

        if let Some(phone) = phone.map(str::trim).filter(|p| !p.is_empty()) {
            let mut normalized = String::with_capacity(phone.len());
            for (i, c) in phone.chars().enumerate() {
                match c {
                    '+' if i == 0 => normalized.push(c),
                    '0'..='9' => normalized.push(c),
                    ' ' | '-' | '(' | ')' | '.' | '/' => {}
                    _ => {
                        return Err(LedgerError::InvalidInput(format!(
                            "invalid phone number: {phone}"
                        )));
                    }
                }
            }
            if normalized.trim_start_matches('+').len() < 6 {
                return Err(LedgerError::InvalidInput(format!(
                    "invalid phone number: {phone}"
                )));
            }
            return Ok(Self::Phone(normalized));
        }

        Err(LedgerError::InvalidInput(
            "either email or phone is required".to_string(),
        ))
    }

    pub fn matches(&self, customer: &Customer) -> bool {
        match self {
            Self::Email(email) => customer.email.as_deref() == Some(email.as_str()),
            Self::Phone(phone) => customer.phone.as_deref() == Some(phone.as_str()),
        }
    }
}

/// Per-customer-per-shop balance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct PointsAccount {
    pub id: String,
    pub customer_id: String,
    pub shop_id: String,
    pub points_balance: i64,
    pub total_points_earned: i64,
    pub total_points_redeemed: i64,
    pub total_spent_cents: i64,
    pub last_visit: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum RedemptionStatus {
    Active,
    Used,
    Expired,
}

impl RedemptionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Used | Self::Expired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Used => "used",
            Self::Expired => "expired",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub id: String,
    pub code: String,
    pub coupon_id: String,
    pub shop_id: String,
    pub customer_id: String,
    /// Authoritative for any reversal; never recomputed from the coupon
    pub points_deducted: i64,
    pub status: RedemptionStatus,
    pub terms: CouponTerms,
    pub redeemed_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub reversed_at: Option<DateTime<Utc>>,
}

impl Redemption {
    pub fn expires_at(&self, validity: Duration) -> DateTime<Utc> {
        self.redeemed_at + validity
    }

    /// True strictly after the window closes.
    pub fn is_expired_at(&self, now: DateTime<Utc>, validity: Duration) -> bool {
        now > self.expires_at(validity)
    }

    /// Status as a reader should see it, whether or not a sweep has run.
    pub fn effective_status(&self, now: DateTime<Utc>, validity: Duration) -> RedemptionStatus {
        match self.status {
            RedemptionStatus::Active if self.is_expired_at(now, validity) => {
                RedemptionStatus::Expired
            }
            status => status,
        }
    }
}

/// A POS-originated sale
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub shop_id: String,
    pub external_id: String,
    pub amount_cents: i64,
    pub coupon_redemption_id: Option<String>,
    pub claimed_by: Option<String>,
    pub points_awarded: i64,
    pub claimed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Returned by a successful activation
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Activation {
    pub redemption_id: String,
    pub code: String,
    pub display_code: String,
    pub coupon_id: String,
    pub shop_id: String,
    pub terms: CouponTerms,
    pub expires_at: DateTime<Utc>,
    pub points_before: i64,
    pub points_after: i64,
}

/// Returned to the POS terminal when a code is consumed
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Consumption {
    pub redemption_id: String,
    pub coupon_id: String,
    pub code: String,
    pub terms: CouponTerms,
    pub points_deducted: i64,
    pub consumed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Reversal {
    pub redemption_id: String,
    pub points_restored: i64,
    pub balance_after: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ReceiptClaim {
    pub transaction_id: String,
    pub shop_id: String,
    pub points_awarded: i64,
    pub balance_after: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Storno {
    pub transaction_id: String,
    pub points_revoked: i64,
    pub points_restored: i64,
    pub reversed_redemption_id: Option<String>,
}

/// Redemption as listed in the customer's history
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct RedemptionView {
    pub redemption_id: String,
    pub code: String,
    pub coupon_id: String,
    pub shop_id: String,
    pub status: RedemptionStatus,
    pub terms: CouponTerms,
    pub points_deducted: i64,
    pub redeemed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub reversed: bool,
}

impl RedemptionView {
    pub fn new(redemption: Redemption, now: DateTime<Utc>, validity: Duration) -> Self {
        Self {
            status: redemption.effective_status(now, validity),
            expires_at: redemption.expires_at(validity),
            reversed: redemption.reversed_at.is_some(),
            redemption_id: redemption.id,
            code: redemption.code,
            coupon_id: redemption.coupon_id,
            shop_id: redemption.shop_id,
            terms: redemption.terms,
            points_deducted: redemption.points_deducted,
            redeemed_at: redemption.redeemed_at,
            consumed_at: redemption.consumed_at,
        }
    }
}
