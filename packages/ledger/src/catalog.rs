//! Read path over coupon definitions

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{LedgerError, UnavailableReason};
use crate::store::{LedgerStore, with_timeout};
use crate::types::{Coupon, CouponTerms, DiscountType};

impl Coupon {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    pub fn is_exhausted(&self) -> bool {
        self.usage_limit.is_some_and(|limit| self.used_count >= limit)
    }

    /// Whether a customer may activate this coupon at `now`.
    pub fn availability(&self, now: DateTime<Utc>) -> Result<(), UnavailableReason> {
        if !self.is_active {
            return Err(UnavailableReason::Inactive);
        }
        if self.starts_at > now {
            return Err(UnavailableReason::NotStarted);
        }
        if self.is_expired_at(now) {
            return Err(UnavailableReason::Expired);
        }
        if self.is_exhausted() {
            return Err(UnavailableReason::Exhausted);
        }
        Ok(())
    }
}

impl CouponTerms {
    /// Write-path validation for shop owners.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::InvalidInput("coupon name is required".into()));
        }
        if self.discounts.is_empty() {
            return Err(LedgerError::InvalidInput(
                "at least one discount entry is required".into(),
            ));
        }
        for entry in &self.discounts {
            if entry.value < 0 {
                return Err(LedgerError::InvalidInput(
                    "discount value cannot be negative".into(),
                ));
            }
            if self.discount_type == DiscountType::Percentage && entry.value > 100 {
                return Err(LedgerError::InvalidInput(
                    "percentage discount must be between 0 and 100".into(),
                ));
            }
            if entry
                .article_id
                .as_deref()
                .is_some_and(|id| id.trim().is_empty())
            {
                return Err(LedgerError::InvalidInput(
                    "article id cannot be blank, omit it for invoice-wide discounts".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Lists coupons for the customer app and the POS terminal.
#[derive(Clone)]
pub struct CouponCatalog {
    store: Arc<dyn LedgerStore>,
    timeout: Duration,
}

impl CouponCatalog {
    pub fn new(store: Arc<dyn LedgerStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Coupons a customer can activate right now, cheapest first.
    pub async fn list_redeemable(
        &self,
        shop_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Coupon>, LedgerError> {
        let mut coupons: Vec<Coupon> = with_timeout(self.timeout, self.store.list_coupons(shop_id))
            .await?
            .into_iter()
            .filter(|coupon| coupon.availability(now).is_ok())
            .collect();
        coupons.sort_by(|a, b| {
            a.points_required
                .cmp(&b.points_required)
                .then_with(|| a.terms.name.cmp(&b.terms.name))
        });
        Ok(coupons)
    }

    /// Coupons the terminal shows staff: active and not expired.
    pub async fn list_for_terminal(
        &self,
        shop_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Coupon>, LedgerError> {
        let mut coupons: Vec<Coupon> = with_timeout(self.timeout, self.store.list_coupons(shop_id))
            .await?
            .into_iter()
            .filter(|coupon| coupon.is_active && !coupon.is_expired_at(now))
            .collect();
        coupons.sort_by(|a, b| a.terms.name.cmp(&b.terms.name));
        Ok(coupons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DiscountEntry;
    use chrono::Duration as ChronoDuration;

    fn coupon() -> Coupon {
        let now = Utc::now();
        Coupon {
            id: "c1".into(),
            shop_id: "s1".into(),
            terms: CouponTerms {
                name: "Free coffee".into(),
                description: None,
                discount_type: DiscountType::Percentage,
                discounts: vec![DiscountEntry::for_article("coffee", 100)],
            },
            points_required: 300,
            starts_at: now - ChronoDuration::days(1),
            expires_at: Some(now + ChronoDuration::days(30)),
            usage_limit: Some(2),
            used_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_availability() {
        let now = Utc::now();
        let mut c = coupon();
        assert_eq!(c.availability(now), Ok(()));

        c.used_count = 2;
        assert_eq!(c.availability(now), Err(UnavailableReason::Exhausted));

        c.used_count = 0;
        c.is_active = false;
        assert_eq!(c.availability(now), Err(UnavailableReason::Inactive));

        c.is_active = true;
        assert_eq!(
            c.availability(now + ChronoDuration::days(31)),
            Err(UnavailableReason::Expired)
        );
        assert_eq!(
            c.availability(now - ChronoDuration::days(2)),
            Err(UnavailableReason::NotStarted)
        );
    }

    #[test]
    fn test_unlimited_coupon_never_exhausts() {
        let mut c = coupon();
        c.usage_limit = None;
        c.used_count = 10_000;
        assert!(!c.is_exhausted());
    }

    #[test]
    fn test_terms_validation() {
        let mut terms = coupon().terms;
        assert!(terms.validate().is_ok());

        terms.discounts[0].value = 101;
        assert!(terms.validate().is_err());

        terms.discount_type = DiscountType::Fixed;
        assert!(terms.validate().is_ok());

        terms.discounts[0].value = -1;
        assert!(terms.validate().is_err());

        terms.discounts.clear();
        assert!(terms.validate().is_err());
    }
}
