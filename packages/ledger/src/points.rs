//! Balance mutations on a [`PointsAccount`]
//!
//! These are the only entry points that change a balance. Storage backends
//! call them on a row they hold locked, inside the transaction of the event
//! that triggered the change.

use chrono::{DateTime, Utc};
use loyalty_hub_types::create_id;

use crate::types::PointsAccount;

/// The balance does not cover a debit
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("balance {current} does not cover {required}")]
pub struct InsufficientBalance {
    pub required: i64,
    pub current: i64,
}

impl PointsAccount {
    /// Zero balance account, created lazily on first scan or first activation.
    pub fn open(customer_id: &str, shop_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: create_id(),
            customer_id: customer_id.to_string(),
            shop_id: shop_id.to_string(),
            points_balance: 0,
            total_points_earned: 0,
            total_points_redeemed: 0,
            total_spent_cents: 0,
            last_visit: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_afford(&self, amount: i64) -> bool {
        self.points_balance >= amount
    }

    /// Spends points. Never takes the balance below zero.
    pub fn debit(&mut self, amount: i64, now: DateTime<Utc>) -> Result<i64, InsufficientBalance> {
        if !self.can_afford(amount) {
            return Err(InsufficientBalance {
                required: amount,
                current: self.points_balance,
            });
        }
        self.points_balance -= amount;
        self.total_points_redeemed += amount;
        self.updated_at = now;
        Ok(self.points_balance)
    }

    /// Earns points for a purchase.
    pub fn credit(&mut self, amount: i64, spent_cents: i64, now: DateTime<Utc>) -> i64 {
        self.points_balance += amount;
        self.total_points_earned += amount;
        self.total_spent_cents += spent_cents;
        self.last_visit = Some(now);
        self.updated_at = now;
        self.points_balance
    }

    /// Undoes a debit with the amount recorded at the time it was taken.
    pub fn restore(&mut self, amount: i64, now: DateTime<Utc>) -> i64 {
        self.points_balance += amount;
        self.total_points_redeemed -= amount;
        self.updated_at = now;
        self.points_balance
    }

    /// Undoes a credit. Always succeeds, the balance may go negative.
    pub fn revoke(&mut self, amount: i64, spent_cents: i64, now: DateTime<Utc>) -> i64 {
        self.points_balance -= amount;
        self.total_points_earned -= amount;
        self.total_spent_cents -= spent_cents;
        self.updated_at = now;
        if self.points_balance < 0 {
            tracing::warn!(
                account_id = %self.id,
                balance = self.points_balance,
                "Storno left points balance negative"
            );
        }
        self.points_balance
    }

    /// balance == earned - redeemed
    pub fn is_consistent(&self) -> bool {
        self.points_balance == self.total_points_earned - self.total_points_redeemed
    }
}

/// Points earned for a purchase: `amount × rate`, floored to whole points.
pub fn points_for_amount(amount_cents: i64, points_per_unit: i64) -> i64 {
    if amount_cents <= 0 || points_per_unit <= 0 {
        return 0;
    }
    amount_cents.saturating_mul(points_per_unit) / 100
}
