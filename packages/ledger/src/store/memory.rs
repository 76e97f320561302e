//! In-memory [`LedgerStore`]
//!
//! Everything lives behind a single mutex, so each atomic unit holds the lock
//! for its whole body and no other call can observe a half-applied change.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loyalty_hub_types::create_id;
use parking_lot::Mutex;

use super::{
    ActivationInput, ActivationOutcome, ClaimInput, ClaimOutcome, LedgerStore, NewTransaction,
    ReversalOutcome, StoreError, StornoOutcome,
};
use crate::points::points_for_amount;
use crate::types::{
    Coupon, Customer, CustomerIdentity, PointsAccount, Redemption, RedemptionStatus, Shop,
    Transaction,
};

type AccountKey = (String, String);

#[derive(Debug, Default)]
struct Inner {
    customers: HashMap<String, Customer>,
    shops: HashMap<String, Shop>,
    coupons: HashMap<String, Coupon>,
    accounts: HashMap<AccountKey, PointsAccount>,
    redemptions: Vec<Redemption>,
    transactions: HashMap<String, Transaction>,
}

impl Inner {
    fn account_mut(
        &mut self,
        customer_id: &str,
        shop_id: &str,
        now: DateTime<Utc>,
    ) -> &mut PointsAccount {
        self.accounts
            .entry((customer_id.to_string(), shop_id.to_string()))
            .or_insert_with(|| PointsAccount::open(customer_id, shop_id, now))
    }

    fn redemption_index(&self, redemption_id: &str) -> Option<usize> {
        self.redemptions.iter().position(|r| r.id == redemption_id)
    }

    fn release_use(&mut self, coupon_id: &str, at: DateTime<Utc>) {
        if let Some(coupon) = self.coupons.get_mut(coupon_id) {
            coupon.used_count = (coupon.used_count - 1).max(0);
            coupon.updated_at = at;
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryLedgerStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_customer(&self, customer: Customer) {
        self.inner
            .lock()
            .customers
            .insert(customer.id.clone(), customer);
    }

    pub fn insert_shop(&self, shop: Shop) {
        self.inner.lock().shops.insert(shop.id.clone(), shop);
    }

    pub fn insert_coupon(&self, coupon: Coupon) {
        self.inner.lock().coupons.insert(coupon.id.clone(), coupon);
    }

    /// Credits `points` as earned, opening the account if needed.
    pub fn seed_balance(
        &self,
        customer_id: &str,
        shop_id: &str,
        points: i64,
        now: DateTime<Utc>,
    ) -> PointsAccount {
        let mut inner = self.inner.lock();
        let account = inner.account_mut(customer_id, shop_id, now);
        account.credit(points, 0, now);
        account.clone()
    }

    /// Inserts a row as-is, bypassing activation.
    pub fn insert_redemption(&self, redemption: Redemption) {
        self.inner.lock().redemptions.push(redemption);
    }

    pub fn redemptions(&self) -> Vec<Redemption> {
        self.inner.lock().redemptions.clone()
    }

    pub fn account(&self, customer_id: &str, shop_id: &str) -> Option<PointsAccount> {
        self.inner
            .lock()
            .accounts
            .get(&(customer_id.to_string(), shop_id.to_string()))
            .cloned()
    }

    pub fn coupon(&self, coupon_id: &str) -> Option<Coupon> {
        self.inner.lock().coupons.get(coupon_id).cloned()
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.inner.lock().transactions.values().cloned().collect()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn find_customer(
        &self,
        identity: &CustomerIdentity,
    ) -> Result<Option<Customer>, StoreError> {
        Ok(self
            .inner
            .lock()
            .customers
            .values()
            .find(|customer| identity.matches(customer))
            .cloned())
    }

    async fn get_shop(&self, shop_id: &str) -> Result<Option<Shop>, StoreError> {
        Ok(self.inner.lock().shops.get(shop_id).cloned())
    }

    async fn get_coupon(&self, coupon_id: &str) -> Result<Option<Coupon>, StoreError> {
        Ok(self.coupon(coupon_id))
    }

    async fn list_coupons(&self, shop_id: &str) -> Result<Vec<Coupon>, StoreError> {
        Ok(self
            .inner
            .lock()
            .coupons
            .values()
            .filter(|coupon| coupon.shop_id == shop_id)
            .cloned()
            .collect())
    }

    async fn get_account(
        &self,
        customer_id: &str,
        shop_id: &str,
    ) -> Result<Option<PointsAccount>, StoreError> {
        Ok(self.account(customer_id, shop_id))
    }

    async fn list_accounts(&self, customer_id: &str) -> Result<Vec<PointsAccount>, StoreError> {
        let mut accounts: Vec<PointsAccount> = self
            .inner
            .lock()
            .accounts
            .values()
            .filter(|account| account.customer_id == customer_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.shop_id.cmp(&b.shop_id));
        Ok(accounts)
    }

    async fn get_redemption(
        &self,
        redemption_id: &str,
    ) -> Result<Option<Redemption>, StoreError> {
        Ok(self
            .inner
            .lock()
            .redemptions
            .iter()
            .find(|r| r.id == redemption_id)
            .cloned())
    }

    async fn is_code_active(&self, code: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .lock()
            .redemptions
            .iter()
            .any(|r| r.code == code && r.status == RedemptionStatus::Active))
    }

    async fn find_active_by_code(&self, code: &str) -> Result<Option<Redemption>, StoreError> {
        Ok(self
            .inner
            .lock()
            .redemptions
            .iter()
            .find(|r| r.code == code && r.status == RedemptionStatus::Active)
            .cloned())
    }

    async fn find_latest_by_code(&self, code: &str) -> Result<Option<Redemption>, StoreError> {
        Ok(self
            .inner
            .lock()
            .redemptions
            .iter()
            .filter(|r| r.code == code)
            .max_by_key(|r| r.redeemed_at)
            .cloned())
    }

    async fn list_redemptions(
        &self,
        customer_id: &str,
        limit: u64,
    ) -> Result<Vec<Redemption>, StoreError> {
        let mut rows: Vec<Redemption> = self
            .inner
            .lock()
            .redemptions
            .iter()
            .filter(|r| r.customer_id == customer_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.redeemed_at.cmp(&a.redeemed_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn get_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        Ok(self.inner.lock().transactions.get(transaction_id).cloned())
    }

    async fn activate(&self, input: ActivationInput) -> Result<ActivationOutcome, StoreError> {
        let mut inner = self.inner.lock();

        if inner
            .redemptions
            .iter()
            .any(|r| r.code == input.code && r.status == RedemptionStatus::Active)
        {
            return Err(StoreError::CodeConflict(input.code));
        }

        let Some(coupon) = inner.coupons.get(&input.coupon_id).cloned() else {
            return Ok(ActivationOutcome::CouponMissing);
        };
        if let Err(reason) = coupon.availability(input.now) {
            return Ok(ActivationOutcome::CouponUnavailable(reason));
        }

        let account = inner.account_mut(&input.customer_id, &coupon.shop_id, input.now);
        let balance_before = account.points_balance;
        let balance_after = match account.debit(coupon.points_required, input.now) {
            Ok(balance) => balance,
            Err(insufficient) => {
                return Ok(ActivationOutcome::InsufficientPoints {
                    required: insufficient.required,
                    current: insufficient.current,
                });
            }
        };

        if let Some(stored) = inner.coupons.get_mut(&coupon.id) {
            stored.used_count += 1;
            stored.updated_at = input.now;
        }

        let redemption = Redemption {
            id: input.redemption_id,
            code: input.code,
            coupon_id: coupon.id,
            shop_id: coupon.shop_id,
            customer_id: input.customer_id,
            points_deducted: coupon.points_required,
            status: RedemptionStatus::Active,
            terms: coupon.terms,
            redeemed_at: input.now,
            consumed_at: None,
            reversed_at: None,
        };
        inner.redemptions.push(redemption.clone());

        Ok(ActivationOutcome::Activated {
            redemption,
            balance_before,
            balance_after,
        })
    }

    async fn transition(
        &self,
        redemption_id: &str,
        to: RedemptionStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let Some(row) = inner
            .redemptions
            .iter_mut()
            .find(|r| r.id == redemption_id && r.status == RedemptionStatus::Active)
        else {
            return Ok(false);
        };
        row.status = to;
        if to == RedemptionStatus::Used {
            row.consumed_at = Some(at);
        }
        Ok(true)
    }

    async fn expire_issued_before(
        &self,
        shop_id: Option<&str>,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        let mut expired = 0;
        for row in inner.redemptions.iter_mut().filter(|r| {
            r.status == RedemptionStatus::Active
                && r.redeemed_at < cutoff
                && shop_id.is_none_or(|shop| r.shop_id == shop)
        }) {
            row.status = RedemptionStatus::Expired;
            expired += 1;
        }
        Ok(expired)
    }

    async fn reverse_redemption(
        &self,
        redemption_id: &str,
        active_cutoff: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<ReversalOutcome, StoreError> {
        let mut inner = self.inner.lock();
        let Some(index) = inner.redemption_index(redemption_id) else {
            return Ok(ReversalOutcome::NotFound);
        };

        let row = inner.redemptions[index].clone();
        if row.reversed_at.is_some() {
            return Ok(ReversalOutcome::AlreadyReversed);
        }
        if row.status == RedemptionStatus::Active && row.redeemed_at >= active_cutoff {
            return Ok(ReversalOutcome::StillActive);
        }

        let key = (row.customer_id.clone(), row.shop_id.clone());
        let Some(account) = inner.accounts.get_mut(&key) else {
            return Ok(ReversalOutcome::MissingAccount);
        };
        account.restore(row.points_deducted, at);
        let account = account.clone();

        inner.release_use(&row.coupon_id, at);

        let stored = &mut inner.redemptions[index];
        if stored.status == RedemptionStatus::Active {
            stored.status = RedemptionStatus::Expired;
        }
        stored.reversed_at = Some(at);

        Ok(ReversalOutcome::Reversed {
            redemption: stored.clone(),
            account,
        })
    }

    async fn record_transaction(&self, input: NewTransaction) -> Result<Transaction, StoreError> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner
            .transactions
            .values()
            .find(|t| t.shop_id == input.shop_id && t.external_id == input.external_id)
        {
            return Ok(existing.clone());
        }

        let transaction = Transaction {
            id: create_id(),
            shop_id: input.shop_id,
            external_id: input.external_id,
            amount_cents: input.amount_cents,
            coupon_redemption_id: input.coupon_redemption_id,
            claimed_by: None,
            points_awarded: 0,
            claimed_at: None,
            cancelled_at: None,
            created_at: input.now,
        };
        inner
            .transactions
            .insert(transaction.id.clone(), transaction.clone());
        Ok(transaction)
    }

    async fn claim_transaction(&self, input: ClaimInput) -> Result<ClaimOutcome, StoreError> {
        let mut inner = self.inner.lock();
        let Some(transaction) = inner.transactions.get(&input.transaction_id).cloned() else {
            return Ok(ClaimOutcome::NotFound);
        };
        if transaction.cancelled_at.is_some() {
            return Ok(ClaimOutcome::Cancelled);
        }
        if transaction.claimed_by.is_some() {
            return Ok(ClaimOutcome::AlreadyClaimed);
        }
        let Some(points_per_unit) = inner
            .shops
            .get(&transaction.shop_id)
            .map(|shop| shop.points_per_unit)
        else {
            return Ok(ClaimOutcome::ShopMissing);
        };

        let points = points_for_amount(transaction.amount_cents, points_per_unit);
        let account = inner.account_mut(&input.customer_id, &transaction.shop_id, input.now);
        account.credit(points, transaction.amount_cents, input.now);
        let account = account.clone();

        let Some(stored) = inner.transactions.get_mut(&input.transaction_id) else {
            return Ok(ClaimOutcome::NotFound);
        };
        stored.claimed_by = Some(input.customer_id);
        stored.points_awarded = points;
        stored.claimed_at = Some(input.now);

        Ok(ClaimOutcome::Claimed {
            transaction: stored.clone(),
            account,
            points,
        })
    }

    async fn storno_transaction(
        &self,
        transaction_id: &str,
        at: DateTime<Utc>,
    ) -> Result<StornoOutcome, StoreError> {
        let mut inner = self.inner.lock();
        let Some(transaction) = inner.transactions.get(transaction_id).cloned() else {
            return Ok(StornoOutcome::NotFound);
        };
        if transaction.cancelled_at.is_some() {
            return Ok(StornoOutcome::AlreadyCancelled);
        }

        // Resolve everything before touching a balance.
        let credit_key = transaction
            .claimed_by
            .clone()
            .map(|customer_id| (customer_id, transaction.shop_id.clone()));
        let linked = transaction
            .coupon_redemption_id
            .as_deref()
            .and_then(|id| inner.redemption_index(id))
            .filter(|&index| {
                let row = &inner.redemptions[index];
                row.reversed_at.is_none() && row.status.is_terminal()
            });
        let debit_key = linked.map(|index| {
            let row = &inner.redemptions[index];
            (row.customer_id.clone(), row.shop_id.clone())
        });
        let missing = [&credit_key, &debit_key]
            .into_iter()
            .flatten()
            .any(|key| !inner.accounts.contains_key(key));
        if missing {
            return Ok(StornoOutcome::MissingAccount);
        }

        let mut points_revoked = 0;
        if let Some(key) = credit_key {
            if let Some(account) = inner.accounts.get_mut(&key) {
                account.revoke(transaction.points_awarded, transaction.amount_cents, at);
                points_revoked = transaction.points_awarded;
            }
        }

        let mut points_restored = 0;
        let mut reversed_redemption_id = None;
        let mut reversed_customer_id = None;
        if let (Some(index), Some(key)) = (linked, debit_key) {
            let row = &mut inner.redemptions[index];
            row.reversed_at = Some(at);
            let points = row.points_deducted;
            let coupon_id = row.coupon_id.clone();
            reversed_redemption_id = Some(row.id.clone());
            reversed_customer_id = Some(row.customer_id.clone());

            if let Some(account) = inner.accounts.get_mut(&key) {
                account.restore(points, at);
            }
            inner.release_use(&coupon_id, at);
            points_restored = points;
        }

        let Some(stored) = inner.transactions.get_mut(transaction_id) else {
            return Ok(StornoOutcome::NotFound);
        };
        stored.cancelled_at = Some(at);

        Ok(StornoOutcome::Cancelled {
            transaction: stored.clone(),
            points_revoked,
            points_restored,
            reversed_redemption_id,
            reversed_customer_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CouponTerms, DiscountEntry, DiscountType};
    use chrono::Duration;

    fn store_with_coupon(points_required: i64, usage_limit: Option<i64>) -> InMemoryLedgerStore {
        let now = Utc::now();
        let store = InMemoryLedgerStore::new();
        store.insert_shop(Shop {
            id: "s1".into(),
            name: "Cafe".into(),
            points_per_unit: 1,
        });
        store.insert_coupon(Coupon {
            id: "c1".into(),
            shop_id: "s1".into(),
            terms: CouponTerms {
                name: "Free coffee".into(),
                description: None,
                discount_type: DiscountType::Percentage,
                discounts: vec![DiscountEntry::for_article("coffee", 100)],
            },
            points_required,
            starts_at: now - Duration::days(1),
            expires_at: None,
            usage_limit,
            used_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        });
        store
    }

    fn input(code: &str) -> ActivationInput {
        ActivationInput {
            redemption_id: create_id(),
            code: code.into(),
            customer_id: "u1".into(),
            coupon_id: "c1".into(),
            now: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_activate_debits_and_reserves() {
        let store = store_with_coupon(600, Some(5));
        store.seed_balance("u1", "s1", 1000, Utc::now());

        let outcome = store.activate(input("123456")).await.unwrap();
        let ActivationOutcome::Activated {
            redemption,
            balance_before,
            balance_after,
        } = outcome
        else {
            panic!("expected activation, got {outcome:?}");
        };
        assert_eq!((balance_before, balance_after), (1000, 400));
        assert_eq!(redemption.points_deducted, 600);
        assert_eq!(store.coupon("c1").unwrap().used_count, 1);
        assert!(store.is_code_active("123456").await.unwrap());
    }

    #[tokio::test]
    async fn test_activate_conflict_changes_nothing() {
        let store = store_with_coupon(100, None);
        store.seed_balance("u1", "s1", 1000, Utc::now());
        store.activate(input("111111")).await.unwrap();

        let err = store.activate(input("111111")).await.unwrap_err();
        assert!(matches!(err, StoreError::CodeConflict(code) if code == "111111"));
        assert_eq!(store.account("u1", "s1").unwrap().points_balance, 900);
        assert_eq!(store.redemptions().len(), 1);
    }

    #[tokio::test]
    async fn test_activate_opens_account_lazily() {
        let store = store_with_coupon(600, None);
        let outcome = store.activate(input("222222")).await.unwrap();
        assert!(matches!(
            outcome,
            ActivationOutcome::InsufficientPoints {
                required: 600,
                current: 0
            }
        ));
        assert_eq!(store.account("u1", "s1").unwrap().points_balance, 0);
    }

    #[tokio::test]
    async fn test_transition_only_from_active() {
        let store = store_with_coupon(100, None);
        store.seed_balance("u1", "s1", 100, Utc::now());
        let ActivationOutcome::Activated { redemption, .. } =
            store.activate(input("333333")).await.unwrap()
        else {
            panic!("expected activation");
        };

        let now = Utc::now();
        assert!(store
            .transition(&redemption.id, RedemptionStatus::Used, now)
            .await
            .unwrap());
        assert!(!store
            .transition(&redemption.id, RedemptionStatus::Expired, now)
            .await
            .unwrap());

        let row = store.get_redemption(&redemption.id).await.unwrap().unwrap();
        assert_eq!(row.status, RedemptionStatus::Used);
        assert_eq!(row.consumed_at, Some(now));
    }

    #[tokio::test]
    async fn test_record_transaction_is_idempotent() {
        let store = store_with_coupon(100, None);
        let new = NewTransaction {
            shop_id: "s1".into(),
            external_id: "R-1".into(),
            amount_cents: 1250,
            coupon_redemption_id: None,
            now: Utc::now(),
        };
        let first = store.record_transaction(new.clone()).await.unwrap();
        let second = store.record_transaction(new).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.transactions().len(), 1);
    }
}
