mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::*;
use futures::future::join_all;
use loyalty_hub_ledger::{
    CodeGenerator, Coupon, Customer, CustomerIdentity, InMemoryLedgerStore, LedgerConfig,
    LedgerError, MemoryAuditSink, PointsAccount, Redemption, RedemptionLedger, RedemptionStatus,
    Shop, Transaction,
    store::{
        ActivationInput, ActivationOutcome, ClaimInput, ClaimOutcome, LedgerStore,
        NewTransaction, ReversalOutcome, StoreError, StornoOutcome,
    },
};

/// Reports every code as free, so duplicates only surface on insert.
#[derive(Clone, Debug)]
struct StaleLookupStore {
    inner: InMemoryLedgerStore,
    lookups: Arc<AtomicU64>,
}

impl StaleLookupStore {
    fn new(inner: InMemoryLedgerStore) -> Self {
        Self {
            inner,
            lookups: Arc::new(AtomicU64::new(0)),
        }
    }

    fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl LedgerStore for StaleLookupStore {
    fn backend_name(&self) -> &'static str {
        "stale-lookup"
    }

    async fn find_customer(
        &self,
        identity: &CustomerIdentity,
    ) -> Result<Option<Customer>, StoreError> {
        self.inner.find_customer(identity).await
    }

    async fn get_shop(&self, shop_id: &str) -> Result<Option<Shop>, StoreError> {
        self.inner.get_shop(shop_id).await
    }

    async fn get_coupon(&self, coupon_id: &str) -> Result<Option<Coupon>, StoreError> {
        self.inner.get_coupon(coupon_id).await
    }

    async fn list_coupons(&self, shop_id: &str) -> Result<Vec<Coupon>, StoreError> {
        self.inner.list_coupons(shop_id).await
    }

    async fn get_account(
        &self,
        customer_id: &str,
        shop_id: &str,
    ) -> Result<Option<PointsAccount>, StoreError> {
        self.inner.get_account(customer_id, shop_id).await
    }

    async fn list_accounts(&self, customer_id: &str) -> Result<Vec<PointsAccount>, StoreError> {
        self.inner.list_accounts(customer_id).await
    }

    async fn get_redemption(
        &self,
        redemption_id: &str,
    ) -> Result<Option<Redemption>, StoreError> {
        self.inner.get_redemption(redemption_id).await
    }

    async fn is_code_active(&self, _code: &str) -> Result<bool, StoreError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(false)
    }

    async fn find_active_by_code(&self, code: &str) -> Result<Option<Redemption>, StoreError> {
        self.inner.find_active_by_code(code).await
    }

    async fn find_latest_by_code(&self, code: &str) -> Result<Option<Redemption>, StoreError> {
        self.inner.find_latest_by_code(code).await
    }

    async fn list_redemptions(
        &self,
        customer_id: &str,
        limit: u64,
    ) -> Result<Vec<Redemption>, StoreError> {
        self.inner.list_redemptions(customer_id, limit).await
    }

    async fn get_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        self.inner.get_transaction(transaction_id).await
    }

    async fn activate(&self, input: ActivationInput) -> Result<ActivationOutcome, StoreError> {
        self.inner.activate(input).await
    }

    async fn transition(
        &self,
        redemption_id: &str,
        to: RedemptionStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner.transition(redemption_id, to, at).await
    }

    async fn expire_issued_before(
        &self,
        shop_id: Option<&str>,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.inner.expire_issued_before(shop_id, cutoff).await
    }

    async fn reverse_redemption(
        &self,
        redemption_id: &str,
        active_cutoff: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<ReversalOutcome, StoreError> {
        self.inner
            .reverse_redemption(redemption_id, active_cutoff, at)
            .await
    }

    async fn record_transaction(&self, input: NewTransaction) -> Result<Transaction, StoreError> {
        self.inner.record_transaction(input).await
    }

    async fn claim_transaction(&self, input: ClaimInput) -> Result<ClaimOutcome, StoreError> {
        self.inner.claim_transaction(input).await
    }

    async fn storno_transaction(
        &self,
        transaction_id: &str,
        at: DateTime<Utc>,
    ) -> Result<StornoOutcome, StoreError> {
        self.inner.storno_transaction(transaction_id, at).await
    }
}

fn ledger_over(store: &StaleLookupStore, seed: u64, attempts: u32) -> RedemptionLedger {
    RedemptionLedger::new(
        Arc::new(store.clone()),
        Arc::new(MemoryAuditSink::new()),
        LedgerConfig::default(),
    )
    .with_code_generator(CodeGenerator::with_seed(attempts, seed))
}

fn active_row(id: &str, code: String, now: DateTime<Utc>) -> Redemption {
    Redemption {
        id: id.to_string(),
        code,
        coupon_id: COUPON.to_string(),
        shop_id: SHOP.to_string(),
        customer_id: "user_other".to_string(),
        points_deducted: 600,
        status: RedemptionStatus::Active,
        terms: common::coupon(COUPON, SHOP, 600, now).terms,
        redeemed_at: now,
        consumed_at: None,
        reversed_at: None,
    }
}

#[tokio::test]
async fn insert_conflicts_spend_the_same_budget() {
    let fx = Fixture::new();
    fx.seed(600);

    // Every draw the generator will make is already live.
    let twin = CodeGenerator::with_seed(10, 5);
    for i in 0..10 {
        fx.store
            .insert_redemption(active_row(&format!("redemption_{i}"), twin.generate(), fx.now));
    }

    let store = StaleLookupStore::new(fx.store.clone());
    let ledger = ledger_over(&store, 5, 10);
    let err = ledger.activate_at(CUSTOMER, COUPON, fx.now).await.unwrap_err();

    assert!(matches!(err, LedgerError::CollisionExhausted { attempts: 10 }));
    assert_eq!(store.lookups(), 10);
    let stats = ledger.code_stats();
    assert_eq!(stats.attempts, 10);
    assert_eq!(stats.collisions, 10);
    assert_eq!(stats.exhausted, 1);

    assert_eq!(fx.balance(), 600);
    assert_eq!(fx.store.redemptions().len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_draws_never_share_an_active_code() {
    let fx = Fixture::new();
    let customers: Vec<String> = (0..8).map(|i| format!("user_{i}")).collect();
    for customer in &customers {
        fx.store.insert_customer(Customer {
            id: customer.clone(),
            email: None,
            phone: None,
            display_name: None,
        });
        fx.store.seed_balance(customer, SHOP, 600, fx.now);
    }

    // Same seed everywhere: every ledger draws the same sequence of codes.
    let store = StaleLookupStore::new(fx.store.clone());
    let ledgers: Vec<RedemptionLedger> = customers
        .iter()
        .map(|_| ledger_over(&store, 21, 10))
        .collect();

    let now = fx.now;
    let tasks = ledgers.iter().zip(&customers).map(|(ledger, customer)| {
        let ledger = ledger.clone();
        let customer = customer.clone();
        tokio::spawn(async move { ledger.activate_at(&customer, COUPON, now).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();
    assert!(results.iter().all(Result::is_ok), "{results:?}");

    let mut active_per_code: HashMap<String, usize> = HashMap::new();
    for row in fx.store.redemptions() {
        if row.status == RedemptionStatus::Active {
            *active_per_code.entry(row.code).or_default() += 1;
        }
    }
    assert_eq!(active_per_code.len(), customers.len());
    assert!(active_per_code.values().all(|count| *count == 1));

    for customer in &customers {
        let account = fx.store.account(customer, SHOP).unwrap();
        assert_eq!(account.points_balance, 0);
        assert_eq!(account.total_points_redeemed, 600);
    }

    let stats: Vec<_> = ledgers.iter().map(RedemptionLedger::code_stats).collect();
    let conflicts: u64 = stats.iter().map(|s| s.collisions).sum();
    let retries: u64 = stats.iter().map(|s| s.attempts - 1).sum();
    assert!(conflicts > 0);
    assert_eq!(conflicts, retries);
    assert!(stats.iter().all(|s| s.exhausted == 0));
}
