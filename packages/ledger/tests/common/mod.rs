#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use loyalty_hub_ledger::{
    Coupon, CouponTerms, Customer, DiscountEntry, DiscountType, InMemoryLedgerStore,
    LedgerConfig, MemoryAuditSink, ReceiptService, RedemptionLedger, Shop,
};

pub const SHOP: &str = "shop_cafe";
pub const OTHER_SHOP: &str = "shop_bakery";
pub const COUPON: &str = "coupon_coffee";
pub const CUSTOMER: &str = "user_anna";

pub struct Fixture {
    pub store: InMemoryLedgerStore,
    pub audit: MemoryAuditSink,
    pub ledger: RedemptionLedger,
    pub receipts: ReceiptService,
    pub now: DateTime<Utc>,
}

pub fn coupon(id: &str, shop_id: &str, points_required: i64, now: DateTime<Utc>) -> Coupon {
    Coupon {
        id: id.to_string(),
        shop_id: shop_id.to_string(),
        terms: CouponTerms {
            name: "10% off".to_string(),
            description: Some("Whole invoice".to_string()),
            discount_type: DiscountType::Percentage,
            discounts: vec![DiscountEntry::invoice_wide(10)],
        },
        points_required,
        starts_at: now - Duration::days(1),
        expires_at: Some(now + Duration::days(30)),
        usage_limit: None,
        used_count: 0,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

impl Fixture {
    pub fn new() -> Self {
        let now = Utc::now();
        let store = InMemoryLedgerStore::new();
        for (id, name) in [(SHOP, "Cafe"), (OTHER_SHOP, "Bakery")] {
            store.insert_shop(Shop {
                id: id.to_string(),
                name: name.to_string(),
                points_per_unit: 1,
            });
        }
        store.insert_customer(Customer {
            id: CUSTOMER.to_string(),
            email: Some("anna@example.com".to_string()),
            phone: None,
            display_name: Some("Anna".to_string()),
        });
        store.insert_coupon(coupon(COUPON, SHOP, 600, now));

        let audit = MemoryAuditSink::new();
        let config = LedgerConfig::default();
        let ledger = RedemptionLedger::new(
            Arc::new(store.clone()),
            Arc::new(audit.clone()),
            config.clone(),
        );
        let receipts = ReceiptService::new(
            Arc::new(store.clone()),
            Arc::new(audit.clone()),
            config.store_timeout,
        );

        Self {
            store,
            audit,
            ledger,
            receipts,
            now,
        }
    }

    pub fn seed(&self, points: i64) {
        self.store.seed_balance(CUSTOMER, SHOP, points, self.now);
    }

    pub fn balance(&self) -> i64 {
        self.store
            .account(CUSTOMER, SHOP)
            .map(|a| a.points_balance)
            .unwrap_or_default()
    }
}
