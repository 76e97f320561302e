//! PostgreSQL ledger store implementation using SeaORM
//!
//! Every atomic unit of [`LedgerStore`] runs in one database transaction.
//! Rows are locked with `SELECT ... FOR UPDATE` in a fixed order
//! (transaction, redemption, coupon, points accounts) so concurrent units
//! serialize instead of deadlocking. Dropping an uncommitted transaction
//! rolls it back.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loyalty_hub_ledger::{
    Coupon, CouponTerms, Customer, CustomerIdentity, PointsAccount, Redemption, RedemptionStatus,
    Shop, Transaction,
    points::points_for_amount,
    store::{
        ActivationInput, ActivationOutcome, ClaimInput, ClaimOutcome, LedgerStore,
        NewTransaction, ReversalOutcome, StoreError, StornoOutcome,
    },
};
use loyalty_hub_types::create_id;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
    sea_query::{Expr, OnConflict},
};

use crate::entity::{
    app_user, coupon, coupon_discount, points_account, redemption,
    sea_orm_active_enums::{RedemptionStatus as EntityRedemptionStatus, UserRole},
    shop, transaction,
};

#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    db: Arc<DatabaseConnection>,
}

impl PostgresLedgerStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn begin(&self) -> Result<DatabaseTransaction, StoreError> {
        self.db.begin().await.map_err(db_err)
    }
}

fn db_err(err: DbErr) -> StoreError {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => StoreError::Connection(err.to_string()),
        _ => StoreError::Database(err.to_string()),
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

// Conversion helpers
fn redemption_model_to_record(m: redemption::Model) -> Result<Redemption, StoreError> {
    let terms: CouponTerms = serde_json::from_value(m.terms).map_err(|e| {
        StoreError::Database(format!("redemption {} has unreadable terms: {e}", m.id))
    })?;
    Ok(Redemption {
        id: m.id,
        code: m.code,
        coupon_id: m.coupon_id,
        shop_id: m.shop_id,
        customer_id: m.customer_id,
        points_deducted: m.points_deducted,
        status: m.status.into(),
        terms,
        redeemed_at: m.redeemed_at.and_utc(),
        consumed_at: m.consumed_at.map(|t| t.and_utc()),
        reversed_at: m.reversed_at.map(|t| t.and_utc()),
    })
}

fn user_model_to_customer(m: app_user::Model) -> Customer {
    Customer {
        id: m.id,
        email: m.email,
        phone: m.phone,
        display_name: m.display_name,
    }
}

fn account_to_active(a: &PointsAccount) -> points_account::ActiveModel {
    points_account::ActiveModel {
        id: Set(a.id.clone()),
        customer_id: Set(a.customer_id.clone()),
        shop_id: Set(a.shop_id.clone()),
        points_balance: Set(a.points_balance),
        total_points_earned: Set(a.total_points_earned),
        total_points_redeemed: Set(a.total_points_redeemed),
        total_spent_cents: Set(a.total_spent_cents),
        last_visit: Set(a.last_visit.map(|t| t.naive_utc())),
        created_at: Set(a.created_at.naive_utc()),
        updated_at: Set(a.updated_at.naive_utc()),
    }
}

async fn find_account_locked(
    txn: &DatabaseTransaction,
    customer_id: &str,
    shop_id: &str,
) -> Result<Option<PointsAccount>, StoreError> {
    let model = points_account::Entity::find()
        .filter(points_account::Column::CustomerId.eq(customer_id))
        .filter(points_account::Column::ShopId.eq(shop_id))
        .lock_exclusive()
        .one(txn)
        .await
        .map_err(db_err)?;
    Ok(model.map(Into::into))
}

/// Opens the account if it does not exist yet, then locks it.
async fn open_account_locked(
    txn: &DatabaseTransaction,
    customer_id: &str,
    shop_id: &str,
    now: DateTime<Utc>,
) -> Result<PointsAccount, StoreError> {
    let fresh = PointsAccount::open(customer_id, shop_id, now);
    points_account::Entity::insert(account_to_active(&fresh))
        .on_conflict(
            OnConflict::columns([
                points_account::Column::CustomerId,
                points_account::Column::ShopId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(txn)
        .await
        .map_err(db_err)?;

    find_account_locked(txn, customer_id, shop_id)
        .await?
        .ok_or_else(|| {
            StoreError::Database(format!(
                "points account ({customer_id}, {shop_id}) missing after upsert"
            ))
        })
}

async fn save_account(txn: &DatabaseTransaction, account: &PointsAccount) -> Result<(), StoreError> {
    account_to_active(account)
        .update(txn)
        .await
        .map_err(db_err)?;
    Ok(())
}

fn account_index(accounts: &[PointsAccount], key: &(String, String)) -> Option<usize> {
    accounts
        .iter()
        .position(|a| a.customer_id == key.0 && a.shop_id == key.1)
}

async fn lock_coupon(txn: &DatabaseTransaction, coupon_id: &str) -> Result<bool, StoreError> {
    let found = coupon::Entity::find_by_id(coupon_id)
        .lock_exclusive()
        .one(txn)
        .await
        .map_err(db_err)?;
    Ok(found.is_some())
}

/// Gives back the use reserved at activation. Never goes below zero.
async fn release_use(
    txn: &DatabaseTransaction,
    coupon_id: &str,
    at: DateTime<Utc>,
) -> Result<(), StoreError> {
    coupon::Entity::update_many()
        .col_expr(
            coupon::Column::UsedCount,
            Expr::col(coupon::Column::UsedCount).sub(1),
        )
        .col_expr(coupon::Column::UpdatedAt, Expr::value(at.naive_utc()))
        .filter(coupon::Column::Id.eq(coupon_id))
        .filter(coupon::Column::UsedCount.gt(0))
        .exec(txn)
        .await
        .map_err(db_err)?;
    Ok(())
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn find_customer(
        &self,
        identity: &CustomerIdentity,
    ) -> Result<Option<Customer>, StoreError> {
        let query = app_user::Entity::find().filter(app_user::Column::Role.eq(UserRole::Customer));
        let query = match identity {
            CustomerIdentity::Email(email) => {
                query.filter(app_user::Column::Email.eq(email.as_str()))
            }
            CustomerIdentity::Phone(phone) => {
                query.filter(app_user::Column::Phone.eq(phone.as_str()))
            }
        };
        let result = query.one(self.db.as_ref()).await.map_err(db_err)?;
        Ok(result.map(user_model_to_customer))
    }

    async fn get_shop(&self, shop_id: &str) -> Result<Option<Shop>, StoreError> {
        let result = shop::Entity::find_by_id(shop_id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(result.map(Into::into))
    }

    async fn get_coupon(&self, coupon_id: &str) -> Result<Option<Coupon>, StoreError> {
        let result = coupon::Entity::find_by_id(coupon_id)
            .find_with_related(coupon_discount::Entity)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(result
            .into_iter()
            .next()
            .map(|(m, discounts)| m.into_coupon(discounts)))
    }

    async fn list_coupons(&self, shop_id: &str) -> Result<Vec<Coupon>, StoreError> {
        let results = coupon::Entity::find()
            .filter(coupon::Column::ShopId.eq(shop_id))
            .order_by_asc(coupon::Column::CreatedAt)
            .find_with_related(coupon_discount::Entity)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(results
            .into_iter()
            .map(|(m, discounts)| m.into_coupon(discounts))
            .collect())
    }

    async fn get_account(
        &self,
        customer_id: &str,
        shop_id: &str,
    ) -> Result<Option<PointsAccount>, StoreError> {
        let result = points_account::Entity::find()
            .filter(points_account::Column::CustomerId.eq(customer_id))
            .filter(points_account::Column::ShopId.eq(shop_id))
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(result.map(Into::into))
    }

    async fn list_accounts(&self, customer_id: &str) -> Result<Vec<PointsAccount>, StoreError> {
        let results = points_account::Entity::find()
            .filter(points_account::Column::CustomerId.eq(customer_id))
            .order_by_asc(points_account::Column::ShopId)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(results.into_iter().map(Into::into).collect())
    }

    async fn get_redemption(
        &self,
        redemption_id: &str,
    ) -> Result<Option<Redemption>, StoreError> {
        redemption::Entity::find_by_id(redemption_id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?
            .map(redemption_model_to_record)
            .transpose()
    }

    async fn is_code_active(&self, code: &str) -> Result<bool, StoreError> {
        let count = redemption::Entity::find()
            .filter(redemption::Column::Code.eq(code))
            .filter(redemption::Column::Status.eq(EntityRedemptionStatus::Active))
            .count(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(count > 0)
    }

    async fn find_active_by_code(&self, code: &str) -> Result<Option<Redemption>, StoreError> {
        redemption::Entity::find()
            .filter(redemption::Column::Code.eq(code))
            .filter(redemption::Column::Status.eq(EntityRedemptionStatus::Active))
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?
            .map(redemption_model_to_record)
            .transpose()
    }

    async fn find_latest_by_code(&self, code: &str) -> Result<Option<Redemption>, StoreError> {
        redemption::Entity::find()
            .filter(redemption::Column::Code.eq(code))
            .order_by_desc(redemption::Column::RedeemedAt)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?
            .map(redemption_model_to_record)
            .transpose()
    }

    async fn list_redemptions(
        &self,
        customer_id: &str,
        limit: u64,
    ) -> Result<Vec<Redemption>, StoreError> {
        redemption::Entity::find()
            .filter(redemption::Column::CustomerId.eq(customer_id))
            .order_by_desc(redemption::Column::RedeemedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?
            .into_iter()
            .map(redemption_model_to_record)
            .collect()
    }

    async fn get_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        let result = transaction::Entity::find_by_id(transaction_id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(result.map(Into::into))
    }

    async fn activate(&self, input: ActivationInput) -> Result<ActivationOutcome, StoreError> {
        let txn = self.begin().await?;

        let taken = redemption::Entity::find()
            .filter(redemption::Column::Code.eq(input.code.as_str()))
            .filter(redemption::Column::Status.eq(EntityRedemptionStatus::Active))
            .count(&txn)
            .await
            .map_err(db_err)?;
        if taken > 0 {
            return Err(StoreError::CodeConflict(input.code));
        }

        let Some(coupon_row) = coupon::Entity::find_by_id(input.coupon_id.as_str())
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(db_err)?
        else {
            return Ok(ActivationOutcome::CouponMissing);
        };
        let discounts = coupon_discount::Entity::find()
            .filter(coupon_discount::Column::CouponId.eq(coupon_row.id.as_str()))
            .all(&txn)
            .await
            .map_err(db_err)?;
        let coupon = coupon_row.into_coupon(discounts);
        if let Err(reason) = coupon.availability(input.now) {
            return Ok(ActivationOutcome::CouponUnavailable(reason));
        }

        let mut account =
            open_account_locked(&txn, &input.customer_id, &coupon.shop_id, input.now).await?;
        let balance_before = account.points_balance;
        let balance_after = match account.debit(coupon.points_required, input.now) {
            Ok(balance) => balance,
            Err(insufficient) => {
                // Keep the lazily opened account.
                txn.commit().await.map_err(db_err)?;
                return Ok(ActivationOutcome::InsufficientPoints {
                    required: insufficient.required,
                    current: insufficient.current,
                });
            }
        };
        save_account(&txn, &account).await?;

        coupon::Entity::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(input.now.naive_utc()))
            .filter(coupon::Column::Id.eq(coupon.id.as_str()))
            .exec(&txn)
            .await
            .map_err(db_err)?;

        let terms = serde_json::to_value(&coupon.terms)
            .map_err(|e| StoreError::Database(format!("cannot encode coupon terms: {e}")))?;
        let model = redemption::ActiveModel {
            id: Set(input.redemption_id),
            code: Set(input.code.clone()),
            coupon_id: Set(coupon.id),
            shop_id: Set(coupon.shop_id),
            customer_id: Set(input.customer_id),
            points_deducted: Set(coupon.points_required),
            status: Set(EntityRedemptionStatus::Active),
            terms: Set(terms),
            redeemed_at: Set(input.now.naive_utc()),
            consumed_at: Set(None),
            reversed_at: Set(None),
        };
        let inserted = match model.insert(&txn).await {
            Ok(inserted) => inserted,
            // Lost the race for this code on the partial unique index.
            Err(err) if is_unique_violation(&err) => {
                return Err(StoreError::CodeConflict(input.code));
            }
            Err(err) => return Err(db_err(err)),
        };

        txn.commit().await.map_err(db_err)?;

        Ok(ActivationOutcome::Activated {
            redemption: redemption_model_to_record(inserted)?,
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
        let mut model = redemption::ActiveModel {
            status: Set(to.into()),
            ..Default::default()
        };
        if to == RedemptionStatus::Used {
            model.consumed_at = Set(Some(at.naive_utc()));
        }

        let result = redemption::Entity::update_many()
            .set(model)
            .filter(redemption::Column::Id.eq(redemption_id))
            .filter(redemption::Column::Status.eq(EntityRedemptionStatus::Active))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected == 1)
    }

    async fn expire_issued_before(
        &self,
        shop_id: Option<&str>,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut update = redemption::Entity::update_many()
            .set(redemption::ActiveModel {
                status: Set(EntityRedemptionStatus::Expired),
                ..Default::default()
            })
            .filter(redemption::Column::Status.eq(EntityRedemptionStatus::Active))
            .filter(redemption::Column::RedeemedAt.lt(cutoff.naive_utc()));
        if let Some(shop_id) = shop_id {
            update = update.filter(redemption::Column::ShopId.eq(shop_id));
        }

        let result = update
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }

    async fn reverse_redemption(
        &self,
        redemption_id: &str,
        active_cutoff: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<ReversalOutcome, StoreError> {
        let txn = self.begin().await?;

        let Some(row) = redemption::Entity::find_by_id(redemption_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(db_err)?
        else {
            return Ok(ReversalOutcome::NotFound);
        };
        if row.reversed_at.is_some() {
            return Ok(ReversalOutcome::AlreadyReversed);
        }
        let still_active = row.status == EntityRedemptionStatus::Active
            && row.redeemed_at >= active_cutoff.naive_utc();
        if still_active {
            return Ok(ReversalOutcome::StillActive);
        }

        let coupon_exists = lock_coupon(&txn, &row.coupon_id).await?;
        let Some(mut account) = find_account_locked(&txn, &row.customer_id, &row.shop_id).await?
        else {
            return Ok(ReversalOutcome::MissingAccount);
        };
        account.restore(row.points_deducted, at);
        save_account(&txn, &account).await?;

        if coupon_exists {
            release_use(&txn, &row.coupon_id, at).await?;
        }

        let was_active = row.status == EntityRedemptionStatus::Active;
        let mut model: redemption::ActiveModel = row.into();
        if was_active {
            model.status = Set(EntityRedemptionStatus::Expired);
        }
        model.reversed_at = Set(Some(at.naive_utc()));
        let updated = model.update(&txn).await.map_err(db_err)?;

        txn.commit().await.map_err(db_err)?;

        Ok(ReversalOutcome::Reversed {
            redemption: redemption_model_to_record(updated)?,
            account,
        })
    }

    async fn record_transaction(&self, input: NewTransaction) -> Result<Transaction, StoreError> {
        let find_existing = || {
            transaction::Entity::find()
                .filter(transaction::Column::ShopId.eq(input.shop_id.as_str()))
                .filter(transaction::Column::ExternalId.eq(input.external_id.as_str()))
                .one(self.db.as_ref())
        };

        if let Some(existing) = find_existing().await.map_err(db_err)? {
            return Ok(existing.into());
        }

        let model = transaction::ActiveModel {
            id: Set(create_id()),
            shop_id: Set(input.shop_id.clone()),
            external_id: Set(input.external_id.clone()),
            amount_cents: Set(input.amount_cents),
            coupon_redemption_id: Set(input.coupon_redemption_id.clone()),
            claimed_by: Set(None),
            points_awarded: Set(0),
            claimed_at: Set(None),
            cancelled_at: Set(None),
            created_at: Set(input.now.naive_utc()),
        };

        match model.insert(self.db.as_ref()).await {
            Ok(inserted) => Ok(inserted.into()),
            // The provider re-sent the sale concurrently.
            Err(err) if is_unique_violation(&err) => find_existing()
                .await
                .map_err(db_err)?
                .map(Into::into)
                .ok_or_else(|| StoreError::Database(err.to_string())),
            Err(err) => Err(db_err(err)),
        }
    }

    async fn claim_transaction(&self, input: ClaimInput) -> Result<ClaimOutcome, StoreError> {
        let txn = self.begin().await?;

        let Some(row) = transaction::Entity::find_by_id(input.transaction_id.as_str())
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(db_err)?
        else {
            return Ok(ClaimOutcome::NotFound);
        };
        if row.cancelled_at.is_some() {
            return Ok(ClaimOutcome::Cancelled);
        }
        if row.claimed_by.is_some() {
            return Ok(ClaimOutcome::AlreadyClaimed);
        }

        let Some(shop) = shop::Entity::find_by_id(row.shop_id.as_str())
            .one(&txn)
            .await
            .map_err(db_err)?
        else {
            return Ok(ClaimOutcome::ShopMissing);
        };

        let points = points_for_amount(row.amount_cents, shop.points_per_unit);
        let mut account =
            open_account_locked(&txn, &input.customer_id, &row.shop_id, input.now).await?;
        account.credit(points, row.amount_cents, input.now);
        save_account(&txn, &account).await?;

        let mut model: transaction::ActiveModel = row.into();
        model.claimed_by = Set(Some(input.customer_id));
        model.points_awarded = Set(points);
        model.claimed_at = Set(Some(input.now.naive_utc()));
        let updated = model.update(&txn).await.map_err(db_err)?;

        txn.commit().await.map_err(db_err)?;

        Ok(ClaimOutcome::Claimed {
            transaction: updated.into(),
            account,
            points,
        })
    }

    async fn storno_transaction(
        &self,
        transaction_id: &str,
        at: DateTime<Utc>,
    ) -> Result<StornoOutcome, StoreError> {
        let txn = self.begin().await?;

        let Some(row) = transaction::Entity::find_by_id(transaction_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(db_err)?
        else {
            return Ok(StornoOutcome::NotFound);
        };
        if row.cancelled_at.is_some() {
            return Ok(StornoOutcome::AlreadyCancelled);
        }

        let linked = match row.coupon_redemption_id.as_deref() {
            Some(redemption_id) => redemption::Entity::find_by_id(redemption_id)
                .lock_exclusive()
                .one(&txn)
                .await
                .map_err(db_err)?
                .filter(|r| {
                    r.reversed_at.is_none() && r.status != EntityRedemptionStatus::Active
                }),
            None => None,
        };
        let coupon_exists = match &linked {
            Some(r) => lock_coupon(&txn, &r.coupon_id).await?,
            None => false,
        };

        let credit_key = row
            .claimed_by
            .clone()
            .map(|customer_id| (customer_id, row.shop_id.clone()));
        let debit_key = linked
            .as_ref()
            .map(|r| (r.customer_id.clone(), r.shop_id.clone()));
        let mut keys: Vec<(String, String)> = [credit_key.clone(), debit_key.clone()]
            .into_iter()
            .flatten()
            .collect();
        keys.sort();
        keys.dedup();

        let mut accounts = Vec::with_capacity(keys.len());
        for (customer_id, shop_id) in &keys {
            match find_account_locked(&txn, customer_id, shop_id).await? {
                Some(account) => accounts.push(account),
                None => return Ok(StornoOutcome::MissingAccount),
            }
        }
        let mut points_revoked = 0;
        if let Some(index) = credit_key.as_ref().and_then(|key| account_index(&accounts, key)) {
            accounts[index].revoke(row.points_awarded, row.amount_cents, at);
            points_revoked = row.points_awarded;
        }

        let mut points_restored = 0;
        let mut reversed_redemption_id = None;
        let mut reversed_customer_id = None;
        if let Some(linked) = linked {
            if let Some(index) = debit_key.as_ref().and_then(|key| account_index(&accounts, key)) {
                accounts[index].restore(linked.points_deducted, at);
            }
            points_restored = linked.points_deducted;
            reversed_redemption_id = Some(linked.id.clone());
            reversed_customer_id = Some(linked.customer_id.clone());

            if coupon_exists {
                release_use(&txn, &linked.coupon_id, at).await?;
            }
            let mut model: redemption::ActiveModel = linked.into();
            model.reversed_at = Set(Some(at.naive_utc()));
            model.update(&txn).await.map_err(db_err)?;
        }

        for account in &accounts {
            save_account(&txn, account).await?;
        }

        let mut model: transaction::ActiveModel = row.into();
        model.cancelled_at = Set(Some(at.naive_utc()));
        let updated = model.update(&txn).await.map_err(db_err)?;

        txn.commit().await.map_err(db_err)?;

        Ok(StornoOutcome::Cancelled {
            transaction: updated.into(),
            points_revoked,
            points_restored,
            reversed_redemption_id,
            reversed_customer_id,
        })
    }
}
