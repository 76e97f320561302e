//! `SeaORM` Entity for POS sales. `(shopId, externalId)` is unique.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "Transaction")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(column_name = "shopId", column_type = "Text")]
    pub shop_id: String,
    /// Receipt number assigned by the POS provider
    #[sea_orm(column_name = "externalId", column_type = "Text")]
    pub external_id: String,
    #[sea_orm(column_name = "amountCents")]
    pub amount_cents: i64,
    #[sea_orm(column_name = "couponRedemptionId", column_type = "Text", nullable)]
    pub coupon_redemption_id: Option<String>,
    #[sea_orm(column_name = "claimedBy", column_type = "Text", nullable)]
    pub claimed_by: Option<String>,
    #[sea_orm(column_name = "pointsAwarded")]
    pub points_awarded: i64,
    #[sea_orm(column_name = "claimedAt", nullable)]
    pub claimed_at: Option<DateTime>,
    #[sea_orm(column_name = "cancelledAt", nullable)]
    pub cancelled_at: Option<DateTime>,
    #[sea_orm(column_name = "createdAt")]
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::shop::Entity",
        from = "Column::ShopId",
        to = "super::shop::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Shop,
    #[sea_orm(
        belongs_to = "super::redemption::Entity",
        from = "Column::CouponRedemptionId",
        to = "super::redemption::Column::Id",
        on_update = "Cascade",
        on_delete = "SetNull"
    )]
    Redemption,
}

impl Related<super::shop::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shop.def()
    }
}

impl Related<super::redemption::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Redemption.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for loyalty_hub_ledger::Transaction {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            shop_id: model.shop_id,
            external_id: model.external_id,
            amount_cents: model.amount_cents,
            coupon_redemption_id: model.coupon_redemption_id,
            claimed_by: model.claimed_by,
            points_awarded: model.points_awarded,
            claimed_at: model.claimed_at.map(|t| t.and_utc()),
            cancelled_at: model.cancelled_at.map(|t| t.and_utc()),
            created_at: model.created_at.and_utc(),
        }
    }
}
