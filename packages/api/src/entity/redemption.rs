//! `SeaORM` Entity for activated coupons.
//! `code` is unique among rows with `status = 'ACTIVE'` (partial index).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::RedemptionStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "Redemption")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(column_type = "Text")]
    pub code: String,
    #[sea_orm(column_name = "couponId", column_type = "Text")]
    pub coupon_id: String,
    #[sea_orm(column_name = "shopId", column_type = "Text")]
    pub shop_id: String,
    #[sea_orm(column_name = "customerId", column_type = "Text")]
    pub customer_id: String,
    #[sea_orm(column_name = "pointsDeducted")]
    pub points_deducted: i64,
    pub status: RedemptionStatus,
    /// Coupon terms at activation time
    #[sea_orm(column_type = "JsonBinary")]
    pub terms: Json,
    #[sea_orm(column_name = "redeemedAt")]
    pub redeemed_at: DateTime,
    #[sea_orm(column_name = "consumedAt", nullable)]
    pub consumed_at: Option<DateTime>,
    #[sea_orm(column_name = "reversedAt", nullable)]
    pub reversed_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::coupon::Entity",
        from = "Column::CouponId",
        to = "super::coupon::Column::Id",
        on_update = "Cascade",
        on_delete = "Restrict"
    )]
    Coupon,
}

impl Related<super::coupon::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Coupon.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
