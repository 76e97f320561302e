//! `SeaORM` Entity for shop coupons. Discount values live in
//! [`super::coupon_discount`].

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::CouponDiscountType;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "Coupon")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(column_name = "shopId", column_type = "Text")]
    pub shop_id: String,
    #[sea_orm(column_type = "Text")]
    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    #[sea_orm(column_name = "discountType")]
    pub discount_type: CouponDiscountType,
    #[sea_orm(column_name = "pointsRequired")]
    pub points_required: i64,
    #[sea_orm(column_name = "startsAt")]
    pub starts_at: DateTime,
    /// Null = never
    #[sea_orm(column_name = "expiresAt", nullable)]
    pub expires_at: Option<DateTime>,
    /// Null = unlimited
    #[sea_orm(column_name = "usageLimit", nullable)]
    pub usage_limit: Option<i64>,
    /// Incremented at activation
    #[sea_orm(column_name = "usedCount")]
    pub used_count: i64,
    #[sea_orm(column_name = "isActive")]
    pub is_active: bool,
    #[sea_orm(column_name = "createdAt")]
    pub created_at: DateTime,
    #[sea_orm(column_name = "updatedAt")]
    pub updated_at: DateTime,
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
    #[sea_orm(has_many = "super::coupon_discount::Entity")]
    CouponDiscount,
}

impl Related<super::shop::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shop.def()
    }
}

impl Related<super::coupon_discount::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CouponDiscount.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Domain coupon with its discount entries as terms
    pub fn into_coupon(
        self,
        discounts: Vec<super::coupon_discount::Model>,
    ) -> loyalty_hub_ledger::Coupon {
        loyalty_hub_ledger::Coupon {
            terms: loyalty_hub_ledger::CouponTerms {
                name: self.name,
                description: self.description,
                discount_type: self.discount_type.into(),
                discounts: discounts
                    .into_iter()
                    .map(|d| loyalty_hub_ledger::DiscountEntry {
                        article_id: d.article_id,
                        value: d.value,
                    })
                    .collect(),
            },
            id: self.id,
            shop_id: self.shop_id,
            points_required: self.points_required,
            starts_at: self.starts_at.and_utc(),
            expires_at: self.expires_at.map(|t| t.and_utc()),
            usage_limit: self.usage_limit,
            used_count: self.used_count,
            is_active: self.is_active,
            created_at: self.created_at.and_utc(),
            updated_at: self.updated_at.and_utc(),
        }
    }
}
