//! `SeaORM` Entity for per-customer-per-shop balances.
//! `(customerId, shopId)` is unique.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "PointsAccount")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(column_name = "customerId", column_type = "Text")]
    pub customer_id: String,
    #[sea_orm(column_name = "shopId", column_type = "Text")]
    pub shop_id: String,
    #[sea_orm(column_name = "pointsBalance")]
    pub points_balance: i64,
    #[sea_orm(column_name = "totalPointsEarned")]
    pub total_points_earned: i64,
    #[sea_orm(column_name = "totalPointsRedeemed")]
    pub total_points_redeemed: i64,
    #[sea_orm(column_name = "totalSpentCents")]
    pub total_spent_cents: i64,
    #[sea_orm(column_name = "lastVisit", nullable)]
    pub last_visit: Option<DateTime>,
    #[sea_orm(column_name = "createdAt")]
    pub created_at: DateTime,
    #[sea_orm(column_name = "updatedAt")]
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::app_user::Entity",
        from = "Column::CustomerId",
        to = "super::app_user::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Customer,
    #[sea_orm(
        belongs_to = "super::shop::Entity",
        from = "Column::ShopId",
        to = "super::shop::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Shop,
}

impl Related<super::app_user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::shop::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shop.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for loyalty_hub_ledger::PointsAccount {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            customer_id: model.customer_id,
            shop_id: model.shop_id,
            points_balance: model.points_balance,
            total_points_earned: model.total_points_earned,
            total_points_redeemed: model.total_points_redeemed,
            total_spent_cents: model.total_spent_cents,
            last_visit: model.last_visit.map(|t| t.and_utc()),
            created_at: model.created_at.and_utc(),
            updated_at: model.updated_at.and_utc(),
        }
    }
}
