use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "AuditLog")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    /// `coupon_redemption`, `coupon_consumption`, ...
    #[sea_orm(column_type = "Text")]
    pub kind: String,
    #[sea_orm(column_name = "shopId", column_type = "Text")]
    pub shop_id: String,
    #[sea_orm(column_name = "customerId", column_type = "Text", nullable)]
    pub customer_id: Option<String>,
    #[sea_orm(column_name = "redemptionId", column_type = "Text", nullable)]
    pub redemption_id: Option<String>,
    #[sea_orm(column_name = "transactionId", column_type = "Text", nullable)]
    pub transaction_id: Option<String>,
    #[sea_orm(column_name = "pointsDelta")]
    pub points_delta: i64,
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Json,
    #[sea_orm(column_name = "createdAt")]
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
