//! `SeaORM` Entity for customers and shop owners

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::UserRole;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "AppUser")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    /// Lowercased
    #[sea_orm(column_type = "Text", nullable, unique)]
    pub email: Option<String>,
    /// Digits with an optional leading `+`
    #[sea_orm(column_type = "Text", nullable, unique)]
    pub phone: Option<String>,
    #[sea_orm(column_name = "displayName", column_type = "Text", nullable)]
    pub display_name: Option<String>,
    pub role: UserRole,
    #[sea_orm(column_name = "createdAt")]
    pub created_at: DateTime,
    #[sea_orm(column_name = "updatedAt")]
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::points_account::Entity")]
    PointsAccount,
    #[sea_orm(has_many = "super::shop::Entity")]
    Shop,
}

impl Related<super::points_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PointsAccount.def()
    }
}

impl Related<super::shop::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shop.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
