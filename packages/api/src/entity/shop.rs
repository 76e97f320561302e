use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "Shop")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(column_name = "ownerId", column_type = "Text")]
    pub owner_id: String,
    #[sea_orm(column_type = "Text")]
    pub name: String,
    /// Points credited per full currency unit spent
    #[sea_orm(column_name = "pointsPerUnit")]
    pub points_per_unit: i64,
    #[sea_orm(column_name = "createdAt")]
    pub created_at: DateTime,
    #[sea_orm(column_name = "updatedAt")]
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::app_user::Entity",
        from = "Column::OwnerId",
        to = "super::app_user::Column::Id",
        on_update = "Cascade",
        on_delete = "Restrict"
    )]
    Owner,
    #[sea_orm(has_many = "super::coupon::Entity")]
    Coupon,
    #[sea_orm(has_many = "super::pos_terminal::Entity")]
    PosTerminal,
}

impl Related<super::app_user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl Related<super::coupon::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Coupon.def()
    }
}

impl Related<super::pos_terminal::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PosTerminal.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for loyalty_hub_ledger::Shop {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            points_per_unit: model.points_per_unit,
        }
    }
}
