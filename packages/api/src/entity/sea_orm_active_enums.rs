use loyalty_hub_ledger as ledger;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "UserRole")]
pub enum UserRole {
    #[sea_orm(string_value = "CUSTOMER")]
    Customer,
    #[sea_orm(string_value = "SHOP_OWNER")]
    ShopOwner,
}

#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "CouponDiscountType")]
pub enum CouponDiscountType {
    #[sea_orm(string_value = "PERCENTAGE")]
    Percentage,
    #[sea_orm(string_value = "FIXED")]
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "RedemptionStatus")]
pub enum RedemptionStatus {
    #[sea_orm(string_value = "ACTIVE")]
    Active,
    #[sea_orm(string_value = "USED")]
    Used,
    #[sea_orm(string_value = "EXPIRED")]
    Expired,
}

impl From<CouponDiscountType> for ledger::DiscountType {
    fn from(value: CouponDiscountType) -> Self {
        match value {
            CouponDiscountType::Percentage => Self::Percentage,
            CouponDiscountType::Fixed => Self::Fixed,
        }
    }
}

impl From<ledger::DiscountType> for CouponDiscountType {
    fn from(value: ledger::DiscountType) -> Self {
        match value {
            ledger::DiscountType::Percentage => Self::Percentage,
            ledger::DiscountType::Fixed => Self::Fixed,
        }
    }
}

impl From<RedemptionStatus> for ledger::RedemptionStatus {
    fn from(value: RedemptionStatus) -> Self {
        match value {
            RedemptionStatus::Active => Self::Active,
            RedemptionStatus::Used => Self::Used,
            RedemptionStatus::Expired => Self::Expired,
        }
    }
}

impl From<ledger::RedemptionStatus> for RedemptionStatus {
    fn from(value: ledger::RedemptionStatus) -> Self {
        match value {
            ledger::RedemptionStatus::Active => Self::Active,
            ledger::RedemptionStatus::Used => Self::Used,
            ledger::RedemptionStatus::Expired => Self::Expired,
        }
    }
}
