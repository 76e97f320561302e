//! `SeaORM` entities for the loyalty schema (`schema/loyalty.sql`)

pub mod prelude;

pub mod app_user;
pub mod audit_log;
pub mod coupon;
pub mod coupon_discount;
pub mod error_report;
pub mod points_account;
pub mod pos_terminal;
pub mod redemption;
pub mod sea_orm_active_enums;
pub mod shop;
pub mod transaction;
