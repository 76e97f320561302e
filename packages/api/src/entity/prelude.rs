pub use super::app_user::Entity as AppUser;
pub use super::audit_log::Entity as AuditLog;
pub use super::coupon::Entity as Coupon;
pub use super::coupon_discount::Entity as CouponDiscount;
pub use super::error_report::Entity as ErrorReport;
pub use super::points_account::Entity as PointsAccount;
pub use super::pos_terminal::Entity as PosTerminal;
pub use super::redemption::Entity as Redemption;
pub use super::shop::Entity as Shop;
pub use super::transaction::Entity as Transaction;
