//! Loyalty Hub ledger - the redeem-and-spend core
//!
//! Customers earn points by scanning receipts and spend them on coupons. A
//! spent coupon becomes a [`Redemption`] carrying a short numeric code that
//! staff type into the POS terminal within the validity window.
//!
//! ## Components
//!
//! | Component | Module | Mutates |
//! |-----------|--------|---------|
//! | CodeGenerator | [`code`] | advisory counters only |
//! | RedemptionLedger | [`ledger`] | redemptions, points (debit + reversal) |
//! | CouponCatalog | [`catalog`] | nothing |
//! | PointsAccount | [`points`] | its own balance |
//! | ReceiptService | [`receipts`] | transactions, points (credit + storno) |
//!
//! ## Redemption lifecycle
//!
//! ```text
//! active --(consume)-------------------> used     (terminal)
//! active --(now > redeemed_at + 5min)--> expired  (terminal)
//! ```
//!
//! Expiry is computed on every validation; [`RedemptionLedger::sweep_expired`]
//! only tidies rows up. Every mutation runs through a [`LedgerStore`] which
//! keeps the debit and the redemption insert in one transaction.

pub mod audit;
pub mod catalog;
pub mod code;
pub mod config;
pub mod error;
pub mod i18n;
pub mod ledger;
pub mod points;
pub mod receipts;
pub mod store;
mod types;

pub use audit::{AuditEntry, AuditKind, AuditSink, DynAuditSink, MemoryAuditSink, TracingAuditSink};
pub use catalog::CouponCatalog;
pub use code::{AttemptBudget, CodeGenerator, CodeStatsSnapshot};
pub use config::LedgerConfig;
pub use error::{ErrorKind, FailureReason, LedgerError, UnavailableReason};
pub use i18n::{Locale, staff_message};
pub use ledger::RedemptionLedger;
pub use receipts::{ReceiptService, Sale};
pub use store::{LedgerStore, StoreError, memory::InMemoryLedgerStore};
pub use types::*;
