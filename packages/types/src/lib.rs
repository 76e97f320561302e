//! Shared re-exports for the loyalty-hub crates.
//!
//! Downstream crates import error helpers, JSON and ids from here so the
//! versions stay in one place.

pub use anyhow::{Error, Result, anyhow, bail};
pub use serde_json::{self as json, Value};

/// Collision-resistant id used as primary key for every persisted row.
#[inline]
pub fn create_id() -> String {
    cuid2::create_id()
}
