use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

pub mod customer;
pub mod health;
pub mod pos;
pub mod shop;

#[derive(Clone, Deserialize, Serialize, Debug, IntoParams)]
pub struct PaginationParams {
    pub limit: Option<u64>,
}

impl PaginationParams {
    pub fn limit_or(&self, default: u64) -> u64 {
        self.limit.unwrap_or(default).clamp(1, 100)
    }
}
