use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

pub mod coupons;
pub mod transactions;
pub mod validate;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/coupons", get(coupons::list_coupons))
        .route("/redemptions/validate", post(validate::validate_code))
        .route("/transactions", post(transactions::record_transaction))
        .route(
            "/transactions/{transaction_id}/storno",
            post(transactions::storno_transaction),
        )
}
