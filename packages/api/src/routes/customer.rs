use crate::{error::ApiError, middleware::jwt::AppUser, state::AppState};
use axum::{
    Router,
    routing::{get, post},
};
use loyalty_hub_ledger::CustomerIdentity;

pub mod accounts;
pub mod coupons;
pub mod receipts;
pub mod redemptions;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/shops/{shop_id}/coupons", get(coupons::list_coupons))
        .route("/accounts", get(accounts::list_accounts))
        .route(
            "/redemptions",
            get(redemptions::list_redemptions).post(redemptions::activate_coupon),
        )
        .route(
            "/receipts/{transaction_id}/claim",
            post(receipts::claim_receipt),
        )
}

/// Ledger customer id behind a customer token. Provider tokens carry an
/// email or phone, internal tokens carry the user id as `sub`.
pub(crate) async fn resolve_customer_id(
    state: &AppState,
    user: &AppUser,
) -> Result<String, ApiError> {
    let customer = user.customer()?;
    if customer.email.is_none() && customer.phone.is_none() {
        return Ok(customer.sub.clone());
    }
    let identity =
        CustomerIdentity::parse(customer.email.as_deref(), customer.phone.as_deref())?;
    let resolved = state.ledger.resolve_customer(&identity).await?;
    Ok(resolved.id)
}
