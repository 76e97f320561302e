use crate::{
    error::ApiError, middleware::jwt::AppUser, routes::customer::resolve_customer_id,
    state::AppState,
};
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use loyalty_hub_ledger::ReceiptClaim;

#[utoipa::path(
    post,
    path = "/customer/receipts/{transaction_id}/claim",
    tag = "customer",
    description = "Credit a scanned receipt to the customer's account for the shop.",
    params(
        ("transaction_id" = String, Path, description = "Transaction ID from the receipt QR code")
    ),
    responses(
        (status = 200, description = "Points credited", body = ReceiptClaim),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Transaction not found"),
        (status = 409, description = "Already claimed or cancelled")
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(name = "POST /customer/receipts/{transaction_id}/claim", skip(state, user))]
pub async fn claim_receipt(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path(transaction_id): Path<String>,
) -> Result<Json<ReceiptClaim>, ApiError> {
    let customer_id = resolve_customer_id(&state, &user).await?;
    let claim = state
        .receipts
        .claim(&customer_id, &transaction_id, chrono::Utc::now())
        .await?;
    Ok(Json(claim))
}
