use crate::{error::ApiError, middleware::jwt::AppUser, state::AppState};
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use loyalty_hub_ledger::{Sale, Storno, Transaction};
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordTransactionRequest {
    /// Receipt number assigned by the POS provider
    pub external_id: String,
    pub amount_cents: i64,
    /// Code consumed for this sale, if any
    pub redemption_code: Option<String>,
}

#[utoipa::path(
    post,
    path = "/pos/transactions",
    tag = "pos",
    description = "Push a sale. Re-sending the same externalId returns the stored transaction.",
    request_body = RecordTransactionRequest,
    responses(
        (status = 200, description = "Stored transaction", body = Transaction),
        (status = 400, description = "Invalid sale"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Linked code belongs to another shop")
    ),
    security(("api_key" = []))
)]
#[tracing::instrument(name = "POST /pos/transactions", skip(state, user, request))]
pub async fn record_transaction(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Json(request): Json<RecordTransactionRequest>,
) -> Result<Json<Transaction>, ApiError> {
    let terminal = user.terminal()?;
    let transaction = state
        .receipts
        .record_transaction(
            &terminal.shop_id,
            Sale {
                external_id: request.external_id,
                amount_cents: request.amount_cents,
                redemption_code: request.redemption_code,
            },
            chrono::Utc::now(),
        )
        .await?;
    Ok(Json(transaction))
}

#[utoipa::path(
    post,
    path = "/pos/transactions/{transaction_id}/storno",
    tag = "pos",
    description = "Cancel a sale, revoke its points and reverse the redemption applied to it.",
    params(
        ("transaction_id" = String, Path, description = "Transaction ID")
    ),
    responses(
        (status = 200, description = "Sale cancelled", body = Storno),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Transaction not found"),
        (status = 409, description = "Already cancelled or recorded by another shop")
    ),
    security(("api_key" = []))
)]
#[tracing::instrument(name = "POST /pos/transactions/{transaction_id}/storno", skip(state, user))]
pub async fn storno_transaction(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path(transaction_id): Path<String>,
) -> Result<Json<Storno>, ApiError> {
    let terminal = user.terminal()?;
    let storno = state
        .receipts
        .storno(&terminal.shop_id, &transaction_id, chrono::Utc::now())
        .await?;
    Ok(Json(storno))
}
