use crate::{error::ApiError, middleware::jwt::AppUser, state::AppState};
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use loyalty_hub_ledger::Reversal;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct SweepResponse {
    pub expired: u64,
}

#[utoipa::path(
    post,
    path = "/shops/{shop_id}/redemptions/{redemption_id}/reverse",
    tag = "shop",
    description = "Give the customer back the points of a used or expired redemption. Once per redemption.",
    params(
        ("shop_id" = String, Path, description = "Shop ID"),
        ("redemption_id" = String, Path, description = "Redemption ID")
    ),
    responses(
        (status = 200, description = "Points restored", body = Reversal),
        (status = 403, description = "Not an owner of this shop"),
        (status = 404, description = "Redemption not found"),
        (status = 409, description = "Already reversed, still active or issued by another shop")
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    name = "POST /shops/{shop_id}/redemptions/{redemption_id}/reverse",
    skip(state, user)
)]
pub async fn reverse_redemption(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((shop_id, redemption_id)): Path<(String, String)>,
) -> Result<Json<Reversal>, ApiError> {
    user.require_shop_owner(&shop_id)?;
    let reversal = state
        .ledger
        .reverse(Some(&shop_id), &redemption_id, chrono::Utc::now())
        .await?;
    Ok(Json(reversal))
}

#[utoipa::path(
    post,
    path = "/shops/{shop_id}/redemptions/sweep",
    tag = "shop",
    description = "Mark this shop's active redemptions past their validity window as expired.",
    params(
        ("shop_id" = String, Path, description = "Shop ID")
    ),
    responses(
        (status = 200, description = "Number of redemptions expired", body = SweepResponse),
        (status = 403, description = "Not an owner of this shop")
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(name = "POST /shops/{shop_id}/redemptions/sweep", skip(state, user))]
pub async fn sweep_expired(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path(shop_id): Path<String>,
) -> Result<Json<SweepResponse>, ApiError> {
    user.require_shop_owner(&shop_id)?;
    let expired = state
        .ledger
        .sweep_expired_for_shop(&shop_id, chrono::Utc::now())
        .await?;
    Ok(Json(SweepResponse { expired }))
}
