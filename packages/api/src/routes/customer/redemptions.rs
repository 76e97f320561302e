use crate::{
    error::ApiError,
    middleware::jwt::AppUser,
    routes::{PaginationParams, customer::resolve_customer_id},
    state::AppState,
};
use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
};
use loyalty_hub_ledger::{Activation, RedemptionView};
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivateRequest {
    pub coupon_id: String,
}

#[utoipa::path(
    post,
    path = "/customer/redemptions",
    tag = "customer",
    description = "Spend points on a coupon. Returns the code to show at the till.",
    request_body = ActivateRequest,
    responses(
        (status = 201, description = "Coupon activated", body = Activation),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Coupon not found"),
        (status = 409, description = "Insufficient points or coupon unavailable"),
        (status = 503, description = "No free code, retry")
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(name = "POST /customer/redemptions", skip(state, user))]
pub async fn activate_coupon(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Json(request): Json<ActivateRequest>,
) -> Result<(StatusCode, Json<Activation>), ApiError> {
    let customer_id = resolve_customer_id(&state, &user).await?;
    let activation = state
        .ledger
        .activate(&customer_id, request.coupon_id.trim())
        .await?;
    Ok((StatusCode::CREATED, Json(activation)))
}

#[utoipa::path(
    get,
    path = "/customer/redemptions",
    tag = "customer",
    params(PaginationParams),
    responses(
        (status = 200, description = "Redemptions, newest first", body = Vec<RedemptionView>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(name = "GET /customer/redemptions", skip(state, user))]
pub async fn list_redemptions(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Vec<RedemptionView>>, ApiError> {
    let customer_id = resolve_customer_id(&state, &user).await?;
    let history = state
        .ledger
        .history(&customer_id, params.limit_or(20), chrono::Utc::now())
        .await?;
    Ok(Json(history))
}
