use crate::{error::ApiError, middleware::jwt::AppUser, state::AppState};
use axum::{Extension, Json, extract::State};
use loyalty_hub_ledger::Coupon;

#[utoipa::path(
    get,
    path = "/pos/coupons",
    tag = "pos",
    responses(
        (status = 200, description = "Active, unexpired coupons of the terminal's shop", body = Vec<Coupon>),
        (status = 401, description = "Unauthorized")
    ),
    security(("api_key" = []))
)]
#[tracing::instrument(name = "GET /pos/coupons", skip(state, user))]
pub async fn list_coupons(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
) -> Result<Json<Vec<Coupon>>, ApiError> {
    let terminal = user.terminal()?;
    let coupons = state
        .catalog
        .list_for_terminal(&terminal.shop_id, chrono::Utc::now())
        .await?;
    Ok(Json(coupons))
}
