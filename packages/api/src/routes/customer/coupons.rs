use crate::{error::ApiError, middleware::jwt::AppUser, state::AppState};
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use loyalty_hub_ledger::Coupon;

#[utoipa::path(
    get,
    path = "/customer/shops/{shop_id}/coupons",
    tag = "customer",
    params(
        ("shop_id" = String, Path, description = "Shop ID")
    ),
    responses(
        (status = 200, description = "Coupons the customer can activate now, cheapest first", body = Vec<Coupon>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not a customer token")
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(name = "GET /customer/shops/{shop_id}/coupons", skip(state, user))]
pub async fn list_coupons(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path(shop_id): Path<String>,
) -> Result<Json<Vec<Coupon>>, ApiError> {
    user.customer()?;
    let coupons = state
        .catalog
        .list_redeemable(&shop_id, chrono::Utc::now())
        .await?;
    Ok(Json(coupons))
}
