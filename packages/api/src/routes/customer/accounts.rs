use crate::{
    error::ApiError, middleware::jwt::AppUser, routes::customer::resolve_customer_id,
    state::AppState,
};
use axum::{Extension, Json, extract::State};
use loyalty_hub_ledger::PointsAccount;

#[utoipa::path(
    get,
    path = "/customer/accounts",
    tag = "customer",
    responses(
        (status = 200, description = "Points balances per shop", body = Vec<PointsAccount>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(name = "GET /customer/accounts", skip(state, user))]
pub async fn list_accounts(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
) -> Result<Json<Vec<PointsAccount>>, ApiError> {
    let customer_id = resolve_customer_id(&state, &user).await?;
    let accounts = state.ledger.accounts(&customer_id).await?;
    Ok(Json(accounts))
}
