use crate::{error::ApiError, middleware::jwt::AppUser, state::AppState};
use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, header::ACCEPT_LANGUAGE},
};
use loyalty_hub_ledger::{Consumption, LedgerError, Locale, staff_message};
use loyalty_hub_types::json::json;
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateRequest {
    /// As typed by staff, separators allowed
    pub code: String,
}

/// Failure body with a message staff can read out at the till.
fn localized(err: LedgerError, locale: Locale) -> ApiError {
    let reason = err.reason();
    ApiError::from(err).with_details(json!({
        "reason": reason,
        "staffMessage": staff_message(reason, locale),
    }))
}

#[utoipa::path(
    post,
    path = "/pos/redemptions/validate",
    tag = "pos",
    description = "Consume a customer's redemption code. Exactly one of any concurrent calls for the same code succeeds.",
    request_body = ValidateRequest,
    params(
        ("Accept-Language" = Option<String>, Header, description = "Locale of the staff message (de, en)")
    ),
    responses(
        (status = 200, description = "Code consumed, apply these terms", body = Consumption),
        (status = 400, description = "Malformed code"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown code"),
        (status = 409, description = "Already used or issued by another shop"),
        (status = 410, description = "Code or coupon expired")
    ),
    security(("api_key" = []))
)]
#[tracing::instrument(name = "POST /pos/redemptions/validate", skip(state, user, headers, request))]
pub async fn validate_code(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    headers: HeaderMap,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<Consumption>, ApiError> {
    let terminal = user.terminal()?;
    let locale = Locale::from_accept_language(
        headers
            .get(ACCEPT_LANGUAGE)
            .and_then(|value| value.to_str().ok()),
    );

    match state
        .ledger
        .validate_and_consume(&terminal.shop_id, &request.code)
        .await
    {
        Ok(consumption) => {
            tracing::info!(
                terminal_id = %terminal.terminal_id,
                redemption_id = %consumption.redemption_id,
                "Code accepted at terminal"
            );
            Ok(Json(consumption))
        }
        Err(err) => Err(localized(err, locale)),
    }
}
