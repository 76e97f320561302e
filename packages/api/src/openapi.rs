use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, Http, HttpAuthScheme, SecurityScheme},
};

/// Security scheme modifier to add authentication methods
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);

        // Customer and shop owner JWT
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                Http::builder()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );

        // POS terminal key
        components.add_security_scheme(
            "api_key",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                "X-API-Key",
                "POS terminal key. Format: 'pos_<terminal_id>.<secret>'",
            ))),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Loyalty Hub API",
        version = "1.0.0",
        description = "Points, coupons and redemption codes for partner shops.\n\n## Authentication\n\n- **Bearer Token**: customer or shop owner JWT. Use `Authorization: Bearer <token>`\n- **API Key**: POS terminals. Use `X-API-Key: pos_<terminal_id>.<secret>`\n\n## Redemption codes\n\nActivating a coupon debits the points and issues a 6 digit code. The code is valid for 5 minutes and can be validated exactly once at a terminal of the issuing shop.",
        license(name = "MIT")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "customer", description = "Customer app: coupons, points and redemption codes"),
        (name = "pos", description = "POS terminal: code validation and sales"),
        (name = "shop", description = "Shop owner administration")
    ),
    paths(
        // Health routes
        crate::routes::health::health,
        crate::routes::health::db_health,
        crate::routes::health::code_health,
        // Customer routes
        crate::routes::customer::coupons::list_coupons,
        crate::routes::customer::accounts::list_accounts,
        crate::routes::customer::redemptions::activate_coupon,
        crate::routes::customer::redemptions::list_redemptions,
        crate::routes::customer::receipts::claim_receipt,
        // POS routes
        crate::routes::pos::coupons::list_coupons,
        crate::routes::pos::validate::validate_code,
        crate::routes::pos::transactions::record_transaction,
        crate::routes::pos::transactions::storno_transaction,
        // Shop routes
        crate::routes::shop::coupons::list_coupons,
        crate::routes::shop::coupons::create_coupon,
        crate::routes::shop::coupons::update_coupon,
        crate::routes::shop::coupons::delete_coupon,
        crate::routes::shop::redemptions::reverse_redemption,
        crate::routes::shop::redemptions::sweep_expired,
    ),
    components(schemas(
        // Health schemas
        crate::routes::health::HealthResponse,
        crate::routes::health::DbHealthResponse,
        loyalty_hub_ledger::CodeStatsSnapshot,
        // Ledger schemas
        loyalty_hub_ledger::DiscountType,
        loyalty_hub_ledger::DiscountEntry,
        loyalty_hub_ledger::CouponTerms,
        loyalty_hub_ledger::Coupon,
        loyalty_hub_ledger::PointsAccount,
        loyalty_hub_ledger::RedemptionStatus,
        loyalty_hub_ledger::Redemption,
        loyalty_hub_ledger::RedemptionView,
        loyalty_hub_ledger::Activation,
        loyalty_hub_ledger::Consumption,
        loyalty_hub_ledger::Reversal,
        loyalty_hub_ledger::Transaction,
        loyalty_hub_ledger::ReceiptClaim,
        loyalty_hub_ledger::Storno,
        loyalty_hub_ledger::FailureReason,
        loyalty_hub_ledger::UnavailableReason,
        // Request schemas
        crate::routes::customer::redemptions::ActivateRequest,
        crate::routes::pos::validate::ValidateRequest,
        crate::routes::pos::transactions::RecordTransactionRequest,
        crate::routes::shop::coupons::CreateCouponRequest,
        crate::routes::shop::coupons::UpdateCouponRequest,
        crate::routes::shop::redemptions::SweepResponse,
    ))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_surface() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in [
            "/health",
            "/customer/redemptions",
            "/pos/redemptions/validate",
            "/shops/{shop_id}/redemptions/{redemption_id}/reverse",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {expected} in {paths:?}"
            );
        }

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.security_schemes.contains_key("api_key"));
    }
}
