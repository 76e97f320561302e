use crate::state::AppState;
use axum::{
    Router,
    routing::{get, patch, post},
};

pub mod coupons;
pub mod redemptions;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/{shop_id}/coupons",
            get(coupons::list_coupons).post(coupons::create_coupon),
        )
        .route(
            "/{shop_id}/coupons/{coupon_id}",
            patch(coupons::update_coupon).delete(coupons::delete_coupon),
        )
        .route(
            "/{shop_id}/redemptions/{redemption_id}/reverse",
            post(redemptions::reverse_redemption),
        )
        .route(
            "/{shop_id}/redemptions/sweep",
            post(redemptions::sweep_expired),
        )
}
