use std::sync::Arc;

use axum::{Json, Router, middleware::from_fn_with_state, routing::get};
use middleware::{error_reporting::error_reporting_middleware, jwt::jwt_middleware};
use state::State;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, decompression::RequestDecompressionLayer,
};
use utoipa::OpenApi;

pub mod entity;
mod middleware;
mod routes;

pub mod error;
pub mod openapi;
pub mod state;
pub mod store;

pub use axum;
pub mod auth {
    use crate::middleware;
    pub use middleware::error_reporting::ErrorSink;
    pub use middleware::jwt::{AppUser, hash_secret, parse_api_key, terminal_cache_key};
}

pub use sea_orm;

pub fn construct_router(state: Arc<State>) -> Router {
    let router = Router::new()
        .nest("/health", routes::health::routes())
        .nest("/customer", routes::customer::routes())
        .nest("/pos", routes::pos::routes())
        .nest("/shops", routes::shop::routes())
        .route("/openapi.json", get(openapi_json))
        .layer(from_fn_with_state(state.clone(), error_reporting_middleware))
        .layer(from_fn_with_state(state.clone(), jwt_middleware))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            ServiceBuilder::new()
                .layer(RequestDecompressionLayer::new())
                .layer(CompressionLayer::new()),
        );

    Router::new().nest("/api/v1", router)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi::ApiDoc::openapi())
}
