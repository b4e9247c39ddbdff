//! API routes for pronto-cloud

pub mod dashboard_ws;
pub mod health;
pub mod owner;
pub mod public;

use axum::routing::{get, post, put};
use axum::{Router, middleware};
use http::HeaderValue;
use shared::error::AppError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::owner_auth::owner_auth_middleware;
use crate::auth::rate_limit::{login_rate_limit, place_order_rate_limit, signup_rate_limit};
use crate::state::AppState;

pub type ApiResult<T> = Result<axum::Json<T>, AppError>;

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring malformed CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create the combined router
pub fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    // Owner management API (JWT authenticated)
    let owner_api = Router::new()
        .route(
            "/api/owner/business",
            get(owner::account::get_business).put(owner::account::update_business),
        )
        .route(
            "/api/owner/products",
            get(owner::product::list_products).post(owner::product::create_product),
        )
        .route(
            "/api/owner/products/{id}",
            put(owner::product::update_product).delete(owner::product::delete_product),
        )
        .route("/api/owner/orders", get(owner::order::list_orders))
        .route("/api/owner/orders/{id}", get(owner::order::get_order))
        .route(
            "/api/owner/orders/{id}/advance",
            post(owner::order::advance_order),
        )
        .route(
            "/api/owner/orders/{id}/cancel",
            post(owner::order::cancel_order),
        )
        .route("/api/owner/push/vapid-key", get(owner::push::vapid_key))
        .route(
            "/api/owner/push/subscriptions",
            get(owner::push::list_subscriptions).post(owner::push::register_subscription),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            owner_auth_middleware,
        ));

    // Account creation and login (rate limited per IP)
    let signup = Router::new()
        .route("/api/owner/signup", post(owner::account::signup))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            signup_rate_limit,
        ));
    let login = Router::new()
        .route("/api/owner/login", post(owner::account::login))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            login_rate_limit,
        ));

    // Customer-facing ordering page (no auth)
    let place_order = Router::new()
        .route("/api/public/{slug}/orders", post(public::place_order))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            place_order_rate_limit,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/public/{slug}", get(public::menu))
        .route(
            "/api/owner/live/ws",
            get(dashboard_ws::handle_dashboard_ws),
        )
        .merge(place_order)
        .merge(signup)
        .merge(login)
        .merge(owner_api)
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
