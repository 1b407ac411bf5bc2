use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use super::{admission, handlers, state::GatewayState};

/// Build the gateway router. Every business prefix sits behind the
/// admission filter and the lifecycle gate; the probes do not.
pub fn router(state: GatewayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let business = Router::new()
        .nest("/consent", consent_routes())
        .nest("/kv", kv_routes())
        .nest("/oauth", oauth_routes())
        .nest("/report", report_routes())
        .nest("/sp", sp_routes())
        .nest("/retailers", retailer_routes())
        .nest("/brands", brand_routes())
        .nest("/sps", sps_routes())
        .nest("/recipients", recipient_routes())
        .nest("/integrator", integrator_routes())
        .nest("/public", public_routes())
        .nest("/government", government_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admission::admission_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admission::lifecycle_gate,
        ));

    Router::new()
        .route("/healthz", get(handlers::liveness))
        .route("/readyz", get(handlers::readiness))
        .merge(business)
        .layer(cors)
        .with_state(state)
}

fn consent_routes() -> Router<GatewayState> {
    Router::new()
        .route("/", post(handlers::add_consent))
        .route("/search", post(handlers::search_consent))
        .route("/batch", post(handlers::add_consent_batch))
}

fn kv_routes() -> Router<GatewayState> {
    Router::new().route("/:key", get(handlers::kv_get).put(handlers::kv_put))
}

fn oauth_routes() -> Router<GatewayState> {
    Router::new().route("/token", post(handlers::oauth_token))
}

fn report_routes() -> Router<GatewayState> {
    Router::new().route("/status", get(handlers::report_status))
}

fn sp_routes() -> Router<GatewayState> {
    Router::new().route("/", get(handlers::sp_list))
}

fn retailer_routes() -> Router<GatewayState> {
    Router::new().route("/", get(handlers::retailers_list))
}

fn brand_routes() -> Router<GatewayState> {
    Router::new().route("/search", post(handlers::search_brands))
}

fn sps_routes() -> Router<GatewayState> {
    Router::new().route("/", get(handlers::sps_list))
}

fn recipient_routes() -> Router<GatewayState> {
    Router::new().route("/:recipient/consents", get(handlers::recipient_consents))
}

fn integrator_routes() -> Router<GatewayState> {
    Router::new().route("/status", get(handlers::integrator_status))
}

fn public_routes() -> Router<GatewayState> {
    Router::new().route("/brands", get(handlers::public_brands))
}

fn government_routes() -> Router<GatewayState> {
    Router::new().route("/audit", get(handlers::government_audit))
}
