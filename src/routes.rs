use crate::errors::AppError;
use crate::handlers::{self, AppState};
use axum::{
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Request size limit for every route.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// API endpoints, mounted under the configured base path.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::get_stats))
        .route("/leads", get(handlers::list_leads))
        .route("/leads/:id/status", put(handlers::update_lead_status))
}

/// Full application without rate limiting.
pub fn build_router(state: Arc<AppState>) -> Router {
    assemble(state, api_routes())
}

/// Full application with per-IP rate limiting on the API routes.
///
/// Each client IP may send `rate_limit_burst` requests at once, refilled at
/// `rate_limit_per_second`. Rejections use the standard error envelope.
/// The root `/health` bypasses the limiter unless the API itself is mounted
/// at `/`. Serve with `into_make_service_with_connect_info::<SocketAddr>()`
/// so the peer address is available when no forwarding header is present.
pub fn build_rate_limited_router(state: Arc<AppState>) -> anyhow::Result<Router> {
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(replenish_interval_ms(state.config.rate_limit_per_second))
            .burst_size(state.config.rate_limit_burst)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limiter configuration"))?,
    );

    let api = api_routes()
        .layer(ServiceBuilder::new().layer(GovernorLayer {
            config: governor_conf,
        }))
        .layer(middleware::map_response(rate_limit_envelope));

    Ok(assemble(state, api))
}

/// Milliseconds between two refilled quota slots for a per-second rate.
fn replenish_interval_ms(per_second: u64) -> u64 {
    (1000 / per_second.max(1)).max(1)
}

/// Rewrites the limiter's plain-text 429 into the JSON error envelope,
/// keeping its `retry-after` / `x-ratelimit-*` headers.
async fn rate_limit_envelope(response: Response) -> Response {
    if response.status() != StatusCode::TOO_MANY_REQUESTS {
        return response;
    }

    let mut envelope = AppError::RateLimited.into_response();
    for (name, value) in response.headers() {
        if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
            envelope.headers_mut().insert(name.clone(), value.clone());
        }
    }
    envelope
}

fn assemble(state: Arc<AppState>, api: Router<Arc<AppState>>) -> Router {
    let base_path = state.config.base_path.clone();

    let router = if base_path.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new()
            .route("/health", get(handlers::health))
            .nest(&base_path, api)
    };

    router
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
