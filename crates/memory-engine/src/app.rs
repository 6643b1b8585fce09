use axum::{
    extract::{DefaultBodyLimit, Request},
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Extension, Router,
};
use std::time::Instant;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::handlers;
use crate::security;
use crate::state::AppState;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Stamp every response with its handling time in seconds.
async fn process_time_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let mut response = next.run(request).await;
    let elapsed = start.elapsed().as_secs_f64().to_string();
    if let Ok(value) = HeaderValue::from_str(&elapsed) {
        response.headers_mut().insert("X-Process-Time", value);
    }
    response
}

pub fn build_router(state: AppState) -> Router {
    // Public routes (no security)
    let public_routes = Router::new().route("/health", get(handlers::health::health_check));

    // Protected routes (X-API-Key)
    let protected_routes = Router::new()
        .route("/memories", post(handlers::memories::create_memory_handler))
        .route(
            "/memories/{user_id}",
            get(handlers::memories::get_memories_handler)
                .delete(handlers::memories::delete_memories_handler),
        )
        .route(
            "/api/memory",
            get(handlers::conversation::get_memory_handler)
                .post(handlers::conversation::store_memory_handler),
        )
        .route(
            "/api/memory/search",
            get(handlers::conversation::search_memory_handler),
        )
        .route(
            "/context/{session_id}",
            get(handlers::context::get_context_handler)
                .post(handlers::context::update_context_handler),
        )
        .route(
            "/knowledge/search",
            post(handlers::knowledge::search_knowledge_handler),
        )
        .route("/vectors", post(handlers::knowledge::create_vector_handler))
        .route(
            "/optimize-context",
            post(handlers::context::optimize_context_handler),
        )
        .route_layer(middleware::from_fn(security::middleware::api_key_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(Extension(state.api_key_validator.clone()))
        .layer(middleware::from_fn(process_time_middleware))
        // CORS
        .layer(CorsLayer::permissive())
        // Tracing
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
