use crate::security::ApiKeyValidator;
use crate::utils::error::ApiError;
use axum::{extract::Request, middleware::Next, response::Response};
use std::sync::Arc;

/// Reject requests without a valid `X-API-Key` before they reach a handler.
pub async fn api_key_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    // Get shared validator dari extensions
    let validator = request
        .extensions()
        .get::<Arc<ApiKeyValidator>>()
        .ok_or_else(|| ApiError::InternalError("API key validator not configured".to_string()))?
        .clone();

    validator.validate(request.headers())?;

    // Continue to next middleware/handler
    Ok(next.run(request).await)
}
