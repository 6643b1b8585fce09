use crate::utils::error::ApiError;
use axum::http::HeaderMap;
use tracing::{debug, warn};

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Shared-secret check on the `X-API-Key` header.
/// With no key configured every request is let through.
#[derive(Debug, Clone)]
pub struct ApiKeyValidator {
    expected_api_key: Option<String>,
}

impl ApiKeyValidator {
    pub fn new(api_key: Option<String>) -> Self {
        let expected_api_key = api_key.filter(|key| !key.trim().is_empty());
        if expected_api_key.is_none() {
            warn!("No API key configured, authentication is disabled");
        }
        Self { expected_api_key }
    }

    pub fn is_enabled(&self) -> bool {
        self.expected_api_key.is_some()
    }

    pub fn validate(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let Some(expected) = &self.expected_api_key else {
            return Ok(());
        };

        let api_key = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing X-API-Key header".to_string()))?;

        if api_key != expected {
            warn!("Invalid X-API-Key");
            return Err(ApiError::Unauthorized("Invalid X-API-Key".to_string()));
        }

        debug!("API key validated");
        Ok(())
    }
}
