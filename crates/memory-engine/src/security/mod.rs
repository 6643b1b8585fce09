pub mod header_validator;
pub mod middleware;

pub use header_validator::ApiKeyValidator;
pub use middleware::api_key_middleware;
