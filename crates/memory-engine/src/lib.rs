pub mod app;
pub mod config;
pub mod database;
pub mod handlers;
pub mod kv;
pub mod models;
pub mod security;
pub mod services;
pub mod state;
pub mod utils;

pub use app::build_router;
pub use state::{AppState, Backends};
