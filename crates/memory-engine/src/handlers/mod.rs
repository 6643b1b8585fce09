pub mod context;
pub mod conversation;
pub mod health;
pub mod knowledge;
pub mod memories;
