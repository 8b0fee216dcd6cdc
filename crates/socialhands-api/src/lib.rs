//! # SocialHands API
//!
//! axum control surface over the queue, dispatcher, scheduler and status
//! collector. Every route except `/livez` requires a bearer token from
//! `[[api.users]]`; errors use a stable `{"error": {"code", "message"}}`
//! payload.

pub mod auth;
pub mod command;
pub mod error;
pub mod http;
pub mod server;
pub mod state;

pub use auth::{User, UserDirectory, permissions};
pub use command::{Classified, classify};
pub use error::ApiError;
pub use http::routes::create_router;
pub use server::ApiServer;
pub use state::AppState;
