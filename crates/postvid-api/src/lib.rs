//! Axum HTTP API server.
//!
//! Accepts commentary video jobs, persists them as `pending`, pushes them
//! onto the dispatch queue and serves their status with live progress.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::{AppState, StateError};
