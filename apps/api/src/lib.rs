//! HTTP host for the playground dispatcher and its concrete collaborators.

pub mod analysis;
pub mod config;
pub mod execution;
pub mod http;
pub mod metrics;
pub mod storage;
pub mod templates;

pub use config::ApiConfig;
pub use http::{build_router, AppState};
