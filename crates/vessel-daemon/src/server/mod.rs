//! HTTP webhook server.

pub mod routes;

pub use routes::{AppState, TOKEN_HEADER, build_router};
