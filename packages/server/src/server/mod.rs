// HTTP server setup (Axum): Status API and consumer routes
pub mod app;
pub mod error;
pub mod middleware;
pub mod routes;

pub use app::*;
