//! Shared state handed to every HTTP handler.

use std::sync::Arc;

use crate::domains::auth::JwtService;
use crate::kernel::ServerDeps;

/// Application state passed to handlers through `Extension`.
#[derive(Clone)]
pub struct AppState {
    pub deps: ServerDeps,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(deps: ServerDeps, jwt_service: Arc<JwtService>) -> Self {
        Self { deps, jwt_service }
    }
}
