use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request};
use axum::{middleware::Next, response::Response, Extension};
use tracing::debug;

use crate::common::EngineError;
use crate::domains::auth::{Claims, JwtService};

/// Authenticated Status API caller, taken from the bearer token
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub claims: Claims,
}

impl AuthUser {
    /// Handlers take `Option<Extension<AuthUser>>`; a missing caller is a 401.
    pub fn require(user: Option<Extension<AuthUser>>) -> Result<AuthUser, EngineError> {
        user.map(|Extension(u)| u).ok_or(EngineError::Unauthorized)
    }
}

/// Verifies the bearer token, if any, and attaches the caller to the request.
///
/// Requests without a valid token pass through anonymously; every route that
/// needs a caller rejects them through [`AuthUser::require`].
pub async fn jwt_auth_middleware(
    jwt_service: Arc<JwtService>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let verified = bearer_token(&request).map(|token| jwt_service.verify_token(token));
    match verified {
        Some(Ok(claims)) => {
            debug!(
                consumer = %claims.sub,
                consumer_type = %claims.consumer_type,
                tenant = %claims.tenant_id,
                "Authenticated caller"
            );
            request.extensions_mut().insert(AuthUser { claims });
        }
        Some(Err(err)) => debug!(error = %err, "Rejected bearer token"),
        None => {}
    }

    next.run(request).await
}

/// Token from `Authorization: Bearer <token>`; the scheme is case-insensitive.
fn bearer_token(request: &Request<Body>) -> Option<&str> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}
