//! Authorization gate
//!
//! One gate for every protected route. The token is taken from the `token`
//! cookie when present, otherwise from the `Authorization: Bearer` header.
//! The gate validates the token, rejects revoked tokens, resolves the
//! claimed user against the store, and attaches the identity to the
//! request. `require_verified` additionally insists the account's email
//! has been verified.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;
use uuid::Uuid;

use crate::{AppState, error::AuthError};

/// Cookie holding the session token for browser clients
pub const TOKEN_COOKIE: &str = "token";

/// The resolved identity attached to authenticated requests
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub verified: bool,
}

/// Pull the session token out of the request's credential carriers.
/// Cookie wins over the Authorization header when both are present.
pub fn token_from_request(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(TOKEN_COOKIE) {
        return Some(cookie.value().to_string());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

/// Resolve the request's token to an authenticated user, or fail
async fn authenticate(
    state: &AppState,
    jar: &CookieJar,
    headers: &HeaderMap,
) -> Result<AuthUser, AuthError> {
    let token = token_from_request(jar, headers).ok_or(AuthError::Unauthenticated)?;

    let claims = state.token_service.validate(&token).map_err(|e| {
        debug!("Token rejected: {}", e);
        AuthError::Unauthenticated
    })?;

    let blacklisted = state
        .token_service
        .is_token_blacklisted(&state.redis_pool, &token)
        .await?;
    if blacklisted {
        return Err(AuthError::Unauthenticated);
    }

    // The token may outlive the account it was issued for.
    let user = state
        .user_repository
        .find_by_id(claims.sub)
        .await?
        .ok_or(AuthError::Unauthenticated)?;

    Ok(AuthUser {
        id: user.id,
        email: user.email,
        verified: user.verified,
    })
}

/// Gate for routes that need a signed-in user
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let user = authenticate(&state, &jar, req.headers()).await?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Gate for routes that additionally need a verified email
pub async fn require_verified(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let user = authenticate(&state, &jar, req.headers()).await?;
    if !user.verified {
        return Err(AuthError::EmailNotVerified);
    }
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
