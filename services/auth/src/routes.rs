//! Authentication service routes
//!
//! Each handler is one flow end-to-end: validate the body, talk to the
//! store and the leaf services, and return JSON. Failures are `AuthError`
//! values; the taxonomy and its status mapping live in `error.rs`.

use axum::{
    Extension, Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info};

use crate::{
    AppState, codes,
    error::{AuthError, AuthResult},
    middleware::{AuthUser, TOKEN_COOKIE, require_auth, require_verified, token_from_request},
    models::{NewUser, User, UserProfile, account},
    password,
    repositories::is_unique_violation,
    validation,
};

/// How long a freshly issued verification code stays valid.
/// Deliberately the same window as reset codes.
const VERIFICATION_CODE_TTL_MINUTES: i64 = 10;

/// How long a freshly issued password reset code stays valid
const RESET_CODE_TTL_MINUTES: i64 = 10;

/// Request to register a new user
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    /// Account kinds to open; defaults to a single cash account
    pub account_kinds: Option<Vec<String>>,
}

/// Request to verify an email address
#[derive(Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
}

/// Request to sign in
#[derive(Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Response for a successful sign-in
#[derive(Serialize)]
pub struct SignInResponse {
    pub token: String,
    pub expires_in: u64,
    pub user: UserProfile,
}

/// Request to start a password reset
#[derive(Deserialize)]
pub struct RequestResetRequest {
    pub email: String,
}

/// Request to resend the account verification code
#[derive(Deserialize)]
pub struct ResendVerificationRequest {
    pub email: String,
}

/// Request to check a reset code without consuming it
#[derive(Deserialize)]
pub struct VerifyResetCodeRequest {
    pub email: String,
    pub code: String,
}

/// Request to set a new password, consuming the reset code
#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let signed_in = Router::new()
        .route("/auth/logout", post(logout))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let verified_only = Router::new()
        .route("/auth/me", get(me))
        .route_layer(from_fn_with_state(state.clone(), require_verified));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(register))
        .route("/auth/verify", post(verify_email))
        .route("/auth/resend-verification", post(resend_verification))
        .route("/auth/signin", post(signin))
        .route("/auth/request-reset", post(request_reset))
        .route("/auth/reset-password/verify-code", post(verify_reset_code))
        .route("/auth/reset-password/update", post(reset_password))
        .merge(signed_in)
        .merge(verified_only)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "auth-service"
    }))
}

/// Register a new user with pending accounts and mail them a
/// verification code.
///
/// Registration does not sign the user in; they sign in once verified.
/// A failed code dispatch is logged but does not roll the account back —
/// the code can be re-requested.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AuthResult<impl IntoResponse> {
    let email = validation::normalize_email(&payload.email).map_err(AuthError::Validation)?;
    validation::validate_password(&payload.password).map_err(AuthError::Validation)?;
    validation::validate_name(&payload.first_name, "First name").map_err(AuthError::Validation)?;
    validation::validate_name(&payload.last_name, "Last name").map_err(AuthError::Validation)?;

    let account_kinds = normalize_account_kinds(payload.account_kinds)?;

    // Fast path only; the unique index on lower(email) is the real guard.
    if state.user_repository.find_by_email(&email).await?.is_some() {
        return Err(AuthError::DuplicateUser);
    }

    let password_hash = password::hash(&payload.password)?;
    let code = codes::generate();
    let expires_at = Utc::now() + Duration::minutes(VERIFICATION_CODE_TTL_MINUTES);

    let new_user = NewUser {
        email,
        password_hash,
        first_name: payload.first_name.trim().to_string(),
        last_name: payload.last_name.trim().to_string(),
        verification_code: code.clone(),
        verification_code_expires_at: expires_at,
    };

    let user = match state.user_repository.create(&new_user, &account_kinds).await {
        Ok(user) => user,
        Err(e) if is_unique_violation(&e) => return Err(AuthError::DuplicateUser),
        Err(e) => return Err(e.into()),
    };

    if let Err(e) = state.mailer.send_verification_code(&user.email, &code).await {
        error!(
            "Failed to send verification email to {}: {:#}",
            user.email, e
        );
    }

    info!("Registered user {}", user.id);
    Ok((StatusCode::CREATED, Json(json!({"success": true}))))
}

/// Verify an email address with the mailed code
///
/// Wrong email, wrong code, expired code, and already-verified all fail
/// the same way so the endpoint cannot be used to discover accounts.
/// Attempts are rate-limited per email so a 6-digit code cannot be
/// brute-forced inside its window.
pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyRequest>,
) -> AuthResult<impl IntoResponse> {
    let email =
        validation::normalize_email(&payload.email).map_err(|_| AuthError::InvalidVerification)?;

    if !state.rate_limiter.is_allowed(&email).await {
        return Err(AuthError::RateLimited);
    }

    if payload.code.trim().is_empty() {
        return Err(AuthError::InvalidVerification);
    }

    let verified = state
        .user_repository
        .verify_email(&email, payload.code.trim())
        .await?;

    if !verified {
        return Err(AuthError::InvalidVerification);
    }

    Ok(Json(json!({"success": true})))
}

/// Mail a fresh verification code, overwriting any code still
/// outstanding for the account
///
/// The response body is the same whether the email is unknown, already
/// verified, or freshly issued a code.
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<ResendVerificationRequest>,
) -> AuthResult<impl IntoResponse> {
    let generic = || {
        Json(json!({
            "success": true,
            "message": "if that account needs verification, a code has been sent"
        }))
    };

    let Ok(email) = validation::normalize_email(&payload.email) else {
        return Ok(generic());
    };

    if !state.rate_limiter.is_allowed(&email).await {
        return Err(AuthError::RateLimited);
    }

    match state.user_repository.find_by_email(&email).await? {
        Some(user) if !user.verified => {
            let code = codes::generate();
            let expires_at = Utc::now() + Duration::minutes(VERIFICATION_CODE_TTL_MINUTES);

            state
                .user_repository
                .set_verification_code(user.id, &code, expires_at)
                .await?;

            if let Err(e) = state.mailer.send_verification_code(&user.email, &code).await {
                error!(
                    "Failed to send verification email to {}: {:#}",
                    user.email, e
                );
            }
        }
        _ => {
            debug!("Verification resend requested for unknown or verified email");
        }
    }

    Ok(generic())
}

/// Sign in with email and password, issuing a session token
///
/// Unknown email and wrong password return the identical error.
pub async fn signin(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<SignInRequest>,
) -> AuthResult<impl IntoResponse> {
    let email =
        validation::normalize_email(&payload.email).map_err(|_| AuthError::InvalidCredentials)?;

    if !state.rate_limiter.is_allowed(&email).await {
        return Err(AuthError::RateLimited);
    }

    let user = state
        .user_repository
        .find_by_email(&email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !password::verify(&payload.password, &user.password_hash) {
        return Err(AuthError::InvalidCredentials);
    }

    let expires_in = state.token_service.session_token_expiry();
    let token = state.token_service.issue(user.id, &user.email, expires_in)?;

    info!("User {} signed in", user.id);

    let cookie = session_cookie(token.clone(), expires_in);

    let response = SignInResponse {
        token,
        expires_in,
        user: UserProfile::from(&user),
    };

    Ok((jar.add(cookie), Json(response)))
}

/// Start a password reset
///
/// The response body is the same whether or not the email is registered.
/// Mail dispatch failure is logged but kept out of the response for the
/// same reason.
pub async fn request_reset(
    State(state): State<AppState>,
    Json(payload): Json<RequestResetRequest>,
) -> AuthResult<impl IntoResponse> {
    let generic = || {
        Json(json!({
            "success": true,
            "message": "if that account exists, a reset code has been sent"
        }))
    };

    let Ok(email) = validation::normalize_email(&payload.email) else {
        return Ok(generic());
    };

    if !state.rate_limiter.is_allowed(&email).await {
        return Err(AuthError::RateLimited);
    }

    match state.user_repository.find_by_email(&email).await? {
        Some(user) => {
            let code = codes::generate();
            let expires_at = Utc::now() + Duration::minutes(RESET_CODE_TTL_MINUTES);

            state
                .user_repository
                .set_reset_code(user.id, &code, expires_at)
                .await?;

            if let Err(e) = state.mailer.send_reset_code(&user.email, &code).await {
                error!("Failed to send reset email to {}: {:#}", user.email, e);
            }
        }
        None => {
            debug!("Password reset requested for unknown email");
        }
    }

    Ok(generic())
}

/// Check a reset code without consuming it, so the client can collect the
/// new password before the final step
pub async fn verify_reset_code(
    State(state): State<AppState>,
    Json(payload): Json<VerifyResetCodeRequest>,
) -> AuthResult<impl IntoResponse> {
    let email =
        validation::normalize_email(&payload.email).map_err(|_| AuthError::NoResetRequested)?;

    if !state.rate_limiter.is_allowed(&email).await {
        return Err(AuthError::RateLimited);
    }

    let user = state
        .user_repository
        .find_by_email(&email)
        .await?
        .ok_or(AuthError::NoResetRequested)?;

    check_reset_code(&user, payload.code.trim(), Utc::now())?;

    Ok(Json(json!({"success": true})))
}

/// Set a new password, consuming the reset code
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AuthResult<impl IntoResponse> {
    validation::validate_password(&payload.new_password).map_err(AuthError::Validation)?;

    let email =
        validation::normalize_email(&payload.email).map_err(|_| AuthError::NoResetRequested)?;

    if !state.rate_limiter.is_allowed(&email).await {
        return Err(AuthError::RateLimited);
    }

    let user = state
        .user_repository
        .find_by_email(&email)
        .await?
        .ok_or(AuthError::NoResetRequested)?;

    let code = payload.code.trim();
    check_reset_code(&user, code, Utc::now())?;

    let new_hash = password::hash(&payload.new_password)?;

    // The UPDATE re-checks code and expiry, so a code consumed or expired
    // between the check above and this write still cannot be spent twice.
    let updated = state
        .user_repository
        .update_password_and_clear_reset(&email, code, &new_hash)
        .await?;

    if !updated {
        return Err(AuthError::InvalidResetCode);
    }

    info!("Password updated for user {}", user.id);
    Ok(Json(json!({"success": true})))
}

/// Profile and accounts of the authenticated user
pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AuthResult<impl IntoResponse> {
    let user = state
        .user_repository
        .find_by_id(auth_user.id)
        .await?
        .ok_or(AuthError::Unauthenticated)?;

    let accounts = state
        .user_repository
        .find_accounts_for_user(user.id)
        .await?;

    Ok(Json(json!({
        "user": UserProfile::from(&user),
        "accounts": accounts,
    })))
}

/// Revoke the presented session token for the rest of its lifetime and
/// clear the session cookie
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> AuthResult<impl IntoResponse> {
    let token = token_from_request(&jar, &headers).ok_or(AuthError::Unauthenticated)?;

    let claims = state
        .token_service
        .validate(&token)
        .map_err(|_| AuthError::Unauthenticated)?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| anyhow::anyhow!("Failed to get current time: {}", e))?
        .as_secs();

    let remaining = claims.exp.saturating_sub(now);
    state
        .token_service
        .blacklist_token(&state.redis_pool, &token, remaining)
        .await?;

    info!("User {} signed out", claims.sub);

    let jar = jar.remove(Cookie::build((TOKEN_COOKIE, "")).path("/").build());
    Ok((jar, Json(json!({"success": true}))))
}

/// Build the session cookie for a freshly issued token. Host-only scope,
/// unreadable from scripts, same-site, and aged out alongside the token.
fn session_cookie(token: String, expires_in: u64) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(expires_in as i64))
        .build()
}

/// Resolve the requested account kinds: default to a single cash account,
/// reject unknown kinds, and collapse repeats so a kind is opened once.
fn normalize_account_kinds(requested: Option<Vec<String>>) -> Result<Vec<String>, AuthError> {
    let requested =
        requested.unwrap_or_else(|| vec![account::DEFAULT_ACCOUNT_KIND.to_string()]);

    let mut kinds: Vec<String> = Vec::with_capacity(requested.len());
    for kind in requested {
        if !account::is_valid_account_kind(&kind) {
            return Err(AuthError::Validation(format!(
                "Unknown account kind: {}",
                kind
            )));
        }
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }

    if kinds.is_empty() {
        return Err(AuthError::Validation(
            "At least one account kind is required".to_string(),
        ));
    }

    Ok(kinds)
}

/// Validate a submitted reset code against the user's stored state.
///
/// Order matters: a missing request, then expiry, then the match — an
/// expired code fails as expired even when it matches. Consumption is the
/// caller's job; this check leaves the code in place.
fn check_reset_code(user: &User, code: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
    let (stored_code, expires_at) = match (&user.reset_code, &user.reset_code_expires_at) {
        (Some(code), Some(expires_at)) => (code, expires_at),
        _ => return Err(AuthError::NoResetRequested),
    };

    if now > *expires_at {
        return Err(AuthError::ExpiredResetCode);
    }

    if stored_code != code {
        return Err(AuthError::InvalidResetCode);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user_with_reset(code: Option<&str>, expires_at: Option<DateTime<Utc>>) -> User {
        User {
            id: Uuid::new_v4(),
            email: "trader@example.com".to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            verified: true,
            verification_code: None,
            verification_code_expires_at: None,
            reset_code: code.map(|c| c.to_string()),
            reset_code_expires_at: expires_at,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_no_reset_requested() {
        let user = user_with_reset(None, None);
        assert!(matches!(
            check_reset_code(&user, "123456", Utc::now()),
            Err(AuthError::NoResetRequested)
        ));
    }

    #[test]
    fn test_expired_beats_mismatch_and_match() {
        let past = Utc::now() - Duration::minutes(1);
        let user = user_with_reset(Some("123456"), Some(past));

        // Expiry is checked first, so even the right code reports expired.
        assert!(matches!(
            check_reset_code(&user, "123456", Utc::now()),
            Err(AuthError::ExpiredResetCode)
        ));
        assert!(matches!(
            check_reset_code(&user, "654321", Utc::now()),
            Err(AuthError::ExpiredResetCode)
        ));
    }

    #[test]
    fn test_wrong_code_is_invalid() {
        let future = Utc::now() + Duration::minutes(10);
        let user = user_with_reset(Some("123456"), Some(future));

        assert!(matches!(
            check_reset_code(&user, "654321", Utc::now()),
            Err(AuthError::InvalidResetCode)
        ));
    }

    #[test]
    fn test_matching_live_code_passes_and_is_not_consumed() {
        let future = Utc::now() + Duration::minutes(10);
        let user = user_with_reset(Some("123456"), Some(future));

        assert!(check_reset_code(&user, "123456", Utc::now()).is_ok());
        // Re-validation succeeds: the check itself does not consume.
        assert!(check_reset_code(&user, "123456", Utc::now()).is_ok());
        assert_eq!(user.reset_code.as_deref(), Some("123456"));
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("tok".to_string(), 86400);

        assert_eq!(cookie.name(), TOKEN_COOKIE);
        assert_eq!(cookie.value(), "tok");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(86400)));
    }

    #[test]
    fn test_account_kinds_default_to_cash() {
        assert_eq!(
            normalize_account_kinds(None).unwrap(),
            vec!["cash".to_string()]
        );
    }

    #[test]
    fn test_account_kinds_collapse_repeats() {
        let kinds = normalize_account_kinds(Some(vec![
            "cash".to_string(),
            "cash".to_string(),
            "margin".to_string(),
            "cash".to_string(),
        ]))
        .unwrap();

        assert_eq!(kinds, vec!["cash".to_string(), "margin".to_string()]);
    }

    #[test]
    fn test_account_kinds_reject_unknown_and_empty() {
        assert!(matches!(
            normalize_account_kinds(Some(vec!["crypto".to_string()])),
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            normalize_account_kinds(Some(vec![])),
            Err(AuthError::Validation(_))
        ));
    }

    #[test]
    fn test_code_with_missing_expiry_counts_as_no_request() {
        // The store clears both columns together; half-set state must
        // still not let the code through.
        let user = user_with_reset(Some("123456"), None);
        assert!(matches!(
            check_reset_code(&user, "123456", Utc::now()),
            Err(AuthError::NoResetRequested)
        ));
    }
}
