//! Tradewinds authentication service
//!
//! Registration with email verification, sign-in issuing a session JWT,
//! password-reset-by-code, and the token-gating middleware, backed by
//! PostgreSQL and Redis.

pub mod codes;
pub mod error;
pub mod jwt;
pub mod mailer;
pub mod middleware;
pub mod models;
pub mod password;
pub mod rate_limiter;
pub mod repositories;
pub mod routes;
pub mod validation;

use common::cache::RedisPool;
use sqlx::PgPool;

use crate::jwt::TokenService;
use crate::mailer::Mailer;
use crate::rate_limiter::RateLimiter;
use crate::repositories::UserRepository;

/// Application state shared across handlers. Built once at startup;
/// read-only afterwards apart from the rate limiter's counters.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub redis_pool: RedisPool,
    pub token_service: TokenService,
    pub user_repository: UserRepository,
    pub mailer: Mailer,
    pub rate_limiter: RateLimiter,
}
