use anyhow::Result;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use common::cache::{RedisConfig, RedisPool};
use common::database::{self, DatabaseConfig};

use auth::AppState;
use auth::jwt::{JwtConfig, TokenService};
use auth::mailer::{Mailer, MailerConfig};
use auth::rate_limiter::{RateLimiter, RateLimiterConfig};
use auth::repositories::UserRepository;
use auth::routes;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting authentication service");

    // Database connection pool and schema
    let db_config = DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied");

    // Token service; fails fast when JWT_SECRET is missing
    let jwt_config = JwtConfig::from_env()?;
    let token_service = TokenService::new(&jwt_config);

    // Redis backs the revoked-token set
    let redis_config = RedisConfig::from_env()?;
    let redis_pool = RedisPool::new(&redis_config).await?;

    // Outbound mail transport
    let mailer_config = MailerConfig::from_env()?;
    let mailer = Mailer::new(&mailer_config)?;

    let user_repository = UserRepository::new(pool.clone());
    let rate_limiter = RateLimiter::new(RateLimiterConfig::default());

    let app_state = AppState {
        db_pool: pool,
        redis_pool,
        token_service,
        user_repository,
        mailer,
        rate_limiter,
    };

    info!("Authentication service initialized");

    // Start the web server
    let app = routes::create_router(app_state);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Authentication service listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
