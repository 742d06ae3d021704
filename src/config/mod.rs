use anyhow::Result;
use sqlx::PgPool;
use std::env;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: String,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("DATABASE_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("DATABASE_PORT")
                .unwrap_or_else(|_| "5432".to_string())
                .parse()?,
            username: env::var("DATABASE_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: env::var("DATABASE_PASSWORD")?,
            database: env::var("DATABASE_NAME").unwrap_or_else(|_| "tavola".to_string()),
            ssl_mode: env::var("DATABASE_SSL_MODE").unwrap_or_else(|_| "prefer".to_string()),
        })
    }

    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.username, self.password, self.host, self.port, self.database, self.ssl_mode
        )
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Discrete connection parts; absent when DATABASE_URL was used.
    pub database: Option<DatabaseConfig>,
    pub database_pool: PgPool,
    pub jwt_secret: String,
    /// Gates the unsigned token codec. Never enable in production.
    pub allow_insecure_test_tokens: bool,
    /// When true, /refresh-token invalidates and reissues the refresh token.
    pub refresh_rotation: bool,
    pub access_token_ttl: String,
    pub refresh_token_ttl: String,
    /// Set-Cookie `Secure` flag; follows TLS_ENABLED.
    pub secure_cookies: bool,
    pub server_host: String,
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub cleanup_webhook_url: Option<String>,
    /// Per-process id used as the cron lock holder.
    pub instance_id: String,
}

impl AppConfig {
    pub async fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let database_config = match env::var("DATABASE_URL") {
            Ok(url) => {
                let pool = PgPool::connect(&url).await?;
                return Self::with_pool(pool, None, cors_origins);
            }
            Err(_) => DatabaseConfig::from_env()?,
        };

        let pool = PgPool::connect(&database_config.connection_string()).await?;
        Self::with_pool(pool, Some(database_config), cors_origins)
    }

    fn with_pool(
        pool: PgPool,
        database: Option<DatabaseConfig>,
        cors_origins: Vec<String>,
    ) -> Result<Self> {
        Ok(Self {
            database,
            database_pool: pool,
            jwt_secret: env::var("JWT_SECRET")?,
            allow_insecure_test_tokens: env_flag("ALLOW_INSECURE_TEST_TOKENS"),
            refresh_rotation: env_flag("REFRESH_ROTATION"),
            access_token_ttl: env::var("ACCESS_TOKEN_TTL").unwrap_or_else(|_| "15m".to_string()),
            refresh_token_ttl: env::var("REFRESH_TOKEN_TTL").unwrap_or_else(|_| "7d".to_string()),
            secure_cookies: env_flag("TLS_ENABLED"),
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            cors_origins,
            cleanup_webhook_url: env::var("CLEANUP_WEBHOOK_URL").ok(),
            instance_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
