//! Engine and database configuration
//!
//! Env-driven defaults so a deployment can run unconfigured against a local
//! database, with explicit structs for everything tunable.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// How scope checks treat an actor with no hierarchy rows at all.
///
/// The legacy system silently granted access when no hospital assignment
/// existed for an actor, which keeps partially-loaded deployments usable but
/// is a security gap once hierarchy data is authoritative. Strict mode makes
/// an empty scope an explicit denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeMode {
    /// Empty scope does not restrict (legacy behavior)
    #[default]
    Permissive,
    /// Empty scope denies every scoped operation
    Strict,
}

impl ScopeMode {
    fn from_env() -> Self {
        match std::env::var("APPROVAL_SCOPE_MODE").ok().as_deref() {
            Some("strict") | Some("STRICT") => Self::Strict,
            _ => Self::Permissive,
        }
    }
}

/// Workflow engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub scope_mode: ScopeMode,
    /// HMAC key for short-link action tokens
    pub shortlink_key: String,
    /// Short-link validity window
    pub shortlink_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scope_mode: ScopeMode::from_env(),
            shortlink_key: std::env::var("SHORTLINK_SIGN_KEY")
                .unwrap_or_else(|_| "dev-shortlink-sign-key".to_string()),
            shortlink_ttl: Duration::from_secs(
                std::env::var("SHORTLINK_TTL_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost:5432/approval-flow".to_string()),
            max_connections: std::env::var("DATABASE_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            connection_timeout: Duration::from_secs(30),
        }
    }
}

/// Build a connection pool from configuration
pub async fn connect_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connection_timeout)
        .connect(&config.database_url)
        .await?;
    info!("database connection pool created");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scope_mode_is_permissive() {
        assert_eq!(ScopeMode::default(), ScopeMode::Permissive);
    }
}
