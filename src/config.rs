use std::{env, str::FromStr, time::Duration};

use anyhow::Context;
use secrecy::SecretString;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: SecretString,
    pub jwt_ttl_hours: i64,
    pub db: DbConfig,
    pub max_body_bytes: usize,
    pub concurrency_limit: usize,
    pub storage: Option<StorageConfig>,
    pub mail: Option<MailConfig>,
}

/// Connection-pool sizing and timeouts.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub max_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Object-storage upload endpoint. Uploads are disabled when this is absent.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub upload_url: String,
    pub api_key: SecretString,
    pub transformation: Option<String>,
}

/// Transactional mail provider. Mail is only logged when this is absent.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub from: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET is not set")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_or("APP_PORT", 3000);

        let defaults = DbConfig::default();
        let db = DbConfig {
            max_connections: parse_or("DB_MAX_CONNECTIONS", defaults.max_connections),
            connect_timeout: Duration::from_secs(parse_or(
                "DB_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout.as_secs(),
            )),
            idle_timeout: Duration::from_secs(parse_or(
                "DB_IDLE_TIMEOUT_SECS",
                defaults.idle_timeout.as_secs(),
            )),
        };

        let storage = match (env::var("STORAGE_UPLOAD_URL"), env::var("STORAGE_API_KEY")) {
            (Ok(upload_url), Ok(api_key)) => Some(StorageConfig {
                upload_url,
                api_key: SecretString::from(api_key),
                transformation: env::var("STORAGE_TRANSFORMATION").ok(),
            }),
            _ => None,
        };

        let mail = match (
            env::var("MAIL_API_URL"),
            env::var("MAIL_API_KEY"),
            env::var("MAIL_FROM"),
        ) {
            (Ok(api_url), Ok(api_key), Ok(from)) => Some(MailConfig {
                api_url,
                api_key: SecretString::from(api_key),
                from,
            }),
            _ => None,
        };

        Ok(Self {
            port,
            database_url,
            host,
            jwt_secret: SecretString::from(jwt_secret),
            jwt_ttl_hours: parse_or("JWT_TTL_HOURS", 24),
            db,
            max_body_bytes: parse_or("MAX_BODY_BYTES", 5 * 1024 * 1024),
            concurrency_limit: parse_or("CONCURRENCY_LIMIT", 100),
            storage,
            mail,
        })
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
