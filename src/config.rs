use std::{path::PathBuf, time::Duration};

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_hours: i64,
}

/// Argon2 work factor.
#[derive(Debug, Clone)]
pub struct HashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreBackend,
    pub mongodb_uri: String,
    pub mongodb_db: String,
    pub db_timeout: Duration,
    pub jwt: JwtConfig,
    pub hash: HashConfig,
    pub upload_dir: PathBuf,
    pub cors_origin: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let store = match env_or("USER_STORE", "mongo").as_str() {
            "mongo" => StoreBackend::Mongo,
            "memory" => StoreBackend::Memory,
            other => anyhow::bail!("USER_STORE must be `mongo` or `memory`, got `{other}`"),
        };

        let defaults = HashConfig::default();
        let hash = HashConfig {
            memory_kib: parse_or("HASH_MEMORY_KIB", defaults.memory_kib)?,
            iterations: parse_or("HASH_ITERATIONS", defaults.iterations)?,
            parallelism: parse_or("HASH_PARALLELISM", defaults.parallelism)?,
        };

        Ok(Self {
            host: env_or("APP_HOST", "0.0.0.0"),
            port: parse_or("APP_PORT", 3001)?,
            store,
            mongodb_uri: env_or("MONGODB_URI", "mongodb://localhost:27017"),
            mongodb_db: env_or("MONGODB_DB", "accounts"),
            db_timeout: Duration::from_secs(parse_or("DB_TIMEOUT_SECS", 10)?),
            jwt: JwtConfig {
                secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
                ttl_hours: parse_or("JWT_TTL_HOURS", 72)?,
            },
            hash,
            upload_dir: PathBuf::from(env_or("UPLOAD_DIR", "./uploads")),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:3000"),
        })
    }

    /// Settings for running without external services.
    #[cfg(test)]
    pub fn local(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3001,
            store: StoreBackend::Memory,
            mongodb_uri: String::new(),
            mongodb_db: String::new(),
            db_timeout: Duration::from_secs(10),
            jwt: JwtConfig {
                secret: "test-secret".into(),
                ttl_hours: 72,
            },
            // cheap params so hashing in tests stays fast
            hash: HashConfig {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
            upload_dir: upload_dir.into(),
            cors_origin: "http://localhost:3000".into(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) => v.parse::<T>().with_context(|| format!("invalid {key}: {v}")),
        Err(_) => Ok(default),
    }
}
