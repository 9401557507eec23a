use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::config::JwtConfig;

/// JWT payload issued on login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,   // user ID (hex ObjectId)
    pub role: String, // role at the time of login
    pub iat: usize,   // issued at (unix timestamp)
    pub exp: usize,   // expires at (unix timestamp)
}

/// Issues signed session tokens.
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, user_id: &str, role: &str) -> anyhow::Result<String>;
}

/// HS256 signing key with the configured token lifetime.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    ttl: Duration,
    #[cfg(test)]
    secret: String,
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(!cfg.secret.is_empty(), "jwt secret must not be empty");
        anyhow::ensure!(cfg.ttl_hours > 0, "jwt ttl must be positive");
        Ok(Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            ttl: Duration::hours(cfg.ttl_hours),
            #[cfg(test)]
            secret: cfg.secret.clone(),
        })
    }

    #[cfg(test)]
    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        use jsonwebtoken::{decode, DecodingKey, Validation};

        let decoding = DecodingKey::from_secret(self.secret.as_bytes());
        let data = decode::<Claims>(token, &decoding, &Validation::default())?;
        Ok(data.claims)
    }
}

impl TokenIssuer for JwtKeys {
    fn issue(&self, user_id: &str, role: &str) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + self.ttl;
        let claims = Claims {
            id: user_id.to_string(),
            role: role.to_string(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, role = %role, "jwt signed");
        Ok(token)
    }
}
