use crate::error::{AppError, Result};
use std::{env, path::PathBuf};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub auth: AuthConfig,
    pub stripe: StripeConfig,
    pub media: MediaConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_size: usize,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone)]
pub enum MediaConfig {
    Local { root: PathBuf, base_url: String },
    S3 { bucket: String, assets_url: String },
}

impl StripeConfig {
    /// `"live"` for live secret or restricted keys, `"test"` otherwise.
    pub fn mode(&self) -> &'static str {
        if self.secret_key.starts_with("sk_live_") || self.secret_key.starts_with("rk_live_") {
            "live"
        } else {
            "test"
        }
    }
}

impl MediaConfig {
    pub fn backend(&self) -> &'static str {
        match self {
            MediaConfig::Local { .. } => "local",
            MediaConfig::S3 { .. } => "s3",
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let allowed_origins: Vec<String> = split_origins(&env::var("FRONTEND_URL")?);
        let frontend = allowed_origins
            .first()
            .cloned()
            .ok_or_else(|| AppError::ConfigError("FRONTEND_URL is empty".to_string()))?;

        Ok(Self {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("PORT", "3000")?,
                max_body_size: parse_var("MAX_BODY_SIZE", "10485760")?,
            },
            database: DatabaseConfig {
                url: env::var("DB_URL")?,
                max_connections: parse_var("DB_MAX_CONNECTIONS", "20")?,
                acquire_timeout_secs: parse_var("DB_ACQUIRE_TIMEOUT_SECS", "5")?,
            },
            cors: CorsConfig { allowed_origins },
            auth: AuthConfig {
                jwt_secret: env::var("JWT_SECRET")
                    .map_err(|_| AppError::ConfigError("JWT_SECRET not set".to_string()))?,
            },
            stripe: StripeConfig {
                secret_key: env::var("STRIPE_SECRET_KEY").map_err(|_| {
                    AppError::ConfigError("STRIPE_SECRET_KEY not set".to_string())
                })?,
                webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").map_err(|_| {
                    AppError::ConfigError("STRIPE_WEBHOOK_SECRET not set".to_string())
                })?,
                currency: env::var("STRIPE_CURRENCY").unwrap_or_else(|_| "usd".to_string()),
                success_url: env::var("CHECKOUT_SUCCESS_URL")
                    .unwrap_or_else(|_| format!("{}/checkout/success", frontend)),
                cancel_url: env::var("CHECKOUT_CANCEL_URL")
                    .unwrap_or_else(|_| format!("{}/checkout/cancel", frontend)),
            },
            media: media_from_env()?,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn media_from_env() -> Result<MediaConfig> {
    let backend = env::var("MEDIA_BACKEND").unwrap_or_else(|_| "local".to_string());

    match backend.as_str() {
        "local" => Ok(MediaConfig::Local {
            root: PathBuf::from(env::var("MEDIA_ROOT").unwrap_or_else(|_| "./media".to_string())),
            base_url: env::var("MEDIA_BASE_URL").unwrap_or_else(|_| "/media".to_string()),
        }),
        "s3" => Ok(MediaConfig::S3 {
            bucket: env::var("S3_BUCKET")
                .map_err(|_| AppError::ConfigError("S3_BUCKET not set".to_string()))?,
            assets_url: env::var("ASSETS_URL")
                .map_err(|_| AppError::ConfigError("ASSETS_URL not set".to_string()))?,
        }),
        other => Err(AppError::ConfigError(format!(
            "Invalid MEDIA_BACKEND value: {}",
            other
        ))),
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    parse_value(key, &raw)
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::ConfigError(format!("Invalid {} value", key)))
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
