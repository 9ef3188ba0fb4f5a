mod app_config;
mod s3_config;

pub use app_config::{
    AppConfig, AuthConfig, CorsConfig, DatabaseConfig, MediaConfig, ServerConfig, StripeConfig,
};
pub use s3_config::*;
