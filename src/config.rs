use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,

    // Database
    pub db_path: PathBuf,

    // JWT
    pub jwt_secret: String,

    // Checkout math
    pub tax_rate: f64,
    pub shipping_flat: f64,

    // Bulk upload
    pub max_upload_bytes: usize,

    // Build info
    pub version: String,

    // Logging
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            // Server
            host: env::var("STOREFRONT_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("STOREFRONT_API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),

            // Database
            db_path: PathBuf::from(
                env::var("STOREFRONT_DB_PATH")
                    .unwrap_or_else(|_| "/data/storefront.db".to_string()),
            ),

            // JWT
            jwt_secret: env::var("STOREFRONT_JWT_SECRET")
                .unwrap_or_else(|_| "change-me-in-production".to_string()),

            // Checkout math
            tax_rate: env::var("STOREFRONT_TAX_RATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.2),
            shipping_flat: env::var("STOREFRONT_SHIPPING_FLAT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5.0),

            // Bulk upload ceiling, documented to users as 5MB
            max_upload_bytes: env::var("STOREFRONT_MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5 * 1024 * 1024),

            // Build info
            version: env!("CARGO_PKG_VERSION").to_string(),

            // Logging
            log_level: env::var("STOREFRONT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }

    pub fn db_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.db_path.display())
    }
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);
