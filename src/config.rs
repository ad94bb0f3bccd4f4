// config.rs
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub email_api_url: String,
    pub email_api_key: String,
    pub email_from: String,
    pub port: u16,
    pub host: String,
}

impl AppConfig {
    /// Expects the environment to be populated already (main loads the
    /// .env file before calling this).
    pub fn from_env() -> Self {
        AppConfig {
            database_url: env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set"),
            database_name: env::var("DATABASE_NAME")
                .unwrap_or_else(|_| "storefront".to_string()),
            jwt_secret: env::var("JWT_SECRET")
                .expect("JWT_SECRET must be set"),
            email_api_url: env::var("EMAIL_API_URL")
                .unwrap_or_else(|_| "https://api.mailersend.com/v1/email".to_string()),
            email_api_key: env::var("EMAIL_API_KEY").unwrap_or_default(),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "no-reply@storefront.app".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("PORT must be a number"),
            host: env::var("HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
        }
    }

    pub fn email_enabled(&self) -> bool {
        !self.email_api_key.is_empty()
    }
}
