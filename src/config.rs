use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub currency: String,
    pub payment_secret_key: Option<String>,
    pub payment_webhook_secret: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let currency = env::var("PAYMENT_CURRENCY").unwrap_or_else(|_| "brl".to_string());
        let payment_secret_key = env::var("PAYMENT_SECRET_KEY").ok();
        let payment_webhook_secret = env::var("PAYMENT_WEBHOOK_SECRET").ok();
        Ok(Self {
            database_url,
            host,
            port,
            currency,
            payment_secret_key,
            payment_webhook_secret,
        })
    }
}
