use anyhow::{anyhow, Result};
use dotenvy::dotenv;
use secrecy::Secret;
use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub notifier: NotifierConfig,
    pub service_name: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct NotifierConfig {
    pub enabled: bool,
    pub push_endpoint: String,
    pub push_api_key: Secret<String>,
    pub whatsapp_endpoint: String,
    pub whatsapp_token: Secret<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("BOOKING_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("BOOKING_SERVICE_PORT")
            .unwrap_or_else(|_| "3004".to_string())
            .parse()?;

        let db_url = env::var("BOOKING_DATABASE_URL")
            .map_err(|_| anyhow!("BOOKING_DATABASE_URL must be set"))?;
        let db_name =
            env::var("BOOKING_DATABASE_NAME").unwrap_or_else(|_| "booking_db".to_string());

        let gateway = GatewayConfig {
            key_id: env::var("RAZORPAY_KEY_ID").unwrap_or_default(),
            key_secret: Secret::new(env::var("RAZORPAY_KEY_SECRET").unwrap_or_default()),
            webhook_secret: Secret::new(env::var("RAZORPAY_WEBHOOK_SECRET").unwrap_or_default()),
            api_base_url: env::var("RAZORPAY_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.razorpay.com/v1".to_string()),
        };

        let notifier = NotifierConfig {
            enabled: env::var("NOTIFIER_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            push_endpoint: env::var("NOTIFIER_PUSH_ENDPOINT").unwrap_or_default(),
            push_api_key: Secret::new(env::var("NOTIFIER_PUSH_API_KEY").unwrap_or_default()),
            whatsapp_endpoint: env::var("NOTIFIER_WHATSAPP_ENDPOINT").unwrap_or_default(),
            whatsapp_token: Secret::new(env::var("NOTIFIER_WHATSAPP_TOKEN").unwrap_or_default()),
        };

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                db_name,
            },
            gateway,
            notifier,
            service_name: "booking-service".to_string(),
        })
    }
}
