use booking_service::config::{
    Config, DatabaseConfig, GatewayConfig, NotifierConfig, ServerConfig,
};
use booking_service::models::{Customer, Partner, Product};
use booking_service::Application;
use mongodb::bson::doc;
use secrecy::Secret;
use std::time::Duration;
use uuid::Uuid;

pub const TEST_KEY_SECRET: &str = "test_key_secret";
pub const TEST_WEBHOOK_SECRET: &str = "test_webhook_secret";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub db: mongodb::Database,
    pub db_name: String,
    pub client: reqwest::Client,
}

impl TestApp {
    /// Spawn the application against a throwaway database. Returns `None`
    /// (and the caller skips) when MongoDB is not reachable.
    pub async fn spawn() -> Option<Self> {
        let uri = std::env::var("TEST_MONGODB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        // Probe first so a missing MongoDB skips instead of hanging.
        let mut probe_options = mongodb::options::ClientOptions::parse(&uri).await.ok()?;
        probe_options.server_selection_timeout = Some(Duration::from_secs(2));
        let probe = mongodb::Client::with_options(probe_options).ok()?;
        if probe
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .is_err()
        {
            eprintln!("skipping: MongoDB not reachable at {uri}");
            return None;
        }

        let db_name = format!("booking_test_{}", Uuid::new_v4());

        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Random port
            },
            database: DatabaseConfig {
                url: Secret::new(uri),
                db_name: db_name.clone(),
            },
            gateway: GatewayConfig {
                key_id: "rzp_test_key".to_string(),
                key_secret: Secret::new(TEST_KEY_SECRET.to_string()),
                webhook_secret: Secret::new(TEST_WEBHOOK_SECRET.to_string()),
                api_base_url: "https://api.razorpay.com/v1".to_string(),
            },
            notifier: NotifierConfig {
                enabled: false,
                push_endpoint: String::new(),
                push_api_key: Secret::new(String::new()),
                whatsapp_endpoint: String::new(),
                whatsapp_token: Secret::new(String::new()),
            },
            service_name: "booking-service-test".to_string(),
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");
        let port = app.port();
        let db = app.db().clone();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to accept requests.
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        Some(TestApp {
            address,
            port,
            db,
            db_name,
            client,
        })
    }

    pub async fn cleanup(&self) {
        self.db
            .drop(None)
            .await
            .expect("Failed to drop test database");
    }

    pub async fn seed_customer(&self, wallet_balance_paise: i64) -> Uuid {
        let now = mongodb::bson::DateTime::now();
        let customer = Customer {
            id: Uuid::new_v4(),
            name: "Asha Rao".to_string(),
            phone: "+919800000001".to_string(),
            wallet_balance_paise,
            device_token: None,
            is_active: true,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.db
            .collection::<Customer>("customers")
            .insert_one(&customer, None)
            .await
            .expect("Failed to seed customer");
        customer.id
    }

    pub async fn seed_partner(&self, wallet_balance_paise: i64) -> Uuid {
        let now = mongodb::bson::DateTime::now();
        let partner = Partner {
            id: Uuid::new_v4(),
            name: "Vikram Singh".to_string(),
            phone: "+919800000002".to_string(),
            wallet_balance_paise,
            rating: 0.0,
            device_token: None,
            is_active: true,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.db
            .collection::<Partner>("partners")
            .insert_one(&partner, None)
            .await
            .expect("Failed to seed partner");
        partner.id
    }

    pub async fn seed_product(&self, unit_price_paise: i64) -> Uuid {
        let now = mongodb::bson::DateTime::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: "Classic Haircut".to_string(),
            unit_price_paise,
            rating: 0.0,
            times_booked: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.db
            .collection::<Product>("products")
            .insert_one(&product, None)
            .await
            .expect("Failed to seed product");
        product.id
    }

    pub async fn customer_balance(&self, id: Uuid) -> i64 {
        self.db
            .collection::<Customer>("customers")
            .find_one(doc! { "_id": id.to_string() }, None)
            .await
            .expect("customer lookup failed")
            .expect("customer missing")
            .wallet_balance_paise
    }

    pub async fn partner_balance(&self, id: Uuid) -> i64 {
        self.db
            .collection::<Partner>("partners")
            .find_one(doc! { "_id": id.to_string() }, None)
            .await
            .expect("partner lookup failed")
            .expect("partner missing")
            .wallet_balance_paise
    }
}

/// Schedule slot JSON for a slot this many hours from now, in the 12-hour
/// wire format the engine stores.
pub fn slot_hours_from_now(hours: f64) -> serde_json::Value {
    let at = chrono::Utc::now().naive_utc() + chrono::Duration::minutes((hours * 60.0) as i64);
    serde_json::json!({
        "date": at.date().format("%Y-%m-%d").to_string(),
        "time": at.format("%I:%M").to_string(),
        "meridiem": at.format("%p").to_string(),
    })
}

pub fn test_address() -> serde_json::Value {
    serde_json::json!({
        "line1": "12 MG Road",
        "city": "Bengaluru",
        "pincode": "560001",
    })
}
