//! Payment gateway client (Razorpay Orders API idiom).
//!
//! The engine treats the gateway as an opaque collaborator: create an order,
//! verify a signature, issue a refund. Pending ledger entries are resolved
//! out-of-band by the webhook or the client-side verification call.

use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::GatewayConfig;

#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    config: GatewayConfig,
}

#[derive(Debug, Serialize)]
struct CreateOrderBody {
    /// Amount in the smallest currency unit (paise for INR).
    amount: u64,
    currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    receipt: Option<String>,
}

/// Order as returned by the gateway.
#[derive(Debug, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: u64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    error: GatewayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorDetail {
    code: String,
    description: String,
}

/// Checkout result to verify against the order.
#[derive(Debug)]
pub struct PaymentVerification {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

/// Webhook event envelope, trimmed to the fields the engine consumes.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub payload: WebhookPayload,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub payment: Option<WebhookPaymentEntity>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPaymentEntity {
    pub entity: PaymentEntity,
}

#[derive(Debug, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    pub amount: u64,
    pub status: String,
    pub order_id: Option<String>,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Whether gateway credentials are present for this environment.
    pub fn is_configured(&self) -> bool {
        !self.config.key_id.is_empty() && !self.config.key_secret.expose_secret().is_empty()
    }

    pub fn key_id(&self) -> &str {
        &self.config.key_id
    }

    /// Create an order for `amount` paise.
    pub async fn create_order(&self, amount: u64, receipt: Option<String>) -> Result<GatewayOrder> {
        if !self.is_configured() {
            return Err(anyhow!("payment gateway credentials not configured"));
        }

        let body = CreateOrderBody {
            amount,
            currency: "INR".to_string(),
            receipt,
        };
        let url = format!("{}/orders", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            let order: GatewayOrder = serde_json::from_str(&text)?;
            tracing::info!(
                order_id = %order.id,
                amount = order.amount,
                "Gateway order created"
            );
            Ok(order)
        } else {
            Err(anyhow!("gateway error: {}", describe_error(&text)))
        }
    }

    /// Refund a captured payment, in paise.
    pub async fn refund_payment(&self, payment_id: &str, amount: u64) -> Result<()> {
        if !self.is_configured() {
            return Err(anyhow!("payment gateway credentials not configured"));
        }

        let url = format!("{}/payments/{}/refund", self.config.api_base_url, payment_id);
        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(&serde_json::json!({ "amount": amount }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(payment_id = %payment_id, amount, "Gateway refund issued");
            Ok(())
        } else {
            let text = response.text().await?;
            Err(anyhow!("gateway refund failed: {}", describe_error(&text)))
        }
    }

    /// Verify a checkout signature: `HMAC-SHA256(order_id|payment_id, key_secret)`.
    pub fn verify_payment_signature(&self, verification: &PaymentVerification) -> Result<bool> {
        let payload = format!("{}|{}", verification.order_id, verification.payment_id);
        let expected = self.compute_signature(&payload, self.config.key_secret.expose_secret())?;
        let is_valid = expected == verification.signature;

        if !is_valid {
            tracing::warn!(
                order_id = %verification.order_id,
                payment_id = %verification.payment_id,
                "Payment signature verification failed"
            );
        }

        Ok(is_valid)
    }

    /// Verify a webhook signature: `HMAC-SHA256(body, webhook_secret)`.
    pub fn verify_webhook_signature(&self, body: &str, signature: &str) -> Result<bool> {
        let expected =
            self.compute_signature(body, self.config.webhook_secret.expose_secret())?;
        let is_valid = expected == signature;

        if !is_valid {
            tracing::warn!("Webhook signature verification failed");
        }

        Ok(is_valid)
    }

    pub fn parse_webhook_event(&self, body: &str) -> Result<WebhookEvent> {
        let event: WebhookEvent = serde_json::from_str(body)?;
        Ok(event)
    }

    fn compute_signature(&self, payload: &str, secret: &str) -> Result<String> {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| anyhow!("invalid key length"))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

fn describe_error(body: &str) -> String {
    match serde_json::from_str::<GatewayErrorBody>(body) {
        Ok(parsed) => format!("{} - {}", parsed.error.code, parsed.error.description),
        Err(_) => body.to_string(),
    }
}
