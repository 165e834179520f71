//! Payment processor integration via its REST API (no SDK dependency).

use anyhow::anyhow;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Maximum accepted webhook timestamp skew, in seconds.
const WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentIntent {
    pub id: String,
    /// Token the browser uses to complete the charge.
    pub client_secret: String,
}

#[derive(Clone, Debug)]
pub struct Client {
    http: reqwest::Client,
    secret_key: String,
    webhook_secret: Option<String>,
    currency: String,
}

impl Client {
    pub fn new(secret_key: String, webhook_secret: Option<String>, currency: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
            webhook_secret,
            currency,
        }
    }

    /// Create a payment intent for an order total given in minor currency
    /// units. The order id travels in the intent metadata so the webhook can
    /// find the order again.
    pub async fn create_payment_intent(
        &self,
        order_id: Uuid,
        amount_minor: i64,
        receipt_email: Option<&str>,
    ) -> AppResult<PaymentIntent> {
        let mut params: Vec<(&str, String)> = vec![
            ("amount", amount_minor.to_string()),
            ("currency", self.currency.clone()),
            ("payment_method_types[]", "card".to_string()),
            ("description", format!("Order #{order_id}")),
            ("metadata[order_id]", order_id.to_string()),
        ];
        if let Some(email) = receipt_email {
            params.push(("receipt_email", email.to_string()));
        }

        let resp: serde_json::Value = self
            .http
            .post("https://api.stripe.com/v1/payment_intents")
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::Payment(e.into()))?
            .json()
            .await
            .map_err(|e| AppError::Payment(e.into()))?;

        let id = resp["id"].as_str();
        let client_secret = resp["client_secret"].as_str();
        match (id, client_secret) {
            (Some(id), Some(client_secret)) => Ok(PaymentIntent {
                id: id.to_string(),
                client_secret: client_secret.to_string(),
            }),
            _ => Err(AppError::Payment(anyhow!(
                "create payment intent failed: {resp}"
            ))),
        }
    }

    /// Check the webhook signature header before the payload is trusted.
    pub fn verify_webhook(&self, payload: &[u8], sig_header: &str) -> AppResult<()> {
        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or_else(|| AppError::BadRequest("Webhook secret is not configured".into()))?;
        verify_webhook_signature(payload, sig_header, secret, chrono::Utc::now().timestamp())
            .map_err(|reason| AppError::BadRequest(reason.to_string()))
    }
}

/// Verify a processor webhook signature header of the form
/// `t=<unix>,v1=<hex hmac-sha256>` over `"{t}.{payload}"`.
pub fn verify_webhook_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    now_unix: i64,
) -> Result<(), &'static str> {
    let mut timestamp = "";
    let mut signature = "";
    for part in sig_header.split(',') {
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.strip_prefix("v1=") {
            signature = v;
        }
    }

    if timestamp.is_empty() || signature.is_empty() {
        return Err("Invalid signature header");
    }

    let signed_payload = format!("{timestamp}.{}", std::str::from_utf8(payload).unwrap_or(""));
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(signed_payload.as_bytes());

    // Constant-time comparison of the hex-decoded signature.
    let sig_bytes = hex::decode(signature).map_err(|_| "Invalid signature hex")?;
    mac.verify_slice(&sig_bytes)
        .map_err(|_| "Webhook signature mismatch")?;

    // Reject stale events to limit replay.
    let ts: i64 = timestamp.parse().map_err(|_| "Invalid timestamp")?;
    if (now_unix - ts).abs() > WEBHOOK_TOLERANCE_SECS {
        return Err("Webhook timestamp too old");
    }

    Ok(())
}

/// The subset of the webhook event body the order flow cares about.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub object: WebhookObject,
}

#[derive(Debug, Deserialize)]
pub struct WebhookObject {
    pub id: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl WebhookObject {
    pub fn order_id(&self) -> Option<Uuid> {
        self.metadata
            .get("order_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(payload: &[u8], secret: &str, ts: i64) -> String {
        let signed = format!("{ts}.{}", std::str::from_utf8(payload).unwrap());
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed.as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("t={ts},v1={sig}")
    }

    #[test]
    fn accepts_valid_signature() {
        let payload = br#"{"type":"payment_intent.succeeded"}"#;
        let header = sign(payload, "whsec_test", 1_000_000);
        assert!(verify_webhook_signature(payload, &header, "whsec_test", 1_000_000).is_ok());
    }

    #[test]
    fn rejects_wrong_secret() {
        let payload = b"{}";
        let header = sign(payload, "whsec_test", 1_000_000);
        assert_eq!(
            verify_webhook_signature(payload, &header, "other", 1_000_000),
            Err("Webhook signature mismatch")
        );
    }

    #[test]
    fn rejects_stale_timestamp() {
        let payload = b"{}";
        let header = sign(payload, "whsec_test", 1_000_000);
        assert_eq!(
            verify_webhook_signature(payload, &header, "whsec_test", 1_000_000 + 3600),
            Err("Webhook timestamp too old")
        );
    }

    #[test]
    fn rejects_malformed_header() {
        assert!(verify_webhook_signature(b"{}", "v1=abcd", "s", 0).is_err());
        assert!(verify_webhook_signature(b"{}", "t=5,v1=zz", "s", 5).is_err());
    }

    #[test]
    fn extracts_order_id_from_metadata() {
        let body = serde_json::json!({
            "type": "payment_intent.succeeded",
            "data": { "object": {
                "id": "pi_123",
                "metadata": { "order_id": "8b9b2c2e-8f13-4a5a-9f3e-111111111111" }
            }}
        });
        let event: WebhookEvent = serde_json::from_value(body).unwrap();
        assert_eq!(event.event_type, "payment_intent.succeeded");
        assert!(event.data.object.order_id().is_some());
    }
}
