// libs/payment-cell/src/services/stripe.rs
use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::error;
use uuid::Uuid;

use shared_config::AppConfig;

type HmacSha256 = Hmac<Sha256>;

/// Webhook timestamps older or newer than this are treated as replays.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Minimal Stripe client built on reqwest. Only the PaymentIntent surface
/// this API needs, form-encoded the way Stripe expects.
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    webhook_secret: String,
    api_base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: Value,
}

/// The intent embedded in a webhook event.
#[derive(Debug, Deserialize)]
pub struct EventPaymentIntent {
    pub id: String,
    pub amount: Option<i64>,
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<String>,
    message: Option<String>,
    decline_code: Option<String>,
}

impl StripeClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: config.stripe_secret_key.clone(),
            webhook_secret: config.stripe_webhook_secret.clone(),
            api_base_url: config.stripe_api_base_url.clone(),
        }
    }

    async fn ensure_success(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let request_id = resp
            .headers()
            .get("request-id")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let (error_type, error_code, error_message, decline_code) =
            match serde_json::from_str::<StripeErrorEnvelope>(&body) {
                Ok(envelope) => {
                    let details = envelope.error;
                    (details.type_, details.code, details.message, details.decline_code)
                }
                Err(_) => (None, None, None, None),
            };

        error!(
            status = %status,
            stripe_request_id = ?request_id,
            stripe_error_type = ?error_type,
            stripe_error_code = ?error_code,
            stripe_error_message = ?error_message,
            stripe_decline_code = ?decline_code,
            context = %context,
            "stripe api request failed"
        );

        anyhow::bail!(
            "Stripe API request failed: {} (status {}, request_id={:?})",
            context,
            status,
            request_id
        );
    }

    /// Creates a PaymentIntent. https://stripe.com/docs/api/payment_intents/create
    pub async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
        appointment_id: Uuid,
    ) -> Result<PaymentIntent> {
        let body = [
            ("amount", amount.to_string()),
            ("currency", currency.to_string()),
            ("metadata[appointment_id]", appointment_id.to_string()),
        ];

        let resp = self
            .http
            .post(format!("{}/v1/payment_intents", self.api_base_url))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&body)
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "create payment intent").await?;

        let intent: PaymentIntent = resp.json().await?;
        Ok(intent)
    }

    /// Verifies the webhook signature. https://stripe.com/docs/webhooks/signatures
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent> {
        let mut timestamp: Option<String> = None;
        let mut signature: Option<String> = None;

        for part in signature_header.split(',') {
            if let Some(rest) = part.strip_prefix("t=") {
                timestamp = Some(rest.to_string());
            } else if let Some(rest) = part.strip_prefix("v1=") {
                signature = Some(rest.to_string());
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| anyhow::anyhow!("missing timestamp in stripe-signature"))?;
        let signature =
            signature.ok_or_else(|| anyhow::anyhow!("missing v1 in stripe-signature"))?;

        let event_time: i64 = timestamp
            .parse()
            .map_err(|_| anyhow::anyhow!("malformed timestamp in stripe-signature"))?;
        if (Utc::now().timestamp() - event_time).abs() > SIGNATURE_TOLERANCE_SECS {
            anyhow::bail!("stripe-signature timestamp outside tolerance");
        }

        let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())?;
        mac.update(signed_payload.as_bytes());
        let expected = mac.finalize().into_bytes();
        let provided = hex::decode(signature)?;

        if expected[..] != provided[..] {
            anyhow::bail!("invalid webhook signature");
        }

        let event: StripeEvent = serde_json::from_slice(payload)?;
        Ok(event)
    }

    pub fn extract_payment_intent(event: &StripeEvent) -> Option<EventPaymentIntent> {
        serde_json::from_value(event.data.object.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_utils::test_utils::{TestConfig, WebhookTestUtils};

    fn client() -> StripeClient {
        let mut config = TestConfig::default().to_app_config();
        config.stripe_webhook_secret = "whsec_test".to_string();
        StripeClient::new(&config)
    }

    fn event_body() -> Vec<u8> {
        serde_json::json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_123", "amount": 150000 } }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn accepts_valid_signature() {
        let client = client();
        let body = event_body();
        let header =
            WebhookTestUtils::stripe_signature_header("whsec_test", &body, Utc::now().timestamp());

        let event = client.verify_webhook_signature(&body, &header).unwrap();
        assert_eq!(event.type_, "payment_intent.succeeded");

        let intent = StripeClient::extract_payment_intent(&event).unwrap();
        assert_eq!(intent.id, "pi_123");
    }

    #[test]
    fn rejects_wrong_secret() {
        let client = client();
        let body = event_body();
        let header =
            WebhookTestUtils::stripe_signature_header("whsec_other", &body, Utc::now().timestamp());

        assert!(client.verify_webhook_signature(&body, &header).is_err());
    }

    #[test]
    fn rejects_stale_timestamp() {
        let client = client();
        let body = event_body();
        let stale = Utc::now().timestamp() - 600;
        let header = WebhookTestUtils::stripe_signature_header("whsec_test", &body, stale);

        assert!(client.verify_webhook_signature(&body, &header).is_err());
    }

    #[test]
    fn rejects_header_without_signature() {
        let client = client();
        let body = event_body();

        assert!(client
            .verify_webhook_signature(&body, &format!("t={}", Utc::now().timestamp()))
            .is_err());
    }
}
