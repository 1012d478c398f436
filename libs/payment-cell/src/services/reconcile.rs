// libs/payment-cell/src/services/reconcile.rs
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde_json::json;
use sha2::Sha256;
use tracing::{debug, info, warn};
use uuid::Uuid;
use std::sync::Arc;

use chrono::Utc;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Payment, PaymentError, PaymentStatus, QrWebhookEvent};
use crate::services::stripe::StripeClient;

type HmacSha256 = Hmac<Sha256>;

/// Settles payment rows from provider callbacks. Handlers are idempotent:
/// a redelivered success re-asserts the appointment cascade instead of
/// failing, so a crash between the two writes heals on the next retry.
pub struct ReconcileService {
    supabase: Arc<SupabaseClient>,
    stripe: StripeClient,
    qr_webhook_secret: String,
}

impl ReconcileService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            stripe: StripeClient::new(config),
            qr_webhook_secret: config.qr_webhook_secret.clone(),
        }
    }

    /// Stripe webhook entry point. The signature covers the raw body and is
    /// checked before any parsing.
    pub async fn handle_stripe_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<(), PaymentError> {
        let event = self
            .stripe
            .verify_webhook_signature(payload, signature_header)
            .map_err(|e| {
                warn!("Stripe signature rejected: {}", e);
                PaymentError::InvalidSignature
            })?;

        match event.type_.as_str() {
            "payment_intent.succeeded" => {
                let intent = StripeClient::extract_payment_intent(&event).ok_or_else(|| {
                    PaymentError::ValidationError("Event carries no payment intent".to_string())
                })?;

                info!("Stripe reports intent {} succeeded", intent.id);
                self.settle_stripe_success(&intent.id).await
            }
            "payment_intent.payment_failed" => {
                let intent = StripeClient::extract_payment_intent(&event).ok_or_else(|| {
                    PaymentError::ValidationError("Event carries no payment intent".to_string())
                })?;

                info!("Stripe reports intent {} failed", intent.id);
                self.mark_stripe_failure(&intent.id).await
            }
            other => {
                warn!("Ignoring unhandled Stripe event type: {}", other);
                Ok(())
            }
        }
    }

    /// Bank webhook entry point. x-webhook-signature is a hex HMAC-SHA256 of
    /// the raw body.
    pub async fn handle_qr_event(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<(), PaymentError> {
        let signature = signature.ok_or(PaymentError::InvalidSignature)?;
        self.verify_qr_signature(payload, signature)?;

        let event: QrWebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| PaymentError::ValidationError(format!("Invalid webhook payload: {}", e)))?;

        let path = format!(
            "/rest/v1/payments?transaction_id=eq.{}&method=eq.qr",
            urlencoding::encode(&event.transaction_id)
        );
        let payment = self
            .fetch_first(&path, None)
            .await?
            .ok_or(PaymentError::NotFound)?;

        if event.amount != payment.amount {
            warn!(
                "Amount mismatch for {}: bank reported {}, payment holds {}",
                event.transaction_id, event.amount, payment.amount
            );
            return Err(PaymentError::AmountMismatch);
        }

        match event.status.as_str() {
            "paid" => match payment.status {
                PaymentStatus::Pending => {
                    self.set_payment_status(payment.id, PaymentStatus::Paid, None).await?;
                    self.set_appointment_status(payment.appointment_id, "paid", None).await?;
                    info!("QR payment {} settled", payment.payment_id);
                    Ok(())
                }
                PaymentStatus::Paid => {
                    debug!("Redelivered success for settled payment {}", payment.payment_id);
                    self.set_appointment_status(payment.appointment_id, "paid", None).await?;
                    Ok(())
                }
                // Expired or failed rows are no longer payable; reconciling
                // money that arrived late is a manual job.
                _ => Err(PaymentError::NotFound),
            },
            "failed" => {
                if payment.status == PaymentStatus::Pending {
                    self.set_payment_status(payment.id, PaymentStatus::Failed, None).await?;
                    // Free the customer to pay another way.
                    self.set_appointment_status(payment.appointment_id, "pending", None).await?;
                    info!("QR payment {} failed, appointment released", payment.payment_id);
                } else {
                    warn!(
                        "Ignoring failure event for {} payment {}",
                        payment.status, payment.payment_id
                    );
                }
                Ok(())
            }
            other => Err(PaymentError::ValidationError(format!(
                "Unknown payment status: {}",
                other
            ))),
        }
    }

    /// Manual settle for when the bank webhook never arrived. Admin-gated at
    /// the handler; only pending payments can be confirmed.
    pub async fn confirm_qr_payment(
        &self,
        payment_code: &str,
        auth_token: &str,
    ) -> Result<Payment, PaymentError> {
        let path = format!(
            "/rest/v1/payments?payment_id=eq.{}",
            urlencoding::encode(payment_code)
        );
        let payment = self
            .fetch_first(&path, Some(auth_token))
            .await?
            .ok_or(PaymentError::NotFound)?;

        if payment.status != PaymentStatus::Pending {
            return Err(PaymentError::NotPending);
        }

        let updated = self
            .set_payment_status(payment.id, PaymentStatus::Paid, Some(auth_token))
            .await?;
        self.set_appointment_status(payment.appointment_id, "paid", Some(auth_token))
            .await?;

        info!("Payment {} confirmed manually", payment_code);
        Ok(updated)
    }

    async fn settle_stripe_success(&self, intent_id: &str) -> Result<(), PaymentError> {
        let path = format!(
            "/rest/v1/payments?payment_id=eq.{}",
            urlencoding::encode(intent_id)
        );
        let Some(payment) = self.fetch_first(&path, None).await? else {
            // Ack so Stripe stops retrying an event we cannot match.
            warn!("No payment row for intent {}, acknowledging", intent_id);
            return Ok(());
        };

        match payment.status {
            PaymentStatus::Pending | PaymentStatus::Failed => {
                self.set_payment_status(payment.id, PaymentStatus::Paid, None).await?;
            }
            PaymentStatus::Paid => {
                debug!("Redelivered success for settled payment {}", payment.payment_id);
            }
            _ => {
                warn!(
                    "Not settling {} payment {}",
                    payment.status, payment.payment_id
                );
                return Ok(());
            }
        }

        // Cascade after the payment write; a failure here surfaces as 5xx
        // and the provider redelivers.
        self.set_appointment_status(payment.appointment_id, "paid", None).await?;
        info!("Card payment {} settled", payment.payment_id);
        Ok(())
    }

    async fn mark_stripe_failure(&self, intent_id: &str) -> Result<(), PaymentError> {
        let path = format!(
            "/rest/v1/payments?payment_id=eq.{}",
            urlencoding::encode(intent_id)
        );
        let Some(payment) = self.fetch_first(&path, None).await? else {
            warn!("No payment row for intent {}, acknowledging", intent_id);
            return Ok(());
        };

        if payment.status == PaymentStatus::Pending {
            self.set_payment_status(payment.id, PaymentStatus::Failed, None).await?;
            // The appointment stays as it is; the customer may retry the card
            // or switch to QR or cash.
            info!("Card payment {} marked failed", payment.payment_id);
        } else {
            warn!(
                "Ignoring failure event for {} payment {}",
                payment.status, payment.payment_id
            );
        }

        Ok(())
    }

    fn verify_qr_signature(&self, payload: &[u8], signature: &str) -> Result<(), PaymentError> {
        let mut mac = HmacSha256::new_from_slice(self.qr_webhook_secret.as_bytes())
            .map_err(|_| PaymentError::InvalidSignature)?;
        mac.update(payload);
        let expected = mac.finalize().into_bytes();

        let provided = hex::decode(signature).map_err(|_| PaymentError::InvalidSignature)?;

        if expected[..] != provided[..] {
            warn!("QR webhook signature mismatch");
            return Err(PaymentError::InvalidSignature);
        }

        Ok(())
    }

    async fn fetch_first(
        &self,
        path: &str,
        auth_token: Option<&str>,
    ) -> Result<Option<Payment>, PaymentError> {
        let result: Vec<Payment> = self
            .supabase
            .request(Method::GET, path, auth_token, None)
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        Ok(result.into_iter().next())
    }

    async fn set_payment_status(
        &self,
        payment_row_id: Uuid,
        status: PaymentStatus,
        auth_token: Option<&str>,
    ) -> Result<Payment, PaymentError> {
        let path = format!("/rest/v1/payments?id=eq.{}", payment_row_id);
        let update = json!({
            "status": status.to_string(),
            "updated_at": Utc::now().to_rfc3339(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Payment> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, auth_token, Some(update), Some(headers))
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(PaymentError::NotFound)
    }

    async fn set_appointment_status(
        &self,
        appointment_id: Uuid,
        status: &str,
        auth_token: Option<&str>,
    ) -> Result<(), PaymentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let update = json!({ "status": status });

        let _: () = self
            .supabase
            .request(Method::PATCH, &path, auth_token, Some(update))
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}
