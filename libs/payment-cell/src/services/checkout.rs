// libs/payment-cell/src/services/checkout.rs
use chrono::{Duration, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;
use std::sync::Arc;

use shared_config::AppConfig;
use shared_database::supabase::{DbConflict, SupabaseClient};

use crate::models::{
    CheckoutOutcome, CreatePaymentIntentRequest, CreateQrRequest, Payment, PaymentError,
    PaymentMethod, PaymentStatus, QrCheckout, MIN_ONLINE_AMOUNT, QR_EXPIRY_MINUTES,
};
use crate::services::stripe::StripeClient;
use crate::services::vietqr;

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

/// Slim appointment projection; the payment flow only cares about the
/// money-axis status.
#[derive(Debug, Deserialize)]
struct AppointmentView {
    id: Uuid,
    status: String,
}

pub struct CheckoutService {
    supabase: Arc<SupabaseClient>,
    stripe: StripeClient,
    qr_bank_id: String,
    qr_account_number: String,
    qr_account_name: String,
}

impl CheckoutService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            stripe: StripeClient::new(config),
            qr_bank_id: config.qr_bank_id.clone(),
            qr_account_number: config.qr_account_number.clone(),
            qr_account_name: config.qr_account_name.clone(),
        }
    }

    /// Card or cash checkout. Cash only flips the appointment to
    /// cash_pending; card opens a Stripe PaymentIntent and records it
    /// locally so the webhook reconciler has a row to settle.
    pub async fn create_payment_intent(
        &self,
        request: CreatePaymentIntentRequest,
        user_id: &str,
        auth_token: &str,
    ) -> Result<CheckoutOutcome, PaymentError> {
        let (amount, appointment_id, payment_method) =
            match (request.amount, request.appointment_id, request.payment_method) {
                (Some(amount), Some(id), Some(method)) => (amount, id, method),
                _ => {
                    return Err(PaymentError::ValidationError(
                        "Missing required fields".to_string(),
                    ));
                }
            };

        let appointment = self.get_appointment_view(appointment_id, auth_token).await?;
        if appointment.status == "paid" {
            return Err(PaymentError::AlreadyPaid);
        }

        match payment_method.as_str() {
            "cash" => {
                self.set_appointment_status(appointment.id, "cash_pending", auth_token)
                    .await?;

                info!("Appointment {} awaiting cash payment", appointment.id);
                Ok(CheckoutOutcome::CashAtSalon)
            }
            "online" => {
                if amount < MIN_ONLINE_AMOUNT {
                    return Err(PaymentError::BelowMinimum);
                }

                let intent = self
                    .stripe
                    .create_payment_intent(amount, "vnd", appointment_id)
                    .await
                    .map_err(|e| PaymentError::StripeApi(e.to_string()))?;

                let client_secret = intent.client_secret.clone().ok_or_else(|| {
                    PaymentError::StripeApi(
                        "PaymentIntent came back without a client secret".to_string(),
                    )
                })?;

                let transaction_id =
                    format!("TRANS-{}-{}", appointment_id, Utc::now().timestamp_millis());

                self.insert_payment(
                    json!({
                        "user_id": user_id,
                        "payment_id": intent.id,
                        "transaction_id": transaction_id,
                        "appointment_id": appointment_id,
                        "amount": amount,
                        "status": PaymentStatus::Pending.to_string(),
                        "method": PaymentMethod::Card.to_string(),
                        "expires_at": Value::Null,
                    }),
                    auth_token,
                )
                .await?;

                info!(
                    "Stripe intent {} created for appointment {}",
                    intent.id, appointment_id
                );
                Ok(CheckoutOutcome::Online {
                    client_secret,
                    payment_id: intent.id,
                })
            }
            other => Err(PaymentError::ValidationError(format!(
                "Invalid payment method: {}",
                other
            ))),
        }
    }

    /// Bank-transfer checkout: records a pending payment with a 15 minute
    /// window and hands back the VietQR image URL.
    pub async fn create_qr_payment(
        &self,
        request: CreateQrRequest,
        user_id: &str,
        auth_token: &str,
    ) -> Result<QrCheckout, PaymentError> {
        let (amount, appointment_id, payment_method) =
            match (request.amount, request.appointment_id, request.payment_method) {
                (Some(amount), Some(id), Some(method)) => (amount, id, method),
                _ => {
                    return Err(PaymentError::ValidationError(
                        "Missing required fields".to_string(),
                    ));
                }
            };

        if payment_method != "qr" {
            return Err(PaymentError::ValidationError(format!(
                "Invalid payment method: {}",
                payment_method
            )));
        }
        if amount <= 0 {
            return Err(PaymentError::InvalidAmount);
        }
        if amount < MIN_ONLINE_AMOUNT {
            return Err(PaymentError::BelowMinimum);
        }

        let appointment = self.get_appointment_view(appointment_id, auth_token).await?;
        if appointment.status == "paid" {
            return Err(PaymentError::AlreadyPaid);
        }

        let millis = Utc::now().timestamp_millis();
        let payment_id = format!("PAY-{}-{}", appointment_id, millis);
        let transaction_id = format!("TRANS-{}-{}", appointment_id, millis);
        let expires_at = Utc::now() + Duration::minutes(QR_EXPIRY_MINUTES);

        self.insert_payment(
            json!({
                "user_id": user_id,
                "payment_id": payment_id,
                "transaction_id": transaction_id,
                "appointment_id": appointment_id,
                "amount": amount,
                "status": PaymentStatus::Pending.to_string(),
                "method": PaymentMethod::Qr.to_string(),
                "expires_at": expires_at.to_rfc3339(),
            }),
            auth_token,
        )
        .await?;

        self.set_appointment_status(appointment.id, "qr_pending", auth_token)
            .await?;

        let qr_code = vietqr::build_payment_url(
            &self.qr_bank_id,
            &self.qr_account_number,
            &self.qr_account_name,
            amount,
            appointment_id,
        );

        info!(
            "QR payment {} created for appointment {}, expires {}",
            payment_id, appointment_id, expires_at
        );

        Ok(QrCheckout {
            qr_code,
            payment_id,
            transaction_id,
            expires_at,
        })
    }

    /// Status poll with lazy expiry: a pending QR payment whose window has
    /// passed is persisted as expired before it is returned. Settled rows are
    /// never touched by the check.
    pub async fn get_payment_status(
        &self,
        payment_code: &str,
        owner: Option<&str>,
        auth_token: &str,
    ) -> Result<Payment, PaymentError> {
        let payment = self.get_payment_by_code(payment_code, owner, auth_token).await?;

        if payment.is_expired(Utc::now()) {
            info!("Payment {} expired at {:?}", payment.payment_id, payment.expires_at);
            return self
                .set_payment_status(payment.id, PaymentStatus::Expired, auth_token)
                .await;
        }

        Ok(payment)
    }

    /// The caller's payments, newest first.
    pub async fn get_payment_history(
        &self,
        user_id: &str,
        page: Option<i64>,
        limit: Option<i64>,
        auth_token: &str,
    ) -> Result<(Vec<Payment>, i64), PaymentError> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1) * limit;

        let path = format!(
            "/rest/v1/payments?user_id=eq.{}&order=created_at.desc&limit={}&offset={}",
            user_id, limit, offset
        );
        debug!("Listing payments: {}", path);

        let (result, total): (Vec<Value>, i64) = self
            .supabase
            .request_with_count(Method::GET, &path, Some(auth_token))
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        let payments: Vec<Payment> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Payment>, _>>()
            .map_err(|e| PaymentError::DatabaseError(format!("Failed to parse payments: {}", e)))?;

        Ok((payments, total))
    }

    async fn get_appointment_view(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<AppointmentView, PaymentError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&select=id,status",
            appointment_id
        );

        let result: Vec<AppointmentView> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .next()
            .ok_or(PaymentError::AppointmentNotFound)
    }

    async fn set_appointment_status(
        &self,
        appointment_id: Uuid,
        status: &str,
        auth_token: &str,
    ) -> Result<(), PaymentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let update = json!({ "status": status });

        let _: () = self
            .supabase
            .request(Method::PATCH, &path, Some(auth_token), Some(update))
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn insert_payment(&self, data: Value, auth_token: &str) -> Result<Payment, PaymentError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Payment> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/payments",
                Some(auth_token),
                Some(data),
                Some(headers),
            )
            .await
            .map_err(|e| {
                if e.downcast_ref::<DbConflict>().is_some() {
                    PaymentError::DuplicatePayment
                } else {
                    PaymentError::DatabaseError(e.to_string())
                }
            })?;

        result
            .into_iter()
            .next()
            .ok_or_else(|| PaymentError::DatabaseError("Failed to create payment".to_string()))
    }

    async fn get_payment_by_code(
        &self,
        payment_code: &str,
        owner: Option<&str>,
        auth_token: &str,
    ) -> Result<Payment, PaymentError> {
        let mut path = format!(
            "/rest/v1/payments?payment_id=eq.{}",
            urlencoding::encode(payment_code)
        );
        if let Some(user_id) = owner {
            path.push_str(&format!("&user_id=eq.{}", user_id));
        }

        let result: Vec<Payment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(PaymentError::NotFound)
    }

    async fn set_payment_status(
        &self,
        payment_row_id: Uuid,
        status: PaymentStatus,
        auth_token: &str,
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
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(update), Some(headers))
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(PaymentError::NotFound)
    }
}
