// libs/payment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;

/// Smallest amount Stripe and the bank rails accept for VND.
pub const MIN_ONLINE_AMOUNT: i64 = 12_000;

/// How long a generated QR code stays payable.
pub const QR_EXPIRY_MINUTES: i64 = 15;

// ==============================================================================
// CORE PAYMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Provider-facing code: the Stripe intent id for card, PAY-… for QR.
    pub payment_id: String,
    /// Bank-facing code the QR webhook reports back.
    pub transaction_id: String,
    pub appointment_id: Uuid,
    /// Amount in VND. VND has no minor unit.
    pub amount: i64,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    /// Only QR payments expire; card rows carry no deadline.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Whether a pending QR payment has outlived its window.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Pending
            && self.method == PaymentMethod::Qr
            && self.expires_at.map(|t| t < now).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
    Expired,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Paid => write!(f, "paid"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Refunded => write!(f, "refunded"),
            PaymentStatus::Expired => write!(f, "expired"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Qr,
    Card,
    Cash,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Qr => write!(f, "qr"),
            PaymentMethod::Card => write!(f, "card"),
            PaymentMethod::Cash => write!(f, "cash"),
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

/// Checkout request. Fields are optional so a missing one reads as a 400
/// instead of a deserialization reject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentIntentRequest {
    pub amount: Option<i64>,
    pub appointment_id: Option<Uuid>,
    /// "online" for card, "cash" for paying at the salon.
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQrRequest {
    pub amount: Option<i64>,
    pub appointment_id: Option<Uuid>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentHistoryQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Body the bank posts to the QR webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrWebhookEvent {
    pub transaction_id: String,
    pub amount: i64,
    /// "paid" or "failed"; anything else is rejected.
    pub status: String,
}

// ==============================================================================
// SERVICE OUTCOMES
// ==============================================================================

/// What checkout produced: cash needs no provider round trip.
#[derive(Debug)]
pub enum CheckoutOutcome {
    CashAtSalon,
    Online {
        client_secret: String,
        payment_id: String,
    },
}

#[derive(Debug)]
pub struct QrCheckout {
    pub qr_code: String,
    pub payment_id: String,
    pub transaction_id: String,
    pub expires_at: DateTime<Utc>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment not found")]
    NotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Appointment is already paid")]
    AlreadyPaid,

    #[error("Invalid amount")]
    InvalidAmount,

    #[error("Minimum online payment amount is {} VND", MIN_ONLINE_AMOUNT)]
    BelowMinimum,

    #[error("Payment amount does not match")]
    AmountMismatch,

    #[error("Payment is not pending")]
    NotPending,

    #[error("Payment already exists")]
    DuplicatePayment,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Stripe error: {0}")]
    StripeApi(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
