// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;

/// Length of the slot an appointment occupies, starting at its date.
pub const BOOKING_WINDOW_MINUTES: i64 = 30;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub service: String,
    pub date: DateTime<Utc>,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub note: Option<String>,
    pub user_id: Uuid,
    /// Price snapshot taken from the service catalog at booking time.
    pub price: i64,
    pub status: AppointmentStatus,
    pub confirmed: ConfirmationStatus,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    /// End of the slot this appointment occupies.
    pub fn window_end(&self) -> DateTime<Utc> {
        self.date + chrono::Duration::minutes(BOOKING_WINDOW_MINUTES)
    }
}

/// Money axis of an appointment. Never written by the confirmation flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Paid,
    Cancelled,
    CashPending,
    QrPending,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Paid => write!(f, "paid"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::CashPending => write!(f, "cash_pending"),
            AppointmentStatus::QrPending => write!(f, "qr_pending"),
        }
    }
}

impl AppointmentStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(AppointmentStatus::Pending),
            "paid" => Some(AppointmentStatus::Paid),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            "cash_pending" => Some(AppointmentStatus::CashPending),
            "qr_pending" => Some(AppointmentStatus::QrPending),
            _ => None,
        }
    }

    /// Whether an appointment in this status occupies its slot.
    pub fn blocks_slot(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }
}

/// Salon approval axis, orthogonal to the money axis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfirmationStatus::Pending => write!(f, "pending"),
            ConfirmationStatus::Confirmed => write!(f, "confirmed"),
            ConfirmationStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// Service catalog row. The catalog is managed outside this API; booking only
/// reads it to resolve prices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub price: i64,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub service: String,
    pub date: DateTime<Utc>,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckAvailabilityRequest {
    pub date: DateTime<Utc>,
    /// When omitted the whole calendar is checked instead of one service.
    pub service: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub service: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub note: Option<String>,
}

impl UpdateAppointmentRequest {
    pub fn is_empty(&self) -> bool {
        self.service.is_none()
            && self.date.is_none()
            && self.name.is_none()
            && self.phone.is_none()
            && self.email.is_none()
            && self.note.is_none()
    }
}

/// Raw status string; validated against the money axis in the service layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// Raw decision string; only "confirmed" and "rejected" are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmAppointmentRequest {
    pub confirmed: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentStats {
    pub total_appointments: i64,
    pub confirmed_appointments: i64,
    pub pending_appointments: i64,
    pub paid_appointments: i64,
    pub total_revenue: i64,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("This time slot is already booked")]
    SlotUnavailable,

    #[error("Service '{0}' does not exist")]
    UnknownService(String),

    #[error("Appointment is not awaiting cash payment")]
    NotAwaitingCash,

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
