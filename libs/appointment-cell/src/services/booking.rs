// libs/appointment-cell/src/services/booking.rs
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;
use std::collections::HashMap;
use std::sync::Arc;

use shared_config::AppConfig;
use shared_database::supabase::{DbConflict, SupabaseClient};

use crate::models::{
    Appointment, AppointmentError, AppointmentStats, AppointmentStatus,
    BookAppointmentRequest, ConfirmationStatus, Service, UpdateAppointmentRequest,
};
use crate::services::availability::AvailabilityService;

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// Case-insensitive substring match on service or customer name.
    pub search: Option<String>,
    /// Timeframe filter: "upcoming" or "past"; anything else means all.
    pub status: Option<String>,
    /// Money-axis filter, e.g. "paid" or "qr_pending".
    pub payment_status: Option<String>,
    /// Confirmation-axis filter: "pending", "confirmed" or "rejected".
    pub confirmed: Option<String>,
}

pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    availability_service: AvailabilityService,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let availability_service = AvailabilityService::new(Arc::clone(&supabase));

        Self {
            supabase,
            availability_service,
        }
    }

    pub async fn check_availability(
        &self,
        service: Option<&str>,
        date: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        self.availability_service
            .is_slot_available(service, date, auth_token)
            .await
    }

    /// Books a slot: availability pre-check, price snapshot from the catalog,
    /// then insert. The unique (service, date) index settles races the
    /// pre-check cannot see; its violation maps to the same slot conflict.
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        user_id: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if request.service.trim().is_empty() || request.name.trim().is_empty() {
            return Err(AppointmentError::ValidationError(
                "Service, date and name are required".to_string(),
            ));
        }

        info!("Booking {} at {} for user {}", request.service, request.date, user_id);

        let available = self
            .availability_service
            .is_slot_available(Some(&request.service), request.date, auth_token)
            .await?;
        if !available {
            return Err(AppointmentError::SlotUnavailable);
        }

        let service = self.get_service_by_name(&request.service, auth_token).await?;

        let appointment_data = json!({
            "service": request.service,
            "date": request.date.to_rfc3339(),
            "name": request.name,
            "phone": request.phone,
            "email": request.email,
            "note": request.note,
            "user_id": user_id,
            "price": service.price,
            "status": AppointmentStatus::Pending.to_string(),
            "confirmed": ConfirmationStatus::Pending.to_string(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(auth_token),
            Some(appointment_data),
            Some(headers),
        ).await.map_err(|e| {
            if e.downcast_ref::<DbConflict>().is_some() {
                warn!("Lost booking race for {} at {}", service.name, request.date);
                AppointmentError::SlotUnavailable
            } else {
                AppointmentError::DatabaseError(e.to_string())
            }
        })?;

        if result.is_empty() {
            return Err(AppointmentError::DatabaseError("Failed to create appointment".to_string()));
        }

        let appointment: Appointment = serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse created appointment: {}", e)))?;

        info!("Appointment {} booked at {} price {}", appointment.id, appointment.date, appointment.price);
        Ok(appointment)
    }

    /// Fetches one appointment. With an owner scope the query only matches
    /// that user's rows, so foreign ids read as not found.
    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        owner: Option<&str>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);

        let mut path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        if let Some(user_id) = owner {
            path.push_str(&format!("&user_id=eq.{}", user_id));
        }

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    /// Lists appointments with filters and pagination, newest date first.
    /// Returns the page plus the total matching the filters.
    pub async fn list_appointments(
        &self,
        query: AppointmentListQuery,
        owner: Option<&str>,
        auth_token: &str,
    ) -> Result<(Vec<Appointment>, i64), AppointmentError> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1) * limit;

        let mut query_parts = Vec::new();

        if let Some(user_id) = owner {
            query_parts.push(format!("user_id=eq.{}", user_id));
        }

        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = urlencoding::encode(&format!("*{}*", search)).into_owned();
            query_parts.push(format!("or=(service.ilike.{},name.ilike.{})", pattern, pattern));
        }

        match query.status.as_deref() {
            Some("upcoming") => {
                let now = urlencoding::encode(&Utc::now().to_rfc3339()).into_owned();
                query_parts.push(format!("date=gt.{}", now));
            }
            Some("past") => {
                let now = urlencoding::encode(&Utc::now().to_rfc3339()).into_owned();
                query_parts.push(format!("date=lte.{}", now));
            }
            _ => {}
        }

        if let Some(payment_status) = query.payment_status.as_deref() {
            let status = AppointmentStatus::parse(payment_status)
                .ok_or_else(|| AppointmentError::InvalidStatus(payment_status.to_string()))?;
            query_parts.push(format!("status=eq.{}", status));
        }

        if let Some(confirmed) = query.confirmed.as_deref() {
            let confirmed = parse_confirmation(confirmed)?;
            query_parts.push(format!("confirmed=eq.{}", confirmed));
        }

        query_parts.push("order=date.desc".to_string());
        query_parts.push(format!("limit={}", limit));
        query_parts.push(format!("offset={}", offset));

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));
        debug!("Listing appointments: {}", path);

        let (result, total): (Vec<Value>, i64) = self.supabase.request_with_count(
            Method::GET,
            &path,
            Some(auth_token),
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointments: Vec<Appointment> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e)))?;

        Ok((appointments, total))
    }

    /// Partial field edit for the salon staff. The slot is not re-checked
    /// here; moving onto a taken slot still trips the unique index.
    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if request.is_empty() {
            return Err(AppointmentError::ValidationError(
                "No fields to update".to_string(),
            ));
        }

        let mut update_data = serde_json::Map::new();
        if let Some(service) = request.service {
            update_data.insert("service".to_string(), json!(service));
        }
        if let Some(date) = request.date {
            update_data.insert("date".to_string(), json!(date.to_rfc3339()));
        }
        if let Some(name) = request.name {
            update_data.insert("name".to_string(), json!(name));
        }
        if let Some(phone) = request.phone {
            update_data.insert("phone".to_string(), json!(phone));
        }
        if let Some(email) = request.email {
            update_data.insert("email".to_string(), json!(email));
        }
        if let Some(note) = request.note {
            update_data.insert("note".to_string(), json!(note));
        }

        self.patch_appointment(appointment_id, Value::Object(update_data), None, auth_token).await
    }

    /// Money-axis update. This is how customers cancel; any catalog status
    /// value is accepted and the confirmation axis is never touched.
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        status: &str,
        owner: Option<&str>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let status = AppointmentStatus::parse(status)
            .ok_or_else(|| AppointmentError::InvalidStatus(status.to_string()))?;

        let update = json!({ "status": status.to_string() });
        let updated = self.patch_appointment(appointment_id, update, owner, auth_token).await?;

        info!("Appointment {} status set to {}", appointment_id, status);
        Ok(updated)
    }

    /// Salon decision axis: accepts only "confirmed" or "rejected".
    pub async fn confirm_appointment(
        &self,
        appointment_id: Uuid,
        decision: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let confirmed = match decision {
            "confirmed" => ConfirmationStatus::Confirmed,
            "rejected" => ConfirmationStatus::Rejected,
            other => {
                return Err(AppointmentError::ValidationError(format!(
                    "Confirmation must be 'confirmed' or 'rejected', got '{}'",
                    other
                )));
            }
        };

        let update = json!({ "confirmed": confirmed.to_string() });
        let updated = self.patch_appointment(appointment_id, update, None, auth_token).await?;

        info!("Appointment {} confirmation set to {}", appointment_id, confirmed);
        Ok(updated)
    }

    /// Cash settlement at the salon desk: cash_pending is the only status
    /// this transition accepts.
    pub async fn confirm_cash_payment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, None, auth_token).await?;

        if appointment.status != AppointmentStatus::CashPending {
            warn!(
                "Cash confirmation rejected for appointment {} in status {}",
                appointment_id, appointment.status
            );
            return Err(AppointmentError::NotAwaitingCash);
        }

        let update = json!({ "status": AppointmentStatus::Paid.to_string() });
        let updated = self.patch_appointment(appointment_id, update, None, auth_token).await?;

        info!("Cash payment confirmed for appointment {}", appointment_id);
        Ok(updated)
    }

    /// Hard delete. Payment rows referencing the appointment are left in
    /// place as the audit trail.
    pub async fn delete_appointment(
        &self,
        appointment_id: Uuid,
        owner: Option<&str>,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let mut path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        if let Some(user_id) = owner {
            path.push_str(&format!("&user_id=eq.{}", user_id));
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            Some(auth_token),
            None,
            Some(headers),
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        info!("Appointment {} deleted", appointment_id);
        Ok(())
    }

    /// Counts plus paid revenue, computed in memory from a slim projection.
    /// Rows without a price snapshot fall back to the current catalog price.
    pub async fn get_appointment_stats(
        &self,
        auth_token: &str,
    ) -> Result<AppointmentStats, AppointmentError> {
        debug!("Calculating appointment statistics");

        let (rows, catalog): (Vec<StatsRow>, Vec<CatalogPrice>) = futures::try_join!(
            self.supabase.request(
                Method::GET,
                "/rest/v1/appointments?select=service,price,status,confirmed",
                Some(auth_token),
                None,
            ),
            self.supabase.request(
                Method::GET,
                "/rest/v1/services?select=name,price",
                Some(auth_token),
                None,
            ),
        ).map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let catalog_prices: HashMap<String, i64> = catalog
            .into_iter()
            .map(|row| (row.name, row.price))
            .collect();

        let total_appointments = rows.len() as i64;
        let confirmed_appointments = rows.iter()
            .filter(|row| row.confirmed == ConfirmationStatus::Confirmed)
            .count() as i64;
        let pending_appointments = rows.iter()
            .filter(|row| row.confirmed == ConfirmationStatus::Pending)
            .count() as i64;

        let paid_rows: Vec<&StatsRow> = rows.iter()
            .filter(|row| row.status == AppointmentStatus::Paid)
            .collect();
        let paid_appointments = paid_rows.len() as i64;

        let total_revenue = paid_rows.iter()
            .map(|row| {
                row.price
                    .filter(|price| *price > 0)
                    .or_else(|| catalog_prices.get(&row.service).copied())
                    .unwrap_or(0)
            })
            .sum();

        Ok(AppointmentStats {
            total_appointments,
            confirmed_appointments,
            pending_appointments,
            paid_appointments,
            total_revenue,
        })
    }

    async fn get_service_by_name(
        &self,
        name: &str,
        auth_token: &str,
    ) -> Result<Service, AppointmentError> {
        let path = format!("/rest/v1/services?name=eq.{}", urlencoding::encode(name));

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::UnknownService(name.to_string()));
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse service: {}", e)))
    }

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        update: Value,
        owner: Option<&str>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let mut path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        if let Some(user_id) = owner {
            path.push_str(&format!("&user_id=eq.{}", user_id));
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(update),
            Some(headers),
        ).await.map_err(|e| {
            if e.downcast_ref::<DbConflict>().is_some() {
                AppointmentError::SlotUnavailable
            } else {
                AppointmentError::DatabaseError(e.to_string())
            }
        })?;

        if result.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse updated appointment: {}", e)))
    }
}

fn parse_confirmation(value: &str) -> Result<ConfirmationStatus, AppointmentError> {
    match value {
        "pending" => Ok(ConfirmationStatus::Pending),
        "confirmed" => Ok(ConfirmationStatus::Confirmed),
        "rejected" => Ok(ConfirmationStatus::Rejected),
        other => Err(AppointmentError::ValidationError(format!(
            "Unknown confirmation filter '{}'",
            other
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct StatsRow {
    service: String,
    price: Option<i64>,
    status: AppointmentStatus,
    confirmed: ConfirmationStatus,
}

#[derive(Debug, Deserialize)]
struct CatalogPrice {
    name: String,
    price: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_filter_accepts_known_values() {
        assert_eq!(parse_confirmation("pending").unwrap(), ConfirmationStatus::Pending);
        assert_eq!(parse_confirmation("confirmed").unwrap(), ConfirmationStatus::Confirmed);
        assert_eq!(parse_confirmation("rejected").unwrap(), ConfirmationStatus::Rejected);
        assert!(parse_confirmation("maybe").is_err());
    }

    #[test]
    fn status_parse_round_trips() {
        for status in [
            AppointmentStatus::Pending,
            AppointmentStatus::Paid,
            AppointmentStatus::Cancelled,
            AppointmentStatus::CashPending,
            AppointmentStatus::QrPending,
        ] {
            assert_eq!(AppointmentStatus::parse(&status.to_string()), Some(status));
        }
        assert_eq!(AppointmentStatus::parse("refunded"), None);
    }
}
