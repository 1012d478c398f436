// libs/appointment-cell/src/services/availability.rs
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use std::sync::Arc;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, BOOKING_WINDOW_MINUTES};

pub struct AvailabilityService {
    supabase: Arc<SupabaseClient>,
}

impl AvailabilityService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Checks whether a booking starting at `start` would collide with an
    /// existing appointment. Scoped to one service when given; the whole
    /// calendar otherwise. Cancelled appointments never block a slot.
    pub async fn is_slot_available(
        &self,
        service: Option<&str>,
        start: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        debug!("Checking availability for service {:?} at {}", service, start);

        let candidates = self
            .get_appointments_around(service, start, auth_token)
            .await?;

        let slot_end = start + Duration::minutes(BOOKING_WINDOW_MINUTES);

        let conflict = candidates.iter().any(|apt| {
            apt.status.blocks_slot()
                && slots_overlap(start, slot_end, apt.date, apt.window_end())
        });

        if conflict {
            warn!("Slot at {} for service {:?} is taken", start, service);
        }

        Ok(!conflict)
    }

    /// Fetches appointments whose window could overlap a booking at `start`.
    /// Any appointment starting within one window length on either side
    /// qualifies, exclusive at both ends.
    async fn get_appointments_around(
        &self,
        service: Option<&str>,
        start: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let window_start = start - Duration::minutes(BOOKING_WINDOW_MINUTES);
        let window_end = start + Duration::minutes(BOOKING_WINDOW_MINUTES);

        let mut query_parts = vec![
            format!("date=gt.{}", urlencoding::encode(&window_start.to_rfc3339())),
            format!("date=lt.{}", urlencoding::encode(&window_end.to_rfc3339())),
        ];
        if let Some(service) = service {
            query_parts.push(format!("service=eq.{}", urlencoding::encode(service)));
        }

        let path = format!(
            "/rest/v1/appointments?{}&order=date.asc",
            query_parts.join("&")
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointments: Vec<Appointment> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e)))?;

        Ok(appointments)
    }
}

/// Two slots overlap if: start1 < end2 AND start2 < end1.
pub fn slots_overlap(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && start2 < end1
}
