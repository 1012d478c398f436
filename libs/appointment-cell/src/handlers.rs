// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, BookAppointmentRequest, CheckAvailabilityRequest,
    ConfirmAppointmentRequest, UpdateAppointmentRequest, UpdateStatusRequest,
};
use crate::services::booking::{AppointmentBookingService, AppointmentListQuery};

#[axum::debug_handler]
pub async fn check_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Json(request): Json<CheckAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let booking_service = AppointmentBookingService::new(&state);

    let available = booking_service
        .check_availability(request.service.as_deref(), request.date, token)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "available": available
    })))
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let token = auth.token();

    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service
        .book_appointment(request, &user.id, token)
        .await
        .map_err(|e| match e {
            AppointmentError::ValidationError(msg) => AppError::BadRequest(msg),
            AppointmentError::UnknownService(_) => AppError::BadRequest(e.to_string()),
            AppointmentError::SlotUnavailable => AppError::Conflict(e.to_string()),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": appointment
        })),
    ))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);

    let owner = if user.role.as_deref() == Some("admin") {
        None
    } else {
        Some(user.id.as_str())
    };

    let booking_service = AppointmentBookingService::new(&state);

    let (appointments, total) = booking_service
        .list_appointments(query, owner, token)
        .await
        .map_err(|e| match e {
            AppointmentError::InvalidStatus(_) => AppError::BadRequest(e.to_string()),
            AppointmentError::ValidationError(msg) => AppError::BadRequest(msg),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "data": appointments,
        "total": total,
        "page": page,
        "limit": limit
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let owner = if user.role.as_deref() == Some("admin") {
        None
    } else {
        Some(user.id.as_str())
    };

    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service
        .get_appointment(appointment_id, owner, token)
        .await
        .map_err(|e| match e {
            AppointmentError::NotFound => AppError::NotFound(e.to_string()),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "data": appointment
    })))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if user.role.as_deref() != Some("admin") {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service
        .update_appointment(appointment_id, request, token)
        .await
        .map_err(|e| match e {
            AppointmentError::NotFound => AppError::NotFound(e.to_string()),
            AppointmentError::ValidationError(msg) => AppError::BadRequest(msg),
            AppointmentError::SlotUnavailable => AppError::Conflict(e.to_string()),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "data": appointment
    })))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let owner = if user.role.as_deref() == Some("admin") {
        None
    } else {
        Some(user.id.as_str())
    };

    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service
        .update_status(appointment_id, &request.status, owner, token)
        .await
        .map_err(|e| match e {
            AppointmentError::NotFound => AppError::NotFound(e.to_string()),
            AppointmentError::InvalidStatus(_) => AppError::BadRequest(e.to_string()),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "data": appointment
    })))
}

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<ConfirmAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if user.role.as_deref() != Some("admin") {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service
        .confirm_appointment(appointment_id, &request.confirmed, token)
        .await
        .map_err(|e| match e {
            AppointmentError::NotFound => AppError::NotFound(e.to_string()),
            AppointmentError::ValidationError(msg) => AppError::BadRequest(msg),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "data": appointment
    })))
}

#[axum::debug_handler]
pub async fn confirm_cash_payment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if user.role.as_deref() != Some("admin") {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service
        .confirm_cash_payment(appointment_id, token)
        .await
        .map_err(|e| match e {
            AppointmentError::NotFound => AppError::NotFound(e.to_string()),
            AppointmentError::NotAwaitingCash => AppError::Conflict(e.to_string()),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "data": appointment,
        "message": "Cash payment confirmed"
    })))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let owner = if user.role.as_deref() == Some("admin") {
        None
    } else {
        Some(user.id.as_str())
    };

    let booking_service = AppointmentBookingService::new(&state);

    booking_service
        .delete_appointment(appointment_id, owner, token)
        .await
        .map_err(|e| match e {
            AppointmentError::NotFound => AppError::NotFound(e.to_string()),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment deleted"
    })))
}

#[axum::debug_handler]
pub async fn get_appointment_stats(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if user.role.as_deref() != Some("admin") {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    let booking_service = AppointmentBookingService::new(&state);

    let stats = booking_service
        .get_appointment_stats(token)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "data": stats
    })))
}
