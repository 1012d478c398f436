// libs/payment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query, State},
    http::HeaderMap,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    CheckoutOutcome, CreatePaymentIntentRequest, CreateQrRequest, PaymentError,
    PaymentHistoryQuery,
};
use crate::services::checkout::CheckoutService;
use crate::services::reconcile::ReconcileService;

#[axum::debug_handler]
pub async fn create_payment_intent(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreatePaymentIntentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let checkout_service = CheckoutService::new(&state);

    let outcome = checkout_service
        .create_payment_intent(request, &user.id, token)
        .await
        .map_err(|e| match e {
            PaymentError::ValidationError(msg) => AppError::BadRequest(msg),
            PaymentError::InvalidAmount => AppError::BadRequest(e.to_string()),
            PaymentError::BelowMinimum => AppError::BadRequest(e.to_string()),
            PaymentError::AppointmentNotFound => AppError::NotFound(e.to_string()),
            PaymentError::AlreadyPaid => AppError::Conflict(e.to_string()),
            PaymentError::DuplicatePayment => AppError::Conflict(e.to_string()),
            PaymentError::StripeApi(msg) => AppError::ExternalService(msg),
            _ => AppError::Internal(e.to_string()),
        })?;

    match outcome {
        CheckoutOutcome::CashAtSalon => Ok(Json(json!({
            "success": true,
            "message": "Vui lòng thanh toán tiền mặt tại salon"
        }))),
        CheckoutOutcome::Online {
            client_secret,
            payment_id,
        } => Ok(Json(json!({
            "success": true,
            "client_secret": client_secret,
            "payment_id": payment_id
        }))),
    }
}

#[axum::debug_handler]
pub async fn create_qr_payment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateQrRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let checkout_service = CheckoutService::new(&state);

    let checkout = checkout_service
        .create_qr_payment(request, &user.id, token)
        .await
        .map_err(|e| match e {
            PaymentError::ValidationError(msg) => AppError::BadRequest(msg),
            PaymentError::InvalidAmount => AppError::BadRequest(e.to_string()),
            PaymentError::BelowMinimum => AppError::BadRequest(e.to_string()),
            PaymentError::AppointmentNotFound => AppError::NotFound(e.to_string()),
            PaymentError::AlreadyPaid => AppError::Conflict(e.to_string()),
            PaymentError::DuplicatePayment => AppError::Conflict(e.to_string()),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "qr_code": checkout.qr_code,
        "payment_id": checkout.payment_id,
        "transaction_id": checkout.transaction_id,
        "expires_at": checkout.expires_at,
        "message": "Quét mã QR để thanh toán"
    })))
}

#[axum::debug_handler]
pub async fn get_payment_status(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(payment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let owner = if user.role.as_deref() == Some("admin") {
        None
    } else {
        Some(user.id.as_str())
    };

    let checkout_service = CheckoutService::new(&state);

    let payment = checkout_service
        .get_payment_status(&payment_id, owner, token)
        .await
        .map_err(|e| match e {
            PaymentError::NotFound => AppError::NotFound(e.to_string()),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "data": payment
    })))
}

#[axum::debug_handler]
pub async fn get_payment_history(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<PaymentHistoryQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);

    let checkout_service = CheckoutService::new(&state);

    let (payments, total) = checkout_service
        .get_payment_history(&user.id, query.page, query.limit, token)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "data": payments,
        "total": total,
        "page": page,
        "limit": limit
    })))
}

#[axum::debug_handler]
pub async fn confirm_qr_payment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(payment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if user.role.as_deref() != Some("admin") {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    let reconcile_service = ReconcileService::new(&state);

    let payment = reconcile_service
        .confirm_qr_payment(&payment_id, token)
        .await
        .map_err(|e| match e {
            PaymentError::NotFound => AppError::NotFound(e.to_string()),
            PaymentError::NotPending => AppError::Conflict(e.to_string()),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "data": payment,
        "message": "Payment confirmed"
    })))
}

/// Stripe calls this unauthenticated; trust comes from the signature header.
#[axum::debug_handler]
pub async fn stripe_webhook(
    State(state): State<Arc<AppConfig>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing stripe-signature header".to_string()))?;

    let reconcile_service = ReconcileService::new(&state);

    reconcile_service
        .handle_stripe_event(&body, signature)
        .await
        .map_err(|e| match e {
            PaymentError::InvalidSignature => AppError::BadRequest(e.to_string()),
            PaymentError::ValidationError(msg) => AppError::BadRequest(msg),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({ "received": true })))
}

/// Bank-transfer callback; the hex HMAC in x-webhook-signature gates it.
#[axum::debug_handler]
pub async fn qr_webhook(
    State(state): State<Arc<AppConfig>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get("x-webhook-signature")
        .and_then(|v| v.to_str().ok());

    let reconcile_service = ReconcileService::new(&state);

    reconcile_service
        .handle_qr_event(&body, signature)
        .await
        .map_err(|e| match e {
            PaymentError::InvalidSignature => AppError::Auth(e.to_string()),
            PaymentError::AmountMismatch => AppError::BadRequest(e.to_string()),
            PaymentError::ValidationError(msg) => AppError::BadRequest(msg),
            PaymentError::NotFound => AppError::NotFound(e.to_string()),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({ "received": true })))
}
