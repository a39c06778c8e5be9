//! # Request Handlers
//!
//! Axum request handlers for the auth and payment API.

use crate::auth::AuthUser;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use toll_core::{CoreError, Currency, OrderStatus, RawHeaders, Subject};
use tracing::{error, info, instrument};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Send an OTP to a contact identifier
#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    /// Email address or phone number
    pub target: String,
}

/// Verify an OTP and log in
#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub target: String,
    pub code: String,
}

/// Static credential login (superadmin)
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Successful login response
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub user: Subject,
}

/// Create order request
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// Amount in major units (e.g. 99.50)
    pub amount: f64,
    /// ISO currency code (optional, defaults to CNY)
    #[serde(default)]
    pub currency: Option<String>,
    /// Human-readable description (optional)
    #[serde(default)]
    pub description: Option<String>,
    /// Gateway name ("wechat", "alipay", "mock")
    pub payment_method: String,
}

/// Create order response
#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_method: String,
    /// Gateway-specific payment initiation data (QR code URL, etc.)
    pub payment_data: serde_json::Value,
    pub created_at: String,
}

/// Refund request
#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub order_id: String,
    /// Amount in major units; omitted means full refund
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Refund response
#[derive(Debug, Serialize)]
pub struct RefundResponse {
    pub success: bool,
    pub refund_id: String,
    pub amount: f64,
    pub order_id: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }
}

fn core_error_to_response(err: CoreError) -> (StatusCode, Json<ErrorResponse>) {
    let code = err.status_code();
    // 401/403 bodies stay generic; the reason is for the logs.
    let message = match code {
        401 => "Unauthorized".to_string(),
        403 => "Forbidden".to_string(),
        _ => err.to_string(),
    };
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(ErrorResponse::new(message, code)),
    )
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "tollgate",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Issue a login challenge. The code travels out of band only; the
/// response never echoes it.
#[instrument(skip(state, request), fields(target = %request.target))]
pub async fn send_otp(
    State(state): State<AppState>,
    Json(request): Json<SendOtpRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    state
        .otp
        .issue(&request.target)
        .await
        .map_err(core_error_to_response)?;

    Ok(Json(serde_json::json!({ "success": true })))
}

/// Verify a login challenge and mint a bearer credential.
#[instrument(skip(state, request), fields(target = %request.target))]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(request): Json<VerifyOtpRequest>,
) -> Result<Json<TokenResponse>, (StatusCode, Json<ErrorResponse>)> {
    let subject = state
        .otp
        .verify(&request.target, &request.code)
        .map_err(core_error_to_response)?;

    let token = state.tokens.sign(&subject).map_err(core_error_to_response)?;

    info!(user = %subject.id, "login via one-time code");
    Ok(Json(TokenResponse {
        token,
        user: subject,
    }))
}

/// Static superadmin login.
#[instrument(skip(state, request), fields(username = %request.username))]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, (StatusCode, Json<ErrorResponse>)> {
    let valid = match (
        &state.config.superadmin_user,
        &state.config.superadmin_pass,
    ) {
        (Some(user), Some(pass)) => request.username == *user && request.password == *pass,
        _ => false,
    };

    if !valid {
        return Err(core_error_to_response(CoreError::InvalidCredentials));
    }

    let subject = Subject::admin("superadmin", &request.username);
    let token = state.tokens.sign(&subject).map_err(core_error_to_response)?;

    info!("superadmin login");
    Ok(Json(TokenResponse {
        token,
        user: subject,
    }))
}

/// Return the authenticated caller.
pub async fn me(AuthUser(subject): AuthUser) -> impl IntoResponse {
    Json(serde_json::json!({ "user": subject }))
}

/// Logout acknowledgment. Credentials are stateless; the client discards
/// its copy and the credential dies at its expiry.
pub async fn logout(AuthUser(_subject): AuthUser) -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

/// Create an order and initiate payment with its gateway.
#[instrument(skip(state, request), fields(user = %user.0.id, gateway = %request.payment_method))]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, (StatusCode, Json<ErrorResponse>)> {
    let currency = match &request.currency {
        Some(code) => Currency::from_code(code).ok_or_else(|| {
            core_error_to_response(CoreError::UnsupportedCurrency {
                currency: code.clone(),
            })
        })?,
        None => Currency::default(),
    };

    let amount = currency.to_minor_units(request.amount);
    let description = request.description.as_deref().unwrap_or("Payment");

    let (order, init) = state
        .ledger
        .create(&user.0.id, amount, currency, description, &request.payment_method)
        .await
        .map_err(|e| {
            error!("Failed to create order: {e}");
            core_error_to_response(e)
        })?;

    info!(order_id = %order.id, "order created");
    Ok(Json(CreateOrderResponse {
        order_id: order.id.clone(),
        amount: order.amount_decimal(),
        currency: order.currency.as_str().to_string(),
        status: order.status,
        payment_method: order.gateway.clone(),
        payment_data: init.init_data,
        created_at: order.created_at.to_rfc3339(),
    }))
}

/// Fetch an order for its owner or an admin.
pub async fn order_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let order = state
        .ledger
        .get_status(&order_id, &user.0)
        .map_err(core_error_to_response)?;

    Ok(Json(order))
}

/// Refund a paid order, fully or partially.
#[instrument(skip(state, request, user), fields(order_id = %request.order_id, user = %user.0.id))]
pub async fn refund(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<RefundRequest>,
) -> Result<Json<RefundResponse>, (StatusCode, Json<ErrorResponse>)> {
    // Fetch first: the ownership check runs here too, and the order's
    // currency is needed to interpret a partial amount.
    let order = state
        .ledger
        .get_status(&request.order_id, &user.0)
        .map_err(core_error_to_response)?;

    let amount = request.amount.map(|a| order.currency.to_minor_units(a));

    let receipt = state
        .ledger
        .refund(&request.order_id, &user.0, amount, request.reason)
        .await
        .map_err(|e| {
            error!("Refund failed: {e}");
            core_error_to_response(e)
        })?;

    Ok(Json(RefundResponse {
        success: true,
        refund_id: receipt.refund_id,
        amount: order.currency.from_minor_units(receipt.amount),
        order_id: receipt.order_id,
    }))
}

/// Handle an inbound payment notification for a named gateway. The body
/// must stay raw bytes: signature schemes cover the exact payload.
#[instrument(skip(state, headers, body), fields(gateway = %gateway, bytes = body.len()))]
pub async fn gateway_notify(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let raw = lowercase_headers(&headers);
    let ack = state.dispatcher.dispatch(&gateway, &body, &raw).await;

    (
        StatusCode::from_u16(ack.status).unwrap_or(StatusCode::OK),
        [(header::CONTENT_TYPE, ack.content_type)],
        ack.body,
    )
        .into_response()
}

fn lowercase_headers(headers: &HeaderMap) -> RawHeaders {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response() {
        let err = ErrorResponse::new("Test error", 400);
        assert_eq!(err.error, "Test error");
        assert_eq!(err.code, 400);
    }

    #[test]
    fn test_core_error_conversion() {
        let err = CoreError::InvalidAmount("bad".to_string());
        let (status, _json) = core_error_to_response(err);
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_auth_errors_stay_generic() {
        let (status, Json(body)) = core_error_to_response(CoreError::InvalidCredentials);
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.error, "Unauthorized");

        let (status, Json(body)) = core_error_to_response(CoreError::Forbidden);
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.error, "Forbidden");
    }

    #[test]
    fn test_lowercase_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Custom-Header", "value".parse().unwrap());
        let raw = lowercase_headers(&headers);
        assert_eq!(raw.get("x-custom-header").map(String::as_str), Some("value"));
    }
}
