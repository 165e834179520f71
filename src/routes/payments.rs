use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    routing::post,
};

use crate::{
    dto::orders::{CreateIntentRequest, CreateIntentResponse},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    payments::WebhookEvent,
    response::{ApiResponse, Meta},
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/create-intent", post(create_intent))
}

/// Retry path for online orders: mints a new intent for an order the
/// customer still owes, e.g. after a failed or abandoned payment.
#[utoipa::path(
    post,
    path = "/api/payments/create-intent",
    request_body = CreateIntentRequest,
    responses(
        (status = 200, description = "New client secret for the order", body = ApiResponse<CreateIntentResponse>),
        (status = 400, description = "Order does not use online payment"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order is not awaiting payment"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_intent(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateIntentRequest>,
) -> AppResult<Json<ApiResponse<CreateIntentResponse>>> {
    let resp = order_service::create_payment_intent(&state, &user, payload.order_id).await?;
    Ok(Json(resp))
}

/// Payment processor callback. The signature is checked against the raw
/// request body before anything is parsed.
#[utoipa::path(
    post,
    path = "/api/payments/webhook",
    responses(
        (status = 200, description = "Event acknowledged"),
        (status = 400, description = "Bad signature or malformed event"),
    ),
    tag = "Payments"
)]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let client = state
        .payments
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("payments are not configured".into()))?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("missing Stripe-Signature header".into()))?;

    client.verify_webhook(body.as_bytes(), signature)?;

    let event: WebhookEvent = serde_json::from_str(&body)
        .map_err(|_| AppError::BadRequest("malformed webhook payload".into()))?;

    match event.event_type.as_str() {
        "payment_intent.succeeded" | "payment_intent.payment_failed" => {
            let order_id = event
                .data
                .object
                .order_id()
                .ok_or_else(|| AppError::BadRequest("event has no order_id metadata".into()))?;
            let succeeded = event.event_type == "payment_intent.succeeded";
            order_service::apply_payment_outcome(&state, order_id, &event.data.object.id, succeeded)
                .await?;
        }
        other => {
            tracing::debug!(event_type = %other, "ignoring webhook event");
        }
    }

    Ok(Json(ApiResponse::success(
        "Event received",
        serde_json::json!({ "received": true }),
        Some(Meta::empty()),
    )))
}
