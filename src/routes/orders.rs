use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
};
use futures::Stream;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use uuid::Uuid;

use crate::{
    dto::orders::{
        CheckoutRequest, CheckoutResponse, ConfirmOrderRequest, OrderList, OrderWithItems,
    },
    error::AppResult,
    events::ChangedEntity,
    middleware::auth::{AuthUser, ensure_capability},
    models::{Capability, Order},
    response::{ApiResponse, Meta},
    routes::params::OrderListQuery,
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/", post(checkout))
        .route("/confirm", post(confirm_order))
        .route("/stream", get(stream_changes))
        .route("/{id}", get(get_order))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "Filter by order status"),
    ),
    responses(
        (status = 200, description = "Current user's orders", body = ApiResponse<OrderList>),
        (status = 401, description = "Not authenticated"),
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = order_service::list_orders(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Order placed; online payments return a client secret", body = ApiResponse<CheckoutResponse>),
        (status = 400, description = "Empty order or incomplete delivery address"),
        (status = 409, description = "Insufficient stock"),
    ),
    tag = "Orders"
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<Json<ApiResponse<CheckoutResponse>>> {
    let resp = order_service::checkout(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/orders/confirm",
    request_body = ConfirmOrderRequest,
    responses(
        (status = 200, description = "Order confirmed and stock committed", body = ApiResponse<Order>),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Insufficient stock"),
    ),
    tag = "Orders"
)]
pub async fn confirm_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ConfirmOrderRequest>,
) -> AppResult<Json<ApiResponse<Order>>> {
    ensure_capability(&user, Capability::ConfirmOrders)?;
    let order = order_service::confirm_order(&state, payload.order_id).await?;
    Ok(Json(ApiResponse::success(
        "Order confirmed",
        order,
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    get,
    path = "/api/orders/stream",
    responses(
        (status = 200, description = "SSE stream of order and product changes"),
        (status = 401, description = "Not authenticated"),
    ),
    tag = "Orders"
)]
pub async fn stream_changes(
    State(state): State<AppState>,
    user: AuthUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();
    let staff = user.is_staff();
    let user_id = user.user_id;

    let stream = BroadcastStream::new(rx).filter_map(move |item| match item {
        Ok(change) => {
            // Customers only see their own orders; product changes are public.
            if !staff
                && change.entity == ChangedEntity::Order
                && change.user_id != Some(user_id)
            {
                return None;
            }
            let name = match change.entity {
                ChangedEntity::Order => "order",
                ChangedEntity::Product => "product",
            };
            let event = Event::default().event(name).json_data(&change).ok()?;
            Some(Ok(event))
        }
        // A lagged receiver skips messages; every event carries a full
        // snapshot, so the next one catches the client up.
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Order with items", body = ApiResponse<OrderWithItems>),
        (status = 404, description = "Order not found"),
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::get_order(&state, &user, id).await?;
    Ok(Json(resp))
}
