use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{
        CheckoutItem, CheckoutRequest, CheckoutResponse, CreateIntentResponse, OrderList,
        OrderWithItems,
    },
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    events::{ChangedEntity, EntityChange},
    middleware::auth::{AuthUser, ensure_capability},
    models::{
        Capability, DeliveryAddress, Order, OrderItem, OrderStatus, PaymentMethod, PaymentStatus,
    },
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Ok", OrderList { items: orders }, Some(meta)))
}

/// Create an order from the submitted item list. Unit prices always come
/// from the products table; client-side prices and totals are ignored.
pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<CheckoutResponse>> {
    ensure_capability(user, Capability::PlaceOrders)?;

    let CheckoutRequest {
        items,
        customer_name,
        payment_method,
        delivery_address,
    } = payload;

    if items.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }
    if customer_name.trim().is_empty() {
        return Err(AppError::BadRequest("customer_name is required".into()));
    }
    if payment_method == PaymentMethod::CashOnDelivery {
        match delivery_address.as_ref() {
            Some(address) if address.is_complete() => {}
            _ => {
                return Err(AppError::BadRequest(
                    "cash on delivery requires a complete delivery address".into(),
                ));
            }
        }
    }
    if payment_method == PaymentMethod::Online && state.payments.is_none() {
        return Err(AppError::BadRequest(
            "online payments are not configured".into(),
        ));
    }

    // Merge duplicate product lines before touching the database.
    let mut quantities: HashMap<Uuid, i32> = HashMap::new();
    for CheckoutItem { product_id, quantity } in &items {
        if *quantity < 1 {
            return Err(AppError::BadRequest(
                "item quantity must be at least 1".into(),
            ));
        }
        *quantities.entry(*product_id).or_insert(0) += quantity;
    }
    let product_ids: Vec<Uuid> = quantities.keys().copied().collect();

    let txn = state.orm.begin().await?;

    let products = Products::find()
        .filter(ProdCol::Id.is_in(product_ids.clone()))
        .lock(LockType::Update)
        .all(&txn)
        .await?;
    if products.len() != quantities.len() {
        return Err(AppError::NotFound);
    }

    let mut total_amount: i64 = 0;
    for product in &products {
        let quantity = quantities[&product.id];
        total_amount += product.price * (quantity as i64);
    }

    let payment_status = match payment_method {
        PaymentMethod::Online => PaymentStatus::PendingPayment,
        PaymentMethod::CashOnDelivery => PaymentStatus::CashOnDelivery,
    };

    let order_id = Uuid::new_v4();
    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.user_id),
        customer_name: Set(customer_name),
        total_amount: Set(total_amount),
        payment_method: Set(payment_method.as_str().into()),
        payment_status: Set(payment_status.as_str().into()),
        status: Set(OrderStatus::Pending.as_str().into()),
        payment_intent_id: Set(None),
        delivery_address: Set(delivery_address
            .as_ref()
            .map(|a| serde_json::to_value(a).unwrap_or_default())),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut order_items: Vec<OrderItem> = Vec::new();
    for product in &products {
        let quantity = quantities[&product.id];
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(product.id),
            quantity: Set(quantity),
            unit_price: Set(product.price),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        order_items.push(order_item_from_entity(item));
    }

    // Cash on delivery pays at the door, so the stock commit happens right
    // here; online orders wait for the paid webhook.
    let order = if payment_method == PaymentMethod::CashOnDelivery {
        let lines: Vec<(Uuid, i32)> = order_items
            .iter()
            .map(|i| (i.product_id, i.quantity))
            .collect();
        decrement_stock(&txn, &lines, &products).await?;

        let mut active: OrderActive = order.into();
        active.status = Set(OrderStatus::Confirmed.as_str().into());
        active.updated_at = Set(Utc::now().into());
        active.update(&txn).await?
    } else {
        order
    };

    // The cart rows behind the purchased products are gone after checkout.
    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .filter(CartCol::ProductId.is_in(product_ids))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    // The processor call happens outside the transaction; a failure leaves a
    // pending order the customer can retry.
    let (order, client_secret) = if payment_method == PaymentMethod::Online {
        let payments = state
            .payments
            .as_ref()
            .ok_or_else(|| AppError::BadRequest("online payments are not configured".into()))?;
        let email = user_email(state, user.user_id).await?;
        let intent = payments
            .create_payment_intent(order.id, total_amount, email.as_deref())
            .await?;

        let mut active: OrderActive = order.into();
        active.payment_intent_id = Set(Some(intent.id.clone()));
        active.updated_at = Set(Utc::now().into());
        let order = active.update(&state.orm).await?;
        (order, Some(intent.client_secret))
    } else {
        (order, None)
    };

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "checkout",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "total_amount": total_amount })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let order = order_from_entity(order);
    publish_order_change(state, &order);

    Ok(ApiResponse::success(
        "Checkout success",
        CheckoutResponse {
            order,
            items: order_items,
            client_secret,
        },
        Some(Meta::empty()),
    ))
}

/// Commit the stock decrement for an order: check every line against the
/// locked product rows, then decrement. Any shortfall aborts the whole
/// transaction; no line is decremented on failure. Already-confirmed orders
/// are left untouched, which makes the paid webhook retry-safe.
pub async fn confirm_order(state: &AppState, order_id: Uuid) -> AppResult<Order> {
    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(order_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let status = OrderStatus::parse(&order.status)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("invalid stored order status")))?;
    if status != OrderStatus::Pending {
        txn.commit().await?;
        return Ok(order_from_entity(order));
    }

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&txn)
        .await?;
    if items.is_empty() {
        return Err(AppError::BadRequest("No items found for this order".into()));
    }

    let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let products = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .lock(LockType::Update)
        .all(&txn)
        .await?;

    let lines: Vec<(Uuid, i32)> = items.iter().map(|i| (i.product_id, i.quantity)).collect();
    decrement_stock(&txn, &lines, &products).await?;

    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Confirmed.as_str().into());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    let order = order_from_entity(order);
    publish_order_change(state, &order);
    Ok(order)
}

/// Two-phase stock commit over already-locked product rows. The conditional
/// `stock_quantity >= qty` filter on the update is the final arbiter, so two
/// confirmations racing over the last unit can never both win.
async fn decrement_stock<C: ConnectionTrait>(
    txn: &C,
    lines: &[(Uuid, i32)],
    locked_products: &[ProductModel],
) -> AppResult<()> {
    let by_id: HashMap<Uuid, &ProductModel> =
        locked_products.iter().map(|p| (p.id, p)).collect();

    for (product_id, quantity) in lines {
        let product = by_id
            .get(product_id)
            .ok_or(AppError::NotFound)?;
        if product.stock_quantity < *quantity {
            return Err(AppError::Conflict(format!(
                "Insufficient stock for product {}",
                product.name
            )));
        }
    }

    for (product_id, quantity) in lines {
        let name = by_id
            .get(product_id)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        let result = Products::update_many()
            .col_expr(
                ProdCol::StockQuantity,
                Expr::col(ProdCol::StockQuantity).sub(*quantity),
            )
            .col_expr(ProdCol::UpdatedAt, Expr::value(Utc::now()))
            .filter(ProdCol::Id.eq(*product_id))
            .filter(ProdCol::StockQuantity.gte(*quantity))
            .exec(txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::Conflict(format!(
                "Insufficient stock for product {name}"
            )));
        }
    }

    Ok(())
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let mut condition = Condition::all().add(OrderCol::Id.eq(id));
    // Customers only see their own orders; staff see everything.
    if !user.is_staff() {
        condition = condition.add(OrderCol::UserId.eq(user.user_id));
    }

    let order = Orders::find().filter(condition).one(&state.orm).await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

/// Apply a verified webhook outcome. Success marks the order paid and
/// commits its stock; failure records payment_failed. Duplicates arrive
/// at-least-once and must stay retryable.
pub async fn apply_payment_outcome(
    state: &AppState,
    order_id: Uuid,
    intent_id: &str,
    succeeded: bool,
) -> AppResult<()> {
    let order = Orders::find_by_id(order_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if let Some(stored_intent) = order.payment_intent_id.as_deref() {
        if stored_intent != intent_id {
            return Err(AppError::BadRequest(
                "payment intent does not match order".into(),
            ));
        }
    }

    let target = if succeeded {
        PaymentStatus::Paid
    } else {
        PaymentStatus::PaymentFailed
    };
    let already_recorded = order.payment_status == target.as_str();
    if already_recorded && !succeeded {
        return Ok(());
    }

    let order = if already_recorded {
        order
    } else {
        let mut active: OrderActive = order.into();
        active.payment_status = Set(target.as_str().into());
        active.updated_at = Set(Utc::now().into());
        active.update(&state.orm).await?
    };

    // The stock commit can fail after the order is marked paid. Redelivered
    // success events must reach confirm_order again so the commit is retried;
    // confirm_order is a no-op once the order has left pending.
    let order = if succeeded {
        confirm_order(state, order.id).await?
    } else {
        let order = order_from_entity(order);
        publish_order_change(state, &order);
        order
    };

    if let Err(err) = log_audit(
        &state.pool,
        None,
        if succeeded { "payment_succeeded" } else { "payment_failed" },
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "intent_id": intent_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(())
}

/// Mint a fresh processor intent for an existing order so its owner can try
/// the payment again. Only online orders still awaiting payment qualify; the
/// previous intent id is replaced, so stale webhooks no longer match.
pub async fn create_payment_intent(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<CreateIntentResponse>> {
    ensure_capability(user, Capability::PlaceOrders)?;

    let order = Orders::find()
        .filter(OrderCol::Id.eq(order_id))
        .filter(OrderCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if order.payment_method != PaymentMethod::Online.as_str() {
        return Err(AppError::BadRequest(
            "order does not use online payment".into(),
        ));
    }
    match PaymentStatus::parse(&order.payment_status) {
        Some(PaymentStatus::PendingPayment | PaymentStatus::PaymentFailed) => {}
        _ => {
            return Err(AppError::Conflict("Order is not awaiting payment".into()));
        }
    }

    let payments = state
        .payments
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("online payments are not configured".into()))?;
    let email = user_email(state, user.user_id).await?;
    let intent = payments
        .create_payment_intent(order.id, order.total_amount, email.as_deref())
        .await?;

    let mut active: OrderActive = order.into();
    active.payment_intent_id = Set(Some(intent.id.clone()));
    active.payment_status = Set(PaymentStatus::PendingPayment.as_str().into());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "payment_retry",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "intent_id": intent.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Payment intent created",
        CreateIntentResponse {
            order_id: order.id,
            client_secret: intent.client_secret,
        },
        Some(Meta::empty()),
    ))
}

async fn user_email(state: &AppState, user_id: Uuid) -> AppResult<Option<String>> {
    let user = Users::find_by_id(user_id).one(&state.orm).await?;
    Ok(user.map(|u| u.email))
}

pub(crate) fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        user_id: model.user_id,
        customer_name: model.customer_name,
        total_amount: model.total_amount,
        payment_method: PaymentMethod::parse(&model.payment_method)
            .unwrap_or(PaymentMethod::CashOnDelivery),
        payment_status: PaymentStatus::parse(&model.payment_status)
            .unwrap_or(PaymentStatus::PendingPayment),
        status: OrderStatus::parse(&model.status).unwrap_or(OrderStatus::Pending),
        payment_intent_id: model.payment_intent_id,
        delivery_address: model
            .delivery_address
            .and_then(|v| serde_json::from_value::<DeliveryAddress>(v).ok()),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

pub(crate) fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        quantity: model.quantity,
        unit_price: model.unit_price,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

pub(crate) fn publish_order_change(state: &AppState, order: &Order) {
    state.events.publish(EntityChange {
        entity: ChangedEntity::Order,
        id: order.id,
        user_id: Some(order.user_id),
        row: serde_json::to_value(order).unwrap_or_default(),
    });
}
