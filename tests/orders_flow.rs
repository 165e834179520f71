use pedido_express_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::{
        cart::AddToCartRequest,
        orders::{CheckoutItem, CheckoutRequest, UpdateOrderStatusRequest},
        reviews::CreateReviewRequest,
    },
    entity::{
        order_items::ActiveModel as OrderItemActive, orders::ActiveModel as OrderActive,
        products::ActiveModel as ProductActive, users::ActiveModel as UserActive,
    },
    error::AppError,
    events::{ChangedEntity, EventBus},
    middleware::auth::AuthUser,
    models::{DeliveryAddress, OrderStatus, PaymentMethod, PaymentStatus, Role},
    routes::params::{LowStockQuery, Pagination},
    services::{admin_service, cart_service, order_service, product_service, review_service},
    services::report_service::{self, ReportRange},
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

// Integration flow: customer fills a cart -> cash-on-delivery checkout commits
// stock -> staff advances the order -> review -> report and low stock.
#[tokio::test]
async fn cod_checkout_review_and_report_flow() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let customer_id = create_user(&state, "customer", "customer").await?;
    let admin_id = create_user(&state, "admin", "admin").await?;

    let product = create_product(&state, "X-Burger", 2500, 10).await?;

    let customer = AuthUser {
        user_id: customer_id,
        role: Role::Customer,
    };
    let admin = AuthUser {
        user_id: admin_id,
        role: Role::Admin,
    };

    // An unknown product is a missing resource, not a malformed request.
    let missing = cart_service::add_to_cart(
        &state.pool,
        &customer,
        AddToCartRequest {
            product_id: Uuid::new_v4(),
            quantity: 1,
            observation: None,
        },
    )
    .await;
    assert!(matches!(missing, Err(AppError::NotFound)));

    // Adding the same product twice accumulates quantity on one line.
    for quantity in [1, 2] {
        cart_service::add_to_cart(
            &state.pool,
            &customer,
            AddToCartRequest {
                product_id: product.id,
                quantity,
                observation: None,
            },
        )
        .await?;
    }
    let cart = cart_service::list_cart(&state.pool, &customer, Pagination::default()).await?;
    let cart_items = cart.data.expect("cart data").items;
    assert_eq!(cart_items.len(), 1);
    assert_eq!(cart_items[0].quantity, 3);

    // Staff accounts cannot place orders.
    let staff_checkout = order_service::checkout(
        &state,
        &admin,
        CheckoutRequest {
            items: vec![CheckoutItem {
                product_id: product.id,
                quantity: 1,
            }],
            customer_name: "Staff".into(),
            payment_method: PaymentMethod::CashOnDelivery,
            delivery_address: Some(address()),
        },
    )
    .await;
    assert!(matches!(staff_checkout, Err(AppError::Forbidden)));

    // Cash on delivery commits stock inside the checkout transaction.
    let checkout_resp = order_service::checkout(
        &state,
        &customer,
        CheckoutRequest {
            items: vec![CheckoutItem {
                product_id: product.id,
                quantity: 3,
            }],
            customer_name: "Maria Souza".into(),
            payment_method: PaymentMethod::CashOnDelivery,
            delivery_address: Some(address()),
        },
    )
    .await?;
    let placed = checkout_resp.data.expect("checkout data");
    assert_eq!(placed.order.total_amount, 7500);
    assert_eq!(placed.order.status, OrderStatus::Confirmed);
    assert_eq!(placed.order.payment_status, PaymentStatus::CashOnDelivery);
    assert!(placed.client_secret.is_none());

    let after = product_service::get_product(&state, product.id).await?;
    assert_eq!(after.data.expect("product data").stock_quantity, 7);

    // Purchased lines are removed from the cart.
    let cart = cart_service::list_cart(&state.pool, &customer, Pagination::default()).await?;
    assert!(cart.data.expect("cart data").items.is_empty());

    // A cash order has nothing to retry online.
    let retry = order_service::create_payment_intent(&state, &customer, placed.order.id).await;
    assert!(matches!(retry, Err(AppError::BadRequest(_))));

    // Staff advance without an explicit target goes to the next state.
    let mut rx = state.events.subscribe();
    let updated = admin_service::update_order_status(
        &state,
        &admin,
        placed.order.id,
        UpdateOrderStatusRequest { status: None },
    )
    .await?;
    assert_eq!(updated.data.expect("order data").status, OrderStatus::Preparing);

    let change = rx.try_recv().expect("status change event");
    assert_eq!(change.entity, ChangedEntity::Order);
    assert_eq!(change.id, placed.order.id);
    assert_eq!(change.user_id, Some(customer_id));

    // Reviews belong to the order's owner: staff and other customers get 403.
    let staff_review = review_service::create_review(
        &state.pool,
        &admin,
        CreateReviewRequest {
            order_id: placed.order.id,
            rating: 5,
            comment: None,
        },
    )
    .await;
    assert!(matches!(staff_review, Err(AppError::Forbidden)));

    let stranger = AuthUser {
        user_id: create_user(&state, "customer", "stranger").await?,
        role: Role::Customer,
    };
    let stranger_review = review_service::create_review(
        &state.pool,
        &stranger,
        CreateReviewRequest {
            order_id: placed.order.id,
            rating: 1,
            comment: None,
        },
    )
    .await;
    assert!(matches!(stranger_review, Err(AppError::Forbidden)));

    // One review per order.
    review_service::create_review(
        &state.pool,
        &customer,
        CreateReviewRequest {
            order_id: placed.order.id,
            rating: 5,
            comment: Some("Muito bom".into()),
        },
    )
    .await?;
    let duplicate = review_service::create_review(
        &state.pool,
        &customer,
        CreateReviewRequest {
            order_id: placed.order.id,
            rating: 4,
            comment: None,
        },
    )
    .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    // Report groups by product and carries the review rating.
    let range = ReportRange::parse(None, None)?;
    let rows = report_service::fetch_report(&state.pool, range, None).await?;
    let row = rows
        .iter()
        .find(|r| r.product_id == product.id)
        .expect("report row for product");
    assert_eq!(row.total_sales, 3);
    assert_eq!(row.total_revenue, 7500);
    assert_eq!(row.avg_rating, 5.0);

    // Low stock should include the product after stock decreased to 7.
    let low = admin_service::list_low_stock(
        &state,
        &admin,
        LowStockQuery {
            pagination: Pagination {
                page: Some(1),
                per_page: Some(20),
            },
            threshold: Some(8),
        },
    )
    .await?;
    assert!(
        low.data
            .expect("low stock data")
            .items
            .iter()
            .any(|p| p.id == product.id),
        "expected product to appear in low-stock list"
    );

    // Restock so this run's rows drop out of future low-stock queries.
    admin_service::adjust_inventory(&state, &admin, product.id, 10).await?;

    // Removing a product notifies subscribers too.
    let retired = create_product(&state, "Pudim", 1200, 4).await?;
    let mut rx = state.events.subscribe();
    product_service::delete_product(&state, &admin, retired.id).await?;
    let change = rx.try_recv().expect("delete event");
    assert_eq!(change.entity, ChangedEntity::Product);
    assert_eq!(change.id, retired.id);

    Ok(())
}

// A paid webhook whose stock commit fails must stay retryable: the processor
// redelivers the event until the commit lands, and every redelivery has to
// reach the commit instead of being swallowed as a duplicate.
#[tokio::test]
async fn paid_webhook_redelivery_retries_stock_commit() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let customer_id = create_user(&state, "customer", "online-customer").await?;
    let admin_id = create_user(&state, "admin", "online-admin").await?;
    let customer = AuthUser {
        user_id: customer_id,
        role: Role::Customer,
    };
    let admin = AuthUser {
        user_id: admin_id,
        role: Role::Admin,
    };

    // An online order awaiting payment for more units than are in stock.
    let product = create_product(&state, "X-Bacon", 2500, 1).await?;
    let intent_id = format!("pi_{}", Uuid::new_v4().simple());
    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(customer_id),
        customer_name: Set("Maria Souza".into()),
        total_amount: Set(12_500),
        payment_method: Set(PaymentMethod::Online.as_str().into()),
        payment_status: Set(PaymentStatus::PendingPayment.as_str().into()),
        status: Set(OrderStatus::Pending.as_str().into()),
        payment_intent_id: Set(Some(intent_id.clone())),
        delivery_address: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    OrderItemActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        product_id: Set(product.id),
        quantity: Set(5),
        unit_price: Set(2500),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    // First delivery marks the order paid but the stock commit fails.
    let first = order_service::apply_payment_outcome(&state, order.id, &intent_id, true).await;
    assert!(matches!(first, Err(AppError::Conflict(_))));

    let stored = order_service::get_order(&state, &customer, order.id).await?;
    let stored = stored.data.expect("order data").order;
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert_eq!(stored.status, OrderStatus::Pending);

    // The redelivery must retry the commit, not acknowledge the duplicate.
    let redelivered =
        order_service::apply_payment_outcome(&state, order.id, &intent_id, true).await;
    assert!(matches!(redelivered, Err(AppError::Conflict(_))));

    // Once stock is back the next redelivery confirms the order.
    admin_service::adjust_inventory(&state, &admin, product.id, 4).await?;
    order_service::apply_payment_outcome(&state, order.id, &intent_id, true).await?;

    let stored = order_service::get_order(&state, &customer, order.id).await?;
    let stored = stored.data.expect("order data").order;
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert_eq!(stored.status, OrderStatus::Confirmed);
    let after = product_service::get_product(&state, product.id).await?;
    assert_eq!(after.data.expect("product data").stock_quantity, 0);

    // A settled order can no longer mint a retry intent, and other
    // customers never see it.
    let settled = order_service::create_payment_intent(&state, &customer, order.id).await;
    assert!(matches!(settled, Err(AppError::Conflict(_))));

    let stranger = AuthUser {
        user_id: create_user(&state, "customer", "online-stranger").await?,
        role: Role::Customer,
    };
    let unseen = order_service::create_payment_intent(&state, &stranger, order.id).await;
    assert!(matches!(unseen, Err(AppError::NotFound)));

    // Restock so this run's rows drop out of future low-stock queries.
    admin_service::adjust_inventory(&state, &admin, product.id, 100).await?;

    Ok(())
}

/// Tests share one database, so rows are namespaced with fresh UUIDs and
/// unique names instead of truncating between runs. Returns None when no DB
/// is configured in the environment.
async fn setup_state() -> anyhow::Result<Option<AppState>> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(None);
        }
    };

    let pool = create_pool(&database_url).await?;
    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;

    Ok(Some(AppState {
        pool,
        orm,
        events: EventBus::default(),
        payments: None,
    }))
}

fn address() -> DeliveryAddress {
    DeliveryAddress {
        street: "Rua das Flores".into(),
        number: "123".into(),
        complement: None,
        city: "Sao Paulo".into(),
        state: "SP".into(),
        postal_code: "01000-000".into(),
    }
}

async fn create_user(state: &AppState, role: &str, label: &str) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(format!("{label}+{}@example.com", Uuid::new_v4().simple())),
        password_hash: Set("dummy".into()),
        full_name: Set("Test User".into()),
        role: Set(role.into()),
        phone: NotSet,
        address: NotSet,
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}

async fn create_product(
    state: &AppState,
    label: &str,
    price: i64,
    stock: i32,
) -> anyhow::Result<pedido_express_api::entity::products::Model> {
    // Product names are unique; suffix them so reruns do not collide.
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(format!("{label} {}", Uuid::new_v4().simple())),
        description: Set(Some("A product for testing".into())),
        price: Set(price),
        stock_quantity: Set(stock),
        image_url: NotSet,
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(product)
}
