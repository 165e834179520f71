use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        cart::{AddToCartRequest, CartItemDto, CartList, SetQuantityRequest},
        orders::{
            CheckoutItem, CheckoutRequest, CheckoutResponse, ConfirmOrderRequest,
            CreateIntentRequest, CreateIntentResponse, OrderList, OrderWithItems,
            UpdateOrderStatusRequest,
        },
        products::{CreateProductRequest, ProductList, UpdateProductRequest},
        reports::{Report, ReportRow},
        reviews::{CreateReviewRequest, ReviewList, ReviewWithOrder},
        users::{CreateUserRequest, UpdateRoleRequest, UserList},
    },
    models::{
        CartItem, DeliveryAddress, Order, OrderItem, OrderStatus, PaymentMethod, PaymentStatus,
        Product, Review, Role, User,
    },
    response::{ApiResponse, Meta},
    routes::{admin, auth, cart, health, orders, params, payments, products, reports, reviews},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        cart::cart_list,
        cart::add_to_cart,
        cart::set_quantity,
        cart::remove_from_cart,
        cart::clear_cart,
        products::list_products,
        products::create_product,
        products::get_product,
        products::update_product,
        products::delete_product,
        orders::list_orders,
        orders::checkout,
        orders::confirm_order,
        orders::stream_changes,
        orders::get_order,
        reviews::list_reviews,
        reviews::create_review,
        reports::sales_report,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::list_low_stock,
        admin::adjust_inventory,
        admin::list_users,
        admin::create_user,
        admin::update_role,
        admin::delete_user,
        payments::webhook,
        payments::create_intent
    ),
    components(
        schemas(
            User,
            Role,
            Product,
            CartItem,
            Order,
            OrderItem,
            Review,
            OrderStatus,
            PaymentMethod,
            PaymentStatus,
            DeliveryAddress,
            AddToCartRequest,
            SetQuantityRequest,
            CartItemDto,
            CartList,
            CheckoutItem,
            CheckoutRequest,
            CheckoutResponse,
            ConfirmOrderRequest,
            CreateIntentRequest,
            CreateIntentResponse,
            UpdateOrderStatusRequest,
            OrderList,
            OrderWithItems,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            CreateReviewRequest,
            ReviewWithOrder,
            ReviewList,
            Report,
            ReportRow,
            CreateUserRequest,
            UpdateRoleRequest,
            UserList,
            admin::InventoryAdjustRequest,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            params::LowStockQuery,
            params::ReportQuery,
            params::UserListQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<CartList>,
            ApiResponse<OrderList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<CheckoutResponse>,
            ApiResponse<CreateIntentResponse>,
            ApiResponse<ReviewList>,
            ApiResponse<Report>,
            ApiResponse<UserList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Products", description = "Menu product endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Order and checkout endpoints"),
        (name = "Reviews", description = "Order review endpoints"),
        (name = "Reports", description = "Sales report export"),
        (name = "Admin", description = "Staff-only management endpoints"),
        (name = "Payments", description = "Payment processor callbacks"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
