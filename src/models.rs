use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Closed set of account roles. Authorization decisions go through
/// [`Role::allows`] instead of string comparisons in handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Attendant,
    Customer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ManageProducts,
    ManageUsers,
    AdvanceOrders,
    ConfirmOrders,
    ViewReports,
    PlaceOrders,
    WriteReviews,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Attendant => "attendant",
            Role::Customer => "customer",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "admin" => Some(Role::Admin),
            "attendant" => Some(Role::Attendant),
            "customer" => Some(Role::Customer),
            _ => None,
        }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        use Capability::*;
        match self {
            Role::Admin => matches!(
                capability,
                ManageProducts | ManageUsers | AdvanceOrders | ConfirmOrders | ViewReports
            ),
            Role::Attendant => matches!(capability, AdvanceOrders | ConfirmOrders),
            Role::Customer => matches!(capability, PlaceOrders | WriteReviews),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Online,
    CashOnDelivery,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Online => "online",
            PaymentMethod::CashOnDelivery => "cash_on_delivery",
        }
    }

    pub fn parse(value: &str) -> Option<PaymentMethod> {
        match value {
            "online" => Some(PaymentMethod::Online),
            "cash_on_delivery" => Some(PaymentMethod::CashOnDelivery),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    PendingPayment,
    Paid,
    PaymentFailed,
    CashOnDelivery,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::PendingPayment => "pending_payment",
            PaymentStatus::Paid => "paid",
            PaymentStatus::PaymentFailed => "payment_failed",
            PaymentStatus::CashOnDelivery => "cash_on_delivery",
        }
    }

    pub fn parse(value: &str) -> Option<PaymentStatus> {
        match value {
            "pending_payment" => Some(PaymentStatus::PendingPayment),
            "paid" => Some(PaymentStatus::Paid),
            "payment_failed" => Some(PaymentStatus::PaymentFailed),
            "cash_on_delivery" => Some(PaymentStatus::CashOnDelivery),
            _ => None,
        }
    }
}

/// Fulfillment pipeline. Transitions are strictly forward; `Delivered`
/// is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    Delivered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Delivered => "delivered",
        }
    }

    pub fn parse(value: &str) -> Option<OrderStatus> {
        match value {
            "pending" => Some(OrderStatus::Pending),
            "confirmed" => Some(OrderStatus::Confirmed),
            "preparing" => Some(OrderStatus::Preparing),
            "ready" => Some(OrderStatus::Ready),
            "delivered" => Some(OrderStatus::Delivered),
            _ => None,
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Confirmed => 1,
            OrderStatus::Preparing => 2,
            OrderStatus::Ready => 3,
            OrderStatus::Delivered => 4,
        }
    }

    pub fn next(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::Confirmed),
            OrderStatus::Confirmed => Some(OrderStatus::Preparing),
            OrderStatus::Preparing => Some(OrderStatus::Ready),
            OrderStatus::Ready => Some(OrderStatus::Delivered),
            OrderStatus::Delivered => None,
        }
    }

    pub fn can_move_to(&self, target: OrderStatus) -> bool {
        target.rank() > self.rank()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeliveryAddress {
    pub street: String,
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complement: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
}

impl DeliveryAddress {
    pub fn is_complete(&self) -> bool {
        !self.street.trim().is_empty()
            && !self.number.trim().is_empty()
            && !self.city.trim().is_empty()
            && !self.state.trim().is_empty()
            && !self.postal_code.trim().is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub role: Role,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Price in minor currency units (centavos).
    pub price: i64,
    pub stock_quantity: i32,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct CartItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub observation: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub customer_name: String,
    pub total_amount: i64,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub payment_intent_id: Option<String>,
    pub delivery_address: Option<DeliveryAddress>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    /// Price snapshot taken at order time.
    pub unit_price: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Review {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_pipeline_is_strictly_forward() {
        let mut status = OrderStatus::Pending;
        let mut seen = vec![status];
        while let Some(next) = status.next() {
            assert!(status.can_move_to(next));
            assert!(!next.can_move_to(status));
            status = next;
            seen.push(status);
        }
        assert_eq!(
            seen,
            vec![
                OrderStatus::Pending,
                OrderStatus::Confirmed,
                OrderStatus::Preparing,
                OrderStatus::Ready,
                OrderStatus::Delivered,
            ]
        );
        assert!(OrderStatus::Delivered.next().is_none());
    }

    #[test]
    fn status_cannot_skip_backwards_or_stand_still() {
        assert!(OrderStatus::Confirmed.can_move_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Ready.can_move_to(OrderStatus::Ready));
        assert!(!OrderStatus::Delivered.can_move_to(OrderStatus::Pending));
    }

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::Delivered,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("shipped"), None);
    }

    #[test]
    fn attendants_fulfill_but_do_not_manage() {
        assert!(Role::Attendant.allows(Capability::AdvanceOrders));
        assert!(Role::Attendant.allows(Capability::ConfirmOrders));
        assert!(!Role::Attendant.allows(Capability::ManageProducts));
        assert!(!Role::Attendant.allows(Capability::ManageUsers));
        assert!(!Role::Attendant.allows(Capability::ViewReports));
    }

    #[test]
    fn admins_manage_but_do_not_order() {
        assert!(Role::Admin.allows(Capability::ManageUsers));
        assert!(Role::Admin.allows(Capability::ViewReports));
        assert!(!Role::Admin.allows(Capability::PlaceOrders));
        assert!(Role::Customer.allows(Capability::PlaceOrders));
        assert!(Role::Customer.allows(Capability::WriteReviews));
        assert!(!Role::Customer.allows(Capability::AdvanceOrders));
    }

    #[test]
    fn delivery_address_requires_every_field_but_complement() {
        let address = DeliveryAddress {
            street: "Rua das Flores".into(),
            number: "123".into(),
            complement: None,
            city: "Sao Paulo".into(),
            state: "SP".into(),
            postal_code: "01000-000".into(),
        };
        assert!(address.is_complete());

        let mut missing_city = address.clone();
        missing_city.city = "  ".into();
        assert!(!missing_city.is_complete());

        let mut missing_number = address;
        missing_number.number = String::new();
        assert!(!missing_number.is_complete());
    }
}
