use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::OrderStatus;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReviewRequest {
    pub order_id: Uuid,
    /// Integer rating between 1 and 5.
    pub rating: i32,
    pub comment: Option<String>,
}

/// Review joined with enough order context for display.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewWithOrder {
    pub id: Uuid,
    pub order_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub customer_name: String,
    pub order_total: i64,
    pub order_status: OrderStatus,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct ReviewList {
    #[schema(value_type = Vec<ReviewWithOrder>)]
    pub items: Vec<ReviewWithOrder>,
}
