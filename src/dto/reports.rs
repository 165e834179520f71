use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// One aggregated row of the sales/ratings report, grouped by product.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReportRow {
    pub product_id: Uuid,
    pub product_name: String,
    /// Total quantity sold in the range.
    pub total_sales: i64,
    /// Total revenue in minor currency units.
    pub total_revenue: i64,
    /// Average rating, exactly 0 when there are no reviews.
    pub avg_rating: f64,
    pub rating_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct Report {
    #[schema(value_type = Vec<ReportRow>)]
    pub rows: Vec<ReportRow>,
}
