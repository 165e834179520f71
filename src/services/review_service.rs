use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::reviews::{CreateReviewRequest, ReviewList, ReviewWithOrder},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_capability},
    models::{Capability, OrderStatus, Review},
    response::{ApiResponse, Meta},
};

#[derive(FromRow)]
struct ReviewJoinRow {
    id: Uuid,
    order_id: Uuid,
    rating: i32,
    comment: Option<String>,
    created_at: DateTime<Utc>,
    customer_name: String,
    total_amount: i64,
    status: String,
}

/// One review per order, written only by the order's owner.
pub async fn create_review(
    pool: &DbPool,
    user: &AuthUser,
    payload: CreateReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    ensure_capability(user, Capability::WriteReviews)?;
    if !(1..=5).contains(&payload.rating) {
        return Err(AppError::BadRequest(
            "rating must be an integer between 1 and 5".into(),
        ));
    }

    let order: Option<(Uuid,)> = sqlx::query_as("SELECT user_id FROM orders WHERE id = $1")
        .bind(payload.order_id)
        .fetch_optional(pool)
        .await?;
    let owner = match order {
        Some((owner,)) => owner,
        None => return Err(AppError::NotFound),
    };

    if owner != user.user_id {
        return Err(AppError::Forbidden);
    }

    let inserted = sqlx::query_as::<_, Review>(
        r#"
        INSERT INTO reviews (id, order_id, user_id, rating, comment)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(payload.order_id)
    .bind(user.user_id)
    .bind(payload.rating)
    .bind(payload.comment.as_deref())
    .fetch_one(pool)
    .await;

    let review = match inserted {
        Ok(review) => review,
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            return Err(AppError::Conflict(
                "This order has already been reviewed".into(),
            ));
        }
        Err(err) => return Err(err.into()),
    };

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "review_create",
        Some("reviews"),
        Some(serde_json::json!({ "order_id": payload.order_id, "rating": payload.rating })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Review created", review, None))
}

pub async fn list_reviews(
    pool: &DbPool,
    order_id: Option<Uuid>,
) -> AppResult<ApiResponse<ReviewList>> {
    let rows: Vec<ReviewJoinRow> = match order_id {
        Some(order_id) => {
            sqlx::query_as(
                r#"
                SELECT r.id, r.order_id, r.rating, r.comment, r.created_at,
                       o.customer_name, o.total_amount, o.status
                FROM reviews r
                JOIN orders o ON o.id = r.order_id
                WHERE r.order_id = $1
                ORDER BY r.created_at DESC
                "#,
            )
            .bind(order_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                r#"
                SELECT r.id, r.order_id, r.rating, r.comment, r.created_at,
                       o.customer_name, o.total_amount, o.status
                FROM reviews r
                JOIN orders o ON o.id = r.order_id
                ORDER BY r.created_at DESC
                "#,
            )
            .fetch_all(pool)
            .await?
        }
    };

    let items = rows
        .into_iter()
        .map(|row| ReviewWithOrder {
            id: row.id,
            order_id: row.order_id,
            rating: row.rating,
            comment: row.comment,
            created_at: row.created_at,
            customer_name: row.customer_name,
            order_total: row.total_amount,
            order_status: OrderStatus::parse(&row.status).unwrap_or(OrderStatus::Pending),
        })
        .collect();

    Ok(ApiResponse::success(
        "OK",
        ReviewList { items },
        Some(Meta::empty()),
    ))
}
