use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::users::{CreateUserRequest, UpdateRoleRequest, UserList},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Role, User},
    response::{ApiResponse, Meta},
    routes::params::{SortOrder, UserListQuery},
    services::auth_service::{UserRow, hash_password, user_from_row},
};

pub async fn list_users(
    pool: &DbPool,
    user: &AuthUser,
    query: UserListQuery,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{s}%"));
    let role = query.role.map(|r| r.as_str().to_string());
    let order = query.sort_order.unwrap_or(SortOrder::Desc).as_sql();

    // Sort column is fixed; only the direction comes from the caller.
    let sql = format!(
        r#"
        SELECT * FROM users
        WHERE ($1::text IS NULL OR full_name ILIKE $1 OR email ILIKE $1)
          AND ($2::text IS NULL OR role = $2)
        ORDER BY created_at {order}
        LIMIT $3 OFFSET $4
        "#
    );
    let rows: Vec<UserRow> = sqlx::query_as(&sql)
        .bind(search.as_deref())
        .bind(role.as_deref())
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    let total: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM users
        WHERE ($1::text IS NULL OR full_name ILIKE $1 OR email ILIKE $1)
          AND ($2::text IS NULL OR role = $2)
        "#,
    )
    .bind(search.as_deref())
    .bind(role.as_deref())
    .fetch_one(pool)
    .await?;

    let items: Vec<User> = rows.into_iter().map(user_from_row).collect();
    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success("Users", UserList { items }, Some(meta)))
}

/// Only staff accounts are created here; customers register themselves.
pub async fn create_user(
    pool: &DbPool,
    user: &AuthUser,
    payload: CreateUserRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;
    if payload.role == Role::Customer {
        return Err(AppError::BadRequest(
            "Invalid role. Only admin or attendant can be created".into(),
        ));
    }
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::BadRequest("email and password are required".into()));
    }

    let exist: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
        .bind(payload.email.as_str())
        .fetch_optional(pool)
        .await?;
    if exist.is_some() {
        return Err(AppError::BadRequest("Email is already taken".into()));
    }

    let password_hash = hash_password(&payload.password)?;
    let row: UserRow = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, full_name, role, phone)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(payload.email.as_str())
    .bind(password_hash)
    .bind(payload.full_name)
    .bind(payload.role.as_str())
    .bind(payload.phone)
    .fetch_one(pool)
    .await?;
    let created = user_from_row(row);

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "user_create",
        Some("users"),
        Some(serde_json::json!({ "user_id": created.id, "role": created.role })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("User created", created, None))
}

pub async fn update_role(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateRoleRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;
    if payload.new_role == Role::Customer {
        return Err(AppError::BadRequest(
            "Invalid role. Only admin or attendant allowed".into(),
        ));
    }

    let target: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let target = match target {
        Some(row) => user_from_row(row),
        None => return Err(AppError::NotFound),
    };

    if target.role == Role::Customer {
        return Err(AppError::BadRequest(
            "Customers cannot be modified through the admin panel".into(),
        ));
    }

    let row: UserRow =
        sqlx::query_as("UPDATE users SET role = $2 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(payload.new_role.as_str())
            .fetch_one(pool)
            .await?;
    let updated = user_from_row(row);

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "user_role_update",
        Some("users"),
        Some(serde_json::json!({ "user_id": id, "new_role": payload.new_role })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Role updated", updated, None))
}

pub async fn delete_user(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    if id == user.user_id {
        return Err(AppError::BadRequest("cannot delete your own account".into()));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "user_delete",
        Some("users"),
        Some(serde_json::json!({ "user_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "User deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
