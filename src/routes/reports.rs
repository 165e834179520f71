use axum::{
    Json, Router,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{
    dto::reports::Report,
    error::AppResult,
    middleware::auth::{AuthUser, ensure_capability},
    models::Capability,
    response::{ApiResponse, Meta},
    routes::params::{ReportFormat, ReportQuery},
    services::report_service::{self, ReportRange},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(sales_report))
}

#[utoipa::path(
    get,
    path = "/api/report",
    params(
        ("start_date" = Option<String>, Query, description = "Inclusive start, YYYY-MM-DD"),
        ("end_date" = Option<String>, Query, description = "Inclusive end, YYYY-MM-DD"),
        ("product_id" = Option<Uuid>, Query, description = "Restrict to one product"),
        ("type" = Option<String>, Query, description = "json (default), csv or pdf"),
    ),
    responses(
        (status = 200, description = "Sales and ratings grouped by product", body = ApiResponse<Report>),
        (status = 400, description = "Invalid date range"),
        (status = 403, description = "Requires staff role"),
    ),
    tag = "Reports"
)]
pub async fn sales_report(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ReportQuery>,
) -> AppResult<Response> {
    ensure_capability(&user, Capability::ViewReports)?;

    let range = ReportRange::parse(query.start_date.as_deref(), query.end_date.as_deref())?;
    let rows = report_service::fetch_report(&state.pool, range, query.product_id).await?;

    let response = match query.format.unwrap_or_default() {
        ReportFormat::Json => {
            let total = rows.len() as i64;
            let body = ApiResponse::success(
                "Sales report",
                Report { rows },
                Some(Meta::new(1, total, total)),
            );
            Json(body).into_response()
        }
        ReportFormat::Csv => {
            let csv = report_service::render_csv(&rows);
            (
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"sales-report.csv\"",
                    ),
                ],
                csv,
            )
                .into_response()
        }
        ReportFormat::Pdf => {
            let pdf = report_service::render_pdf(&rows, range);
            (
                [
                    (header::CONTENT_TYPE, "application/pdf"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"sales-report.pdf\"",
                    ),
                ],
                pdf,
            )
                .into_response()
        }
    };

    Ok(response)
}
