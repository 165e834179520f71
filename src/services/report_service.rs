use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    db::DbPool,
    dto::reports::ReportRow,
    error::{AppError, AppResult},
    pdf,
};

#[derive(Debug, FromRow)]
pub struct SaleLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub order_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
}

#[derive(Debug, FromRow)]
pub struct RatingLine {
    pub order_id: Uuid,
    pub rating: i32,
}

/// Inclusive date range over which orders and reviews are aggregated.
#[derive(Debug, Clone, Copy)]
pub struct ReportRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportRange {
    /// Parse `YYYY-MM-DD` bounds. A missing start means "since forever",
    /// a missing end means "through today". The end bound covers the whole
    /// named day.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> AppResult<Self> {
        let start = match start {
            Some(s) => date_floor(s)?,
            None => DateTime::<Utc>::UNIX_EPOCH,
        };
        let end = match end {
            Some(s) => date_floor(s)? + chrono::Duration::days(1),
            None => Utc::now(),
        };
        if end < start {
            return Err(AppError::BadRequest("end_date is before start_date".into()));
        }
        Ok(Self { start, end })
    }
}

fn date_floor(s: &str) -> AppResult<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("invalid date: {s}")))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| AppError::BadRequest(format!("invalid date: {s}")))?;
    Ok(midnight.and_utc())
}

pub async fn fetch_report(
    pool: &DbPool,
    range: ReportRange,
    product_id: Option<Uuid>,
) -> AppResult<Vec<ReportRow>> {
    let sales: Vec<SaleLine> = sqlx::query_as(
        r#"
        SELECT oi.product_id, p.name AS product_name, oi.order_id,
               oi.quantity, oi.unit_price
        FROM order_items oi
        JOIN orders o ON o.id = oi.order_id
        JOIN products p ON p.id = oi.product_id
        WHERE o.created_at >= $1 AND o.created_at < $2
        "#,
    )
    .bind(range.start)
    .bind(range.end)
    .fetch_all(pool)
    .await?;

    let ratings: Vec<RatingLine> = sqlx::query_as(
        r#"
        SELECT r.order_id, r.rating
        FROM reviews r
        WHERE r.created_at >= $1 AND r.created_at < $2
        "#,
    )
    .bind(range.start)
    .bind(range.end)
    .fetch_all(pool)
    .await?;

    Ok(build_report(&sales, &ratings, product_id))
}

/// Group sales by product and attribute each order's review to every
/// product on that order. Datasets are small enough for in-memory grouping.
pub fn build_report(
    sales: &[SaleLine],
    ratings: &[RatingLine],
    product_filter: Option<Uuid>,
) -> Vec<ReportRow> {
    struct Acc {
        name: String,
        total_sales: i64,
        total_revenue: i64,
        rating_sum: i64,
        rating_count: i64,
    }

    let mut by_product: HashMap<Uuid, Acc> = HashMap::new();
    let mut order_products: HashMap<Uuid, Vec<Uuid>> = HashMap::new();

    for sale in sales {
        let acc = by_product.entry(sale.product_id).or_insert_with(|| Acc {
            name: sale.product_name.clone(),
            total_sales: 0,
            total_revenue: 0,
            rating_sum: 0,
            rating_count: 0,
        });
        acc.total_sales += sale.quantity as i64;
        acc.total_revenue += sale.unit_price * (sale.quantity as i64);
        order_products
            .entry(sale.order_id)
            .or_default()
            .push(sale.product_id);
    }

    for rating in ratings {
        let Some(products) = order_products.get(&rating.order_id) else {
            // Review of an order outside the sales window; nothing to
            // attribute it to.
            continue;
        };
        for product_id in products {
            if let Some(acc) = by_product.get_mut(product_id) {
                acc.rating_sum += rating.rating as i64;
                acc.rating_count += 1;
            }
        }
    }

    let mut rows: Vec<ReportRow> = by_product
        .into_iter()
        .filter(|(id, _)| product_filter.is_none_or(|filter| *id == filter))
        .map(|(product_id, acc)| ReportRow {
            product_id,
            product_name: acc.name,
            total_sales: acc.total_sales,
            total_revenue: acc.total_revenue,
            avg_rating: if acc.rating_count > 0 {
                round2(acc.rating_sum as f64 / acc.rating_count as f64)
            } else {
                0.0
            },
            rating_count: acc.rating_count,
        })
        .collect();

    rows.sort_by(|a, b| a.product_name.cmp(&b.product_name));
    rows
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Format minor currency units as a decimal amount, e.g. 2000 -> "20.00".
pub fn format_minor(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// CSV rendering with the fixed column order of the export contract.
pub fn render_csv(rows: &[ReportRow]) -> String {
    let mut csv = String::from("productId,name,totalSales,totalRevenue,avgRating\n");
    for row in rows {
        csv.push_str(&format!(
            "{},{},{},{},{:.2}\n",
            row.product_id,
            csv_field(&row.product_name),
            row.total_sales,
            format_minor(row.total_revenue),
            row.avg_rating
        ));
    }
    csv
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn render_pdf(rows: &[ReportRow], range: ReportRange) -> Vec<u8> {
    // range.end is exclusive; step back inside the last covered day so the
    // header shows the inclusive bound the caller asked for.
    let end_label = range.end - chrono::Duration::seconds(1);
    let mut lines: Vec<String> = vec![format!(
        "Period: {} to {}",
        range.start.format("%Y-%m-%d"),
        end_label.format("%Y-%m-%d")
    )];
    lines.push(String::new());
    lines.push(format!(
        "{:<40} {:>10} {:>14} {:>10}",
        "Product", "Sales", "Revenue", "Rating"
    ));

    let mut total_sales: i64 = 0;
    let mut total_revenue: i64 = 0;
    for row in rows {
        lines.push(format!(
            "{:<40} {:>10} {:>14} {:>10.2}",
            truncate(&row.product_name, 40),
            row.total_sales,
            format_minor(row.total_revenue),
            row.avg_rating
        ));
        total_sales += row.total_sales;
        total_revenue += row.total_revenue;
    }

    lines.push(String::new());
    lines.push(format!("Total sales: {total_sales}"));
    lines.push(format!("Total revenue: {}", format_minor(total_revenue)));

    pdf::render_text_document("Sales and Ratings Report", &lines)
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        let head: String = value.chars().take(max - 3).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sale(product: Uuid, name: &str, order: Uuid, qty: i32, price: i64) -> SaleLine {
        SaleLine {
            product_id: product,
            product_name: name.to_string(),
            order_id: order,
            quantity: qty,
            unit_price: price,
        }
    }

    #[test]
    fn groups_by_product_and_averages_ratings() {
        let burger = Uuid::new_v4();
        let fries = Uuid::new_v4();
        let order_a = Uuid::new_v4();
        let order_b = Uuid::new_v4();

        let sales = vec![
            sale(burger, "Burger", order_a, 2, 2990),
            sale(fries, "Fries", order_a, 1, 1550),
            sale(burger, "Burger", order_b, 1, 2990),
        ];
        let ratings = vec![
            RatingLine { order_id: order_a, rating: 5 },
            RatingLine { order_id: order_b, rating: 4 },
        ];

        let rows = build_report(&sales, &ratings, None);
        assert_eq!(rows.len(), 2);

        let burger_row = rows.iter().find(|r| r.product_id == burger).unwrap();
        assert_eq!(burger_row.total_sales, 3);
        assert_eq!(burger_row.total_revenue, 3 * 2990);
        // Burger appears in both reviewed orders: (5 + 4) / 2.
        assert_eq!(burger_row.avg_rating, 4.5);

        let fries_row = rows.iter().find(|r| r.product_id == fries).unwrap();
        assert_eq!(fries_row.total_sales, 1);
        assert_eq!(fries_row.avg_rating, 5.0);
    }

    #[test]
    fn product_without_reviews_reports_zero_rating() {
        let product = Uuid::new_v4();
        let sales = vec![sale(product, "Soda", Uuid::new_v4(), 2, 850)];
        let rows = build_report(&sales, &[], None);
        assert_eq!(rows[0].avg_rating, 0.0);
        assert_eq!(rows[0].rating_count, 0);
    }

    #[test]
    fn empty_inputs_yield_empty_report() {
        assert!(build_report(&[], &[], None).is_empty());
    }

    #[test]
    fn product_filter_drops_other_rows() {
        let keep = Uuid::new_v4();
        let sales = vec![
            sale(keep, "Keep", Uuid::new_v4(), 1, 100),
            sale(Uuid::new_v4(), "Drop", Uuid::new_v4(), 1, 100),
        ];
        let rows = build_report(&sales, &[], Some(keep));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product_id, keep);
    }

    #[test]
    fn csv_has_fixed_columns_and_escapes_names() {
        let product = Uuid::new_v4();
        let sales = vec![sale(product, "Rice, beans", Uuid::new_v4(), 2, 1000)];
        let csv = render_csv(&build_report(&sales, &[], None));
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "productId,name,totalSales,totalRevenue,avgRating"
        );
        let row = lines.next().unwrap();
        assert!(row.contains("\"Rice, beans\""));
        assert!(row.ends_with("2,20.00,0.00"));
    }

    #[test]
    fn minor_units_format_as_decimal() {
        assert_eq!(format_minor(2000), "20.00");
        assert_eq!(format_minor(5), "0.05");
        assert_eq!(format_minor(-1234), "-12.34");
    }

    #[test]
    fn range_end_is_inclusive_for_the_whole_day() {
        let range = ReportRange::parse(Some("2026-01-01"), Some("2026-01-31")).unwrap();
        let last_minute = "2026-01-31T23:59:00Z".parse::<DateTime<Utc>>().unwrap();
        assert!(last_minute >= range.start && last_minute < range.end);
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(ReportRange::parse(Some("2026-02-01"), Some("2026-01-01")).is_err());
    }

    #[test]
    fn pdf_header_echoes_the_requested_end_date() {
        let range = ReportRange::parse(Some("2026-01-01"), Some("2026-01-31")).unwrap();
        let doc = render_pdf(&[], range);
        // Content streams are plain text, so the header is visible as-is.
        let text = String::from_utf8_lossy(&doc);
        assert!(text.contains("Period: 2026-01-01 to 2026-01-31"));
    }
}
