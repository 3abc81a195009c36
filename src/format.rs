//! Display helpers shared by the chat, order and product screens.

use chrono::{DateTime, Local, NaiveDateTime};

use crate::api::commerce::{Order, OrderStatus, Product, StockStatus};

const SERVER_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a backend timestamp. WordPress stores site-local wall clock time,
/// so zone information, when present, is dropped after conversion to local.
pub fn parse_server_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    SERVER_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// `HH:MM` for a message bubble. Unparseable input is shown as-is.
pub fn format_message_time(raw: &str) -> String {
    parse_server_time(raw)
        .map(|dt| dt.format("%H:%M").to_string())
        .unwrap_or_else(|| raw.trim().to_string())
}

/// `HH:MM` of the local clock, used for optimistic bubbles.
pub fn clock_now() -> String {
    Local::now().format("%H:%M").to_string()
}

/// Conversation list label: "just now", "5 min ago", ... then `MM-DD`.
pub fn format_relative(raw: &str, now: NaiveDateTime) -> String {
    let Some(then) = parse_server_time(raw) else {
        return raw.trim().to_string();
    };
    relative_label(then, now)
}

fn relative_label(then: NaiveDateTime, now: NaiveDateTime) -> String {
    match (now - then).num_minutes() {
        m if m < 1 => "just now".to_string(),
        m if m < 60 => format!("{m} min ago"),
        m if m < 60 * 24 => format!("{} h ago", m / 60),
        m if m < 60 * 24 * 7 => format!("{} d ago", m / (60 * 24)),
        _ => then.format("%m-%d").to_string(),
    }
}

/// Sidebar note shown while the conversation list comes from the local
/// cache. `cached_at` is a Unix timestamp in seconds.
pub fn format_cache_age(cached_at: i64, now: NaiveDateTime) -> String {
    match DateTime::from_timestamp(cached_at, 0) {
        Some(then) => format!("Offline copy, saved {}", relative_label(then.with_timezone(&Local).naive_local(), now)),
        None => "Offline copy".to_string(),
    }
}

pub fn format_relative_now(raw: &str) -> String {
    format_relative(raw, Local::now().naive_local())
}

pub fn format_date(raw: &str) -> String {
    parse_server_time(raw)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| raw.trim().to_string())
}

pub fn format_date_time(raw: &str) -> String {
    parse_server_time(raw)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| raw.trim().to_string())
}

pub fn format_price(price: f64) -> String {
    format!("¥{price:.2}")
}

pub fn format_order_number(order_number: &str) -> String {
    format!("#{order_number}")
}

pub fn order_status_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "Pending",
        OrderStatus::Processing => "Processing",
        OrderStatus::Completed => "Completed",
        OrderStatus::Cancelled => "Cancelled",
        OrderStatus::Refunded => "Refunded",
        OrderStatus::Unknown => "Unknown",
    }
}

pub fn order_status_color(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "#f59e0b",
        OrderStatus::Processing => "#3b82f6",
        OrderStatus::Completed => "#10b981",
        OrderStatus::Refunded => "#ef4444",
        OrderStatus::Cancelled | OrderStatus::Unknown => "#6b7280",
    }
}

pub fn stock_status_label(status: StockStatus) -> &'static str {
    match status {
        StockStatus::InStock => "In stock",
        StockStatus::OutOfStock => "Out of stock",
        StockStatus::OnBackorder => "On backorder",
        StockStatus::Unknown => "Unknown",
    }
}

pub fn stock_status_color(status: StockStatus) -> &'static str {
    match status {
        StockStatus::InStock => "#10b981",
        StockStatus::OutOfStock => "#ef4444",
        StockStatus::OnBackorder => "#f59e0b",
        StockStatus::Unknown => "#6b7280",
    }
}

/// Plain-text card an agent can paste into a conversation.
pub fn product_share_text(product: &Product) -> String {
    let price = match product.sale_price {
        Some(sale) if product.on_sale && sale > 0.0 => format!(
            "{} (was {})",
            format_price(sale),
            format_price(product.regular_price)
        ),
        _ => format_price(product.price),
    };
    let blurb = product
        .short_description
        .as_deref()
        .or(product.description.as_deref())
        .unwrap_or("");
    format!(
        "【{}】\n\n{}\n\nPrice: {}\nStock: {}",
        product.name,
        blurb,
        price,
        stock_status_label(product.stock_status)
    )
}

pub fn order_share_text(order: &Order) -> String {
    let lines: Vec<String> = order
        .items
        .iter()
        .map(|item| format!("- {} x{} {}", item.product_name, item.quantity, format_price(item.subtotal)))
        .collect();
    format!(
        "Order details\n\nOrder: {}\nCustomer: {}\nStatus: {}\nTotal: {}\n\nItems:\n{}",
        format_order_number(&order.order_number),
        order.customer_name,
        order_status_label(order.status),
        format_price(order.total),
        lines.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 4).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn cache_age_reads_unix_seconds() {
        let now = Local::now().naive_local();
        let ten_min_ago = Local::now().timestamp() - 630;
        assert_eq!(format_cache_age(ten_min_ago, now), "Offline copy, saved 10 min ago");
        assert_eq!(format_cache_age(i64::MAX, now), "Offline copy");
    }

    #[test]
    fn message_time_is_hours_and_minutes() {
        assert_eq!(format_message_time("2025-03-04 09:05:33"), "09:05");
        assert_eq!(format_message_time("2025-03-04T21:40:00"), "21:40");
        assert_eq!(format_message_time("yesterday"), "yesterday");
    }

    #[test]
    fn relative_labels_step_through_units() {
        let now = at(12, 0);
        assert_eq!(format_relative("2025-03-04 11:59:40", now), "just now");
        assert_eq!(format_relative("2025-03-04 11:15:00", now), "45 min ago");
        assert_eq!(format_relative("2025-03-04 07:00:00", now), "5 h ago");
        assert_eq!(format_relative("2025-03-01 12:00:00", now), "3 d ago");
        assert_eq!(format_relative("2025-01-20 12:00:00", now), "01-20");
    }

    #[test]
    fn money_and_numbers() {
        assert_eq!(format_price(12.5), "¥12.50");
        assert_eq!(format_order_number("TZ-9"), "#TZ-9");
        assert_eq!(format_date_time("2025-03-04 09:05:33"), "2025-03-04 09:05");
        assert_eq!(format_date("2025-03-04 09:05:33"), "2025-03-04");
    }

    #[test]
    fn share_text_mentions_sale_price() {
        let product: Product = serde_json::from_value(json!({
            "id": 1,
            "name": "Opal ring",
            "price": 80,
            "regular_price": 100,
            "sale_price": 80,
            "on_sale": true,
            "short_description": "Hand set",
            "stock_status": "instock"
        }))
        .unwrap();

        let text = product_share_text(&product);
        assert!(text.starts_with("【Opal ring】"));
        assert!(text.contains("Price: ¥80.00 (was ¥100.00)"));
        assert!(text.contains("Stock: In stock"));
    }

    #[test]
    fn order_share_lists_items() {
        let order: Order = serde_json::from_value(json!({
            "id": 3,
            "order_number": "1003",
            "customer_name": "Mia",
            "status": "completed",
            "total": 45,
            "items": [
                { "product_name": "Chain", "quantity": 1, "subtotal": 20 },
                { "product_name": "Clasp", "quantity": 5, "subtotal": 25 }
            ]
        }))
        .unwrap();

        let text = order_share_text(&order);
        assert!(text.contains("Order: #1003"));
        assert!(text.contains("Status: Completed"));
        assert!(text.ends_with("- Chain x1 ¥20.00\n- Clasp x5 ¥25.00"));
    }
}
