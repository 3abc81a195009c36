use serde::{Deserialize, Serialize};

use crate::api::models::flex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
    Refunded,
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    /// Statuses offered by the order list filter bar.
    pub const FILTERABLE: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OrderItem {
    #[serde(default, deserialize_with = "flex::int")]
    pub id: u64,
    #[serde(default, deserialize_with = "flex::int")]
    pub product_id: u64,
    #[serde(default, deserialize_with = "flex::text")]
    pub product_name: String,
    #[serde(default)]
    pub product_image: Option<String>,
    #[serde(default, deserialize_with = "flex::int")]
    pub quantity: u64,
    #[serde(default, deserialize_with = "flex::float")]
    pub price: f64,
    #[serde(default, deserialize_with = "flex::float")]
    pub subtotal: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Order {
    #[serde(deserialize_with = "flex::int")]
    pub id: u64,
    #[serde(default, deserialize_with = "flex::text")]
    pub order_number: String,
    #[serde(default, deserialize_with = "flex::text")]
    pub customer_name: String,
    #[serde(default, deserialize_with = "flex::text")]
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub status: OrderStatus,
    #[serde(default, deserialize_with = "flex::text")]
    pub payment_method: String,
    #[serde(default, deserialize_with = "flex::text")]
    pub channel: String,
    #[serde(default, deserialize_with = "flex::float")]
    pub total: f64,
    #[serde(default, deserialize_with = "flex::float")]
    pub subtotal: f64,
    #[serde(default, deserialize_with = "flex::float")]
    pub discount_total: f64,
    #[serde(default, deserialize_with = "flex::float")]
    pub shipping_total: f64,
    #[serde(default, deserialize_with = "flex::float")]
    pub tax_total: f64,
    #[serde(default)]
    pub tracking_provider: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub shipping_address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    pub created_at: String,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

/// Paged list reply shared by `/orders` and `/products`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default, deserialize_with = "flex::int")]
    pub total: u64,
    #[serde(default, deserialize_with = "flex::int")]
    pub page: u64,
    #[serde(default, deserialize_with = "flex::int")]
    pub per_page: u64,
    #[serde(default, deserialize_with = "flex::int")]
    pub total_pages: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub customer_keyword: Option<String>,
    pub date_start: Option<String>,
    pub date_end: Option<String>,
}

impl OrderFilter {
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Self { customer_keyword: Some(keyword.into()), ..Self::default() }
    }

    pub(crate) fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        for (key, value) in [
            ("customer_keyword", &self.customer_keyword),
            ("date_start", &self.date_start),
            ("date_end", &self.date_end),
        ] {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                pairs.push((key, v.to_string()));
            }
        }
        pairs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    InStock,
    OutOfStock,
    OnBackorder,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProductImage {
    #[serde(default, deserialize_with = "flex::int")]
    pub id: u64,
    #[serde(default, deserialize_with = "flex::text")]
    pub src: String,
    #[serde(default)]
    pub alt: Option<String>,
}

/// Category or tag; both come back as `{id, name, slug}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Term {
    #[serde(default, deserialize_with = "flex::int")]
    pub id: u64,
    #[serde(default, deserialize_with = "flex::text")]
    pub name: String,
    #[serde(default, deserialize_with = "flex::text")]
    pub slug: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProductAttribute {
    #[serde(default, deserialize_with = "flex::text")]
    pub name: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Product {
    #[serde(deserialize_with = "flex::int")]
    pub id: u64,
    #[serde(default, deserialize_with = "flex::text")]
    pub name: String,
    #[serde(default, deserialize_with = "flex::text")]
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default, deserialize_with = "flex::float")]
    pub price: f64,
    #[serde(default, deserialize_with = "flex::float")]
    pub regular_price: f64,
    #[serde(default, deserialize_with = "flex::opt_float")]
    pub sale_price: Option<f64>,
    #[serde(default, deserialize_with = "flex::boolean")]
    pub on_sale: bool,
    #[serde(default, deserialize_with = "flex::opt_int")]
    pub stock_quantity: Option<u64>,
    #[serde(default)]
    pub stock_status: StockStatus,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub images: Vec<ProductImage>,
    #[serde(default)]
    pub categories: Vec<Term>,
    #[serde(default)]
    pub tags: Vec<Term>,
    #[serde(default)]
    pub attributes: Vec<ProductAttribute>,
}

impl Product {
    pub fn main_image(&self) -> Option<&str> {
        self.images.first().map(|img| img.src.as_str()).filter(|s| !s.is_empty())
    }

    /// Price the customer pays right now.
    pub fn effective_price(&self) -> f64 {
        match self.sale_price {
            Some(sale) if self.on_sale && sale > 0.0 => sale,
            _ => self.price,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub on_sale: Option<bool>,
    pub in_stock: Option<bool>,
}

impl ProductFilter {
    pub fn search(keyword: impl Into<String>) -> Self {
        Self { search: Some(keyword.into()), ..Self::default() }
    }

    pub(crate) fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        for (key, value) in [("search", &self.search), ("category", &self.category), ("tag", &self.tag)] {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                pairs.push((key, v.to_string()));
            }
        }
        for (key, flag) in [("on_sale", self.on_sale), ("in_stock", self.in_stock)] {
            if let Some(flag) = flag {
                pairs.push((key, if flag { "1" } else { "0" }.to_string()));
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn order_decodes_string_money() {
        let order: Order = serde_json::from_value(json!({
            "id": "31",
            "order_number": "TZ-0031",
            "status": "processing",
            "total": "128.50",
            "items": [{ "product_name": "Ring", "quantity": "2", "subtotal": 99 }]
        }))
        .expect("order should decode");

        assert_eq!(order.id, 31);
        assert_eq!(order.status, OrderStatus::Processing);
        assert!((order.total - 128.5).abs() < f64::EPSILON);
        assert_eq!(order.items[0].quantity, 2);
    }

    #[test]
    fn unknown_order_status_is_tolerated() {
        let order: Order = serde_json::from_value(json!({ "id": 1, "status": "on-hold" }))
            .expect("order should decode");
        assert_eq!(order.status, OrderStatus::Unknown);
    }

    #[test]
    fn order_filter_skips_empty_values() {
        let filter = OrderFilter {
            status: Some(OrderStatus::Refunded),
            customer_keyword: Some(String::new()),
            date_start: Some("2025-01-01".into()),
            date_end: None,
        };
        assert_eq!(
            filter.query_pairs(),
            vec![("status", "refunded".to_string()), ("date_start", "2025-01-01".to_string())]
        );
    }

    #[test]
    fn product_filter_encodes_flags_as_digits() {
        let filter = ProductFilter { on_sale: Some(true), in_stock: Some(false), ..ProductFilter::search("opal") };
        assert_eq!(
            filter.query_pairs(),
            vec![
                ("search", "opal".to_string()),
                ("on_sale", "1".to_string()),
                ("in_stock", "0".to_string()),
            ]
        );
    }

    #[test]
    fn product_pricing_and_stock() {
        let product: Product = serde_json::from_value(json!({
            "id": 8,
            "name": "Tanzanite pendant",
            "price": "300",
            "regular_price": "300",
            "sale_price": "249.9",
            "on_sale": true,
            "stock_status": "outofstock",
            "images": []
        }))
        .expect("product should decode");

        assert!((product.effective_price() - 249.9).abs() < 1e-9);
        assert_eq!(product.stock_status, StockStatus::OutOfStock);
        assert_eq!(product.main_image(), None);
    }
}
