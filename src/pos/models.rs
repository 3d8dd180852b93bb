// ABOUTME: Wire types for the POS API and their mapping into domain records
// ABOUTME: Field names mirror the vendor's PascalCase JSON

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{CustomerIdentity, LineItem, TransactionKind, TransactionRecord};

/// The vendor's "no date" sentinel.
const UNSET_DATE: &str = "0001-01-01";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SaleQuery {
    pub batch_start_date: String,
    pub batch_end_date: String,
    pub ticket_date_start: String,
    pub ticket_date_end: String,
    pub store_code: i64,
    pub skip: usize,
    pub take: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PurchaseOrderQuery {
    pub bill_to_store_code: i64,
    pub skip: usize,
    pub take: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SaleResponse {
    #[serde(default)]
    pub is_successful: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub sales: Vec<SaleBatch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SaleBatch {
    #[serde(default)]
    pub sale_headers: Vec<SaleHeader>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SaleHeader {
    #[serde(default, deserialize_with = "lenient_string")]
    pub ticket_number: Option<String>,
    #[serde(default)]
    pub ticket_date_time: Option<String>,
    #[serde(default)]
    pub customer: Option<WireCustomer>,
    #[serde(default)]
    pub sale_details: Vec<SaleDetail>,
    #[serde(default)]
    pub tenders: Vec<Tender>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub store_code: Option<String>,
    #[serde(default)]
    pub sale_type: Option<String>,
    #[serde(default)]
    pub promotion_code: Option<String>,
    #[serde(default)]
    pub ticket_comment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WireCustomer {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SaleDetail {
    #[serde(default)]
    pub product_item: Option<ProductItem>,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub amount_paid: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProductItem {
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tender {
    #[serde(default)]
    pub tender_description: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PurchaseOrderResponse {
    #[serde(default)]
    pub is_successful: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub purchase_orders: Vec<PurchaseOrder>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PurchaseOrder {
    #[serde(default, deserialize_with = "lenient_string")]
    pub purchase_order_number: Option<String>,
    #[serde(default)]
    pub ordered_on: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub bill_to_store_code: Option<String>,
    #[serde(default)]
    pub supplier_code: Option<String>,
    #[serde(default)]
    pub supplier_name: Option<String>,
    #[serde(default)]
    pub purchase_order_type: Option<String>,
    #[serde(default)]
    pub confirmation_number: Option<String>,
    #[serde(default)]
    pub terms: Option<String>,
    #[serde(default)]
    pub ship_via: Option<String>,
    #[serde(default)]
    pub customer_order_number: Option<String>,
    #[serde(default)]
    pub details: Vec<PurchaseDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PurchaseDetail {
    #[serde(default)]
    pub product_item: Option<ProductItem>,
    #[serde(default)]
    pub order_quantity: Option<Decimal>,
    #[serde(default)]
    pub cost: Option<Decimal>,
}

impl SaleHeader {
    /// Map a wire sale into a transaction record. Returns None (with a
    /// warning) when the sale has no ticket number, because an unkeyable
    /// record cannot be deduplicated.
    pub fn into_record(self) -> Option<TransactionRecord> {
        let id = match self.ticket_number.filter(|n| !n.trim().is_empty()) {
            Some(n) => n.trim().to_string(),
            None => {
                tracing::warn!("Dropping sale without a ticket number");
                return None;
            }
        };

        let occurred_at = match self.ticket_date_time.as_deref().and_then(parse_pos_timestamp) {
            Some(at) => at,
            None => {
                tracing::warn!("Sale {} has no usable ticket time, using now", id);
                Utc::now()
            }
        };

        let customer = self.customer.map(|c| CustomerIdentity {
            email: c.email.unwrap_or_default().trim().to_string(),
            first_name: c.first_name,
            last_name: c.last_name,
            phone: c.phone_number,
        });

        let total: Decimal = self
            .sale_details
            .iter()
            .filter_map(|d| d.amount_paid)
            .sum();

        let line_items: Vec<LineItem> = self
            .sale_details
            .iter()
            .map(|d| LineItem {
                sku: d
                    .product_item
                    .as_ref()
                    .and_then(|p| p.sku.clone())
                    .unwrap_or_default(),
                description: d
                    .product_item
                    .as_ref()
                    .and_then(|p| p.summary.clone())
                    .unwrap_or_default(),
                quantity: d.quantity.unwrap_or(Decimal::ZERO),
            })
            .collect();

        let payment_method = self
            .tenders
            .first()
            .and_then(|t| t.tender_description.clone());

        let mut extra = BTreeMap::new();
        extra.insert("SaleType".to_string(), self.sale_type.unwrap_or_default());
        extra.insert(
            "PromotionCode".to_string(),
            self.promotion_code.unwrap_or_default(),
        );
        extra.insert(
            "TicketComment".to_string(),
            self.ticket_comment.unwrap_or_default(),
        );

        Some(TransactionRecord {
            kind: TransactionKind::Sale,
            id,
            occurred_at,
            customer,
            total,
            line_items,
            payment_method,
            store_code: self.store_code,
            extra,
        })
    }
}

impl PurchaseOrder {
    /// When the order was placed, if the vendor supplied a real date.
    pub fn ordered_at(&self) -> Option<DateTime<Utc>> {
        self.ordered_on.as_deref().and_then(parse_pos_timestamp)
    }

    /// Map a wire purchase order into a transaction record. The customer
    /// identity is left empty; purchase orders have no customer and the
    /// orchestrator substitutes the configured fallback.
    pub fn into_record(self) -> Option<TransactionRecord> {
        let id = match self.purchase_order_number.filter(|n| !n.trim().is_empty()) {
            Some(n) => n.trim().to_string(),
            None => {
                tracing::warn!("Dropping purchase order without an order number");
                return None;
            }
        };

        let occurred_at = match self.ordered_on.as_deref().and_then(parse_pos_timestamp) {
            Some(at) => at,
            None => {
                tracing::warn!("Purchase order {} has no usable order date, using now", id);
                Utc::now()
            }
        };

        let total: Decimal = self
            .details
            .iter()
            .map(|d| d.cost.unwrap_or(Decimal::ZERO) * d.order_quantity.unwrap_or(Decimal::ZERO))
            .sum();

        let line_items: Vec<LineItem> = self
            .details
            .iter()
            .map(|d| LineItem {
                sku: d
                    .product_item
                    .as_ref()
                    .and_then(|p| p.sku.clone())
                    .unwrap_or_default(),
                description: d
                    .product_item
                    .as_ref()
                    .and_then(|p| p.summary.clone())
                    .unwrap_or_default(),
                quantity: d.order_quantity.unwrap_or(Decimal::ZERO),
            })
            .collect();

        let mut extra = BTreeMap::new();
        extra.insert(
            "SupplierCode".to_string(),
            self.supplier_code.unwrap_or_default(),
        );
        extra.insert(
            "SupplierName".to_string(),
            self.supplier_name.unwrap_or_default(),
        );
        extra.insert(
            "PurchaseOrderType".to_string(),
            self.purchase_order_type.unwrap_or_default(),
        );
        extra.insert(
            "ConfirmationNumber".to_string(),
            self.confirmation_number.unwrap_or_default(),
        );
        extra.insert("Terms".to_string(), self.terms.unwrap_or_default());
        extra.insert("ShipVia".to_string(), self.ship_via.unwrap_or_default());
        extra.insert(
            "CustomerOrderNumber".to_string(),
            self.customer_order_number.unwrap_or_default(),
        );

        Some(TransactionRecord {
            kind: TransactionKind::Purchase,
            id,
            occurred_at,
            customer: None,
            total,
            line_items,
            payment_method: None,
            store_code: self.bill_to_store_code,
            extra,
        })
    }
}

/// Parse the vendor's assorted timestamp spellings: RFC 3339, naive
/// datetimes (assumed UTC), and bare dates. The 0001-01-01 sentinel and
/// anything unparsable map to None.
pub(crate) fn parse_pos_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with(UNSET_DATE) {
        return None;
    }

    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }

    None
}

/// Accept a JSON string or number and produce a trimmed string. The vendor
/// is inconsistent about whether identifiers are quoted.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Int(i64),
        Float(f64),
    }

    Ok(Option::<StringOrNumber>::deserialize(deserializer)?.map(|v| match v {
        StringOrNumber::String(s) => s.trim().to_string(),
        StringOrNumber::Int(n) => n.to_string(),
        StringOrNumber::Float(n) => n.to_string(),
    }))
}
