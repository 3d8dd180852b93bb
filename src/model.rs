// ABOUTME: Core domain types for the sync pipeline - transactions, customers, windows
// ABOUTME: Defines the dedup key format and client-side validation rules

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The two transaction streams pulled from the POS system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Sale,
    Purchase,
}

impl TransactionKind {
    /// Stable lowercase name, used as the ledger key prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Sale => "sale",
            TransactionKind::Purchase => "purchase",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sale" | "sales" => Ok(TransactionKind::Sale),
            "purchase" | "purchases" => Ok(TransactionKind::Purchase),
            other => Err(format!(
                "unknown transaction kind '{}' (expected 'sale' or 'purchase')",
                other
            )),
        }
    }
}

/// Customer identity attached to a transaction, used to address the
/// marketing profile on the sink side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerIdentity {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

impl CustomerIdentity {
    /// Identity consisting of an email address only.
    pub fn from_email(email: &str) -> Self {
        Self {
            email: email.to_string(),
            first_name: None,
            last_name: None,
            phone: None,
        }
    }

    /// Minimal email sanity check: non-empty and contains an '@'.
    /// Anything stricter belongs to the marketing platform's validation.
    pub fn has_valid_email(&self) -> bool {
        let email = self.email.trim();
        !email.is_empty() && email.contains('@')
    }

    /// "First Last" with missing parts dropped; empty string if neither is set.
    pub fn full_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("");
        let last = self.last_name.as_deref().unwrap_or("");
        format!("{} {}", first, last).trim().to_string()
    }
}

/// One line of a sale ticket or purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub sku: String,
    pub description: String,
    pub quantity: Decimal,
}

impl LineItem {
    /// Human-readable one-liner used in outbound event properties.
    pub fn summary(&self) -> String {
        format!(
            "{} (SKU: {}, Qty: {})",
            self.description, self.sku, self.quantity
        )
    }
}

/// A single sale or purchase pulled from the source system, normalized
/// into the shape the rest of the pipeline works with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub kind: TransactionKind,
    /// Ticket number (sales) or purchase-order number (purchases).
    /// Unique within its kind and stable across repeated fetches.
    pub id: String,
    pub occurred_at: DateTime<Utc>,
    pub customer: Option<CustomerIdentity>,
    pub total: Decimal,
    pub line_items: Vec<LineItem>,
    pub payment_method: Option<String>,
    pub store_code: Option<String>,
    /// Kind-specific attributes forwarded verbatim into the outbound
    /// event properties (supplier details, promotion codes, ...).
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl TransactionRecord {
    /// The ledger key for this record, formatted as "<kind>:<id>".
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.id)
    }

    /// Client-side validation applied before a record is offered to the
    /// sink. A failure here is permanent: retrying the same record will
    /// produce the same result, so the orchestrator quarantines it.
    pub fn validate(&self) -> Result<(), String> {
        let mut problems = Vec::new();

        match &self.customer {
            None => problems.push("missing customer identity".to_string()),
            Some(customer) if !customer.has_valid_email() => {
                problems.push(format!("invalid customer email '{}'", customer.email))
            }
            Some(_) => {}
        }

        if self.line_items.is_empty() {
            problems.push("no line items".to_string());
        }

        if self.total <= Decimal::ZERO {
            problems.push(format!("non-positive total {}", self.total));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }
}

/// Half-open time window [start, end) the Source Fetcher is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// Trailing window ending now.
    pub fn lookback(days: i64) -> Self {
        let end = Utc::now();
        Self {
            start: end - Duration::days(days),
            end,
        }
    }

    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        *instant >= self.start && *instant < self.end
    }
}

impl fmt::Display for SyncWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}
