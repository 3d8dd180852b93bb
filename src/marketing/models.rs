// ABOUTME: Request and response types for the marketing platform's JSON:API
// ABOUTME: Builds event and profile payloads from domain transaction records

use chrono::{SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::model::{CustomerIdentity, TransactionKind, TransactionRecord};

/// Metric name events are published under. Both kinds count as purchases
/// on the marketing side; the properties carry the distinction.
const PURCHASE_METRIC: &str = "Purchase";

/// Prefix namespacing our unique_ids among everything else the account ingests.
const UNIQUE_ID_PREFIX: &str = "POS";

// --- events ---

#[derive(Debug, Serialize)]
pub struct EventBody {
    pub data: EventData,
}

#[derive(Debug, Serialize)]
pub struct EventData {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub attributes: EventAttributes,
}

#[derive(Debug, Serialize)]
pub struct EventAttributes {
    pub properties: Map<String, Value>,
    pub time: String,
    pub value: f64,
    pub unique_id: String,
    pub metric: MetricRef,
    pub profile: ProfileRef,
}

#[derive(Debug, Serialize)]
pub struct MetricRef {
    pub data: MetricData,
}

#[derive(Debug, Serialize)]
pub struct MetricData {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub attributes: MetricAttributes,
}

#[derive(Debug, Serialize)]
pub struct MetricAttributes {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileRef {
    pub data: ProfileRefData,
}

#[derive(Debug, Serialize)]
pub struct ProfileRefData {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub attributes: ProfileRefAttributes,
}

#[derive(Debug, Serialize)]
pub struct ProfileRefAttributes {
    pub email: String,
}

impl EventBody {
    /// Build the outbound event for a transaction. The unique_id makes the
    /// delivery idempotent on the platform side as well: replays of the
    /// same transaction collapse into one event.
    pub fn for_record(record: &TransactionRecord) -> Self {
        let timestamp = record
            .occurred_at
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let email = record
            .customer
            .as_ref()
            .map(|c| c.email.clone())
            .unwrap_or_else(|| "unknown".to_string());

        Self::new(
            PURCHASE_METRIC.to_string(),
            unique_event_id(record),
            timestamp,
            record.total.to_f64().unwrap_or_default(),
            email,
            event_properties(record),
        )
    }

    /// Minimal zero-value event used by `check` to exercise authentication
    /// and reachability without touching real metrics.
    pub fn connection_check() -> Self {
        let mut properties = Map::new();
        properties.insert("test".to_string(), json!(true));

        Self::new(
            "Test".to_string(),
            "connection-check".to_string(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            0.0,
            "test@example.com".to_string(),
            properties,
        )
    }

    fn new(
        metric: String,
        unique_id: String,
        time: String,
        value: f64,
        email: String,
        properties: Map<String, Value>,
    ) -> Self {
        Self {
            data: EventData {
                kind: "event",
                attributes: EventAttributes {
                    properties,
                    time,
                    value,
                    unique_id,
                    metric: MetricRef {
                        data: MetricData {
                            kind: "metric",
                            attributes: MetricAttributes { name: metric },
                        },
                    },
                    profile: ProfileRef {
                        data: ProfileRefData {
                            kind: "profile",
                            attributes: ProfileRefAttributes { email },
                        },
                    },
                },
            },
        }
    }
}

/// Platform-side idempotency key, e.g. "POS_SALE_1041".
pub fn unique_event_id(record: &TransactionRecord) -> String {
    format!(
        "{}_{}_{}",
        UNIQUE_ID_PREFIX,
        record.kind.as_str().to_ascii_uppercase(),
        record.id
    )
}

fn event_properties(record: &TransactionRecord) -> Map<String, Value> {
    let mut properties = Map::new();

    properties.insert("InvoiceNumber".to_string(), json!(record.id));
    properties.insert("Products".to_string(), json!(products_summary(record)));
    properties.insert("Value".to_string(), json!(format!("${:.2}", record.total)));
    properties.insert(
        "StoreCode".to_string(),
        json!(record.store_code.clone().unwrap_or_default()),
    );
    properties.insert(
        "Timestamp".to_string(),
        json!(record.occurred_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
    );

    if record.kind == TransactionKind::Sale {
        properties.insert(
            "PaymentMethod".to_string(),
            json!(record
                .payment_method
                .clone()
                .unwrap_or_else(|| "Unknown".to_string())),
        );
        if let Some(customer) = &record.customer {
            properties.insert("CustomerName".to_string(), json!(customer.full_name()));
            properties.insert(
                "CustomerPhone".to_string(),
                json!(customer.phone.clone().unwrap_or_default()),
            );
        }
    }

    for (key, value) in &record.extra {
        properties.insert(key.clone(), json!(value));
    }

    properties
}

/// "Summary (SKU: X, Qty: N); ..." over line items that actually carry
/// product info, or "Unknown Product" when none do.
fn products_summary(record: &TransactionRecord) -> String {
    let parts: Vec<String> = record
        .line_items
        .iter()
        .filter(|item| !item.sku.is_empty() && !item.description.is_empty())
        .map(|item| item.summary())
        .collect();

    if parts.is_empty() {
        "Unknown Product".to_string()
    } else {
        parts.join("; ")
    }
}

// --- profiles ---

#[derive(Debug, Serialize)]
pub struct ProfileBody {
    pub data: ProfileData,
}

#[derive(Debug, Serialize)]
pub struct ProfileData {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub attributes: ProfileAttributes,
}

#[derive(Debug, Serialize)]
pub struct ProfileAttributes {
    pub email: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
}

impl ProfileBody {
    /// Profile upsert payload: the customer identity plus the store
    /// attribution properties carried on the triggering sale.
    pub fn for_customer(identity: &CustomerIdentity, record: &TransactionRecord) -> Self {
        let mut properties = Map::new();
        properties.insert(
            "First Name".to_string(),
            json!(identity.first_name.clone().unwrap_or_default()),
        );
        properties.insert(
            "Last Name".to_string(),
            json!(identity.last_name.clone().unwrap_or_default()),
        );
        properties.insert(
            "Phone".to_string(),
            json!(identity.phone.clone().unwrap_or_default()),
        );
        properties.insert(
            "Store Code".to_string(),
            json!(record.store_code.clone().unwrap_or_default()),
        );
        properties.insert(
            "Customer Since".to_string(),
            json!(record.occurred_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );

        Self {
            data: ProfileData {
                kind: "profile",
                attributes: ProfileAttributes {
                    email: identity.email.clone(),
                    properties,
                },
            },
        }
    }
}

/// Body for POST /lists/{id}/relationships/profiles/.
#[derive(Debug, Serialize)]
pub struct ListMembersBody {
    pub data: Vec<ListMemberRef>,
}

#[derive(Debug, Serialize)]
pub struct ListMemberRef {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
}

impl ListMembersBody {
    pub fn single(profile_id: &str) -> Self {
        Self {
            data: vec![ListMemberRef {
                kind: "profile",
                id: profile_id.to_string(),
            }],
        }
    }
}

// --- responses ---

#[derive(Debug, Deserialize)]
pub struct ProfileCreateResponse {
    #[serde(default)]
    pub data: Option<ProfileResource>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileResource {
    pub id: String,
}

/// 409 conflict body; the existing profile's id hides in errors[].meta.
#[derive(Debug, Deserialize)]
pub struct ProfileConflictResponse {
    #[serde(default)]
    pub errors: Vec<ConflictError>,
}

#[derive(Debug, Deserialize)]
pub struct ConflictError {
    #[serde(default)]
    pub meta: Option<ConflictMeta>,
}

#[derive(Debug, Deserialize)]
pub struct ConflictMeta {
    #[serde(default)]
    pub duplicate_profile_id: Option<String>,
}

impl ProfileConflictResponse {
    pub fn duplicate_profile_id(&self) -> Option<&str> {
        self.errors
            .first()?
            .meta
            .as_ref()?
            .duplicate_profile_id
            .as_deref()
    }
}

#[derive(Debug, Deserialize)]
pub struct ProfileQueryResponse {
    #[serde(default)]
    pub data: Vec<ProfileResource>,
}
