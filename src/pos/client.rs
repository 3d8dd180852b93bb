// ABOUTME: HTTP client for the POS API - transaction and purchase-order endpoints
// ABOUTME: Paginates with Skip/Take and classifies failures for the orchestrator

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use super::models::{PurchaseOrderQuery, PurchaseOrderResponse, SaleQuery, SaleResponse};
use crate::error::ApiError;
use crate::model::{SyncWindow, TransactionRecord};
use crate::sync::TransactionSource;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: usize = 100;

pub struct PosClient {
    client: Client,
    base_url: String,
    api_key: String,
    store_code: i64,
}

impl PosClient {
    pub fn new(base_url: &str, api_key: &str, store_code: i64) -> Result<Self> {
        let client = Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            store_code,
        })
    }

    /// Every POS endpoint is a POST with a JSON body, authenticated by a
    /// Token header.
    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("POS request: POST {}", url);

        let response = self
            .client
            .post(&url)
            .header("Token", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl TransactionSource for PosClient {
    /// Fetch sale tickets in the window. The endpoint filters by date
    /// server-side; we page with Skip/Take until a short page.
    async fn fetch_sales(&self, window: &SyncWindow) -> Result<Vec<TransactionRecord>, ApiError> {
        let start = window.start.format("%Y-%m-%d").to_string();
        let end = window.end.format("%Y-%m-%d").to_string();
        tracing::info!("Fetching sales from {} to {}", start, end);

        let mut records = Vec::new();
        let mut skip = 0;

        loop {
            let query = SaleQuery {
                batch_start_date: start.clone(),
                batch_end_date: end.clone(),
                ticket_date_start: start.clone(),
                ticket_date_end: end.clone(),
                store_code: self.store_code,
                skip,
                take: PAGE_SIZE,
            };

            let response: SaleResponse = self.post_json("/POS/GetPOSTransaction", &query).await?;
            if !response.is_successful {
                return Err(ApiError::Permanent(format!(
                    "POS API rejected the sales query: {}",
                    response.message.as_deref().unwrap_or("no detail given")
                )));
            }

            let mut page_len = 0;
            for batch in response.sales {
                for header in batch.sale_headers {
                    page_len += 1;
                    if let Some(record) = header.into_record() {
                        records.push(record);
                    }
                }
            }

            if page_len < PAGE_SIZE {
                break;
            }
            skip += PAGE_SIZE;
        }

        tracing::info!("Fetched {} sales", records.len());
        Ok(records)
    }

    /// Fetch purchase orders. The endpoint takes no date bounds, so the
    /// window is applied client-side on the OrderedOn date.
    async fn fetch_purchases(
        &self,
        window: &SyncWindow,
    ) -> Result<Vec<TransactionRecord>, ApiError> {
        tracing::info!("Fetching purchase orders for window {}", window);

        let mut records = Vec::new();
        let mut skip = 0;

        loop {
            let query = PurchaseOrderQuery {
                bill_to_store_code: self.store_code,
                skip,
                take: PAGE_SIZE,
            };

            let response: PurchaseOrderResponse = self
                .post_json("/PurchaseOrder/GetPurchaseOrder", &query)
                .await?;
            if !response.is_successful {
                return Err(ApiError::Permanent(format!(
                    "POS API rejected the purchase-order query: {}",
                    response.message.as_deref().unwrap_or("no detail given")
                )));
            }

            let page_len = response.purchase_orders.len();
            for order in response.purchase_orders {
                match order.ordered_at() {
                    Some(at) if window.contains(&at) => {
                        if let Some(record) = order.into_record() {
                            records.push(record);
                        }
                    }
                    Some(_) => {}
                    None => tracing::debug!(
                        "Purchase order {} has no usable order date, skipping",
                        order.purchase_order_number.as_deref().unwrap_or("<none>")
                    ),
                }
            }

            if page_len < PAGE_SIZE {
                break;
            }
            skip += PAGE_SIZE;
        }

        tracing::info!("Fetched {} purchase orders in window", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = PosClient::new("https://pos.example.com/", "key", 12);
        assert!(client.is_ok());
        // Trailing slash trimmed so path joins do not double up.
        assert_eq!(client.unwrap().base_url, "https://pos.example.com");
    }

    #[test]
    fn test_sale_query_wire_format() {
        let query = SaleQuery {
            batch_start_date: "2026-03-07".to_string(),
            batch_end_date: "2026-03-14".to_string(),
            ticket_date_start: "2026-03-07".to_string(),
            ticket_date_end: "2026-03-14".to_string(),
            store_code: 12,
            skip: 0,
            take: 100,
        };

        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(value["BatchStartDate"], "2026-03-07");
        assert_eq!(value["TicketDateEnd"], "2026-03-14");
        assert_eq!(value["StoreCode"], 12);
        assert_eq!(value["Skip"], 0);
        assert_eq!(value["Take"], 100);
    }

    #[test]
    fn test_purchase_query_wire_format() {
        let query = PurchaseOrderQuery {
            bill_to_store_code: 12,
            skip: 200,
            take: 100,
        };

        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(value["BillToStoreCode"], 12);
        assert_eq!(value["Skip"], 200);
        assert_eq!(value["Take"], 100);
    }
}
