// ABOUTME: The `check` command - verifies both API credentials before scheduling runs
// ABOUTME: Prints one line per check and exits non-zero if either API is unusable

use anyhow::Result;
use std::process::ExitCode;

use crate::config::{Config, ConfigArgs};
use crate::marketing::MarketingClient;
use crate::model::SyncWindow;
use crate::pos::PosClient;
use crate::sync::TransactionSource;

struct CheckResult {
    passed: bool,
    message: String,
    details: Option<String>,
}

impl CheckResult {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: None,
        }
    }

    fn fail(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: Some(details.into()),
        }
    }
}

pub async fn check(args: ConfigArgs) -> Result<ExitCode> {
    let config = Config::resolve(args)?;

    println!();
    println!("Connection Checks");
    println!("{}", "═".repeat(61));
    println!();

    let results = [check_pos(&config).await, check_marketing(&config).await];

    for result in &results {
        let icon = if result.passed { "✓" } else { "✗" };
        println!("  {} {}", icon, result.message);
        if let Some(details) = &result.details {
            println!("      {}", details);
        }
    }

    println!();
    println!("{}", "═".repeat(61));

    let failed = results.iter().filter(|r| !r.passed).count();
    if failed == 0 {
        println!("PASSED: both APIs are reachable and accepted the credentials");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("FAILED: {} check(s) did not pass", failed);
        Ok(ExitCode::FAILURE)
    }
}

/// A one-day sales fetch exercises the URL, the key, and the store code
/// without writing anything.
async fn check_pos(config: &Config) -> CheckResult {
    let client = match PosClient::new(
        &config.pos_api_url,
        &config.pos_api_key,
        config.pos_store_code,
    ) {
        Ok(client) => client,
        Err(err) => return CheckResult::fail("POS API client", format!("{:#}", err)),
    };

    match client.fetch_sales(&SyncWindow::lookback(1)).await {
        Ok(records) => CheckResult::pass(format!(
            "POS API reachable ({} sale(s) seen in the last day)",
            records.len()
        )),
        Err(err) => CheckResult::fail("POS API", err.to_string()),
    }
}

async fn check_marketing(config: &Config) -> CheckResult {
    let client = match MarketingClient::new(
        &config.marketing_api_url,
        &config.marketing_api_key,
        &config.marketing_list_id,
    ) {
        Ok(client) => client,
        Err(err) => return CheckResult::fail("Marketing API client", format!("{:#}", err)),
    };

    match client.check_connection().await {
        Ok(()) => CheckResult::pass("Marketing API accepted a test event"),
        Err(err) => CheckResult::fail("Marketing API", err.to_string()),
    }
}
