// ABOUTME: Runtime configuration resolved from CLI flags and environment variables
// ABOUTME: Validates required settings up front and reports every missing one at once

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

pub const LEDGER_FILE: &str = "ledger.json";
pub const LOCK_FILE: &str = "sync.lock";

/// Connection settings shared by the `run` and `check` commands. Every
/// value can come from a flag or its environment variable; secrets are
/// normally supplied via the environment by the scheduler.
#[derive(Args, Clone, Default, Debug)]
pub struct ConfigArgs {
    /// Base URL of the POS API
    #[arg(long = "pos-api-url", env = "POS_API_URL")]
    pub pos_api_url: Option<String>,
    /// API key sent to the POS API in the Token header
    #[arg(long = "pos-api-key", env = "POS_API_KEY", hide_env_values = true)]
    pub pos_api_key: Option<String>,
    /// Numeric code of the store whose transactions are synced
    #[arg(long = "pos-store-code", env = "POS_STORE_CODE")]
    pub pos_store_code: Option<String>,
    /// Base URL of the marketing platform API
    #[arg(long = "marketing-api-url", env = "MARKETING_API_URL")]
    pub marketing_api_url: Option<String>,
    /// API key for the marketing platform
    #[arg(
        long = "marketing-api-key",
        env = "MARKETING_API_KEY",
        hide_env_values = true
    )]
    pub marketing_api_key: Option<String>,
    /// Marketing list that customer profiles are attached to
    #[arg(long = "marketing-list-id", env = "MARKETING_LIST_ID")]
    pub marketing_list_id: Option<String>,
    /// Days of history to fetch when no explicit date range is given
    #[arg(long = "lookback-days", env = "LOOKBACK_DAYS", default_value_t = 7)]
    pub lookback_days: i64,
    /// Profile email for purchase events (purchase orders carry no customer)
    #[arg(
        long = "purchase-profile-email",
        env = "PURCHASE_PROFILE_EMAIL",
        default_value = "admin@store.com"
    )]
    pub purchase_profile_email: String,
    /// Directory holding the ledger and lock files (default: ~/.retail-sync)
    #[arg(long = "data-dir", env = "RETAIL_SYNC_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

/// Fully resolved configuration. Construction fails rather than letting a
/// half-configured sync touch either API.
#[derive(Debug, Clone)]
pub struct Config {
    pub pos_api_url: String,
    pub pos_api_key: String,
    pub pos_store_code: i64,
    pub marketing_api_url: String,
    pub marketing_api_key: String,
    pub marketing_list_id: String,
    pub lookback_days: i64,
    pub purchase_profile_email: String,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn resolve(args: ConfigArgs) -> Result<Self> {
        let mut missing = Vec::new();

        let pos_api_url = required(&args.pos_api_url, "POS_API_URL", &mut missing);
        let pos_api_key = required(&args.pos_api_key, "POS_API_KEY", &mut missing);
        let pos_store_code = required(&args.pos_store_code, "POS_STORE_CODE", &mut missing);
        let marketing_api_url = required(&args.marketing_api_url, "MARKETING_API_URL", &mut missing);
        let marketing_api_key = required(&args.marketing_api_key, "MARKETING_API_KEY", &mut missing);
        let marketing_list_id = required(&args.marketing_list_id, "MARKETING_LIST_ID", &mut missing);

        if !missing.is_empty() {
            anyhow::bail!(
                "Missing required configuration: {}.\n\
                 Set the environment variables above (or the matching --flags, \
                 see --help) and run again.",
                missing.join(", ")
            );
        }

        let pos_store_code: i64 = pos_store_code
            .trim()
            .parse()
            .with_context(|| format!("POS_STORE_CODE must be numeric, got '{}'", pos_store_code))?;

        if args.lookback_days < 1 {
            anyhow::bail!(
                "LOOKBACK_DAYS must be at least 1, got {}",
                args.lookback_days
            );
        }

        if !args.purchase_profile_email.contains('@') {
            anyhow::bail!(
                "PURCHASE_PROFILE_EMAIL must be an email address, got '{}'",
                args.purchase_profile_email
            );
        }

        let data_dir = resolve_data_dir(args.data_dir)?;

        Ok(Self {
            pos_api_url: pos_api_url.trim_end_matches('/').to_string(),
            pos_api_key,
            pos_store_code,
            marketing_api_url: marketing_api_url.trim_end_matches('/').to_string(),
            marketing_api_key,
            marketing_list_id,
            lookback_days: args.lookback_days,
            purchase_profile_email: args.purchase_profile_email,
            data_dir,
        })
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(LEDGER_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join(LOCK_FILE)
    }
}

fn required(value: &Option<String>, name: &'static str, missing: &mut Vec<&'static str>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v.clone(),
        _ => {
            missing.push(name);
            String::new()
        }
    }
}

/// State directory: an explicit path wins, otherwise ~/.retail-sync on
/// Unix or %LOCALAPPDATA%\retail-sync on Windows.
pub fn resolve_data_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }

    #[cfg(windows)]
    let dir = {
        let app_data = dirs::data_local_dir().context("Failed to determine AppData directory")?;
        app_data.join("retail-sync")
    };

    #[cfg(not(windows))]
    let dir = {
        let home = dirs::home_dir().context("Failed to determine home directory")?;
        home.join(".retail-sync")
    };

    Ok(dir)
}
