// ABOUTME: The `run` command - one complete sync cycle under the run lock
// ABOUTME: Maps the cycle outcome onto the exit code so schedulers notice failures

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveTime};
use std::process::ExitCode;

use crate::config::{Config, ConfigArgs};
use crate::lock::RunLock;
use crate::marketing::MarketingClient;
use crate::model::{CustomerIdentity, SyncWindow};
use crate::pos::PosClient;
use crate::sync::{KindStats, RunSummary, SyncRunner};

pub struct RunOptions {
    pub config: ConfigArgs,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub async fn run(opts: RunOptions) -> Result<ExitCode> {
    let config = Config::resolve(opts.config)?;
    let window = resolve_window(&config, opts.from, opts.to)?;

    // Overlapping runs would race on the ledger; the newcomer yields.
    let _lock = RunLock::acquire(&config.lock_path())?;

    let source = PosClient::new(
        &config.pos_api_url,
        &config.pos_api_key,
        config.pos_store_code,
    )?;
    let publisher = MarketingClient::new(
        &config.marketing_api_url,
        &config.marketing_api_key,
        &config.marketing_list_id,
    )?;

    let mut runner = SyncRunner::new(
        &source,
        &publisher,
        CustomerIdentity::from_email(&config.purchase_profile_email),
    );
    let summary = runner.run(window, &config.ledger_path()).await?;

    print_summary(&summary);

    if summary.has_permanent_failures() {
        // The run completed, but some records need operator attention.
        Ok(ExitCode::from(2))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Explicit `--from`/`--to` dates win over the lookback window. The dates
/// are inclusive; the window's half-open end lands at the midnight after
/// `--to`.
fn resolve_window(config: &Config, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<SyncWindow> {
    match (from, to) {
        (None, None) => Ok(SyncWindow::lookback(config.lookback_days)),
        (Some(from), Some(to)) => {
            if from > to {
                bail!("--from {} is after --to {}", from, to);
            }
            let start = from.and_time(NaiveTime::MIN).and_utc();
            let end = to
                .succ_opt()
                .context("--to is out of the representable date range")?
                .and_time(NaiveTime::MIN)
                .and_utc();
            Ok(SyncWindow::new(start, end))
        }
        _ => bail!("--from and --to must be given together"),
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("========================================");
    println!("Sync complete ({})", summary.window);
    println!("========================================");
    print_kind("Sales", &summary.sales);
    print_kind("Purchase orders", &summary.purchases);
    println!("  Profiles added: {}", summary.profiles_added());

    if summary.has_permanent_failures() {
        println!();
        println!("Some records failed permanently and will not be retried automatically.");
        println!("Inspect them with 'retail-sync ledger status'; re-drive one with");
        println!("'retail-sync ledger clear --kind <kind> --id <id>'.");
    }
}

fn print_kind(label: &str, stats: &KindStats) {
    if stats.fetch_failed {
        println!("  {}: fetch failed, skipped this run", label);
        return;
    }
    println!(
        "  {}: {} fetched, {} published, {} duplicates skipped",
        label, stats.fetched, stats.published, stats.skipped_duplicates
    );
    if stats.failed_transient > 0 {
        println!(
            "    transient failures (retried next run): {}",
            stats.failed_transient
        );
    }
    if stats.failed_permanent > 0 {
        println!("    permanent failures (quarantined): {}", stats.failed_permanent);
    }
    if stats.quarantined > 0 {
        println!("    quarantined from earlier runs: {}", stats.quarantined);
    }
    if stats.profiles_failed > 0 {
        println!("    profile upserts failed: {}", stats.profiles_failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use std::path::PathBuf;

    fn config() -> Config {
        Config::resolve(ConfigArgs {
            pos_api_url: Some("https://pos.example.com".to_string()),
            pos_api_key: Some("k".to_string()),
            pos_store_code: Some("1".to_string()),
            marketing_api_url: Some("https://marketing.example.com".to_string()),
            marketing_api_key: Some("k".to_string()),
            marketing_list_id: Some("L".to_string()),
            lookback_days: 3,
            purchase_profile_email: "admin@store.com".to_string(),
            data_dir: Some(PathBuf::from("/tmp/retail-sync-test")),
        })
        .unwrap()
    }

    #[test]
    fn test_explicit_dates_are_inclusive() {
        let from = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        let window = resolve_window(&config(), Some(from), Some(to)).unwrap();
        assert_eq!(window.start.day(), 1);
        // Half-open end at the midnight after --to.
        assert_eq!(window.end.day(), 3);
        assert_eq!(window.end.hour(), 0);
    }

    #[test]
    fn test_dates_must_come_in_pairs() {
        let from = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert!(resolve_window(&config(), Some(from), None).is_err());
        assert!(resolve_window(&config(), None, Some(from)).is_err());
    }

    #[test]
    fn test_from_after_to_rejected() {
        let from = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert!(resolve_window(&config(), Some(from), Some(to)).is_err());
    }

    #[test]
    fn test_default_window_uses_lookback() {
        let window = resolve_window(&config(), None, None).unwrap();
        let days = (window.end - window.start).num_days();
        assert_eq!(days, 3);
    }
}
