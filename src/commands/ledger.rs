// ABOUTME: The `ledger` subcommands - inspect and repair the dedup ledger
// ABOUTME: status lists counts and quarantined entries; clear and reset re-drive records

use anyhow::{anyhow, bail, Result};
use std::path::PathBuf;

use crate::config;
use crate::ledger::SyncLedger;
use crate::model::TransactionKind;

pub fn status(data_dir: Option<PathBuf>) -> Result<()> {
    let path = ledger_path(data_dir)?;
    if !path.exists() {
        println!(
            "No ledger at {} yet; the first run will create it.",
            path.display()
        );
        return Ok(());
    }

    let ledger = SyncLedger::load(&path)?;
    let (succeeded, failed) = ledger.counts();

    println!("Ledger: {}", path.display());
    println!(
        "  Entries: {} ({} succeeded, {} failed)",
        ledger.len(),
        succeeded,
        failed
    );
    println!(
        "  Last updated: {}",
        ledger.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    let failures = ledger.failures();
    if !failures.is_empty() {
        println!();
        println!("Quarantined (not retried until cleared):");
        for (key, entry) in failures {
            println!(
                "  {} (failed {})",
                key,
                entry.synced_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        println!();
        println!("Re-drive one with 'retail-sync ledger clear --kind <kind> --id <id>'.");
    }

    Ok(())
}

pub fn clear(data_dir: Option<PathBuf>, kind: &str, id: &str) -> Result<()> {
    let kind: TransactionKind = kind.parse().map_err(|e: String| anyhow!(e))?;
    let path = ledger_path(data_dir)?;

    let mut ledger = SyncLedger::load(&path)?;
    if !ledger.remove(kind, id) {
        bail!("No ledger entry for {}", SyncLedger::key(kind, id));
    }
    ledger.save(&path)?;

    println!(
        "Cleared {}; the next run re-delivers it if it falls inside the window.",
        SyncLedger::key(kind, id)
    );
    Ok(())
}

pub fn reset(data_dir: Option<PathBuf>, yes: bool) -> Result<()> {
    let path = ledger_path(data_dir)?;

    if !yes {
        bail!(
            "Refusing to reset the ledger without --yes.\n\
             Every transaction in the next run's window would be re-sent to the \
             marketing platform."
        );
    }

    // Still works when the file is corrupt; reset is the recovery path of
    // last resort.
    let previous = SyncLedger::load(&path).map(|l| l.len()).ok();
    let mut fresh = SyncLedger::new();
    fresh.save(&path)?;

    match previous {
        Some(count) => println!("Ledger reset ({} entries dropped).", count),
        None => println!("Ledger reset (the previous file was unreadable)."),
    }
    Ok(())
}

fn ledger_path(data_dir: Option<PathBuf>) -> Result<PathBuf> {
    Ok(config::resolve_data_dir(data_dir)?.join(config::LEDGER_FILE))
}
