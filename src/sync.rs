// ABOUTME: Sync orchestrator - fetch, filter against the ledger, publish, record
// ABOUTME: Defines the source/publisher seams so the cycle runs against in-memory fakes in tests

use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;
use thiserror::Error;

use crate::error::ApiError;
use crate::ledger::{LedgerError, SyncLedger, SyncOutcome};
use crate::model::{CustomerIdentity, SyncWindow, TransactionKind, TransactionRecord};

/// Where candidate transactions come from.
#[async_trait]
pub trait TransactionSource {
    async fn fetch_sales(&self, window: &SyncWindow) -> Result<Vec<TransactionRecord>, ApiError>;
    async fn fetch_purchases(&self, window: &SyncWindow)
        -> Result<Vec<TransactionRecord>, ApiError>;
}

/// Where records are forwarded to.
#[async_trait]
pub trait EventPublisher {
    async fn publish_event(&self, record: &TransactionRecord) -> Result<(), ApiError>;
    async fn upsert_profile(
        &self,
        identity: &CustomerIdentity,
        record: &TransactionRecord,
    ) -> Result<(), ApiError>;
}

/// Errors that end a run early. Everything here maps to exit code 1;
/// per-record failures never surface through this type.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("POS API: {0}")]
    SourceAuth(#[source] ApiError),

    #[error("marketing API: {0}")]
    SinkAuth(#[source] ApiError),
}

/// The orchestrator's position in a run, for log readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Fetching,
    Filtering,
    Publishing,
    Persisting,
    Failed,
}

/// Per-kind counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindStats {
    pub fetched: usize,
    /// Success entry in the ledger; not re-sent.
    pub skipped_duplicates: usize,
    pub published: usize,
    /// Failed this run for reasons worth retrying; nothing recorded.
    pub failed_transient: usize,
    /// Failed this run for reasons a retry cannot fix; recorded as Failed.
    pub failed_permanent: usize,
    /// Failed entries from earlier runs, skipped but still reported.
    pub quarantined: usize,
    /// Customer profiles attached to the marketing list (sales only).
    pub profiles_added: usize,
    pub profiles_failed: usize,
    /// The fetch itself failed; this kind was skipped for the whole run.
    pub fetch_failed: bool,
}

impl KindStats {
    fn pending_failures(&self) -> usize {
        self.failed_permanent + self.quarantined
    }
}

/// What one run did, per kind plus the window it covered.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub window: SyncWindow,
    pub sales: KindStats,
    pub purchases: KindStats,
}

impl RunSummary {
    fn new(window: SyncWindow) -> Self {
        Self {
            window,
            sales: KindStats::default(),
            purchases: KindStats::default(),
        }
    }

    pub fn total_published(&self) -> usize {
        self.sales.published + self.purchases.published
    }

    pub fn total_skipped(&self) -> usize {
        self.sales.skipped_duplicates + self.purchases.skipped_duplicates
    }

    pub fn profiles_added(&self) -> usize {
        self.sales.profiles_added + self.purchases.profiles_added
    }

    /// True when records are sitting in permanent-failure state, fresh or
    /// quarantined. The run command turns this into exit code 2 so
    /// schedulers notice even though the run itself completed.
    pub fn has_permanent_failures(&self) -> bool {
        self.sales.pending_failures() + self.purchases.pending_failures() > 0
    }
}

/// Drives one sync cycle against a source and a publisher.
///
/// The runner itself is stateless between runs; everything durable lives
/// in the ledger. Records are published in fetch order and every
/// confirmed delivery is persisted before the next record is attempted,
/// so a crash can lose at most work, never delivery state.
pub struct SyncRunner<'a, S, P> {
    source: &'a S,
    publisher: &'a P,
    /// Identity substituted for purchase orders, which carry no customer.
    purchase_identity: CustomerIdentity,
    phase: RunPhase,
}

impl<'a, S, P> SyncRunner<'a, S, P>
where
    S: TransactionSource + Sync,
    P: EventPublisher + Sync,
{
    pub fn new(source: &'a S, publisher: &'a P, purchase_identity: CustomerIdentity) -> Self {
        Self {
            source,
            publisher,
            purchase_identity,
            phase: RunPhase::Idle,
        }
    }

    /// One full cycle: load the ledger, process the window, persist.
    ///
    /// A ledger that exists but cannot be read aborts the run before any
    /// network call is made.
    pub async fn run(
        &mut self,
        window: SyncWindow,
        ledger_path: &Path,
    ) -> Result<RunSummary, RunError> {
        let mut ledger = match SyncLedger::load(ledger_path) {
            Ok(ledger) => ledger,
            Err(err) => {
                self.set_phase(RunPhase::Failed);
                return Err(err.into());
            }
        };

        let result = self.process(window, &mut ledger, Some(ledger_path)).await;

        // Also persists on abort so auth failures keep earlier outcomes.
        self.set_phase(RunPhase::Persisting);
        if ledger.is_dirty() {
            if let Err(err) = ledger.save(ledger_path) {
                self.set_phase(RunPhase::Failed);
                return Err(err.into());
            }
        }
        self.set_phase(if result.is_ok() {
            RunPhase::Idle
        } else {
            RunPhase::Failed
        });

        result
    }

    /// The cycle body, separated from ledger load/store so tests can drive
    /// it with a prepared in-memory ledger. `persist_to: None` skips the
    /// per-success saves.
    pub async fn process(
        &mut self,
        window: SyncWindow,
        ledger: &mut SyncLedger,
        persist_to: Option<&Path>,
    ) -> Result<RunSummary, RunError> {
        let mut summary = RunSummary::new(window);
        tracing::info!("Starting sync for window {}", window);

        self.set_phase(RunPhase::Fetching);
        let sales = self
            .fetch_kind(TransactionKind::Sale, &window, &mut summary.sales)
            .await?;
        let purchases = self
            .fetch_kind(TransactionKind::Purchase, &window, &mut summary.purchases)
            .await?;

        if let Some(records) = sales {
            summary.sales =
                self.process_kind(TransactionKind::Sale, records, ledger, persist_to).await?;
        }
        if let Some(records) = purchases {
            summary.purchases = self
                .process_kind(TransactionKind::Purchase, records, ledger, persist_to)
                .await?;
        }

        tracing::info!(
            "Sync completed: {} published, {} duplicates skipped, {} profiles added",
            summary.total_published(),
            summary.total_skipped(),
            summary.profiles_added()
        );
        Ok(summary)
    }

    /// Fetch one kind. Auth failures abort the run; anything else skips
    /// just this kind so the other stream still syncs.
    async fn fetch_kind(
        &self,
        kind: TransactionKind,
        window: &SyncWindow,
        stats: &mut KindStats,
    ) -> Result<Option<Vec<TransactionRecord>>, RunError> {
        let fetched = match kind {
            TransactionKind::Sale => self.source.fetch_sales(window).await,
            TransactionKind::Purchase => self.source.fetch_purchases(window).await,
        };

        match fetched {
            Ok(records) => Ok(Some(records)),
            Err(err) if err.is_auth() => {
                tracing::error!("POS API rejected our credentials: {}", err);
                Err(RunError::SourceAuth(err))
            }
            Err(err) => {
                tracing::error!("Fetching {}s failed, skipping them this run: {}", kind, err);
                stats.fetch_failed = true;
                Ok(None)
            }
        }
    }

    async fn process_kind(
        &mut self,
        kind: TransactionKind,
        records: Vec<TransactionRecord>,
        ledger: &mut SyncLedger,
        persist_to: Option<&Path>,
    ) -> Result<KindStats, RunError> {
        let mut stats = KindStats {
            fetched: records.len(),
            ..KindStats::default()
        };

        self.set_phase(RunPhase::Filtering);
        let mut pending = Vec::new();
        for mut record in records {
            if ledger.contains(kind, &record.id) {
                tracing::debug!("Skipping already-synced {}", record.dedup_key());
                stats.skipped_duplicates += 1;
                continue;
            }
            if ledger.outcome(kind, &record.id) == Some(SyncOutcome::Failed) {
                tracing::warn!(
                    "{} failed permanently on an earlier run; re-drive it with \
                     'retail-sync ledger clear' or leave it quarantined",
                    record.dedup_key()
                );
                stats.quarantined += 1;
                continue;
            }

            if record.kind == TransactionKind::Purchase && record.customer.is_none() {
                record.customer = Some(self.purchase_identity.clone());
            }
            pending.push(record);
        }

        self.set_phase(RunPhase::Publishing);
        for record in pending {
            // Validation failures are permanent: the same record would be
            // rejected again next run, so quarantine without a sink call.
            if let Err(reason) = record.validate() {
                tracing::warn!("{} failed validation: {}", record.dedup_key(), reason);
                ledger.record(kind, &record.id, SyncOutcome::Failed, Utc::now());
                self.persist(ledger, persist_to)?;
                stats.failed_permanent += 1;
                continue;
            }

            match self.publisher.publish_event(&record).await {
                Ok(()) => {
                    // Record and persist before anything else can fail, so
                    // a crash from here on never causes a duplicate send.
                    ledger.record(kind, &record.id, SyncOutcome::Success, Utc::now());
                    self.persist(ledger, persist_to)?;
                    stats.published += 1;

                    if kind == TransactionKind::Sale {
                        self.upsert_sale_profile(&record, &mut stats).await;
                    }
                }
                Err(err) if err.is_auth() => {
                    tracing::error!("Marketing API rejected our credentials: {}", err);
                    return Err(RunError::SinkAuth(err));
                }
                Err(err) if err.is_transient() => {
                    tracing::warn!(
                        "{} hit a transient failure, will retry next run: {}",
                        record.dedup_key(),
                        err
                    );
                    stats.failed_transient += 1;
                }
                Err(err) => {
                    tracing::error!("{} was permanently rejected: {}", record.dedup_key(), err);
                    ledger.record(kind, &record.id, SyncOutcome::Failed, Utc::now());
                    self.persist(ledger, persist_to)?;
                    stats.failed_permanent += 1;
                }
            }
        }

        Ok(stats)
    }

    /// Keep the customer's marketing profile current after a delivered
    /// sale. Best-effort: the event is already recorded, so a profile
    /// problem must not fail the record or the run.
    async fn upsert_sale_profile(&self, record: &TransactionRecord, stats: &mut KindStats) {
        let identity = match record.customer.as_ref().filter(|c| c.has_valid_email()) {
            Some(identity) => identity,
            None => return,
        };

        match self.publisher.upsert_profile(identity, record).await {
            Ok(()) => stats.profiles_added += 1,
            Err(err) => {
                tracing::warn!("Profile upsert for {} failed: {}", identity.email, err);
                stats.profiles_failed += 1;
            }
        }
    }

    fn persist(&self, ledger: &mut SyncLedger, persist_to: Option<&Path>) -> Result<(), RunError> {
        if let Some(path) = persist_to {
            ledger.save(path)?;
        }
        Ok(())
    }

    fn set_phase(&mut self, phase: RunPhase) {
        if self.phase != phase {
            tracing::debug!("Run phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LineItem;
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const FALLBACK_EMAIL: &str = "admin@store.com";

    enum Failure {
        Auth,
        Transient,
        Permanent,
    }

    impl Failure {
        fn to_error(&self) -> ApiError {
            match self {
                Failure::Auth => ApiError::Auth("key rejected".to_string()),
                Failure::Transient => ApiError::Transient("gateway timeout".to_string()),
                Failure::Permanent => ApiError::Permanent("payload rejected".to_string()),
            }
        }
    }

    #[derive(Default)]
    struct FakeSource {
        sales: Vec<TransactionRecord>,
        purchases: Vec<TransactionRecord>,
        sales_failure: Option<Failure>,
        purchases_failure: Option<Failure>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl TransactionSource for FakeSource {
        async fn fetch_sales(
            &self,
            _window: &SyncWindow,
        ) -> Result<Vec<TransactionRecord>, ApiError> {
            *self.calls.lock().unwrap() += 1;
            match &self.sales_failure {
                Some(failure) => Err(failure.to_error()),
                None => Ok(self.sales.clone()),
            }
        }

        async fn fetch_purchases(
            &self,
            _window: &SyncWindow,
        ) -> Result<Vec<TransactionRecord>, ApiError> {
            *self.calls.lock().unwrap() += 1;
            match &self.purchases_failure {
                Some(failure) => Err(failure.to_error()),
                None => Ok(self.purchases.clone()),
            }
        }
    }

    #[derive(Default)]
    struct FakePublisher {
        /// (dedup key, profile email) per accepted event, in publish order.
        published: Mutex<Vec<(String, String)>>,
        profiles: Mutex<Vec<String>>,
        event_failures: Mutex<HashMap<String, Failure>>,
        profile_failure: bool,
    }

    impl FakePublisher {
        fn fail_event(&self, key: &str, failure: Failure) {
            self.event_failures
                .lock()
                .unwrap()
                .insert(key.to_string(), failure);
        }

        fn published_keys(&self) -> Vec<String> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .map(|(key, _)| key.clone())
                .collect()
        }
    }

    #[async_trait]
    impl EventPublisher for FakePublisher {
        async fn publish_event(&self, record: &TransactionRecord) -> Result<(), ApiError> {
            if let Some(failure) = self.event_failures.lock().unwrap().get(&record.dedup_key()) {
                return Err(failure.to_error());
            }
            let email = record
                .customer
                .as_ref()
                .map(|c| c.email.clone())
                .unwrap_or_default();
            self.published
                .lock()
                .unwrap()
                .push((record.dedup_key(), email));
            Ok(())
        }

        async fn upsert_profile(
            &self,
            identity: &CustomerIdentity,
            _record: &TransactionRecord,
        ) -> Result<(), ApiError> {
            if self.profile_failure {
                return Err(ApiError::Transient("profile endpoint down".to_string()));
            }
            self.profiles.lock().unwrap().push(identity.email.clone());
            Ok(())
        }
    }

    fn sale(id: &str, email: &str) -> TransactionRecord {
        TransactionRecord {
            kind: TransactionKind::Sale,
            id: id.to_string(),
            occurred_at: Utc::now(),
            customer: Some(CustomerIdentity::from_email(email)),
            total: "100.00".parse().unwrap(),
            line_items: vec![LineItem {
                sku: "SKU-1".to_string(),
                description: "Widget".to_string(),
                quantity: Decimal::ONE,
            }],
            payment_method: Some("Cash".to_string()),
            store_code: Some("12".to_string()),
            extra: Default::default(),
        }
    }

    fn purchase(id: &str) -> TransactionRecord {
        let mut record = sale(id, "");
        record.kind = TransactionKind::Purchase;
        record.customer = None;
        record.payment_method = None;
        record
    }

    fn runner<'a>(
        source: &'a FakeSource,
        publisher: &'a FakePublisher,
    ) -> SyncRunner<'a, FakeSource, FakePublisher> {
        SyncRunner::new(
            source,
            publisher,
            CustomerIdentity::from_email(FALLBACK_EMAIL),
        )
    }

    fn window() -> SyncWindow {
        SyncWindow::lookback(7)
    }

    #[tokio::test]
    async fn test_first_run_publishes_in_fetch_order() {
        let source = FakeSource {
            sales: vec![sale("1", "a@x.com"), sale("2", "b@x.com")],
            purchases: vec![purchase("PO-1")],
            ..Default::default()
        };
        let publisher = FakePublisher::default();
        let mut ledger = SyncLedger::new();

        let summary = runner(&source, &publisher)
            .process(window(), &mut ledger, None)
            .await
            .unwrap();

        assert_eq!(
            publisher.published_keys(),
            vec!["sale:1", "sale:2", "purchase:PO-1"]
        );
        assert_eq!(summary.sales.published, 2);
        assert_eq!(summary.purchases.published, 1);
        assert!(!summary.has_permanent_failures());
        assert!(ledger.contains(TransactionKind::Sale, "1"));
        assert!(ledger.contains(TransactionKind::Purchase, "PO-1"));
    }

    #[tokio::test]
    async fn test_second_run_over_same_data_publishes_nothing() {
        let source = FakeSource {
            sales: vec![sale("1", "a@x.com"), sale("2", "b@x.com")],
            ..Default::default()
        };
        let publisher = FakePublisher::default();
        let mut ledger = SyncLedger::new();

        let mut runner = runner(&source, &publisher);
        runner.process(window(), &mut ledger, None).await.unwrap();
        let second = runner.process(window(), &mut ledger, None).await.unwrap();

        assert_eq!(publisher.published_keys().len(), 2);
        assert_eq!(second.sales.published, 0);
        assert_eq!(second.sales.skipped_duplicates, 2);
    }

    #[tokio::test]
    async fn test_partial_overlap_publishes_only_unseen() {
        // Window [S1, S2] where S1 was delivered by an earlier run.
        let source = FakeSource {
            sales: vec![sale("S1", "a@x.com"), sale("S2", "b@x.com")],
            ..Default::default()
        };
        let publisher = FakePublisher::default();
        let mut ledger = SyncLedger::new();
        ledger.record(TransactionKind::Sale, "S1", SyncOutcome::Success, Utc::now());

        let summary = runner(&source, &publisher)
            .process(window(), &mut ledger, None)
            .await
            .unwrap();

        assert_eq!(publisher.published_keys(), vec!["sale:S2"]);
        assert_eq!(summary.sales.skipped_duplicates, 1);
        assert_eq!(summary.sales.published, 1);
        assert_eq!(summary.sales.failed_permanent, 0);
        assert!(ledger.contains(TransactionKind::Sale, "S1"));
        assert!(ledger.contains(TransactionKind::Sale, "S2"));
    }

    #[tokio::test]
    async fn test_transient_failure_retried_until_it_succeeds() {
        let source = FakeSource {
            sales: vec![sale("1", "a@x.com"), sale("2", "b@x.com")],
            ..Default::default()
        };
        let publisher = FakePublisher::default();
        publisher.fail_event("sale:2", Failure::Transient);
        let mut ledger = SyncLedger::new();
        let mut runner = runner(&source, &publisher);

        let first = runner.process(window(), &mut ledger, None).await.unwrap();
        assert_eq!(first.sales.published, 1);
        assert_eq!(first.sales.failed_transient, 1);
        // Nothing recorded for the transient failure.
        assert_eq!(ledger.outcome(TransactionKind::Sale, "2"), None);
        assert!(!first.has_permanent_failures());

        // The outage clears; the next run delivers it.
        publisher.event_failures.lock().unwrap().clear();
        let second = runner.process(window(), &mut ledger, None).await.unwrap();
        assert_eq!(second.sales.published, 1);
        assert_eq!(second.sales.skipped_duplicates, 1);

        // And from then on it is a duplicate.
        let third = runner.process(window(), &mut ledger, None).await.unwrap();
        assert_eq!(third.sales.published, 0);
        assert_eq!(third.sales.skipped_duplicates, 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_quarantined_not_retried() {
        let source = FakeSource {
            sales: vec![sale("1", "a@x.com")],
            ..Default::default()
        };
        let publisher = FakePublisher::default();
        publisher.fail_event("sale:1", Failure::Permanent);
        let mut ledger = SyncLedger::new();
        let mut runner = runner(&source, &publisher);

        let first = runner.process(window(), &mut ledger, None).await.unwrap();
        assert_eq!(first.sales.failed_permanent, 1);
        assert!(first.has_permanent_failures());
        assert_eq!(
            ledger.outcome(TransactionKind::Sale, "1"),
            Some(SyncOutcome::Failed)
        );

        // Even with the sink healthy again, the quarantined record is not
        // re-sent, but it stays visible in the failure counts.
        publisher.event_failures.lock().unwrap().clear();
        let second = runner.process(window(), &mut ledger, None).await.unwrap();
        assert!(publisher.published_keys().is_empty());
        assert_eq!(second.sales.quarantined, 1);
        assert!(second.has_permanent_failures());
    }

    #[tokio::test]
    async fn test_validation_failure_recorded_without_sink_call() {
        let source = FakeSource {
            sales: vec![sale("1", "no-at-sign"), sale("2", "ok@x.com")],
            ..Default::default()
        };
        let publisher = FakePublisher::default();
        let mut ledger = SyncLedger::new();

        let summary = runner(&source, &publisher)
            .process(window(), &mut ledger, None)
            .await
            .unwrap();

        // The invalid record never reached the publisher; the valid one did.
        assert_eq!(publisher.published_keys(), vec!["sale:2"]);
        assert_eq!(summary.sales.failed_permanent, 1);
        assert_eq!(summary.sales.published, 1);
        assert_eq!(
            ledger.outcome(TransactionKind::Sale, "1"),
            Some(SyncOutcome::Failed)
        );
    }

    #[tokio::test]
    async fn test_successes_persisted_before_later_abort() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let source = FakeSource {
            sales: vec![sale("1", "a@x.com"), sale("2", "b@x.com")],
            ..Default::default()
        };
        let publisher = FakePublisher::default();
        publisher.fail_event("sale:2", Failure::Auth);
        let mut ledger = SyncLedger::new();

        let result = runner(&source, &publisher)
            .process(window(), &mut ledger, Some(&path))
            .await;
        assert!(matches!(result, Err(RunError::SinkAuth(_))));

        // The first success hit the disk before the abort, so a fresh
        // process (or a crash here) cannot re-send it.
        let reloaded = SyncLedger::load(&path).unwrap();
        assert!(reloaded.contains(TransactionKind::Sale, "1"));
        assert_eq!(reloaded.outcome(TransactionKind::Sale, "2"), None);
    }

    #[tokio::test]
    async fn test_source_auth_aborts_before_publishing() {
        let source = FakeSource {
            sales_failure: Some(Failure::Auth),
            purchases: vec![purchase("PO-1")],
            ..Default::default()
        };
        let publisher = FakePublisher::default();
        let mut ledger = SyncLedger::new();

        let result = runner(&source, &publisher)
            .process(window(), &mut ledger, None)
            .await;

        assert!(matches!(result, Err(RunError::SourceAuth(_))));
        assert!(publisher.published_keys().is_empty());
        assert!(!ledger.is_dirty());
    }

    #[tokio::test]
    async fn test_transient_fetch_skips_kind_but_not_run() {
        let source = FakeSource {
            sales_failure: Some(Failure::Transient),
            purchases: vec![purchase("PO-1")],
            ..Default::default()
        };
        let publisher = FakePublisher::default();
        let mut ledger = SyncLedger::new();

        let summary = runner(&source, &publisher)
            .process(window(), &mut ledger, None)
            .await
            .unwrap();

        assert!(summary.sales.fetch_failed);
        assert_eq!(summary.sales.fetched, 0);
        assert_eq!(summary.purchases.published, 1);
        assert!(!summary.has_permanent_failures());
    }

    #[tokio::test]
    async fn test_purchases_published_under_fallback_identity() {
        let source = FakeSource {
            purchases: vec![purchase("PO-1")],
            ..Default::default()
        };
        let publisher = FakePublisher::default();
        let mut ledger = SyncLedger::new();

        runner(&source, &publisher)
            .process(window(), &mut ledger, None)
            .await
            .unwrap();

        let published = publisher.published.lock().unwrap().clone();
        assert_eq!(published, vec![("purchase:PO-1".to_string(), FALLBACK_EMAIL.to_string())]);
        // Purchases never create marketing profiles.
        assert!(publisher.profiles.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sale_profile_upserted_after_publish() {
        let source = FakeSource {
            sales: vec![sale("1", "jane@x.com")],
            purchases: vec![purchase("PO-1")],
            ..Default::default()
        };
        let publisher = FakePublisher::default();
        let mut ledger = SyncLedger::new();

        let summary = runner(&source, &publisher)
            .process(window(), &mut ledger, None)
            .await
            .unwrap();

        assert_eq!(*publisher.profiles.lock().unwrap(), vec!["jane@x.com"]);
        assert_eq!(summary.sales.profiles_added, 1);
        assert_eq!(summary.purchases.profiles_added, 0);
    }

    #[tokio::test]
    async fn test_profile_failure_does_not_fail_record_or_run() {
        let source = FakeSource {
            sales: vec![sale("1", "jane@x.com")],
            ..Default::default()
        };
        let publisher = FakePublisher {
            profile_failure: true,
            ..Default::default()
        };
        let mut ledger = SyncLedger::new();

        let summary = runner(&source, &publisher)
            .process(window(), &mut ledger, None)
            .await
            .unwrap();

        assert_eq!(summary.sales.published, 1);
        assert_eq!(summary.sales.profiles_failed, 1);
        assert!(!summary.has_permanent_failures());
        assert!(ledger.contains(TransactionKind::Sale, "1"));
    }

    #[tokio::test]
    async fn test_corrupt_ledger_aborts_before_any_network_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "{{{{").unwrap();

        let source = FakeSource {
            sales: vec![sale("1", "a@x.com")],
            ..Default::default()
        };
        let publisher = FakePublisher::default();

        let result = runner(&source, &publisher).run(window(), &path).await;

        assert!(matches!(
            result,
            Err(RunError::Ledger(LedgerError::Corrupt { .. }))
        ));
        assert_eq!(*source.calls.lock().unwrap(), 0);
        assert!(publisher.published_keys().is_empty());
    }

    #[tokio::test]
    async fn test_run_persists_and_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let source = FakeSource {
            sales: vec![sale("1", "a@x.com")],
            ..Default::default()
        };
        let publisher = FakePublisher::default();

        runner(&source, &publisher).run(window(), &path).await.unwrap();

        // A brand-new runner (fresh process) sees the delivery.
        let publisher2 = FakePublisher::default();
        let summary = runner(&source, &publisher2).run(window(), &path).await.unwrap();
        assert_eq!(summary.sales.skipped_duplicates, 1);
        assert!(publisher2.published_keys().is_empty());
    }

    #[tokio::test]
    async fn test_empty_window_is_a_normal_success() {
        let source = FakeSource::default();
        let publisher = FakePublisher::default();
        let mut ledger = SyncLedger::new();

        let summary = runner(&source, &publisher)
            .process(window(), &mut ledger, None)
            .await
            .unwrap();

        assert_eq!(summary.total_published(), 0);
        assert!(!summary.has_permanent_failures());
        assert!(!ledger.is_dirty());
    }
}
