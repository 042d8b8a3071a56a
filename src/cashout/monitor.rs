//! Monitor sweeps - background polling loops
//!
//! Three periodic sweeps keep transactions moving without device input:
//! a live sweep that re-polls recent incoming transactions, a stale sweep
//! that keeps polling the long tail, and a notification sweep that tells
//! customers their cash is ready. All sweep work is best effort; a row
//! failure is logged and never stops the batch or the loop.

use chrono::{Duration as ChronoDuration, Utc};
use futures::future::join_all;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

use super::engine::LifecycleEngine;
use super::error::CashOutError;
use super::integration::IntegrationDirectory;
use super::status::CashOutStatus;
use super::store;
use super::types::CashOutTx;
use crate::config::CashOutConfig;

/// Statuses the live sweep keeps re-polling: deposit not yet seen or
/// confirmed on the funding side.
const LIVE_STATUSES: [CashOutStatus; 3] = [
    CashOutStatus::NotSeen,
    CashOutStatus::Published,
    CashOutStatus::InsufficientFunds,
];

/// Statuses the stale sweep still cares about: anything short of a
/// final confirmation.
const STALE_STATUSES: [CashOutStatus; 6] = [
    CashOutStatus::NotSeen,
    CashOutStatus::Published,
    CashOutStatus::Authorized,
    CashOutStatus::Instant,
    CashOutStatus::Rejected,
    CashOutStatus::InsufficientFunds,
];

/// Background sweeps over the cash-out transaction table.
pub struct MonitorSweeps {
    pool: PgPool,
    engine: Arc<LifecycleEngine>,
    integrations: Arc<dyn IntegrationDirectory>,
    config: CashOutConfig,
}

impl MonitorSweeps {
    pub fn new(
        pool: PgPool,
        engine: Arc<LifecycleEngine>,
        integrations: Arc<dyn IntegrationDirectory>,
        config: CashOutConfig,
    ) -> Self {
        Self {
            pool,
            engine,
            integrations,
            config,
        }
    }

    /// Spawn the three sweep loops. Each loop logs and swallows its own
    /// errors; nothing here ever takes the process down.
    pub fn spawn(self: Arc<Self>) {
        let interval = Duration::from_secs(self.config.sweep_interval_secs);
        info!(
            interval_secs = self.config.sweep_interval_secs,
            "starting cash-out monitor sweeps"
        );

        let live = self.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = live.sweep_live_incoming_once().await {
                    warn!(error = %e, "live incoming sweep failed");
                }
                sleep(interval).await;
            }
        });

        let stale = self.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = stale.sweep_stale_incoming_once().await {
                    warn!(error = %e, "stale incoming sweep failed");
                }
                sleep(interval).await;
            }
        });

        let notify = self;
        tokio::spawn(async move {
            loop {
                if let Err(e) = notify.sweep_unnotified_once().await {
                    warn!(error = %e, "notification sweep failed");
                }
                sleep(interval).await;
            }
        });
    }

    /// Re-poll recent transactions still waiting on the funding side.
    pub async fn sweep_live_incoming_once(&self) -> Result<usize, CashOutError> {
        let cutoff = Utc::now()
            - ChronoDuration::seconds(self.config.live_incoming_age_secs as i64);
        let rows = store::fetch_by_age_and_status(&self.pool, &LIVE_STATUSES, cutoff).await?;
        self.repost_statuses(rows, "live").await
    }

    /// Keep polling the long tail: older transactions in any non-final
    /// status, up to the retention window.
    pub async fn sweep_stale_incoming_once(&self) -> Result<usize, CashOutError> {
        let cutoff = Utc::now()
            - ChronoDuration::seconds(self.config.stale_incoming_age_secs as i64);
        let rows = store::fetch_by_age_and_status(&self.pool, &STALE_STATUSES, cutoff).await?;
        self.repost_statuses(rows, "stale").await
    }

    /// Re-query each row's status from its integration and feed the
    /// result back through the lifecycle engine as a normal update.
    async fn repost_statuses(
        &self,
        rows: Vec<CashOutTx>,
        sweep: &'static str,
    ) -> Result<usize, CashOutError> {
        if rows.is_empty() {
            return Ok(0);
        }
        debug!(sweep, count = rows.len(), "sweeping incoming transactions");

        let results = join_all(rows.into_iter().map(|tx| self.repost_one(tx))).await;

        let mut advanced = 0usize;
        for result in results {
            match result {
                Ok(true) => advanced += 1,
                Ok(false) => {}
                Err((id, e)) => warn!(tx_id = %id, sweep, error = %e, "sweep row failed"),
            }
        }
        Ok(advanced)
    }

    async fn repost_one(&self, tx: CashOutTx) -> Result<bool, (String, CashOutError)> {
        let id = tx.id.clone();
        let integration = self
            .integrations
            .integration_for(&tx.device_id)
            .map_err(|e| (id.clone(), e))?;

        let status = integration
            .get_status(&tx)
            .await
            .map_err(|e| (id.clone(), e))?;
        if status == tx.status {
            return Ok(false);
        }

        let mut incoming = tx.clone();
        incoming.status = status;
        self.engine
            .post(incoming, integration)
            .await
            .map_err(|e| (id, e))?;
        Ok(true)
    }

    /// Notify customers whose cash is ready and who left a phone number,
    /// then mark the row so they are told exactly once.
    pub async fn sweep_unnotified_once(&self) -> Result<usize, CashOutError> {
        let now = Utc::now();
        let max_age_cutoff =
            now - ChronoDuration::seconds(self.config.notify_max_age_secs as i64);
        let min_age_cutoff =
            now - ChronoDuration::seconds(self.config.notify_min_age_secs as i64);

        let rows = store::fetch_unnotified(&self.pool, max_age_cutoff, min_age_cutoff).await?;
        if rows.is_empty() {
            return Ok(0);
        }
        debug!(count = rows.len(), "sweeping unnotified transactions");

        let mut notified = 0usize;
        for tx in rows {
            match self.notify_one(&tx).await {
                Ok(()) => notified += 1,
                Err(e) => warn!(tx_id = %tx.id, error = %e, "notification failed"),
            }
        }
        Ok(notified)
    }

    async fn notify_one(&self, tx: &CashOutTx) -> Result<(), CashOutError> {
        let integration = self.integrations.integration_for(&tx.device_id)?;
        integration.notify_confirmation(tx).await?;
        // Marked only after the send succeeds; a failed send retries on
        // the next sweep.
        store::set_notified(&self.pool, &tx.id).await?;
        info!(tx_id = %tx.id, "customer notified");
        Ok(())
    }
}
