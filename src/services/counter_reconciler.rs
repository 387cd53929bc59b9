// Counter Reconciler - recomputes denormalized counters from the records
// they summarize and repairs any that drifted.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::finish_transaction;
use crate::error::AppResult;
use crate::infrastructure::{Counter, CounterDrift, DatabaseInterface, DatabaseTransaction};
use crate::models::{current_time_millis, Collection, DocumentId, Timestamp};

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub reconciled_at: Timestamp,
    pub users_repaired: u64,
    pub posts_repaired: u64,
    pub fields_repaired: u64,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.fields_repaired == 0
    }
}

pub struct CounterReconciler {
    db: Arc<dyn DatabaseInterface>,
}

impl CounterReconciler {
    pub fn new(db: Arc<dyn DatabaseInterface>) -> Self {
        Self { db }
    }

    /// Scan every counter and overwrite drifted values with the live count.
    /// Runs in a single transaction that takes the write lock before scanning.
    pub async fn reconcile(&self) -> AppResult<ReconciliationReport> {
        let mut tx = self.db.begin_transaction().await?;
        let result = self.reconcile_tx(&mut tx).await;
        let report = finish_transaction(tx, result).await?;

        if report.is_clean() {
            info!("Counter reconciliation found no drift");
        } else {
            info!(
                "Counter reconciliation repaired {} fields on {} users and {} posts",
                report.fields_repaired, report.users_repaired, report.posts_repaired
            );
        }
        Ok(report)
    }

    async fn reconcile_tx(&self, tx: &mut DatabaseTransaction) -> AppResult<ReconciliationReport> {
        let reconciled_at = current_time_millis();
        self.db.stamp_reconciliation_tx(tx, reconciled_at).await?;

        let mut users: HashSet<DocumentId> = HashSet::new();
        let mut posts: HashSet<DocumentId> = HashSet::new();
        let mut fields_repaired = 0;

        for counter in Counter::ALL {
            for CounterDrift { counter, id, stored, actual } in
                self.db.find_counter_drift_tx(tx, counter).await?
            {
                warn!(
                    "{}.{} on {} drifted: stored {}, actual {}",
                    counter.owner(),
                    counter.field(),
                    id,
                    stored,
                    actual
                );
                if !self.db.set_counter_tx(tx, counter, &id, actual).await? {
                    continue;
                }
                fields_repaired += 1;
                match counter.owner() {
                    Collection::Users => users.insert(id),
                    _ => posts.insert(id),
                };
            }
        }

        Ok(ReconciliationReport {
            reconciled_at,
            users_repaired: users.len() as u64,
            posts_repaired: posts.len() as u64,
            fields_repaired,
        })
    }

    /// Time of the last committed reconciliation, if any ran
    pub async fn last_run(&self) -> AppResult<Option<Timestamp>> {
        self.db.last_reconciliation().await
    }

    /// Run `reconcile` on a fixed interval until the handle is aborted.
    pub fn spawn_periodic(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        info!("Starting counter reconciler every {:?}", period);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // First tick fires immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                if let Err(e) = self.reconcile().await {
                    error!("Counter reconciliation failed: {}", e);
                }
            }
        })
    }
}
