pub mod counter_reconciler;
pub mod relationship_store;

pub use counter_reconciler::{CounterReconciler, ReconciliationReport};
pub use relationship_store::RelationshipStore;

use tracing::warn;

use crate::error::AppResult;
use crate::infrastructure::DatabaseTransaction;

/// Commit on success, roll back on failure and hand the original error back.
pub(crate) async fn finish_transaction<T>(
    tx: DatabaseTransaction,
    result: AppResult<T>,
) -> AppResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Rollback after '{}' failed: {}", err, rollback_err);
            }
            Err(err)
        }
    }
}
