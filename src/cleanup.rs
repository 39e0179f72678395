//! Periodic sweep of the revocation ledger.
//!
//! Deletes every row that is expired or revoked. Zero deletions is the
//! normal steady state, not an error.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::auth::RevocationLedger;
use crate::error::AppError;

/// One sweep. Returns the number of deleted rows.
pub async fn run_cleanup(ledger: &RevocationLedger) -> Result<u64, AppError> {
    let deleted = ledger.purge().await?;
    tracing::info!(deleted, "Refresh token cleanup finished");
    Ok(deleted)
}

/// Runs `run_cleanup` every `every`, first one `every` after start. A failed
/// sweep is logged and the next one runs on schedule.
pub fn spawn_cleanup_job(ledger: RevocationLedger, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = run_cleanup(&ledger).await {
                tracing::error!(error = %e, "Refresh token cleanup failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use crate::repository::{InMemoryRefreshTokenStore, RefreshTokenStore};

    const WEEK: i64 = 7 * 24 * 60 * 60;

    #[tokio::test]
    async fn test_run_cleanup_counts_deleted_rows() {
        let store = InMemoryRefreshTokenStore::new();
        let ledger = RevocationLedger::new(Arc::new(store.clone()), WEEK);
        let user_id = Uuid::new_v4();
        ledger.store(user_id, "live").await.unwrap();
        ledger.store(user_id, "dead").await.unwrap();
        ledger.revoke("dead").await.unwrap();

        assert_eq!(run_cleanup(&ledger).await.unwrap(), 1);
        assert_eq!(run_cleanup(&ledger).await.unwrap(), 0);
        assert!(store.find("live").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_sweeps_on_schedule() {
        let store = InMemoryRefreshTokenStore::new();
        let ledger = RevocationLedger::new(Arc::new(store.clone()), WEEK);
        let now = Utc::now();
        store
            .insert("expired", Uuid::new_v4(), now, now - chrono::Duration::seconds(1))
            .await
            .unwrap();

        let every = Duration::from_secs(6 * 60 * 60);
        let job = spawn_cleanup_job(ledger, every);

        tokio::time::sleep(every / 2).await;
        assert_eq!(store.len().unwrap(), 1);

        tokio::time::sleep(every).await;
        assert!(store.is_empty().unwrap());

        job.abort();
    }
}
