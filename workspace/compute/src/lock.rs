//! Overlap guard for scheduled jobs.
//!
//! A lock is a row in `job_locks` keyed by job name, company and period. It
//! expires after the job's window; an expired lock is taken over even if its
//! holder is still running. Two runs can therefore overlap when a build
//! outlives its window. This is accepted: the window is a liveness valve.

use chrono::{DateTime, Duration, Utc};
use model::entities::job_lock;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, ModelTrait, QueryFilter, Set, SqlErr,
    TransactionTrait,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ComputeError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLock {
    pub key: String,
    pub owner: String,
    pub expires_at: DateTime<Utc>,
}

/// What to do when a previous run of the same job may still be active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapPolicy {
    /// Skip the new run while the previous one holds its lock. The lock goes
    /// stale after `window`.
    SkipIfRunning { window: Duration },
    /// Run regardless.
    Allow,
}

/// Lock key for one job on one company and period.
pub fn lock_key(job: &str, company_id: i32, period: &str) -> String {
    format!("{}:{}:{}", job, company_id, period)
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

impl JobLock {
    /// Tries to take the lock. `None` means another holder is still inside
    /// its window.
    pub async fn acquire(
        db: &DatabaseConnection,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<JobLock>> {
        let txn = db.begin().await?;

        if let Some(existing) = job_lock::Entity::find_by_id(key.to_string()).one(&txn).await? {
            if existing.expires_at > now {
                debug!(key, owner = %existing.owner, "Lock is held");
                txn.rollback().await?;
                return Ok(None);
            }
            warn!(
                key,
                stale_owner = %existing.owner,
                expired_at = %existing.expires_at,
                "Taking over stale lock; the previous run may still be active"
            );
            existing.delete(&txn).await?;
        }

        let lock = JobLock {
            key: key.to_string(),
            owner: Uuid::new_v4().to_string(),
            expires_at: now + window,
        };
        let insert = job_lock::Entity::insert(job_lock::ActiveModel {
            name: Set(lock.key.clone()),
            owner: Set(lock.owner.clone()),
            acquired_at: Set(now),
            expires_at: Set(lock.expires_at),
        })
        .exec_without_returning(&txn)
        .await;

        match insert {
            Ok(_) => {
                txn.commit().await?;
                debug!(key, owner = %lock.owner, "Lock acquired");
                Ok(Some(lock))
            }
            Err(e) if is_unique_violation(&e) => {
                txn.rollback().await?;
                debug!(key, "Lost the race for the lock");
                Ok(None)
            }
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    warn!(key, error = %rollback, "Rollback after failed lock insert failed");
                }
                Err(ComputeError::Lock(format!("acquiring {}: {}", key, e)))
            }
        }
    }

    /// Releases the lock if this holder still owns it. A lock taken over
    /// after expiry belongs to the new holder and is left alone.
    pub async fn release(&self, db: &DatabaseConnection) -> Result<bool> {
        let result = job_lock::Entity::delete_many()
            .filter(job_lock::Column::Name.eq(self.key.as_str()))
            .filter(job_lock::Column::Owner.eq(self.owner.as_str()))
            .exec(db)
            .await?;
        if result.rows_affected == 0 {
            warn!(key = %self.key, "Lock was no longer ours at release");
        }
        Ok(result.rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[tokio::test]
    async fn test_second_acquire_is_refused_until_release() {
        let db = setup_db().await.unwrap();
        let key = lock_key("cashflow:day", 1, "2025-01-05");
        let now = at(2025, 1, 5, 10);

        let first = JobLock::acquire(&db, &key, Duration::minutes(10), now).await.unwrap();
        assert!(first.is_some());
        let second = JobLock::acquire(&db, &key, Duration::minutes(10), now).await.unwrap();
        assert!(second.is_none());

        assert!(first.unwrap().release(&db).await.unwrap());
        let third = JobLock::acquire(&db, &key, Duration::minutes(10), now).await.unwrap();
        assert!(third.is_some());
    }

    #[tokio::test]
    async fn test_stale_lock_is_taken_over() {
        let db = setup_db().await.unwrap();
        let key = lock_key("pnl", 1, "2025-01");
        let start = at(2025, 1, 5, 0);

        let stale = JobLock::acquire(&db, &key, Duration::minutes(20), start).await.unwrap().unwrap();
        let fresh = JobLock::acquire(&db, &key, Duration::minutes(20), start + Duration::minutes(21))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stale.owner, fresh.owner);

        // The old holder cannot release the new holder's lock
        assert!(!stale.release(&db).await.unwrap());
        assert!(fresh.release(&db).await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let db = setup_db().await.unwrap();
        let now = at(2025, 1, 5, 10);

        let a = JobLock::acquire(&db, &lock_key("cashflow:day", 1, "2025-01-05"), Duration::minutes(10), now)
            .await
            .unwrap();
        let b = JobLock::acquire(&db, &lock_key("cashflow:day", 2, "2025-01-05"), Duration::minutes(10), now)
            .await
            .unwrap();
        assert!(a.is_some());
        assert!(b.is_some());
    }
}
