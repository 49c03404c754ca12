//! # Transaction Manager
//!
//! Runs a unit of work inside one SQLite transaction with retry on write
//! conflicts and an overall time budget.
//!
//! ## Execution Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  execute(name, options, work)                                          │
//! │                                                                         │
//! │  deadline = now + options.timeout        (one budget for everything)    │
//! │                                                                         │
//! │  loop {                                                                 │
//! │     ┌─ under deadline ──────────────────────────┐                       │
//! │     │ BEGIN IMMEDIATE ──▶ work(&mut conn) ──┐   │                       │
//! │     └───────────────────────────────────────┼───┘                       │
//! │                         Ok(v) ──▶ COMMIT ───┤     (runs to completion)  │
//! │                         Err(e) ─▶ ROLLBACK ─┤                           │
//! │                                             ▼                           │
//! │          e.is_transient() && retries left ──▶ sleep(backoff) ──▶ loop   │
//! │          e.is_transient()                 ──▶ Conflict { attempts, e }  │
//! │          otherwise                        ──▶ Aborted(e)                │
//! │  }                                                                      │
//! │                                                                         │
//! │  deadline hit before COMMIT ──▶ tx dropped (rolled back) ──▶ Timeout    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `BEGIN IMMEDIATE` takes the write lock up front. A deferred transaction
//! that reads first and writes later would get `SQLITE_BUSY` straight away
//! in WAL mode when another writer got in between, without waiting for
//! `busy_timeout`.
//!
//! Once the unit of work has succeeded, COMMIT is awaited without the
//! deadline and its result is the outcome.
//!
//! ## Writing a Unit of Work
//! The closure is called once per attempt and must return a boxed future
//! borrowing the connection. Clone owned inputs into each attempt:
//!
//! ```rust,ignore
//! let lines: Arc<[OrderLine]> = lines.into();
//! let outcome = tx_manager
//!     .execute("create_order", &options, move |conn| {
//!         let lines = Arc::clone(&lines);
//!         Box::pin(async move { place_order(conn, &lines).await })
//!     })
//!     .await;
//! ```
//!
//! A dropped `sqlx::Transaction` that was neither committed nor rolled back
//! is rolled back when its connection returns to the pool.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde::Serialize;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::error::DbError;

/// Future returned by a unit of work for one attempt.
pub type TxFuture<'c, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>;

const BEGIN_IMMEDIATE: &str = "BEGIN IMMEDIATE";

// =============================================================================
// Error Contract
// =============================================================================

/// Errors a unit of work may return.
///
/// `From<DbError>` lets the manager surface BEGIN/COMMIT failures in the
/// caller's error type; `is_transient` decides whether to retry.
pub trait TransactionError: From<DbError> + fmt::Display + Send {
    fn is_transient(&self) -> bool;
}

impl TransactionError for DbError {
    fn is_transient(&self) -> bool {
        DbError::is_transient(self)
    }
}

// =============================================================================
// Options
// =============================================================================

/// Retry and timeout policy for one `execute` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Additional attempts after the first one for transient errors.
    /// Default: 3
    pub max_retries: u32,

    /// Budget for all attempts and backoff sleeps together.
    /// Default: 30 seconds
    pub timeout: Duration,

    /// First retry delay.
    /// Default: 100ms
    pub initial_backoff: Duration,

    /// Upper bound for a single retry delay.
    /// Default: 10 seconds
    pub max_backoff: Duration,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        TransactionOptions {
            max_retries: 3,
            timeout: Duration::from_secs(30),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl TransactionOptions {
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    pub fn max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Exponential backoff doubling from `initial_backoff`, capped at
    /// `max_backoff`, with 10% jitter.
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_backoff,
            initial_interval: self.initial_backoff,
            randomization_factor: 0.1,
            multiplier: 2.0,
            max_interval: self.max_backoff,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Why a transaction did not commit.
#[derive(Debug, Error)]
pub enum TransactionFailure<E> {
    /// The unit of work returned a non-transient error.
    #[error("transaction aborted: {0}")]
    Aborted(E),

    /// Transient errors persisted through every retry.
    #[error("transaction conflict persisted after {attempts} attempts: {last_error}")]
    Conflict { attempts: u32, last_error: E },

    /// The overall budget elapsed.
    #[error("transaction timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
}

/// Result of `execute` plus attempt bookkeeping.
#[derive(Debug)]
pub struct TransactionOutcome<T, E> {
    pub result: Result<T, TransactionFailure<E>>,
    pub attempts: u32,
    pub duration: Duration,
}

impl<T, E> TransactionOutcome<T, E> {
    pub fn into_result(self) -> Result<T, TransactionFailure<E>> {
        self.result
    }
}

// =============================================================================
// Stats
// =============================================================================

/// Counters across every `execute` call of one manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransactionStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    /// Attempts beyond the first.
    pub retries: u64,
    /// Calls that ended in `Conflict`.
    pub conflicts: u64,
    /// Calls that ended in `Timeout`.
    pub timeouts: u64,
    /// Calls currently running.
    pub active: u64,
    /// Mean wall time of successful calls, in milliseconds.
    pub average_duration_ms: f64,
    #[serde(skip)]
    success_duration_total: Duration,
}

impl TransactionStats {
    /// Percentage of finished calls that committed.
    pub fn success_rate(&self) -> f64 {
        let finished = self.successful + self.failed;
        if finished == 0 {
            0.0
        } else {
            self.successful as f64 / finished as f64 * 100.0
        }
    }
}

// =============================================================================
// Transaction Manager
// =============================================================================

/// Executes units of work with retry and timeout. Cloning shares the stats.
#[derive(Debug, Clone)]
pub struct TransactionManager {
    pool: SqlitePool,
    defaults: TransactionOptions,
    stats: Arc<Mutex<TransactionStats>>,
}

impl TransactionManager {
    pub fn new(pool: SqlitePool, defaults: TransactionOptions) -> Self {
        TransactionManager {
            pool,
            defaults,
            stats: Arc::new(Mutex::new(TransactionStats::default())),
        }
    }

    /// Options used by callers that have no specific policy.
    pub fn defaults(&self) -> &TransactionOptions {
        &self.defaults
    }

    /// Runs `work` inside a transaction.
    ///
    /// ## Guarantees
    /// - Commit only when `work` returns `Ok`; any error or timeout rolls back.
    /// - `Ok` exactly when COMMIT succeeded.
    /// - Transient errors are retried at most `max_retries` times.
    /// - Returns within `options.timeout` plus the time of a final COMMIT or
    ///   rollback.
    pub async fn execute<T, E, F>(
        &self,
        name: &str,
        options: &TransactionOptions,
        mut work: F,
    ) -> TransactionOutcome<T, E>
    where
        E: TransactionError,
        F: for<'c> FnMut(&'c mut SqliteConnection) -> TxFuture<'c, T, E>,
    {
        let started = Instant::now();
        let deadline = started + options.timeout;
        let mut backoff = options.backoff();
        let mut attempts: u32 = 0;

        let _active = ActiveGuard::enter(&self.stats);

        let result = loop {
            attempts += 1;
            debug!(transaction = name, attempt = attempts, "Starting transaction attempt");

            let attempt = match tokio::time::timeout_at(deadline, self.begin_and_run(&mut work)).await {
                Err(_) => {
                    break Err(TransactionFailure::Timeout {
                        elapsed: started.elapsed(),
                    });
                }
                Ok(Ok((tx, value))) => tx
                    .commit()
                    .await
                    .map(|()| value)
                    .map_err(|e| E::from(DbError::from(e))),
                Ok(Err(err)) => Err(err),
            };

            match attempt {
                Ok(value) => break Ok(value),
                Err(err) if err.is_transient() && attempts <= options.max_retries => {
                    let delay = backoff.next_backoff().unwrap_or(options.max_backoff);
                    warn!(
                        transaction = name,
                        attempt = attempts,
                        max_retries = options.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient transaction error, retrying"
                    );

                    if Instant::now() + delay >= deadline {
                        tokio::time::sleep_until(deadline).await;
                        break Err(TransactionFailure::Timeout {
                            elapsed: started.elapsed(),
                        });
                    }
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_transient() => {
                    break Err(TransactionFailure::Conflict {
                        attempts,
                        last_error: err,
                    });
                }
                Err(err) => break Err(TransactionFailure::Aborted(err)),
            }
        };

        let duration = started.elapsed();
        self.record(&result, attempts, duration);

        match &result {
            Ok(_) => debug!(
                transaction = name,
                attempts,
                duration_ms = duration.as_millis() as u64,
                "Transaction committed"
            ),
            Err(TransactionFailure::Aborted(err)) => debug!(
                transaction = name,
                attempts,
                error = %err,
                "Transaction aborted"
            ),
            Err(failure) => error!(
                transaction = name,
                attempts,
                duration_ms = duration.as_millis() as u64,
                error = %failure,
                "Transaction failed"
            ),
        }

        TransactionOutcome {
            result,
            attempts,
            duration,
        }
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> TransactionStats {
        self.lock_stats().clone()
    }

    /// Zeroes the counters (calls in flight stay counted as active).
    pub fn reset_stats(&self) {
        let mut stats = self.lock_stats();
        let active = stats.active;
        *stats = TransactionStats {
            active,
            ..TransactionStats::default()
        };
    }

    /// Opens a write transaction and runs one attempt of `work`, leaving
    /// the transaction open on success.
    async fn begin_and_run<T, E, F>(
        &self,
        work: &mut F,
    ) -> Result<(Transaction<'static, Sqlite>, T), E>
    where
        E: TransactionError,
        F: for<'c> FnMut(&'c mut SqliteConnection) -> TxFuture<'c, T, E>,
    {
        let mut tx = self
            .pool
            .begin_with(BEGIN_IMMEDIATE)
            .await
            .map_err(DbError::from)?;

        match work(&mut *tx).await {
            Ok(value) => Ok((tx, value)),
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    fn record<T, E>(&self, result: &Result<T, TransactionFailure<E>>, attempts: u32, duration: Duration) {
        let mut stats = self.lock_stats();
        stats.total += 1;
        stats.retries += u64::from(attempts.saturating_sub(1));

        match result {
            Ok(_) => {
                stats.successful += 1;
                stats.success_duration_total += duration;
                stats.average_duration_ms =
                    stats.success_duration_total.as_secs_f64() * 1000.0 / stats.successful as f64;
            }
            Err(failure) => {
                stats.failed += 1;
                match failure {
                    TransactionFailure::Conflict { .. } => stats.conflicts += 1,
                    TransactionFailure::Timeout { .. } => stats.timeouts += 1,
                    TransactionFailure::Aborted(_) => {}
                }
            }
        }
    }

    fn lock_stats(&self) -> MutexGuard<'_, TransactionStats> {
        lock(&self.stats)
    }
}

// Counters stay usable even if a holder panicked.
fn lock(stats: &Mutex<TransactionStats>) -> MutexGuard<'_, TransactionStats> {
    stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Counts one running `execute` call; released on return or when the
/// caller drops the future.
struct ActiveGuard<'a> {
    stats: &'a Mutex<TransactionStats>,
}

impl<'a> ActiveGuard<'a> {
    fn enter(stats: &'a Mutex<TransactionStats>) -> Self {
        lock(stats).active += 1;
        ActiveGuard { stats }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let mut stats = lock(self.stats);
        stats.active = stats.active.saturating_sub(1);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn setup() -> (Database, TransactionManager) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sqlx::query("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL)")
            .execute(db.pool())
            .await
            .unwrap();
        let manager = db.transactions(TransactionOptions::default());
        (db, manager)
    }

    fn fast() -> TransactionOptions {
        TransactionOptions::default()
            .initial_backoff(Duration::from_millis(1))
            .max_backoff(Duration::from_millis(5))
    }

    async fn count_notes(db: &Database) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM notes")
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_commit_on_success() {
        let (db, manager) = setup().await;

        let outcome = manager
            .execute("insert_note", &fast(), |conn| {
                Box::pin(async move {
                    sqlx::query("INSERT INTO notes (body) VALUES ('hello')")
                        .execute(&mut *conn)
                        .await?;
                    Ok::<_, DbError>(1)
                })
            })
            .await;

        assert_eq!(outcome.result.unwrap(), 1);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(count_notes(&db).await, 1);
    }

    #[tokio::test]
    async fn test_rollback_on_error_leaves_nothing() {
        let (db, manager) = setup().await;

        let outcome = manager
            .execute("half_done", &fast(), |conn| {
                Box::pin(async move {
                    sqlx::query("INSERT INTO notes (body) VALUES ('first')")
                        .execute(&mut *conn)
                        .await?;
                    Err::<(), _>(DbError::not_found("Product", "missing"))
                })
            })
            .await;

        assert!(matches!(
            outcome.result,
            Err(TransactionFailure::Aborted(DbError::NotFound { .. }))
        ));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(count_notes(&db).await, 0);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let (db, manager) = setup().await;
        let calls = AtomicU32::new(0);

        let outcome = manager
            .execute("flaky", &fast(), |conn| {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    sqlx::query("INSERT INTO notes (body) VALUES ('try')")
                        .execute(&mut *conn)
                        .await?;
                    if call < 2 {
                        return Err(DbError::Conflict("database is locked".into()));
                    }
                    Ok(call)
                })
            })
            .await;

        assert_eq!(outcome.result.unwrap(), 2);
        assert_eq!(outcome.attempts, 3);
        // Failed attempts were rolled back.
        assert_eq!(count_notes(&db).await, 1);

        let stats = manager.stats();
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.active, 0);
    }

    #[tokio::test]
    async fn test_conflict_after_retries_exhausted() {
        let (_db, manager) = setup().await;
        let options = fast().max_retries(2);

        let outcome = manager
            .execute("always_busy", &options, |_conn| {
                Box::pin(async move { Err::<(), _>(DbError::Conflict("busy".into())) })
            })
            .await;

        match outcome.result {
            Err(TransactionFailure::Conflict { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(manager.stats().conflicts, 1);
    }

    #[tokio::test]
    async fn test_timeout_rolls_back() {
        let (db, manager) = setup().await;
        let options = fast().timeout(Duration::from_millis(50));

        let outcome = manager
            .execute("slow", &options, |conn| {
                Box::pin(async move {
                    sqlx::query("INSERT INTO notes (body) VALUES ('slow')")
                        .execute(&mut *conn)
                        .await?;
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok::<_, DbError>(())
                })
            })
            .await;

        assert!(matches!(outcome.result, Err(TransactionFailure::Timeout { .. })));
        assert!(outcome.duration < Duration::from_millis(500));
        assert_eq!(count_notes(&db).await, 0);
        assert_eq!(manager.stats().timeouts, 1);
    }

    #[tokio::test]
    async fn test_work_finishing_near_deadline_reports_what_was_committed() {
        let (db, manager) = setup().await;

        for i in 0..20u64 {
            let options = fast().timeout(Duration::from_millis(30));
            let outcome = manager
                .execute("near_deadline", &options, |conn| {
                    Box::pin(async move {
                        sqlx::query("INSERT INTO notes (id, body) VALUES (?1, 'late')")
                            .bind(i as i64)
                            .execute(&mut *conn)
                            .await?;
                        tokio::time::sleep(Duration::from_millis(20 + i / 2)).await;
                        Ok::<_, DbError>(())
                    })
                })
                .await;

            let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notes WHERE id = ?1")
                .bind(i as i64)
                .fetch_one(db.pool())
                .await
                .unwrap();
            match outcome.result {
                Ok(()) => assert_eq!(stored, 1, "attempt {i} reported success"),
                Err(TransactionFailure::Timeout { .. }) => {
                    assert_eq!(stored, 0, "attempt {i} reported timeout")
                }
                Err(other) => panic!("unexpected failure: {other}"),
            }
        }
        assert_eq!(manager.stats().active, 0);
    }

    #[tokio::test]
    async fn test_dropped_call_is_no_longer_active() {
        let (_db, manager) = setup().await;

        let running = manager.clone();
        let handle = tokio::spawn(async move {
            running
                .execute("abandoned", &fast(), |_conn| {
                    Box::pin(async {
                        tokio::time::sleep(Duration::from_secs(10)).await;
                        Ok::<_, DbError>(())
                    })
                })
                .await
        });

        for _ in 0..200 {
            if manager.stats().active == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(manager.stats().active, 1);

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert_eq!(manager.stats().active, 0);
        assert_eq!(manager.stats().total, 0);
    }

    #[tokio::test]
    async fn test_reset_stats() {
        let (_db, manager) = setup().await;
        let _ = manager
            .execute("noop", &fast(), |_conn| Box::pin(async { Ok::<_, DbError>(()) }))
            .await;
        assert_eq!(manager.stats().total, 1);
        assert_eq!(manager.stats().success_rate(), 100.0);

        manager.reset_stats();
        assert_eq!(manager.stats(), TransactionStats::default());
    }
}
