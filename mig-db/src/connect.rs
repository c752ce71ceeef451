//! Connecting with retries, a deadline and cancellation.

use std::future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{DbOptions, RetryPolicy};
use crate::dialect::Dialect;
use crate::dsn::{clean_dsn_for, mask_dsn};
use crate::error::{DbError, DbResult};
use crate::pool::DbPool;

/// Connect using the DSN from `MIG_DB_DSN` and the default retry policy.
pub async fn connect(cancel: &CancellationToken) -> DbResult<DbPool> {
    connect_with_retry(&DbOptions::from_env(), cancel).await
}

/// Connect to `options.dsn`, retrying transient failures.
///
/// Attempts are spaced by the policy's fixed delay. The loop stops on the
/// first success, on a non-retryable error, once the attempt cap is reached
/// (returning the last driver error), when the overall deadline elapses or
/// when `cancel` fires.
pub async fn connect_with_retry(
    options: &DbOptions,
    cancel: &CancellationToken,
) -> DbResult<DbPool> {
    let raw = options.dsn.trim();
    if raw.is_empty() {
        return Err(DbError::EmptyDsn);
    }

    let policy = options.retry_policy();
    let dialect = Dialect::from_dsn(raw);
    let masked = mask_dsn(&clean_dsn_for(raw, dialect), dialect);
    debug!(
        dialect = %dialect,
        dsn = %masked,
        retries = policy.retries,
        delay_ms = policy.delay.as_millis() as u64,
        "Connecting to database"
    );

    let deadline = async {
        match policy.timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DbError::ConnectCancelled),
        result = attempt_loop(options, policy, &masked) => result,
        _ = deadline => Err(DbError::ConnectTimedOut(
            policy.timeout.map(|t| t.as_millis() as u64).unwrap_or_default(),
        )),
    }
}

async fn attempt_loop(options: &DbOptions, policy: RetryPolicy, masked: &str) -> DbResult<DbPool> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;

        match DbPool::connect(options).await {
            Ok(pool) => {
                if attempt > 1 {
                    info!(attempt, dsn = %masked, "Connected to database");
                }
                return Ok(pool);
            }
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                warn!(attempt, error = %err, dsn = %masked, "Can't connect to database");
                if policy.retries > 0 && attempt >= policy.retries {
                    return Err(err);
                }
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}
