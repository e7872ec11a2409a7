//! Daily task scheduling.
//!
//! Two work units run once per day for every active account: a favorites-list
//! refresh and a sign pass. Each unit is idempotent, so a coarse counted
//! retry wraps the whole unit; the operator core never retries transport
//! failures itself.

use std::time::Duration;

use chrono::{DateTime, Days, Local};
use rustc_hash::FxHashMap;
use tieba_operator::{SignOutcome, TiebaOperator, default_client};
use tracing::{error, info, warn};

use crate::Result;
use crate::database::DbPool;
use crate::database::models::AccountRecord;
use crate::database::repositories::{AccountRepository, ForumRepository, LogRepository};

/// Attempts per work unit before giving up for the day.
const WORK_UNIT_RETRY_LIMIT: u32 = 10;

/// One rate-limited client and credential set per account, reused across a
/// scheduler run to preserve throttling and cookie continuity. Owned by the
/// run, not process-global.
pub struct OperatorRegistry {
    client: reqwest::Client,
    operators: FxHashMap<i64, TiebaOperator>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self {
            client: default_client(),
            operators: FxHashMap::default(),
        }
    }

    fn get_or_create(&mut self, account: &AccountRecord) -> &mut TiebaOperator {
        self.operators
            .entry(account.id)
            .or_insert_with(|| TiebaOperator::new(self.client.clone(), &account.cookie))
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
enum WorkUnit {
    RefreshFavorites,
    Sign,
}

impl WorkUnit {
    fn name(self) -> &'static str {
        match self {
            WorkUnit::RefreshFavorites => "refresh_favorites",
            WorkUnit::Sign => "sign",
        }
    }
}

/// Refresh each active account's followed-forum set, at most once per day.
async fn refresh_favorites_task(pool: &DbPool, registry: &mut OperatorRegistry) -> Result<()> {
    let accounts = AccountRepository::new(pool.clone());
    let forums = ForumRepository::new(pool.clone());
    let logs = LogRepository::new(pool.clone());
    let today = Local::now().date_naive();

    for account in accounts.list_active().await? {
        if account.last_list_refresh.is_some_and(|d| d >= today) {
            continue;
        }

        let operator = registry.get_or_create(&account);
        let names = operator.fetch_favorites().await?;

        forums.replace_followed(account.id, &names).await?;
        accounts.set_last_list_refresh(account.id, today).await?;

        info!(account = %account.name, count = names.len(), "favorites list refreshed");
        logs.append(&format!(
            "account '{}': favorites list refreshed ({} forums)",
            account.name,
            names.len()
        ))
        .await?;
    }

    Ok(())
}

/// Sign every forum of every active account that is still due today.
async fn sign_task(pool: &DbPool, registry: &mut OperatorRegistry) -> Result<()> {
    let accounts = AccountRepository::new(pool.clone());
    let forums = ForumRepository::new(pool.clone());
    let logs = LogRepository::new(pool.clone());
    let today = Local::now().date_naive();

    for account in accounts.list_active().await? {
        let operator = registry.get_or_create(&account);

        for forum in forums.due_for_sign(account.id, today).await? {
            let outcome = operator.sign_forum(&forum.name).await?;

            match outcome {
                SignOutcome::Success | SignOutcome::AlreadySigned => {
                    forums
                        .set_last_sign_date(account.id, &forum.name, today)
                        .await?;
                }
                SignOutcome::NotFollowed => {
                    forums.mark_cancelled(account.id, &forum.name).await?;
                }
                SignOutcome::UnknownError => {}
            }

            logs.append(&format!(
                "account '{}', forum '{}': {}",
                account.name, forum.name, outcome
            ))
            .await?;
        }

        // Session cookies received during the pass go back to storage.
        accounts
            .set_cookie(account.id, &operator.export_cookies())
            .await?;
    }

    Ok(())
}

/// Retry one idempotent work unit up to `WORK_UNIT_RETRY_LIMIT` times,
/// logging each failure.
async fn run_with_retry(unit: WorkUnit, pool: &DbPool, registry: &mut OperatorRegistry) {
    let logs = LogRepository::new(pool.clone());

    for attempt in 1..=WORK_UNIT_RETRY_LIMIT {
        let result = match unit {
            WorkUnit::RefreshFavorites => refresh_favorites_task(pool, registry).await,
            WorkUnit::Sign => sign_task(pool, registry).await,
        };

        match result {
            Ok(()) => return,
            Err(err) => {
                warn!(task = unit.name(), attempt, error = %err, "work unit failed");
                if let Err(log_err) = logs
                    .append(&format!(
                        "task '{}' attempt {} failed: {}",
                        unit.name(),
                        attempt,
                        err
                    ))
                    .await
                {
                    error!(error = %log_err, "failed to record work unit failure");
                }
            }
        }
    }

    error!(
        task = unit.name(),
        "work unit did not succeed within {WORK_UNIT_RETRY_LIMIT} attempts; giving up until tomorrow"
    );
}

/// One full daily pass: refresh favorites, then sign.
pub async fn run_once(pool: &DbPool, registry: &mut OperatorRegistry) {
    run_with_retry(WorkUnit::RefreshFavorites, pool, registry).await;
    run_with_retry(WorkUnit::Sign, pool, registry).await;
}

/// Time left until the next local midnight.
fn duration_until_next_midnight(now: DateTime<Local>) -> Duration {
    let next_midnight = (now.date_naive() + Days::new(1)).and_hms_opt(0, 0, 0);
    let next_run = next_midnight
        .and_then(|t| t.and_local_timezone(Local).earliest())
        .unwrap_or_else(|| now + chrono::Duration::hours(24));

    (next_run - now)
        .to_std()
        .unwrap_or(Duration::from_secs(60))
}

/// Run the daily loop forever: one pass now, then one shortly after each
/// local midnight. Each pass gets a fresh operator registry.
pub async fn run_daily_loop(pool: DbPool) {
    loop {
        let mut registry = OperatorRegistry::new();
        run_once(&pool, &mut registry).await;

        let wait = duration_until_next_midnight(Local::now());
        info!(wait_secs = wait.as_secs(), "daily pass complete; sleeping");
        tokio::time::sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_duration_until_next_midnight_bounds() {
        let now = Local.with_ymd_and_hms(2026, 8, 23, 13, 30, 0).unwrap();
        let wait = duration_until_next_midnight(now);
        assert!(wait > Duration::from_secs(9 * 3600));
        assert!(wait <= Duration::from_secs(12 * 3600));

        let almost_midnight = Local.with_ymd_and_hms(2026, 8, 23, 23, 59, 59).unwrap();
        let wait = duration_until_next_midnight(almost_midnight);
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_registry_reuses_operator_per_account() {
        let mut registry = OperatorRegistry::new();
        let account = AccountRecord {
            id: 1,
            name: "alice".to_owned(),
            cookie: "a=1".to_owned(),
            paused: false,
            last_list_refresh: None,
        };

        registry.get_or_create(&account);
        assert_eq!(registry.operators.len(), 1);
        registry.get_or_create(&account);
        assert_eq!(registry.operators.len(), 1);
    }
}
