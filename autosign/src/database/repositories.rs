//! Repositories over the SQLite pool.

use chrono::{NaiveDate, Utc};

use crate::Result;
use crate::database::DbPool;
use crate::database::models::{AccountRecord, ForumRecord};

pub struct AccountRepository {
    pool: DbPool,
}

impl AccountRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, name: &str, cookie: &str) -> Result<i64> {
        let result = sqlx::query("INSERT INTO accounts (name, cookie) VALUES (?, ?)")
            .bind(name)
            .bind(cookie)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// All non-paused accounts, in insertion order.
    pub async fn list_active(&self) -> Result<Vec<AccountRecord>> {
        let accounts = sqlx::query_as::<_, AccountRecord>(
            "SELECT * FROM accounts WHERE paused = 0 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(accounts)
    }

    /// Persist the cookie string exported by the account's operator.
    pub async fn set_cookie(&self, id: i64, cookie: &str) -> Result<()> {
        sqlx::query("UPDATE accounts SET cookie = ? WHERE id = ?")
            .bind(cookie)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_last_list_refresh(&self, id: i64, date: NaiveDate) -> Result<()> {
        sqlx::query("UPDATE accounts SET last_list_refresh = ? WHERE id = ?")
            .bind(date)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct ForumRepository {
    pool: DbPool,
}

impl ForumRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Reconcile the stored forum set against a freshly fetched favorites
    /// list, in one transaction: every non-paused forum is first marked
    /// cancelled, then each fetched name is inserted or revived. Paused rows
    /// are never touched.
    pub async fn replace_followed(&self, account_id: i64, names: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE forums SET cancelled = 1 WHERE account_id = ? AND paused = 0")
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        for name in names {
            sqlx::query(
                r#"
                INSERT INTO forums (account_id, name, paused, cancelled)
                VALUES (?, ?, 0, 0)
                ON CONFLICT(account_id, name) DO UPDATE SET cancelled = 0
                WHERE forums.paused = 0
                "#,
            )
            .bind(account_id)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Forums that still need today's check-in: non-paused, non-cancelled,
    /// and not signed on or after `today`.
    pub async fn due_for_sign(&self, account_id: i64, today: NaiveDate) -> Result<Vec<ForumRecord>> {
        let forums = sqlx::query_as::<_, ForumRecord>(
            r#"
            SELECT * FROM forums
            WHERE account_id = ? AND paused = 0 AND cancelled = 0
              AND (last_sign_date IS NULL OR last_sign_date < ?)
            ORDER BY name
            "#,
        )
        .bind(account_id)
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        Ok(forums)
    }

    pub async fn set_last_sign_date(
        &self,
        account_id: i64,
        name: &str,
        date: NaiveDate,
    ) -> Result<()> {
        sqlx::query("UPDATE forums SET last_sign_date = ? WHERE account_id = ? AND name = ?")
            .bind(date)
            .bind(account_id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark a single forum cancelled (the account no longer follows it).
    pub async fn mark_cancelled(&self, account_id: i64, name: &str) -> Result<()> {
        sqlx::query("UPDATE forums SET cancelled = 1 WHERE account_id = ? AND name = ?")
            .bind(account_id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct LogRepository {
    pool: DbPool,
}

impl LogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append an audit row with the current timestamp.
    pub async fn append(&self, content: &str) -> Result<()> {
        sqlx::query("INSERT INTO logs (time, content) VALUES (?, ?)")
            .bind(Utc::now())
            .bind(content)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::LogRecord;
    use crate::database::prepare_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    // A single connection keeps the in-memory database alive and shared.
    async fn test_pool() -> DbPool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        prepare_schema(&pool).await.unwrap();
        pool
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_account_insert_and_list_active() {
        let pool = test_pool().await;
        let accounts = AccountRepository::new(pool.clone());

        let id = accounts.insert("alice", "BDUSS=abc").await.unwrap();
        let active = accounts.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, id);
        assert_eq!(active[0].cookie, "BDUSS=abc");
        assert!(active[0].last_list_refresh.is_none());

        sqlx::query("UPDATE accounts SET paused = 1 WHERE id = ?")
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();
        assert!(accounts.list_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_cookie_and_refresh_date() {
        let pool = test_pool().await;
        let accounts = AccountRepository::new(pool.clone());
        let id = accounts.insert("alice", "old=1").await.unwrap();

        accounts.set_cookie(id, "new=2").await.unwrap();
        accounts
            .set_last_list_refresh(id, date("2026-08-23"))
            .await
            .unwrap();

        let account = &accounts.list_active().await.unwrap()[0];
        assert_eq!(account.cookie, "new=2");
        assert_eq!(account.last_list_refresh, Some(date("2026-08-23")));
    }

    #[tokio::test]
    async fn test_replace_followed_reconciles() {
        let pool = test_pool().await;
        let accounts = AccountRepository::new(pool.clone());
        let forums = ForumRepository::new(pool.clone());
        let id = accounts.insert("alice", "c=1").await.unwrap();

        forums
            .replace_followed(id, &["rust".to_owned(), "老吧".to_owned()])
            .await
            .unwrap();
        // "老吧" drops out of the list on the next refresh.
        forums
            .replace_followed(id, &["rust".to_owned(), "新吧".to_owned()])
            .await
            .unwrap();

        let today = date("2026-08-23");
        let due = forums.due_for_sign(id, today).await.unwrap();
        let names: Vec<_> = due.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["rust", "新吧"]);
    }

    #[tokio::test]
    async fn test_replace_followed_leaves_paused_rows_alone() {
        let pool = test_pool().await;
        let accounts = AccountRepository::new(pool.clone());
        let forums = ForumRepository::new(pool.clone());
        let id = accounts.insert("alice", "c=1").await.unwrap();

        forums.replace_followed(id, &["rust".to_owned()]).await.unwrap();
        sqlx::query("UPDATE forums SET paused = 1 WHERE name = 'rust'")
            .execute(&pool)
            .await
            .unwrap();

        // Refresh no longer lists it; the paused row must stay uncancelled.
        forums.replace_followed(id, &[]).await.unwrap();
        let row = sqlx::query_as::<_, ForumRecord>("SELECT * FROM forums WHERE name = 'rust'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(row.paused);
        assert!(!row.cancelled);
    }

    #[tokio::test]
    async fn test_due_for_sign_filters_signed_today() {
        let pool = test_pool().await;
        let accounts = AccountRepository::new(pool.clone());
        let forums = ForumRepository::new(pool.clone());
        let id = accounts.insert("alice", "c=1").await.unwrap();
        let today = date("2026-08-23");

        forums
            .replace_followed(id, &["a".to_owned(), "b".to_owned()])
            .await
            .unwrap();
        forums.set_last_sign_date(id, "a", today).await.unwrap();
        forums
            .set_last_sign_date(id, "b", date("2026-08-22"))
            .await
            .unwrap();

        let due = forums.due_for_sign(id, today).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].name, "b");
        assert_eq!(due[0].last_sign_date, Some(date("2026-08-22")));
    }

    #[tokio::test]
    async fn test_mark_cancelled_removes_from_due() {
        let pool = test_pool().await;
        let accounts = AccountRepository::new(pool.clone());
        let forums = ForumRepository::new(pool.clone());
        let id = accounts.insert("alice", "c=1").await.unwrap();

        forums.replace_followed(id, &["gone".to_owned()]).await.unwrap();
        forums.mark_cancelled(id, "gone").await.unwrap();
        assert!(
            forums
                .due_for_sign(id, date("2026-08-23"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_log_append() {
        let pool = test_pool().await;
        let logs = LogRepository::new(pool.clone());
        logs.append("account 'alice': signed").await.unwrap();

        let rows = sqlx::query_as::<_, LogRecord>("SELECT * FROM logs")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "account 'alice': signed");
    }
}
