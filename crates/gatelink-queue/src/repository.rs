#![allow(async_fn_in_trait)]

use crate::error::QueueResult;
use crate::models::{Command, NewCommand};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// Repository trait for command queue operations.
///
/// Defines the data access contract the dispatcher and the transport-facing
/// calls build on, enabling mock implementations in tests.
pub trait CommandRepository: Send + Sync {
    /// Find a command by id.
    async fn find_by_id(&self, id: i64) -> QueueResult<Option<Command>>;

    /// Most recently created `Wait` entry for a destination and opcode.
    async fn find_last_wait(
        &self,
        bridge_id: i64,
        controller_id: i64,
        cmd: &str,
    ) -> QueueResult<Option<Command>>;

    /// Insert a new `Wait` entry and return it.
    async fn insert(&self, new: &NewCommand) -> QueueResult<Command>;

    /// Replace the payload of a still-waiting entry.
    ///
    /// Returns `false` if the entry is no longer in `Wait` (e.g. the
    /// sweeper failed it meanwhile); the caller should insert fresh.
    async fn update_payload(&self, id: i64, cmd_data: &str) -> QueueResult<bool>;

    /// All `Wait` entries for a destination, oldest first, for the
    /// transport to drain.
    async fn list_pending(&self, bridge_id: i64, controller_id: i64)
    -> QueueResult<Vec<Command>>;

    /// Move a `Wait` entry to `Process`, optionally recording the request
    /// payload sent to the bridge. Returns `false` if the entry was not in
    /// `Wait`.
    async fn mark_processing(&self, id: i64, request: Option<&str>) -> QueueResult<bool>;

    /// Record a terminal outcome for a `Wait` or `Process` entry, stamping
    /// `executed_at`. Returns `false` if the entry was already terminal.
    async fn record_outcome(
        &self,
        id: i64,
        success: bool,
        error_code: &str,
        response: Option<&str>,
    ) -> QueueResult<bool>;

    /// Fail all `Wait`/`Process` entries created before `cutoff` with the
    /// given error code. Returns the number of entries failed.
    async fn fail_stale(&self, cutoff: DateTime<Utc>, error_code: &str) -> QueueResult<u64>;

    /// Delete all entries created before `cutoff`. Returns the number
    /// deleted.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> QueueResult<u64>;
}

/// SQLite implementation of [`CommandRepository`].
pub struct SqliteCommandRepository {
    pool: SqlitePool,
}

impl SqliteCommandRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl CommandRepository for SqliteCommandRepository {
    async fn find_by_id(&self, id: i64) -> QueueResult<Option<Command>> {
        let command = sqlx::query_as::<_, Command>(
            r#"
            SELECT id, bridge_id, controller_id, cmd, cmd_data, status, error,
                   created_at, executed_at, retries, card_number, pin_code,
                   schedule_code, rights_data, rights_mask, request, response
            FROM commands
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(command)
    }

    async fn find_last_wait(
        &self,
        bridge_id: i64,
        controller_id: i64,
        cmd: &str,
    ) -> QueueResult<Option<Command>> {
        let command = sqlx::query_as::<_, Command>(
            r#"
            SELECT id, bridge_id, controller_id, cmd, cmd_data, status, error,
                   created_at, executed_at, retries, card_number, pin_code,
                   schedule_code, rights_data, rights_mask, request, response
            FROM commands
            WHERE bridge_id = ? AND controller_id = ? AND cmd = ? AND status = 'Wait'
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(bridge_id)
        .bind(controller_id)
        .bind(cmd)
        .fetch_optional(&self.pool)
        .await?;

        Ok(command)
    }

    async fn insert(&self, new: &NewCommand) -> QueueResult<Command> {
        let mut tx = self.pool.begin().await?;
        let id = crate::transaction::insert(&mut tx, new).await?;
        let command = crate::transaction::find_by_id(&mut tx, id).await?;
        tx.commit().await?;

        command.ok_or(crate::error::QueueError::NotFound(id))
    }

    async fn update_payload(&self, id: i64, cmd_data: &str) -> QueueResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE commands
            SET cmd_data = ?
            WHERE id = ? AND status = 'Wait'
            "#,
        )
        .bind(cmd_data)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_pending(
        &self,
        bridge_id: i64,
        controller_id: i64,
    ) -> QueueResult<Vec<Command>> {
        let commands = sqlx::query_as::<_, Command>(
            r#"
            SELECT id, bridge_id, controller_id, cmd, cmd_data, status, error,
                   created_at, executed_at, retries, card_number, pin_code,
                   schedule_code, rights_data, rights_mask, request, response
            FROM commands
            WHERE bridge_id = ? AND controller_id = ? AND status = 'Wait'
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(bridge_id)
        .bind(controller_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(commands)
    }

    async fn mark_processing(&self, id: i64, request: Option<&str>) -> QueueResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE commands
            SET status = 'Process', request = COALESCE(?, request)
            WHERE id = ? AND status = 'Wait'
            "#,
        )
        .bind(request)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_outcome(
        &self,
        id: i64,
        success: bool,
        error_code: &str,
        response: Option<&str>,
    ) -> QueueResult<bool> {
        let status = if success { "Success" } else { "Failure" };
        let result = sqlx::query(
            r#"
            UPDATE commands
            SET status = ?, error = ?, executed_at = ?, response = COALESCE(?, response)
            WHERE id = ? AND status IN ('Wait', 'Process')
            "#,
        )
        .bind(status)
        .bind(error_code)
        .bind(Utc::now())
        .bind(response)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn fail_stale(&self, cutoff: DateTime<Utc>, error_code: &str) -> QueueResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE commands
            SET status = 'Failure', error = ?, executed_at = ?
            WHERE status IN ('Wait', 'Process') AND created_at < ?
            "#,
        )
        .bind(error_code)
        .bind(Utc::now())
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> QueueResult<u64> {
        let result = sqlx::query("DELETE FROM commands WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;
    use chrono::Duration;
    use gatelink_core::{BridgeId, ControllerId, ControllerRef};
    use gatelink_protocol::CommandCode;

    fn ctrl() -> ControllerRef {
        ControllerRef {
            bridge_id: BridgeId::new(1),
            controller_id: ControllerId::new(2),
            name: "Test controller".to_string(),
            relay_mode: None,
        }
    }

    async fn setup() -> (Database, SqliteCommandRepository) {
        let db = Database::in_memory().await.unwrap();
        let repo = SqliteCommandRepository::new(db.pool().clone());
        (db, repo)
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let (_db, repo) = setup().await;
        let new = NewCommand::new(&ctrl(), CommandCode::ReadSystemInfo);

        let inserted = repo.insert(&new).await.unwrap();
        assert_eq!(inserted.cmd, "F0");
        assert_eq!(inserted.status, crate::models::CommandStatus::Wait);
        assert_eq!(inserted.error, "0");

        let found = repo.find_by_id(inserted.id).await.unwrap().unwrap();
        assert_eq!(found.id, inserted.id);
    }

    #[tokio::test]
    async fn test_find_last_wait_picks_most_recent() {
        let (_db, repo) = setup().await;
        let new = NewCommand::new(&ctrl(), CommandCode::DeleteLastEvent);

        let first = repo.insert(&new).await.unwrap();
        let second = repo.insert(&new).await.unwrap();
        assert!(second.id > first.id);

        let last = repo
            .find_last_wait(1, 2, "DA")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last.id, second.id);
    }

    #[tokio::test]
    async fn test_update_payload_only_touches_wait_entries() {
        let (_db, repo) = setup().await;
        let cmd = repo
            .insert(&NewCommand::new(&ctrl(), CommandCode::WriteControllerMode).with_data("01"))
            .await
            .unwrap();

        assert!(repo.update_payload(cmd.id, "02").await.unwrap());

        repo.record_outcome(cmd.id, true, "0", None).await.unwrap();
        assert!(!repo.update_payload(cmd.id, "03").await.unwrap());
    }

    #[tokio::test]
    async fn test_record_outcome_is_terminal() {
        let (_db, repo) = setup().await;
        let cmd = repo
            .insert(&NewCommand::new(&ctrl(), CommandCode::ReadSystemInfo))
            .await
            .unwrap();

        assert!(repo.record_outcome(cmd.id, false, "9", None).await.unwrap());
        let failed = repo.find_by_id(cmd.id).await.unwrap().unwrap();
        assert_eq!(failed.status, crate::models::CommandStatus::Failure);
        assert_eq!(failed.error, "9");
        assert!(failed.executed_at.is_some());

        // A second outcome must not stick.
        assert!(!repo.record_outcome(cmd.id, true, "0", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_processing_requires_wait() {
        let (_db, repo) = setup().await;
        let cmd = repo
            .insert(&NewCommand::new(&ctrl(), CommandCode::ReadSystemInfo))
            .await
            .unwrap();

        assert!(repo.mark_processing(cmd.id, None).await.unwrap());
        assert!(!repo.mark_processing(cmd.id, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_older_than() {
        let (_db, repo) = setup().await;
        repo.insert(&NewCommand::new(&ctrl(), CommandCode::ReadSystemInfo))
            .await
            .unwrap();

        let removed = repo
            .delete_older_than(Utc::now() - Duration::days(14))
            .await
            .unwrap();
        assert_eq!(removed, 0);

        let removed = repo
            .delete_older_than(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }
}
