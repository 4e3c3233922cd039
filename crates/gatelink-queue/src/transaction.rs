//! Transaction-aware queue operations for atomic read-merge-write sequences.
//!
//! These functions accept a SQLite transaction reference, allowing the
//! dispatcher to group the lookup of a pending entry, the merge computation
//! and the resulting insert/update/delete into a single atomic step. The
//! rights-merge path in particular must never interleave with a concurrent
//! submission for the same card.
//!
//! # Usage Pattern
//!
//! ```no_run
//! use gatelink_queue::{Database, DatabaseConfig, NewCommand, transaction};
//! use gatelink_core::{BridgeId, ControllerId, ControllerRef};
//! use gatelink_protocol::CommandCode;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("gatelink.db")).await?;
//! let ctrl = ControllerRef {
//!     bridge_id: BridgeId::new(1),
//!     controller_id: ControllerId::new(4),
//!     name: "Front door".to_string(),
//!     relay_mode: None,
//! };
//!
//! let mut tx = db.pool().begin().await?;
//! let id = transaction::insert(
//!     &mut tx,
//!     &NewCommand::new(&ctrl, CommandCode::WriteSystemClock),
//! )
//! .await?;
//! tx.commit().await?;
//! # let _ = id;
//! # Ok(())
//! # }
//! ```

use crate::error::QueueResult;
use crate::models::{Command, NewCommand};
use chrono::Utc;
use gatelink_protocol::Rights;
use sqlx::{Sqlite, Transaction};

/// Insert a new `Wait` entry within a transaction.
///
/// # Errors
///
/// Returns error if the transaction is already committed or rolled back, or
/// a database constraint is violated.
pub async fn insert(tx: &mut Transaction<'_, Sqlite>, new: &NewCommand) -> QueueResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO commands (
            bridge_id, controller_id, cmd, cmd_data,
            status, error, created_at,
            card_number, pin_code, schedule_code,
            rights_data, rights_mask
        )
        VALUES (?, ?, ?, ?, 'Wait', '0', ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(new.bridge_id)
    .bind(new.controller_id)
    .bind(new.cmd.as_str())
    .bind(&new.cmd_data)
    .bind(Utc::now())
    .bind(&new.card_number)
    .bind(&new.pin_code)
    .bind(&new.schedule_code)
    .bind(i64::from(new.rights.data))
    .bind(i64::from(new.rights.mask))
    .execute(&mut **tx)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Find a command by id within a transaction.
pub async fn find_by_id(
    tx: &mut Transaction<'_, Sqlite>,
    id: i64,
) -> QueueResult<Option<Command>> {
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
    .fetch_optional(&mut **tx)
    .await?;

    Ok(command)
}

/// The pending rights entry for a controller/card pair, if any.
///
/// At most one such entry exists at a time; the dispatcher's per-card lock
/// and the merge logic together maintain that invariant.
pub async fn find_wait_rights(
    tx: &mut Transaction<'_, Sqlite>,
    controller_id: i64,
    card_number: &str,
) -> QueueResult<Option<Command>> {
    let command = sqlx::query_as::<_, Command>(
        r#"
        SELECT id, bridge_id, controller_id, cmd, cmd_data, status, error,
               created_at, executed_at, retries, card_number, pin_code,
               schedule_code, rights_data, rights_mask, request, response
        FROM commands
        WHERE controller_id = ? AND card_number = ? AND cmd = 'D1' AND status = 'Wait'
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(controller_id)
    .bind(card_number)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(command)
}

/// Overwrite the rights fields of a still-waiting entry.
///
/// Returns `false` if the entry left `Wait` since it was read; the caller
/// must then restart from the lookup.
pub async fn update_rights(
    tx: &mut Transaction<'_, Sqlite>,
    id: i64,
    rights: Rights,
    pin_code: Option<&str>,
    schedule_code: Option<&str>,
) -> QueueResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE commands
        SET rights_data = ?, rights_mask = ?,
            pin_code = COALESCE(?, pin_code),
            schedule_code = ?
        WHERE id = ? AND status = 'Wait'
        "#,
    )
    .bind(i64::from(rights.data))
    .bind(i64::from(rights.mask))
    .bind(pin_code)
    .bind(schedule_code)
    .bind(id)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Remove a pending entry whose merged rights cancelled out.
pub async fn delete(tx: &mut Transaction<'_, Sqlite>, id: i64) -> QueueResult<bool> {
    let result = sqlx::query("DELETE FROM commands WHERE id = ? AND status = 'Wait'")
        .bind(id)
        .execute(&mut **tx)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;
    use gatelink_core::{BridgeId, CardNumber, ControllerId, ControllerRef};
    use gatelink_protocol::CommandCode;

    fn ctrl() -> ControllerRef {
        ControllerRef {
            bridge_id: BridgeId::new(1),
            controller_id: ControllerId::new(7),
            name: "Lobby".to_string(),
            relay_mode: None,
        }
    }

    async fn setup_test_db() -> Database {
        Database::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_transaction_commit() {
        let db = setup_test_db().await;
        let mut tx = db.pool().begin().await.unwrap();

        let id = insert(&mut tx, &NewCommand::new(&ctrl(), CommandCode::WriteSystemClock))
            .await
            .unwrap();
        assert!(id > 0);

        tx.commit().await.unwrap();

        let found: Option<(i64,)> = sqlx::query_as("SELECT id FROM commands WHERE cmd = 'D7'")
            .fetch_optional(db.pool())
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_transaction_rollback() {
        let db = setup_test_db().await;
        let mut tx = db.pool().begin().await.unwrap();

        insert(&mut tx, &NewCommand::new(&ctrl(), CommandCode::WriteSystemClock))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        let found: Option<(i64,)> = sqlx::query_as("SELECT id FROM commands WHERE cmd = 'D7'")
            .fetch_optional(db.pool())
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_find_wait_rights_matches_card() {
        let db = setup_test_db().await;
        let card = CardNumber::new("1234567890").unwrap();
        let mut tx = db.pool().begin().await.unwrap();

        let id = insert(
            &mut tx,
            &NewCommand::new(&ctrl(), CommandCode::AddDeleteCard).with_card_rights(
                &card,
                None,
                None,
                Rights::grant(0x01),
            ),
        )
        .await
        .unwrap();

        let found = find_wait_rights(&mut tx, 7, "1234567890")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.rights(), Rights::grant(0x01));

        let other = find_wait_rights(&mut tx, 7, "0000000001").await.unwrap();
        assert!(other.is_none());
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_update_and_delete_guard_on_wait() {
        let db = setup_test_db().await;
        let card = CardNumber::new("55").unwrap();
        let mut tx = db.pool().begin().await.unwrap();

        let id = insert(
            &mut tx,
            &NewCommand::new(&ctrl(), CommandCode::AddDeleteCard).with_card_rights(
                &card,
                None,
                None,
                Rights::grant(0x02),
            ),
        )
        .await
        .unwrap();

        assert!(
            update_rights(&mut tx, id, Rights::grant(0x06), None, Some("00000500"))
                .await
                .unwrap()
        );

        sqlx::query("UPDATE commands SET status = 'Process' WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .unwrap();

        assert!(
            !update_rights(&mut tx, id, Rights::grant(0x01), None, None)
                .await
                .unwrap()
        );
        assert!(!delete(&mut tx, id).await.unwrap());
        tx.commit().await.unwrap();
    }
}
