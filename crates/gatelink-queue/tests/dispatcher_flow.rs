//! End-to-end dispatcher flows against an in-memory store: card rights
//! merging, relay resolution, the command state machine and the periodic
//! maintenance hooks.

use chrono::{Duration, Utc};
use gatelink_core::{
    BridgeId, CardNumber, ControllerId, ControllerRef, DoorNumber, DoorRef, ReaderNumber,
};
use gatelink_protocol::Rights;
use gatelink_queue::{CommandDispatcher, CommandStatus, Database, QueueError};

fn ctrl(relay_mode: Option<u8>) -> ControllerRef {
    ControllerRef {
        bridge_id: BridgeId::new(1),
        controller_id: ControllerId::new(3),
        name: "East wing".to_string(),
        relay_mode,
    }
}

fn door(number: u8, readers: &[u8]) -> DoorRef {
    DoorRef {
        number: DoorNumber::new(number).unwrap(),
        readers: readers
            .iter()
            .map(|&r| ReaderNumber::new(r).unwrap())
            .collect(),
    }
}

fn card(number: &str) -> CardNumber {
    CardNumber::new(number).unwrap()
}

async fn setup() -> (Database, CommandDispatcher) {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
    let db = Database::in_memory().await.unwrap();
    let dispatcher = CommandDispatcher::new(db.clone());
    (db, dispatcher)
}

#[tokio::test]
async fn add_card_resolves_reader_bits_and_schedule() {
    let (_db, d) = setup().await;
    let ctrl = ctrl(None);

    // Door 3 with a single reader in slot 3, schedule 5.
    let cmd = d
        .add_card(&ctrl, &door(3, &[3]), &card("0012345678"), None, 5)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(cmd.cmd, "D1");
    assert_eq!(cmd.rights(), Rights::new(0x04, 0x04));
    assert_eq!(cmd.schedule_code.as_deref(), Some("00000500"));
    assert_eq!(cmd.card_number.as_deref(), Some("0012345678"));
}

#[tokio::test]
async fn add_then_remove_cancels_to_nothing() {
    let (_db, d) = setup().await;
    let ctrl = ctrl(None);
    let c = card("42");

    let pending = d.add_card(&ctrl, &door(1, &[1]), &c, None, 1).await.unwrap();
    assert!(pending.is_some());

    // The revocation cancels the unsent grant instead of queueing.
    let merged = d.remove_card(&ctrl, &door(1, &[1]), &c, None).await.unwrap();
    assert!(merged.is_none());
    assert!(d.list_pending(&ctrl).await.unwrap().is_empty());
}

#[tokio::test]
async fn grants_for_different_doors_accumulate_in_one_entry() {
    let (_db, d) = setup().await;
    let ctrl = ctrl(None);
    let c = card("42");

    let first = d.add_card(&ctrl, &door(1, &[1]), &c, None, 3).await.unwrap().unwrap();
    let second = d.add_card(&ctrl, &door(2, &[2]), &c, None, 7).await.unwrap().unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.rights(), Rights::new(0x03, 0x03));
    assert_eq!(second.schedule_code.as_deref(), Some("03070000"));
    assert_eq!(d.list_pending(&ctrl).await.unwrap().len(), 1);
}

#[tokio::test]
async fn remove_with_nothing_pending_queues_a_revocation() {
    let (_db, d) = setup().await;
    let ctrl = ctrl(None);

    let cmd = d
        .remove_card(&ctrl, &door(2, &[2]), &card("7"), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cmd.rights(), Rights::new(0, 0x02));
    // Stored in wire form, left-padded to 10 digits.
    assert_eq!(cmd.card_number.as_deref(), Some("0000000007"));
}

#[tokio::test]
async fn short_and_padded_spellings_hit_the_same_entry() {
    let (_db, d) = setup().await;
    let ctrl = ctrl(None);

    let first = d.add_card(&ctrl, &door(1, &[1]), &card("42"), None, 1).await.unwrap().unwrap();
    let second = d
        .add_card(&ctrl, &door(2, &[2]), &card("0000000042"), None, 1)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.rights(), Rights::new(0x03, 0x03));
}

#[tokio::test]
async fn relay_mode_two_uses_second_bank() {
    let (_db, d) = setup().await;
    let ctrl = ctrl(Some(2));

    let cmd = d
        .add_card(&ctrl, &door(3, &[2]), &card("9"), None, 0)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cmd.rights(), Rights::new(0x0004_0000, 0x0004_0000));
    assert!(cmd.schedule_code.is_none());
}

#[tokio::test]
async fn relay_mode_three_revoke_denies_everywhere() {
    let (_db, d) = setup().await;
    let ctrl = ctrl(Some(3));
    let c = card("9");

    let grant = d.add_card(&ctrl, &door(5, &[1]), &c, None, 0).await.unwrap().unwrap();
    assert_eq!(grant.rights(), Rights::new(5, u32::MAX));

    // Mode 3 replaces wholesale, so the revoke overwrites the grant with
    // the all-ones deny rather than cancelling.
    let revoke = d.remove_card(&ctrl, &door(5, &[1]), &c, None).await.unwrap().unwrap();
    assert_eq!(revoke.id, grant.id);
    assert_eq!(revoke.rights(), Rights::new(0, u32::MAX));
}

#[tokio::test]
async fn unsupported_relay_mode_names_the_controller() {
    let (_db, d) = setup().await;
    let err = d
        .add_card(&ctrl(Some(9)), &door(1, &[1]), &card("1"), None, 0)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("East wing"));
}

#[tokio::test]
async fn anti_passback_exit_bits() {
    let (_db, d) = setup().await;
    let ctrl = ctrl(None);

    let first = d
        .set_anti_passback_exit(&ctrl, &door(1, &[1]), &card("5"), None, true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.rights(), Rights::new(0x40, 0x40));

    // Other doors share the common exit bit; the deny folds into the same
    // pending entry.
    let second = d
        .set_anti_passback_exit(&ctrl, &door(4, &[4]), &card("5"), None, false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.rights(), Rights::new(0x40, 0x60));
}

#[tokio::test]
async fn full_lifecycle_wait_process_success() {
    let (_db, d) = setup().await;
    let ctrl = ctrl(None);

    let cmd = d.synchronize_clock(&ctrl).await.unwrap();
    assert_eq!(cmd.status, CommandStatus::Wait);
    assert!(cmd.executed_at.is_none());

    let cmd = d.mark_processing(cmd.id, None).await.unwrap();
    assert_eq!(cmd.status, CommandStatus::Process);

    let cmd = d.report_outcome(cmd.id, true, "0", None).await.unwrap();
    assert_eq!(cmd.status, CommandStatus::Success);
    assert_eq!(cmd.error, "0");
    assert!(cmd.executed_at.is_some());
}

#[tokio::test]
async fn terminal_rows_are_immutable() {
    let (_db, d) = setup().await;
    let cmd = d.read_system_info(&ctrl(None)).await.unwrap();
    d.report_outcome(cmd.id, false, "9", None).await.unwrap();

    let err = d.report_outcome(cmd.id, true, "0", None).await.unwrap_err();
    assert!(matches!(err, QueueError::InvalidTransition { .. }));

    let err = d.mark_processing(cmd.id, None).await.unwrap_err();
    assert!(matches!(err, QueueError::InvalidTransition { .. }));
}

#[tokio::test]
async fn sweep_fails_only_stale_commands() {
    let (db, d) = setup().await;
    let ctrl = ctrl(None);

    let stale = d.synchronize_clock(&ctrl).await.unwrap();
    let fresh = d.read_system_info(&ctrl).await.unwrap();

    sqlx::query("UPDATE commands SET created_at = ? WHERE id = ?")
        .bind(Utc::now() - Duration::seconds(90))
        .bind(stale.id)
        .execute(db.pool())
        .await
        .unwrap();

    assert_eq!(d.sweep_timeouts().await.unwrap(), 1);

    let pending = d.list_pending(&ctrl).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, fresh.id);

    let swept = d.mark_processing(stale.id, None).await.unwrap_err();
    assert!(matches!(swept, QueueError::InvalidTransition { .. }));

    let row = sqlx::query_as::<_, (String, String)>(
        "SELECT status, error FROM commands WHERE id = ?",
    )
    .bind(stale.id)
    .fetch_one(db.pool())
    .await
    .unwrap();
    assert_eq!(row, ("Failure".to_string(), "30".to_string()));
}

#[tokio::test]
async fn garbage_collection_respects_retention() {
    let (db, d) = setup().await;
    let ctrl = ctrl(None);

    let old = d.read_system_info(&ctrl).await.unwrap();
    d.report_outcome(old.id, true, "0", None).await.unwrap();
    d.synchronize_clock(&ctrl).await.unwrap();

    sqlx::query("UPDATE commands SET created_at = ? WHERE id = ?")
        .bind(Utc::now() - Duration::days(15))
        .bind(old.id)
        .execute(db.pool())
        .await
        .unwrap();

    assert_eq!(d.garbage_collect_old().await.unwrap(), 1);
    assert_eq!(d.list_pending(&ctrl).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_grants_serialize_into_one_entry() {
    let (_db, d) = setup().await;
    let d = std::sync::Arc::new(d);
    let ctrl = ctrl(None);

    let mut handles = Vec::new();
    for reader in 1..=4u8 {
        let d = std::sync::Arc::clone(&d);
        let ctrl = ctrl.clone();
        handles.push(tokio::spawn(async move {
            d.add_card(&ctrl, &door(reader, &[reader]), &card("314"), None, 1)
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let pending = d.list_pending(&ctrl).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].rights(), Rights::new(0x0F, 0x0F));
}
