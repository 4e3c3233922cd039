//! Coalescing command dispatcher.
//!
//! Single entry point for new command intents. Every submission runs the
//! coalescing policy of its [`CommandCode`] against the latest pending entry
//! for the same destination, so the queue holds at most one mergeable entry
//! per (bridge, controller, code) and at most one rights entry per
//! (controller, card). Submissions for the same key serialize through
//! [`KeyedLocks`]; different keys proceed in parallel.
//!
//! The dispatcher also owns the transport-facing lifecycle calls
//! ([`mark_processing`](CommandDispatcher::mark_processing),
//! [`report_outcome`](CommandDispatcher::report_outcome)) and the periodic
//! maintenance hooks (timeout sweep, garbage collection). It never talks to
//! the bridge itself; draining is the transport's job.

use crate::connection::Database;
use crate::error::{QueueError, QueueResult};
use crate::locks::{KeyedLocks, QueueKey};
use crate::models::{Command, NewCommand};
use crate::repository::{CommandRepository, SqliteCommandRepository};
use crate::transaction;
use chrono::{Duration, Utc};
use gatelink_core::constants::{
    APB_EXIT_BIT_DOOR_ONE, APB_EXIT_BIT_OTHER, COMMAND_MAX_AGE_DAYS, COMMAND_TIMEOUT_SECS,
};
use gatelink_core::{CardNumber, ControllerRef, DoorRef, Error};
use gatelink_protocol::{
    CoalescePolicy, CommandCode, ControllerError, Rights, ScheduleCode, bit_for_reader,
    relay_grant, relay_merge, relay_revoke,
};
use tracing::{debug, info, warn};

/// Tunable behavior of the command store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Capture the raw request/response payloads exchanged with the bridge
    /// on each command row. Off by default; the payloads can carry card
    /// numbers, so production deployments keep this disabled.
    pub save_exchanges: bool,

    /// Seconds a command may sit non-terminal before the sweeper fails it.
    pub timeout_secs: i64,

    /// Days a command row is kept before garbage collection.
    pub max_age_days: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            save_exchanges: false,
            timeout_secs: COMMAND_TIMEOUT_SECS,
            max_age_days: COMMAND_MAX_AGE_DAYS,
        }
    }
}

impl StoreConfig {
    /// Enable request/response capture.
    #[must_use]
    pub fn save_exchanges(mut self, save: bool) -> Self {
        self.save_exchanges = save;
        self
    }

    /// Override the timeout threshold.
    #[must_use]
    pub fn timeout_secs(mut self, secs: i64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Override the garbage-collection age.
    #[must_use]
    pub fn max_age_days(mut self, days: i64) -> Self {
        self.max_age_days = days;
        self
    }
}

/// The coalescing dispatcher over a command store.
pub struct CommandDispatcher {
    db: Database,
    repo: SqliteCommandRepository,
    locks: KeyedLocks,
    config: StoreConfig,
}

impl CommandDispatcher {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self::with_config(db, StoreConfig::default())
    }

    #[must_use]
    pub fn with_config(db: Database, config: StoreConfig) -> Self {
        let repo = SqliteCommandRepository::new(db.pool().clone());
        Self {
            db,
            repo,
            locks: KeyedLocks::new(),
            config,
        }
    }

    // ------------------------------------------------------------------
    // Generic submission
    // ------------------------------------------------------------------

    /// Queue a command intent, applying the code's coalescing policy.
    ///
    /// Returns the resulting pending entry: freshly inserted, updated in
    /// place, or (for singletons) the already-waiting one.
    ///
    /// # Errors
    ///
    /// Rights commands (`D1`) cannot travel through this call — they need a
    /// card number and the merge path; use [`add_card`](Self::add_card) and
    /// friends instead.
    pub async fn submit(
        &self,
        ctrl: &ControllerRef,
        code: CommandCode,
        data: impl Into<String>,
    ) -> QueueResult<Command> {
        let data = data.into();
        let policy = code.policy();
        if policy == CoalescePolicy::RightsMerge {
            return Err(QueueError::Core(Error::MissingField("card_number")));
        }

        let _guard = self
            .locks
            .acquire(QueueKey::Command {
                bridge_id: ctrl.bridge_id.get(),
                controller_id: ctrl.controller_id.get(),
                cmd: code.as_str(),
            })
            .await;

        let pending = self
            .repo
            .find_last_wait(ctrl.bridge_id.get(), ctrl.controller_id.get(), code.as_str())
            .await?;

        let coalesced = match (policy, &pending) {
            (CoalescePolicy::Append, _) | (_, None) => None,

            (CoalescePolicy::Singleton, Some(existing)) => {
                debug!(cmd = %code, id = existing.id, "duplicate submission, keeping pending entry");
                return Ok(existing.clone());
            }

            (CoalescePolicy::Overwrite, Some(existing)) => Some(existing.id),

            // Open-output pulses address an output in the first two payload
            // characters; only same-output pulses collapse.
            (CoalescePolicy::SubAddressed, Some(existing))
                if existing.cmd_data.get(..2) == data.get(..2) =>
            {
                Some(existing.id)
            }
            (CoalescePolicy::SubAddressed, Some(_)) => None,

            (CoalescePolicy::RightsMerge, _) => unreachable!("rejected above"),
        };

        if let Some(id) = coalesced
            && self.repo.update_payload(id, &data).await?
        {
            debug!(cmd = %code, id, "coalesced into pending entry");
            return self
                .repo
                .find_by_id(id)
                .await?
                .ok_or(QueueError::NotFound(id));
        }

        let cmd = self
            .repo
            .insert(&NewCommand::new(ctrl, code).with_data(data))
            .await?;
        debug!(cmd = %code, id = cmd.id, controller = %ctrl.controller_id, "queued");
        Ok(cmd)
    }

    // ------------------------------------------------------------------
    // Read / singleton intents
    // ------------------------------------------------------------------

    pub async fn read_system_info(&self, ctrl: &ControllerRef) -> QueueResult<Command> {
        self.submit(ctrl, CommandCode::ReadSystemInfo, "").await
    }

    /// Queue a clock sync. The transport stamps the actual wall-clock time
    /// when it picks the command up, so the payload stays empty here.
    pub async fn synchronize_clock(&self, ctrl: &ControllerRef) -> QueueResult<Command> {
        self.submit(ctrl, CommandCode::WriteSystemClock, "").await
    }

    pub async fn read_controller_status(&self, ctrl: &ControllerRef) -> QueueResult<Command> {
        self.submit(ctrl, CommandCode::ReadControllerStatus, "").await
    }

    pub async fn read_anti_passback_mode(&self, ctrl: &ControllerRef) -> QueueResult<Command> {
        self.submit(ctrl, CommandCode::ReadAntiPassbackMode, "").await
    }

    pub async fn read_readers_mode(&self, ctrl: &ControllerRef) -> QueueResult<Command> {
        self.submit(ctrl, CommandCode::ReadReadersMode, "").await
    }

    pub async fn read_io_table(&self, ctrl: &ControllerRef) -> QueueResult<Command> {
        self.submit(ctrl, CommandCode::ReadIoTable, "00").await
    }

    // ------------------------------------------------------------------
    // Overwrite intents
    // ------------------------------------------------------------------

    pub async fn write_controller_mode(
        &self,
        ctrl: &ControllerRef,
        data: impl Into<String>,
    ) -> QueueResult<Command> {
        self.submit(ctrl, CommandCode::WriteControllerMode, data).await
    }

    pub async fn write_io_table(
        &self,
        ctrl: &ControllerRef,
        data: impl Into<String>,
    ) -> QueueResult<Command> {
        self.submit(ctrl, CommandCode::WriteIoTable, data).await
    }

    pub async fn write_readers_mode(
        &self,
        ctrl: &ControllerRef,
        data: impl Into<String>,
    ) -> QueueResult<Command> {
        self.submit(ctrl, CommandCode::WriteReadersMode, data).await
    }

    pub async fn write_anti_passback_mode(
        &self,
        ctrl: &ControllerRef,
        data: impl Into<String>,
    ) -> QueueResult<Command> {
        self.submit(ctrl, CommandCode::WriteAntiPassbackMode, data).await
    }

    /// Pulse an output open. The first two payload characters address the
    /// output, so pulses for different outputs queue independently.
    pub async fn open_output(
        &self,
        ctrl: &ControllerRef,
        data: impl Into<String>,
    ) -> QueueResult<Command> {
        self.submit(ctrl, CommandCode::OpenOutput, data).await
    }

    // ------------------------------------------------------------------
    // Maintenance intents
    // ------------------------------------------------------------------

    /// Wipe the controller's card table.
    pub async fn delete_all_cards(&self, ctrl: &ControllerRef) -> QueueResult<Command> {
        self.submit(ctrl, CommandCode::SystemInitialization, "0303").await
    }

    /// Wipe the controller's event log.
    pub async fn delete_all_events(&self, ctrl: &ControllerRef) -> QueueResult<Command> {
        self.submit(ctrl, CommandCode::SystemInitialization, "0404").await
    }

    // ------------------------------------------------------------------
    // Card rights
    // ------------------------------------------------------------------

    /// Grant a card access through a door.
    ///
    /// On a regular panel every reader slot wired to the door contributes
    /// its rights bit and its schedule slot; on a relay controller the
    /// statement comes from the relay-mode resolver and the schedule is
    /// meaningless. Either way the statement folds into the card's single
    /// pending rights entry.
    ///
    /// Returns `None` when the merge cancelled the pending entry out.
    ///
    /// # Errors
    ///
    /// Relay controllers with an unsupported mode fail with
    /// `UnsupportedMode` naming the controller.
    pub async fn add_card(
        &self,
        ctrl: &ControllerRef,
        door: &DoorRef,
        card: &CardNumber,
        pin: Option<&str>,
        schedule: u8,
    ) -> QueueResult<Option<Command>> {
        let (rights, ts) = if ctrl.is_relay() {
            (relay_grant(ctrl, door)?, None)
        } else {
            let mut bits = 0u32;
            let mut ts = ScheduleCode::empty();
            for &reader in &door.readers {
                bits |= bit_for_reader(reader);
                ts = ts.merged_with(ScheduleCode::for_reader(reader, schedule));
            }
            (Rights::grant(bits), Some(ts))
        };
        self.merge_card_rights(ctrl, card, pin, ts, rights).await
    }

    /// Revoke a card's access through a door.
    ///
    /// Returns `None` when the revocation cancelled a pending grant instead
    /// of queueing anything.
    pub async fn remove_card(
        &self,
        ctrl: &ControllerRef,
        door: &DoorRef,
        card: &CardNumber,
        pin: Option<&str>,
    ) -> QueueResult<Option<Command>> {
        let rights = if ctrl.is_relay() {
            relay_revoke(ctrl, door)?
        } else {
            let bits = door
                .readers
                .iter()
                .fold(0u32, |acc, &reader| acc | bit_for_reader(reader));
            Rights::revoke(bits)
        };
        self.merge_card_rights(ctrl, card, pin, None, rights).await
    }

    /// Set whether a card may exit through an anti-passback door.
    ///
    /// Door 1 uses a dedicated exit bit; every other door shares the common
    /// one.
    pub async fn set_anti_passback_exit(
        &self,
        ctrl: &ControllerRef,
        door: &DoorRef,
        card: &CardNumber,
        pin: Option<&str>,
        can_exit: bool,
    ) -> QueueResult<Option<Command>> {
        let bit = if door.number.get() == 1 {
            APB_EXIT_BIT_DOOR_ONE
        } else {
            APB_EXIT_BIT_OTHER
        };
        let rights = if can_exit {
            Rights::grant(bit)
        } else {
            Rights::revoke(bit)
        };
        self.merge_card_rights(ctrl, card, pin, None, rights).await
    }

    /// Fold a rights statement into the card's pending entry, or create one.
    ///
    /// The whole read-merge-write runs in one transaction under the card's
    /// submission lock, so the merge always sees the true latest pending
    /// statement. A merge whose net mask is zero deletes the pending entry
    /// (or, with nothing pending, does nothing) and returns `None`.
    async fn merge_card_rights(
        &self,
        ctrl: &ControllerRef,
        card: &CardNumber,
        pin: Option<&str>,
        schedule: Option<ScheduleCode>,
        rights: Rights,
    ) -> QueueResult<Option<Command>> {
        // Lock and look up by the padded wire form, the same shape the
        // entry is stored under.
        let wire_card = card.padded();
        let _guard = self
            .locks
            .acquire(QueueKey::CardRights {
                controller_id: ctrl.controller_id.get(),
                card: wire_card.clone(),
            })
            .await;

        let mut tx = self.db.pool().begin().await?;
        let pending =
            transaction::find_wait_rights(&mut tx, ctrl.controller_id.get(), &wire_card).await?;

        let result = match pending {
            None if rights.is_empty() => {
                // Nothing pending and nothing claimed: no entry to cancel,
                // no statement to queue.
                None
            }
            None => {
                let new = NewCommand::new(ctrl, CommandCode::AddDeleteCard).with_card_rights(
                    card,
                    pin,
                    schedule,
                    rights,
                );
                let id = transaction::insert(&mut tx, &new).await?;
                debug!(id, controller = %ctrl.controller_id, %rights, "queued rights change");
                transaction::find_by_id(&mut tx, id).await?
            }
            Some(old) => {
                let merged = match ctrl.relay_mode {
                    Some(mode) => relay_merge(mode, old.rights(), rights),
                    None => old.rights().merge(rights),
                };

                if merged.is_empty() {
                    transaction::delete(&mut tx, old.id).await?;
                    debug!(id = old.id, controller = %ctrl.controller_id, "rights merge cancelled pending entry");
                    None
                } else {
                    let old_ts = match old.schedule_code.as_deref() {
                        Some(hex) => ScheduleCode::from_hex(hex).map_err(QueueError::Core)?,
                        None => ScheduleCode::empty(),
                    };
                    let ts = old_ts.merged_with(schedule.unwrap_or_default());
                    let ts_hex = (ts != ScheduleCode::empty()).then(|| ts.to_hex());

                    if transaction::update_rights(&mut tx, old.id, merged, pin, ts_hex.as_deref())
                        .await?
                    {
                        debug!(id = old.id, controller = %ctrl.controller_id, %merged, "merged rights into pending entry");
                        transaction::find_by_id(&mut tx, old.id).await?
                    } else {
                        // The pending entry left Wait between the read and
                        // the write; queue the new statement on its own.
                        let new = NewCommand::new(ctrl, CommandCode::AddDeleteCard)
                            .with_card_rights(card, pin, schedule, rights);
                        let id = transaction::insert(&mut tx, &new).await?;
                        transaction::find_by_id(&mut tx, id).await?
                    }
                }
            }
        };

        tx.commit().await?;
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Transport lifecycle
    // ------------------------------------------------------------------

    /// Pending commands for a controller, oldest first.
    pub async fn list_pending(&self, ctrl: &ControllerRef) -> QueueResult<Vec<Command>> {
        self.repo
            .list_pending(ctrl.bridge_id.get(), ctrl.controller_id.get())
            .await
    }

    /// Move a command to `Process` as the transport picks it up.
    ///
    /// The request payload is only stored when exchange capture is enabled.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the command is not in `Wait`.
    pub async fn mark_processing(&self, id: i64, request: Option<&str>) -> QueueResult<Command> {
        let request = if self.config.save_exchanges {
            request
        } else {
            None
        };
        if self.repo.mark_processing(id, request).await? {
            return self.repo.find_by_id(id).await?.ok_or(QueueError::NotFound(id));
        }
        Err(self.transition_error(id).await?)
    }

    /// Record the controller's answer as the command's terminal outcome.
    ///
    /// Unrecognized error codes are normalized to the unknown code before
    /// storage; a successful outcome always stores the no-error code. The
    /// response payload is only stored when exchange capture is enabled.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the command is already terminal; an
    /// outcome lands exactly once.
    pub async fn report_outcome(
        &self,
        id: i64,
        success: bool,
        error_code: &str,
        response: Option<&str>,
    ) -> QueueResult<Command> {
        let error = if success {
            ControllerError::NoError
        } else {
            ControllerError::parse(error_code)
        };
        let response = if self.config.save_exchanges {
            response
        } else {
            None
        };

        if self
            .repo
            .record_outcome(id, success, error.as_code(), response)
            .await?
        {
            let cmd = self.repo.find_by_id(id).await?.ok_or(QueueError::NotFound(id))?;
            if success {
                debug!(id, cmd = %cmd.name(), "command succeeded");
            } else {
                warn!(id, cmd = %cmd.name(), error = error.as_code(), "command failed: {}", error.description());
            }
            return Ok(cmd);
        }
        Err(self.transition_error(id).await?)
    }

    async fn transition_error(&self, id: i64) -> QueueResult<QueueError> {
        Ok(match self.repo.find_by_id(id).await? {
            Some(cmd) => QueueError::InvalidTransition {
                id,
                status: cmd.status.to_string(),
            },
            None => QueueError::NotFound(id),
        })
    }

    // ------------------------------------------------------------------
    // Periodic maintenance
    // ------------------------------------------------------------------

    /// Fail every non-terminal command older than the timeout threshold.
    ///
    /// Returns the number of commands failed.
    pub async fn sweep_timeouts(&self) -> QueueResult<u64> {
        let cutoff = Utc::now() - Duration::seconds(self.config.timeout_secs);
        let swept = self
            .repo
            .fail_stale(cutoff, ControllerError::NoModuleResponse.as_code())
            .await?;
        if swept > 0 {
            info!(swept, "timed out unanswered commands");
        }
        Ok(swept)
    }

    /// Delete command rows older than the retention window.
    ///
    /// Non-terminal rows past the window have long since been failed by the
    /// sweeper, so this only ever removes history.
    pub async fn garbage_collect_old(&self) -> QueueResult<u64> {
        let cutoff = Utc::now() - Duration::days(self.config.max_age_days);
        let removed = self.repo.delete_older_than(cutoff).await?;
        if removed > 0 {
            info!(removed, "garbage collected old commands");
        }
        Ok(removed)
    }
}
