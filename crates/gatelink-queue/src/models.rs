use chrono::{DateTime, Utc};
use gatelink_core::{CardNumber, ControllerRef, Result};
use gatelink_protocol::{CommandCode, Rights, ScheduleCode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a queued command.
///
/// `Wait` is the initial state; the bridge transport moves entries to
/// `Process` when it picks them up and to `Success`/`Failure` when the
/// controller answers. The timeout sweeper moves abandoned `Wait`/`Process`
/// entries straight to `Failure`. Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum CommandStatus {
    Wait,
    Process,
    Success,
    Failure,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Wait => "Wait",
            CommandStatus::Process => "Process",
            CommandStatus::Success => "Success",
            CommandStatus::Failure => "Failure",
        }
    }

    /// Returns `true` once the command can no longer change state.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandStatus::Success | CommandStatus::Failure)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One unit of work destined for one controller.
///
/// Owned by exactly one (bridge, controller) destination; commands are
/// never shared across controllers. `rights_data`/`rights_mask` and
/// `schedule_code` only carry meaning for card-rights (`D1`) commands.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Command {
    /// Auto-increment primary key
    pub id: i64,

    /// Bridge the command travels through
    pub bridge_id: i64,

    /// Controller the command is/was intended for
    pub controller_id: i64,

    /// Wire opcode (see [`CommandCode`])
    pub cmd: String,

    /// Additional payload sent to the controller, opcode-specific
    pub cmd_data: String,

    /// Current lifecycle status
    pub status: CommandStatus,

    /// Error code, meaningful only when status is `Failure`
    pub error: String,

    /// When the command was created
    pub created_at: DateTime<Utc>,

    /// When the command reached a terminal state; set exactly once
    pub executed_at: Option<DateTime<Utc>>,

    /// How many times this intent has been re-submitted after failure
    pub retries: i64,

    /// Card the command operates on (rights commands)
    pub card_number: Option<String>,

    /// Pin code (debug info)
    pub pin_code: Option<String>,

    /// Per-reader time-schedule byte array, hex-encoded (debug info)
    pub schedule_code: Option<String>,

    /// Rights data bitmask (debug info)
    pub rights_data: i64,

    /// Rights mask bitmask (debug info)
    pub rights_mask: i64,

    /// Request payload sent to the bridge, when capture is enabled
    pub request: Option<String>,

    /// Response payload from the bridge, when capture is enabled
    pub response: Option<String>,
}

impl Command {
    /// The typed command code.
    ///
    /// # Errors
    /// Returns an error if the stored opcode is outside the closed set,
    /// which only happens on a corrupted row.
    pub fn code(&self) -> Result<CommandCode> {
        CommandCode::parse(&self.cmd)
    }

    /// The rights statement this command carries.
    #[must_use]
    pub fn rights(&self) -> Rights {
        Rights::new(self.rights_data as u32, self.rights_mask as u32)
    }

    /// Human-readable name: opcode plus description.
    #[must_use]
    pub fn name(&self) -> String {
        match CommandCode::parse(&self.cmd) {
            Ok(code) => format!("{code}"),
            Err(_) => self.cmd.clone(),
        }
    }

    /// Returns `true` once the command can no longer change state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Field set for inserting a new command.
#[derive(Debug, Clone)]
pub struct NewCommand {
    pub bridge_id: i64,
    pub controller_id: i64,
    pub cmd: CommandCode,
    pub cmd_data: String,
    pub card_number: Option<String>,
    pub pin_code: Option<String>,
    pub schedule_code: Option<String>,
    pub rights: Rights,
}

impl NewCommand {
    /// A command for the given controller with an empty payload.
    #[must_use]
    pub fn new(ctrl: &ControllerRef, cmd: CommandCode) -> Self {
        NewCommand {
            bridge_id: ctrl.bridge_id.get(),
            controller_id: ctrl.controller_id.get(),
            cmd,
            cmd_data: String::new(),
            card_number: None,
            pin_code: None,
            schedule_code: None,
            rights: Rights::default(),
        }
    }

    /// Set the opaque payload.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.cmd_data = data.into();
        self
    }

    /// Set the card-rights fields.
    ///
    /// The card number is stored in its wire form, left-padded to 10
    /// digits, so pending-entry lookups match regardless of how the caller
    /// wrote the number.
    #[must_use]
    pub fn with_card_rights(
        mut self,
        card: &CardNumber,
        pin: Option<&str>,
        schedule: Option<ScheduleCode>,
        rights: Rights,
    ) -> Self {
        self.card_number = Some(card.padded());
        self.pin_code = pin.map(str::to_string);
        self.schedule_code = schedule.map(|ts| ts.to_hex());
        self.rights = rights;
        self
    }
}
