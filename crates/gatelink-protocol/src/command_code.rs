//! Command code definitions for bridge-attached door controllers.
//!
//! Every unit of work queued for a controller carries one of these codes.
//! The code identifies both the wire opcode sent through the bridge and the
//! coalescing policy the dispatcher applies when an equivalent command is
//! already waiting.
//!
//! # Code Families
//!
//! - `Fx` — read commands (system info, modes, tables, clock)
//! - `Dx` — write commands (cards, schedules, modes, outputs)
//! - `Bx` — status/auxiliary commands
//!
//! # Coalescing
//!
//! Each code maps to exactly one [`CoalescePolicy`]. The mapping is a closed
//! match so adding a new code forces a policy decision instead of silently
//! defaulting to append-only behavior.

use gatelink_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Command codes understood by the controller family.
///
/// The wire representation is the two- or three-character hex-style opcode
/// the bridge forwards verbatim to the controller.
///
/// # Examples
///
/// ```
/// use gatelink_protocol::CommandCode;
///
/// let cmd = CommandCode::AddDeleteCard;
/// assert_eq!(cmd.as_str(), "D1");
///
/// let parsed = CommandCode::parse("F0").unwrap();
/// assert_eq!(parsed, CommandCode::ReadSystemInfo);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandCode {
    // Reads
    ReadSystemInfo,         // F0
    ReadCardInfo,           // F1
    ReadCardGroup,          // F2
    ReadTimeSchedules,      // F3
    ReadHolidayList,        // F4
    ReadControllerMode,     // F5
    ReadReadersMode,        // F6
    ReadSystemClock,        // F7
    ReadDuressMode,         // F8
    ReadIoTable,            // F9
    ReadInputFlags,         // FB
    ReadAntiPassbackMode,   // FC
    ReadFireSecurityStatus, // FD
    ReadFireSoundTime,      // FE
    ReadOutputTsTable,      // FF

    // Writes
    WriteControllerId,     // D0
    AddDeleteCard,         // D1
    DeleteCard,            // D2
    WriteTimeSchedules,    // D3
    WriteHolidayList,      // D4
    WriteControllerMode,   // D5
    WriteReadersMode,      // D6
    WriteSystemClock,      // D7
    WriteDuressMode,       // D8
    WriteIoTable,          // D9
    DeleteLastEvent,       // DA
    OpenOutput,            // DB
    SystemInitialization,  // DC
    WriteInputFlags,       // DD
    WriteAntiPassbackMode, // DE
    WriteOutputTsTable,    // DF

    // Status/auxiliary
    ReadControllerStatus, // B3
    HotelButtonsSense,    // B4
}

/// How the dispatcher treats a new command when an equivalent entry is
/// already waiting for the same (bridge, controller) destination.
///
/// This is the closed policy dispatch: one variant per behavioral category,
/// chosen per [`CommandCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoalescePolicy {
    /// Always insert a new entry; never coalesce.
    Append,

    /// Replace the pending entry's payload wholesale. The command is an
    /// idempotent overwrite, so only the latest payload matters.
    Overwrite,

    /// A pending entry makes the new request redundant; discard it and
    /// return the existing entry.
    Singleton,

    /// Coalesce only when the addressed sub-target (first two payload
    /// characters) matches the pending entry's.
    SubAddressed,

    /// Route through the rights-merge algorithm keyed by card number.
    RightsMerge,
}

impl CommandCode {
    /// Parse a wire opcode.
    ///
    /// # Errors
    /// Returns `Error::InvalidCommandCode` for opcodes outside the closed set.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "F0" => Ok(CommandCode::ReadSystemInfo),
            "F1" => Ok(CommandCode::ReadCardInfo),
            "F2" => Ok(CommandCode::ReadCardGroup),
            "F3" => Ok(CommandCode::ReadTimeSchedules),
            "F4" => Ok(CommandCode::ReadHolidayList),
            "F5" => Ok(CommandCode::ReadControllerMode),
            "F6" => Ok(CommandCode::ReadReadersMode),
            "F7" => Ok(CommandCode::ReadSystemClock),
            "F8" => Ok(CommandCode::ReadDuressMode),
            "F9" => Ok(CommandCode::ReadIoTable),
            "FB" => Ok(CommandCode::ReadInputFlags),
            "FC" => Ok(CommandCode::ReadAntiPassbackMode),
            "FD" => Ok(CommandCode::ReadFireSecurityStatus),
            "FE" => Ok(CommandCode::ReadFireSoundTime),
            "FF" => Ok(CommandCode::ReadOutputTsTable),
            "D0" => Ok(CommandCode::WriteControllerId),
            "D1" => Ok(CommandCode::AddDeleteCard),
            "D2" => Ok(CommandCode::DeleteCard),
            "D3" => Ok(CommandCode::WriteTimeSchedules),
            "D4" => Ok(CommandCode::WriteHolidayList),
            "D5" => Ok(CommandCode::WriteControllerMode),
            "D6" => Ok(CommandCode::WriteReadersMode),
            "D7" => Ok(CommandCode::WriteSystemClock),
            "D8" => Ok(CommandCode::WriteDuressMode),
            "D9" => Ok(CommandCode::WriteIoTable),
            "DA" => Ok(CommandCode::DeleteLastEvent),
            "DB" => Ok(CommandCode::OpenOutput),
            "DC" => Ok(CommandCode::SystemInitialization),
            "DD" => Ok(CommandCode::WriteInputFlags),
            "DE" => Ok(CommandCode::WriteAntiPassbackMode),
            "DF" => Ok(CommandCode::WriteOutputTsTable),
            "B3" => Ok(CommandCode::ReadControllerStatus),
            "B4" => Ok(CommandCode::HotelButtonsSense),
            _ => Err(Error::InvalidCommandCode(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandCode::ReadSystemInfo => "F0",
            CommandCode::ReadCardInfo => "F1",
            CommandCode::ReadCardGroup => "F2",
            CommandCode::ReadTimeSchedules => "F3",
            CommandCode::ReadHolidayList => "F4",
            CommandCode::ReadControllerMode => "F5",
            CommandCode::ReadReadersMode => "F6",
            CommandCode::ReadSystemClock => "F7",
            CommandCode::ReadDuressMode => "F8",
            CommandCode::ReadIoTable => "F9",
            CommandCode::ReadInputFlags => "FB",
            CommandCode::ReadAntiPassbackMode => "FC",
            CommandCode::ReadFireSecurityStatus => "FD",
            CommandCode::ReadFireSoundTime => "FE",
            CommandCode::ReadOutputTsTable => "FF",
            CommandCode::WriteControllerId => "D0",
            CommandCode::AddDeleteCard => "D1",
            CommandCode::DeleteCard => "D2",
            CommandCode::WriteTimeSchedules => "D3",
            CommandCode::WriteHolidayList => "D4",
            CommandCode::WriteControllerMode => "D5",
            CommandCode::WriteReadersMode => "D6",
            CommandCode::WriteSystemClock => "D7",
            CommandCode::WriteDuressMode => "D8",
            CommandCode::WriteIoTable => "D9",
            CommandCode::DeleteLastEvent => "DA",
            CommandCode::OpenOutput => "DB",
            CommandCode::SystemInitialization => "DC",
            CommandCode::WriteInputFlags => "DD",
            CommandCode::WriteAntiPassbackMode => "DE",
            CommandCode::WriteOutputTsTable => "DF",
            CommandCode::ReadControllerStatus => "B3",
            CommandCode::HotelButtonsSense => "B4",
        }
    }

    /// Human-readable description, matching the controller documentation.
    pub fn description(&self) -> &'static str {
        match self {
            CommandCode::ReadSystemInfo => "Read System Information",
            CommandCode::ReadCardInfo => "Read/Search Card And Info",
            CommandCode::ReadCardGroup => "Read Group of Cards",
            CommandCode::ReadTimeSchedules => "Read Time Schedules",
            CommandCode::ReadHolidayList => "Read Holiday List",
            CommandCode::ReadControllerMode => "Read Controller Mode",
            CommandCode::ReadReadersMode => "Read Readers Mode",
            CommandCode::ReadSystemClock => "Read System Clock",
            CommandCode::ReadDuressMode => "Read Duress Mode",
            CommandCode::ReadIoTable => "Read Input/Output Table",
            CommandCode::ReadInputFlags => "Read Inputs Flags",
            CommandCode::ReadAntiPassbackMode => "Read Anti-Passback Mode",
            CommandCode::ReadFireSecurityStatus => "Read Fire & Security Status",
            CommandCode::ReadFireSoundTime => "Read FireTime, Sound Time",
            CommandCode::ReadOutputTsTable => "Read Output T/S Table",
            CommandCode::WriteControllerId => "Write Controller ID",
            CommandCode::AddDeleteCard => "Add/Delete Card",
            CommandCode::DeleteCard => "Delete Card",
            CommandCode::WriteTimeSchedules => "Write Time Schedules",
            CommandCode::WriteHolidayList => "Write Holiday List",
            CommandCode::WriteControllerMode => "Write Controller Mode",
            CommandCode::WriteReadersMode => "Write Readers Mode",
            CommandCode::WriteSystemClock => "Write Controller System Clock",
            CommandCode::WriteDuressMode => "Write Duress Mode",
            CommandCode::WriteIoTable => "Write Input/Output Table",
            CommandCode::DeleteLastEvent => "Delete Last Event",
            CommandCode::OpenOutput => "Open Output",
            CommandCode::SystemInitialization => "System Initialization",
            CommandCode::WriteInputFlags => "Write Input Flags",
            CommandCode::WriteAntiPassbackMode => "Write Anti-Passback Mode",
            CommandCode::WriteOutputTsTable => "Write Outputs T/S Table",
            CommandCode::ReadControllerStatus => "Read Controller Status",
            CommandCode::HotelButtonsSense => "Read/Write Hotel Buttons Sense",
        }
    }

    /// The coalescing policy the dispatcher applies for this code.
    ///
    /// Closed dispatch: every code names its policy explicitly.
    #[must_use]
    pub fn policy(&self) -> CoalescePolicy {
        match self {
            CommandCode::OpenOutput => CoalescePolicy::SubAddressed,

            CommandCode::WriteIoTable
            | CommandCode::WriteControllerMode
            | CommandCode::WriteAntiPassbackMode
            | CommandCode::WriteReadersMode => CoalescePolicy::Overwrite,

            CommandCode::WriteSystemClock
            | CommandCode::ReadSystemInfo
            | CommandCode::ReadAntiPassbackMode
            | CommandCode::ReadControllerStatus => CoalescePolicy::Singleton,

            CommandCode::AddDeleteCard => CoalescePolicy::RightsMerge,

            CommandCode::ReadCardInfo
            | CommandCode::ReadCardGroup
            | CommandCode::ReadTimeSchedules
            | CommandCode::ReadHolidayList
            | CommandCode::ReadControllerMode
            | CommandCode::ReadReadersMode
            | CommandCode::ReadSystemClock
            | CommandCode::ReadDuressMode
            | CommandCode::ReadIoTable
            | CommandCode::ReadInputFlags
            | CommandCode::ReadFireSecurityStatus
            | CommandCode::ReadFireSoundTime
            | CommandCode::ReadOutputTsTable
            | CommandCode::WriteControllerId
            | CommandCode::DeleteCard
            | CommandCode::WriteTimeSchedules
            | CommandCode::WriteHolidayList
            | CommandCode::WriteDuressMode
            | CommandCode::DeleteLastEvent
            | CommandCode::SystemInitialization
            | CommandCode::WriteInputFlags
            | CommandCode::WriteOutputTsTable
            | CommandCode::HotelButtonsSense => CoalescePolicy::Append,
        }
    }

}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.as_str(), self.description())
    }
}
