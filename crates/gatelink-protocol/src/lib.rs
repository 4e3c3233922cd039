//! Wire-level vocabulary of the Gatelink command engine.
//!
//! This crate is pure: command codes and their coalescing policies, the
//! closed controller error-code set, the rights bitmask codec and merge
//! algorithm, and the relay-mode resolver. No I/O and no storage state —
//! everything here is testable in isolation, including exhaustive sweeps
//! over the rights bit space.

pub mod command_code;
pub mod error_code;
pub mod relay;
pub mod rights;

pub use command_code::{CoalescePolicy, CommandCode};
pub use error_code::ControllerError;
pub use relay::{relay_grant, relay_merge, relay_revoke};
pub use rights::{Rights, ScheduleCode, bit_for_reader};
