//! Shared constants for the Gatelink command engine.
//!
//! These values are dictated by the controller hardware family this engine
//! targets: panels with up to four reader slots addressed through a network
//! bridge. Modifying them breaks compatibility with deployed firmware.

// ============================================================================
// Hardware Limits
// ============================================================================

/// Number of reader slots a controller exposes.
///
/// The per-reader time-schedule array is always this many bytes wide, one
/// byte per slot, regardless of how many readers are physically attached.
pub const MAX_READER_SLOTS: usize = 4;

/// Smallest valid reader ordinal (readers are numbered 1-based).
pub const MIN_READER_NUMBER: u8 = 1;

/// Largest valid reader ordinal.
pub const MAX_READER_NUMBER: u8 = MAX_READER_SLOTS as u8;

/// Largest door ordinal addressable in relay bitmask modes.
///
/// Mode 2 controllers shift the door bit into a second output bank, so the
/// base ordinal must leave room for the bank shift within a 32-bit mask.
pub const MAX_DOOR_NUMBER: u8 = 16;

/// Bit shift applied to reach the second output bank on mode-2 relay
/// controllers when the door's second reader slot is populated.
pub const SECOND_BANK_SHIFT: u32 = 16;

// ============================================================================
// Card Numbers
// ============================================================================

/// Maximum card number length in characters.
pub const MAX_CARD_LENGTH: usize = 10;

/// Minimum card number length in characters.
pub const MIN_CARD_LENGTH: usize = 1;

// ============================================================================
// Anti-Passback Rights Bits
// ============================================================================

/// Rights bit granting exit permission for door 1.
pub const APB_EXIT_BIT_DOOR_ONE: u32 = 0x40;

/// Rights bit granting exit permission for any other door.
pub const APB_EXIT_BIT_OTHER: u32 = 0x20;

// ============================================================================
// Queue Maintenance
// ============================================================================

/// Seconds a command may sit in `Wait` or `Process` before the timeout
/// sweeper fails it with "No response from the module".
pub const COMMAND_TIMEOUT_SECS: i64 = 60;

/// Days a finished command is kept before garbage collection removes it.
pub const COMMAND_MAX_AGE_DAYS: i64 = 14;
