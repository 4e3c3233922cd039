//! Rights bitmask codec and the pending-command merge algorithm.
//!
//! A permission change for a card is expressed as a `(data, mask)` pair over
//! reader/feature bit positions: `mask` bit *b* set means the command makes
//! an authoritative statement about position *b*, and `data` bit *b* gives
//! the value there. Bits outside the mask are meaningless and must be
//! ignored by consumers.
//!
//! The merge algorithm folds a new pair into one already waiting in the
//! queue so a card only ever has a single pending permission command per
//! controller. Where only one side claims a bit, its value survives; where
//! both claim it, the newer side wins. A merge whose net mask is zero
//! carries no effect and the pending entry is dropped entirely.

use gatelink_core::{Error, ReaderNumber, Result, constants::MAX_READER_SLOTS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rights bit for a reader slot: `1 << (reader - 1)`.
///
/// ```
/// use gatelink_core::ReaderNumber;
/// use gatelink_protocol::bit_for_reader;
///
/// let bits: Vec<u32> = (1..=4)
///     .map(|n| bit_for_reader(ReaderNumber::new(n).unwrap()))
///     .collect();
/// assert_eq!(bits, [1, 2, 4, 8]);
/// ```
#[inline]
#[must_use]
pub fn bit_for_reader(reader: ReaderNumber) -> u32 {
    1 << (reader.get() - 1)
}

/// An authoritative `(data, mask)` statement over rights bit positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rights {
    /// Bit values, meaningful only where the corresponding mask bit is set.
    pub data: u32,

    /// Which bit positions this statement is authoritative over.
    pub mask: u32,
}

impl Rights {
    #[must_use]
    pub fn new(data: u32, mask: u32) -> Self {
        Rights { data, mask }
    }

    /// A grant of exactly the given bits.
    #[must_use]
    pub fn grant(bits: u32) -> Self {
        Rights {
            data: bits,
            mask: bits,
        }
    }

    /// A revocation of exactly the given bits.
    #[must_use]
    pub fn revoke(bits: u32) -> Self {
        Rights { data: 0, mask: bits }
    }

    /// Returns `true` if this statement claims no bit positions at all.
    ///
    /// An empty statement has no effect on controller state; a pending
    /// command that merges down to empty must be deleted, not dispatched.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    /// Fold a newer statement into this (older) pending one.
    ///
    /// Applying the result once has the same ultimate effect on controller
    /// state as applying `self` followed by `newer`. Per bit: a position
    /// claimed by only one side keeps that side's value; a position claimed
    /// by both with the same value keeps it; a position claimed by both
    /// with opposite values drops out of the claim entirely — the XOR terms
    /// cancel the ghost contribution the OR would otherwise leave behind,
    /// since neither statement has reached the controller yet.
    ///
    /// Correct only when always merging into the single most recent pending
    /// statement — callers must serialize merges per (controller, card).
    #[must_use]
    pub fn merge(self, newer: Rights) -> Rights {
        let mut data = newer.data | self.data;
        data ^= newer.mask & self.data;
        data ^= newer.data & self.mask;

        let mut mask = newer.mask | self.mask;
        mask ^= newer.mask & self.data;
        mask ^= newer.data & self.mask;

        Rights { data, mask }
    }
}

impl fmt::Display for Rights {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "data={:#010x} mask={:#010x}", self.data, self.mask)
    }
}

/// Per-reader time-schedule byte array, one byte per reader slot.
///
/// The wire representation is the 4 bytes hex-encoded as 8 uppercase
/// characters. Byte value 0 means "no statement for this slot".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScheduleCode([u8; MAX_READER_SLOTS]);

impl ScheduleCode {
    /// A schedule code making no statement for any slot.
    #[must_use]
    pub fn empty() -> Self {
        ScheduleCode::default()
    }

    /// Place `schedule` in the slot belonging to `reader`, zero elsewhere.
    #[must_use]
    pub fn for_reader(reader: ReaderNumber, schedule: u8) -> Self {
        let mut bytes = [0u8; MAX_READER_SLOTS];
        bytes[reader.slot_index()] = schedule;
        ScheduleCode(bytes)
    }

    /// Parse the 8-character hex wire form.
    ///
    /// # Errors
    /// Returns `Error::InvalidScheduleCode` if the input is not exactly
    /// 8 hex characters.
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != MAX_READER_SLOTS * 2 {
            return Err(Error::InvalidScheduleCode(format!(
                "expected {} hex chars, got {}",
                MAX_READER_SLOTS * 2,
                s.len()
            )));
        }

        let mut bytes = [0u8; MAX_READER_SLOTS];
        for (i, slot) in bytes.iter_mut().enumerate() {
            let pair = &s[i * 2..i * 2 + 2];
            *slot = u8::from_str_radix(pair, 16)
                .map_err(|_| Error::InvalidScheduleCode(format!("bad hex byte '{pair}'")))?;
        }
        Ok(ScheduleCode(bytes))
    }

    /// Hex-encode for the wire (8 uppercase characters).
    #[must_use]
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(MAX_READER_SLOTS * 2);
        for b in self.0 {
            out.push_str(&format!("{b:02X}"));
        }
        out
    }

    /// Byte value for a reader slot.
    #[must_use]
    pub fn slot(&self, reader: ReaderNumber) -> u8 {
        self.0[reader.slot_index()]
    }

    /// Fold a newer schedule code into this (older) one, byte by byte.
    ///
    /// A newer byte of 0 keeps the old byte; any nonzero newer byte
    /// overwrites the slot.
    #[must_use]
    pub fn merged_with(self, newer: ScheduleCode) -> ScheduleCode {
        let mut out = self.0;
        for (slot, new_byte) in out.iter_mut().zip(newer.0) {
            if new_byte != 0 {
                *slot = new_byte;
            }
        }
        ScheduleCode(out)
    }
}

impl fmt::Display for ScheduleCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
