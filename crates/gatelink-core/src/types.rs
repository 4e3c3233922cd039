use crate::{
    Result,
    constants::{
        MAX_CARD_LENGTH, MAX_DOOR_NUMBER, MAX_READER_NUMBER, MIN_CARD_LENGTH, MIN_READER_NUMBER,
    },
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Identifier of a network bridge mediating between this system and its
/// field controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BridgeId(i64);

impl BridgeId {
    #[must_use]
    pub fn new(id: i64) -> Self {
        BridgeId(id)
    }

    /// Get the raw bridge ID.
    #[must_use]
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for BridgeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a physical access-control unit behind a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControllerId(i64);

impl ControllerId {
    #[must_use]
    pub fn new(id: i64) -> Self {
        ControllerId(id)
    }

    /// Get the raw controller ID.
    #[must_use]
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Card/badge ordinal number (1-10 decimal digits).
///
/// # Security
/// This type implements constant-time comparison to prevent timing attacks
/// when matching card numbers against queued permission changes.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct CardNumber(String);

impl CardNumber {
    /// Create a new card number with validation.
    ///
    /// The card number is trimmed before validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidCardFormat` if the number is not 1-10 ASCII
    /// decimal digits.
    pub fn new(number: &str) -> Result<Self> {
        let number = number.trim();

        let len = number.len();
        if !(MIN_CARD_LENGTH..=MAX_CARD_LENGTH).contains(&len) {
            return Err(Error::InvalidCardFormat(format!(
                "Card number must be {MIN_CARD_LENGTH}-{MAX_CARD_LENGTH} digits, got {len}"
            )));
        }

        if !number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidCardFormat(
                "Card number must be decimal digits".to_string(),
            ));
        }

        Ok(CardNumber(number.to_string()))
    }

    /// Get the card number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Left-pad with zeros to 10 digits (controller wire standard).
    #[must_use]
    pub fn padded(&self) -> String {
        format!("{:0>10}", self.0)
    }
}

impl fmt::Display for CardNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CardNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CardNumber::new(s)
    }
}

/// Constant-time comparison implementation for CardNumber.
impl PartialEq for CardNumber {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::hash::Hash for CardNumber {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Reader slot ordinal on a controller (1-based, 4 slots max).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReaderNumber(u8);

impl ReaderNumber {
    /// Create a new reader number with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidReaderNumber` if outside 1-4.
    pub fn new(number: u8) -> Result<Self> {
        if !(MIN_READER_NUMBER..=MAX_READER_NUMBER).contains(&number) {
            return Err(Error::InvalidReaderNumber { number });
        }
        Ok(ReaderNumber(number))
    }

    /// Get the raw reader ordinal.
    #[must_use]
    pub fn get(&self) -> u8 {
        self.0
    }

    /// Zero-based index into the per-reader schedule byte array.
    #[must_use]
    pub fn slot_index(&self) -> usize {
        (self.0 - 1) as usize
    }
}

impl fmt::Display for ReaderNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Door ordinal on a controller (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DoorNumber(u8);

impl DoorNumber {
    /// Create a new door number with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidDoorNumber` if outside 1-16.
    pub fn new(number: u8) -> Result<Self> {
        if number < 1 || number > MAX_DOOR_NUMBER {
            return Err(Error::InvalidDoorNumber { number });
        }
        Ok(DoorNumber(number))
    }

    /// Get the raw door ordinal.
    #[must_use]
    pub fn get(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for DoorNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-only view of a controller, as provided by the directory the engine
/// consumes. Only the fields the command engine needs are carried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerRef {
    /// Bridge the controller is reachable through.
    pub bridge_id: BridgeId,

    /// The controller itself.
    pub controller_id: ControllerId,

    /// Human-readable label, used in configuration error messages.
    pub name: String,

    /// Relay addressing mode, for relay-style controllers only.
    ///
    /// `None` means the controller is a regular multi-reader door panel.
    /// The value is validated at resolve time so an unsupported mode can be
    /// reported against the controller that carries it.
    pub relay_mode: Option<u8>,
}

impl ControllerRef {
    /// Returns `true` if the controller uses relay (output bank) addressing.
    #[must_use]
    pub fn is_relay(&self) -> bool {
        self.relay_mode.is_some()
    }
}

/// Read-only view of a door and its populated reader slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoorRef {
    /// Door ordinal on its controller.
    pub number: DoorNumber,

    /// Reader slots wired to this door.
    pub readers: Vec<ReaderNumber>,
}

impl DoorRef {
    /// Returns `true` if the door's second reader slot is populated.
    ///
    /// Mode-2 relay controllers move such doors into the second output bank.
    #[must_use]
    pub fn has_second_reader(&self) -> bool {
        self.readers.iter().any(|r| r.get() == 2)
    }
}
