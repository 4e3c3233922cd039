//! Closed set of error codes reported by controllers and the bridge.
//!
//! Failure outcomes carry one of these codes. Codes 1-31 come from the
//! controller firmware; codes 20-24 are raised by the bridge SDK layer; 30
//! and 31 are raised by this system when the bridge exchange itself fails.
//! Any code outside the set is normalized to [`ControllerError::Unknown`]
//! on write, never stored verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes a command outcome may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerError {
    Unknown,              // -1
    NoError,              // 0
    I2cRead,              // 1
    I2cWrite,             // 2
    Rs485,                // 3
    WrongParameter,       // 4
    Crc,                  // 5
    Memory,               // 6
    CardsOverflow,        // 7
    Reserved8,            // 8
    CardNotFound,         // 9
    NoCards,              // 10
    Reserved11,           // 11
    ControllerBusy,       // 12
    OneWire,              // 13
    UnknownCommand,       // 14
    NoControllerResponse, // 20
    BadJsonStructure,     // 21
    BadControllerCrc,     // 22
    BridgeBusy,           // 23
    BridgeInternal,       // 24
    NoModuleResponse,     // 30
    IncorrectDataResponse, // 31
}

impl ControllerError {
    /// Parse a reported code, normalizing anything unrecognized to
    /// [`ControllerError::Unknown`].
    #[must_use]
    pub fn parse(code: &str) -> Self {
        match code {
            "0" => ControllerError::NoError,
            "1" => ControllerError::I2cRead,
            "2" => ControllerError::I2cWrite,
            "3" => ControllerError::Rs485,
            "4" => ControllerError::WrongParameter,
            "5" => ControllerError::Crc,
            "6" => ControllerError::Memory,
            "7" => ControllerError::CardsOverflow,
            "8" => ControllerError::Reserved8,
            "9" => ControllerError::CardNotFound,
            "10" => ControllerError::NoCards,
            "11" => ControllerError::Reserved11,
            "12" => ControllerError::ControllerBusy,
            "13" => ControllerError::OneWire,
            "14" => ControllerError::UnknownCommand,
            "20" => ControllerError::NoControllerResponse,
            "21" => ControllerError::BadJsonStructure,
            "22" => ControllerError::BadControllerCrc,
            "23" => ControllerError::BridgeBusy,
            "24" => ControllerError::BridgeInternal,
            "30" => ControllerError::NoModuleResponse,
            "31" => ControllerError::IncorrectDataResponse,
            _ => ControllerError::Unknown,
        }
    }

    /// The stored/wire code for this error.
    #[must_use]
    pub fn as_code(&self) -> &'static str {
        match self {
            ControllerError::Unknown => "-1",
            ControllerError::NoError => "0",
            ControllerError::I2cRead => "1",
            ControllerError::I2cWrite => "2",
            ControllerError::Rs485 => "3",
            ControllerError::WrongParameter => "4",
            ControllerError::Crc => "5",
            ControllerError::Memory => "6",
            ControllerError::CardsOverflow => "7",
            ControllerError::Reserved8 => "8",
            ControllerError::CardNotFound => "9",
            ControllerError::NoCards => "10",
            ControllerError::Reserved11 => "11",
            ControllerError::ControllerBusy => "12",
            ControllerError::OneWire => "13",
            ControllerError::UnknownCommand => "14",
            ControllerError::NoControllerResponse => "20",
            ControllerError::BadJsonStructure => "21",
            ControllerError::BadControllerCrc => "22",
            ControllerError::BridgeBusy => "23",
            ControllerError::BridgeInternal => "24",
            ControllerError::NoModuleResponse => "30",
            ControllerError::IncorrectDataResponse => "31",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ControllerError::Unknown => "Unknown Error",
            ControllerError::NoError => "No Error",
            ControllerError::I2cRead => "I2C Read Error",
            ControllerError::I2cWrite => "I2C Write Error",
            ControllerError::Rs485 => "RS485 Error",
            ControllerError::WrongParameter => "Wrong Value/Parameter",
            ControllerError::Crc => "CRC Error",
            ControllerError::Memory => "Memory Error",
            ControllerError::CardsOverflow => "Cards Overflow",
            ControllerError::Reserved8 => "Not Used",
            ControllerError::CardNotFound => "Card Not Found",
            ControllerError::NoCards => "No Cards",
            ControllerError::Reserved11 => "Not Used",
            ControllerError::ControllerBusy => {
                "Controller Busy, Local Menu Active or Master Card Mode in Use"
            }
            ControllerError::OneWire => "1-Wire Error",
            ControllerError::UnknownCommand => "Unknown Command",
            ControllerError::NoControllerResponse => "No Response from Controller",
            ControllerError::BadJsonStructure => "Bad JSON Structure",
            ControllerError::BadControllerCrc => "Bad CRC from Controller",
            ControllerError::BridgeBusy => "Bridge is Currently in Use",
            ControllerError::BridgeInternal => "Internal Bridge Error, Try Again",
            ControllerError::NoModuleResponse => "No Response from the Module",
            ControllerError::IncorrectDataResponse => "Incorrect Data Response",
        }
    }

    /// Returns `true` for the success code.
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, ControllerError::NoError)
    }
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0", ControllerError::NoError)]
    #[case("9", ControllerError::CardNotFound)]
    #[case("30", ControllerError::NoModuleResponse)]
    #[case("-1", ControllerError::Unknown)]
    fn test_parse_known_codes(#[case] code: &str, #[case] expected: ControllerError) {
        assert_eq!(ControllerError::parse(code), expected);
    }

    #[rstest]
    #[case("99")]
    #[case("banana")]
    #[case("")]
    fn test_unrecognized_codes_normalize_to_unknown(#[case] code: &str) {
        assert_eq!(ControllerError::parse(code), ControllerError::Unknown);
    }

    #[test]
    fn test_code_round_trip() {
        for code in [
            "0", "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "20",
            "21", "22", "23", "24", "30", "31",
        ] {
            assert_eq!(ControllerError::parse(code).as_code(), code);
        }
    }

    #[test]
    fn test_is_ok() {
        assert!(ControllerError::NoError.is_ok());
        assert!(!ControllerError::NoModuleResponse.is_ok());
    }
}
