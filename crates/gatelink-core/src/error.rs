use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Controller {controller} has unsupported relay mode {mode}")]
    UnsupportedMode { controller: String, mode: u8 },

    #[error("Controller {0} is not a relay controller")]
    NotARelayController(String),

    // Validation errors
    #[error("Invalid command code: {0}")]
    InvalidCommandCode(String),

    #[error("Invalid card format: {0}")]
    InvalidCardFormat(String),

    #[error("Reader number must be 1-4, got {number}")]
    InvalidReaderNumber { number: u8 },

    #[error("Door number must be 1-16, got {number}")]
    InvalidDoorNumber { number: u8 },

    #[error("Invalid schedule code: {0}")]
    InvalidScheduleCode(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
