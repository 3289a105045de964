use num_enum::{FromPrimitive, IntoPrimitive};
use strum_macros::Display;
use thiserror::Error;

/// Exception code reported by a register transaction.
///
/// `0` means success on the wire and is never carried by this type; any other
/// value is surfaced to the caller verbatim.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ExceptionCode {
    #[error("illegal function")]
    IllegalFunction = 1,

    #[error("illegal data address")]
    IllegalDataAddress = 2,

    #[error("illegal data value")]
    IllegalDataValue = 3,

    #[error("slave failure")]
    SlaveFailure = 4,

    #[error("CRC check error")]
    CrcError = 8,

    #[error("receive packet error")]
    RecvError = 9,

    #[error("memory error")]
    MemoryError = 10,

    #[error("broadcast address or wrong device id")]
    IdError = 11,

    #[num_enum(catch_all)]
    #[error("unknown exception code {0:#04x}")]
    Unknown(u8),
}

/// Measurement-window field named in a [`ValidationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum WindowField {
    #[strum(to_string = "start position")]
    StartPosition,
    #[strum(to_string = "stop position")]
    StopPosition,
    #[strum(to_string = "initial threshold")]
    InitialThreshold,
    #[strum(to_string = "end threshold")]
    EndThreshold,
    #[strum(to_string = "module sensitivity")]
    ModuleSensitivity,
}

/// A measurement-window value rejected before anything was sent.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} {value} outside {min}..={max}")]
    OutOfRange {
        field: WindowField,
        value: u16,
        min: u16,
        max: u16,
    },

    #[error("start position {start} is past stop position {stop}")]
    StartAfterStop { start: u16, stop: u16 },
}

/// The primary error type for the `rs01-lib` library.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RS01Error {
    #[error("data bus error: {0}")]
    DataBus(#[from] ExceptionCode),

    #[error("IC version mismatch: expected PID {expected:#06x}, got {actual:#06x}")]
    IcVersion { expected: u16, actual: u16 },

    #[error("invalid device address {0}, expected 1..=247")]
    InvalidAddress(u16),

    #[error("invalid measurement window: {0}")]
    Validation(#[from] ValidationError),

    #[error("register {register:#06x} holds unexpected value {value:#06x}")]
    InvalidRegisterValue { register: u16, value: u16 },
}
