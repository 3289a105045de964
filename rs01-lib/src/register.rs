//! Field encodings for the RS01 register map.
//!
//! Everything here is pure: enumerations for the communication registers, the
//! packed check-bit/stop-bit word, and the signed comparison offset that the
//! sensor stores in an unsigned register.

use crate::constants::{BAUDRATE_REG, CHECKBIT_STOPBIT_REG};
use crate::error::RS01Error;
use modular_bitfield::prelude::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Baud-rate codes stored in `BAUDRATE_REG`.
///
/// A new rate only takes effect after the sensor is power cycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, TryFromPrimitive, IntoPrimitive, Serialize, Deserialize)]
#[repr(u16)]
pub enum BaudRate {
    #[strum(to_string = "2400")]
    B2400 = 0x0001,
    #[strum(to_string = "4800")]
    B4800 = 0x0002,
    #[strum(to_string = "9600")]
    B9600 = 0x0003,
    #[strum(to_string = "14400")]
    B14400 = 0x0004,
    #[strum(to_string = "19200")]
    B19200 = 0x0005,
    #[strum(to_string = "38400")]
    B38400 = 0x0006,
    #[strum(to_string = "57600")]
    B57600 = 0x0007,
    #[strum(to_string = "115200")]
    B115200 = 0x0008,
    #[strum(to_string = "1000000")]
    B1000000 = 0x0009,
}

impl BaudRate {
    pub const ALL: [BaudRate; 9] = [
        BaudRate::B2400,
        BaudRate::B4800,
        BaudRate::B9600,
        BaudRate::B14400,
        BaudRate::B19200,
        BaudRate::B38400,
        BaudRate::B57600,
        BaudRate::B115200,
        BaudRate::B1000000,
    ];

    /// Line speed in bits per second
    pub fn as_bps(&self) -> u32 {
        match self {
            BaudRate::B2400 => 2400,
            BaudRate::B4800 => 4800,
            BaudRate::B9600 => 9600,
            BaudRate::B14400 => 14400,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115_200,
            BaudRate::B1000000 => 1_000_000,
        }
    }

    pub fn from_bps(bps: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|rate| rate.as_bps() == bps)
    }

    pub(crate) fn decode(word: u16) -> Result<Self, RS01Error> {
        Self::try_from(word).map_err(|_| RS01Error::InvalidRegisterValue {
            register: BAUDRATE_REG,
            value: word,
        })
    }
}

/// Parity mode, carried in the high byte of `CHECKBIT_STOPBIT_REG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Default, TryFromPrimitive, IntoPrimitive, Serialize, Deserialize)]
#[repr(u8)]
pub enum CheckBit {
    #[default]
    #[strum(to_string = "none")]
    None = 0x00,
    #[strum(to_string = "even")]
    Even = 0x01,
    #[strum(to_string = "odd")]
    Odd = 0x02,
}

/// Stop-bit count, carried in the low byte of `CHECKBIT_STOPBIT_REG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Default, TryFromPrimitive, IntoPrimitive, Serialize, Deserialize)]
#[repr(u8)]
pub enum StopBit {
    #[default]
    #[strum(to_string = "1")]
    One = 0x01,
    #[strum(to_string = "2")]
    Two = 0x03,
}

/// Layout of `CHECKBIT_STOPBIT_REG`: stop bits in bits 0-7, check bit in 8-15.
#[bitfield(bytes = 2)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramingRegister {
    pub stop_bit: u8,
    pub check_bit: u8,
}

impl FramingRegister {
    pub fn from_word(word: u16) -> Self {
        Self::from_bytes(word.to_le_bytes())
    }

    pub fn to_word(self) -> u16 {
        u16::from_le_bytes(self.into_bytes())
    }
}

/// Combines one check-bit mode with one stop-bit mode into the register word.
pub fn encode_checkbit_stopbit(check_bit: CheckBit, stop_bit: StopBit) -> u16 {
    FramingRegister::new()
        .with_check_bit(check_bit.into())
        .with_stop_bit(stop_bit.into())
        .to_word()
}

/// Splits the register word back into its two modes.
pub fn decode_checkbit_stopbit(word: u16) -> Result<(CheckBit, StopBit), RS01Error> {
    let invalid = || RS01Error::InvalidRegisterValue {
        register: CHECKBIT_STOPBIT_REG,
        value: word,
    };
    let reg = FramingRegister::from_word(word);
    let check_bit = CheckBit::try_from(reg.check_bit()).map_err(|_| invalid())?;
    let stop_bit = StopBit::try_from(reg.stop_bit()).map_err(|_| invalid())?;
    Ok((check_bit, stop_bit))
}

/// Two's-complement view of the comparison offset as it sits in the register.
pub fn encode_offset(offset: i16) -> u16 {
    offset.cast_unsigned()
}

pub fn decode_offset(word: u16) -> i16 {
    word.cast_signed()
}
