use crate::error::RS01Error;
use crate::register::{BaudRate, CheckBit, StopBit, decode_checkbit_stopbit};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity and serial-communication settings read from registers 0x0000-0x0005.
///
/// The communication registers are kept as the raw words the sensor reported,
/// so an identity block is never lost to a code this crate does not know.
/// [`BasicInfo::baudrate`] and [`BasicInfo::checkbit_stopbit`] give the typed view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicInfo {
    /// Product ID, 0x01E9 for the RS01
    pub pid: u16,
    /// Vendor ID, 0x3343 for DFRobot
    pub vid: u16,
    /// Bus address the sensor answers on (1-247)
    pub address: u16,
    /// Baud-rate code as stored in `BAUDRATE_REG`
    pub baudrate_code: u16,
    /// Check bit in the high byte, stop bit in the low byte
    pub framing: u16,
    /// Raw firmware version, one nibble per component
    pub version: u16,
}

impl BasicInfo {
    pub fn baudrate(&self) -> Result<BaudRate, RS01Error> {
        BaudRate::decode(self.baudrate_code)
    }

    pub fn checkbit_stopbit(&self) -> Result<(CheckBit, StopBit), RS01Error> {
        decode_checkbit_stopbit(self.framing)
    }

    /// Firmware version as printed by the vendor tools, e.g. `V1.0.0.0` for 0x1000
    pub fn firmware_version(&self) -> String {
        let v = self.version;
        format!("V{}.{}.{}.{}", v >> 12, (v >> 8) & 0xF, (v >> 4) & 0xF, v & 0xF)
    }
}

impl fmt::Display for BasicInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID: {:#06x}, VID: {:#06x}, Address: {:#04x}, ", self.pid, self.vid, self.address)?;
        match self.baudrate() {
            Ok(baudrate) => write!(f, "Baud: {}, ", baudrate)?,
            Err(_) => write!(f, "Baud: unknown code {:#06x}, ", self.baudrate_code)?,
        }
        match self.checkbit_stopbit() {
            Ok((check_bit, stop_bit)) => write!(f, "Parity: {}, Stop bits: {}, ", check_bit, stop_bit)?,
            Err(_) => write!(f, "Framing: unknown word {:#06x}, ", self.framing)?,
        }
        write!(f, "Firmware: {}", self.firmware_version())
    }
}
