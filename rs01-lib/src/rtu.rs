//! Modbus-RTU transport over a serial line.
//!
//! Implements function 0x03 (read holding registers) and 0x10 (write multiple
//! registers). Frames are `unit id | PDU | CRC-16/MODBUS (little endian)`.
//!
//! The line is resynchronised on every transaction: input left over from an
//! earlier late or partial reply is discarded before the request goes out, and
//! the reply is taken as the first span of bytes that forms a frame for the
//! request's function code with a matching CRC. Anything in front of it is
//! skipped.
//!
//! Every failure is reported through the exception-code space: a corrupt frame
//! followed by silence as [`ExceptionCode::CrcError`], silence and malformed
//! replies as [`ExceptionCode::RecvError`], a reply from another unit as
//! [`ExceptionCode::IdError`].

use crate::error::ExceptionCode;
use crate::register::{CheckBit, StopBit};
use crate::transport::Transport;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc::{CRC_16_MODBUS, Crc};
use num_enum::FromPrimitive;
use serialport::{ClearBuffer, DataBits, Parity, SerialPort};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, trace, warn};

pub const FN_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const FN_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

pub const MODBUS_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Set on the function code of an exception reply
const EXCEPTION_FLAG: u8 = 0x80;

const MAX_READ_REGISTERS: usize = 125;
const MAX_WRITE_REGISTERS: usize = 123;

/// Unit id, function code, exception code, CRC
const EXCEPTION_FRAME_LEN: usize = 5;

/// Unit id, function code, address, quantity, CRC
const WRITE_REPLY_LEN: usize = 8;

/// Bytes read while looking for one reply before the line counts as garbled
const MAX_SCAN_LEN: usize = 512;

/// Response timeout used by the vendor's own tools
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Byte stream carrying RTU frames.
///
/// Reads must give up with an error (usually `TimedOut`) once the line has
/// been quiet for the response timeout.
pub trait Line: Read + Write {
    /// Drops every byte received but not read yet.
    fn discard_input(&mut self) -> io::Result<()>;
}

impl Line for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

/// Line settings for opening a serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub check_bit: CheckBit,
    pub stop_bit: StopBit,
    pub timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            check_bit: CheckBit::None,
            stop_bit: StopBit::One,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub struct RtuTransport<S> {
    line: S,
}

impl RtuTransport<Box<dyn SerialPort>> {
    /// Opens `path` with 8 data bits and the given line settings.
    pub fn open(path: &str, settings: &SerialSettings) -> Result<Self, serialport::Error> {
        let parity = match settings.check_bit {
            CheckBit::None => Parity::None,
            CheckBit::Even => Parity::Even,
            CheckBit::Odd => Parity::Odd,
        };
        let stop_bits = match settings.stop_bit {
            StopBit::One => serialport::StopBits::One,
            StopBit::Two => serialport::StopBits::Two,
        };
        debug!(
            path,
            baud = settings.baud_rate,
            parity = %settings.check_bit,
            stop_bits = %settings.stop_bit,
            "Opening serial port"
        );
        let port = serialport::new(path, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(settings.timeout)
            .open()?;
        Ok(Self::new(port))
    }
}

impl<S: Line> RtuTransport<S> {
    pub fn new(line: S) -> Self {
        Self { line }
    }

    pub fn get_ref(&self) -> &S {
        &self.line
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.line
    }

    pub fn into_inner(self) -> S {
        self.line
    }

    /// Sends one request and returns the reply body between the function code and the CRC.
    fn transact(&mut self, unit_id: u8, pdu: &[u8], reply_len: usize) -> Result<Bytes, ExceptionCode> {
        if unit_id == 0 {
            // broadcasts never get a reply
            return Err(ExceptionCode::IdError);
        }
        let function = pdu[0];

        let mut frame = BytesMut::with_capacity(pdu.len() + 3);
        frame.put_u8(unit_id);
        frame.put_slice(pdu);
        let crc = MODBUS_CRC.checksum(&frame);
        frame.put_u16_le(crc);
        trace!(frame = %hex::encode(&frame), "tx");

        self.line.discard_input().map_err(link_error)?;
        self.line.write_all(&frame).map_err(link_error)?;
        self.line.flush().map_err(link_error)?;

        let reply = self.receive(unit_id, function, reply_len)?;
        trace!(frame = %hex::encode(&reply), "rx");

        if reply[0] != unit_id {
            warn!("Reply from unit {} while talking to unit {}", reply[0], unit_id);
            return Err(ExceptionCode::IdError);
        }
        if reply[1] & EXCEPTION_FLAG != 0 {
            let code = ExceptionCode::from_primitive(reply[2]);
            debug!("Device returned exception {:#04x} ({})", reply[2], code);
            return Err(code);
        }

        let mut body = reply;
        body.truncate(reply_len - 2);
        body.advance(2);
        Ok(body)
    }

    /// Reads until some span of the input is a CRC-valid reply to `function`.
    fn receive(&mut self, unit_id: u8, function: u8, reply_len: usize) -> Result<Bytes, ExceptionCode> {
        let mut rx = BytesMut::with_capacity(reply_len);
        let mut chunk = [0u8; 64];
        let mut received = 0;
        let mut corrupt = false;

        loop {
            while rx.len() >= 2 {
                if rx[1] & !EXCEPTION_FLAG != function {
                    rx.advance(1);
                    continue;
                }
                let frame_len = if rx[1] & EXCEPTION_FLAG != 0 {
                    EXCEPTION_FRAME_LEN
                } else {
                    reply_len
                };
                if rx.len() < frame_len {
                    break;
                }
                let body_len = frame_len - 2;
                let received_crc = u16::from_le_bytes([rx[body_len], rx[body_len + 1]]);
                if received_crc == MODBUS_CRC.checksum(&rx[..body_len]) {
                    if rx.len() > frame_len {
                        debug!("Ignoring {} byte(s) after the reply", rx.len() - frame_len);
                    }
                    return Ok(rx.split_to(frame_len).freeze());
                }
                if rx[0] == unit_id {
                    debug!("CRC mismatch on candidate frame {}", hex::encode(&rx[..frame_len]));
                    corrupt = true;
                }
                rx.advance(1);
            }

            if received >= MAX_SCAN_LEN {
                warn!("No valid reply in {} received byte(s)", received);
                return Err(ExceptionCode::RecvError);
            }
            match self.line.read(&mut chunk) {
                Ok(0) => return Err(no_reply(corrupt, "line closed")),
                Ok(n) => {
                    received += n;
                    rx.extend_from_slice(&chunk[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(no_reply(corrupt, &e.to_string())),
            }
        }
    }
}

fn no_reply(corrupt: bool, reason: &str) -> ExceptionCode {
    if corrupt {
        warn!("Reply failed its CRC check ({})", reason);
        ExceptionCode::CrcError
    } else {
        warn!("No complete reply: {}", reason);
        ExceptionCode::RecvError
    }
}

fn link_error(err: io::Error) -> ExceptionCode {
    warn!("Serial link error: {}", err);
    ExceptionCode::RecvError
}

impl<S: Line> Transport for RtuTransport<S> {
    fn read_registers(&mut self, unit_id: u8, address: u16, buf: &mut [u16]) -> Result<(), ExceptionCode> {
        if buf.is_empty() || buf.len() > MAX_READ_REGISTERS {
            return Err(ExceptionCode::IllegalDataValue);
        }
        let count = buf.len() as u16;

        let mut pdu = BytesMut::with_capacity(5);
        pdu.put_u8(FN_READ_HOLDING_REGISTERS);
        pdu.put_u16(address);
        pdu.put_u16(count);

        let mut body = self.transact(unit_id, &pdu, 5 + 2 * buf.len())?;
        let byte_count = usize::from(body.get_u8());
        if byte_count != 2 * buf.len() {
            warn!("Byte count {} does not match {} requested register(s)", byte_count, count);
            return Err(ExceptionCode::RecvError);
        }
        for word in buf.iter_mut() {
            *word = body.get_u16();
        }
        Ok(())
    }

    fn write_registers(&mut self, unit_id: u8, address: u16, words: &[u16]) -> Result<(), ExceptionCode> {
        if words.is_empty() || words.len() > MAX_WRITE_REGISTERS {
            return Err(ExceptionCode::IllegalDataValue);
        }
        let count = words.len() as u16;

        let mut pdu = BytesMut::with_capacity(6 + 2 * words.len());
        pdu.put_u8(FN_WRITE_MULTIPLE_REGISTERS);
        pdu.put_u16(address);
        pdu.put_u16(count);
        pdu.put_u8((2 * words.len()) as u8);
        for &word in words {
            pdu.put_u16(word);
        }

        let mut body = self.transact(unit_id, &pdu, WRITE_REPLY_LEN)?;
        let echoed_address = body.get_u16();
        let echoed_count = body.get_u16();
        if echoed_address != address || echoed_count != count {
            warn!(
                "Write echo mismatch: sent {:#06x}/{}, got {:#06x}/{}",
                address, count, echoed_address, echoed_count
            );
            return Err(ExceptionCode::RecvError);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// In-memory serial line. Each flushed request releases the next scripted
    /// chunk; a read with nothing pending times out.
    #[derive(Default)]
    struct ScriptedLine {
        replies: VecDeque<Vec<u8>>,
        pending: VecDeque<u8>,
        tx: Vec<u8>,
        discarded: usize,
    }

    impl ScriptedLine {
        fn replying(replies: Vec<Vec<u8>>) -> Self {
            Self {
                replies: replies.into(),
                ..Self::default()
            }
        }

        /// Bytes that show up between transactions
        fn deliver(&mut self, bytes: &[u8]) {
            self.pending.extend(bytes);
        }
    }

    impl Read for ScriptedLine {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pending.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no reply"));
            }
            let n = buf.len().min(self.pending.len());
            for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }
    }

    impl Write for ScriptedLine {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.tx.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            if let Some(reply) = self.replies.pop_front() {
                self.pending.extend(reply);
            }
            Ok(())
        }
    }

    impl Line for ScriptedLine {
        fn discard_input(&mut self) -> io::Result<()> {
            self.discarded += self.pending.len();
            self.pending.clear();
            Ok(())
        }
    }

    fn with_crc(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        frame.extend_from_slice(&MODBUS_CRC.checksum(body).to_le_bytes());
        frame
    }

    /// Reply to a 6-register read at unit 0x0E
    fn identity_reply(baud_code: u8, framing_low: u8) -> Vec<u8> {
        with_crc(&[
            0x0E, 0x03, 0x0C, 0x01, 0xE9, 0x33, 0x43, 0x00, 0x0E, 0x00, baud_code, 0x00, framing_low, 0x10, 0x00,
        ])
    }

    #[test]
    fn test_crc16_calculation() {
        assert_eq!(MODBUS_CRC.checksum(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]), 0x0A84);
        assert_eq!(MODBUS_CRC.checksum(&[]), 0xFFFF);
    }

    #[test]
    fn test_read_holding_registers() {
        let reply = with_crc(&[
            0x0E, 0x03, 0x0C, 0x01, 0xE9, 0x33, 0x43, 0x00, 0x0E, 0x00, 0x09, 0x01, 0x01, 0x10, 0x00,
        ]);
        let mut rtu = RtuTransport::new(ScriptedLine::replying(vec![reply]));
        let mut words = [0u16; 6];
        rtu.read_registers(0x0E, 0x0000, &mut words).unwrap();

        assert_eq!(words, [0x01E9, 0x3343, 0x000E, 0x0009, 0x0101, 0x1000]);
        assert_eq!(rtu.get_ref().tx, with_crc(&[0x0E, 0x03, 0x00, 0x00, 0x00, 0x06]));
    }

    #[test]
    fn test_write_multiple_registers() {
        let reply = with_crc(&[0x0E, 0x10, 0x00, 0x11, 0x00, 0x06]);
        let mut rtu = RtuTransport::new(ScriptedLine::replying(vec![reply]));
        rtu.write_registers(0x0E, 0x0011, &[70, 6600, 100, 10000, 2, 0xFFFF])
            .unwrap();

        let expected = with_crc(&[
            0x0E, 0x10, 0x00, 0x11, 0x00, 0x06, 0x0C, 0x00, 0x46, 0x19, 0xC8, 0x00, 0x64, 0x27, 0x10, 0x00, 0x02,
            0xFF, 0xFF,
        ]);
        assert_eq!(rtu.get_ref().tx, expected);
    }

    #[test]
    fn test_exception_reply() {
        let reply = with_crc(&[0x0E, 0x83, 0x02]);
        let mut rtu = RtuTransport::new(ScriptedLine::replying(vec![reply]));
        let mut words = [0u16; 1];
        assert_eq!(
            rtu.read_registers(0x0E, 0x0040, &mut words),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn test_crc_mismatch() {
        let mut reply = with_crc(&[0x0E, 0x03, 0x02, 0x01, 0xE9]);
        let last = reply.len() - 1;
        reply[last] ^= 0xFF;
        let mut rtu = RtuTransport::new(ScriptedLine::replying(vec![reply]));
        let mut words = [0u16; 1];
        assert_eq!(rtu.read_registers(0x0E, 0x0000, &mut words), Err(ExceptionCode::CrcError));
    }

    #[test]
    fn test_reply_from_other_unit() {
        let reply = with_crc(&[0x0F, 0x03, 0x02, 0x01, 0xE9]);
        let mut rtu = RtuTransport::new(ScriptedLine::replying(vec![reply]));
        let mut words = [0u16; 1];
        assert_eq!(rtu.read_registers(0x0E, 0x0000, &mut words), Err(ExceptionCode::IdError));
    }

    #[test]
    fn test_truncated_reply() {
        let mut rtu = RtuTransport::new(ScriptedLine::replying(vec![vec![0x0E, 0x03, 0x0C, 0x01]]));
        let mut words = [0u16; 6];
        assert_eq!(rtu.read_registers(0x0E, 0x0000, &mut words), Err(ExceptionCode::RecvError));
        assert_eq!(words, [0u16; 6]);
    }

    #[test]
    fn test_late_reply_tail_is_skipped() {
        let first = identity_reply(0x09, 0x01);
        let second = identity_reply(0x08, 0x01);
        let third = identity_reply(0x07, 0x00);

        // the first reply stalls after three bytes; the rest lands in front of the second
        let mut tail_then_second = first[3..].to_vec();
        tail_then_second.extend_from_slice(&second);
        let mut rtu = RtuTransport::new(ScriptedLine::replying(vec![
            first[..3].to_vec(),
            tail_then_second,
            third,
        ]));

        let mut words = [0u16; 6];
        assert_eq!(rtu.read_registers(0x0E, 0x0000, &mut words), Err(ExceptionCode::RecvError));
        rtu.read_registers(0x0E, 0x0000, &mut words).unwrap();
        assert_eq!(words, [0x01E9, 0x3343, 0x000E, 0x0008, 0x0001, 0x1000]);
        rtu.read_registers(0x0E, 0x0000, &mut words).unwrap();
        assert_eq!(words, [0x01E9, 0x3343, 0x000E, 0x0007, 0x0000, 0x1000]);
    }

    #[test]
    fn test_stale_input_discarded_before_request() {
        let first = identity_reply(0x09, 0x01);
        let second = identity_reply(0x08, 0x01);
        let mut rtu = RtuTransport::new(ScriptedLine::replying(vec![first[..3].to_vec(), second]));

        let mut words = [0u16; 6];
        assert_eq!(rtu.read_registers(0x0E, 0x0000, &mut words), Err(ExceptionCode::RecvError));
        rtu.get_mut().deliver(&first[3..]);

        rtu.read_registers(0x0E, 0x0000, &mut words).unwrap();
        assert_eq!(words, [0x01E9, 0x3343, 0x000E, 0x0008, 0x0001, 0x1000]);
        assert_eq!(rtu.get_ref().discarded, first.len() - 3);
    }

    #[test]
    fn test_write_echo_mismatch() {
        let reply = with_crc(&[0x0E, 0x10, 0x00, 0x12, 0x00, 0x01]);
        let mut rtu = RtuTransport::new(ScriptedLine::replying(vec![reply]));
        assert_eq!(
            rtu.write_registers(0x0E, 0x0002, &[0x0010]),
            Err(ExceptionCode::RecvError)
        );
    }

    #[test]
    fn test_rejects_broadcast_and_oversized_requests() {
        let mut rtu = RtuTransport::new(ScriptedLine::default());
        let mut words = [0u16; 1];
        assert_eq!(rtu.read_registers(0, 0x0000, &mut words), Err(ExceptionCode::IdError));

        let mut too_many = [0u16; MAX_READ_REGISTERS + 1];
        assert_eq!(
            rtu.read_registers(0x0E, 0x0000, &mut too_many),
            Err(ExceptionCode::IllegalDataValue)
        );
        assert_eq!(rtu.write_registers(0x0E, 0x0000, &[]), Err(ExceptionCode::IllegalDataValue));
        assert!(rtu.get_ref().tx.is_empty());
    }
}
