use crate::error::ExceptionCode;

/// A framed request/response link to holding registers.
///
/// One call is one transaction: it blocks until the device answers or the
/// link gives up, and reports failures as the protocol's exception code.
/// Timeouts and retries, if any, belong to the implementation.
pub trait Transport {
    /// Reads `buf.len()` consecutive registers starting at `address`.
    fn read_registers(&mut self, unit_id: u8, address: u16, buf: &mut [u16]) -> Result<(), ExceptionCode>;

    /// Writes `words` to consecutive registers starting at `address`.
    fn write_registers(&mut self, unit_id: u8, address: u16, words: &[u16]) -> Result<(), ExceptionCode>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read_registers(&mut self, unit_id: u8, address: u16, buf: &mut [u16]) -> Result<(), ExceptionCode> {
        (**self).read_registers(unit_id, address, buf)
    }

    fn write_registers(&mut self, unit_id: u8, address: u16, words: &[u16]) -> Result<(), ExceptionCode> {
        (**self).write_registers(unit_id, address, words)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_registers(&mut self, unit_id: u8, address: u16, buf: &mut [u16]) -> Result<(), ExceptionCode> {
        (**self).read_registers(unit_id, address, buf)
    }

    fn write_registers(&mut self, unit_id: u8, address: u16, words: &[u16]) -> Result<(), ExceptionCode> {
        (**self).write_registers(unit_id, address, words)
    }
}
