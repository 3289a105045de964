//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use rs01_lib::{
    BaudRate, CheckBit, ExceptionCode, MeasurementConfig, RS01, RS01Error, StopBit, Transport, ValidationError,
};

use mockall::mock;
use std::collections::VecDeque;

mock! {
    pub Bus {}

    impl Transport for Bus {
        fn read_registers(&mut self, unit_id: u8, address: u16, buf: &mut [u16]) -> Result<(), ExceptionCode>;
        fn write_registers(&mut self, unit_id: u8, address: u16, words: &[u16]) -> Result<(), ExceptionCode>;
    }
}

/// Bus address every test session uses
#[allow(dead_code)]
pub const ADDRESS: u8 = 0x0E;

/// Identity block returned by a factory-fresh sensor at 1 Mbaud, even parity
#[allow(dead_code)]
pub const BASIC_INFO_WORDS: [u16; 6] = [0x01E9, 0x3343, 0x000E, 0x0009, 0x0101, 0x1000];

/// Expect exactly one read of `words.len()` registers at `address`, answered with `words`.
#[allow(dead_code)]
pub fn expect_read(bus: &mut MockBus, address: u16, words: Vec<u16>) {
    let count = words.len();
    bus.expect_read_registers()
        .withf(move |unit_id, addr, buf| *unit_id == ADDRESS && *addr == address && buf.len() == count)
        .times(1)
        .returning(move |_, _, buf| {
            buf.copy_from_slice(&words);
            Ok(())
        });
}

/// Expect exactly one read of `count` registers at `address`, failing with `code`.
#[allow(dead_code)]
pub fn expect_read_error(bus: &mut MockBus, address: u16, count: usize, code: ExceptionCode) {
    bus.expect_read_registers()
        .withf(move |unit_id, addr, buf| *unit_id == ADDRESS && *addr == address && buf.len() == count)
        .times(1)
        .returning(move |_, _, _| Err(code));
}

/// Expect one read at `address` per entry in `replies`, answered in order.
#[allow(dead_code)]
pub fn expect_reads(bus: &mut MockBus, address: u16, count: usize, replies: Vec<Result<Vec<u16>, ExceptionCode>>) {
    let mut replies: VecDeque<_> = replies.into();
    bus.expect_read_registers()
        .withf(move |unit_id, addr, buf| *unit_id == ADDRESS && *addr == address && buf.len() == count)
        .times(replies.len())
        .returning(move |_, _, buf| {
            let words = replies.pop_front().expect("more reads than scripted replies")?;
            buf.copy_from_slice(&words);
            Ok(())
        });
}

/// Expect exactly one write of `expected` at `address`.
#[allow(dead_code)]
pub fn expect_write(bus: &mut MockBus, address: u16, expected: Vec<u16>, result: Result<(), ExceptionCode>) {
    bus.expect_write_registers()
        .withf(move |unit_id, addr, words| *unit_id == ADDRESS && *addr == address && words[..] == expected[..])
        .times(1)
        .returning(move |_, _, _| result);
}

/// A bus that fails the test on any transaction.
#[allow(dead_code)]
pub fn silent_bus() -> MockBus {
    let mut bus = MockBus::new();
    bus.expect_read_registers().never();
    bus.expect_write_registers().never();
    bus
}
