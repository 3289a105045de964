//! Register codec for the RS01.
//!
//! The only place that knows register addresses and word layouts. Callers deal
//! in [`BasicInfo`], [`MeasurementData`] and [`MeasurementConfig`]; this module
//! turns them into block reads and writes on a [`Transport`], and validates
//! every value before it is written.

use crate::constants::*;
use crate::error::{ExceptionCode, RS01Error, ValidationError, WindowField};
use crate::info::BasicInfo;
use crate::measurement::{MeasurementConfig, MeasurementData, Target};
use crate::register::{BaudRate, CheckBit, StopBit, decode_offset, encode_checkbit_stopbit, encode_offset};
use crate::transport::Transport;
use std::ops::RangeInclusive;
use tracing::{debug, warn};

pub struct RegisterCodec<T> {
    transport: T,
    unit_id: u8,
}

impl<T: Transport> RegisterCodec<T> {
    pub fn new(transport: T, unit_id: u8) -> Self {
        Self { transport, unit_id }
    }

    /// Bus address every transaction is sent to
    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Reads `count` consecutive registers in one transaction.
    pub fn read_registers(&mut self, address: u16, count: usize) -> Result<Vec<u16>, ExceptionCode> {
        let mut words = vec![0u16; count];
        self.read_into(address, &mut words)?;
        Ok(words)
    }

    /// Writes `words` to consecutive registers in one transaction.
    pub fn write_registers(&mut self, address: u16, words: &[u16]) -> Result<(), ExceptionCode> {
        debug!(
            unit_id = self.unit_id,
            "Writing {} register(s) at {:#06x}",
            words.len(),
            address
        );
        self.transport
            .write_registers(self.unit_id, address, words)
            .inspect_err(|code| warn!("Write at {:#06x} failed: {}", address, code))
    }

    fn read_into(&mut self, address: u16, words: &mut [u16]) -> Result<(), ExceptionCode> {
        debug!(
            unit_id = self.unit_id,
            "Reading {} register(s) at {:#06x}",
            words.len(),
            address
        );
        self.transport
            .read_registers(self.unit_id, address, words)
            .inspect_err(|code| warn!("Read at {:#06x} failed: {}", address, code))
    }

    fn read_block<const N: usize>(&mut self, address: u16) -> Result<[u16; N], ExceptionCode> {
        let mut words = [0u16; N];
        self.read_into(address, &mut words)?;
        Ok(words)
    }

    pub fn read_product_id(&mut self) -> Result<u16, ExceptionCode> {
        let [pid] = self.read_block::<1>(PID_REG)?;
        Ok(pid)
    }

    pub fn read_basic_info(&mut self) -> Result<BasicInfo, ExceptionCode> {
        let words = self.read_block::<BASIC_INFO_WORDS>(PID_REG)?;
        Ok(decode_basic_info(&words))
    }

    pub fn read_measurement_data(&mut self) -> Result<MeasurementData, ExceptionCode> {
        let words = self.read_block::<MEASUREMENT_DATA_WORDS>(TARGETS_NUMBER_REG)?;
        Ok(decode_measurement_data(&words))
    }

    pub fn read_measurement_config(&mut self) -> Result<MeasurementConfig, ExceptionCode> {
        let words = self.read_block::<MEASUREMENT_CONFIG_WORDS>(START_POSITION_REG)?;
        Ok(decode_measurement_config(&words))
    }

    pub fn write_address(&mut self, address: u16) -> Result<(), RS01Error> {
        validate_address(address)?;
        self.write_registers(ADDR_REG, &[address])?;
        Ok(())
    }

    pub fn write_baudrate(&mut self, baudrate: BaudRate) -> Result<(), ExceptionCode> {
        self.write_registers(BAUDRATE_REG, &[baudrate.into()])
    }

    pub fn write_checkbit_stopbit(&mut self, check_bit: CheckBit, stop_bit: StopBit) -> Result<(), ExceptionCode> {
        self.write_registers(CHECKBIT_STOPBIT_REG, &[encode_checkbit_stopbit(check_bit, stop_bit)])
    }

    /// Validates `config` and writes the whole window block in one transaction.
    pub fn write_measurement_config(&mut self, config: &MeasurementConfig) -> Result<(), RS01Error> {
        validate_measurement_config(config)?;
        self.write_registers(START_POSITION_REG, &encode_measurement_config(config))?;
        Ok(())
    }

    pub fn write_factory_reset(&mut self) -> Result<(), ExceptionCode> {
        self.write_registers(FACTORY_RESET_REG, &[FACTORY_RESET_VALUE])
    }
}

/// Maps the six identity/communication words read from `PID_REG` onto [`BasicInfo`].
pub fn decode_basic_info(words: &[u16; BASIC_INFO_WORDS]) -> BasicInfo {
    let [pid, vid, address, baudrate_code, framing, version] = *words;
    BasicInfo {
        pid,
        vid,
        address,
        baudrate_code,
        framing,
        version,
    }
}

/// Decodes the count word and the five (distance, intensity) pairs.
pub fn decode_measurement_data(words: &[u16; MEASUREMENT_DATA_WORDS]) -> MeasurementData {
    let mut slots = [Target::default(); MAX_TARGETS];
    for (slot, pair) in slots.iter_mut().zip(words[1..].chunks_exact(2)) {
        *slot = Target {
            distance: pair[0],
            intensity: pair[1],
        };
    }
    MeasurementData {
        target_count: words[0],
        slots,
    }
}

pub fn decode_measurement_config(words: &[u16; MEASUREMENT_CONFIG_WORDS]) -> MeasurementConfig {
    let [start, stop, initial, end, sensitivity, offset] = *words;
    MeasurementConfig {
        start_position: start,
        stop_position: stop,
        initial_threshold: initial,
        end_threshold: end,
        module_sensitivity: sensitivity,
        comparison_offset: decode_offset(offset),
    }
}

pub fn encode_measurement_config(config: &MeasurementConfig) -> [u16; MEASUREMENT_CONFIG_WORDS] {
    [
        config.start_position,
        config.stop_position,
        config.initial_threshold,
        config.end_threshold,
        config.module_sensitivity,
        encode_offset(config.comparison_offset),
    ]
}

pub fn validate_address(address: u16) -> Result<(), RS01Error> {
    if ADDRESS_RANGE.contains(&address) {
        Ok(())
    } else {
        Err(RS01Error::InvalidAddress(address))
    }
}

fn check_range(field: WindowField, value: u16, range: RangeInclusive<u16>) -> Result<(), ValidationError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

/// Checks every field of a measurement window against the sensor's limits.
///
/// The offset spans the full `i16` range, so it only needs to be the right type.
pub fn validate_measurement_window(
    start_position: u16,
    stop_position: u16,
    initial_threshold: u16,
    end_threshold: u16,
    module_sensitivity: u16,
    _comparison_offset: i16,
) -> Result<(), ValidationError> {
    check_range(WindowField::StartPosition, start_position, POSITION_RANGE)?;
    check_range(WindowField::StopPosition, stop_position, POSITION_RANGE)?;
    if start_position > stop_position {
        return Err(ValidationError::StartAfterStop {
            start: start_position,
            stop: stop_position,
        });
    }
    check_range(WindowField::InitialThreshold, initial_threshold, THRESHOLD_RANGE)?;
    check_range(WindowField::EndThreshold, end_threshold, THRESHOLD_RANGE)?;
    check_range(WindowField::ModuleSensitivity, module_sensitivity, SENSITIVITY_RANGE)?;
    Ok(())
}

pub fn validate_measurement_config(config: &MeasurementConfig) -> Result<(), ValidationError> {
    validate_measurement_window(
        config.start_position,
        config.stop_position,
        config.initial_threshold,
        config.end_threshold,
        config.module_sensitivity,
        config.comparison_offset,
    )
}
