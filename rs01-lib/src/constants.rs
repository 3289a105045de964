// Register map and identity constants for the RS01

use std::ops::RangeInclusive;

/// Product ID reported by every RS01 (SKU SEN0489)
pub const PID: u16 = 0x01E9;

/// Vendor ID (DFRobot)
pub const VID: u16 = 0x3343;

/// Product ID register
pub const PID_REG: u16 = 0x0000;

/// Vendor ID register
pub const VID_REG: u16 = 0x0001;

/// Bus address register, factory value 0x000E
pub const ADDR_REG: u16 = 0x0002;

/// Baud-rate code register
pub const BAUDRATE_REG: u16 = 0x0003;

/// Check bit (high byte) and stop bit (low byte) register
pub const CHECKBIT_STOPBIT_REG: u16 = 0x0004;

/// Firmware version register, 0x1000 is V1.0.0.0
pub const VERSION_REG: u16 = 0x0005;

/// Number of targets currently detected
pub const TARGETS_NUMBER_REG: u16 = 0x0006;

/// Distance of the first target; intensity follows, then the next pair
pub const TARGET_SLOTS_REG: u16 = 0x0007;

/// Measurement start position
pub const START_POSITION_REG: u16 = 0x0011;

/// Measurement stop position
pub const STOP_POSITION_REG: u16 = 0x0012;

/// Initial threshold
pub const INITIAL_THRESHOLD_REG: u16 = 0x0013;

/// End threshold
pub const END_THRESHOLD_REG: u16 = 0x0014;

/// Module sensitivity
pub const SENSITIVITY_REG: u16 = 0x0015;

/// Comparison offset, two's-complement i16
pub const COMPARISON_OFFSET_REG: u16 = 0x0016;

/// Writing to this register restores factory settings
pub const FACTORY_RESET_REG: u16 = 0x0017;

/// Value written to the factory-reset register
pub const FACTORY_RESET_VALUE: u16 = 0x0000;

/// Words in the identity/communication block starting at `PID_REG`
pub const BASIC_INFO_WORDS: usize = 6;

/// Target slots reported by the sensor
pub const MAX_TARGETS: usize = 5;

/// Words in the readings block starting at `TARGETS_NUMBER_REG`
pub const MEASUREMENT_DATA_WORDS: usize = 1 + 2 * MAX_TARGETS;

/// Words in the measurement-window block starting at `START_POSITION_REG`
pub const MEASUREMENT_CONFIG_WORDS: usize = 6;

/// Factory bus address
pub const DEFAULT_ADDRESS: u8 = 0x0E;

/// Unicast bus addresses accepted by the sensor
pub const ADDRESS_RANGE: RangeInclusive<u16> = 0x0001..=0x00F7;

/// Start and stop position limits (70..=6600)
pub const POSITION_RANGE: RangeInclusive<u16> = 0x0046..=0x19C8;

/// Initial and end threshold limits (100..=10000)
pub const THRESHOLD_RANGE: RangeInclusive<u16> = 0x0064..=0x2710;

/// Module sensitivity limits
pub const SENSITIVITY_RANGE: RangeInclusive<u16> = 0x0000..=0x0004;

pub const DEFAULT_START_POSITION: u16 = 0x00C8;
pub const DEFAULT_STOP_POSITION: u16 = 0x1770;
pub const DEFAULT_INITIAL_THRESHOLD: u16 = 0x0190;
pub const DEFAULT_END_THRESHOLD: u16 = 0x0190;
pub const DEFAULT_SENSITIVITY: u16 = 0x0002;
pub const DEFAULT_COMPARISON_OFFSET: i16 = 0;
