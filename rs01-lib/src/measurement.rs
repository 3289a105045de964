use crate::constants::{
    DEFAULT_COMPARISON_OFFSET, DEFAULT_END_THRESHOLD, DEFAULT_INITIAL_THRESHOLD, DEFAULT_SENSITIVITY,
    DEFAULT_START_POSITION, DEFAULT_STOP_POSITION, MAX_TARGETS,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One detected object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Target {
    pub distance: u16,
    pub intensity: u16,
}

/// Snapshot of the readings block (registers 0x0006-0x0010).
///
/// The sensor does not clear slots past `target_count`, so they keep whatever
/// was last reported. [`MeasurementData::targets`] only yields the valid ones;
/// `slots` exposes the raw block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MeasurementData {
    pub target_count: u16,
    pub slots: [Target; MAX_TARGETS],
}

impl MeasurementData {
    /// Number of slots holding a current reading
    pub fn valid_count(&self) -> usize {
        usize::from(self.target_count).min(MAX_TARGETS)
    }

    /// Targets reported by the last refresh, nearest slot first
    pub fn targets(&self) -> &[Target] {
        &self.slots[..self.valid_count()]
    }

    /// Target `index` (zero based) if it was reported
    pub fn target(&self, index: usize) -> Option<&Target> {
        self.targets().get(index)
    }
}

impl fmt::Display for MeasurementData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} target(s)", self.valid_count())?;
        for (i, target) in self.targets().iter().enumerate() {
            write!(
                f,
                ", #{}: distance {} intensity {}",
                i + 1,
                target.distance,
                target.intensity
            )?;
        }
        Ok(())
    }
}

/// Measurement-window parameters (registers 0x0011-0x0016).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementConfig {
    pub start_position: u16,
    pub stop_position: u16,
    pub initial_threshold: u16,
    pub end_threshold: u16,
    pub module_sensitivity: u16,
    pub comparison_offset: i16,
}

impl Default for MeasurementConfig {
    /// Factory settings
    fn default() -> Self {
        Self {
            start_position: DEFAULT_START_POSITION,
            stop_position: DEFAULT_STOP_POSITION,
            initial_threshold: DEFAULT_INITIAL_THRESHOLD,
            end_threshold: DEFAULT_END_THRESHOLD,
            module_sensitivity: DEFAULT_SENSITIVITY,
            comparison_offset: DEFAULT_COMPARISON_OFFSET,
        }
    }
}

impl fmt::Display for MeasurementConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Window: {}..={}, Thresholds: {}/{}, Sensitivity: {}, Offset: {}",
            self.start_position,
            self.stop_position,
            self.initial_threshold,
            self.end_threshold,
            self.module_sensitivity,
            self.comparison_offset
        )
    }
}
