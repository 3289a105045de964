use crate::codec::RegisterCodec;
use crate::constants::{ADDRESS_RANGE, PID};
use crate::error::RS01Error;
use crate::info::BasicInfo;
use crate::measurement::{MeasurementConfig, MeasurementData};
use crate::register::{BaudRate, CheckBit, StopBit};
use crate::transport::Transport;
use tracing::{debug, info, warn};

/// Session with one RS01 on the bus.
///
/// Holds the last successfully read copy of each register block. Refreshes
/// replace a block in one step; a failed transaction leaves the previous copy
/// in place.
///
/// [`RS01::begin`] is the expected first call, but nothing enforces it: refresh
/// and set operations issued before it simply talk to whatever answers on the
/// configured address.
///
/// Every operation is one blocking transaction. Wrap the session in a `Mutex`
/// to share it between threads.
pub struct RS01<T> {
    codec: RegisterCodec<T>,
    basic_info: Option<BasicInfo>,
    measurement_data: MeasurementData,
    measurement_config: MeasurementConfig,
}

impl<T: Transport> RS01<T> {
    /// Create a session for the sensor answering on `address`. No I/O happens here.
    pub fn new(transport: T, address: u8) -> Self {
        Self {
            codec: RegisterCodec::new(transport, address),
            basic_info: None,
            measurement_data: MeasurementData::default(),
            measurement_config: MeasurementConfig::default(),
        }
    }

    /// Check that an RS01 answers on the configured address.
    ///
    /// Returns [`RS01Error::DataBus`] if the product ID could not be read and
    /// [`RS01Error::IcVersion`] if some other device answered. The cached
    /// blocks are not touched either way.
    pub fn begin(&mut self) -> Result<(), RS01Error> {
        let address = self.codec.unit_id();
        if !ADDRESS_RANGE.contains(&u16::from(address)) {
            warn!("Invalid device address {}", address);
        }

        info!("Probing RS01 at address {:#04x}...", address);
        let pid = self.codec.read_product_id()?;
        debug!("Sensor PID: {:#06x}", pid);
        if pid != PID {
            warn!("Unexpected PID {:#06x} at address {:#04x}", pid, address);
            return Err(RS01Error::IcVersion {
                expected: PID,
                actual: pid,
            });
        }
        info!("RS01 found at address {:#04x}", address);
        Ok(())
    }

    /// Bus address this session talks to
    pub fn address(&self) -> u8 {
        self.codec.unit_id()
    }

    /// Identity and communication settings, `None` until the first successful refresh
    pub fn basic_info(&self) -> Option<&BasicInfo> {
        self.basic_info.as_ref()
    }

    pub fn measurement_data(&self) -> &MeasurementData {
        &self.measurement_data
    }

    pub fn measurement_config(&self) -> &MeasurementConfig {
        &self.measurement_config
    }

    /// Give back the transport, e.g. to reopen a session on a new address.
    pub fn into_transport(self) -> T {
        self.codec.into_inner()
    }

    /// Read the identity block. Any successful read replaces the cached copy,
    /// including one whose baud or framing word is not a known code.
    pub fn refresh_basic_info(&mut self) -> Result<&BasicInfo, RS01Error> {
        let info = self.codec.read_basic_info()?;
        if let Err(e) = info.baudrate() {
            warn!("Sensor reports {}", e);
        }
        if let Err(e) = info.checkbit_stopbit() {
            warn!("Sensor reports {}", e);
        }
        if info.address != u16::from(self.codec.unit_id()) {
            warn!(
                "Sensor reports address {:#04x} but was reached at {:#04x}",
                info.address,
                self.codec.unit_id()
            );
        }
        Ok(&*self.basic_info.insert(info))
    }

    pub fn refresh_measurement_data(&mut self) -> Result<&MeasurementData, RS01Error> {
        self.measurement_data = self.codec.read_measurement_data()?;
        Ok(&self.measurement_data)
    }

    pub fn refresh_measurement_config(&mut self) -> Result<&MeasurementConfig, RS01Error> {
        self.measurement_config = self.codec.read_measurement_config()?;
        Ok(&self.measurement_config)
    }

    /// Change the sensor's bus address (1..=247).
    ///
    /// The session keeps using the address it was created with; open a new
    /// one with [`RS01::into_transport`] to follow the device.
    pub fn set_address(&mut self, address: u16) -> Result<(), RS01Error> {
        self.codec
            .write_address(address)
            .inspect_err(|e| warn!("Address not changed: {}", e))?;
        info!("Device address set to {:#04x}", address);
        Ok(())
    }

    /// Set the baud rate. Takes effect after the sensor is power cycled, so
    /// the cached info is left as it is.
    pub fn set_baudrate_mode(&mut self, baudrate: BaudRate) -> Result<(), RS01Error> {
        self.codec.write_baudrate(baudrate)?;
        info!("Baud rate set to {} (applies after power cycle)", baudrate);
        Ok(())
    }

    pub fn set_checkbit_stopbit(&mut self, check_bit: CheckBit, stop_bit: StopBit) -> Result<(), RS01Error> {
        self.codec.write_checkbit_stopbit(check_bit, stop_bit)?;
        info!("Framing set to parity {}, {} stop bit(s)", check_bit, stop_bit);
        Ok(())
    }

    /// Validate and write the whole measurement window in one transaction.
    ///
    /// Nothing is sent if any value is out of range or `start_position` is past
    /// `stop_position`. The cached config is left alone; refresh to read it back.
    pub fn set_all_measurement_parameters(
        &mut self,
        start_position: u16,
        stop_position: u16,
        initial_threshold: u16,
        end_threshold: u16,
        module_sensitivity: u16,
        comparison_offset: i16,
    ) -> Result<(), RS01Error> {
        self.set_measurement_config(MeasurementConfig {
            start_position,
            stop_position,
            initial_threshold,
            end_threshold,
            module_sensitivity,
            comparison_offset,
        })
    }

    pub fn set_measurement_config(&mut self, config: MeasurementConfig) -> Result<(), RS01Error> {
        self.codec
            .write_measurement_config(&config)
            .inspect_err(|e| warn!("Measurement parameters not written: {}", e))?;
        info!("Measurement parameters set: {}", config);
        Ok(())
    }

    /// Restore factory settings. Every cached block is stale afterwards.
    pub fn restore_factory_setting(&mut self) -> Result<(), RS01Error> {
        self.codec.write_factory_reset()?;
        info!("Factory settings restored");
        Ok(())
    }
}
