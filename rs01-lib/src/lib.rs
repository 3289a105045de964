pub mod codec;
pub mod constants;
pub mod device;
pub mod error;
pub mod info;
pub mod measurement;
pub mod register;
pub mod rtu;
pub mod transport;


// Re-export the RS01 struct for easy access
pub use device::RS01;
pub use error::{ExceptionCode, RS01Error, ValidationError};
pub use info::BasicInfo;
pub use measurement::{MeasurementConfig, MeasurementData, Target};
pub use register::{BaudRate, CheckBit, StopBit};
pub use rtu::{Line, RtuTransport, SerialSettings};
pub use transport::Transport;
