//! Host-side driver for the Notecard: a minimal JSON document model, I2C
//! and serial transaction engines, and a request/response session layer
//! with automatic reset recovery.

pub mod json;
pub mod session;
pub mod transport;

mod helpers;

pub use json::Value;
pub use session::{
    clean_error, error_contains, new_command, new_request, response_error, user_agent, Notecard,
};
pub use transport::{
    BusError, Clock, I2cBus, SerialPort, SystemClock, Transport, TransportError,
};
pub use transport::i2c::{I2cConfig, I2cTransport};
pub use transport::serial::SerialTransport;
