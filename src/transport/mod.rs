//! Transport abstraction for the Notecard request/response exchange
//!
//! A [`Transport`] performs one framed JSON transaction: chunked transmit of
//! the newline-terminated request, then accumulation of the newline-delimited
//! response. The two wire disciplines live in [`i2c`] and [`serial`]; both
//! sit on top of small device traits ([`I2cBus`], [`SerialPort`]) that the
//! host application implements for its hardware, and a [`Clock`] that
//! supplies the monotonic millisecond timebase and pacing delays so tests
//! can run against simulated time.

use std::time::{Duration, Instant};

use thiserror::Error;

pub mod i2c;
pub mod serial;

pub use i2c::{I2cConfig, I2cTransport};
pub use serial::SerialTransport;

/// Upper bound for one request/response exchange, applied independently to
/// the transmit-wait and receive loops of both transports.
pub const TRANSACTION_TIMEOUT_MS: u64 = 10_000;

/// Initial receive buffer capacity. The buffer grows chunk-by-chunk beyond
/// this; one spare byte is always reserved so finalizing the accumulated
/// text never reallocates.
pub(crate) const ALLOC_CHUNK: usize = 128;

/// Failure reported by an underlying bus or port driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct BusError(pub String);

/// Transport-level failures. All of these are io-class: the session layer
/// latches a reset and retry wrappers are allowed to re-issue the request,
/// which is why every rendering carries the `{io}` tag.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The bus or port driver reported an error during transmit or receive.
    #[error("{0} {{io}}")]
    Bus(#[from] BusError),
    /// No response started arriving within [`TRANSACTION_TIMEOUT_MS`].
    #[error("transaction timeout {{io}}")]
    Timeout,
    /// A response started arriving but never completed in time.
    #[error("transaction incomplete {{io}}")]
    Incomplete,
    /// A byte that cannot appear in a JSON response was received, which
    /// indicates line noise or framing loss rather than device output.
    #[error("serial communications error {{io}}")]
    BadData,
}

/// One active wire to the Notecard.
pub trait Transport {
    /// Performs a single framed exchange. `request` is the serialized JSON
    /// without the trailing newline; the transport appends its own frame
    /// terminator. Returns the raw response text when `response_expected`,
    /// and `None` for fire-and-forget commands.
    fn transaction(
        &mut self,
        request: &str,
        response_expected: bool,
    ) -> Result<Option<String>, TransportError>;

    /// Hard reset and resync handshake. Returns true when the device
    /// answered and any stale partial response has been drained.
    fn reset(&mut self) -> bool;
}

/// Raw I2C access, mirroring the Notecard's length-prefixed slave protocol.
pub trait I2cBus {
    /// Reinitializes the bus. Returns false when the bus cannot be brought
    /// up at all.
    fn reset(&mut self, address: u8) -> bool;

    /// Writes one chunk to the device in a single bus transaction.
    fn transmit(&mut self, address: u8, data: &[u8]) -> Result<(), BusError>;

    /// Reads exactly `buf.len()` bytes (zero-length reads act as an
    /// availability probe) and returns how many bytes the device still has
    /// pending after this read.
    fn receive(&mut self, address: u8, buf: &mut [u8]) -> Result<u32, BusError>;
}

/// Raw UART access. Serial I/O has no bus-level error reporting; bad data
/// is detected by content instead.
pub trait SerialPort {
    /// Reinitializes the port. Returns false when the port cannot be opened.
    fn reset(&mut self) -> bool;

    /// Writes bytes, optionally flushing the line afterwards.
    fn transmit(&mut self, data: &[u8], flush: bool);

    /// True when at least one byte is waiting to be read.
    fn available(&mut self) -> bool;

    /// Reads the next byte. Only called after `available` reports true.
    fn receive(&mut self) -> u8;
}

/// Monotonic millisecond clock plus the pacing delay primitive.
pub trait Clock {
    fn now_ms(&self) -> u64;
    fn delay_ms(&self, ms: u64);
}

/// Wall-clock [`Clock`] for real hardware.
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> SystemClock {
        SystemClock {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> SystemClock {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn delay_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_text_carries_io_tag() {
        assert_eq!(
            TransportError::Timeout.to_string(),
            "transaction timeout {io}"
        );
        assert_eq!(
            TransportError::Incomplete.to_string(),
            "transaction incomplete {io}"
        );
        assert_eq!(
            TransportError::BadData.to_string(),
            "serial communications error {io}"
        );
        let bus: TransportError = BusError("i2c transmit failed".into()).into();
        assert_eq!(bus.to_string(), "i2c transmit failed {io}");
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        clock.delay_ms(2);
        let b = clock.now_ms();
        assert!(b >= a + 2);
    }
}
