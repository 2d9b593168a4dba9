//! I2C transaction engine
//!
//! The Notecard's I2C slave protocol is byte-oriented on top of fixed-size
//! bus transactions: the request is written in chunks no larger than the
//! negotiated per-transaction maximum, and the response is pulled by
//! repeatedly probing how many bytes the device has pending and reading up
//! to one chunk at a time. The receive loop exits only once a newline has
//! been seen AND the device reports nothing further pending, so priming data
//! for the next exchange is fully drained.

use crate::transport::{
    BusError, Clock, I2cBus, Transport, TransportError, ALLOC_CHUNK, TRANSACTION_TIMEOUT_MS,
};

/// Default 7-bit device address.
pub const I2C_ADDR_DEFAULT: u8 = 0x17;
/// Default per-transaction byte limit; devices may negotiate a larger one.
pub const I2C_MAX_DEFAULT: usize = 30;
/// Hard upper bound for the per-transaction byte limit.
pub const I2C_MAX_MAX: usize = 127;

// After this many bytes of a request, pause so the device's fixed-rate
// interrupt buffer can drain.
const SEGMENT_MAX_LEN: usize = 250;
const SEGMENT_DELAY_MS: u64 = 250;
const CHUNK_DELAY_MS: u64 = 20;
// Some devices' I2C implementations are unstable without a short settle
// delay before every transaction; timing established empirically.
const IO_DELAY_MS: u64 = 6;
const RECEIVE_POLL_DELAY_MS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct I2cConfig {
    /// 7-bit device address.
    pub address: u8,
    /// Per-transaction byte limit, clamped to [`I2C_MAX_MAX`].
    pub max_chunk: usize,
    /// Skip the pacing delays, for well-characterized hardware.
    pub turbo: bool,
}

impl Default for I2cConfig {
    fn default() -> I2cConfig {
        I2cConfig {
            address: I2C_ADDR_DEFAULT,
            max_chunk: I2C_MAX_DEFAULT,
            turbo: false,
        }
    }
}

impl I2cConfig {
    fn chunk_limit(&self) -> usize {
        let limit = if self.max_chunk == 0 {
            I2C_MAX_DEFAULT
        } else {
            self.max_chunk
        };
        limit.min(I2C_MAX_MAX)
    }
}

pub struct I2cTransport<B, C> {
    bus: B,
    clock: C,
    config: I2cConfig,
}

impl<B: I2cBus, C: Clock> I2cTransport<B, C> {
    pub fn new(bus: B, clock: C) -> I2cTransport<B, C> {
        I2cTransport::with_config(bus, clock, I2cConfig::default())
    }

    pub fn with_config(bus: B, clock: C, config: I2cConfig) -> I2cTransport<B, C> {
        I2cTransport { bus, clock, config }
    }

    pub fn config(&self) -> &I2cConfig {
        &self.config
    }

    /// Adopt a device-negotiated per-transaction maximum.
    pub fn set_max_chunk(&mut self, max_chunk: usize) {
        self.config.max_chunk = max_chunk;
    }

    fn delay_io(&self) {
        if !self.config.turbo {
            self.clock.delay_ms(IO_DELAY_MS);
        }
    }

    fn transmit_request(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let address = self.config.address;
        let limit = self.config.chunk_limit();
        let mut sent_in_segment = 0;
        for chunk in payload.chunks(limit) {
            self.delay_io();
            if let Err(err) = self.bus.transmit(address, chunk) {
                // Fail fast: reset the bus and report without reading
                self.bus.reset(address);
                log::debug!("i2c transmit: {}", err);
                return Err(err.into());
            }
            sent_in_segment += chunk.len();
            if sent_in_segment > SEGMENT_MAX_LEN {
                sent_in_segment = 0;
                if !self.config.turbo {
                    self.clock.delay_ms(SEGMENT_DELAY_MS);
                }
            }
            if !self.config.turbo {
                self.clock.delay_ms(CHUNK_DELAY_MS);
            }
        }
        Ok(())
    }

    fn receive_response(&mut self) -> Result<String, TransportError> {
        let address = self.config.address;
        let limit = self.config.chunk_limit();
        let mut buf: Vec<u8> = Vec::with_capacity(ALLOC_CHUNK + 1);
        let mut received_newline = false;
        let mut chunk_len = 0usize;
        let started = self.clock.now_ms();
        loop {
            // Read the next chunk directly into the grown tail of the buffer
            let base = buf.len();
            buf.resize(base + chunk_len, 0);
            self.delay_io();
            let available = match self.bus.receive(address, &mut buf[base..]) {
                Ok(available) => available,
                Err(err) => {
                    log::debug!("i2c receive error: {}", err);
                    return Err(err.into());
                }
            };

            if buf.last() == Some(&b'\n') {
                received_newline = true;
            }

            // Next read is the min of what's pending and the chunk limit
            chunk_len = (available as usize).min(limit);
            if chunk_len > 0 {
                continue;
            }
            // Nothing pending: done only if the newline has arrived
            if received_newline {
                break;
            }
            if self.clock.now_ms() >= started + TRANSACTION_TIMEOUT_MS {
                log::debug!("reply to request didn't arrive from device in time");
                return Err(TransportError::Timeout);
            }
            if !self.config.turbo {
                self.clock.delay_ms(RECEIVE_POLL_DELAY_MS);
            }
        }
        String::from_utf8(buf).map_err(|_| TransportError::BadData)
    }
}

impl<B: I2cBus, C: Clock> Transport for I2cTransport<B, C> {
    fn transaction(
        &mut self,
        request: &str,
        response_expected: bool,
    ) -> Result<Option<String>, TransportError> {
        let mut payload = Vec::with_capacity(request.len() + 1);
        payload.extend_from_slice(request.as_bytes());
        payload.push(b'\n');
        self.transmit_request(&payload)?;
        if !response_expected {
            return Ok(None);
        }
        self.receive_response().map(Some)
    }

    fn reset(&mut self) -> bool {
        let address = self.config.address;
        if !self.bus.reset(address) {
            return false;
        }

        // Send a bare newline so a previously-aborted exchange terminates,
        // then drain whatever partial reply the device still holds. Failure
        // to transmit the newline means no device is present at all.
        self.delay_io();
        let transmit_ok = self.bus.transmit(address, b"\n").is_ok();
        if !self.config.turbo {
            self.clock.delay_ms(SEGMENT_DELAY_MS);
        }

        let limit = self.config.chunk_limit();
        let mut device_ready = false;
        let mut scratch = [0u8; 128];
        for _ in 0..3 {
            if !transmit_ok {
                break;
            }
            let mut chunk_len = 0usize;
            loop {
                let len = chunk_len.min(scratch.len()).min(limit);
                self.delay_io();
                let available = match self.bus.receive(address, &mut scratch[..len]) {
                    Ok(available) => available,
                    Err(_) => break,
                };
                if available == 0 {
                    device_ready = true;
                    break;
                }
                chunk_len = available as usize;
            }
            if device_ready {
                break;
            }
        }

        if !device_ready {
            self.bus.reset(address);
            log::debug!("notecard not responding");
        }
        device_ready
    }
}
