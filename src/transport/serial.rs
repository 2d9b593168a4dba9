//! Serial transaction engine
//!
//! UART framing is purely newline-delimited: the request goes out as
//! `<json>\r\n` in time-paced segments (a serial line has no per-transaction
//! length limit, so flow control is timing alone), and the response is
//! accumulated byte-at-a-time until a `\n` arrives. Zero bytes and bytes
//! with the top bit set cannot occur in a JSON reply, so either one aborts
//! the exchange as line noise.

use crate::transport::{
    Clock, SerialPort, Transport, TransportError, ALLOC_CHUNK, TRANSACTION_TIMEOUT_MS,
};

pub(crate) const NEWLINE: &[u8] = b"\r\n";

const SEGMENT_MAX_LEN: usize = 250;
const SEGMENT_DELAY_MS: u64 = 250;
const AVAILABLE_POLL_DELAY_MS: u64 = 10;
const RECEIVE_POLL_DELAY_MS: u64 = 1;

// Resync handshake: poke the device with a bare newline and watch the line
// for this long; a ready device echoes only line-ending characters back.
const RESET_RETRIES: usize = 10;
const RESET_DRAIN_MS: u64 = 500;
const RESET_BACKOFF_MS: u64 = 500;
const RESET_SETTLE_MS: u64 = 250;

pub struct SerialTransport<S, C> {
    port: S,
    clock: C,
    turbo: bool,
}

impl<S: SerialPort, C: Clock> SerialTransport<S, C> {
    pub fn new(port: S, clock: C) -> SerialTransport<S, C> {
        SerialTransport {
            port,
            clock,
            turbo: false,
        }
    }

    /// Skip the pacing delays, for well-characterized hardware.
    pub fn set_turbo(&mut self, turbo: bool) {
        self.turbo = turbo;
    }

    fn receive_response(&mut self) -> Result<String, TransportError> {
        // Wait for the device to start answering before reading anything,
        // so a missing reply surfaces as a timeout rather than a parse error.
        let started = self.clock.now_ms();
        while !self.port.available() {
            if self.clock.now_ms() >= started + TRANSACTION_TIMEOUT_MS {
                log::debug!("reply to request didn't arrive from device in time");
                return Err(TransportError::Timeout);
            }
            if !self.turbo {
                self.clock.delay_ms(AVAILABLE_POLL_DELAY_MS);
            }
        }

        let mut buf: Vec<u8> = Vec::with_capacity(ALLOC_CHUNK + 1);
        let started = self.clock.now_ms();
        loop {
            if !self.port.available() {
                if self.clock.now_ms() >= started + TRANSACTION_TIMEOUT_MS {
                    log::debug!(
                        "received only partial reply after timeout: {}",
                        String::from_utf8_lossy(&buf)
                    );
                    return Err(TransportError::Incomplete);
                }
                if !self.turbo {
                    self.clock.delay_ms(RECEIVE_POLL_DELAY_MS);
                }
                continue;
            }
            let byte = self.port.receive();
            // serial lines are error-prone; only ASCII can be valid here
            if byte == 0 || byte & 0x80 != 0 {
                log::debug!("invalid data received on serial port from device");
                return Err(TransportError::BadData);
            }
            buf.push(byte);
            if byte == b'\n' {
                break;
            }
        }
        String::from_utf8(buf).map_err(|_| TransportError::BadData)
    }
}

impl<S: SerialPort, C: Clock> Transport for SerialTransport<S, C> {
    fn transaction(
        &mut self,
        request: &str,
        response_expected: bool,
    ) -> Result<Option<String>, TransportError> {
        let mut payload = Vec::with_capacity(request.len() + NEWLINE.len());
        payload.extend_from_slice(request.as_bytes());
        payload.extend_from_slice(NEWLINE);

        let mut segments = payload.chunks(SEGMENT_MAX_LEN).peekable();
        while let Some(segment) = segments.next() {
            self.port.transmit(segment, false);
            if segments.peek().is_some() && !self.turbo {
                self.clock.delay_ms(SEGMENT_DELAY_MS);
            }
        }

        if !response_expected {
            return Ok(None);
        }
        self.receive_response().map(Some)
    }

    fn reset(&mut self) -> bool {
        // Arduino-class serial drivers have been observed to need a moment
        // after open before they behave.
        self.clock.delay_ms(RESET_SETTLE_MS);
        if !self.port.reset() {
            return false;
        }

        for _ in 0..RESET_RETRIES {
            // Clean out any in-flight request/response processing
            self.port.transmit(NEWLINE, true);

            let mut something_found = false;
            let mut non_control_found = false;
            let started = self.clock.now_ms();
            while self.clock.now_ms() < started + RESET_DRAIN_MS {
                while self.port.available() {
                    something_found = true;
                    if self.port.receive() >= b' ' {
                        non_control_found = true;
                    }
                }
                self.clock.delay_ms(1);
            }

            // A blank-line echo (line endings only) means the device is in
            // sync; printable data means it was mid-reply, silence means it
            // isn't there at all.
            if something_found && !non_control_found {
                return true;
            }
            log::debug!(
                "{}",
                if something_found {
                    "unrecognized data from device"
                } else {
                    "device not responding"
                }
            );
            self.clock.delay_ms(RESET_BACKOFF_MS);
            self.port.reset();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::*;

    #[derive(Clone)]
    struct FakeClock(Rc<Cell<u64>>);

    impl FakeClock {
        fn new() -> FakeClock {
            FakeClock(Rc::new(Cell::new(0)))
        }
    }

    impl Clock for FakeClock {
        fn now_ms(&self) -> u64 {
            self.0.get()
        }

        fn delay_ms(&self, ms: u64) {
            self.0.set(self.0.get() + ms);
        }
    }

    #[derive(Default)]
    struct ScriptedPort {
        incoming: VecDeque<u8>,
        written: Vec<Vec<u8>>,
        // bytes queued onto the line whenever a flushed write happens,
        // emulating the device's echo during the resync handshake
        echo_on_flush: Vec<u8>,
        resets: usize,
        reset_ok: bool,
    }

    impl ScriptedPort {
        fn answering(response: &[u8]) -> ScriptedPort {
            ScriptedPort {
                incoming: response.iter().copied().collect(),
                reset_ok: true,
                ..ScriptedPort::default()
            }
        }

        fn written(&self) -> Vec<u8> {
            self.written.concat()
        }
    }

    impl SerialPort for Rc<RefCell<ScriptedPort>> {
        fn reset(&mut self) -> bool {
            let mut port = self.borrow_mut();
            port.resets += 1;
            port.reset_ok
        }

        fn transmit(&mut self, data: &[u8], flush: bool) {
            let mut port = self.borrow_mut();
            port.written.push(data.to_vec());
            if flush {
                let echo = port.echo_on_flush.clone();
                port.incoming.extend(echo);
            }
        }

        fn available(&mut self) -> bool {
            !self.borrow().incoming.is_empty()
        }

        fn receive(&mut self) -> u8 {
            self.borrow_mut().incoming.pop_front().unwrap_or(0)
        }
    }

    fn transport(
        port: &Rc<RefCell<ScriptedPort>>,
    ) -> SerialTransport<Rc<RefCell<ScriptedPort>>, FakeClock> {
        SerialTransport::new(port.clone(), FakeClock::new())
    }

    #[test]
    fn test_transmit_appends_crlf() {
        let port = Rc::new(RefCell::new(ScriptedPort::answering(b"{}\n")));
        let mut t = transport(&port);
        let rsp = t.transaction("{\"req\":\"card.version\"}", true).unwrap();
        assert_eq!(rsp.as_deref(), Some("{}\n"));
        assert_eq!(port.borrow().written(), b"{\"req\":\"card.version\"}\r\n");
        assert_eq!(port.borrow().written.len(), 1);
    }

    #[test]
    fn test_transmit_segments_long_requests() {
        let port = Rc::new(RefCell::new(ScriptedPort::answering(b"")));
        let mut t = transport(&port);
        let json: String = std::iter::repeat('z').take(600).collect();
        t.transaction(&json, false).unwrap();
        let written = port.borrow().written.clone();
        assert_eq!(written.len(), 3); // 602 bytes in 250-byte segments
        assert!(written.iter().all(|seg| seg.len() <= 250));
        let mut expected = json.into_bytes();
        expected.extend_from_slice(b"\r\n");
        assert_eq!(port.borrow().written(), expected);
    }

    #[test]
    fn test_command_skips_receive() {
        let port = Rc::new(RefCell::new(ScriptedPort::answering(b"ignored")));
        let mut t = transport(&port);
        let rsp = t.transaction("{\"cmd\":\"card.restart\"}", false).unwrap();
        assert!(rsp.is_none());
        assert_eq!(port.borrow().incoming.len(), 7);
    }

    #[test]
    fn test_receive_stops_at_newline() {
        let port = Rc::new(RefCell::new(ScriptedPort::answering(
            b"{\"connected\":true}\n{\"next\":1}\n",
        )));
        let mut t = transport(&port);
        let rsp = t.transaction("{}", true).unwrap();
        assert_eq!(rsp.as_deref(), Some("{\"connected\":true}\n"));
        // the second line stays queued for the next exchange
        assert_eq!(port.borrow().incoming.len(), 11);
    }

    #[test]
    fn test_receive_rejects_noise_bytes() {
        for noise in [[0x00u8], [0xffu8]] {
            let mut response = b"{\"x\"".to_vec();
            response.extend_from_slice(&noise);
            response.extend_from_slice(b":1}\n");
            let port = Rc::new(RefCell::new(ScriptedPort::answering(&response)));
            let mut t = transport(&port);
            let err = t.transaction("{}", true).unwrap_err();
            assert_eq!(err, TransportError::BadData);
        }
    }

    #[test]
    fn test_receive_times_out_when_silent() {
        let port = Rc::new(RefCell::new(ScriptedPort::answering(b"")));
        let clock = FakeClock::new();
        let mut t = SerialTransport::new(port.clone(), clock.clone());
        let err = t.transaction("{}", true).unwrap_err();
        assert_eq!(err, TransportError::Timeout);
        assert!(clock.now_ms() >= TRANSACTION_TIMEOUT_MS);
        assert!(clock.now_ms() < 2 * TRANSACTION_TIMEOUT_MS);
    }

    #[test]
    fn test_receive_incomplete_reply_times_out() {
        let port = Rc::new(RefCell::new(ScriptedPort::answering(b"{\"par")));
        let mut t = transport(&port);
        let err = t.transaction("{}", true).unwrap_err();
        assert_eq!(err, TransportError::Incomplete);
    }

    #[test]
    fn test_reset_succeeds_on_blank_echo() {
        let port = Rc::new(RefCell::new(ScriptedPort {
            reset_ok: true,
            echo_on_flush: b"\r\n".to_vec(),
            ..ScriptedPort::default()
        }));
        let mut t = transport(&port);
        assert!(t.reset());
        assert_eq!(port.borrow().written(), b"\r\n");
    }

    #[test]
    fn test_reset_rejects_printable_echo() {
        // a device spewing real data is mid-reply, not in sync
        let port = Rc::new(RefCell::new(ScriptedPort {
            reset_ok: true,
            echo_on_flush: b"{\"err\":\"x\"}\r\n".to_vec(),
            ..ScriptedPort::default()
        }));
        let mut t = transport(&port);
        assert!(!t.reset());
        assert_eq!(port.borrow().written.len(), RESET_RETRIES);
        // initial reset plus one per failed retry
        assert_eq!(port.borrow().resets, 1 + RESET_RETRIES);
    }

    #[test]
    fn test_reset_fails_on_silence() {
        let port = Rc::new(RefCell::new(ScriptedPort {
            reset_ok: true,
            ..ScriptedPort::default()
        }));
        let mut t = transport(&port);
        assert!(!t.reset());
    }

    #[test]
    fn test_reset_fails_when_port_wont_open() {
        let port = Rc::new(RefCell::new(ScriptedPort::default()));
        let mut t = transport(&port);
        assert!(!t.reset());
        assert_eq!(port.borrow().resets, 1);
        assert!(port.borrow().written.is_empty());
    }
}
