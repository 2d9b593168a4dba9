use std::io::{Read, Write};
use std::time::Duration;

use notecard_host::{new_request, Notecard, SerialTransport, SystemClock};

const PORT_NAME: &'static str = "/dev/ttyUSB0";
const BAUD_RATE: u32 = 9_600;

/// Adapter from a host serial port to the driver's port trait.
struct HostPort {
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl HostPort {
    fn open() -> HostPort {
        HostPort { port: None }
    }
}

impl notecard_host::SerialPort for HostPort {
    fn reset(&mut self) -> bool {
        match serialport::new(PORT_NAME, BAUD_RATE)
            .timeout(Duration::from_millis(10))
            .open()
        {
            Ok(port) => {
                self.port = Some(port);
                true
            }
            Err(e) => {
                eprintln!("Failed to open \"{}\". Error: {}", PORT_NAME, e);
                false
            }
        }
    }

    fn transmit(&mut self, data: &[u8], flush: bool) {
        if let Some(port) = self.port.as_mut() {
            port.write_all(data).ok();
            if flush {
                port.flush().ok();
            }
        }
    }

    fn available(&mut self) -> bool {
        match self.port.as_mut() {
            Some(port) => port.bytes_to_read().unwrap_or(0) > 0,
            None => false,
        }
    }

    fn receive(&mut self) -> u8 {
        let mut byte = [0u8; 1];
        if let Some(port) = self.port.as_mut() {
            port.read_exact(&mut byte).ok();
        }
        byte[0]
    }
}

fn main() {
    let card = Notecard::new(
        SerialTransport::new(HostPort::open(), SystemClock::new()),
        SystemClock::new(),
    );

    match card.request_response(new_request("card.version")) {
        Some(rsp) => {
            if !rsp.string("err").is_empty() {
                eprintln!("card.version: {}", rsp.string("err"));
                ::std::process::exit(1);
            }
            println!("connected to {}", rsp.string("name"));
            println!("firmware {}", rsp.string("version"));
        }
        None => {
            eprintln!("Notecard did not respond on \"{}\"", PORT_NAME);
            ::std::process::exit(1);
        }
    }
}
