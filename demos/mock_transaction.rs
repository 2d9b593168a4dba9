//! Runs the full request/response stack against a simulated device, so the
//! driver can be exercised without Notecard hardware on the bench.

use std::collections::VecDeque;

use notecard_host::{new_request, BusError, I2cBus, I2cConfig, I2cTransport, Notecard, SystemClock};

/// Simulated device: accumulates the transmitted request line and answers
/// every complete request with a canned reply.
struct SimulatedCard {
    line: Vec<u8>,
    readable: VecDeque<u8>,
}

impl SimulatedCard {
    fn new() -> SimulatedCard {
        SimulatedCard {
            line: Vec::new(),
            readable: VecDeque::new(),
        }
    }

    fn respond_to(&mut self, request: &str) {
        let reply = if request.contains("\"hub.status\"") {
            "{\"connected\":true,\"status\":\"connected (session open)\"}\n"
        } else if request.contains("\"card.version\"") {
            "{\"name\":\"Simulated Notecard\",\"version\":\"0.0.1\"}\n"
        } else {
            "{\"err\":\"unknown request\"}\n"
        };
        self.readable.extend(reply.bytes());
    }
}

impl I2cBus for SimulatedCard {
    fn reset(&mut self, _address: u8) -> bool {
        true
    }

    fn transmit(&mut self, _address: u8, data: &[u8]) -> Result<(), BusError> {
        self.line.extend_from_slice(data);
        if self.line.ends_with(b"\n") {
            let request = String::from_utf8_lossy(&self.line).into_owned();
            if request.trim() != "" {
                self.respond_to(&request);
            }
            self.line.clear();
        }
        Ok(())
    }

    fn receive(&mut self, _address: u8, buf: &mut [u8]) -> Result<u32, BusError> {
        for slot in buf.iter_mut() {
            *slot = self.readable.pop_front().unwrap_or(0);
        }
        Ok(self.readable.len() as u32)
    }
}

fn main() {
    let device = SimulatedCard::new();
    let config = I2cConfig {
        turbo: true,
        ..I2cConfig::default()
    };
    let transport = I2cTransport::with_config(device, SystemClock::new(), config);
    let card = Notecard::new(transport, SystemClock::new());

    let rsp = card.request_response(new_request("card.version")).unwrap();
    println!("device:   {} ({})", rsp.string("name"), rsp.string("version"));

    let rsp = card.request_response(new_request("hub.status")).unwrap();
    println!("status:   {}", rsp.string("status"));

    let rsp = card.request_response(new_request("card.bogus")).unwrap();
    println!("rejected: {}", rsp.string("err"));
}
