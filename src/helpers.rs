//! High-level conveniences layered on the transaction engine: environment
//! variables, device time, connectivity checks and note enqueueing. Status
//! queries are rate-limited through a per-session suppression timer so a
//! tight polling loop does not hammer the device with `hub.status` or
//! `card.time` requests.

use crate::json::Value;
use crate::session::{self, lock, Notecard};
use crate::transport::{Clock, Transport};

const DEFAULT_SUPPRESSION_SECS: u64 = 10;

pub(crate) struct HelperState {
    suppression_secs: u64,
    connected: bool,
    connected_timer: u64,
    // device epoch seconds paired with the local clock reading when learned
    time_base: Option<(u64, u64)>,
    time_timer: u64,
    env_modified_time: f64,
    env_timer: u64,
}

impl Default for HelperState {
    fn default() -> HelperState {
        HelperState {
            suppression_secs: DEFAULT_SUPPRESSION_SECS,
            connected: false,
            connected_timer: 0,
            time_base: None,
            time_timer: 0,
            env_modified_time: 0.0,
            env_timer: 0,
        }
    }
}

// One-shot timer: fires when never armed or when the interval has elapsed,
// re-arming itself on fire.
fn timer_expired(now_ms: u64, timer: &mut u64, secs: u64) -> bool {
    if *timer == 0 || now_ms >= *timer {
        *timer = now_ms + secs * 1000;
        true
    } else {
        false
    }
}

impl<T: Transport, C: Clock> Notecard<T, C> {
    /// Sets the minimum interval between repeated status queries issued by
    /// the cached helpers ([`is_connected`](Notecard::is_connected),
    /// [`time`](Notecard::time), [`env_modified`](Notecard::env_modified)).
    pub fn set_suppression_secs(&self, secs: u64) {
        lock(&self.helpers).suppression_secs = secs;
    }

    /// Registers the product UID with the device via `hub.set`.
    pub fn set_product_id(&self, product_uid: &str) -> bool {
        let mut req = session::new_request("hub.set");
        req.add("product", product_uid);
        self.request(req)
    }

    /// True when the device reports an active connection to the service.
    /// The answer is cached between suppression intervals.
    pub fn is_connected(&self) -> bool {
        let suppress = {
            let mut helpers = lock(&self.helpers);
            let secs = helpers.suppression_secs;
            !timer_expired(self.clock.now_ms(), &mut helpers.connected_timer, secs)
        };
        if suppress {
            return lock(&self.helpers).connected;
        }
        let connected = match self.request_response(session::new_request("hub.status")) {
            Some(rsp) if rsp.is_null_string("err") => rsp.boolean("connected"),
            _ => false,
        };
        lock(&self.helpers).connected = connected;
        connected
    }

    /// Current time as Unix epoch seconds, once the device has synchronized
    /// its clock. Between suppression intervals the cached device time is
    /// advanced by the local clock instead of being re-queried.
    pub fn time(&self) -> Option<u64> {
        let now = self.clock.now_ms();
        let suppress = {
            let mut helpers = lock(&self.helpers);
            let secs = helpers.suppression_secs;
            !timer_expired(now, &mut helpers.time_timer, secs)
        };
        if suppress {
            let helpers = lock(&self.helpers);
            return helpers
                .time_base
                .map(|(base, learned_at)| base + (now - learned_at) / 1000);
        }
        let rsp = self.request_response(session::new_request("card.time"))?;
        if !rsp.is_null_string("err") || !rsp.has("time") {
            return None;
        }
        let time = rsp.int("time");
        if time <= 0 {
            return None;
        }
        lock(&self.helpers).time_base = Some((time as u64, now));
        Some(time as u64)
    }

    /// Fetches an environment variable, falling back to `default` when it
    /// is unset or the device is unreachable.
    pub fn get_env(&self, name: &str, default: &str) -> String {
        let mut req = session::new_request("env.get");
        req.add("name", name);
        match self.request_response(req) {
            Some(rsp) if rsp.is_null_string("err") && rsp.has("text") => {
                rsp.string("text").to_string()
            }
            _ => default.to_string(),
        }
    }

    pub fn get_env_int(&self, name: &str, default: i64) -> i64 {
        let text = self.get_env(name, "");
        text.trim().parse().unwrap_or(default)
    }

    pub fn get_env_number(&self, name: &str, default: f64) -> f64 {
        let text = self.get_env(name, "");
        text.trim().parse().unwrap_or(default)
    }

    /// True when any environment variable changed since the last call.
    /// Queries at most once per suppression interval.
    pub fn env_modified(&self) -> bool {
        let suppress = {
            let mut helpers = lock(&self.helpers);
            let secs = helpers.suppression_secs;
            !timer_expired(self.clock.now_ms(), &mut helpers.env_timer, secs)
        };
        if suppress {
            return false;
        }
        let modified = match self.request_response(session::new_request("env.modified")) {
            Some(rsp) if rsp.is_null_string("err") => rsp.number("time"),
            _ => return false,
        };
        let mut helpers = lock(&self.helpers);
        if modified != helpers.env_modified_time {
            helpers.env_modified_time = modified;
            true
        } else {
            false
        }
    }

    /// Enqueues a note. `urgent` requests an immediate sync to the service.
    pub fn add_note(&self, file: &str, body: Value, urgent: bool) -> bool {
        let mut req = session::new_request("note.add");
        if !file.is_empty() {
            req.add("file", file);
        }
        req.add("body", body);
        if urgent {
            req.add("start", true);
        }
        self.request(req)
    }
}
