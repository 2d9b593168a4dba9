//! Request/response orchestration
//!
//! A [`Notecard`] session owns the active transport, the reset-required
//! latch, and the session lock that serializes concurrent callers for the
//! full duration of a logical transaction. Requests are `Value` objects
//! with either a `"req"` field (a response is expected) or a `"cmd"` field
//! (fire-and-forget); transport failures are normalized into a
//! `{"err": "..."}` response document whose text carries the `{io}` tag so
//! retry wrappers can tell bus trouble from a semantic rejection by the
//! device.

use std::sync::{Mutex, MutexGuard};

use crate::json::{self, Value};
use crate::transport::{Clock, Transport};

pub struct Notecard<T, C> {
    pub(crate) state: Mutex<State<T>>,
    pub(crate) helpers: Mutex<crate::helpers::HelperState>,
    pub(crate) clock: C,
}

pub(crate) struct State<T> {
    transport: T,
    reset_required: bool,
}

impl<T: Transport, C: Clock> Notecard<T, C> {
    /// Creates a session. The reset latch starts set, so the first
    /// transaction performs the initial reset/resync handshake.
    pub fn new(transport: T, clock: C) -> Notecard<T, C> {
        Notecard {
            state: Mutex::new(State {
                transport,
                reset_required: true,
            }),
            helpers: Mutex::new(crate::helpers::HelperState::default()),
            clock,
        }
    }

    /// Performs one transaction. Returns `None` only when a required device
    /// reset failed (no exchange was attempted); every other failure comes
    /// back as an `{"err": "..."}` document, which callers must treat as
    /// distinct from `None`.
    pub fn transaction(&self, req: &Value) -> Option<Value> {
        let req_name = req.string("req").to_string();
        let cmd_name = req.string("cmd");
        let no_response_expected = req_name.is_empty() && !cmd_name.is_empty();

        // Session lock covers reset, transmit, receive and parse, so no
        // other caller can interleave mid-transaction.
        let mut state = lock(&self.state);
        if state.reset_required && !reset_state(&mut state) {
            return None;
        }

        // Piggyback host identification only on the initializing hub.set
        // (the one carrying the product UID), not on every mode change.
        let json = if req_name == "hub.set" && req.has("product") && !req.has("body") {
            let mut req = req.clone();
            req.add("body", user_agent());
            json::print(&req)
        } else {
            json::print(req)
        };
        log::debug!("{}", json);

        match state.transport.transaction(&json, !no_response_expected) {
            Err(err) => {
                // Next transaction pays for a fresh reset
                state.reset_required = true;
                Some(err_doc(&err.to_string()))
            }
            Ok(None) => Some(Value::object()),
            Ok(Some(text)) => match json::parse(&text) {
                Ok(rsp) => {
                    log::debug!("{}", text.trim_end());
                    Some(rsp)
                }
                Err(_) => {
                    log::debug!("invalid JSON: {}", text);
                    Some(err_doc("unrecognized response from card {io}"))
                }
            },
        }
    }

    /// Sends a request, discarding the response body. Returns true when the
    /// exchange succeeded and the response carried no error.
    pub fn request(&self, req: Value) -> bool {
        match self.transaction(&req) {
            Some(rsp) => rsp.is_null_string("err"),
            None => false,
        }
    }

    /// Sends a request and returns the parsed response document.
    pub fn request_response(&self, req: Value) -> Option<Value> {
        self.transaction(&req)
    }

    /// Like [`request`](Notecard::request), but re-issues the transaction
    /// while the response is missing or io-tagged, for up to
    /// `timeout_secs`. Semantic errors are never retried.
    pub fn request_with_retry(&self, req: Value, timeout_secs: u64) -> bool {
        match self.transact_with_retry(&req, timeout_secs) {
            Some(rsp) => rsp.is_null_string("err"),
            None => false,
        }
    }

    /// Like [`request_response`](Notecard::request_response) with the retry
    /// policy of [`request_with_retry`](Notecard::request_with_retry).
    pub fn request_response_with_retry(&self, req: Value, timeout_secs: u64) -> Option<Value> {
        self.transact_with_retry(&req, timeout_secs)
    }

    fn transact_with_retry(&self, req: &Value, timeout_secs: u64) -> Option<Value> {
        let expires = self.clock.now_ms() + timeout_secs * 1000;
        loop {
            let rsp = self.transaction(req);
            let retryable = match &rsp {
                None => true,
                Some(rsp) => rsp.contains_string("err", "{io}"),
            };
            // a semantic error would not change on retry; hand it back
            if !retryable || self.clock.now_ms() >= expires {
                return rsp;
            }
        }
    }

    /// JSON-text convenience: parses the request, performs the transaction
    /// and serializes the response.
    pub fn request_response_json(&self, req_json: &str) -> Option<String> {
        let req = json::parse(req_json).ok()?;
        let rsp = self.transaction(&req)?;
        Some(json::print(&rsp))
    }

    /// Resets the device now, clearing the latch on success.
    pub fn reset(&self) -> bool {
        reset_state(&mut lock(&self.state))
    }

    /// Marks that a reset must happen before the next transaction.
    pub fn set_reset_required(&self) {
        lock(&self.state).reset_required = true;
    }
}

fn reset_state<T: Transport>(state: &mut State<T>) -> bool {
    state.reset_required = !state.transport.reset();
    !state.reset_required
}

// Lock that survives a poisoned mutex; a panicked caller must not brick the
// session for everyone else.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn err_doc(message: &str) -> Value {
    log::debug!("{{\"err\":\"{}\"}}", message);
    let mut rsp = Value::object();
    rsp.add("err", message);
    rsp
}

/// Creates a request envelope: a response will be expected.
pub fn new_request(name: &str) -> Value {
    let mut req = Value::object();
    req.add("req", name);
    req
}

/// Creates a command envelope: fire-and-forget, no response expected.
pub fn new_command(name: &str) -> Value {
    let mut cmd = Value::object();
    cmd.add("cmd", name);
    cmd
}

/// True when a well-formed response carries a device error.
pub fn response_error(rsp: &Value) -> bool {
    !rsp.is_null_string("err")
}

/// Substring error classification, e.g. `error_contains(err, "{io}")`.
pub fn error_contains(err: &str, err_type: &str) -> bool {
    err.contains(err_type)
}

/// Strips the bracketed classification tags (and a preceding space) out of
/// an error string, leaving the human-readable text.
pub fn clean_error(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        let close = match rest[open..].find('}') {
            Some(offset) => open + offset,
            None => break,
        };
        let mut keep = &rest[..open];
        if keep.ends_with(' ') {
            keep = &keep[..keep.len() - 1];
        }
        out.push_str(keep);
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Host identification object attached to the initializing `hub.set`.
pub fn user_agent() -> Value {
    let mut ua = Value::object();
    ua.add("agent", "notecard-host");
    ua.add("compiler", "rustc");
    ua.add("os_name", std::env::consts::OS);
    ua.add("os_family", std::env::consts::FAMILY);
    ua.add("cpu_name", std::env::consts::ARCH);
    ua
}
