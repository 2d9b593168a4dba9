//! Minimal JSON document model used for Notecard requests and responses
//!
//! The Notecard protocol exchanges small JSON objects, so this module favors
//! predictable behavior on embedded-style inputs over generality: object
//! members keep insertion order, lookups return the first match, and the
//! read accessors are null-safe — a missing or mistyped field yields an
//! empty/zero/false sentinel instead of a panic, because callers must not
//! crash on optional response fields.

mod parse;
mod print;
mod value;

pub use parse::{parse, ParseError, ParseErrorKind, MAX_DEPTH};
pub use print::{print, print_pretty};
pub use value::Value;
