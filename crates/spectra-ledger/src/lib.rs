//! Duplicate ledger and persistence capability
//!
//! The ledger is the mechanism behind at-most-once registration: an
//! atomic `check_and_reserve` decides, per session scope, whether a
//! fingerprint is new, already registered, or currently being ingested
//! by another worker. Committed entries are written through to a durable
//! [`Sink`].

mod ledger;
mod sink;

pub use ledger::{DuplicateLedger, LedgerError, Outcome, Reservation};
pub use sink::{MemorySink, Sink, SinkError};
