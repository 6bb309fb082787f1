//! Database Module - Call-Verlauf
//!
//! SQLite-Speicher für Call-Sessions und der `SessionNotifier`-Trait, über
//! den die Session ihren Status best-effort meldet.

mod call_log;

pub use call_log::{CallLogDatabase, CallRecord, CallStatusUpdate, DatabaseError, SessionNotifier};
