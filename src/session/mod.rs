//! Session Module - Timer, Rollen und Call-Lifecycle
//!
//! Dieses Modul verwaltet:
//! - Den Call-Timer mit injizierbarer Uhr
//! - Den einmaligen Rollenwechsel nach 15 Minuten
//! - Das Verlängerungs-Gate ab 30 Minuten
//! - Den Lifecycle einer Call-Session

mod controller;
mod extension;
mod roles;
mod timer;

pub use controller::{
    CallSession, CallStatus, EndReason, ParticipantProfile, SessionError, SessionEvent,
    SessionParts, SessionSnapshot,
};
pub use extension::{
    ExtensionGate, ExtensionOutcome, DEFAULT_EXTENSION_GATE_SECS, DEFAULT_EXTENSION_SECS,
};
pub use roles::{Participant, Role, RoleSplit, RoleSwitch, DEFAULT_SWITCH_AT_SECS};
pub use timer::{format_elapsed, CallTimer, Clock, ManualClock, SystemClock};
