//! Media Module - lokale Geräte
//!
//! Dieses Modul verwaltet:
//! - Den exklusiven Besitz der Mikrofon/Kamera-Handles pro Session
//! - Mikrofon-Capture über cpal

mod devices;
mod microphone;

pub use devices::{LocalMedia, MediaDevices, MediaError, MediaHandle};
pub use microphone::{CpalDevices, Microphone, SAMPLE_RATE};

#[cfg(test)]
pub(crate) use devices::tests::FakeDevices;
