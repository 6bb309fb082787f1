//! Lokale Mediengeräte (Mikrofon/Kamera)
//!
//! Die Geräte-Handles gehören exklusiv dem Call-Lifecycle und werden auf
//! jedem Pfad genau einmal freigegeben (`release()` oder `Drop`).

use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Microphone or camera access was denied. Allow access in your system settings and try again.")]
    PermissionDenied,

    #[error("No microphone found. Connect a microphone and try again.")]
    NoInputDevice,

    #[error("Unsupported audio configuration: {0}")]
    UnsupportedConfig(String),

    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),
}

// ============================================================================
// TRAITS
// ============================================================================

/// Eine geöffnete lokale Medienquelle
pub trait LocalMedia: Send {
    /// Gibt das Gerät frei (darf mehrfach aufgerufen werden)
    fn release(&mut self);

    fn set_muted(&self, muted: bool);

    fn is_muted(&self) -> bool;
}

/// Quelle für lokale Medien
pub trait MediaDevices: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn LocalMedia>, MediaError>;
}

// ============================================================================
// MEDIA HANDLE
// ============================================================================

/// Besitzt die lokalen Medien einer Session
pub struct MediaHandle {
    media: Option<Box<dyn LocalMedia>>,
}

impl MediaHandle {
    pub fn new(media: Box<dyn LocalMedia>) -> Self {
        Self { media: Some(media) }
    }

    /// Fordert die Geräte an, bevor ein Verbindungsaufbau beginnt
    pub fn acquire(devices: &dyn MediaDevices) -> Result<Self, MediaError> {
        let media = devices.acquire().map_err(|e| {
            tracing::warn!("Local media unavailable: {}", e);
            e
        })?;
        Ok(Self::new(media))
    }

    /// Gibt die Geräte frei, true nur beim ersten Aufruf
    pub fn release(&mut self) -> bool {
        match self.media.take() {
            Some(mut media) => {
                media.release();
                tracing::info!("Local media released");
                true
            }
            None => false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.media.is_none()
    }

    pub fn set_muted(&self, muted: bool) {
        if let Some(media) = self.media.as_ref() {
            media.set_muted(muted);
        }
    }

    pub fn is_muted(&self) -> bool {
        self.media.as_ref().map(|m| m.is_muted()).unwrap_or(false)
    }
}

impl Drop for MediaHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaHandle")
            .field("released", &self.is_released())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Zählt Freigaben, für Tests in anderen Modulen
    #[derive(Debug, Default)]
    pub(crate) struct FakeDevices {
        pub acquired: AtomicUsize,
        pub released: Arc<AtomicUsize>,
        pub deny: AtomicBool,
    }

    struct FakeMedia {
        released: Arc<AtomicUsize>,
        done: bool,
        muted: AtomicBool,
    }

    impl LocalMedia for FakeMedia {
        fn release(&mut self) {
            if !self.done {
                self.done = true;
                self.released.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn set_muted(&self, muted: bool) {
            self.muted.store(muted, Ordering::SeqCst);
        }

        fn is_muted(&self) -> bool {
            self.muted.load(Ordering::SeqCst)
        }
    }

    impl MediaDevices for FakeDevices {
        fn acquire(&self) -> Result<Box<dyn LocalMedia>, MediaError> {
            if self.deny.load(Ordering::SeqCst) {
                return Err(MediaError::PermissionDenied);
            }
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeMedia {
                released: Arc::clone(&self.released),
                done: false,
                muted: AtomicBool::new(false),
            }))
        }
    }

    impl FakeDevices {
        pub(crate) fn release_count(&self) -> usize {
            self.released.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_release_is_idempotent() {
        let devices = FakeDevices::default();
        let mut handle = MediaHandle::acquire(&devices).unwrap();

        assert!(handle.release());
        assert!(!handle.release());
        assert!(!handle.release());
        drop(handle);

        assert_eq!(devices.release_count(), 1);
    }

    #[test]
    fn test_drop_releases() {
        let devices = FakeDevices::default();
        {
            let _handle = MediaHandle::acquire(&devices).unwrap();
        }
        assert_eq!(devices.release_count(), 1);
    }

    #[test]
    fn test_permission_denied_is_actionable() {
        let devices = FakeDevices::default();
        devices.deny.store(true, Ordering::SeqCst);

        let err = MediaHandle::acquire(&devices).unwrap_err();
        assert_eq!(err, MediaError::PermissionDenied);
        assert!(err.to_string().contains("Allow access"));
        assert_eq!(devices.acquired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_mute_passthrough() {
        let devices = FakeDevices::default();
        let mut handle = MediaHandle::acquire(&devices).unwrap();
        handle.set_muted(true);
        assert!(handle.is_muted());
        handle.release();
        assert!(!handle.is_muted());
    }
}
