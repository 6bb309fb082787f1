//! Mikrofon über cpal
//!
//! Öffnet das Standard-Eingabegerät und misst den Eingangspegel für die
//! Anzeige im Call. Die eigentliche Übertragung übernimmt der Transport.

use super::devices::{LocalMedia, MediaDevices, MediaError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, Device, SampleFormat, Stream, StreamConfig, SupportedStreamConfigRange};
use parking_lot::Mutex;
use std::sync::Arc;

/// Bevorzugte Sample Rate (48kHz)
pub const SAMPLE_RATE: u32 = 48000;

// ============================================================================
// DEVICES
// ============================================================================

/// Standard-Audiohost des Systems
#[derive(Debug, Clone, Default)]
pub struct CpalDevices;

impl MediaDevices for CpalDevices {
    fn acquire(&self) -> Result<Box<dyn LocalMedia>, MediaError> {
        let mut microphone = Microphone::new()?;
        microphone.start_capture()?;
        Ok(Box::new(microphone))
    }
}

// ============================================================================
// MICROPHONE
// ============================================================================

pub struct Microphone {
    device: Device,
    stream: Option<Stream>,
    is_muted: Arc<Mutex<bool>>,
    /// Pegel (0.0 - 1.0) für Visualisierung
    input_level: Arc<Mutex<f32>>,
}

// Stream ist nicht Send; er wird nur über &mut self angefasst
unsafe impl Send for Microphone {}

impl Microphone {
    pub fn new() -> Result<Self, MediaError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or_else(|| {
            tracing::warn!("No audio input device found");
            MediaError::NoInputDevice
        })?;

        Ok(Self {
            device,
            stream: None,
            is_muted: Arc::new(Mutex::new(false)),
            input_level: Arc::new(Mutex::new(0.0)),
        })
    }

    /// Startet die Aufnahme
    pub fn start_capture(&mut self) -> Result<(), MediaError> {
        let configs = self
            .device
            .supported_input_configs()
            .map_err(|e| MediaError::UnsupportedConfig(e.to_string()))?;
        let config = select_input_config(configs.collect())?;

        tracing::info!(
            "Starting microphone capture: {} Hz, {} channels",
            config.sample_rate.0,
            config.channels
        );

        let is_muted = Arc::clone(&self.is_muted);
        let input_level = Arc::clone(&self.input_level);

        let stream = self
            .device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if data.is_empty() {
                        return;
                    }
                    if *is_muted.lock() {
                        *input_level.lock() = 0.0;
                        return;
                    }
                    let rms: f32 =
                        (data.iter().map(|s| s * s).sum::<f32>() / data.len() as f32).sqrt();
                    *input_level.lock() = rms.min(1.0);
                },
                |err| {
                    tracing::error!("Microphone capture error: {}", err);
                },
                None,
            )
            .map_err(|e| match e {
                // Unter macOS/Windows meldet cpal verweigerte Berechtigungen so
                BuildStreamError::DeviceNotAvailable => MediaError::PermissionDenied,
                other => MediaError::StreamBuildError(other.to_string()),
            })?;

        stream
            .play()
            .map_err(|e| MediaError::StreamPlayError(e.to_string()))?;

        self.stream = Some(stream);
        Ok(())
    }

    pub fn input_level(&self) -> f32 {
        *self.input_level.lock()
    }
}

impl LocalMedia for Microphone {
    fn release(&mut self) {
        if self.stream.take().is_some() {
            *self.input_level.lock() = 0.0;
            tracing::info!("Microphone stream stopped");
        }
    }

    fn set_muted(&self, muted: bool) {
        *self.is_muted.lock() = muted;
        tracing::debug!("Microphone muted: {}", muted);
    }

    fn is_muted(&self) -> bool {
        *self.is_muted.lock()
    }
}

/// Wählt eine F32-Konfiguration, bevorzugt mit 48kHz
fn select_input_config(configs: Vec<SupportedStreamConfigRange>) -> Result<StreamConfig, MediaError> {
    let target_rate = cpal::SampleRate(SAMPLE_RATE);

    let f32_configs: Vec<_> = configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .collect();

    if let Some(config) = f32_configs
        .iter()
        .find(|c| c.min_sample_rate() <= target_rate && c.max_sample_rate() >= target_rate)
    {
        return Ok(config.with_sample_rate(target_rate).into());
    }

    if let Some(config) = f32_configs.first() {
        return Ok(config.with_max_sample_rate().into());
    }

    Err(MediaError::UnsupportedConfig(
        "No f32 input configuration found".to_string(),
    ))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{SupportedBufferSize, SupportedStreamConfigRange};

    fn range(format: SampleFormat, min: u32, max: u32) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            1,
            cpal::SampleRate(min),
            cpal::SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn test_prefers_48khz_f32() {
        let config = select_input_config(vec![
            range(SampleFormat::I16, 8000, 96000),
            range(SampleFormat::F32, 8000, 96000),
        ])
        .unwrap();
        assert_eq!(config.sample_rate.0, SAMPLE_RATE);
    }

    #[test]
    fn test_falls_back_to_max_rate() {
        let config = select_input_config(vec![range(SampleFormat::F32, 8000, 44100)]).unwrap();
        assert_eq!(config.sample_rate.0, 44100);
    }

    #[test]
    fn test_rejects_without_f32() {
        assert!(matches!(
            select_input_config(vec![range(SampleFormat::I16, 8000, 48000)]),
            Err(MediaError::UnsupportedConfig(_))
        ));
    }
}
