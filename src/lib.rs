//! Tandem - Session-Steuerung für Language-Exchange Videoanrufe
//!
//! Zwei Teilnehmer unterrichten sich gegenseitig ihre Muttersprache:
//! - Nach 15 Minuten wechseln die Rollen genau einmal
//! - Ab 30 Minuten kann der Anruf verlängert werden
//! - Der unterrichtende Teilnehmer kann Gesprächsimpulse anfordern
//! - SQLite für den lokalen Call-Verlauf

pub mod config;
pub mod database;
pub mod media;
pub mod session;
pub mod teaching_aid;
pub mod transport;

use anyhow::Context;
use config::AppConfig;
use database::{CallLogDatabase, CallRecord, SessionNotifier};
use media::{CpalDevices, MediaDevices, MediaError, MediaHandle};
use session::{CallSession, Clock, Participant, ParticipantProfile, SessionParts, SystemClock};
use std::sync::Arc;
use teaching_aid::{ContentGenerator, GeminiGenerator, GeneratorError, TeachingAidFetcher, UnconfiguredGenerator};

// ============================================================================
// LOGGING
// ============================================================================

/// Initialisiert das Logging (mehrfacher Aufruf ist harmlos)
pub fn init_logging() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("tandem_lib=debug".parse()?)
        .add_directive("webrtc=warn".parse()?);

    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("Logging already initialized");
    }
    Ok(())
}

// ============================================================================
// APPLICATION STATE
// ============================================================================

/// Application State: Konfiguration und geteilte Kollaboratoren
pub struct AppState {
    config: AppConfig,
    call_log: Arc<CallLogDatabase>,
    generator: Arc<dyn ContentGenerator>,
    devices: Arc<dyn MediaDevices>,
    clock: Arc<dyn Clock>,
}

impl AppState {
    /// Initialisiert den Application State aus der Umgebung
    pub fn init() -> anyhow::Result<Arc<Self>> {
        init_logging()?;

        tracing::info!("Initializing Tandem...");

        let config = AppConfig::from_env().context("Invalid configuration")?;
        config.session.validate().context("Invalid session timing")?;

        let db_path = config.database_path()?;
        let call_log = CallLogDatabase::open(&db_path)
            .with_context(|| format!("Failed to open call log at {:?}", db_path))?;
        tracing::info!("Database opened");

        let generator: Arc<dyn ContentGenerator> = match GeminiGenerator::new(&config.generator) {
            Ok(generator) => Arc::new(generator),
            Err(GeneratorError::NotConfigured) => {
                tracing::warn!("No Gemini API key, teaching prompts come from the fallback pool");
                Arc::new(UnconfiguredGenerator)
            }
            Err(e) => return Err(e).context("Failed to create content generator"),
        };

        Ok(Arc::new(Self::new(
            config,
            Arc::new(call_log),
            generator,
            Arc::new(CpalDevices),
            Arc::new(SystemClock::new()),
        )))
    }

    pub fn new(
        config: AppConfig,
        call_log: Arc<CallLogDatabase>,
        generator: Arc<dyn ContentGenerator>,
        devices: Arc<dyn MediaDevices>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            call_log,
            generator,
            devices,
            clock,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn call_log(&self) -> &Arc<CallLogDatabase> {
        &self.call_log
    }

    /// Bereitet einen Anruf vor
    ///
    /// Mikrofon und Kamera werden vor jedem Verbindungsversuch angefordert,
    /// damit eine verweigerte Berechtigung sofort sichtbar wird.
    pub fn start_call(
        &self,
        initiator: ParticipantProfile,
        receiver: ParticipantProfile,
        local: Participant,
    ) -> Result<CallSession, MediaError> {
        let media = MediaHandle::acquire(self.devices.as_ref()).map_err(|e| {
            tracing::warn!("Cannot start call: {}", e);
            e
        })?;

        let notifier: Arc<dyn SessionNotifier> = Arc::new(Arc::clone(&self.call_log));
        let parts = SessionParts {
            config: self.config.session.clone(),
            clock: Arc::clone(&self.clock),
            fetcher: TeachingAidFetcher::new(
                Arc::clone(&self.generator),
                self.config.session.prompt_timeout,
            ),
            notifier: Some(notifier),
            media: Some(media),
        };

        Ok(CallSession::new(initiator, receiver, local, parts))
    }

    /// Letzte Anrufe aus dem Verlauf
    pub fn recent_calls(&self, limit: usize) -> anyhow::Result<Vec<CallRecord>> {
        Ok(self.call_log.recent_sessions(limit)?)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("session", &self.config.session)
            .field("call_log", &self.call_log)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
