//! Call Session Controller
//!
//! Verbindet Timer, Rollenwechsel, Verlängerungs-Gate und Teaching-Aid
//! Fetcher zu einem Call-Lifecycle `Connecting → Connected → Ended`.
//! Jeder Client führt seine eigene Instanz; es gibt keine zentrale Uhr.

use super::extension::{ExtensionGate, ExtensionOutcome};
use super::roles::{Participant, Role, RoleSplit, RoleSwitch};
use super::timer::{CallTimer, Clock, SystemClock};
use crate::config::SessionConfig;
use crate::database::{CallStatusUpdate, SessionNotifier};
use crate::media::MediaHandle;
use crate::teaching_aid::{
    pick_fallback, Difficulty, FetchedPrompt, Prompt, PromptRequest, PromptSource,
    TeachingAidFetcher, UnconfiguredGenerator, UsedPrompts,
};
use crate::transport::TransportEvent;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Call is not connected")]
    NotConnected,

    #[error("Call has ended")]
    SessionEnded,

    #[error("{0:?} is not in the teaching role")]
    NotTeaching(Participant),

    #[error("Extension not available yet ({opens_in_secs}s remaining)")]
    ExtensionUnavailable { opens_in_secs: u64 },

    #[error("Prompt is no longer relevant")]
    PromptAbandoned,
}

// ============================================================================
// CALL STATE
// ============================================================================

/// Status einer Call-Session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Verbindung wird (wieder) hergestellt
    Connecting,
    /// Medien fließen, der Timer läuft
    Connected,
    /// Anruf beendet
    Ended,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Ended => "ended",
        }
    }
}

/// Grund für das Ende eines Anrufs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum EndReason {
    /// Ein Teilnehmer hat aufgelegt
    Hangup(Participant),
    /// Transport endgültig fehlgeschlagen
    TransportFailure(String),
    /// Transport wurde geschlossen
    Disconnected,
}

/// Profil eines Teilnehmers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantProfile {
    pub user_id: String,
    pub display_name: String,
    /// Interessen für passende Gesprächsimpulse
    pub interests: Vec<String>,
    /// Sprache, die dieser Teilnehmer unterrichtet
    pub teaches_language: Option<String>,
}

impl ParticipantProfile {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            ..Default::default()
        }
    }
}

/// Events die von der CallSession ausgelöst werden
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    StatusChanged(CallStatus),
    Tick { elapsed: u64 },
    /// Beide Teilnehmer erhalten ihre neue Rolle
    RolesSwitched {
        split: RoleSplit,
        initiator: Role,
        receiver: Role,
    },
    ExtensionAvailable { budget_secs: u64 },
    Extended { budget_secs: u64 },
    PromptReady(FetchedPrompt),
    PromptCleared,
    /// Dezenter Hinweis, unterbricht den Anruf nicht
    Notice(String),
    Error(String),
}

/// Serialisierbare Momentaufnahme für die Oberfläche
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub status: CallStatus,
    pub local: Participant,
    pub local_role: Role,
    pub split: RoleSplit,
    pub elapsed_seconds: u64,
    pub switch_fired: bool,
    pub seconds_until_switch: Option<u64>,
    pub can_extend: bool,
    pub budget_secs: u64,
    pub used_prompts: Vec<String>,
    pub current_prompt: Option<Prompt>,
    pub started_at: Option<DateTime<Utc>>,
    pub timer_degraded: bool,
}

// ============================================================================
// SESSION PARTS
// ============================================================================

/// Abhängigkeiten einer CallSession
pub struct SessionParts {
    pub config: SessionConfig,
    pub clock: Arc<dyn Clock>,
    pub fetcher: TeachingAidFetcher,
    pub notifier: Option<Arc<dyn SessionNotifier>>,
    /// Vorab angeforderte lokale Medien
    pub media: Option<MediaHandle>,
}

impl Default for SessionParts {
    fn default() -> Self {
        let config = SessionConfig::default();
        let fetcher = TeachingAidFetcher::new(Arc::new(UnconfiguredGenerator), config.prompt_timeout);
        Self {
            config,
            clock: Arc::new(SystemClock::new()),
            fetcher,
            notifier: None,
            media: None,
        }
    }
}

struct SessionState {
    status: CallStatus,
    started_at: Option<DateTime<Utc>>,
    timer: CallTimer,
    roles: RoleSwitch,
    gate: ExtensionGate,
    used_prompts: UsedPrompts,
    current_prompt: Option<Prompt>,
    /// Wird bei Rollenwechsel und Ende erhöht; ältere Fetch-Ergebnisse verfallen
    prompt_epoch: u64,
    media: Option<MediaHandle>,
    ticker: Option<JoinHandle<()>>,
    degraded_noticed: bool,
    end_reason: Option<EndReason>,
}

struct Inner {
    id: Uuid,
    initiator: ParticipantProfile,
    receiver: ParticipantProfile,
    local: Participant,
    config: SessionConfig,
    fetcher: TeachingAidFetcher,
    notifier: Option<Arc<dyn SessionNotifier>>,
    state: Mutex<SessionState>,
    event_tx: broadcast::Sender<SessionEvent>,
}

// ============================================================================
// CALL SESSION
// ============================================================================

/// Eine laufende Language-Exchange Call-Session
#[derive(Clone)]
pub struct CallSession {
    inner: Arc<Inner>,
}

impl CallSession {
    /// Erstellt eine neue Session im Status `Connecting`
    pub fn new(
        initiator: ParticipantProfile,
        receiver: ParticipantProfile,
        local: Participant,
        parts: SessionParts,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let config = parts.config;

        let state = SessionState {
            status: CallStatus::Connecting,
            started_at: None,
            timer: CallTimer::new(parts.clock),
            roles: RoleSwitch::new(config.switch_at_secs),
            gate: ExtensionGate::new(
                config.extension_gate_secs,
                config.extension_secs,
                config.max_extensions,
            ),
            used_prompts: UsedPrompts::new(),
            current_prompt: None,
            prompt_epoch: 0,
            media: parts.media,
            ticker: None,
            degraded_noticed: false,
            end_reason: None,
        };

        let session = Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                initiator,
                receiver,
                local,
                config,
                fetcher: parts.fetcher,
                notifier: parts.notifier,
                state: Mutex::new(state),
                event_tx,
            }),
        };

        tracing::info!(
            "Call session {} created ({} -> {})",
            session.id(),
            session.inner.initiator.user_id,
            session.inner.receiver.user_id
        );
        session.notify_status();
        session
    }

    /// Gibt einen Event-Receiver zurück
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn local(&self) -> Participant {
        self.inner.local
    }

    pub fn profile(&self, participant: Participant) -> &ParticipantProfile {
        match participant {
            Participant::Initiator => &self.inner.initiator,
            Participant::Receiver => &self.inner.receiver,
        }
    }

    pub fn status(&self) -> CallStatus {
        self.inner.state.lock().status
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.inner.state.lock().timer.elapsed()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.state.lock().started_at
    }

    pub fn role_of(&self, participant: Participant) -> Role {
        self.inner.state.lock().roles.role_of(participant)
    }

    pub fn local_role(&self) -> Role {
        self.role_of(self.inner.local)
    }

    pub fn role_split(&self) -> RoleSplit {
        self.inner.state.lock().roles.split()
    }

    pub fn switch_fired(&self) -> bool {
        self.inner.state.lock().roles.has_fired()
    }

    /// Offen ab dem Gate-Zeitpunkt, bis der Anruf endet
    pub fn can_extend(&self) -> bool {
        let state = self.inner.state.lock();
        state.status != CallStatus::Ended && state.gate.is_open()
    }

    pub fn budget_secs(&self) -> u64 {
        self.inner.state.lock().gate.budget_secs()
    }

    pub fn used_prompts(&self) -> Vec<String> {
        self.inner.state.lock().used_prompts.to_vec()
    }

    pub fn current_prompt(&self) -> Option<Prompt> {
        self.inner.state.lock().current_prompt.clone()
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.inner.state.lock().end_reason.clone()
    }

    pub fn set_muted(&self, muted: bool) {
        if let Some(media) = self.inner.state.lock().media.as_ref() {
            media.set_muted(muted);
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state.lock();
        let elapsed = state.timer.elapsed();
        SessionSnapshot {
            id: self.inner.id,
            status: state.status,
            local: self.inner.local,
            local_role: state.roles.role_of(self.inner.local),
            split: state.roles.split(),
            elapsed_seconds: elapsed,
            switch_fired: state.roles.has_fired(),
            seconds_until_switch: state.roles.seconds_until_switch(elapsed),
            can_extend: state.status != CallStatus::Ended && state.gate.is_open(),
            budget_secs: state.gate.budget_secs(),
            used_prompts: state.used_prompts.to_vec(),
            current_prompt: state.current_prompt.clone(),
            started_at: state.started_at,
            timer_degraded: state.timer.is_degraded(),
        }
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Der Transport meldet eine erfolgreiche Verbindung
    pub fn connected(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.status != CallStatus::Connecting {
                return;
            }
            state.status = CallStatus::Connected;
            if state.started_at.is_none() {
                state.started_at = Some(Utc::now());
            }
            state.timer.start();
            tracing::info!(
                "Call session {} connected at {}s",
                self.inner.id,
                state.timer.elapsed()
            );
        }

        self.emit(SessionEvent::StatusChanged(CallStatus::Connected));
        self.start_ticker();
        self.notify_status();
    }

    /// Vorübergehender Verbindungsverlust; der Timer pausiert
    pub fn interrupted(&self) {
        let mut events = Vec::new();
        let ticker = {
            let mut state = self.inner.state.lock();
            if state.status != CallStatus::Connected {
                return;
            }
            let seconds = state.timer.stop();
            self.observe_seconds(&mut state, seconds, &mut events);
            state.status = CallStatus::Connecting;
            tracing::warn!(
                "Call session {} interrupted at {}s",
                self.inner.id,
                state.timer.elapsed()
            );
            state.ticker.take()
        };

        if let Some(ticker) = ticker {
            ticker.abort();
        }
        for event in events {
            self.emit(event);
        }
        self.emit(SessionEvent::StatusChanged(CallStatus::Connecting));
        self.notify_status();
    }

    /// Beendet den Anruf
    ///
    /// Mehrfache Aufrufe (z.B. Klick und Transportfehler gleichzeitig) sind harmlos.
    pub fn end(&self, reason: EndReason) {
        let (ticker, media) = {
            let mut state = self.inner.state.lock();
            if state.status == CallStatus::Ended {
                tracing::debug!("Call session {} already ended", self.inner.id);
                return;
            }

            // Letzte Sekunden zählen noch für Wechsel und Gate (Verlauf)
            let seconds = state.timer.stop();
            self.observe_seconds(&mut state, seconds, &mut Vec::new());

            state.status = CallStatus::Ended;
            state.end_reason = Some(reason.clone());
            state.prompt_epoch += 1;
            state.current_prompt = None;
            state.used_prompts.clear();

            tracing::info!(
                "Call session {} ended after {}s: {:?}",
                self.inner.id,
                state.timer.elapsed(),
                reason
            );
            (state.ticker.take(), state.media.take())
        };

        if let Some(ticker) = ticker {
            ticker.abort();
        }
        if let Some(mut media) = media {
            media.release();
        }

        if let EndReason::TransportFailure(message) = &reason {
            self.emit(SessionEvent::Error(format!("Connection lost: {}", message)));
        }
        self.emit(SessionEvent::StatusChanged(CallStatus::Ended));
        self.notify_status();
    }

    /// Verarbeitet ein Transport-Event, false wenn danach nichts mehr zu tun ist
    pub fn handle_transport_event(&self, event: TransportEvent) -> bool {
        if self.status() == CallStatus::Ended {
            return false;
        }

        match event {
            TransportEvent::Connected => self.connected(),
            TransportEvent::Interrupted => self.interrupted(),
            TransportEvent::Failed(message) => {
                self.end(EndReason::TransportFailure(message));
                return false;
            }
            TransportEvent::Closed => {
                self.end(EndReason::Disconnected);
                return false;
            }
            TransportEvent::IceCandidate(_) => {}
        }
        true
    }

    /// Leitet Transport-Events im Hintergrund an die Session weiter
    pub fn attach_transport(&self, mut events: broadcast::Receiver<TransportEvent>) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Skipped {} transport events", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let Some(session) = Self::upgrade(&weak) else {
                    break;
                };
                if !session.handle_transport_event(event) {
                    break;
                }
            }
        })
    }

    // ========================================================================
    // TIMER
    // ========================================================================

    /// Verarbeitet alle seit dem letzten Tick verstrichenen Sekunden
    ///
    /// Gibt false zurück, wenn der Anruf nicht (mehr) verbunden ist.
    pub fn tick(&self) -> bool {
        let mut events = Vec::new();
        {
            let mut state = self.inner.state.lock();
            if state.status != CallStatus::Connected {
                return false;
            }

            let seconds = state.timer.poll();
            self.observe_seconds(&mut state, seconds, &mut events);

            if state.timer.is_degraded() && !state.degraded_noticed {
                state.degraded_noticed = true;
                events.push(SessionEvent::Notice(
                    "Call timer unavailable; roles will not switch automatically".to_string(),
                ));
            }
        }

        for event in events {
            self.emit(event);
        }
        true
    }

    /// Führt neu verstrichene Sekunden durch Rollenwechsel und Gate
    fn observe_seconds(
        &self,
        state: &mut SessionState,
        seconds: RangeInclusive<u64>,
        events: &mut Vec<SessionEvent>,
    ) {
        if seconds.is_empty() {
            return;
        }

        for second in seconds {
            if let Some(split) = state.roles.observe(second) {
                tracing::info!(
                    "Call session {} switched roles at {}s: {:?}",
                    self.inner.id,
                    second,
                    split
                );
                state.current_prompt = None;
                state.prompt_epoch += 1;
                events.push(SessionEvent::RolesSwitched {
                    split,
                    initiator: split.role_of(Participant::Initiator),
                    receiver: split.role_of(Participant::Receiver),
                });
                events.push(SessionEvent::PromptCleared);
            }

            if state.gate.observe(second) {
                tracing::info!("Call session {} can be extended", self.inner.id);
                events.push(SessionEvent::ExtensionAvailable {
                    budget_secs: state.gate.budget_secs(),
                });
            }
        }

        events.push(SessionEvent::Tick {
            elapsed: state.timer.elapsed(),
        });
    }

    fn start_ticker(&self) {
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::debug!("No runtime, call session {} is ticked manually", self.inner.id);
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.tick_interval;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(session) = Self::upgrade(&weak) else {
                    break;
                };
                if !session.tick() {
                    break;
                }
            }
        });

        let mut state = self.inner.state.lock();
        if state.status == CallStatus::Connected {
            if let Some(previous) = state.ticker.replace(handle) {
                previous.abort();
            }
        } else {
            handle.abort();
        }
    }

    // ========================================================================
    // EXTENSION
    // ========================================================================

    /// Verlängert das logische Zeitbudget um eine Verlängerung
    pub fn request_extension(&self, requester: Participant) -> Result<ExtensionOutcome, SessionError> {
        let outcome = {
            let mut state = self.inner.state.lock();
            if state.status == CallStatus::Ended {
                return Err(SessionError::SessionEnded);
            }
            let elapsed = state.timer.elapsed();
            state.gate.request(elapsed)
        };

        match outcome {
            ExtensionOutcome::Unavailable { opens_in_secs } => {
                Err(SessionError::ExtensionUnavailable { opens_in_secs })
            }
            ExtensionOutcome::Granted { budget_secs } => {
                tracing::info!(
                    "Call session {} extended by {:?} to {}s",
                    self.inner.id,
                    requester,
                    budget_secs
                );
                self.emit(SessionEvent::Extended { budget_secs });
                self.notify_status();
                Ok(outcome)
            }
            ExtensionOutcome::AlreadyGranted { .. } => Ok(outcome),
        }
    }

    // ========================================================================
    // TEACHING AID
    // ========================================================================

    /// Holt einen neuen Gesprächsimpuls für den unterrichtenden Teilnehmer
    ///
    /// Der Timer läuft währenddessen weiter. Endet der Anruf oder wechseln die
    /// Rollen vor Abschluss, wird das Ergebnis verworfen.
    pub async fn request_prompt(
        &self,
        requester: Participant,
        difficulty: Difficulty,
    ) -> Result<FetchedPrompt, SessionError> {
        let (request, epoch) = {
            let state = self.inner.state.lock();
            match state.status {
                CallStatus::Ended => return Err(SessionError::SessionEnded),
                CallStatus::Connecting => return Err(SessionError::NotConnected),
                CallStatus::Connected => {}
            }
            if state.roles.role_of(requester) != Role::Teaching {
                return Err(SessionError::NotTeaching(requester));
            }

            let profile = self.profile(requester);
            let request = PromptRequest {
                interests: profile.interests.clone(),
                language: profile.teaches_language.clone(),
                difficulty,
                excluding: state.used_prompts.to_vec(),
            };
            (request, state.prompt_epoch)
        };

        let mut fetched = self.inner.fetcher.fetch(request).await;

        {
            let mut state = self.inner.state.lock();
            if state.status == CallStatus::Ended || state.prompt_epoch != epoch {
                tracing::debug!("Discarding stale prompt for session {}", self.inner.id);
                return Err(SessionError::PromptAbandoned);
            }

            // Eine parallele Anfrage kann denselben Impuls bereits belegt haben
            if !state.used_prompts.insert(&fetched.prompt.question) {
                tracing::debug!(
                    "Prompt already used in session {}: {}",
                    self.inner.id,
                    fetched.prompt.question
                );
                let prompt = pick_fallback(difficulty, &state.used_prompts.to_vec());
                state.used_prompts.insert(&prompt.question);
                fetched = FetchedPrompt {
                    prompt,
                    source: PromptSource::Fallback {
                        reason: "prompt already shown in this session".to_string(),
                    },
                };
            }
            state.current_prompt = Some(fetched.prompt.clone());
        }

        if let PromptSource::Fallback { .. } = &fetched.source {
            self.emit(SessionEvent::Notice(
                "Showing a general question while suggestions are unavailable".to_string(),
            ));
        }
        self.emit(SessionEvent::PromptReady(fetched.clone()));
        Ok(fetched)
    }

    // ========================================================================
    // PRIVATE METHODS
    // ========================================================================

    fn upgrade(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    /// Meldet den Status best-effort an die Persistenz
    fn notify_status(&self) {
        let Some(notifier) = self.inner.notifier.as_ref() else {
            return;
        };

        let update = {
            let state = self.inner.state.lock();
            CallStatusUpdate {
                session_id: self.inner.id,
                initiator: self.inner.initiator.user_id.clone(),
                receiver: self.inner.receiver.user_id.clone(),
                status: state.status,
                elapsed_seconds: state.timer.elapsed(),
                switch_fired: state.roles.has_fired(),
                extensions: state.gate.extensions_granted(),
            }
        };

        let future = notifier.notify_call_status(update);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(future);
            }
            Err(_) => tracing::debug!("No runtime, skipping call status notification"),
        }
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("id", &self.inner.id)
            .field("status", &self.status())
            .field("elapsed", &self.elapsed_seconds())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
