//! Verlängerungs-Gate
//!
//! Ab 30 Minuten darf ein Teilnehmer den Anruf um 15 Minuten verlängern.
//! Die Verlängerung betrifft nur das logische Zeitbudget, nicht die Rollen.

use serde::{Deserialize, Serialize};

pub const DEFAULT_EXTENSION_GATE_SECS: u64 = 1800;
pub const DEFAULT_EXTENSION_SECS: u64 = 900;

/// Ergebnis einer Verlängerungsanfrage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExtensionOutcome {
    /// Budget wurde verlängert
    Granted { budget_secs: u64 },
    /// In diesem Fenster bereits verlängert, keine weitere Wirkung
    AlreadyGranted { budget_secs: u64 },
    /// Gate noch geschlossen
    Unavailable { opens_in_secs: u64 },
}

#[derive(Debug, Clone)]
pub struct ExtensionGate {
    gate_at: u64,
    extension_secs: u64,
    max_extensions: u32,
    granted: u32,
    opened: bool,
}

impl ExtensionGate {
    pub fn new(gate_at: u64, extension_secs: u64, max_extensions: u32) -> Self {
        Self {
            gate_at,
            extension_secs,
            max_extensions,
            granted: 0,
            opened: false,
        }
    }

    /// Verarbeitet eine verstrichene Sekunde, true wenn das Gate dabei aufgeht
    pub fn observe(&mut self, second: u64) -> bool {
        if self.opened || second < self.gate_at {
            return false;
        }
        self.opened = true;
        true
    }

    /// Bleibt offen, sobald es einmal geöffnet wurde
    pub fn is_open(&self) -> bool {
        self.opened
    }

    pub fn extensions_granted(&self) -> u32 {
        self.granted
    }

    /// Logisches Zeitbudget des Anrufs in Sekunden
    pub fn budget_secs(&self) -> u64 {
        self.gate_at + u64::from(self.granted) * self.extension_secs
    }

    pub fn remaining_secs(&self, elapsed: u64) -> u64 {
        self.budget_secs().saturating_sub(elapsed)
    }

    pub fn request(&mut self, elapsed: u64) -> ExtensionOutcome {
        if !self.opened && elapsed >= self.gate_at {
            self.opened = true;
        }
        if !self.opened {
            return ExtensionOutcome::Unavailable {
                opens_in_secs: self.gate_at.saturating_sub(elapsed),
            };
        }

        // Ein weiteres Fenster beginnt erst, wenn das verlängerte Budget erreicht ist
        let window_open = elapsed >= self.budget_secs();
        if self.granted < self.max_extensions && window_open {
            self.granted += 1;
            return ExtensionOutcome::Granted {
                budget_secs: self.budget_secs(),
            };
        }

        ExtensionOutcome::AlreadyGranted {
            budget_secs: self.budget_secs(),
        }
    }
}

impl Default for ExtensionGate {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSION_GATE_SECS, DEFAULT_EXTENSION_SECS, 1)
    }
}

// ============================================================================
// TESTS
// ============================================================================
