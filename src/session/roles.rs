//! Rollenverteilung und einmaliger Rollenwechsel
//!
//! Die Rollen werden pro Session gehalten, nicht pro Teilnehmer. Damit ist
//! garantiert, dass immer genau ein Teilnehmer unterrichtet.

use serde::{Deserialize, Serialize};

/// Standard-Zeitpunkt des Rollenwechsels (15 Minuten)
pub const DEFAULT_SWITCH_AT_SECS: u64 = 900;

/// Seite eines Anrufs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Participant {
    Initiator,
    Receiver,
}

impl Participant {
    pub fn partner(self) -> Self {
        match self {
            Self::Initiator => Self::Receiver,
            Self::Receiver => Self::Initiator,
        }
    }
}

/// Modus eines Teilnehmers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Teaching,
    Learning,
}

/// Rollenverteilung einer Session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleSplit {
    InitiatorTeaching,
    ReceiverTeaching,
}

impl RoleSplit {
    pub fn role_of(self, participant: Participant) -> Role {
        match (self, participant) {
            (Self::InitiatorTeaching, Participant::Initiator)
            | (Self::ReceiverTeaching, Participant::Receiver) => Role::Teaching,
            _ => Role::Learning,
        }
    }

    pub fn teaching(self) -> Participant {
        match self {
            Self::InitiatorTeaching => Participant::Initiator,
            Self::ReceiverTeaching => Participant::Receiver,
        }
    }

    pub fn inverted(self) -> Self {
        match self {
            Self::InitiatorTeaching => Self::ReceiverTeaching,
            Self::ReceiverTeaching => Self::InitiatorTeaching,
        }
    }
}

impl Default for RoleSplit {
    fn default() -> Self {
        Self::InitiatorTeaching
    }
}

// ============================================================================
// SWITCH SCHEDULER
// ============================================================================

/// Plant den einen Rollenwechsel pro Anruf
#[derive(Debug, Clone)]
pub struct RoleSwitch {
    split: RoleSplit,
    switch_at: u64,
    fired: bool,
}

impl RoleSwitch {
    pub fn new(switch_at: u64) -> Self {
        Self {
            split: RoleSplit::default(),
            switch_at,
            fired: false,
        }
    }

    pub fn split(&self) -> RoleSplit {
        self.split
    }

    pub fn role_of(&self, participant: Participant) -> Role {
        self.split.role_of(participant)
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn switch_at(&self) -> u64 {
        self.switch_at
    }

    /// Sekunden bis zum Wechsel, `None` wenn er schon stattgefunden hat
    pub fn seconds_until_switch(&self, elapsed: u64) -> Option<u64> {
        (!self.fired).then(|| self.switch_at.saturating_sub(elapsed))
    }

    /// Verarbeitet eine verstrichene Sekunde
    ///
    /// Gibt die neue Verteilung zurück, wenn genau diese Sekunde den Wechsel auslöst.
    pub fn observe(&mut self, second: u64) -> Option<RoleSplit> {
        if self.fired || second != self.switch_at {
            return None;
        }

        self.fired = true;
        self.split = self.split.inverted();
        Some(self.split)
    }
}

impl Default for RoleSwitch {
    fn default() -> Self {
        Self::new(DEFAULT_SWITCH_AT_SECS)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_exactly_one_teaching(switch: &RoleSwitch) {
        let initiator = switch.role_of(Participant::Initiator);
        let receiver = switch.role_of(Participant::Receiver);
        assert_ne!(initiator, receiver);
    }

    #[test]
    fn test_initiator_teaches_first() {
        let switch = RoleSwitch::default();
        assert_eq!(switch.role_of(Participant::Initiator), Role::Teaching);
        assert_eq!(switch.role_of(Participant::Receiver), Role::Learning);
        assert_eq!(switch.split().teaching(), Participant::Initiator);
    }

    #[test]
    fn test_switch_fires_exactly_once_at_900() {
        let mut switch = RoleSwitch::default();
        let mut fired = Vec::new();

        for second in 1..=2000 {
            if let Some(split) = switch.observe(second) {
                fired.push((second, split));
            }
            assert_exactly_one_teaching(&switch);
        }

        assert_eq!(fired, vec![(900, RoleSplit::ReceiverTeaching)]);
        assert_eq!(switch.role_of(Participant::Receiver), Role::Teaching);
    }

    #[test]
    fn test_no_switch_at_899() {
        let mut switch = RoleSwitch::default();
        assert_eq!(switch.observe(899), None);
        assert!(!switch.has_fired());
        assert_eq!(switch.seconds_until_switch(899), Some(1));
    }

    #[test]
    fn test_repeated_observation_does_not_refire() {
        let mut switch = RoleSwitch::default();
        assert!(switch.observe(900).is_some());
        assert_eq!(switch.observe(900), None);
        assert_eq!(switch.observe(901), None);
        assert_eq!(switch.split(), RoleSplit::ReceiverTeaching);
        assert_eq!(switch.seconds_until_switch(901), None);
    }

    #[test]
    fn test_partner() {
        assert_eq!(Participant::Initiator.partner(), Participant::Receiver);
        assert_eq!(Participant::Receiver.partner(), Participant::Initiator);
    }
}
