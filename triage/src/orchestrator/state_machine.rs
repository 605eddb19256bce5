//! Triage run state machine: explicit states and legal transition guards.
//!
//! Every run walks the same line:
//!
//! ```text
//! Received → Classified → Scored → Retrieved → Ranked → Reported
//! ```
//!
//! Only the next state is legal. Each transition is recorded with the time
//! since the run started, so a report's provenance can be replayed.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageState {
    /// Record accepted and validated.
    Received,
    Classified,
    /// Flakiness probability computed.
    Scored,
    /// Similar failures attached (possibly none).
    Retrieved,
    Ranked,
    /// Report built; terminal.
    Reported,
}

impl TriageState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Reported)
    }

    /// The only legal successor.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Received => Some(Self::Classified),
            Self::Classified => Some(Self::Scored),
            Self::Scored => Some(Self::Retrieved),
            Self::Retrieved => Some(Self::Ranked),
            Self::Ranked => Some(Self::Reported),
            Self::Reported => None,
        }
    }
}

impl fmt::Display for TriageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "Received"),
            Self::Classified => write!(f, "Classified"),
            Self::Scored => write!(f, "Scored"),
            Self::Retrieved => write!(f, "Retrieved"),
            Self::Ranked => write!(f, "Ranked"),
            Self::Reported => write!(f, "Reported"),
        }
    }
}

fn is_legal_transition(from: TriageState, to: TriageState) -> bool {
    from.next() == Some(to)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: TriageState,
    pub to: TriageState,
    /// Milliseconds since the run started.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("illegal triage state transition: {from} → {to}")]
pub struct IllegalTransition {
    pub from: TriageState,
    pub to: TriageState,
}

#[derive(Debug, Clone)]
pub struct TriageStateMachine {
    current: TriageState,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl TriageStateMachine {
    pub fn new() -> Self {
        Self {
            current: TriageState::Received,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> TriageState {
        self.current
    }

    pub fn advance(&mut self, to: TriageState, reason: Option<&str>) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        let record = TransitionRecord {
            from: self.current,
            to,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };

        tracing::debug!(
            from = %self.current,
            to = %to,
            elapsed_ms = record.elapsed_ms,
            reason = reason.unwrap_or(""),
            "Triage state transition"
        );

        self.transitions.push(record);
        self.current = to;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.created_at.elapsed().as_millis() as u64
    }

    /// e.g. `Received → Reported (3ms) [Classified → Scored → …]`
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} → {} ({}ms)",
            TriageState::Received,
            self.current,
            self.elapsed_ms()
        );
        if !self.transitions.is_empty() {
            let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
            out.push_str(&format!(" [{}]", states.join(" → ")));
        }
        out
    }
}

impl Default for TriageStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH: [TriageState; 5] = [
        TriageState::Classified,
        TriageState::Scored,
        TriageState::Retrieved,
        TriageState::Ranked,
        TriageState::Reported,
    ];

    #[test]
    fn test_initial_state() {
        let sm = TriageStateMachine::new();
        assert_eq!(sm.current(), TriageState::Received);
        assert!(!sm.is_terminal());
        assert!(sm.transitions().is_empty());
    }

    #[test]
    fn test_happy_path() {
        let mut sm = TriageStateMachine::new();
        for state in PATH {
            sm.advance(state, None).unwrap();
        }
        assert!(sm.is_terminal());
        assert_eq!(sm.transitions().len(), 5);
        assert!(sm.summary().ends_with("[Classified → Scored → Retrieved → Ranked → Reported]"));
    }

    #[test]
    fn test_skipping_a_state_is_illegal() {
        let mut sm = TriageStateMachine::new();
        let err = sm.advance(TriageState::Scored, None).unwrap_err();
        assert_eq!(err.from, TriageState::Received);
        assert_eq!(err.to, TriageState::Scored);
        assert_eq!(sm.current(), TriageState::Received);
    }

    #[test]
    fn test_no_backward_or_repeat_transitions() {
        let mut sm = TriageStateMachine::new();
        sm.advance(TriageState::Classified, None).unwrap();
        assert!(sm.advance(TriageState::Classified, None).is_err());
        assert!(sm.advance(TriageState::Received, None).is_err());
    }

    #[test]
    fn test_terminal_has_no_successor() {
        let mut sm = TriageStateMachine::new();
        for state in PATH {
            sm.advance(state, None).unwrap();
        }
        for state in [TriageState::Received, TriageState::Reported] {
            assert!(sm.advance(state, None).is_err());
        }
    }

    #[test]
    fn test_reason_recorded() {
        let mut sm = TriageStateMachine::new();
        sm.advance(TriageState::Classified, Some("timeout @ 0.80")).unwrap();
        assert_eq!(sm.transitions()[0].reason.as_deref(), Some("timeout @ 0.80"));
        let json = serde_json::to_string(&sm.transitions()[0]).unwrap();
        assert!(json.contains("\"from\":\"received\""));
    }

    #[test]
    fn test_display_in_error() {
        let err = IllegalTransition {
            from: TriageState::Ranked,
            to: TriageState::Classified,
        };
        assert_eq!(err.to_string(), "illegal triage state transition: Ranked → Classified");
    }
}
