//! Sync run state machine.
//!
//! ```text
//! Idle → ExtractingTables → ExtractingColumns → ExtractingRelationships → Finalizing → Succeeded
//!   └──────────┴──────────────────┴──────────────────────┴───────────────────┴──→ Failed
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    ExtractingTables,
    ExtractingColumns,
    ExtractingRelationships,
    Finalizing,
    Succeeded,
    Failed,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::ExtractingTables => "extracting_tables",
            SyncPhase::ExtractingColumns => "extracting_columns",
            SyncPhase::ExtractingRelationships => "extracting_relationships",
            SyncPhase::Finalizing => "finalizing",
            SyncPhase::Succeeded => "succeeded",
            SyncPhase::Failed => "failed",
        }
    }

    /// Next phase on the success path.
    pub fn next(&self) -> Option<SyncPhase> {
        match self {
            SyncPhase::Idle => Some(SyncPhase::ExtractingTables),
            SyncPhase::ExtractingTables => Some(SyncPhase::ExtractingColumns),
            SyncPhase::ExtractingColumns => Some(SyncPhase::ExtractingRelationships),
            SyncPhase::ExtractingRelationships => Some(SyncPhase::Finalizing),
            SyncPhase::Finalizing => Some(SyncPhase::Succeeded),
            SyncPhase::Succeeded | SyncPhase::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncPhase::Succeeded | SyncPhase::Failed)
    }

    /// True once the table phase has started writing, so a failure here
    /// leaves earlier writes in place.
    pub fn follows_writes(&self) -> bool {
        matches!(
            self,
            SyncPhase::ExtractingColumns
                | SyncPhase::ExtractingRelationships
                | SyncPhase::Finalizing
        )
    }

    pub fn can_transition_to(&self, to: SyncPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == SyncPhase::Failed || self.next() == Some(to)
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a transition the state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid sync transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: SyncPhase,
    pub to: SyncPhase,
}

/// Tracks the phase of one sync run.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    current: SyncPhase,
    history: Vec<SyncPhase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            current: SyncPhase::Idle,
            history: vec![SyncPhase::Idle],
        }
    }

    pub fn current(&self) -> SyncPhase {
        self.current
    }

    /// Phases visited so far, in order.
    pub fn history(&self) -> &[SyncPhase] {
        &self.history
    }

    /// Advance along the success path.
    pub fn advance(&mut self) -> Result<SyncPhase, InvalidTransition> {
        let to = self.current.next().ok_or(InvalidTransition {
            from: self.current,
            to: self.current,
        })?;
        self.transition(to)
    }

    pub fn transition(&mut self, to: SyncPhase) -> Result<SyncPhase, InvalidTransition> {
        if !self.current.can_transition_to(to) {
            return Err(InvalidTransition {
                from: self.current,
                to,
            });
        }
        self.current = to;
        self.history.push(to);
        Ok(to)
    }

    /// Move to `Failed`, returning the phase that failed.
    pub fn fail(&mut self) -> SyncPhase {
        let failed = self.current;
        if !failed.is_terminal() {
            self.current = SyncPhase::Failed;
            self.history.push(SyncPhase::Failed);
        }
        failed
    }
}
