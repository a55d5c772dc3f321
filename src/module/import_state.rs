// Copyright 2025 Cowboy AI, LLC.

//! Import lifecycle of a module's code
//!
//! ```text
//! NotImported ──> Importing ──> Imported
//!                     │
//!                     └──────> Failed
//! ```
//!
//! `Imported` and `Failed` are terminal for a load attempt; a failed load is
//! never retried automatically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a module is in loading its code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ImportState {
    #[default]
    NotImported,
    Importing,
    Imported,
    Failed,
}

impl ImportState {
    pub fn name(&self) -> &'static str {
        match self {
            ImportState::NotImported => "NotImported",
            ImportState::Importing => "Importing",
            ImportState::Imported => "Imported",
            ImportState::Failed => "Failed",
        }
    }

    /// No further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportState::Imported | ImportState::Failed)
    }

    /// Check if a transition to the target state is valid
    ///
    /// ```rust
    /// use reservoir_workbench::ImportState;
    ///
    /// assert!(ImportState::NotImported.can_transition_to(&ImportState::Importing));
    /// assert!(ImportState::Importing.can_transition_to(&ImportState::Failed));
    /// assert!(!ImportState::Failed.can_transition_to(&ImportState::Importing));
    /// ```
    pub fn can_transition_to(&self, target: &Self) -> bool {
        matches!(
            (self, target),
            (ImportState::NotImported, ImportState::Importing)
                | (ImportState::Importing, ImportState::Imported)
                | (ImportState::Importing, ImportState::Failed)
        )
    }

    /// Get all valid target states from this state
    pub fn valid_transitions(&self) -> Vec<Self> {
        match self {
            ImportState::NotImported => vec![ImportState::Importing],
            ImportState::Importing => vec![ImportState::Imported, ImportState::Failed],
            ImportState::Imported | ImportState::Failed => Vec::new(),
        }
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One recorded import state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportTransition {
    pub from: ImportState,
    pub to: ImportState,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_are_forward_only() {
        let all = [
            ImportState::NotImported,
            ImportState::Importing,
            ImportState::Imported,
            ImportState::Failed,
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(&to),
                    from.valid_transitions().contains(&to),
                    "{from} -> {to}"
                );
            }
        }
        assert!(ImportState::Imported.is_terminal());
        assert!(ImportState::Failed.valid_transitions().is_empty());
        assert!(!ImportState::Importing.is_terminal());
    }

    #[test]
    fn test_default_is_not_imported() {
        assert_eq!(ImportState::default(), ImportState::NotImported);
    }
}
