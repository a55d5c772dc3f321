// Copyright 2025 Cowboy AI, LLC.

//! Error types for workbench operations

use thiserror::Error;

/// Errors that can occur in workbench operations
#[derive(Debug, Error)]
pub enum WorkbenchError {
    /// A module name was used that was never registered
    #[error("Module '{0}' not found. Did you forget to register it?")]
    ModuleNotFound(String),

    /// A sub-module name was used that was never registered
    #[error("Sub-module '{0}' not found. Did you forget to register it?")]
    SubModuleNotFound(String),

    /// A module was asked to make an instance before it was attached to a workbench
    #[error("Module '{0}' must be added to a workbench before making an instance")]
    ModuleNotAttached(String),

    /// A module instance was used before its state store existed
    #[error("Module context is not available yet. Did you forget to init the module '{0}'?")]
    ContextNotInitialized(String),

    /// A module instance was asked for its settings-to-view interface before it had one
    #[error("Module instance '{0}' does not have an interface yet. Did you forget to init the module?")]
    InterfaceNotInitialized(String),

    /// A state key that is not part of the initial state shape
    #[error("Unknown state key: {0}")]
    UnknownStateKey(String),

    /// An atom name that was never defined in the atom store
    #[error("Unknown atom: {0}")]
    UnknownAtom(String),

    /// A channel delivered a key kind the receiver does not support
    #[error("Kind of key '{actual}' on channel '{channel}' is not one of the expected kinds '{expected}'")]
    KeyKindMismatch {
        /// Channel id string
        channel: String,
        /// The channel's declared key kind
        actual: String,
        /// The receiver's expected key kinds, comma separated
        expected: String,
    },

    /// Invalid state transition
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state
        from: String,
        /// Attempted target state
        to: String,
    },

    /// An item was not found where it was required to exist
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// A layer-tree move that the tree shape does not allow
    #[error("Invalid move: {0}")]
    InvalidMove(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A JSON document did not conform to its schema
    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    /// Durable storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// The module code loader rejected
    #[error("Failed to load module '{module}': {source}")]
    ModuleLoad {
        /// Module name
        module: String,
        /// Loader error
        #[source]
        source: anyhow::Error,
    },

    /// An initial setting had an unexpected JSON kind
    #[error("Setting \"{name}\" is not of type \"{expected}\" (value: {value})")]
    InitialSetting {
        /// Setting name
        name: String,
        /// Requested kind
        expected: String,
        /// Actual value as JSON
        value: String,
    },

    /// Invariant violation
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

/// Result type for workbench operations
pub type WorkbenchResult<T> = Result<T, WorkbenchError>;

impl From<serde_json::Error> for WorkbenchError {
    fn from(err: serde_json::Error) -> Self {
        WorkbenchError::Serialization(err.to_string())
    }
}

impl WorkbenchError {
    /// Check if this is a configuration error (misuse of the runtime by the assembler)
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            WorkbenchError::ModuleNotFound(_)
                | WorkbenchError::SubModuleNotFound(_)
                | WorkbenchError::ModuleNotAttached(_)
                | WorkbenchError::ContextNotInitialized(_)
                | WorkbenchError::InterfaceNotInitialized(_)
                | WorkbenchError::UnknownStateKey(_)
                | WorkbenchError::UnknownAtom(_)
        )
    }

    /// Check if this is a data contract violation between modules
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, WorkbenchError::KeyKindMismatch { .. })
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            WorkbenchError::ModuleNotFound(_)
                | WorkbenchError::SubModuleNotFound(_)
                | WorkbenchError::ItemNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = WorkbenchError::ModuleNotFound("MyModule".to_string());
        assert_eq!(
            err.to_string(),
            "Module 'MyModule' not found. Did you forget to register it?"
        );

        let err = WorkbenchError::KeyKindMismatch {
            channel: "timeseries".to_string(),
            actual: "Realization".to_string(),
            expected: "Timestamp, GridIndex".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Kind of key 'Realization' on channel 'timeseries' is not one of the expected kinds 'Timestamp, GridIndex'"
        );

        let err = WorkbenchError::InvalidStateTransition {
            from: "Imported".to_string(),
            to: "Importing".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition from Imported to Importing"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(WorkbenchError::ModuleNotFound("x".into()).is_configuration_error());
        assert!(WorkbenchError::ModuleNotFound("x".into()).is_not_found());
        assert!(WorkbenchError::ContextNotInitialized("x".into()).is_configuration_error());
        assert!(!WorkbenchError::Storage("disk".into()).is_configuration_error());

        let mismatch = WorkbenchError::KeyKindMismatch {
            channel: "c".into(),
            actual: "a".into(),
            expected: "b".into(),
        };
        assert!(mismatch.is_contract_violation());
        assert!(!mismatch.is_not_found());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: WorkbenchError = json_err.into();
        assert!(matches!(err, WorkbenchError::Serialization(_)));
    }

    #[test]
    fn test_module_load_error_keeps_source() {
        let err = WorkbenchError::ModuleLoad {
            module: "Grid3D".to_string(),
            source: anyhow::anyhow!("chunk missing"),
        };
        assert_eq!(err.to_string(), "Failed to load module 'Grid3D': chunk missing");
        assert!(std::error::Error::source(&err).is_some());
    }
}
