// Copyright 2025 Cowboy AI, LLC.

//! Workbench configuration

use crate::errors::WorkbenchResult;
use serde::{Deserialize, Serialize};

/// Runtime configuration for a [`crate::Workbench`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbenchConfig {
    /// Suffix of the durable key holding a module instance's state
    pub state_key_suffix: String,
    /// Suffix of the durable key holding a module instance's receiver subscriptions
    pub receivers_key_suffix: String,
    /// Write persisted state whenever tracked state changes
    pub persist_on_change: bool,
    /// Activate the first module instance once a module finishes importing
    pub auto_activate_first_instance: bool,
    /// Default of the replay flag for topic subscriptions
    pub replay_topics_by_default: bool,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            state_key_suffix: "state".to_string(),
            receivers_key_suffix: "receivers".to_string(),
            persist_on_change: true,
            auto_activate_first_instance: true,
            replay_topics_by_default: true,
        }
    }
}

impl WorkbenchConfig {
    /// Start building a configuration from the defaults
    pub fn builder() -> WorkbenchConfigBuilder {
        WorkbenchConfigBuilder::default()
    }

    /// Parse a configuration document; absent fields take their defaults
    pub fn from_json_str(json: &str) -> WorkbenchResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Durable key for a module instance's persisted state
    pub fn state_key(&self, instance_id: &str) -> String {
        format!("{}-{}", instance_id, self.state_key_suffix)
    }

    /// Durable key for a module instance's persisted receiver subscriptions
    pub fn receivers_key(&self, instance_id: &str) -> String {
        format!("{}-{}", instance_id, self.receivers_key_suffix)
    }
}

/// Fluent builder for [`WorkbenchConfig`]
#[derive(Debug, Clone, Default)]
pub struct WorkbenchConfigBuilder {
    config: WorkbenchConfig,
}

impl WorkbenchConfigBuilder {
    /// Override the state key suffix
    pub fn state_key_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.state_key_suffix = suffix.into();
        self
    }

    /// Override the receivers key suffix
    pub fn receivers_key_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.receivers_key_suffix = suffix.into();
        self
    }

    /// Enable or disable change-driven persistence
    pub fn persist_on_change(mut self, enabled: bool) -> Self {
        self.config.persist_on_change = enabled;
        self
    }

    /// Enable or disable activation of the first instance after import
    pub fn auto_activate_first_instance(mut self, enabled: bool) -> Self {
        self.config.auto_activate_first_instance = enabled;
        self
    }

    /// Default replay behaviour for topic subscriptions
    pub fn replay_topics_by_default(mut self, enabled: bool) -> Self {
        self.config.replay_topics_by_default = enabled;
        self
    }

    /// Finish building
    pub fn build(self) -> WorkbenchConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_key_is_derived_from_instance_id() {
        let config = WorkbenchConfig::default();
        assert_eq!(config.state_key("Grid3D-0"), "Grid3D-0-state");
        assert_eq!(config.receivers_key("Grid3D-0"), "Grid3D-0-receivers");
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config = WorkbenchConfig::from_json_str(r#"{ "persist_on_change": false }"#).unwrap();
        assert!(!config.persist_on_change);
        assert_eq!(config.state_key_suffix, "state");
        assert!(config.auto_activate_first_instance);
    }

    #[test]
    fn test_builder_overrides() {
        let config = WorkbenchConfig::builder()
            .state_key_suffix("persisted")
            .auto_activate_first_instance(false)
            .build();
        assert_eq!(config.state_key("A-1"), "A-1-persisted");
        assert!(!config.auto_activate_first_instance);
        assert!(config.replay_topics_by_default);
    }
}
