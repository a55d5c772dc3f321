// Copyright 2025 Cowboy AI, LLC.

use crate::errors::{WorkbenchError, WorkbenchResult};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;

/// JSON kinds an initial setting can be requested as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitialSettingKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl InitialSettingKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            InitialSettingKind::String => value.is_string(),
            InitialSettingKind::Number => value.is_number(),
            InitialSettingKind::Boolean => value.is_boolean(),
            InitialSettingKind::Object => value.is_object(),
            InitialSettingKind::Array => value.is_array(),
        }
    }
}

impl fmt::Display for InitialSettingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitialSettingKind::String => "string",
            InitialSettingKind::Number => "number",
            InitialSettingKind::Boolean => "boolean",
            InitialSettingKind::Object => "object",
            InitialSettingKind::Array => "array",
        };
        f.write_str(name)
    }
}

/// Settings a module instance is opened with, e.g. from a shared link
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitialSettings {
    settings: Map<String, Value>,
}

impl InitialSettings {
    pub fn new(settings: Map<String, Value>) -> Self {
        Self { settings }
    }

    /// Wrap a JSON object
    pub fn from_value(value: Value) -> WorkbenchResult<Self> {
        match value {
            Value::Object(settings) => Ok(Self { settings }),
            other => Err(WorkbenchError::InitialSetting {
                name: "<root>".to_string(),
                expected: InitialSettingKind::Object.to_string(),
                value: other.to_string(),
            }),
        }
    }

    /// A setting of the requested kind
    ///
    /// `Ok(None)` when absent; an error when present with another kind.
    pub fn get(&self, name: &str, kind: InitialSettingKind) -> WorkbenchResult<Option<&Value>> {
        match self.settings.get(name) {
            None => Ok(None),
            Some(value) if kind.matches(value) => Ok(Some(value)),
            Some(value) => Err(WorkbenchError::InitialSetting {
                name: name.to_string(),
                expected: kind.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// A setting of the requested kind converted to `T`
    pub fn get_as<T: DeserializeOwned>(&self, name: &str, kind: InitialSettingKind) -> WorkbenchResult<Option<T>> {
        self.get(name, kind)?
            .map(|value| serde_json::from_value(value.clone()).map_err(WorkbenchError::from))
            .transpose()
    }

    pub fn is_set(&self, name: &str, kind: InitialSettingKind) -> WorkbenchResult<bool> {
        Ok(self.get(name, kind)?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings() -> InitialSettings {
        InitialSettings::from_value(json!({
            "ensembleIdent": "drogon::iter-0",
            "realizations": [0, 1, 2],
            "showLegend": true
        }))
        .unwrap()
    }

    #[test]
    fn test_get_by_kind() {
        let settings = settings();
        assert_eq!(
            settings.get("ensembleIdent", InitialSettingKind::String).unwrap(),
            Some(&json!("drogon::iter-0"))
        );
        assert_eq!(settings.get("missing", InitialSettingKind::Number).unwrap(), None);
        assert_eq!(
            settings
                .get_as::<Vec<u32>>("realizations", InitialSettingKind::Array)
                .unwrap(),
            Some(vec![0, 1, 2])
        );
        assert!(settings.is_set("showLegend", InitialSettingKind::Boolean).unwrap());
    }

    #[test]
    fn test_kind_mismatch_is_an_error() {
        let err = settings()
            .get("showLegend", InitialSettingKind::String)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Setting \"showLegend\" is not of type \"string\" (value: true)"
        );
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(InitialSettings::from_value(json!([1, 2])).is_err());
    }
}
