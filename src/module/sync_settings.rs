// Copyright 2025 Cowboy AI, LLC.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Settings a module instance may keep in sync with other instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncSettingKey {
    Ensemble,
    TimeSeries,
    Surface,
    Date,
    Parameter,
    Intersection,
    CameraPositionIntersection,
    VerticalScale,
}

impl SyncSettingKey {
    /// Human readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            SyncSettingKey::Ensemble => "Ensemble",
            SyncSettingKey::TimeSeries => "Time series",
            SyncSettingKey::Surface => "Surface",
            SyncSettingKey::Date => "Date",
            SyncSettingKey::Parameter => "Parameter",
            SyncSettingKey::Intersection => "Intersection",
            SyncSettingKey::CameraPositionIntersection => "Camera position intersection",
            SyncSettingKey::VerticalScale => "Vertical scale",
        }
    }
}

impl fmt::Display for SyncSettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
