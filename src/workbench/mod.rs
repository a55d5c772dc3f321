// Copyright 2025 Cowboy AI, LLC.

//! Workbench composition root, shared session and cross-module topics

mod root;
mod services;
mod session;
mod user_created_items;

pub use root::{Workbench, WorkbenchTopic};
pub use services::{
    topics, GlobalTopic, HoverRealization, HoverTimestamp, NavigatorTopic, Topic, WorkbenchServices,
};
pub use session::{
    Ensemble, EnsembleIdent, EnsembleSet, RealizationFilter, RealizationFilterSet, SessionEventPayload,
    WorkbenchSession, WorkbenchSessionEvent,
};
pub use user_created_items::{
    IntersectionPolyline, IntersectionPolylineWithoutId, IntersectionPolylines, UserCreatedItemSet,
    UserCreatedItems,
};
