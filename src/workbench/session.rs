// Copyright 2025 Cowboy AI, LLC.

//! Session data shared by every module instance
//!
//! The session holds the loaded ensembles, one realization filter per
//! ensemble and the user-created items. Changes are announced through
//! [`WorkbenchSessionEvent`] topics.

use super::user_created_items::UserCreatedItems;
use crate::errors::{WorkbenchError, WorkbenchResult};
use crate::pubsub::{SubscriptionHandle, TopicSubscribers};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Case and ensemble name that identify one ensemble
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsembleIdent {
    pub case_uuid: Uuid,
    pub ensemble_name: String,
}

impl EnsembleIdent {
    pub fn new(case_uuid: Uuid, ensemble_name: impl Into<String>) -> Self {
        Self {
            case_uuid,
            ensemble_name: ensemble_name.into(),
        }
    }
}

impl fmt::Display for EnsembleIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.case_uuid, self.ensemble_name)
    }
}

impl FromStr for EnsembleIdent {
    type Err = WorkbenchError;

    /// Parse the `"{case_uuid}::{ensemble_name}"` form
    ///
    /// ```rust
    /// use reservoir_workbench::EnsembleIdent;
    ///
    /// let ident: EnsembleIdent = "9a1c3a3e-3c4b-4d8e-9f1a-2b3c4d5e6f70::iter-0".parse().unwrap();
    /// assert_eq!(ident.ensemble_name, "iter-0");
    /// assert!("no-separator".parse::<EnsembleIdent>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (case, name) = s
            .split_once("::")
            .ok_or_else(|| WorkbenchError::Serialization(format!("malformed ensemble ident '{s}'")))?;
        let case_uuid = Uuid::parse_str(case)
            .map_err(|e| WorkbenchError::Serialization(format!("ensemble ident '{s}': {e}")))?;
        Ok(Self::new(case_uuid, name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ensemble {
    pub ident: EnsembleIdent,
    pub display_name: String,
    pub realizations: Vec<u32>,
}

impl Ensemble {
    pub fn new(ident: EnsembleIdent, display_name: impl Into<String>, realizations: Vec<u32>) -> Self {
        Self {
            ident,
            display_name: display_name.into(),
            realizations,
        }
    }
}

/// The ensembles currently loaded into the session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnsembleSet {
    ensembles: Vec<Ensemble>,
}

impl EnsembleSet {
    pub fn new(ensembles: Vec<Ensemble>) -> Self {
        Self { ensembles }
    }

    pub fn ensembles(&self) -> &[Ensemble] {
        &self.ensembles
    }

    pub fn find_ensemble(&self, ident: &EnsembleIdent) -> Option<&Ensemble> {
        self.ensembles.iter().find(|ensemble| &ensemble.ident == ident)
    }

    pub fn has_ensemble(&self, ident: &EnsembleIdent) -> bool {
        self.find_ensemble(ident).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.ensembles.is_empty()
    }
}

/// Realizations of one ensemble selected for use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealizationFilter {
    pub ensemble_ident: EnsembleIdent,
    pub selected_realizations: Vec<u32>,
}

impl RealizationFilter {
    /// A filter selecting every realization of `ensemble`
    pub fn all_of(ensemble: &Ensemble) -> Self {
        Self {
            ensemble_ident: ensemble.ident.clone(),
            selected_realizations: ensemble.realizations.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RealizationFilterSet {
    filters: IndexMap<EnsembleIdent, RealizationFilter>,
}

impl RealizationFilterSet {
    /// Keep filters of ensembles still present, add defaults for new ones and
    /// drop the rest
    pub fn synchronize_with_ensemble_set(&mut self, ensemble_set: &EnsembleSet) {
        let mut next = IndexMap::new();
        for ensemble in ensemble_set.ensembles() {
            let filter = self
                .filters
                .shift_remove(&ensemble.ident)
                .unwrap_or_else(|| RealizationFilter::all_of(ensemble));
            next.insert(ensemble.ident.clone(), filter);
        }
        if !self.filters.is_empty() {
            debug!(dropped = self.filters.len(), "realization filters dropped with their ensembles");
        }
        self.filters = next;
    }

    pub fn filter(&self, ident: &EnsembleIdent) -> Option<&RealizationFilter> {
        self.filters.get(ident)
    }

    pub fn filters(&self) -> impl Iterator<Item = &RealizationFilter> {
        self.filters.values()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkbenchSessionEvent {
    EnsembleSetChanged,
    EnsembleSetLoadingStateChanged,
    RealizationFilterSetChanged,
    UserCreatedItemsChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventPayload {
    None,
    LoadingState { is_loading: bool },
}

pub struct WorkbenchSession {
    ensemble_set: RefCell<EnsembleSet>,
    is_loading: Cell<bool>,
    realization_filters: RefCell<RealizationFilterSet>,
    user_created_items: Rc<UserCreatedItems>,
    events: Rc<TopicSubscribers<WorkbenchSessionEvent, SessionEventPayload>>,
    _items_subscription: SubscriptionHandle,
}

impl WorkbenchSession {
    pub fn new() -> Self {
        let user_created_items = Rc::new(UserCreatedItems::new());
        let events: Rc<TopicSubscribers<WorkbenchSessionEvent, SessionEventPayload>> =
            Rc::new(TopicSubscribers::new());
        let relay = Rc::clone(&events);
        let items_subscription = user_created_items.intersection_polylines().subscribe(move || {
            relay.notify(&WorkbenchSessionEvent::UserCreatedItemsChanged, &SessionEventPayload::None)
        });
        Self {
            ensemble_set: RefCell::new(EnsembleSet::default()),
            is_loading: Cell::new(false),
            realization_filters: RefCell::new(RealizationFilterSet::default()),
            user_created_items,
            events,
            _items_subscription: items_subscription,
        }
    }

    pub fn subscribe(
        &self,
        event: WorkbenchSessionEvent,
        callback: impl Fn(&SessionEventPayload) + 'static,
    ) -> SubscriptionHandle {
        self.events.subscribe(event, callback)
    }

    fn notify(&self, event: WorkbenchSessionEvent, payload: SessionEventPayload) {
        self.events.notify(&event, &payload);
    }

    pub fn ensemble_set(&self) -> EnsembleSet {
        self.ensemble_set.borrow().clone()
    }

    /// Replace the ensemble set and bring the realization filters in line with it
    pub fn set_ensemble_set(&self, ensemble_set: EnsembleSet) {
        info!(ensembles = ensemble_set.ensembles().len(), "ensemble set replaced");
        self.realization_filters
            .borrow_mut()
            .synchronize_with_ensemble_set(&ensemble_set);
        *self.ensemble_set.borrow_mut() = ensemble_set;
        self.notify(WorkbenchSessionEvent::EnsembleSetChanged, SessionEventPayload::None);
        self.notify(WorkbenchSessionEvent::RealizationFilterSetChanged, SessionEventPayload::None);
    }

    pub fn is_ensemble_set_loading(&self) -> bool {
        self.is_loading.get()
    }

    pub fn set_ensemble_set_loading_state(&self, is_loading: bool) {
        if self.is_loading.replace(is_loading) == is_loading {
            return;
        }
        self.notify(
            WorkbenchSessionEvent::EnsembleSetLoadingStateChanged,
            SessionEventPayload::LoadingState { is_loading },
        );
    }

    pub fn realization_filter(&self, ident: &EnsembleIdent) -> Option<RealizationFilter> {
        self.realization_filters.borrow().filter(ident).cloned()
    }

    pub fn realization_filter_set(&self) -> RealizationFilterSet {
        self.realization_filters.borrow().clone()
    }

    /// Select a subset of an ensemble's realizations
    ///
    /// Realizations the ensemble does not have are ignored.
    pub fn set_realization_filter(&self, ident: &EnsembleIdent, realizations: Vec<u32>) -> WorkbenchResult<()> {
        let available = self
            .ensemble_set
            .borrow()
            .find_ensemble(ident)
            .map(|ensemble| ensemble.realizations.clone())
            .ok_or_else(|| WorkbenchError::ItemNotFound(format!("ensemble {ident}")))?;
        {
            let mut filters = self.realization_filters.borrow_mut();
            let filter = filters
                .filters
                .get_mut(ident)
                .ok_or_else(|| WorkbenchError::ItemNotFound(format!("realization filter {ident}")))?;
            filter.selected_realizations = realizations
                .into_iter()
                .filter(|realization| available.contains(realization))
                .collect();
        }
        self.notify(WorkbenchSessionEvent::RealizationFilterSetChanged, SessionEventPayload::None);
        Ok(())
    }

    pub fn user_created_items(&self) -> &UserCreatedItems {
        &self.user_created_items
    }

    pub fn subscriber_count(&self, event: WorkbenchSessionEvent) -> usize {
        self.events.subscriber_count(&event)
    }
}

impl Default for WorkbenchSession {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WorkbenchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkbenchSession")
            .field("ensemble_set", &self.ensemble_set.borrow())
            .field("is_loading", &self.is_loading.get())
            .field("user_created_items", &self.user_created_items)
            .finish()
    }
}
