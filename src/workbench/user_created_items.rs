// Copyright 2025 Cowboy AI, LLC.

//! Objects authored by the user during a session

use crate::errors::{WorkbenchError, WorkbenchResult};
use crate::pubsub::{SubscriberList, SubscriptionHandle};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::warn;
use uuid::Uuid;

/// A set of user-created items that round-trips through a string
pub trait UserCreatedItemSet {
    fn serialize(&self) -> WorkbenchResult<String>;

    /// Replace the whole set with previously serialized data
    fn populate_from_data(&self, data: &str) -> WorkbenchResult<()>;
}

/// A named polyline in map coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectionPolyline {
    pub id: Uuid,
    pub name: String,
    pub points: Vec<[f64; 2]>,
}

/// A polyline before it has been given an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectionPolylineWithoutId {
    pub name: String,
    pub points: Vec<[f64; 2]>,
}

impl IntersectionPolylineWithoutId {
    pub fn new(name: impl Into<String>, points: Vec<[f64; 2]>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }
}

#[derive(Default)]
pub struct IntersectionPolylines {
    polylines: RefCell<Vec<IntersectionPolyline>>,
    subscribers: Rc<SubscriberList<()>>,
}

impl IntersectionPolylines {
    pub fn new() -> Self {
        Self::default()
    }

    fn notify(&self) {
        self.subscribers.notify(&());
    }

    /// Listen for any change to the set
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> SubscriptionHandle {
        self.subscribers.subscribe(move |_| callback())
    }

    /// Add a polyline under a fresh id
    pub fn add(&self, polyline: IntersectionPolylineWithoutId) -> Uuid {
        let id = Uuid::new_v4();
        self.polylines.borrow_mut().push(IntersectionPolyline {
            id,
            name: polyline.name,
            points: polyline.points,
        });
        self.notify();
        id
    }

    pub fn remove(&self, id: Uuid) -> bool {
        let removed = {
            let mut polylines = self.polylines.borrow_mut();
            let before = polylines.len();
            polylines.retain(|polyline| polyline.id != id);
            polylines.len() != before
        };
        if removed {
            self.notify();
        } else {
            warn!(%id, "no polyline to remove");
        }
        removed
    }

    pub fn polylines(&self) -> Vec<IntersectionPolyline> {
        self.polylines.borrow().clone()
    }

    pub fn polyline(&self, id: Uuid) -> Option<IntersectionPolyline> {
        self.polylines
            .borrow()
            .iter()
            .find(|polyline| polyline.id == id)
            .cloned()
    }

    /// Replace the name and points of an existing polyline
    pub fn update_polyline(&self, id: Uuid, polyline: IntersectionPolylineWithoutId) -> WorkbenchResult<()> {
        {
            let mut polylines = self.polylines.borrow_mut();
            let slot = polylines
                .iter_mut()
                .find(|existing| existing.id == id)
                .ok_or_else(|| WorkbenchError::ItemNotFound(format!("polyline {id}")))?;
            slot.name = polyline.name;
            slot.points = polyline.points;
        }
        self.notify();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.polylines.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.polylines.borrow().is_empty()
    }
}

impl UserCreatedItemSet for IntersectionPolylines {
    fn serialize(&self) -> WorkbenchResult<String> {
        Ok(serde_json::to_string(&*self.polylines.borrow())?)
    }

    fn populate_from_data(&self, data: &str) -> WorkbenchResult<()> {
        let polylines: Vec<IntersectionPolyline> = serde_json::from_str(data)?;
        *self.polylines.borrow_mut() = polylines;
        self.notify();
        Ok(())
    }
}

impl fmt::Debug for IntersectionPolylines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntersectionPolylines")
            .field("polylines", &self.polylines.borrow())
            .finish()
    }
}

/// Everything the user has authored in this session
#[derive(Debug, Default)]
pub struct UserCreatedItems {
    intersection_polylines: IntersectionPolylines,
}

impl UserCreatedItems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intersection_polylines(&self) -> &IntersectionPolylines {
        &self.intersection_polylines
    }

    /// Same items, compared through their serialized form
    pub fn is_equal(&self, other: &UserCreatedItems) -> WorkbenchResult<bool> {
        Ok(self.intersection_polylines.serialize()? == other.intersection_polylines.serialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn well_path() -> IntersectionPolylineWithoutId {
        IntersectionPolylineWithoutId::new("Well path", vec![[0.0, 0.0], [120.5, 40.0]])
    }

    #[test]
    fn test_add_update_remove() {
        let polylines = IntersectionPolylines::new();
        let changes = Rc::new(Cell::new(0));
        let c = Rc::clone(&changes);
        let _ = polylines.subscribe(move || c.set(c.get() + 1));

        let id = polylines.add(well_path());
        assert_eq!(polylines.polyline(id).unwrap().name, "Well path");

        polylines
            .update_polyline(id, IntersectionPolylineWithoutId::new("Renamed", vec![[1.0, 1.0]]))
            .unwrap();
        assert_eq!(polylines.polyline(id).unwrap().points, vec![[1.0, 1.0]]);
        assert!(polylines
            .update_polyline(Uuid::new_v4(), well_path())
            .is_err());

        assert!(polylines.remove(id));
        assert!(!polylines.remove(id));
        assert!(polylines.is_empty());
        assert_eq!(changes.get(), 3);
    }

    #[test]
    fn test_serialize_and_populate() {
        let source = UserCreatedItems::new();
        source.intersection_polylines().add(well_path());
        source.intersection_polylines().add(well_path());

        let target = UserCreatedItems::new();
        target
            .intersection_polylines()
            .populate_from_data(&source.intersection_polylines().serialize().unwrap())
            .unwrap();
        assert!(source.is_equal(&target).unwrap());
        assert_eq!(target.intersection_polylines().len(), 2);
        assert!(target
            .intersection_polylines()
            .populate_from_data("not json")
            .is_err());
    }
}
