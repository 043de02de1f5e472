//! Finds and the in-memory marker list
//!
//! Field names serialize in the same shape the stored data and backups use
//! (`lat`, `lng`, `notes`, ...), so a `MarkerStore` can be written to and read
//! from storage without a separate DTO layer.

use crate::category::UNKNOWN_CATEGORY_ID;
use crate::{Result, SvampError};
use geo::Point;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Abundance used when a stored marker has none
pub const DEFAULT_ABUNDANCE: u8 = 3;

fn default_abundance() -> u8 {
    DEFAULT_ABUNDANCE
}

fn default_category() -> String {
    UNKNOWN_CATEGORY_ID.to_string()
}

/// A single find on the map
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: u64,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    /// Creation date, kept verbatim as entered/stored
    #[serde(default)]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// 1 (few) to 5 (many)
    #[serde(default = "default_abundance")]
    pub abundance: u8,
    /// Id into the category set
    #[serde(default = "default_category")]
    pub category: String,
}

impl Marker {
    /// Position as a `geo::Point` (x = longitude, y = latitude)
    #[inline]
    pub fn position(&self) -> Point<f64> {
        Point::new(self.lng, self.lat)
    }

    /// Which of the five abundance dots are filled
    pub fn abundance_dots(&self) -> [bool; 5] {
        let filled = self.abundance.clamp(1, 5) as usize;
        std::array::from_fn(|i| i < filled)
    }

    /// Key used to recognise the same find across backups
    fn merge_key(&self) -> (u64, u64, String) {
        (self.lat.to_bits(), self.lng.to_bits(), self.name.clone())
    }

    fn normalize(&mut self) {
        self.abundance = self.abundance.clamp(1, 5);
        if self.category.is_empty() {
            self.category = default_category();
        }
    }
}

/// User input for a new find
#[derive(Clone, Debug)]
pub struct NewMarker {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub date: String,
    pub notes: Option<String>,
    pub abundance: u8,
    pub category: String,
}

impl NewMarker {
    pub fn new(name: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            name: name.into(),
            lat,
            lng,
            date: String::new(),
            notes: None,
            abundance: DEFAULT_ABUNDANCE,
            category: default_category(),
        }
    }
}

/// Where the car is parked
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CarLocation {
    pub lat: f64,
    pub lng: f64,
}

impl CarLocation {
    #[inline]
    pub fn position(&self) -> Point<f64> {
        Point::new(self.lng, self.lat)
    }
}

/// Owner of all markers, mirrored to storage by the host on every change
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerStore {
    markers: Vec<Marker>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl MarkerStore {
    /// Build a store from previously saved markers
    ///
    /// Abundance is clamped and duplicate ids are renumbered so the store
    /// invariant (unique ids) holds from the start.
    pub fn new(markers: Vec<Marker>) -> Self {
        let mut store = Self::default();
        for marker in markers {
            store.insert(marker);
        }
        store
    }

    #[inline]
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Marker> {
        self.markers.iter().find(|m| m.id == id)
    }

    /// Next free id (one past the largest in use)
    pub fn next_id(&self) -> u64 {
        self.markers.iter().map(|m| m.id).max().map_or(1, |max| max + 1)
    }

    /// Most recently added find
    pub fn latest(&self) -> Option<&Marker> {
        self.markers.last()
    }

    /// Add a new find and return it
    pub fn add(&mut self, new: NewMarker) -> &Marker {
        let marker = Marker {
            id: self.next_id(),
            name: new.name.trim().to_string(),
            lat: new.lat,
            lng: new.lng,
            date: new.date,
            notes: new.notes.filter(|n| !n.trim().is_empty()),
            abundance: new.abundance,
            category: new.category,
        };
        tracing::debug!("Adding marker {} '{}'", marker.id, marker.name);
        self.insert(marker)
    }

    /// Apply an edit to an existing find
    pub fn update<F>(&mut self, id: u64, edit: F) -> Result<&Marker>
    where
        F: FnOnce(&mut Marker),
    {
        let marker = self
            .markers
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(SvampError::UnknownMarker(id))?;
        edit(marker);
        // The id is the store's, not the editor's
        marker.id = id;
        marker.normalize();
        Ok(&*marker)
    }

    /// Remove a find
    pub fn remove(&mut self, id: u64) -> Result<Marker> {
        let index = self
            .markers
            .iter()
            .position(|m| m.id == id)
            .ok_or(SvampError::UnknownMarker(id))?;
        Ok(self.markers.remove(index))
    }

    /// Move every marker in `from` to category `to`, returning how many changed
    pub fn reassign_category(&mut self, from: &str, to: &str) -> usize {
        let mut changed = 0;
        for marker in self.markers.iter_mut().filter(|m| m.category == from) {
            marker.category = to.to_string();
            changed += 1;
        }
        changed
    }

    /// Merge markers from another source, keeping existing finds
    ///
    /// A marker is considered already present when latitude, longitude and
    /// name all match. Incoming ids that collide with an existing id are
    /// renumbered. Returns the number of markers added.
    pub fn merge(&mut self, incoming: Vec<Marker>) -> usize {
        let mut known: HashSet<(u64, u64, String)> =
            self.markers.iter().map(Marker::merge_key).collect();
        let mut added = 0;
        for marker in incoming {
            if known.insert(marker.merge_key()) {
                self.insert(marker);
                added += 1;
            }
        }
        added
    }

    fn insert(&mut self, mut marker: Marker) -> &Marker {
        marker.normalize();
        if self.get(marker.id).is_some() {
            let id = self.next_id();
            tracing::warn!("Marker id {} already in use, renumbering to {}", marker.id, id);
            marker.id = id;
        }
        self.markers.push(marker);
        &self.markers[self.markers.len() - 1]
    }
}
