//! Persistent map state
//!
//! Finds, categories and the parked car live under separate storage keys and
//! are written back individually, so a command only rewrites what it changed.

use crate::app::storage::{
    CAR_LOCATION_KEY, CATEGORIES_KEY, MARKERS_KEY, StorageBackend, StorageResult,
    load_json_backend, save_json_backend,
};
use svampkarta_lib::{CarLocation, CategorySet, Marker, MarkerStore};

/// Everything the map shows that is not a map tile
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapState {
    pub markers: MarkerStore,
    pub categories: CategorySet,
    pub car_location: Option<CarLocation>,
}

impl MapState {
    /// Read all stored data; missing keys give an empty map with default categories
    ///
    /// Unreadable categories fall back to the defaults with a warning. Unreadable
    /// finds or car location are an error, so they are never overwritten.
    pub fn load(backend: &dyn StorageBackend) -> StorageResult<Self> {
        let markers: Vec<Marker> = load_json_backend(backend, MARKERS_KEY)?.unwrap_or_default();
        let car_location: Option<CarLocation> = load_json_backend(backend, CAR_LOCATION_KEY)?;

        let categories = match backend.get_string(CATEGORIES_KEY)? {
            Some(raw) => CategorySet::from_json(&raw).unwrap_or_else(|e| {
                tracing::warn!("Stored categories unreadable ({}), using defaults", e);
                CategorySet::default()
            }),
            None => CategorySet::default(),
        };

        let state = Self {
            markers: MarkerStore::new(markers),
            categories,
            car_location,
        };
        tracing::debug!(
            "Loaded {} finds, {} categories, car parked: {}",
            state.markers.len(),
            state.categories.categories().len(),
            state.car_location.is_some()
        );
        Ok(state)
    }

    pub fn save_markers(&self, backend: &dyn StorageBackend) -> StorageResult<()> {
        save_json_backend(backend, MARKERS_KEY, &self.markers)
    }

    pub fn save_categories(&self, backend: &dyn StorageBackend) -> StorageResult<()> {
        save_json_backend(backend, CATEGORIES_KEY, &self.categories.to_overrides())
    }

    /// Store the car location, or drop the key when nothing is parked
    pub fn save_car_location(&self, backend: &dyn StorageBackend) -> StorageResult<()> {
        match &self.car_location {
            Some(car) => save_json_backend(backend, CAR_LOCATION_KEY, car),
            None => backend.remove(CAR_LOCATION_KEY),
        }
    }

    pub fn save_all(&self, backend: &dyn StorageBackend) -> StorageResult<()> {
        self.save_markers(backend)?;
        self.save_categories(backend)?;
        self.save_car_location(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::storage::{FileStorage, StorageError};
    use svampkarta_lib::NewMarker;

    fn storage(dir: &tempfile::TempDir) -> FileStorage {
        FileStorage::new_with_path(Some(dir.path().join("storage.json"))).unwrap()
    }

    #[test]
    fn test_empty_storage_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let state = MapState::load(&storage(&dir)).unwrap();
        assert_eq!(state, MapState::default());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = storage(&dir);

        let mut state = MapState::default();
        state.markers.add(NewMarker::new("Kantarell", 59.3, 18.1));
        state.categories.add("Lingon", "🔴").unwrap();
        state.car_location = Some(CarLocation { lat: 59.0, lng: 18.0 });
        state.save_all(&backend).unwrap();

        let loaded = MapState::load(&storage(&dir)).unwrap();
        assert_eq!(loaded, state);

        state.car_location = None;
        state.save_car_location(&backend).unwrap();
        assert_eq!(backend.get_string(CAR_LOCATION_KEY).unwrap(), None);
    }

    #[test]
    fn test_legacy_category_array_loads() {
        let dir = tempfile::tempdir().unwrap();
        let backend = storage(&dir);
        backend
            .set_string(
                CATEGORIES_KEY,
                r#"[{"id": "lingon", "name": "Lingon", "emoji": "🔴", "color": "red"}]"#,
            )
            .unwrap();
        let state = MapState::load(&backend).unwrap();
        assert!(state.categories.contains("lingon"));
        assert!(state.categories.contains("mushroom"));
    }

    #[test]
    fn test_unreadable_categories_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let backend = storage(&dir);
        backend.set_string(CATEGORIES_KEY, "42").unwrap();
        let state = MapState::load(&backend).unwrap();
        assert_eq!(state.categories, svampkarta_lib::CategorySet::default());
    }

    #[test]
    fn test_unreadable_markers_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = storage(&dir);
        backend.set_string(MARKERS_KEY, "{broken").unwrap();
        assert!(matches!(
            MapState::load(&backend),
            Err(StorageError::Json(_))
        ));
    }
}
