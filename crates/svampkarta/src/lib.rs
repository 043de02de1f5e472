//! Min Svampkarta - Application Library
//!
//! Integrates the core library with on-disk storage and a command line front
//! end: adding and listing finds, clustering them for a map view, replaying
//! GPS tracks through the heading tracker, measuring routes and backups.

mod app;

pub use app::logging::setup_logging;
pub use app::state::MapState;
pub use app::storage::{FileStorage, StorageBackend, StorageError, default_storage_backend};
pub use app::{AppError, AppResult, ClickAction, Command, JsonLayerAdapter, Layer, Settings, run};
