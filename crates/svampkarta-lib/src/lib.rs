//! Svampkarta Library - Core logic for a personal mushroom and berry map
//!
//! This library holds everything in the map application that is not a widget:
//! the find/category data model, screen-space marker clustering, GPS movement
//! and heading tracking, the distance measuring tool and backup formats.
//!
//! # Architecture
//!
//! - **[`Marker`] / [`MarkerStore`]**: user finds and their in-memory list
//! - **[`CategorySet`]**: default and user-defined categories
//! - **[`cluster_markers`]**: grid bucketing of visible markers into [`RenderInstruction`]s
//! - **[`RenderAdapter`]**: swappable backend turning instructions into map layers
//! - **[`MovementTracker`]**: jitter-filtered movement detection and smoothed heading
//! - **[`feed`]**: position sample stream with an unsubscribe handle
//! - **[`navigate`]**: distance and bearing to a find or the parked car
//! - **[`MeasureRoute`]**: distance measuring with GPX import/export
//! - **[`Backup`]**: JSON backup export and tolerant import
//!
//! None of the clustering or tracking code touches a map library directly; hosts
//! provide a [`Projector`] and consume plain data.

mod backup;
mod category;
mod cluster;
pub mod feed;
mod filter;
mod measure;
mod model;
mod navigation;
mod projection;
mod render;
mod tracker;
pub mod utils;

// Public API exports
pub use backup::{APP_NAME, BACKUP_VERSION, Backup, ImportSummary};
pub use category::{Category, CategoryColor, CategoryOverrides, CategorySet, ColorScheme, slug};
pub use cluster::{
    Cluster, ClusterAction, ClusterConfig, ClusterPass, MarkerStyle, ProjectionError, Projector,
    RenderInstruction, cluster_markers,
};
pub use filter::MarkerFilter;
pub use measure::MeasureRoute;
pub use model::{CarLocation, DEFAULT_ABUNDANCE, Marker, MarkerStore, NewMarker};
pub use navigation::{Navigation, NavigationTarget, by_distance, navigate};
pub use projection::WebMercatorProjector;
pub use render::{RenderAdapter, ZoomSizes, render_instructions};
pub use tracker::{
    HeadingState, Indicator, MovementTracker, PositionSample, Timestamp, TrackerConfig,
    TrackerUpdate, process_sample,
};

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum SvampError {
    #[error("Category name is empty")]
    EmptyCategoryName,

    #[error("A category with id '{0}' already exists")]
    DuplicateCategory(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Unknown marker: {0}")]
    UnknownMarker(u64),

    #[error("Not a valid position: {lat}, {lng}")]
    InvalidPosition { lat: f64, lng: f64 },

    #[error("No car location is saved")]
    NoCarLocation,

    #[error("Invalid backup: {0}")]
    InvalidBackup(String),

    #[error("Route needs at least {required} points, got {actual}")]
    TooFewPoints { required: usize, actual: usize },

    #[error("No track points found in GPX data")]
    NoTrackPoints,

    #[error("GPX error: {0}")]
    Gpx(#[from] gpx::errors::GpxError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SvampError>;
