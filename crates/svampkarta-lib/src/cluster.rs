//! Screen-space marker clustering
//!
//! At low zoom, or when many markers are visible, markers are bucketed into a
//! square pixel grid and every cell with more than one member is drawn as a
//! single badge. Clusters are rebuilt from scratch on every pass; nothing is
//! cached between passes, so there is no cluster state to go stale.
//!
//! The output is plain data ([`RenderInstruction`]); drawing it is the job of a
//! [`crate::RenderAdapter`].

use crate::Marker;
use geo::{Coord, Point, Rect};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Why a marker could not be placed on screen
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProjectionError {
    #[error("Map is not ready for projection")]
    MapNotReady,

    #[error("Non-finite coordinate: ({lat}, {lng})")]
    NonFinite { lat: f64, lng: f64 },

    #[error("Latitude {lat} is outside the projectable range")]
    OutOfRange { lat: f64 },
}

/// Maps a geographic position to current screen pixels
pub trait Projector {
    /// Project `position` (x = longitude, y = latitude) to screen pixels
    fn project(&self, position: Point<f64>) -> Result<Coord<f64>, ProjectionError>;
}

impl<F> Projector for F
where
    F: Fn(Point<f64>) -> Result<Coord<f64>, ProjectionError>,
{
    fn project(&self, position: Point<f64>) -> Result<Coord<f64>, ProjectionError> {
        self(position)
    }
}

/// Configuration for clustering decisions and cluster interactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Cluster whenever at least this many markers are visible
    pub min_count: usize,
    /// Cluster regardless of count at or below this zoom
    pub always_cluster_zoom: f64,
    /// Never cluster at or above this zoom
    pub disable_zoom: f64,
    /// Smallest grid cell in pixels
    pub min_cell_size: f64,
    /// Cell size in pixels at `reference_zoom`
    pub base_cell_size: f64,
    /// Zoom at which cells are `base_cell_size` wide
    pub reference_zoom: f64,
    /// Fraction of the member bounds added on each side when fitting a cluster
    pub fit_padding: f64,
    /// Maximum zoom when fitting a cluster's bounds
    pub fit_max_zoom: f64,
    /// Zoom increment when a single-member cluster is clicked
    pub zoom_step: f64,
    /// Upper zoom limit of the map
    pub max_zoom: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_count: 50,
            always_cluster_zoom: 10.0,
            disable_zoom: 15.0,
            min_cell_size: 40.0,
            base_cell_size: 60.0,
            reference_zoom: 11.0,
            fit_padding: 0.2,
            fit_max_zoom: 17.0,
            zoom_step: 3.0,
            max_zoom: 18.0,
        }
    }
}

impl ClusterConfig {
    /// Whether a pass with `count` visible markers at `zoom` clusters at all
    pub fn should_cluster(&self, count: usize, zoom: f64) -> bool {
        (count >= self.min_count || zoom <= self.always_cluster_zoom) && zoom < self.disable_zoom
    }

    /// Grid cell size in pixels; cells shrink as the map zooms in
    pub fn cell_size(&self, zoom: f64) -> f64 {
        let scaled = (self.base_cell_size * (self.reference_zoom / zoom.max(1.0))).round();
        scaled.max(self.min_cell_size)
    }
}

/// How an individually drawn marker should look
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerStyle {
    /// The regular pin with name, emoji and abundance dots
    Full,
    /// Simplified icon for markers that could not be projected
    Fallback(ProjectionError),
}

/// A group of at least two markers sharing a grid cell
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster<'a> {
    /// Mean of the members' raw latitude/longitude
    pub centroid: Point<f64>,
    pub members: Vec<&'a Marker>,
}

/// What happens when a cluster badge is clicked
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterAction {
    /// Center on a position at the given zoom
    ZoomTo { center: Point<f64>, zoom: f64 },
    /// Fit the map to these bounds (x = longitude, y = latitude)
    FitBounds { bounds: Rect<f64>, max_zoom: f64 },
}

impl Cluster<'_> {
    #[inline]
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Bounding box of all members (x = longitude, y = latitude)
    pub fn bounds(&self) -> Rect<f64> {
        let mut min = Coord {
            x: f64::INFINITY,
            y: f64::INFINITY,
        };
        let mut max = Coord {
            x: f64::NEG_INFINITY,
            y: f64::NEG_INFINITY,
        };
        for marker in &self.members {
            min.x = min.x.min(marker.lng);
            min.y = min.y.min(marker.lat);
            max.x = max.x.max(marker.lng);
            max.y = max.y.max(marker.lat);
        }
        Rect::new(min, max)
    }

    /// Resolve a click on this cluster at the current zoom
    pub fn click_action(&self, zoom: f64, config: &ClusterConfig) -> ClusterAction {
        if self.count() <= 1 {
            return ClusterAction::ZoomTo {
                center: self.centroid,
                zoom: (zoom + config.zoom_step).min(config.max_zoom),
            };
        }
        let bounds = self.bounds();
        let pad_x = bounds.width() * config.fit_padding;
        let pad_y = bounds.height() * config.fit_padding;
        ClusterAction::FitBounds {
            bounds: Rect::new(
                Coord {
                    x: bounds.min().x - pad_x,
                    y: bounds.min().y - pad_y,
                },
                Coord {
                    x: bounds.max().x + pad_x,
                    y: bounds.max().y + pad_y,
                },
            ),
            max_zoom: config.fit_max_zoom,
        }
    }
}

/// One thing to draw on the marker layer
#[derive(Debug, Clone, PartialEq)]
pub enum RenderInstruction<'a> {
    Individual {
        marker: &'a Marker,
        style: MarkerStyle,
    },
    Cluster(Cluster<'a>),
}

impl<'a> RenderInstruction<'a> {
    /// Markers this instruction stands for
    pub fn markers(&self) -> Vec<&'a Marker> {
        match self {
            Self::Individual { marker, .. } => vec![*marker],
            Self::Cluster(cluster) => cluster.members.clone(),
        }
    }
}

/// Result of one clustering pass
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterPass<'a> {
    /// Whether the grid was used at all
    pub clustered: bool,
    /// Grid cell size in pixels when clustered
    pub cell_size: Option<f64>,
    pub instructions: Vec<RenderInstruction<'a>>,
}

impl<'a> ClusterPass<'a> {
    /// Every marker covered by this pass, in instruction order
    pub fn markers(&self) -> Vec<&'a Marker> {
        self.instructions
            .iter()
            .flat_map(RenderInstruction::markers)
            .collect()
    }

    pub fn cluster_count(&self) -> usize {
        self.instructions
            .iter()
            .filter(|i| matches!(i, RenderInstruction::Cluster(_)))
            .count()
    }
}

/// Accumulator for one grid cell
struct GridCell<'a> {
    lat_sum: f64,
    lng_sum: f64,
    members: Vec<&'a Marker>,
}

impl<'a> GridCell<'a> {
    fn into_instruction(self) -> RenderInstruction<'a> {
        if self.members.len() == 1 {
            return RenderInstruction::Individual {
                marker: self.members[0],
                style: MarkerStyle::Full,
            };
        }
        let count = self.members.len() as f64;
        RenderInstruction::Cluster(Cluster {
            centroid: Point::new(self.lng_sum / count, self.lat_sum / count),
            members: self.members,
        })
    }
}

/// Slot in the output, kept in order of first appearance
enum Slot<'a> {
    Fallback(&'a Marker, ProjectionError),
    Cell(usize),
}

/// Decide how to draw the visible markers at `zoom`
///
/// Every input marker appears in exactly one instruction: as an individual
/// marker, as a member of a cluster, or as a fallback when projection fails.
pub fn cluster_markers<'a, P>(
    markers: &[&'a Marker],
    zoom: f64,
    projector: &P,
    config: &ClusterConfig,
) -> ClusterPass<'a>
where
    P: Projector + ?Sized,
{
    #[cfg(feature = "profiling")]
    profiling::scope!("cluster::cluster_markers");

    if !config.should_cluster(markers.len(), zoom) {
        return ClusterPass {
            clustered: false,
            cell_size: None,
            instructions: markers
                .iter()
                .map(|&marker| RenderInstruction::Individual {
                    marker,
                    style: MarkerStyle::Full,
                })
                .collect(),
        };
    }

    let cell_size = config.cell_size(zoom);
    let mut cells: Vec<GridCell<'a>> = Vec::new();
    let mut cell_index: HashMap<(i64, i64), usize> = HashMap::new();
    let mut slots: Vec<Slot<'a>> = Vec::with_capacity(markers.len());

    for &marker in markers {
        let screen = match projector.project(marker.position()) {
            Ok(screen) => screen,
            Err(err) => {
                tracing::debug!("Projection failed for marker {}: {}", marker.id, err);
                slots.push(Slot::Fallback(marker, err));
                continue;
            }
        };

        let key = (
            (screen.x / cell_size).floor() as i64,
            (screen.y / cell_size).floor() as i64,
        );
        let index = *cell_index.entry(key).or_insert_with(|| {
            cells.push(GridCell {
                lat_sum: 0.0,
                lng_sum: 0.0,
                members: Vec::new(),
            });
            slots.push(Slot::Cell(cells.len() - 1));
            cells.len() - 1
        });

        let cell = &mut cells[index];
        cell.lat_sum += marker.lat;
        cell.lng_sum += marker.lng;
        cell.members.push(marker);
    }

    let mut cells: Vec<Option<GridCell<'a>>> = cells.into_iter().map(Some).collect();
    let instructions: Vec<RenderInstruction<'a>> = slots
        .into_iter()
        .filter_map(|slot| match slot {
            Slot::Fallback(marker, err) => Some(RenderInstruction::Individual {
                marker,
                style: MarkerStyle::Fallback(err),
            }),
            Slot::Cell(index) => cells[index].take().map(GridCell::into_instruction),
        })
        .collect();

    tracing::trace!(
        "Clustered {} markers into {} instructions (cell {}px, zoom {})",
        markers.len(),
        instructions.len(),
        cell_size,
        zoom
    );

    ClusterPass {
        clustered: true,
        cell_size: Some(cell_size),
        instructions,
    }
}
