//! Rendering adapter boundary
//!
//! Clustering produces [`RenderInstruction`]s; a [`RenderAdapter`] turns them
//! into whatever the host map library needs (layers, shapes, JSON, ...). This
//! keeps the algorithm free of any particular mapping library.

use crate::cluster::{Cluster, ClusterAction, ClusterConfig, ClusterPass, MarkerStyle, ProjectionError};
use crate::{Category, CategorySet, Marker, RenderInstruction};

/// Label and pin sizes that grow with zoom
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomSizes {
    pub font_size: f64,
    pub padding: f64,
    pub dot_size: f64,
    pub pin_size: f64,
}

impl ZoomSizes {
    /// Zoom at which the base sizes apply
    pub const BASE_ZOOM: f64 = 13.0;
    /// Growth per zoom level
    pub const GROWTH: f64 = 1.15;

    pub fn for_zoom(zoom: f64) -> Self {
        let scale = Self::GROWTH.powf(zoom - Self::BASE_ZOOM);
        Self {
            font_size: (13.0 * scale).clamp(10.0, 16.0),
            padding: (4.0 * scale).clamp(2.0, 6.0),
            dot_size: (5.0 * scale).clamp(3.0, 7.0),
            pin_size: (12.0 * scale).clamp(8.0, 16.0),
        }
    }
}

/// Backend that draws one clustering pass
pub trait RenderAdapter {
    /// What the adapter hands back once the pass is drawn
    type Output;

    /// A marker drawn with full styling
    fn individual(&mut self, marker: &Marker, category: &Category, sizes: &ZoomSizes);

    /// A marker that could not be projected and gets the simplified icon
    fn fallback(&mut self, marker: &Marker, reason: &ProjectionError);

    /// A count badge for two or more markers
    fn cluster(&mut self, cluster: &Cluster<'_>, on_click: ClusterAction);

    fn finish(self) -> Self::Output;
}

/// Feed every instruction of `pass` to `adapter`
///
/// Categories are resolved here so adapters never see an unknown id; unknown
/// ids get a placeholder category.
pub fn render_instructions<A: RenderAdapter>(
    pass: &ClusterPass<'_>,
    categories: &CategorySet,
    zoom: f64,
    config: &ClusterConfig,
    mut adapter: A,
) -> A::Output {
    #[cfg(feature = "profiling")]
    profiling::scope!("render::render_instructions");

    let sizes = ZoomSizes::for_zoom(zoom);
    for instruction in &pass.instructions {
        match instruction {
            RenderInstruction::Individual {
                marker,
                style: MarkerStyle::Full,
            } => {
                let category = categories.resolve(&marker.category);
                adapter.individual(marker, &category, &sizes);
            }
            RenderInstruction::Individual {
                marker,
                style: MarkerStyle::Fallback(reason),
            } => adapter.fallback(marker, reason),
            RenderInstruction::Cluster(cluster) => {
                adapter.cluster(cluster, cluster.click_action(zoom, config));
            }
        }
    }
    adapter.finish()
}
