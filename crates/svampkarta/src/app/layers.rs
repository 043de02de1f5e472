//! Map layers as JSON
//!
//! A [`RenderAdapter`] that describes every marker layer as a serializable
//! value, ready to hand to a web map or to print from the command line.

use serde::Serialize;
use svampkarta_lib::{
    Category, Cluster, ClusterAction, Marker, ProjectionError, RenderAdapter, ZoomSizes,
};

/// Where clicking a cluster takes the map
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClickAction {
    #[serde(rename_all = "camelCase")]
    ZoomTo { lat: f64, lng: f64, zoom: f64 },
    #[serde(rename_all = "camelCase")]
    FitBounds {
        south: f64,
        west: f64,
        north: f64,
        east: f64,
        max_zoom: f64,
    },
}

impl From<ClusterAction> for ClickAction {
    fn from(action: ClusterAction) -> Self {
        match action {
            ClusterAction::ZoomTo { center, zoom } => Self::ZoomTo {
                lat: center.y(),
                lng: center.x(),
                zoom,
            },
            ClusterAction::FitBounds { bounds, max_zoom } => Self::FitBounds {
                south: bounds.min().y,
                west: bounds.min().x,
                north: bounds.max().y,
                east: bounds.max().x,
                max_zoom,
            },
        }
    }
}

/// One drawable layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Layer {
    #[serde(rename_all = "camelCase")]
    Marker {
        id: u64,
        name: String,
        lat: f64,
        lng: f64,
        emoji: String,
        category: String,
        color: &'static str,
        abundance: [bool; 5],
        font_size: f64,
        pin_size: f64,
    },
    #[serde(rename_all = "camelCase")]
    Fallback {
        id: u64,
        name: String,
        lat: f64,
        lng: f64,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    Cluster {
        count: usize,
        lat: f64,
        lng: f64,
        members: Vec<u64>,
        on_click: ClickAction,
    },
}

/// Collects layers in drawing order
#[derive(Debug, Default)]
pub struct JsonLayerAdapter {
    layers: Vec<Layer>,
}

impl JsonLayerAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RenderAdapter for JsonLayerAdapter {
    type Output = Vec<Layer>;

    fn individual(&mut self, marker: &Marker, category: &Category, sizes: &ZoomSizes) {
        self.layers.push(Layer::Marker {
            id: marker.id,
            name: marker.name.clone(),
            lat: marker.lat,
            lng: marker.lng,
            emoji: category.emoji.clone(),
            category: category.id.clone(),
            color: category.color.scheme().primary,
            abundance: marker.abundance_dots(),
            font_size: sizes.font_size,
            pin_size: sizes.pin_size,
        });
    }

    fn fallback(&mut self, marker: &Marker, reason: &ProjectionError) {
        self.layers.push(Layer::Fallback {
            id: marker.id,
            name: marker.name.clone(),
            lat: marker.lat,
            lng: marker.lng,
            reason: reason.to_string(),
        });
    }

    fn cluster(&mut self, cluster: &Cluster<'_>, on_click: ClusterAction) {
        self.layers.push(Layer::Cluster {
            count: cluster.count(),
            lat: cluster.centroid.y(),
            lng: cluster.centroid.x(),
            members: cluster.members.iter().map(|m| m.id).collect(),
            on_click: on_click.into(),
        });
    }

    fn finish(self) -> Self::Output {
        self.layers
    }
}
