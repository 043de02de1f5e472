//! Distance measuring tool and its GPX exchange format

use crate::utils::{format_distance, path_length};
use crate::{Result, SvampError};
use geo::Point;
use gpx::{Gpx, GpxVersion, Metadata, Track, TrackSegment, Waypoint};
use std::io::{Read, Write};

/// Name of a fresh route
pub const DEFAULT_ROUTE_NAME: &str = "Min rutt";
/// Name of an imported route whose track has none
pub const IMPORTED_ROUTE_NAME: &str = "Importerad rutt";
/// `creator` attribute of exported files
pub const GPX_CREATOR: &str = "Svampkartan - Min Svampkarta";

/// A polyline drawn point by point on the map
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureRoute {
    pub name: String,
    points: Vec<Point<f64>>,
}

impl Default for MeasureRoute {
    fn default() -> Self {
        Self::new(DEFAULT_ROUTE_NAME)
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl MeasureRoute {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points: Vec::new(),
        }
    }

    pub fn add_point(&mut self, lat: f64, lng: f64) {
        self.points.push(Point::new(lng, lat));
    }

    /// Remove the most recent point
    pub fn undo_last(&mut self) -> Option<Point<f64>> {
        self.points.pop()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Points in drawing order (x = longitude, y = latitude)
    #[inline]
    pub fn points(&self) -> &[Point<f64>] {
        &self.points
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sum of the great-circle legs in meters
    pub fn total_distance_m(&self) -> f64 {
        path_length(&self.points)
    }

    /// Build a GPX 1.1 document with one track holding every point
    pub fn to_gpx(&self) -> Result<Gpx> {
        if self.points.len() < 2 {
            return Err(SvampError::TooFewPoints {
                required: 2,
                actual: self.points.len(),
            });
        }
        let distance = format_distance(self.total_distance_m());

        let mut metadata = Metadata::default();
        metadata.name = Some(self.name.clone());
        metadata.description = Some(format!(
            "Mätlinje skapad i Svampkartan - Total distans: {}",
            distance
        ));

        let mut segment = TrackSegment::default();
        for (i, point) in self.points.iter().enumerate() {
            let mut waypoint = Waypoint::new(*point);
            waypoint.name = Some(format!("Punkt {}", i + 1));
            segment.points.push(waypoint);
        }

        let mut track = Track::default();
        track.name = Some(self.name.clone());
        track.description = Some(format!("Totalt {} punkter, {}", self.points.len(), distance));
        track.segments.push(segment);

        Ok(Gpx {
            version: GpxVersion::Gpx11,
            creator: Some(GPX_CREATOR.to_string()),
            metadata: Some(metadata),
            tracks: vec![track],
            ..Default::default()
        })
    }

    /// Collect every track point of a document, across all tracks and segments
    pub fn from_gpx(gpx: &Gpx) -> Result<Self> {
        let points: Vec<Point<f64>> = gpx
            .tracks
            .iter()
            .flat_map(|track| &track.segments)
            .flat_map(|segment| &segment.points)
            .map(Waypoint::point)
            .collect();
        if points.is_empty() {
            return Err(SvampError::NoTrackPoints);
        }
        let name = gpx
            .tracks
            .first()
            .and_then(|track| track.name.clone())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| IMPORTED_ROUTE_NAME.to_string());
        tracing::info!("Imported route '{}' with {} points", name, points.len());
        Ok(Self { name, points })
    }

    pub fn write_gpx<W: Write>(&self, writer: W) -> Result<()> {
        let gpx = self.to_gpx()?;
        gpx::write(&gpx, writer)?;
        Ok(())
    }

    pub fn read_gpx<R: Read>(reader: R) -> Result<Self> {
        let gpx = gpx::read(reader)?;
        Self::from_gpx(&gpx)
    }

    /// Download name: whitespace in the route name becomes `_`
    pub fn file_name(&self, timestamp_ms: u64) -> String {
        let name: String = self
            .name
            .chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect();
        format!("svampkartan_{}_{}.gpx", name, timestamp_ms)
    }
}
