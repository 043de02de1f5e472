//! Walking directions from the user's position to a find or the parked car

use crate::utils::{bearing, haversine_distance, is_valid_position};
use crate::{CarLocation, Marker, MarkerStore, Result, SvampError};
use geo::Point;

/// What to walk to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationTarget {
    Marker(u64),
    Car,
}

/// Straight-line direction to a target
#[derive(Debug, Clone, PartialEq)]
pub struct Navigation {
    pub name: String,
    pub target: Point<f64>,
    pub distance_m: f64,
    /// Forward azimuth from the start, degrees clockwise from north
    pub bearing: f64,
}

impl Navigation {
    pub fn between(from: Point<f64>, name: impl Into<String>, target: Point<f64>) -> Self {
        Self {
            name: name.into(),
            target,
            distance_m: haversine_distance(from, target),
            bearing: bearing(from, target),
        }
    }

    /// Eight-point compass direction of the bearing
    pub fn compass(&self) -> &'static str {
        const POINTS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
        POINTS[((self.bearing / 45.0).round() as usize) % POINTS.len()]
    }
}

/// Resolve `target` and describe the way there from `from`
pub fn navigate(
    from: Point<f64>,
    target: NavigationTarget,
    markers: &MarkerStore,
    car_location: Option<&CarLocation>,
) -> Result<Navigation> {
    if !is_valid_position(&from) {
        return Err(SvampError::InvalidPosition {
            lat: from.y(),
            lng: from.x(),
        });
    }
    match target {
        NavigationTarget::Marker(id) => {
            let marker = markers.get(id).ok_or(SvampError::UnknownMarker(id))?;
            Ok(Navigation::between(from, marker.name.clone(), marker.position()))
        }
        NavigationTarget::Car => {
            let car = car_location.ok_or(SvampError::NoCarLocation)?;
            Ok(Navigation::between(from, "Bilen", car.position()))
        }
    }
}

/// Markers with their distance from `from`, nearest first
///
/// Ties keep the input order.
pub fn by_distance<'a, I>(from: Point<f64>, markers: I) -> Vec<(&'a Marker, f64)>
where
    I: IntoIterator<Item = &'a Marker>,
{
    let mut ranked: Vec<(&Marker, f64)> = markers
        .into_iter()
        .map(|m| (m, haversine_distance(from, m.position())))
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    ranked
}
