//! Web Mercator screen projection for 256 px slippy-map tiles

use crate::cluster::{ProjectionError, Projector};
use crate::utils::{self, EARTH_MERCATOR_MAX, EARTH_SIZE_METERS, MAX_LATITUDE};
use geo::{Coord, Point, Rect};

/// Tile edge length in pixels
pub const TILE_SIZE: f64 = 256.0;

/// Projects positions to pixels of a viewport showing the map at `zoom`
///
/// Pixel (0, 0) is the top-left corner of the viewport, matching how map
/// libraries report layer points.
#[derive(Debug, Clone, PartialEq)]
pub struct WebMercatorProjector {
    zoom: f64,
    /// World pixel at the viewport's top-left corner; `None` until the map has a view
    origin: Option<Coord<f64>>,
    viewport: (f64, f64),
}

impl WebMercatorProjector {
    /// Projector for a viewport of `width` x `height` pixels centered on `center`
    pub fn new(zoom: f64, center: Point<f64>, width: f64, height: f64) -> Self {
        let scale = Self::world_size(zoom);
        let center_px = Self::world_pixel(center, scale);
        Self {
            zoom,
            origin: Some(Coord {
                x: center_px.x - width / 2.0,
                y: center_px.y - height / 2.0,
            }),
            viewport: (width, height),
        }
    }

    /// Projector for a map without a view yet; every projection fails
    pub fn not_ready(zoom: f64) -> Self {
        Self {
            zoom,
            origin: None,
            viewport: (0.0, 0.0),
        }
    }

    #[inline]
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Size of the whole world in pixels at `zoom`
    #[inline]
    fn world_size(zoom: f64) -> f64 {
        TILE_SIZE * 2f64.powf(zoom)
    }

    fn world_pixel(position: Point<f64>, scale: f64) -> Coord<f64> {
        let mercator = utils::wgs84_to_mercator(position.y(), position.x());
        Coord {
            x: (mercator.x() + EARTH_MERCATOR_MAX) / EARTH_SIZE_METERS * scale,
            y: (EARTH_MERCATOR_MAX - mercator.y()) / EARTH_SIZE_METERS * scale,
        }
    }

    /// Inverse projection from viewport pixels to a position
    pub fn unproject(&self, screen: Coord<f64>) -> Result<Point<f64>, ProjectionError> {
        let origin = self.origin.ok_or(ProjectionError::MapNotReady)?;
        let scale = Self::world_size(self.zoom);
        let mercator_x = (origin.x + screen.x) / scale * EARTH_SIZE_METERS - EARTH_MERCATOR_MAX;
        let mercator_y = EARTH_MERCATOR_MAX - (origin.y + screen.y) / scale * EARTH_SIZE_METERS;
        let (lat, lng) = utils::mercator_to_wgs84(mercator_x, mercator_y);
        Ok(Point::new(lng, lat))
    }

    /// Geographic bounds of the viewport (x = longitude, y = latitude)
    pub fn visible_bounds(&self) -> Result<Rect<f64>, ProjectionError> {
        let (width, height) = self.viewport;
        let top_left = self.unproject(Coord { x: 0.0, y: 0.0 })?;
        let bottom_right = self.unproject(Coord {
            x: width,
            y: height,
        })?;
        Ok(Rect::new(top_left.0, bottom_right.0))
    }
}

impl Projector for WebMercatorProjector {
    fn project(&self, position: Point<f64>) -> Result<Coord<f64>, ProjectionError> {
        let origin = self.origin.ok_or(ProjectionError::MapNotReady)?;
        let (lng, lat) = (position.x(), position.y());
        if !lat.is_finite() || !lng.is_finite() {
            return Err(ProjectionError::NonFinite { lat, lng });
        }
        if lat.abs() > MAX_LATITUDE {
            return Err(ProjectionError::OutOfRange { lat });
        }
        let world = Self::world_pixel(position, Self::world_size(self.zoom));
        Ok(Coord {
            x: world.x - origin.x,
            y: world.y - origin.y,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_projects_to_viewport_middle() {
        let center = Point::new(18.07, 59.33);
        let projector = WebMercatorProjector::new(12.0, center, 800.0, 600.0);
        let screen = projector.project(center).unwrap();
        assert!((screen.x - 400.0).abs() < 1e-6);
        assert!((screen.y - 300.0).abs() < 1e-6);
    }

    #[test]
    fn test_world_origin_at_zoom_zero() {
        let projector = WebMercatorProjector::new(0.0, Point::new(0.0, 0.0), 256.0, 256.0);
        let screen = projector.project(Point::new(0.0, 0.0)).unwrap();
        assert!((screen.x - 128.0).abs() < 1e-6);
        assert!((screen.y - 128.0).abs() < 1e-6);

        let east = projector.project(Point::new(90.0, 0.0)).unwrap();
        assert!((east.x - 192.0).abs() < 1e-6);
    }

    #[test]
    fn test_north_is_up() {
        let projector = WebMercatorProjector::new(10.0, Point::new(18.0, 59.0), 512.0, 512.0);
        let south = projector.project(Point::new(18.0, 58.99)).unwrap();
        let north = projector.project(Point::new(18.0, 59.01)).unwrap();
        assert!(north.y < south.y);
    }

    #[test]
    fn test_unproject_roundtrip() {
        let projector = WebMercatorProjector::new(13.5, Point::new(14.5, 63.2), 1024.0, 768.0);
        let position = Point::new(14.52, 63.19);
        let screen = projector.project(position).unwrap();
        let back = projector.unproject(screen).unwrap();
        assert!((back.x() - position.x()).abs() < 1e-9);
        assert!((back.y() - position.y()).abs() < 1e-9);
    }

    #[test]
    fn test_visible_bounds_contain_center() {
        let center = Point::new(18.07, 59.33);
        let projector = WebMercatorProjector::new(12.0, center, 800.0, 600.0);
        let bounds = projector.visible_bounds().unwrap();
        assert!(bounds.min().x < center.x() && center.x() < bounds.max().x);
        assert!(bounds.min().y < center.y() && center.y() < bounds.max().y);
    }

    #[test]
    fn test_projection_failures() {
        let not_ready = WebMercatorProjector::not_ready(10.0);
        assert_eq!(
            not_ready.project(Point::new(18.0, 59.0)),
            Err(ProjectionError::MapNotReady)
        );

        let projector = WebMercatorProjector::new(10.0, Point::new(0.0, 0.0), 100.0, 100.0);
        assert!(matches!(
            projector.project(Point::new(f64::NAN, 10.0)),
            Err(ProjectionError::NonFinite { .. })
        ));
        assert_eq!(
            projector.project(Point::new(0.0, 89.0)),
            Err(ProjectionError::OutOfRange { lat: 89.0 })
        );
    }
}
