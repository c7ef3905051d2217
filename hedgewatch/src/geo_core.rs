use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProjectionError;

/// Latitude limit of the square Web Mercator world (atan(sinh(pi)) in degrees)
pub const MAX_MERCATOR_LATITUDE: f64 = 85.051_128_779_806_59;

/// Deepest zoom level the tile grid supports (2^30 columns still fits in a u32)
pub const MAX_ZOOM: u8 = 30;

/// WGS84 position submitted with a scan request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        GeoCoordinate {
            latitude,
            longitude,
        }
    }

    /// Tile containing this coordinate at `zoom`
    pub fn tile_index(&self, zoom: u8) -> Result<TileIndex, ProjectionError> {
        to_tile_index(self.latitude, self.longitude, zoom)
    }
}

/// Cell of the slippy-map grid at a given zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileIndex {
    pub zoom: u8,
    pub column: u32,
    pub row: u32,
}

impl TileIndex {
    pub fn new(zoom: u8, column: u32, row: u32) -> Self {
        TileIndex { zoom, column, row }
    }

    /// Number of tiles along one axis at this zoom
    pub fn tiles_per_axis(&self) -> u64 {
        1u64 << self.zoom
    }

    /// North-west corner of the tile
    pub fn north_west(&self) -> GeoCoordinate {
        tile_corner(self.column as f64, self.row as f64, self.zoom)
    }

    /// WGS84 extent covered by the tile
    pub fn bounds(&self) -> BoundingBox {
        let north_west = self.north_west();
        let south_east = tile_corner(self.column as f64 + 1.0, self.row as f64 + 1.0, self.zoom);

        BoundingBox::new(
            north_west.longitude,
            south_east.latitude,
            south_east.longitude,
            north_west.latitude,
        )
    }
}

impl fmt::Display for TileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.column, self.row)
    }
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64, // min longitude
    pub min_y: f64, // min latitude
    pub max_x: f64, // max longitude
    pub max_y: f64, // max latitude
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }
}

/// Convert a WGS84 coordinate to the slippy-map tile containing it.
///
/// Latitude is projected through the spherical Mercator transform, both axes
/// are normalised to [0, 1], scaled by 2^zoom and truncated. Inputs the
/// projection cannot represent (poles, non-finite values, longitudes outside
/// [-180, 180], zoom deeper than [`MAX_ZOOM`]) are rejected instead of
/// producing garbage indices.
pub fn to_tile_index(latitude: f64, longitude: f64, zoom: u8) -> Result<TileIndex, ProjectionError> {
    let out_of_range = || ProjectionError::OutOfProjectionRange {
        latitude,
        longitude,
        zoom,
    };

    if !latitude.is_finite() || !longitude.is_finite() || zoom > MAX_ZOOM {
        return Err(out_of_range());
    }
    if latitude.abs() > MAX_MERCATOR_LATITUDE || !(-180.0..=180.0).contains(&longitude) {
        return Err(out_of_range());
    }

    let n = (1u64 << zoom) as f64;
    let lat_rad = latitude.to_radians();

    let x = (longitude + 180.0) / 360.0 * n;
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n;

    if !x.is_finite() || !y.is_finite() {
        return Err(out_of_range());
    }

    // lon = 180 and lat = -MAX land exactly on the far edge
    let last = n - 1.0;
    let column = x.floor().clamp(0.0, last) as u32;
    let row = y.floor().clamp(0.0, last) as u32;

    Ok(TileIndex::new(zoom, column, row))
}

fn tile_corner(column: f64, row: f64, zoom: u8) -> GeoCoordinate {
    let n = (1u64 << zoom) as f64;
    let longitude = column / n * 360.0 - 180.0;
    let latitude = (PI * (1.0 - 2.0 * row / n)).sinh().atan().to_degrees();
    GeoCoordinate::new(latitude, longitude)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tile_at_zoom_18() {
        // Cork city centre
        let index = to_tile_index(51.8985, -8.4756, 18).unwrap();
        assert_eq!(index.zoom, 18);
        assert_eq!(index.column, 124900);
        assert_eq!(index.row, 86710);
    }

    #[test]
    fn test_zoom_zero_is_single_tile() {
        let index = to_tile_index(45.0, 120.0, 0).unwrap();
        assert_eq!((index.column, index.row), (0, 0));
    }

    #[test]
    fn test_indices_within_grid() {
        let latitudes = [-85.0, -60.5, -12.0, 0.0, 1e-9, 33.3, 70.0, 85.05];
        let longitudes = [-180.0, -179.999, -90.0, 0.0, 45.5, 179.999, 180.0];
        for zoom in [0u8, 1, 5, 12, 18, 22] {
            for lat in latitudes {
                for lon in longitudes {
                    let first = to_tile_index(lat, lon, zoom).unwrap();
                    let second = to_tile_index(lat, lon, zoom).unwrap();
                    assert_eq!(first, second);
                    let n = first.tiles_per_axis();
                    assert!((first.column as u64) < n, "column out of grid for {lat},{lon}@{zoom}");
                    assert!((first.row as u64) < n, "row out of grid for {lat},{lon}@{zoom}");
                }
            }
        }
    }

    #[test]
    fn test_polar_latitude_rejected() {
        for lat in [90.0, -90.0, 89.0, -85.1] {
            let err = to_tile_index(lat, 0.0, 10).unwrap_err();
            assert!(matches!(err, ProjectionError::OutOfProjectionRange { .. }));
        }
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(to_tile_index(f64::NAN, 0.0, 3).is_err());
        assert!(to_tile_index(10.0, f64::INFINITY, 3).is_err());
        assert!(to_tile_index(10.0, 180.5, 3).is_err());
        assert!(to_tile_index(10.0, 10.0, MAX_ZOOM + 1).is_err());
    }

    #[test]
    fn test_tile_bounds_contain_coordinate() {
        let coordinate = GeoCoordinate::new(51.8985, -8.4756);
        let index = coordinate.tile_index(18).unwrap();
        let bounds = index.bounds();
        assert!((bounds.min_x..=bounds.max_x).contains(&coordinate.longitude));
        assert!((bounds.min_y..=bounds.max_y).contains(&coordinate.latitude));
    }

    #[test]
    fn test_tile_display() {
        assert_eq!(TileIndex::new(18, 7, 9).to_string(), "18/7/9");
    }
}
