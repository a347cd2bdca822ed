//! Spatial operations: H3-based geographic indexing and distance calculations.
//!
//! This module provides:
//!
//! - **GeoIndex**: lat/lng ↔ H3 cell conversion at the configured resolution
//! - **Neighbor enumeration**: the ring of cells around an origin
//! - **Bounding-box tiling**: deterministic cover of a box with unique cells
//! - **Distance calculations**: Haversine distance in kilometres
//!
//! Default resolution is 9 (~240m cell size), suitable for city-scale demand
//! aggregation.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::{Mutex, OnceLock};

use h3o::{CellIndex, LatLng, Resolution};
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::error::ForecastError;

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometres per degree of latitude.
const KM_PER_DEGREE: f64 = 111.0;

/// Average H3 hexagon edge length in km, indexed by resolution 0-15.
/// Used to pick a raster step smaller than a cell's in-radius when tiling.
const AVG_EDGE_KM: [f64; 16] = [
    1107.712591,
    418.676006,
    158.244656,
    59.810858,
    22.606379,
    8.544408,
    3.229483,
    1.220630,
    0.461355,
    0.174376,
    0.065908,
    0.024911,
    0.009416,
    0.003560,
    0.001349,
    0.000510,
];

/// Geographic bounding box in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
}

impl BoundingBox {
    pub fn new(
        lat_min: f64,
        lat_max: f64,
        lng_min: f64,
        lng_max: f64,
    ) -> Result<Self, ForecastError> {
        let bounds = Self {
            lat_min,
            lat_max,
            lng_min,
            lng_max,
        };
        bounds.validate()?;
        Ok(bounds)
    }

    pub fn validate(&self) -> Result<(), ForecastError> {
        if !coords_in_range(self.lat_min, self.lng_min)
            || !coords_in_range(self.lat_max, self.lng_max)
        {
            return Err(ForecastError::InvalidBBox(format!(
                "corners outside WGS84 bounds: [{}, {}] x [{}, {}]",
                self.lat_min, self.lat_max, self.lng_min, self.lng_max
            )));
        }
        if self.lat_min >= self.lat_max || self.lng_min >= self.lng_max {
            return Err(ForecastError::InvalidBBox(format!(
                "degenerate box: [{}, {}] x [{}, {}]",
                self.lat_min, self.lat_max, self.lng_min, self.lng_max
            )));
        }
        Ok(())
    }

    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.lat_min && lat <= self.lat_max && lng >= self.lng_min && lng <= self.lng_max
    }

    /// Box grown by `margin_km` on every side, clamped to valid coordinates.
    pub fn expanded(&self, margin_km: f64) -> BoundingBox {
        let lat_margin = margin_km / KM_PER_DEGREE;
        let mid_lat = (self.lat_min + self.lat_max) / 2.0;
        let lng_margin = margin_km / (KM_PER_DEGREE * mid_lat.to_radians().cos().max(0.01));
        BoundingBox {
            lat_min: (self.lat_min - lat_margin).max(-90.0),
            lat_max: (self.lat_max + lat_margin).min(90.0),
            lng_min: (self.lng_min - lng_margin).max(-180.0),
            lng_max: (self.lng_max + lng_margin).min(180.0),
        }
    }
}

fn coords_in_range(lat: f64, lng: f64) -> bool {
    lat.is_finite()
        && lng.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lng)
}

/// H3 index configured at the demand resolution.
#[derive(Debug, Clone, Copy)]
pub struct GeoIndex {
    resolution: Resolution,
}

impl GeoIndex {
    pub fn new(resolution: Resolution) -> Self {
        Self { resolution }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Cell containing the coordinate pair. Deterministic for a fixed
    /// resolution; rejects out-of-range coordinates.
    pub fn cell_at(&self, lat: f64, lng: f64) -> Result<CellIndex, ForecastError> {
        if !coords_in_range(lat, lng) {
            return Err(ForecastError::invalid_location(lat, lng));
        }
        let coord = LatLng::new(lat, lng)
            .map_err(|_| ForecastError::invalid_location(lat, lng))?;
        Ok(coord.to_cell(self.resolution))
    }

    /// Center of a cell as (lat, lng) in decimal degrees.
    pub fn center_of(&self, cell: CellIndex) -> (f64, f64) {
        let coord: LatLng = cell.into();
        (coord.lat(), coord.lng())
    }

    /// The ring of cells around `origin` (6 for hexagons, 5 at a pentagon),
    /// sorted for a stable order.
    pub fn neighbors_of(&self, origin: CellIndex) -> Vec<CellIndex> {
        let mut ring: Vec<CellIndex> = origin
            .grid_disk::<Vec<_>>(1)
            .into_iter()
            .filter(|cell| *cell != origin)
            .collect();
        ring.sort_unstable();
        ring
    }

    /// Deterministic cover of the bounding box with unique cells.
    ///
    /// Rasterizes at half the average edge length (well below a hexagon's
    /// in-radius) so every cell whose center lies inside the box is hit at
    /// least once, including at the box corners. Results are cached per
    /// quantized box.
    pub fn tile(&self, bounds: &BoundingBox) -> Result<Vec<CellIndex>, ForecastError> {
        bounds.validate()?;

        let key = tile_cache_key(bounds, self.resolution);
        {
            let mut cache = tile_cache().lock().unwrap();
            if let Some(cells) = cache.get(&key) {
                return Ok(cells.clone());
            }
        }

        let cells = self.tile_uncached(bounds);
        let mut cache = tile_cache().lock().unwrap();
        cache.put(key, cells.clone());
        Ok(cells)
    }

    fn tile_uncached(&self, bounds: &BoundingBox) -> Vec<CellIndex> {
        let edge_km = AVG_EDGE_KM[u8::from(self.resolution) as usize];
        let lat_step = edge_km * 0.5 / KM_PER_DEGREE;
        let mid_lat = (bounds.lat_min + bounds.lat_max) / 2.0;
        let lng_step = lat_step / mid_lat.to_radians().cos().max(0.01);

        let lat_steps = ((bounds.lat_max - bounds.lat_min) / lat_step).ceil() as usize;
        let lng_steps = ((bounds.lng_max - bounds.lng_min) / lng_step).ceil() as usize;

        let mut unique = BTreeSet::new();
        for i in 0..=lat_steps {
            let lat = (bounds.lat_min + i as f64 * lat_step).min(bounds.lat_max);
            for j in 0..=lng_steps {
                let lng = (bounds.lng_min + j as f64 * lng_step).min(bounds.lng_max);
                if let Ok(coord) = LatLng::new(lat, lng) {
                    unique.insert(coord.to_cell(self.resolution));
                }
            }
        }
        unique.into_iter().collect()
    }
}

impl Default for GeoIndex {
    fn default() -> Self {
        Self {
            resolution: Resolution::Nine,
        }
    }
}

/// Great-circle distance between two coordinate pairs, in kilometres.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let (phi1, lam1) = (lat1.to_radians(), lng1.to_radians());
    let (phi2, lam2) = (lat2.to_radians(), lng2.to_radians());
    let dphi = phi2 - phi1;
    let dlam = lam2 - lam1;
    let sin_dphi = (dphi * 0.5).sin();
    let sin_dlam = (dlam * 0.5).sin();
    let h = sin_dphi * sin_dphi + phi1.cos() * phi2.cos() * sin_dlam * sin_dlam;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Distance from a coordinate pair to the center of a cell.
pub fn distance_to_cell_km(lat: f64, lng: f64, cell: CellIndex) -> f64 {
    let center: LatLng = cell.into();
    haversine_km(lat, lng, center.lat(), center.lng())
}

type TileKey = (i64, i64, i64, i64, u8);

fn tile_cache_key(bounds: &BoundingBox, resolution: Resolution) -> TileKey {
    // Quantize to micro-degrees; boxes closer than ~0.1m share an entry.
    const SCALE: f64 = 1e6;
    (
        (bounds.lat_min * SCALE) as i64,
        (bounds.lat_max * SCALE) as i64,
        (bounds.lng_min * SCALE) as i64,
        (bounds.lng_max * SCALE) as i64,
        u8::from(resolution),
    )
}

/// Global tiling cache (256 boxes).
fn tile_cache() -> &'static Mutex<LruCache<TileKey, Vec<CellIndex>>> {
    static CACHE: OnceLock<Mutex<LruCache<TileKey, Vec<CellIndex>>>> = OnceLock::new();
    CACHE.get_or_init(|| {
        Mutex::new(LruCache::new(
            NonZeroUsize::new(256).expect("cache size must be non-zero"),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downtown_sf() -> (f64, f64) {
        (37.7749, -122.4194)
    }

    #[test]
    fn cell_at_is_deterministic() {
        let geo = GeoIndex::default();
        let (lat, lng) = downtown_sf();
        let a = geo.cell_at(lat, lng).expect("valid location");
        let b = geo.cell_at(lat, lng).expect("valid location");
        assert_eq!(a, b);
        assert_eq!(a.resolution(), Resolution::Nine);
    }

    #[test]
    fn cell_at_rejects_out_of_range_coordinates() {
        let geo = GeoIndex::default();
        for (lat, lng) in [(91.0, 0.0), (-91.0, 0.0), (0.0, 181.0), (0.0, -181.0)] {
            assert!(matches!(
                geo.cell_at(lat, lng),
                Err(ForecastError::InvalidLocation { .. })
            ));
        }
    }

    #[test]
    fn center_round_trips_to_same_cell() {
        let geo = GeoIndex::default();
        let (lat, lng) = downtown_sf();
        let cell = geo.cell_at(lat, lng).expect("valid location");
        let (clat, clng) = geo.center_of(cell);
        let again = geo.cell_at(clat, clng).expect("center is valid");
        assert_eq!(cell, again);
    }

    #[test]
    fn neighbors_exclude_origin_and_are_adjacent() {
        let geo = GeoIndex::default();
        let (lat, lng) = downtown_sf();
        let origin = geo.cell_at(lat, lng).expect("valid location");
        let ring = geo.neighbors_of(origin);

        assert_eq!(ring.len(), 6);
        assert!(!ring.contains(&origin));
        for cell in &ring {
            let distance = origin.grid_distance(*cell).expect("grid distance");
            assert_eq!(distance, 1);
        }
    }

    #[test]
    fn neighbors_are_stable_across_calls() {
        let geo = GeoIndex::default();
        let origin = geo.cell_at(52.52, 13.405).expect("valid location");
        assert_eq!(geo.neighbors_of(origin), geo.neighbors_of(origin));
    }

    #[test]
    fn tile_covers_all_interior_cell_centers() {
        let geo = GeoIndex::default();
        let bounds = BoundingBox::new(37.77, 37.79, -122.43, -122.41).expect("valid box");
        let cells = geo.tile(&bounds).expect("tiling succeeds");
        assert!(!cells.is_empty());

        // Every tiled cell's center must lie within one in-radius of the box.
        let expanded = bounds.expanded(AVG_EDGE_KM[9]);
        for cell in &cells {
            let (lat, lng) = geo.center_of(*cell);
            assert!(expanded.contains(lat, lng), "cell center escaped the box");
        }

        // And every cell whose center is inside the box must be present.
        for cell in geo.tile(&bounds.expanded(1.0)).expect("expanded tiling") {
            let (lat, lng) = geo.center_of(cell);
            if bounds.contains(lat, lng) {
                assert!(cells.contains(&cell), "missed an interior cell");
            }
        }
    }

    #[test]
    fn tile_has_no_duplicates() {
        let geo = GeoIndex::default();
        let bounds = BoundingBox::new(52.50, 52.53, 13.38, 13.43).expect("valid box");
        let cells = geo.tile(&bounds).expect("tiling succeeds");
        let unique: BTreeSet<_> = cells.iter().copied().collect();
        assert_eq!(unique.len(), cells.len());
    }

    #[test]
    fn tile_rejects_degenerate_box() {
        let geo = GeoIndex::default();
        let bounds = BoundingBox {
            lat_min: 37.78,
            lat_max: 37.77,
            lng_min: -122.43,
            lng_max: -122.41,
        };
        assert!(matches!(
            geo.tile(&bounds),
            Err(ForecastError::InvalidBBox(_))
        ));
    }

    #[test]
    fn haversine_is_symmetric() {
        let (lat1, lng1) = downtown_sf();
        let (lat2, lng2) = (37.8044, -122.2712);
        let ab = haversine_km(lat1, lng1, lat2, lng2);
        let ba = haversine_km(lat2, lng2, lat1, lng1);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn haversine_matches_known_distance() {
        // SF downtown to Oakland downtown is roughly 13 km.
        let km = haversine_km(37.7749, -122.4194, 37.8044, -122.2712);
        assert!((km - 13.4).abs() < 1.0, "got {km}");
    }

    #[test]
    fn distance_to_own_cell_center_is_tiny() {
        let geo = GeoIndex::default();
        let (lat, lng) = downtown_sf();
        let cell = geo.cell_at(lat, lng).expect("valid location");
        let km = distance_to_cell_km(lat, lng, cell);
        assert!(km < AVG_EDGE_KM[9], "got {km}");
    }
}
