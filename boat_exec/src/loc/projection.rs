//! Geodetic to projected coordinate conversion

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use super::{Pose, UtmOrigin, UtmPose};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Southern limit of the UTM grid.
const UTM_MIN_LAT_DEG: f64 = -80.0;

/// Northern limit of the UTM grid.
const UTM_MAX_LAT_DEG: f64 = 84.0;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Conversion from latitude/longitude into the projected frame.
pub trait Projection: Send + Sync {
    /// Project a latitude and longitude in degrees, returning `None` if the point lies outside
    /// the area the projection covers.
    ///
    /// The returned pose has zero altitude and identity attitude.
    fn to_projected(&self, lat_deg: f64, lon_deg: f64) -> Option<UtmPose>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// UTM projection on the WGS84 ellipsoid.
#[derive(Debug, Default, Clone, Copy)]
pub struct UtmProjection;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Projection for UtmProjection {
    fn to_projected(&self, lat_deg: f64, lon_deg: f64) -> Option<UtmPose> {
        if !(UTM_MIN_LAT_DEG..=UTM_MAX_LAT_DEG).contains(&lat_deg)
            || !(-180.0..=180.0).contains(&lon_deg)
        {
            return None;
        }

        let zone = utm::lat_lon_to_zone_number(lat_deg, lon_deg);
        let (northing_m, easting_m, _) = utm::to_utm_wgs84(lat_deg, lon_deg, zone);

        Some(UtmPose::new(
            Pose::new(easting_m, northing_m, 0.0, 0.0),
            UtmOrigin {
                zone,
                is_north: lat_deg >= 0.0,
            },
        ))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
