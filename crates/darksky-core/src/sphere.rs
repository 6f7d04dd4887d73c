//! Great-circle distance and bearing utilities on a spherical Earth.
//! Angles are radians internally; every public signature is degrees / km.

use crate::coords::GeoCoordinate;

/// Mean Earth radius used by every distance computation.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in km (half-angle haversine form).
pub fn haversine_km(a: GeoCoordinate, b: GeoCoordinate) -> f64 {
    let (lat1, lng1) = a.to_radians();
    let (lat2, lng2) = b.to_radians();
    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Initial bearing from `from` towards `to`, in degrees normalised to [0, 360).
pub fn initial_bearing_deg(from: GeoCoordinate, to: GeoCoordinate) -> f64 {
    let (lat1, lng1) = from.to_radians();
    let (lat2, lng2) = to.to_radians();
    let dlng = lng2 - lng1;

    let y = dlng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();
    normalize_bearing(y.atan2(x).to_degrees())
}

/// Point reached by travelling `distance_km` from `origin` along the initial
/// bearing `bearing_deg` (spherical direct geodesic).
pub fn destination_point(origin: GeoCoordinate, bearing_deg: f64, distance_km: f64) -> GeoCoordinate {
    let (lat1, lng1) = origin.to_radians();
    let theta = bearing_deg.to_radians();
    let delta = distance_km / EARTH_RADIUS_KM;

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
    let lng2 = lng1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    GeoCoordinate {
        lat: lat2.to_degrees(),
        lng: normalize_longitude(lng2.to_degrees()),
    }
}

/// Wrap any angle into [0, 360).
pub fn normalize_bearing(deg: f64) -> f64 {
    let b = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs.
    if b >= 360.0 { 0.0 } else { b }
}

/// Wrap a longitude into [-180, 180).
fn normalize_longitude(deg: f64) -> f64 {
    (deg + 540.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn haversine_zero_for_same_point() {
        let p = GeoCoordinate::new(34.0522, -118.2437);
        assert_abs_diff_eq!(haversine_km(p, p), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn haversine_quarter_meridian() {
        let d = haversine_km(GeoCoordinate::new(0.0, 0.0), GeoCoordinate::new(90.0, 0.0));
        assert_relative_eq!(d, EARTH_RADIUS_KM * std::f64::consts::FRAC_PI_2, max_relative = 1e-12);
    }

    #[test]
    fn haversine_los_angeles_to_new_york() {
        let la = GeoCoordinate::new(34.0522, -118.2437);
        let ny = GeoCoordinate::new(40.7128, -74.0060);
        let d = haversine_km(la, ny);
        assert!((d - 3936.0).abs() < 5.0, "LA-NY should be ~3936 km, got {d:.1}");
    }

    #[test]
    fn bearing_cardinal_directions() {
        let o = GeoCoordinate::new(0.0, 0.0);
        assert_abs_diff_eq!(initial_bearing_deg(o, GeoCoordinate::new(10.0, 0.0)), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(initial_bearing_deg(o, GeoCoordinate::new(0.0, 10.0)), 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(initial_bearing_deg(o, GeoCoordinate::new(-10.0, 0.0)), 180.0, epsilon = 1e-9);
        assert_abs_diff_eq!(initial_bearing_deg(o, GeoCoordinate::new(0.0, -10.0)), 270.0, epsilon = 1e-9);
    }

    #[test]
    fn destination_then_distance_and_bearing_agree() {
        let origin = GeoCoordinate::new(34.0522, -118.2437);
        for bearing in [10.0, 45.0, 90.0, 135.0, 200.0, 315.0] {
            let dest = destination_point(origin, bearing, 250.0);
            assert_relative_eq!(haversine_km(origin, dest), 250.0, max_relative = 1e-9);
            assert_abs_diff_eq!(initial_bearing_deg(origin, dest), bearing, epsilon = 1e-6);
        }
    }

    #[test]
    fn destination_wraps_antimeridian() {
        let dest = destination_point(GeoCoordinate::new(0.0, 179.5), 90.0, 200.0);
        assert!(dest.lng < -178.0 && dest.lng >= -180.0, "got {}", dest.lng);
    }

    #[test]
    fn bearing_normalisation() {
        assert_eq!(normalize_bearing(360.0), 0.0);
        assert_eq!(normalize_bearing(-90.0), 270.0);
        assert_eq!(normalize_bearing(450.0), 90.0);
    }
}
