/// Geographic and raster coordinate types plus the equirectangular projection
/// between them. All coordinate math uses f64 for precision.
use serde::{Deserialize, Serialize};

/// Northern edge of the raster's ground-truth coverage, in degrees.
pub const RASTER_MAX_LAT: f64 = 75.0;
/// Southern edge of the raster's ground-truth coverage, in degrees.
pub const RASTER_MIN_LAT: f64 = -65.0;
/// Latitude span covered by the raster (75 - (-65) = 140 degrees, not 180).
pub const RASTER_LAT_SPAN: f64 = RASTER_MAX_LAT - RASTER_MIN_LAT;

/// A point on the globe in geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    /// Latitude in degrees, -90 to +90.
    pub lat: f64,
    /// Longitude in degrees, -180 to +180.
    pub lng: f64,
}

impl GeoCoordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Convert to radians.
    pub fn to_radians(self) -> (f64, f64) {
        (self.lat.to_radians(), self.lng.to_radians())
    }

    pub fn is_finite(self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// Integer raster indices. Always in bounds once produced by [`to_pixel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelCoordinate {
    pub x: u32,
    pub y: u32,
}

impl PixelCoordinate {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Row-major index into a raster of the given width.
    #[inline]
    pub fn index(self, width: u32) -> usize {
        self.y as usize * width as usize + self.x as usize
    }
}

/// Project a geographic coordinate onto the raster grid.
///
/// Coordinates outside the covered band saturate at the nearest edge row or
/// column instead of failing, so poleward queries still get an answer.
pub fn to_pixel(coord: GeoCoordinate, width: u32, height: u32) -> PixelCoordinate {
    let x = (coord.lng + 180.0) / 360.0 * width as f64;
    let y = (RASTER_MAX_LAT - coord.lat) / RASTER_LAT_SPAN * height as f64;
    PixelCoordinate {
        x: clamp_index(x, width),
        y: clamp_index(y, height),
    }
}

/// Inverse of [`to_pixel`]: the geographic coordinate of a pixel.
pub fn to_geo(pixel: PixelCoordinate, width: u32, height: u32) -> GeoCoordinate {
    GeoCoordinate {
        lat: RASTER_MAX_LAT - pixel.y as f64 / height as f64 * RASTER_LAT_SPAN,
        lng: pixel.x as f64 / width as f64 * 360.0 - 180.0,
    }
}

/// Map a coordinate into the unit square used by display layers.
/// (0, 0) is the north-west corner of the covered band.
pub fn to_normalized(coord: GeoCoordinate) -> (f64, f64) {
    let nx = (coord.lng + 180.0) / 360.0;
    let ny = (RASTER_MAX_LAT - coord.lat) / RASTER_LAT_SPAN;
    (nx.clamp(0.0, 1.0), ny.clamp(0.0, 1.0))
}

/// Inverse of [`to_normalized`]. Inputs are clamped to [0, 1].
pub fn from_normalized(nx: f64, ny: f64) -> GeoCoordinate {
    let nx = nx.clamp(0.0, 1.0);
    let ny = ny.clamp(0.0, 1.0);
    GeoCoordinate {
        lat: RASTER_MAX_LAT - ny * RASTER_LAT_SPAN,
        lng: nx * 360.0 - 180.0,
    }
}

/// Round to the nearest integer and saturate into `[0, dim - 1]`.
fn clamp_index(v: f64, dim: u32) -> u32 {
    let max = dim.saturating_sub(1) as f64;
    // NaN falls through `clamp` unchanged; `as u32` then maps it to 0.
    v.round().clamp(0.0, max) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const W: u32 = 3600;
    const H: u32 = 1400;

    #[test]
    fn roundtrip_within_one_pixel() {
        let mut rng = StdRng::seed_from_u64(42);
        let lng_res = 360.0 / W as f64;
        let lat_res = RASTER_LAT_SPAN / H as f64;
        for _ in 0..1000 {
            let lat = rng.gen_range(RASTER_MIN_LAT..RASTER_MAX_LAT);
            let lng = rng.gen_range(-180.0..180.0);
            let back = to_geo(to_pixel(GeoCoordinate::new(lat, lng), W, H), W, H);
            assert!((back.lat - lat).abs() <= lat_res, "lat {lat} -> {}", back.lat);
            assert!((back.lng - lng).abs() <= lng_res, "lng {lng} -> {}", back.lng);
        }
    }

    #[test]
    fn band_edges_clamp_to_first_and_last_index() {
        assert_eq!(to_pixel(GeoCoordinate::new(75.0, 0.0), W, H).y, 0);
        assert_eq!(to_pixel(GeoCoordinate::new(-65.0, 0.0), W, H).y, H - 1);
        assert_eq!(to_pixel(GeoCoordinate::new(0.0, -180.0), W, H).x, 0);
        assert_eq!(to_pixel(GeoCoordinate::new(0.0, 180.0), W, H).x, W - 1);
    }

    #[test]
    fn out_of_band_coordinates_stay_in_bounds() {
        let cases = [(90.0, 0.0), (-90.0, 0.0), (0.0, 540.0), (0.0, -720.0), (89.0, 179.9)];
        for (lat, lng) in cases {
            let p = to_pixel(GeoCoordinate::new(lat, lng), W, H);
            assert!(p.x < W && p.y < H, "({lat}, {lng}) -> {p:?}");
        }
        assert_eq!(to_pixel(GeoCoordinate::new(90.0, 0.0), W, H).y, 0);
        assert_eq!(to_pixel(GeoCoordinate::new(-90.0, 0.0), W, H).y, H - 1);
    }

    #[test]
    fn tiny_raster_never_overflows() {
        let p = to_pixel(GeoCoordinate::new(-65.0, 180.0), 1, 1);
        assert_eq!(p, PixelCoordinate::new(0, 0));
    }

    #[test]
    fn normalized_roundtrip() {
        let c = GeoCoordinate::new(34.0522, -118.2437);
        let (nx, ny) = to_normalized(c);
        assert!((0.0..=1.0).contains(&nx) && (0.0..=1.0).contains(&ny));
        let back = from_normalized(nx, ny);
        assert_abs_diff_eq!(back.lat, c.lat, epsilon = 1e-9);
        assert_abs_diff_eq!(back.lng, c.lng, epsilon = 1e-9);
    }

    #[test]
    fn normalized_corners() {
        assert_eq!(to_normalized(GeoCoordinate::new(75.0, -180.0)), (0.0, 0.0));
        assert_eq!(to_normalized(GeoCoordinate::new(-65.0, 180.0)), (1.0, 1.0));
        assert_eq!(to_normalized(GeoCoordinate::new(-80.0, 0.0)).1, 1.0);
    }
}
