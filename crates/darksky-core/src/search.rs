//! Uniform-cost frontier search over the raster pixel graph.
//!
//! Pixels are expanded in order of their true great-circle distance from the
//! query origin. Because that cost depends only on the pixel (not on the path
//! that reached it), a pixel's frontier cost is final the moment it is first
//! discovered, so each pixel enters the heap at most once.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::f64::consts::PI;

use log::debug;

use crate::classify::{class_for_luminance, is_dark_enough, is_no_data};
use crate::coords::{GeoCoordinate, PixelCoordinate};
use crate::raster::RasterSource;
use crate::sphere::{destination_point, haversine_km, initial_bearing_deg, EARTH_RADIUS_KM};

/// Cap on intermediate progress; only completion reports 1.0.
const MAX_INTERMEDIATE_PROGRESS: f64 = 0.95;

/// Neighbourhood used when expanding a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// N/S/E/W. Enough for directional searches, which are seeded along a line.
    Four,
    /// N/S/E/W plus diagonals, for omnidirectional searches.
    Eight,
}

impl Connectivity {
    fn offsets(self) -> &'static [(i64, i64)] {
        const FOUR: [(i64, i64); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];
        const EIGHT: [(i64, i64); 8] =
            [(0, -1), (0, 1), (-1, 0), (1, 0), (-1, -1), (1, -1), (-1, 1), (1, 1)];
        match self {
            Connectivity::Four => &FOUR,
            Connectivity::Eight => &EIGHT,
        }
    }
}

/// An initial frontier entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seed {
    pub pixel: PixelCoordinate,
    /// Frontier cost of the seed. Seeds beyond the search radius are dropped.
    pub distance_km: f64,
}

impl Seed {
    /// Seed at the pixel containing `coord`, costed by its distance from `origin`.
    pub fn at(raster: &RasterSource, origin: GeoCoordinate, coord: GeoCoordinate) -> Self {
        let pixel = raster.pixel_at(coord);
        Self {
            pixel,
            distance_km: haversine_km(origin, raster.coordinate_of(pixel)),
        }
    }
}

/// The single seed of an omnidirectional search: the origin's own pixel at
/// cost 0, so it is admitted whatever the radius.
pub fn origin_seeds(raster: &RasterSource, origin: GeoCoordinate) -> Vec<Seed> {
    vec![Seed { pixel: raster.pixel_at(origin), distance_km: 0.0 }]
}

/// `count` seeds stepped evenly along `bearing_deg` out to `max_distance_km`.
pub fn directional_seeds(
    raster: &RasterSource,
    origin: GeoCoordinate,
    bearing_deg: f64,
    max_distance_km: f64,
    count: usize,
) -> Vec<Seed> {
    (1..=count)
        .map(|i| {
            let d = max_distance_km * i as f64 / count as f64;
            Seed::at(raster, origin, destination_point(origin, bearing_deg, d))
        })
        .collect()
}

/// Angular wedge around a bearing from the origin. A search given a sector
/// only expands into pixels inside it; seeds are always admitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sector {
    pub bearing_deg: f64,
    pub half_width_deg: f64,
}

impl Sector {
    fn contains(&self, origin: GeoCoordinate, coord: GeoCoordinate) -> bool {
        let diff = (initial_bearing_deg(origin, coord) - self.bearing_deg).rem_euclid(360.0);
        diff.min(360.0 - diff) <= self.half_width_deg
    }
}

/// Parameters of one search invocation.
#[derive(Debug, Clone)]
pub struct SearchParams<'a> {
    pub origin: GeoCoordinate,
    pub max_distance_km: f64,
    pub dark_threshold: f64,
    /// Dark pixels closer than this to any `excluded` coordinate are passed over.
    pub exclusion_radius_km: f64,
    pub excluded: &'a [GeoCoordinate],
    pub connectivity: Connectivity,
    /// Restricts expansion to a wedge; `None` expands in every direction.
    pub sector: Option<Sector>,
    /// Visited pixels between progress reports.
    pub progress_interval: usize,
}

/// A qualifying pixel found by [`search`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub pixel: PixelCoordinate,
    pub coordinate: GeoCoordinate,
    /// Great-circle distance from the origin, never the pixel path cost.
    pub distance_km: f64,
    pub brightness_class: f64,
}

#[derive(Debug, Clone, Copy)]
struct FrontierEntry {
    pixel: PixelCoordinate,
    distance_km: f64,
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierEntry {}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the nearest entry; ties broken by
        // position to keep results deterministic.
        other
            .distance_km
            .total_cmp(&self.distance_km)
            .then_with(|| (other.pixel.y, other.pixel.x).cmp(&(self.pixel.y, self.pixel.x)))
    }
}

/// Flat bitset over raster pixels, scoped to one search.
struct VisitedSet {
    bits: Vec<u64>,
    width: u32,
}

impl VisitedSet {
    fn new(width: u32, height: u32) -> Self {
        let n = width as usize * height as usize;
        Self { bits: vec![0; n.div_ceil(64)], width }
    }

    /// Mark `pixel`; returns false if it was already marked.
    fn insert(&mut self, pixel: PixelCoordinate) -> bool {
        let i = pixel.index(self.width);
        let (word, bit) = (i / 64, 1u64 << (i % 64));
        let fresh = self.bits[word] & bit == 0;
        self.bits[word] |= bit;
        fresh
    }
}

/// Heuristic pixel count inside the search radius: the area of a disc whose
/// radius is `max_distance_km` converted to pixels along the longer axis.
pub fn estimated_total_pixels(max_distance_km: f64, width: u32, height: u32) -> f64 {
    let r = (max_distance_km / EARTH_RADIUS_KM) * width.max(height) as f64 / (2.0 * PI);
    (PI * r * r).max(1.0)
}

/// Expand from `seeds` in distance order and return the first pixel that is
/// dark enough and clear of every excluded coordinate, or `None` once every
/// reachable pixel within `max_distance_km` has been visited.
///
/// No-data pixels are skipped: they neither terminate the search nor expand.
/// `on_progress` receives capped intermediate estimates and a final 1.0.
pub fn search(
    raster: &RasterSource,
    params: &SearchParams<'_>,
    seeds: &[Seed],
    on_progress: &mut dyn FnMut(f64),
) -> Option<SearchHit> {
    let (width, height) = (raster.width(), raster.height());
    let mut seen = VisitedSet::new(width, height);
    let mut frontier = BinaryHeap::new();

    for seed in seeds {
        if seed.distance_km <= params.max_distance_km && seen.insert(seed.pixel) {
            frontier.push(FrontierEntry { pixel: seed.pixel, distance_km: seed.distance_km });
        }
    }

    let estimated = estimated_total_pixels(params.max_distance_km, width, height);
    let interval = params.progress_interval.max(1);
    let mut visited = 0usize;

    let hit = loop {
        let Some(entry) = frontier.pop() else {
            break None;
        };
        visited += 1;
        if visited % interval == 0 {
            on_progress((visited as f64 / estimated).min(MAX_INTERMEDIATE_PROGRESS));
        }

        let sample = raster.sample(entry.pixel);
        if is_no_data(sample) {
            continue;
        }

        let coordinate = raster.coordinate_of(entry.pixel);
        let class = class_for_luminance(sample);
        if is_dark_enough(class, params.dark_threshold) && !is_excluded(coordinate, params) {
            break Some(SearchHit {
                pixel: entry.pixel,
                coordinate,
                distance_km: haversine_km(params.origin, coordinate),
                brightness_class: class,
            });
        }

        for &(dx, dy) in params.connectivity.offsets() {
            let nx = entry.pixel.x as i64 + dx;
            let ny = entry.pixel.y as i64 + dy;
            if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                continue;
            }
            let neighbour = PixelCoordinate::new(nx as u32, ny as u32);
            if !seen.insert(neighbour) {
                continue;
            }
            let neighbour_coord = raster.coordinate_of(neighbour);
            let distance_km = haversine_km(params.origin, neighbour_coord);
            if distance_km > params.max_distance_km {
                continue;
            }
            if let Some(sector) = &params.sector {
                if !sector.contains(params.origin, neighbour_coord) {
                    continue;
                }
            }
            frontier.push(FrontierEntry { pixel: neighbour, distance_km });
        }
    };

    debug!(
        "Frontier search from ({:.4}, {:.4}) visited {} pixels: {}",
        params.origin.lat,
        params.origin.lng,
        visited,
        match &hit {
            Some(h) => format!("found class {:.1} at {:.1} km", h.brightness_class, h.distance_km),
            None => "exhausted".to_string(),
        }
    );

    on_progress(1.0);
    hit
}

fn is_excluded(coord: GeoCoordinate, params: &SearchParams<'_>) -> bool {
    params
        .excluded
        .iter()
        .any(|&e| haversine_km(coord, e) < params.exclusion_radius_km)
}
