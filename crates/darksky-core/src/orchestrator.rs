//! Nearest-site and multi-site queries built on the frontier search.
//!
//! A multi-site query runs one omnidirectional search, then one directional
//! search per configured bearing offset relative to the primary result. Each
//! accepted site is excluded from the searches that follow it, so every
//! returned site sits at least `exclusion_radius_km` from every other.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::coords::GeoCoordinate;
use crate::known_sites::{nearest_known_site, KnownSite, KnownSiteMatch};
use crate::raster::RasterSource;
use crate::search::{
    directional_seeds, origin_seeds, search, Connectivity, SearchHit, SearchParams, Sector,
};
use crate::sphere::{initial_bearing_deg, normalize_bearing};

/// One found site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DarkSiteResult {
    pub coordinate: GeoCoordinate,
    /// Great-circle distance from the query origin.
    pub distance_km: f64,
    pub brightness_class: f64,
    /// Nearest caller-supplied reference location to this site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nearest_known_site: Option<KnownSiteMatch>,
}

impl From<SearchHit> for DarkSiteResult {
    fn from(hit: SearchHit) -> Self {
        Self {
            coordinate: hit.coordinate,
            distance_km: hit.distance_km,
            brightness_class: hit.brightness_class,
            nearest_known_site: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultipleSitesResult {
    pub primary: DarkSiteResult,
    /// Zero to five sites, in the order their bearings were searched.
    pub alternatives: Vec<DarkSiteResult>,
}

/// Inputs shared by both queries.
#[derive(Debug, Clone, Copy)]
pub struct SiteQuery<'a> {
    pub origin: GeoCoordinate,
    pub max_distance_km: f64,
    pub known_sites: &'a [KnownSite],
}

/// Nearest qualifying site, or `None` if nothing within the radius qualifies.
pub fn find_nearest_dark_sky(
    raster: &RasterSource,
    config: &SearchConfig,
    query: &SiteQuery<'_>,
    on_progress: &mut dyn FnMut(f64),
) -> Option<DarkSiteResult> {
    primary_search(raster, config, query, on_progress).map(|hit| annotate(hit.into(), query.known_sites))
}

/// A primary site plus up to one alternative per configured bearing offset.
/// Returns `None` only when the primary search finds nothing; a failed
/// directional search just contributes no alternative.
pub fn find_multiple_dark_sites(
    raster: &RasterSource,
    config: &SearchConfig,
    query: &SiteQuery<'_>,
    on_progress: &mut dyn FnMut(f64),
) -> Option<MultipleSitesResult> {
    let share = config.primary_progress_share;

    let Some(primary) = primary_search(raster, config, query, &mut |p| on_progress(p * share)) else {
        on_progress(1.0);
        return None;
    };

    let bearing = initial_bearing_deg(query.origin, primary.coordinate);
    let offsets = &config.secondary_bearing_offsets_deg;
    let slice = (1.0 - share) / offsets.len().max(1) as f64;

    let mut accepted = vec![primary.coordinate];
    let mut alternatives = Vec::with_capacity(offsets.len());

    for (i, offset) in offsets.iter().enumerate() {
        let direction = normalize_bearing(bearing + offset);
        let base = share + slice * i as f64;
        let params = SearchParams {
            origin: query.origin,
            max_distance_km: query.max_distance_km,
            dark_threshold: config.dark_threshold,
            exclusion_radius_km: config.exclusion_radius_km,
            excluded: &accepted,
            connectivity: Connectivity::Four,
            sector: config
                .directional_sector_half_width_deg
                .map(|half_width_deg| Sector { bearing_deg: direction, half_width_deg }),
            progress_interval: config.progress_interval,
        };
        let seeds = directional_seeds(
            raster,
            query.origin,
            direction,
            query.max_distance_km,
            config.directional_seed_count,
        );

        match search(raster, &params, &seeds, &mut |p| on_progress(base + p * slice)) {
            Some(hit) => {
                debug!("Alternative at bearing {direction:.0}: {:.1} km", hit.distance_km);
                accepted.push(hit.coordinate);
                alternatives.push(annotate(hit.into(), query.known_sites));
            }
            None => warn!("No alternative site found at bearing {direction:.0}"),
        }
    }

    on_progress(1.0);
    Some(MultipleSitesResult {
        primary: annotate(primary.into(), query.known_sites),
        alternatives,
    })
}

fn primary_search(
    raster: &RasterSource,
    config: &SearchConfig,
    query: &SiteQuery<'_>,
    on_progress: &mut dyn FnMut(f64),
) -> Option<SearchHit> {
    let params = SearchParams {
        origin: query.origin,
        max_distance_km: query.max_distance_km,
        dark_threshold: config.dark_threshold,
        exclusion_radius_km: config.exclusion_radius_km,
        excluded: &[],
        connectivity: Connectivity::Eight,
        sector: None,
        progress_interval: config.primary_progress_interval,
    };
    search(raster, &params, &origin_seeds(raster, query.origin), on_progress)
}

fn annotate(mut site: DarkSiteResult, known_sites: &[KnownSite]) -> DarkSiteResult {
    site.nearest_known_site = nearest_known_site(site.coordinate, known_sites);
    site
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{to_geo, PixelCoordinate};
    use crate::sphere::haversine_km;

    const W: u32 = 360;
    const H: u32 = 140;

    fn geo(x: u32, y: u32) -> GeoCoordinate {
        to_geo(PixelCoordinate::new(x, y), W, H)
    }

    /// Bright 1-degree raster with dark pixels at the given offsets from (100, 50).
    fn raster_with_dark(offsets: &[(i32, i32)]) -> RasterSource {
        let mut data = vec![200u8; (W * H) as usize];
        for &(dx, dy) in offsets {
            let x = (100 + dx) as u32;
            let y = (50 + dy) as u32;
            data[(y * W + x) as usize] = 8;
        }
        RasterSource::from_samples(W, H, data).unwrap()
    }

    fn query(known_sites: &[KnownSite]) -> SiteQuery<'_> {
        SiteQuery { origin: geo(100, 50), max_distance_km: 1500.0, known_sites }
    }

    #[test]
    fn nearest_returns_closest_dark_pixel() {
        let r = raster_with_dark(&[(3, 0), (-6, 0)]);
        let site = find_nearest_dark_sky(&r, &SearchConfig::default(), &query(&[]), &mut |_| {}).unwrap();
        assert_eq!(site.coordinate, geo(103, 50));
        assert!(site.nearest_known_site.is_none());
    }

    #[test]
    fn nearest_none_when_nothing_dark() {
        let r = raster_with_dark(&[]);
        let mut last = 0.0;
        let site = find_nearest_dark_sky(&r, &SearchConfig::default(), &query(&[]), &mut |p| last = p);
        assert!(site.is_none());
        assert_eq!(last, 1.0);
    }

    #[test]
    fn sector_config_spreads_alternatives() {
        // Primary due east; candidates opposite, north and south.
        let r = raster_with_dark(&[(3, 0), (-5, 0), (0, -4), (0, 4), (4, 1)]);
        let config = SearchConfig { directional_sector_half_width_deg: Some(45.0), ..SearchConfig::default() };
        let result = find_multiple_dark_sites(&r, &config, &query(&[]), &mut |_| {}).unwrap();
        assert_eq!(result.primary.coordinate, geo(103, 50));
        assert!(!result.alternatives.is_empty() && result.alternatives.len() <= 5);

        // The first alternative runs opposite the primary.
        assert_eq!(result.alternatives[0].coordinate, geo(95, 50));

        let mut all = vec![result.primary.coordinate];
        all.extend(result.alternatives.iter().map(|a| a.coordinate));
        for i in 0..all.len() {
            for j in (i + 1)..all.len() {
                assert!(haversine_km(all[i], all[j]) >= 2.0);
            }
        }
        for site in std::iter::once(&result.primary).chain(result.alternatives.iter()) {
            assert!(site.distance_km <= 1500.0);
            assert!(site.brightness_class <= 3.0);
        }
    }

    #[test]
    fn default_directional_search_floods_past_its_bearing() {
        // The only other dark pixel lies about 54 degrees off the primary's
        // bearing, between the diagonal and perpendicular directions.
        let r = raster_with_dark(&[(3, 0), (3, -2)]);
        let result =
            find_multiple_dark_sites(&r, &SearchConfig::default(), &query(&[]), &mut |_| {}).unwrap();
        assert_eq!(result.primary.coordinate, geo(103, 50));
        let found: Vec<_> = result.alternatives.iter().map(|a| a.coordinate).collect();
        assert_eq!(found, vec![geo(103, 48)]);

        let wedged = SearchConfig { directional_sector_half_width_deg: Some(30.0), ..SearchConfig::default() };
        let result = find_multiple_dark_sites(&r, &wedged, &query(&[]), &mut |_| {}).unwrap();
        assert!(result.alternatives.is_empty());
    }

    /// 0.05 degrees of longitude per pixel: at latitude 70 (row 5) neighbours
    /// along a row are about 1.9 km apart.
    const FINE_W: u32 = 7200;

    fn fine_geo(x: u32) -> GeoCoordinate {
        to_geo(PixelCoordinate::new(x, 5), FINE_W, H)
    }

    #[test]
    fn alternative_skips_dark_pixel_next_to_primary() {
        let mut data = vec![200u8; (FINE_W * H) as usize];
        for x in [3010, 3011, 3013] {
            data[(5 * FINE_W + x) as usize] = 8;
        }
        let r = RasterSource::from_samples(FINE_W, H, data).unwrap();
        let q = SiteQuery { origin: fine_geo(3000), max_distance_km: 40.0, known_sites: &[] };
        assert!(haversine_km(fine_geo(3010), fine_geo(3011)) < 2.0);

        // Only row 5 lies within 40 km, so reaching 3013 means expanding
        // through the skipped pixel at 3011.
        let result = find_multiple_dark_sites(&r, &SearchConfig::default(), &q, &mut |_| {}).unwrap();
        assert_eq!(result.primary.coordinate, fine_geo(3010));
        let found: Vec<_> = result.alternatives.iter().map(|a| a.coordinate).collect();
        assert_eq!(found, vec![fine_geo(3013)]);
        assert!(haversine_km(result.primary.coordinate, found[0]) >= 2.0);
    }

    #[test]
    fn multiple_none_without_primary() {
        let r = raster_with_dark(&[]);
        assert!(find_multiple_dark_sites(&r, &SearchConfig::default(), &query(&[]), &mut |_| {}).is_none());
    }

    #[test]
    fn progress_is_monotonic_and_ends_at_one() {
        let r = raster_with_dark(&[(3, 0), (-5, 0)]);
        let mut config = SearchConfig::default();
        config.progress_interval = 5;
        config.primary_progress_interval = 5;
        let mut reports = Vec::new();
        find_multiple_dark_sites(&r, &config, &query(&[]), &mut |p| reports.push(p)).unwrap();
        assert!(reports.windows(2).all(|w| w[0] <= w[1] + 1e-12), "{reports:?}");
        assert_eq!(reports.last().copied(), Some(1.0));
        // Primary completion lands exactly at its share.
        assert!(reports.iter().any(|&p| (p - 0.4).abs() < 1e-12));
    }

    #[test]
    fn annotations_follow_known_sites() {
        let r = raster_with_dark(&[(3, 0), (-5, 0)]);
        let sites = vec![KnownSite {
            full_name: "East Ridge Observatory".into(),
            short_name: "East Ridge".into(),
            lat: geo(103, 50).lat,
            lng: geo(103, 50).lng + 0.1,
            slug: None,
        }];
        let result =
            find_multiple_dark_sites(&r, &SearchConfig::default(), &query(&sites), &mut |_| {}).unwrap();
        let m = result.primary.nearest_known_site.as_ref().unwrap();
        assert_eq!(m.name, "East Ridge");
        assert!(m.distance_km < 15.0);
        assert!(result.alternatives.iter().all(|a| a.nearest_known_site.is_some()));

        let plain =
            find_multiple_dark_sites(&r, &SearchConfig::default(), &query(&[]), &mut |_| {}).unwrap();
        assert!(plain.primary.nearest_known_site.is_none());
        assert!(plain.alternatives.iter().all(|a| a.nearest_known_site.is_none()));
    }
}
