//! Nearest named reference location, used to annotate found sites.
use serde::{Deserialize, Serialize};

use crate::coords::GeoCoordinate;
use crate::sphere::haversine_km;

/// A caller-supplied reference location. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownSite {
    pub full_name: String,
    pub short_name: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

impl KnownSite {
    pub fn coordinate(&self) -> GeoCoordinate {
        GeoCoordinate::new(self.lat, self.lng)
    }
}

/// The nearest known site to some coordinate, with its distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownSiteMatch {
    pub name: String,
    pub full_name: String,
    pub coordinate: GeoCoordinate,
    pub distance_km: f64,
}

/// Linear scan for the closest entry. No distance cap; `None` only when
/// `sites` is empty. Ties keep the earliest entry.
pub fn nearest_known_site(coord: GeoCoordinate, sites: &[KnownSite]) -> Option<KnownSiteMatch> {
    sites
        .iter()
        .map(|site| (site, haversine_km(coord, site.coordinate())))
        .fold(None, |best: Option<(&KnownSite, f64)>, (site, d)| match best {
            Some((_, best_d)) if best_d <= d => best,
            _ => Some((site, d)),
        })
        .map(|(site, distance_km)| KnownSiteMatch {
            name: site.short_name.clone(),
            full_name: site.full_name.clone(),
            coordinate: site.coordinate(),
            distance_km,
        })
}
