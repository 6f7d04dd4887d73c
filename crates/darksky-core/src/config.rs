use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classify::DEFAULT_DARK_THRESHOLD;
use crate::error::{DarkSkyError, Result};

/// Tuning constants for every search the engine runs.
/// Partial JSON is accepted; missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Search radius used when a request does not name one.
    pub default_max_distance_km: f64,
    /// Highest class accepted as "dark enough".
    pub dark_threshold: f64,
    /// Minimum great-circle separation between returned sites.
    pub exclusion_radius_km: f64,
    /// Offsets from the primary bearing for the alternative searches, in the
    /// order they run: opposite, perpendiculars, then diagonals.
    pub secondary_bearing_offsets_deg: Vec<f64>,
    /// Seeds stepped along each directional search bearing.
    pub directional_seed_count: usize,
    /// Optional half-width of a wedge around each directional bearing outside
    /// which directional searches do not expand. `None` (the default) lets
    /// them flood outward from their seeds freely.
    pub directional_sector_half_width_deg: Option<f64>,
    /// Visited pixels between progress reports for directional searches.
    pub progress_interval: usize,
    /// Visited pixels between progress reports for omnidirectional searches.
    pub primary_progress_interval: usize,
    /// Fraction of the overall progress range owned by the primary search.
    pub primary_progress_share: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_max_distance_km: 500.0,
            dark_threshold: DEFAULT_DARK_THRESHOLD,
            exclusion_radius_km: 2.0,
            secondary_bearing_offsets_deg: vec![180.0, 90.0, 270.0, 45.0, 225.0],
            directional_seed_count: 20,
            directional_sector_half_width_deg: None,
            progress_interval: 500,
            primary_progress_interval: 1000,
            primary_progress_share: 0.4,
        }
    }
}

impl SearchConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| DarkSkyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(DarkSkyError::Config(format!("{name} must be positive, got {v}")))
            }
        };
        positive("default_max_distance_km", self.default_max_distance_km)?;
        positive("dark_threshold", self.dark_threshold)?;
        if !(self.exclusion_radius_km.is_finite() && self.exclusion_radius_km >= 0.0) {
            return Err(DarkSkyError::Config(format!(
                "exclusion_radius_km must be non-negative, got {}",
                self.exclusion_radius_km
            )));
        }
        if self.directional_seed_count == 0 {
            return Err(DarkSkyError::Config("directional_seed_count must be at least 1".into()));
        }
        if self.progress_interval == 0 || self.primary_progress_interval == 0 {
            return Err(DarkSkyError::Config("progress intervals must be at least 1".into()));
        }
        if !(self.primary_progress_share > 0.0 && self.primary_progress_share < 1.0) {
            return Err(DarkSkyError::Config(format!(
                "primary_progress_share must be in (0, 1), got {}",
                self.primary_progress_share
            )));
        }
        if let Some(w) = self.directional_sector_half_width_deg {
            if !(w.is_finite() && w > 0.0) {
                return Err(DarkSkyError::Config(format!(
                    "directional_sector_half_width_deg must be positive, got {w}"
                )));
            }
        }
        if self.secondary_bearing_offsets_deg.iter().any(|b| !b.is_finite()) {
            return Err(DarkSkyError::Config("bearing offsets must be finite".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = SearchConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.default_max_distance_km, 500.0);
        assert_eq!(c.secondary_bearing_offsets_deg, vec![180.0, 90.0, 270.0, 45.0, 225.0]);
        assert_eq!(c.directional_sector_half_width_deg, None);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = SearchConfig::from_json_str(r#"{ "exclusion_radius_km": 5.0 }"#).unwrap();
        assert_eq!(c.exclusion_radius_km, 5.0);
        assert_eq!(c.directional_seed_count, 20);
        assert_eq!(c.directional_sector_half_width_deg, None);

        let c = SearchConfig::from_json_str(r#"{ "directional_sector_half_width_deg": 30.0 }"#).unwrap();
        assert_eq!(c.directional_sector_half_width_deg, Some(30.0));
        assert!(SearchConfig::from_json_str(r#"{ "directional_sector_half_width_deg": 0.0 }"#).is_err());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(SearchConfig::from_json_str(r#"{ "progress_interval": 0 }"#).is_err());
        assert!(SearchConfig::from_json_str(r#"{ "default_max_distance_km": -1 }"#).is_err());
        assert!(SearchConfig::from_json_str(r#"{ "primary_progress_share": 1.0 }"#).is_err());
        assert!(SearchConfig::from_json_str("not json").is_err());
    }
}
