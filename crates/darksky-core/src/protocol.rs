//! Request/response messages exchanged with an execution context, and the
//! handler that turns one request into its progress and terminal messages.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use log::error;
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::coords::GeoCoordinate;
use crate::error::{DarkSkyError, Result};
use crate::known_sites::KnownSite;
use crate::orchestrator::{
    find_multiple_dark_sites, find_nearest_dark_sky, DarkSiteResult, MultipleSitesResult, SiteQuery,
};
use crate::raster::RasterSource;

/// Correlation id tying responses to the request that caused them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RequestKind {
    FindNearestDarkSky {
        origin_coord: GeoCoordinate,
        #[serde(default)]
        max_distance_km: Option<f64>,
        #[serde(default)]
        known_sites: Arc<Vec<KnownSite>>,
    },
    FindMultipleDarkSites {
        origin_coord: GeoCoordinate,
        #[serde(default)]
        max_distance_km: Option<f64>,
        #[serde(default)]
        known_sites: Arc<Vec<KnownSite>>,
    },
    GetBrightnessClassForLocation {
        coord: GeoCoordinate,
    },
}

impl RequestKind {
    pub fn name(&self) -> &'static str {
        match self {
            RequestKind::FindNearestDarkSky { .. } => "findNearestDarkSky",
            RequestKind::FindMultipleDarkSites { .. } => "findMultipleDarkSites",
            RequestKind::GetBrightnessClassForLocation { .. } => "getBrightnessClassForLocation",
        }
    }
}

/// A request as posted to an execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    #[serde(flatten)]
    pub kind: RequestKind,
}

/// Result carried by a `success` message. Serialized as the bare value; an
/// absent site or a no-data pixel is `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    Nearest(Option<DarkSiteResult>),
    Multiple(Option<MultipleSitesResult>),
    BrightnessClass(Option<f64>),
}

impl ResponsePayload {
    /// True when the query completed but found nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            ResponsePayload::Nearest(r) => r.is_none(),
            ResponsePayload::Multiple(r) => r.is_none(),
            ResponsePayload::BrightnessClass(r) => r.is_none(),
        }
    }
}

/// Messages flowing back from an execution context. Each request gets zero
/// or more `Progress` messages and then exactly one `Success` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    Progress { id: RequestId, progress: f64 },
    Success { id: RequestId, result: ResponsePayload },
    Error { id: RequestId, message: String },
}

impl Response {
    pub fn id(&self) -> RequestId {
        match self {
            Response::Progress { id, .. } | Response::Success { id, .. } | Response::Error { id, .. } => *id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Response::Progress { .. })
    }
}

/// Run one request to completion against a loaded raster, emitting its
/// progress messages and exactly one terminal message.
///
/// Invalid arguments and panics inside the search both become an `Error`
/// response; nothing escapes to the caller's context.
pub fn handle_request(
    raster: &RasterSource,
    config: &SearchConfig,
    request: &Request,
    emit: &mut dyn FnMut(Response),
) {
    let id = request.id;
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        execute(raster, config, &request.kind, &mut |progress| {
            emit(Response::Progress { id, progress })
        })
    }));

    let terminal = match outcome {
        Ok(Ok(result)) => Response::Success { id, result },
        Ok(Err(e)) => Response::Error { id, message: e.to_string() },
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!("Request {id} ({}) panicked: {message}", request.kind.name());
            Response::Error { id, message: DarkSkyError::Search(message).to_string() }
        }
    };
    emit(terminal);
}

/// Run one request and return its result directly.
pub fn execute(
    raster: &RasterSource,
    config: &SearchConfig,
    kind: &RequestKind,
    on_progress: &mut dyn FnMut(f64),
) -> Result<ResponsePayload> {
    match kind {
        RequestKind::FindNearestDarkSky { origin_coord, max_distance_km, known_sites } => {
            let query = site_query(config, *origin_coord, *max_distance_km, known_sites)?;
            Ok(ResponsePayload::Nearest(find_nearest_dark_sky(raster, config, &query, on_progress)))
        }
        RequestKind::FindMultipleDarkSites { origin_coord, max_distance_km, known_sites } => {
            let query = site_query(config, *origin_coord, *max_distance_km, known_sites)?;
            Ok(ResponsePayload::Multiple(find_multiple_dark_sites(raster, config, &query, on_progress)))
        }
        RequestKind::GetBrightnessClassForLocation { coord } => {
            validate_coordinate(*coord)?;
            let class = raster.classify_at(*coord);
            on_progress(1.0);
            Ok(ResponsePayload::BrightnessClass(class))
        }
    }
}

fn site_query<'a>(
    config: &SearchConfig,
    origin: GeoCoordinate,
    max_distance_km: Option<f64>,
    known_sites: &'a [KnownSite],
) -> Result<SiteQuery<'a>> {
    validate_coordinate(origin)?;
    let max_distance_km = max_distance_km.unwrap_or(config.default_max_distance_km);
    if !(max_distance_km.is_finite() && max_distance_km > 0.0) {
        return Err(DarkSkyError::InvalidRequest(format!(
            "maxDistanceKm must be a positive number, got {max_distance_km}"
        )));
    }
    Ok(SiteQuery { origin, max_distance_km, known_sites })
}

fn validate_coordinate(coord: GeoCoordinate) -> Result<()> {
    if coord.is_finite() {
        Ok(())
    } else {
        Err(DarkSkyError::InvalidRequest(format!(
            "coordinate must be finite, got ({}, {})",
            coord.lat, coord.lng
        )))
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
