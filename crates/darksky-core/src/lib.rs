//! Dark sky site search over a global light-pollution raster.
//!
//! The raster is treated as an implicit pixel graph. Searches expand outward
//! from an origin in order of true great-circle distance and stop at the first
//! pixel whose sky-brightness class is dark enough.

pub mod classify;
pub mod config;
pub mod coords;
pub mod engine;
pub mod error;
pub mod known_sites;
pub mod orchestrator;
pub mod protocol;
pub mod raster;
pub mod search;
pub mod sphere;

pub use config::SearchConfig;
pub use coords::{GeoCoordinate, PixelCoordinate};
pub use engine::{DarkSkyEngine, ExecutionStrategy, PendingRequest, RasterLoader};
pub use error::{DarkSkyError, Result};
pub use known_sites::{KnownSite, KnownSiteMatch};
pub use orchestrator::{DarkSiteResult, MultipleSitesResult};
pub use protocol::{RequestId, RequestKind, Response, ResponsePayload};
pub use raster::RasterSource;
