//! Execution boundary: runs requests on a dedicated worker thread, or inline
//! in the caller's thread when no worker can be started.
//!
//! Worker mode uses one request channel into the worker, one response channel
//! out of it, and a dispatcher thread that routes every response to the
//! per-request channel registered under its correlation id. When the worker
//! dies, every pending request is answered with an error and a fresh worker
//! is started on the next submission.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::config::SearchConfig;
use crate::coords::GeoCoordinate;
use crate::error::{DarkSkyError, Result};
use crate::known_sites::KnownSite;
use crate::orchestrator::{DarkSiteResult, MultipleSitesResult};
use crate::protocol::{handle_request, Request, RequestId, RequestKind, Response, ResponsePayload};
use crate::raster::RasterSource;

type LoadFn = dyn Fn() -> Result<Arc<RasterSource>> + Send + Sync;

/// Produces the raster for an execution context. Called at most once per
/// context lifetime, plus once more per request while loading keeps failing.
#[derive(Clone)]
pub struct RasterLoader(Arc<LoadFn>);

impl RasterLoader {
    /// Decode an image file on first use.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self(Arc::new(move || RasterSource::from_path(&path).map(Arc::new)))
    }

    /// Share an already decoded raster.
    pub fn from_raster(raster: Arc<RasterSource>) -> Self {
        Self(Arc::new(move || Ok(Arc::clone(&raster))))
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> Result<RasterSource> + Send + Sync + 'static,
    {
        Self(Arc::new(move || f().map(Arc::new)))
    }

    fn load(&self) -> Result<Arc<RasterSource>> {
        (self.0)()
    }
}

impl std::fmt::Debug for RasterLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RasterLoader")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// Dedicated worker thread, results delivered by message passing.
    Worker,
    /// Synchronous in the caller's thread, progress reported inline.
    Inline,
}

/// Handle to a submitted request.
#[derive(Debug)]
pub struct PendingRequest {
    id: RequestId,
    responses: Receiver<Response>,
}

impl PendingRequest {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Every message for this request, ending with its terminal message.
    pub fn into_responses(self) -> impl Iterator<Item = Response> {
        self.responses.into_iter()
    }

    /// Block until the terminal message, forwarding progress as it arrives.
    pub fn wait(self, on_progress: &mut dyn FnMut(f64)) -> Result<ResponsePayload> {
        loop {
            match self.responses.recv() {
                Ok(Response::Progress { progress, .. }) => on_progress(progress),
                Ok(terminal) => return terminal_to_result(terminal),
                Err(_) => return Err(DarkSkyError::WorkerTerminated(self.id.0)),
            }
        }
    }
}

fn terminal_to_result(response: Response) -> Result<ResponsePayload> {
    match response {
        Response::Success { result, .. } => Ok(result),
        Response::Error { message, .. } => Err(DarkSkyError::Search(message)),
        Response::Progress { id, .. } => Err(DarkSkyError::Search(format!(
            "request {id} ended without a terminal message"
        ))),
    }
}

/// Requests awaiting their terminal message, keyed by correlation id.
#[derive(Default)]
struct PendingTable {
    senders: HashMap<RequestId, Sender<Response>>,
    /// Set once the worker is gone; no further registrations are accepted.
    closed: bool,
}

struct WorkerContext {
    requests: Option<Sender<Request>>,
    pending: Arc<Mutex<PendingTable>>,
    worker: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl WorkerContext {
    fn spawn(loader: RasterLoader, config: Arc<SearchConfig>) -> std::io::Result<Self> {
        let (request_tx, request_rx) = unbounded::<Request>();
        let (response_tx, response_rx) = unbounded::<Response>();
        let pending = Arc::new(Mutex::new(PendingTable::default()));

        let worker = thread::Builder::new()
            .name("darksky-worker".into())
            .spawn(move || worker_loop(loader, config, request_rx, response_tx))?;

        let dispatcher = thread::Builder::new().name("darksky-dispatch".into()).spawn({
            let pending = Arc::clone(&pending);
            move || dispatch_loop(response_rx, pending)
        })?;

        info!("Search worker started");
        Ok(Self {
            requests: Some(request_tx),
            pending,
            worker: Some(worker),
            dispatcher: Some(dispatcher),
        })
    }

    /// Register and post a request. Gives the request back if this context
    /// can no longer accept work.
    fn post(&self, request: Request) -> std::result::Result<Receiver<Response>, Request> {
        let Some(requests) = &self.requests else {
            return Err(request);
        };
        let (tx, rx) = unbounded();
        {
            let mut table = self.pending.lock();
            if table.closed {
                return Err(request);
            }
            table.senders.insert(request.id, tx);
        }
        let id = request.id;
        match requests.send(request) {
            Ok(()) => Ok(rx),
            Err(e) => {
                self.pending.lock().senders.remove(&id);
                Err(e.into_inner())
            }
        }
    }

    fn shutdown(&mut self) {
        self.requests.take();
        for handle in [self.worker.take(), self.dispatcher.take()].into_iter().flatten() {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                warn!("Thread {name} panicked");
            }
        }
    }
}

fn worker_loop(
    loader: RasterLoader,
    config: Arc<SearchConfig>,
    requests: Receiver<Request>,
    responses: Sender<Response>,
) {
    let mut raster: Option<Arc<RasterSource>> = None;
    for request in requests.iter() {
        let loaded = match &raster {
            Some(r) => Arc::clone(r),
            None => match loader.load() {
                Ok(r) => {
                    raster = Some(Arc::clone(&r));
                    r
                }
                Err(e) => {
                    warn!("Raster load failed for request {}: {e}", request.id);
                    let _ = responses.send(Response::Error { id: request.id, message: e.to_string() });
                    continue;
                }
            },
        };
        debug!("Worker handling request {} ({})", request.id, request.kind.name());
        handle_request(&loaded, &config, &request, &mut |response| {
            let _ = responses.send(response);
        });
    }
    debug!("Search worker shutting down");
}

fn dispatch_loop(responses: Receiver<Response>, pending: Arc<Mutex<PendingTable>>) {
    for response in responses.iter() {
        let id = response.id();
        let mut table = pending.lock();
        if response.is_terminal() {
            if let Some(tx) = table.senders.remove(&id) {
                let _ = tx.send(response);
            }
        } else if let Some(tx) = table.senders.get(&id) {
            let _ = tx.send(response);
        }
    }

    // Every sender to `responses` is gone: the worker has exited.
    let mut table = pending.lock();
    table.closed = true;
    if !table.senders.is_empty() {
        warn!("Search worker terminated with {} pending requests", table.senders.len());
    }
    for (id, tx) in table.senders.drain() {
        let message = DarkSkyError::WorkerTerminated(id.0).to_string();
        let _ = tx.send(Response::Error { id, message });
    }
}

enum Backend {
    Worker(WorkerContext),
    Inline { raster: Option<Arc<RasterSource>> },
}

/// Entry point for callers: owns the execution context and the raster it
/// loads, and multiplexes concurrent requests by correlation id.
pub struct DarkSkyEngine {
    loader: RasterLoader,
    config: Arc<SearchConfig>,
    next_id: AtomicU64,
    backend: Mutex<Backend>,
}

impl DarkSkyEngine {
    pub fn new(loader: RasterLoader, config: SearchConfig, strategy: ExecutionStrategy) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let backend = match strategy {
            ExecutionStrategy::Worker => match WorkerContext::spawn(loader.clone(), Arc::clone(&config)) {
                Ok(ctx) => Backend::Worker(ctx),
                Err(e) => {
                    warn!("Search worker unavailable ({e}), running searches inline");
                    Backend::Inline { raster: None }
                }
            },
            ExecutionStrategy::Inline => Backend::Inline { raster: None },
        };
        Ok(Self { loader, config, next_id: AtomicU64::new(1), backend: Mutex::new(backend) })
    }

    /// The strategy actually in use, which is `Inline` if a worker was
    /// requested but could not be started.
    pub fn strategy(&self) -> ExecutionStrategy {
        match &*self.backend.lock() {
            Backend::Worker(_) => ExecutionStrategy::Worker,
            Backend::Inline { .. } => ExecutionStrategy::Inline,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Submit a request and return immediately with a handle to its
    /// responses. Inline engines run the request before returning.
    pub fn submit(&self, kind: RequestKind) -> Result<PendingRequest> {
        let request = Request { id: self.next_request_id(), kind };
        let id = request.id;
        let mut backend = self.backend.lock();

        let ctx = match &mut *backend {
            Backend::Worker(ctx) => ctx,
            Backend::Inline { raster } => {
                let (tx, rx) = unbounded();
                let raster = self.inline_raster(raster);
                drop(backend);
                match raster {
                    Ok(r) => handle_request(&r, &self.config, &request, &mut |resp| {
                        let _ = tx.send(resp);
                    }),
                    Err(e) => {
                        let _ = tx.send(Response::Error { id, message: e.to_string() });
                    }
                }
                return Ok(PendingRequest { id, responses: rx });
            }
        };

        let request = match ctx.post(request) {
            Ok(rx) => return Ok(PendingRequest { id, responses: rx }),
            Err(request) => request,
        };

        info!("Search worker is gone, starting a new one");
        let fresh = WorkerContext::spawn(self.loader.clone(), Arc::clone(&self.config))
            .map_err(|e| DarkSkyError::WorkerUnavailable(e.to_string()))?;
        let posted = fresh.post(request);
        let mut old = std::mem::replace(ctx, fresh);
        drop(backend);
        old.shutdown();

        posted
            .map(|rx| PendingRequest { id, responses: rx })
            .map_err(|_| DarkSkyError::WorkerUnavailable("new worker rejected the request".into()))
    }

    /// Run a request to completion, forwarding progress to `on_progress`.
    pub fn request(&self, kind: RequestKind, on_progress: &mut dyn FnMut(f64)) -> Result<ResponsePayload> {
        let inline_raster = {
            let mut backend = self.backend.lock();
            match &mut *backend {
                Backend::Worker(_) => None,
                Backend::Inline { raster } => Some(self.inline_raster(raster)?),
            }
        };

        let Some(raster) = inline_raster else {
            return self.submit(kind)?.wait(on_progress);
        };

        let request = Request { id: self.next_request_id(), kind };
        let mut terminal = None;
        handle_request(&raster, &self.config, &request, &mut |response| match response {
            Response::Progress { progress, .. } => on_progress(progress),
            other => terminal = Some(other),
        });
        match terminal {
            Some(t) => terminal_to_result(t),
            None => Err(DarkSkyError::Search(format!("request {} produced no result", request.id))),
        }
    }

    pub fn find_nearest_dark_sky(
        &self,
        origin: GeoCoordinate,
        max_distance_km: Option<f64>,
        known_sites: Arc<Vec<KnownSite>>,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<Option<DarkSiteResult>> {
        let kind = RequestKind::FindNearestDarkSky { origin_coord: origin, max_distance_km, known_sites };
        match self.request(kind, on_progress)? {
            ResponsePayload::Nearest(site) => Ok(site),
            other => Err(unexpected_payload(&other)),
        }
    }

    pub fn find_multiple_dark_sites(
        &self,
        origin: GeoCoordinate,
        max_distance_km: Option<f64>,
        known_sites: Arc<Vec<KnownSite>>,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<Option<MultipleSitesResult>> {
        let kind = RequestKind::FindMultipleDarkSites { origin_coord: origin, max_distance_km, known_sites };
        match self.request(kind, on_progress)? {
            ResponsePayload::Multiple(sites) => Ok(sites),
            // A null payload reads back as the first untagged variant.
            ResponsePayload::Nearest(None) => Ok(None),
            other => Err(unexpected_payload(&other)),
        }
    }

    /// Brightness class at `coord`, or `None` where the raster has no data.
    pub fn brightness_class_for_location(&self, coord: GeoCoordinate) -> Result<Option<f64>> {
        match self.request(RequestKind::GetBrightnessClassForLocation { coord }, &mut |_| {})? {
            ResponsePayload::BrightnessClass(class) => Ok(class),
            ResponsePayload::Nearest(None) => Ok(None),
            other => Err(unexpected_payload(&other)),
        }
    }

    /// Stop the worker after its current request and wait for it to exit.
    pub fn shutdown(self) {
        // Drop does the work.
    }

    fn next_request_id(&self) -> RequestId {
        RequestId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn inline_raster(&self, cached: &mut Option<Arc<RasterSource>>) -> Result<Arc<RasterSource>> {
        if let Some(r) = cached {
            return Ok(Arc::clone(r));
        }
        let r = self.loader.load()?;
        *cached = Some(Arc::clone(&r));
        Ok(r)
    }
}

impl Drop for DarkSkyEngine {
    fn drop(&mut self) {
        if let Backend::Worker(ctx) = &mut *self.backend.lock() {
            ctx.shutdown();
        }
    }
}

fn unexpected_payload(payload: &ResponsePayload) -> DarkSkyError {
    DarkSkyError::Search(format!("unexpected response payload {payload:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster() -> Arc<RasterSource> {
        let mut data = vec![200u8; 360 * 140];
        data[50 * 360 + 103] = 8;
        Arc::new(RasterSource::from_samples(360, 140, data).unwrap())
    }

    #[test]
    fn inline_and_worker_agree() {
        let origin = GeoCoordinate::new(25.0, -80.0);
        let mut results = Vec::new();
        for strategy in [ExecutionStrategy::Inline, ExecutionStrategy::Worker] {
            let engine =
                DarkSkyEngine::new(RasterLoader::from_raster(raster()), SearchConfig::default(), strategy).unwrap();
            assert_eq!(engine.strategy(), strategy);
            let site = engine
                .find_nearest_dark_sky(origin, Some(800.0), Arc::default(), &mut |_| {})
                .unwrap();
            results.push(site);
        }
        assert!(results[0].is_some());
        assert_eq!(results[0], results[1]);
    }

    #[test]
    fn request_ids_increase() {
        let engine = DarkSkyEngine::new(
            RasterLoader::from_raster(raster()),
            SearchConfig::default(),
            ExecutionStrategy::Inline,
        )
        .unwrap();
        let a = engine.submit(RequestKind::GetBrightnessClassForLocation { coord: GeoCoordinate::new(0.0, 0.0) });
        let b = engine.submit(RequestKind::GetBrightnessClassForLocation { coord: GeoCoordinate::new(0.0, 0.0) });
        assert!(a.unwrap().id() < b.unwrap().id());
    }

    #[test]
    fn rejects_invalid_config() {
        let config = SearchConfig { progress_interval: 0, ..SearchConfig::default() };
        assert!(DarkSkyEngine::new(RasterLoader::from_raster(raster()), config, ExecutionStrategy::Inline).is_err());
    }

    #[test]
    fn load_failure_is_a_per_request_error() {
        let engine = DarkSkyEngine::new(
            RasterLoader::from_path("/nonexistent/darksky.png"),
            SearchConfig::default(),
            ExecutionStrategy::Worker,
        )
        .unwrap();
        let err = engine.brightness_class_for_location(GeoCoordinate::new(0.0, 0.0)).unwrap_err();
        assert!(err.to_string().contains("darksky.png"), "{err}");
        // The worker survives and reports the same failure again.
        assert!(engine.brightness_class_for_location(GeoCoordinate::new(1.0, 1.0)).is_err());
        assert_eq!(engine.strategy(), ExecutionStrategy::Worker);
    }
}
