//! The periodic resource refresher

use chrono::{DateTime, Local};
use larder_config::{DEFAULT_MAX_CONCURRENT_FETCHES, ServiceConfig};
use larder_util::{elapsed_between, epoch, from_system_time, now};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{Fetcher, RefreshError, RefreshResult, ResourceDescriptor, ResourceRegistry};

/// What [`PeriodicResourceRefresher::ensure_fresh`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// A background download was started
    Started,
    /// The local copy is within its refresh interval
    Fresh,
    /// A download for this resource is already running
    InFlight,
}

/// Snapshot of one resource's refresh state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceStatus {
    pub last_refresh: DateTime<Local>,
    pub refresh_count: u64,
    pub in_flight: bool,
}

/// Refresher tuning
#[derive(Debug, Clone)]
pub struct RefresherOptions {
    pub data_dir: PathBuf,
    pub max_concurrent_fetches: usize,
}

impl RefresherOptions {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }

    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_fetches = max;
        self
    }
}

impl From<&ServiceConfig> for RefresherOptions {
    fn from(service: &ServiceConfig) -> Self {
        Self::new(service.data_dir.clone()).with_max_concurrent_fetches(service.max_concurrent_fetches)
    }
}

#[derive(Debug, Clone)]
struct RefreshState {
    last_refresh: DateTime<Local>,
    refresh_count: u64,
}

struct Shared {
    data_dir: PathBuf,
    registry: ResourceRegistry,
    fetcher: Arc<dyn Fetcher>,
    state: Mutex<HashMap<String, RefreshState>>,
    in_flight: Mutex<HashSet<String>>,
    permits: Semaphore,
    idle: Notify,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears a resource's in-flight mark however its task ends
struct InFlightGuard {
    shared: Arc<Shared>,
    name: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.shared.in_flight).remove(&self.name);
        self.shared.idle.notify_waiters();
    }
}

/// Keeps a set of downloaded resources fresh under the data directory.
///
/// Each resource is fetched to `<data_dir>/<name>`, or handed to its
/// transform. Downloads run on the given runtime; at most
/// `max_concurrent_fetches` run at once and at most one per resource.
pub struct PeriodicResourceRefresher {
    shared: Arc<Shared>,
    runtime: Handle,
}

impl PeriodicResourceRefresher {
    /// Create a refresher and kick off a refresh of every stale resource.
    ///
    /// A resource without a transform counts as refreshed at the mtime of its
    /// existing local copy; everything else starts at the epoch.
    pub fn new(
        options: RefresherOptions,
        registry: ResourceRegistry,
        fetcher: Arc<dyn Fetcher>,
        runtime: Handle,
    ) -> RefreshResult<Self> {
        if registry.is_empty() {
            return Err(RefreshError::EmptyRegistry);
        }
        std::fs::create_dir_all(&options.data_dir)?;

        let mut state = HashMap::new();
        for descriptor in registry.iter() {
            let last_refresh = initial_refresh_time(&options.data_dir, descriptor);
            debug!(
                name = %descriptor.name,
                last_refresh = %last_refresh,
                "Registered resource"
            );
            state.insert(
                descriptor.name.clone(),
                RefreshState {
                    last_refresh,
                    refresh_count: 0,
                },
            );
        }

        let refresher = Self {
            shared: Arc::new(Shared {
                data_dir: options.data_dir,
                registry,
                fetcher,
                state: Mutex::new(state),
                in_flight: Mutex::new(HashSet::new()),
                permits: Semaphore::new(options.max_concurrent_fetches.max(1)),
                idle: Notify::new(),
            }),
            runtime,
        };

        let names: Vec<String> = refresher.shared.registry.names().map(String::from).collect();
        for name in names {
            refresher.ensure_fresh(&name)?;
        }

        Ok(refresher)
    }

    /// Start a background refresh of `name` if it is stale and not already
    /// being fetched. Never waits for the download.
    pub fn ensure_fresh(&self, name: &str) -> RefreshResult<EnsureOutcome> {
        let descriptor = self
            .shared
            .registry
            .get(name)
            .ok_or_else(|| RefreshError::UnknownResource(name.to_string()))?;

        // Held across the staleness check so two callers cannot both start
        let mut in_flight = lock(&self.shared.in_flight);

        let last_refresh = lock(&self.shared.state)
            .get(name)
            .map(|s| s.last_refresh)
            .unwrap_or_else(epoch);
        if elapsed_between(last_refresh, now()) <= descriptor.interval {
            return Ok(EnsureOutcome::Fresh);
        }

        if !in_flight.insert(name.to_string()) {
            debug!(name = %name, "Refresh already in flight");
            return Ok(EnsureOutcome::InFlight);
        }
        drop(in_flight);

        let guard = InFlightGuard {
            shared: self.shared.clone(),
            name: name.to_string(),
        };
        let shared = self.shared.clone();
        let descriptor = descriptor.clone();

        info!(name = %descriptor.name, url = %descriptor.locator, "Beginning download");
        self.runtime.spawn(async move {
            let _guard = guard;
            refresh(&shared, &descriptor).await;
        });

        Ok(EnsureOutcome::Started)
    }

    /// Current state of `name`, if it is registered
    pub fn status(&self, name: &str) -> Option<ResourceStatus> {
        let state = lock(&self.shared.state).get(name).cloned()?;
        Some(ResourceStatus {
            last_refresh: state.last_refresh,
            refresh_count: state.refresh_count,
            in_flight: self.is_in_flight(name),
        })
    }

    pub fn is_in_flight(&self, name: &str) -> bool {
        lock(&self.shared.in_flight).contains(name)
    }

    pub fn in_flight_count(&self) -> usize {
        lock(&self.shared.in_flight).len()
    }

    /// Where a resource without a transform ends up
    pub fn local_path(&self, name: &str) -> Option<PathBuf> {
        self.shared
            .registry
            .get(name)
            .map(|d| self.shared.data_dir.join(&d.name))
    }

    pub fn data_dir(&self) -> &Path {
        &self.shared.data_dir
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.shared.registry
    }

    /// Wait until no download is in flight
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight_count() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Drop queued downloads that have not started and wait for the running
    /// ones to finish
    pub async fn shutdown(self) {
        info!(in_flight = self.in_flight_count(), "Shutting down refresher");
        self.shared.permits.close();
        self.wait_idle().await;
    }
}

fn initial_refresh_time(data_dir: &Path, descriptor: &ResourceDescriptor) -> DateTime<Local> {
    if descriptor.transform.is_some() {
        return epoch();
    }
    std::fs::metadata(data_dir.join(&descriptor.name))
        .and_then(|m| m.modified())
        .map(from_system_time)
        .unwrap_or_else(|_| epoch())
}

/// One download. Failures are logged and leave the resource's state alone.
async fn refresh(shared: &Shared, descriptor: &ResourceDescriptor) {
    let Ok(_permit) = shared.permits.acquire().await else {
        debug!(name = %descriptor.name, "Refresher closed, skipping download");
        return;
    };

    let started = Instant::now();
    let tmp_path = shared
        .data_dir
        .join(format!(".{}.{}.part", descriptor.name, Uuid::new_v4().simple()));

    let bytes = match download(shared, descriptor, &tmp_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(
                name = %descriptor.name,
                url = %descriptor.locator,
                error = %e,
                "Error downloading"
            );
            if let Err(e) = tokio::fs::remove_file(&tmp_path).await {
                debug!(path = %tmp_path.display(), error = %e, "Could not remove partial download");
            }
            return;
        }
    };

    info!(
        name = %descriptor.name,
        bytes,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Downloaded"
    );

    if let Some(state) = lock(&shared.state).get_mut(&descriptor.name) {
        state.refresh_count += 1;
        state.last_refresh = now();
    }

    match &descriptor.transform {
        None => {
            let target = shared.data_dir.join(&descriptor.name);
            if let Err(e) = replace(&tmp_path, &target).await {
                warn!(
                    name = %descriptor.name,
                    path = %target.display(),
                    error = %e,
                    "Could not move download into place"
                );
                let _ = tokio::fs::remove_file(&tmp_path).await;
            }
        }
        Some(transform) => {
            let transform = transform.clone();
            let path = tmp_path.clone();
            let started = Instant::now();
            match tokio::task::spawn_blocking(move || transform(path.as_path())).await {
                Ok(Ok(())) => info!(
                    name = %descriptor.name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Transform finished"
                ),
                Ok(Err(e)) => warn!(name = %descriptor.name, error = %e, "Transform failed"),
                Err(e) => warn!(name = %descriptor.name, error = %e, "Transform panicked"),
            }
        }
    }
}

async fn download(
    shared: &Shared,
    descriptor: &ResourceDescriptor,
    tmp_path: &Path,
) -> RefreshResult<u64> {
    let mut out = File::create(tmp_path).await?;
    let bytes = shared.fetcher.fetch(&descriptor.locator, &mut out).await?;
    out.flush().await?;
    out.sync_all().await?;
    Ok(bytes)
}

async fn replace(from: &Path, to: &Path) -> std::io::Result<()> {
    // rename does not overwrite on Windows
    if cfg!(windows) && tokio::fs::try_exists(to).await? {
        tokio::fs::remove_file(to).await?;
    }
    tokio::fs::rename(from, to).await
}
