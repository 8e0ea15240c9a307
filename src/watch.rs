//! Background hot reload from a watched file
//!
//! [`SnapshotWatcher`] watches a CSV file or a saved snapshot, waits for the
//! file to settle, rebuilds (or reopens) it on its own thread, and installs
//! the result into a shared [`Resolver`]. A failed rebuild leaves the current
//! snapshot serving.
//!
//! ```rust,no_run
//! use ipgeo::watch::{SnapshotWatcher, WatchInput, WatchOptions};
//! use ipgeo::Resolver;
//! use std::sync::Arc;
//!
//! let resolver = Arc::new(Resolver::new());
//! let watcher = SnapshotWatcher::spawn(
//!     Arc::clone(&resolver),
//!     "geoip.csv",
//!     WatchInput::Csv,
//!     WatchOptions::default(),
//! )?;
//!
//! // ... serve queries through `resolver` ...
//! watcher.stop();
//! # Ok::<(), ipgeo::GeoError>(())
//! ```

use crate::builder::BuildOptions;
use crate::error::GeoError;
use crate::resolver::Resolver;
use crate::snapshot::Snapshot;
use crate::source::CsvSource;
use crossbeam_channel::{select, unbounded, Sender};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Quiet period before a changed file is reloaded
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Kind of file being watched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchInput {
    /// CSV rows, rebuilt with the configured [`BuildOptions`]
    Csv,
    /// A snapshot written by [`Snapshot::save`]
    Snapshot,
}

/// Watcher configuration
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Quiet period after the last file event before reloading
    pub debounce: Duration,
    /// Options for CSV rebuilds
    pub build: BuildOptions,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            build: BuildOptions::default(),
        }
    }
}

/// Load `path` once and install it into `resolver`
pub fn load_into(
    resolver: &Resolver,
    path: &Path,
    input: WatchInput,
    build: &BuildOptions,
) -> Result<(), GeoError> {
    match input {
        WatchInput::Csv => resolver
            .rebuild(&CsvSource::new(path), build.clone())
            .map(|_| ()),
        WatchInput::Snapshot => {
            resolver.reload(Snapshot::open(path)?);
            Ok(())
        }
    }
}

/// Watches one file and hot-reloads a resolver when it changes
pub struct SnapshotWatcher {
    shutdown_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
    reloads: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
    /// File watcher (must be kept alive!)
    _watcher: RecommendedWatcher,
}

impl SnapshotWatcher {
    /// Start watching `path`
    ///
    /// The file is not loaded up front; call [`load_into`] first if the
    /// resolver should be ready before the first change.
    pub fn spawn(
        resolver: Arc<Resolver>,
        path: impl AsRef<Path>,
        input: WatchInput,
        options: WatchOptions,
    ) -> Result<Self, GeoError> {
        // Canonicalize path to resolve symlinks (important on macOS)
        let path: PathBuf = path
            .as_ref()
            .canonicalize()
            .map_err(|e| GeoError::Io(format!("Failed to canonicalize path: {}", e)))?;

        let (shutdown_tx, shutdown_rx) = unbounded::<()>();
        let (event_tx, event_rx) = unbounded();

        let mut watcher = RecommendedWatcher::new(
            move |event: notify::Result<notify::Event>| {
                let _ = event_tx.send(event);
            },
            Config::default(),
        )
        .map_err(|e| GeoError::Io(format!("Failed to create file watcher: {}", e)))?;

        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|e| GeoError::Io(format!("Failed to watch file: {}", e)))?;

        let reloads = Arc::new(AtomicU64::new(0));
        let failures = Arc::new(AtomicU64::new(0));
        let thread_reloads = Arc::clone(&reloads);
        let thread_failures = Arc::clone(&failures);

        let handle = thread::spawn(move || {
            let mut last_event_time: Option<Instant> = None;

            loop {
                select! {
                    recv(shutdown_rx) -> _ => break,
                    recv(event_rx) -> event => match event {
                        Ok(Ok(_)) => last_event_time = Some(Instant::now()),
                        Ok(Err(e)) => log::warn!("File watcher error: {}", e),
                        Err(_) => break,
                    },
                    default(Duration::from_millis(50)) => {}
                }

                let settled = last_event_time
                    .map(|t| t.elapsed() >= options.debounce)
                    .unwrap_or(false);
                if !settled {
                    continue;
                }
                last_event_time = None;

                log::info!("Change detected, reloading {}", path.display());
                match load_into(&resolver, &path, input, &options.build) {
                    Ok(()) => {
                        thread_reloads.fetch_add(1, Ordering::Release);
                    }
                    Err(e) => {
                        thread_failures.fetch_add(1, Ordering::Release);
                        log::warn!(
                            "Reload of {} failed, keeping generation {}: {}",
                            path.display(),
                            resolver.generation(),
                            e
                        );
                    }
                }
            }
        });

        Ok(Self {
            shutdown_tx,
            handle: Some(handle),
            reloads,
            failures,
            _watcher: watcher,
        })
    }

    /// Successful reloads performed by this watcher
    pub fn reload_count(&self) -> u64 {
        self.reloads.load(Ordering::Acquire)
    }

    /// Failed reload attempts
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }

    /// Stop watching and wait for the watcher thread to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SnapshotWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
