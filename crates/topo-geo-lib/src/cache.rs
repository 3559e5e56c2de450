//! StaticTopologyCache - File-backed topology and FeatureCollection cache
//!
//! The cache owns one entry per generation of the source file. An entry is published
//! as an `Arc` and never mutated afterwards; a newer source file or a finished build
//! replaces it wholesale. Readers take a shared lock only long enough to clone the
//! current `Arc`. Loads and builds are serialized behind a single rebuild gate and
//! re-checked once the gate is held, so concurrent callers reuse the result of the
//! caller that got there first instead of repeating the work.

use crate::feature::{BuildReport, CollectionInfo, FeatureCollection, build_with_report};
use crate::topology::Topology;
use crate::{Result, TopoError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::SystemTime;

/// Default file name of the topology inside the assets directory
pub const DEFAULT_TOPOLOGY_FILE: &str = "topo.json";

/// Configuration for the topology cache
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Path of the topology source file
    pub source_path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from_assets_dir("assets")
    }
}

impl CacheConfig {
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
        }
    }

    /// Topology file named `topo.json` inside an assets directory
    pub fn from_assets_dir(assets_dir: impl AsRef<Path>) -> Self {
        Self::new(assets_dir.as_ref().join(DEFAULT_TOPOLOGY_FILE))
    }
}

/// One generation of cached data
#[derive(Debug)]
struct CacheEntry {
    topology: Arc<Topology>,
    /// Present once the generation has been converted
    features: Option<Arc<FeatureCollection>>,
    report: Option<Arc<BuildReport>>,
    info: Option<CollectionInfo>,
    loaded_at: SystemTime,
    source_mod_time: SystemTime,
    generation: u64,
}

impl CacheEntry {
    /// The entry is fresh unless the file was modified after it was loaded
    #[inline]
    fn is_fresh(&self, mod_time: SystemTime) -> bool {
        mod_time <= self.source_mod_time
    }
}

/// Source file version that failed to load, remembered until its mtime changes
#[derive(Debug)]
struct RejectedSource {
    mod_time: SystemTime,
    reason: String,
}

/// Guard of the rebuild gate, which also holds the last rejected source
type RebuildGate<'a> = MutexGuard<'a, Option<RejectedSource>>;

/// A converted collection together with the generation it belongs to
#[derive(Debug, Clone)]
pub struct FeatureSnapshot {
    pub generation: u64,
    pub features: Arc<FeatureCollection>,
}

/// Read-only diagnostic view of the cache
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub loaded: bool,
    pub loaded_at: Option<SystemTime>,
    pub source_path: PathBuf,
    pub source_mod_time: Option<SystemTime>,
    /// Generation of the current entry, 0 before the first load
    pub generation: u64,
    /// Present once the current generation has been converted
    pub feature_count: Option<usize>,
    pub skipped_geometries: Option<usize>,
    /// Positions across all features of the current generation
    pub total_positions: Option<usize>,
    /// `[min_x, min_y, max_x, max_y]` of the current generation
    pub bounding_box: Option<[f64; 4]>,
    /// Successful topology loads since construction
    pub loads: u64,
    /// Successful conversions since construction
    pub builds: u64,
}

/// Cache of the topology file and its decoded FeatureCollection
///
/// Construct one per service and share it by `Arc`.
#[derive(Debug)]
pub struct StaticTopologyCache {
    config: CacheConfig,
    /// Current generation (None while empty)
    entry: RwLock<Option<Arc<CacheEntry>>>,
    /// Held by whoever loads or converts; remembers the last rejected source
    rebuild: Mutex<Option<RejectedSource>>,
    loads: AtomicU64,
    builds: AtomicU64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl StaticTopologyCache {
    /// Create an empty cache; nothing is read until first access
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entry: RwLock::new(None),
            rebuild: Mutex::new(None),
            loads: AtomicU64::new(0),
            builds: AtomicU64::new(0),
        }
    }

    pub fn from_path(source_path: impl Into<PathBuf>) -> Self {
        Self::new(CacheConfig::new(source_path))
    }

    #[inline]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    #[inline]
    pub fn source_path(&self) -> &Path {
        &self.config.source_path
    }

    /// Make sure the loaded topology matches the source file
    ///
    /// Reloads when nothing is loaded yet or the file's modification time advanced past
    /// the loaded one. A failed reload leaves the previous entry in place.
    pub fn ensure_fresh(&self) -> Result<Arc<Topology>> {
        let mod_time = self.source_mod_time()?;
        if let Some(entry) = self.current() {
            if entry.is_fresh(mod_time) {
                return Ok(entry.topology.clone());
            }
        }

        let mut gate = self.lock_rebuild();
        let entry = self.refresh_locked(&mut gate, false)?;
        Ok(entry.topology.clone())
    }

    /// Reload the source file even if its modification time did not change
    pub fn reload(&self) -> Result<Arc<Topology>> {
        let mut gate = self.lock_rebuild();
        let entry = self.refresh_locked(&mut gate, true)?;
        Ok(entry.topology.clone())
    }

    /// The FeatureCollection of the current source file, built at most once per generation
    pub fn get_feature_collection(&self) -> Result<Arc<FeatureCollection>> {
        self.get_snapshot().map(|snapshot| snapshot.features)
    }

    /// Like [`Self::get_feature_collection`], tagged with the generation it belongs to
    pub fn get_snapshot(&self) -> Result<FeatureSnapshot> {
        let mod_time = self.source_mod_time()?;
        if let Some(snapshot) = self.fresh_snapshot(mod_time) {
            tracing::debug!("Topology cache hit (generation {})", snapshot.generation);
            return Ok(snapshot);
        }

        let mut gate = self.lock_rebuild();
        let entry = self.refresh_locked(&mut gate, false)?;
        if let Some(features) = &entry.features {
            // Another caller finished the build while we waited for the gate
            return Ok(FeatureSnapshot {
                generation: entry.generation,
                features: features.clone(),
            });
        }

        let (collection, report) = build_with_report(&entry.topology)?;
        self.builds.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            "GeoJSON generated and cached ({} features, {} skipped, generation {})",
            collection.len(),
            report.skipped_count(),
            entry.generation
        );

        let info = collection.info();
        let features = Arc::new(collection);
        let converted = Arc::new(CacheEntry {
            topology: entry.topology.clone(),
            features: Some(features.clone()),
            report: Some(Arc::new(report)),
            info: Some(info),
            loaded_at: entry.loaded_at,
            source_mod_time: entry.source_mod_time,
            generation: entry.generation,
        });
        self.publish(converted);

        Ok(FeatureSnapshot {
            generation: entry.generation,
            features,
        })
    }

    /// The last published FeatureCollection, without checking the source file
    pub fn cached_feature_collection(&self) -> Option<Arc<FeatureCollection>> {
        self.current().and_then(|entry| entry.features.clone())
    }

    /// Report of the last build of the current generation
    pub fn build_report(&self) -> Option<Arc<BuildReport>> {
        self.current().and_then(|entry| entry.report.clone())
    }

    /// Diagnostic view of the cache, without touching the source file
    pub fn stats(&self) -> CacheStats {
        let entry = self.current();
        CacheStats {
            loaded: entry.is_some(),
            loaded_at: entry.as_ref().map(|e| e.loaded_at),
            source_path: self.config.source_path.clone(),
            source_mod_time: entry.as_ref().map(|e| e.source_mod_time),
            generation: entry.as_ref().map_or(0, |e| e.generation),
            feature_count: entry
                .as_ref()
                .and_then(|e| e.features.as_ref())
                .map(|f| f.len()),
            skipped_geometries: entry
                .as_ref()
                .and_then(|e| e.report.as_ref())
                .map(|r| r.skipped_count()),
            total_positions: entry
                .as_ref()
                .and_then(|e| e.info.as_ref())
                .map(|i| i.total_positions),
            bounding_box: entry
                .as_ref()
                .and_then(|e| e.info.as_ref())
                .and_then(|i| i.bounding_box)
                .map(|r| [r.min().x, r.min().y, r.max().x, r.max().y]),
            loads: self.loads.load(Ordering::SeqCst),
            builds: self.builds.load(Ordering::SeqCst),
        }
    }

    /// Current entry, if any
    fn current(&self) -> Option<Arc<CacheEntry>> {
        let guard = match self.entry.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Topology cache lock poisoned; recovering");
                poisoned.into_inner()
            }
        };
        guard.clone()
    }

    fn fresh_snapshot(&self, mod_time: SystemTime) -> Option<FeatureSnapshot> {
        let entry = self.current()?;
        if !entry.is_fresh(mod_time) {
            return None;
        }
        let features = entry.features.clone()?;
        Some(FeatureSnapshot {
            generation: entry.generation,
            features,
        })
    }

    fn publish(&self, entry: Arc<CacheEntry>) {
        let mut guard = match self.entry.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Topology cache lock poisoned; recovering");
                poisoned.into_inner()
            }
        };
        *guard = Some(entry);
    }

    fn lock_rebuild(&self) -> RebuildGate<'_> {
        match self.rebuild.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Topology rebuild gate poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }

    fn source_mod_time(&self) -> Result<SystemTime> {
        let metadata = std::fs::metadata(&self.config.source_path)?;
        Ok(metadata.modified()?)
    }

    /// Load a new generation unless the current one is still fresh
    ///
    /// Must be called with the rebuild gate held. The source file is stat'ed again
    /// because it may have changed while the caller waited for the gate.
    fn refresh_locked(&self, gate: &mut RebuildGate<'_>, force: bool) -> Result<Arc<CacheEntry>> {
        let mod_time = self.source_mod_time()?;
        let current = self.current();
        if !force {
            if let Some(entry) = &current {
                if entry.is_fresh(mod_time) {
                    return Ok(entry.clone());
                }
            }
            if let Some(rejected) = &**gate {
                if rejected.mod_time == mod_time {
                    tracing::debug!("Topology source unchanged since rejection, not reloading");
                    return Err(TopoError::Rejected(rejected.reason.clone()));
                }
            }
        }

        let path = &self.config.source_path;
        tracing::info!("Loading topology from: {}", path.display());
        let bytes = std::fs::read(path)?;
        let topology = match Topology::from_slice(&bytes) {
            Ok(topology) => topology,
            Err(err) => {
                tracing::error!("Rejected topology {}: {}", path.display(), err);
                **gate = Some(RejectedSource {
                    mod_time,
                    reason: err.to_string(),
                });
                return Err(err);
            }
        };
        **gate = None;

        let generation = current.as_ref().map_or(0, |e| e.generation) + 1;
        let entry = Arc::new(CacheEntry {
            topology: Arc::new(topology),
            features: None,
            report: None,
            info: None,
            loaded_at: SystemTime::now(),
            source_mod_time: mod_time,
            generation,
        });
        self.publish(entry.clone());
        self.loads.fetch_add(1, Ordering::SeqCst);

        tracing::info!(
            "Topology loaded ({:.2} MB, {} arcs, generation {})",
            bytes.len() as f64 / 1024.0 / 1024.0,
            entry.topology.arc_count(),
            generation
        );
        Ok(entry)
    }
}
