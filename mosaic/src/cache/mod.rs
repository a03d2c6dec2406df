//! Cache and load queue orchestrator.
//!
//! The central id → state map behind one coarse mutex, a fixed pool of
//! worker threads, and two condition variables:
//!
//! - `work_ready` — workers sleep here when no queue entry is actionable.
//! - `asset_done` — callers blocked in [`AssetCache::get`] sleep here while
//!   their id is building elsewhere; every commit broadcasts.
//!
//! State machine per id:
//!
//! ```text
//! Uncached -> Queued(Load) -> Working -> Cached-success
//!                                     -> Cached-failure (tombstone)
//!                                     -> Queued(Load)          (dependency not ready, to back)
//!                                     -> Queued(PostProcess) -> Working -> Cached-success
//! ```
//!
//! All decode/script work happens with the lock released; the lock is only
//! reacquired to commit. Builders re-enter the orchestrator through the
//! non-blocking [`DependencyGateway`], so a build can never deadlock on
//! itself. Caller threads participate in the pool: a `get` whose build
//! pends on a dependency services one other actionable entry (usually that
//! dependency) instead of going to sleep.

mod queue;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::build::{build_asset, post_process_asset, BuildContext, BuildOutcome, DependencyGateway};
use crate::config::EngineConfig;
use crate::error::AssetError;
use crate::frames::FrameResolver;
use crate::id::{AssetId, AssetKind};
use crate::index::OverlayIndex;
use crate::patch::PatchPipeline;
use crate::payload::AssetPayload;
use crate::script::ScriptRuntime;

use queue::{LoadQueue, TakenWork};

/// How long a sleeping worker waits before re-checking the shutdown flag.
const WORKER_PARK_TIMEOUT: Duration = Duration::from_millis(100);

/// One cached slot: a live payload or a permanent failure tombstone.
enum CacheSlot {
    Cached {
        payload: AssetPayload,
        last_access: Instant,
    },
    Failed(AssetError),
}

struct CacheInner {
    slots: HashMap<AssetId, CacheSlot>,
    queue: LoadQueue,
}

/// Counters for one cleanup sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    /// Slots evicted.
    pub evicted: usize,
    /// Retained slots whose timestamp was refreshed instead.
    pub refreshed: usize,
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub cached: usize,
    pub failed: usize,
    pub queued: usize,
}

/// Outcome of one committed unit of work.
enum CommitResult {
    /// The id reached a terminal state.
    Done(Result<AssetPayload, AssetError>),
    /// The id went back into the queue (dependency pending, or load phase
    /// handed off to post-process).
    Requeued,
}

struct CacheShared {
    inner: Mutex<CacheInner>,
    work_ready: Condvar,
    asset_done: Condvar,
    janitor_wake: Condvar,
    shutdown: AtomicBool,

    index: Arc<OverlayIndex>,
    patches: PatchPipeline,
    frames: FrameResolver,
    config: EngineConfig,

    image_fallback: Option<AssetId>,
    audio_fallback: Option<AssetId>,
}

impl CacheShared {
    fn build_context(&self) -> BuildContext<'_> {
        BuildContext {
            index: &self.index,
            patches: &self.patches,
            frames: &self.frames,
            config: &self.config,
            deps: self,
        }
    }

    /// Executes one unit of work with the lock released, then commits.
    fn run_unit(&self, id: &AssetId, work: TakenWork) -> CommitResult {
        let result = match work {
            TakenWork::Load => build_asset(&self.build_context(), id),
            TakenWork::PostProcess(payload) => {
                post_process_asset(&self.build_context(), id, payload).map(BuildOutcome::Ready)
            }
        };

        let mut inner = self.inner.lock();
        match result {
            Ok(BuildOutcome::Ready(payload)) => {
                debug!(id = %id, "asset cached");
                inner.slots.insert(
                    id.clone(),
                    CacheSlot::Cached {
                        payload: payload.clone(),
                        last_access: Instant::now(),
                    },
                );
                inner.queue.remove(id);
                self.asset_done.notify_all();
                self.work_ready.notify_all();
                CommitResult::Done(Ok(payload))
            }
            Ok(BuildOutcome::PostProcess(payload)) => {
                inner.queue.requeue_post_process(id, payload);
                self.work_ready.notify_one();
                CommitResult::Requeued
            }
            Ok(BuildOutcome::Pending) => {
                debug!(id = %id, "dependency not ready, requeued to back");
                inner.queue.requeue_load(id);
                self.work_ready.notify_one();
                CommitResult::Requeued
            }
            Err(err) => self.commit_failure(&mut inner, id, err),
        }
    }

    /// One TTL sweep over the cached slots. Queued and fresh slots stay;
    /// retained slots get a timestamp refresh; tombstones always survive.
    fn sweep(&self) -> CleanupStats {
        let ttl = self.config.asset_ttl;
        let now = Instant::now();
        let mut stats = CleanupStats::default();

        let mut inner = self.inner.lock();
        let CacheInner { slots, queue } = &mut *inner;
        slots.retain(|id, slot| match slot {
            CacheSlot::Cached {
                payload,
                last_access,
            } => {
                if queue.is_queued(id) || now.duration_since(*last_access) < ttl {
                    return true;
                }
                if payload.is_externally_retained() {
                    *last_access = now;
                    stats.refreshed += 1;
                    return true;
                }
                debug!(id = %id, "evicting idle asset");
                stats.evicted += 1;
                false
            }
            CacheSlot::Failed(_) => true,
        });
        stats
    }

    fn commit_failure(
        &self,
        inner: &mut CacheInner,
        id: &AssetId,
        err: AssetError,
    ) -> CommitResult {
        // Image and audio failures may substitute a configured fallback
        // instead of tombstoning.
        let fallback = match id.kind() {
            AssetKind::Image => self.image_fallback.as_ref(),
            AssetKind::Audio => self.audio_fallback.as_ref(),
            _ => None,
        };
        if let Some(fallback_id) = fallback {
            if fallback_id != id {
                match inner.slots.get(fallback_id) {
                    Some(CacheSlot::Cached { payload, .. }) => {
                        warn!(id = %id, fallback = %fallback_id, error = %err,
                            "build failed, substituting fallback asset");
                        let payload = payload.clone();
                        inner.slots.insert(
                            id.clone(),
                            CacheSlot::Cached {
                                payload: payload.clone(),
                                last_access: Instant::now(),
                            },
                        );
                        inner.queue.remove(id);
                        self.asset_done.notify_all();
                        self.work_ready.notify_all();
                        return CommitResult::Done(Ok(payload));
                    }
                    // Fallback itself failed: tombstone the original error.
                    Some(CacheSlot::Failed(_)) => {}
                    None => {
                        debug!(id = %id, fallback = %fallback_id,
                            "build failed, waiting for fallback asset");
                        inner.queue.enqueue(fallback_id);
                        inner.queue.requeue_load(id);
                        self.work_ready.notify_all();
                        return CommitResult::Requeued;
                    }
                }
            }
        }

        // Synchronous errors are filtered at the query surface by
        // `validate`; an error reaching this point came out of a build
        // (possibly a dependency reference to a missing path) and must
        // tombstone, or the dependent entry would requeue forever.
        inner.queue.remove(id);
        warn!(id = %id, error = %err, "build failed, caching failure tombstone");
        inner.slots.insert(id.clone(), CacheSlot::Failed(err.clone()));
        self.asset_done.notify_all();
        self.work_ready.notify_all();
        CommitResult::Done(Err(err))
    }
}

impl DependencyGateway for CacheShared {
    fn try_dependency(&self, id: &AssetId) -> Result<Option<AssetPayload>, AssetError> {
        let mut inner = self.inner.lock();
        match inner.slots.get_mut(id) {
            Some(CacheSlot::Cached {
                payload,
                last_access,
            }) => {
                *last_access = Instant::now();
                Ok(Some(payload.clone()))
            }
            Some(CacheSlot::Failed(err)) => Err(err.clone()),
            None => {
                if inner.queue.enqueue(id) {
                    self.work_ready.notify_one();
                }
                Ok(None)
            }
        }
    }
}

/// The orchestrator: cache, queue, and worker pool.
pub(crate) struct AssetCache {
    shared: Arc<CacheShared>,
    workers: Vec<JoinHandle<()>>,
    janitor: Option<JoinHandle<()>>,
}

impl AssetCache {
    pub(crate) fn new(
        index: Arc<OverlayIndex>,
        config: EngineConfig,
        runtime: Option<Arc<dyn ScriptRuntime>>,
    ) -> Self {
        let image_fallback = parse_fallback(config.image_fallback.as_deref(), AssetKind::Image);
        let audio_fallback = parse_fallback(config.audio_fallback.as_deref(), AssetKind::Audio);

        let shared = Arc::new(CacheShared {
            inner: Mutex::new(CacheInner {
                slots: HashMap::new(),
                queue: LoadQueue::new(),
            }),
            work_ready: Condvar::new(),
            asset_done: Condvar::new(),
            janitor_wake: Condvar::new(),
            shutdown: AtomicBool::new(false),
            patches: PatchPipeline::new(runtime),
            frames: FrameResolver::new(Arc::clone(&index)),
            config,
            index,
            image_fallback,
            audio_fallback,
        });

        let workers = (0..shared.config.worker_threads)
            .map(|n| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("mosaic-worker-{n}"))
                    .spawn(move || worker_loop(shared))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        let janitor = shared.config.cleanup_interval.map(|interval| {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("mosaic-janitor".to_string())
                .spawn(move || janitor_loop(shared, interval))
                .expect("failed to spawn janitor thread")
        });

        info!(
            workers = shared.config.worker_threads,
            janitor = janitor.is_some(),
            "asset cache started"
        );

        Self {
            shared,
            workers,
            janitor,
        }
    }

    /// Blocking fetch: returns the cached payload, building inline when
    /// needed, waiting on the condition variable while the id is building
    /// elsewhere or a dependency has to land first.
    pub(crate) fn get(&self, id: &AssetId) -> Result<AssetPayload, AssetError> {
        self.validate(id)?;

        loop {
            let mut inner = self.shared.inner.lock();
            match inner.slots.get_mut(id) {
                Some(CacheSlot::Cached {
                    payload,
                    last_access,
                }) => {
                    *last_access = Instant::now();
                    return Ok(payload.clone());
                }
                Some(CacheSlot::Failed(err)) => return Err(err.clone()),
                None => {}
            }

            let Some(work) = inner.queue.claim(id) else {
                // Someone else is building this id right now.
                self.shared.asset_done.wait(&mut inner);
                continue;
            };
            drop(inner);

            match self.shared.run_unit(id, work) {
                CommitResult::Done(result) => return result,
                CommitResult::Requeued => {
                    // Help with other queued work (usually the dependency we
                    // just enqueued) instead of sleeping, so progress never
                    // depends on the pool size.
                    let mut inner = self.shared.inner.lock();
                    if let Some((other_id, other_work)) = inner.queue.take_actionable() {
                        drop(inner);
                        let _ = self.shared.run_unit(&other_id, other_work);
                        thread::yield_now();
                    } else {
                        self.shared.asset_done.wait(&mut inner);
                    }
                }
            }
        }
    }

    /// Non-blocking fetch: cached payload, tombstone error, or `None` after
    /// ensuring the id is queued. Polling with `try_get` is the expected
    /// non-blocking pattern.
    pub(crate) fn try_get(&self, id: &AssetId) -> Result<Option<AssetPayload>, AssetError> {
        self.validate(id)?;

        let mut inner = self.shared.inner.lock();
        match inner.slots.get_mut(id) {
            Some(CacheSlot::Cached {
                payload,
                last_access,
            }) => {
                *last_access = Instant::now();
                Ok(Some(payload.clone()))
            }
            Some(CacheSlot::Failed(err)) => Err(err.clone()),
            None => {
                if inner.queue.enqueue(id) {
                    self.shared.work_ready.notify_one();
                }
                Ok(None)
            }
        }
    }

    /// Ensures an id is queued, without waiting for a result.
    pub(crate) fn queue(&self, id: &AssetId) {
        if self.validate(id).is_err() {
            warn!(id = %id, "ignoring queue request for unknown path");
            return;
        }
        let mut inner = self.shared.inner.lock();
        if !inner.slots.contains_key(id) && inner.queue.enqueue(id) {
            self.shared.work_ready.notify_one();
        }
    }

    /// Bulk [`queue`](Self::queue).
    pub(crate) fn queue_all<I: IntoIterator<Item = AssetId>>(&self, ids: I) {
        for id in ids {
            self.queue(&id);
        }
    }

    /// Evicts cached, non-queued slots idle past the TTL. Slots whose
    /// payload is still externally retained only get their timestamp
    /// refreshed. Failure tombstones survive every sweep; only
    /// [`clear`](Self::clear) removes them.
    pub(crate) fn cleanup(&self) -> CleanupStats {
        self.shared.sweep()
    }

    /// Force-evicts every non-retained, non-queued slot immediately,
    /// tombstones included.
    pub(crate) fn clear(&self) -> usize {
        let mut inner = self.shared.inner.lock();
        let CacheInner { slots, queue } = &mut *inner;
        let before = slots.len();
        slots.retain(|id, slot| {
            if queue.is_queued(id) {
                return true;
            }
            match slot {
                CacheSlot::Cached { payload, .. } => payload.is_externally_retained(),
                CacheSlot::Failed(_) => false,
            }
        });
        let cleared = before - slots.len();
        info!(cleared, "cache cleared");
        cleared
    }

    /// Occupancy snapshot.
    pub(crate) fn stats(&self) -> CacheStats {
        let inner = self.shared.inner.lock();
        let mut stats = CacheStats {
            queued: inner.queue.len(),
            ..CacheStats::default()
        };
        for slot in inner.slots.values() {
            match slot {
                CacheSlot::Cached { .. } => stats.cached += 1,
                CacheSlot::Failed(_) => stats.failed += 1,
            }
        }
        stats
    }

    fn validate(&self, id: &AssetId) -> Result<(), AssetError> {
        if self.shared.index.contains(id.path()) {
            Ok(())
        } else {
            Err(AssetError::NotFound {
                path: id.path().to_string(),
            })
        }
    }
}

impl Drop for AssetCache {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        {
            // Take the lock once so no thread can race past its shutdown
            // check into a wait it would never leave.
            let _inner = self.shared.inner.lock();
            self.shared.work_ready.notify_all();
            self.shared.asset_done.notify_all();
            self.shared.janitor_wake.notify_all();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        if let Some(janitor) = self.janitor.take() {
            let _ = janitor.join();
        }
        info!("asset cache stopped");
    }
}

fn worker_loop(shared: Arc<CacheShared>) {
    debug!("worker started");
    loop {
        let taken = {
            let mut inner = shared.inner.lock();
            loop {
                if shared.shutdown.load(Ordering::Acquire) {
                    return;
                }
                if let Some(taken) = inner.queue.take_actionable() {
                    break taken;
                }
                let _ = shared
                    .work_ready
                    .wait_for(&mut inner, WORKER_PARK_TIMEOUT);
            }
        };

        let (id, work) = taken;
        let _ = shared.run_unit(&id, work);
        thread::yield_now();
    }
}

fn janitor_loop(shared: Arc<CacheShared>, interval: Duration) {
    debug!(interval = ?interval, "janitor started");
    loop {
        {
            let mut inner = shared.inner.lock();
            if shared.shutdown.load(Ordering::Acquire) {
                return;
            }
            let _ = shared.janitor_wake.wait_for(&mut inner, interval);
            if shared.shutdown.load(Ordering::Acquire) {
                return;
            }
        }

        let stats = shared.sweep();
        if stats.evicted > 0 || stats.refreshed > 0 {
            debug!(evicted = stats.evicted, refreshed = stats.refreshed, "janitor sweep");
        }
    }
}

fn parse_fallback(query: Option<&str>, kind: AssetKind) -> Option<AssetId> {
    let query = query?;
    match AssetId::parse(kind, query) {
        Ok(id) => Some(id),
        Err(err) => {
            warn!(query = %query, error = %err, "ignoring invalid fallback asset");
            None
        }
    }
}
