//! Load queue and per-id build states.
//!
//! Every queued id carries one state:
//!
//! - `Load` — waiting to be built.
//! - `Working` — a worker (or caller thread) is building it right now;
//!   nobody else may pick it up.
//! - `PostProcess` — loaded, holding its intermediate payload, waiting for
//!   the post-process phase.
//!
//! Scheduling policy: insertion-order scan, `Load` entries before
//! `PostProcess` entries, `Working` entries skipped. An entry whose
//! dependency is not ready is requeued to the back, so one stuck
//! dependency cannot starve everything behind it.

use std::collections::{HashMap, VecDeque};

use crate::id::AssetId;
use crate::payload::AssetPayload;

/// State of one queued id.
pub(crate) enum QueueState {
    Load,
    Working,
    PostProcess(AssetPayload),
}

/// A unit of work taken from the queue; the entry is `Working` until the
/// taker commits.
pub(crate) enum TakenWork {
    Load,
    PostProcess(AssetPayload),
}

/// The pending-work side of the cache, guarded by the cache's coarse lock.
pub(crate) struct LoadQueue {
    /// Scan order. Entries stay in place while `Working`.
    order: VecDeque<AssetId>,
    states: HashMap<AssetId, QueueState>,
}

impl LoadQueue {
    pub(crate) fn new() -> Self {
        Self {
            order: VecDeque::new(),
            states: HashMap::new(),
        }
    }

    /// Ensures an id is queued for loading. Returns `true` if it was newly
    /// added, `false` if already present in any state.
    pub(crate) fn enqueue(&mut self, id: &AssetId) -> bool {
        if self.states.contains_key(id) {
            return false;
        }
        self.states.insert(id.clone(), QueueState::Load);
        self.order.push_back(id.clone());
        true
    }

    /// Whether an id is present in any state.
    pub(crate) fn is_queued(&self, id: &AssetId) -> bool {
        self.states.contains_key(id)
    }

    /// Claims a specific id for an inline build. Returns `None` when the id
    /// is already `Working` elsewhere; otherwise marks it `Working` (adding
    /// it to the queue if absent) and hands back the work to perform.
    pub(crate) fn claim(&mut self, id: &AssetId) -> Option<TakenWork> {
        match self.states.get(id) {
            Some(QueueState::Working) => None,
            Some(QueueState::Load) => {
                self.states.insert(id.clone(), QueueState::Working);
                Some(TakenWork::Load)
            }
            Some(QueueState::PostProcess(_)) => {
                let Some(QueueState::PostProcess(payload)) =
                    self.states.insert(id.clone(), QueueState::Working)
                else {
                    return None;
                };
                Some(TakenWork::PostProcess(payload))
            }
            None => {
                self.states.insert(id.clone(), QueueState::Working);
                self.order.push_back(id.clone());
                Some(TakenWork::Load)
            }
        }
    }

    /// Takes the highest-priority actionable entry: the first `Load` in
    /// scan order, else the first `PostProcess`. The entry becomes
    /// `Working`.
    pub(crate) fn take_actionable(&mut self) -> Option<(AssetId, TakenWork)> {
        let mut first_post_process: Option<AssetId> = None;

        for id in &self.order {
            match self.states.get(id) {
                Some(QueueState::Load) => {
                    let id = id.clone();
                    self.states.insert(id.clone(), QueueState::Working);
                    return Some((id, TakenWork::Load));
                }
                Some(QueueState::PostProcess(_)) if first_post_process.is_none() => {
                    first_post_process = Some(id.clone());
                }
                _ => {}
            }
        }

        let id = first_post_process?;
        let Some(QueueState::PostProcess(payload)) =
            self.states.insert(id.clone(), QueueState::Working)
        else {
            return None;
        };
        Some((id, TakenWork::PostProcess(payload)))
    }

    /// Returns a `Working` entry to the back of the queue as `Load`
    /// (dependency was not ready).
    pub(crate) fn requeue_load(&mut self, id: &AssetId) {
        self.states.insert(id.clone(), QueueState::Load);
        self.move_to_back(id);
    }

    /// Returns a `Working` entry to the back of the queue, now waiting for
    /// post-processing with its intermediate payload.
    pub(crate) fn requeue_post_process(&mut self, id: &AssetId, payload: AssetPayload) {
        self.states
            .insert(id.clone(), QueueState::PostProcess(payload));
        self.move_to_back(id);
    }

    /// Removes an id entirely (build committed or tombstoned).
    pub(crate) fn remove(&mut self, id: &AssetId) {
        self.states.remove(id);
        self.order.retain(|queued| queued != id);
    }

    pub(crate) fn len(&self) -> usize {
        self.states.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn move_to_back(&mut self, id: &AssetId) {
        self.order.retain(|queued| queued != id);
        self.order.push_back(id.clone());
    }
}
