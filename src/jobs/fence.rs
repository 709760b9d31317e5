//! Per-chunk fences: the tail of all work scheduled against a chunk.
//!
//! The registry is an explicit service object. It is sharded so independent
//! chunk pipelines only contend on bookkeeping for chunks that hash together.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::jobs::scheduler::{JobHandle, JobScheduler};
use crate::voxel::chunk::ChunkId;

const SHARD_COUNT: usize = 16;

#[derive(Debug)]
struct FenceEntry {
    tail: JobHandle,
    /// First unsuccessful `try_complete` since the tail last changed
    busy_since: Option<Instant>,
    warned: bool,
}

impl FenceEntry {
    fn new(tail: JobHandle) -> Self {
        Self { tail, busy_since: None, warned: false }
    }
}

#[derive(Debug)]
pub struct FenceRegistry {
    scheduler: JobScheduler,
    shards: Vec<Mutex<HashMap<ChunkId, FenceEntry>>>,
    stall_warning: Option<Duration>,
    shut_down: AtomicBool,
}

impl FenceRegistry {
    /// Create a registry that combines tails on `scheduler`. `capacity` is
    /// the expected number of chunks.
    pub fn initialize(scheduler: JobScheduler, capacity: usize) -> Self {
        let per_shard = capacity.div_ceil(SHARD_COUNT);
        let shards = (0..SHARD_COUNT)
            .map(|_| Mutex::new(HashMap::with_capacity(per_shard)))
            .collect();
        debug!("Fence registry initialized for {} chunks", capacity);

        Self {
            scheduler,
            shards,
            stall_warning: None,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Log a warning when a fence stays busy for longer than `threshold`.
    /// Purely diagnostic: polling still retries forever.
    pub fn with_stall_warning(mut self, threshold: Option<Duration>) -> Self {
        self.stall_warning = threshold;
        self
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    fn shard(&self, id: &ChunkId) -> MutexGuard<'_, HashMap<ChunkId, FenceEntry>> {
        let [x, y, z] = id.slot;
        let h = (id.grid.0 as usize)
            .wrapping_mul(31)
            .wrapping_add(x as usize * 7)
            .wrapping_add(y as usize * 13)
            .wrapping_add(z as usize);
        self.shards[h % SHARD_COUNT].lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current tail for `id`, or a completed handle when nothing is scheduled.
    pub fn get_fence(&self, id: ChunkId) -> JobHandle {
        self.shard(&id)
            .get(&id)
            .map(|entry| entry.tail.clone())
            .unwrap_or_default()
    }

    /// Make `new_tail` part of the fence. Later readers wait on both the
    /// previous tail and `new_tail`.
    pub fn update_fence(&self, id: ChunkId, new_tail: JobHandle) {
        if self.shut_down.load(Ordering::Acquire) {
            warn!("Fence update for {:?} after shutdown", id);
        }
        let mut shard = self.shard(&id);
        match shard.get_mut(&id) {
            Some(entry) => {
                entry.tail = self.scheduler.combine(&[entry.tail.clone(), new_tail]);
                entry.busy_since = None;
                entry.warned = false;
            }
            None => {
                shard.insert(id, FenceEntry::new(new_tail));
            }
        }
    }

    /// Non-blocking. Clears the fence and returns true when all work for
    /// `id` has finished; otherwise leaves it for a later pass.
    pub fn try_complete(&self, id: ChunkId) -> bool {
        let mut shard = self.shard(&id);
        let Some(entry) = shard.get_mut(&id) else { return true };

        if entry.tail.is_complete() {
            shard.remove(&id);
            return true;
        }

        if let Some(threshold) = self.stall_warning {
            let since = *entry.busy_since.get_or_insert_with(Instant::now);
            let elapsed = since.elapsed();
            if elapsed >= threshold && !entry.warned {
                entry.warned = true;
                warn!(
                    "Chunk {:?} fence ({}) busy for {:?}; still waiting",
                    id,
                    entry.tail.label(),
                    elapsed
                );
            }
        }
        false
    }

    /// Non-mutating check that no work is outstanding for `id`.
    pub fn is_idle(&self, id: ChunkId) -> bool {
        self.shard(&id).get(&id).is_none_or(|entry| entry.tail.is_complete())
    }

    /// Blocking. Waits for all work on `id`, including work added while
    /// waiting, then clears the fence.
    pub fn complete_and_reset(&self, id: ChunkId) {
        loop {
            let tail = {
                let mut shard = self.shard(&id);
                match shard.get(&id) {
                    None => return,
                    Some(entry) if entry.tail.is_complete() => {
                        shard.remove(&id);
                        return;
                    }
                    Some(entry) => entry.tail.clone(),
                }
            };
            tail.wait();
        }
    }

    /// Chunks with a fence entry, finished or not.
    pub fn pending_count(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    /// Block until every registered fence has completed.
    pub fn complete_all(&self) {
        let ids: Vec<ChunkId> = self
            .shards
            .iter()
            .flat_map(|s| {
                s.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .keys()
                    .copied()
                    .collect::<Vec<_>>()
            })
            .collect();
        for id in ids {
            self.complete_and_reset(id);
        }
    }

    /// Drain all outstanding work and mark the registry closed.
    pub fn shutdown(&self) {
        self.scheduler.flush();
        while self.pending_count() > 0 {
            self.complete_all();
        }
        self.shut_down.store(true, Ordering::Release);
        info!("Fence registry shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}
