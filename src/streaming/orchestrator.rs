//! Rolling-grid orchestrator: slides a grid's window one chunk slab per
//! batch and commits the whole slab at once.
//!
//! State machine per grid:
//!
//! ```text
//! Idle --begin_batch--> BatchActive --poll (fence done)--> Committed --take_commit--> Idle
//! ```

use std::collections::BTreeSet;

use glam::{IVec3, Vec3};
use log::{debug, info};

use crate::jobs::{FenceRegistry, JobHandle};
use crate::mesh::Mesher;
use crate::streaming::grid::Grid;
use crate::streaming::pipeline::{schedule_generate, schedule_mesh, schedule_seam_sync};
use crate::voxel::chunk::{Axis, ChunkCoord, GridId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrchestratorState {
    /// No batch in flight
    Idle,
    /// Entering slab is being generated, stitched and meshed
    BatchActive,
    /// Batch finished; commit payload is enabled until taken
    Committed,
}

/// Result of a move request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Target recorded; batches will drain it
    Accepted,
    /// Grid not ready yet; the request was dropped and should be resent
    Deferred,
    /// Target equals the current anchor
    NoOp,
}

/// Staged result of a batch
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CommitPayload {
    pub new_anchor: IVec3,
    /// World position of the window's minimum corner after the move
    pub new_origin: Vec3,
    pub enabled: bool,
}

/// One axis step chosen for a batch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchStep {
    pub axis: Axis,
    /// +1 or -1
    pub sign: i32,
    pub from: IVec3,
    pub to: IVec3,
}

/// Pick the single dominant axis of `delta` (ties: X before Y before Z) and
/// return a one-chunk step along it.
pub fn dominant_step(delta: IVec3) -> Option<(Axis, i32)> {
    if delta == IVec3::ZERO {
        return None;
    }
    let abs = delta.abs();
    let axis = if abs.x >= abs.y && abs.x >= abs.z {
        Axis::X
    } else if abs.y >= abs.z {
        Axis::Y
    } else {
        Axis::Z
    };
    Some((axis, delta[axis.index()].signum()))
}

#[derive(Debug)]
pub struct RollingGridOrchestrator {
    grid: GridId,
    state: OrchestratorState,
    pending_target: Option<IVec3>,
    batch_fence: JobHandle,
    commit: Option<CommitPayload>,
    last_step: Option<BatchStep>,
    batches: u64,
}

impl RollingGridOrchestrator {
    pub fn new(grid: GridId) -> Self {
        Self {
            grid,
            state: OrchestratorState::Idle,
            pending_target: None,
            batch_fence: JobHandle::completed(),
            commit: None,
            last_step: None,
            batches: 0,
        }
    }

    pub fn grid(&self) -> GridId {
        self.grid
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn has_pending_target(&self) -> bool {
        self.pending_target.is_some()
    }

    pub fn pending_target(&self) -> Option<IVec3> {
        self.pending_target
    }

    /// Combined fence of the batch in flight
    pub fn batch_fence(&self) -> &JobHandle {
        &self.batch_fence
    }

    pub fn last_step(&self) -> Option<BatchStep> {
        self.last_step
    }

    pub fn batches_started(&self) -> u64 {
        self.batches
    }

    /// Staged commit, if any (enabled or not)
    pub fn commit(&self) -> Option<&CommitPayload> {
        self.commit.as_ref()
    }

    /// Ask the window to move so its anchor becomes `target`.
    ///
    /// Requests made before the grid has been fully meshed once are
    /// deferred. While a batch is in flight, a new request retargets the
    /// remaining moves.
    pub fn request_move(&mut self, grid: &Grid, target: IVec3) -> MoveOutcome {
        if !grid.allocated() || (grid.chunk_count() > 0 && !grid.fully_meshed_once()) {
            debug!("Grid {:?} not ready, deferring move to {:?}", self.grid, target);
            return MoveOutcome::Deferred;
        }

        if self.state == OrchestratorState::Idle && target == grid.anchor() {
            self.pending_target = None;
            return MoveOutcome::NoOp;
        }

        self.pending_target = Some(target);
        MoveOutcome::Accepted
    }

    /// Start the next batch if idle with a pending target. Advances the grid
    /// anchor by exactly one chunk along the dominant axis and schedules the
    /// entering slab.
    pub fn begin_batch(&mut self, grid: &mut Grid, fences: &FenceRegistry, mesher: &Mesher) -> Option<BatchStep> {
        if self.state != OrchestratorState::Idle {
            return None;
        }
        let target = self.pending_target?;

        let from = grid.anchor();
        let Some((axis, sign)) = dominant_step(target - from) else {
            self.pending_target = None;
            return None;
        };
        let to = from + axis.unit() * sign;
        let step = BatchStep { axis, sign, from, to };

        let entering = entering_slab(grid, axis, sign);
        grid.set_anchor(to);

        for &c in &entering {
            schedule_generate(fences, grid.generator(), &grid.target(c));
        }

        // Stitch every entering chunk against each in-window neighbour,
        // always copying from the lower chunk into the higher one
        let mut pairs: BTreeSet<(ChunkCoord, usize)> = BTreeSet::new();
        let mut remesh: BTreeSet<ChunkCoord> = entering.iter().copied().collect();
        for &c in &entering {
            for a in Axis::ALL {
                for s in [-1, 1] {
                    let n = c.neighbor(a, s);
                    if !grid.contains(n) {
                        continue;
                    }
                    let (low, high) = if s > 0 { (c, n) } else { (n, c) };
                    if pairs.insert((low, a.index())) {
                        schedule_seam_sync(fences, &grid.target(low), &grid.target(high), a);
                        remesh.insert(high);
                    }
                }
            }
        }

        let meshes: Vec<JobHandle> = remesh
            .iter()
            .map(|&c| schedule_mesh(fences, mesher, &grid.target(c)))
            .collect();

        self.batch_fence = fences.scheduler().combine(&meshes);
        self.commit = Some(CommitPayload {
            new_anchor: to,
            new_origin: grid.window_origin(),
            enabled: false,
        });
        self.state = OrchestratorState::BatchActive;
        self.last_step = Some(step);
        self.batches += 1;

        info!(
            "Grid {:?} batch {}: anchor {:?} -> {:?} along {:?}, {} entering, {} remeshed",
            self.grid,
            self.batches,
            from,
            to,
            axis,
            entering.len(),
            remesh.len()
        );
        Some(step)
    }

    /// Non-blocking. Enables the commit once the batch fence has completed.
    /// Returns whether a commit is ready.
    pub fn poll(&mut self) -> bool {
        if self.state == OrchestratorState::BatchActive && self.batch_fence.is_complete() {
            if let Some(commit) = self.commit.as_mut() {
                commit.enabled = true;
            }
            self.batch_fence = JobHandle::completed();
            self.state = OrchestratorState::Committed;
        }
        self.state == OrchestratorState::Committed
    }

    /// Consume the enabled commit, returning the grid to `Idle`. Yields a
    /// payload at most once per batch.
    pub fn take_commit(&mut self) -> Option<CommitPayload> {
        if self.state != OrchestratorState::Committed {
            return None;
        }
        let commit = self.commit.take()?;
        self.state = OrchestratorState::Idle;
        debug!("Grid {:?} committed anchor {:?}", self.grid, commit.new_anchor);
        Some(commit)
    }
}

/// Coordinates that enter the window when the anchor moves one chunk along
/// `axis` in direction `sign`. They reuse the slots of the leaving slab.
pub fn entering_slab(grid: &Grid, axis: Axis, sign: i32) -> Vec<ChunkCoord> {
    let a = axis.index();
    let dims = grid.dims().as_ivec3();
    let anchor = grid.anchor();
    let layer = if sign > 0 { anchor[a] + dims[a] } else { anchor[a] - 1 };

    grid.chunk_coords()
        .filter(|c| c.as_ivec3()[a] == anchor[a])
        .map(|c| {
            let mut v = c.as_ivec3();
            v[a] = layer;
            ChunkCoord::from_ivec3(v)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::Generator;
    use crate::jobs::JobScheduler;
    use crate::streaming::grid::GridConfig;
    use glam::UVec3;

    fn setup(dims: UVec3) -> (Grid, FenceRegistry, RollingGridOrchestrator) {
        let grid = Grid::allocate(
            GridId(3),
            GridConfig {
                dims,
                rolling: true,
                generator: Generator::Plane { height: 20.5, material: 1 },
                ..Default::default()
            },
        );
        let fences = FenceRegistry::initialize(JobScheduler::new(2).unwrap(), 64);
        (grid, fences, RollingGridOrchestrator::new(GridId(3)))
    }

    fn finish(orchestrator: &mut RollingGridOrchestrator, fences: &FenceRegistry) -> CommitPayload {
        orchestrator.batch_fence().wait();
        fences.complete_all();
        assert!(orchestrator.poll());
        orchestrator.take_commit().unwrap()
    }

    #[test]
    fn test_dominant_step() {
        assert_eq!(dominant_step(IVec3::ZERO), None);
        assert_eq!(dominant_step(IVec3::new(2, 0, 1)), Some((Axis::X, 1)));
        assert_eq!(dominant_step(IVec3::new(0, -3, 3)), Some((Axis::Y, -1)));
        assert_eq!(dominant_step(IVec3::new(1, 1, 1)), Some((Axis::X, 1)));
        assert_eq!(dominant_step(IVec3::new(0, 0, -4)), Some((Axis::Z, -1)));
    }

    #[test]
    fn test_move_deferred_until_meshed() {
        let (mut grid, _fences, mut orchestrator) = setup(UVec3::new(2, 1, 2));
        assert_eq!(orchestrator.request_move(&grid, IVec3::X), MoveOutcome::Deferred);
        assert!(!orchestrator.has_pending_target());

        grid.mark_fully_meshed();
        assert_eq!(orchestrator.request_move(&grid, IVec3::ZERO), MoveOutcome::NoOp);
        assert_eq!(orchestrator.request_move(&grid, IVec3::X), MoveOutcome::Accepted);
        assert!(orchestrator.has_pending_target());
    }

    #[test]
    fn test_single_step_per_batch() {
        let (mut grid, fences, mut orchestrator) = setup(UVec3::new(3, 1, 2));
        grid.mark_fully_meshed();
        let mesher = Mesher::default();

        assert_eq!(orchestrator.request_move(&grid, IVec3::new(2, 0, 1)), MoveOutcome::Accepted);

        let mut anchors = Vec::new();
        while let Some(step) = orchestrator.begin_batch(&mut grid, &fences, &mesher) {
            let moved = step.to - step.from;
            assert_eq!(moved.abs().element_sum(), 1, "batch moved {moved:?}");
            assert_eq!(grid.anchor(), step.to);
            assert_eq!(orchestrator.state(), OrchestratorState::BatchActive);

            // No second batch while one is in flight
            assert!(orchestrator.begin_batch(&mut grid, &fences, &mesher).is_none());

            let commit = finish(&mut orchestrator, &fences);
            assert!(commit.enabled);
            assert_eq!(commit.new_anchor, step.to);
            assert_eq!(orchestrator.state(), OrchestratorState::Idle);
            anchors.push(commit.new_anchor);
        }

        assert!(!orchestrator.has_pending_target());
        assert_eq!(anchors, vec![IVec3::new(1, 0, 0), IVec3::new(2, 0, 0), IVec3::new(2, 0, 1)]);
        assert_eq!(orchestrator.batches_started(), 3);
    }

    #[test]
    fn test_commit_taken_once() {
        let (mut grid, fences, mut orchestrator) = setup(UVec3::new(2, 1, 2));
        grid.mark_fully_meshed();
        orchestrator.request_move(&grid, IVec3::new(-1, 0, 0));
        orchestrator.begin_batch(&mut grid, &fences, &Mesher::default()).unwrap();

        let staged = orchestrator.commit().copied().unwrap();
        assert!(!staged.enabled);
        assert!(orchestrator.take_commit().is_none());

        let commit = finish(&mut orchestrator, &fences);
        assert_eq!(commit.new_anchor, IVec3::new(-1, 0, 0));
        assert_eq!(commit.new_origin, grid.window_origin());
        assert!(orchestrator.take_commit().is_none());
        assert!(!orchestrator.poll());
    }

    #[test]
    fn test_zero_delta_is_noop() {
        let (mut grid, fences, mut orchestrator) = setup(UVec3::new(2, 1, 2));
        grid.mark_fully_meshed();
        orchestrator.request_move(&grid, IVec3::X);
        orchestrator.begin_batch(&mut grid, &fences, &Mesher::default()).unwrap();
        // Mid-batch request for the anchor this batch already moves to
        assert_eq!(orchestrator.request_move(&grid, IVec3::X), MoveOutcome::Accepted);
        finish(&mut orchestrator, &fences);
        assert!(orchestrator.has_pending_target());

        assert!(orchestrator.begin_batch(&mut grid, &fences, &Mesher::default()).is_none());
        assert!(!orchestrator.has_pending_target());
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
        assert_eq!(orchestrator.batches_started(), 1);
    }

    #[test]
    fn test_entering_slab_reuses_leaving_slots() {
        let (grid, _fences, _orchestrator) = setup(UVec3::new(3, 2, 2));
        let entering = entering_slab(&grid, Axis::X, 1);
        assert_eq!(entering.len(), 4);
        for c in &entering {
            assert_eq!(c.x, 3);
            let leaving = ChunkCoord::new(0, c.y, c.z);
            assert_eq!(grid.chunk_id(*c), grid.chunk_id(leaving));
        }

        let entering = entering_slab(&grid, Axis::Z, -1);
        assert!(entering.iter().all(|c| c.z == -1));
        assert_eq!(entering.len(), 6);
    }

    #[test]
    fn test_entering_chunks_meshed_and_stitched() {
        let (mut grid, fences, mut orchestrator) = setup(UVec3::new(2, 1, 1));
        grid.mark_fully_meshed();
        orchestrator.request_move(&grid, IVec3::X);
        orchestrator.begin_batch(&mut grid, &fences, &Mesher::default()).unwrap();
        finish(&mut orchestrator, &fences);

        let entering = ChunkCoord::new(2, 0, 0);
        let interior = ChunkCoord::new(1, 0, 0);
        let staged = grid.buffers(entering).staged();
        assert!(staged.pending);
        assert_eq!(staged.coord, Some(entering));
        assert!(!staged.mesh.is_empty());
        drop(staged);

        // Interior chunk was never generated here, but the stitch wrote its
        // overlap into the entering chunk's first layers
        let low = grid.buffers(interior).volume();
        let high = grid.buffers(entering).volume();
        assert!(crate::voxel::seam::overlap_matches(&low, &high, Axis::X));
    }
}
