//! VoxelWorld - the engine context owning grids, fences and the mesh consumer.
//!
//! All scheduling goes through [`VoxelWorld::update`], called once per pass
//! by the host. Chunks whose fences are still busy are skipped and retried on
//! the next pass; nothing in a pass blocks on background work.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use glam::{IVec3, Vec3};
use log::{debug, info, warn};

use crate::core::config::EngineConfig;
use crate::core::error::Error;
use crate::core::types::Result;
use crate::edit::Stamp;
use crate::jobs::{FenceRegistry, JobScheduler};
use crate::mesh::{Mesh, Mesher};
use crate::spatial::{IndexedChunk, SpatialIndex};
use crate::streaming::{
    schedule_generate, schedule_mesh, schedule_seam_sync, schedule_stamp, CommitPayload, Grid, GridConfig,
    MoveOutcome, OrchestratorState, RollingGridOrchestrator,
};
use crate::voxel::chunk::{Axis, ChunkCoord, ChunkId, ChunkInfo, GridId};
use crate::voxel::volume::VolumeView;

/// Receives finished meshes. Implementations upload or store them; the
/// world never touches a mesh again after handing it over.
pub trait MeshSink {
    /// New mesh for `chunk`, in chunk-local space placed at `world_origin`.
    fn apply(&mut self, chunk: ChunkId, coord: ChunkCoord, world_origin: Vec3, mesh: Mesh);

    /// The chunk no longer exists.
    fn remove(&mut self, chunk: ChunkId);

    /// A rolling grid finished moving; every mesh of the batch has been
    /// applied.
    fn on_commit(&mut self, _grid: GridId, _payload: &CommitPayload) {}
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredMesh {
    pub coord: ChunkCoord,
    pub world_origin: Vec3,
    pub mesh: Mesh,
}

/// In-memory [`MeshSink`] keyed by chunk.
#[derive(Debug, Default)]
pub struct MeshStore {
    meshes: HashMap<ChunkId, StoredMesh>,
    commits: Vec<(GridId, CommitPayload)>,
    applied: u64,
}

impl MeshStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, chunk: ChunkId) -> Option<&StoredMesh> {
        self.meshes.get(&chunk)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChunkId, &StoredMesh)> {
        self.meshes.iter()
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Total number of `apply` calls received
    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn commits(&self) -> &[(GridId, CommitPayload)] {
        &self.commits
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.values().map(|m| m.mesh.triangle_count()).sum()
    }

    pub fn vertex_count(&self) -> usize {
        self.meshes.values().map(|m| m.mesh.vertex_count()).sum()
    }
}

impl MeshSink for MeshStore {
    fn apply(&mut self, chunk: ChunkId, coord: ChunkCoord, world_origin: Vec3, mesh: Mesh) {
        self.applied += 1;
        self.meshes.insert(chunk, StoredMesh { coord, world_origin, mesh });
    }

    fn remove(&mut self, chunk: ChunkId) {
        self.meshes.remove(&chunk);
    }

    fn on_commit(&mut self, grid: GridId, payload: &CommitPayload) {
        self.commits.push((grid, *payload));
    }
}

/// What one scheduling pass did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub meshes_applied: usize,
    pub commits: usize,
    pub batches_started: usize,
    /// Grids that became fully meshed for the first time
    pub grids_completed: usize,
}

impl UpdateReport {
    pub fn is_quiet(&self) -> bool {
        *self == Self::default()
    }

    fn merge(&mut self, other: &UpdateReport) {
        self.meshes_applied += other.meshes_applied;
        self.commits += other.commits;
        self.batches_started += other.batches_started;
        self.grids_completed += other.grids_completed;
    }
}

#[derive(Debug)]
struct GridEntry {
    grid: Grid,
    orchestrator: Option<RollingGridOrchestrator>,
}

pub struct VoxelWorld<S: MeshSink = MeshStore> {
    config: EngineConfig,
    fences: FenceRegistry,
    mesher: Mesher,
    grids: BTreeMap<GridId, GridEntry>,
    index: SpatialIndex,
    sink: S,
    next_grid: u32,
}

impl<S: MeshSink> VoxelWorld<S> {
    /// Validate `config`, resolve the meshing mode and start the worker pool.
    pub fn new(config: EngineConfig, sink: S) -> Result<Self> {
        config.validate()?;
        let mesher = Mesher::from_config(&config.meshing)?;
        let scheduler = JobScheduler::new(config.worker_threads)?;
        let fences = FenceRegistry::initialize(scheduler, config.fence_capacity)
            .with_stall_warning(config.stall_warning());

        info!(
            "Voxel world started: {} workers, {:?} meshing",
            fences.scheduler().worker_count(),
            mesher.mode()
        );

        Ok(Self {
            config,
            fences,
            mesher,
            grids: BTreeMap::new(),
            index: SpatialIndex::default(),
            sink,
            next_grid: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn fences(&self) -> &FenceRegistry {
        &self.fences
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn grid(&self, id: GridId) -> Option<&Grid> {
        self.grids.get(&id).map(|e| &e.grid)
    }

    pub fn orchestrator(&self, id: GridId) -> Option<&RollingGridOrchestrator> {
        self.grids.get(&id).and_then(|e| e.orchestrator.as_ref())
    }

    pub fn grid_ids(&self) -> impl Iterator<Item = GridId> + '_ {
        self.grids.keys().copied()
    }

    /// Allocate a grid and schedule its initial population: generate every
    /// chunk, stitch all seams, then mesh.
    pub fn create_grid(&mut self, config: GridConfig) -> GridId {
        let id = GridId(self.next_grid);
        self.next_grid += 1;

        let grid = Grid::allocate(id, config);
        let orchestrator = grid.is_rolling().then(|| RollingGridOrchestrator::new(id));

        for coord in grid.chunk_coords() {
            schedule_generate(&self.fences, grid.generator(), &grid.target(coord));
        }
        for low in grid.chunk_coords() {
            for axis in Axis::ALL {
                let high = low.neighbor(axis, 1);
                if grid.contains(high) {
                    schedule_seam_sync(&self.fences, &grid.target(low), &grid.target(high), axis);
                }
            }
        }
        for coord in grid.chunk_coords() {
            schedule_mesh(&self.fences, &self.mesher, &grid.target(coord));
        }
        self.fences.scheduler().flush();

        info!(
            "Created grid {:?}: {:?} chunks, voxel size {}, {} generator{}",
            id,
            grid.dims(),
            grid.voxel_size(),
            grid.generator().name(),
            if grid.is_rolling() { ", rolling" } else { "" }
        );
        self.grids.insert(id, GridEntry { grid, orchestrator });
        id
    }

    /// Ask a rolling grid to move its window anchor to `target`.
    pub fn request_move(&mut self, grid: GridId, target: IVec3) -> Result<MoveOutcome> {
        let entry = self.grids.get_mut(&grid).ok_or(Error::UnknownGrid(grid))?;
        let orchestrator = entry
            .orchestrator
            .as_mut()
            .ok_or_else(|| Error::Config(format!("grid {grid:?} is not rolling")))?;
        Ok(orchestrator.request_move(&entry.grid, target))
    }

    fn rebuild_index(&mut self) {
        self.index.rebuild(
            self.grids
                .values()
                .flat_map(|e| e.grid.chunk_infos())
                .map(|info| IndexedChunk::from(&info)),
        );
    }

    /// One scheduling pass: rebuild the spatial index, advance rolling
    /// grids, and hand finished meshes to the sink.
    pub fn update(&mut self) -> UpdateReport {
        self.rebuild_index();
        let mut report = UpdateReport::default();

        for entry in self.grids.values_mut() {
            let grid = &mut entry.grid;

            if let Some(orchestrator) = entry.orchestrator.as_mut() {
                // The commit stays enabled until every chunk passes in one pass
                if orchestrator.poll() && grid.chunk_ids().all(|id| self.fences.try_complete(id)) {
                    let (applied, _) = apply_ready_meshes(&self.fences, grid, &mut self.sink);
                    report.meshes_applied += applied;
                    if let Some(payload) = orchestrator.take_commit() {
                        info!("Grid {:?} commit: anchor {:?}, {} meshes", grid.id(), payload.new_anchor, applied);
                        self.sink.on_commit(grid.id(), &payload);
                        report.commits += 1;
                    }
                }
                if orchestrator.begin_batch(grid, &self.fences, &self.mesher).is_some() {
                    report.batches_started += 1;
                }
                // Mid-move meshes only become visible through the commit
                if orchestrator.state() != OrchestratorState::Idle {
                    continue;
                }
            }

            let (applied, settled) = apply_ready_meshes(&self.fences, grid, &mut self.sink);
            report.meshes_applied += applied;
            if settled && !grid.fully_meshed_once() {
                grid.mark_fully_meshed();
                report.grids_completed += 1;
                info!("Grid {:?} fully meshed", grid.id());
            }
        }

        self.fences.scheduler().flush();
        report
    }

    /// Apply `stamp` to every chunk it touches, re-stitch their seams and
    /// re-mesh. Returns the number of chunks edited.
    pub fn stamp(&mut self, stamp: &Stamp) -> usize {
        self.rebuild_index();
        let hits: Vec<IndexedChunk> = self.index.query(&stamp.world_bounds()).into_iter().copied().collect();

        let mut touched: BTreeSet<(GridId, ChunkCoord)> = BTreeSet::new();
        for hit in &hits {
            let Some(entry) = self.grids.get(&hit.id.grid) else { continue };
            schedule_stamp(&self.fences, stamp, &entry.grid.target(hit.coord));
            touched.insert((hit.id.grid, hit.coord));
        }

        // Neighbours come from coordinate math, resolved through the index
        let mut pairs: BTreeSet<(GridId, ChunkCoord, usize)> = BTreeSet::new();
        let mut remesh = touched.clone();
        for &(grid_id, coord) in &touched {
            let Some(entry) = self.grids.get(&grid_id) else { continue };
            for axis in Axis::ALL {
                for sign in [-1, 1] {
                    let neighbor = coord.neighbor(axis, sign);
                    if self.index.find(grid_id, neighbor).is_none() {
                        continue;
                    }
                    let (low, high) = if sign > 0 { (coord, neighbor) } else { (neighbor, coord) };
                    if pairs.insert((grid_id, low, axis.index())) {
                        schedule_seam_sync(&self.fences, &entry.grid.target(low), &entry.grid.target(high), axis);
                        remesh.insert((grid_id, high));
                    }
                }
            }
        }

        for &(grid_id, coord) in &remesh {
            if let Some(entry) = self.grids.get(&grid_id) {
                schedule_mesh(&self.fences, &self.mesher, &entry.grid.target(coord));
            }
        }

        debug!(
            "Stamp at {:?}: {} chunks edited, {} seams, {} remeshed",
            stamp.center,
            touched.len(),
            pairs.len(),
            remesh.len()
        );
        touched.len()
    }

    /// Read-only view of a chunk's volume, available only while its fence
    /// is idle.
    pub fn read_volume(&self, chunk: ChunkId) -> Option<VolumeView<'_>> {
        let buffers = self.grids.get(&chunk.grid)?.grid.buffers_by_id(chunk)?;
        if !self.fences.is_idle(chunk) {
            return None;
        }
        Some(VolumeView::new(buffers.volume()))
    }

    /// Current placement of a chunk.
    pub fn chunk_info(&self, chunk: ChunkId) -> Result<ChunkInfo> {
        let entry = self.grids.get(&chunk.grid).ok_or(Error::UnknownGrid(chunk.grid))?;
        if entry.grid.buffers_by_id(chunk).is_none() {
            return Err(Error::UnknownChunk(chunk));
        }
        Ok(entry.grid.slot_info(chunk.slot()))
    }

    fn is_settled(&self) -> bool {
        self.fences.pending_count() == 0
            && self.grids.values().all(|e| {
                e.orchestrator
                    .as_ref()
                    .is_none_or(|o| o.state() == OrchestratorState::Idle && !o.has_pending_target())
            })
    }

    /// Block until all scheduled work has finished, every pending move has
    /// been drained and every mesh has been applied.
    pub fn wait_idle(&mut self) -> UpdateReport {
        let mut total = UpdateReport::default();
        loop {
            self.fences.scheduler().flush();
            self.fences.complete_all();
            let report = self.update();
            total.merge(&report);
            if report.is_quiet() && self.is_settled() {
                return total;
            }
        }
    }

    /// Wait for a grid's work, release its buffers and drop its meshes.
    pub fn destroy_grid(&mut self, id: GridId) -> Result<()> {
        let entry = self.grids.remove(&id).ok_or(Error::UnknownGrid(id))?;
        self.fences.scheduler().flush();

        for coord in entry.grid.chunk_coords() {
            let chunk = entry.grid.chunk_id(coord);
            self.fences.complete_and_reset(chunk);
            entry.grid.buffers(coord).dispose();
            self.sink.remove(chunk);
        }
        info!("Destroyed grid {:?}", id);
        Ok(())
    }

    /// Destroy every grid and close the fence registry.
    pub fn shutdown(&mut self) {
        let ids: Vec<GridId> = self.grids.keys().copied().collect();
        for id in ids {
            if let Err(e) = self.destroy_grid(id) {
                warn!("Failed to destroy grid {:?}: {}", id, e);
            }
        }
        self.index.clear();
        self.fences.shutdown();
    }
}

/// Hand every staged mesh of `grid` whose chunk fence has completed to the
/// sink. Returns how many were applied and whether every chunk was idle.
fn apply_ready_meshes<S: MeshSink>(fences: &FenceRegistry, grid: &Grid, sink: &mut S) -> (usize, bool) {
    let mut applied = 0;
    let mut settled = true;

    for coord in grid.chunk_coords() {
        let chunk = grid.chunk_id(coord);
        if !fences.try_complete(chunk) {
            settled = false;
            continue;
        }

        let mut staged = grid.buffers(coord).staged();
        if !staged.pending {
            continue;
        }
        let mesh = std::mem::take(&mut staged.mesh);
        let built_for = staged.coord.unwrap_or(coord);
        staged.pending = false;
        drop(staged);

        sink.apply(chunk, built_for, grid.chunk_info(built_for).world_origin, mesh);
        applied += 1;
    }

    (applied, settled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{MeshingAlgorithm, MeshingConfig};
    use crate::generation::Generator;
    use crate::voxel::chunk::EFFECTIVE_SIZE;
    use crate::voxel::seam::overlap_matches;
    use glam::UVec3;

    fn world() -> VoxelWorld {
        crate::core::logging::init_for_tests();
        let config = EngineConfig { worker_threads: 2, ..Default::default() };
        VoxelWorld::new(config, MeshStore::new()).unwrap()
    }

    fn plane_grid(dims: UVec3, rolling: bool) -> GridConfig {
        GridConfig {
            dims,
            rolling,
            generator: Generator::Plane { height: 15.5, material: 1 },
            ..Default::default()
        }
    }

    #[test]
    fn test_unimplemented_algorithm_fails_fast() {
        let mut config = EngineConfig::default();
        config.meshing = MeshingConfig { algorithm: MeshingAlgorithm::MarchingCubes, ..Default::default() };
        let result = VoxelWorld::new(config, MeshStore::new());
        assert!(matches!(result, Err(Error::NotImplemented(_))));
    }

    #[test]
    fn test_static_grid_meshes_every_chunk() {
        let mut world = world();
        let id = world.create_grid(plane_grid(UVec3::new(2, 1, 2), false));
        let report = world.wait_idle();

        assert_eq!(report.grids_completed, 1);
        assert!(world.grid(id).unwrap().fully_meshed_once());
        assert_eq!(world.sink().len(), 4);
        for (_, stored) in world.sink().iter() {
            assert!(!stored.mesh.is_empty());
            assert_eq!(stored.world_origin, stored.coord.world_origin(1.0));
        }
        assert_eq!(world.fences().pending_count(), 0);
        assert!(world.wait_idle().is_quiet());
    }

    #[test]
    fn test_read_volume_requires_idle_fence() {
        let mut world = world();
        let id = world.create_grid(plane_grid(UVec3::new(1, 1, 1), false));
        world.wait_idle();

        let chunk = world.grid(id).unwrap().chunk_id(ChunkCoord::new(0, 0, 0));
        assert!(world.read_volume(chunk).is_some());

        world.stamp(&Stamp::sphere(Vec3::new(10.0, 15.5, 10.0), 3.0, 2));
        // Nothing flushed yet, so the stamp is still outstanding
        assert!(world.read_volume(chunk).is_none());

        world.wait_idle();
        let volume = world.read_volume(chunk).unwrap();
        assert_eq!(volume.material_at(IVec3::new(10, 17, 10)), 2);
    }

    #[test]
    fn test_stamp_across_seam_keeps_overlap_equal() {
        let mut world = world();
        let id = world.create_grid(GridConfig { dims: UVec3::new(2, 1, 1), ..Default::default() });
        world.wait_idle();
        assert!(world.sink().iter().all(|(_, m)| m.mesh.is_empty()));

        let center = Vec3::new(EFFECTIVE_SIZE as f32, 16.0, 16.0);
        assert_eq!(world.stamp(&Stamp::sphere(center, 4.0, 3)), 2);
        world.wait_idle();

        let grid = world.grid(id).unwrap();
        let left = grid.chunk_id(ChunkCoord::new(0, 0, 0));
        let right = grid.chunk_id(ChunkCoord::new(1, 0, 0));
        {
            let low = world.read_volume(left).unwrap();
            let high = world.read_volume(right).unwrap();
            assert!(overlap_matches(&low, &high, Axis::X));
        }
        assert!(!world.sink().get(left).unwrap().mesh.is_empty());
        assert!(!world.sink().get(right).unwrap().mesh.is_empty());
    }

    #[test]
    fn test_stamp_outside_grids() {
        let mut world = world();
        world.create_grid(plane_grid(UVec3::new(1, 1, 1), false));
        world.wait_idle();
        assert_eq!(world.stamp(&Stamp::sphere(Vec3::splat(1000.0), 2.0, 1)), 0);
    }

    #[test]
    fn test_rolling_grid_drains_move_one_step_per_batch() {
        let mut world = world();
        let id = world.create_grid(plane_grid(UVec3::new(2, 1, 2), true));

        // Not meshed yet
        assert_eq!(world.request_move(id, IVec3::new(2, 0, 1)).unwrap(), MoveOutcome::Deferred);
        world.wait_idle();

        assert_eq!(world.request_move(id, IVec3::ZERO).unwrap(), MoveOutcome::NoOp);
        assert_eq!(world.request_move(id, IVec3::new(2, 0, 1)).unwrap(), MoveOutcome::Accepted);
        let report = world.wait_idle();
        assert_eq!(report.batches_started, 3);
        assert_eq!(report.commits, 3);

        let anchors: Vec<IVec3> = world.sink().commits().iter().map(|(_, c)| c.new_anchor).collect();
        assert_eq!(anchors, vec![IVec3::new(1, 0, 0), IVec3::new(2, 0, 0), IVec3::new(2, 0, 1)]);
        assert!(world.sink().commits().iter().all(|(g, c)| *g == id && c.enabled));

        let grid = world.grid(id).unwrap();
        assert_eq!(grid.anchor(), IVec3::new(2, 0, 1));
        assert_eq!(world.sink().len(), 4);
        for (chunk, stored) in world.sink().iter() {
            assert!(grid.contains(stored.coord), "stale mesh at {:?}", stored.coord);
            assert_eq!(*chunk, grid.chunk_id(stored.coord));
        }
    }

    #[test]
    fn test_commit_waits_for_late_work_on_entering_chunk() {
        let mut world = world();
        let id = world.create_grid(plane_grid(UVec3::new(2, 1, 1), true));
        world.wait_idle();

        assert_eq!(world.request_move(id, IVec3::X).unwrap(), MoveOutcome::Accepted);
        assert_eq!(world.update().batches_started, 1);

        // Hold the entering chunk behind a job we release by hand
        let entering = ChunkCoord::new(2, 0, 0);
        let chunk = world.grid(id).unwrap().chunk_id(entering);
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let fences = world.fences();
        let gate = fences.scheduler().schedule("gate", &[fences.get_fence(chunk)], move || {
            let _ = rx.recv();
        });
        fences.update_fence(chunk, gate);
        assert_eq!(world.stamp(&Stamp::sphere(Vec3::new(75.0, 15.5, 16.0), 3.0, 5)), 1);

        let batch = world.orchestrator(id).unwrap().batch_fence().clone();
        batch.wait();
        let report = world.update();
        assert_eq!(report.commits, 0);
        assert_eq!(report.meshes_applied, 0);
        assert_eq!(world.orchestrator(id).unwrap().state(), OrchestratorState::Committed);
        assert_eq!(world.sink().get(chunk).unwrap().coord, ChunkCoord::new(0, 0, 0));
        assert!(world.sink().commits().is_empty());

        tx.send(()).unwrap();
        let report = world.wait_idle();
        assert_eq!(report.commits, 1);
        assert_eq!(world.sink().commits().len(), 1);
        assert_eq!(world.sink().get(chunk).unwrap().coord, entering);
        assert_eq!(world.read_volume(chunk).unwrap().material_at(IVec3::new(15, 17, 16)), 5);
    }

    #[test]
    fn test_request_move_errors() {
        let mut world = world();
        let fixed = world.create_grid(plane_grid(UVec3::ONE, false));
        assert!(matches!(world.request_move(fixed, IVec3::X), Err(Error::Config(_))));
        assert!(matches!(world.request_move(GridId(99), IVec3::X), Err(Error::UnknownGrid(_))));
    }

    #[test]
    fn test_destroy_grid_releases_everything() {
        let mut world = world();
        let id = world.create_grid(plane_grid(UVec3::new(2, 1, 1), false));
        world.wait_idle();
        let chunk = world.grid(id).unwrap().chunk_id(ChunkCoord::new(1, 0, 0));
        assert!(world.chunk_info(chunk).is_ok());

        world.destroy_grid(id).unwrap();
        assert!(world.sink().is_empty());
        assert!(world.grid(id).is_none());
        assert!(world.read_volume(chunk).is_none());
        assert!(matches!(world.chunk_info(chunk), Err(Error::UnknownGrid(_))));
        assert!(matches!(world.destroy_grid(id), Err(Error::UnknownGrid(_))));
    }

    #[test]
    fn test_chunk_info_unknown_slot() {
        let mut world = world();
        let id = world.create_grid(plane_grid(UVec3::ONE, false));
        let bogus = ChunkId::new(id, UVec3::new(5, 0, 0));
        assert!(matches!(world.chunk_info(bogus), Err(Error::UnknownChunk(_))));
        world.shutdown();
        assert!(world.fences().is_shut_down());
    }
}
