//! Scheduled chunk operations: generate, stitch, mesh.
//!
//! Each function chains its job on the fences of every chunk it touches and
//! publishes the new tail back to those fences, so per-chunk operations run
//! in the order they were scheduled.

use std::sync::Arc;

use log::debug;

use crate::edit::{apply_stamp, Stamp};
use crate::generation::Generator;
use crate::jobs::{FenceRegistry, JobHandle};
use crate::mesh::Mesher;
use crate::voxel::chunk::{Axis, ChunkBuffers, ChunkId, ChunkInfo};
use crate::voxel::seam::sync_overlap;

/// A chunk's placement together with its buffers.
#[derive(Clone, Debug)]
pub struct ChunkTarget {
    pub info: ChunkInfo,
    pub buffers: Arc<ChunkBuffers>,
}

impl ChunkTarget {
    pub fn new(info: ChunkInfo, buffers: Arc<ChunkBuffers>) -> Self {
        Self { info, buffers }
    }

    pub fn id(&self) -> ChunkId {
        self.info.id
    }
}

/// Fill `target` from `generator` at its world placement.
pub fn schedule_generate(fences: &FenceRegistry, generator: &Arc<Generator>, target: &ChunkTarget) -> JobHandle {
    let id = target.id();
    let deps = [fences.get_fence(id)];
    debug!("Scheduling {} generation for {:?} at {:?}", generator.name(), id, target.info.coord);
    let generator = Arc::clone(generator);
    let info = target.info;
    let buffers = Arc::clone(&target.buffers);

    let handle = fences.scheduler().schedule("generate", &deps, move || {
        let mut volume = buffers.volume_mut();
        generator.fill(&info.local_bounds(), &info.local_to_world(), info.voxel_size, &mut volume);
    });
    fences.update_fence(id, handle.clone());
    handle
}

/// Copy the overlap of `low` into `high`, which must be its neighbour one
/// chunk up along `axis`. Fenced on both chunks.
pub fn schedule_seam_sync(fences: &FenceRegistry, low: &ChunkTarget, high: &ChunkTarget, axis: Axis) -> JobHandle {
    let deps = [fences.get_fence(low.id()), fences.get_fence(high.id())];
    let source = Arc::clone(&low.buffers);
    let dest = Arc::clone(&high.buffers);

    let handle = fences.scheduler().schedule("seam_sync", &deps, move || {
        let source = source.volume();
        let mut dest = dest.volume_mut();
        if !source.is_disposed() && !dest.is_disposed() {
            sync_overlap(&source, &mut dest, axis);
        }
    });
    fences.update_fence(low.id(), handle.clone());
    fences.update_fence(high.id(), handle.clone());
    handle
}

/// Extract a mesh for `target` and stage it for the consumer.
pub fn schedule_mesh(fences: &FenceRegistry, mesher: &Mesher, target: &ChunkTarget) -> JobHandle {
    let id = target.id();
    let deps = [fences.get_fence(id)];
    let mesher = mesher.clone();
    let coord = target.info.coord;
    let buffers = Arc::clone(&target.buffers);

    let handle = fences.scheduler().schedule("mesh", &deps, move || {
        let mesh = {
            let volume = buffers.volume();
            mesher.build(&volume)
        };
        let mut staged = buffers.staged();
        staged.mesh = mesh;
        staged.coord = Some(coord);
        staged.pending = true;
    });
    fences.update_fence(id, handle.clone());
    handle
}

/// Apply `stamp` to `target`'s volume.
pub fn schedule_stamp(fences: &FenceRegistry, stamp: &Stamp, target: &ChunkTarget) -> JobHandle {
    let id = target.id();
    let deps = [fences.get_fence(id)];
    let stamp = *stamp;
    let origin = target.info.world_origin;
    let buffers = Arc::clone(&target.buffers);

    let handle = fences.scheduler().schedule("stamp", &deps, move || {
        let mut volume = buffers.volume_mut();
        apply_stamp(&mut volume, origin, &stamp);
    });
    fences.update_fence(id, handle.clone());
    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobScheduler;
    use crate::voxel::chunk::{ChunkCoord, GridId, EFFECTIVE_SIZE};
    use crate::voxel::seam::overlap_matches;
    use glam::{UVec3, Vec3};

    fn target(x: u32, generator_origin: Vec3) -> ChunkTarget {
        let info = ChunkInfo {
            id: ChunkId::new(GridId(0), UVec3::new(x, 0, 0)),
            coord: ChunkCoord::new(x as i32, 0, 0),
            voxel_size: 1.0,
            world_origin: generator_origin,
        };
        ChunkTarget::new(info, Arc::new(ChunkBuffers::allocate(1.0)))
    }

    #[test]
    fn test_generate_stitch_mesh_chain() {
        let fences = FenceRegistry::initialize(JobScheduler::new(2).unwrap(), 8);
        let generator = Arc::new(Generator::Plane { height: 15.5, material: 1 });
        let left = target(0, Vec3::ZERO);
        let right = target(1, Vec3::new(EFFECTIVE_SIZE as f32, 0.0, 0.0));

        schedule_generate(&fences, &generator, &left);
        schedule_generate(&fences, &generator, &right);
        schedule_seam_sync(&fences, &left, &right, Axis::X);
        schedule_mesh(&fences, &Mesher::default(), &left);
        let last = schedule_mesh(&fences, &Mesher::default(), &right);

        assert!(!fences.is_idle(right.id()));
        last.wait();
        fences.complete_and_reset(left.id());
        fences.complete_and_reset(right.id());

        assert!(overlap_matches(&left.buffers.volume(), &right.buffers.volume(), Axis::X));
        let staged = right.buffers.staged();
        assert!(staged.pending);
        assert_eq!(staged.coord, Some(ChunkCoord::new(1, 0, 0)));
        assert!(!staged.mesh.is_empty());
    }

    #[test]
    fn test_stamp_after_generate() {
        let fences = FenceRegistry::initialize(JobScheduler::new(2).unwrap(), 8);
        let chunk = target(0, Vec3::ZERO);
        schedule_generate(&fences, &Arc::new(Generator::Empty), &chunk);
        schedule_stamp(&fences, &Stamp::sphere(Vec3::splat(16.0), 4.0, 7), &chunk);
        fences.complete_and_reset(chunk.id());

        let volume = chunk.buffers.volume();
        assert!(volume.sdf_at(glam::IVec3::splat(16)) < 0);
        assert_eq!(volume.material_at(glam::IVec3::splat(16)), 7);
    }
}
