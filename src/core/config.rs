//! Engine configuration, loadable from JSON.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;

/// Isosurface extraction algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshingAlgorithm {
    /// One dual vertex per sign-crossing cube
    #[default]
    SurfaceNets,
    /// Recognised in configs but not implemented; rejected when the world starts
    MarchingCubes,
}

/// How vertex normals are produced by the extractor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalMode {
    /// Leave normals zeroed; a later pass is expected to fill them
    None,
    /// Central-difference gradient of the SDF at each vertex
    #[default]
    Gradient,
    /// Area-weighted face normals, computed after all indices exist
    Geometry,
}

/// How corner materials are packed into the 4-byte vertex color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialEncoding {
    /// Occurrence-weighted blend over 4 channels (`material % 4`)
    #[default]
    BlendWeights,
    /// Full weight on the most frequent channel only
    Dominant,
}

/// What fairing does with vertices inside the seam band.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeamPolicy {
    /// Seam-band vertices do not move at all
    #[default]
    Freeze,
    /// Seam-band vertices may slide along the boundary plane only
    SoftBand,
}

/// Parameters for feature- and seam-preserving vertex smoothing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FairingConfig {
    /// Number of smoothing passes
    pub iterations: u32,
    /// Base step toward the neighbour average (0.0 - 1.0)
    pub step: f32,
    /// L1 material-weight distance at which a neighbour counts as a crease
    pub material_threshold: f32,
    /// Step multiplier applied across material creases
    pub material_min_step: f32,
    /// Width of the seam band in voxels, measured from each chunk face
    pub seam_band: f32,
    /// Policy applied inside the seam band
    pub seam_policy: SeamPolicy,
    /// Shrink of the clamping cell on each side, as a fraction of a voxel
    pub cell_margin: f32,
    /// Recompute geometry normals after the last iteration
    pub recompute_normals: bool,
}

impl Default for FairingConfig {
    fn default() -> Self {
        Self {
            iterations: 4,
            step: 0.5,
            material_threshold: 0.5,
            material_min_step: 0.3,
            seam_band: 2.0,
            seam_policy: SeamPolicy::Freeze,
            cell_margin: 0.05,
            recompute_normals: true,
        }
    }
}

/// Meshing mode flags passed to the extractor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshingConfig {
    pub algorithm: MeshingAlgorithm,
    pub normals: NormalMode,
    pub materials: MaterialEncoding,
    /// Enables the fairing post-pass when set
    pub fairing: Option<FairingConfig>,
}

/// Top-level engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads for the job pool (0 = one per core)
    pub worker_threads: usize,
    /// Initial capacity of the fence registry
    pub fence_capacity: usize,
    /// Log a warning when a chunk fence stays busy this long (diagnostic only)
    pub stall_warning_ms: Option<u64>,
    /// Extraction settings
    pub meshing: MeshingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            fence_capacity: 1024,
            stall_warning_ms: None,
            meshing: MeshingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject values that cannot be clamped into something meaningful.
    pub fn validate(&self) -> Result<()> {
        if let Some(fairing) = &self.meshing.fairing {
            let checks = [
                ("fairing.step", fairing.step),
                ("fairing.material_threshold", fairing.material_threshold),
                ("fairing.material_min_step", fairing.material_min_step),
                ("fairing.seam_band", fairing.seam_band),
                ("fairing.cell_margin", fairing.cell_margin),
            ];
            for (name, value) in checks {
                if !value.is_finite() || value < 0.0 {
                    return Err(Error::Config(format!("{name} must be finite and >= 0, got {value}")));
                }
            }
            if fairing.step > 1.0 {
                return Err(Error::Config(format!("fairing.step must be <= 1, got {}", fairing.step)));
            }
            if fairing.cell_margin >= 0.5 {
                return Err(Error::Config(format!(
                    "fairing.cell_margin must be < 0.5, got {}",
                    fairing.cell_margin
                )));
            }
        }
        Ok(())
    }

    /// Stall warning threshold as a duration.
    pub fn stall_warning(&self) -> Option<Duration> {
        self.stall_warning_ms.map(Duration::from_millis)
    }
}
