//! Surface reconstruction from colored, oriented point clouds.
//!
//! The stages mirror the order the pipeline applies them: voxel-grid
//! downsampling, normal estimation and consistent orientation, implicit
//! surface extraction with a per-vertex density, density trimming.

pub mod filtering;
pub mod implicit;
pub mod mesh;
pub mod normals;
pub(crate) mod spatial;

pub use filtering::voxel_down_sample;
pub use implicit::{quantile, reconstruct_surface, trim_by_density};
pub use mesh::TriangleMesh;
pub use normals::{estimate_normals, orient_normals};
