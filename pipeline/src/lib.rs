//! Incremental 3D surface reconstruction from an ordered set of overlapping
//! photographs.
//!
//! [`reconstruct`] is the sole entry point: it loads the image sequence,
//! chains pairwise camera poses, triangulates a colored point cloud, meshes
//! it and writes a binary glTF artifact — or, when a remote service is
//! configured, delegates the whole job and downloads the result.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod loader;
pub mod local;
pub mod remote;

pub use config::{PipelineParams, ReconstructionConfig, RemoteConfig};
pub use dispatch::{reconstruct, Strategy};
pub use error::{ReconstructError, Result};
