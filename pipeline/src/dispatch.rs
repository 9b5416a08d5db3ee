//! Routing between the local pipeline and remote delegation.

use crate::config::{PipelineParams, ReconstructionConfig, RemoteConfig};
use crate::error::Result;
use crate::local;
use crate::remote::RemoteOrchestrator;
use log::info;
use std::path::Path;

/// The reconstruction strategy, selected once per invocation.
pub enum Strategy<'a> {
    Local(&'a PipelineParams),
    Remote(&'a RemoteConfig),
}

impl<'a> Strategy<'a> {
    pub fn from_config(config: &'a ReconstructionConfig) -> Self {
        match &config.remote {
            Some(remote) => Strategy::Remote(remote),
            None => Strategy::Local(&config.params),
        }
    }

    pub fn run(&self, image_dir: &Path, output: &Path) -> Result<()> {
        match self {
            Strategy::Local(params) => {
                info!("reconstructing locally from {}", image_dir.display());
                local::run(image_dir, output, params)
            }
            Strategy::Remote(remote) => {
                info!("delegating reconstruction to {}", remote.base_url);
                RemoteOrchestrator::new(remote).run(image_dir, output)
            }
        }
    }
}

/// Sole entry point: reconstruct the images under `image_dir` into a GLB
/// artifact at `output`, locally or via the configured remote service.
pub fn reconstruct(image_dir: &Path, output: &Path, config: &ReconstructionConfig) -> Result<()> {
    Strategy::from_config(config).run(image_dir, output)
}
