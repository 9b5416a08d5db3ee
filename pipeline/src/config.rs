//! Configuration resolved once per invocation and read-only during the call.

use log::warn;
use std::time::Duration;

/// Numeric knobs of the local pipeline, hoisted out of the flow.
#[derive(Debug, Clone)]
pub struct PipelineParams {
    /// Longer image side is downsized to this bound before processing.
    pub max_image_side: u32,
    /// Keypoint budget per image.
    pub feature_budget: usize,
    /// Lowe ratio for descriptor matching.
    pub match_ratio: f32,
    /// Minimum correspondences for a pair to contribute.
    pub min_matches: usize,
    pub ransac_threshold_px: f64,
    pub ransac_confidence: f64,
    pub ransac_iterations: usize,
    /// Voxel cell size for point-cloud downsampling.
    pub voxel_size: f32,
    /// Neighborhood size for normal estimation and orientation.
    pub normal_neighbors: usize,
    /// Grid depth for implicit surface extraction (resolution 2^depth).
    pub octree_depth: usize,
    /// Vertices below this density quantile are trimmed.
    pub density_quantile: f32,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            max_image_side: 1400,
            feature_budget: 6000,
            match_ratio: 0.75,
            min_matches: 24,
            ransac_threshold_px: 1.0,
            ransac_confidence: 0.999,
            ransac_iterations: 1000,
            voxel_size: 0.0025,
            normal_neighbors: 10,
            octree_depth: 8,
            density_quantile: 0.12,
        }
    }
}

/// Delegation-mode settings; presence of a populated config switches the
/// dispatcher to the remote path.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub token: String,
    pub create_path: String,
    /// Status endpoint template containing a `{job_id}` placeholder.
    pub status_path: String,
    /// Download endpoint template, used when the status response carries no
    /// explicit result location.
    pub download_path: String,
    /// Per-HTTP-call timeout.
    pub timeout: Duration,
    /// Overall polling deadline.
    pub max_poll: Duration,
    pub poll_interval: Duration,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            create_path: "/jobs".to_string(),
            status_path: "/jobs/{job_id}".to_string(),
            download_path: "/jobs/{job_id}/result".to_string(),
            timeout: Duration::from_secs(30),
            max_poll: Duration::from_secs(1800),
            poll_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReconstructionConfig {
    pub remote: Option<RemoteConfig>,
    pub params: PipelineParams,
}

impl ReconstructionConfig {
    /// Resolve the configuration from `PHOTOMESH_*` environment variables.
    /// Delegation mode activates only when both the base URL and the token
    /// are present.
    pub fn from_env() -> Self {
        let remote = match (
            env_string("PHOTOMESH_REMOTE_BASE_URL"),
            env_string("PHOTOMESH_REMOTE_TOKEN"),
        ) {
            (Some(base_url), Some(token)) => {
                let mut remote = RemoteConfig::new(base_url, token);
                if let Some(path) = env_string("PHOTOMESH_REMOTE_CREATE_PATH") {
                    remote.create_path = path;
                }
                if let Some(path) = env_string("PHOTOMESH_REMOTE_STATUS_PATH") {
                    remote.status_path = path;
                }
                if let Some(path) = env_string("PHOTOMESH_REMOTE_DOWNLOAD_PATH") {
                    remote.download_path = path;
                }
                if let Some(secs) = env_seconds("PHOTOMESH_REMOTE_TIMEOUT_SECS") {
                    remote.timeout = secs;
                }
                if let Some(secs) = env_seconds("PHOTOMESH_REMOTE_MAX_POLL_SECS") {
                    remote.max_poll = secs;
                }
                if let Some(secs) = env_seconds("PHOTOMESH_REMOTE_POLL_INTERVAL_SECS") {
                    remote.poll_interval = secs;
                }
                Some(remote)
            }
            _ => None,
        };

        Self {
            remote,
            params: PipelineParams::default(),
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_seconds(name: &str) -> Option<Duration> {
    let raw = env_string(name)?;
    match raw.parse::<f64>() {
        Ok(secs) if secs >= 0.0 && secs.is_finite() => Some(Duration::from_secs_f64(secs)),
        _ => {
            warn!("ignoring unparseable {name}={raw:?}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_constants() {
        let p = PipelineParams::default();
        assert_eq!(p.max_image_side, 1400);
        assert_eq!(p.feature_budget, 6000);
        assert_eq!(p.min_matches, 24);
        assert!((p.match_ratio - 0.75).abs() < 1e-9);
        assert!((p.voxel_size - 0.0025).abs() < 1e-9);
        assert_eq!(p.octree_depth, 8);
        assert!((p.density_quantile - 0.12).abs() < 1e-9);
    }

    #[test]
    fn remote_defaults_template_the_job_id() {
        let r = RemoteConfig::new("https://svc.example", "tok");
        assert!(r.status_path.contains("{job_id}"));
        assert!(r.download_path.contains("{job_id}"));
    }
}
