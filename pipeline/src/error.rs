use std::time::Duration;

pub type Result<T> = std::result::Result<T, ReconstructError>;

/// Terminal failures of a reconstruction call.
///
/// Locally recoverable conditions — one unreadable image, one pair failing
/// matching or pose estimation — never surface here; only total exhaustion
/// does. Nothing is retried internally and no partial artifact is written.
#[derive(Debug, thiserror::Error)]
pub enum ReconstructError {
    #[error("need at least two candidate images, found {found}")]
    InsufficientImages { found: usize },

    #[error("fewer than two images decoded successfully ({decoded} readable)")]
    NoReadableImages { decoded: usize },

    #[error("no features detected in anchor frame {0}")]
    NoFeaturesDetected(String),

    #[error("reconstruction failed: {0}")]
    ReconstructionFailed(String),

    #[error("reconstruction produced an empty mesh")]
    EmptyMesh,

    #[error("remote job creation failed: {0}")]
    RemoteJobCreationFailed(String),

    #[error("remote job failed: {0}")]
    RemoteJobFailed(String),

    #[error("remote job did not finish within {0:?}")]
    RemoteJobTimeout(Duration),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Export(#[from] photomesh_io::ExportError),
}
