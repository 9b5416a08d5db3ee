pub mod epipolar;
pub mod triangulation;

pub use epipolar::{essential_from_extrinsics, find_essential_mat_ransac};
pub use triangulation::{recover_pose_from_essential, triangulate_points, PoseRecovery};

pub type Result<T> = std::result::Result<T, GeometryError>;

#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("degenerate geometry: {0}")]
    Degenerate(String),

    #[error("numerical failure: {0}")]
    Numerical(String),
}
