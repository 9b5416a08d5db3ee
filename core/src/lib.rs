pub mod descriptor;
pub mod geometry;
pub mod keypoint;
pub mod point_cloud;
pub mod robust;

pub use descriptor::*;
pub use geometry::*;
pub use keypoint::*;
pub use point_cloud::*;
pub use robust::*;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("numerical failure: {0}")]
    Numerical(String),
}
