//! Mesh serialization to the binary glTF transmission format.

pub mod glb;

pub use glb::{encode_glb, write_glb};

pub type Result<T> = std::result::Result<T, ExportError>;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("cannot export an empty mesh")]
    EmptyMesh,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
