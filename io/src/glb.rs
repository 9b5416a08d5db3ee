//! Self-contained binary glTF 2.0 (GLB) writer.
//!
//! Layout: 12-byte header, JSON chunk (space-padded to 4 bytes), binary
//! chunk (zero-padded). The mesh becomes a single primitive with POSITION,
//! optional NORMAL and COLOR_0 float accessors and u32 indices.

use crate::{ExportError, Result};
use photomesh_surface::TriangleMesh;
use serde_json::json;
use std::path::Path;

const GLB_MAGIC: u32 = 0x4654_6C67; // "glTF"
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A; // "JSON"
const CHUNK_BIN: u32 = 0x004E_4942; // "BIN\0"

const COMPONENT_F32: u32 = 5126;
const COMPONENT_U32: u32 = 5125;
const TARGET_ARRAY_BUFFER: u32 = 34962;
const TARGET_ELEMENT_ARRAY_BUFFER: u32 = 34963;
const MODE_TRIANGLES: u32 = 4;

/// Serialize the mesh into an in-memory GLB container.
pub fn encode_glb(mesh: &TriangleMesh) -> Result<Vec<u8>> {
    if mesh.vertices.is_empty() || mesh.faces.is_empty() {
        return Err(ExportError::EmptyMesh);
    }

    let mut bin = Vec::new();
    let mut buffer_views = Vec::new();
    let mut accessors = Vec::new();
    let mut attributes = serde_json::Map::new();

    // POSITION
    let (min, max) = mesh.bounds();
    let view = push_view(
        &mut bin,
        &mut buffer_views,
        mesh.vertices.iter().flat_map(|v| [v.x, v.y, v.z]),
        TARGET_ARRAY_BUFFER,
    );
    attributes.insert("POSITION".to_string(), json!(accessors.len()));
    accessors.push(json!({
        "bufferView": view,
        "componentType": COMPONENT_F32,
        "count": mesh.vertices.len(),
        "type": "VEC3",
        "min": [min.x, min.y, min.z],
        "max": [max.x, max.y, max.z],
    }));

    // NORMAL
    if let Some(normals) = &mesh.normals {
        let view = push_view(
            &mut bin,
            &mut buffer_views,
            normals.iter().flat_map(|n| [n.x, n.y, n.z]),
            TARGET_ARRAY_BUFFER,
        );
        attributes.insert("NORMAL".to_string(), json!(accessors.len()));
        accessors.push(json!({
            "bufferView": view,
            "componentType": COMPONENT_F32,
            "count": normals.len(),
            "type": "VEC3",
        }));
    }

    // COLOR_0
    if let Some(colors) = &mesh.colors {
        let view = push_view(
            &mut bin,
            &mut buffer_views,
            colors
                .iter()
                .flat_map(|c| [c.x.clamp(0.0, 1.0), c.y.clamp(0.0, 1.0), c.z.clamp(0.0, 1.0)]),
            TARGET_ARRAY_BUFFER,
        );
        attributes.insert("COLOR_0".to_string(), json!(accessors.len()));
        accessors.push(json!({
            "bufferView": view,
            "componentType": COMPONENT_F32,
            "count": colors.len(),
            "type": "VEC3",
        }));
    }

    // Indices
    let index_offset = bin.len();
    for face in &mesh.faces {
        for &v in face {
            bin.extend_from_slice(&(v as u32).to_le_bytes());
        }
    }
    buffer_views.push(json!({
        "buffer": 0,
        "byteOffset": index_offset,
        "byteLength": bin.len() - index_offset,
        "target": TARGET_ELEMENT_ARRAY_BUFFER,
    }));
    let indices_accessor = accessors.len();
    accessors.push(json!({
        "bufferView": buffer_views.len() - 1,
        "componentType": COMPONENT_U32,
        "count": mesh.faces.len() * 3,
        "type": "SCALAR",
    }));

    let document = json!({
        "asset": { "version": "2.0", "generator": "photomesh" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "meshes": [{
            "primitives": [{
                "attributes": attributes,
                "indices": indices_accessor,
                "mode": MODE_TRIANGLES,
            }],
        }],
        "buffers": [{ "byteLength": bin.len() }],
        "bufferViews": buffer_views,
        "accessors": accessors,
    });

    let mut json_bytes = serde_json::to_vec(&document)?;
    while json_bytes.len() % 4 != 0 {
        json_bytes.push(b' ');
    }
    while bin.len() % 4 != 0 {
        bin.push(0);
    }

    let total = 12 + 8 + json_bytes.len() + 8 + bin.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(&json_bytes);
    out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
    out.extend_from_slice(&bin);

    Ok(out)
}

/// Encode and write the mesh to disk. The file is only created once the
/// whole container has been assembled, so a failed export leaves nothing
/// behind.
pub fn write_glb(mesh: &TriangleMesh, path: &Path) -> Result<()> {
    let bytes = encode_glb(mesh)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Append float data to the binary blob and register its buffer view;
/// returns the view index.
fn push_view(
    bin: &mut Vec<u8>,
    buffer_views: &mut Vec<serde_json::Value>,
    data: impl Iterator<Item = f32>,
    target: u32,
) -> usize {
    let offset = bin.len();
    for v in data {
        bin.extend_from_slice(&v.to_le_bytes());
    }
    buffer_views.push(json!({
        "buffer": 0,
        "byteOffset": offset,
        "byteLength": bin.len() - offset,
        "target": target,
    }));
    buffer_views.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn triangle_mesh() -> TriangleMesh {
        let mut mesh = TriangleMesh {
            vertices: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            faces: vec![[0, 1, 2]],
            normals: None,
            colors: Some(vec![
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
            ]),
        };
        mesh.compute_vertex_normals();
        mesh
    }

    #[test]
    fn container_header_and_chunks_are_well_formed() {
        let bytes = encode_glb(&triangle_mesh()).unwrap();

        assert_eq!(&bytes[0..4], b"glTF");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 2);
        let total = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        assert_eq!(total, bytes.len());

        let json_len = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;
        assert_eq!(&bytes[16..20], b"JSON");
        assert_eq!(json_len % 4, 0);

        let bin_header = 20 + json_len;
        let bin_len =
            u32::from_le_bytes(bytes[bin_header..bin_header + 4].try_into().unwrap()) as usize;
        assert_eq!(&bytes[bin_header + 4..bin_header + 7], b"BIN");
        assert_eq!(bin_header + 8 + bin_len, bytes.len());
    }

    #[test]
    fn json_chunk_references_all_attributes() {
        let bytes = encode_glb(&triangle_mesh()).unwrap();
        let json_len = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;
        let doc: serde_json::Value = serde_json::from_slice(&bytes[20..20 + json_len]).unwrap();

        let attrs = &doc["meshes"][0]["primitives"][0]["attributes"];
        assert!(attrs["POSITION"].is_number());
        assert!(attrs["NORMAL"].is_number());
        assert!(attrs["COLOR_0"].is_number());

        let pos = &doc["accessors"][attrs["POSITION"].as_u64().unwrap() as usize];
        assert_eq!(pos["count"], 3);
        assert_eq!(pos["type"], "VEC3");
        assert_eq!(doc["buffers"][0]["byteLength"].as_u64().unwrap() % 4, 0);
    }

    #[test]
    fn empty_mesh_is_rejected() {
        let mesh = TriangleMesh::new();
        assert!(matches!(encode_glb(&mesh), Err(ExportError::EmptyMesh)));
    }

    #[test]
    fn write_creates_file_with_encoded_bytes() {
        let mesh = triangle_mesh();
        let dir = std::env::temp_dir().join(format!("photomesh_glb_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("mesh.glb");

        write_glb(&mesh, &path).unwrap();
        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(on_disk, encode_glb(&mesh).unwrap());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
