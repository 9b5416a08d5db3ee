use nalgebra::{Point3, Vector3};

/// Triangle mesh with optional per-vertex normals and colors.
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3<f32>>,
    pub faces: Vec<[usize; 3]>,
    pub normals: Option<Vec<Vector3<f32>>>,
    pub colors: Option<Vec<Point3<f32>>>,
}

impl TriangleMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    pub fn compute_face_normals(&self) -> Vec<Vector3<f32>> {
        self.faces
            .iter()
            .map(|face| {
                let v0 = self.vertices[face[0]];
                let v1 = self.vertices[face[1]];
                let v2 = self.vertices[face[2]];
                let n = (v1 - v0).cross(&(v2 - v0));
                let len = n.norm();
                if len > 1e-12 {
                    n / len
                } else {
                    Vector3::zeros()
                }
            })
            .collect()
    }

    /// Per-vertex normals as the normalized sum of adjacent face normals.
    pub fn compute_vertex_normals(&mut self) {
        let mut vertex_normals: Vec<Vector3<f32>> = vec![Vector3::zeros(); self.vertices.len()];
        let face_normals = self.compute_face_normals();

        for (face_idx, face) in self.faces.iter().enumerate() {
            for &vertex_idx in face.iter() {
                vertex_normals[vertex_idx] += face_normals[face_idx];
            }
        }

        for normal in vertex_normals.iter_mut() {
            let len = normal.norm();
            if len > 1e-12 {
                *normal /= len;
            }
        }

        self.normals = Some(vertex_normals);
    }

    pub fn bounds(&self) -> (Point3<f32>, Point3<f32>) {
        if self.vertices.is_empty() {
            return (Point3::origin(), Point3::origin());
        }

        let mut min = self.vertices[0];
        let mut max = self.vertices[0];
        for v in &self.vertices {
            min.x = min.x.min(v.x);
            min.y = min.y.min(v.y);
            min.z = min.z.min(v.z);
            max.x = max.x.max(v.x);
            max.y = max.y.max(v.y);
            max.z = max.z.max(v.z);
        }
        (min, max)
    }

    /// Remove every vertex flagged in `remove`, along with all faces that
    /// reference one, remapping the surviving indices.
    pub fn remove_vertices_by_mask(&mut self, remove: &[bool]) {
        debug_assert_eq!(remove.len(), self.vertices.len());

        let mut remap = vec![usize::MAX; self.vertices.len()];
        let mut kept = 0usize;
        for (i, &flag) in remove.iter().enumerate() {
            if !flag {
                remap[i] = kept;
                kept += 1;
            }
        }

        self.compact_vertices(&remap, kept);
    }

    /// Drop vertices no face references.
    pub fn remove_unreferenced_vertices(&mut self) {
        let mut referenced = vec![false; self.vertices.len()];
        for face in &self.faces {
            for &v in face {
                referenced[v] = true;
            }
        }

        let mut remap = vec![usize::MAX; self.vertices.len()];
        let mut kept = 0usize;
        for (i, &used) in referenced.iter().enumerate() {
            if used {
                remap[i] = kept;
                kept += 1;
            }
        }

        self.compact_vertices(&remap, kept);
    }

    fn compact_vertices(&mut self, remap: &[usize], kept: usize) {
        let keep = |i: usize| remap[i] != usize::MAX;

        let mut vertices = Vec::with_capacity(kept);
        for (i, v) in self.vertices.iter().enumerate() {
            if keep(i) {
                vertices.push(*v);
            }
        }
        self.vertices = vertices;

        if let Some(colors) = &self.colors {
            self.colors = Some(
                colors
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| keep(*i))
                    .map(|(_, c)| *c)
                    .collect(),
            );
        }
        if let Some(normals) = &self.normals {
            self.normals = Some(
                normals
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| keep(*i))
                    .map(|(_, n)| *n)
                    .collect(),
            );
        }

        self.faces = self
            .faces
            .iter()
            .filter(|f| f.iter().all(|&v| keep(v)))
            .map(|f| [remap[f[0]], remap[f[1]], remap[f[2]]])
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_mesh() -> TriangleMesh {
        TriangleMesh {
            vertices: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            faces: vec![[0, 1, 2], [0, 2, 3]],
            normals: None,
            colors: None,
        }
    }

    #[test]
    fn vertex_normals_of_planar_quad_point_up() {
        let mut mesh = quad_mesh();
        mesh.compute_vertex_normals();
        let normals = mesh.normals.unwrap();
        for n in normals {
            assert!((n - Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-6);
        }
    }

    #[test]
    fn mask_removal_drops_touching_faces_and_remaps() {
        let mut mesh = quad_mesh();
        mesh.remove_vertices_by_mask(&[false, true, false, false]);
        assert_eq!(mesh.num_vertices(), 3);
        // Only [0, 2, 3] survives, remapped to [0, 1, 2].
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
    }

    #[test]
    fn unreferenced_vertices_are_compacted() {
        let mut mesh = quad_mesh();
        mesh.faces = vec![[0, 1, 2]];
        mesh.remove_unreferenced_vertices();
        assert_eq!(mesh.num_vertices(), 3);
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
    }
}
