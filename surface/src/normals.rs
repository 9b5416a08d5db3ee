use crate::spatial::{build_tree, IndexedPoint};
use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};
use photomesh_core::PointCloud;
use rayon::prelude::*;

/// Estimate a normal per point from the PCA of its k-nearest neighborhood:
/// the eigenvector of the smallest covariance eigenvalue. Orientation is
/// arbitrary until `orient_normals` runs.
pub fn estimate_normals(pc: &mut PointCloud, k: usize) {
    if pc.is_empty() {
        return;
    }

    let tree = build_tree(&pc.points);

    let normals: Vec<Vector3<f32>> = pc
        .points
        .par_iter()
        .map(|p| {
            let query = [p.x, p.y, p.z];
            let neighbors: Vec<&IndexedPoint> =
                tree.nearest_neighbor_iter(&query).take(k).collect();

            if neighbors.len() < 3 {
                return Vector3::new(0.0, 0.0, 1.0);
            }

            let mut centroid = Vector3::zeros();
            for n in &neighbors {
                centroid += n.1.coords;
            }
            centroid /= neighbors.len() as f32;

            let mut cov = Matrix3::zeros();
            for n in &neighbors {
                let d = n.1.coords - centroid;
                cov += d * d.transpose();
            }
            cov /= neighbors.len() as f32;

            let eigen = SymmetricEigen::new(cov);
            let mut min_idx = 0;
            for i in 1..3 {
                if eigen.eigenvalues[i] < eigen.eigenvalues[min_idx] {
                    min_idx = i;
                }
            }

            let n = eigen.eigenvectors.column(min_idx).into_owned();
            if n.norm_squared() > 1e-12 {
                n.normalize()
            } else {
                Vector3::new(0.0, 0.0, 1.0)
            }
        })
        .collect();

    pc.normals = Some(normals);
}

/// Propagate a consistent normal orientation across the cloud.
///
/// Walks the k-nearest-neighbor graph from the first point, flipping each
/// newly reached normal to agree with the tangent plane of the point it was
/// reached from. Disconnected remainders are settled by neighbor majority
/// vote.
pub fn orient_normals(pc: &mut PointCloud, k: usize) {
    let n = pc.len();
    if n < 3 {
        return;
    }

    let Some(mut normals) = pc.normals.take() else {
        return;
    };

    let tree = build_tree(&pc.points);

    let mut visited = vec![false; n];
    let mut stack = vec![0usize];
    visited[0] = true;

    while let Some(i) = stack.pop() {
        let q = [pc.points[i].x, pc.points[i].y, pc.points[i].z];
        for nb in tree.nearest_neighbor_iter(&q).take(k) {
            let j = nb.0;
            if visited[j] {
                continue;
            }
            if normals[j].dot(&normals[i]) < 0.0 {
                normals[j] = -normals[j];
            }
            visited[j] = true;
            stack.push(j);
        }
    }

    for i in 0..n {
        if visited[i] {
            continue;
        }
        let q = [pc.points[i].x, pc.points[i].y, pc.points[i].z];
        let neighbors: Vec<usize> = tree.nearest_neighbor_iter(&q).take(k).map(|nb| nb.0).collect();
        let flips = neighbors
            .iter()
            .filter(|&&j| normals[i].dot(&normals[j]) < 0.0)
            .count();
        if flips > neighbors.len() / 2 {
            normals[i] = -normals[i];
        }
    }

    pc.normals = Some(normals);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane_cloud(n: usize) -> PointCloud {
        let points = (0..n)
            .map(|i| {
                let x = (i % 20) as f32 * 0.1;
                let y = (i / 20) as f32 * 0.1;
                Point3::new(x, y, 0.0)
            })
            .collect();
        PointCloud::new(points)
    }

    #[test]
    fn plane_normals_are_axis_aligned() {
        let mut pc = plane_cloud(200);
        estimate_normals(&mut pc, 10);
        let normals = pc.normals.as_ref().unwrap();
        for n in normals {
            assert!(n.z.abs() > 0.99, "normal {:?} not along z", n);
        }
    }

    #[test]
    fn orientation_makes_plane_normals_agree() {
        let mut pc = plane_cloud(200);
        estimate_normals(&mut pc, 10);

        // Scramble signs before propagation.
        if let Some(normals) = &mut pc.normals {
            for (i, n) in normals.iter_mut().enumerate() {
                if i % 3 == 0 {
                    *n = -*n;
                }
            }
        }

        orient_normals(&mut pc, 10);
        let normals = pc.normals.unwrap();
        let reference = normals[0];
        for n in &normals {
            assert!(n.dot(&reference) > 0.0);
        }
    }

    #[test]
    fn empty_cloud_is_untouched() {
        let mut pc = PointCloud::default();
        estimate_normals(&mut pc, 10);
        assert!(pc.normals.is_none());
    }
}
