use nalgebra::{Point3, Vector3};
use photomesh_core::PointCloud;
use rayon::prelude::*;

/// Downsample a point cloud with a voxel grid.
///
/// Every populated voxel is replaced by the centroid of its points; colors
/// and normals are averaged the same way (normals re-normalized). Centroids
/// stay inside their voxel, so a second pass at the same cell size is a
/// no-op.
pub fn voxel_down_sample(pc: &PointCloud, voxel_size: f32) -> PointCloud {
    if voxel_size <= 0.0 || pc.is_empty() {
        return pc.clone();
    }

    let n = pc.len();
    let mut indices: Vec<(i32, i32, i32, usize)> = Vec::with_capacity(n);
    for (i, p) in pc.points.iter().enumerate() {
        let hx = (p.x / voxel_size).floor() as i32;
        let hy = (p.y / voxel_size).floor() as i32;
        let hz = (p.z / voxel_size).floor() as i32;
        indices.push((hx, hy, hz, i));
    }

    let by_voxel = |a: &(i32, i32, i32, usize), b: &(i32, i32, i32, usize)| {
        a.0.cmp(&b.0)
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.2.cmp(&b.2))
    };
    if n > 10_000 {
        indices.par_sort_unstable_by(by_voxel);
    } else {
        indices.sort_unstable_by(by_voxel);
    }

    let has_colors = pc.colors.is_some();
    let has_normals = pc.normals.is_some();

    let mut new_points = Vec::new();
    let mut new_colors = has_colors.then(Vec::new);
    let mut new_normals = has_normals.then(Vec::new);

    let mut current_voxel = (indices[0].0, indices[0].1, indices[0].2);
    let mut sum_p = Vector3::zeros();
    let mut sum_c = Vector3::zeros();
    let mut sum_n = Vector3::zeros();
    let mut count = 0usize;

    let flush = |sum_p: &Vector3<f32>,
                     sum_c: &Vector3<f32>,
                     sum_n: &Vector3<f32>,
                     count: usize,
                     new_points: &mut Vec<Point3<f32>>,
                     new_colors: &mut Option<Vec<Point3<f32>>>,
                     new_normals: &mut Option<Vec<Vector3<f32>>>| {
        let factor = 1.0 / count as f32;
        new_points.push(Point3::from(sum_p * factor));
        if let Some(colors) = new_colors {
            colors.push(Point3::from(sum_c * factor));
        }
        if let Some(normals) = new_normals {
            let mut n = sum_n * factor;
            if n.norm_squared() > 1e-12 {
                n.normalize_mut();
            }
            normals.push(n);
        }
    };

    for &(hx, hy, hz, idx) in &indices {
        if (hx, hy, hz) != current_voxel {
            flush(
                &sum_p,
                &sum_c,
                &sum_n,
                count,
                &mut new_points,
                &mut new_colors,
                &mut new_normals,
            );
            current_voxel = (hx, hy, hz);
            sum_p = Vector3::zeros();
            sum_c = Vector3::zeros();
            sum_n = Vector3::zeros();
            count = 0;
        }

        sum_p += pc.points[idx].coords;
        if let Some(colors) = &pc.colors {
            sum_c += colors[idx].coords;
        }
        if let Some(normals) = &pc.normals {
            sum_n += normals[idx];
        }
        count += 1;
    }

    if count > 0 {
        flush(
            &sum_p,
            &sum_c,
            &sum_n,
            count,
            &mut new_points,
            &mut new_colors,
            &mut new_normals,
        );
    }

    PointCloud {
        points: new_points,
        colors: new_colors,
        normals: new_normals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_points_within_one_voxel() {
        let pc = PointCloud::new(vec![
            Point3::new(0.01, 0.01, 0.01),
            Point3::new(0.02, 0.02, 0.02),
            Point3::new(0.5, 0.5, 0.5),
        ]);
        let down = voxel_down_sample(&pc, 0.1);
        assert_eq!(down.len(), 2);
    }

    #[test]
    fn averages_colors_per_voxel() {
        let pc = PointCloud::new(vec![
            Point3::new(0.01, 0.0, 0.0),
            Point3::new(0.02, 0.0, 0.0),
        ])
        .with_colors(vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ])
        .unwrap();

        let down = voxel_down_sample(&pc, 0.1);
        assert_eq!(down.len(), 1);
        let c = down.colors.unwrap()[0];
        assert!((c.x - 0.5).abs() < 1e-6);
        assert!((c.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn downsampling_is_idempotent() {
        let pts: Vec<Point3<f32>> = (0..200)
            .map(|i| {
                let f = i as f32;
                Point3::new(
                    (f * 0.37).sin() * 2.0,
                    (f * 0.73).cos() * 2.0,
                    (f * 0.11).sin() * 2.0,
                )
            })
            .collect();
        let pc = PointCloud::new(pts);

        let once = voxel_down_sample(&pc, 0.25);
        let twice = voxel_down_sample(&once, 0.25);

        assert_eq!(once.len(), twice.len());
        for (a, b) in once.points.iter().zip(twice.points.iter()) {
            assert!((a - b).norm() < 1e-6);
        }
    }

    #[test]
    fn zero_cell_size_is_identity() {
        let pc = PointCloud::new(vec![Point3::origin(), Point3::new(1e-6, 0.0, 0.0)]);
        assert_eq!(voxel_down_sample(&pc, 0.0).len(), 2);
    }
}
