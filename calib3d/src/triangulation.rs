//! Two-view triangulation and pose recovery.

use crate::{GeometryError, Result};
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Point2, Point3};
use photomesh_core::{CameraExtrinsics, CameraIntrinsics};

/// Linear (DLT) triangulation from two projection matrices.
///
/// Each output point is the SVD null-space solution of the stacked projection
/// constraints, dehomogenized by the fourth coordinate. A vanishing fourth
/// coordinate yields a NaN point, which downstream finite-filtering removes.
pub fn triangulate_points(
    p1: &Matrix3x4<f64>,
    p2: &Matrix3x4<f64>,
    pts1: &[Point2<f64>],
    pts2: &[Point2<f64>],
) -> Result<Vec<Point3<f64>>> {
    if pts1.len() != pts2.len() {
        return Err(GeometryError::InvalidParameters(
            "triangulation requires equal point counts".to_string(),
        ));
    }

    let mut out = Vec::with_capacity(pts1.len());
    for (a, b) in pts1.iter().zip(pts2.iter()) {
        let mut m = Matrix4::<f64>::zeros();
        for c in 0..4 {
            m[(0, c)] = a.x * p1[(2, c)] - p1[(0, c)];
            m[(1, c)] = a.y * p1[(2, c)] - p1[(1, c)];
            m[(2, c)] = b.x * p2[(2, c)] - p2[(0, c)];
            m[(3, c)] = b.y * p2[(2, c)] - p2[(1, c)];
        }
        let svd = m.svd(true, true);
        let vt = svd
            .v_t
            .ok_or_else(|| GeometryError::Numerical("SVD failed in triangulation".to_string()))?;
        let xh = vt.row(3);
        let w = xh[(0, 3)];
        if w.abs() < 1e-12 {
            out.push(Point3::new(f64::NAN, f64::NAN, f64::NAN));
            continue;
        }
        out.push(Point3::new(xh[(0, 0)] / w, xh[(0, 1)] / w, xh[(0, 2)] / w));
    }

    Ok(out)
}

/// Result of pose recovery: the relative transform of the second camera and
/// the per-correspondence cheirality mask (positive depth in both frames).
#[derive(Debug, Clone)]
pub struct PoseRecovery {
    pub pose: CameraExtrinsics,
    pub inlier_mask: Vec<bool>,
    pub num_inliers: usize,
}

/// Recover the relative pose from an essential matrix.
///
/// Tests the four (R, t) decompositions and keeps the one placing the most
/// triangulated correspondences in front of both cameras. The winning
/// candidate's positive-depth mask is returned alongside the pose.
pub fn recover_pose_from_essential(
    essential: &Matrix3<f64>,
    pts1: &[Point2<f64>],
    pts2: &[Point2<f64>],
    intrinsics: &CameraIntrinsics,
) -> Result<PoseRecovery> {
    if pts1.len() != pts2.len() || pts1.len() < 5 {
        return Err(GeometryError::InvalidParameters(
            "pose recovery needs >=5 paired points".to_string(),
        ));
    }

    let svd = essential.svd(true, true);
    let mut u = svd
        .u
        .ok_or_else(|| GeometryError::Numerical("SVD U missing in pose recovery".to_string()))?;
    let mut vt = svd
        .v_t
        .ok_or_else(|| GeometryError::Numerical("SVD V^T missing in pose recovery".to_string()))?;

    if u.determinant() < 0.0 {
        u = -u;
    }
    if vt.determinant() < 0.0 {
        vt = -vt;
    }

    let w = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    let r1 = u * w * vt;
    let r2 = u * w.transpose() * vt;
    let t = u.column(2).into_owned();

    let candidates = [
        CameraExtrinsics::new(r1, t),
        CameraExtrinsics::new(r1, -t),
        CameraExtrinsics::new(r2, t),
        CameraExtrinsics::new(r2, -t),
    ];

    let norm1: Vec<Point2<f64>> = pts1.iter().map(|p| intrinsics.normalize(p)).collect();
    let norm2: Vec<Point2<f64>> = pts2.iter().map(|p| intrinsics.normalize(p)).collect();

    let p1 = Matrix3x4::new(
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0,
    );

    let mut best: Option<PoseRecovery> = None;
    for cand in candidates {
        let mut p2 = Matrix3x4::zeros();
        p2.fixed_view_mut::<3, 3>(0, 0).copy_from(&cand.rotation);
        p2.fixed_view_mut::<3, 1>(0, 3).copy_from(&cand.translation);

        let tri = triangulate_points(&p1, &p2, &norm1, &norm2)?;
        let mut mask = vec![false; tri.len()];
        let mut score = 0usize;
        for (i, x) in tri.iter().enumerate() {
            if !x.coords.iter().all(|v| v.is_finite()) {
                continue;
            }
            let z1 = x.z;
            let z2 = (cand.rotation * x.coords + cand.translation)[2];
            if z1 > 0.0 && z2 > 0.0 {
                mask[i] = true;
                score += 1;
            }
        }

        if best.as_ref().map_or(true, |b| score > b.num_inliers) {
            best = Some(PoseRecovery {
                pose: cand,
                inlier_mask: mask,
                num_inliers: score,
            });
        }
    }

    best.ok_or_else(|| GeometryError::Degenerate("no valid pose candidate found".to_string()))
}
