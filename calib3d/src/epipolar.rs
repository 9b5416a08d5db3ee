//! Essential-matrix estimation between two calibrated views.

use crate::{GeometryError, Result};
use nalgebra::{DMatrix, Matrix3, Point2, Vector3};
use photomesh_core::{
    skew_symmetric, CameraExtrinsics, CameraIntrinsics, Ransac, RobustConfig, RobustModel,
};

/// Essential matrix from known extrinsics: E = [t]_x * R.
pub fn essential_from_extrinsics(extrinsics: &CameraExtrinsics) -> Matrix3<f64> {
    skew_symmetric(&extrinsics.translation) * extrinsics.rotation
}

struct EssentialEstimator;

impl RobustModel<(Point2<f64>, Point2<f64>)> for EssentialEstimator {
    type Model = Matrix3<f64>;

    fn min_sample_size(&self) -> usize {
        8
    }

    fn estimate(&self, data: &[&(Point2<f64>, Point2<f64>)]) -> Option<Self::Model> {
        let pts1: Vec<Point2<f64>> = data.iter().map(|p| p.0).collect();
        let pts2: Vec<Point2<f64>> = data.iter().map(|p| p.1).collect();
        estimate_essential_8_point(&pts1, &pts2).ok()
    }

    fn compute_error(&self, model: &Self::Model, data: &(Point2<f64>, Point2<f64>)) -> f64 {
        sampson_error(model, &data.0, &data.1)
    }
}

/// Robust essential-matrix estimation from pixel correspondences.
///
/// Points are normalized through the intrinsics before estimation; the pixel
/// threshold is rescaled into normalized coordinates by the focal length.
/// Returns the essential matrix and the per-correspondence inlier mask.
pub fn find_essential_mat_ransac(
    pts1: &[Point2<f64>],
    pts2: &[Point2<f64>],
    intrinsics: &CameraIntrinsics,
    threshold_px: f64,
    confidence: f64,
    max_iters: usize,
) -> Result<(Matrix3<f64>, Vec<bool>)> {
    if pts1.len() != pts2.len() || pts1.len() < 8 {
        return Err(GeometryError::InvalidParameters(
            "essential-matrix estimation needs >=8 paired points".to_string(),
        ));
    }

    let data: Vec<(Point2<f64>, Point2<f64>)> = pts1
        .iter()
        .zip(pts2.iter())
        .map(|(a, b)| (intrinsics.normalize(a), intrinsics.normalize(b)))
        .collect();

    let f = 0.5 * (intrinsics.fx + intrinsics.fy);
    let thresh_norm = threshold_px / f.max(1e-12);

    let config = RobustConfig {
        threshold: thresh_norm * thresh_norm,
        max_iterations: max_iters,
        confidence,
        ..Default::default()
    };

    let res = Ransac::new(config).run(&EssentialEstimator, &data);
    let model = res
        .model
        .ok_or_else(|| GeometryError::Degenerate("essential-matrix RANSAC found no model".into()))?;

    Ok((model, res.inliers))
}

/// 8-point estimate in normalized image coordinates.
fn estimate_essential_8_point(pts1: &[Point2<f64>], pts2: &[Point2<f64>]) -> Result<Matrix3<f64>> {
    if pts1.len() != pts2.len() || pts1.len() < 8 {
        return Err(GeometryError::InvalidParameters(
            "8-point algorithm needs >=8 paired points".to_string(),
        ));
    }

    let n = pts1.len();
    let mut a = DMatrix::<f64>::zeros(n, 9);
    for i in 0..n {
        let x1 = pts1[i].x;
        let y1 = pts1[i].y;
        let x2 = pts2[i].x;
        let y2 = pts2[i].y;
        a[(i, 0)] = x2 * x1;
        a[(i, 1)] = x2 * y1;
        a[(i, 2)] = x2;
        a[(i, 3)] = y2 * x1;
        a[(i, 4)] = y2 * y1;
        a[(i, 5)] = y2;
        a[(i, 6)] = x1;
        a[(i, 7)] = y1;
        a[(i, 8)] = 1.0;
    }

    let svd = a.svd(true, true);
    let vt = svd
        .v_t
        .ok_or_else(|| GeometryError::Numerical("SVD failed in 8-point estimation".to_string()))?;
    let evec = vt.row(vt.nrows() - 1);
    let e = Matrix3::new(
        evec[(0, 0)],
        evec[(0, 1)],
        evec[(0, 2)],
        evec[(0, 3)],
        evec[(0, 4)],
        evec[(0, 5)],
        evec[(0, 6)],
        evec[(0, 7)],
        evec[(0, 8)],
    );
    enforce_essential_constraints(&e)
}

/// Project onto the essential manifold: two equal singular values, third zero.
fn enforce_essential_constraints(e: &Matrix3<f64>) -> Result<Matrix3<f64>> {
    let svd = e.svd(true, true);
    let u = svd
        .u
        .ok_or_else(|| GeometryError::Numerical("SVD U missing".to_string()))?;
    let vt = svd
        .v_t
        .ok_or_else(|| GeometryError::Numerical("SVD V^T missing".to_string()))?;
    let s = 0.5 * (svd.singular_values[0] + svd.singular_values[1]);
    let sigma = Matrix3::new(s, 0.0, 0.0, 0.0, s, 0.0, 0.0, 0.0, 0.0);
    Ok(u * sigma * vt)
}

/// First-order geometric (Sampson) distance of a correspondence to the
/// epipolar constraint.
fn sampson_error(e: &Matrix3<f64>, p1: &Point2<f64>, p2: &Point2<f64>) -> f64 {
    let x1 = Vector3::new(p1.x, p1.y, 1.0);
    let x2 = Vector3::new(p2.x, p2.y, 1.0);
    let ex1 = e * x1;
    let etx2 = e.transpose() * x2;
    let x2tex1 = x2.dot(&ex1);
    let denom = ex1[0] * ex1[0] + ex1[1] * ex1[1] + etx2[0] * etx2[0] + etx2[1] * etx2[1];
    if denom <= 1e-18 {
        f64::INFINITY
    } else {
        (x2tex1 * x2tex1) / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triangulation::recover_pose_from_essential;
    use nalgebra::{Point3, Rotation3};

    fn project(k: &CameraIntrinsics, ext: &CameraExtrinsics, p: &Point3<f64>) -> Point2<f64> {
        let pc = ext.rotation * p.coords + ext.translation;
        Point2::new(
            k.fx * (pc[0] / pc[2]) + k.cx,
            k.fy * (pc[1] / pc[2]) + k.cy,
        )
    }

    #[test]
    fn ransac_recovers_geometry_with_outliers() {
        let k = CameraIntrinsics::new(750.0, 760.0, 320.0, 240.0, 640, 480);
        let rot = Rotation3::from_euler_angles(0.03, -0.02, 0.01).into_inner();
        let t = Vector3::new(0.18, -0.01, 0.02).normalize();
        let gt = CameraExtrinsics::new(rot, t);
        let identity = CameraExtrinsics::identity();

        let mut world = vec![];
        for i in 0..40 {
            let x = -0.5 + 0.05 * i as f64;
            let y = -0.2 + 0.03 * (i % 7) as f64;
            let z = 3.0 + 0.2 * (i % 5) as f64;
            world.push(Point3::new(x, y, z));
        }
        let pts1: Vec<Point2<f64>> = world.iter().map(|p| project(&k, &identity, p)).collect();
        let mut pts2: Vec<Point2<f64>> = world.iter().map(|p| project(&k, &gt, p)).collect();

        // Inject outliers.
        for i in 0..10 {
            pts2[i] = Point2::new(50.0 + i as f64 * 20.0, 400.0 - i as f64 * 15.0);
        }

        let (e, inliers) = find_essential_mat_ransac(&pts1, &pts2, &k, 3.0, 0.999, 600).unwrap();
        let inlier_count = inliers.iter().filter(|&&m| m).count();
        assert!(inlier_count >= 25);

        let recovery = recover_pose_from_essential(&e, &pts1, &pts2, &k).unwrap();
        let dir = recovery.pose.translation.normalize();
        assert!(dir.dot(&gt.translation.normalize()).abs() > 0.95);
    }

    #[test]
    fn rejects_insufficient_correspondences() {
        let k = CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0, 640, 480);
        let pts: Vec<Point2<f64>> = (0..5).map(|i| Point2::new(i as f64, i as f64)).collect();
        assert!(find_essential_mat_ransac(&pts, &pts, &k, 1.0, 0.999, 100).is_err());
    }

    #[test]
    fn essential_from_extrinsics_satisfies_epipolar_constraint() {
        let k = CameraIntrinsics::new(600.0, 600.0, 320.0, 240.0, 640, 480);
        let gt = CameraExtrinsics::new(
            Rotation3::from_euler_angles(0.05, 0.02, -0.03).into_inner(),
            Vector3::new(0.3, -0.1, 0.05),
        );
        let e = essential_from_extrinsics(&gt);

        let p = Point3::new(0.2, -0.3, 4.0);
        let x1 = k.normalize(&project(&k, &CameraExtrinsics::identity(), &p));
        let x2 = k.normalize(&project(&k, &gt, &p));
        let v1 = Vector3::new(x1.x, x1.y, 1.0);
        let v2 = Vector3::new(x2.x, x2.y, 1.0);
        assert!(v2.dot(&(e * v1)).abs() < 1e-10);
    }
}
