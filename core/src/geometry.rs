use nalgebra::{Matrix3, Matrix3x4, Matrix4, Point2, Point3, Vector3};

/// Pinhole camera model shared by every frame of a sequence.
#[derive(Debug, Clone, Copy)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: u32,
    pub height: u32,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64, width: u32, height: u32) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
        }
    }

    /// Heuristic single-view model: focal length 1.2x the longer image side,
    /// principal point at the image center. Used when no calibration exists.
    pub fn from_first_frame(width: u32, height: u32) -> Self {
        let f = 1.2 * width.max(height) as f64;
        Self {
            fx: f,
            fy: f,
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
            width,
            height,
        }
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    pub fn inverse_matrix(&self) -> Matrix3<f64> {
        self.matrix().try_inverse().unwrap_or(Matrix3::identity())
    }

    /// Pixel coordinates to normalized image coordinates.
    pub fn normalize(&self, pixel: &Point2<f64>) -> Point2<f64> {
        Point2::new((pixel.x - self.cx) / self.fx, (pixel.y - self.cy) / self.fy)
    }

    pub fn project(&self, point: &Point3<f64>) -> Point2<f64> {
        let x = point.x / point.z;
        let y = point.y / point.z;
        Point2::new(x * self.fx + self.cx, y * self.fy + self.cy)
    }
}

/// Rigid camera transform mapping world (or previous-frame) coordinates into
/// this camera's frame: x_cam = R * x + t.
#[derive(Debug, Clone, Copy)]
pub struct CameraExtrinsics {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl CameraExtrinsics {
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::default()
    }

    /// Compose this relative transform onto an absolute one: if `self` maps
    /// frame A to frame B and `prev` maps world to frame A, the result maps
    /// world to frame B (R = R_rel * R_prev, t = R_rel * t_prev + t_rel).
    pub fn compose(&self, prev: &CameraExtrinsics) -> CameraExtrinsics {
        CameraExtrinsics {
            rotation: self.rotation * prev.rotation,
            translation: self.rotation * prev.translation + self.translation,
        }
    }

    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * point.coords + self.translation)
    }

    pub fn inverse(&self) -> Self {
        let r_inv = self.rotation.transpose();
        Self {
            rotation: r_inv,
            translation: -r_inv * self.translation,
        }
    }

    pub fn matrix(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    /// 3x4 projection matrix K * [R | t].
    pub fn projection_matrix(&self, intrinsics: &CameraIntrinsics) -> Matrix3x4<f64> {
        let mut rt = Matrix3x4::zeros();
        rt.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        rt.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        intrinsics.matrix() * rt
    }
}

impl Default for CameraExtrinsics {
    fn default() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }
}

/// Skew-symmetric cross-product matrix of a vector.
pub fn skew_symmetric(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Rotation3;

    #[test]
    fn heuristic_intrinsics_center_principal_point() {
        let k = CameraIntrinsics::from_first_frame(1400, 1050);
        assert!((k.fx - 1680.0).abs() < 1e-9);
        assert!((k.fx - k.fy).abs() < 1e-12);
        assert!((k.cx - 700.0).abs() < 1e-9);
        assert!((k.cy - 525.0).abs() < 1e-9);
    }

    #[test]
    fn normalize_inverts_projection() {
        let k = CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0, 640, 480);
        let p = Point3::new(0.3, -0.2, 2.0);
        let pix = k.project(&p);
        let n = k.normalize(&pix);
        assert!((n.x - 0.15).abs() < 1e-12);
        assert!((n.y + 0.1).abs() < 1e-12);
    }

    #[test]
    fn compose_matches_matrix_product() {
        let a = CameraExtrinsics::new(
            Rotation3::from_euler_angles(0.1, -0.2, 0.05).into_inner(),
            Vector3::new(0.2, 0.1, -0.3),
        );
        let b = CameraExtrinsics::new(
            Rotation3::from_euler_angles(-0.05, 0.07, 0.12).into_inner(),
            Vector3::new(-0.1, 0.4, 0.2),
        );
        let composed = b.compose(&a);
        let expected = b.matrix() * a.matrix();
        assert!((composed.matrix() - expected).norm() < 1e-12);
    }

    #[test]
    fn inverse_round_trips_points() {
        let ext = CameraExtrinsics::new(
            Rotation3::from_euler_angles(0.2, 0.1, -0.3).into_inner(),
            Vector3::new(1.0, -2.0, 0.5),
        );
        let p = Point3::new(0.4, 0.9, 3.1);
        let back = ext.inverse().transform_point(&ext.transform_point(&p));
        assert!((back - p).norm() < 1e-12);
    }
}
