//! ORB (oriented FAST + rotated BRIEF).

use crate::fast::{fast_detect, suppress_nearby};
use image::{imageops, GrayImage};
use photomesh_core::{Descriptor, Descriptors, KeyPoint, KeyPoints};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fixed seed for the BRIEF sampling pattern, so descriptors are stable
/// across processes and runs.
const PATTERN_SEED: u64 = 0x0b5e_55ed;

const DESCRIPTOR_BITS: usize = 256;

pub struct Orb {
    n_features: usize,
    scale_factor: f32,
    n_levels: usize,
    patch_size: i32,
    fast_threshold: u8,
    suppression_radius: f64,
    pattern: Vec<(f32, f32, f32, f32)>,
}

impl Default for Orb {
    fn default() -> Self {
        Self {
            n_features: 500,
            scale_factor: 1.2,
            n_levels: 8,
            patch_size: 31,
            fast_threshold: 20,
            suppression_radius: 4.0,
            pattern: generate_brief_pattern(31, PATTERN_SEED),
        }
    }
}

impl Orb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_features(mut self, n: usize) -> Self {
        self.n_features = n;
        self
    }

    pub fn with_n_levels(mut self, n: usize) -> Self {
        self.n_levels = n;
        self
    }

    pub fn with_fast_threshold(mut self, threshold: u8) -> Self {
        self.fast_threshold = threshold;
        self
    }

    /// Detect keypoints with FAST across the scale pyramid.
    pub fn detect(&self, image: &GrayImage) -> KeyPoints {
        let mut all_keypoints = Vec::new();
        let mut scale = 1.0f32;

        for level in 0..self.n_levels {
            let scaled;
            let img = if level == 0 {
                image
            } else {
                let w = (image.width() as f32 / scale) as u32;
                let h = (image.height() as f32 / scale) as u32;
                if w < 16 || h < 16 {
                    break;
                }
                scaled = imageops::resize(image, w, h, imageops::FilterType::Triangle);
                &scaled
            };

            let kps = fast_detect(img, self.fast_threshold, self.n_features * 2);
            for kp in kps.keypoints {
                all_keypoints.push(
                    KeyPoint::new(kp.x * scale as f64, kp.y * scale as f64)
                        .with_size(self.patch_size as f64 * scale as f64)
                        .with_octave(level as i32)
                        .with_response(kp.response),
                );
            }

            scale *= self.scale_factor;
        }

        suppress_nearby(&mut all_keypoints, self.suppression_radius);
        all_keypoints.truncate(self.n_features);

        KeyPoints {
            keypoints: all_keypoints,
        }
    }

    /// Assign orientations from the patch intensity centroid.
    pub fn compute_orientations(&self, image: &GrayImage, keypoints: &mut KeyPoints) {
        let half_patch = self.patch_size / 2;
        let width = image.width() as i32;
        let height = image.height() as i32;

        for kp in &mut keypoints.keypoints {
            let x = kp.x as i32;
            let y = kp.y as i32;

            let mut m01 = 0.0f64;
            let mut m10 = 0.0f64;

            for dy in -half_patch..half_patch {
                for dx in -half_patch..half_patch {
                    let px = x + dx;
                    let py = y + dy;
                    if px >= 0 && px < width && py >= 0 && py < height {
                        let intensity = image.get_pixel(px as u32, py as u32)[0] as f64;
                        m01 += intensity * dy as f64;
                        m10 += intensity * dx as f64;
                    }
                }
            }

            kp.angle = m01.atan2(m10).to_degrees();
        }
    }

    /// Compute steered BRIEF descriptors; keypoints too close to the border
    /// are dropped, so the result carries its own keypoints.
    pub fn extract(&self, image: &GrayImage, keypoints: &KeyPoints) -> Descriptors {
        let mut descriptors = Descriptors::with_capacity(keypoints.len());
        for kp in keypoints.iter() {
            if let Some(desc) = self.describe(image, kp) {
                descriptors.push(desc);
            }
        }
        descriptors
    }

    fn describe(&self, image: &GrayImage, kp: &KeyPoint) -> Option<Descriptor> {
        let width = image.width() as i32;
        let height = image.height() as i32;
        let cx = kp.x as i32;
        let cy = kp.y as i32;

        let half_patch = self.patch_size / 2;
        if cx < half_patch
            || cx >= width - half_patch
            || cy < half_patch
            || cy >= height - half_patch
        {
            return None;
        }

        let angle_rad = kp.angle.to_radians();
        let cos_a = angle_rad.cos() as f32;
        let sin_a = angle_rad.sin() as f32;

        let mut data = vec![0u8; DESCRIPTOR_BITS / 8];

        for (bit, &(x1, y1, x2, y2)) in self.pattern.iter().enumerate() {
            let rx1 = cos_a * x1 - sin_a * y1;
            let ry1 = sin_a * x1 + cos_a * y1;
            let rx2 = cos_a * x2 - sin_a * y2;
            let ry2 = sin_a * x2 + cos_a * y2;

            let px1 = (cx as f32 + rx1) as i32;
            let py1 = (cy as f32 + ry1) as i32;
            let px2 = (cx as f32 + rx2) as i32;
            let py2 = (cy as f32 + ry2) as i32;

            if px1 < 0
                || px1 >= width
                || py1 < 0
                || py1 >= height
                || px2 < 0
                || px2 >= width
                || py2 < 0
                || py2 >= height
            {
                continue;
            }

            let val1 = image.get_pixel(px1 as u32, py1 as u32)[0];
            let val2 = image.get_pixel(px2 as u32, py2 as u32)[0];

            if val1 < val2 {
                data[bit / 8] |= 1 << (7 - bit % 8);
            }
        }

        Some(Descriptor::new(data, *kp))
    }
}

fn generate_brief_pattern(patch_size: i32, seed: u64) -> Vec<(f32, f32, f32, f32)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let half = patch_size as f32 / 2.0;

    (0..DESCRIPTOR_BITS)
        .map(|_| {
            (
                rng.gen_range(-half..half),
                rng.gen_range(-half..half),
                rng.gen_range(-half..half),
                rng.gen_range(-half..half),
            )
        })
        .collect()
}

/// Detect, orient and describe in one pass.
pub fn orb_detect_and_compute(image: &GrayImage, n_features: usize) -> (KeyPoints, Descriptors) {
    let orb = Orb::new().with_n_features(n_features);
    let mut keypoints = orb.detect(image);
    orb.compute_orientations(image, &mut keypoints);
    let descriptors = orb.extract(image, &keypoints);
    (keypoints, descriptors)
}
