use image::GrayImage;
use photomesh_core::{KeyPoint, KeyPoints};

/// Bresenham-circle offsets sampled around the candidate pixel.
const CIRCLE_OFFSETS: [(i32, i32); 12] = [
    (-3, 0),
    (-2, 1),
    (-1, 2),
    (0, 3),
    (1, 2),
    (2, 1),
    (3, 0),
    (2, -1),
    (1, -2),
    (0, -3),
    (-1, -2),
    (-2, -1),
];

/// Minimum count of circle samples that must agree for a corner.
const MIN_AGREEING: u32 = 9;

/// FAST corner detection with a contrast response score.
///
/// A pixel is a corner when at least nine circle samples are uniformly
/// brighter or uniformly darker than the center by `threshold`. The response
/// is the summed absolute contrast of the agreeing samples, and keypoints are
/// returned strongest-first, truncated to `max_keypoints`.
pub fn fast_detect(image: &GrayImage, threshold: u8, max_keypoints: usize) -> KeyPoints {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let mut keypoints = Vec::new();

    for y in 3..height - 3 {
        for x in 3..width - 3 {
            let p = image.get_pixel(x as u32, y as u32)[0];

            let mut brighter = 0u32;
            let mut darker = 0u32;
            let mut brighter_score = 0u32;
            let mut darker_score = 0u32;

            for &(dx, dy) in &CIRCLE_OFFSETS {
                let val = image.get_pixel((x + dx) as u32, (y + dy) as u32)[0];

                if val > p.saturating_add(threshold) {
                    brighter += 1;
                    brighter_score += (val - p) as u32;
                } else if val < p.saturating_sub(threshold) {
                    darker += 1;
                    darker_score += (p - val) as u32;
                }
            }

            if brighter >= MIN_AGREEING || darker >= MIN_AGREEING {
                let score = brighter_score.max(darker_score);
                keypoints.push(KeyPoint::new(x as f64, y as f64).with_response(score as f64));
            }
        }
    }

    keypoints.sort_by(|a, b| {
        b.response
            .partial_cmp(&a.response)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    keypoints.truncate(max_keypoints);

    KeyPoints { keypoints }
}

/// Greedy spatial suppression: walk keypoints strongest-first and keep only
/// those at least `radius` pixels from every keypoint kept so far.
pub fn suppress_nearby(keypoints: &mut Vec<KeyPoint>, radius: f64) {
    use std::collections::HashMap;

    keypoints.sort_by(|a, b| {
        b.response
            .partial_cmp(&a.response)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let cell = radius.max(1.0);
    let r2 = radius * radius;
    let mut grid: HashMap<(i64, i64), Vec<(f64, f64)>> = HashMap::new();
    let mut kept = Vec::with_capacity(keypoints.len());

    'outer: for kp in keypoints.iter() {
        let gx = (kp.x / cell).floor() as i64;
        let gy = (kp.y / cell).floor() as i64;
        for dx in -1..=1 {
            for dy in -1..=1 {
                if let Some(bucket) = grid.get(&(gx + dx, gy + dy)) {
                    for &(px, py) in bucket {
                        let ddx = kp.x - px;
                        let ddy = kp.y - py;
                        if ddx * ddx + ddy * ddy < r2 {
                            continue 'outer;
                        }
                    }
                }
            }
        }
        grid.entry((gx, gy)).or_default().push((kp.x, kp.y));
        kept.push(*kp);
    }

    *keypoints = kept;
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn detects_small_bright_blob() {
        let mut img = GrayImage::from_pixel(64, 64, Luma([20]));
        // A 3x3 blob: the whole sample circle of its center lies outside.
        for y in 30..33 {
            for x in 30..33 {
                img.put_pixel(x, y, Luma([220]));
            }
        }

        let kps = fast_detect(&img, 20, 500);
        assert!(!kps.is_empty());
        for kp in kps.iter() {
            assert!((kp.x - 31.0).abs() <= 4.0);
            assert!((kp.y - 31.0).abs() <= 4.0);
        }
    }

    #[test]
    fn flat_image_has_no_corners() {
        let img = GrayImage::from_pixel(48, 48, Luma([128]));
        assert!(fast_detect(&img, 20, 100).is_empty());
    }

    #[test]
    fn suppression_enforces_min_distance() {
        let mut kps = vec![
            KeyPoint::new(10.0, 10.0).with_response(5.0),
            KeyPoint::new(11.0, 10.0).with_response(4.0),
            KeyPoint::new(30.0, 30.0).with_response(3.0),
        ];
        suppress_nearby(&mut kps, 4.0);
        assert_eq!(kps.len(), 2);
        assert_eq!(kps[0].x, 10.0);
        assert_eq!(kps[1].x, 30.0);
    }
}
