//! Public-API coverage of the detect → orient → describe → match pipeline.

use image::{GrayImage, Luma};
use photomesh_features::{ratio_match, Orb};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn noise_image(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut img = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            img.put_pixel(x, y, Luma([rng.gen()]));
        }
    }
    img
}

#[test]
fn detect_orient_describe_match_round_trip() {
    let img = noise_image(160, 120, 9);

    let orb = Orb::new().with_n_features(400);
    let mut keypoints = orb.detect(&img);
    assert!(!keypoints.is_empty());

    orb.compute_orientations(&img, &mut keypoints);

    let descriptors = orb.extract(&img, &keypoints);
    assert!(!descriptors.is_empty());

    // Matching an image against itself gives identity correspondences for
    // every descriptor that survives the ratio test.
    let matches = ratio_match(&descriptors, &descriptors, 0.75);
    assert!(!matches.is_empty());
    for m in matches.iter() {
        assert_eq!(m.query_idx, m.train_idx);
        assert_eq!(m.distance, 0);
    }
}

#[test]
fn budget_caps_the_keypoint_count() {
    let img = noise_image(200, 160, 13);
    let orb = Orb::new().with_n_features(50);
    let keypoints = orb.detect(&img);
    assert!(keypoints.len() <= 50);
}
