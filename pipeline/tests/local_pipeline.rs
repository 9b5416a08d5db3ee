//! Local-path integration coverage: loader preconditions, deterministic
//! sequencing, and the synthetic two-view scenarios.

use image::{GrayImage, Luma, RgbImage};
use nalgebra::Vector3;
use photomesh::local::{advance_chain, extract_frames, match_pair, ChainState};
use photomesh::loader::{candidate_paths, LoadedImage};
use photomesh::{reconstruct, PipelineParams, ReconstructError, ReconstructionConfig};
use photomesh_core::{CameraExtrinsics, CameraIntrinsics};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use tempfile::tempdir;

fn save_gray(img: &GrayImage, path: &Path) {
    img.save(path).unwrap();
}

/// Deterministic per-pixel noise: extreme-valued pixels give abundant FAST
/// corners and the surrounding noise makes every BRIEF descriptor unique.
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

fn to_rgb(gray: &GrayImage) -> RgbImage {
    let mut rgb = RgbImage::new(gray.width(), gray.height());
    for (x, y, p) in gray.enumerate_pixels() {
        rgb.put_pixel(x, y, image::Rgb([p[0], p[0], p[0]]));
    }
    rgb
}

// ---------------------------------------------------------------------------
// Loader preconditions
// ---------------------------------------------------------------------------

#[test]
fn empty_directory_is_insufficient() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out.glb");

    let err = reconstruct(dir.path(), &out, &ReconstructionConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        ReconstructError::InsufficientImages { found: 0 }
    ));
    assert!(!out.exists());
}

#[test]
fn single_image_is_insufficient() {
    let dir = tempdir().unwrap();
    save_gray(&noise_image(64, 64, 1), &dir.path().join("only.png"));
    std::fs::write(dir.path().join("notes.txt"), b"not an image").unwrap();
    let out = dir.path().join("out.glb");

    let err = reconstruct(dir.path(), &out, &ReconstructionConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        ReconstructError::InsufficientImages { found: 1 }
    ));
    assert!(!out.exists());
}

#[test]
fn corrupt_images_are_unreadable() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("a.jpg"), b"this is not a jpeg").unwrap();
    std::fs::write(dir.path().join("b.png"), b"nor is this a png").unwrap();
    let out = dir.path().join("out.glb");

    let err = reconstruct(dir.path(), &out, &ReconstructionConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        ReconstructError::NoReadableImages { decoded: 0 }
    ));
    assert!(!out.exists());
}

#[test]
fn candidate_order_is_name_sorted_and_stable() {
    let dir = tempdir().unwrap();
    for name in ["c_3.png", "a_1.png", "b_2.png", "skip.txt"] {
        std::fs::write(dir.path().join(name), b"x").unwrap();
    }

    let first = candidate_paths(dir.path()).unwrap();
    let second = candidate_paths(dir.path()).unwrap();
    assert_eq!(first, second);

    let names: Vec<_> = first
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a_1.png", "b_2.png", "c_3.png"]);
}

#[test]
fn featureless_anchor_frame_is_fatal() {
    let dir = tempdir().unwrap();
    // Lexicographically first frame is flat: no corners, no descriptors.
    save_gray(&GrayImage::from_pixel(96, 96, Luma([128])), &dir.path().join("a.png"));
    save_gray(&noise_image(96, 96, 2), &dir.path().join("b.png"));
    save_gray(&noise_image(96, 96, 3), &dir.path().join("c.png"));
    let out = dir.path().join("out.glb");

    let err = reconstruct(dir.path(), &out, &ReconstructionConfig::default()).unwrap_err();
    assert!(matches!(err, ReconstructError::NoFeaturesDetected(_)));
    assert!(!out.exists());
}

// ---------------------------------------------------------------------------
// Scenario A: textured two-depth scene under a known camera translation
// ---------------------------------------------------------------------------

/// Two views of a piecewise-planar scene: the left half sits at half the
/// depth of the right half, and the camera translates along +x between the
/// frames, so image content shifts left by 18 px (near) and 9 px (far).
fn two_view_pair() -> (LoadedImage, LoadedImage) {
    let width = 440u32;
    let height = 320u32;
    let (near_shift, far_shift) = (18u32, 9u32);

    let tex = noise_image(width + near_shift + 2, height, 42);

    let mut img1 = GrayImage::new(width, height);
    let mut img2 = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            img1.put_pixel(x, y, *tex.get_pixel(x, y));
            let shift = if x < width / 2 { near_shift } else { far_shift };
            img2.put_pixel(x, y, *tex.get_pixel(x + shift, y));
        }
    }

    (
        LoadedImage {
            name: "frame_0001.png".to_string(),
            rgb: to_rgb(&img1),
        },
        LoadedImage {
            name: "frame_0002.png".to_string(),
            rgb: to_rgb(&img2),
        },
    )
}

#[test]
fn known_translation_pair_matches_poses_and_triangulates() {
    let (img1, img2) = two_view_pair();
    let (width, height) = img1.rgb.dimensions();
    let intrinsics = CameraIntrinsics::from_first_frame(width, height);
    // A reduced keypoint budget keeps brute-force matching quick here; the
    // scene has far more than enough corners either way.
    let params = PipelineParams {
        feature_budget: 1500,
        ..Default::default()
    };

    let frames = extract_frames(vec![img1, img2], params.feature_budget);
    assert!(!frames[0].descriptors.is_empty());
    assert!(!frames[1].descriptors.is_empty());

    let matches = match_pair(
        &frames[0].descriptors,
        &frames[1].descriptors,
        params.match_ratio,
    );
    assert!(
        matches.len() >= params.min_matches,
        "only {} ratio-test matches",
        matches.len()
    );

    let state = ChainState {
        anchor: 0,
        pose: CameraExtrinsics::identity(),
    };
    let (next, contribution) = advance_chain(&frames, state, 1, &intrinsics, &params);

    // The pose chain advanced off the identity.
    assert_eq!(next.anchor, 1);
    let t = next.pose.translation;
    assert!(t.norm() > 1e-6, "pose did not advance");

    // Camera moved along +x, so the recovered frame-to-frame translation
    // points along -x (up to the reconstruction's global scale).
    let dir = t.normalize();
    assert!(
        dir.dot(&Vector3::new(-1.0, 0.0, 0.0)) > 0.9,
        "baseline direction off: {:?}",
        dir
    );

    let contribution = contribution.expect("pair contributed no points");
    assert!(!contribution.points.is_empty());
    assert_eq!(contribution.points.len(), contribution.colors.len());
    for p in &contribution.points {
        assert!(p.coords.iter().all(|v| v.is_finite()));
    }
    for c in &contribution.colors {
        assert!(c.coords.iter().all(|v| (0.0..=1.0).contains(v)));
    }
}

// ---------------------------------------------------------------------------
// Scenario B: no pair ever reaches the match threshold
// ---------------------------------------------------------------------------

/// A few identical bright dots on a flat background: enough corners for
/// descriptors, but every dot looks like every other, so the ratio test
/// rejects nearly all matches.
fn ambiguous_dots(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut img = GrayImage::from_pixel(width, height, Luma([30]));
    for _ in 0..8 {
        let x0 = rng.gen_range(24..width - 27);
        let y0 = rng.gen_range(24..height - 27);
        for y in y0..y0 + 3 {
            for x in x0..x0 + 3 {
                img.put_pixel(x, y, Luma([220]));
            }
        }
    }
    img
}

#[test]
fn starved_matching_fails_without_panicking() {
    let dir = tempdir().unwrap();
    save_gray(&noise_image(200, 160, 5), &dir.path().join("f0.png"));
    save_gray(&ambiguous_dots(200, 160, 6), &dir.path().join("f1.png"));
    save_gray(&ambiguous_dots(200, 160, 7), &dir.path().join("f2.png"));
    let out = dir.path().join("out.glb");

    let err = reconstruct(dir.path(), &out, &ReconstructionConfig::default()).unwrap_err();
    match err {
        ReconstructError::ReconstructionFailed(msg) => {
            assert!(msg.contains("insufficient matches"))
        }
        other => panic!("expected ReconstructionFailed, got {other:?}"),
    }
    assert!(!out.exists());
}
