//! The local reconstruction pipeline: features, pairwise poses,
//! triangulation, surface extraction, export.
//!
//! The image sequence is folded with an immutable [`ChainState`] carrying
//! the anchor frame and its absolute pose. Pose advancement and point
//! contribution are decoupled: a recovered pose always advances the chain,
//! while matching or estimation failures advance only the anchor image, and
//! drift accumulates by design (no global refinement).

use crate::config::PipelineParams;
use crate::error::{ReconstructError, Result};
use crate::loader::{self, LoadedImage};
use image::{imageops, RgbImage};
use log::{debug, info};
use nalgebra::{Point2, Point3};
use photomesh_calib3d::{
    find_essential_mat_ransac, recover_pose_from_essential, triangulate_points,
};
use photomesh_core::{CameraExtrinsics, CameraIntrinsics, Descriptors, Matches, PointCloud};
use photomesh_features::{orb_detect_and_compute, ratio_match};
use photomesh_io::write_glb;
use photomesh_surface::{
    estimate_normals, orient_normals, reconstruct_surface, trim_by_density, voxel_down_sample,
    TriangleMesh,
};
use rayon::prelude::*;
use std::path::Path;

/// A decoded frame with its descriptors (each descriptor carries its
/// keypoint).
pub struct Frame {
    pub name: String,
    pub rgb: RgbImage,
    pub descriptors: Descriptors,
}

/// Fold state threaded through the sequence: the anchor frame index and the
/// anchor's absolute pose relative to frame 0.
#[derive(Debug, Clone, Copy)]
pub struct ChainState {
    pub anchor: usize,
    pub pose: CameraExtrinsics,
}

/// Points and colors one successfully posed pair adds to the global cloud.
pub struct PairContribution {
    pub points: Vec<Point3<f32>>,
    pub colors: Vec<Point3<f32>>,
}

/// Run the whole local pipeline and write the GLB artifact.
pub fn run(image_dir: &Path, output: &Path, params: &PipelineParams) -> Result<()> {
    let images = loader::load_images(image_dir, params.max_image_side)?;
    let (width, height) = images[0].rgb.dimensions();
    let intrinsics = CameraIntrinsics::from_first_frame(width, height);
    info!(
        "single-camera model from first frame: f={:.1} center=({:.1}, {:.1})",
        intrinsics.fx, intrinsics.cx, intrinsics.cy
    );

    let frames = extract_frames(images, params.feature_budget);
    if frames[0].descriptors.is_empty() {
        return Err(ReconstructError::NoFeaturesDetected(frames[0].name.clone()));
    }

    let mut points = Vec::new();
    let mut colors = Vec::new();
    let mut state = ChainState {
        anchor: 0,
        pose: CameraExtrinsics::identity(),
    };
    for curr in 1..frames.len() {
        let (next, contribution) = advance_chain(&frames, state, curr, &intrinsics, params);
        if let Some(c) = contribution {
            points.extend(c.points);
            colors.extend(c.colors);
        }
        state = next;
    }

    if points.is_empty() {
        return Err(ReconstructError::ReconstructionFailed(
            "insufficient matches".to_string(),
        ));
    }
    info!("triangulated {} points across the sequence", points.len());

    let cloud = PointCloud {
        points,
        colors: Some(colors),
        normals: None,
    };
    let mesh = build_surface(cloud, params)?;
    info!(
        "surface: {} vertices, {} triangles",
        mesh.num_vertices(),
        mesh.num_faces()
    );

    write_glb(&mesh, output)?;
    info!("wrote {}", output.display());
    Ok(())
}

/// Per-image feature extraction; independent per frame, so parallel.
pub fn extract_frames(images: Vec<LoadedImage>, feature_budget: usize) -> Vec<Frame> {
    images
        .into_par_iter()
        .map(|img| {
            let gray = imageops::grayscale(&img.rgb);
            let (_, descriptors) = orb_detect_and_compute(&gray, feature_budget);
            debug!("{}: {} descriptors", img.name, descriptors.len());
            Frame {
                name: img.name,
                rgb: img.rgb,
                descriptors,
            }
        })
        .collect()
}

/// Ratio-test matching between the anchor and the current frame.
pub fn match_pair(prev: &Descriptors, curr: &Descriptors, ratio: f32) -> Matches {
    ratio_match(prev, curr, ratio)
}

/// One fold step: try to pose the (anchor, current) pair and triangulate
/// its inliers. Returns the next chain state plus any point contribution.
pub fn advance_chain(
    frames: &[Frame],
    state: ChainState,
    curr: usize,
    intrinsics: &CameraIntrinsics,
    params: &PipelineParams,
) -> (ChainState, Option<PairContribution>) {
    let prev = &frames[state.anchor];
    let frame = &frames[curr];

    // A frame with no descriptors is dropped; the anchor keeps waiting.
    if frame.descriptors.is_empty() {
        debug!("{}: no descriptors, frame dropped", frame.name);
        return (state, None);
    }

    let matches = match_pair(&prev.descriptors, &frame.descriptors, params.match_ratio);
    if matches.len() < params.min_matches {
        debug!(
            "{} -> {}: {} matches below threshold, advancing anchor",
            prev.name,
            frame.name,
            matches.len()
        );
        return (advance_anchor(state, curr), None);
    }

    let pts_prev: Vec<Point2<f64>> = matches
        .iter()
        .map(|m| prev.descriptors.descriptors[m.query_idx].keypoint.pt())
        .collect();
    let pts_curr: Vec<Point2<f64>> = matches
        .iter()
        .map(|m| frame.descriptors.descriptors[m.train_idx].keypoint.pt())
        .collect();

    let essential = match find_essential_mat_ransac(
        &pts_prev,
        &pts_curr,
        intrinsics,
        params.ransac_threshold_px,
        params.ransac_confidence,
        params.ransac_iterations,
    ) {
        Ok((essential, _)) => essential,
        Err(err) => {
            debug!(
                "{} -> {}: essential estimation failed ({err}), advancing anchor",
                prev.name, frame.name
            );
            return (advance_anchor(state, curr), None);
        }
    };

    let recovery = match recover_pose_from_essential(&essential, &pts_prev, &pts_curr, intrinsics)
    {
        Ok(recovery) => recovery,
        Err(err) => {
            debug!(
                "{} -> {}: pose recovery failed ({err}), advancing anchor",
                prev.name, frame.name
            );
            return (advance_anchor(state, curr), None);
        }
    };

    // A recovered pose advances the trajectory even when the pair ends up
    // contributing no points.
    let pose_curr = recovery.pose.compose(&state.pose);
    let next = ChainState {
        anchor: curr,
        pose: pose_curr,
    };

    if recovery.num_inliers < params.min_matches {
        debug!(
            "{} -> {}: {} cheirality inliers, pose advanced without points",
            prev.name, frame.name, recovery.num_inliers
        );
        return (next, None);
    }

    let p_prev = state.pose.projection_matrix(intrinsics);
    let p_curr = pose_curr.projection_matrix(intrinsics);

    let in_prev: Vec<Point2<f64>> = pts_prev
        .iter()
        .zip(&recovery.inlier_mask)
        .filter(|(_, &keep)| keep)
        .map(|(p, _)| *p)
        .collect();
    let in_curr: Vec<Point2<f64>> = pts_curr
        .iter()
        .zip(&recovery.inlier_mask)
        .filter(|(_, &keep)| keep)
        .map(|(p, _)| *p)
        .collect();

    let triangulated = match triangulate_points(&p_prev, &p_curr, &in_prev, &in_curr) {
        Ok(points) => points,
        Err(err) => {
            debug!(
                "{} -> {}: triangulation failed ({err})",
                prev.name, frame.name
            );
            return (next, None);
        }
    };

    let mut points = Vec::new();
    let mut colors = Vec::new();
    for (x, pixel) in triangulated.iter().zip(in_prev.iter()) {
        if !x.coords.iter().all(|v| v.is_finite()) {
            continue;
        }
        points.push(Point3::new(x.x as f32, x.y as f32, x.z as f32));
        colors.push(sample_color(&prev.rgb, pixel));
    }

    if points.is_empty() {
        debug!(
            "{} -> {}: all triangulated points degenerate",
            prev.name, frame.name
        );
        return (next, None);
    }

    debug!(
        "{} -> {}: contributed {} points",
        prev.name,
        frame.name,
        points.len()
    );
    (next, Some(PairContribution { points, colors }))
}

/// Nearest-pixel color lookup in the previous frame, clamped to bounds,
/// normalized to [0, 1].
pub fn sample_color(image: &RgbImage, pixel: &Point2<f64>) -> Point3<f32> {
    let x = (pixel.x as i64).clamp(0, image.width() as i64 - 1) as u32;
    let y = (pixel.y as i64).clamp(0, image.height() as i64 - 1) as u32;
    let p = image.get_pixel(x, y);
    Point3::new(
        p[0] as f32 / 255.0,
        p[1] as f32 / 255.0,
        p[2] as f32 / 255.0,
    )
}

fn advance_anchor(state: ChainState, curr: usize) -> ChainState {
    ChainState {
        anchor: curr,
        pose: state.pose,
    }
}

/// Densify, orient, mesh and trim the accumulated cloud.
fn build_surface(cloud: PointCloud, params: &PipelineParams) -> Result<TriangleMesh> {
    let mut cloud = voxel_down_sample(&cloud, params.voxel_size);
    debug!("voxel downsample left {} points", cloud.len());

    estimate_normals(&mut cloud, params.normal_neighbors);
    orient_normals(&mut cloud, params.normal_neighbors);

    let (mut mesh, densities) = reconstruct_surface(&cloud, params.octree_depth);
    if mesh.is_empty() {
        return Err(ReconstructError::EmptyMesh);
    }

    trim_by_density(&mut mesh, &densities, params.density_quantile);
    if mesh.is_empty() {
        return Err(ReconstructError::EmptyMesh);
    }

    Ok(mesh)
}
