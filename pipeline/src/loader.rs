//! Image enumeration and decoding.

use crate::error::{ReconstructError, Result};
use image::{imageops, RgbImage};
use log::{debug, info};
use std::path::{Path, PathBuf};

/// Case-insensitive extension allow-list.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

pub struct LoadedImage {
    pub name: String,
    pub rgb: RgbImage,
}

/// Candidate image paths in the directory, name-sorted for a reproducible
/// sequence. Fails with `InsufficientImages` below two candidates.
pub fn candidate_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_image_extension(path))
        .collect();
    paths.sort();

    if paths.len() < 2 {
        return Err(ReconstructError::InsufficientImages { found: paths.len() });
    }
    Ok(paths)
}

/// Decode the candidate images, silently skipping unreadable entries and
/// downsizing oversized frames. Fails with `NoReadableImages` when fewer
/// than two decode.
pub fn load_images(dir: &Path, max_side: u32) -> Result<Vec<LoadedImage>> {
    let paths = candidate_paths(dir)?;
    let mut images = Vec::with_capacity(paths.len());

    for path in &paths {
        match image::open(path) {
            Ok(decoded) => {
                let rgb = downsize(decoded.to_rgb8(), max_side);
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                images.push(LoadedImage { name, rgb });
            }
            Err(err) => {
                debug!("skipping unreadable image {}: {err}", path.display());
            }
        }
    }

    if images.len() < 2 {
        return Err(ReconstructError::NoReadableImages {
            decoded: images.len(),
        });
    }

    info!(
        "loaded {} of {} candidate images from {}",
        images.len(),
        paths.len(),
        dir.display()
    );
    Ok(images)
}

/// Area-resample the image so its longer side fits `max_side`, preserving
/// aspect ratio. Images already within the bound pass through untouched.
pub fn downsize(image: RgbImage, max_side: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    let longest = w.max(h);
    if longest <= max_side {
        return image;
    }

    let scale = max_side as f64 / longest as f64;
    let new_w = ((w as f64 * scale) as u32).max(1);
    let new_h = ((h as f64 * scale) as u32).max(1);
    imageops::thumbnail(&image, new_w, new_h)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_filter_is_case_insensitive() {
        assert!(has_image_extension(Path::new("a/b/IMG_001.JPG")));
        assert!(has_image_extension(Path::new("scan.webp")));
        assert!(!has_image_extension(Path::new("notes.txt")));
        assert!(!has_image_extension(Path::new("no_extension")));
    }

    #[test]
    fn downsize_caps_longer_side_and_keeps_aspect() {
        let img = RgbImage::new(2800, 1400);
        let out = downsize(img, 1400);
        assert_eq!(out.dimensions(), (1400, 700));
    }

    #[test]
    fn downsize_leaves_small_images_alone() {
        let img = RgbImage::new(800, 600);
        let out = downsize(img, 1400);
        assert_eq!(out.dimensions(), (800, 600));
    }
}
