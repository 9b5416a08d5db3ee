//! Keypoint detection and descriptor matching.
//!
//! Detection is multi-scale FAST with intensity-centroid orientation; the
//! descriptor is a 256-bit steered BRIEF. Matching is brute-force Hamming
//! with Lowe's ratio test.

pub mod fast;
pub mod matcher;
pub mod orb;

pub use fast::fast_detect;
pub use matcher::ratio_match;
pub use orb::{orb_detect_and_compute, Orb};
