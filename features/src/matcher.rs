use photomesh_core::{Descriptors, FeatureMatch, Matches};
use rayon::prelude::*;

/// Brute-force 2-nearest-neighbor Hamming matching with Lowe's ratio test.
///
/// For every query descriptor the two closest train descriptors are found;
/// the best is kept only when its distance is strictly below `ratio` times
/// the second-best distance. Ambiguous correspondences (near-equal first and
/// second neighbors) are rejected wholesale.
pub fn ratio_match(query: &Descriptors, train: &Descriptors, ratio: f32) -> Matches {
    if train.len() < 2 {
        return Matches::default();
    }

    let matches: Vec<FeatureMatch> = query
        .descriptors
        .par_iter()
        .enumerate()
        .filter_map(|(query_idx, q_desc)| {
            let mut best: Option<(usize, u32)> = None;
            let mut second: Option<u32> = None;

            for (train_idx, t_desc) in train.iter().enumerate() {
                let distance = q_desc.hamming_distance(t_desc);
                match best {
                    None => best = Some((train_idx, distance)),
                    Some((_, best_dist)) if distance < best_dist => {
                        second = Some(best_dist);
                        best = Some((train_idx, distance));
                    }
                    _ => {
                        if second.map_or(true, |s| distance < s) {
                            second = Some(distance);
                        }
                    }
                }
            }

            let (train_idx, distance) = best?;
            let second = second?;
            if (distance as f32) < ratio * second as f32 {
                Some(FeatureMatch::new(query_idx, train_idx, distance))
            } else {
                None
            }
        })
        .collect();

    Matches { matches }
}
