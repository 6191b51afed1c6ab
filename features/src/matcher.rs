//! Brute-force Hamming matching with ambiguity rejection.

use pano_core::{FeatureMatch, Matches};

use crate::descriptor::Descriptors;

/// Nearest-neighbor descriptor matcher.
///
/// A correspondence is kept only when the best match is meaningfully closer
/// than the second best (Lowe ratio test), which discards ambiguous matches
/// before the expensive geometric verification. Zero surviving matches is a
/// valid "images do not overlap" signal, not an error.
pub struct Matcher {
    ratio_threshold: f32,
    cross_check: bool,
}

impl Default for Matcher {
    fn default() -> Self {
        Self {
            ratio_threshold: 0.75,
            cross_check: true,
        }
    }
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ratio_threshold(mut self, ratio: f32) -> Self {
        self.ratio_threshold = ratio;
        self
    }

    pub fn with_cross_check(mut self, enabled: bool) -> Self {
        self.cross_check = enabled;
        self
    }

    pub fn match_descriptors(&self, query: &Descriptors, train: &Descriptors) -> Matches {
        let mut matches = Matches::with_capacity(query.len().min(train.len()));
        if query.is_empty() || train.is_empty() {
            return matches;
        }

        for (query_idx, q) in query.iter().enumerate() {
            let Some((train_idx, best, second)) = two_nearest(q, train) else {
                continue;
            };

            if let Some(second) = second {
                // second == 0 means duplicate descriptors; always ambiguous.
                if second == 0 || best as f32 > self.ratio_threshold * second as f32 {
                    continue;
                }
            }

            if self.cross_check {
                let reverse = two_nearest(&train.descriptors[train_idx], query).map(|(i, _, _)| i);
                if reverse != Some(query_idx) {
                    continue;
                }
            }

            matches.push(FeatureMatch::new(
                query_idx as u32,
                train_idx as u32,
                best as f32,
            ));
        }

        matches
    }
}

/// Index and distance of the nearest descriptor, plus the second-best
/// distance when more than one candidate exists.
fn two_nearest(
    q: &crate::descriptor::Descriptor,
    train: &Descriptors,
) -> Option<(usize, u32, Option<u32>)> {
    let mut best: Option<(usize, u32)> = None;
    let mut second: Option<u32> = None;

    for (idx, t) in train.iter().enumerate() {
        let d = q.hamming_distance(t);
        match best {
            None => best = Some((idx, d)),
            Some((_, bd)) if d < bd => {
                second = Some(bd);
                best = Some((idx, d));
            }
            Some(_) => {
                if second.map_or(true, |s| d < s) {
                    second = Some(d);
                }
            }
        }
    }

    best.map(|(idx, d)| (idx, d, second))
}
