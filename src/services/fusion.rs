//! Weighted min-max fusion of lexical and similarity scores.
//!
//! Each source's raw scores are rescaled to `[0, 1]` over the candidate
//! union, then combined as `wL * lexical + wS * semantic`. A candidate
//! missing from one source gets 0 for that source.
//!
//! ```text
//! lexical:  A=2.0  B=1.0
//! semantic:        B=0.9  C=0.3
//!
//! normalized lexical:  A=1.0  B=0.0
//! normalized semantic:        B=1.0  C=0.0
//!
//! fused (0.5 / 0.5):   A=0.5  B=0.5  C=0.0
//! ```

use crate::models::ItemRef;
use std::collections::BTreeMap;

/// Weights of the two sources in hybrid mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    /// Weight of the normalized lexical score.
    pub lexical: f32,
    /// Weight of the normalized semantic score.
    pub semantic: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            lexical: 0.5,
            semantic: 0.5,
        }
    }
}

/// A candidate with its fused and raw scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedScore {
    /// Candidate identity.
    pub item: ItemRef,
    /// Fused score.
    pub score: f32,
    /// Raw lexical score, if the lexical index returned the candidate.
    pub lexical: Option<f32>,
    /// Raw similarity score, if the vector index returned the candidate.
    pub semantic: Option<f32>,
}

/// Rescales scores to `[0, 1]`.
///
/// When every score is equal (including a single score) each maps to 1.0.
#[must_use]
pub fn min_max_normalize(scores: &[(ItemRef, f32)]) -> BTreeMap<ItemRef, f32> {
    let (min, max) = scores
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), (_, s)| {
            (min.min(*s), max.max(*s))
        });
    let range = max - min;
    scores
        .iter()
        .map(|(item, s)| {
            let normalized = if range > f32::EPSILON {
                (s - min) / range
            } else {
                1.0
            };
            (*item, normalized)
        })
        .collect()
}

/// Fuses both result lists over their union.
///
/// Output order is by identity; callers rank it.
#[must_use]
pub fn fuse(
    lexical: &[(ItemRef, f32)],
    semantic: &[(ItemRef, f32)],
    weights: FusionWeights,
) -> Vec<FusedScore> {
    let lexical_norm = min_max_normalize(lexical);
    let semantic_norm = min_max_normalize(semantic);

    let mut fused: BTreeMap<ItemRef, FusedScore> = BTreeMap::new();
    for (item, raw) in lexical {
        fused.entry(*item).or_insert_with(|| empty(*item)).lexical = Some(*raw);
    }
    for (item, raw) in semantic {
        fused.entry(*item).or_insert_with(|| empty(*item)).semantic = Some(*raw);
    }

    fused
        .into_values()
        .map(|mut candidate| {
            let l = lexical_norm.get(&candidate.item).copied().unwrap_or(0.0);
            let s = semantic_norm.get(&candidate.item).copied().unwrap_or(0.0);
            candidate.score = weights.lexical.mul_add(l, weights.semantic * s);
            candidate
        })
        .collect()
}

/// Wraps a single source's results without rescaling.
#[must_use]
pub fn single_source(scores: &[(ItemRef, f32)], lexical: bool) -> Vec<FusedScore> {
    scores
        .iter()
        .map(|(item, raw)| FusedScore {
            item: *item,
            score: *raw,
            lexical: lexical.then_some(*raw),
            semantic: (!lexical).then_some(*raw),
        })
        .collect()
}

const fn empty(item: ItemRef) -> FusedScore {
    FusedScore {
        item,
        score: 0.0,
        lexical: None,
        semantic: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemType;
    use proptest::prelude::*;

    fn r(id: i64) -> ItemRef {
        ItemRef::new(ItemType::Decision, id)
    }

    #[test]
    fn test_fuse_matches_worked_example() {
        let fused = fuse(
            &[(r(1), 2.0), (r(2), 1.0)],
            &[(r(2), 0.9), (r(3), 0.3)],
            FusionWeights::default(),
        );
        let scores: Vec<_> = fused.iter().map(|f| (f.item.item_id, f.score)).collect();
        assert_eq!(scores, vec![(1, 0.5), (2, 0.5), (3, 0.0)]);
        assert_eq!(fused[1].lexical, Some(1.0));
        assert_eq!(fused[1].semantic, Some(0.9));
        assert_eq!(fused[2].lexical, None);
    }

    #[test]
    fn test_single_score_normalizes_to_one() {
        let normalized = min_max_normalize(&[(r(1), 0.2)]);
        assert_eq!(normalized.get(&r(1)), Some(&1.0));
        assert!(min_max_normalize(&[]).is_empty());
    }

    #[test]
    fn test_weights_shift_ranking() {
        let lexical = [(r(1), 1.0), (r(2), 0.0)];
        let semantic = [(r(1), 0.0), (r(2), 1.0)];
        let fused = fuse(
            &lexical,
            &semantic,
            FusionWeights {
                lexical: 0.8,
                semantic: 0.2,
            },
        );
        assert!(fused[0].score > fused[1].score);
    }

    proptest! {
        #[test]
        fn prop_fused_scores_bounded(
            lexical in proptest::collection::vec((0i64..50, 0.0f32..10.0), 0..20),
            semantic in proptest::collection::vec((0i64..50, 0.0f32..1.0), 0..20),
        ) {
            let lexical: Vec<_> = lexical.into_iter().map(|(id, s)| (r(id), s)).collect();
            let semantic: Vec<_> = semantic.into_iter().map(|(id, s)| (r(id), s)).collect();
            for f in fuse(&lexical, &semantic, FusionWeights::default()) {
                prop_assert!((0.0..=1.0 + 1e-6).contains(&f.score));
                prop_assert!(f.lexical.is_some() || f.semantic.is_some());
            }
        }
    }
}
