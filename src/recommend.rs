use std::fmt;

use serde::Serialize;

use crate::models::Recommendation;

const MAX_SCORE: u32 = 100;

/// Picks the recommendation for `score`.
///
/// The first entry whose range contains the score wins, so overlapping
/// ranges resolve by list order. When nothing matches, the last entry is
/// returned; an empty list yields [`Recommendation::fallback`].
pub fn match_recommendation(recommendations: &[Recommendation], score: u32) -> Recommendation {
    recommendations
        .iter()
        .find(|r| r.score_range.contains(score))
        .or_else(|| recommendations.last())
        .cloned()
        .unwrap_or_else(Recommendation::fallback)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RangeWarning {
    NoRecommendations,
    Inverted { id: String, min: u32, max: u32 },
    OutOfBounds { id: String, max: u32 },
    Gap { from: u32, to: u32 },
    Overlap { first: String, second: String },
}

impl fmt::Display for RangeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeWarning::NoRecommendations => {
                write!(f, "no recommendations; every score gets the default feedback")
            }
            RangeWarning::Inverted { id, min, max } => {
                write!(f, "recommendation {} has min {} above max {}", id, min, max)
            }
            RangeWarning::OutOfBounds { id, max } => {
                write!(f, "recommendation {} ends at {}, beyond {}", id, max, MAX_SCORE)
            }
            RangeWarning::Gap { from, to } => {
                write!(f, "scores {}-{} match no range", from, to)
            }
            RangeWarning::Overlap { first, second } => {
                write!(f, "ranges of {} and {} overlap; {} wins", first, second, first)
            }
        }
    }
}

/// Checks that the ranges partition 0..=100. Problems are reported, never
/// rejected: matching stays deterministic through list order and the
/// last-entry fallback.
pub fn validate_ranges(recommendations: &[Recommendation]) -> Vec<RangeWarning> {
    if recommendations.is_empty() {
        return vec![RangeWarning::NoRecommendations];
    }

    let mut warnings = Vec::new();
    for rec in recommendations {
        let range = rec.score_range;
        if range.min > range.max {
            warnings.push(RangeWarning::Inverted {
                id: rec.id.clone(),
                min: range.min,
                max: range.max,
            });
        } else if range.max > MAX_SCORE {
            warnings.push(RangeWarning::OutOfBounds {
                id: rec.id.clone(),
                max: range.max,
            });
        }
    }

    let mut gap_start = None;
    for score in 0..=MAX_SCORE {
        let covered = recommendations
            .iter()
            .any(|r| r.score_range.contains(score));
        match (covered, gap_start) {
            (false, None) => gap_start = Some(score),
            (true, Some(from)) => {
                warnings.push(RangeWarning::Gap {
                    from,
                    to: score - 1,
                });
                gap_start = None;
            }
            _ => {}
        }
    }
    if let Some(from) = gap_start {
        warnings.push(RangeWarning::Gap { from, to: MAX_SCORE });
    }

    for (i, a) in recommendations.iter().enumerate() {
        for b in &recommendations[i + 1..] {
            let (ra, rb) = (a.score_range, b.score_range);
            if ra.min <= ra.max && rb.min <= rb.max && ra.min <= rb.max && rb.min <= ra.max {
                warnings.push(RangeWarning::Overlap {
                    first: a.id.clone(),
                    second: b.id.clone(),
                });
            }
        }
    }

    warnings
}
