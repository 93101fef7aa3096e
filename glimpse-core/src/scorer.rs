//! Fuzzy subsequence scorer shared by every filterable list
//! (pinned sidebar, file search, theme switcher, zoxide jump).
//!
//! `score` is pure: no allocation beyond the lowercased copies for short
//! queries, no shared state, safe to call from any number of tasks.

use std::cmp::Ordering;

use smallvec::SmallVec;

const FIRST_POS_WEIGHT: f64 = 0.25;
const SPREAD_WEIGHT: f64 = 0.35;
const CONSECUTIVE_WEIGHT: f64 = 0.25;
const DENSITY_WEIGHT: f64 = 0.15;

/// Score how well `query` matches `target`, in `[0.0, 1.0]`.
///
/// An empty query matches everything with `1.0`. A query whose characters do
/// not all appear, in order, in `target` scores `0.0`. Comparison is
/// case-insensitive and lengths count Unicode scalar values.
#[must_use]
#[expect(clippy::cast_precision_loss, reason = "Lengths are far below 2^52")]
pub fn score(query: &str, target: &str) -> f64 {
    if query.is_empty() {
        return 1.0;
    }
    if target.is_empty() {
        return 0.0;
    }

    let query: SmallVec<[char; 32]> = query.chars().flat_map(char::to_lowercase).collect();
    let target: SmallVec<[char; 128]> = target.chars().flat_map(char::to_lowercase).collect();

    if query.as_slice() == target.as_slice() {
        return 1.0;
    }

    let Some(positions) = match_positions(&query, &target) else {
        return 0.0;
    };

    let target_len = target.len() as f64;
    let query_len = query.len();
    let first = positions[0];
    let last = positions[positions.len() - 1];

    let first_pos_score = 1.0 - first as f64 / target_len;

    let spread_score = if positions.len() == 1 {
        1.0
    } else {
        let span = last - first + 1;
        let max_span = (target.len() - first) as f64;
        if span == query_len {
            1.0
        } else {
            1.0 - (span as f64 - query_len as f64) / max_span
        }
    };

    let consecutive_score = if positions.len() > 1 {
        let runs = positions.windows(2).filter(|w| w[1] - w[0] == 1).count();
        runs as f64 / (positions.len() - 1) as f64
    } else {
        0.0
    };

    let density_score = query_len as f64 / target_len;

    let total = first_pos_score * FIRST_POS_WEIGHT
        + spread_score * SPREAD_WEIGHT
        + consecutive_score * CONSECUTIVE_WEIGHT
        + density_score * DENSITY_WEIGHT;

    total.clamp(0.0, 1.0)
}

/// Greedy left-to-right subsequence walk. `None` if any query char is missing.
fn match_positions(query: &[char], target: &[char]) -> Option<SmallVec<[usize; 32]>> {
    let mut positions = SmallVec::with_capacity(query.len());
    let mut cursor = 0;

    for &qc in query {
        let offset = target[cursor..].iter().position(|&tc| tc == qc)?;
        positions.push(cursor + offset);
        cursor += offset + 1;
    }

    Some(positions)
}

/// A candidate that survived filtering, with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<T> {
    pub item: T,
    pub score: f64,
}

/// Score every candidate, drop non-matches, best first.
///
/// Ties keep their input order so an unfiltered list stays as the caller
/// sorted it.
pub fn rank<T, I, F>(query: &str, candidates: I, display: F) -> Vec<Ranked<T>>
where
    I: IntoIterator<Item = T>,
    F: Fn(&T) -> &str,
{
    let mut ranked: Vec<Ranked<T>> = candidates
        .into_iter()
        .filter_map(|item| {
            let s = score(query, display(&item));
            (s > 0.0).then_some(Ranked { item, score: s })
        })
        .collect();

    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    ranked
}
