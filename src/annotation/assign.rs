//! Minimum-cost assignment of candidate blocks to target blocks
//!
//! Candidates (property or unit blocks) are matched to targets (the data
//! block and qualifier blocks) by solving the assignment problem over a cost
//! matrix of geometric distances. The solver is the O(n^2 m) potentials form
//! of the Hungarian algorithm.
//!
//! Ties are broken deterministically: rows are processed in document order
//! and, among columns with equal reduced cost, the lowest column index wins.

use tracing::debug;

use super::block::{Alignment, Block, Rect};
use crate::config::GenerationConfig;

/// Cost of pairing `candidate` with `target`
///
/// Aligned pairs cost their gap distance. Misaligned pairs cost a large
/// offset plus the gap scaled by the misalignment factor, so any aligned
/// candidate beats every misaligned one.
pub fn alignment_cost(candidate: &Rect, target: &Rect, config: &GenerationConfig) -> f64 {
    let gap = candidate.gap_distance(target);
    match candidate.alignment(target) {
        Alignment::Row | Alignment::Column => gap,
        Alignment::Misaligned => config.misalignment_offset + config.misalignment_factor * gap,
    }
}

/// Solve a rectangular assignment problem with `rows <= columns`
///
/// Returns, for every row, the column assigned to it.
pub fn hungarian(cost: &[Vec<f64>]) -> Vec<usize> {
    let n = cost.len();
    if n == 0 {
        return Vec::new();
    }
    let m = cost[0].len();
    debug_assert!(n <= m, "hungarian requires rows <= columns");

    // 1-indexed potentials; column 0 is the virtual start
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; m + 1];
    let mut owner = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        owner[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];
        loop {
            used[j0] = true;
            let i0 = owner[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;
            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let cur = cost[i0 - 1][j - 1] - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }
            for j in 0..=m {
                if used[j] {
                    u[owner[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if owner[j0] == 0 {
                break;
            }
        }
        loop {
            let j1 = way[j0];
            owner[j0] = owner[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assigned = vec![0usize; n];
    for j in 1..=m {
        if owner[j] != 0 {
            assigned[owner[j] - 1] = j - 1;
        }
    }
    assigned
}

/// Outcome of one assignment round
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    /// `(candidate index, target index)` pairs in candidate order
    pub pairs: Vec<(usize, usize)>,
    /// Candidates left without a target
    pub unmatched: Vec<usize>,
    /// Human-readable ambiguity notes
    pub notes: Vec<String>,
}

/// Match `candidates` to `targets` at minimum total cost
///
/// With more candidates than targets the matrix is padded with sentinel
/// columns; candidates landing there stay unmatched and a note is recorded.
pub fn assign(
    label: &str,
    candidates: &[&Block],
    targets: &[&Block],
    config: &GenerationConfig,
) -> Assignment {
    let mut result = Assignment::default();
    if candidates.is_empty() || targets.is_empty() {
        return result;
    }

    let columns = targets.len().max(candidates.len());
    let matrix: Vec<Vec<f64>> = candidates
        .iter()
        .map(|c| {
            (0..columns)
                .map(|j| match targets.get(j) {
                    Some(t) => alignment_cost(&c.rect, &t.rect, config),
                    None => config.padding_cost,
                })
                .collect()
        })
        .collect();
    debug!(
        role = label,
        candidates = candidates.len(),
        targets = targets.len(),
        "solving assignment"
    );

    for (i, j) in hungarian(&matrix).into_iter().enumerate() {
        if j < targets.len() {
            result.pairs.push((i, j));
        } else {
            result.unmatched.push(i);
        }
    }

    if !result.unmatched.is_empty() {
        let dropped: Vec<String> = result
            .unmatched
            .iter()
            .map(|&i| format!("{} ({})", candidates[i].id, candidates[i].rect.label()))
            .collect();
        let note = format!(
            "{} {} blocks for {} targets; left unassigned: {}",
            candidates.len(),
            label,
            targets.len(),
            dropped.join(", ")
        );
        debug!(%note, "assignment ambiguity");
        result.notes.push(note);
    }
    result
}
