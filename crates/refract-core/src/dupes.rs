//! Duplicate-code detection over indexed method bodies.
//!
//! Bodies are normalized (whitespace runs collapsed to one space, lowercased)
//! so that formatting and identifier-case differences do not hide a
//! duplicate; the normalized text is used only for comparison, never for
//! output. Similarity is an edit-distance percentage for short bodies and
//! 5-gram Jaccard for long ones, trading matching precision for
//! better-than-quadratic time on big methods.
//!
//! Clustering is greedy and single-pass: each unclustered body seeds a
//! cluster, and later bodies join the first seed they score against. Members
//! are similar to their seed, not necessarily pairwise similar to each other;
//! that approximation is accepted.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineError;
use crate::index::WorkspaceIndex;
use crate::structure::MemberKind;
use crate::types::LineSpan;

/// Bodies at or under this normalized length are compared by edit distance;
/// longer ones fall back to n-gram Jaccard.
const EDIT_DISTANCE_CEILING: usize = 500;

/// N-gram width for the Jaccard fallback.
const NGRAM_WIDTH: usize = 5;

// ============================================================================
// Similarity Primitives
// ============================================================================

/// Levenshtein distance between two strings (chars, two-row DP).
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0usize; b_chars.len() + 1];

    for (i, &ca) in a_chars.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Collapse whitespace runs to single spaces and lowercase everything.
///
/// Comparison-only form; the written output never uses it.
pub fn normalize_body(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_space && !out.is_empty() {
                out.push(' ');
            }
            in_space = true;
        } else {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            in_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

fn ngram_set(s: &str, width: usize) -> HashSet<&[u8]> {
    let bytes = s.as_bytes();
    if bytes.len() < width {
        let mut set = HashSet::new();
        if !bytes.is_empty() {
            set.insert(bytes);
        }
        return set;
    }
    bytes.windows(width).collect()
}

/// Similarity of two normalized strings as a percentage in `[0, 100]`.
///
/// Reflexive (`similarity(a, a) == 100`) and symmetric.
pub fn similarity_percent(a: &str, b: &str) -> f64 {
    if a == b {
        return 100.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let max_len = a.len().max(b.len());
    if max_len <= EDIT_DISTANCE_CEILING {
        let distance = levenshtein(a, b);
        let longest_chars = a.chars().count().max(b.chars().count());
        (1.0 - distance as f64 / longest_chars as f64) * 100.0
    } else {
        let set_a = ngram_set(a, NGRAM_WIDTH);
        let set_b = ngram_set(b, NGRAM_WIDTH);
        let intersection = set_a.intersection(&set_b).count();
        let union = set_a.union(&set_b).count();
        if union == 0 {
            0.0
        } else {
            intersection as f64 / union as f64 * 100.0
        }
    }
}

// ============================================================================
// Duplicate Clusters
// ============================================================================

/// One method body participating in a duplicate cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateMember {
    pub file: String,
    pub type_name: String,
    pub member: String,
    pub span: LineSpan,
    /// Body line count used for the savings estimate.
    pub lines: u32,
}

/// A cluster of near-identical method bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCluster {
    /// Seed first, then joiners in discovery order.
    pub members: Vec<DuplicateMember>,
    /// Mean similarity of joiners against the seed.
    pub similarity: f64,
    /// Lines that could go away: every occurrence after the first.
    pub estimated_savings_lines: u32,
}

/// Find clusters of near-duplicate method bodies.
///
/// `min_similarity` is a percentage in `(0, 100]`; clusters are ranked by
/// member count, then similarity, and truncated to `max_results`.
pub fn find_duplicates(
    index: &WorkspaceIndex,
    min_lines: u32,
    min_similarity: f64,
    max_results: usize,
) -> Result<Vec<DuplicateCluster>, EngineError> {
    if min_lines == 0 {
        return Err(EngineError::validation("min_lines must be at least 1"));
    }
    if !(0.0..=100.0).contains(&min_similarity) || min_similarity == 0.0 {
        return Err(EngineError::validation(
            "min_similarity must be in (0, 100]",
        ));
    }
    if max_results == 0 {
        return Err(EngineError::validation("max_results must be at least 1"));
    }

    // Candidate bodies, in deterministic index order.
    struct Candidate {
        member: DuplicateMember,
        normalized: String,
    }
    let mut candidates: Vec<Candidate> = Vec::new();
    for file in index.files() {
        let display = file.display_path(index.merged);
        for ty in &file.types {
            for m in &ty.members {
                if m.kind != MemberKind::Method && m.kind != MemberKind::Constructor {
                    continue;
                }
                let body_lines = m.body_line_count() as u32;
                if body_lines < min_lines {
                    continue;
                }
                candidates.push(Candidate {
                    member: DuplicateMember {
                        file: display.clone(),
                        type_name: ty.name.clone(),
                        member: m.name.clone(),
                        span: m.span,
                        lines: body_lines,
                    },
                    normalized: normalize_body(&m.body),
                });
            }
        }
    }
    debug!(candidates = candidates.len(), min_lines, "comparing method bodies");

    let mut clustered = vec![false; candidates.len()];
    let mut clusters: Vec<DuplicateCluster> = Vec::new();

    for i in 0..candidates.len() {
        if clustered[i] {
            continue;
        }
        clustered[i] = true;
        let mut members = vec![candidates[i].member.clone()];
        let mut score_sum = 0.0;

        for j in (i + 1)..candidates.len() {
            if clustered[j] {
                continue;
            }
            let score = similarity_percent(&candidates[i].normalized, &candidates[j].normalized);
            if score >= min_similarity {
                clustered[j] = true;
                members.push(candidates[j].member.clone());
                score_sum += score;
            }
        }

        if members.len() > 1 {
            let joiners = members.len() as f64 - 1.0;
            let estimated_savings_lines = members.iter().skip(1).map(|m| m.lines).sum();
            clusters.push(DuplicateCluster {
                members,
                similarity: score_sum / joiners,
                estimated_savings_lines,
            });
        }
    }

    clusters.sort_by(|a, b| {
        b.members
            .len()
            .cmp(&a.members.len())
            .then_with(|| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal))
    });
    clusters.truncate(max_results);
    Ok(clusters)
}

// ============================================================================
// Tests
// ============================================================================
