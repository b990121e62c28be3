//! Tie-breaking between templates that match the same concrete path.
//!
//! Order, most significant first:
//! 1. more literal segments wins
//! 2. fewer `**` segments wins
//! 3. earlier declaration wins
use std::cmp::Ordering;

use super::template::{Segment, Template};

/// Ranking key computed once per compiled template. A greater value is more specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Specificity {
    /// Non-empty literal segments, including those inside variable sub-patterns.
    pub literal_segments: usize,
    pub multi_wildcards: usize,
}

impl Specificity {
    pub fn of(template: &Template) -> Self {
        let mut specificity = Self::default();
        for segment in template.segments() {
            specificity.count(segment);
        }
        specificity
    }

    fn count(&mut self, segment: &Segment) {
        match segment {
            Segment::Literal(text) if !text.is_empty() => self.literal_segments += 1,
            Segment::Literal(_) | Segment::SingleWildcard => {}
            Segment::MultiWildcard => self.multi_wildcards += 1,
            Segment::Variable(variable) => {
                for sub in &variable.sub_segments {
                    self.count(sub);
                }
            }
        }
    }
}

impl Ord for Specificity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.literal_segments
            .cmp(&other.literal_segments)
            .then_with(|| other.multi_wildcards.cmp(&self.multi_wildcards))
    }
}

impl PartialOrd for Specificity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pick the most specific candidate. Candidates must be supplied in
/// declaration order; among equally specific ones the first is kept.
pub fn select_most_specific<T>(
    candidates: impl IntoIterator<Item = (Specificity, T)>,
) -> Option<T> {
    let mut best: Option<(Specificity, T)> = None;
    for (specificity, candidate) in candidates {
        match &best {
            Some((current, _)) if specificity <= *current => {}
            _ => best = Some((specificity, candidate)),
        }
    }
    best.map(|(_, candidate)| candidate)
}
