use std::collections::HashSet;

use crate::{
    models::{Candidate, SourcePriority},
    normalize::match_key,
};

pub const DEFAULT_THRESHOLD: f64 = 0.85;

#[derive(Clone, Debug)]
pub struct Matcher {
    threshold: f64,
    priority: SourcePriority,
}

impl Matcher {
    pub fn new(threshold: f64, priority: SourcePriority) -> Self {
        Self { threshold, priority }
    }

    /// Picks the candidate for a local record: exact title matches first, then
    /// the best fuzzy match strictly above the threshold. Never guesses below it.
    pub fn select<'a>(
        &self,
        local_title: &str,
        local_year: Option<i32>,
        candidates: &'a [Candidate],
    ) -> Option<&'a Candidate> {
        let key = match_key(local_title);
        if key.is_empty() {
            return None;
        }

        let exact: Vec<(usize, &Candidate)> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.all_titles().any(|t| match_key(t) == key))
            .collect();

        if !exact.is_empty() {
            if let Some(year) = local_year {
                let same_year = exact
                    .iter()
                    .filter(|(_, c)| c.year == Some(year))
                    .min_by_key(|(i, c)| (self.priority.rank(c.source), *i));
                if let Some((_, c)) = same_year {
                    return Some(*c);
                }
            }
            return exact
                .into_iter()
                .min_by_key(|(i, c)| self.tie_break(c, *i, local_year))
                .map(|(_, c)| c);
        }

        let mut scored: Vec<(f64, (u8, i64, usize, usize), &Candidate)> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| (score(&key, c), self.tie_break(c, i, local_year), c))
            .filter(|(s, _, _)| *s > self.threshold)
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        scored.into_iter().next().map(|(_, _, c)| c)
    }

    // Lower sorts first: has a year, year distance, source rank, input order.
    fn tie_break(&self, c: &Candidate, index: usize, local_year: Option<i32>) -> (u8, i64, usize, usize) {
        let (missing, distance) = match (c.year, local_year) {
            (Some(cy), Some(ly)) => (0, (i64::from(cy) - i64::from(ly)).abs()),
            (Some(_), None) => (0, 0),
            (None, _) => (1, 0),
        };
        (missing, distance, self.priority.rank(c.source), index)
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, SourcePriority::default())
    }
}

/// Best similarity in `0.0..=1.0` between the key and any title of the candidate.
pub fn score(key: &str, candidate: &Candidate) -> f64 {
    candidate
        .all_titles()
        .map(match_key)
        .filter(|t| !t.is_empty())
        .map(|t| strsim::normalized_levenshtein(key, &t).max(token_overlap(key, &t)))
        .fold(0.0, f64::max)
}

fn token_overlap(a: &str, b: &str) -> f64 {
    let a: HashSet<&str> = a.split_whitespace().collect();
    let b: HashSet<&str> = b.split_whitespace().collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}
