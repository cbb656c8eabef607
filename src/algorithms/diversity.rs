use crate::algorithms::initializer::uniform;
use crate::models::ScoredCandidate;
use rand::Rng;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Quantile with linear interpolation between closest ranks.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

pub fn by_score_desc(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score.total_cmp(&a.score).then_with(|| a.item_id.cmp(&b.item_id))
}

#[derive(Debug, Clone, Copy)]
pub struct PopularityContainment {
    pub cap_quantile: f64,
    pub penalty_quantile: f64,
    pub penalty: f64,
}

impl PopularityContainment {
    /// Drops candidates at or above the cap quantile, then penalizes the ones
    /// still above the penalty quantile of the survivors.
    pub fn apply(&self, candidates: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
        let popularity: Vec<f64> = candidates.iter().map(|c| c.popularity).collect();
        let Some(cap) = quantile(&popularity, self.cap_quantile) else {
            return candidates;
        };

        let mut kept: Vec<ScoredCandidate> = candidates
            .into_iter()
            .filter(|c| c.popularity < cap)
            .collect();

        let survivors: Vec<f64> = kept.iter().map(|c| c.popularity).collect();
        if let Some(threshold) = quantile(&survivors, self.penalty_quantile) {
            for candidate in kept.iter_mut() {
                if candidate.popularity > threshold {
                    candidate.score *= self.penalty;
                }
            }
        }
        kept
    }
}

/// Adds independent uniform noise in `[0, amplitude)` to every score.
pub fn apply_jitter<R: Rng + ?Sized>(candidates: &mut [ScoredCandidate], amplitude: f64, rng: &mut R) {
    if amplitude <= 0.0 {
        return;
    }
    let noise = uniform(candidates.len(), 0.0, amplitude, rng);
    for (candidate, n) in candidates.iter_mut().zip(noise) {
        candidate.score += n;
    }
}

/// Category-balanced top-N selection.
///
/// Categories are visited from most to least frequent (ties keep first
/// appearance); each contributes at most `per_category` of its best-scored
/// candidates until `top_n` are collected. The collected set is then sorted by
/// score and truncated.
pub fn balance_categories(
    candidates: Vec<ScoredCandidate>,
    top_n: usize,
    per_category: usize,
) -> Vec<ScoredCandidate> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<ScoredCandidate>> = HashMap::new();
    for candidate in candidates {
        if !groups.contains_key(&candidate.category) {
            order.push(candidate.category.clone());
        }
        groups.entry(candidate.category.clone()).or_default().push(candidate);
    }

    // stable sort keeps first-appearance order among equally frequent categories
    order.sort_by_key(|category| std::cmp::Reverse(groups[category].len()));

    let mut selected = Vec::with_capacity(top_n);
    for category in order {
        if selected.len() >= top_n {
            break;
        }
        if let Some(mut group) = groups.remove(&category) {
            group.sort_by(by_score_desc);
            selected.extend(group.into_iter().take(per_category));
        }
    }

    selected.sort_by(by_score_desc);
    selected.truncate(top_n);
    selected
}
