//! Weighted-random selection, pure enough to test without a provider
//! catalog or RNG mocking.

use rand::Rng;

/// Pick one index from `weights` with `probability_i = weight_i / sum`.
/// Returns `None` for an empty slice or a non-positive total weight (the
/// caller should fall back to plain ordering in that case).
pub fn pick_weighted_index(weights: &[f64], rng: &mut impl Rng) -> Option<usize> {
    let total: f64 = weights.iter().sum();
    if weights.is_empty() || total <= 0.0 {
        return None;
    }
    let draw = rng.random_range(0.0..total);
    let mut cumulative = 0.0;
    for (i, w) in weights.iter().enumerate() {
        cumulative += w.max(0.0);
        if draw < cumulative {
            return Some(i);
        }
    }
    Some(weights.len() - 1)
}

/// Selection probability for each candidate, in the same order as `weights`.
#[must_use]
pub fn probabilities(weights: &[f64]) -> Vec<f64> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        let uniform = if weights.is_empty() { 0.0 } else { 1.0 / weights.len() as f64 };
        return weights.iter().map(|_| uniform).collect();
    }
    weights.iter().map(|w| w.max(0.0) / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn empty_weights_pick_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick_weighted_index(&[], &mut rng), None);
    }

    #[test]
    fn zero_total_weight_picks_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick_weighted_index(&[0.0, 0.0], &mut rng), None);
    }

    #[test]
    fn single_candidate_always_wins() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick_weighted_index(&[5.0], &mut rng), Some(0));
    }

    #[test]
    fn probabilities_sum_to_one() {
        let probs = probabilities(&[1.0, 1.0, 2.0]);
        let sum: f64 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!((probs[2] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn heavily_weighted_candidate_dominates_over_many_draws() {
        let mut rng = StdRng::seed_from_u64(42);
        let weights = [99.0, 1.0];
        let mut wins = [0usize; 2];
        for _ in 0..1000 {
            if let Some(i) = pick_weighted_index(&weights, &mut rng) {
                wins[i] += 1;
            }
        }
        assert!(wins[0] > wins[1]);
    }
}
