/// Random draws shared by the rule engine.
///
/// The urn comparison asks: both sides draw a ball, and we only look at the
/// rounds where exactly one of them drew green. `sample_comparison` returns
/// the player's ball for such a round.
use rand::Rng;
use tracing::warn;

use crate::config::ComparisonSampler;
use crate::constants::{EXACT_PERMUTATION_MAX_WINDOW, MAX_REJECTION_ATTEMPTS};

/// Draw 1 if the player wins a comparison between success probabilities
/// `p` (player) and `q` (item), conditioned on the two draws differing.
pub fn sample_comparison<R: Rng>(sampler: ComparisonSampler, p: f64, q: f64, rng: &mut R) -> u8 {
    match sampler {
        ComparisonSampler::Exact => sample_conditional(p, q, rng),
        ComparisonSampler::Rejection => reject_until_differ(rng, tie_break(p), |rng| {
            (rng.random_bool(p) as u8, rng.random_bool(q) as u8)
        }),
    }
}

/// `P(player = 1 | draws differ) = p(1-q) / (p(1-q) + q(1-p))`.
fn sample_conditional<R: Rng>(p: f64, q: f64, rng: &mut R) -> u8 {
    let win = p * (1.0 - q);
    let loss = q * (1.0 - p);
    let total = win + loss;
    if total <= 0.0 {
        warn!(p, q, "comparison undefined, draws can never differ; using tie-break");
        return tie_break(p);
    }
    rng.random_bool((win / total).clamp(0.0, 1.0)) as u8
}

/// Repeat `draw_pair` until the player's and item's draws differ and return
/// the player's. Gives up with `fallback` after `MAX_REJECTION_ATTEMPTS`.
pub fn reject_until_differ<R: Rng>(
    rng: &mut R,
    fallback: u8,
    mut draw_pair: impl FnMut(&mut R) -> (u8, u8),
) -> u8 {
    for _ in 0..MAX_REJECTION_ATTEMPTS {
        let (player, item) = draw_pair(&mut *rng);
        if player != item {
            return player;
        }
    }
    warn!(attempts = MAX_REJECTION_ATTEMPTS, fallback, "rejection sampler exhausted; using tie-break");
    fallback
}

/// Result used when the two draws cannot (or did not) differ: the player's
/// probability rounded to the nearer of 0 and 1. For the degenerate cases
/// `p == q == 0` and `p == q == 1` this is exactly what both urns would draw.
pub fn tie_break(p: f64) -> u8 {
    (p >= 0.5) as u8
}

/// Sign-flip combinations for the exact permutation test.
///
/// Row `r` flips the sign of window position `k` when bit `k` of `r` is set.
/// Empty for windows long enough to need Monte Carlo sampling.
#[derive(Debug, Clone)]
pub struct SignFlipTable {
    window: usize,
    rows: Vec<Vec<i8>>,
}

impl SignFlipTable {
    pub fn new(window: usize) -> Self {
        let rows = if window < EXACT_PERMUTATION_MAX_WINDOW {
            (0..1usize << window)
                .map(|mask| {
                    (0..window)
                        .map(|k| if mask & (1 << k) != 0 { -1 } else { 1 })
                        .collect()
                })
                .collect()
        } else {
            Vec::new()
        };
        SignFlipTable { window, rows }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Whether the p-value is computed by full enumeration.
    pub fn is_exact(&self) -> bool {
        !self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Two-sided p-value of the observed delta mean: the share of sign-flip
    /// vectors `s` with `|sum(s * d)| >= |sum(d)|`. When enumerating, the
    /// identity flip is always counted, so the exact p-value is never 0.
    pub fn p_value(&self, deltas: &[i8], n_permutations: usize, rng: &mut impl Rng) -> f64 {
        let observed = deltas.iter().map(|&d| d as i64).sum::<i64>().abs();

        if self.is_exact() && deltas.len() == self.window {
            let extreme = self
                .rows
                .iter()
                .filter(|signs| flipped_sum(signs, deltas).abs() >= observed)
                .count();
            return extreme as f64 / self.rows.len() as f64;
        }

        let n = n_permutations.max(1);
        let mut signs = vec![1i8; deltas.len()];
        let mut extreme = 0usize;
        for _ in 0..n {
            for s in signs.iter_mut() {
                *s = if rng.random_bool(0.5) { -1 } else { 1 };
            }
            if flipped_sum(&signs, deltas).abs() >= observed {
                extreme += 1;
            }
        }
        extreme as f64 / n as f64
    }
}

fn flipped_sum(signs: &[i8], deltas: &[i8]) -> i64 {
    signs
        .iter()
        .zip(deltas)
        .map(|(&s, &d)| s as i64 * d as i64)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn win_rate(sampler: ComparisonSampler, p: f64, q: f64, n: usize, seed: u64) -> f64 {
        let mut rng = SmallRng::seed_from_u64(seed);
        let wins: usize = (0..n).map(|_| sample_comparison(sampler, p, q, &mut rng) as usize).sum();
        wins as f64 / n as f64
    }

    #[test]
    fn test_exact_matches_conditional_probability() {
        let (p, q) = (0.7, 0.4);
        let expected = p * (1.0 - q) / (p * (1.0 - q) + q * (1.0 - p));
        let rate = win_rate(ComparisonSampler::Exact, p, q, 40_000, 1);
        assert!((rate - expected).abs() < 0.015, "rate {rate} vs {expected}");
    }

    #[test]
    fn test_rejection_agrees_with_exact() {
        let (p, q) = (0.3, 0.6);
        let exact = win_rate(ComparisonSampler::Exact, p, q, 40_000, 2);
        let rejection = win_rate(ComparisonSampler::Rejection, p, q, 40_000, 3);
        assert!((exact - rejection).abs() < 0.02);
    }

    #[test]
    fn test_equal_probabilities_are_a_fair_coin() {
        let rate = win_rate(ComparisonSampler::Exact, 0.5, 0.5, 40_000, 4);
        assert!((rate - 0.5).abs() < 0.015);
    }

    #[test]
    fn test_degenerate_comparisons_use_tie_break() {
        let mut rng = SmallRng::seed_from_u64(5);
        for sampler in [ComparisonSampler::Exact, ComparisonSampler::Rejection] {
            assert_eq!(sample_comparison(sampler, 1.0, 1.0, &mut rng), 1);
            assert_eq!(sample_comparison(sampler, 0.0, 0.0, &mut rng), 0);
        }
    }

    #[test]
    fn test_certain_outcomes() {
        let mut rng = SmallRng::seed_from_u64(6);
        for _ in 0..100 {
            assert_eq!(sample_comparison(ComparisonSampler::Exact, 1.0, 0.3, &mut rng), 1);
            assert_eq!(sample_comparison(ComparisonSampler::Exact, 0.0, 0.3, &mut rng), 0);
            assert_eq!(sample_comparison(ComparisonSampler::Rejection, 0.4, 1.0, &mut rng), 0);
        }
    }

    #[test]
    fn test_sign_flip_table_enumerates_all_rows() {
        let table = SignFlipTable::new(4);
        assert!(table.is_exact());
        assert_eq!(table.len(), 16);
        assert!(SignFlipTable::new(EXACT_PERMUTATION_MAX_WINDOW).is_empty());
    }

    #[test]
    fn test_exact_p_values() {
        let table = SignFlipTable::new(4);
        let mut rng = SmallRng::seed_from_u64(7);
        // Only the identity and the full flip reach |sum| = 4.
        assert_eq!(table.p_value(&[1, 1, 1, 1], 100, &mut rng), 2.0 / 16.0);
        // No movement: every flip ties the observed zero.
        assert_eq!(table.p_value(&[0, 0, 0, 0], 100, &mut rng), 1.0);
        // Sum 2 out of {1,1,0,0}: all four sign patterns of the two ones, only two reach 2.
        assert_eq!(table.p_value(&[1, 1, 0, 0], 100, &mut rng), 0.5);
    }

    #[test]
    fn test_monte_carlo_p_value_detects_streak() {
        let table = SignFlipTable::new(20);
        let mut rng = SmallRng::seed_from_u64(8);
        let streak = [1i8; 20];
        assert!(table.p_value(&streak, 2000, &mut rng) < 0.01);
        let flat = [0i8; 20];
        assert_eq!(table.p_value(&flat, 2000, &mut rng), 1.0);
    }
}
