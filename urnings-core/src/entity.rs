/// A rated participant: a player or an item.
///
/// Both sides of a match hold an urn of `urn_size` balls, `score` of which are
/// green. The estimate is always derived from the urn, never stored, so the
/// `estimate == score / urn_size` invariant cannot drift.
use rand::Rng;

use crate::constants::{DEFAULT_SECOND_ORDER_URN_SIZE, DEFAULT_STAKE};
use crate::error::UrningsError;

/// Optional per-entity parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityParams {
    /// Capacity of the second-order (trend) urn.
    pub second_order_urn_size: u32,
    /// Initial step multiplier used by the staked update modes.
    pub stake: u32,
}

impl Default for EntityParams {
    fn default() -> Self {
        EntityParams {
            second_order_urn_size: DEFAULT_SECOND_ORDER_URN_SIZE,
            stake: DEFAULT_STAKE,
        }
    }
}

/// Append-only time series, one entry per match plus the initial value.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct History {
    pub scores: Vec<u32>,
    pub estimates: Vec<f64>,
    /// Bounded score change per match, in {-1, 0, 1}.
    pub deltas: Vec<i8>,
    pub urn_sizes: Vec<u32>,
    pub so_estimates: Vec<f64>,
    pub stakes: Vec<u32>,
}

impl History {
    /// Number of recorded points (matches played + 1).
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Entity {
    id: i64,
    score: u32,
    urn_size: u32,
    true_value: f64,
    stake: u32,
    so_score: u32,
    so_urn_size: u32,
    history: History,
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entity {}

impl Entity {
    /// Create an entity with default second-order urn size and stake.
    pub fn new(id: i64, score: u32, urn_size: u32, true_value: f64) -> Result<Self, UrningsError> {
        Self::with_params(id, score, urn_size, true_value, EntityParams::default())
    }

    pub fn with_params(
        id: i64,
        score: u32,
        urn_size: u32,
        true_value: f64,
        params: EntityParams,
    ) -> Result<Self, UrningsError> {
        if urn_size == 0 || params.second_order_urn_size == 0 {
            return Err(UrningsError::InvalidUrnSize { id });
        }
        if score > urn_size {
            return Err(UrningsError::ScoreExceedsUrn { id, score, urn_size });
        }
        if !(true_value > 0.0 && true_value < 1.0) {
            return Err(UrningsError::InvalidTrueValue { id, value: true_value });
        }
        if params.stake == 0 {
            return Err(UrningsError::InvalidStake { id });
        }

        let so_urn_size = params.second_order_urn_size;
        let so_score = (so_urn_size as f64 / 2.0).round_ties_even() as u32;

        let mut entity = Entity {
            id,
            score,
            urn_size,
            true_value,
            stake: params.stake,
            so_score,
            so_urn_size,
            history: History::default(),
        };
        entity.history.scores.push(score);
        entity.history.estimates.push(entity.estimate());
        entity.history.deltas.push(0);
        entity.history.urn_sizes.push(urn_size);
        entity.history.so_estimates.push(entity.so_estimate());
        entity.history.stakes.push(params.stake);
        Ok(entity)
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// Number of green balls.
    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn urn_size(&self) -> u32 {
        self.urn_size
    }

    pub fn estimate(&self) -> f64 {
        self.score as f64 / self.urn_size as f64
    }

    /// Latent ground-truth probability, only used to simulate outcomes.
    pub fn true_value(&self) -> f64 {
        self.true_value
    }

    pub fn stake(&self) -> u32 {
        self.stake
    }

    pub fn so_score(&self) -> u32 {
        self.so_score
    }

    pub fn so_urn_size(&self) -> u32 {
        self.so_urn_size
    }

    pub fn so_estimate(&self) -> f64 {
        self.so_score as f64 / self.so_urn_size as f64
    }

    /// Score mapped onto the common `0..=reference_urn_size` range.
    pub fn scaled_score(&self, reference_urn_size: u32) -> u32 {
        scale_score(self.score, self.urn_size, reference_urn_size)
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn matches_played(&self) -> usize {
        self.history.deltas.len().saturating_sub(1)
    }

    /// Bernoulli draw at the true value (`use_true_value`) or at the current estimate.
    pub fn sample_outcome(&self, use_true_value: bool, rng: &mut impl Rng) -> u8 {
        let p = if use_true_value { self.true_value } else { self.estimate() };
        rng.random_bool(p) as u8
    }

    /// Bernoulli draw at the second-order estimate.
    pub fn sample_second_order_outcome(&self, rng: &mut impl Rng) -> u8 {
        rng.random_bool(self.so_estimate()) as u8
    }

    pub(crate) fn set_score(&mut self, score: u32) {
        debug_assert!(score <= self.urn_size, "score {} above urn size {}", score, self.urn_size);
        self.score = score.min(self.urn_size);
    }

    /// Change the urn capacity, rescaling the score so the estimate is kept
    /// (exactly when the sizes divide, otherwise to the nearest ball).
    pub(crate) fn rescale_urn(&mut self, new_urn_size: u32) {
        debug_assert!(new_urn_size > 0);
        let scaled = self.score as f64 * new_urn_size as f64 / self.urn_size as f64;
        self.score = (scaled.round_ties_even() as u32).min(new_urn_size);
        self.urn_size = new_urn_size;
    }

    pub(crate) fn set_so_score(&mut self, so_score: u32) {
        self.so_score = so_score.min(self.so_urn_size);
    }

    pub(crate) fn set_stake(&mut self, stake: u32) {
        self.stake = stake.max(1);
    }

    /// Append this match's score, estimate and bounded delta.
    pub(crate) fn record_match(&mut self, delta: i8) {
        self.history.scores.push(self.score);
        self.history.estimates.push(self.estimate());
        self.history.deltas.push(delta);
    }

    pub(crate) fn record_second_order(&mut self) {
        self.history.so_estimates.push(self.so_estimate());
    }

    /// Append the urn size and stake that result from this match's adaptation step.
    pub(crate) fn record_adaptation(&mut self) {
        self.history.urn_sizes.push(self.urn_size);
        self.history.stakes.push(self.stake);
    }
}

/// `floor(score * reference / urn_size)` in integer arithmetic.
pub(crate) fn scale_score(score: u32, urn_size: u32, reference_urn_size: u32) -> u32 {
    (score as u64 * reference_urn_size as u64 / urn_size as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_new_entity_seeds_history() {
        let e = Entity::new(7, 8, 16, 0.6).unwrap();
        assert_eq!(e.estimate(), 0.5);
        assert_eq!(e.so_score(), 5);
        assert_eq!(e.stake(), DEFAULT_STAKE);
        let h = e.history();
        assert_eq!(h.scores, vec![8]);
        assert_eq!(h.deltas, vec![0]);
        assert_eq!(h.urn_sizes, vec![16]);
        assert_eq!(h.so_estimates, vec![0.5]);
        assert_eq!(h.stakes, vec![DEFAULT_STAKE]);
        assert_eq!(e.matches_played(), 0);
    }

    #[test]
    fn test_score_above_urn_is_rejected() {
        let err = Entity::new(1, 17, 16, 0.5).unwrap_err();
        assert_eq!(err, UrningsError::ScoreExceedsUrn { id: 1, score: 17, urn_size: 16 });
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(matches!(Entity::new(1, 0, 0, 0.5), Err(UrningsError::InvalidUrnSize { .. })));
        assert!(matches!(Entity::new(1, 2, 4, 0.0), Err(UrningsError::InvalidTrueValue { .. })));
        assert!(matches!(Entity::new(1, 2, 4, 1.0), Err(UrningsError::InvalidTrueValue { .. })));
        let params = EntityParams { second_order_urn_size: 10, stake: 0 };
        assert!(matches!(
            Entity::with_params(1, 2, 4, 0.5, params),
            Err(UrningsError::InvalidStake { .. })
        ));
    }

    #[test]
    fn test_equality_is_by_id() {
        let a = Entity::new(3, 1, 4, 0.2).unwrap();
        let b = Entity::new(3, 4, 8, 0.9).unwrap();
        let c = Entity::new(4, 1, 4, 0.2).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_scaled_score_uses_integer_floor() {
        let e = Entity::new(1, 3, 30, 0.5).unwrap();
        assert_eq!(e.scaled_score(100), 10);
        let e = Entity::new(2, 7, 16, 0.5).unwrap();
        assert_eq!(e.scaled_score(64), 28);
        assert_eq!(e.scaled_score(10), 4);
    }

    #[test]
    fn test_rescale_preserves_estimate() {
        let mut e = Entity::new(1, 12, 40, 0.5).unwrap();
        e.rescale_urn(10);
        assert_eq!(e.urn_size(), 10);
        assert_eq!(e.score(), 3);

        e.rescale_urn(20);
        assert_eq!(e.score(), 6);
        assert_eq!(e.estimate(), 0.3);

        // 6 * 10 / 40 = 1.5 rounds half to even
        let mut e = Entity::new(2, 6, 40, 0.5).unwrap();
        e.rescale_urn(10);
        assert_eq!(e.score(), 2);
    }

    #[test]
    fn test_sample_outcome_frequency() {
        let e = Entity::new(1, 1, 4, 0.9).unwrap();
        let mut rng = SmallRng::seed_from_u64(11);
        let n = 20_000;
        let true_hits: usize = (0..n).map(|_| e.sample_outcome(true, &mut rng) as usize).sum();
        let est_hits: usize = (0..n).map(|_| e.sample_outcome(false, &mut rng) as usize).sum();
        assert!((true_hits as f64 / n as f64 - 0.9).abs() < 0.02);
        assert!((est_hits as f64 / n as f64 - 0.25).abs() < 0.02);
    }

    #[test]
    fn test_record_keeps_series_aligned() {
        let mut e = Entity::new(1, 4, 8, 0.5).unwrap();
        e.set_score(5);
        e.record_match(1);
        e.record_second_order();
        e.record_adaptation();
        let h = e.history();
        assert_eq!(h.len(), 2);
        assert_eq!(h.estimates.len(), 2);
        assert_eq!(h.deltas, vec![0, 1]);
        assert_eq!(h.urn_sizes.len(), 2);
        assert_eq!(h.so_estimates.len(), 2);
        assert_eq!(h.stakes.len(), 2);
        assert_eq!(e.matches_played(), 1);
    }
}
