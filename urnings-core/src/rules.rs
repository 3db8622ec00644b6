/// The urnings rule engine.
///
/// Stateless apart from its configuration and the precomputed sign-flip
/// table: every function reads the entities it is given, and the only
/// mutations are the ones a rule is defined to make (paired update,
/// second-order urn, urn size, stake). Per-run queues are owned by the
/// caller and passed in.
use rand::Rng;
use tracing::debug;

use crate::config::{
    Adaptivity, Algorithm, ChangeTest, ComparisonSampler, RuleConfig, UrnAdaptation, UrnBounds,
};
use crate::constants::PAIRED_UPDATE_MAX_RETRIES;
use crate::entity::{scale_score, Entity};
use crate::error::UrningsError;
use crate::sampling::{reject_until_differ, sample_comparison, tie_break, SignFlipTable};
use crate::selection::{ItemBins, SelectionTable};

/// Observed result and expected result of one comparison, both in {0, 1}.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Draw {
    pub result: u8,
    pub expected: u8,
}

/// Proposed new scores for the player and the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Proposal {
    pub player: u32,
    pub item: u32,
}

/// Pending paired-update counters, indexed by item position.
///
/// `pending_increment[i] > 0`: item `i` gave a ball back and is owed one.
/// `pending_decrement[i] > 0`: item `i` received a ball and owes one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairedQueues {
    pending_increment: Vec<u32>,
    pending_decrement: Vec<u32>,
}

impl PairedQueues {
    pub fn new(num_items: usize) -> Self {
        PairedQueues {
            pending_increment: vec![0; num_items],
            pending_decrement: vec![0; num_items],
        }
    }

    pub fn pending_increment(&self) -> &[u32] {
        &self.pending_increment
    }

    pub fn pending_decrement(&self) -> &[u32] {
        &self.pending_decrement
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Increment,
    Decrement,
}

pub struct RuleEngine {
    config: RuleConfig,
    sign_flips: SignFlipTable,
}

impl RuleEngine {
    pub fn new(config: RuleConfig) -> Result<Self, UrningsError> {
        config.validate()?;
        Ok(RuleEngine {
            sign_flips: SignFlipTable::new(config.window),
            config,
        })
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    /// Sample the observed result from the true values, then the expected
    /// result from the current urns (`Urnings1`) or from the urns with the
    /// observed result already added (`Urnings2`).
    pub fn draw_rule<R: Rng>(&self, player: &Entity, item: &Entity, rng: &mut R) -> Draw {
        let result = self.compare(player, item, true, rng);

        let expected = match self.config.algorithm {
            Algorithm::Urnings1 => self.compare(player, item, false, rng),
            Algorithm::Urnings2 => {
                let r = result as u32;
                let p = (player.score() + r) as f64 / (player.urn_size() + 1) as f64;
                let q = (item.score() + 1 - r) as f64 / (item.urn_size() + 1) as f64;
                sample_comparison(self.config.sampler, p, q, rng)
            }
        };

        Draw { result, expected }
    }

    fn compare<R: Rng>(&self, player: &Entity, item: &Entity, use_true_value: bool, rng: &mut R) -> u8 {
        match self.config.sampler {
            ComparisonSampler::Exact => {
                let (p, q) = if use_true_value {
                    (player.true_value(), item.true_value())
                } else {
                    (player.estimate(), item.estimate())
                };
                sample_comparison(ComparisonSampler::Exact, p, q, rng)
            }
            ComparisonSampler::Rejection => {
                let p = if use_true_value { player.true_value() } else { player.estimate() };
                reject_until_differ(rng, tie_break(p), |rng| {
                    (player.sample_outcome(use_true_value, rng), item.sample_outcome(use_true_value, rng))
                })
            }
        }
    }

    /// Proposal for this match under the configured stake policy. Adapting
    /// stake modes update the player's stake first and use the new value.
    pub fn propose<R: Rng>(&self, player: &mut Entity, item: &Entity, draw: Draw, rng: &mut R) -> Proposal {
        match self.config.urn_adaptation {
            UrnAdaptation::StakesPermutation { .. } | UrnAdaptation::StakesSecondOrder { .. } => {
                let stake = self.calculate_stakes(player, rng);
                update_with_stakes(player, item, draw, stake)
            }
            UrnAdaptation::FixedStakes => update_with_stakes(player, item, draw, player.stake()),
            _ => update_rule(player, item, draw),
        }
    }

    /// Ratio of stationary weights of the current and proposed joint state.
    ///
    /// `Urnings2` needs no correction. For `Urnings1` a zero proposed weight
    /// is a hard rejection (0), and a no-op proposal is always exactly 1.
    pub fn metropolis_correction(&self, player: &Entity, item: &Entity, proposal: Proposal) -> f64 {
        match self.config.algorithm {
            Algorithm::Urnings2 => 1.0,
            Algorithm::Urnings1 => {
                if proposal.player == player.score() && proposal.item == item.score() {
                    return 1.0;
                }
                let old = joint_weight(player.score(), item.score(), player.urn_size(), item.urn_size());
                let new = joint_weight(proposal.player, proposal.item, player.urn_size(), item.urn_size());
                if new == 0 {
                    return 0.0;
                }
                old as f64 / new as f64
            }
        }
    }

    /// Ratio of the proposed pairing's selection probability (item moved to
    /// its proposed bin, player at its proposed scaled score) to the current
    /// pairing's. Always 1 without adaptive selection.
    pub fn adaptivity_correction(
        &self,
        player: &Entity,
        item: &Entity,
        proposal: Proposal,
        table: &SelectionTable,
        bins: &ItemBins,
    ) -> f64 {
        if self.config.adaptivity == Adaptivity::NonAdaptive {
            return 1.0;
        }

        let scale = table.player_scale();
        let mut counts = bins.counts();
        let current = table.selection_probability(player.scaled_score(scale), item.score(), &counts);

        counts[item.score() as usize] -= 1;
        counts[proposal.item as usize] += 1;
        let proposed_scaled = scale_score(proposal.player, player.urn_size(), scale);
        let proposed = table.selection_probability(proposed_scaled, proposal.item, &counts);

        if current <= 0.0 {
            return 1.0;
        }
        proposed / current
    }

    /// Keep the item population's green balls constant: every +1 on an item
    /// is matched by a -1 on an item that owes one, or, if none owes one, the
    /// +1 is taken back and the item is queued to receive it later (and
    /// symmetrically for -1). No-op unless paired updates are enabled.
    pub fn paired_update<R: Rng>(
        &self,
        items: &mut [Entity],
        item_idx: usize,
        item_diff: i8,
        queues: &mut PairedQueues,
        rng: &mut R,
    ) {
        if !self.config.paired_update {
            return;
        }

        match item_diff {
            1 => {
                if queues.pending_decrement.iter().all(|&c| c == 0) {
                    queues.pending_increment[item_idx] += 1;
                    let item = &mut items[item_idx];
                    if item.score() > 0 {
                        item.set_score(item.score() - 1);
                    }
                } else {
                    settle_pending(items, &mut queues.pending_decrement, Direction::Decrement, rng);
                }
            }
            -1 => {
                if queues.pending_increment.iter().all(|&c| c == 0) {
                    queues.pending_decrement[item_idx] += 1;
                    let item = &mut items[item_idx];
                    if item.score() < item.urn_size() {
                        item.set_score(item.score() + 1);
                    }
                } else {
                    settle_pending(items, &mut queues.pending_increment, Direction::Increment, rng);
                }
            }
            _ => {}
        }
    }

    /// Update the second-order urn with the player's non-negative score
    /// change: `so_score += max(delta, 0) - expected`, `expected ~ Bernoulli(so_estimate)`.
    pub fn second_order_urnings<R: Rng>(&self, player: &mut Entity, player_diff: i8, rng: &mut R) {
        let so_diff = player_diff.max(0) as i64;
        let expected = player.sample_second_order_outcome(rng) as i64;
        let next = (player.so_score() as i64 + so_diff - expected).clamp(0, player.so_urn_size() as i64);
        player.set_so_score(next as u32);
    }

    /// Resize the player's urn at window checkpoints. Expects this match's
    /// delta and second-order estimate to be recorded already.
    ///
    /// A detected trend shrinks the urn to `min_urn`. A player already at
    /// `min_urn` takes the grow branch instead, as does a player with no trend.
    pub fn adaptive_urn_change<R: Rng>(&self, player: &mut Entity, rng: &mut R) {
        let window = self.config.window;
        let played = player.matches_played();
        if played < window || played % window != 0 {
            return;
        }

        match self.config.urn_adaptation {
            UrnAdaptation::Permutation { bounds, test } => {
                let deltas = last_window(&player.history().deltas, window);
                match test {
                    ChangeTest::Streak { bound, freq_change } => {
                        let sum: i32 = deltas.iter().map(|&d| d as i32).sum();
                        if sum >= bound && player.urn_size() > bounds.min_urn {
                            shrink(player, bounds);
                        } else if played % freq_change == 0 {
                            grow(player, bounds);
                        }
                    }
                    ChangeTest::Permutation(t) => {
                        let p_value = self.sign_flips.p_value(deltas, t.n_permutations, rng);
                        if p_value < t.p_value && player.urn_size() > bounds.min_urn {
                            shrink(player, bounds);
                        } else {
                            grow(player, bounds);
                        }
                    }
                }
            }
            UrnAdaptation::SecondOrder { bounds, control_draws } => {
                if self.second_order_unanimous(player, control_draws, rng) && player.urn_size() > bounds.min_urn {
                    shrink(player, bounds);
                } else {
                    grow(player, bounds);
                }
            }
            _ => {}
        }
    }

    /// Adapt the player's stake and return the stake to use for this match.
    ///
    /// `StakesPermutation` checks every match once `window` matches are
    /// recorded: a detected trend resets to `max_stakes`, otherwise the stake
    /// halves. `StakesSecondOrder` checks at window checkpoints: unanimous
    /// control draws reset to `max_stakes`, otherwise the stake drops by one.
    pub fn calculate_stakes<R: Rng>(&self, player: &mut Entity, rng: &mut R) -> u32 {
        let window = self.config.window;
        let played = player.matches_played();
        let before = player.stake();

        match self.config.urn_adaptation {
            UrnAdaptation::StakesPermutation { stakes, test } if played >= window => {
                let deltas = last_window(&player.history().deltas, window);
                let p_value = self.sign_flips.p_value(deltas, test.n_permutations, rng);
                if p_value < test.p_value {
                    player.set_stake(stakes.max_stakes);
                } else if before != 1 {
                    player.set_stake(before / 2);
                }
            }
            UrnAdaptation::StakesSecondOrder { stakes, control_draws }
                if played >= window && played % window == 0 =>
            {
                if self.second_order_unanimous(player, control_draws, rng) && before > stakes.min_stakes {
                    player.set_stake(stakes.max_stakes);
                } else if before != 1 {
                    player.set_stake(before - 1);
                }
            }
            _ => {}
        }

        if player.stake() != before {
            debug!(id = player.id(), from = before, to = player.stake(), "stake changed");
        }
        player.stake()
    }

    /// Draw `control_draws` Bernoulli samples at the mean of the last
    /// `window` second-order estimates; true when they all agree.
    fn second_order_unanimous<R: Rng>(&self, player: &Entity, control_draws: usize, rng: &mut R) -> bool {
        let recent = last_window(&player.history().so_estimates, self.config.window);
        let mean = (recent.iter().sum::<f64>() / recent.len() as f64).clamp(0.0, 1.0);
        let successes = (0..control_draws).filter(|_| rng.random_bool(mean)).count();
        successes == 0 || successes == control_draws
    }
}

/// Plain stochastic-approximation step: `score + result - expected` for the
/// player, mirrored for the item, clamped to the urn.
pub fn update_rule(player: &Entity, item: &Entity, draw: Draw) -> Proposal {
    staked_proposal(player, item, draw, 1)
}

/// Step multiplied by `stake`. If the full stake could leave either urn in
/// either direction, both sides fall back to the unstaked step.
pub fn update_with_stakes(player: &Entity, item: &Entity, draw: Draw, stake: u32) -> Proposal {
    let out_of_bounds =
        |e: &Entity| e.score() as u64 + stake as u64 > e.urn_size() as u64 || e.score() < stake;
    if out_of_bounds(player) || out_of_bounds(item) {
        return update_rule(player, item, draw);
    }
    staked_proposal(player, item, draw, stake)
}

fn staked_proposal(player: &Entity, item: &Entity, draw: Draw, stake: u32) -> Proposal {
    let step = (draw.result as i64 - draw.expected as i64) * stake as i64;
    let player_score = (player.score() as i64 + step).clamp(0, player.urn_size() as i64);
    let item_score = (item.score() as i64 - step).clamp(0, item.urn_size() as i64);
    Proposal {
        player: player_score as u32,
        item: item_score as u32,
    }
}

/// `p(n_i - i) + (n_j - p)i` for player score `p` in an urn of `n_i` and item
/// score `i` in an urn of `n_j`.
fn joint_weight(player_score: u32, item_score: u32, player_urn: u32, item_urn: u32) -> i64 {
    let (p, i) = (player_score as i64, item_score as i64);
    p * (player_urn as i64 - i) + (item_urn as i64 - p) * i
}

fn last_window<T>(series: &[T], window: usize) -> &[T] {
    &series[series.len().saturating_sub(window)..]
}

fn shrink(player: &mut Entity, bounds: UrnBounds) {
    if player.urn_size() > bounds.min_urn {
        let from = player.urn_size();
        player.rescale_urn(bounds.min_urn);
        debug!(id = player.id(), from, to = bounds.min_urn, score = player.score(), "urn shrunk");
    }
}

fn grow(player: &mut Entity, bounds: UrnBounds) {
    let doubled = player.urn_size().saturating_mul(2);
    if doubled <= bounds.max_urn {
        player.rescale_urn(doubled);
        debug!(id = player.id(), to = doubled, score = player.score(), "urn grown");
    }
}

/// Give the pending ball to a uniformly drawn queued item that can take it,
/// clearing that item's counter. Skipped if no draw finds one.
fn settle_pending<R: Rng>(items: &mut [Entity], pending: &mut [u32], direction: Direction, rng: &mut R) {
    let candidates: Vec<usize> = pending
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count >= 1)
        .map(|(idx, _)| idx)
        .collect();
    if candidates.is_empty() {
        return;
    }

    for _ in 0..=PAIRED_UPDATE_MAX_RETRIES {
        let idx = candidates[rng.random_range(0..candidates.len())];
        let item = &mut items[idx];
        let new_score = match direction {
            Direction::Decrement if item.score() > 0 => item.score() - 1,
            Direction::Increment if item.score() < item.urn_size() => item.score() + 1,
            _ => continue,
        };
        pending[idx] = 0;
        item.set_score(new_score);
        return;
    }

    debug!(?direction, candidates = candidates.len(), "paired update found no eligible item; skipped");
}
