/// Rule configuration for one run.
///
/// Every axis is a closed enum so that a mode and its parameters travel
/// together: urn bounds only exist for the urn-resizing modes, stake bounds
/// only for the stake modes, and so on.
use crate::constants::{
    DEFAULT_CONTROL_DRAWS, DEFAULT_PERMUTATIONS, DEFAULT_PERMUTATION_P_VALUE,
};
use crate::error::UrningsError;

/// Which urnings algorithm computes the expected result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Algorithm {
    /// Expected result drawn from the current estimates; needs the
    /// Metropolis correction.
    #[default]
    Urnings1,
    /// Expected result drawn as if the observed result were already in the
    /// urns; self-correcting.
    Urnings2,
}

/// Item selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Adaptivity {
    /// Player and item drawn uniformly.
    #[default]
    NonAdaptive,
    /// Item drawn with probability proportional to the selection kernel.
    Adaptive,
}

/// How the conditional "player beats item given exactly one succeeds" draw is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ComparisonSampler {
    /// Closed-form conditional probability, one uniform draw.
    #[default]
    Exact,
    /// Draw both sides until they differ, capped at `MAX_REJECTION_ATTEMPTS`.
    Rejection,
}

/// Allowed range for the urn size of an adapting player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UrnBounds {
    pub min_urn: u32,
    pub max_urn: u32,
}

/// Allowed range for an adapting stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StakeBounds {
    pub min_stakes: u32,
    pub max_stakes: u32,
}

/// Sign-flip permutation test on the windowed score deltas.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PermutationTest {
    /// Significance level; a p-value below it counts as a detected trend.
    pub p_value: f64,
    /// Monte Carlo sample size, used when the window is too long to enumerate.
    pub n_permutations: usize,
}

impl Default for PermutationTest {
    fn default() -> Self {
        PermutationTest {
            p_value: DEFAULT_PERMUTATION_P_VALUE,
            n_permutations: DEFAULT_PERMUTATIONS,
        }
    }
}

/// Change detector used by the permutation urn mode.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "kebab-case"))]
pub enum ChangeTest {
    /// Shrink when the windowed delta sum reaches `bound`; otherwise grow
    /// every `freq_change` matches.
    Streak { bound: i32, freq_change: usize },
    /// Shrink when the permutation test rejects; otherwise grow.
    Permutation(PermutationTest),
}

/// Adaptive urn-size / stake policy applied to players.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "mode", rename_all = "kebab-case"))]
pub enum UrnAdaptation {
    #[default]
    Off,
    Permutation { bounds: UrnBounds, test: ChangeTest },
    SecondOrder { bounds: UrnBounds, control_draws: usize },
    StakesPermutation { stakes: StakeBounds, test: PermutationTest },
    StakesSecondOrder { stakes: StakeBounds, control_draws: usize },
    /// Staked proposals with each player's own, never-changing stake.
    FixedStakes,
}

impl UrnAdaptation {
    /// Second-order resizing with the default number of control draws.
    pub fn second_order(min_urn: u32, max_urn: u32) -> Self {
        UrnAdaptation::SecondOrder {
            bounds: UrnBounds { min_urn, max_urn },
            control_draws: DEFAULT_CONTROL_DRAWS,
        }
    }

    /// Urn bounds for the modes that resize urns.
    pub fn urn_bounds(&self) -> Option<UrnBounds> {
        match *self {
            UrnAdaptation::Permutation { bounds, .. } | UrnAdaptation::SecondOrder { bounds, .. } => {
                Some(bounds)
            }
            _ => None,
        }
    }

    /// Whether proposals are multiplied by a stake.
    pub fn uses_stakes(&self) -> bool {
        matches!(
            self,
            UrnAdaptation::StakesPermutation { .. }
                | UrnAdaptation::StakesSecondOrder { .. }
                | UrnAdaptation::FixedStakes
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RuleConfig {
    pub algorithm: Algorithm,
    pub adaptivity: Adaptivity,
    /// Couple every item increase with a decrease elsewhere (and vice versa).
    pub paired_update: bool,
    pub urn_adaptation: UrnAdaptation,
    /// Number of recent matches inspected by the change detectors.
    pub window: usize,
    pub sampler: ComparisonSampler,
}

impl Default for RuleConfig {
    fn default() -> Self {
        RuleConfig {
            algorithm: Algorithm::Urnings1,
            adaptivity: Adaptivity::NonAdaptive,
            paired_update: false,
            urn_adaptation: UrnAdaptation::Off,
            window: 2,
            sampler: ComparisonSampler::Exact,
        }
    }
}

impl RuleConfig {
    pub fn validate(&self) -> Result<(), UrningsError> {
        let invalid = |msg: String| -> Result<(), UrningsError> { Err(UrningsError::InvalidConfig(msg)) };

        if self.window == 0 {
            return invalid("window must be at least 1".to_string());
        }

        let check_urn = |b: &UrnBounds| -> Result<(), UrningsError> {
            if b.min_urn == 0 || b.min_urn > b.max_urn {
                return Err(UrningsError::InvalidConfig(format!(
                    "urn bounds must satisfy 0 < min_urn <= max_urn (got {}..{})",
                    b.min_urn, b.max_urn
                )));
            }
            Ok(())
        };
        let check_stakes = |s: &StakeBounds| -> Result<(), UrningsError> {
            if s.min_stakes == 0 || s.min_stakes > s.max_stakes {
                return Err(UrningsError::InvalidConfig(format!(
                    "stake bounds must satisfy 0 < min_stakes <= max_stakes (got {}..{})",
                    s.min_stakes, s.max_stakes
                )));
            }
            Ok(())
        };
        let check_test = |t: &PermutationTest| -> Result<(), UrningsError> {
            if !(t.p_value > 0.0 && t.p_value < 1.0) {
                return Err(UrningsError::InvalidConfig(format!(
                    "permutation p-value must lie in (0, 1), got {}",
                    t.p_value
                )));
            }
            if t.n_permutations == 0 {
                return Err(UrningsError::InvalidConfig("n_permutations must be positive".to_string()));
            }
            Ok(())
        };

        match &self.urn_adaptation {
            UrnAdaptation::Off | UrnAdaptation::FixedStakes => {}
            UrnAdaptation::Permutation { bounds, test } => {
                check_urn(bounds)?;
                match test {
                    ChangeTest::Streak { freq_change, .. } => {
                        if *freq_change == 0 {
                            return invalid("freq_change must be positive".to_string());
                        }
                    }
                    ChangeTest::Permutation(t) => check_test(t)?,
                }
            }
            UrnAdaptation::SecondOrder { bounds, control_draws } => {
                check_urn(bounds)?;
                if *control_draws == 0 {
                    return invalid("control_draws must be positive".to_string());
                }
            }
            UrnAdaptation::StakesPermutation { stakes, test } => {
                check_stakes(stakes)?;
                check_test(test)?;
            }
            UrnAdaptation::StakesSecondOrder { stakes, control_draws } => {
                check_stakes(stakes)?;
                if *control_draws == 0 {
                    return invalid("control_draws must be positive".to_string());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(RuleConfig::default().validate().is_ok());
        assert_eq!(RuleConfig::default().urn_adaptation.urn_bounds(), None);
    }

    #[test]
    fn test_rejects_bad_bounds() {
        let config = RuleConfig {
            urn_adaptation: UrnAdaptation::second_order(64, 8),
            ..RuleConfig::default()
        };
        assert!(matches!(config.validate(), Err(UrningsError::InvalidConfig(_))));

        let config = RuleConfig {
            urn_adaptation: UrnAdaptation::StakesSecondOrder {
                stakes: StakeBounds { min_stakes: 0, max_stakes: 4 },
                control_draws: 3,
            },
            ..RuleConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_window_and_bad_p_value() {
        let config = RuleConfig { window: 0, ..RuleConfig::default() };
        assert!(config.validate().is_err());

        let config = RuleConfig {
            urn_adaptation: UrnAdaptation::Permutation {
                bounds: UrnBounds { min_urn: 8, max_urn: 64 },
                test: ChangeTest::Permutation(PermutationTest { p_value: 1.5, n_permutations: 100 }),
            },
            ..RuleConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mode_helpers() {
        let adapt = UrnAdaptation::second_order(8, 64);
        assert_eq!(adapt.urn_bounds(), Some(UrnBounds { min_urn: 8, max_urn: 64 }));
        assert!(!adapt.uses_stakes());
        assert!(UrnAdaptation::FixedStakes.uses_stakes());
        assert_eq!(UrnAdaptation::FixedStakes.urn_bounds(), None);
    }
}
