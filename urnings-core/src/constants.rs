/// Attempt cap for the differ-until-unequal rejection sampler.
///
/// Only used with `ComparisonSampler::Rejection`. When both compared
/// probabilities are close to 0 or close to 1 the two draws almost never
/// differ; after this many attempts the sampler gives up and uses the
/// tie-break in `sampling::tie_break`.
pub const MAX_REJECTION_ATTEMPTS: usize = 1000;

/// Extra candidate draws allowed when the first paired-update candidate
/// cannot absorb the pending ball (already empty, or already full).
/// After that the paired update is skipped for the match.
pub const PAIRED_UPDATE_MAX_RETRIES: usize = 100;

/// Windows at least this long use Monte Carlo sign flips instead of
/// enumerating all 2^window combinations.
pub const EXACT_PERMUTATION_MAX_WINDOW: usize = 15;

/// Default capacity of the second-order (trend) urn.
pub const DEFAULT_SECOND_ORDER_URN_SIZE: u32 = 10;

/// Default initial stake for a new entity.
pub const DEFAULT_STAKE: u32 = 16;

/// Default number of Bernoulli control draws for the second-order
/// unanimity test.
pub const DEFAULT_CONTROL_DRAWS: usize = 3;

/// Default number of Monte Carlo sign-flip vectors for long windows.
pub const DEFAULT_PERMUTATIONS: usize = 1000;

/// Default significance level for the permutation test.
pub const DEFAULT_PERMUTATION_P_VALUE: f64 = 0.05;

/// Sharpness of the adaptive selection kernel
/// `exp(-SHARPNESS * (logit_i - logit_j)^2)`.
pub const SELECTION_KERNEL_SHARPNESS: f64 = 2.0;
