/// urnings-core: urn-based adaptive measurement engine.
///
/// Players and items each hold an urn of green and red balls whose fill level
/// is their ability / difficulty estimate. Matches between them move balls
/// through a Metropolis-corrected stochastic rule, optionally with adaptive
/// item selection, paired item updates and adaptive urn sizes or stakes.
/// No IO, just the simulation.
///
/// Entities are identified by caller-provided `i64` IDs. The crate handles the
/// internal mapping to array positions.
///
/// # Quick start
///
/// ```rust
/// use urnings_core::{Entity, PlayMode, RuleConfig, Session};
///
/// let players: Vec<Entity> = (0..10)
///     .map(|k| Entity::new(k, 8, 16, 0.3 + 0.04 * k as f64))
///     .collect::<Result<_, _>>()?;
/// let items: Vec<Entity> = (100..120)
///     .map(|k| Entity::new(k, 8, 16, 0.5))
///     .collect::<Result<_, _>>()?;
///
/// let mut session = Session::new(players, items, RuleConfig::default(), Some(42))?;
/// session.play(1000, PlayMode::Random);
///
/// for p in session.players() {
///     println!("Player {}: {:.3} (true {:.3})", p.id(), p.estimate(), p.true_value());
/// }
/// assert_eq!(session.matches_played(), 1000);
/// # Ok::<(), urnings_core::UrningsError>(())
/// ```

pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod entity;
pub mod error;
pub mod rules;
pub mod sampling;
pub mod selection;
pub mod session;
pub mod types;

// Re-export primary public API at crate root.
pub use config::{
    Adaptivity, Algorithm, ChangeTest, ComparisonSampler, PermutationTest, RuleConfig, StakeBounds,
    UrnAdaptation, UrnBounds,
};
pub use diagnostics::{autocorrelation, FitTable, GreenBallLedger};
pub use entity::{Entity, EntityParams, History};
pub use error::UrningsError;
pub use rules::{update_rule, update_with_stakes, Draw, PairedQueues, Proposal, RuleEngine};
pub use selection::{selection_kernel, ItemBins, SelectionTable};
pub use session::Session;
pub use types::{MatchOutcome, PlayMode};
