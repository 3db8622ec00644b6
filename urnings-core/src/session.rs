/// Session orchestrator.
///
/// Owns the roster, the rule engine, the selection model and the random
/// source for one run, and executes match transactions strictly one after
/// another. Each transaction reads the bin index and selection table left
/// behind by the previous one, so a session is never shared across threads;
/// independent replications use independent sessions.
///
/// Entities are identified by caller-provided `i64` IDs.
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::config::{Adaptivity, RuleConfig};
use crate::diagnostics::{FitTable, GreenBallLedger};
use crate::entity::Entity;
use crate::error::UrningsError;
use crate::rules::{PairedQueues, RuleEngine};
use crate::selection::{ItemBins, SelectionTable};
use crate::types::{IdMap, MatchOutcome, PlayMode};

pub struct Session {
    players: Vec<Entity>,
    items: Vec<Entity>,
    player_ids: IdMap,
    item_ids: IdMap,

    rules: RuleEngine,
    /// Common scale for player scores (`max_urn`, or the shared player urn size).
    reference_urn_size: u32,
    table: SelectionTable,
    bins: ItemBins,
    queues: PairedQueues,
    rng: SmallRng,

    matches_played: usize,
    accepted_matches: usize,
    ledger: GreenBallLedger,
    fit: FitTable,
}

impl Session {
    /// Validate the roster against `config` and set up a run.
    ///
    /// `seed = None` draws the seed from OS entropy.
    pub fn new(
        players: Vec<Entity>,
        items: Vec<Entity>,
        config: RuleConfig,
        seed: Option<u64>,
    ) -> Result<Self, UrningsError> {
        let rules = RuleEngine::new(config)?;

        let first_player = players.first().ok_or(UrningsError::EmptyRoster("players"))?;
        let first_item = items.first().ok_or(UrningsError::EmptyRoster("items"))?;
        let player_ids = IdMap::from_ids("player", players.iter().map(Entity::id))?;
        let item_ids = IdMap::from_ids("item", items.iter().map(Entity::id))?;

        let item_urn_size = first_item.urn_size();
        if let Some(other) = items.iter().find(|it| it.urn_size() != item_urn_size) {
            return Err(UrningsError::MixedItemUrnSizes { first: item_urn_size, other: other.urn_size() });
        }

        let reference_urn_size = match config.urn_adaptation.urn_bounds() {
            Some(bounds) => bounds.max_urn,
            None => {
                let first = first_player.urn_size();
                if let Some(other) = players.iter().find(|p| p.urn_size() != first) {
                    return Err(UrningsError::MixedPlayerUrnSizes { first, other: other.urn_size() });
                }
                first
            }
        };

        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };

        let mut session = Session {
            table: SelectionTable::new(reference_urn_size, item_urn_size),
            bins: ItemBins::new(item_urn_size, &items),
            queues: PairedQueues::new(items.len()),
            fit: FitTable::new(reference_urn_size, item_urn_size),
            ledger: GreenBallLedger::default(),
            matches_played: 0,
            accepted_matches: 0,
            reference_urn_size,
            rules,
            rng,
            players,
            items,
            player_ids,
            item_ids,
        };
        session.record_ledger();
        Ok(session)
    }

    /// Pick a pairing by caller ID. The player is drawn uniformly unless given;
    /// the item uniformly, or by the selection kernel under adaptive selection.
    pub fn matchmaking(&mut self, player: Option<i64>) -> Result<(i64, i64), UrningsError> {
        let player_idx = player.map(|id| self.player_idx(id)).transpose()?;
        let (p, i) = self.matchmaking_indexed(player_idx);
        Ok((self.player_ids.to_id(p), self.item_ids.to_id(i)))
    }

    fn matchmaking_indexed(&mut self, player: Option<usize>) -> (usize, usize) {
        let p = player.unwrap_or_else(|| self.rng.random_range(0..self.players.len()));
        let i = match self.rules.config().adaptivity {
            Adaptivity::NonAdaptive => self.rng.random_range(0..self.items.len()),
            Adaptivity::Adaptive => {
                let scaled = self.players[p].scaled_score(self.reference_urn_size);
                self.bins.select(&self.table, scaled, &mut self.rng)
            }
        };
        (p, i)
    }

    /// Run one match transaction between the given player and item.
    pub fn run_match(&mut self, player: i64, item: i64) -> Result<MatchOutcome, UrningsError> {
        let p = self.player_idx(player)?;
        let i = self.item_idx(item)?;
        Ok(self.run_match_indexed(p, i))
    }

    fn run_match_indexed(&mut self, p: usize, i: usize) -> MatchOutcome {
        let scaled_before = self.players[p].scaled_score(self.reference_urn_size);
        let player_before = self.players[p].score();
        let item_before = self.items[i].score();

        let draw = self.rules.draw_rule(&self.players[p], &self.items[i], &mut self.rng);
        self.fit.record(scaled_before, item_before, draw.result, draw.expected);

        let proposal = self.rules.propose(&mut self.players[p], &self.items[i], draw, &mut self.rng);

        let metropolis = self.rules.metropolis_correction(&self.players[p], &self.items[i], proposal);
        let adaptivity = self.rules.adaptivity_correction(
            &self.players[p],
            &self.items[i],
            proposal,
            &self.table,
            &self.bins,
        );
        let acceptance = (metropolis * adaptivity).min(1.0);
        let accepted = self.rng.random::<f64>() < acceptance;
        if accepted {
            self.players[p].set_score(proposal.player);
            self.items[i].set_score(proposal.item);
        }

        let player_delta = bounded_delta(player_before, self.players[p].score());
        let item_delta = bounded_delta(item_before, self.items[i].score());

        self.rules.paired_update(&mut self.items, i, item_delta, &mut self.queues, &mut self.rng);
        self.bins.rebuild(&self.items);

        self.players[p].record_match(player_delta);
        self.items[i].record_match(item_delta);

        self.rules.second_order_urnings(&mut self.players[p], player_delta, &mut self.rng);
        self.players[p].record_second_order();
        self.items[i].record_second_order();

        self.rules.adaptive_urn_change(&mut self.players[p], &mut self.rng);
        self.players[p].record_adaptation();
        self.items[i].record_adaptation();

        self.matches_played += 1;
        self.accepted_matches += accepted as usize;
        self.record_ledger();

        let outcome = MatchOutcome {
            player: self.player_ids.to_id(p),
            item: self.item_ids.to_id(i),
            draw,
            proposal,
            acceptance,
            accepted,
            player_delta,
            item_delta,
        };
        trace!(
            player = outcome.player,
            item = outcome.item,
            result = draw.result,
            expected = draw.expected,
            acceptance,
            accepted,
            "match"
        );
        outcome
    }

    /// Play `n` iterations: one random match each (`Random`), or one match
    /// per player in roster order (`Test`).
    pub fn play(&mut self, n: usize, mode: PlayMode) {
        for _ in 0..n {
            match mode {
                PlayMode::Random => {
                    let (p, i) = self.matchmaking_indexed(None);
                    self.run_match_indexed(p, i);
                }
                PlayMode::Test => {
                    for p in 0..self.players.len() {
                        let (p, i) = self.matchmaking_indexed(Some(p));
                        self.run_match_indexed(p, i);
                    }
                }
            }
        }
    }

    /// Re-bucket items by their current score.
    pub fn rebuild_bins(&mut self) {
        self.bins.rebuild(&self.items);
    }

    pub fn players(&self) -> &[Entity] {
        &self.players
    }

    pub fn items(&self) -> &[Entity] {
        &self.items
    }

    pub fn player(&self, id: i64) -> Option<&Entity> {
        self.player_ids.to_idx(id).map(|idx| &self.players[idx])
    }

    pub fn item(&self, id: i64) -> Option<&Entity> {
        self.item_ids.to_idx(id).map(|idx| &self.items[idx])
    }

    pub fn config(&self) -> &RuleConfig {
        self.rules.config()
    }

    pub fn matches_played(&self) -> usize {
        self.matches_played
    }

    /// Matches whose proposal passed the acceptance step (no-op proposals included).
    pub fn accepted_matches(&self) -> usize {
        self.accepted_matches
    }

    pub fn reference_urn_size(&self) -> u32 {
        self.reference_urn_size
    }

    pub fn bins(&self) -> &ItemBins {
        &self.bins
    }

    pub fn selection_table(&self) -> &SelectionTable {
        &self.table
    }

    pub fn queues(&self) -> &PairedQueues {
        &self.queues
    }

    pub fn ledger(&self) -> &GreenBallLedger {
        &self.ledger
    }

    pub fn fit(&self) -> &FitTable {
        &self.fit
    }

    fn player_idx(&self, id: i64) -> Result<usize, UrningsError> {
        self.player_ids.to_idx(id).ok_or(UrningsError::UnknownId { kind: "player", id })
    }

    fn item_idx(&self, id: i64) -> Result<usize, UrningsError> {
        self.item_ids.to_idx(id).ok_or(UrningsError::UnknownId { kind: "item", id })
    }

    fn record_ledger(&mut self) {
        let item_green: u64 = self.items.iter().map(|it| it.score() as u64).sum();
        let player_green: u64 = self.players.iter().map(|p| p.score() as u64).sum();
        let total_balls: u64 = self
            .players
            .iter()
            .chain(&self.items)
            .map(|e| e.urn_size() as u64)
            .sum();
        self.ledger.record(item_green, player_green, total_balls);
    }
}

fn bounded_delta(before: u32, after: u32) -> i8 {
    (after as i64 - before as i64).clamp(-1, 1) as i8
}
