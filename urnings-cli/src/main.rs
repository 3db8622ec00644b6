mod config;
mod output;
mod roster;

use clap::Parser;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;
use urnings_core::{
    Adaptivity, Algorithm, ComparisonSampler, PlayMode, RuleConfig, Session, UrnAdaptation,
    UrningsError,
};

use crate::output::ReplicationSummary;
use crate::roster::RosterSpec;

pub fn bail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

#[derive(Parser)]
#[command(name = "urnings", version, about = "Simulate urn-based adaptive measurement")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Simulate players answering items and report how well the urns recover the true values
    Simulate(SimulateArgs),
    /// Create a default config file at ~/.config/urnings/config.toml
    Init,
}

#[derive(Parser)]
struct SimulateArgs {
    /// Number of simulated players
    #[arg(long)]
    players: Option<usize>,

    /// Number of simulated items
    #[arg(long)]
    items: Option<usize>,

    /// Initial player urn size
    #[arg(long)]
    player_urn: Option<u32>,

    /// Item urn size
    #[arg(long)]
    item_urn: Option<u32>,

    /// Iterations: matches in random mode, rounds (one match per player) with --test-mode
    #[arg(long)]
    games: Option<usize>,

    /// Every player plays once per iteration, in roster order
    #[arg(long)]
    test_mode: bool,

    /// Algorithm: "urnings1" or "urnings2"
    #[arg(long)]
    algorithm: Option<String>,

    /// Select items with the adaptive kernel instead of uniformly
    #[arg(long)]
    adaptive: bool,

    /// Couple item increases with decreases elsewhere
    #[arg(long)]
    paired_update: bool,

    /// Comparison sampler: "exact" or "rejection"
    #[arg(long)]
    sampler: Option<String>,

    /// Resize player urns with the second-order rule between --min-urn and --max-urn
    #[arg(long, requires = "max_urn")]
    min_urn: Option<u32>,

    #[arg(long, requires = "min_urn")]
    max_urn: Option<u32>,

    /// Matches inspected by the change detectors
    #[arg(long)]
    window: Option<usize>,

    /// Independent replications
    #[arg(long)]
    replications: Option<usize>,

    /// Max replications running at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Base seed; replication r uses seed + r. Random when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Output JSON instead of table
    #[arg(long)]
    json: bool,

    /// Show progress and debug logs during execution
    #[arg(short, long)]
    verbose: bool,

    /// Path to config file (default: ~/.config/urnings/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate(args) => run_simulate(args).await,
        Commands::Init => {
            let path = config::create_default_config();
            println!("Created config at {}", path.display());
            println!("Edit it to set your default roster and rule configuration.");
        }
    }
}

/// Log to stderr. `RUST_LOG` wins over the `--verbose` default.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

/// Apply CLI overrides on top of the rule configuration from the config file.
fn resolve_rules(args: &SimulateArgs, base: Option<RuleConfig>) -> RuleConfig {
    let mut rules = base.unwrap_or_default();

    match args.algorithm.as_deref() {
        None => {}
        Some("urnings1") => rules.algorithm = Algorithm::Urnings1,
        Some("urnings2") => rules.algorithm = Algorithm::Urnings2,
        Some(other) => bail(format!("Unknown algorithm \"{other}\". Use \"urnings1\" or \"urnings2\".")),
    }
    match args.sampler.as_deref() {
        None => {}
        Some("exact") => rules.sampler = ComparisonSampler::Exact,
        Some("rejection") => rules.sampler = ComparisonSampler::Rejection,
        Some(other) => bail(format!("Unknown sampler \"{other}\". Use \"exact\" or \"rejection\".")),
    }
    if args.adaptive {
        rules.adaptivity = Adaptivity::Adaptive;
    }
    if args.paired_update {
        rules.paired_update = true;
    }
    if let (Some(min_urn), Some(max_urn)) = (args.min_urn, args.max_urn) {
        rules.urn_adaptation = UrnAdaptation::second_order(min_urn, max_urn);
    }
    if let Some(window) = args.window {
        rules.window = window;
    }

    rules
        .validate()
        .unwrap_or_else(|e| bail(format!("{e}")));
    rules
}

/// One independent run: roster and session seeded from the same stream.
fn run_replication(
    replication: usize,
    seed: Option<u64>,
    spec: RosterSpec,
    rules: RuleConfig,
    games: usize,
    mode: PlayMode,
) -> Result<ReplicationSummary, UrningsError> {
    let mut rng = match seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_os_rng(),
    };
    let (players, items) = roster::generate(&spec, &mut rng)?;
    let mut session = Session::new(players, items, rules, Some(rng.random()))?;
    session.play(games, mode);
    Ok(ReplicationSummary::from_session(replication, &session))
}

async fn run_simulate(args: SimulateArgs) {
    init_tracing(args.verbose);

    // Load config file, merge with CLI args (CLI wins)
    let config_path = args.config.clone().unwrap_or_else(config::config_path);
    let cfg = config::load_config(&config_path);

    let spec = RosterSpec {
        players: args.players.or(cfg.players).unwrap_or(100),
        items: args.items.or(cfg.items).unwrap_or(200),
        player_urn: args.player_urn.or(cfg.player_urn).unwrap_or(16),
        item_urn: args.item_urn.or(cfg.item_urn).unwrap_or(16),
    };
    if spec.players == 0 || spec.items == 0 {
        bail("Need at least one player and one item");
    }
    let games = args.games.or(cfg.games).unwrap_or(10_000);
    let replications = args.replications.or(cfg.replications).unwrap_or(1).max(1);
    let concurrency = args.concurrency.or(cfg.concurrency).unwrap_or(4).max(1);
    let mode = if args.test_mode { PlayMode::Test } else { PlayMode::Random };
    let rules = resolve_rules(&args, cfg.rules);

    tracing::debug!(?rules, ?spec, games, replications, "resolved configuration");
    if args.verbose {
        eprintln!(
            "Simulating {} players x {} items, {} {} per replication, {} replication(s)",
            spec.players,
            spec.items,
            games,
            if args.test_mode { "rounds" } else { "matches" },
            replications,
        );
    }

    // Replications share nothing; run them on the blocking pool with bounded concurrency
    let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency));
    let mut handles = Vec::with_capacity(replications);

    for replication in 0..replications {
        let sem = semaphore.clone();
        let seed = args.seed.map(|s| s.wrapping_add(replication as u64));

        let handle = tokio::spawn(async move {
            let _permit = sem
                .acquire()
                .await
                .unwrap_or_else(|_| bail("Replication pool closed unexpectedly"));
            tokio::task::spawn_blocking(move || run_replication(replication, seed, spec, rules, games, mode)).await
        });
        handles.push(handle);
    }

    let mut summaries = Vec::with_capacity(replications);
    for handle in handles {
        match handle.await {
            Ok(Ok(Ok(summary))) => {
                if args.verbose {
                    eprintln!(
                        "  Replication {} done: {} matches, player MAE {:.4}",
                        summary.replication + 1,
                        summary.matches,
                        summary.player_mae,
                    );
                }
                summaries.push(summary);
            }
            Ok(Ok(Err(e))) => bail(e),
            Ok(Err(e)) | Err(e) => bail(format!("Replication task panicked: {e}")),
        }
    }

    if args.json {
        output::print_json(&summaries, &rules);
    } else {
        output::print_table(&summaries, &rules);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> SimulateArgs {
        let mut argv = vec!["urnings", "simulate"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Simulate(args) => args,
            Commands::Init => panic!("expected simulate"),
        }
    }

    #[test]
    fn test_cli_overrides_config_rules() {
        let base = RuleConfig { window: 6, ..RuleConfig::default() };
        let rules = resolve_rules(
            &args(&["--algorithm", "urnings2", "--adaptive", "--min-urn", "8", "--max-urn", "64"]),
            Some(base),
        );
        assert_eq!(rules.algorithm, Algorithm::Urnings2);
        assert_eq!(rules.adaptivity, Adaptivity::Adaptive);
        assert_eq!(rules.urn_adaptation, UrnAdaptation::second_order(8, 64));
        assert_eq!(rules.window, 6);
        assert!(!rules.paired_update);
    }

    #[test]
    fn test_min_urn_requires_max_urn() {
        assert!(Cli::try_parse_from(["urnings", "simulate", "--min-urn", "8"]).is_err());
    }

    #[test]
    fn test_replication_is_reproducible() {
        let spec = RosterSpec { players: 4, items: 6, player_urn: 8, item_urn: 8 };
        let run = || run_replication(0, Some(11), spec, RuleConfig::default(), 200, PlayMode::Random).unwrap();
        let (a, b) = (run(), run());
        assert_eq!(a.matches, 200);
        assert_eq!(a.player_mae, b.player_mae);
        assert_eq!(a.item_green_drift, b.item_green_drift);
        assert_eq!(a.acceptance_rate, b.acceptance_rate);
    }
}
