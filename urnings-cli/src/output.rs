/// Output formatting: terminal table and JSON.
use serde::Serialize;
use urnings_core::{autocorrelation, RuleConfig, Session};

/// End-of-run numbers for one replication.
#[derive(Debug, Clone, Serialize)]
pub struct ReplicationSummary {
    pub replication: usize,
    pub matches: usize,
    pub acceptance_rate: f64,
    /// Mean |estimate - true value| over players.
    pub player_mae: f64,
    pub player_rmse: f64,
    /// Mean |estimate - true value| over items.
    pub item_mae: f64,
    pub item_green_drift: i64,
    pub mean_player_urn: f64,
    /// Mean lag-1 autocorrelation of player estimate series (players with a
    /// constant series are skipped).
    pub estimate_autocorrelation: Option<f64>,
}

impl ReplicationSummary {
    pub fn from_session(replication: usize, session: &Session) -> Self {
        let players = session.players();
        let items = session.items();

        let player_errors: Vec<f64> = players.iter().map(|p| p.estimate() - p.true_value()).collect();
        let player_mae = mean(player_errors.iter().map(|e| e.abs()));
        let player_rmse = mean(player_errors.iter().map(|e| e * e)).sqrt();
        let item_mae = mean(items.iter().map(|it| (it.estimate() - it.true_value()).abs()));

        let estimate_autocorrelation =
            mean_autocorrelation(players.iter().map(|p| p.history().estimates.as_slice()));

        let matches = session.matches_played();
        ReplicationSummary {
            replication,
            matches,
            acceptance_rate: if matches == 0 { 0.0 } else { session.accepted_matches() as f64 / matches as f64 },
            player_mae,
            player_rmse,
            item_mae,
            item_green_drift: session.ledger().item_drift(),
            mean_player_urn: mean(players.iter().map(|p| p.urn_size() as f64)),
            estimate_autocorrelation,
        }
    }
}

/// Mean lag-1 autocorrelation over the series that have one.
fn mean_autocorrelation<'a>(series: impl Iterator<Item = &'a [f64]>) -> Option<f64> {
    let correlations: Vec<f64> = series.filter_map(|s| autocorrelation(s, 1)).collect();
    (!correlations.is_empty()).then(|| mean(correlations.iter().copied()))
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    rules: &'a RuleConfig,
    replications: &'a [ReplicationSummary],
}

/// Print results as a formatted terminal table.
pub fn print_table(summaries: &[ReplicationSummary], rules: &RuleConfig) {
    println!("   # |   Matches | Accept |  Player MAE | Player RMSE |  Item MAE | Item drift | Mean urn |  ACF(1)");
    println!("-----|-----------|--------|-------------|-------------|-----------|------------|----------|--------");

    for s in summaries {
        let acf = s
            .estimate_autocorrelation
            .map(|r| format!("{r:>7.3}"))
            .unwrap_or_else(|| format!("{:>7}", "-"));
        println!(
            "{:>4} | {:>9} | {:>6.3} | {:>11.4} | {:>11.4} | {:>9.4} | {:>10} | {:>8.1} | {}",
            s.replication + 1,
            s.matches,
            s.acceptance_rate,
            s.player_mae,
            s.player_rmse,
            s.item_mae,
            s.item_green_drift,
            s.mean_player_urn,
            acf,
        );
    }

    if summaries.len() > 1 {
        let avg = |f: fn(&ReplicationSummary) -> f64| mean(summaries.iter().map(f));
        println!(
            "\nMean over {} replications: player MAE {:.4}, player RMSE {:.4}, item MAE {:.4}",
            summaries.len(),
            avg(|s| s.player_mae),
            avg(|s| s.player_rmse),
            avg(|s| s.item_mae),
        );
    }
    println!(
        "Rules: {:?}, {:?}, paired update {}, urn adaptation {:?}",
        rules.algorithm,
        rules.adaptivity,
        if rules.paired_update { "on" } else { "off" },
        rules.urn_adaptation,
    );
}

/// Print results as JSON.
pub fn print_json(summaries: &[ReplicationSummary], rules: &RuleConfig) {
    let output = JsonOutput { rules, replications: summaries };
    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{json}"),
        Err(e) => crate::bail(format!("Failed to serialize results: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use urnings_core::{Entity, PlayMode};

    fn session(players: usize, urn: u32, seed: u64) -> Session {
        let players = (0..players)
            .map(|i| Entity::new(i as i64, urn * 3 / 10, urn, 0.3 + 0.1 * i as f64).unwrap())
            .collect();
        let items = (0..4)
            .map(|i| Entity::new(100 + i, urn / 2, urn, 0.2 + 0.2 * i as f64).unwrap())
            .collect();
        Session::new(players, items, RuleConfig::default(), Some(seed)).unwrap()
    }

    #[test]
    fn test_constant_estimates_are_skipped() {
        let constant = vec![0.3; 40];
        let alternating: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 0.4 } else { 0.6 }).collect();

        assert_eq!(mean_autocorrelation([constant.as_slice()].into_iter()), None);
        let r = mean_autocorrelation([constant.as_slice(), alternating.as_slice()].into_iter()).unwrap();
        assert!((r + 0.99).abs() < 1e-9, "constant series leaked into the mean: {r}");
    }

    #[test]
    fn test_summary_without_matches_has_no_autocorrelation() {
        let summary = ReplicationSummary::from_session(0, &session(3, 10, 5));
        assert_eq!(summary.matches, 0);
        assert_eq!(summary.acceptance_rate, 0.0);
        assert_eq!(summary.estimate_autocorrelation, None);
        assert_eq!(summary.mean_player_urn, 10.0);
    }

    #[test]
    fn test_summary_after_play() {
        let mut session = session(2, 10, 6);
        session.play(2000, PlayMode::Random);
        let summary = ReplicationSummary::from_session(1, &session);
        assert_eq!(summary.replication, 1);
        assert_eq!(summary.matches, 2000);
        assert!(summary.acceptance_rate > 0.0 && summary.acceptance_rate <= 1.0);
        let r = summary.estimate_autocorrelation.unwrap();
        assert!((-1.0..=1.0).contains(&r), "{r}");
    }
}
