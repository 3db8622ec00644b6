/// Config file loading and creation for the urnings CLI.
///
/// Config lives at ~/.config/urnings/config.toml.
/// All fields are optional; CLI args override config values.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use urnings_core::RuleConfig;

use crate::bail;

#[derive(Debug, Deserialize, Default)]
pub struct UrningsConfig {
    pub players: Option<usize>,
    pub items: Option<usize>,
    pub player_urn: Option<u32>,
    pub item_urn: Option<u32>,
    pub games: Option<usize>,
    pub replications: Option<usize>,
    pub concurrency: Option<usize>,
    /// Full rule configuration; missing keys take their defaults.
    pub rules: Option<RuleConfig>,
}

const DEFAULT_CONFIG_TEMPLATE: &str = "\
# urnings configuration
# All values here can be overridden by CLI flags.

# Roster size and urn capacities
# players = 100
# items = 200
# player_urn = 16
# item_urn = 16

# Iterations per replication (matches in random mode, rounds in test mode)
# games = 10000

# Independent replications and how many run at once
# replications = 1
# concurrency = 4

# Rule configuration. Every key is optional.
# [rules]
# algorithm = \"urnings1\"          # or \"urnings2\"
# adaptivity = \"non-adaptive\"     # or \"adaptive\"
# paired_update = false
# window = 2
# sampler = \"exact\"               # or \"rejection\"
#
# [rules.urn_adaptation]
# mode = \"second-order\"           # off | permutation | second-order |
#                                 # stakes-permutation | stakes-second-order | fixed-stakes
# control_draws = 3
# bounds = { min_urn = 8, max_urn = 64 }
";

/// Returns the default config path: ~/.config/urnings/config.toml
pub fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| bail("HOME environment variable not set"));
    PathBuf::from(home).join(".config").join("urnings").join("config.toml")
}

pub fn parse_config(content: &str) -> Result<UrningsConfig, toml::de::Error> {
    toml::from_str(content)
}

/// Load config from a file path. Returns default (all None) if file doesn't exist.
pub fn load_config(path: &Path) -> UrningsConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content)
            .unwrap_or_else(|e| bail(format!("Failed to parse config at {}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => UrningsConfig::default(),
        Err(e) => bail(format!("Failed to read config at {}: {e}", path.display())),
    }
}

/// Create the default config file. Errors if it already exists.
pub fn create_default_config() -> PathBuf {
    let path = config_path();

    if path.exists() {
        bail(format!("Config file already exists at {}", path.display()));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .unwrap_or_else(|e| bail(format!("Failed to create directory {}: {e}", parent.display())));
    }

    std::fs::write(&path, DEFAULT_CONFIG_TEMPLATE)
        .unwrap_or_else(|e| bail(format!("Failed to write config to {}: {e}", path.display())));

    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use urnings_core::{Adaptivity, Algorithm, ChangeTest, ComparisonSampler, UrnAdaptation, UrnBounds};

    #[test]
    fn test_template_parses_to_defaults() {
        let cfg = parse_config(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert!(cfg.players.is_none());
        assert!(cfg.rules.is_none());
    }

    #[test]
    fn test_partial_rules_table() {
        let cfg = parse_config(
            r#"
            players = 50
            games = 2000

            [rules]
            algorithm = "urnings2"
            paired_update = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.players, Some(50));
        assert_eq!(cfg.games, Some(2000));
        let rules = cfg.rules.unwrap();
        assert_eq!(rules.algorithm, Algorithm::Urnings2);
        assert!(rules.paired_update);
        assert_eq!(rules.adaptivity, Adaptivity::NonAdaptive);
        assert_eq!(rules.window, 2);
        assert_eq!(rules.sampler, ComparisonSampler::Exact);
    }

    #[test]
    fn test_urn_adaptation_modes() {
        let cfg = parse_config(
            r#"
            [rules]
            adaptivity = "adaptive"
            window = 4
            sampler = "rejection"

            [rules.urn_adaptation]
            mode = "second-order"
            control_draws = 5
            bounds = { min_urn = 8, max_urn = 64 }
            "#,
        )
        .unwrap();
        let rules = cfg.rules.unwrap();
        assert_eq!(rules.sampler, ComparisonSampler::Rejection);
        assert_eq!(
            rules.urn_adaptation,
            UrnAdaptation::SecondOrder { bounds: UrnBounds { min_urn: 8, max_urn: 64 }, control_draws: 5 }
        );

        let cfg = parse_config(
            r#"
            [rules.urn_adaptation]
            mode = "permutation"
            bounds = { min_urn = 10, max_urn = 40 }
            test = { kind = "streak", bound = 4, freq_change = 20 }
            "#,
        )
        .unwrap();
        assert_eq!(
            cfg.rules.unwrap().urn_adaptation,
            UrnAdaptation::Permutation {
                bounds: UrnBounds { min_urn: 10, max_urn: 40 },
                test: ChangeTest::Streak { bound: 4, freq_change: 20 },
            }
        );
    }

    #[test]
    fn test_unknown_mode_is_an_error() {
        assert!(parse_config("[rules]\nalgorithm = \"urnings3\"\n").is_err());
        assert!(parse_config("[rules.urn_adaptation]\nmode = \"sideways\"\n").is_err());
    }
}
