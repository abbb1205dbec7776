use std::fs;
use std::path::Path;

use anyhow::{Context as AnyhowContext, Result};
use serde::Deserialize;

/// Tracker tuning knobs. Passed explicitly to the constructor; there is
/// no global configuration state.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Search-window padding as a fraction of the tracked rectangle's
    /// size, applied per side.
    pub window_padding: f64,

    /// Side length of the square optical-flow integration window, odd.
    pub flow_win_size: usize,

    /// Squared descriptor distance above which a nearest-neighbor match
    /// is rejected.
    pub match_max_dist_sq: f64,

    /// Squared descriptor distance below which a match overrides the
    /// flow estimate instead of blending with it.
    pub match_strong_dist_sq: f64,

    /// Leaf-examination budget for best-bin-first k-d tree queries.
    /// Queries are exact when this reaches the template size.
    pub bbf_max_checks: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            window_padding: 0.5,
            flow_win_size: 7,
            match_max_dist_sq: 0.25,
            match_strong_dist_sq: 0.1,
            bbf_max_checks: 200,
        }
    }
}

impl Config {
    /// Load from a JSON file; absent fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{"window_padding": 0.25}"#).unwrap();
        assert_eq!(config.window_padding, 0.25);
        assert_eq!(config.flow_win_size, Config::default().flow_win_size);
        assert_eq!(config.bbf_max_checks, Config::default().bbf_max_checks);
    }
}
