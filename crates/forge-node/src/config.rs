//! TOML node configuration.

use std::path::Path;

use forge_engine::container::MatchConfig;
use serde::Deserialize;

/// On-disk node configuration, loaded once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Human-readable node identity reported in logs and heartbeats.
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Consecutive `onTick` failures before a module's logic unit is
    /// poisoned for the rest of a match. `null`/absent means never poison.
    #[serde(default)]
    pub poison_after: Option<u32>,

    /// Upper bound on containers this node will host at once.
    #[serde(default = "default_max_containers")]
    pub max_containers: usize,

    #[serde(default)]
    pub default_match: MatchDefaults,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchDefaults {
    pub max_entities: usize,
    pub max_components: usize,
    pub max_commands_per_tick: usize,
    pub max_snapshots: usize,
}

impl Default for MatchDefaults {
    fn default() -> Self {
        let d = MatchConfig::default();
        Self {
            max_entities: d.max_entities,
            max_components: d.max_components,
            max_commands_per_tick: d.max_commands_per_tick,
            max_snapshots: d.max_snapshots,
        }
    }
}

impl From<MatchDefaults> for MatchConfig {
    fn from(d: MatchDefaults) -> Self {
        MatchConfig {
            max_entities: d.max_entities,
            max_components: d.max_components,
            max_commands_per_tick: d.max_commands_per_tick,
            max_snapshots: d.max_snapshots,
        }
    }
}

fn default_node_id() -> String {
    "forge-node".to_owned()
}

fn default_max_containers() -> usize {
    8
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            poison_after: None,
            max_containers: default_max_containers(),
            default_match: MatchDefaults::default(),
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config '{}': {e}", path.display()))?;
        toml::from_str(&text).map_err(|e| anyhow::anyhow!("failed to parse config '{}': {e}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_match_config_defaults() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.node_id, "forge-node");
        assert_eq!(cfg.max_containers, 8);
        assert_eq!(cfg.default_match.max_entities, MatchConfig::default().max_entities);
    }

    #[test]
    fn parses_a_minimal_toml_document() {
        let parsed: NodeConfig = toml::from_str(
            r#"
            node_id = "node-a"
            poison_after = 5
            "#,
        )
        .unwrap();
        assert_eq!(parsed.node_id, "node-a");
        assert_eq!(parsed.poison_after, Some(5));
    }
}
