use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    #[serde(default = "default_corpus_root")]
    pub root: PathBuf,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: default_corpus_root(),
        }
    }
}

fn default_corpus_root() -> PathBuf {
    PathBuf::from(".knowledge/corpus")
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_text_weight")]
    pub text_weight: f64,
    #[serde(default = "default_graph_weight")]
    pub graph_weight: f64,
    #[serde(default = "default_decay_boost_weight")]
    pub decay_boost_weight: f64,
    #[serde(default = "default_seed_count")]
    pub seed_count: usize,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_hops")]
    pub default_hops: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            text_weight: default_text_weight(),
            graph_weight: default_graph_weight(),
            decay_boost_weight: default_decay_boost_weight(),
            seed_count: default_seed_count(),
            default_limit: default_limit(),
            default_hops: default_hops(),
        }
    }
}

fn default_text_weight() -> f64 {
    0.7
}
fn default_graph_weight() -> f64 {
    0.3
}
fn default_decay_boost_weight() -> f64 {
    0.5
}
fn default_seed_count() -> usize {
    5
}
fn default_limit() -> usize {
    10
}
fn default_hops() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    #[serde(default = "default_external_ref_prefixes")]
    pub external_ref_prefixes: Vec<String>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            external_ref_prefixes: default_external_ref_prefixes(),
        }
    }
}

fn default_external_ref_prefixes() -> Vec<String> {
    vec!["REQ-".to_string()]
}

/// Loads configuration from a TOML file. A missing file yields the
/// defaults, so a cold checkout works without any setup.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate search weights
    for (name, value) in [
        ("search.text_weight", config.search.text_weight),
        ("search.graph_weight", config.search.graph_weight),
        ("search.decay_boost_weight", config.search.decay_boost_weight),
    ] {
        if !(0.0..=1.0).contains(&value) {
            anyhow::bail!("{} must be in [0.0, 1.0]", name);
        }
    }

    if config.search.default_limit < 1 {
        anyhow::bail!("search.default_limit must be >= 1");
    }

    if config.search.seed_count < 1 {
        anyhow::bail!("search.seed_count must be >= 1");
    }

    Ok(config)
}
