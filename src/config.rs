use std::collections::HashMap;

// layered settings: an optional file, then the environment
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::error::Result;
use crate::model::ModelConfig;

pub const ENV_PREFIX: &str = "TRIPLEBIND";

/// Where committed statements end up besides the in-memory store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
    /// Nothing outlives the process.
    #[default]
    InMemory,
    /// A SQLite file that every autosaved commit is written to, restored on open.
    File(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub persistence: PersistenceMode,
    pub log_filter: String,
    pub models: Vec<ModelConfig>,
    /// Model name to the graph its instances are stored in.
    pub type_graphs: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            persistence: PersistenceMode::InMemory,
            log_filter: "info".into(),
            models: Vec::new(),
            type_graphs: HashMap::new(),
        }
    }
}

impl Settings {
    /// Reads the settings from `path` (when given and present), overridden by
    /// `TRIPLEBIND_*` environment variables, with `__` separating nested keys.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        let settings = builder
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

/// Installs the global fmt subscriber. `RUST_LOG` wins over `filter`.
/// Returns false if a subscriber was already installed.
pub fn init_tracing(filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
