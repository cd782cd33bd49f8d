use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Maximum symbol length, including its terminator in the original C
/// struct (`char symbol[MAX_SYMBOL_LEN]` with `MAX_SYMBOL_LEN = 30`).
pub const MAX_SYMBOL_LEN: usize = 29;

// ------------------------------------------------------------
// Root configuration
// ------------------------------------------------------------
//
// Loaded once at startup from a JSON file (default `config.json`,
// overridable via the first CLI argument). There is no dynamic
// reconfiguration: the symbol table, provider endpoint, and output
// directory are fixed for the lifetime of the process.
//
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// WebSocket endpoint of the trade-data provider. TLS required.
    pub provider_url: String,

    /// Bearer token embedded in the connect path/query.
    ///
    /// NOTE: the original source hardcoded this in `create_client()`;
    /// loading it from config keeps a real credential out of the repo.
    pub provider_token: String,

    /// Symbols to subscribe to, in subscribe order. Subscribe frames are
    /// sent in this exact order on every `Established` transition.
    pub symbols: Vec<String>,

    /// Directory for the per-run output files. Defaults to the working
    /// directory, matching the original's overwrite-in-cwd behavior.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Config {
    /// Reads and validates the config file at `path`.
    ///
    /// Any I/O, parse, or validation failure here is fatal: the caller
    /// is expected to log the error and exit with a nonzero status.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let cfg: Config = serde_json::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.provider_url.is_empty() {
            bail!("config: provider_url must not be empty");
        }
        if self.symbols.is_empty() {
            bail!("config: symbols must not be empty");
        }
        for s in &self.symbols {
            if s.is_empty() {
                bail!("config: symbols must not contain an empty entry");
            }
            if s.len() > MAX_SYMBOL_LEN {
                bail!(
                    "config: symbol '{}' exceeds the {}-byte limit",
                    s,
                    MAX_SYMBOL_LEN
                );
            }
        }
        Ok(())
    }
}
