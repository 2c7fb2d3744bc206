//! Wiring for the `biomap` binary: configuration, store and engine
//! construction, curator resolution and the HTTP router.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::{Context as _, bail};
use axum::Router;
use biomap_api::ApiState;
use biomap_core::{
  CurationEngine,
  registry::{EmptyRegistry, IdentifierRegistry, PatternRegistry},
};
use biomap_store_tsv::{TsvStore, curators::CURATORS_FILE, load_curators};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from `biomap.toml` and `BIOMAP_*`
/// environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:            String,
  #[serde(default = "default_port")]
  pub port:            u16,
  /// Directory holding the four store files.
  #[serde(default = "default_store_dir")]
  pub store_dir:       PathBuf,
  /// Defaults to `curators.tsv` inside `store_dir`.
  pub curators_path:   Option<PathBuf>,
  /// Provenance for reviews; looked up from the curators table when unset.
  pub curator:         Option<String>,
  /// JSON object of prefix to identifier pattern.
  pub registry_path:   Option<PathBuf>,
  #[serde(default = "default_lock_timeout_ms")]
  pub lock_timeout_ms: u64,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 5000 }

fn default_store_dir() -> PathBuf { PathBuf::from("data") }

fn default_lock_timeout_ms() -> u64 { 5_000 }

impl ServerConfig {
  pub fn store_dir(&self) -> PathBuf { expand_tilde(&self.store_dir) }

  pub fn curators_path(&self) -> PathBuf {
    match &self.curators_path {
      Some(path) => expand_tilde(path),
      None => self.store_dir().join(CURATORS_FILE),
    }
  }

  pub fn lock_timeout(&self) -> Duration { Duration::from_millis(self.lock_timeout_ms) }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Construction ────────────────────────────────────────────────────────────

pub fn load_registry(config: &ServerConfig) -> anyhow::Result<Arc<dyn IdentifierRegistry>> {
  let Some(path) = &config.registry_path else {
    return Ok(Arc::new(EmptyRegistry));
  };
  let path = expand_tilde(path);
  let json = std::fs::read_to_string(&path)
    .with_context(|| format!("failed to read registry at {}", path.display()))?;
  let registry = PatternRegistry::from_json(&json)
    .with_context(|| format!("invalid registry at {}", path.display()))?;
  tracing::info!(prefixes = registry.len(), "loaded identifier registry");
  Ok(Arc::new(registry))
}

pub fn open_engine(config: &ServerConfig) -> anyhow::Result<CurationEngine<TsvStore>> {
  let dir = config.store_dir();
  let registry = load_registry(config)?;
  let mut store = TsvStore::open(&dir)
    .with_context(|| format!("failed to open store at {}", dir.display()))?
    .with_lock_timeout(config.lock_timeout());
  if config.registry_path.is_some() {
    store = store.with_registry(Arc::clone(&registry));
  }
  Ok(CurationEngine::new(store).with_registry(registry))
}

/// The configured curator, else the curators table entry for `user`.
pub fn resolve_curator(config: &ServerConfig, user: Option<&str>) -> anyhow::Result<String> {
  if let Some(curator) = &config.curator {
    return Ok(curator.clone());
  }
  let Some(user) = user else {
    bail!("no curator configured and no user name to look one up");
  };
  let path = config.curators_path();
  let curators = load_curators(&path)
    .with_context(|| format!("failed to read curators from {}", path.display()))?;
  match curators.lookup(user) {
    Some(entry) => Ok(entry.curie()),
    None => bail!("user {user:?} is not listed in {}", path.display()),
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

pub fn router(state: ApiState<TsvStore>) -> Router {
  biomap_api::api_router(state).layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use config::{Config, File, FileFormat};
  use tempfile::TempDir;

  use super::*;

  fn parse(toml: &str) -> ServerConfig {
    Config::builder()
      .add_source(File::from_str(toml, FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn defaults_fill_missing_keys() {
    let config = parse("");
    assert_eq!(config.address(), "127.0.0.1:5000");
    assert_eq!(config.store_dir(), PathBuf::from("data"));
    assert_eq!(config.curators_path(), PathBuf::from("data").join(CURATORS_FILE));
    assert_eq!(config.lock_timeout(), Duration::from_secs(5));
  }

  #[test]
  fn explicit_curator_wins() {
    let config = parse(r#"curator = "orcid:0000-0000-0000-0001""#);
    assert_eq!(resolve_curator(&config, None).unwrap(), "orcid:0000-0000-0000-0001");
  }

  #[test]
  fn curator_looked_up_by_user() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
      dir.path().join(CURATORS_FILE),
      "user\torcid\tname\nalice\t0000-0000-0000-0042\tAlice\n",
    )
    .unwrap();
    let config = parse(&format!("store_dir = {:?}", dir.path().display().to_string()));

    assert_eq!(resolve_curator(&config, Some("alice")).unwrap(), "orcid:0000-0000-0000-0042");
    assert!(resolve_curator(&config, Some("bob")).is_err());
    assert!(resolve_curator(&config, None).is_err());
  }

  #[test]
  fn engine_opens_store_directory() {
    let dir = TempDir::new().unwrap();
    let config = parse(&format!("store_dir = {:?}", dir.path().display().to_string()));
    let engine = open_engine(&config).unwrap();
    assert!(engine.check().unwrap().is_empty());
    assert!(dir.path().join("predictions.tsv").exists());
  }

  #[test]
  fn configured_registry_reaches_the_store() {
    let dir = TempDir::new().unwrap();
    let registry = dir.path().join("registry.json");
    std::fs::write(&registry, r#"{ "mesh": "^[CD]\\d+$" }"#).unwrap();
    let store_dir = dir.path().join("data");

    let config = parse(&format!(
      "store_dir = {:?}\nregistry_path = {:?}",
      store_dir.display().to_string(),
      registry.display().to_string(),
    ));
    let engine = open_engine(&config).unwrap();
    let loaded = engine.store().registry().unwrap();
    assert!(loaded.knows("mesh"));
    assert!(!loaded.knows("chebi"));

    let config = parse(&format!("store_dir = {:?}", store_dir.display().to_string()));
    assert!(open_engine(&config).unwrap().store().registry().is_none());
  }

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/maps")), PathBuf::from(home).join("maps"));
    assert_eq!(expand_tilde(Path::new("/abs")), PathBuf::from("/abs"));
  }
}
