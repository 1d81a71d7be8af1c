//! Runtime configuration for the `terrace` binary.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Deserialised from an optional TOML file layered under `TERRACE_*`
/// environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReconcileConfig {
  /// SQLite database file. A leading `~/` is expanded.
  pub store_path: PathBuf,
  /// Reconcile independent entity types concurrently.
  pub parallel:   bool,
}

impl ReconcileConfig {
  pub fn load(file: &Path) -> Result<Self, config::ConfigError> {
    let settings = config::Config::builder()
      .set_default("store_path", "terrace.db")?
      .set_default("parallel", true)?
      .add_source(config::File::from(file).required(false))
      .add_source(config::Environment::with_prefix("TERRACE"))
      .build()?;

    let mut cfg: Self = settings.try_deserialize()?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }
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

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_falls_back_to_defaults() {
    let absent = std::env::temp_dir().join(format!("terrace-{}.toml", uuid::Uuid::new_v4()));
    let cfg = ReconcileConfig::load(&absent).unwrap();
    assert!(cfg.parallel);
  }

  #[test]
  fn file_values_are_read() {
    let path = std::env::temp_dir().join(format!("terrace-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(&path, "store_path = \"/var/lib/terrace/wh.db\"\nparallel = false\n").unwrap();
    let cfg = ReconcileConfig::load(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert!(!cfg.parallel);
  }

  #[test]
  fn only_a_leading_tilde_expands() {
    let plain = Path::new("/data/~/wh.db");
    assert_eq!(expand_tilde(plain), plain);
    if let Ok(home) = std::env::var("HOME") {
      assert_eq!(expand_tilde(Path::new("~/wh.db")), PathBuf::from(home).join("wh.db"));
    }
  }
}
