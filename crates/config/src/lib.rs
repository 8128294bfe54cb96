//! Configuration loading and validation for lectern.
//!
//! Three layers, later ones winning: built-in defaults, an optional
//! `lectern.toml` next to the working directory, then `LECTERN_*`
//! environment variables (double underscore separating sections, e.g.
//! `LECTERN_QUEUE__MAX_RETRIES=5`).

use derive_more::{Display, Error as DeriveError};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, DeriveError)]
pub enum ErrorKind {
    #[display("failed to load configuration")]
    Load,
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] &'static str),
}

/// Default file name probed in the working directory.
const CONFIG_FILE: &str = "lectern.toml";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub cache: CacheSection,
    pub queue: QueueSection,
    pub sync: SyncSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    /// Location of the SQLite cache database.
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueSection {
    /// Retry bound before a pending operation is dead-lettered.
    pub max_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSection {
    /// Whether an offline→online transition triggers a queue drain.
    pub replay_on_connect: bool,
}

impl Default for CacheSection {
    fn default() -> Self {
        // Platform data dir when resolvable, working directory otherwise
        // (containers without $HOME).
        let base = directories::ProjectDirs::from("", "", "lectern")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Self { db_path: base.join("cache.db") }
    }
}

impl Default for QueueSection {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

impl Default for SyncSection {
    fn default() -> Self {
        Self { replay_on_connect: true }
    }
}

impl Config {
    /// Load configuration from defaults, `lectern.toml`, and environment.
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment(Path::new(CONFIG_FILE)))
    }

    /// Load with an explicit configuration file path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_figment(Self::figment(path.as_ref()))
    }

    fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("LECTERN_").split("__"))
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        debug!(db_path = %config.cache.db_path.display(), "configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.queue.max_retries == 0 {
            exn::bail!(ErrorKind::Invalid("queue.max_retries must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.queue.max_retries, 3);
        assert!(config.sync.replay_on_connect);
        assert!(config.cache.db_path.ends_with("cache.db"));
    }

    #[test]
    fn test_file_and_env_layering() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "lectern.toml",
                r#"
                    [queue]
                    max_retries = 5

                    [cache]
                    db_path = "from-file.db"
                "#,
            )?;
            jail.set_env("LECTERN_QUEUE__MAX_RETRIES", "7");
            let config = Config::load().expect("load");
            // Env wins over file, file wins over defaults.
            assert_eq!(config.queue.max_retries, 7);
            assert_eq!(config.cache.db_path, PathBuf::from("from-file.db"));
            assert!(config.sync.replay_on_connect);
            Ok(())
        });
    }

    #[test]
    fn test_zero_retries_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("LECTERN_QUEUE__MAX_RETRIES", "0");
            let err = Config::load().expect_err("zero retries must not validate");
            assert!(matches!(&*err, ErrorKind::Invalid(_)));
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load_from("does-not-exist.toml").expect("load");
            assert_eq!(config, Config::default());
            Ok(())
        });
    }
}
