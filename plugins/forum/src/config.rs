use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

use crate::settings::Setting;

/// Command line options for the plugin.
#[derive(Parser, Debug, Default)]
pub struct Cli {
    /// Run with stdio protocol used by the core.
    #[arg(long)]
    pub stdio: bool,
    /// Override the SQLite database path.
    #[arg(long)]
    pub database: Option<PathBuf>,
    /// Enable or disable logging (true/false).
    #[arg(long)]
    pub logging: Option<bool>,
    /// Path to configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Runtime configuration resolved from file, env and CLI.
#[derive(Clone, Debug)]
pub struct Config {
    pub database: PathBuf,
    /// Connections kept by the r2d2 pool.
    pub pool_size: u32,
    /// Whether verbose logging is enabled.
    pub logging_enabled: bool,
    /// Settings written when the database is first created.
    pub defaults: Setting,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    database: FileDatabase,
    #[serde(default)]
    logging: FileLogging,
    #[serde(default)]
    defaults: FileDefaults,
}

#[derive(Deserialize)]
struct FileDatabase {
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default = "default_pool_size")]
    pool_size: u32,
}

#[derive(Deserialize)]
struct FileLogging {
    #[serde(default = "default_logging")]
    enabled: bool,
}

#[derive(Deserialize, Default)]
struct FileDefaults {
    messages_per_page: Option<i64>,
    topics_per_page: Option<i64>,
    user_signature_length: Option<i64>,
}

fn default_pool_size() -> u32 {
    4
}

fn default_logging() -> bool {
    true
}

impl Default for FileDatabase {
    fn default() -> Self {
        Self {
            path: None,
            pool_size: default_pool_size(),
        }
    }
}

impl Default for FileLogging {
    fn default() -> Self {
        Self {
            enabled: default_logging(),
        }
    }
}

impl Config {
    /// Resolve configuration from CLI, environment variables, config file and defaults.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut database: Option<PathBuf> = None;
        let mut pool_size = default_pool_size();
        let mut logging = default_logging();
        let mut defaults = Setting::default();

        // config file path precedence: CLI -> ENV -> default
        let config_path = cli
            .config
            .clone()
            .or_else(|| std::env::var("FORUM_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config/forum.toml"));

        if let Ok(bytes) = fs::read(&config_path) {
            let contents = String::from_utf8_lossy(&bytes);
            let file_cfg: FileConfig = toml::from_str(&contents).context("invalid config file")?;
            database = file_cfg.database.path;
            pool_size = file_cfg.database.pool_size;
            logging = file_cfg.logging.enabled;
            let d = file_cfg.defaults;
            defaults = Setting {
                messages_per_page: d.messages_per_page.unwrap_or(defaults.messages_per_page),
                topics_per_page: d.topics_per_page.unwrap_or(defaults.topics_per_page),
                user_signature_length: d
                    .user_signature_length
                    .unwrap_or(defaults.user_signature_length),
            };
        }

        // environment overrides
        if let Ok(p) = std::env::var("FORUM_DATABASE") {
            database = Some(PathBuf::from(p));
        }
        if let Ok(l) = std::env::var("FORUM_LOGGING") {
            if let Ok(l) = l.parse::<bool>() {
                logging = l;
            }
        }

        // CLI overrides
        if let Some(p) = &cli.database {
            database = Some(p.clone());
        }
        if let Some(l) = cli.logging {
            logging = l;
        }

        if pool_size == 0 {
            anyhow::bail!("invalid_pool_size");
        }
        defaults.validate().context("invalid [defaults] section")?;

        let database = database.unwrap_or_else(|| {
            let data_dir = std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_data_dir());
            data_dir.join("forum.sqlite3")
        });

        Ok(Self {
            database,
            pool_size,
            logging_enabled: logging,
            defaults,
        })
    }
}

/// Determine the default data directory for the plugin.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PLUGIN_DATA_DIR") {
        PathBuf::from(dir)
    } else if let Ok(home) = std::env::var("HOME") {
        let mut p = PathBuf::from(home);
        p.push(".local/share/homecore/plugins/forum");
        p
    } else {
        PathBuf::from("./forum_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    fn clear_env() {
        std::env::remove_var("FORUM_DATABASE");
        std::env::remove_var("FORUM_LOGGING");
    }

    #[test]
    #[serial]
    fn valid_config_parses() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(
            &path,
            "[database]\npath=\"/tmp/f.db\"\npool_size=2\n[logging]\nenabled=false\n[defaults]\nmessages_per_page=20\n",
        )
        .unwrap();
        let cli = Cli {
            config: Some(path),
            ..Default::default()
        };
        let cfg = Config::load(&cli).unwrap();
        assert_eq!(cfg.database, PathBuf::from("/tmp/f.db"));
        assert_eq!(cfg.pool_size, 2);
        assert!(!cfg.logging_enabled);
        assert_eq!(cfg.defaults.messages_per_page, 20);
        assert_eq!(cfg.defaults.topics_per_page, 10);
    }

    #[test]
    #[serial]
    fn zero_page_size_fails() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(&path, "[defaults]\ntopics_per_page=0\n").unwrap();
        let cli = Cli {
            config: Some(path),
            ..Default::default()
        };
        assert!(Config::load(&cli).is_err());
    }

    #[test]
    #[serial]
    fn missing_keys_defaults() {
        clear_env();
        std::env::set_var("DATA_DIR", "/var/lib/forum");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(&path, "").unwrap();
        let cli = Cli {
            config: Some(path),
            ..Default::default()
        };
        let cfg = Config::load(&cli).unwrap();
        std::env::remove_var("DATA_DIR");
        assert_eq!(cfg.database, PathBuf::from("/var/lib/forum/forum.sqlite3"));
        assert_eq!(cfg.pool_size, 4);
        assert!(cfg.logging_enabled);
        assert_eq!(cfg.defaults, Setting::default());
    }

    #[test]
    #[serial]
    fn precedence_cli_env_file() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(&path, "[database]\npath=\"file.db\"\n").unwrap();
        std::env::set_var("FORUM_DATABASE", "env.db");
        let cli = Cli {
            config: Some(path.clone()),
            ..Default::default()
        };
        assert_eq!(Config::load(&cli).unwrap().database, PathBuf::from("env.db"));
        let cli = Cli {
            config: Some(path),
            database: Some(PathBuf::from("cli.db")),
            ..Default::default()
        };
        assert_eq!(Config::load(&cli).unwrap().database, PathBuf::from("cli.db"));
        std::env::remove_var("FORUM_DATABASE");
    }

    #[test]
    #[serial]
    fn logging_toggle() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(&path, "[logging]\nenabled=false\n").unwrap();
        std::env::set_var("FORUM_LOGGING", "true");
        let cli = Cli {
            config: Some(path),
            ..Default::default()
        };
        let cfg = Config::load(&cli).unwrap();
        std::env::remove_var("FORUM_LOGGING");
        assert!(cfg.logging_enabled);
    }
}
