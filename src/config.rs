use crate::models::container::check_container_name;
use clap::Parser;
use std::{env, path::PathBuf, time::Duration};
use thiserror::Error;

const ENV_PREFIX: &str = "FILES_UPLOADER_";
const MIN_SCAN_INTERVAL_MINUTES: u64 = 1;
const MAX_SCAN_INTERVAL_MINUTES: u64 = 60;
const DEFAULT_STORAGE_DIR: &str = "./data/objects";
const DEFAULT_DATABASE_URL: &str = "sqlite://./data/meta/files_uploader.db";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
///
/// Built once at startup and handed to the services by value; nothing inside
/// the scan loop reads the environment again.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub scan_interval_minutes: u64,
    pub scan_folder: PathBuf,
    pub container: String,
    pub storage_dir: String,
    pub database_url: String,
    pub max_files_to_store: Option<usize>,
    /// Settings that were neither passed nor set in the environment and fell
    /// back to a built-in default.
    pub defaulted: Vec<&'static str>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Drains a staging folder into an object store")]
pub struct Args {
    /// Minutes between scans, 1 to 60 (overrides FILES_UPLOADER_SCAN_INTERVAL_MINUTES)
    #[arg(long)]
    pub scan_interval_minutes: Option<u64>,

    /// Local staging folder to drain (overrides FILES_UPLOADER_SCAN_FOLDER)
    #[arg(long)]
    pub scan_folder: Option<PathBuf>,

    /// Target container (overrides FILES_UPLOADER_CONTAINER)
    #[arg(long)]
    pub container: Option<String>,

    /// Directory where object payloads are stored (overrides FILES_UPLOADER_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Metadata database URL (overrides FILES_UPLOADER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Objects kept per folder; unset disables retention (overrides FILES_UPLOADER_MAX_FILES_TO_STORE)
    #[arg(long)]
    pub max_files_to_store: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("setting `{name}` has invalid value `{value}`")]
    Invalid { name: &'static str, value: String },
    #[error("scan interval must be between 1 and 60 minutes, got {0}")]
    IntervalOutOfRange(u64),
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool), ConfigError> {
        let args = Args::parse();
        Self::resolve(args, |name| env::var(name).ok())
    }

    /// Merge parsed args over values produced by `lookup` and validate.
    ///
    /// `lookup` receives the unprefixed setting name (e.g. `CONTAINER`).
    pub fn resolve<F>(args: Args, lookup: F) -> Result<(Self, bool), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}")).filter(|value| !value.trim().is_empty())
        };

        let scan_interval_minutes = match args.scan_interval_minutes {
            Some(value) => value,
            None => parse_env(&lookup, "SCAN_INTERVAL_MINUTES")?
                .ok_or(ConfigError::Missing("scan_interval_minutes"))?,
        };
        let scan_folder = args
            .scan_folder
            .or_else(|| lookup("SCAN_FOLDER").map(PathBuf::from))
            .ok_or(ConfigError::Missing("scan_folder"))?;
        let container = args
            .container
            .or_else(|| lookup("CONTAINER"))
            .ok_or(ConfigError::Missing("container"))?;
        let max_files_to_store = match args.max_files_to_store {
            Some(value) => Some(value),
            None => parse_env(&lookup, "MAX_FILES_TO_STORE")?,
        };

        let mut defaulted = Vec::new();
        let mut or_default = |value: Option<String>, name: &'static str, default: &str| {
            value.unwrap_or_else(|| {
                defaulted.push(name);
                default.to_string()
            })
        };
        let storage_dir = or_default(
            args.storage_dir.or_else(|| lookup("STORAGE_DIR")),
            "storage_dir",
            DEFAULT_STORAGE_DIR,
        );
        let database_url = or_default(
            args.database_url.or_else(|| lookup("DATABASE_URL")),
            "database_url",
            DEFAULT_DATABASE_URL,
        );

        let cfg = Self {
            scan_interval_minutes,
            scan_folder,
            container,
            storage_dir,
            database_url,
            max_files_to_store,
            defaulted,
        };
        cfg.validate()?;

        Ok((cfg, args.migrate))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SCAN_INTERVAL_MINUTES..=MAX_SCAN_INTERVAL_MINUTES)
            .contains(&self.scan_interval_minutes)
        {
            return Err(ConfigError::IntervalOutOfRange(self.scan_interval_minutes));
        }
        if self.scan_folder.as_os_str().is_empty() {
            return Err(ConfigError::Missing("scan_folder"));
        }
        if self.container.trim().is_empty() {
            return Err(ConfigError::Missing("container"));
        }
        check_container_name(&self.container).map_err(|_| ConfigError::Invalid {
            name: "container",
            value: self.container.clone(),
        })?;
        if self.storage_dir.trim().is_empty() {
            return Err(ConfigError::Missing("storage_dir"));
        }
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Missing("database_url"));
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_minutes * 60)
    }
}

fn parse_env<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (format!("{ENV_PREFIX}{k}"), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn required_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("SCAN_INTERVAL_MINUTES", "5"),
            ("SCAN_FOLDER", "/var/spool/uploads"),
            ("CONTAINER", "photos"),
        ]
    }

    #[test]
    fn resolves_from_environment_with_defaults() {
        let (cfg, migrate) = AppConfig::resolve(Args::default(), env_of(&required_env())).unwrap();

        assert!(!migrate);
        assert_eq!(cfg.scan_interval_minutes, 5);
        assert_eq!(cfg.scan_folder, PathBuf::from("/var/spool/uploads"));
        assert_eq!(cfg.container, "photos");
        assert_eq!(cfg.storage_dir, "./data/objects");
        assert_eq!(cfg.max_files_to_store, None);
        assert_eq!(cfg.defaulted, ["storage_dir", "database_url"]);
        assert_eq!(cfg.scan_interval(), Duration::from_secs(300));
    }

    #[test]
    fn cli_overrides_environment() {
        let args = Args::try_parse_from([
            "files-uploader",
            "--scan-interval-minutes",
            "60",
            "--container",
            "archive",
            "--max-files-to-store",
            "10",
            "--migrate",
        ])
        .unwrap();

        let (cfg, migrate) = AppConfig::resolve(args, env_of(&required_env())).unwrap();

        assert!(migrate);
        assert_eq!(cfg.scan_interval_minutes, 60);
        assert_eq!(cfg.container, "archive");
        assert_eq!(cfg.max_files_to_store, Some(10));
    }

    #[test]
    fn explicit_storage_settings_are_not_reported_as_defaulted() {
        let mut env = required_env();
        env.push(("STORAGE_DIR", "/srv/objects"));
        let args =
            Args::try_parse_from(["files-uploader", "--database-url", "sqlite::memory:"]).unwrap();

        let (cfg, _) = AppConfig::resolve(args, env_of(&env)).unwrap();

        assert_eq!(cfg.storage_dir, "/srv/objects");
        assert_eq!(cfg.database_url, "sqlite::memory:");
        assert!(cfg.defaulted.is_empty());
    }

    #[test]
    fn container_name_the_store_would_reject_fails_at_startup() {
        for bad in ["My_Photos", "ab", "-photos"] {
            let mut env = required_env();
            env[2] = ("CONTAINER", bad);
            let err = AppConfig::resolve(Args::default(), env_of(&env)).unwrap_err();
            assert_eq!(
                err,
                ConfigError::Invalid {
                    name: "container",
                    value: bad.into()
                }
            );
        }
    }

    #[test]
    fn interval_outside_bounds_is_rejected() {
        for bad in ["0", "61"] {
            let mut env = required_env();
            env[0] = ("SCAN_INTERVAL_MINUTES", bad);
            let err = AppConfig::resolve(Args::default(), env_of(&env)).unwrap_err();
            assert_eq!(err, ConfigError::IntervalOutOfRange(bad.parse().unwrap()));
        }
    }

    #[test]
    fn missing_required_values_are_reported() {
        let err = AppConfig::resolve(
            Args::default(),
            env_of(&[("SCAN_INTERVAL_MINUTES", "1"), ("SCAN_FOLDER", "/tmp/x")]),
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("container"));

        let err = AppConfig::resolve(Args::default(), env_of(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("scan_interval_minutes"));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut env = required_env();
        env[2] = ("CONTAINER", "  ");
        let err = AppConfig::resolve(Args::default(), env_of(&env)).unwrap_err();
        assert_eq!(err, ConfigError::Missing("container"));
    }

    #[test]
    fn unparsable_numbers_are_invalid() {
        let mut env = required_env();
        env.push(("MAX_FILES_TO_STORE", "ten"));
        let err = AppConfig::resolve(Args::default(), env_of(&env)).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "MAX_FILES_TO_STORE",
                value: "ten".into()
            }
        );
    }
}
