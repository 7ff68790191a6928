use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::sync::paths::normalize_remote;
use crate::sync::state::{StateError, default_state_dir};
use crate::sync::{SyncPair, TieBreak};

const DEFAULT_LOCAL_DIR_NAME: &str = "Yandex Disk";
const DEFAULT_REMOTE_ROOT: &str = "disk:/";
const DEFAULT_WORKERS: usize = 16;
const DEFAULT_LEVEL_CONCURRENCY: usize = 4;
const DEFAULT_INTERVAL_SECS: u64 = 300;
const MIN_RECOMMENDED_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YADISK_TOKEN is not set")]
    MissingToken,
    #[error("home directory is unavailable")]
    MissingHome,
    #[error("invalid sync pair {0:?}, expected local=remote")]
    InvalidPair(String),
    #[error("invalid tie-break {0:?}, expected local or remote")]
    InvalidTieBreak(String),
    #[error("invalid state backend {0:?}, expected sqlite or json")]
    InvalidStateBackend(String),
    #[error(transparent)]
    State(#[from] StateError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StateBackend {
    #[default]
    Sqlite,
    Json,
}

impl StateBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Some(StateBackend::Sqlite),
            "json" => Some(StateBackend::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub token: String,
    pub pairs: Vec<SyncPair>,
    pub workers: usize,
    pub level_concurrency: usize,
    pub tie_break: TieBreak,
    pub state_backend: StateBackend,
    pub state_dir: PathBuf,
    pub interval: Duration,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::MissingHome)?;
        Self::from_lookup(|name| std::env::var(name).ok(), &home)
    }

    /// Builds the configuration from any variable source; blank values count
    /// as unset.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        home: &Path,
    ) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let token = var("YADISK_TOKEN").ok_or(ConfigError::MissingToken)?;
        let local_root = var("YADISK_LOCAL_ROOT")
            .map(|value| expand_with_home(&value, home))
            .unwrap_or_else(|| home.join(DEFAULT_LOCAL_DIR_NAME));
        let remote_root = normalize_remote(
            &var("YADISK_REMOTE_ROOT").unwrap_or_else(|| DEFAULT_REMOTE_ROOT.to_string()),
        );
        let pairs = match var("YADISK_SYNC_PAIRS") {
            Some(raw) => parse_pairs(&raw, &local_root, &remote_root, home)?,
            None => vec![SyncPair {
                local: local_root,
                remote: remote_root,
            }],
        };

        let tie_break = match var("YADISK_TIE_BREAK") {
            Some(value) => TieBreak::parse(&value).ok_or(ConfigError::InvalidTieBreak(value))?,
            None => TieBreak::default(),
        };
        let state_backend = match var("YADISK_STATE_BACKEND") {
            Some(value) => {
                StateBackend::parse(&value).ok_or(ConfigError::InvalidStateBackend(value))?
            }
            None => StateBackend::default(),
        };
        let state_dir = match var("YADISK_STATE_DIR") {
            Some(value) => expand_with_home(&value, home),
            None => default_state_dir()?,
        };

        let interval_secs = positive(var("YADISK_SYNC_INTERVAL_SECS"), DEFAULT_INTERVAL_SECS);
        if interval_secs < MIN_RECOMMENDED_INTERVAL_SECS {
            tracing::warn!(
                interval_secs,
                "sync interval under {MIN_RECOMMENDED_INTERVAL_SECS}s may hit API rate limits"
            );
        }

        Ok(Self {
            token,
            pairs,
            workers: positive(var("YADISK_SYNC_WORKERS"), DEFAULT_WORKERS),
            level_concurrency: positive(
                var("YADISK_LEVEL_CONCURRENCY"),
                DEFAULT_LEVEL_CONCURRENCY,
            ),
            tie_break,
            state_backend,
            state_dir,
            interval: Duration::from_secs(interval_secs),
        })
    }
}

/// Parses `local=remote;local=remote`. Relative locals hang off the local
/// root and relative remotes off the remote root.
fn parse_pairs(
    raw: &str,
    local_root: &Path,
    remote_root: &str,
    home: &Path,
) -> Result<Vec<SyncPair>, ConfigError> {
    let mut pairs = Vec::new();
    for item in raw.split(';').map(str::trim).filter(|item| !item.is_empty()) {
        let Some((local, remote)) = item.split_once('=') else {
            return Err(ConfigError::InvalidPair(item.to_string()));
        };
        let (local, remote) = (local.trim(), remote.trim());
        if local.is_empty() || remote.is_empty() {
            return Err(ConfigError::InvalidPair(item.to_string()));
        }
        let local = expand_with_home(local, home);
        let local = if local.is_absolute() {
            local
        } else {
            local_root.join(local)
        };
        let remote = if remote.starts_with('/') || remote.starts_with("disk:") {
            normalize_remote(remote)
        } else {
            normalize_remote(&format!("{remote_root}/{remote}"))
        };
        pairs.push(SyncPair { local, remote });
    }
    Ok(pairs)
}

pub fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

pub fn read_usize_env(name: &str, default: usize) -> usize {
    positive(std::env::var(name).ok(), default)
}

fn positive<T>(value: Option<String>, default: T) -> T
where
    T: FromStr + PartialOrd + Default,
{
    value
        .and_then(|value| value.trim().parse::<T>().ok())
        .filter(|value| *value > T::default())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<SyncConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SyncConfig::from_lookup(|name| vars.get(name).cloned(), Path::new("/home/user"))
    }

    #[test]
    fn token_is_required() {
        let err = config_from(&[("YADISK_STATE_DIR", "/tmp/state")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingToken));

        let err = config_from(&[("YADISK_TOKEN", "  "), ("YADISK_STATE_DIR", "/tmp/state")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingToken));
    }

    #[test]
    fn defaults_mirror_home_and_disk_root() {
        let config = config_from(&[("YADISK_TOKEN", "t"), ("YADISK_STATE_DIR", "~/state")]).unwrap();

        assert_eq!(
            config.pairs,
            vec![SyncPair {
                local: PathBuf::from("/home/user/Yandex Disk"),
                remote: "/".into(),
            }]
        );
        assert_eq!(config.workers, 16);
        assert_eq!(config.level_concurrency, 4);
        assert_eq!(config.tie_break, TieBreak::PreferLocal);
        assert_eq!(config.state_backend, StateBackend::Sqlite);
        assert_eq!(config.state_dir, PathBuf::from("/home/user/state"));
        assert_eq!(config.interval, Duration::from_secs(300));
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("YADISK_TOKEN", "t"),
            ("YADISK_LOCAL_ROOT", "~/Cloud"),
            ("YADISK_REMOTE_ROOT", "disk:/Backup"),
            ("YADISK_SYNC_WORKERS", "3"),
            ("YADISK_LEVEL_CONCURRENCY", "0"),
            ("YADISK_TIE_BREAK", "remote"),
            ("YADISK_STATE_BACKEND", "JSON"),
            ("YADISK_STATE_DIR", "/var/lib/sync"),
            ("YADISK_SYNC_INTERVAL_SECS", "30"),
        ])
        .unwrap();

        assert_eq!(config.pairs[0].local, PathBuf::from("/home/user/Cloud"));
        assert_eq!(config.pairs[0].remote, "/Backup");
        assert_eq!(config.workers, 3);
        assert_eq!(config.level_concurrency, 4);
        assert_eq!(config.tie_break, TieBreak::PreferRemote);
        assert_eq!(config.state_backend, StateBackend::Json);
        assert_eq!(config.interval, Duration::from_secs(30));
    }

    #[test]
    fn pairs_resolve_against_roots() {
        let config = config_from(&[
            ("YADISK_TOKEN", "t"),
            ("YADISK_LOCAL_ROOT", "/data"),
            ("YADISK_REMOTE_ROOT", "/Backup"),
            ("YADISK_STATE_DIR", "/tmp/state"),
            ("YADISK_SYNC_PAIRS", "photos=Photos; /srv/music=disk:/Music ;"),
        ])
        .unwrap();

        assert_eq!(
            config.pairs,
            vec![
                SyncPair {
                    local: PathBuf::from("/data/photos"),
                    remote: "/Backup/Photos".into(),
                },
                SyncPair {
                    local: PathBuf::from("/srv/music"),
                    remote: "/Music".into(),
                },
            ]
        );
    }

    #[test]
    fn rejects_malformed_values() {
        let base = [("YADISK_TOKEN", "t"), ("YADISK_STATE_DIR", "/tmp/state")];

        let err = config_from(&[base[0], base[1], ("YADISK_SYNC_PAIRS", "photos")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPair(pair) if pair == "photos"));

        let err = config_from(&[base[0], base[1], ("YADISK_TIE_BREAK", "newest")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTieBreak(_)));

        let err = config_from(&[base[0], base[1], ("YADISK_STATE_BACKEND", "redis")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStateBackend(_)));
    }

    #[test]
    fn expand_with_home_handles_tilde() {
        let home = Path::new("/home/user");
        assert_eq!(expand_with_home("~", home), PathBuf::from("/home/user"));
        assert_eq!(expand_with_home("~/x", home), PathBuf::from("/home/user/x"));
        assert_eq!(expand_with_home("/abs", home), PathBuf::from("/abs"));
    }
}
