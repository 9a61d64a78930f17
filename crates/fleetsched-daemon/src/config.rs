//! Daemon configuration (spec.md §6, component C11).
//!
//! Loaded from TOML at `$CONFIG` or `./manager.toml`, with `LOG_LEVEL`,
//! `LOCK_BACKEND`, `MQ_ADDR`, and `STORE_DSN` environment variables
//! overriding the corresponding file values. Validated eagerly at load time
//! rather than at first use.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use fleetsched_types::{ScalingGroupName, SchedulingConfig};
use serde::Deserialize;

/// Which `fleetsched-lock` backend the daemon serializes ticks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockBackendKind {
    /// Advisory file-presence lock; single-node development default.
    Filelock,
    /// In-memory simulation of a Postgres advisory lock.
    PostgresAdvisory,
    /// Quorum lock over N in-memory nodes.
    Redlock,
    /// Lease-based simulation of an etcd lock.
    Etcd,
}

impl Default for LockBackendKind {
    fn default() -> Self {
        LockBackendKind::Filelock
    }
}

impl std::str::FromStr for LockBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "filelock" | "file" => Ok(LockBackendKind::Filelock),
            "postgres-advisory" | "postgres_advisory" | "postgresadvisory" => {
                Ok(LockBackendKind::PostgresAdvisory)
            }
            "redlock" => Ok(LockBackendKind::Redlock),
            "etcd" => Ok(LockBackendKind::Etcd),
            other => Err(ConfigError::InvalidLockBackend(other.to_string())),
        }
    }
}

/// Raw on-disk shape of `manager.toml` before environment overrides and
/// validation are applied.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    log_level: Option<String>,
    #[serde(default)]
    lock_backend: Option<LockBackendKind>,
    #[serde(default)]
    mq_addr: Option<String>,
    #[serde(default)]
    store_dsn: Option<String>,
    #[serde(default)]
    scaling_groups: Vec<SchedulingConfig>,
}

/// Fully resolved, validated daemon configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// `tracing-subscriber` env-filter directive.
    pub log_level: String,
    /// Selected lock backend.
    pub lock_backend: LockBackendKind,
    /// Message-queue address, if the daemon is wired to an out-of-process
    /// queue rather than the in-memory `MessageQueue`.
    pub mq_addr: Option<String>,
    /// Store connection string, if the daemon is wired to a real backend
    /// rather than `InMemoryStore`.
    pub store_dsn: Option<String>,
    /// Per-scaling-group scheduling configuration, keyed by group name.
    pub scaling_groups: HashMap<ScalingGroupName, SchedulingConfig>,
}

/// Failure loading or validating a [`SchedulerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read or parsed.
    #[error("failed to read config: {0}")]
    Load(#[from] config::ConfigError),

    /// No scaling groups were declared; the daemon would have nothing to do.
    #[error("no scaling groups configured")]
    NoScalingGroups,

    /// The same scaling group name appeared more than once.
    #[error("scaling group {0} declared more than once")]
    DuplicateScalingGroup(ScalingGroupName),

    /// `LOCK_BACKEND` (or the file's `lock_backend` key) named an unknown
    /// backend.
    #[error("unrecognized lock backend: {0}")]
    InvalidLockBackend(String),

    /// The CLI was asked to operate on a scaling group not present in the
    /// loaded configuration.
    #[error("scaling group {0} is not configured")]
    UnknownScalingGroup(ScalingGroupName),
}

impl SchedulerConfig {
    /// Resolve the config file path: `$CONFIG` env var, then `override_path`,
    /// then `./manager.toml`.
    pub fn resolve_path(override_path: Option<&Path>) -> PathBuf {
        if let Ok(from_env) = std::env::var("CONFIG") {
            return PathBuf::from(from_env);
        }
        if let Some(p) = override_path {
            return p.to_path_buf();
        }
        PathBuf::from("manager.toml")
    }

    /// Load and validate a [`SchedulerConfig`] from `path`, applying
    /// environment overrides on top of whatever the file specifies. A
    /// missing file is tolerated (empty `RawConfig`); `NoScalingGroups` then
    /// surfaces the resulting empty config as a validation error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = config::Config::builder()
            .add_source(
                config::File::from(path.to_path_buf())
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .build()?
            .try_deserialize()?;

        let log_level = std::env::var("LOG_LEVEL").ok().or(raw.log_level).unwrap_or_else(|| "info".to_string());
        let mq_addr = std::env::var("MQ_ADDR").ok().or(raw.mq_addr);
        let store_dsn = std::env::var("STORE_DSN").ok().or(raw.store_dsn);
        let lock_backend = match std::env::var("LOCK_BACKEND") {
            Ok(v) => v.parse()?,
            Err(_) => raw.lock_backend.unwrap_or_default(),
        };

        if raw.scaling_groups.is_empty() {
            return Err(ConfigError::NoScalingGroups);
        }
        let mut scaling_groups = HashMap::with_capacity(raw.scaling_groups.len());
        for sg in raw.scaling_groups {
            if let Some(previous) = scaling_groups.insert(sg.scaling_group.clone(), sg) {
                return Err(ConfigError::DuplicateScalingGroup(previous.scaling_group));
            }
        }

        Ok(Self { log_level, lock_backend, mq_addr, store_dsn, scaling_groups })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_toml(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn missing_scaling_groups_is_rejected() {
        let f = write_toml("log_level = \"debug\"\n");
        let err = SchedulerConfig::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NoScalingGroups));
    }

    #[test]
    fn loads_scaling_group_table() {
        let f = write_toml(
            r#"
            log_level = "debug"

            [[scaling_groups]]
            scaling_group = "default"
            scheduler_name = "fifo"
            strategy = "legacy"
            enforce_spreading_endpoint_replica = false
            agent_selection_resource_priority = []
            permitted_session_types = ["Interactive"]
            "#,
        );
        let cfg = SchedulerConfig::load(f.path()).unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.lock_backend, LockBackendKind::Filelock);
        assert!(cfg.scaling_groups.contains_key(&ScalingGroupName::new("default")));
    }

    #[test]
    fn duplicate_scaling_group_is_rejected() {
        let f = write_toml(
            r#"
            [[scaling_groups]]
            scaling_group = "default"
            scheduler_name = "fifo"
            strategy = "legacy"
            enforce_spreading_endpoint_replica = false
            agent_selection_resource_priority = []
            permitted_session_types = []

            [[scaling_groups]]
            scaling_group = "default"
            scheduler_name = "lifo"
            strategy = "legacy"
            enforce_spreading_endpoint_replica = false
            agent_selection_resource_priority = []
            permitted_session_types = []
            "#,
        );
        let err = SchedulerConfig::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateScalingGroup(_)));
    }
}
