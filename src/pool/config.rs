use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::Context as _;

use crate::pool::logger::{Level, Logger};

/// Scanned in order when no explicit file is given; first existing wins.
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["resque-pool.yml", "config/resque-pool.yml"];

pub const DEFAULT_INTERVAL_SECS: f64 = 5.0;

/// The declarative pool configuration: a mapping from queue-combination keys
/// (ordered, comma-separated queue lists; two orderings are two distinct
/// keys, never normalized) to desired worker counts, plus the runtime knobs
/// read from the environment.
///
/// The file document may nest per-environment sub-maps:
///
/// ```yaml
/// foo: 1
/// foo,bar: 2
/// production:
///   foo: 10
///   foo,bar: 5
/// ```
///
/// With environment `production` the effective map is `{foo: 10, foo,bar: 5}`;
/// the selected sub-map overlays the integer top-level entries, and a single
/// filter pass then drops every non-integer leaf (which removes the other
/// environments' sub-maps along with any stray values).
pub struct Config {
    environment: String,
    explicit_path: Option<PathBuf>,
    static_queues: Option<BTreeMap<String, usize>>,
    queues: BTreeMap<String, usize>,
    loaded: bool,
    pub interval: Duration,
    pub log_level: Level,
    pub app_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            environment: String::new(),
            explicit_path: None,
            static_queues: None,
            queues: BTreeMap::new(),
            loaded: false,
            interval: Duration::from_secs_f64(DEFAULT_INTERVAL_SECS),
            log_level: Level::Info,
            app_name: default_app_name(),
        }
    }
}

impl Config {
    /// Construction from the process environment:
    /// `RESQUE_ENV` selects the environment overlay, `INTERVAL` the worker
    /// polling delay, `RESQUE_POOL_CONFIG` an explicit file path, and
    /// `LOGGING`/`VERBOSE`/`VVERBOSE` raise the log threshold to notice or
    /// debug.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        if let Ok(env) = std::env::var("RESQUE_ENV") {
            config.environment = env;
        }
        if let Some(secs) = std::env::var("INTERVAL")
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
        {
            config.interval = Duration::from_secs_f64(secs);
        }
        if let Some(path) = std::env::var("RESQUE_POOL_CONFIG")
            .ok()
            .filter(|s| !s.is_empty())
        {
            config.explicit_path = Some(PathBuf::from(path));
        }
        if std::env::var_os("VVERBOSE").is_some() {
            config.log_level = Level::Debug;
        } else if std::env::var_os("VERBOSE").is_some() || std::env::var_os("LOGGING").is_some() {
            config.log_level = Level::Notice;
        }
        config
    }

    /// An in-memory desired-count map; file loading is bypassed entirely.
    pub fn from_queues(queues: BTreeMap<String, usize>) -> Self {
        Config {
            static_queues: Some(queues),
            ..Config::default()
        }
    }

    pub fn set_environment(&mut self, environment: impl Into<String>) {
        self.environment = environment.into();
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn set_config_path(&mut self, path: impl Into<PathBuf>) {
        self.explicit_path = Some(path.into());
    }

    pub fn set_interval_secs(&mut self, secs: f64) -> anyhow::Result<()> {
        anyhow::ensure!(
            secs.is_finite() && secs >= 0.0,
            "interval must be a non-negative number of seconds, got {secs}"
        );
        self.interval = Duration::from_secs_f64(secs);
        Ok(())
    }

    /// Parse the configuration if it has not been parsed since construction
    /// or the last `reset_queues`.
    pub fn load(&mut self, logger: &Logger) -> anyhow::Result<()> {
        if self.loaded {
            return Ok(());
        }
        self.reload(logger)
    }

    /// Re-parse unconditionally. The desired-count map is swapped only on
    /// success; a parse failure leaves the previous map in place so a bad
    /// edit cannot take down a running pool.
    pub fn reload(&mut self, logger: &Logger) -> anyhow::Result<()> {
        let queues = self.build_queues(logger)?;
        self.queues = queues;
        self.loaded = true;
        Ok(())
    }

    /// Desired worker count for a queue-combination key; 0 when absent.
    pub fn worker_count(&self, key: &str) -> usize {
        self.queues.get(key).copied().unwrap_or(0)
    }

    /// All queue-combination keys currently in the desired-count map.
    pub fn known_queues(&self) -> impl Iterator<Item = &str> {
        self.queues.keys().map(String::as_str)
    }

    /// Empty the desired-count map; the next `load` re-parses.
    pub fn reset_queues(&mut self) {
        self.queues.clear();
        self.loaded = false;
    }

    fn build_queues(&self, logger: &Logger) -> anyhow::Result<BTreeMap<String, usize>> {
        if let Some(queues) = &self.static_queues {
            return Ok(queues.clone());
        }
        let Some(path) = self.choose_config_file(logger) else {
            return Ok(BTreeMap::new());
        };
        let raw = read_document(&path)?;
        let doc: serde_yaml::Value = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse pool config {}", path.display()))?;
        apply_environment(&doc, &self.environment)
            .with_context(|| format!("invalid pool config {}", path.display()))
    }

    fn choose_config_file(&self, logger: &Logger) -> Option<PathBuf> {
        if let Some(path) = &self.explicit_path {
            if path.exists() {
                return Some(path.clone());
            }
            logger.error(
                "pool config {path} does not exist, falling back to default locations",
                &[("path", path.display().to_string())],
            );
        }
        DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }
}

fn default_app_name() -> String {
    std::env::current_dir()
        .ok()
        .and_then(|dir| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "resque-pool".to_string())
}

/// A `.sh` config is a scripted template: run it and parse the captured
/// stdout. Anything else is read verbatim.
fn read_document(path: &Path) -> anyhow::Result<String> {
    if path.extension().is_some_and(|ext| ext == "sh") {
        let output = Command::new("sh")
            .arg(path)
            .output()
            .with_context(|| format!("failed to run pool config script {}", path.display()))?;
        anyhow::ensure!(
            output.status.success(),
            "pool config script {} failed with {}",
            path.display(),
            output.status
        );
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read pool config {}", path.display()))
    }
}

/// Overlay the selected environment's sub-map over integer top-level entries
/// and keep only integer leaves.
fn apply_environment(
    doc: &serde_yaml::Value,
    environment: &str,
) -> anyhow::Result<BTreeMap<String, usize>> {
    if doc.is_null() {
        // An empty document is an empty pool, not an error.
        return Ok(BTreeMap::new());
    }
    let serde_yaml::Value::Mapping(map) = doc else {
        anyhow::bail!("pool config must be a mapping of queue lists to worker counts");
    };
    let mut queues = BTreeMap::new();
    for (key, value) in map {
        if let (Some(key), Some(count)) = (key.as_str(), as_count(value)) {
            queues.insert(key.to_string(), count);
        }
    }
    if !environment.is_empty() {
        if let Some(serde_yaml::Value::Mapping(sub)) = doc.get(environment) {
            for (key, value) in sub {
                if let (Some(key), Some(count)) = (key.as_str(), as_count(value)) {
                    queues.insert(key.to_string(), count);
                }
            }
        }
    }
    Ok(queues)
}

fn as_count(value: &serde_yaml::Value) -> Option<usize> {
    // Non-negative integers only; strings, floats, nulls and nested maps are
    // all dropped by the caller.
    value.as_u64().map(|n| n as usize)
}
