//! Config file loading and semantic validation
//!
//! The file is YAML:
//!
//! ```yaml
//! meta:
//!   schemaVersion: v2
//! systems:
//!   openmonitor:
//!     name: OpenMonitor
//!     ref: https://github.com/openmonitor
//! components:
//!   test-component:
//!     name: test
//!     system: openmonitor
//!     baseUrl: http://127.0.0.1:1338
//!     ref: https://github.com/openmonitor/test
//!     authToken: xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx
//!     metrics:
//!       - name: cpu
//!         endpoint: /cpu
//!         frequency: 1m
//!         expectedTime: 50ms
//!         timeout: 200ms
//!         deleteAfter: 7d
//! storage:
//!   backend: sqlite
//!   path: ./results.db
//! observers:
//!   - name: evaluator
//!     callback: http://127.0.0.1:1337/trigger
//! ```
//!
//! Deserialization only checks the shape. [`ConfigFile::validate`] then turns
//! the raw sections into the entity model and rejects anything the scheduler
//! must never see: unknown systems, tokens that are not 32 characters long,
//! malformed or disallowed time strings and duplicate metric ids.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, trace};

use crate::model::{Component, Metric, MonitorConfig, System};
use crate::observer::Observer;
use crate::time::{FREQUENCY_UNITS, LATENCY_UNITS, RETENTION_UNITS, TimeDetail, TimeUnit};

/// Required length of every auth token
pub const AUTH_TOKEN_LENGTH: usize = 32;

/// Errors raised while loading or validating the configuration
///
/// All of them are fatal: the scheduler never starts with a config that
/// produced one of these.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("\"{value}\" is not in a supported time format")]
    InvalidTime { value: String },

    #[error("\"{value}\" uses a unit that is not allowed here (allowed: {allowed})")]
    UnitNotAllowed { value: String, allowed: String },

    #[error("{field}: {source}")]
    InField {
        field: String,
        #[source]
        source: Box<ConfigError>,
    },

    #[error("component system \"{system_id}\" of component \"{component_id}\" not found in systems {known:?}")]
    UnknownSystem {
        component_id: String,
        system_id: String,
        known: Vec<String>,
    },

    #[error("authToken of {owner} has length {length}, expected 32")]
    InvalidAuthToken { owner: String, length: usize },

    #[error("metric \"{metric_id}\" is defined more than once in component \"{component_id}\"")]
    DuplicateMetric {
        component_id: String,
        metric_id: String,
    },
}

impl ConfigError {
    fn in_field(self, field: impl Into<String>) -> Self {
        ConfigError::InField {
            field: field.into(),
            source: Box::new(self),
        }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(alias = "none")]
    Memory,

    /// SQLite database (default)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./results.db")
}

/// Everything the scheduler binary needs from the config file
#[derive(Debug, Clone)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub storage: StorageConfig,
    pub observers: Vec<Observer>,
}

/// Raw shape of the config file
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub meta: Meta,
    pub systems: BTreeMap<String, SystemConfig>,
    pub components: BTreeMap<String, ComponentConfig>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub observers: Vec<ObserverConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub schema_version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    pub name: String,
    #[serde(rename = "ref", default)]
    pub reference: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentConfig {
    pub name: String,
    pub system: String,
    pub base_url: String,
    #[serde(rename = "ref", default)]
    pub reference: String,
    pub auth_token: String,
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricConfig {
    pub name: String,
    pub endpoint: String,
    #[serde(default = "default_frequency")]
    pub frequency: String,
    #[serde(default = "default_expected_time")]
    pub expected_time: String,
    #[serde(default = "default_timeout")]
    pub timeout: String,
    #[serde(default = "default_delete_after")]
    pub delete_after: String,
    pub auth_token: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObserverConfig {
    pub name: String,
    pub callback: String,
}

fn default_frequency() -> String {
    "1m".to_string()
}

fn default_expected_time() -> String {
    "50ms".to_string()
}

fn default_timeout() -> String {
    "200ms".to_string()
}

fn default_delete_after() -> String {
    "7d".to_string()
}

pub fn read_config_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let file_content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    debug!("loading config from {}", path.display());
    parse_config(&file_content).inspect(|config| trace!("loaded config: {config:?}"))
}

/// Parse and validate a config document
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let file: ConfigFile = serde_yaml::from_str(content)?;
    file.validate()
}

impl ConfigFile {
    /// Build the entity model, checking every semantic invariant
    pub fn validate(self) -> Result<Config, ConfigError> {
        let systems: Vec<System> = self
            .systems
            .into_iter()
            .map(|(id, system)| System {
                id,
                name: system.name,
                reference: system.reference,
            })
            .collect();

        let known: HashSet<&str> = systems.iter().map(|s| s.id.as_str()).collect();

        let mut components = Vec::with_capacity(self.components.len());
        for (id, component) in self.components {
            if !known.contains(component.system.as_str()) {
                return Err(ConfigError::UnknownSystem {
                    component_id: id,
                    system_id: component.system,
                    known: systems.iter().map(|s| s.id.clone()).collect(),
                });
            }

            components.push(build_component(id, component)?);
        }

        let observers = self
            .observers
            .into_iter()
            .map(|observer| Observer::new(observer.name, observer.callback))
            .collect();

        Ok(Config {
            monitor: MonitorConfig {
                version: self.meta.schema_version,
                systems,
                components,
            },
            storage: self.storage,
            observers,
        })
    }
}

fn build_component(id: String, mut component: ComponentConfig) -> Result<Component, ConfigError> {
    check_auth_token(&component.auth_token, || format!("component \"{id}\""))?;

    let metric_configs = std::mem::take(&mut component.metrics);
    let mut seen = HashSet::new();
    let mut metrics = Vec::with_capacity(metric_configs.len());

    for metric in metric_configs {
        if !seen.insert(metric.name.clone()) {
            return Err(ConfigError::DuplicateMetric {
                component_id: id,
                metric_id: metric.name,
            });
        }

        metrics.push(build_metric(&id, &component, metric)?);
    }

    Ok(Component {
        id,
        name: component.name,
        system_id: component.system,
        base_url: component.base_url,
        reference: component.reference,
        auth_token: component.auth_token,
        metrics,
    })
}

fn build_metric(
    component_id: &str,
    component: &ComponentConfig,
    metric: MetricConfig,
) -> Result<Metric, ConfigError> {
    let field = |name: &str| format!("components.{component_id}.metrics.{}.{name}", metric.name);
    let time = |text: &str, name: &str, allowed: &[TimeUnit]| {
        TimeDetail::parse(text, allowed).map_err(|e| e.in_field(field(name)))
    };

    let frequency = time(&metric.frequency, "frequency", FREQUENCY_UNITS)?;
    let expected_time = time(&metric.expected_time, "expectedTime", LATENCY_UNITS)?;
    let timeout = time(&metric.timeout, "timeout", LATENCY_UNITS)?;
    let delete_after = time(&metric.delete_after, "deleteAfter", RETENTION_UNITS)?;

    let auth_token = metric
        .auth_token
        .clone()
        .unwrap_or_else(|| component.auth_token.clone());
    check_auth_token(&auth_token, || {
        format!("metric \"{}\" of component \"{component_id}\"", metric.name)
    })?;

    let base_url = metric
        .base_url
        .clone()
        .unwrap_or_else(|| component.base_url.clone());

    Ok(Metric {
        id: metric.name,
        endpoint: metric.endpoint,
        frequency,
        expected_time,
        timeout,
        delete_after,
        auth_token,
        base_url,
    })
}

fn check_auth_token(token: &str, owner: impl FnOnce() -> String) -> Result<(), ConfigError> {
    let length = token.chars().count();
    if length != AUTH_TOKEN_LENGTH {
        return Err(ConfigError::InvalidAuthToken {
            owner: owner(),
            length,
        });
    }
    Ok(())
}
