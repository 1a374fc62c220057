//! Layered configuration: defaults, then an optional YAML file, then `SOUL_DEVTOOLS__*`
//! environment overlays. CLI flags are applied last by the binary.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use cdp_adapter::CdpConfig;
use devtools_telemetry::CollectorSettings;
use devtools_tools::{RefreshSettings, ToolSettings};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

const ENV_PREFIX: &str = "SOUL_DEVTOOLS__";
pub const ENV_CONFIG_FILE: &str = "SOUL_DEVTOOLS_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DevtoolsConfig {
    pub cdp: CdpConfig,
    pub refresh: RefreshSettings,
    pub collectors: CollectorSettings,
    pub logging: LoggingSettings,
}

impl DevtoolsConfig {
    pub fn tool_settings(&self) -> ToolSettings {
        ToolSettings {
            refresh: self.refresh.clone(),
            collectors: self.collectors.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct LoadOptions {
    /// Explicit file; falls back to `SOUL_DEVTOOLS_CONFIG`.
    pub path: Option<PathBuf>,
    pub include_env: bool,
}

pub fn load_config(path: Option<&Path>) -> Result<DevtoolsConfig, ConfigError> {
    load_config_with_options(&LoadOptions {
        path: path.map(Path::to_path_buf),
        include_env: true,
    })
}

pub fn load_config_with_options(options: &LoadOptions) -> Result<DevtoolsConfig, ConfigError> {
    let mut tree = serde_json::to_value(DevtoolsConfig::default())
        .map_err(|err| ConfigError::Invalid(err.to_string()))?;

    let file = options.path.clone().or_else(|| {
        options
            .include_env
            .then(|| env::var(ENV_CONFIG_FILE).ok())
            .flatten()
            .filter(|raw| !raw.trim().is_empty())
            .map(PathBuf::from)
    });
    if let Some(path) = file {
        for (key, value) in overlays_from_file(&path)? {
            set_path(&mut tree, &key, value);
        }
    }

    if options.include_env {
        for (key, value) in overlays_from_env() {
            set_path(&mut tree, &key, value);
        }
    }

    serde_json::from_value(tree).map_err(|err| ConfigError::Invalid(err.to_string()))
}

fn overlays_from_file(path: &Path) -> Result<Vec<(String, Value)>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let yaml_value: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|err| ConfigError::Invalid(err.to_string()))?;
    let json_value =
        serde_json::to_value(yaml_value).map_err(|err| ConfigError::Invalid(err.to_string()))?;
    Ok(flatten_value(json_value, None))
}

fn overlays_from_env() -> Vec<(String, Value)> {
    let mut overlays = Vec::new();
    for (key, raw) in env::vars() {
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            let path = stripped
                .split("__")
                .filter(|segment| !segment.is_empty())
                .map(|segment| segment.to_ascii_lowercase())
                .collect::<Vec<_>>()
                .join(".");
            if path.is_empty() {
                continue;
            }
            overlays.push((path, parse_env_value(&raw)));
        }
    }
    overlays.sort_by(|a, b| a.0.cmp(&b.0));
    overlays
}

fn parse_env_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
        return parsed;
    }
    if let Ok(boolean) = raw.parse::<bool>() {
        return Value::Bool(boolean);
    }
    if let Ok(int_val) = raw.parse::<i64>() {
        return Value::Number(int_val.into());
    }
    Value::String(raw.to_string())
}

fn flatten_value(value: Value, prefix: Option<String>) -> Vec<(String, Value)> {
    match value {
        Value::Object(map) => {
            let mut result = Vec::new();
            for (key, value) in map {
                let segment = key.trim().to_ascii_lowercase();
                let next = match &prefix {
                    Some(prefix) if !prefix.is_empty() => format!("{prefix}.{segment}"),
                    _ => segment,
                };
                result.extend(flatten_value(value, Some(next)));
            }
            result
        }
        other => prefix.map(|path| vec![(path, other)]).unwrap_or_default(),
    }
}

fn set_path(tree: &mut Value, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(last) = segments.pop() else {
        return;
    };
    let mut node = tree;
    for segment in segments {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return,
        };
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        map.insert(last.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn clear_env() {
        for (key, _) in env::vars() {
            if key.starts_with(ENV_PREFIX) || key == ENV_CONFIG_FILE {
                env::remove_var(key);
            }
        }
    }

    fn yaml_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn defaults_without_sources() {
        clear_env();
        let config = load_config(None).unwrap();
        assert_eq!(config.refresh.interval_ms, 1000);
        assert!(!config.refresh.poll_all);
        assert_eq!(config.collectors.namespace, "__soul");
        assert_eq!(config.collectors.mutation_capacity, 100);
        assert_eq!(config.collectors.body_limit, 5000);
        assert_eq!(config.logging.filter, "info");
        assert!(config.cdp.websocket_url.is_none());
    }

    #[test]
    #[serial]
    fn yaml_file_overrides_defaults() {
        clear_env();
        let file = yaml_file(
            "refresh:\n  interval_ms: 250\ncollectors:\n  body_limit: 100\n  namespace: __probe\n",
        );
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.refresh.interval_ms, 250);
        assert_eq!(config.collectors.body_limit, 100);
        assert_eq!(config.collectors.namespace, "__probe");
        assert_eq!(config.collectors.mutation_capacity, 100);
    }

    #[test]
    #[serial]
    fn env_overrides_file() {
        clear_env();
        let file = yaml_file("refresh:\n  interval_ms: 250\n");
        env::set_var("SOUL_DEVTOOLS__REFRESH__INTERVAL_MS", "50");
        env::set_var("SOUL_DEVTOOLS__CDP__WEBSOCKET_URL", "ws://127.0.0.1:9222/devtools/browser/x");
        env::set_var("SOUL_DEVTOOLS__LOGGING__JSON", "true");

        let config = load_config(Some(file.path())).unwrap();
        clear_env();

        assert_eq!(config.refresh.interval_ms, 50);
        assert_eq!(
            config.cdp.websocket_url.as_deref(),
            Some("ws://127.0.0.1:9222/devtools/browser/x")
        );
        assert!(config.logging.json);
    }

    #[test]
    #[serial]
    fn config_file_from_env() {
        clear_env();
        let file = yaml_file("collectors:\n  mutation_capacity: 10\n");
        env::set_var(ENV_CONFIG_FILE, file.path());
        let config = load_config(None).unwrap();
        clear_env();
        assert_eq!(config.collectors.mutation_capacity, 10);
    }

    #[test]
    #[serial]
    fn missing_file_is_an_error() {
        clear_env();
        let err = load_config(Some(Path::new("/nonexistent/devtools.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    #[serial]
    fn mistyped_value_is_rejected() {
        clear_env();
        env::set_var("SOUL_DEVTOOLS__REFRESH__INTERVAL_MS", "fast");
        let err = load_config(None).unwrap_err();
        clear_env();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn env_values_parse_like_json_first() {
        assert_eq!(parse_env_value("42"), Value::from(42));
        assert_eq!(parse_env_value("true"), Value::Bool(true));
        assert_eq!(parse_env_value("[1,2]"), serde_json::json!([1, 2]));
        assert_eq!(parse_env_value("ws://x"), Value::String("ws://x".into()));
        assert_eq!(parse_env_value(""), Value::Null);
    }

    #[test]
    fn set_path_creates_intermediate_objects() {
        let mut tree = serde_json::json!({ "a": 1 });
        set_path(&mut tree, "a.b.c", Value::Bool(true));
        assert_eq!(tree, serde_json::json!({ "a": { "b": { "c": true } } }));
    }
}
