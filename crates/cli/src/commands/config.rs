use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use canvass_core::config::{AppConfig, LoadOptions};
use serde::Serialize;
use toml::Value;

use crate::commands::CommandResult;

const FIELDS: &[(&str, &str)] = &[
    ("database.url", "CANVASS_DATABASE_URL"),
    ("database.max_connections", "CANVASS_DATABASE_MAX_CONNECTIONS"),
    ("database.timeout_secs", "CANVASS_DATABASE_TIMEOUT_SECS"),
    ("server.bind_address", "CANVASS_SERVER_BIND_ADDRESS"),
    ("server.port", "CANVASS_SERVER_PORT"),
    ("server.graceful_shutdown_secs", "CANVASS_SERVER_GRACEFUL_SHUTDOWN_SECS"),
    ("survey.text_sample_limit", "CANVASS_SURVEY_TEXT_SAMPLE_LIMIT"),
    ("survey.default_page_size", "CANVASS_SURVEY_DEFAULT_PAGE_SIZE"),
    ("logging.level", "CANVASS_LOGGING_LEVEL"),
    ("logging.format", "CANVASS_LOGGING_FORMAT"),
];

#[derive(Debug, Serialize)]
struct EffectiveConfig {
    precedence: &'static str,
    config: AppConfig,
    sources: BTreeMap<&'static str, String>,
}

/// Effective configuration as JSON, each field attributed to env, file or
/// default.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let sources = FIELDS
        .iter()
        .map(|(key_path, env_key)| {
            let source =
                field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
            (*key_path, source)
        })
        .collect();

    let report = EffectiveConfig { precedence: "env > file > default", config, sources };
    CommandResult::success_with_document("config", &report, "configuration is valid")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("canvass.toml"), PathBuf::from("config/canvass.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
