//! Credential lookup. The API key lives in an external key-value store
//! (environment, a flat `secrets.toml`, or both) and is resolved per request.

use std::collections::HashMap;

use tracing::{error, info, warn};

use crate::errors::PipelineError;

pub const API_KEY_NAME: &str = "OPENAI_API_KEY";

const MIN_KEY_LEN: usize = 20;
const PLACEHOLDERS: [&str; 6] = ["your-api-key", "your_api_key", "changeme", "sk-...", "sk-xxx", "replace-me"];

pub trait SecretStore: Send + Sync {
  fn get(&self, key: &str) -> Option<String>;
}

/// Reads process environment variables.
pub struct EnvSecrets;

impl SecretStore for EnvSecrets {
  fn get(&self, key: &str) -> Option<String> {
    std::env::var(key).ok()
  }
}

/// Flat TOML table of string secrets, loaded once.
pub struct FileSecrets {
  values: HashMap<String, String>,
}

impl FileSecrets {
  /// Missing or unparsable files yield an empty store (logged).
  pub fn load(path: &str) -> Self {
    let values = match std::fs::read_to_string(path) {
      Ok(s) => Self::parse(&s).unwrap_or_else(|e| {
        error!(target: "quiz_wizard", %path, error = %e, "Failed to parse secrets file");
        HashMap::new()
      }),
      Err(e) => {
        warn!(target: "quiz_wizard", %path, error = %e, "Secrets file not readable");
        HashMap::new()
      }
    };
    info!(target: "quiz_wizard", %path, entries = values.len(), "Secrets file loaded");
    Self { values }
  }

  fn parse(s: &str) -> Result<HashMap<String, String>, toml::de::Error> {
    let table: toml::Table = toml::from_str(s)?;
    Ok(table
      .into_iter()
      .filter_map(|(k, v)| match v {
        toml::Value::String(s) => Some((k, s)),
        _ => None,
      })
      .collect())
  }
}

impl SecretStore for FileSecrets {
  fn get(&self, key: &str) -> Option<String> {
    self.values.get(key).cloned()
  }
}

/// First store that knows the key wins.
pub struct ChainSecrets(pub Vec<Box<dyn SecretStore>>);

impl SecretStore for ChainSecrets {
  fn get(&self, key: &str) -> Option<String> {
    self.0.iter().find_map(|s| s.get(key))
  }
}

impl SecretStore for HashMap<String, String> {
  fn get(&self, key: &str) -> Option<String> {
    HashMap::get(self, key).cloned()
  }
}

/// Look up and sanity-check the API key. Any problem here is a configuration
/// error and must stop the run before the network call.
pub fn resolve_api_key(store: &dyn SecretStore) -> Result<String, PipelineError> {
  let key = store
    .get(API_KEY_NAME)
    .map(|k| k.trim().to_string())
    .filter(|k| !k.is_empty())
    .ok_or_else(|| PipelineError::Configuration(format!("{} is not set", API_KEY_NAME)))?;

  let lower = key.to_lowercase();
  if PLACEHOLDERS.iter().any(|p| lower == *p) || (key.starts_with('<') && key.ends_with('>')) {
    return Err(PipelineError::Configuration(format!("{} holds a placeholder value", API_KEY_NAME)));
  }
  if key.chars().count() < MIN_KEY_LEN {
    return Err(PipelineError::Configuration(format!("{} is too short", API_KEY_NAME)));
  }
  Ok(key)
}
