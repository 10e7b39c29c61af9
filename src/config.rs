use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::client::ClientConfig;
use crate::error::ConfigError;
use crate::server::EndpointConfig;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RootConfig {
  /// Directory holding the site's authored content. Relative paths are
  /// resolved against the config file's directory.
  pub content_root: PathBuf,
  /// Public origin of the site. When absent, it's inferred per request
  /// from the Host headers.
  pub base_url: Option<Url>,
  #[serde(default)]
  pub client: ClientConfig,
  pub endpoints: Vec<EndpointConfig>,
}

impl RootConfig {
  pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config = Self::parse(&content)?;

    if config.content_root.is_relative() {
      let dir = path.parent().unwrap_or(Path::new("."));
      config.content_root = dir.join(&config.content_root);
    }

    Ok(config)
  }

  pub fn parse(content: &str) -> Result<Self, ConfigError> {
    let config: Self = serde_yaml::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for endpoint in &self.endpoints {
      if !endpoint.path.starts_with('/') {
        return Err(ConfigError::Message(format!(
          "endpoint path must start with '/': {}",
          endpoint.path
        )));
      }

      if !seen.insert(endpoint.path_sans_slash()) {
        return Err(ConfigError::Message(format!(
          "duplicate endpoint path: {}",
          endpoint.path
        )));
      }
    }

    Ok(())
  }

  pub fn get_endpoint(&self, path: &str) -> Option<&EndpointConfig> {
    let path = path.trim_start_matches('/');
    self.endpoints.iter().find(|e| e.path_sans_slash() == path)
  }
}
