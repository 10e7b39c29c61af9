mod cache;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;

use self::cache::ResponseCache;
pub use self::cache::Response;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClientConfig {
  user_agent: Option<String>,
  /// Number of page data responses kept in memory. Zero disables caching.
  #[serde(default)]
  cache_size: usize,
  #[serde(deserialize_with = "duration_str::deserialize_duration")]
  #[serde(default = "default_cache_ttl")]
  cache_ttl: Duration,
  #[serde(default = "default_timeout")]
  #[serde(deserialize_with = "duration_str::deserialize_duration")]
  timeout: Duration,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      user_agent: None,
      timeout: default_timeout(),
      cache_size: 0,
      cache_ttl: default_cache_ttl(),
    }
  }
}

impl ClientConfig {
  fn to_builder(&self) -> reqwest::ClientBuilder {
    let user_agent = self
      .user_agent
      .as_deref()
      .unwrap_or(crate::util::USER_AGENT);

    reqwest::Client::builder()
      .user_agent(user_agent)
      .timeout(self.timeout)
  }

  pub fn build(&self) -> Result<Client> {
    let reqwest_client = self.to_builder().build()?;
    let cache = (self.cache_size > 0)
      .then(|| ResponseCache::new(self.cache_size, self.cache_ttl));
    Ok(Client {
      cache,
      client: reqwest_client,
    })
  }
}

pub struct Client {
  cache: Option<ResponseCache>,
  client: reqwest::Client,
}

impl Client {
  pub async fn get(&self, url: &Url) -> Result<Response> {
    if let Some(resp) = self.cache.as_ref().and_then(|c| c.get_cached(url)) {
      return Ok(resp);
    }

    let resp = self
      .client
      .get(url.clone())
      .header("Accept", "application/json")
      .send()
      .await?;
    let resp = Response::from_reqwest_resp(resp).await?;

    // only successful responses are worth remembering
    if resp.status().is_success() {
      if let Some(cache) = &self.cache {
        cache.insert(url.clone(), resp.clone());
      }
    }
    Ok(resp)
  }
}

fn default_timeout() -> Duration {
  Duration::from_secs(10)
}

fn default_cache_ttl() -> Duration {
  Duration::from_secs(60)
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_parse_client_config() {
    let config: ClientConfig =
      serde_yaml::from_str("timeout: 5s\ncache_size: 8\ncache_ttl: 2m\n")
        .unwrap();
    assert_eq!(config.timeout, Duration::from_secs(5));
    assert_eq!(config.cache_ttl, Duration::from_secs(120));
    assert_eq!(config.cache_size, 8);

    let config: ClientConfig = serde_yaml::from_str("{}").unwrap();
    assert_eq!(config, ClientConfig::default());
  }
}
