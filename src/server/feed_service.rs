use std::{collections::HashMap, sync::Arc};

use axum::{
  Extension,
  extract::{Path, Request},
  response::{IntoResponse, Response},
};
use tokio::sync::RwLock;
use tower::Service;
use tracing::{error, info};

use crate::{
  config::RootConfig,
  content::ContentRoot,
  error::{ConfigError, Error},
  kv::{KvStore, MemoryStore},
  source::SourceContext,
};

use super::endpoint::EndpointService;

#[derive(Clone)]
pub struct FeedService {
  inner: Arc<RwLock<Inner>>,
  // outlives config reloads so page history survives them
  store: Arc<dyn KvStore>,
}

struct Inner {
  config_error: Option<ConfigError>,
  root_config: Arc<RootConfig>,
  // maps path to service
  endpoints: HashMap<String, EndpointService>,
}

impl FeedService {
  pub fn try_from(root_config: RootConfig) -> Result<Self, ConfigError> {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let endpoints = build_endpoints(&root_config, &store)?;

    let inner = Inner {
      config_error: None,
      root_config: Arc::new(root_config),
      endpoints,
    };

    Ok(Self {
      inner: Arc::new(RwLock::new(inner)),
      store,
    })
  }

  pub async fn with_error<R>(
    &self,
    f: impl FnOnce(&ConfigError) -> R,
  ) -> Option<R> {
    let inner = self.inner.read().await;
    inner.config_error.as_ref().map(f)
  }

  pub async fn root_config(&self) -> Arc<RootConfig> {
    let inner = self.inner.read().await;
    inner.root_config.clone()
  }

  // Reload the config and rebuild the endpoints. Return true if the
  // reload was successful, false if there was an error, in which case the
  // previous endpoints keep serving.
  pub async fn reload(&self, path: &std::path::Path) -> bool {
    let loaded = RootConfig::load_from_file(path).and_then(|root_config| {
      let endpoints = build_endpoints(&root_config, &self.store)?;
      Ok((root_config, endpoints))
    });

    let mut inner = self.inner.write().await;
    match loaded {
      Ok((root_config, endpoints)) => {
        inner.config_error = None;
        inner.root_config = Arc::new(root_config);
        inner.endpoints = endpoints;
        true
      }
      Err(e) => {
        error!("failed to reload config: {e:?}");
        inner.config_error = Some(e);
        false
      }
    }
  }

  pub async fn get_endpoint(&self, path: &str) -> Option<EndpointService> {
    let inner = self.inner.read().await;
    inner.endpoints.get(path).cloned()
  }

  pub async fn handler(
    Path(path): Path<String>,
    Extension(service): Extension<FeedService>,
    request: Request,
  ) -> Response {
    match service.get_endpoint(path.trim_start_matches('/')).await {
      Some(mut endpoint) => match endpoint.call(request).await {
        Ok(resp) => resp,
        Err(infallible) => match infallible {},
      },
      None => {
        Error::PageNotFound(format!("endpoint not defined: /{path}"))
          .into_response()
      }
    }
  }
}

fn build_endpoints(
  root_config: &RootConfig,
  store: &Arc<dyn KvStore>,
) -> Result<HashMap<String, EndpointService>, ConfigError> {
  let client = root_config.client.build().map_err(|e| {
    ConfigError::Message(format!("failed to build http client: {e}"))
  })?;

  let context = SourceContext {
    content: ContentRoot::new(&root_config.content_root),
    client: Arc::new(client),
    store: store.clone(),
  };

  let mut endpoints = HashMap::new();
  for endpoint_config in root_config.endpoints.clone() {
    let path = endpoint_config.path_sans_slash().to_owned();
    let service = endpoint_config.build(&context, root_config.base_url.clone());
    info!("loaded endpoint: /{}", path);
    endpoints.insert(path, service);
  }

  Ok(endpoints)
}
