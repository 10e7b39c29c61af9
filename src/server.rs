mod endpoint;
mod feed_service;
mod watcher;

use std::path::{Path, PathBuf};

use axum::{
  Extension, Router,
  response::{IntoResponse, Response},
  routing::get,
};
use clap::Parser;
pub use endpoint::{EndpointConfig, EndpointParam};
use http::StatusCode;
use maud::{DOCTYPE, Markup, html};
use tower_http::compression::CompressionLayer;
use tracing::{error, info};

use crate::{config::RootConfig, error::Error};

pub use feed_service::FeedService;

#[derive(Parser)]
pub struct ServerConfig {
  #[clap(long, short, default_value = "127.0.0.1:4080")]
  bind: String,
  /// Reload the config file when it changes
  #[clap(long, short)]
  watch: bool,
}

impl ServerConfig {
  pub async fn run(self, config_path: &Path) -> anyhow::Result<()> {
    let root_config = RootConfig::load_from_file(config_path)?;
    let feed_service = FeedService::try_from(root_config)?;

    if self.watch {
      watch_config(config_path.to_owned(), feed_service.clone())?;
    }

    info!("listening on {}", self.bind);
    let listener = tokio::net::TcpListener::bind(&self.bind).await?;

    info!("starting server");
    axum::serve(listener, router(feed_service)).await?;
    Ok(())
  }
}

pub fn router(feed_service: FeedService) -> Router {
  Router::new()
    .route("/", get(handle_index))
    .route("/health", get(handle_health))
    .route("/*path", get(FeedService::handler))
    .fallback(handle_not_found)
    .layer(Extension(feed_service))
    .layer(CompressionLayer::new().gzip(true))
}

fn watch_config(
  config_path: PathBuf,
  feed_service: FeedService,
) -> anyhow::Result<()> {
  let mut watcher = watcher::Watcher::new(&config_path);
  watcher.setup()?;
  let mut change_alert = watcher
    .take_change_alert()
    .ok_or_else(|| anyhow::anyhow!("config watcher already consumed"))?;

  tokio::spawn(async move {
    // the watcher stops delivering events once dropped
    let _watcher = watcher;
    while change_alert.recv().await.is_some() {
      info!("config file changed, reloading");
      if feed_service.reload(&config_path).await {
        info!("config reloaded");
      } else {
        error!("config reload failed, keeping previous endpoints");
      }
    }
  });

  Ok(())
}

async fn handle_health(
  Extension(service): Extension<FeedService>,
) -> Response {
  let config_error = service.with_error(|e| format!("{e:?}")).await;
  match config_error {
    None => "ok".into_response(),
    Some(e) => (StatusCode::SERVICE_UNAVAILABLE, e).into_response(),
  }
}

async fn handle_not_found() -> Response {
  Error::PageNotFound("endpoint not found".into()).into_response()
}

async fn handle_index(Extension(service): Extension<FeedService>) -> Markup {
  let root_config = service.root_config().await;
  html! {
    (DOCTYPE)
    html {
      head {
        meta charset="utf-8";
        title { "Site feeds" }
      }
      body {
        h4 { "Feeds" }
        ul {
          @for endpoint in &root_config.endpoints {
            li {
              a href=(endpoint.path) { (endpoint.path) }
              @if let Some(note) = &endpoint.note {
                " - " (note)
              }
            }
          }
        }
      }
    }
  }
}
