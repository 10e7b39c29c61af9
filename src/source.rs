mod blog;
mod changelog;
mod page_changes;

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
  client::Client,
  content::ContentRoot,
  error::Result,
  feed::Feed,
  kv::KvStore,
  server::EndpointParam,
};

pub use blog::BlogConfig;
pub use changelog::ChangelogConfig;
pub use page_changes::PageChangesConfig;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
/// # Feed source
pub enum SourceConfig {
  /// Package releases from the changelog YAML, with same-release
  /// dependency changes folded in.
  Changelog(ChangelogConfig),
  /// Blog posts from the pre-built page data cache or the Markdown
  /// files.
  Blog(BlogConfig),
  /// Update history of a single site page.
  PageChanges(PageChangesConfig),
}

/// Shared collaborators handed to every source when it is built.
#[derive(Clone)]
pub struct SourceContext {
  pub content: ContentRoot,
  pub client: Arc<Client>,
  pub store: Arc<dyn KvStore>,
}

pub enum Source {
  Changelog(ChangelogConfig, ContentRoot),
  Blog(BlogConfig, ContentRoot),
  PageChanges(page_changes::PageChanges),
}

impl SourceConfig {
  pub fn build(self, context: &SourceContext) -> Source {
    match self {
      SourceConfig::Changelog(config) => {
        Source::Changelog(config, context.content.clone())
      }
      SourceConfig::Blog(config) => {
        Source::Blog(config, context.content.clone())
      }
      SourceConfig::PageChanges(config) => Source::PageChanges(
        page_changes::PageChanges::new(
          config,
          context.client.clone(),
          context.store.clone(),
        ),
      ),
    }
  }
}

impl Source {
  pub async fn fetch_feed(&self, param: &EndpointParam) -> Result<Feed> {
    let now = Utc::now();
    match self {
      Source::Changelog(config, content) => {
        let data = config.load(content).await?;
        config.build_feed(&data, param, now)
      }
      Source::Blog(config, content) => {
        let posts = config.load(content).await?;
        config.build_feed(posts, param, now)
      }
      Source::PageChanges(source) => source.fetch_feed(param, now).await,
    }
  }

  pub fn default_cache_control(&self) -> &'static str {
    match self {
      Source::Changelog(..) => "public, max-age=3600",
      Source::Blog(..) => "public, max-age=1800",
      Source::PageChanges(_) => "no-store, no-cache, must-revalidate",
    }
  }
}

/// Joins a site-absolute path such as `/blog/post` onto the site base.
fn site_url(base: &Url, path: &str) -> Result<Url> {
  Ok(base.join(path)?)
}
