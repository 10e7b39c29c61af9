use std::sync::Arc;

use chrono::{DateTime, Utc};
use maud::html;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use crate::{
  client::Client,
  error::{Error, Result},
  feed::{ChannelMeta, Feed, FeedItem, ITEMS_LIMIT},
  kv::{KvStore, ListOptions, key},
  server::EndpointParam,
  util::date::from_millis,
};

use super::site_url;

const KEY_ROOT: &str = "pageRss";
const HASH_LEN: usize = 16;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct PageChangesConfig {
  /// Site path of the tracked page, when the request doesn't name one.
  pub page: Option<String>,
  /// Where pre-rendered page data is served from. Defaults to the site
  /// base url.
  pub page_data_base: Option<Url>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageChangeRecord {
  pub hash: String,
  pub timestamp: i64,
  pub page_title: String,
  pub page_url: String,
}

pub struct PageChanges {
  config: PageChangesConfig,
  client: Arc<Client>,
  store: Arc<dyn KvStore>,
}

impl PageChanges {
  pub fn new(
    config: PageChangesConfig,
    client: Arc<Client>,
    store: Arc<dyn KvStore>,
  ) -> Self {
    Self {
      config,
      client,
      store,
    }
  }

  pub async fn fetch_feed(
    &self,
    param: &EndpointParam,
    now: DateTime<Utc>,
  ) -> Result<Feed> {
    let page_url = param
      .page()
      .or(self.config.page.as_deref())
      .ok_or_else(|| Error::BadRequest("no page selected".into()))?;
    let page_url = site_path(page_url)?;
    let base = param.base()?;
    let data_base = self.config.page_data_base.as_ref().unwrap_or(base);

    let page_data = self.fetch_page_data(data_base, page_url).await?;
    let tracker = Tracker {
      store: self.store.as_ref(),
      page_path: page_path(page_url),
    };
    let current = PageChangeRecord {
      hash: page_hash(&page_data)?,
      timestamp: now.timestamp_millis(),
      page_title: page_title(&page_data, page_url),
      page_url: page_url.to_string(),
    };

    tracker.record(&current).await?;
    let records = tracker.history(current.clone()).await?;
    build_feed(&current, records, base, param.self_link(), now)
  }

  async fn fetch_page_data(
    &self,
    data_base: &Url,
    page_url: &str,
  ) -> Result<Value> {
    let url = page_data_url(data_base, page_url)?;
    self.get_json(&url).await.map_err(|e| {
      warn!("failed to fetch page data from {url}: {e}");
      Error::PageNotFound(format!(
        "Failed to fetch page data for {page_url}: {e}"
      ))
    })
  }

  async fn get_json(&self, url: &Url) -> Result<Value> {
    let resp = self.client.get(url).await?.error_for_status()?;
    resp.json()
  }
}

/// Remembers the last seen hash of a page and the history of changes.
struct Tracker<'a> {
  store: &'a dyn KvStore,
  page_path: String,
}

impl Tracker<'_> {
  fn last_hash_key(&self) -> Vec<String> {
    key([KEY_ROOT, "pages", self.page_path.as_str(), "lastHash"])
  }

  fn changes_prefix(&self) -> Vec<String> {
    key([KEY_ROOT, "changes", self.page_path.as_str()])
  }

  async fn record(&self, current: &PageChangeRecord) -> Result<()> {
    let last_hash = self.store.get(&self.last_hash_key()).await?;
    let last_hash = last_hash.as_ref().and_then(Value::as_str);
    if last_hash == Some(current.hash.as_str()) {
      return Ok(());
    }

    info!("page {} changed, new hash {}", self.page_path, current.hash);
    self
      .store
      .set(self.last_hash_key(), Value::String(current.hash.clone()))
      .await?;

    let mut record_key = self.changes_prefix();
    record_key.push(format!("{:020}", current.timestamp));
    record_key.push(current.hash.clone());
    self
      .store
      .set(record_key, serde_json::to_value(current)?)
      .await
  }

  async fn history(
    &self,
    current: PageChangeRecord,
  ) -> Result<Vec<PageChangeRecord>> {
    let options = ListOptions {
      limit: Some(ITEMS_LIMIT),
      reverse: true,
    };
    let entries = self.store.list(&self.changes_prefix(), options).await?;

    let records: Vec<PageChangeRecord> = entries
      .into_iter()
      .filter_map(|(_, value)| serde_json::from_value(value).ok())
      .collect();

    if records.is_empty() {
      return Ok(vec![current]);
    }
    Ok(records)
  }
}

fn build_feed(
  current: &PageChangeRecord,
  records: Vec<PageChangeRecord>,
  base: &Url,
  self_link: String,
  now: DateTime<Utc>,
) -> Result<Feed> {
  let page_link = site_url(base, &current.page_url)?.to_string();

  let mut items = Vec::with_capacity(records.len());
  for record in records {
    let Some(pub_date) = from_millis(record.timestamp) else {
      continue;
    };
    let link = site_url(base, &record.page_url)?.to_string();
    let updated_at = pub_date.format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let description = html! {
      p { (record.page_title) " was updated at " (updated_at) }
    };

    items.push(FeedItem {
      title: format!("{} was updated", record.page_title),
      link: Some(link.clone()),
      guid: format!("{link}#{}", record.hash),
      guid_is_permalink: false,
      pub_date,
      author: None,
      categories: vec![],
      description: description.into_string(),
    });
  }

  let meta = ChannelMeta {
    title: format!("{} - Update Feed", current.page_title),
    link: page_link,
    description: format!("RSS feed for changes to {}", current.page_title),
    self_link,
  };

  Ok(Feed::new(meta, items, now))
}

/// Only paths on this site are accepted, so feed links can't point at
/// another host.
fn site_path(page: &str) -> Result<&str> {
  let on_site = page.starts_with('/')
    && !page.starts_with("//")
    && !page.contains('\\')
    && !page.contains("://");
  if !on_site {
    return Err(Error::BadRequest(format!(
      "page must be a site path starting with '/': {page}"
    )));
  }
  Ok(page)
}

fn page_path(page_url: &str) -> String {
  page_url.trim_matches('/').to_string()
}

fn page_data_url(data_base: &Url, page_url: &str) -> Result<Url> {
  let base = data_base.as_str().trim_end_matches('/');
  let path = page_path(page_url);
  Ok(Url::parse(&format!("{base}/page-data/{path}/data.json"))?)
}

/// Hash of the rendered page content, stable across unrelated metadata
/// such as build ids.
fn page_hash(page_data: &Value) -> Result<String> {
  let target = page_data
    .pointer("/props/ast")
    .or_else(|| page_data.pointer("/props"))
    .unwrap_or(page_data);
  let bytes = serde_json::to_vec(target)?;
  let hash = blake3::hash(&bytes);
  Ok(hash.to_hex().as_str()[..HASH_LEN].to_string())
}

fn page_title(page_data: &Value, page_url: &str) -> String {
  let non_empty = |pointer: &str| {
    page_data
      .pointer(pointer)
      .and_then(Value::as_str)
      .filter(|s| !s.is_empty())
      .map(str::to_string)
  };

  non_empty("/props/seo/title")
    .or_else(|| non_empty("/props/frontmatter/title"))
    .or_else(|| {
      page_url
        .split('/')
        .filter(|s| !s.is_empty())
        .next_back()
        .map(str::to_string)
    })
    .unwrap_or_else(|| "Untitled Page".to_string())
}

#[cfg(test)]
mod test {
  use chrono::TimeZone;
  use serde_json::json;

  use super::*;
  use crate::kv::MemoryStore;

  #[test]
  fn test_page_title_fallbacks() {
    let data = json!({"props": {"seo": {"title": "SEO"}, "frontmatter": {"title": "FM"}}});
    assert_eq!(page_title(&data, "/docs/a"), "SEO");

    let data = json!({"props": {"seo": {"title": ""}, "frontmatter": {"title": "FM"}}});
    assert_eq!(page_title(&data, "/docs/a"), "FM");

    let data = json!({"props": {}});
    assert_eq!(page_title(&data, "/docs/interact-with-pages/"), "interact-with-pages");
    assert_eq!(page_title(&data, "/"), "Untitled Page");
  }

  #[test]
  fn test_page_hash_prefers_ast() {
    let a = json!({"props": {"ast": {"children": [1, 2]}, "seo": {"title": "A"}}, "build": 1});
    let b = json!({"props": {"ast": {"children": [1, 2]}, "seo": {"title": "B"}}, "build": 2});
    let c = json!({"props": {"ast": {"children": [1, 3]}}});

    let hash = page_hash(&a).unwrap();
    assert_eq!(hash.len(), HASH_LEN);
    assert_eq!(hash, page_hash(&b).unwrap());
    assert_ne!(hash, page_hash(&c).unwrap());
  }

  #[test]
  fn test_site_path() {
    assert_eq!(site_path("/docs/a").unwrap(), "/docs/a");
    for page in ["//evil.com/x", "docs/a", "https://evil.com/", "/\\evil.com"] {
      let err = site_path(page).unwrap_err();
      assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
    }
  }

  fn unreachable_source(page: Option<&str>) -> PageChanges {
    let config = PageChangesConfig {
      page: page.map(str::to_string),
      page_data_base: Some(Url::parse("http://127.0.0.1:9").unwrap()),
    };
    let client = crate::client::ClientConfig::default().build().unwrap();
    PageChanges::new(config, Arc::new(client), Arc::new(MemoryStore::new()))
  }

  #[tokio::test]
  async fn test_failed_page_data_fetch_is_404() {
    let source = unreachable_source(Some("/docs/interact"));
    let base = Url::parse("https://example.com").unwrap();
    let param = EndpointParam::new(Some(base));
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

    let err = source.fetch_feed(&param, now).await.unwrap_err();
    assert_eq!(err.status_code(), http::StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn test_foreign_page_is_rejected() {
    let source = unreachable_source(None);
    let base = Url::parse("https://example.com").unwrap();
    let param = EndpointParam::new(Some(base)).with_page("//other.host/x");
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

    let err = source.fetch_feed(&param, now).await.unwrap_err();
    assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
  }

  #[test]
  fn test_page_data_url() {
    let base = Url::parse("https://example.com/").unwrap();
    let url = page_data_url(&base, "/docs/end-user/interact-with-pages/").unwrap();
    assert_eq!(
      url.as_str(),
      "https://example.com/page-data/docs/end-user/interact-with-pages/data.json"
    );
  }

  fn record(hash: &str, timestamp: i64) -> PageChangeRecord {
    PageChangeRecord {
      hash: hash.into(),
      timestamp,
      page_title: "Interact <with> pages".into(),
      page_url: "/docs/interact".into(),
    }
  }

  #[tokio::test]
  async fn test_tracker_records_only_changes() {
    let store = MemoryStore::new();
    let tracker = Tracker {
      store: &store,
      page_path: page_path("/docs/interact"),
    };

    tracker.record(&record("aaa", 1000)).await.unwrap();
    tracker.record(&record("aaa", 2000)).await.unwrap();
    tracker.record(&record("bbb", 3000)).await.unwrap();

    let history = tracker.history(record("bbb", 4000)).await.unwrap();
    let hashes: Vec<_> = history.iter().map(|r| r.hash.as_str()).collect();
    assert_eq!(hashes, vec!["bbb", "aaa"]);
    assert_eq!(history[0].timestamp, 3000);

    let last = store
      .get(&key([KEY_ROOT, "pages", "docs/interact", "lastHash"]))
      .await
      .unwrap();
    assert_eq!(last, Some(json!("bbb")));
  }

  #[tokio::test]
  async fn test_empty_history_uses_current_state() {
    let store = MemoryStore::new();
    let tracker = Tracker {
      store: &store,
      page_path: "docs/interact".into(),
    };
    let history = tracker.history(record("ccc", 5)).await.unwrap();
    assert_eq!(history, vec![record("ccc", 5)]);
  }

  #[test]
  fn test_build_feed() {
    let base = Url::parse("https://example.com").unwrap();
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let current = record("bbb", 1714521600000);
    let feed = build_feed(
      &current,
      vec![current.clone(), record("aaa", 1714435200000)],
      &base,
      "https://example.com/api/page-rss-feed".into(),
      now,
    )
    .unwrap();

    let channel = feed.channel();
    assert_eq!(channel.title, "Interact <with> pages - Update Feed");
    assert_eq!(channel.link, "https://example.com/docs/interact");

    let item = &channel.items[0];
    assert_eq!(item.title.as_deref(), Some("Interact <with> pages was updated"));
    let guid = item.guid.as_ref().unwrap();
    assert_eq!(guid.value, "https://example.com/docs/interact#bbb");
    assert!(!guid.permalink);
    assert!(
      item
        .description
        .as_deref()
        .unwrap()
        .contains("Interact &lt;with&gt; pages was updated at 2024-05-01 00:00:00 UTC")
    );

    let xml = feed.serialize(false).unwrap();
    assert!(xml.contains("Interact &lt;with&gt; pages was updated"));
  }
}
