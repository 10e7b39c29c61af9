//! Minimal key-value store used to remember page state between requests.

use std::collections::BTreeMap;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::Result;

pub type Key = Vec<String>;

#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
  pub limit: Option<usize>,
  /// Iterate from the greatest key down.
  pub reverse: bool,
}

#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
  async fn get(&self, key: &[String]) -> Result<Option<Value>>;

  async fn set(&self, key: Key, value: Value) -> Result<()>;

  /// Entries whose key starts with `prefix`, ordered by key.
  async fn list(
    &self,
    prefix: &[String],
    options: ListOptions,
  ) -> Result<Vec<(Key, Value)>>;
}

/// Builds a key from string-like segments.
pub fn key<I, S>(segments: I) -> Key
where
  I: IntoIterator<Item = S>,
  S: Into<String>,
{
  segments.into_iter().map(Into::into).collect()
}

/// Process-local store. Writes are last-write-wins.
#[derive(Default)]
pub struct MemoryStore {
  entries: RwLock<BTreeMap<Key, Value>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait::async_trait]
impl KvStore for MemoryStore {
  async fn get(&self, key: &[String]) -> Result<Option<Value>> {
    Ok(self.entries.read().await.get(key).cloned())
  }

  async fn set(&self, key: Key, value: Value) -> Result<()> {
    self.entries.write().await.insert(key, value);
    Ok(())
  }

  async fn list(
    &self,
    prefix: &[String],
    options: ListOptions,
  ) -> Result<Vec<(Key, Value)>> {
    let entries = self.entries.read().await;
    let matching = entries
      .range(prefix.to_vec()..)
      .take_while(|(k, _)| k.starts_with(prefix))
      .map(|(k, v)| (k.clone(), v.clone()));

    let limit = options.limit.unwrap_or(usize::MAX);
    let items = if options.reverse {
      let mut all: Vec<_> = matching.collect();
      all.reverse();
      all.truncate(limit);
      all
    } else {
      matching.take(limit).collect()
    };

    Ok(items)
  }
}

#[cfg(test)]
mod test {
  use serde_json::json;

  use super::*;

  #[tokio::test]
  async fn test_get_set() {
    let store = MemoryStore::new();
    assert_eq!(store.get(&key(["a"])).await.unwrap(), None);

    store.set(key(["a"]), json!("one")).await.unwrap();
    store.set(key(["a"]), json!("two")).await.unwrap();
    assert_eq!(store.get(&key(["a"])).await.unwrap(), Some(json!("two")));
  }

  #[tokio::test]
  async fn test_list_by_prefix() {
    let store = MemoryStore::new();
    for i in 1..=4 {
      let stamp = format!("{i:03}");
      store
        .set(key(["changes", "page", stamp.as_str()]), json!(i))
        .await
        .unwrap();
    }
    store.set(key(["changes", "other", "001"]), json!(0)).await.unwrap();
    store.set(key(["pages", "page"]), json!(-1)).await.unwrap();

    let prefix = key(["changes", "page"]);
    let forward = store.list(&prefix, ListOptions::default()).await.unwrap();
    let values: Vec<_> = forward.into_iter().map(|(_, v)| v).collect();
    assert_eq!(values, vec![json!(1), json!(2), json!(3), json!(4)]);

    let options = ListOptions {
      limit: Some(2),
      reverse: true,
    };
    let backward = store.list(&prefix, options).await.unwrap();
    let values: Vec<_> = backward.into_iter().map(|(_, v)| v).collect();
    assert_eq!(values, vec![json!(4), json!(3)]);
  }
}
