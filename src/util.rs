pub mod date;

use std::{
  hash::Hash,
  num::NonZeroUsize,
  sync::RwLock,
  time::{Duration, Instant},
};

use lru::LruCache;
use serde::{Deserialize, Deserializer, de::IgnoredAny};

pub const USER_AGENT: &str =
  concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Deserializes `null` as the type's default.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Deserializes a list, treating `null`, scalars and other non-list
/// values as empty.
pub fn list_or_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum ListOrOther<T> {
    List(Vec<T>),
    Other(IgnoredAny),
  }

  match ListOrOther::<T>::deserialize(deserializer)? {
    ListOrOther::List(list) => Ok(list),
    ListOrOther::Other(_) => Ok(Vec::new()),
  }
}

pub struct Timed<T> {
  value: T,
  created: Instant,
}

pub struct TimedLruCache<K: Hash + Eq, V: Clone> {
  map: RwLock<LruCache<K, Timed<V>>>,
  timeout: Duration,
}

impl<K: Hash + Eq, V: Clone> TimedLruCache<K, V> {
  pub fn new(max_entries: usize, timeout: Duration) -> Self {
    let max_entries = max_entries.try_into().unwrap_or(NonZeroUsize::MIN);
    Self {
      map: RwLock::new(LruCache::new(max_entries)),
      timeout,
    }
  }

  pub fn get_cached(&self, key: &K) -> Option<V> {
    let mut map = self.map.write().ok()?;
    let entry = map.get(key)?;
    if entry.created.elapsed() > self.timeout {
      map.pop(key);
      return None;
    }
    Some(entry.value.clone())
  }

  pub fn insert(&self, key: K, value: V) -> Option<()> {
    let timed = Timed {
      value,
      created: Instant::now(),
    };
    self.map.write().ok()?.push(key, timed);
    Some(())
  }
}
