//! RSS 2.0 rendering of normalized feed records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rss::extension::atom::{AtomExtension, Link};

use crate::error::Result;
use crate::util::date::rss_date;

pub const CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";
pub const ITEMS_LIMIT: usize = 50;

const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";
const LANGUAGE: &str = "en-us";

/// Channel level metadata of a rendered feed.
#[derive(Debug, Clone, Default)]
pub struct ChannelMeta {
  pub title: String,
  pub link: String,
  pub description: String,
  /// URL of the feed itself, emitted as `atom:link rel="self"`.
  pub self_link: String,
}

/// One feed entry, independent of which content source produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
  pub title: String,
  pub link: Option<String>,
  pub guid: String,
  pub guid_is_permalink: bool,
  pub pub_date: DateTime<Utc>,
  pub author: Option<String>,
  pub categories: Vec<String>,
  /// HTML, written into a CDATA section.
  pub description: String,
}

impl FeedItem {
  pub fn into_rss_item(self) -> rss::Item {
    let guid = rss::Guid {
      value: self.guid,
      permalink: self.guid_is_permalink,
    };

    let categories = self
      .categories
      .into_iter()
      .map(|name| rss::Category { name, domain: None })
      .collect();

    rss::Item {
      title: Some(self.title),
      link: self.link,
      description: Some(self.description),
      pub_date: Some(rss_date(self.pub_date)),
      author: self.author,
      categories,
      guid: Some(guid),
      ..Default::default()
    }
  }
}

/// Newest first, stable for equal dates, capped at [`ITEMS_LIMIT`].
pub fn newest_first(items: &mut Vec<FeedItem>) {
  items.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));
  items.truncate(ITEMS_LIMIT);
}

#[derive(Debug, Clone)]
pub struct Feed {
  channel: rss::Channel,
}

impl Feed {
  pub fn new(
    meta: ChannelMeta,
    items: Vec<FeedItem>,
    last_build: DateTime<Utc>,
  ) -> Self {
    let mut namespaces = BTreeMap::new();
    namespaces.insert("atom".to_string(), ATOM_NAMESPACE.to_string());

    let self_link = Link {
      href: meta.self_link,
      rel: "self".into(),
      mime_type: Some("application/rss+xml".into()),
      ..Default::default()
    };

    let channel = rss::Channel {
      title: meta.title,
      link: meta.link,
      description: meta.description,
      language: Some(LANGUAGE.into()),
      last_build_date: Some(rss_date(last_build)),
      namespaces,
      atom_ext: Some(AtomExtension {
        links: vec![self_link],
      }),
      items: items.into_iter().map(FeedItem::into_rss_item).collect(),
      ..Default::default()
    };

    Self { channel }
  }

  pub fn channel(&self) -> &rss::Channel {
    &self.channel
  }

  pub fn serialize(&self, pretty: bool) -> Result<String> {
    let mut buffer = vec![];
    if pretty {
      self.channel.pretty_write_to(&mut buffer, b' ', 2)?;
    } else {
      self.channel.write_to(&mut buffer)?;
    }

    Ok(String::from_utf8_lossy(&buffer).into_owned())
  }
}
