use std::path::PathBuf;

use chrono::{DateTime, Utc};
use maud::html;
use serde::{Deserialize, Serialize};

use crate::{
  changelog::{ChangelogData, ChangelogEntry, is_prerelease},
  content::ContentRoot,
  error::Result,
  feed::{ChannelMeta, Feed, FeedItem, newest_first},
  server::EndpointParam,
  util::date::from_millis,
};

use super::site_url;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ChangelogConfig {
  /// Changelog YAML, relative to the content root.
  pub data: PathBuf,
  /// Site path of the human readable changelog page.
  pub page: String,
  pub title: String,
  pub description: String,
  /// Product short names, in display order.
  pub products: Vec<Product>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Product {
  pub name: String,
  pub package: String,
}

impl Default for ChangelogConfig {
  fn default() -> Self {
    let products = [
      ("Realm", "@redocly/realm"),
      ("Reef", "@redocly/reef"),
      ("Revel", "@redocly/revel"),
      ("Redoc", "@redocly/redoc"),
      ("Reunite", "reunite"),
    ]
    .into_iter()
    .map(|(name, package)| Product {
      name: name.into(),
      package: package.into(),
    })
    .collect();

    Self {
      data: "docs/realm/changelogs.yaml".into(),
      page: "/docs/realm/changelog".into(),
      title: "Redocly Changelog".into(),
      description: "Latest changes and updates to Redocly products \
                    (Realm, Reef, Revel, Redoc, Reunite)"
        .into(),
      products,
    }
  }
}

struct Release<'a> {
  package: &'a str,
  version: &'a str,
  entry: ChangelogEntry,
}

impl ChangelogConfig {
  pub async fn load(&self, content: &ContentRoot) -> Result<ChangelogData> {
    content.read_yaml(&self.data).await
  }

  pub fn build_feed(
    &self,
    data: &ChangelogData,
    param: &EndpointParam,
    now: DateTime<Utc>,
  ) -> Result<Feed> {
    let page_url = site_url(param.base()?, &self.page)?;
    let selected = param.products().map(|names| self.packages_for(names));

    let mut releases = Vec::new();
    for (package, versions) in data {
      if selected.as_ref().is_some_and(|s| !s.contains(package)) {
        continue;
      }

      for (version, entry) in versions {
        if is_prerelease(version) && !param.include_rc() {
          continue;
        }

        let entry = entry.resolve(data);
        if !entry.has_changes() {
          continue;
        }

        releases.push(Release {
          package,
          version,
          entry,
        });
      }
    }

    let mut items: Vec<_> = releases
      .into_iter()
      .filter_map(|release| self.render_item(release, page_url.as_str()))
      .collect();
    newest_first(&mut items);

    let meta = ChannelMeta {
      title: self.title.clone(),
      link: page_url.to_string(),
      description: self.description.clone(),
      self_link: param.self_link(),
    };

    Ok(Feed::new(meta, items, now))
  }

  /// Maps product short names to package names. Names that are not
  /// products are taken as package names.
  fn packages_for(&self, names: &[String]) -> Vec<String> {
    names
      .iter()
      .map(|name| {
        self
          .products
          .iter()
          .find(|p| p.name == *name)
          .map(|p| p.package.clone())
          .unwrap_or_else(|| name.clone())
      })
      .collect()
  }

  fn short_name<'a>(&'a self, package: &'a str) -> &'a str {
    self
      .products
      .iter()
      .find(|p| p.package == package)
      .map(|p| p.name.as_str())
      .unwrap_or(package)
  }

  fn render_item(&self, release: Release, page_url: &str) -> Option<FeedItem> {
    let pub_date = from_millis(release.entry.timestamp)?;
    let short = self.short_name(release.package);
    let link = format!("{page_url}#{short}@{}", release.version);

    Some(FeedItem {
      title: format!("{short} {}", release.version),
      link: Some(link.clone()),
      guid: link,
      guid_is_permalink: true,
      pub_date,
      author: None,
      categories: vec![],
      description: release_notes(&release, pub_date),
    })
  }
}

fn release_notes(release: &Release, date: DateTime<Utc>) -> String {
  let features = &release.entry.changes.minor;
  let fixes = &release.entry.changes.patch;
  let summary = format!(
    "New release: {}@{} · Date: {} · {} · {}",
    release.package,
    release.version,
    date.format("%Y-%m-%d"),
    count(features.len(), "feature", "features"),
    count(fixes.len(), "fix", "fixes"),
  );

  html! {
    p style="margin:0 0 12px;" { strong { (summary) } }
    @if !features.is_empty() {
      p style="margin:0 0 6px;" { strong { "Features:" } }
      ul style="margin:0 0 12px 18px; padding:0; list-style:disc;" {
        @for feature in features {
          li style="margin:0 0 4px; list-style-position:inside;" { (feature) }
        }
      }
    }
    @if !fixes.is_empty() {
      p style="margin:0 0 6px;" { strong { "Fixes:" } }
      ul style="margin:0 0 12px 18px; padding:0; list-style:disc;" {
        @for fix in fixes {
          li style="margin:0 0 4px; list-style-position:inside;" { (fix) }
        }
      }
    }
  }
  .into_string()
}

fn count(n: usize, singular: &str, plural: &str) -> String {
  format!("{n} {}", if n == 1 { singular } else { plural })
}

#[cfg(test)]
mod test {
  use chrono::TimeZone;
  use url::Url;

  use super::*;

  const DATA: &str = r#"
"@redocly/realm":
  "0.100.0":
    timestamp: 1714521600000
    changes:
      minor: ["Added <Tabs> & friends"]
      patch: ["Fixed ]]> in code blocks"]
    dependencies:
      "@redocly/reef": "0.50.0"
  "0.101.0-next.1":
    timestamp: 1714608000000
    changes:
      minor: ["Preview feature"]
  "0.99.0":
    timestamp: 1714435200000
    changes: {}
"@redocly/reef":
  "0.50.0":
    timestamp: 1714521600000
    changes:
      patch: ["Reef fix"]
reunite:
  "1.2.0":
    timestamp: 1714694400000
    changes:
      patch: ["Reunite fix"]
"#;

  fn data() -> ChangelogData {
    serde_yaml::from_str(DATA).unwrap()
  }

  fn param() -> EndpointParam {
    let base = Url::parse("https://example.com").unwrap();
    EndpointParam::new(Some(base)).with_path("/api/changelog-rss")
  }

  fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
  }

  fn titles(feed: &Feed) -> Vec<&str> {
    feed
      .channel()
      .items
      .iter()
      .filter_map(|i| i.title.as_deref())
      .collect()
  }

  #[test]
  fn test_all_products_newest_first() {
    let config = ChangelogConfig::default();
    let feed = config.build_feed(&data(), &param(), now()).unwrap();

    // pre-releases are hidden and releases without changes are skipped
    assert_eq!(
      titles(&feed),
      vec!["Reunite 1.2.0", "Realm 0.100.0", "Reef 0.50.0"]
    );
    assert_eq!(
      feed.channel().link,
      "https://example.com/docs/realm/changelog"
    );
  }

  #[test]
  fn test_products_and_prereleases() {
    let config = ChangelogConfig::default();
    let param = param()
      .with_products(vec!["Realm".into()])
      .with_include_rc(true);
    let feed = config.build_feed(&data(), &param, now()).unwrap();

    assert_eq!(titles(&feed), vec!["Realm 0.101.0-next.1", "Realm 0.100.0"]);
  }

  #[test]
  fn test_item_contents() {
    let config = ChangelogConfig::default();
    let param = param().with_products(vec!["@redocly/realm".into()]);
    let feed = config.build_feed(&data(), &param, now()).unwrap();
    let item = &feed.channel().items[0];

    assert_eq!(
      item.link.as_deref(),
      Some("https://example.com/docs/realm/changelog#Realm@0.100.0")
    );
    assert_eq!(
      item.pub_date.as_deref(),
      Some("Wed, 01 May 2024 00:00:00 GMT")
    );

    let description = item.description.as_deref().unwrap();
    assert!(description.contains(
      "New release: @redocly/realm@0.100.0 · Date: 2024-05-01 · 1 feature · 2 fixes"
    ));
    assert!(description.contains("Added &lt;Tabs&gt; &amp; friends"));
    // the reef fix shipped in the same release
    assert!(description.contains("Reef fix"));
    assert!(!description.contains("]]>"));
  }

  #[test]
  fn test_rendered_xml_is_readable() {
    let config = ChangelogConfig::default();
    let feed = config.build_feed(&data(), &param(), now()).unwrap();
    let xml = feed.serialize(false).unwrap();

    let parsed = rss::Channel::read_from(xml.as_bytes()).unwrap();
    assert_eq!(parsed.items.len(), 3);
    assert_eq!(parsed.title, "Redocly Changelog");
  }
}
