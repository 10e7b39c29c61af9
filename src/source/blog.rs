use std::{collections::HashMap, path::PathBuf};

use chrono::{DateTime, FixedOffset, Utc};
use maud::html;
use serde::{Deserialize, Serialize, de::IgnoredAny};
use tracing::{info, warn};

use crate::{
  content::{ContentRoot, extract_frontmatter},
  error::Result,
  feed::{ChannelMeta, Feed, FeedItem, newest_first},
  server::EndpointParam,
  util::{date::parse_date, list_or_empty, null_as_default},
};

use super::site_url;

pub const DEFAULT_AUTHOR: &str = "Redocly Team";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BlogConfig {
  /// Pre-built post list, preferred when present.
  pub page_data: PathBuf,
  /// Directory holding the Markdown posts.
  pub dir: PathBuf,
  /// Author and category lookup tables.
  pub metadata: PathBuf,
  /// Site path of the blog, also the slug prefix of Markdown posts.
  pub slug: String,
  pub title: String,
  pub description: String,
}

impl Default for BlogConfig {
  fn default() -> Self {
    Self {
      page_data: "client/page-data/shared/blog-posts.json".into(),
      dir: "blog".into(),
      metadata: "blog/metadata/blog-metadata.yaml".into(),
      slug: "/blog/".into(),
      title: "Redocly Blog".into(),
      description: "Latest posts from the Redocly blog.".into(),
    }
  }
}

/// A post ready to be rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct BlogPost {
  pub slug: String,
  pub title: String,
  pub description: String,
  pub date: DateTime<FixedOffset>,
  pub author: String,
  pub categories: Vec<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct BlogMetadata {
  #[serde(default)]
  authors: Vec<MetadataAuthor>,
  #[serde(default)]
  categories: Vec<MetadataCategory>,
}

#[derive(Deserialize, Debug)]
struct MetadataAuthor {
  id: String,
  name: Option<String>,
}

#[derive(Deserialize, Debug)]
struct MetadataCategory {
  id: String,
  label: Option<String>,
}

/// Author and category names by id.
#[derive(Debug, Default)]
struct Lookup {
  authors: HashMap<String, String>,
  categories: HashMap<String, String>,
}

impl From<BlogMetadata> for Lookup {
  fn from(metadata: BlogMetadata) -> Self {
    let authors = metadata
      .authors
      .into_iter()
      .map(|a| {
        let name = a.name.unwrap_or_else(|| a.id.clone());
        (a.id, name)
      })
      .collect();
    let categories = metadata
      .categories
      .into_iter()
      .map(|c| {
        let label = c.label.unwrap_or_else(|| c.id.clone());
        (c.id, label)
      })
      .collect();

    Self {
      authors,
      categories,
    }
  }
}

#[derive(Deserialize, Debug, Default)]
struct Frontmatter {
  title: Option<String>,
  description: Option<String>,
  date: Option<String>,
  author: Option<String>,
  #[serde(default, deserialize_with = "list_or_empty")]
  categories: Vec<String>,
  #[serde(default, deserialize_with = "null_as_default")]
  ignore: bool,
}

#[derive(Deserialize, Debug)]
struct PageDataPosts {
  #[serde(default, deserialize_with = "null_as_default")]
  posts: Vec<PageDataPost>,
}

#[derive(Deserialize, Debug)]
struct PageDataPost {
  #[serde(default, deserialize_with = "null_as_default")]
  slug: String,
  #[serde(default, deserialize_with = "null_as_default")]
  title: String,
  description: Option<String>,
  date: Option<String>,
  author: Option<PageDataAuthor>,
  #[serde(default, deserialize_with = "list_or_empty")]
  categories: Vec<PageDataCategory>,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum PageDataAuthor {
  Named { name: Option<String> },
  Plain(String),
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum PageDataCategory {
  Labelled { label: String },
  Nested { category: CategoryLabel },
  Other(IgnoredAny),
}

#[derive(Deserialize, Debug)]
struct CategoryLabel {
  label: String,
}

impl PageDataPost {
  fn normalize(self) -> Option<BlogPost> {
    let date = parse_date(self.date?)?;
    let author = match self.author {
      Some(PageDataAuthor::Named { name: Some(name) })
      | Some(PageDataAuthor::Plain(name)) => name,
      _ => DEFAULT_AUTHOR.to_string(),
    };
    let categories = self
      .categories
      .into_iter()
      .filter_map(|c| match c {
        PageDataCategory::Labelled { label }
        | PageDataCategory::Nested {
          category: CategoryLabel { label },
        } => Some(label),
        PageDataCategory::Other(_) => None,
      })
      .collect();

    Some(BlogPost {
      slug: self.slug,
      title: self.title,
      description: self.description.unwrap_or_default(),
      date,
      author,
      categories,
    })
  }
}

impl Frontmatter {
  fn normalize(self, slug: String, lookup: &Lookup) -> Option<BlogPost> {
    if self.ignore {
      return None;
    }

    let title = self.title?;
    let date = parse_date(self.date?)?;
    let author = self
      .author
      .and_then(|id| lookup.authors.get(&id).cloned())
      .unwrap_or_else(|| DEFAULT_AUTHOR.to_string());
    let categories = self
      .categories
      .iter()
      .filter_map(|id| lookup.categories.get(id).cloned())
      .collect();

    Some(BlogPost {
      slug,
      title,
      description: self.description.unwrap_or_default(),
      date,
      author,
      categories,
    })
  }
}

impl BlogConfig {
  pub async fn load(&self, content: &ContentRoot) -> Result<Vec<BlogPost>> {
    match self.load_page_data(content).await {
      Ok(posts) => Ok(posts),
      Err(e) => {
        info!("blog page data unavailable, reading Markdown posts: {e}");
        self.load_markdown(content).await
      }
    }
  }

  async fn load_page_data(
    &self,
    content: &ContentRoot,
  ) -> Result<Vec<BlogPost>> {
    let data: PageDataPosts = content.read_json(&self.page_data).await?;
    Ok(
      data
        .posts
        .into_iter()
        .filter_map(PageDataPost::normalize)
        .collect(),
    )
  }

  async fn load_markdown(&self, content: &ContentRoot) -> Result<Vec<BlogPost>> {
    let lookup = match content.read_yaml::<BlogMetadata>(&self.metadata).await
    {
      Ok(metadata) => Lookup::from(metadata),
      Err(e) => {
        warn!("failed to read blog metadata: {e}");
        Lookup::default()
      }
    };

    let files = content.list_files(&self.dir, "md").await?;
    let mut posts = Vec::with_capacity(files.len());

    for file in files {
      let Some(stem) = file.file_stem().and_then(|s| s.to_str()) else {
        continue;
      };
      let slug = format!("{}{stem}", self.slug);

      let text = match tokio::fs::read_to_string(&file).await {
        Ok(text) => text,
        Err(e) => {
          warn!("skipping unreadable post {}: {e}", file.display());
          continue;
        }
      };

      let frontmatter = match extract_frontmatter::<Frontmatter>(&text) {
        Ok(frontmatter) => frontmatter.unwrap_or_default(),
        Err(e) => {
          warn!("skipping post {} with bad frontmatter: {e}", file.display());
          continue;
        }
      };

      if let Some(post) = frontmatter.normalize(slug, &lookup) {
        posts.push(post);
      }
    }

    Ok(posts)
  }

  pub fn build_feed(
    &self,
    posts: Vec<BlogPost>,
    param: &EndpointParam,
    now: DateTime<Utc>,
  ) -> Result<Feed> {
    let base = param.base()?;

    let mut items = Vec::with_capacity(posts.len());
    for post in posts {
      let link = site_url(base, &post.slug)?.to_string();
      items.push(FeedItem {
        title: post.title,
        link: Some(link.clone()),
        guid: link,
        guid_is_permalink: true,
        pub_date: post.date.with_timezone(&Utc),
        author: Some(post.author),
        categories: post.categories,
        description: html! { p { (post.description) } }.into_string(),
      });
    }
    newest_first(&mut items);

    let meta = ChannelMeta {
      title: self.title.clone(),
      link: site_url(base, &self.slug)?.to_string(),
      description: self.description.clone(),
      self_link: param.self_link(),
    };

    Ok(Feed::new(meta, items, now))
  }
}
