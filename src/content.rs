//! Access to the locally authored content files.

mod frontmatter;

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

pub use frontmatter::extract_frontmatter;

/// The directory all content paths are resolved against. Configured once
/// at startup.
#[derive(Clone, Debug)]
pub struct ContentRoot {
  root: PathBuf,
}

impl ContentRoot {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
    self.root.join(relative)
  }

  pub async fn read_to_string(
    &self,
    relative: impl AsRef<Path>,
  ) -> Result<String> {
    let path = self.resolve(relative);
    tokio::fs::read_to_string(&path)
      .await
      .map_err(|source| Error::ContentSource {
        path: path.display().to_string(),
        source,
      })
  }

  pub async fn read_yaml<T: DeserializeOwned>(
    &self,
    relative: impl AsRef<Path>,
  ) -> Result<T> {
    let content = self.read_to_string(relative).await?;
    Ok(serde_yaml::from_str(&content)?)
  }

  pub async fn read_json<T: DeserializeOwned>(
    &self,
    relative: impl AsRef<Path>,
  ) -> Result<T> {
    let content = self.read_to_string(relative).await?;
    Ok(serde_json::from_str(&content)?)
  }

  /// Files directly inside `dir` whose extension is `ext`, sorted by
  /// name. Failing to list the directory is an error; unreadable entries
  /// are skipped.
  pub async fn list_files(
    &self,
    dir: impl AsRef<Path>,
    ext: &str,
  ) -> Result<Vec<PathBuf>> {
    let dir = self.resolve(dir);
    let content_err = |source| Error::ContentSource {
      path: dir.display().to_string(),
      source,
    };

    let mut entries = tokio::fs::read_dir(&dir).await.map_err(content_err)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(content_err)? {
      let is_file = entry
        .file_type()
        .await
        .map(|t| t.is_file())
        .unwrap_or(false);
      let path = entry.path();
      if is_file && path.extension().is_some_and(|e| e == ext) {
        files.push(path);
      }
    }

    files.sort();
    Ok(files)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[tokio::test]
  async fn test_list_files_filters_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("b.md"), "b").unwrap();
    std::fs::write(dir.path().join("a.md"), "a").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
    std::fs::create_dir(dir.path().join("dir.md")).unwrap();

    let root = ContentRoot::new(dir.path());
    let files = root.list_files(".", "md").await.unwrap();
    let names: Vec<_> = files
      .iter()
      .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
      .collect();
    assert_eq!(names, vec!["a.md", "b.md"]);
  }

  #[tokio::test]
  async fn test_missing_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let root = ContentRoot::new(dir.path());
    let err = root.list_files("blog", "md").await.unwrap_err();
    assert!(matches!(err, Error::ContentSource { .. }));
  }
}
