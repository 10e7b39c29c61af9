//! Changelog records and same-release dependency resolution.
//!
//! A release of one package often bundles fresh releases of other
//! packages. Resolving an entry folds the change notes of those bundled
//! releases into its own lists so a single feed item describes everything
//! that shipped together.

use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::util::null_as_default;

/// `package -> version -> entry`, in file order.
pub type ChangelogData = IndexMap<String, IndexMap<String, ChangelogEntry>>;

/// Legacy package names looked up under their successor's name.
const PACKAGE_ALIASES: &[(&str, &str)] = &[("@redocly/portal", "@redocly/realm")];

const PRERELEASE_MARKER: &str = "-next";

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Changes {
  #[serde(default, deserialize_with = "null_as_default")]
  pub minor: Vec<String>,
  #[serde(default, deserialize_with = "null_as_default")]
  pub patch: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangelogEntry {
  /// Release time in epoch millis.
  #[serde(default)]
  pub timestamp: i64,
  #[serde(default, deserialize_with = "null_as_default")]
  pub changes: Changes,
  #[serde(default, deserialize_with = "null_as_default")]
  pub dependencies: IndexMap<String, String>,
}

impl Changes {
  pub fn is_empty(&self) -> bool {
    self.minor.is_empty() && self.patch.is_empty()
  }

  fn dedup(self) -> Self {
    Self {
      minor: self.minor.into_iter().unique().collect(),
      patch: self.patch.into_iter().unique().collect(),
    }
  }
}

impl ChangelogEntry {
  pub fn has_changes(&self) -> bool {
    !self.changes.is_empty()
  }

  /// Returns a copy of this entry with the changes of every dependency
  /// released at the same timestamp merged in, depth-first in dependency
  /// order, without duplicates.
  pub fn resolve(&self, data: &ChangelogData) -> ChangelogEntry {
    let mut path = Vec::new();
    ChangelogEntry {
      timestamp: self.timestamp,
      changes: self.resolve_changes(data, &mut path),
      dependencies: self.dependencies.clone(),
    }
  }

  fn resolve_changes(
    &self,
    data: &ChangelogData,
    path: &mut Vec<String>,
  ) -> Changes {
    let mut changes = self.changes.clone();

    for (dep_package, dep_version) in &self.dependencies {
      if path.contains(dep_package) {
        continue;
      }

      let Some(dep) = lookup(data, dep_package, dep_version) else {
        continue;
      };

      // a different timestamp means the dependency shipped in an
      // earlier release and was already reported there
      if dep.timestamp != self.timestamp {
        continue;
      }

      path.push(dep_package.clone());
      let dep_changes = dep.resolve_changes(data, path);
      path.pop();

      changes.minor.extend(dep_changes.minor);
      changes.patch.extend(dep_changes.patch);
    }

    changes.dedup()
  }
}

pub fn is_prerelease(version: &str) -> bool {
  version.contains(PRERELEASE_MARKER)
}

fn canonical_package(package: &str) -> &str {
  PACKAGE_ALIASES
    .iter()
    .find_map(|(legacy, current)| (*legacy == package).then_some(*current))
    .unwrap_or(package)
}

fn lookup<'a>(
  data: &'a ChangelogData,
  package: &str,
  version: &str,
) -> Option<&'a ChangelogEntry> {
  data.get(canonical_package(package))?.get(version)
}

#[cfg(test)]
mod test {
  use super::*;

  const FIXTURE: &str = r#"
"@redocly/realm":
  "0.100.0":
    timestamp: 1000
    changes:
      minor: ["Realm feature"]
      patch: ["Shared fix", "Realm fix"]
    dependencies:
      "@redocly/reef": "0.50.0"
      "@redocly/revel": "0.40.0"
  "0.99.0":
    timestamp: 500
    changes:
      minor: []
      patch: ["Old fix"]
"@redocly/reef":
  "0.50.0":
    timestamp: 1000
    changes:
      minor: ["Reef feature"]
      patch: ["Shared fix"]
    dependencies:
      "@redocly/revel": "0.40.0"
"@redocly/revel":
  "0.40.0":
    timestamp: 1000
    changes:
      minor: ["Revel feature"]
      patch: ["Shared fix"]
  "0.39.0":
    timestamp: 200
    changes:
      minor: ["Stale revel feature"]
"#;

  fn fixture() -> ChangelogData {
    serde_yaml::from_str(FIXTURE).unwrap()
  }

  fn entry(data: &ChangelogData, package: &str, version: &str) -> ChangelogEntry {
    data[package][version].clone()
  }

  #[test]
  fn test_no_dependencies_is_identity() {
    let data = fixture();
    let old = entry(&data, "@redocly/realm", "0.99.0");
    let resolved = old.resolve(&data);
    assert_eq!(resolved, old);

    let entry = ChangelogEntry {
      timestamp: 1,
      changes: Changes {
        minor: vec!["b".into(), "a".into()],
        patch: vec!["z".into()],
      },
      dependencies: IndexMap::new(),
    };
    assert_eq!(entry.resolve(&data).changes, entry.changes);
  }

  #[test]
  fn test_merges_same_release_dependencies_in_order() {
    let data = fixture();
    let resolved = entry(&data, "@redocly/realm", "0.100.0").resolve(&data);

    assert_eq!(
      resolved.changes.minor,
      vec!["Realm feature", "Reef feature", "Revel feature"]
    );
    // "Shared fix" appears on three paths and is kept once
    assert_eq!(resolved.changes.patch, vec!["Shared fix", "Realm fix"]);
  }

  #[test]
  fn test_timestamp_mismatch_is_excluded() {
    let mut data = fixture();
    data["@redocly/realm"]["0.100.0"]
      .dependencies
      .insert("@redocly/revel".into(), "0.39.0".into());
    data["@redocly/reef"]["0.50.0"].dependencies.clear();

    let resolved = entry(&data, "@redocly/realm", "0.100.0").resolve(&data);
    assert!(
      !resolved
        .changes
        .minor
        .contains(&"Stale revel feature".to_string())
    );
    assert_eq!(resolved.changes.minor, vec!["Realm feature", "Reef feature"]);
  }

  #[test]
  fn test_cyclic_dependencies_terminate() {
    let yaml = r#"
a:
  "1": { timestamp: 7, changes: { minor: ["a"] }, dependencies: { b: "1" } }
b:
  "1": { timestamp: 7, changes: { minor: ["b"] }, dependencies: { a: "1", b: "1" } }
"#;
    let data: ChangelogData = serde_yaml::from_str(yaml).unwrap();
    let resolved = entry(&data, "a", "1").resolve(&data);
    assert_eq!(resolved.changes.minor, vec!["a", "b"]);
  }

  #[test]
  fn test_legacy_package_alias() {
    let yaml = r#"
"@redocly/realm":
  "2.0.0": { timestamp: 3, changes: { patch: ["portal fix"] } }
"@redocly/reef":
  "1.0.0":
    timestamp: 3
    dependencies: { "@redocly/portal": "2.0.0" }
"#;
    let data: ChangelogData = serde_yaml::from_str(yaml).unwrap();
    let resolved = entry(&data, "@redocly/reef", "1.0.0").resolve(&data);
    assert_eq!(resolved.changes.patch, vec!["portal fix"]);
    assert!(resolved.changes.minor.is_empty());
  }

  #[test]
  fn test_missing_dependency_and_changes_are_tolerated() {
    let yaml = r#"
a:
  "1":
    timestamp: 1
    changes: ~
    dependencies: { ghost: "9.9.9", b: "404" }
b:
  "1": { timestamp: 1 }
"#;
    let data: ChangelogData = serde_yaml::from_str(yaml).unwrap();
    let resolved = entry(&data, "a", "1").resolve(&data);
    assert!(!resolved.has_changes());
  }

  #[test]
  fn test_prerelease_versions() {
    assert!(is_prerelease("0.101.0-next.3"));
    assert!(!is_prerelease("0.101.0"));
  }
}
