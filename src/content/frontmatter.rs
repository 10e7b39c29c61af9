use serde::de::DeserializeOwned;

use crate::error::Result;

const DELIMITER: &str = "---";

/// Parse the `---` delimited YAML block at the top of a Markdown
/// document. Documents without a frontmatter block yield `None`.
pub fn extract_frontmatter<T: DeserializeOwned>(
  content: &str,
) -> Result<Option<T>> {
  let mut lines = content.lines();
  if lines.next().map(str::trim) != Some(DELIMITER) {
    return Ok(None);
  }

  let mut block = Vec::new();
  for line in lines {
    if line.trim() == DELIMITER {
      let yaml = block.join("\n");
      if yaml.trim().is_empty() {
        return Ok(None);
      }
      return Ok(Some(serde_yaml::from_str(&yaml)?));
    }
    block.push(line);
  }

  // unterminated block
  Ok(None)
}
