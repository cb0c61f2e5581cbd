use std::fs::read_to_string;
use std::path::{Path, PathBuf};

use strata_value::{yaml, Document};

use crate::{sources::ConfigSource, ComposeError};

/// A config root on the filesystem: groups are directories, configs are
/// `<name>.yaml` (or `.yml`) files.
pub struct FileSource {
  provider: String,
  root: PathBuf,
}

impl FileSource {
  pub fn new(provider: &str, root: &str) -> Self {
    Self {
      provider: provider.to_string(),
      root: PathBuf::from(root),
    }
  }

  fn resolve_config(&self, path: &str) -> Option<PathBuf> {
    if path.ends_with(".yaml") || path.ends_with(".yml") {
      let full = self.root.join(path);
      return full.is_file().then_some(full);
    }
    for ext in ["yaml", "yml"] {
      let full = self.root.join(format!("{path}.{ext}"));
      if full.is_file() {
        return Some(full);
      }
    }
    None
  }
}

impl ConfigSource for FileSource {
  fn provider(&self) -> &str {
    &self.provider
  }

  fn uri(&self) -> String {
    format!("file://{}", self.root.display())
  }

  fn scheme(&self) -> &'static str {
    "file"
  }

  fn available(&self) -> bool {
    self.root.is_dir()
  }

  fn is_group(&self, path: &str) -> bool {
    self.root.join(path).is_dir()
  }

  fn is_config(&self, path: &str) -> bool {
    self.resolve_config(path).is_some()
  }

  fn list(&self, group: &str) -> Vec<String> {
    let dir = self.root.join(group);
    let Ok(entries) = dir.read_dir() else {
      return Vec::new();
    };

    let mut names: Vec<String> = entries
      .filter_map(Result::ok)
      .filter_map(|entry| {
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        if path.is_dir() {
          Some(name)
        } else if name.ends_with(".yaml") || name.ends_with(".yml") {
          Some(crate::sources::strip_extension(&name).to_string())
        } else {
          None
        }
      })
      .collect();
    names.sort();
    names.dedup();
    names
  }

  fn load(&self, path: &str) -> Result<Document, ComposeError> {
    let full_path = self.resolve_config(path).ok_or_else(|| ComposeError::ConfigLoad {
      path: path.to_string(),
      message: format!("config not found in {}", self.uri()),
    })?;

    let content = read_to_string(&full_path).map_err(|e| ComposeError::ConfigLoad {
      path: path.to_string(),
      message: format!("could not read `{}`: {e}", full_path.display()),
    })?;

    let mut doc = yaml::parse_document(&content).map_err(|e| ComposeError::ConfigLoad {
      path: path.to_string(),
      message: e.to_string(),
    })?;
    doc.source_provider = self.provider.clone();
    doc.source_uri = self.uri();
    doc.path_in_source = path.to_string();
    Ok(doc)
  }
}

/// Creates a [`FileSource`] from a directory [`Path`].
impl From<&Path> for FileSource {
  fn from(dir: &Path) -> Self {
    Self {
      provider: "main".to_string(),
      root: dir.to_path_buf(),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::fs::{create_dir_all, write};

  use pretty_assertions::assert_eq;

  use super::*;

  fn fixture() -> (tempfile::TempDir, FileSource) {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path().join("config.yaml"), "a: 1\n").unwrap();
    create_dir_all(dir.path().join("db")).unwrap();
    write(dir.path().join("db/mysql.yaml"), "driver: mysql\n").unwrap();
    write(dir.path().join("db/old.yml"), "driver: old\n").unwrap();
    write(dir.path().join("db/notes.txt"), "ignore me\n").unwrap();
    let source = FileSource::new("test", dir.path().to_str().unwrap());
    (dir, source)
  }

  #[test]
  fn probes() {
    let (_dir, source) = fixture();
    assert!(source.available());
    assert!(source.is_group("db"));
    assert!(!source.is_group("db/mysql"));
    assert!(source.is_config("config"));
    assert!(source.is_config("db/mysql"));
    assert!(source.is_config("db/old"));
    assert!(!source.is_config("db/notes"));
  }

  #[test]
  fn list_strips_extensions_and_sorts() {
    let (_dir, source) = fixture();
    assert_eq!(source.list(""), vec!["config", "db"]);
    assert_eq!(source.list("db"), vec!["mysql", "old"]);
    assert_eq!(source.list("nope"), Vec::<String>::new());
  }

  #[test]
  fn load_fills_document_metadata() {
    let (_dir, source) = fixture();
    let doc = source.load("db/mysql").unwrap();
    assert_eq!(doc.source_provider, "test");
    assert_eq!(doc.path_in_source, "db/mysql");
    assert!(doc.source_uri.starts_with("file://"));
  }

  #[test]
  fn load_missing_fails() {
    let (_dir, source) = fixture();
    assert!(matches!(
      source.load("db/nope"),
      Err(ComposeError::ConfigLoad { .. })
    ));
  }
}
