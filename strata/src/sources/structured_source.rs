use indexmap::IndexMap;
use strata_value::Document;

use crate::{
  sources::ConfigSource,
  store::{config_store, StoreEntryKind},
  ComposeError,
};

/// The `structured://` source: configs registered in-process through the
/// [`ConfigStore`](crate::store::ConfigStore) singleton. There is no URI
/// body; the store is process-wide.
pub struct StructuredSource {
  provider: String,
}

impl StructuredSource {
  pub fn new(provider: &str) -> Self {
    Self {
      provider: provider.to_string(),
    }
  }
}

impl ConfigSource for StructuredSource {
  fn provider(&self) -> &str {
    &self.provider
  }

  fn uri(&self) -> String {
    "structured://".to_string()
  }

  fn scheme(&self) -> &'static str {
    "structured"
  }

  fn available(&self) -> bool {
    true
  }

  fn is_group(&self, path: &str) -> bool {
    config_store().with(|store| store.entry_kind(path) == StoreEntryKind::Group)
  }

  fn is_config(&self, path: &str) -> bool {
    let suffixed = crate::sources::with_default_extension(path);
    config_store().with(|store| store.entry_kind(&suffixed) == StoreEntryKind::Config)
  }

  fn list(&self, group: &str) -> Vec<String> {
    let mut names: Vec<String> = config_store()
      .with(|store| store.list(group))
      .unwrap_or_default()
      .iter()
      .map(|name| crate::sources::strip_extension(name).to_string())
      .collect();
    names.sort();
    names.dedup();
    names
  }

  fn load(&self, path: &str) -> Result<Document, ComposeError> {
    let stored = config_store()
      .with(|store| store.load(path).cloned())
      .ok_or_else(|| ComposeError::ConfigLoad {
        path: path.to_string(),
        message: "structured config not found".to_string(),
      })?;

    let mut header = IndexMap::new();
    if let Some(package) = &stored.package {
      header.insert("package".to_string(), package.clone());
    }

    let mut doc = Document::new(stored.node, header);
    doc.source_provider = self.provider.clone();
    doc.source_uri = self.uri();
    doc.path_in_source = path.to_string();
    Ok(doc)
  }
}
