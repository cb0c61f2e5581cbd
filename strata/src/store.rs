//! The in-process structured config registry backing `structured://`
//! sources.

use std::sync::LazyLock;

use indexmap::IndexMap;
use strata_value::Value;

use crate::singleton::Singleton;

#[derive(Clone, Debug)]
pub struct StoredConfig {
  pub node: Value,
  pub package: Option<String>,
  pub provider: Option<String>,
}

#[derive(Clone, Debug)]
pub enum StoreNode {
  Group(IndexMap<String, StoreNode>),
  Config(StoredConfig),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreEntryKind {
  Group,
  Config,
  NotFound,
}

/// Nested registry of structured configs. Config names are stored with a
/// `.yaml` suffix; lookups add it when absent so configs are addressed the
/// same way file-based ones are.
#[derive(Clone, Debug, Default)]
pub struct ConfigStore {
  root: IndexMap<String, StoreNode>,
}

impl ConfigStore {
  /// Stores a config node. `group` uses `/` as the subgroup separator,
  /// `package` is the dotted graft point recorded for the config.
  pub fn store(
    &mut self,
    group: Option<&str>,
    name: &str,
    node: Value,
    package: Option<&str>,
    provider: Option<&str>,
  ) {
    let mut current = &mut self.root;
    if let Some(group) = group {
      for segment in group.split('/').filter(|s| !s.is_empty()) {
        let entry = current
          .entry(segment.to_string())
          .or_insert_with(|| StoreNode::Group(IndexMap::new()));
        // A config stored where a group is needed gets replaced; the last
        // store wins, like a file overwriting a directory would.
        if !matches!(entry, StoreNode::Group(_)) {
          *entry = StoreNode::Group(IndexMap::new());
        }
        match entry {
          StoreNode::Group(children) => current = children,
          StoreNode::Config(_) => unreachable!(),
        }
      }
    }

    let file_name = with_yaml_suffix(name);
    current.insert(
      file_name,
      StoreNode::Config(StoredConfig {
        node,
        package: package.map(str::to_string),
        provider: provider.map(str::to_string),
      }),
    );
  }

  pub fn load(&self, path: &str) -> Option<&StoredConfig> {
    match self.open(&with_yaml_suffix(path))? {
      StoreNode::Config(config) => Some(config),
      StoreNode::Group(_) => None,
    }
  }

  pub fn entry_kind(&self, path: &str) -> StoreEntryKind {
    if path.is_empty() {
      return if self.root.is_empty() {
        StoreEntryKind::NotFound
      } else {
        StoreEntryKind::Group
      };
    }
    match self.open(path) {
      Some(StoreNode::Group(_)) => StoreEntryKind::Group,
      Some(StoreNode::Config(_)) => StoreEntryKind::Config,
      None => StoreEntryKind::NotFound,
    }
  }

  /// Sorted names inside a group; configs keep their `.yaml` suffix.
  pub fn list(&self, path: &str) -> Option<Vec<String>> {
    let children = if path.is_empty() {
      &self.root
    } else {
      match self.open(path)? {
        StoreNode::Group(children) => children,
        StoreNode::Config(_) => return None,
      }
    };
    let mut names: Vec<String> = children.keys().cloned().collect();
    names.sort();
    Some(names)
  }

  pub fn is_empty(&self) -> bool {
    self.root.is_empty()
  }

  fn open(&self, path: &str) -> Option<&StoreNode> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let first = segments.next()?;
    let mut node = self.root.get(first)?;
    for segment in segments {
      match node {
        StoreNode::Group(children) => node = children.get(segment)?,
        StoreNode::Config(_) => return None,
      }
    }
    Some(node)
  }
}

fn with_yaml_suffix(name: &str) -> String {
  if name.ends_with(".yaml") {
    name.to_string()
  } else {
    format!("{name}.yaml")
  }
}

static STORE: LazyLock<Singleton<ConfigStore>> = LazyLock::new(Singleton::default);

/// The process-wide structured config store.
pub fn config_store() -> &'static Singleton<ConfigStore> {
  &STORE
}

/// Registers several nodes under one provider name.
pub struct ConfigStoreWithProvider {
  provider: String,
}

impl ConfigStoreWithProvider {
  pub fn new(provider: &str) -> Self {
    Self {
      provider: provider.to_string(),
    }
  }

  pub fn store(&self, group: Option<&str>, name: &str, node: Value, package: Option<&str>) {
    config_store().with(|store| store.store(group, name, node, package, Some(&self.provider)));
  }
}
