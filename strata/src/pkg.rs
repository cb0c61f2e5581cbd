//! The in-process registry backing `pkg://` sources.
//!
//! A "package" is a named tree of embedded config files, registered once at
//! startup (typically from `include_str!` literals). The registry plays the
//! role a package's resource directory plays for installed plugins: a
//! `pkg://` search-path entry whose root was never registered is simply
//! unavailable and gets skipped.

use std::sync::LazyLock;

use indexmap::IndexMap;

use crate::singleton::Singleton;

/// module path -> relative file path -> file content
#[derive(Clone, Debug, Default)]
pub struct PkgRegistry {
  trees: IndexMap<String, IndexMap<String, String>>,
}

impl PkgRegistry {
  pub fn register(&mut self, module: &str, files: &[(&str, &str)]) {
    let tree = self.trees.entry(normalize_module(module)).or_default();
    for (path, content) in files {
      tree.insert((*path).to_string(), (*content).to_string());
    }
  }

  pub fn available(&self, module: &str) -> bool {
    self.trees.contains_key(&normalize_module(module))
  }

  pub fn is_file(&self, module: &str, path: &str) -> bool {
    self
      .trees
      .get(&normalize_module(module))
      .is_some_and(|tree| tree.contains_key(path))
  }

  pub fn is_dir(&self, module: &str, path: &str) -> bool {
    let Some(tree) = self.trees.get(&normalize_module(module)) else {
      return false;
    };
    if path.is_empty() {
      return true;
    }
    let prefix = format!("{}/", path.trim_end_matches('/'));
    tree.keys().any(|k| k.starts_with(&prefix))
  }

  /// Immediate children of a directory: file names as stored, directory
  /// names without a trailing slash.
  pub fn list(&self, module: &str, dir: &str) -> Vec<String> {
    let Some(tree) = self.trees.get(&normalize_module(module)) else {
      return Vec::new();
    };
    let prefix = if dir.is_empty() {
      String::new()
    } else {
      format!("{}/", dir.trim_end_matches('/'))
    };

    let mut names: Vec<String> = tree
      .keys()
      .filter_map(|key| key.strip_prefix(&prefix))
      .map(|rest| match rest.find('/') {
        Some(idx) => rest[..idx].to_string(),
        None => rest.to_string(),
      })
      .collect();
    names.sort();
    names.dedup();
    names
  }

  pub fn read(&self, module: &str, path: &str) -> Option<&str> {
    self
      .trees
      .get(&normalize_module(module))?
      .get(path)
      .map(String::as_str)
  }
}

fn normalize_module(module: &str) -> String {
  module.replace('/', ".").trim_matches('.').to_string()
}

static REGISTRY: LazyLock<Singleton<PkgRegistry>> = LazyLock::new(Singleton::default);

pub fn pkg_registry() -> &'static Singleton<PkgRegistry> {
  &REGISTRY
}

/// Registers an embedded resource tree under a dotted module path.
pub fn register_tree(module: &str, files: &[(&str, &str)]) {
  REGISTRY.with(|reg| reg.register(module, files));
}

/// The bundled configuration tree composed in front of the primary config
/// when the engine's own node is requested.
pub const BUILTIN_PKG: &str = "strata.conf";

pub(crate) fn register_builtin_tree() {
  register_tree(
    BUILTIN_PKG,
    &[("strata/config.yaml", include_str!("conf/config.yaml"))],
  );
}
