//! The plugin registry: a process-wide singleton that discovers bundled
//! sources and externally registered plugins.
//!
//! There is no reflective class scanning here; plugins either register
//! explicitly once the registry is ready, or arrive as entry-point
//! descriptors processed during the scan. A `pkg://` descriptor whose tree
//! was never registered is skipped silently so that optional plugin
//! packages do not break startup.

use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use strata_value::Value;
use tracing::{debug, warn};

use crate::{pkg::pkg_registry, search_path::SearchPath, singleton::Singleton, ComposeError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PluginKind {
  ConfigSource,
  Launcher,
  Sweeper,
  SearchPathPlugin,
  Completion,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryState {
  Uninitialized,
  Scanning,
  Ready,
}

pub type SearchPathHook = Arc<dyn Fn(&mut SearchPath) + Send + Sync>;

#[derive(Clone)]
pub struct PluginEntry {
  /// Fully qualified name, e.g. `strata::core_plugins::FileSource`.
  pub name: String,
  pub kind: PluginKind,
  pub search_path_hook: Option<SearchPathHook>,
}

impl std::fmt::Debug for PluginEntry {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    f.debug_struct("PluginEntry")
      .field("name", &self.name)
      .field("kind", &self.kind)
      .finish_non_exhaustive()
  }
}

/// An externally declared plugin: either a config tree to append to the
/// search path (`pkg://...` / `file://...`) or a named registration the
/// scan turns into a warning when it cannot be processed.
#[derive(Clone, Debug)]
pub struct EntryPoint {
  pub provider: String,
  pub target: String,
}

const APPROVED_NAMESPACES: [&str; 2] = ["strata::core_plugins::", "strata_plugins::"];

#[derive(Clone, Default)]
pub struct Plugins {
  state: PluginsState,
  entries: IndexMap<String, PluginEntry>,
  entry_points: Vec<EntryPoint>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum PluginsState {
  #[default]
  Uninitialized,
  Scanning,
  Ready,
}

impl Plugins {
  pub fn state(&self) -> RegistryState {
    match self.state {
      PluginsState::Uninitialized => RegistryState::Uninitialized,
      PluginsState::Scanning => RegistryState::Scanning,
      PluginsState::Ready => RegistryState::Ready,
    }
  }

  /// Queues an entry-point descriptor. Descriptors added before the scan
  /// are processed by it; later ones are processed immediately.
  pub fn add_entry_point(&mut self, entry_point: EntryPoint) {
    if self.state == PluginsState::Ready {
      self.scan_entry_point(&entry_point);
    }
    self.entry_points.push(entry_point);
  }

  /// Explicit registration. Allowed only once the registry is ready;
  /// re-registering the same name succeeds and replaces the entry.
  pub fn register(&mut self, entry: PluginEntry) -> Result<(), ComposeError> {
    if self.state != PluginsState::Ready {
      return Err(ComposeError::Plugin {
        name: entry.name,
        message: "register() may only be called once the registry is ready".to_string(),
      });
    }
    self.entries.insert(entry.name.clone(), entry);
    Ok(())
  }

  /// Names of registered plugins, optionally filtered by capability.
  pub fn discover(&self, kind: Option<PluginKind>) -> Vec<String> {
    self
      .entries
      .values()
      .filter(|e| kind.is_none_or(|k| e.kind == k))
      .map(|e| e.name.clone())
      .collect()
  }

  /// Looks up the plugin named by the config's `_target_` key. The name
  /// must live under an approved namespace.
  pub fn instantiate(&self, config: &Value) -> Result<PluginEntry, ComposeError> {
    let name = config
      .as_map()
      .and_then(|m| m.get("_target_"))
      .and_then(Value::as_str)
      .ok_or_else(|| ComposeError::Plugin {
        name: String::new(),
        message: "plugin config has no `_target_` class name".to_string(),
      })?;

    if !APPROVED_NAMESPACES.iter().any(|ns| name.starts_with(ns)) {
      return Err(ComposeError::Plugin {
        name: name.to_string(),
        message: format!(
          "invalid plugin '{name}': not inside an approved namespace ({})",
          APPROVED_NAMESPACES.join(", ")
        ),
      });
    }

    self.entries.get(name).cloned().ok_or_else(|| ComposeError::Plugin {
      name: name.to_string(),
      message: format!("unknown plugin class '{name}'"),
    })
  }

  fn initialize(&mut self) {
    self.state = PluginsState::Scanning;

    for (name, kind) in [
      ("strata::core_plugins::FileSource", PluginKind::ConfigSource),
      ("strata::core_plugins::PkgSource", PluginKind::ConfigSource),
      ("strata::core_plugins::StructuredSource", PluginKind::ConfigSource),
      ("strata::core_plugins::BasicLauncher", PluginKind::Launcher),
      ("strata::core_plugins::BasicSweeper", PluginKind::Sweeper),
    ] {
      self.entries.insert(
        name.to_string(),
        PluginEntry {
          name: name.to_string(),
          kind,
          search_path_hook: None,
        },
      );
    }

    let entry_points = self.entry_points.clone();
    for entry_point in &entry_points {
      self.scan_entry_point(entry_point);
    }

    self.state = PluginsState::Ready;
  }

  /// Synthesizes a search-path plugin from one descriptor. Unavailable
  /// `pkg://` trees are skipped without noise; anything malformed is
  /// demoted to a warning so one bad plugin never aborts the scan.
  fn scan_entry_point(&mut self, entry_point: &EntryPoint) {
    let target = entry_point.target.clone();
    let provider = entry_point.provider.clone();

    if let Some(module) = target.strip_prefix("pkg://") {
      if !pkg_registry().with(|reg| reg.available(module)) {
        debug!(provider = %provider, target = %target, "skipping unavailable pkg:// entry point");
        return;
      }
    } else if !target.starts_with("file://") {
      warn!(provider = %provider, target = %target, "ignoring entry point with unsupported scheme");
      return;
    }

    let name = format!("strata_plugins::searchpath::{}", sanitize(&provider));
    let hook_provider = provider.clone();
    let hook_target = target.clone();
    self.entries.insert(
      name.clone(),
      PluginEntry {
        name,
        kind: PluginKind::SearchPathPlugin,
        search_path_hook: Some(Arc::new(move |sp: &mut SearchPath| {
          sp.append(&hook_provider, &hook_target);
        })),
      },
    );
  }
}

fn sanitize(name: &str) -> String {
  name
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
    .collect()
}

static PLUGINS: LazyLock<Singleton<Plugins>> = LazyLock::new(Singleton::default);

/// The process-wide plugin registry, scanned on first use.
pub fn plugins() -> &'static Singleton<Plugins> {
  PLUGINS.with(|p| {
    if p.state == PluginsState::Uninitialized {
      p.initialize();
    }
  });
  &PLUGINS
}

/// Runs every registered search-path plugin against `search_path`, in
/// registration order.
pub fn apply_search_path_plugins(search_path: &mut SearchPath) {
  let hooks: Vec<SearchPathHook> = plugins().with(|p| {
    p.entries
      .values()
      .filter_map(|e| e.search_path_hook.clone())
      .collect()
  });
  for hook in hooks {
    hook(search_path);
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use serial_test::serial;
  use strata_value::yaml::from_yaml_str;

  use super::*;
  use crate::pkg::register_tree;

  #[test]
  #[serial(plugins)]
  fn scan_registers_core_plugins_and_reaches_ready() {
    let snapshot = plugins().get_state();

    assert_eq!(plugins().with(|p| p.state()), RegistryState::Ready);
    let sources = plugins().with(|p| p.discover(Some(PluginKind::ConfigSource)));
    assert!(sources.contains(&"strata::core_plugins::FileSource".to_string()));

    plugins().set_state(snapshot);
  }

  #[test]
  #[serial(plugins)]
  fn instantiate_requires_approved_namespace() {
    let snapshot = plugins().get_state();

    let foreign = from_yaml_str("_target_: evil::Plugin\n").unwrap();
    let err = plugins().with(|p| p.instantiate(&foreign)).unwrap_err();
    assert!(err.to_string().contains("evil::Plugin"));

    let known = from_yaml_str("_target_: strata::core_plugins::FileSource\n").unwrap();
    let entry = plugins().with(|p| p.instantiate(&known)).unwrap();
    assert_eq!(entry.kind, PluginKind::ConfigSource);

    let unknown = from_yaml_str("_target_: strata_plugins::nope::Missing\n").unwrap();
    assert!(plugins().with(|p| p.instantiate(&unknown)).is_err());

    plugins().set_state(snapshot);
  }

  #[test]
  #[serial(plugins)]
  fn entry_points_become_search_path_plugins() {
    let snapshot = plugins().get_state();
    register_tree("plugin_test.conf", &[("extra/tweaks.yaml", "x: 1\n")]);

    plugins().with(|p| {
      p.add_entry_point(EntryPoint {
        provider: "extra".to_string(),
        target: "pkg://plugin_test.conf".to_string(),
      });
      // Never registered: silently skipped.
      p.add_entry_point(EntryPoint {
        provider: "ghost".to_string(),
        target: "pkg://ghost.conf".to_string(),
      });
    });

    let mut sp = SearchPath::new();
    sp.append("main", "file://conf");
    apply_search_path_plugins(&mut sp);

    let providers: Vec<&str> = sp.entries().iter().map(|e| e.provider.as_str()).collect();
    assert!(providers.contains(&"extra"));
    assert!(!providers.contains(&"ghost"));

    plugins().set_state(snapshot);
  }

  #[test]
  #[serial(plugins)]
  fn register_replaces_idempotently() {
    let snapshot = plugins().get_state();

    let entry = PluginEntry {
      name: "strata_plugins::custom::Sweeper".to_string(),
      kind: PluginKind::Sweeper,
      search_path_hook: None,
    };
    plugins().with(|p| p.register(entry.clone())).unwrap();
    plugins().with(|p| p.register(entry)).unwrap();
    let sweepers = plugins().with(|p| p.discover(Some(PluginKind::Sweeper)));
    assert_eq!(
      sweepers
        .iter()
        .filter(|n| n.as_str() == "strata_plugins::custom::Sweeper")
        .count(),
      1
    );

    plugins().set_state(snapshot);
  }
}
