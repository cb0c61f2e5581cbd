//! Ordered multi-source lookup with per-path caching.

use std::cell::RefCell;
use std::collections::HashMap;

use strata_value::Document;
use tracing::{debug, warn};

use crate::{
  search_path::SearchPath,
  sources::{create_source, ConfigSource},
  ComposeError,
};

/// The ordered collection of config sources. Lookup scans front-to-back
/// and the first source holding a path wins; listings are the union over
/// all sources.
pub struct ConfigRepository {
  sources: Vec<Box<dyn ConfigSource>>,
}

impl ConfigRepository {
  /// Builds sources for every entry of the search path. Unavailable
  /// `pkg://` roots are skipped silently (optional plugin trees); other
  /// unavailable sources are skipped with a warning.
  pub fn from_search_path(search_path: &SearchPath) -> Result<Self, ComposeError> {
    let mut sources = Vec::new();
    for entry in search_path.entries() {
      let source = create_source(&entry.provider, &entry.path)?;
      if !source.available() {
        if source.scheme() == "pkg" {
          debug!(provider = %entry.provider, path = %entry.path, "skipping unavailable pkg source");
        } else {
          warn!(provider = %entry.provider, path = %entry.path, "config source is not available");
        }
        continue;
      }
      sources.push(source);
    }
    Ok(Self { sources })
  }

  pub fn num_sources(&self) -> usize {
    self.sources.len()
  }

  pub fn config_exists(&self, path: &str) -> bool {
    self.sources.iter().any(|s| s.is_config(path))
  }

  pub fn group_exists(&self, path: &str) -> bool {
    self.sources.iter().any(|s| s.is_group(path))
  }

  /// First-match lookup. `Ok(None)` means no source holds the path.
  pub fn load_config(&self, path: &str) -> Result<Option<Document>, ComposeError> {
    for source in &self.sources {
      if source.is_config(path) {
        return source.load(path).map(Some);
      }
    }
    Ok(None)
  }

  /// Sorted, deduplicated union of the group's options across all sources.
  pub fn get_group_options(&self, group: &str) -> Vec<String> {
    let mut options: Vec<String> = self
      .sources
      .iter()
      .filter(|s| s.is_group(group))
      .flat_map(|s| s.list(group))
      .collect();
    options.sort();
    options.dedup();
    options
  }
}

/// A [`ConfigRepository`] with a `(path -> Document)` memo and cached
/// existence probes. The cache lives until [`clear_cache`] and is shared by
/// every composition run against this repository.
///
/// [`clear_cache`]: CachingConfigRepository::clear_cache
pub struct CachingConfigRepository {
  repo: ConfigRepository,
  documents: RefCell<HashMap<String, Option<Document>>>,
  config_probes: RefCell<HashMap<String, bool>>,
  group_probes: RefCell<HashMap<String, bool>>,
}

impl CachingConfigRepository {
  pub fn from_search_path(search_path: &SearchPath) -> Result<Self, ComposeError> {
    Ok(Self::new(ConfigRepository::from_search_path(search_path)?))
  }

  pub fn new(repo: ConfigRepository) -> Self {
    Self {
      repo,
      documents: RefCell::new(HashMap::new()),
      config_probes: RefCell::new(HashMap::new()),
      group_probes: RefCell::new(HashMap::new()),
    }
  }

  pub fn num_sources(&self) -> usize {
    self.repo.num_sources()
  }

  pub fn config_exists(&self, path: &str) -> bool {
    if let Some(cached) = self.config_probes.borrow().get(path) {
      return *cached;
    }
    let exists = self.repo.config_exists(path);
    self.config_probes.borrow_mut().insert(path.to_string(), exists);
    exists
  }

  pub fn group_exists(&self, path: &str) -> bool {
    if let Some(cached) = self.group_probes.borrow().get(path) {
      return *cached;
    }
    let exists = self.repo.group_exists(path);
    self.group_probes.borrow_mut().insert(path.to_string(), exists);
    exists
  }

  pub fn load_config(&self, path: &str) -> Result<Option<Document>, ComposeError> {
    if let Some(cached) = self.documents.borrow().get(path) {
      return Ok(cached.clone());
    }
    let loaded = self.repo.load_config(path)?;
    self.documents.borrow_mut().insert(path.to_string(), loaded.clone());
    Ok(loaded)
  }

  pub fn get_group_options(&self, group: &str) -> Vec<String> {
    self.repo.get_group_options(group)
  }

  /// Drops every memoized document and probe.
  pub fn clear_cache(&self) {
    self.documents.borrow_mut().clear();
    self.config_probes.borrow_mut().clear();
    self.group_probes.borrow_mut().clear();
  }
}
