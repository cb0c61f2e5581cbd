//! The ordered list of config roots consulted during composition.
//!
//! The repository scans entries front-to-back and the first source that
//! holds a path wins; callers that want their source to take precedence
//! must prepend it.

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchPathEntry {
  pub provider: String,
  pub path: String,
}

impl SearchPathEntry {
  pub fn new(provider: &str, path: &str) -> Self {
    Self {
      provider: provider.to_string(),
      path: path.to_string(),
    }
  }
}

/// Matches entries by provider name, by path, or both.
#[derive(Clone, Debug, Default)]
pub struct SearchPathQuery {
  pub provider: Option<String>,
  pub path: Option<String>,
}

impl SearchPathQuery {
  pub fn provider(provider: &str) -> Self {
    Self {
      provider: Some(provider.to_string()),
      path: None,
    }
  }

  pub fn path(path: &str) -> Self {
    Self {
      provider: None,
      path: Some(path.to_string()),
    }
  }

  fn matches(&self, entry: &SearchPathEntry) -> bool {
    let provider_ok = self.provider.as_deref().is_none_or(|p| p == entry.provider);
    let path_ok = self.path.as_deref().is_none_or(|p| p == entry.path);
    (self.provider.is_some() || self.path.is_some()) && provider_ok && path_ok
  }
}

#[derive(Clone, Debug, Default)]
pub struct SearchPath {
  entries: Vec<SearchPathEntry>,
}

impl SearchPath {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn entries(&self) -> &[SearchPathEntry] {
    &self.entries
  }

  pub fn append(&mut self, provider: &str, path: &str) {
    self.entries.push(SearchPathEntry::new(provider, path));
  }

  pub fn prepend(&mut self, provider: &str, path: &str) {
    self.entries.insert(0, SearchPathEntry::new(provider, path));
  }

  /// Inserts directly after the last entry matching `anchor`; appends when
  /// nothing matches.
  pub fn append_after(&mut self, anchor: &SearchPathQuery, provider: &str, path: &str) {
    match self.find_last(anchor) {
      Some(idx) => self.entries.insert(idx + 1, SearchPathEntry::new(provider, path)),
      None => self.append(provider, path),
    }
  }

  /// Removes every matching entry; returns whether anything was removed.
  pub fn remove(&mut self, query: &SearchPathQuery) -> bool {
    let before = self.entries.len();
    self.entries.retain(|e| !query.matches(e));
    self.entries.len() != before
  }

  pub fn find_first(&self, query: &SearchPathQuery) -> Option<usize> {
    self.entries.iter().position(|e| query.matches(e))
  }

  pub fn find_last(&self, query: &SearchPathQuery) -> Option<usize> {
    self.entries.iter().rposition(|e| query.matches(e))
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  fn providers(sp: &SearchPath) -> Vec<&str> {
    sp.entries().iter().map(|e| e.provider.as_str()).collect()
  }

  #[test]
  fn append_and_prepend() {
    let mut sp = SearchPath::new();
    sp.append("main", "file://conf");
    sp.prepend("strata", "pkg://strata.conf");
    sp.append("extra", "file://extra");
    assert_eq!(providers(&sp), vec!["strata", "main", "extra"]);
  }

  #[test]
  fn append_after_anchor() {
    let mut sp = SearchPath::new();
    sp.append("strata", "pkg://strata.conf");
    sp.append("main", "file://conf");

    sp.append_after(&SearchPathQuery::provider("strata"), "plugin", "pkg://plugin.conf");
    assert_eq!(providers(&sp), vec!["strata", "plugin", "main"]);

    // No match falls back to appending.
    sp.append_after(&SearchPathQuery::provider("nope"), "tail", "file://tail");
    assert_eq!(providers(&sp), vec!["strata", "plugin", "main", "tail"]);
  }

  #[test]
  fn queries_match_by_provider_path_or_both() {
    let mut sp = SearchPath::new();
    sp.append("a", "file://one");
    sp.append("b", "file://two");
    sp.append("a", "file://three");

    assert_eq!(sp.find_first(&SearchPathQuery::provider("a")), Some(0));
    assert_eq!(sp.find_last(&SearchPathQuery::provider("a")), Some(2));
    assert_eq!(sp.find_first(&SearchPathQuery::path("file://two")), Some(1));

    let both = SearchPathQuery {
      provider: Some("a".to_string()),
      path: Some("file://three".to_string()),
    };
    assert_eq!(sp.find_first(&both), Some(2));

    // An empty query matches nothing.
    assert_eq!(sp.find_first(&SearchPathQuery::default()), None);
  }

  #[test]
  fn remove_drops_all_matches() {
    let mut sp = SearchPath::new();
    sp.append("a", "file://one");
    sp.append("b", "file://two");
    sp.append("a", "file://three");

    assert!(sp.remove(&SearchPathQuery::provider("a")));
    assert_eq!(providers(&sp), vec!["b"]);
    assert!(!sp.remove(&SearchPathQuery::provider("a")));
  }
}
