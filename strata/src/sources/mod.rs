//! Config sources: one logical root each, addressed through a scheme.

mod file_source;
mod pkg_source;
mod structured_source;

pub use file_source::FileSource;
pub use pkg_source::PkgSource;
pub use structured_source::StructuredSource;

use strata_value::Document;

use crate::ComposeError;

/// One configuration root. Paths are always `/`-separated and extension-free;
/// `list` returns group names and config names together, callers distinguish
/// with `is_group`/`is_config` probes.
pub trait ConfigSource: Send + Sync {
  fn provider(&self) -> &str;

  /// The full `scheme://root` form.
  fn uri(&self) -> String;

  fn scheme(&self) -> &'static str;

  fn available(&self) -> bool;

  fn is_group(&self, path: &str) -> bool;

  fn is_config(&self, path: &str) -> bool;

  /// Sorted, deduplicated names inside a group, extensions stripped.
  fn list(&self, group: &str) -> Vec<String>;

  fn load(&self, path: &str) -> Result<Document, ComposeError>;
}

/// Builds a source from a `(provider, uri)` search path entry. A URI with no
/// scheme is treated as a filesystem directory.
pub fn create_source(provider: &str, uri: &str) -> Result<Box<dyn ConfigSource>, ComposeError> {
  let (scheme, root) = match uri.split_once("://") {
    Some((scheme, root)) => (scheme, root),
    None => ("file", uri),
  };

  match scheme {
    "file" => Ok(Box::new(FileSource::new(provider, root))),
    "pkg" => Ok(Box::new(PkgSource::new(provider, root))),
    "structured" => Ok(Box::new(StructuredSource::new(provider))),
    other => Err(ComposeError::Plugin {
      name: other.to_string(),
      message: format!("no config source is registered for scheme `{other}`"),
    }),
  }
}

/// `name` -> `name.yaml` unless an explicit extension is already present.
pub(crate) fn with_default_extension(path: &str) -> String {
  if path.ends_with(".yaml") || path.ends_with(".yml") {
    path.to_string()
  } else {
    format!("{path}.yaml")
  }
}

/// Strips a trailing `.yaml`/`.yml` from a file name.
pub(crate) fn strip_extension(name: &str) -> &str {
  name
    .strip_suffix(".yaml")
    .or_else(|| name.strip_suffix(".yml"))
    .unwrap_or(name)
}
