use strata_value::{yaml, Document};

use crate::{pkg::pkg_registry, sources::ConfigSource, ComposeError};

/// A config root inside an embedded resource tree (`pkg://dotted.module`).
/// An unregistered module is simply unavailable, which lets optional plugin
/// packages be listed on the search path without hard failures.
pub struct PkgSource {
  provider: String,
  module: String,
}

impl PkgSource {
  pub fn new(provider: &str, module: &str) -> Self {
    Self {
      provider: provider.to_string(),
      module: module.replace('/', ".").trim_matches('.').to_string(),
    }
  }

  fn resolve_config(&self, path: &str) -> Option<String> {
    if path.ends_with(".yaml") || path.ends_with(".yml") {
      return pkg_registry()
        .with(|reg| reg.is_file(&self.module, path))
        .then(|| path.to_string());
    }
    for ext in ["yaml", "yml"] {
      let candidate = format!("{path}.{ext}");
      if pkg_registry().with(|reg| reg.is_file(&self.module, &candidate)) {
        return Some(candidate);
      }
    }
    None
  }
}

impl ConfigSource for PkgSource {
  fn provider(&self) -> &str {
    &self.provider
  }

  fn uri(&self) -> String {
    format!("pkg://{}", self.module)
  }

  fn scheme(&self) -> &'static str {
    "pkg"
  }

  fn available(&self) -> bool {
    pkg_registry().with(|reg| reg.available(&self.module))
  }

  fn is_group(&self, path: &str) -> bool {
    pkg_registry().with(|reg| reg.is_dir(&self.module, path))
  }

  fn is_config(&self, path: &str) -> bool {
    self.resolve_config(path).is_some()
  }

  fn list(&self, group: &str) -> Vec<String> {
    let mut names: Vec<String> = pkg_registry()
      .with(|reg| reg.list(&self.module, group))
      .into_iter()
      .map(|name| crate::sources::strip_extension(&name).to_string())
      .collect();
    names.sort();
    names.dedup();
    names
  }

  fn load(&self, path: &str) -> Result<Document, ComposeError> {
    let file = self.resolve_config(path).ok_or_else(|| ComposeError::ConfigLoad {
      path: path.to_string(),
      message: format!("config not found in {}", self.uri()),
    })?;

    let content = pkg_registry()
      .with(|reg| reg.read(&self.module, &file).map(str::to_string))
      .ok_or_else(|| ComposeError::ConfigLoad {
        path: path.to_string(),
        message: format!("config not found in {}", self.uri()),
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
