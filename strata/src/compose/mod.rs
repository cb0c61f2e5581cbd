//! The composition pipeline: merge documents in defaults order, apply
//! patches and CLI overrides, then resolve interpolations.

use std::path::Path;

use strata_value::{
  interp::resolve_tree,
  merge::{deep_merge, MergeOptions},
  path::{ensure_map_at, get_at, get_at_mut, remove_at, set_at},
  Map, Value,
};

use crate::{
  defaults::{create_defaults_list, DefaultsList, PatchSet, ResultDefault},
  overrides::{
    parse_override, parse_overrides, Functions, ListMutation, ListOperation, Override,
    OverrideType, OverrideValue,
  },
  plugins,
  repository::CachingConfigRepository,
  search_path::{SearchPath, SearchPathQuery},
  ComposeError,
};

#[derive(Clone, Debug)]
pub struct ComposeSettings {
  /// The primary search path; search-path plugins and the bundled tree are
  /// applied on top of it.
  pub search_path: SearchPath,
  /// Compose the bundled `strata/config` node in front of the primary.
  pub prepend_builtin: bool,
  /// Resolve `${...}` interpolations as the final step.
  pub resolve: bool,
  /// Fed to `shuffle()` and sweep shuffling.
  pub seed: u64,
  /// Skip missing defaults instead of failing.
  pub skip_missing: bool,
}

impl Default for ComposeSettings {
  fn default() -> Self {
    Self {
      search_path: SearchPath::new(),
      prepend_builtin: false,
      resolve: true,
      seed: 0,
      skip_missing: false,
    }
  }
}

impl ComposeSettings {
  /// Settings for the common case: one config directory on disk.
  pub fn from_config_dir(dir: &Path) -> Self {
    let mut search_path = SearchPath::new();
    search_path.append("main", &format!("file://{}", dir.display()));
    Self {
      search_path,
      ..Self::default()
    }
  }
}

/// A composed configuration and the defaults list that produced it.
#[derive(Clone, Debug)]
pub struct Composed {
  pub config: Value,
  pub defaults: Vec<ResultDefault>,
}

/// The settings' search path with the bundled tree and every registered
/// search-path plugin applied, in registration order.
pub fn effective_search_path(settings: &ComposeSettings) -> SearchPath {
  let mut search_path = settings.search_path.clone();
  if settings.prepend_builtin {
    crate::pkg::register_builtin_tree();
    let builtin = format!("pkg://{}", crate::pkg::BUILTIN_PKG);
    if search_path.find_first(&SearchPathQuery::path(&builtin)).is_none() {
      search_path.prepend("strata", &builtin);
    }
  }
  plugins::apply_search_path_plugins(&mut search_path);
  search_path
}

/// Composes one configuration. Sweep overrides are rejected here; use
/// [`compose_multirun`] for those.
pub fn compose(
  settings: &ComposeSettings,
  config_name: Option<&str>,
  overrides: &[String],
) -> Result<Composed, ComposeError> {
  let repo = CachingConfigRepository::from_search_path(&effective_search_path(settings))?;
  compose_with_repo(settings, &repo, config_name, overrides)
}

/// Composes against an existing repository, reusing its cache.
pub fn compose_with_repo(
  settings: &ComposeSettings,
  repo: &CachingConfigRepository,
  config_name: Option<&str>,
  overrides: &[String],
) -> Result<Composed, ComposeError> {
  let functions = Functions::with_seed(settings.seed);
  let parsed = parse_overrides(overrides, &functions)?;

  if let Some(sweep) = parsed.iter().find(|o| o.is_sweep()) {
    return Err(ComposeError::Composition(format!(
      "Sweep overrides are only supported in multirun mode: '{}'",
      sweep.input_line
    )));
  }

  let (defaults_list, value_overrides) = create_defaults_list(
    repo,
    config_name,
    &parsed,
    &functions,
    settings.prepend_builtin,
    settings.skip_missing,
  )?;

  let mut config = merge_defaults(repo, &defaults_list.defaults)?;
  apply_patches(&mut config, &defaults_list.patches, &functions)?;
  for o in &value_overrides {
    apply_value_override(&mut config, o, &o.key_or_group)?;
  }

  if settings.resolve {
    config = resolve_tree(&config)?;
  }

  Ok(Composed {
    config,
    defaults: defaults_list.defaults,
  })
}

/// Expands sweeps and composes every job. The cardinality is the product
/// of the discrete sweep sizes.
pub fn compose_multirun(
  settings: &ComposeSettings,
  config_name: Option<&str>,
  overrides: &[String],
) -> Result<Vec<Composed>, ComposeError> {
  let repo = CachingConfigRepository::from_search_path(&effective_search_path(settings))?;
  let functions = Functions::with_seed(settings.seed);
  let parsed = parse_overrides(overrides, &functions)?;

  // Interval sweeps are continuous; only an external sweeper plugin can
  // consume them.
  if let Some(interval) = parsed.iter().find(|o| o.is_sweep() && !o.is_discrete_sweep()) {
    return Err(composition_error!(
      "'{}' is a continuous sweep; the built-in expander only supports discrete sweeps",
      interval.input_line
    ));
  }

  let jobs = crate::sweeper::expand_overrides(&parsed, &repo, settings.seed)?;
  jobs
    .into_iter()
    .map(|job| compose_with_repo(settings, &repo, config_name, &job.overrides))
    .collect()
}

/// The resolved defaults list alone, without merging.
pub fn resolve_defaults(
  settings: &ComposeSettings,
  config_name: Option<&str>,
  overrides: &[String],
) -> Result<DefaultsList, ComposeError> {
  let repo = CachingConfigRepository::from_search_path(&effective_search_path(settings))?;
  let functions = Functions::with_seed(settings.seed);
  let parsed = parse_overrides(overrides, &functions)?;
  let (defaults_list, _) = create_defaults_list(
    &repo,
    config_name,
    &parsed,
    &functions,
    settings.prepend_builtin,
    settings.skip_missing,
  )?;
  Ok(defaults_list)
}

/// Merges the documents named by the defaults list, in order, each grafted
/// at its effective package. The `defaults` key itself never reaches the
/// composed tree.
fn merge_defaults(
  repo: &CachingConfigRepository,
  defaults: &[ResultDefault],
) -> Result<Value, ComposeError> {
  let mut composed = Value::Map(Map::new());

  for rd in defaults {
    let doc = repo.load_config(&rd.config_path)?.ok_or_else(|| ComposeError::ConfigLoad {
      path: rd.config_path.clone(),
      message: "config disappeared between resolution and merge".to_string(),
    })?;

    let mut body = doc.value.clone();
    if let Some(map) = body.as_map_mut() {
      map.shift_remove("defaults");
    }

    if rd.package.is_empty() {
      deep_merge(&mut composed, body, MergeOptions::default())?;
    } else {
      ensure_map_at(&mut composed, &rd.package)?;
      let target = get_at_mut(&mut composed, &rd.package).expect("package node was just created");
      deep_merge(target, body, MergeOptions::default())?;
    }
  }

  Ok(composed)
}

/// Applies `_patch_` directives. Bare keys inside a patch are prefixed with
/// the patch package; `_global_.` escapes back to the root.
fn apply_patches(
  config: &mut Value,
  patches: &[PatchSet],
  functions: &Functions,
) -> Result<(), ComposeError> {
  for patch in patches {
    for line in &patch.lines {
      let o = parse_override(line, functions)?;
      let key = match o.key_or_group.strip_prefix("_global_.") {
        Some(absolute) => absolute.to_string(),
        None if patch.package.is_empty() => o.key_or_group.clone(),
        None => format!("{}.{}", patch.package, o.key_or_group),
      };
      apply_value_override(config, &o, &key)?;
    }
  }
  Ok(())
}

/// Applies one value override (or list mutation) at a dotted key.
fn apply_value_override(config: &mut Value, o: &Override, key: &str) -> Result<(), ComposeError> {
  if let OverrideValue::ListMutation(mutation) = &o.value {
    if o.override_type != OverrideType::Change {
      return Err(ComposeError::validation(format!(
        "a list operation can only be used with a plain assignment: '{}'",
        o.input_line
      )));
    }
    return apply_list_mutation(config, key, mutation);
  }

  match o.override_type {
    OverrideType::Change => {
      let value = o.element().cloned().unwrap_or(Value::Null).unquoted();
      match get_at_mut(config, key) {
        Some(slot) => *slot = value,
        None => {
          return Err(ComposeError::Composition(format!(
            "Could not override '{key}'. No match in the config.\nTo append to your config use +{key}={}",
            o.element().map(ToString::to_string).unwrap_or_default()
          )));
        }
      }
    }
    OverrideType::Add => {
      if get_at(config, key).is_some() {
        return Err(ComposeError::Composition(format!(
          "Could not append to config. An item is already at '{key}'. Use '{key}=...' to override it, or '++{key}=...' to force the add"
        )));
      }
      set_at(config, key, o.element().cloned().unwrap_or(Value::Null).unquoted())?;
    }
    OverrideType::ForceAdd => {
      set_at(config, key, o.element().cloned().unwrap_or(Value::Null).unquoted())?;
    }
    OverrideType::Del => {
      if let Some(expected) = o.element() {
        let current = get_at(config, key).cloned();
        if current.as_ref() != Some(&expected.clone().unquoted()) {
          return Err(ComposeError::Composition(format!(
            "Could not delete from config. The value of '{key}' is not {expected}"
          )));
        }
      }
      if remove_at(config, key).is_none() {
        return Err(composition_error!(
          "Could not delete from config. '{}' does not exist",
          key
        ));
      }
    }
  }
  Ok(())
}

fn apply_list_mutation(config: &mut Value, key: &str, m: &ListMutation) -> Result<(), ComposeError> {
  let target = get_at_mut(config, key)
    .ok_or_else(|| composition_error!("Could not apply a list operation: '{}' does not exist", key))?;
  let found = target.type_name();
  let list = target.as_seq_mut().ok_or_else(|| {
    ComposeError::validation(format!("'{key}' is not a list (it is a {found})"))
  })?;

  let values: Vec<Value> = m.values.iter().cloned().map(Value::unquoted).collect();
  match m.operation {
    ListOperation::Append => list.extend(values),
    ListOperation::Prepend => {
      for (offset, value) in values.into_iter().enumerate() {
        list.insert(offset, value);
      }
    }
    ListOperation::Insert => {
      let at = resolve_index(m.index.unwrap_or(0), list.len(), true).ok_or_else(|| {
        ComposeError::validation(format!(
          "Cannot insert at index {} into a list of length {}",
          m.index.unwrap_or(0),
          list.len()
        ))
      })?;
      for (offset, value) in values.into_iter().enumerate() {
        list.insert(at + offset, value);
      }
    }
    ListOperation::RemoveAt => {
      let at = resolve_index(m.index.unwrap_or(0), list.len(), false).ok_or_else(|| {
        ComposeError::validation(format!(
          "Cannot remove item at index {} from a list of length {}",
          m.index.unwrap_or(0),
          list.len()
        ))
      })?;
      list.remove(at);
    }
    ListOperation::RemoveValue => {
      for value in &values {
        let before = list.len();
        list.retain(|item| item != value);
        if list.len() == before {
          return Err(ComposeError::validation(format!(
            "'{value}' is not in the list at '{key}'"
          )));
        }
      }
    }
    ListOperation::Clear => list.clear(),
  }
  Ok(())
}

/// Negative indices count from the end. `inclusive_end` allows `len` itself
/// (inserting at the tail).
fn resolve_index(index: i64, len: usize, inclusive_end: bool) -> Option<usize> {
  let resolved = if index < 0 { len as i64 + index } else { index };
  let max = if inclusive_end { len as i64 } else { len as i64 - 1 };
  (0..=max).contains(&resolved).then_some(resolved as usize)
}
