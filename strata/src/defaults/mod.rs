//! Recursive expansion of `defaults:` lists into a flat, ordered merge plan.

mod element;

pub use element::{normalize_path, ResultDefault};

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use strata_value::Value;
use tracing::debug;

use crate::{
  defaults::element::{
    basename, dirname, group_to_package, join_packages, parse_defaults_entries,
    resolve_explicit_package, resolve_header_package, GroupValue, InputDefault, PATCH_KEYWORD,
  },
  overrides::{parse_override, Functions, Override, OverrideType, OverrideValue},
  repository::CachingConfigRepository,
  ComposeError,
};

/// A `_patch_` directive: override lines to apply post-merge in a package
/// context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchSet {
  pub package: String,
  pub lines: Vec<String>,
}

/// The output of defaults resolution: the flattened merge plan plus the
/// patch directives collected along the way.
#[derive(Clone, Debug, Default)]
pub struct DefaultsList {
  pub defaults: Vec<ResultDefault>,
  pub patches: Vec<PatchSet>,
}

/// The name of the bundled engine config prepended on request.
pub(crate) const BUILTIN_CONFIG: &str = "strata/config";

/// Resolves the defaults list for `config_name`, consuming the overrides
/// that modify it. Returns the resolved list and the overrides left over
/// for the merge stage (value overrides and list mutations).
pub fn create_defaults_list(
  repo: &CachingConfigRepository,
  config_name: Option<&str>,
  overrides: &[Override],
  functions: &Functions,
  prepend_builtin: bool,
  skip_missing: bool,
) -> Result<(DefaultsList, Vec<Override>), ComposeError> {
  let (state, value_overrides) = split_overrides(repo, overrides);

  let mut resolver = Resolver {
    repo,
    functions,
    state,
    skip_missing,
    results: Vec::new(),
    patches: Vec::new(),
    visiting: Vec::new(),
    matched_keys: IndexSet::new(),
  };

  if prepend_builtin {
    crate::pkg::register_builtin_tree();
    resolver.resolve_document(DocRequest {
      config_path: BUILTIN_CONFIG.to_string(),
      explicit_package: None,
      default_package: group_to_package(dirname(BUILTIN_CONFIG)),
      parent_package: String::new(),
      primary: false,
      is_override: false,
      external_append: false,
      parent_base_dir: String::new(),
    })?;
  }

  let mut primary_package = String::new();
  if let Some(name) = config_name {
    let path = normalize_path("", name);
    if !repo.config_exists(&path) {
      let options = repo.get_group_options("").join(", ");
      return Err(ComposeError::ConfigLoad {
        path: path.clone(),
        message: format!(
          "cannot find the primary config. Available options at the root: {options}"
        ),
      });
    }
    primary_package = resolver.resolve_document(DocRequest {
      config_path: path.clone(),
      explicit_package: None,
      default_package: group_to_package(dirname(&path)),
      parent_package: String::new(),
      primary: true,
      is_override: false,
      external_append: false,
      parent_base_dir: String::new(),
    })?;
  }

  resolver.apply_appends(&primary_package)?;
  resolver.check_unused()?;
  resolver.check_duplicates()?;

  Ok((
    DefaultsList {
      defaults: resolver.results,
      patches: resolver.patches,
    },
    value_overrides,
  ))
}

struct ChoiceOverride {
  value: GroupValue,
  force: bool,
  used: bool,
  package: Option<String>,
}

struct DeletionOverride {
  used: bool,
}

struct AppendOverride {
  group: String,
  package: Option<String>,
  value: GroupValue,
  forced: bool,
}

#[derive(Default)]
struct OverridesState {
  choices: IndexMap<String, ChoiceOverride>,
  deletions: IndexMap<String, DeletionOverride>,
  appends: Vec<AppendOverride>,
}

fn override_key(o: &Override) -> String {
  match &o.package {
    Some(pkg) => format!("{}@{pkg}", o.key_or_group),
    None => o.key_or_group.clone(),
  }
}

fn group_value_of(o: &Override) -> Option<GroupValue> {
  match &o.value {
    OverrideValue::Element(Value::Null) => Some(GroupValue::Null),
    OverrideValue::Element(Value::Missing) => Some(GroupValue::Mandatory),
    OverrideValue::Element(Value::String(s)) => Some(GroupValue::Name(s.clone())),
    OverrideValue::Element(Value::Quoted(s, _)) => Some(GroupValue::Name(s.clone())),
    OverrideValue::Element(Value::Seq(items)) => {
      let names: Option<Vec<String>> = items.iter().map(|i| i.as_str().map(str::to_string)).collect();
      names.map(GroupValue::Names)
    }
    _ => None,
  }
}

/// Partitions the parsed overrides into defaults-list modifications and
/// plain value overrides. An override addresses the defaults list when its
/// key names an existing config group.
fn split_overrides(repo: &CachingConfigRepository, overrides: &[Override]) -> (OverridesState, Vec<Override>) {
  let mut state = OverridesState::default();
  let mut value_overrides = Vec::new();

  for o in overrides {
    let is_group = repo.group_exists(&o.key_or_group);
    match o.override_type {
      OverrideType::Del if is_group => {
        state.deletions.insert(override_key(o), DeletionOverride { used: false });
      }
      OverrideType::Change if is_group => match group_value_of(o) {
        Some(value) => {
          state.choices.insert(
            override_key(o),
            ChoiceOverride {
              value,
              force: false,
              used: false,
              package: o.package.clone(),
            },
          );
        }
        None => value_overrides.push(o.clone()),
      },
      OverrideType::Add | OverrideType::ForceAdd if is_group => match group_value_of(o) {
        Some(value) if o.is_force_add() => {
          state.choices.insert(
            override_key(o),
            ChoiceOverride {
              value,
              force: true,
              used: false,
              package: o.package.clone(),
            },
          );
        }
        Some(value) => state.appends.push(AppendOverride {
          group: o.key_or_group.clone(),
          package: o.package.clone(),
          value,
          forced: false,
        }),
        None => value_overrides.push(o.clone()),
      },
      _ => value_overrides.push(o.clone()),
    }
  }

  (state, value_overrides)
}

struct DocRequest {
  config_path: String,
  /// Already token-resolved, absolute.
  explicit_package: Option<String>,
  default_package: String,
  parent_package: String,
  primary: bool,
  is_override: bool,
  external_append: bool,
  parent_base_dir: String,
}

struct Resolver<'r> {
  repo: &'r CachingConfigRepository,
  functions: &'r Functions,
  state: OverridesState,
  skip_missing: bool,
  results: Vec<ResultDefault>,
  patches: Vec<PatchSet>,
  visiting: Vec<String>,
  matched_keys: IndexSet<String>,
}

impl Resolver<'_> {
  /// Depth-first expansion of one document's defaults list. Returns the
  /// document's effective package.
  fn resolve_document(&mut self, req: DocRequest) -> Result<String, ComposeError> {
    if self.visiting.iter().any(|p| *p == req.config_path) {
      let mut chain = self.visiting.clone();
      chain.push(req.config_path.clone());
      return Err(ComposeError::Composition(format!(
        "Found a cyclic defaults dependency: {}",
        chain.join(" -> ")
      )));
    }

    let doc = self
      .repo
      .load_config(&req.config_path)?
      .ok_or_else(|| ComposeError::ConfigLoad {
        path: req.config_path.clone(),
        message: "config not found in the search path".to_string(),
      })?;

    let package = match &req.explicit_package {
      Some(pkg) => pkg.clone(),
      None => match doc.package_header() {
        Some(header) => resolve_header_package(header, &req.config_path, &req.parent_package),
        None => req.default_package.clone(),
      },
    };

    let base_dir = dirname(&req.config_path).to_string();
    let defaults_node = doc.value.as_map().and_then(|m| m.get("defaults"));
    // A document without a defaults list is a leaf: it contributes a single
    // plain entry rather than a `_self_` marker.
    let is_leaf = defaults_node.is_none();
    let mut entries = match defaults_node {
      Some(defaults) => parse_defaults_entries(&req.config_path, defaults)?,
      None => Vec::new(),
    };

    let self_count = entries.iter().filter(|e| **e == InputDefault::SelfRef).count();
    if self_count > 1 {
      return Err(ComposeError::Composition(format!(
        "In `{}`: `_self_` can only appear once in the defaults list",
        req.config_path
      )));
    }
    if self_count == 0 {
      entries.push(InputDefault::SelfRef);
    }

    self.visiting.push(req.config_path.clone());
    for entry in entries {
      self.resolve_entry(&req, &package, &base_dir, is_leaf, entry)?;
    }
    self.visiting.pop();

    Ok(package)
  }

  fn resolve_entry(
    &mut self,
    req: &DocRequest,
    package: &str,
    base_dir: &str,
    is_leaf: bool,
    entry: InputDefault,
  ) -> Result<(), ComposeError> {
    match entry {
      InputDefault::SelfRef => {
        self.results.push(ResultDefault {
          config_path: req.config_path.clone(),
          parent_base_dir: req.parent_base_dir.clone(),
          package: package.to_string(),
          is_self: !is_leaf,
          primary: req.primary,
          is_override: req.is_override,
          external_append: req.external_append,
        });
        Ok(())
      }

      InputDefault::Patch { package: patch_pkg, lines } => {
        let patch_package = match patch_pkg {
          Some(pkg) if pkg.is_empty() => {
            return Err(ComposeError::Composition(format!(
              "In `{}`: `{PATCH_KEYWORD}@` requires a package name",
              req.config_path
            )));
          }
          Some(pkg) => resolve_explicit_package(&pkg, package, "", ""),
          None => package.to_string(),
        };

        for line in &lines {
          let parsed = parse_override(line, self.functions)?;
          if parsed.is_sweep() {
            return Err(ComposeError::Composition(format!(
              "In `{}`: a sweep cannot appear inside `{PATCH_KEYWORD}`: '{line}'",
              req.config_path
            )));
          }
        }
        self.patches.push(PatchSet {
          package: patch_package,
          lines,
        });
        Ok(())
      }

      InputDefault::Config { path, package: explicit, optional } => {
        let child_path = normalize_path(base_dir, &path);
        let group_dots = group_to_package(dirname(&path));
        let name = basename(&child_path).to_string();
        let explicit = explicit.map(|p| resolve_explicit_package(&p, package, &group_dots, &name));

        if !self.repo.config_exists(&child_path) {
          if optional || self.skip_missing {
            debug!(config = %child_path, "skipping missing optional default");
            return Ok(());
          }
          return Err(ComposeError::ConfigLoad {
            path: child_path.clone(),
            message: format!("requested in `{}` and not found in the search path", req.config_path),
          });
        }

        self.resolve_document(DocRequest {
          config_path: child_path,
          explicit_package: explicit,
          default_package: package.to_string(),
          parent_package: package.to_string(),
          primary: false,
          is_override: false,
          external_append: false,
          parent_base_dir: base_dir.to_string(),
        })?;
        Ok(())
      }

      InputDefault::Group {
        group,
        value,
        package: entry_pkg,
        optional,
      } => {
        let group_norm = normalize_path(base_dir, &group);
        let entry_key = match &entry_pkg {
          Some(pkg) => format!("{group_norm}@{pkg}"),
          None => group_norm.clone(),
        };
        self.matched_keys.insert(entry_key.clone());

        if let Some(deletion) = self.state.deletions.get_mut(&entry_key) {
          deletion.used = true;
          return Ok(());
        }
        if entry_pkg.is_some() {
          // A bare `~group` deletes every entry of the group.
          if let Some(deletion) = self.state.deletions.get_mut(&group_norm) {
            deletion.used = true;
            return Ok(());
          }
        }

        let mut value = value;
        let mut overridden = false;
        if let Some(choice) = self.state.choices.get_mut(&entry_key) {
          choice.used = true;
          overridden = true;
          value = choice.value.clone();
        }

        let names = match value {
          GroupValue::Null => return Ok(()),
          GroupValue::Mandatory => {
            let options = self.repo.get_group_options(&group_norm).join(", ");
            return Err(ComposeError::Composition(format!(
              "You must specify '{entry_key}', e.g, {entry_key}=<OPTION>. Available options: {options}"
            )));
          }
          GroupValue::Name(name) => vec![name],
          GroupValue::Names(names) => names,
        };

        let group_dots = group_to_package(&group);
        for name in names {
          let child_path = format!("{group_norm}/{name}");
          if !self.repo.config_exists(&child_path) {
            if optional || self.skip_missing {
              debug!(config = %child_path, "skipping missing optional default");
              continue;
            }
            let options = self.repo.get_group_options(&group_norm).join(", ");
            return Err(ComposeError::ConfigLoad {
              path: child_path,
              message: format!(
                "in `{}`: could not find '{name}' in group '{group_norm}'. Available options: {options}",
                req.config_path
              ),
            });
          }

          let explicit = entry_pkg
            .as_ref()
            .map(|p| resolve_explicit_package(p, package, &group_dots, &name));
          self.resolve_document(DocRequest {
            config_path: child_path,
            explicit_package: explicit,
            default_package: join_packages(package, &group_dots),
            parent_package: package.to_string(),
            primary: false,
            is_override: overridden,
            external_append: false,
            parent_base_dir: base_dir.to_string(),
          })?;
        }
        Ok(())
      }
    }
  }

  /// Resolves `+group=option` appends. Their paths are absolute from the
  /// root; their packages chain off the primary document.
  fn apply_appends(&mut self, primary_package: &str) -> Result<(), ComposeError> {
    let mut appends = std::mem::take(&mut self.state.appends);
    for (key, choice) in &mut self.state.choices {
      if choice.force && !choice.used {
        choice.used = true;
        appends.push(AppendOverride {
          group: key.split('@').next().unwrap_or(key.as_str()).to_string(),
          package: choice.package.clone(),
          value: choice.value.clone(),
          forced: true,
        });
      }
    }

    for append in appends {
      let group_norm = normalize_path("", &append.group);
      let append_key = match &append.package {
        Some(pkg) => format!("{group_norm}@{pkg}"),
        None => group_norm.clone(),
      };
      if !append.forced && self.matched_keys.contains(&append_key) {
        return Err(ComposeError::Composition(format!(
          "Could not append '{append_key}': an entry for this group is already in the defaults list. Use '{group_norm}=<OPTION>' to override it, or '++' to force the append"
        )));
      }

      let names = match append.value {
        GroupValue::Name(name) => vec![name],
        GroupValue::Names(names) => names,
        GroupValue::Null | GroupValue::Mandatory => {
          return Err(ComposeError::Composition(format!(
            "Could not append '{append_key}': appending requires a concrete option name"
          )));
        }
      };

      let group_dots = group_to_package(&group_norm);
      for name in names {
        let child_path = format!("{group_norm}/{name}");
        if !self.repo.config_exists(&child_path) {
          let options = self.repo.get_group_options(&group_norm).join(", ");
          return Err(ComposeError::ConfigLoad {
            path: child_path,
            message: format!(
              "appended from the command line: could not find '{name}' in group '{group_norm}'. Available options: {options}"
            ),
          });
        }

        let explicit = append
          .package
          .as_ref()
          .map(|p| resolve_explicit_package(p, primary_package, &group_dots, &name));
        self.resolve_document(DocRequest {
          config_path: child_path,
          explicit_package: explicit,
          default_package: join_packages(primary_package, &group_dots),
          parent_package: primary_package.to_string(),
          primary: false,
          is_override: append.forced,
          external_append: true,
          parent_base_dir: String::new(),
        })?;
      }
    }
    Ok(())
  }

  fn check_unused(&self) -> Result<(), ComposeError> {
    for (key, deletion) in &self.state.deletions {
      if !deletion.used {
        return Err(ComposeError::Composition(format!(
          "Could not delete '{key}'. No match in the defaults list"
        )));
      }
    }
    for (key, choice) in &self.state.choices {
      if !choice.used {
        return Err(ComposeError::Composition(format!(
          "Could not override '{key}'. No match in the defaults list.\nTo append to your defaults list, prefix the override with '+'"
        )));
      }
    }
    Ok(())
  }

  fn check_duplicates(&self) -> Result<(), ComposeError> {
    let mut seen: HashMap<(&str, &str), (usize, usize)> = HashMap::new();
    for rd in &self.results {
      let counts = seen
        .entry((rd.config_path.as_str(), rd.package.as_str()))
        .or_insert((0, 0));
      if rd.is_self {
        counts.1 += 1;
      } else {
        counts.0 += 1;
      }
      if counts.0 > 1 || counts.1 > 1 {
        return Err(ComposeError::Composition(format!(
          "'{}' (package '{}') appears more than once in the final defaults list",
          rd.config_path, rd.package
        )));
      }
    }
    Ok(())
  }
}
