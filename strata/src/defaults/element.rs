use strata_value::Value;

use crate::ComposeError;

/// One entry of the flattened, resolved defaults list, in merge order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultDefault {
  pub config_path: String,
  pub parent_base_dir: String,
  /// Dotted graft point inside the composed tree; empty means the root.
  pub package: String,
  /// Marks the position of a document's own body among its children.
  pub is_self: bool,
  /// True only for the primary document's own entry.
  pub primary: bool,
  /// True when the entry's choice was substituted by an override.
  pub is_override: bool,
  /// True for entries appended from the CLI (`+group=option`), whose paths
  /// are absolute from the root rather than relative to the parent.
  pub external_append: bool,
}

/// A raw `defaults:` entry, straight out of a document.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum InputDefault {
  SelfRef,
  Config {
    path: String,
    package: Option<String>,
    optional: bool,
  },
  Group {
    group: String,
    value: GroupValue,
    package: Option<String>,
    optional: bool,
  },
  Patch {
    package: Option<String>,
    lines: Vec<String>,
  },
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum GroupValue {
  Name(String),
  Names(Vec<String>),
  /// `group: null` — the entry is removed.
  Null,
  /// `group: ???` — a choice must be provided from the CLI.
  Mandatory,
}

pub(crate) const SELF_KEYWORD: &str = "_self_";
pub(crate) const PATCH_KEYWORD: &str = "_patch_";
const OPTIONAL_PREFIX: &str = "optional ";

/// Parses the `defaults:` list of a document into typed entries.
pub(crate) fn parse_defaults_entries(doc_path: &str, defaults: &Value) -> Result<Vec<InputDefault>, ComposeError> {
  let items = defaults.as_seq().ok_or_else(|| {
    ComposeError::Composition(format!("In `{doc_path}`: `defaults` must be a list"))
  })?;

  items.iter().map(|item| parse_entry(doc_path, item)).collect()
}

fn parse_entry(doc_path: &str, item: &Value) -> Result<InputDefault, ComposeError> {
  match item {
    Value::String(s) => {
      if s == SELF_KEYWORD {
        return Ok(InputDefault::SelfRef);
      }
      let (spec, optional) = strip_optional(s);
      let (path, package) = split_package(spec);
      Ok(InputDefault::Config {
        path: path.to_string(),
        package,
        optional,
      })
    }
    Value::Map(map) if map.len() == 1 => {
      let (key, value) = map.iter().next().unwrap();
      let (key, optional) = strip_optional(key);
      let (name, package) = split_package(key);

      if name == PATCH_KEYWORD {
        return Ok(InputDefault::Patch {
          package: explicit_patch_package(key),
          lines: parse_patch_lines(doc_path, value)?,
        });
      }

      let value = match value {
        Value::Null => GroupValue::Null,
        Value::Missing => GroupValue::Mandatory,
        Value::String(s) => GroupValue::Name(s.clone()),
        Value::Seq(items) => {
          let names = items
            .iter()
            .map(|v| {
              v.as_str().map(str::to_string).ok_or_else(|| {
                ComposeError::Composition(format!(
                  "In `{doc_path}`: the options of `{name}` must be names, found a {}",
                  v.type_name()
                ))
              })
            })
            .collect::<Result<Vec<_>, _>>()?;
          GroupValue::Names(names)
        }
        other => {
          return Err(ComposeError::Composition(format!(
            "In `{doc_path}`: invalid value for `{name}` in the defaults list: {}",
            other.type_name()
          )));
        }
      };

      Ok(InputDefault::Group {
        group: name.to_string(),
        value,
        package,
        optional,
      })
    }
    other => Err(ComposeError::Composition(format!(
      "In `{doc_path}`: invalid defaults list entry of type {}",
      other.type_name()
    ))),
  }
}

fn strip_optional(key: &str) -> (&str, bool) {
  match key.strip_prefix(OPTIONAL_PREFIX) {
    Some(rest) => (rest.trim_start(), true),
    None => (key, false),
  }
}

fn split_package(spec: &str) -> (&str, Option<String>) {
  match spec.split_once('@') {
    Some((name, pkg)) => (name, Some(pkg.to_string())),
    None => (spec, None),
  }
}

/// `_patch_@` with an explicitly empty package is distinguished from a bare
/// `_patch_` so it can be rejected later.
fn explicit_patch_package(key: &str) -> Option<String> {
  key.split_once('@').map(|(_, pkg)| pkg.to_string())
}

fn parse_patch_lines(doc_path: &str, value: &Value) -> Result<Vec<String>, ComposeError> {
  let items = match value {
    Value::String(line) => return Ok(vec![line.clone()]),
    Value::Seq(items) => items,
    other => {
      return Err(ComposeError::Composition(format!(
        "In `{doc_path}`: `{PATCH_KEYWORD}` must hold a list of override strings, found a {}",
        other.type_name()
      )));
    }
  };
  items
    .iter()
    .map(|v| {
      v.as_str().map(str::to_string).ok_or_else(|| {
        ComposeError::Composition(format!(
          "In `{doc_path}`: `{PATCH_KEYWORD}` entries must be override strings, found a {}",
          v.type_name()
        ))
      })
    })
    .collect()
}

/// Joins a path onto a base dir and normalizes it: `.` and doubled slashes
/// collapse, `..` pops but never rises above the root. A leading `/` makes
/// the path absolute from the root, ignoring the base dir.
pub fn normalize_path(base_dir: &str, path: &str) -> String {
  let joined = if path.starts_with('/') {
    path.to_string()
  } else if base_dir.is_empty() {
    path.to_string()
  } else {
    format!("{base_dir}/{path}")
  };

  let mut segments: Vec<&str> = Vec::new();
  for segment in joined.split('/') {
    match segment {
      "" | "." => {}
      ".." => {
        segments.pop();
      }
      other => segments.push(other),
    }
  }
  segments.join("/")
}

/// The directory part of a config path (`""` for root-level names).
pub(crate) fn dirname(path: &str) -> &str {
  match path.rfind('/') {
    Some(idx) => &path[..idx],
    None => "",
  }
}

pub(crate) fn basename(path: &str) -> &str {
  match path.rfind('/') {
    Some(idx) => &path[idx + 1..],
    None => path,
  }
}

/// `a/b/c` -> `a.b.c`, with `.`/`..` segments and a leading `/` dropped.
pub(crate) fn group_to_package(group: &str) -> String {
  group
    .split('/')
    .filter(|s| !s.is_empty() && *s != "." && *s != "..")
    .collect::<Vec<_>>()
    .join(".")
}

pub(crate) fn join_packages(parent: &str, child: &str) -> String {
  match (parent.is_empty(), child.is_empty()) {
    (true, _) => child.to_string(),
    (_, true) => parent.to_string(),
    _ => format!("{parent}.{child}"),
  }
}

const GLOBAL_TOKEN: &str = "_global_";
const HERE_TOKEN: &str = "_here_";
const GROUP_TOKEN: &str = "_group_";
const NAME_TOKEN: &str = "_name_";

/// Resolves an explicit `@package` annotation from a defaults entry or an
/// override. The result is relative to the parent package unless the spec
/// escapes to the root with `_global_`.
pub(crate) fn resolve_explicit_package(spec: &str, parent: &str, group: &str, name: &str) -> String {
  if spec == HERE_TOKEN {
    return parent.to_string();
  }
  if spec == GLOBAL_TOKEN {
    return String::new();
  }
  if let Some(rest) = spec.strip_prefix(GLOBAL_TOKEN) {
    return substitute_tokens(rest.trim_start_matches('.'), group, name);
  }
  join_packages(parent, &substitute_tokens(spec, group, name))
}

/// Resolves a document's `package:` header. Headers are absolute: they name
/// the full graft point of the document.
pub(crate) fn resolve_header_package(spec: &str, config_path: &str, parent: &str) -> String {
  let group = group_to_package(dirname(config_path));
  let name = basename(config_path);

  if spec == HERE_TOKEN {
    return parent.to_string();
  }
  if spec == GLOBAL_TOKEN {
    return String::new();
  }
  if let Some(rest) = spec.strip_prefix(GLOBAL_TOKEN) {
    return substitute_tokens(rest.trim_start_matches('.'), &group, name);
  }
  substitute_tokens(spec, &group, name)
}

fn substitute_tokens(spec: &str, group: &str, name: &str) -> String {
  spec
    .split('.')
    .map(|segment| match segment {
      GROUP_TOKEN => group.to_string(),
      NAME_TOKEN => name.to_string(),
      other => other.to_string(),
    })
    .filter(|s| !s.is_empty())
    .collect::<Vec<_>>()
    .join(".")
}
