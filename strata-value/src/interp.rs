use std::env;

use crate::{path::get_at, Value, ValueError};

/// Resolves every `${...}` placeholder in the tree, returning the resolved
/// copy. References are looked up against the unresolved input tree, so
/// chains of interpolations resolve regardless of document order; cycles are
/// detected with a visiting set.
pub fn resolve_tree(root: &Value) -> Result<Value, ValueError> {
  let mut resolver = Resolver {
    root,
    visiting: Vec::new(),
  };
  resolver.resolve_node(root, "")
}

struct Resolver<'a> {
  root: &'a Value,
  visiting: Vec<String>,
}

enum Segment<'s> {
  Literal(&'s str),
  Expr(&'s str),
}

impl Resolver<'_> {
  fn resolve_node(&mut self, node: &Value, full_key: &str) -> Result<Value, ValueError> {
    match node {
      Value::String(s) if s.contains("${") => self.resolve_string(s, full_key),
      Value::Map(map) => {
        let mut out = crate::Map::new();
        for (key, val) in map {
          let child_key = if full_key.is_empty() {
            key.clone()
          } else {
            format!("{full_key}.{key}")
          };
          out.insert(key.clone(), self.resolve_node(val, &child_key)?);
        }
        Ok(Value::Map(out))
      }
      Value::Seq(items) => {
        let mut out = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
          out.push(self.resolve_node(item, &format!("{full_key}[{idx}]"))?);
        }
        Ok(Value::Seq(out))
      }
      other => Ok(other.clone()),
    }
  }

  fn resolve_string(&mut self, text: &str, full_key: &str) -> Result<Value, ValueError> {
    let segments = split_segments(text, full_key)?;

    // A string that is a single placeholder grafts the referenced node,
    // keeping its type. Anything else stringifies.
    if let [Segment::Expr(expr)] = segments.as_slice() {
      return self.resolve_expr(expr, full_key);
    }

    let mut out = String::new();
    for segment in segments {
      match segment {
        Segment::Literal(lit) => out.push_str(lit),
        Segment::Expr(expr) => {
          let resolved = self.resolve_expr(expr, full_key)?;
          if !resolved.is_scalar() {
            return Err(ValueError::Interpolation {
              full_key: full_key.to_string(),
              object_type: resolved.type_name(),
              message: format!("cannot embed a {} inside a string", resolved.type_name()),
            });
          }
          out.push_str(&resolved.unquoted().to_string());
        }
      }
    }
    Ok(Value::String(out))
  }

  fn resolve_expr(&mut self, expr: &str, full_key: &str) -> Result<Value, ValueError> {
    // Nested placeholders inside the expression resolve first, e.g.
    // ${db.${selector}}.
    let expr = if expr.contains("${") {
      match self.resolve_string(expr, full_key)? {
        Value::String(s) => s,
        other => other.to_string(),
      }
    } else {
      expr.to_string()
    };
    let expr = expr.trim();

    if let Some(rest) = expr.strip_prefix("oc.env:").or_else(|| expr.strip_prefix("env:")) {
      return self.resolve_env(rest, full_key);
    }

    if self.visiting.iter().any(|seen| seen == expr) {
      let mut chain = self.visiting.clone();
      chain.push(expr.to_string());
      return Err(ValueError::InterpolationCycle {
        chain: chain.join(" -> "),
      });
    }

    let target = get_at(self.root, expr).ok_or_else(|| ValueError::Interpolation {
      full_key: full_key.to_string(),
      object_type: "str",
      message: format!("interpolation key `{expr}` not found"),
    })?;

    self.visiting.push(expr.to_string());
    let resolved = self.resolve_node(target, expr)?;
    self.visiting.pop();

    if resolved.is_missing() {
      return Err(ValueError::MissingMandatoryValue {
        full_key: expr.to_string(),
      });
    }
    Ok(resolved.unquoted())
  }

  fn resolve_env(&self, spec: &str, full_key: &str) -> Result<Value, ValueError> {
    let (name, default) = match spec.split_once(',') {
      Some((name, default)) => (name.trim(), Some(default)),
      None => (spec.trim(), None),
    };

    match env::var(name) {
      Ok(val) => Ok(Value::String(val)),
      Err(_) => match default {
        Some(default) => Ok(Value::String(default.to_string())),
        None => Err(ValueError::Interpolation {
          full_key: full_key.to_string(),
          object_type: "str",
          message: format!("environment variable `{name}` not found and no default was given"),
        }),
      },
    }
  }
}

/// Splits a string into literal and `${...}` segments, balancing nested
/// braces so that `${db.${sel}}` stays one expression.
fn split_segments<'s>(text: &'s str, full_key: &str) -> Result<Vec<Segment<'s>>, ValueError> {
  let mut segments = Vec::new();
  let mut rest = text;

  while let Some(start) = rest.find("${") {
    if start > 0 {
      segments.push(Segment::Literal(&rest[..start]));
    }
    let after = &rest[start + 2..];

    let mut depth = 1;
    let mut end = None;
    let mut idx = 0;
    while idx < after.len() {
      if after[idx..].starts_with("${") {
        depth += 1;
        idx += 2;
      } else if after[idx..].starts_with('}') {
        depth -= 1;
        if depth == 0 {
          end = Some(idx);
          break;
        }
        idx += 1;
      } else {
        idx += after[idx..].chars().next().map_or(1, char::len_utf8);
      }
    }

    let end = end.ok_or_else(|| ValueError::Interpolation {
      full_key: full_key.to_string(),
      object_type: "str",
      message: format!("unterminated interpolation in `{text}`"),
    })?;
    segments.push(Segment::Expr(&after[..end]));
    rest = &after[end + 1..];
  }

  if !rest.is_empty() {
    segments.push(Segment::Literal(rest));
  }
  Ok(segments)
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::yaml::from_yaml_str;

  fn resolve(yaml: &str) -> Result<Value, ValueError> {
    resolve_tree(&from_yaml_str(yaml).unwrap())
  }

  #[test]
  fn simple_reference() {
    let result = resolve("name: Alice\ngreeting: hello ${name}\n").unwrap();
    assert_eq!(result, from_yaml_str("name: Alice\ngreeting: hello Alice\n").unwrap());
  }

  #[test]
  fn whole_string_reference_keeps_type() {
    let result = resolve("port: 5432\nalias: ${port}\n").unwrap();
    assert_eq!(result, from_yaml_str("port: 5432\nalias: 5432\n").unwrap());
  }

  #[test]
  fn chained_references() {
    let result = resolve("a: 1\nb: ${a}\nc: ${b}\n").unwrap();
    assert_eq!(result, from_yaml_str("a: 1\nb: 1\nc: 1\n").unwrap());
  }

  #[test]
  fn nested_key_selection() {
    let result = resolve("sel: mysql\ndb:\n  mysql: 3306\nport: ${db.${sel}}\n").unwrap();
    assert_eq!(
      result,
      from_yaml_str("sel: mysql\ndb:\n  mysql: 3306\nport: 3306\n").unwrap()
    );
  }

  #[test]
  fn env_with_default() {
    let result = resolve("greeting: hi ${oc.env:STRATA_NO_SUCH_VAR,world}\n").unwrap();
    assert_eq!(result, from_yaml_str("greeting: hi world\n").unwrap());
  }

  #[test]
  fn env_short_form() {
    // Same lookup, `env:` spelling.
    let result = resolve("greeting: hi ${env:STRATA_NO_SUCH_VAR,there}\n").unwrap();
    assert_eq!(result, from_yaml_str("greeting: hi there\n").unwrap());
  }

  #[test]
  fn env_missing_without_default_fails() {
    let err = resolve("x: ${oc.env:STRATA_NO_SUCH_VAR}\n").unwrap_err();
    match err {
      ValueError::Interpolation { full_key, .. } => assert_eq!(full_key, "x"),
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn unresolved_reference_carries_full_key() {
    let err = resolve("db:\n  url: ${db.nope}\n").unwrap_err();
    match err {
      ValueError::Interpolation { full_key, .. } => assert_eq!(full_key, "db.url"),
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn cycle_is_detected() {
    let err = resolve("a: ${b}\nb: ${a}\n").unwrap_err();
    match err {
      ValueError::InterpolationCycle { chain } => assert!(chain.contains("a -> b") || chain.contains("b -> a")),
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn missing_target_fails() {
    let err = resolve("req: ???\nuse: ${req}\n").unwrap_err();
    assert!(matches!(err, ValueError::MissingMandatoryValue { full_key } if full_key == "req"));
  }

  #[test]
  fn untouched_missing_leaf_passes_through() {
    let result = resolve("req: ???\nother: 1\n").unwrap();
    assert_eq!(crate::path::get_at(&result, "req"), Some(&Value::Missing));
  }
}
