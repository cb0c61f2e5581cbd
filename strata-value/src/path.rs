use crate::{Map, Value, ValueError};

/// Looks up a node by dotted path. An empty path returns the root.
pub fn get_at<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
  if path.is_empty() {
    return Some(root);
  }
  let mut current = root;
  for segment in path.split('.') {
    current = current.as_map()?.get(segment)?;
  }
  Some(current)
}

pub fn get_at_mut<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
  if path.is_empty() {
    return Some(root);
  }
  let mut current = root;
  for segment in path.split('.') {
    current = current.as_map_mut()?.get_mut(segment)?;
  }
  Some(current)
}

/// Writes a value at a dotted path, creating intermediate maps along the way.
/// Fails if an intermediate node exists but is not a map.
pub fn set_at(root: &mut Value, path: &str, value: Value) -> Result<(), ValueError> {
  let map = ensure_map_at(root, parent_of(path))?;
  map.insert(leaf_of(path).to_string(), value);
  Ok(())
}

/// Removes the node at a dotted path, returning it if it was present.
pub fn remove_at(root: &mut Value, path: &str) -> Option<Value> {
  let parent = get_at_mut(root, parent_of(path))?;
  parent.as_map_mut()?.shift_remove(leaf_of(path))
}

/// Returns the map at a dotted path, creating empty maps for absent
/// segments. An empty path addresses the root map.
pub fn ensure_map_at<'a>(root: &'a mut Value, path: &str) -> Result<&'a mut Map, ValueError> {
  let mut current = root;
  let mut walked = String::new();

  for segment in path.split('.').filter(|s| !s.is_empty()) {
    if !walked.is_empty() {
      walked.push('.');
    }
    walked.push_str(segment);

    let map = current.as_map_mut().ok_or_else(|| ValueError::TypeMismatch {
      path: walked.clone(),
      expected: "dict",
      found: "non-dict",
    })?;
    current = map.entry(segment.to_string()).or_insert_with(|| Value::Map(Map::new()));
  }

  let found = current.type_name();
  current.as_map_mut().ok_or(ValueError::TypeMismatch {
    path: walked,
    expected: "dict",
    found,
  })
}

fn parent_of(path: &str) -> &str {
  match path.rfind('.') {
    Some(idx) => &path[..idx],
    None => "",
  }
}

fn leaf_of(path: &str) -> &str {
  match path.rfind('.') {
    Some(idx) => &path[idx + 1..],
    None => path,
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::yaml::from_yaml_str;

  #[test]
  fn get_nested() {
    let root = from_yaml_str("db:\n  pool:\n    size: 5\n").unwrap();
    assert_eq!(get_at(&root, "db.pool.size"), Some(&Value::Int(5)));
    assert_eq!(get_at(&root, "db.missing"), None);
    assert_eq!(get_at(&root, ""), Some(&root));
  }

  #[test]
  fn set_creates_intermediate_maps() {
    let mut root = Value::Map(Map::new());
    set_at(&mut root, "a.b.c", Value::Int(42)).unwrap();
    assert_eq!(get_at(&root, "a.b.c"), Some(&Value::Int(42)));
  }

  #[test]
  fn set_through_scalar_fails() {
    let mut root = from_yaml_str("a: 1\n").unwrap();
    let err = set_at(&mut root, "a.b", Value::Int(2)).unwrap_err();
    assert!(err.to_string().contains("a"));
  }

  #[test]
  fn remove_leaf() {
    let mut root = from_yaml_str("db:\n  host: localhost\n  port: 3306\n").unwrap();
    assert_eq!(remove_at(&mut root, "db.port"), Some(Value::Int(3306)));
    assert_eq!(get_at(&root, "db.port"), None);
    assert_eq!(remove_at(&mut root, "db.port"), None);
  }
}
