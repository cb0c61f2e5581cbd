use std::fs::{create_dir_all, write};
use std::path::Path;

use pretty_assertions::assert_eq;
use strata::{compose, ComposeError, ComposeSettings};
use strata_value::{path::get_at, yaml::from_yaml_str, Value};
use tempfile::TempDir;

fn config_tree(files: &[(&str, &str)]) -> TempDir {
  let dir = tempfile::tempdir().unwrap();
  for (path, content) in files {
    let full = dir.path().join(path);
    if let Some(parent) = full.parent() {
      create_dir_all(parent).unwrap();
    }
    write(full, content).unwrap();
  }
  dir
}

fn composed(dir: &Path, config_name: &str, overrides: &[&str]) -> Value {
  let overrides: Vec<String> = overrides.iter().map(|s| s.to_string()).collect();
  compose(&ComposeSettings::from_config_dir(dir), Some(config_name), &overrides)
    .unwrap()
    .config
}

fn compose_err(dir: &Path, config_name: &str, overrides: &[&str]) -> ComposeError {
  let overrides: Vec<String> = overrides.iter().map(|s| s.to_string()).collect();
  compose(&ComposeSettings::from_config_dir(dir), Some(config_name), &overrides).unwrap_err()
}

#[test]
fn simple_override() {
  let dir = config_tree(&[("config.yaml", "db:\n  host: localhost\n  port: 3306\n")]);
  let config = composed(dir.path(), "config", &["db.port=5432"]);
  assert_eq!(config, from_yaml_str("db:\n  host: localhost\n  port: 5432\n").unwrap());
}

#[test]
fn defaults_composition() {
  let dir = config_tree(&[
    ("config.yaml", "defaults:\n  - db: mysql\napp_name: myapp\n"),
    ("db/mysql.yaml", "driver: mysql\nport: 3306\n"),
  ]);
  let config = composed(dir.path(), "config", &[]);
  assert_eq!(
    config,
    from_yaml_str("db:\n  driver: mysql\n  port: 3306\napp_name: myapp\n").unwrap()
  );
}

#[test]
fn group_choice_override() {
  let dir = config_tree(&[
    ("config.yaml", "defaults:\n  - db: mysql\n"),
    ("db/mysql.yaml", "driver: mysql\n"),
    ("db/postgresql.yaml", "driver: postgresql\n"),
  ]);
  let config = composed(dir.path(), "config", &["db=postgresql"]);
  assert_eq!(config, from_yaml_str("db:\n  driver: postgresql\n").unwrap());
}

#[test]
fn subfolder_external_append_resolves_at_the_root() {
  let dir = config_tree(&[
    ("db/mysql.yaml", "driver: mysql\nport: 3306\n"),
    ("db/postgresql.yaml", "driver: postgresql\nport: 5432\n"),
    (
      "server/alpha.yaml",
      "defaults:\n  - /db: mysql\n  - _self_\nname: alpha\n",
    ),
  ]);
  let config = composed(dir.path(), "server/alpha", &["+db@db_2=postgresql"]);
  assert_eq!(
    config,
    from_yaml_str(
      "server:\n  db:\n    driver: mysql\n    port: 3306\n  name: alpha\n  db_2:\n    driver: postgresql\n    port: 5432\n"
    )
    .unwrap()
  );
}

#[test]
fn list_mutations_apply_in_order() {
  let dir = config_tree(&[("config.yaml", "tags: [one, two, three]\n")]);
  let config = composed(
    dir.path(),
    "config",
    &["tags=remove_value(two)", "tags=append(four)"],
  );
  assert_eq!(config, from_yaml_str("tags: [one, three, four]\n").unwrap());
}

#[test]
fn nested_list_mutation() {
  let dir = config_tree(&[("config.yaml", "db:\n  hosts: [localhost, replica1]\n")]);
  let config = composed(dir.path(), "config", &["db.hosts=append(replica2)"]);
  assert_eq!(
    config,
    from_yaml_str("db:\n  hosts: [localhost, replica1, replica2]\n").unwrap()
  );
}

#[test]
fn remove_value_then_append_restores_a_unique_element() {
  // Identity up to ordering only when the element appeared exactly once.
  let dir = config_tree(&[("config.yaml", "once: [a, v]\ntwice: [v, a, v]\n")]);
  let config = composed(
    dir.path(),
    "config",
    &["once=remove_value(v)", "once=append(v)", "twice=remove_value(v)", "twice=append(v)"],
  );
  assert_eq!(config, from_yaml_str("once: [a, v]\ntwice: [a, v]\n").unwrap());
}

#[test]
fn insert_at_the_tail_is_allowed() {
  let dir = config_tree(&[("config.yaml", "tags: [one, two]\n")]);
  let config = composed(dir.path(), "config", &["tags=insert(2,three)"]);
  assert_eq!(config, from_yaml_str("tags: [one, two, three]\n").unwrap());
}

#[test]
fn list_mutation_on_non_list_fails() {
  let dir = config_tree(&[("config.yaml", "name: not_a_list\n")]);
  let err = compose_err(dir.path(), "config", &["name=append(x)"]);
  assert!(err.to_string().contains("not a list"), "{err}");
}

#[test]
fn remove_at_out_of_bounds_fails() {
  let dir = config_tree(&[("config.yaml", "tags: [one, two]\n")]);
  let err = compose_err(dir.path(), "config", &["tags=remove_at(10)"]);
  assert!(err.to_string().contains("Cannot remove item"), "{err}");
}

#[test]
fn env_interpolation_with_fallback() {
  let dir = config_tree(&[(
    "config.yaml",
    "greeting: hi ${oc.env:STRATA_COMPOSE_TEST_UNSET,world}\n",
  )]);
  let config = composed(dir.path(), "config", &[]);
  assert_eq!(config, from_yaml_str("greeting: hi world\n").unwrap());
}

#[test]
fn interpolations_resolve_against_the_composed_tree() {
  let dir = config_tree(&[
    ("config.yaml", "defaults:\n  - db: mysql\nurl: ${db.driver}://${db.host}\n"),
    ("db/mysql.yaml", "driver: mysql\nhost: localhost\n"),
  ]);
  let config = composed(dir.path(), "config", &[]);
  assert_eq!(get_at(&config, "url"), Some(&Value::String("mysql://localhost".to_string())));
}

#[test]
fn patch_directives() {
  let dir = config_tree(&[
    (
      "config.yaml",
      "defaults:\n  - lib/refined@lib\n  - _patch_@lib:\n    - ~gamma\n    - tags=remove_value(experimental)\n  - _self_\n",
    ),
    (
      "lib/refined.yaml",
      "defaults:\n  - base@_here_\n  - _patch_:\n    - ~beta\n    - tags=remove_value(old)\n  - _self_\n",
    ),
    (
      "lib/base.yaml",
      "alpha: 1\nbeta: 2\ngamma: 3\ntags: [old, current, experimental]\n",
    ),
  ]);
  let config = composed(dir.path(), "config", &[]);
  assert_eq!(
    config,
    from_yaml_str("lib:\n  alpha: 1\n  tags: [current]\n").unwrap()
  );
}

#[test]
fn cli_override_applies_after_patches() {
  let dir = config_tree(&[(
    "config.yaml",
    "defaults:\n  - _patch_:\n    - answer=from_patch\n  - _self_\nanswer: original\n",
  )]);
  let config = composed(dir.path(), "config", &["answer=from_cli"]);
  assert_eq!(config, from_yaml_str("answer: from_cli\n").unwrap());
}

#[test]
fn patch_with_global_escape() {
  let dir = config_tree(&[
    (
      "config.yaml",
      "defaults:\n  - lib/tweaked@lib\n  - _self_\ntop: old\n",
    ),
    (
      "lib/tweaked.yaml",
      "defaults:\n  - _patch_:\n    - _global_.top=patched\n  - _self_\nlocal: 1\n",
    ),
  ]);
  let config = composed(dir.path(), "config", &[]);
  assert_eq!(get_at(&config, "top"), Some(&Value::String("patched".to_string())));
  assert_eq!(get_at(&config, "lib.local"), Some(&Value::Int(1)));
}

#[test]
fn add_requires_absent_key() {
  let dir = config_tree(&[("config.yaml", "a: 1\n")]);

  let config = composed(dir.path(), "config", &["+b=2"]);
  assert_eq!(config, from_yaml_str("a: 1\nb: 2\n").unwrap());

  let err = compose_err(dir.path(), "config", &["+a=2"]);
  assert!(err.to_string().contains("already at 'a'"), "{err}");

  // Force add is unconditional.
  let config = composed(dir.path(), "config", &["++a=2", "++nested.key=3"]);
  assert_eq!(config, from_yaml_str("a: 2\nnested:\n  key: 3\n").unwrap());
}

#[test]
fn change_requires_existing_key() {
  let dir = config_tree(&[("config.yaml", "a: 1\n")]);
  let err = compose_err(dir.path(), "config", &["missing=2"]);
  assert!(err.to_string().contains("Could not override 'missing'"), "{err}");
}

#[test]
fn delete_requires_existing_key() {
  let dir = config_tree(&[("config.yaml", "a: 1\nb: 2\n")]);

  let config = composed(dir.path(), "config", &["~b"]);
  assert_eq!(config, from_yaml_str("a: 1\n").unwrap());

  let err = compose_err(dir.path(), "config", &["~missing"]);
  assert!(err.to_string().contains("does not exist"), "{err}");

  // A deletion with a value must match the current value.
  let err = compose_err(dir.path(), "config", &["~a=999"]);
  assert!(err.to_string().contains("is not 999"), "{err}");
}

#[test]
fn quoted_values_land_unquoted() {
  let dir = config_tree(&[("config.yaml", "msg: x\n")]);
  let config = composed(dir.path(), "config", &["msg='hello, world'"]);
  assert_eq!(get_at(&config, "msg"), Some(&Value::String("hello, world".to_string())));
}

#[test]
fn header_package_grafts_document() {
  let dir = config_tree(&[
    ("config.yaml", "defaults:\n  - db: mysql\n"),
    ("db/mysql.yaml", "# @package backends.primary\ndriver: mysql\n"),
  ]);
  let config = composed(dir.path(), "config", &[]);
  assert_eq!(
    config,
    from_yaml_str("backends:\n  primary:\n    driver: mysql\n").unwrap()
  );
}

#[test]
fn sweep_in_single_run_is_rejected() {
  let dir = config_tree(&[("config.yaml", "a: 1\n")]);
  let err = compose_err(dir.path(), "config", &["a=1,2"]);
  assert!(err.to_string().contains("multirun"), "{err}");
}

#[test]
fn missing_primary_lists_root_options() {
  let dir = config_tree(&[("config.yaml", "a: 1\n")]);
  let err = compose_err(dir.path(), "nope", &[]);
  match err {
    ComposeError::ConfigLoad { path, message } => {
      assert_eq!(path, "nope");
      assert!(message.contains("config"), "{message}");
    }
    other => panic!("unexpected error: {other}"),
  }
}
