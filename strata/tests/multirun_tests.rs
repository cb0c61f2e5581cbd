use std::fs::{create_dir_all, write};

use pretty_assertions::assert_eq;
use strata::compose::{compose_multirun, ComposeSettings};
use strata::pkg::register_tree;
use strata::search_path::SearchPath;
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

#[test]
fn discrete_sweep_composes_every_combination() {
  let dir = config_tree(&[
    ("config.yaml", "defaults:\n  - db: mysql\n  - _self_\nport: 0\n"),
    ("db/mysql.yaml", "driver: mysql\n"),
    ("db/postgres.yaml", "driver: postgres\n"),
  ]);

  let jobs = compose_multirun(
    &ComposeSettings::from_config_dir(dir.path()),
    Some("config"),
    &["db=mysql,postgres".to_string(), "port=3306,5432".to_string()],
  )
  .unwrap();

  assert_eq!(jobs.len(), 4);
  let seen: Vec<(String, i64)> = jobs
    .iter()
    .map(|job| {
      let driver = get_at(&job.config, "db.driver").unwrap().as_str().unwrap().to_string();
      let port = match get_at(&job.config, "port").unwrap() {
        Value::Int(i) => *i,
        other => panic!("unexpected port: {other}"),
      };
      (driver, port)
    })
    .collect();
  assert_eq!(
    seen,
    vec![
      ("mysql".to_string(), 3306),
      ("mysql".to_string(), 5432),
      ("postgres".to_string(), 3306),
      ("postgres".to_string(), 5432),
    ]
  );
}

#[test]
fn range_sweep_over_values() {
  let dir = config_tree(&[("config.yaml", "n: 0\n")]);
  let jobs = compose_multirun(
    &ComposeSettings::from_config_dir(dir.path()),
    Some("config"),
    &["n=range(1,4)".to_string()],
  )
  .unwrap();

  let values: Vec<Value> = jobs.iter().map(|j| get_at(&j.config, "n").unwrap().clone()).collect();
  assert_eq!(values, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
}

#[test]
fn glob_sweep_enumerates_through_pkg_sources() {
  register_tree(
    "multirun_test.conf",
    &[
      ("config.yaml", "defaults:\n  - db: mysql\n"),
      ("db/mysql.yaml", "driver: mysql\n"),
      ("db/postgresql.yaml", "driver: postgresql\n"),
      ("db/sqlite.yaml", "driver: sqlite\n"),
    ],
  );

  let mut search_path = SearchPath::new();
  search_path.append("embedded", "pkg://multirun_test.conf");
  let settings = ComposeSettings {
    search_path,
    ..ComposeSettings::default()
  };

  let jobs = compose_multirun(&settings, Some("config"), &["db=glob(*)".to_string()]).unwrap();
  let drivers: Vec<&str> = jobs
    .iter()
    .map(|j| get_at(&j.config, "db.driver").unwrap().as_str().unwrap())
    .collect();
  assert_eq!(drivers, vec!["mysql", "postgresql", "sqlite"]);
}

#[test]
fn single_job_when_no_sweeps() {
  let dir = config_tree(&[("config.yaml", "a: 1\n")]);
  let jobs = compose_multirun(
    &ComposeSettings::from_config_dir(dir.path()),
    Some("config"),
    &["a=2".to_string()],
  )
  .unwrap();
  assert_eq!(jobs.len(), 1);
  assert_eq!(jobs[0].config, from_yaml_str("a: 2\n").unwrap());
}

#[test]
fn interval_sweep_is_rejected_by_the_basic_expander() {
  let dir = config_tree(&[("config.yaml", "lr: 0.0\n")]);
  let err = compose_multirun(
    &ComposeSettings::from_config_dir(dir.path()),
    Some("config"),
    &["lr=interval(0.0,1.0)".to_string()],
  )
  .unwrap_err();
  assert!(err.to_string().contains("continuous"), "{err}");
}

#[test]
fn shuffled_sweep_is_deterministic_for_a_seed() {
  let dir = config_tree(&[("config.yaml", "n: 0\n")]);
  let settings = ComposeSettings::from_config_dir(dir.path());
  let overrides = vec!["n=shuffle(range(0,10))".to_string()];

  let first = compose_multirun(&settings, Some("config"), &overrides).unwrap();
  let second = compose_multirun(&settings, Some("config"), &overrides).unwrap();
  let order = |jobs: &[strata::Composed]| -> Vec<Value> {
    jobs.iter().map(|j| get_at(&j.config, "n").unwrap().clone()).collect()
  };
  assert_eq!(order(&first), order(&second));

  let reseeded = ComposeSettings {
    seed: 7,
    ..ComposeSettings::from_config_dir(dir.path())
  };
  let third = compose_multirun(&reseeded, Some("config"), &overrides).unwrap();
  assert_ne!(order(&first), order(&third));
}
