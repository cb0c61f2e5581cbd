use std::fs::{create_dir_all, write};

use assert_cmd::Command;
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

fn strata() -> Command {
  Command::cargo_bin("strata").unwrap()
}

#[test]
fn composes_and_prints_yaml() {
  let dir = config_tree(&[
    ("config.yaml", "defaults:\n  - db: mysql\napp_name: myapp\n"),
    ("db/mysql.yaml", "driver: mysql\nport: 3306\n"),
  ]);

  strata()
    .arg("-d")
    .arg(dir.path())
    .args(["-n", "config", "db.port=5432"])
    .assert()
    .success()
    .stdout(predicates::str::contains("port: 5432"))
    .stdout(predicates::str::contains("app_name: myapp"));
}

#[test]
fn bad_override_exits_nonzero() {
  let dir = config_tree(&[("config.yaml", "a: 1\n")]);

  strata()
    .arg("-d")
    .arg(dir.path())
    .args(["-n", "config", "=broken"])
    .assert()
    .failure()
    .stderr(predicates::str::contains("Error parsing override"));
}

#[test]
fn missing_config_exits_nonzero() {
  let dir = config_tree(&[("config.yaml", "a: 1\n")]);

  strata()
    .arg("-d")
    .arg(dir.path())
    .args(["-n", "nope"])
    .assert()
    .failure()
    .stderr(predicates::str::contains("Error"));
}

#[test]
fn info_searchpath_lists_sources() {
  let dir = config_tree(&[("config.yaml", "a: 1\n")]);

  strata()
    .arg("-d")
    .arg(dir.path())
    .args(["--info", "searchpath"])
    .assert()
    .success()
    .stdout(predicates::str::contains("pkg://strata.conf"))
    .stdout(predicates::str::contains("main"));
}

#[test]
fn info_defaults_shows_the_merge_plan() {
  let dir = config_tree(&[
    ("config.yaml", "defaults:\n  - db: mysql\n"),
    ("db/mysql.yaml", "driver: mysql\n"),
  ]);

  strata()
    .arg("-d")
    .arg(dir.path())
    .args(["-n", "config", "--info", "defaults"])
    .assert()
    .success()
    .stdout(predicates::str::contains("db/mysql"))
    .stdout(predicates::str::contains("(self)"));
}

#[test]
fn multirun_prints_one_config_per_job() {
  let dir = config_tree(&[("config.yaml", "port: 0\n")]);

  strata()
    .arg("-d")
    .arg(dir.path())
    .args(["-n", "config", "-m", "port=1,2"])
    .assert()
    .success()
    .stdout(predicates::str::contains("# job 0"))
    .stdout(predicates::str::contains("# job 1"))
    .stdout(predicates::str::contains("port: 1"))
    .stdout(predicates::str::contains("port: 2"));
}

#[test]
fn no_resolve_keeps_interpolations() {
  let dir = config_tree(&[("config.yaml", "name: world\ngreeting: hi ${name}\n")]);

  strata()
    .arg("-d")
    .arg(dir.path())
    .args(["-n", "config", "--no-resolve"])
    .assert()
    .success()
    .stdout(predicates::str::contains("hi ${name}"));
}
