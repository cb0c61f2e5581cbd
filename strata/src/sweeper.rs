//! Expansion of sweep overrides into concrete per-job override lists.

use globset::{Glob, GlobSet, GlobSetBuilder};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use strata_value::Value;

use crate::{
  overrides::{Override, OverrideValue, Sweep},
  repository::CachingConfigRepository,
  ComposeError,
};

/// One unit of a multirun: the concrete override lines for a single
/// composition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobSpec {
  pub num: usize,
  pub overrides: Vec<String>,
}

/// Expands every discrete sweep (choice, range, glob) into its items and
/// returns the Cartesian product across overrides, preserving override
/// order within each job. Interval sweeps are continuous: they pass through
/// as their original lines for the sweeper plugin to consume. Non-sweep
/// overrides appear verbatim in every job.
pub fn expand_overrides(
  overrides: &[Override],
  repo: &CachingConfigRepository,
  seed: u64,
) -> Result<Vec<JobSpec>, ComposeError> {
  let mut alternatives: Vec<Vec<String>> = Vec::with_capacity(overrides.len());
  for (idx, o) in overrides.iter().enumerate() {
    alternatives.push(expand_one(o, repo, seed.wrapping_add(idx as u64))?);
  }

  let mut jobs: Vec<Vec<String>> = vec![Vec::new()];
  for alts in &alternatives {
    let mut next = Vec::with_capacity(jobs.len() * alts.len());
    for job in &jobs {
      for alt in alts {
        let mut extended = job.clone();
        extended.push(alt.clone());
        next.push(extended);
      }
    }
    jobs = next;
  }

  Ok(
    jobs
      .into_iter()
      .enumerate()
      .map(|(num, overrides)| JobSpec { num, overrides })
      .collect(),
  )
}

fn expand_one(
  o: &Override,
  repo: &CachingConfigRepository,
  seed: u64,
) -> Result<Vec<String>, ComposeError> {
  let OverrideValue::Sweep(sweep) = &o.value else {
    return Ok(vec![o.input_line.clone()]);
  };

  let key = o.key_element();
  match sweep {
    Sweep::Interval(_) => Ok(vec![o.input_line.clone()]),

    Sweep::Choice(choice) => {
      let mut items: Vec<String> = choice.items.iter().map(|v| format!("{key}={v}")).collect();
      if choice.shuffle {
        items.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
      }
      Ok(items)
    }

    Sweep::Range(range) => {
      let mut items: Vec<String> = range_items(range).iter().map(|v| format!("{key}={v}")).collect();
      if items.is_empty() {
        return Err(ComposeError::validation(format!(
          "range sweep '{}' produced no values",
          o.input_line
        )));
      }
      if range.shuffle {
        items.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
      }
      Ok(items)
    }

    Sweep::Glob(glob) => {
      let include = build_globset(&glob.include)?;
      let exclude = build_globset(&glob.exclude)?;
      let options: Vec<String> = repo
        .get_group_options(&o.key_or_group)
        .into_iter()
        .filter(|name| include.is_match(name) && !exclude.is_match(name))
        .collect();
      if options.is_empty() {
        return Err(ComposeError::validation(format!(
          "glob sweep '{}' matched no options in group '{}'",
          o.input_line, o.key_or_group
        )));
      }
      Ok(options.into_iter().map(|name| format!("{key}={name}")).collect())
    }
  }
}

fn range_items(range: &crate::overrides::RangeSweep) -> Vec<Value> {
  let mut items = Vec::new();
  if range.is_int {
    let (start, stop, step) = (range.start as i64, range.stop as i64, range.step as i64);
    let mut current = start;
    while (step > 0 && current < stop) || (step < 0 && current > stop) {
      items.push(Value::Int(current));
      current += step;
    }
  } else {
    let mut current = range.start;
    while (range.step > 0.0 && current < range.stop) || (range.step < 0.0 && current > range.stop) {
      items.push(Value::Float(current));
      current += range.step;
    }
  }
  items
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, ComposeError> {
  let mut builder = GlobSetBuilder::new();
  for pattern in patterns {
    let glob = Glob::new(pattern).map_err(|e| {
      ComposeError::validation(format!("invalid glob pattern '{pattern}': {e}"))
    })?;
    builder.add(glob);
  }
  builder
    .build()
    .map_err(|e| ComposeError::validation(format!("could not build glob matcher: {e}")))
}

#[cfg(test)]
mod tests {
  use std::fs::{create_dir_all, write};

  use pretty_assertions::assert_eq;

  use super::*;
  use crate::overrides::{parse_overrides, Functions};
  use crate::search_path::SearchPath;

  fn empty_repo() -> CachingConfigRepository {
    CachingConfigRepository::from_search_path(&SearchPath::new()).unwrap()
  }

  fn expand(lines: &[&str], repo: &CachingConfigRepository) -> Vec<JobSpec> {
    let lines: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
    let parsed = parse_overrides(&lines, &Functions::default()).unwrap();
    expand_overrides(&parsed, repo, 0).unwrap()
  }

  #[test]
  fn cartesian_product_cardinality() {
    let repo = empty_repo();
    let jobs = expand(&["db=mysql,postgres", "port=3306,5432"], &repo);
    assert_eq!(jobs.len(), 4);
    let lists: Vec<Vec<String>> = jobs.iter().map(|j| j.overrides.clone()).collect();
    assert_eq!(
      lists,
      vec![
        vec!["db=mysql".to_string(), "port=3306".to_string()],
        vec!["db=mysql".to_string(), "port=5432".to_string()],
        vec!["db=postgres".to_string(), "port=3306".to_string()],
        vec!["db=postgres".to_string(), "port=5432".to_string()],
      ]
    );
    // All pairwise distinct.
    for (i, a) in lists.iter().enumerate() {
      for b in &lists[i + 1..] {
        assert_ne!(a, b);
      }
    }
  }

  #[test]
  fn non_sweeps_pass_through_every_job() {
    let repo = empty_repo();
    let jobs = expand(&["db=mysql,postgres", "debug=true"], &repo);
    assert_eq!(jobs.len(), 2);
    for job in &jobs {
      assert_eq!(job.overrides[1], "debug=true");
    }
  }

  #[test]
  fn range_materializes() {
    let repo = empty_repo();
    let jobs = expand(&["n=range(1,7,2)"], &repo);
    let firsts: Vec<&str> = jobs.iter().map(|j| j.overrides[0].as_str()).collect();
    assert_eq!(firsts, vec!["n=1", "n=3", "n=5"]);
  }

  #[test]
  fn interval_passes_through_untouched() {
    let repo = empty_repo();
    let jobs = expand(&["lr=interval(0.0,1.0)", "db=a,b"], &repo);
    assert_eq!(jobs.len(), 2);
    for job in &jobs {
      assert_eq!(job.overrides[0], "lr=interval(0.0,1.0)");
    }
  }

  #[test]
  fn shuffle_is_deterministic_per_seed() {
    let repo = empty_repo();
    let a = expand(&["n=shuffle(range(0,20))"], &repo);
    let b = expand(&["n=shuffle(range(0,20))"], &repo);
    assert_eq!(a, b);
  }

  #[test]
  fn glob_filters_group_options() {
    let dir = tempfile::tempdir().unwrap();
    create_dir_all(dir.path().join("db")).unwrap();
    for name in ["mysql", "postgresql", "sqlite"] {
      write(dir.path().join(format!("db/{name}.yaml")), "x: 1\n").unwrap();
    }
    let mut sp = SearchPath::new();
    sp.append("main", &format!("file://{}", dir.path().display()));
    let repo = CachingConfigRepository::from_search_path(&sp).unwrap();

    let jobs = expand(&["db=glob(include=*sql*, exclude=mysql)"], &repo);
    let firsts: Vec<&str> = jobs.iter().map(|j| j.overrides[0].as_str()).collect();
    assert_eq!(firsts, vec!["db=postgresql", "db=sqlite"]);
  }

  #[test]
  fn glob_with_no_matches_fails() {
    let repo = empty_repo();
    let lines = vec!["db=glob(nothing*)".to_string()];
    let parsed = parse_overrides(&lines, &Functions::default()).unwrap();
    assert!(expand_overrides(&parsed, &repo, 0).is_err());
  }
}
