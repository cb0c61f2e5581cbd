use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use indexmap::IndexMap;
use strata_value::{path::remove_at, yaml::to_yaml_string, Value};

use crate::{
  compose::{compose, compose_multirun, effective_search_path, resolve_defaults, ComposeSettings},
  ComposeError,
};

#[derive(Debug, Parser)]
#[command(name = "strata", version, about = "Compose layered configurations from defaults lists and overrides")]
pub struct Cli {
  /// Directory holding the config tree.
  #[arg(long, short = 'd', value_name = "DIR", default_value = "conf")]
  pub config_dir: PathBuf,

  /// Name of the primary config to compose (extension-free, e.g. `config`
  /// or `server/alpha`).
  #[arg(long, short = 'n', value_name = "NAME")]
  pub config_name: Option<String>,

  /// Expand sweep overrides and compose one config per job.
  #[arg(long, short = 'm')]
  pub multirun: bool,

  /// Leave `${...}` interpolations unresolved in the output.
  #[arg(long)]
  pub no_resolve: bool,

  /// Seed for `shuffle()` and shuffled sweeps.
  #[arg(long, default_value_t = 0)]
  pub seed: u64,

  /// Print engine information instead of the composed config.
  #[arg(long, value_enum, value_name = "KIND")]
  pub info: Option<InfoKind>,

  /// Override strings: `key=value`, `group=option`, `+group=option`,
  /// `~key`, and sweeps such as `key=a,b` in multirun mode.
  pub overrides: Vec<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum InfoKind {
  Searchpath,
  Defaults,
  Config,
}

impl Cli {
  fn settings(&self) -> ComposeSettings {
    let mut settings = ComposeSettings::from_config_dir(&self.config_dir);
    settings.prepend_builtin = true;
    settings.resolve = !self.no_resolve;
    settings.seed = self.seed;
    settings
  }
}

/// The engine's own node is composed alongside the job config but is not
/// part of the printed output.
fn render_config(config: &mut Value) -> Result<String, ComposeError> {
  remove_at(config, "strata");
  Ok(to_yaml_string(config, &IndexMap::new())?)
}

pub fn run(cli: &Cli) -> Result<(), ComposeError> {
  let settings = cli.settings();

  match cli.info {
    Some(InfoKind::Searchpath) => {
      for entry in effective_search_path(&settings).entries() {
        println!("{}\t{}", entry.provider, entry.path);
      }
      Ok(())
    }
    Some(InfoKind::Defaults) => {
      let defaults = resolve_defaults(&settings, cli.config_name.as_deref(), &cli.overrides)?;
      for rd in &defaults.defaults {
        let package = if rd.package.is_empty() { "_global_" } else { &rd.package };
        let marker = if rd.is_self { " (self)" } else { "" };
        println!("{}\t{package}{marker}", rd.config_path);
      }
      Ok(())
    }
    Some(InfoKind::Config) | None => {
      if cli.multirun {
        let jobs = compose_multirun(&settings, cli.config_name.as_deref(), &cli.overrides)?;
        for (num, mut job) in jobs.into_iter().enumerate() {
          println!("# job {num}");
          print!("{}", render_config(&mut job.config)?);
        }
      } else {
        let mut composed = compose(&settings, cli.config_name.as_deref(), &cli.overrides)?;
        print!("{}", render_config(&mut composed.config)?);
      }
      Ok(())
    }
  }
}
