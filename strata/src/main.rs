use clap::Parser;
use strata::cli::{run, Cli};
use tracing_subscriber::EnvFilter;

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  if let Err(e) = run(&cli) {
    eprintln!("Error: {e}");
    std::process::exit(1);
  }
}
