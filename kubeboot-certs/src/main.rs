use std::process;

use anyhow::Result;
use clap::Parser;
use kubeboot_certs::Cli;
use tracing::{debug, info};
use tracing_log::AsTrace;
use tracing_subscriber::FmtSubscriber;

#[cfg(not(tarpaulin_include))]
fn main() -> Result<()> {
  let cli = Cli::parse();
  let subscriber = FmtSubscriber::builder()
    .with_max_level(cli.verbose.log_level_filter().as_trace())
    .without_time()
    .finish();
  tracing::subscriber::set_global_default(subscriber).expect("Setting default subscriber failed");

  match cli.generate() {
    Ok(report) => {
      for (name, outcome) in &report.artifacts {
        debug!("{name}: {outcome}");
      }
      info!("Success!");
      Ok(())
    }
    Err(err) => {
      eprintln!("{err:#}");
      process::exit(1);
    }
  }
}
