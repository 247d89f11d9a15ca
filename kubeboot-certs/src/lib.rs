pub mod artifact;
pub mod config;
pub mod generate;

use std::{net::IpAddr, path::PathBuf, str::FromStr};

use anyhow::{anyhow, Result};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use kubeboot::SystemRunner;

use crate::generate::{CertGenerator, Report, DEFAULT_OPENSSL_BIN};

/// Comma separated list of worker IP addresses; worker N is the Nth entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerIps(pub Vec<IpAddr>);

impl FromStr for WorkerIps {
  type Err = anyhow::Error;

  fn from_str(s: &str) -> Result<Self> {
    s.split(',')
      .map(|ip| {
        let ip = ip.trim();
        ip.parse::<IpAddr>()
          .map_err(|e| anyhow!("Invalid worker IP address '{ip}': {e}"))
      })
      .collect::<Result<Vec<_>>>()
      .map(WorkerIps)
  }
}

/// Generate the cluster CA and the API server, worker and admin key pairs
///
/// Existing key pairs are reused unless --force is given.
#[derive(Debug, Parser)]
#[command(author, about, version)]
#[command(styles=kubeboot::cli::get_styles())]
pub struct Cli {
  /// IP address of the master running the API server
  pub master_ip: IpAddr,

  /// Comma separated IP addresses of the workers
  pub worker_ips: WorkerIps,

  /// Directory the keys, requests and certificates are written to
  #[arg(short, long, default_value = ".")]
  pub output: PathBuf,

  /// Regenerate key pairs even if they already exist
  #[arg(short, long)]
  pub force: bool,

  /// openssl binary used to create keys and certificates
  #[arg(long, default_value = DEFAULT_OPENSSL_BIN)]
  pub openssl_bin: String,

  #[clap(flatten)]
  pub verbose: Verbosity<InfoLevel>,
}

impl Cli {
  pub fn generate(&self) -> Result<Report> {
    CertGenerator::new(&SystemRunner, &self.openssl_bin, &self.output, self.force)
      .generate(self.master_ip, &self.worker_ips.0)
  }
}
