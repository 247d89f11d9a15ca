pub mod api;
pub mod bootconfig;
pub mod discovery;
pub mod plan;
pub mod provision;

use anyhow::Result;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use kubeboot::SystemRunner;

use crate::{
  api::{DigitalOcean, DEFAULT_API_URL},
  bootconfig::DEFAULT_CT_BIN,
  discovery::{EtcdDiscovery, DEFAULT_DISCOVERY_URL},
  plan::{ClusterPlan, DEFAULT_IMAGE, DEFAULT_REGION, DEFAULT_SIZE},
  provision::{Provisioner, Report},
};

/// Create the volumes, etcd master and worker droplets of a cluster
///
/// Safe to re-run: anything that already exists is left untouched.
#[derive(Debug, Parser)]
#[command(author, about, version)]
#[command(styles=kubeboot::cli::get_styles())]
pub struct Cli {
  /// Name of the cluster; prefixes every droplet and volume name
  pub cluster_name: String,

  /// DigitalOcean API token
  pub token: String,

  /// ID or fingerprint of the DigitalOcean SSH key installed on every droplet
  pub ssh_key_id: String,

  /// Region to create droplets and volumes in
  #[arg(long, default_value = DEFAULT_REGION)]
  pub region: String,

  /// Droplet image
  #[arg(long, default_value = DEFAULT_IMAGE)]
  pub image: String,

  /// Droplet size slug
  #[arg(long, default_value = DEFAULT_SIZE)]
  pub size: String,

  /// Base URL of the DigitalOcean API
  #[arg(long, default_value = DEFAULT_API_URL, hide = true)]
  pub api_url: String,

  /// Base URL of the etcd discovery service
  #[arg(long, default_value = DEFAULT_DISCOVERY_URL)]
  pub discovery_url: String,

  /// Container Linux Config Transpiler binary
  #[arg(long, default_value = DEFAULT_CT_BIN)]
  pub ct_bin: String,

  #[clap(flatten)]
  pub verbose: Verbosity<InfoLevel>,
}

impl Cli {
  pub fn plan(&self) -> ClusterPlan {
    ClusterPlan {
      region: self.region.to_owned(),
      image: self.image.to_owned(),
      size: self.size.to_owned(),
      ..ClusterPlan::new(&self.cluster_name, &self.ssh_key_id)
    }
  }

  pub async fn provision(&self) -> Result<Report> {
    let plan = self.plan();
    let api = DigitalOcean::new(&self.api_url, &self.token)?;
    let discovery = EtcdDiscovery::new(&self.discovery_url)?;

    Provisioner::new(&plan, &api, &discovery, &SystemRunner, &self.ct_bin)
      .await?
      .run()
      .await
  }
}
