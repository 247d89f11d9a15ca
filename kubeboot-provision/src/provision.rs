use std::collections::BTreeSet;

use anyhow::Result;
use kubeboot::Runner;
use tracing::{info, warn};

use crate::{
  api::{CloudApi, CreateInstance, CreateVolume, Volume},
  bootconfig::{self, BootConfig},
  discovery::DiscoveryApi,
  plan::{ClusterPlan, Role},
};

/// What a provisioning run created
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Report {
  pub volumes_created: Vec<String>,
  pub instances_created: Vec<String>,
  pub discovery_fetched: bool,
}

/// Converges the account towards the cluster plan
///
/// The droplet listing is taken once when the provisioner is created; droplets
/// created afterwards are tracked locally rather than re-fetched.
pub struct Provisioner<'a, C: ?Sized, D: ?Sized, R: ?Sized> {
  plan: &'a ClusterPlan,
  api: &'a C,
  discovery: &'a D,
  runner: &'a R,
  ct_bin: String,
  existing: BTreeSet<String>,
  report: Report,
}

impl<'a, C, D, R> Provisioner<'a, C, D, R>
where
  C: CloudApi + ?Sized,
  D: DiscoveryApi + ?Sized,
  R: Runner + ?Sized,
{
  pub async fn new(plan: &'a ClusterPlan, api: &'a C, discovery: &'a D, runner: &'a R, ct_bin: &str) -> Result<Self> {
    let existing = api.list_instance_names().await?.into_iter().collect();

    Ok(Provisioner {
      plan,
      api,
      discovery,
      runner,
      ct_bin: ct_bin.to_owned(),
      existing,
      report: Report::default(),
    })
  }

  /// Find the volume by exact name within the region, creating it when absent
  pub async fn ensure_volume(&mut self, index: usize) -> Result<Volume> {
    let name = self.plan.volume_name(index);
    let volumes = self.api.list_volumes(&self.plan.region).await?;

    if let Some(volume) = volumes.into_iter().find(|v| v.name == name) {
      info!("Volume {name} already exists - not creating");
      return Ok(volume);
    }

    info!("Creating volume {name}");
    let volume = self
      .api
      .create_volume(&CreateVolume {
        size_gigabytes: self.plan.volume_size_gigabytes,
        name: name.to_owned(),
        region: self.plan.region.to_owned(),
      })
      .await?;
    self.report.volumes_created.push(name);

    Ok(volume)
  }

  /// Create the droplet unless one with the same name already exists in the account
  pub async fn ensure_instance(
    &mut self,
    role: Role,
    index: usize,
    boot_config: &BootConfig,
    volume: Option<&Volume>,
  ) -> Result<()> {
    let name = self.plan.instance_name(role, index);
    if self.existing.contains(&name) {
      info!("Instance {name} already exists - not creating");
      return Ok(());
    }

    info!("Creating instance {name}");
    let user_data = bootconfig::transpile(self.runner, &self.ct_bin, boot_config)?;
    let request = CreateInstance {
      region: self.plan.region.to_owned(),
      image: self.plan.image.to_owned(),
      size: self.plan.size.to_owned(),
      name: name.to_owned(),
      private_networking: true,
      ssh_keys: vec![self.plan.ssh_key_id.to_owned()],
      tags: vec![self.plan.cluster_name.to_owned()],
      user_data,
      volumes: volume.map(|v| vec![v.id.to_owned()]).unwrap_or_default(),
    };
    self.api.create_instance(&request).await?;

    self.existing.insert(name.to_owned());
    self.report.instances_created.push(name);

    Ok(())
  }

  fn existing_masters(&self) -> usize {
    (1..=self.plan.master_count)
      .filter(|i| self.existing.contains(&self.plan.instance_name(Role::Master, *i)))
      .count()
  }

  /// Bootstrap the etcd masters when fewer than desired exist
  ///
  /// A fresh discovery URL is only fetched in that case; members that already
  /// exist keep whatever cluster they joined.
  pub async fn ensure_masters(&mut self, volumes: &[Volume]) -> Result<()> {
    let existing = self.existing_masters();
    if existing >= self.plan.master_count {
      info!("Master cluster already exists - not creating");
      return Ok(());
    }
    if existing > 0 {
      warn!(
        "Found {existing} of {} masters; the new discovery URL will not be shared with existing members",
        self.plan.master_count
      );
    }

    let discovery_url = self.discovery.new_discovery_url(self.plan.master_count).await?;
    self.report.discovery_fetched = true;

    let boot_config = BootConfig::master(&discovery_url);
    for i in 1..=self.plan.master_count {
      self
        .ensure_instance(Role::Master, i, &boot_config, volumes.get(i - 1))
        .await?;
    }

    Ok(())
  }

  pub async fn ensure_workers(&mut self) -> Result<()> {
    let boot_config = BootConfig::default();
    for i in 1..=self.plan.worker_count {
      self.ensure_instance(Role::Worker, i, &boot_config, None).await?;
    }

    Ok(())
  }

  /// Volumes first, then masters (attached to the volumes), then workers
  pub async fn run(mut self) -> Result<Report> {
    let mut volumes = Vec::with_capacity(self.plan.volume_count);
    for i in 1..=self.plan.volume_count {
      volumes.push(self.ensure_volume(i).await?);
    }

    self.ensure_masters(&volumes).await?;
    self.ensure_workers().await?;

    Ok(self.report)
  }
}
