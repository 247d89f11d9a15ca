use std::fmt;

pub const DEFAULT_REGION: &str = "fra1";
pub const DEFAULT_IMAGE: &str = "coreos-beta";
pub const DEFAULT_SIZE: &str = "512mb";

/// Role a droplet plays in the cluster
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
  Master,
  Worker,
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Role::Master => write!(f, "master"),
      Role::Worker => write!(f, "worker"),
    }
  }
}

/// Desired shape of the cluster
///
/// Every resource name is derived from the cluster name, which is what makes
/// repeated runs converge on the same set of resources.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterPlan {
  pub cluster_name: String,
  pub ssh_key_id: String,
  pub region: String,
  pub image: String,
  pub size: String,
  pub volume_count: usize,
  pub volume_size_gigabytes: u32,
  pub master_count: usize,
  pub worker_count: usize,
}

impl ClusterPlan {
  pub fn new(cluster_name: &str, ssh_key_id: &str) -> Self {
    ClusterPlan {
      cluster_name: cluster_name.to_owned(),
      ssh_key_id: ssh_key_id.to_owned(),
      region: DEFAULT_REGION.to_owned(),
      image: DEFAULT_IMAGE.to_owned(),
      size: DEFAULT_SIZE.to_owned(),
      volume_count: 2,
      volume_size_gigabytes: 10,
      master_count: 1,
      worker_count: 2,
    }
  }

  /// Droplet name, e.g. `prod-master1`; `index` is 1-based
  pub fn instance_name(&self, role: Role, index: usize) -> String {
    format!("{}-{role}{index}", self.cluster_name)
  }

  /// Volume name, e.g. `prod1`; `index` is 1-based
  pub fn volume_name(&self, index: usize) -> String {
    format!("{}{index}", self.cluster_name)
  }
}
