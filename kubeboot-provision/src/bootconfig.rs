use std::io::Write;

use anyhow::{Context, Result};
use kubeboot::{utils, Cmd, Runner};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_CT_BIN: &str = "ct";

/// Platform passed to the config transpiler; selects the metadata placeholders it resolves
const CT_PLATFORM: &str = "digitalocean";

/// Container Linux Config describing first-boot setup of a droplet
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootConfig {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub etcd: Option<EtcdConfig>,
}

/// etcd member settings
///
/// `{HOSTNAME}` and `{PRIVATE_IPV4}` are left for the transpiler to swap for the
/// droplet's own metadata at boot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtcdConfig {
  pub name: String,
  pub initial_advertise_peer_urls: String,
  pub listen_peer_urls: String,
  pub listen_client_urls: String,
  pub advertise_client_urls: String,
  pub discovery: String,
}

impl BootConfig {
  /// Boot configuration for an etcd master joining via the given discovery URL
  pub fn master(discovery_url: &str) -> Self {
    BootConfig {
      etcd: Some(EtcdConfig {
        name: "{HOSTNAME}".to_owned(),
        initial_advertise_peer_urls: "http://{PRIVATE_IPV4}:2380".to_owned(),
        listen_peer_urls: "http://{PRIVATE_IPV4}:2380".to_owned(),
        listen_client_urls: "http://0.0.0.0:2379".to_owned(),
        advertise_client_urls: "http://{PRIVATE_IPV4}:2379".to_owned(),
        discovery: discovery_url.to_owned(),
      }),
    }
  }

  /// Workers carry no boot configuration
  pub fn is_empty(&self) -> bool {
    self.etcd.is_none()
  }

  pub fn to_yaml(&self) -> Result<String> {
    serde_yaml::to_string(self).map_err(anyhow::Error::from)
  }
}

/// Escape quote characters so the payload can be embedded in the request
pub fn escape_quotes(raw: &str) -> String {
  raw.replace('"', "\\\"")
}

/// Transpile the boot configuration into droplet user data with `ct`
///
/// Returns `None` for an empty configuration so no user data is sent.
pub fn transpile<R: Runner + ?Sized>(runner: &R, ct_bin: &str, config: &BootConfig) -> Result<Option<String>> {
  if config.is_empty() {
    return Ok(None);
  }

  let yaml = config.to_yaml()?;
  debug!("Boot configuration:\n{yaml}");

  let mut file = tempfile::Builder::new()
    .prefix("kubeboot-")
    .suffix(".yaml")
    .tempfile()
    .context("Unable to create temporary file for boot configuration")?;
  file.write_all(yaml.as_bytes())?;
  file.flush()?;

  let cmd = Cmd::new(ct_bin)
    .arg("-in-file")
    .arg(file.path())
    .args(["-platform", CT_PLATFORM, "-strict"]);
  let raw = utils::cmd_exec(runner, &cmd)?;

  Ok(Some(escape_quotes(&raw)))
}
