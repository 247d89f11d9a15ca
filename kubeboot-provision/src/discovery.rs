use anyhow::{Context, Result};
use async_trait::async_trait;
use kubeboot::Error;
use reqwest::Client;
use tracing::debug;

pub const DEFAULT_DISCOVERY_URL: &str = "https://discovery.etcd.io";

/// Issues etcd discovery URLs that bootstrapping members rendezvous on
#[async_trait]
pub trait DiscoveryApi {
  async fn new_discovery_url(&self, size: usize) -> Result<String>;
}

/// The public etcd discovery service
pub struct EtcdDiscovery {
  client: Client,
  base_url: String,
}

impl EtcdDiscovery {
  pub fn new(base_url: &str) -> Result<Self> {
    let client = Client::builder()
      .user_agent(concat!("kubeboot-provision/", env!("CARGO_PKG_VERSION")))
      .build()?;

    Ok(EtcdDiscovery {
      client,
      base_url: base_url.trim_end_matches('/').to_owned(),
    })
  }
}

#[async_trait]
impl DiscoveryApi for EtcdDiscovery {
  async fn new_discovery_url(&self, size: usize) -> Result<String> {
    let url = format!("{}/new", self.base_url);
    let rsp = self
      .client
      .get(&url)
      .query(&[("size", size)])
      .send()
      .await
      .with_context(|| format!("GET {url}"))?;

    let status = rsp.status();
    let body = rsp.text().await?;
    if !status.is_success() {
      return Err(Error::api("GET", &url, status.as_u16(), &body).into());
    }

    let discovery_url = body.trim().to_owned();
    debug!("etcd discovery URL: {discovery_url}");

    Ok(discovery_url)
  }
}
