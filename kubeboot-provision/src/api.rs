use anyhow::{Context, Result};
use async_trait::async_trait;
use kubeboot::Error;
use reqwest::{Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://api.digitalocean.com/v2";

/// A block storage volume
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub size_gigabytes: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Droplet {
  pub id: u64,
  pub name: String,
}

/// Request body for `POST /volumes`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CreateVolume {
  pub size_gigabytes: u32,
  pub name: String,
  pub region: String,
}

/// Request body for `POST /droplets`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CreateInstance {
  pub region: String,
  pub image: String,
  pub size: String,
  pub name: String,
  pub private_networking: bool,
  pub ssh_keys: Vec<String>,
  pub tags: Vec<String>,
  /// Provider specific first boot configuration
  pub user_data: Option<String>,
  /// IDs of volumes to attach at creation time
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub volumes: Vec<String>,
}

/// Resource listing and creation against the cloud provider
#[async_trait]
pub trait CloudApi {
  /// Names of every droplet in the account, regardless of cluster
  async fn list_instance_names(&self) -> Result<Vec<String>>;

  async fn list_volumes(&self, region: &str) -> Result<Vec<Volume>>;

  async fn create_volume(&self, volume: &CreateVolume) -> Result<Volume>;

  async fn create_instance(&self, instance: &CreateInstance) -> Result<Droplet>;
}

#[derive(Debug, Default, Deserialize)]
struct Links {
  #[serde(default)]
  pages: Pages,
}

#[derive(Debug, Default, Deserialize)]
struct Pages {
  next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DropletList {
  droplets: Vec<Droplet>,
  #[serde(default)]
  links: Links,
}

#[derive(Debug, Deserialize)]
struct VolumeList {
  volumes: Vec<Volume>,
  #[serde(default)]
  links: Links,
}

#[derive(Debug, Deserialize)]
struct VolumeResponse {
  volume: Volume,
}

#[derive(Debug, Deserialize)]
struct DropletResponse {
  droplet: Droplet,
}

/// Client for the DigitalOcean v2 API using bearer token authentication
pub struct DigitalOcean {
  client: Client,
  base_url: String,
  token: String,
}

impl DigitalOcean {
  pub fn new(base_url: &str, token: &str) -> Result<Self> {
    let client = Client::builder()
      .user_agent(concat!("kubeboot-provision/", env!("CARGO_PKG_VERSION")))
      .build()?;

    Ok(DigitalOcean {
      client,
      base_url: base_url.trim_end_matches('/').to_owned(),
      token: token.to_owned(),
    })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/{path}", self.base_url)
  }

  fn request(&self, method: Method, url: &str) -> RequestBuilder {
    self.client.request(method, url).bearer_auth(&self.token)
  }

  /// Send the request, converting any non-success status into `Error::Api`
  async fn send<T: DeserializeOwned>(&self, method: Method, url: &str, req: RequestBuilder) -> Result<T> {
    let rsp = req.send().await.with_context(|| format!("{method} {url}"))?;
    let status = rsp.status();

    if !status.is_success() {
      let body = rsp.text().await.unwrap_or_default();
      return Err(Error::api(method.as_str(), url, status.as_u16(), &body).into());
    }

    rsp
      .json::<T>()
      .await
      .with_context(|| format!("Unable to decode response from {method} {url}"))
  }

  /// Follow `links.pages.next` until the listing is exhausted
  async fn list_all<P, T>(
    &self,
    path: &str,
    query: &[(&str, &str)],
    split: impl Fn(P) -> (Vec<T>, Links) + Send,
  ) -> Result<Vec<T>>
  where
    P: DeserializeOwned + Send,
    T: Send,
  {
    let mut items = Vec::new();
    let url = self.url(path);
    let mut page: P = self.send(Method::GET, &url, self.request(Method::GET, &url).query(query)).await?;

    loop {
      let (batch, links) = split(page);
      items.extend(batch);

      match links.pages.next {
        Some(next) => {
          debug!("Fetching next page {next}");
          page = self.send(Method::GET, &next, self.request(Method::GET, &next)).await?;
        }
        None => return Ok(items),
      }
    }
  }
}

#[async_trait]
impl CloudApi for DigitalOcean {
  async fn list_instance_names(&self) -> Result<Vec<String>> {
    let droplets = self
      .list_all("droplets", &[], |page: DropletList| (page.droplets, page.links))
      .await?;

    Ok(droplets.into_iter().map(|d| d.name).collect())
  }

  async fn list_volumes(&self, region: &str) -> Result<Vec<Volume>> {
    self
      .list_all("volumes", &[("region", region)], |page: VolumeList| (page.volumes, page.links))
      .await
  }

  async fn create_volume(&self, volume: &CreateVolume) -> Result<Volume> {
    let url = self.url("volumes");
    debug!("Create volume request: {volume:?}");

    let rsp: VolumeResponse = self
      .send(Method::POST, &url, self.request(Method::POST, &url).json(volume))
      .await?;
    Ok(rsp.volume)
  }

  async fn create_instance(&self, instance: &CreateInstance) -> Result<Droplet> {
    let url = self.url("droplets");
    debug!("Create droplet request: {instance:?}");

    let rsp: DropletResponse = self
      .send(Method::POST, &url, self.request(Method::POST, &url).json(instance))
      .await?;
    Ok(rsp.droplet)
  }
}
