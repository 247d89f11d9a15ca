use std::net::IpAddr;

use anyhow::{anyhow, Result};
use handlebars::Handlebars;
use rust_embed::RustEmbed;
use serde_json::json;

pub const APISERVER_CONFIG: &str = "openssl.cnf";
pub const WORKER_CONFIG: &str = "worker-openssl.cnf";

/// Environment variable `worker-openssl.cnf` reads the worker's IP address from
pub const WORKER_IP_ENV: &str = "WORKER_IP";

/// In-cluster DNS names the API server is reachable under
pub const APISERVER_DNS_NAMES: [&str; 4] = [
  "kubernetes",
  "kubernetes.default",
  "kubernetes.default.svc",
  "kubernetes.default.svc.cluster.local",
];

/// First address of the service CIDR, assigned to the `kubernetes` service
pub const APISERVER_SERVICE_IP: &str = "10.3.0.1";

/// Embeds the contents of the `templates/` directory into the binary
#[derive(RustEmbed)]
#[folder = "templates/"]
pub struct Templates;

fn template(name: &str) -> Result<String> {
  let tmpl = Templates::get(name).ok_or_else(|| anyhow!("Template {name} is not embedded"))?;
  Ok(std::str::from_utf8(tmpl.data.as_ref())?.to_owned())
}

/// `subjectAltName` entries for the API server certificate
pub fn apiserver_alt_names(master_ip: IpAddr) -> Vec<String> {
  let dns = APISERVER_DNS_NAMES
    .iter()
    .enumerate()
    .map(|(i, name)| format!("DNS.{} = {name}", i + 1));
  let ips = [APISERVER_SERVICE_IP.to_owned(), master_ip.to_string()]
    .into_iter()
    .enumerate()
    .map(|(i, ip)| format!("IP.{} = {ip}", i + 1));

  dns.chain(ips).collect()
}

/// Render `openssl.cnf` used to request and sign the API server certificate
pub fn apiserver_config(master_ip: IpAddr) -> Result<String> {
  let mut handlebars = Handlebars::new();
  handlebars.register_escape_fn(handlebars::no_escape);
  handlebars.set_strict_mode(true);
  handlebars.register_template_string("tpl", template("openssl.cnf.hbs")?)?;

  let data = json!({ "alt_names": apiserver_alt_names(master_ip) });
  Ok(handlebars.render("tpl", &data)?)
}

/// `worker-openssl.cnf`; the IP is resolved by openssl from `$WORKER_IP`
pub fn worker_config() -> Result<String> {
  template(WORKER_CONFIG)
}

#[cfg(test)]
mod tests {
  use std::net::Ipv4Addr;

  use super::*;

  #[test]
  fn it_renders_the_apiserver_config() {
    let config = apiserver_config(IpAddr::V4(Ipv4Addr::new(172, 16, 0, 10))).unwrap();

    insta::assert_snapshot!(config, @r###"
    [req]
    req_extensions = v3_req
    distinguished_name = req_distinguished_name
    [req_distinguished_name]
    [ v3_req ]
    basicConstraints = CA:FALSE
    keyUsage = nonRepudiation, digitalSignature, keyEncipherment
    subjectAltName = @alt_names
    [alt_names]
    DNS.1 = kubernetes
    DNS.2 = kubernetes.default
    DNS.3 = kubernetes.default.svc
    DNS.4 = kubernetes.default.svc.cluster.local
    IP.1 = 10.3.0.1
    IP.2 = 172.16.0.10
    "###);
  }

  #[test]
  fn it_lists_exactly_the_apiserver_alt_names() {
    let names = apiserver_alt_names("10.0.0.2".parse().unwrap());

    assert_eq!(
      names,
      vec![
        "DNS.1 = kubernetes",
        "DNS.2 = kubernetes.default",
        "DNS.3 = kubernetes.default.svc",
        "DNS.4 = kubernetes.default.svc.cluster.local",
        "IP.1 = 10.3.0.1",
        "IP.2 = 10.0.0.2",
      ]
    );
  }

  #[test]
  fn it_reads_the_worker_ip_from_the_environment() {
    let config = worker_config().unwrap();

    assert!(config.ends_with("[alt_names]\nIP.1 = $ENV::WORKER_IP\n"));
    assert!(!config.contains("DNS."));
  }
}
