use std::{
  fs,
  net::IpAddr,
  path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use kubeboot::{utils, Cmd, Runner};
use tracing::info;

use crate::{
  artifact::{ArtifactState, Outcome},
  config::{self, APISERVER_CONFIG, WORKER_CONFIG, WORKER_IP_ENV},
};

pub const DEFAULT_OPENSSL_BIN: &str = "openssl";

const KEY_BITS: &str = "2048";
const CA_DAYS: &str = "10000";
const LEAF_DAYS: &str = "365";

const CA_KEY: &str = "ca-key.pem";
const CA_CERT: &str = "ca.pem";

/// A CA signed key pair
struct Leaf {
  /// File stem: `<name>-key.pem`, `<name>.csr`, `<name>.pem`
  name: String,
  subject: String,
  /// openssl config carrying the `v3_req` extensions, relative to the output directory
  config: Option<&'static str>,
  env: Option<(&'static str, String)>,
}

/// Key pairs handled by a run and whether each was generated or reused
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Report {
  pub artifacts: Vec<(String, Outcome)>,
}

impl Report {
  pub fn generated(&self) -> usize {
    self.artifacts.iter().filter(|(_, o)| *o == Outcome::Generated).count()
  }
}

/// Generates the cluster CA and leaf key pairs with the `openssl` binary
///
/// Every path handed to openssl is prefixed with the output directory, so the
/// working directory of the process is irrelevant.
pub struct CertGenerator<'a, R: ?Sized> {
  runner: &'a R,
  openssl: String,
  out_dir: PathBuf,
  force: bool,
  report: Report,
}

impl<'a, R: Runner + ?Sized> CertGenerator<'a, R> {
  pub fn new<P: AsRef<Path>>(runner: &'a R, openssl: &str, out_dir: P, force: bool) -> Self {
    CertGenerator {
      runner,
      openssl: openssl.to_owned(),
      out_dir: out_dir.as_ref().to_path_buf(),
      force,
      report: Report::default(),
    }
  }

  fn path(&self, file: &str) -> PathBuf {
    self.out_dir.join(file)
  }

  fn openssl(&self) -> Cmd {
    Cmd::new(&self.openssl)
  }

  fn exec(&self, cmd: Cmd) -> Result<()> {
    utils::cmd_exec(self.runner, &cmd)?;
    Ok(())
  }

  fn genrsa(&self, key: &Path) -> Result<()> {
    self.exec(self.openssl().arg("genrsa").arg("-out").arg(key).arg(KEY_BITS))
  }

  fn record(&mut self, name: &str, outcome: Outcome) -> Outcome {
    self.report.artifacts.push((name.to_owned(), outcome));
    outcome
  }

  /// Create the private key, request and CA signed certificate of a leaf
  fn issue(&self, leaf: &Leaf) -> Result<()> {
    let key = self.path(&format!("{}-key.pem", leaf.name));
    let csr = self.path(&format!("{}.csr", leaf.name));
    let pem = self.path(&format!("{}.pem", leaf.name));

    self.genrsa(&key)?;

    let mut req = self
      .openssl()
      .args(["req", "-new", "-key"])
      .arg(&key)
      .arg("-out")
      .arg(&csr)
      .args(["-subj", leaf.subject.as_str()]);
    let mut sign = self
      .openssl()
      .args(["x509", "-req", "-in"])
      .arg(&csr)
      .arg("-CA")
      .arg(self.path(CA_CERT))
      .arg("-CAkey")
      .arg(self.path(CA_KEY))
      .arg("-CAcreateserial")
      .arg("-out")
      .arg(&pem)
      .args(["-days", LEAF_DAYS]);

    if let Some(config) = leaf.config {
      let config = self.path(config);
      req = req.arg("-config").arg(&config);
      sign = sign.args(["-extensions", "v3_req", "-extfile"]).arg(&config);
    }
    if let Some((key, value)) = &leaf.env {
      req = req.env(key, value);
      sign = sign.env(key, value);
    }

    self.exec(req)?;
    self.exec(sign)
  }

  /// Self-signed root of trust for every other certificate
  pub fn ensure_ca(&mut self) -> Result<Outcome> {
    let key = self.path(CA_KEY);
    if !ArtifactState::resolve(&key, self.force).needs_generation() {
      info!("Reusing cluster root CA");
      return Ok(self.record("ca", Outcome::Reused));
    }

    info!("Generating cluster root CA");
    self.genrsa(&key)?;
    self.exec(
      self
        .openssl()
        .args(["req", "-x509", "-new", "-nodes", "-key"])
        .arg(&key)
        .args(["-days", CA_DAYS, "-out"])
        .arg(self.path(CA_CERT))
        .args(["-subj", "/CN=kube-ca"]),
    )?;

    Ok(self.record("ca", Outcome::Generated))
  }

  /// Serving certificate valid for the in-cluster names and the master IP
  pub fn ensure_apiserver(&mut self, master_ip: IpAddr) -> Result<Outcome> {
    if !ArtifactState::resolve(self.path("apiserver-key.pem"), self.force).needs_generation() {
      info!("Reusing API server key pair");
      return Ok(self.record("apiserver", Outcome::Reused));
    }

    info!("Generating API server key pair");
    utils::write_file(
      config::apiserver_config(master_ip)?.as_bytes(),
      self.path(APISERVER_CONFIG),
      None,
    )?;
    self.issue(&Leaf {
      name: "apiserver".to_owned(),
      subject: "/CN=kube-apiserver".to_owned(),
      config: Some(APISERVER_CONFIG),
      env: None,
    })?;

    Ok(self.record("apiserver", Outcome::Generated))
  }

  /// Certificate for worker `index` (1-based) valid for that worker's IP only
  pub fn ensure_worker(&mut self, index: usize, ip: IpAddr) -> Result<Outcome> {
    let name = format!("worker{index}");
    if !ArtifactState::resolve(self.path(&format!("{name}-key.pem")), self.force).needs_generation() {
      info!("Reusing worker {index} key pair");
      return Ok(self.record(&name, Outcome::Reused));
    }

    info!("Generating worker {index} key pair");
    utils::write_file(config::worker_config()?.as_bytes(), self.path(WORKER_CONFIG), None)?;
    self.issue(&Leaf {
      name: name.to_owned(),
      subject: format!("/CN={name}"),
      config: Some(WORKER_CONFIG),
      env: Some((WORKER_IP_ENV, ip.to_string())),
    })?;

    Ok(self.record(&name, Outcome::Generated))
  }

  /// Client certificate for cluster administration; carries no SANs
  pub fn ensure_admin(&mut self) -> Result<Outcome> {
    if !ArtifactState::resolve(self.path("admin-key.pem"), self.force).needs_generation() {
      info!("Reusing admin key pair");
      return Ok(self.record("admin", Outcome::Reused));
    }

    info!("Generating admin key pair");
    self.issue(&Leaf {
      name: "admin".to_owned(),
      subject: "/CN=kube-admin".to_owned(),
      config: None,
      env: None,
    })?;

    Ok(self.record("admin", Outcome::Generated))
  }

  /// CA first, then API server, workers and admin; stops at the first failure
  pub fn generate(mut self, master_ip: IpAddr, worker_ips: &[IpAddr]) -> Result<Report> {
    info!("Generating cluster certificates...");
    fs::create_dir_all(&self.out_dir)
      .with_context(|| format!("Unable to create output directory {}", self.out_dir.display()))?;

    self.ensure_ca()?;
    self.ensure_apiserver(master_ip)?;
    for (i, ip) in worker_ips.iter().enumerate() {
      self.ensure_worker(i + 1, *ip)?;
    }
    self.ensure_admin()?;

    Ok(self.report)
  }
}

#[cfg(test)]
mod tests {
  use std::{cell::RefCell, collections::BTreeSet, ffi::OsStr};

  use kubeboot::{CmdResult, Error};

  use super::*;

  /// Stands in for openssl: records each invocation and touches the `-out` file
  #[derive(Default)]
  struct FakeOpenssl {
    calls: RefCell<Vec<Cmd>>,
    fail_at: Option<usize>,
  }

  impl Runner for FakeOpenssl {
    fn run(&self, cmd: &Cmd) -> Result<CmdResult> {
      let mut calls = self.calls.borrow_mut();
      calls.push(cmd.clone());

      if self.fail_at == Some(calls.len() - 1) {
        return Ok(CmdResult {
          stdout: String::new(),
          stderr: "unable to write 'random state'".to_owned(),
          status: 1,
        });
      }

      if let Some(out) = cmd.flag_value("-out") {
        fs::write(out, "-----BEGIN FAKE-----\n").unwrap();
      }
      Ok(CmdResult {
        stdout: String::new(),
        stderr: String::new(),
        status: 0,
      })
    }
  }

  impl FakeOpenssl {
    fn count(&self) -> usize {
      self.calls.borrow().len()
    }

    /// Commands whose `-out` path ends with the given file name
    fn writing(&self, file: &str) -> Cmd {
      self
        .calls
        .borrow()
        .iter()
        .find(|c| c.flag_value("-out").map(|o| Path::new(o).ends_with(file)).unwrap_or(false))
        .cloned()
        .unwrap_or_else(|| panic!("no command wrote {file}"))
    }
  }

  fn ips(list: &[&str]) -> Vec<IpAddr> {
    list.iter().map(|ip| ip.parse().unwrap()).collect()
  }

  fn files(dir: &Path) -> BTreeSet<String> {
    fs::read_dir(dir)
      .unwrap()
      .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
      .collect()
  }

  fn run(dir: &Path, openssl: &FakeOpenssl, force: bool) -> Result<Report> {
    CertGenerator::new(openssl, "openssl", dir, force).generate(
      "172.16.0.10".parse().unwrap(),
      &ips(&["172.16.0.21", "172.16.0.22"]),
    )
  }

  #[test]
  fn it_generates_every_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let openssl = FakeOpenssl::default();

    let report = run(dir.path(), &openssl, false).unwrap();

    assert_eq!(report.generated(), 5);
    // CA: key + self-signed cert, each leaf: key + request + signature
    assert_eq!(openssl.count(), 2 + 3 * 4);
    assert_eq!(
      files(dir.path()),
      [
        "admin-key.pem",
        "admin.csr",
        "admin.pem",
        "apiserver-key.pem",
        "apiserver.csr",
        "apiserver.pem",
        "ca-key.pem",
        "ca.pem",
        "openssl.cnf",
        "worker-openssl.cnf",
        "worker1-key.pem",
        "worker1.csr",
        "worker1.pem",
        "worker2-key.pem",
        "worker2.csr",
        "worker2.pem",
      ]
      .into_iter()
      .map(String::from)
      .collect::<BTreeSet<_>>()
    );
  }

  #[test]
  fn it_reuses_everything_on_second_run() {
    let dir = tempfile::tempdir().unwrap();
    run(dir.path(), &FakeOpenssl::default(), false).unwrap();

    let openssl = FakeOpenssl::default();
    let report = run(dir.path(), &openssl, false).unwrap();

    assert_eq!(openssl.count(), 0);
    assert_eq!(report.generated(), 0);
    assert!(report.artifacts.iter().all(|(_, o)| *o == Outcome::Reused));
  }

  #[test]
  fn it_regenerates_everything_when_forced() {
    let dir = tempfile::tempdir().unwrap();
    run(dir.path(), &FakeOpenssl::default(), false).unwrap();

    let openssl = FakeOpenssl::default();
    let report = run(dir.path(), &openssl, true).unwrap();

    assert_eq!(report.generated(), 5);
    assert_eq!(openssl.count(), 2 + 3 * 4);
  }

  #[test]
  fn it_writes_the_apiserver_alt_names() {
    let dir = tempfile::tempdir().unwrap();
    run(dir.path(), &FakeOpenssl::default(), false).unwrap();

    let config = fs::read_to_string(dir.path().join("openssl.cnf")).unwrap();
    let alt_names: Vec<&str> = config.lines().skip_while(|l| *l != "[alt_names]").skip(1).collect();

    assert_eq!(
      alt_names,
      vec![
        "DNS.1 = kubernetes",
        "DNS.2 = kubernetes.default",
        "DNS.3 = kubernetes.default.svc",
        "DNS.4 = kubernetes.default.svc.cluster.local",
        "IP.1 = 10.3.0.1",
        "IP.2 = 172.16.0.10",
      ]
    );
  }

  #[test]
  fn it_isolates_worker_ips() {
    let dir = tempfile::tempdir().unwrap();
    let openssl = FakeOpenssl::default();
    run(dir.path(), &openssl, false).unwrap();

    for (csr, pem, ip) in [
      ("worker1.csr", "worker1.pem", "172.16.0.21"),
      ("worker2.csr", "worker2.pem", "172.16.0.22"),
    ] {
      let req = openssl.writing(csr);
      let sign = openssl.writing(pem);
      assert_eq!(req.envs.get(WORKER_IP_ENV).map(String::as_str), Some(ip));
      assert_eq!(sign.envs.get(WORKER_IP_ENV).map(String::as_str), Some(ip));
      assert_eq!(req.envs.len(), 1);
    }
    assert_ne!(openssl.writing("worker1.csr").envs, openssl.writing("worker2.csr").envs);
    assert!(openssl.writing("apiserver.csr").envs.is_empty());
    assert!(openssl.writing("admin.pem").envs.is_empty());
  }

  #[test]
  fn it_signs_admin_without_extensions() {
    let dir = tempfile::tempdir().unwrap();
    let openssl = FakeOpenssl::default();
    run(dir.path(), &openssl, false).unwrap();

    let req = openssl.writing("admin.csr");
    let sign = openssl.writing("admin.pem");

    assert!(req.flag_value("-config").is_none());
    assert!(sign.flag_value("-extfile").is_none());
    assert_eq!(req.flag_value("-subj"), Some(OsStr::new("/CN=kube-admin")));
  }

  #[test]
  fn it_prefixes_every_path_with_the_output_directory() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("nested").join("certs");
    let openssl = FakeOpenssl::default();

    CertGenerator::new(&openssl, "openssl", &out, false)
      .generate("10.0.0.1".parse().unwrap(), &ips(&["10.0.0.2"]))
      .unwrap();

    for cmd in openssl.calls.borrow().iter() {
      for flag in ["-out", "-key", "-in", "-CA", "-CAkey", "-config", "-extfile"] {
        if let Some(path) = cmd.flag_value(flag) {
          assert!(Path::new(path).starts_with(&out), "{flag} {path:?} outside {out:?}");
        }
      }
    }
  }

  #[test]
  fn it_stops_when_the_ca_fails() {
    let dir = tempfile::tempdir().unwrap();
    let openssl = FakeOpenssl {
      fail_at: Some(0),
      ..FakeOpenssl::default()
    };

    let err = run(dir.path(), &openssl, false).unwrap_err();

    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Command { code: 1, .. })));
    assert_eq!(openssl.count(), 1);
    assert!(!dir.path().join("apiserver-key.pem").exists());
    assert!(!dir.path().join("openssl.cnf").exists());
  }

  #[test]
  fn it_treats_a_leftover_key_as_present() {
    let dir = tempfile::tempdir().unwrap();
    let openssl = FakeOpenssl {
      fail_at: Some(3),
      ..FakeOpenssl::default()
    };
    // CA key, CA cert, apiserver key, then the apiserver request fails
    assert!(run(dir.path(), &openssl, false).is_err());

    let openssl = FakeOpenssl::default();
    let report = run(dir.path(), &openssl, false).unwrap();

    assert_eq!(report.artifacts[1], ("apiserver".to_owned(), Outcome::Reused));
  }
}
