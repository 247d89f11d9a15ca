use std::{
  collections::BTreeMap,
  ffi::{OsStr, OsString},
  fmt,
  fs::OpenOptions,
  io::Write,
  os::unix::fs::OpenOptionsExt,
  path::Path,
};

use anyhow::Result;
use tracing::debug;

use crate::Error;

/// An external command to execute
///
/// Environment variables listed here are added to the child process only; the
/// environment of the current process is never modified.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cmd {
  pub program: String,
  pub args: Vec<OsString>,
  pub envs: BTreeMap<String, String>,
}

impl Cmd {
  pub fn new(program: &str) -> Self {
    Cmd {
      program: program.to_owned(),
      ..Cmd::default()
    }
  }

  pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
    self.args.push(arg.as_ref().to_owned());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
  {
    self.args.extend(args.into_iter().map(|a| a.as_ref().to_owned()));
    self
  }

  pub fn env(mut self, key: &str, value: &str) -> Self {
    self.envs.insert(key.to_owned(), value.to_owned());
    self
  }

  /// Value following the given flag, e.g. the path passed to `-out`
  pub fn flag_value(&self, flag: &str) -> Option<&OsStr> {
    self
      .args
      .iter()
      .position(|a| a == flag)
      .and_then(|idx| self.args.get(idx + 1))
      .map(OsString::as_os_str)
  }
}

impl fmt::Display for Cmd {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    for (key, value) in &self.envs {
      write!(f, "{key}={value} ")?;
    }
    write!(f, "{}", self.program)?;
    for arg in &self.args {
      write!(f, " {}", arg.to_string_lossy())?;
    }
    Ok(())
  }
}

pub struct CmdResult {
  pub stdout: String,
  pub stderr: String,
  pub status: i32,
}

/// Executes external commands on behalf of the tools
pub trait Runner {
  fn run(&self, cmd: &Cmd) -> Result<CmdResult>;
}

/// Runs commands as child processes of the current process
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl Runner for SystemRunner {
  fn run(&self, cmd: &Cmd) -> Result<CmdResult> {
    let output = std::process::Command::new(&cmd.program)
      .args(&cmd.args)
      .envs(&cmd.envs)
      .output();

    match output {
      Ok(output) => Ok(CmdResult {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        status: output.status.code().unwrap_or(1),
      }),
      Err(source) => Err(
        Error::Spawn {
          program: cmd.program.to_owned(),
          source,
        }
        .into(),
      ),
    }
  }
}

/// Execute a command and return its stdout, failing on a non-zero exit status
pub fn cmd_exec<R: Runner + ?Sized>(runner: &R, cmd: &Cmd) -> Result<String> {
  debug!("run: {cmd}");
  let out = runner.run(cmd)?;

  match out.status {
    0 => Ok(out.stdout),
    code => Err(
      Error::Command {
        program: cmd.program.to_owned(),
        code,
        stderr: Error::one_line(&out.stderr),
      }
      .into(),
    ),
  }
}

/// Write a file to disk, setting the file mode when the file is created
pub fn write_file<P: AsRef<Path>>(contents: &[u8], path: P, mode: Option<u32>) -> Result<()> {
  let mut file = OpenOptions::new()
    .write(true)
    .create(true)
    .truncate(true)
    .mode(mode.unwrap_or(0o644))
    .open(&path)?;
  file.write_all(contents)?;

  Ok(())
}
