use thiserror::Error;

/// Failures raised while talking to the outside world
///
/// Both tools abort on the first of these; re-running is the only recovery since
/// every creation step checks for existing state first.
#[derive(Debug, Error)]
pub enum Error {
  /// An external command ran but exited non-zero
  #[error("command `{program}` exited with status {code}: {stderr}")]
  Command { program: String, code: i32, stderr: String },

  /// An external command could not be started at all
  #[error("unable to execute `{program}`: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  /// An HTTP API responded with a non-success status
  #[error("{method} {url} failed with status {status}: {body}")]
  Api {
    method: String,
    url: String,
    status: u16,
    body: String,
  },
}

impl Error {
  /// Squash multi-line tool output so diagnostics stay on a single line
  pub(crate) fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
  }

  pub fn api(method: &str, url: &str, status: u16, body: &str) -> Self {
    Error::Api {
      method: method.to_owned(),
      url: url.to_owned(),
      status,
      body: Self::one_line(body),
    }
  }
}
