use std::{fmt, path::Path};

/// Whether a key pair has to be (re)generated
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArtifactState {
  Absent,
  Present,
  ForceRegenerate,
}

impl ArtifactState {
  /// Presence is judged by the private key alone; a key left behind by an
  /// interrupted run counts as present
  pub fn resolve<P: AsRef<Path>>(key_path: P, force: bool) -> Self {
    match (force, key_path.as_ref().exists()) {
      (true, _) => ArtifactState::ForceRegenerate,
      (false, true) => ArtifactState::Present,
      (false, false) => ArtifactState::Absent,
    }
  }

  pub fn needs_generation(&self) -> bool {
    !matches!(self, ArtifactState::Present)
  }
}

/// Result of ensuring a single key pair
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
  Generated,
  Reused,
}

impl fmt::Display for Outcome {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Outcome::Generated => write!(f, "generated"),
      Outcome::Reused => write!(f, "reused"),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use rstest::*;

  use super::*;

  #[rstest]
  #[case(false, false, ArtifactState::Absent)]
  #[case(true, false, ArtifactState::Present)]
  #[case(false, true, ArtifactState::ForceRegenerate)]
  #[case(true, true, ArtifactState::ForceRegenerate)]
  fn it_resolves_state(#[case] exists: bool, #[case] force: bool, #[case] expected: ArtifactState) {
    let dir = tempfile::tempdir().unwrap();
    let key = dir.path().join("ca-key.pem");
    if exists {
      fs::write(&key, "partial").unwrap();
    }

    let state = ArtifactState::resolve(&key, force);

    assert_eq!(state, expected);
    assert_eq!(state.needs_generation(), expected != ArtifactState::Present);
  }
}
