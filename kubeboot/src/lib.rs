//! Shared building blocks for the `kubeboot-provision` and `kubeboot-certs` tools
pub mod cli;
pub mod error;
pub mod utils;

pub use error::Error;
pub use utils::{Cmd, CmdResult, Runner, SystemRunner};
