// src/commands/mod.rs
//! Command handlers for the cork-kube CLI

mod build;
mod registry;

pub use build::{cmd_build_exec, cmd_build_gcb};
pub use registry::{
    cmd_list, cmd_register_local_repo, cmd_reset_registry_location, cmd_set_gcb_project,
    cmd_set_registry_location, cmd_show_local_repos,
};

use anyhow::{Context, Result};
use cork_kube::{BuildSession, CorkConfig};

/// Load the user's configuration
pub(crate) fn load_config() -> Result<CorkConfig> {
    CorkConfig::load().context("Failed to load .cork-kube-config")
}

/// Session for commands that read the registry
pub(crate) fn open_session(registry_override: Option<String>) -> Result<BuildSession> {
    Ok(BuildSession::new(load_config()?).with_registry_override(registry_override))
}
