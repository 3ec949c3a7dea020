// src/cli/mod.rs
//! CLI definitions for cork-kube
//!
//! This module contains the command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! Only the `build` family is provided:
//! - `build exec` - Build the images of a project and its dependencies
//! - `build gcb` - Submit a build to Google Cloud Build
//! - `build list` - List registry projects and versions
//! - local repository and registry location management

use clap::{Parser, Subcommand};

mod build;

pub use build::{BuildCommands, ExecArgs, GcbArgs};

#[derive(Parser)]
#[command(name = "cork-kube")]
#[command(author = "UC Davis Library")]
#[command(version)]
#[command(about = "Build container images for related git repositories", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build container images from the cork-build registry
    #[command(subcommand)]
    Build(BuildCommands),
}
