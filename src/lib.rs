// src/lib.rs

//! cork-kube build engine
//!
//! Builds container images for a family of related git repositories.
//!
//! # Architecture
//!
//! - Registry: one JSON descriptor per repository, read from a directory or a git clone
//! - Graph: recursive expansion of a (project, version) request into its dependencies
//! - Order: depth-bounded post-order flattening of the graph
//! - Build: checkouts, `.cork-build` manifests, tag/registry policy and
//!   `docker buildx build` commands, run by a bounded scheduler
//! - Session: per-invocation state (config, runner, registry cache, synchronized checkouts)
//!
//! Every subprocess goes through [`process::CommandRunner`].

pub mod build;
pub mod config;
mod error;
pub mod git;
pub mod graph;
pub mod manifest;
pub mod process;
pub mod registry;
pub mod session;
pub mod template;

pub use build::{BuildExecutor, BuildOptions, BuildReport, TagSelection};
pub use config::{BuildSettings, CorkConfig, LocalRepo};
pub use error::{Error, Result};
pub use git::GitInfo;
pub use graph::{BuildGraph, Depth, OrderedBuildItem};
pub use manifest::BuildManifest;
pub use process::{CommandRunner, Invocation, OutputMode, SystemRunner};
pub use registry::{Registry, RegistrySource, RepositoryDescriptor};
pub use session::BuildSession;
