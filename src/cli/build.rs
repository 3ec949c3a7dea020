// src/cli/build.rs
//! Build commands

use clap::{Args, Subcommand};
use cork_kube::Depth;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Project name
    #[arg(short, long)]
    pub project: String,

    /// Version to build
    #[arg(short, long)]
    pub version: String,

    /// Production build: use real registry names and push images
    #[arg(short = 'm', long)]
    pub production: bool,

    /// Do not push images (production builds only)
    #[arg(long)]
    pub no_push: bool,

    /// Use the remote repository instead of a registered local directory
    ///
    /// Repository names or URLs, comma separated or repeated.
    #[arg(short = 'r', long, value_name = "REPO")]
    pub use_remote: Vec<String>,

    /// Take these projects' images from their registry instead of building them
    #[arg(long, value_name = "PROJECTS")]
    pub use_registry: Vec<String>,

    /// Only print the docker build commands
    #[arg(short, long)]
    pub dry_run: bool,

    /// Tag selection: auto, force-tag or force-branch
    ///
    /// Either one policy for every project or a project=policy list.
    #[arg(short = 's', long, value_name = "SELECTION")]
    pub tag_selection: Option<String>,

    /// Override the image tag, globally or as a project=tag list
    #[arg(short, long, value_name = "TAG")]
    pub override_tag: Option<String>,

    /// Image names to build
    #[arg(short, long, value_name = "IMAGES")]
    pub filter: Vec<String>,

    /// Levels of dependencies to build (1 = only the project), or ALL
    #[arg(long, default_value = "1")]
    pub depth: Depth,

    /// Do not use the build cache
    #[arg(long)]
    pub no_cache: bool,

    /// Do not pass --cache-from (faster local development)
    #[arg(long)]
    pub no_cache_from: bool,

    /// Target platform passed to docker buildx
    #[arg(long)]
    pub platform: Option<String>,

    /// Registry for development builds (default: localhost/local-dev)
    #[arg(long, value_name = "REGISTRY")]
    pub local_dev_registry: Option<String>,

    /// Registry location (directory or git URL)
    #[arg(long, value_name = "LOCATION")]
    pub cork_build_registry: Option<String>,

    /// Maximum number of concurrent image builds
    #[arg(short, long, default_value = "1")]
    pub jobs: usize,

    /// Keep building independent projects after a failure
    #[arg(long)]
    pub keep_going: bool,
}

#[derive(Args, Debug)]
pub struct GcbArgs {
    /// Project name
    #[arg(short, long)]
    pub project: String,

    /// Version to build
    #[arg(short, long)]
    pub version: String,

    /// Registry location (directory or git URL)
    #[arg(long, value_name = "LOCATION")]
    pub cork_build_registry: Option<String>,

    /// Google Cloud project to submit the build to
    #[arg(long)]
    pub gcb_project: Option<String>,

    /// Do not use the build cache
    #[arg(long)]
    pub no_cache: bool,

    /// Use the high cpu machine type
    #[arg(long)]
    pub high_cpu: bool,

    /// Levels of dependencies to build (1 = only the project), or ALL
    #[arg(long, default_value = "1")]
    pub depth: Depth,

    /// YAML file whose steps run before the registry's build steps
    #[arg(long, value_name = "FILE")]
    pub prepend_build_steps: Option<PathBuf>,

    /// Only print the gcloud command and build file
    #[arg(short, long)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum BuildCommands {
    /// Build a project's images (and optionally its dependencies)
    Exec(ExecArgs),

    /// Submit a project build to Google Cloud Build
    Gcb(GcbArgs),

    /// Register a local working copy to use instead of a clone
    RegisterLocalRepo {
        /// Repository directory
        dir: PathBuf,
    },

    /// Show registered local working copies
    ShowLocalRepos,

    /// List registry projects and their versions
    List {
        /// Only show this project
        #[arg(short, long)]
        project: Option<String>,

        /// Only list project names
        #[arg(short, long)]
        names: bool,

        /// Registry location (directory or git URL)
        #[arg(long, value_name = "LOCATION")]
        cork_build_registry: Option<String>,
    },

    /// Set the registry location (directory or git URL)
    SetRegistryLocation {
        /// Local registry directory or remote repository URL
        location: String,
    },

    /// Use the remote registry again instead of a local directory
    ResetRegistryLocation,

    /// Set the Google Cloud project used by `build gcb`
    SetGcbProject {
        /// Google Cloud project id
        project: String,
    },
}
