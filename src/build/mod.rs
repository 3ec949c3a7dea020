// src/build/mod.rs

//! Image build orchestration
//!
//! A build request is resolved to a build graph, flattened to a build order,
//! prepared (checkouts, git metadata, manifests), turned into one
//! `docker buildx build` command per image and finally executed by the
//! scheduler. Everything in this module works on a [`BuildSession`].
//!
//! [`BuildSession`]: crate::session::BuildSession

mod command;
mod executor;
pub mod gcb;
mod provenance;
mod scheduler;

pub use command::{
    BuildCommand, ImageBuildSpec, TagChoice, render_manifest, select_registry, select_tag,
    synthesize_image, template_vars,
};
pub use executor::{BuildExecutor, PreparedProject, PreparedRepo, format_duration};
pub use provenance::BuildArtifacts;
pub use scheduler::{
    BuildReport, BuiltImage, FailedImage, ImageJob, ProjectJob, SchedulerOptions, SkippedImage,
    run_jobs,
};

use crate::error::{Error, Result};
use crate::graph::Depth;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::warn;

/// Environment variables overriding the cache flag (`"true"` enables)
pub const USE_CACHE_ENV: [&str; 2] = ["CORK_BUILD_USE_CACHE", "_CORK_BUILD_USE_CACHE"];

/// Key matching every project in a per-project option list
pub const ALL_PROJECTS: &str = "*";

static LIST_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,\s]+").expect("valid regex"));

/// Split comma or whitespace separated CLI values into one flat list
pub fn split_list<S: AsRef<str>>(values: &[S]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| LIST_SEPARATOR.split(v.as_ref()))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// How the image tag is chosen from git metadata
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TagSelection {
    /// Tag if HEAD is tagged, branch otherwise
    #[default]
    Auto,
    ForceTag,
    ForceBranch,
}

impl TagSelection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::ForceTag => "force-tag",
            Self::ForceBranch => "force-branch",
        }
    }
}

impl fmt::Display for TagSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagSelection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "auto" => Ok(Self::Auto),
            "force-tag" => Ok(Self::ForceTag),
            "force-branch" => Ok(Self::ForceBranch),
            other => Err(Error::ConfigError(format!(
                "Invalid tag selection '{}': expected auto, force-tag or force-branch",
                other
            ))),
        }
    }
}

/// A value given either for every project or as a `project=value` list
///
/// A bare value (no `,` and no `=`) applies to all projects. Otherwise the
/// input is split on commas and spaces into `project=value` pairs, where the
/// project `*` acts as the fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectMap<T> {
    entries: HashMap<String, T>,
}

impl<T> Default for ProjectMap<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> ProjectMap<T> {
    /// Value for `project`, falling back to the `*` entry
    pub fn get(&self, project: &str) -> Option<&T> {
        self.entries
            .get(project)
            .or_else(|| self.entries.get(ALL_PROJECTS))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> FromStr for ProjectMap<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parse = |raw: &str| {
            raw.parse::<T>()
                .map_err(|e| Error::ConfigError(format!("Invalid value '{}': {}", raw, e)))
        };

        let mut entries = HashMap::new();
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self { entries });
        }

        if !s.contains(',') && !s.contains('=') {
            entries.insert(ALL_PROJECTS.to_string(), parse(s)?);
            return Ok(Self { entries });
        }

        for part in split_list(&[s]) {
            let Some((project, value)) = part.split_once('=') else {
                return Err(Error::ConfigError(format!(
                    "Invalid entry '{}': expected project=value",
                    part
                )));
            };
            entries.insert(project.trim().to_string(), parse(value.trim())?);
        }
        Ok(Self { entries })
    }
}

/// Options for `build exec`
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub project: String,
    pub version: String,
    /// Use real registries and push
    pub production: bool,
    /// Push production images (ignored for development builds)
    pub push: bool,
    /// Projects (names or URLs) cloned even when a local copy is registered
    pub use_remote: Vec<String>,
    /// Projects whose images are taken from their registry instead of built
    pub use_registry: Vec<String>,
    pub dry_run: bool,
    pub tag_selection: ProjectMap<TagSelection>,
    pub override_tag: ProjectMap<String>,
    /// Image names to build; empty builds all
    pub filter: Vec<String>,
    pub depth: Depth,
    pub cache: bool,
    pub cache_from: bool,
    pub platform: Option<String>,
    /// Registry for development builds
    pub local_dev_registry: Option<String>,
    /// Maximum concurrent image builds
    pub jobs: usize,
    /// Continue with independent projects after a failure
    pub keep_going: bool,
}

impl BuildOptions {
    pub fn new(project: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            version: version.into(),
            production: false,
            push: true,
            use_remote: Vec::new(),
            use_registry: Vec::new(),
            dry_run: false,
            tag_selection: ProjectMap::default(),
            override_tag: ProjectMap::default(),
            filter: Vec::new(),
            depth: Depth::default(),
            cache: true,
            cache_from: true,
            platform: None,
            local_dev_registry: None,
            jobs: 1,
            keep_going: false,
        }
    }

    /// Apply the rules that tie options together
    ///
    /// Production builds only build the requested project. The cache
    /// environment variables take precedence over `--no-cache`.
    pub fn normalize(&mut self, env: &BTreeMap<String, String>) {
        if self.production {
            self.depth = Depth::Levels(1);
            if !self.push {
                warn!("using --no-push flag. Images will not push to the registry");
            }
        }

        if let Some(value) = USE_CACHE_ENV
            .iter()
            .find_map(|key| env.get(*key).filter(|v| !v.is_empty()))
        {
            self.cache = value == "true";
        }

        if self.jobs == 0 {
            self.jobs = 1;
        }
    }

    pub fn uses_registry(&self, project: &str) -> bool {
        self.use_registry.iter().any(|p| p == project)
    }

    pub fn tag_selection_for(&self, project: &str) -> TagSelection {
        self.tag_selection.get(project).copied().unwrap_or_default()
    }

    /// True when images are pushed rather than loaded into the local daemon
    pub fn pushes(&self) -> bool {
        self.production && self.push
    }
}
