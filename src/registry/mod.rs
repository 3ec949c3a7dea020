// src/registry/mod.rs

//! Repository registry
//!
//! The registry is a directory (usually a clone of a shared git repository)
//! with one JSON descriptor per buildable repository under `repositories/`.
//! It also carries the Cloud Build files used by `build gcb` under `gcloud/`.

mod descriptor;

pub use descriptor::{
    BuildType, RepositoryDescriptor, SecretRequirement, SECRET_PREFIX, WILDCARD_VERSION,
};

use crate::config::BuildSettings;
use crate::error::{Error, Result};
use crate::git::pull_repository;
use crate::process::CommandRunner;
use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};

/// Registry cloned when nothing else is configured
pub const DEFAULT_REGISTRY_URL: &str = "https://github.com/ucd-library/cork-build-registry";

/// Checkout directory name under the build root
pub const REGISTRY_CHECKOUT_NAME: &str = "cork-build-registry";

/// Branch of the registry repository that is used
pub const REGISTRY_BRANCH: &str = "main";

static REMOTE_LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(https?://|git@)").expect("valid regex"));

/// True when a registry location names a git remote rather than a directory
pub fn is_remote_location(location: &str) -> bool {
    REMOTE_LOCATION.is_match(location)
}

/// Where the registry comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrySource {
    /// A directory used as-is
    LocalDir(PathBuf),
    /// A git repository synchronized into `checkout`
    Remote { url: String, checkout: PathBuf },
}

impl RegistrySource {
    /// Pick the registry location
    ///
    /// Precedence: CLI override, `CORK_BUILD_REGISTRY`, configured
    /// `dependenciesDir`, configured `registryUrl`, the default remote.
    pub fn resolve(
        cli_override: Option<&str>,
        env_override: Option<&str>,
        build: &BuildSettings,
        build_root: &Path,
    ) -> RegistrySource {
        let checkout = build_root.join(REGISTRY_CHECKOUT_NAME);

        let explicit = cli_override
            .or(env_override)
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(location) = explicit {
            return if is_remote_location(location) {
                RegistrySource::Remote {
                    url: location.to_string(),
                    checkout,
                }
            } else {
                RegistrySource::LocalDir(PathBuf::from(location))
            };
        }

        if let Some(dir) = &build.dependencies_dir {
            return RegistrySource::LocalDir(dir.clone());
        }

        RegistrySource::Remote {
            url: build
                .registry_url
                .clone()
                .unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string()),
            checkout,
        }
    }

    /// Remote URL, if the registry is cloned
    pub fn url(&self) -> Option<&str> {
        match self {
            RegistrySource::LocalDir(_) => None,
            RegistrySource::Remote { url, .. } => Some(url),
        }
    }
}

/// One project as shown by `build list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectListing {
    pub url: String,
    pub versions: Vec<String>,
}

/// Loaded registry, keyed by repository short name
#[derive(Debug, Clone, Default)]
pub struct Registry {
    /// Registry root (contains `repositories/` and `gcloud/`)
    pub root: PathBuf,
    /// Remote the registry was cloned from, if any
    pub source_url: Option<String>,
    repositories: IndexMap<String, RepositoryDescriptor>,
}

impl Registry {
    /// Resolve, synchronize and read a registry
    pub fn load(source: &RegistrySource, runner: &dyn CommandRunner) -> Result<Registry> {
        match source {
            RegistrySource::LocalDir(dir) => {
                if !dir.is_dir() {
                    return Err(Error::ConfigError(format!(
                        "Defined dependencies directory not found: {}",
                        dir.display()
                    )));
                }
                Self::load_dir(dir)
            }
            RegistrySource::Remote { url, checkout } => {
                info!("Syncing build registry {} into {}", url, checkout.display());
                pull_repository(runner, checkout, url, REGISTRY_BRANCH)?;
                let mut registry = Self::load_dir(checkout)?;
                registry.source_url = Some(url.clone());
                Ok(registry)
            }
        }
    }

    /// Read every `repositories/*.json` under `root`, in file-name order
    pub fn load_dir(root: &Path) -> Result<Registry> {
        let repo_dir = root.join("repositories");
        if !repo_dir.is_dir() {
            return Err(Error::ConfigError(format!(
                "Registry has no repositories directory: {}",
                repo_dir.display()
            )));
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&repo_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        let mut repositories = IndexMap::new();
        for file in files {
            let content = fs::read_to_string(&file)?;
            let descriptor: RepositoryDescriptor =
                serde_json::from_str(&content).map_err(|e| Error::parse(&file, e))?;
            descriptor.validate(&file)?;

            let name = descriptor.name();
            debug!("Registry entry {} from {}", name, file.display());
            repositories.insert(name, descriptor);
        }

        info!("Loaded {} repositories from {}", repositories.len(), root.display());

        Ok(Registry {
            root: root.to_path_buf(),
            source_url: None,
            repositories,
        })
    }

    /// Build a registry from descriptors already in memory
    pub fn from_descriptors(
        root: &Path,
        descriptors: impl IntoIterator<Item = RepositoryDescriptor>,
    ) -> Registry {
        Registry {
            root: root.to_path_buf(),
            source_url: None,
            repositories: descriptors.into_iter().map(|d| (d.name(), d)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&RepositoryDescriptor> {
        self.repositories.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RepositoryDescriptor)> {
        self.repositories.iter()
    }

    /// Projects with their URL and buildable versions, optionally one project only
    pub fn listing(&self, project: Option<&str>) -> IndexMap<String, ProjectListing> {
        self.repositories
            .iter()
            .filter(|(name, _)| project.is_none_or(|p| p == name.as_str()))
            .map(|(name, d)| {
                (
                    name.clone(),
                    ProjectListing {
                        url: d.repository.clone(),
                        versions: d.builds.keys().cloned().collect(),
                    },
                )
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}
