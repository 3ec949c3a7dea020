// src/config.rs

//! `.cork-kube-config` handling
//!
//! Two files are read: the global file in the user's home directory and an
//! optional project-local file in the working directory. Only the `build`
//! section is interpreted here; every other key is carried through untouched
//! when the global file is saved.

use crate::error::{Error, Result};
use crate::git::normalize_remote;
use crate::registry::is_remote_location;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config file name, both globally and per project
pub const CONFIG_FILE_NAME: &str = ".cork-kube-config";

/// Registry used for development builds when nothing else is configured
pub const LOCAL_DEV_REGISTRY: &str = "localhost/local-dev";

/// Directory under `$HOME` holding clones and the registry checkout
pub const BUILD_ROOT_DIR: &str = ".cork-build";

/// A developer's working copy registered for use instead of a clone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRepo {
    pub dir: PathBuf,
    pub url: String,
}

/// The `build` section of a config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSettings {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub local_repos: IndexMap<String, LocalRepo>,

    /// Local registry directory; replaces the git clone when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies_dir: Option<PathBuf>,

    /// Remote registry repository to clone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_url: Option<String>,

    /// Google Cloud project for `build gcb`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcb_project: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_dev_registry: Option<String>,
}

impl BuildSettings {
    /// Overlay `other` on top of `self`; `other` wins where it is set
    fn merged(&self, other: &BuildSettings) -> BuildSettings {
        let mut local_repos = self.local_repos.clone();
        for (name, repo) in &other.local_repos {
            local_repos.insert(name.clone(), repo.clone());
        }

        BuildSettings {
            local_repos,
            dependencies_dir: other
                .dependencies_dir
                .clone()
                .or_else(|| self.dependencies_dir.clone()),
            registry_url: other
                .registry_url
                .clone()
                .or_else(|| self.registry_url.clone()),
            gcb_project: other
                .gcb_project
                .clone()
                .or_else(|| self.gcb_project.clone()),
            local_dev_registry: other
                .local_dev_registry
                .clone()
                .or_else(|| self.local_dev_registry.clone()),
        }
    }

    /// Find a registered working copy for a repository URL
    ///
    /// `use_remote` lists repository names or URLs that must be cloned even
    /// when a working copy is registered.
    pub fn local_dir_for(&self, url: &str, use_remote: &[String]) -> Option<PathBuf> {
        let wanted = normalize_remote(url);
        if use_remote.iter().any(|r| normalize_remote(r) == wanted) {
            return None;
        }

        self.local_repos
            .iter()
            .filter(|(name, _)| !use_remote.contains(name))
            .find(|(_, repo)| normalize_remote(&repo.url) == wanted)
            .map(|(_, repo)| repo.dir.clone())
    }
}

/// Where `set-registry-location` pointed the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryLocation {
    Remote(String),
    Directory(PathBuf),
}

impl BuildSettings {
    /// Point the registry at a git URL or an existing directory
    ///
    /// Relative directories are resolved against `cwd`.
    pub fn set_registry_location(&mut self, location: &str, cwd: &Path) -> Result<RegistryLocation> {
        let location = location.trim();
        if is_remote_location(location) {
            self.registry_url = Some(location.to_string());
            return Ok(RegistryLocation::Remote(location.to_string()));
        }

        let dir = cwd.join(location);
        if !dir.is_dir() {
            return Err(Error::NotFoundError(format!(
                "Directory not found: {}",
                dir.display()
            )));
        }
        self.dependencies_dir = Some(dir.clone());
        Ok(RegistryLocation::Directory(dir))
    }

    /// Forget the local registry directory so the remote is used again
    pub fn reset_registry_location(&mut self) -> Option<PathBuf> {
        self.dependencies_dir.take()
    }

    /// Register a working copy under its repository name
    pub fn register_local_repo(&mut self, name: &str, dir: PathBuf, url: String) {
        self.local_repos
            .insert(name.to_string(), LocalRepo { dir, url });
    }
}

/// Contents of one config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub build: BuildSettings,

    /// Sections owned by other cork-kube commands
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl ConfigFile {
    /// Load a config file, returning `None` when it does not exist
    pub fn load(path: &Path) -> Result<Option<ConfigFile>> {
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let file = serde_json::from_str(&content).map_err(|e| Error::parse(path, e))?;
        Ok(Some(file))
    }
}

/// Global and project-local configuration
#[derive(Debug, Clone)]
pub struct CorkConfig {
    pub global_path: PathBuf,
    pub global: ConfigFile,
    pub local_path: Option<PathBuf>,
    pub local: Option<ConfigFile>,
    /// Root for registry checkouts and repository clones
    pub build_root: PathBuf,
}

impl CorkConfig {
    /// Load `~/.cork-kube-config` and `./.cork-kube-config`
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::ConfigError("Cannot determine home directory".to_string()))?;
        let local = std::env::current_dir()?.join(CONFIG_FILE_NAME);
        Self::load_from(
            &home.join(CONFIG_FILE_NAME),
            Some(&local),
            &home.join(BUILD_ROOT_DIR),
        )
    }

    /// Load from explicit locations
    ///
    /// A local path that is a directory is resolved to the config file inside it.
    pub fn load_from(global_path: &Path, local_path: Option<&Path>, build_root: &Path) -> Result<Self> {
        let global = ConfigFile::load(global_path)?.unwrap_or_default();

        let local_path = local_path.map(|p| {
            if p.is_dir() {
                p.join(CONFIG_FILE_NAME)
            } else {
                p.to_path_buf()
            }
        });
        let local = match &local_path {
            Some(p) => ConfigFile::load(p)?,
            None => None,
        };

        debug!(
            "Loaded config (global: {}, local: {})",
            global_path.display(),
            local.is_some()
        );

        Ok(Self {
            global_path: global_path.to_path_buf(),
            global,
            local_path,
            local,
            build_root: build_root.to_path_buf(),
        })
    }

    /// Effective build settings, local values over global ones
    pub fn build(&self) -> BuildSettings {
        match &self.local {
            Some(local) => self.global.build.merged(&local.build),
            None => self.global.build.clone(),
        }
    }

    /// Mutable access to the global build section, for `save_global`
    pub fn global_build_mut(&mut self) -> &mut BuildSettings {
        &mut self.global.build
    }

    /// Write the global config file
    pub fn save_global(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.global)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {}", e)))?;
        fs::write(&self.global_path, content)?;
        debug!("Saved {}", self.global_path.display());
        Ok(())
    }
}
