// src/session.rs

//! Per-invocation build context
//!
//! A [`BuildSession`] owns everything that lives for the duration of one
//! command: configuration, the process runner, a snapshot of the
//! environment, the loaded registry and the set of checkouts already
//! synchronized. Nothing here is persisted.

use crate::config::{BuildSettings, CorkConfig};
use crate::error::{Error, Result};
use crate::graph::ProjectRef;
use crate::git::pull_repository;
use crate::process::{CommandRunner, SystemRunner};
use crate::registry::{Registry, RegistrySource};
use std::cell::{OnceCell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Environment variable naming the registry location
pub const REGISTRY_ENV: &str = "CORK_BUILD_REGISTRY";

/// Directory under the build root holding repository clones
pub const CLONE_DIR: &str = "repos";

pub struct BuildSession {
    config: CorkConfig,
    settings: BuildSettings,
    runner: Arc<dyn CommandRunner>,
    env: BTreeMap<String, String>,
    registry_override: Option<String>,
    registry: OnceCell<Registry>,
    synced: RefCell<HashSet<PathBuf>>,
}

impl BuildSession {
    /// Session running real commands with the process environment
    pub fn new(config: CorkConfig) -> Self {
        Self::with_runner(config, Arc::new(SystemRunner), std::env::vars().collect())
    }

    pub fn with_runner(
        config: CorkConfig,
        runner: Arc<dyn CommandRunner>,
        env: BTreeMap<String, String>,
    ) -> Self {
        let settings = config.build();
        Self {
            config,
            settings,
            runner,
            env,
            registry_override: None,
            registry: OnceCell::new(),
            synced: RefCell::new(HashSet::new()),
        }
    }

    /// Use `location` (directory or git URL) as the registry
    pub fn with_registry_override(mut self, location: Option<String>) -> Self {
        self.registry_override = location;
        self
    }

    pub fn config(&self) -> &CorkConfig {
        &self.config
    }

    /// Effective `build` settings
    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub fn shared_runner(&self) -> Arc<dyn CommandRunner> {
        Arc::clone(&self.runner)
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn registry_source(&self) -> RegistrySource {
        RegistrySource::resolve(
            self.registry_override.as_deref(),
            self.env.get(REGISTRY_ENV).map(String::as_str),
            &self.settings,
            &self.config.build_root,
        )
    }

    /// The registry, loaded on first use
    pub fn registry(&self) -> Result<&Registry> {
        if let Some(registry) = self.registry.get() {
            return Ok(registry);
        }
        let loaded = Registry::load(&self.registry_source(), self.runner())?;
        Ok(self.registry.get_or_init(|| loaded))
    }

    /// Clone directory for a project at a version
    pub fn clone_dir(&self, name: &str, version: &str) -> PathBuf {
        self.config
            .build_root
            .join(CLONE_DIR)
            .join(format!("{}-{}", name, version))
    }

    /// Working directory for a project
    ///
    /// Registered local copies are used as they are. Otherwise the project is
    /// cloned or updated, at most once per session for each directory.
    pub fn checkout(&self, project: &ProjectRef) -> Result<PathBuf> {
        if let Some(dir) = &project.local_dir {
            if !dir.is_dir() {
                return Err(Error::NotFoundError(format!(
                    "Local directory {} registered for {} does not exist",
                    dir.display(),
                    project.name
                )));
            }
            return Ok(dir.clone());
        }

        let dir = self.clone_dir(&project.name, &project.version);
        if self.synced.borrow().contains(&dir) {
            debug!("{} already synchronized in this session", dir.display());
            return Ok(dir);
        }

        pull_repository(self.runner(), &dir, &project.url, &project.version)?;
        self.synced.borrow_mut().insert(dir.clone());
        Ok(dir)
    }
}
