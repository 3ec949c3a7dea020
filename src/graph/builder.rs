// src/graph/builder.rs

//! Recursive build graph expansion
//!
//! Starting from a root project and version, each project's build entry is
//! looked up in the registry and its dependencies are expanded in turn. The
//! graph holds one node per project name, so a dependency reached through
//! several paths (a diamond) resolves to a single shared node.

use crate::config::BuildSettings;
use crate::error::{Error, Result};
use crate::git::repo_name_from_url;
use crate::registry::{BuildType, Registry, SecretRequirement, SECRET_PREFIX};
use indexmap::IndexMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Label used as the requester of the root project
const ROOT_REQUESTER: &str = "command line";

/// Resolves repository URLs to registered local working copies
#[derive(Debug, Clone, Copy)]
pub struct LocalRepoLookup<'a> {
    pub settings: &'a BuildSettings,
    /// Names or URLs that must come from the remote even if registered locally
    pub use_remote: &'a [String],
}

impl<'a> LocalRepoLookup<'a> {
    pub fn new(settings: &'a BuildSettings, use_remote: &'a [String]) -> Self {
        Self { settings, use_remote }
    }

    pub fn dir_for(&self, url: &str) -> Option<PathBuf> {
        self.settings.local_dir_for(url, self.use_remote)
    }
}

/// Required version and location of a direct dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub version: String,
    pub url: String,
}

/// One project in a build graph
#[derive(Debug, Clone, PartialEq)]
pub struct BuildGraphNode {
    pub version: String,
    pub url: String,
    pub registry: Option<String>,
    pub kind: BuildType,
    /// Secrets with versions pinned by the selected build entry
    pub secrets: Vec<SecretRequirement>,
    /// Registered working copy used instead of a clone
    pub local_dir: Option<PathBuf>,
    /// Direct dependencies keyed by project name, in declaration order
    pub dependencies: IndexMap<String, DependencyEdge>,
    /// Project whose build entry first required this one
    pub required_by: String,
}

/// Expanded dependency graph for one (project, version) request
#[derive(Debug, Clone, PartialEq)]
pub struct BuildGraph {
    pub root: String,
    pub nodes: IndexMap<String, BuildGraphNode>,
}

impl BuildGraph {
    /// Expand `project` at `version` against the registry
    ///
    /// Fails when a project is unknown, has no build entry for the required
    /// version (nor a `*` entry), when two paths require different versions
    /// of the same project, or when the dependencies form a cycle.
    pub fn resolve(
        registry: &Registry,
        project: &str,
        version: &str,
        local: LocalRepoLookup<'_>,
    ) -> Result<BuildGraph> {
        let descriptor = registry
            .get(project)
            .ok_or_else(|| Error::NotFoundError(format!("Project {} not found", project)))?;

        let mut graph = BuildGraph {
            root: project.to_string(),
            nodes: IndexMap::new(),
        };
        let mut stack = Vec::new();
        graph.expand(
            registry,
            project,
            version,
            &descriptor.repository,
            ROOT_REQUESTER,
            local,
            &mut stack,
        )?;

        debug!(
            "Resolved build graph for {}@{}: {} project(s)",
            project,
            version,
            graph.nodes.len()
        );
        Ok(graph)
    }

    #[allow(clippy::too_many_arguments)]
    fn expand(
        &mut self,
        registry: &Registry,
        project: &str,
        version: &str,
        url: &str,
        requested_by: &str,
        local: LocalRepoLookup<'_>,
        stack: &mut Vec<String>,
    ) -> Result<()> {
        let descriptor = registry
            .get(project)
            .ok_or_else(|| Error::NotFoundError(format!("Project {} not found", project)))?;

        if stack.iter().any(|p| p == project) {
            let mut cycle = stack.clone();
            cycle.push(project.to_string());
            return Err(Error::ResolutionError(format!(
                "Circular dependency detected: {}",
                cycle.join(" -> ")
            )));
        }

        if let Some(existing) = self.nodes.get(project) {
            if existing.version != version {
                if existing.local_dir.is_some() {
                    warn!(
                        "{} is required at {} (via {}) and {} (via {}); using local working copy",
                        project, existing.version, existing.required_by, version, requested_by
                    );
                } else {
                    return Err(Error::VersionConflict {
                        project: project.to_string(),
                        first: existing.version.clone(),
                        first_via: existing.required_by.clone(),
                        second: version.to_string(),
                        second_via: requested_by.to_string(),
                    });
                }
            }
            return Ok(());
        }

        let entry = descriptor.build_entry(version).ok_or_else(|| {
            let options: Vec<&str> = descriptor.builds.keys().map(String::as_str).collect();
            Error::NotFoundError(format!(
                "No build configuration found for {} version {}\n  - Options: {}",
                project,
                version,
                options.join(", ")
            ))
        })?;

        let mut secrets = descriptor.secrets.clone();
        let mut dependencies = IndexMap::new();

        for (key, required) in entry {
            if let Some(secret_name) = key.strip_prefix(SECRET_PREFIX) {
                match secrets.iter_mut().find(|s| s.name == secret_name) {
                    Some(secret) => secret.version = Some(required.clone()),
                    None => warn!(
                        "{} pins secret {} which it does not declare",
                        project, secret_name
                    ),
                }
                continue;
            }

            // Descriptor validation guarantees the mapping exists
            let Some(dep_url) = descriptor.dependencies.get(key) else {
                return Err(Error::ResolutionError(format!(
                    "{} has no repository URL for dependency {}",
                    project, key
                )));
            };
            dependencies.insert(
                repo_name_from_url(dep_url),
                DependencyEdge {
                    version: required.clone(),
                    url: dep_url.clone(),
                },
            );
        }

        let node = BuildGraphNode {
            version: version.to_string(),
            url: url.to_string(),
            registry: descriptor.registry.clone(),
            kind: descriptor.kind,
            secrets,
            local_dir: local.dir_for(url),
            dependencies: dependencies.clone(),
            required_by: requested_by.to_string(),
        };
        self.nodes.insert(project.to_string(), node);

        stack.push(project.to_string());
        for (dep_name, edge) in &dependencies {
            self.expand(registry, dep_name, &edge.version, &edge.url, project, local, stack)?;
        }
        stack.pop();

        Ok(())
    }

    pub fn root_node(&self) -> Option<&BuildGraphNode> {
        self.nodes.get(&self.root)
    }

    pub fn get(&self, name: &str) -> Option<&BuildGraphNode> {
        self.nodes.get(name)
    }
}
