// src/build/executor.rs

//! `build exec`: from a (project, version) request to built images

use super::command::{render_manifest, synthesize_image};
use super::scheduler::{BuildReport, ImageJob, ProjectJob, SchedulerOptions, run_jobs};
use super::BuildOptions;
use crate::error::Result;
use crate::git::{GitInfo, git_info};
use crate::graph::{
    BuildGraph, LocalRepoLookup, OrderOptions, OrderedBuildItem, ProjectRef, order_build_graph,
};
use crate::manifest::BuildManifest;
use crate::registry::BuildType;
use crate::session::BuildSession;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// A checked-out project with its git metadata and manifest
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRepo {
    pub project: ProjectRef,
    /// Local working copy or clone directory
    pub dir: PathBuf,
    pub git: GitInfo,
    pub manifest: BuildManifest,
}

/// A build-order entry ready for command synthesis
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedProject {
    pub repo: PreparedRepo,
    /// Direct dependencies; their manifests are not rendered
    pub dependencies: IndexMap<String, PreparedRepo>,
}

impl PreparedProject {
    pub fn name(&self) -> &str {
        &self.repo.project.name
    }
}

/// Human readable build time: whole seconds, or minutes above one minute
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_millis().div_ceil(1000);
    if secs > 60 {
        format!("{:.2}m", secs as f64 / 60.0)
    } else {
        format!("{}s", secs)
    }
}

/// Runs one `build exec` request within a session
pub struct BuildExecutor<'s> {
    session: &'s BuildSession,
    options: BuildOptions,
}

impl<'s> BuildExecutor<'s> {
    /// Create an executor; `options` are normalized against the session environment
    pub fn new(session: &'s BuildSession, mut options: BuildOptions) -> Self {
        options.normalize(session.env());
        if options.local_dev_registry.is_none() {
            options.local_dev_registry = session.settings().local_dev_registry.clone();
        }
        Self { session, options }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Resolve the graph and flatten it into the build order
    pub fn plan(&self) -> Result<Vec<OrderedBuildItem>> {
        let registry = self.session.registry()?;
        let lookup = LocalRepoLookup::new(self.session.settings(), &self.options.use_remote);
        let graph = BuildGraph::resolve(registry, &self.options.project, &self.options.version, lookup)?;

        let order = order_build_graph(
            &graph,
            &OrderOptions {
                depth: self.options.depth,
                use_registry: self.options.use_registry.clone(),
            },
        );
        info!(
            "Build order for {}@{} (depth {}): {}",
            self.options.project,
            self.options.version,
            self.options.depth,
            order.iter().map(|i| i.name()).collect::<Vec<_>>().join(", ")
        );
        Ok(order)
    }

    fn prepare_repo(&self, project: &ProjectRef) -> Result<(PathBuf, GitInfo)> {
        let dir = self.session.checkout(project)?;
        let git = git_info(self.session.runner(), &dir, Some(&project.version))?;
        Ok((dir, git))
    }

    fn load_manifest(project: &ProjectRef, dir: &Path, git: &GitInfo) -> Result<BuildManifest> {
        match project.kind {
            BuildType::SourceWrapper => {
                let name = if git.name.is_empty() { &project.name } else { &git.name };
                Ok(BuildManifest::source_wrapper(name, project.registry.clone()))
            }
            BuildType::CorkBuildFile => BuildManifest::load(dir),
        }
    }

    /// Check out every item and its direct dependencies, then load manifests
    pub fn prepare(&self, order: &[OrderedBuildItem]) -> Result<Vec<PreparedProject>> {
        let mut checked_out = Vec::with_capacity(order.len());
        for item in order {
            let (dir, git) = self.prepare_repo(&item.project)?;
            let mut deps = Vec::with_capacity(item.dependencies.len());
            for (name, dep) in &item.dependencies {
                let (dep_dir, dep_git) = self.prepare_repo(dep)?;
                deps.push((name.clone(), dep.clone(), dep_dir, dep_git));
            }
            checked_out.push((item.project.clone(), dir, git, deps));
        }

        let mut prepared = Vec::with_capacity(checked_out.len());
        for (project, dir, git, deps) in checked_out {
            let mut dependencies = IndexMap::new();
            for (name, dep, dep_dir, dep_git) in deps {
                let manifest = Self::load_manifest(&dep, &dep_dir, &dep_git)?;
                dependencies.insert(
                    name,
                    PreparedRepo {
                        project: dep,
                        dir: dep_dir,
                        git: dep_git,
                        manifest,
                    },
                );
            }

            let manifest = Self::load_manifest(&project, &dir, &git)?;
            let mut item = PreparedProject {
                repo: PreparedRepo {
                    project,
                    dir,
                    git,
                    manifest,
                },
                dependencies,
            };
            render_manifest(&mut item, &self.options, self.session.env())?;
            debug!("Prepared {} in {}", item.name(), item.repo.dir.display());
            prepared.push(item);
        }
        Ok(prepared)
    }

    /// Synthesize commands for every (filtered) image, in build order
    pub fn jobs(&self, projects: &[PreparedProject]) -> Result<Vec<ProjectJob>> {
        let in_run: Vec<&str> = projects.iter().map(|p| p.name()).collect();
        let mut jobs = Vec::with_capacity(projects.len());

        for project in projects {
            let mut images = Vec::new();
            for image in project.repo.manifest.images.keys() {
                if !self.options.filter.is_empty() && !self.options.filter.contains(image) {
                    continue;
                }
                images.push(ImageJob {
                    spec: synthesize_image(&project.repo, image, &self.options)?,
                    git: project.repo.git.clone(),
                });
            }

            jobs.push(ProjectJob {
                name: project.name().to_string(),
                depends_on: project
                    .dependencies
                    .keys()
                    .filter(|d| in_run.contains(&d.as_str()))
                    .cloned()
                    .collect(),
                images,
            });
        }
        Ok(jobs)
    }

    fn print_plan(&self, projects: &[PreparedProject], jobs: &[ProjectJob]) {
        println!("\n*** Build Summary: ***");
        println!("\nProjects to build:");
        for project in projects {
            let repo = &project.repo;
            println!("  {}", project.name());
            if repo.project.local_dir.is_some() {
                println!("    - Local Directory: {}", repo.dir.display());
            } else {
                println!("    - Clone Directory: {}", repo.dir.display());
            }
            println!("    - Repository: {}", repo.git.remote);
            println!("    - Tag: {}", repo.git.tag);
            println!("    - Branch: {}", repo.git.branch);
            println!("    - Commit: {}", repo.git.commit);
        }

        println!("\nImages to build:");
        for spec in jobs.iter().flat_map(|j| j.images.iter().map(|i| &i.spec)) {
            println!("  {}: {}", spec.project, spec.image);
            match &spec.original_tag {
                Some(original) => println!("    - Tag: {} (original tag: {})", spec.tag, original),
                None => println!("    - Tag: {}", spec.tag),
            }
        }
        println!("\n***********************");
    }

    fn print_dry_run(jobs: &[ProjectJob]) {
        for spec in jobs.iter().flat_map(|j| j.images.iter().map(|i| &i.spec)) {
            println!(
                "\nBuilding image {} for {} from: {}",
                spec.image,
                spec.project,
                spec.source_dockerfile.display()
            );
            println!("{}", spec.command);
        }
        println!("\n*** Dry Run ***");
    }

    fn print_report(report: &BuildReport) {
        if report.is_success() {
            println!("\n*** Build Complete ***");
        } else {
            println!("\n*** Build Failed ***");
        }

        println!("\n*** Build Summary: ***");
        for built in &report.built {
            println!("{} ({})", built.tag, format_duration(built.elapsed));
        }
        for failed in &report.failed {
            println!("{} (failed: {})", failed.tag, failed.reason);
        }
        for skipped in &report.skipped {
            println!("{}:{} (skipped)", skipped.project, skipped.image);
        }
    }

    /// Run the whole pipeline
    ///
    /// Returns the report of a run where every image built. Any failure is
    /// returned as [`Error::BuildFailed`](crate::Error::BuildFailed) after the
    /// summary is printed.
    pub fn run(&self) -> Result<BuildReport> {
        let order = self.plan()?;
        let projects = self.prepare(&order)?;
        let jobs = self.jobs(&projects)?;
        self.print_plan(&projects, &jobs);

        if self.options.dry_run {
            Self::print_dry_run(&jobs);
            return Ok(BuildReport::default());
        }

        let report = run_jobs(
            jobs,
            self.session.shared_runner(),
            SchedulerOptions {
                jobs: self.options.jobs,
                keep_going: self.options.keep_going,
            },
        )?;
        Self::print_report(&report);

        match report.first_error() {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(0)), "0s");
        assert_eq!(format_duration(Duration::from_millis(1200)), "2s");
        assert_eq!(format_duration(Duration::from_secs(60)), "60s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1.50m");
        assert_eq!(format_duration(Duration::from_millis(60_001)), "1.02m");
    }
}
