// src/build/scheduler.rs

//! Running image builds
//!
//! Images of one project are built in declaration order. With one job the
//! projects run strictly in build order; with more, a project starts as soon
//! as every dependency in the same run has finished, on a bounded rayon pool.

use super::command::ImageBuildSpec;
use super::provenance::BuildArtifacts;
use crate::error::{Error, Result};
use crate::git::GitInfo;
use crate::process::{CommandRunner, OutputMode};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One image to build
#[derive(Debug, Clone)]
pub struct ImageJob {
    pub spec: ImageBuildSpec,
    /// Git metadata written to the provenance file
    pub git: GitInfo,
}

/// The images of one project plus the projects it waits for
#[derive(Debug, Clone)]
pub struct ProjectJob {
    pub name: String,
    /// Projects of this run that must finish first
    pub depends_on: Vec<String>,
    pub images: Vec<ImageJob>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub jobs: usize,
    pub keep_going: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            keep_going: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltImage {
    pub project: String,
    pub image: String,
    pub tag: String,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedImage {
    pub project: String,
    pub image: String,
    pub tag: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedImage {
    pub project: String,
    pub image: String,
}

/// Outcome of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    pub built: Vec<BuiltImage>,
    pub failed: Vec<FailedImage>,
    /// Images not attempted because something they depend on failed
    pub skipped: Vec<SkippedImage>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Error describing the first failure, if any
    pub fn first_error(&self) -> Option<Error> {
        self.failed.first().map(|f| Error::BuildFailed {
            project: f.project.clone(),
            image: f.image.clone(),
            reason: f.reason.clone(),
        })
    }

    fn skip_project(&mut self, job: &ProjectJob) {
        for image in &job.images {
            self.skipped.push(SkippedImage {
                project: job.name.clone(),
                image: image.spec.image.clone(),
            });
        }
    }

    fn absorb(&mut self, outcome: ProjectOutcome) {
        self.built.extend(outcome.built);
        self.failed.extend(outcome.failed);
        self.skipped.extend(outcome.skipped);
    }
}

#[derive(Debug, Default)]
struct ProjectOutcome {
    built: Vec<BuiltImage>,
    failed: Vec<FailedImage>,
    skipped: Vec<SkippedImage>,
}

impl ProjectOutcome {
    fn succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

fn build_image(runner: &dyn CommandRunner, job: &ImageJob) -> Result<Duration> {
    let spec = &job.spec;
    println!(
        "\nBuilding image {} for {} from: {}",
        spec.image,
        spec.project,
        spec.source_dockerfile.display()
    );
    println!("{}", spec.command);

    let started = Instant::now();
    let _artifacts = BuildArtifacts::write(spec, &job.git)?;
    runner
        .run(&spec.command.invocation(), OutputMode::Realtime)
        .map_err(|e| Error::BuildFailed {
            project: spec.project.clone(),
            image: spec.image.clone(),
            reason: e.to_string(),
        })?;
    Ok(started.elapsed())
}

/// Build a project's images in order, stopping at the first failure
fn run_project(runner: &dyn CommandRunner, job: &ProjectJob) -> ProjectOutcome {
    let mut outcome = ProjectOutcome::default();
    let mut images = job.images.iter();

    for image in images.by_ref() {
        match build_image(runner, image) {
            Ok(elapsed) => outcome.built.push(BuiltImage {
                project: job.name.clone(),
                image: image.spec.image.clone(),
                tag: image.spec.tag.clone(),
                elapsed,
            }),
            Err(e) => {
                eprintln!(
                    "Error building image {} for {}: {}",
                    image.spec.image, job.name, e
                );
                outcome.failed.push(FailedImage {
                    project: job.name.clone(),
                    image: image.spec.image.clone(),
                    tag: image.spec.tag.clone(),
                    reason: e.to_string(),
                });
                break;
            }
        }
    }

    for image in images {
        outcome.skipped.push(SkippedImage {
            project: job.name.clone(),
            image: image.spec.image.clone(),
        });
    }
    outcome
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Pending,
    Running,
    Done,
    Failed,
    Skipped,
}

/// Build every job, honouring dependencies between projects
///
/// Without `keep_going` no new image is started after the first failure;
/// images already running are allowed to finish. With it, only projects
/// depending on a failed project are skipped.
pub fn run_jobs(
    projects: Vec<ProjectJob>,
    runner: Arc<dyn CommandRunner>,
    options: SchedulerOptions,
) -> Result<BuildReport> {
    if options.jobs <= 1 {
        return Ok(run_sequential(&projects, runner.as_ref(), options.keep_going));
    }
    run_parallel(projects, runner, options)
}

fn blocked_by_failure(job: &ProjectJob, states: &HashMap<&str, State>) -> bool {
    job.depends_on.iter().any(|dep| {
        matches!(
            states.get(dep.as_str()),
            Some(State::Failed | State::Skipped)
        )
    })
}

fn run_sequential(projects: &[ProjectJob], runner: &dyn CommandRunner, keep_going: bool) -> BuildReport {
    let mut report = BuildReport::default();
    let mut states: HashMap<&str, State> = HashMap::new();

    let mut stopped = false;

    for job in projects {
        if stopped {
            report.skip_project(job);
            continue;
        }
        if blocked_by_failure(job, &states) {
            warn!("Skipping {}: a dependency failed to build", job.name);
            states.insert(&job.name, State::Skipped);
            report.skip_project(job);
            continue;
        }

        let outcome = run_project(runner, job);
        let ok = outcome.succeeded();
        report.absorb(outcome);
        states.insert(&job.name, if ok { State::Done } else { State::Failed });

        if !ok && !keep_going {
            stopped = true;
        }
    }
    report
}

fn run_parallel(
    projects: Vec<ProjectJob>,
    runner: Arc<dyn CommandRunner>,
    options: SchedulerOptions,
) -> Result<BuildReport> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs)
        .thread_name(|i| format!("cork-build-{}", i))
        .build()
        .map_err(|e| Error::ConfigError(format!("Failed to start build workers: {}", e)))?;

    let projects: Vec<Arc<ProjectJob>> = projects.into_iter().map(Arc::new).collect();
    let mut states = vec![State::Pending; projects.len()];
    let mut outcomes: Vec<Option<ProjectOutcome>> = projects.iter().map(|_| None).collect();
    let mut running = 0usize;
    let mut stopped = false;
    let (tx, rx) = mpsc::channel::<(usize, ProjectOutcome)>();

    info!("Building {} project(s) with {} jobs", projects.len(), options.jobs);

    loop {
        if !stopped {
            for i in 0..projects.len() {
                if states[i] != State::Pending {
                    continue;
                }

                let by_name: HashMap<&str, State> = projects
                    .iter()
                    .zip(&states)
                    .map(|(p, s)| (p.name.as_str(), *s))
                    .collect();
                let job = &projects[i];

                if blocked_by_failure(job, &by_name) {
                    warn!("Skipping {}: a dependency failed to build", job.name);
                    states[i] = State::Skipped;
                    continue;
                }

                let ready = job.depends_on.iter().all(|dep| {
                    by_name
                        .get(dep.as_str())
                        .is_none_or(|s| *s == State::Done)
                });
                if !ready || running >= options.jobs {
                    continue;
                }

                debug!("Starting {}", job.name);
                states[i] = State::Running;
                running += 1;

                let job = Arc::clone(job);
                let runner = Arc::clone(&runner);
                let tx = tx.clone();
                pool.spawn(move || {
                    let outcome = run_project(runner.as_ref(), &job);
                    // The receiver outlives every worker
                    let _ = tx.send((i, outcome));
                });
            }
        }

        if running == 0 {
            break;
        }

        let Ok((i, outcome)) = rx.recv() else {
            break;
        };
        running -= 1;
        let ok = outcome.succeeded();
        states[i] = if ok { State::Done } else { State::Failed };
        outcomes[i] = Some(outcome);

        if !ok && !options.keep_going {
            stopped = true;
        }
    }

    let mut report = BuildReport::default();
    for (i, job) in projects.iter().enumerate() {
        match outcomes[i].take() {
            Some(outcome) => report.absorb(outcome),
            // Pending projects were never started after a fail-fast stop
            None if matches!(states[i], State::Skipped | State::Pending) => {
                report.skip_project(job)
            }
            None => {}
        }
    }
    Ok(report)
}
