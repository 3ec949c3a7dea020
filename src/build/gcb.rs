// src/build/gcb.rs

//! Submitting a build to Google Cloud Build
//!
//! The registry carries the Cloud Build configuration under `gcloud/`. The
//! remote build runs `cork-kube build exec` itself, so only the request
//! (project, version, registry, cache, depth) is passed as substitutions.

use crate::error::{Error, Result};
use crate::graph::{BuildGraph, Depth, LocalRepoLookup};
use crate::process::{Invocation, OutputMode};
use crate::session::BuildSession;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Cloud project used when neither the CLI nor the config names one
pub const DEFAULT_GCB_PROJECT: &str = "digital-ucdavis-edu";

const BUILD_FILE: &str = "cloudbuild.yaml";
const HIGH_CPU_BUILD_FILE: &str = "cloudbuild-highcpu.yaml";
const TEMP_BUILD_FILE: &str = "cork-build-tmp.yaml";

/// Options for `build gcb`
#[derive(Debug, Clone)]
pub struct GcbOptions {
    pub project: String,
    pub version: String,
    pub gcb_project: Option<String>,
    pub cache: bool,
    pub high_cpu: bool,
    pub depth: Depth,
    /// YAML file whose `steps` run before the registry's steps
    pub prepend_build_steps: Option<PathBuf>,
    pub dry_run: bool,
}

impl GcbOptions {
    pub fn new(project: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            version: version.into(),
            gcb_project: None,
            cache: true,
            high_cpu: false,
            depth: Depth::default(),
            prepend_build_steps: None,
            dry_run: false,
        }
    }
}

/// Temporary build file, removed on drop
struct TempBuildFile(PathBuf);

impl Drop for TempBuildFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.0) {
            debug!("Could not remove {}: {}", self.0.display(), e);
        }
    }
}

fn read_yaml(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)?;
    serde_yaml::from_str(&content).map_err(|e| Error::parse(path, e))
}

fn steps(doc: &Value, path: &Path) -> Result<Vec<Value>> {
    match doc.get("steps") {
        Some(Value::Sequence(steps)) => Ok(steps.clone()),
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(_) => Err(Error::parse(path, "`steps` must be a list")),
    }
}

/// Build file with the steps of `prepend` placed before its own steps
pub fn prepend_steps(build_file: &Path, prepend: &Path) -> Result<String> {
    let extra = read_yaml(prepend)?;
    let mut doc = read_yaml(build_file)?;

    let mut all = steps(&extra, prepend)?;
    all.extend(steps(&doc, build_file)?);

    match doc.as_mapping_mut() {
        Some(map) => {
            map.insert(Value::from("steps"), Value::Sequence(all));
        }
        None => return Err(Error::parse(build_file, "expected a YAML mapping")),
    }

    serde_yaml::to_string(&doc)
        .map_err(|e| Error::ConfigError(format!("Failed to serialize build file: {}", e)))
}

/// The `gcloud builds submit` invocation
pub fn submit_invocation(
    config: &Path,
    gcb_project: &str,
    opts: &GcbOptions,
    registry_url: &str,
) -> Invocation {
    let substitutions = [
        ("_PROJECT", opts.project.clone()),
        ("_VERSION", opts.version.clone()),
        ("_REGISTRY", registry_url.to_string()),
        ("_USE_CACHE", opts.cache.to_string()),
        ("_DEPTH", opts.depth.to_string()),
    ]
    .iter()
    .map(|(k, v)| format!("{}={}", k, v))
    .collect::<Vec<_>>()
    .join(",");

    Invocation::new("gcloud").args([
        "builds".to_string(),
        "submit".to_string(),
        "--no-source".to_string(),
        format!("--config={}", config.display()),
        format!("--project={}", gcb_project),
        format!("--substitutions={}", substitutions),
    ])
}

/// Validate the request and submit it to Cloud Build
pub fn submit(session: &BuildSession, opts: &GcbOptions) -> Result<()> {
    let registry = session.registry()?;
    BuildGraph::resolve(
        registry,
        &opts.project,
        &opts.version,
        LocalRepoLookup::new(session.settings(), &[]),
    )?;

    let gcb_project = opts
        .gcb_project
        .clone()
        .or_else(|| session.settings().gcb_project.clone())
        .unwrap_or_else(|| DEFAULT_GCB_PROJECT.to_string());
    println!("Submitting build to Google Cloud project: {}", gcb_project);

    let gcloud_dir = registry.root.join("gcloud");
    let build_file = gcloud_dir.join(if opts.high_cpu { HIGH_CPU_BUILD_FILE } else { BUILD_FILE });
    if !build_file.is_file() {
        return Err(Error::NotFoundError(format!(
            "Google Cloud build file not found: {}",
            build_file.display()
        )));
    }

    let mut _temp = None;
    let mut config = build_file.clone();
    if let Some(prepend) = &opts.prepend_build_steps {
        let prepend = if prepend.is_absolute() {
            prepend.clone()
        } else {
            std::env::current_dir()?.join(prepend)
        };
        if !prepend.is_file() {
            return Err(Error::NotFoundError(format!(
                "Prepend build steps file not found: {}",
                prepend.display()
            )));
        }

        let merged = prepend_steps(&build_file, &prepend)?;
        let temp = gcloud_dir.join(TEMP_BUILD_FILE);
        fs::write(&temp, merged)?;
        info!("Wrote merged build file {}", temp.display());
        config = temp.clone();
        _temp = Some(TempBuildFile(temp));
    }

    let invocation = submit_invocation(
        &config,
        &gcb_project,
        opts,
        registry.source_url.as_deref().unwrap_or(""),
    );

    if opts.dry_run {
        println!("{}", invocation);
        println!("\n*** Build File ***\n");
        println!("{}", fs::read_to_string(&config)?);
        return Ok(());
    }

    session.runner().run(&invocation, OutputMode::Realtime)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_invocation() {
        let mut opts = GcbOptions::new("app", "v1.2.0");
        opts.depth = Depth::All;
        let inv = submit_invocation(
            Path::new("/reg/gcloud/cloudbuild.yaml"),
            "my-gcb",
            &opts,
            "https://github.com/org/registry",
        );
        assert_eq!(
            inv.command_line(),
            "gcloud builds submit --no-source --config=/reg/gcloud/cloudbuild.yaml \
             --project=my-gcb --substitutions=_PROJECT=app,_VERSION=v1.2.0,\
             _REGISTRY=https://github.com/org/registry,_USE_CACHE=true,_DEPTH=ALL"
        );
    }

    #[test]
    fn test_prepend_steps() {
        let dir = tempfile::tempdir().unwrap();
        let build = dir.path().join("cloudbuild.yaml");
        let pre = dir.path().join("pre.yaml");
        fs::write(
            &build,
            "steps:\n  - name: gcr.io/cloud-builders/docker\n    args: [build]\ntimeout: 3600s\n",
        )
        .unwrap();
        fs::write(&pre, "steps:\n  - name: alpine\n    args: [echo, hi]\n").unwrap();

        let merged: Value = serde_yaml::from_str(&prepend_steps(&build, &pre).unwrap()).unwrap();
        let steps = merged["steps"].as_sequence().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0]["name"], Value::from("alpine"));
        assert_eq!(steps[1]["name"], Value::from("gcr.io/cloud-builders/docker"));
        assert_eq!(merged["timeout"], Value::from("3600s"));
    }

    #[test]
    fn test_prepend_rejects_non_list_steps() {
        let dir = tempfile::tempdir().unwrap();
        let build = dir.path().join("cloudbuild.yaml");
        let pre = dir.path().join("pre.yaml");
        fs::write(&build, "steps: []\n").unwrap();
        fs::write(&pre, "steps: nope\n").unwrap();
        assert!(matches!(
            prepend_steps(&build, &pre),
            Err(Error::ParseError { .. })
        ));
    }
}
