// src/build/command.rs

//! Per-image build command synthesis
//!
//! Given a prepared project this module decides the registry and tag of each
//! image, locates its Dockerfile, renders option templates and assembles the
//! `docker buildx build` command line.

use super::executor::{PreparedProject, PreparedRepo};
use super::{BuildOptions, TagSelection};
use crate::config::LOCAL_DEV_REGISTRY;
use crate::error::{Error, Result};
use crate::git::normalize_remote;
use crate::manifest::{BuildOptionMap, WrapperSources};
use crate::process::Invocation;
use crate::template::{TemplateVars, render_all};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// File name of the Dockerfile copy carrying the provenance layer
pub const PATCHED_DOCKERFILE: &str = "corkbuild.Dockerfile";

const DEV_DOCKERFILE: &str = "Dockerfile.dev";
const SEGMENT_SEPARATOR: &str = " \\\n  ";

/// Resolve `path` against `base` and drop `.`/`..` components lexically
fn resolve(base: &Path, path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in base.join(path).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Label prefix for a project: uppercased, non-alphanumerics as `_`
fn label_name(project: &str) -> String {
    project
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

/// Registry an image of `repo` is tagged for
///
/// Production builds and `--use-registry` projects use the registry from the
/// descriptor, then the manifest. Development builds use the local dev registry.
pub fn select_registry(repo: &PreparedRepo, opts: &BuildOptions) -> Result<String> {
    let name = &repo.project.name;
    if opts.production || opts.uses_registry(name) {
        return repo
            .project
            .registry
            .clone()
            .or_else(|| repo.manifest.registry.clone())
            .ok_or_else(|| {
                Error::ConfigError(format!(
                    "No registry defined for {} in the build registry or its .cork-build file",
                    name
                ))
            });
    }

    Ok(opts
        .local_dev_registry
        .clone()
        .unwrap_or_else(|| LOCAL_DEV_REGISTRY.to_string()))
}

/// Selected image tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagChoice {
    pub tag: String,
    /// Tag or branch that would have been used without an override
    pub original: Option<String>,
}

/// Pick the image tag for `repo`
pub fn select_tag(repo: &PreparedRepo, opts: &BuildOptions) -> Result<TagChoice> {
    let name = &repo.project.name;
    if opts.uses_registry(name) {
        return Ok(TagChoice {
            tag: repo.project.version.clone(),
            original: None,
        });
    }

    let git = &repo.git;
    let selection = opts.tag_selection_for(name);

    let tag = if let Some(tag) = opts.override_tag.get(name) {
        tag.clone()
    } else if !git.tag.is_empty() && selection != TagSelection::ForceBranch {
        git.tag.clone()
    } else if !git.branch.is_empty() && selection != TagSelection::ForceTag {
        git.branch.clone()
    } else {
        let reason = match selection {
            TagSelection::ForceTag => format!("No tag for {} and tag selection is force-tag", name),
            TagSelection::ForceBranch => {
                format!("No branch for {} and tag selection is force-branch", name)
            }
            TagSelection::Auto => format!("No tag or branch for {}", name),
        };
        return Err(Error::TagError(reason));
    };

    let standard = if git.tag.is_empty() { &git.branch } else { &git.tag };
    let original = (!standard.is_empty() && *standard != tag).then(|| standard.clone());
    Ok(TagChoice { tag, original })
}

/// Variables for rendering the option templates of `project`
///
/// `<alias>.<image>` for each repository alias of the manifest,
/// `<project>.<image>` for the project's own images and `ENV.<name>` for the
/// session environment.
pub fn template_vars(
    project: &PreparedProject,
    opts: &BuildOptions,
    env: &BTreeMap<String, String>,
) -> Result<TemplateVars> {
    let mut vars = TemplateVars::new();
    let repo = &project.repo;

    for (alias, url) in &repo.manifest.repositories {
        let wanted = normalize_remote(url);
        let dep = project
            .dependencies
            .values()
            .find(|d| normalize_remote(&d.project.url) == wanted)
            .ok_or_else(|| {
                Error::ConfigError(format!(
                    "Repository {} ({}) not found in build config dependencies for {}",
                    alias, url, repo.project.name
                ))
            })?;

        let registry = select_registry(dep, opts)?;
        let tag = select_tag(dep, opts)?.tag;
        for image in dep.manifest.images.keys() {
            vars.insert(
                format!("{}.{}", alias, image),
                format!("{}/{}:{}", registry, image, tag),
            );
        }
    }

    let registry = select_registry(repo, opts)?;
    let tag = select_tag(repo, opts)?.tag;
    for image in repo.manifest.images.keys() {
        vars.insert(
            format!("{}.{}", repo.project.name, image),
            format!("{}/{}:{}", registry, image, tag),
        );
    }

    for (key, value) in env {
        vars.insert(format!("ENV.{}", key), value.clone());
    }

    Ok(vars)
}

/// Render `${KEY}` placeholders in every option of the project's manifest
pub fn render_manifest(
    project: &mut PreparedProject,
    opts: &BuildOptions,
    env: &BTreeMap<String, String>,
) -> Result<()> {
    let vars = template_vars(project, opts, env)?;
    for image in project.repo.manifest.images.values_mut() {
        render_all(image.options.values_mut().flatten(), &vars)?;
        if let Some(dev) = image.dev_options.as_mut() {
            render_all(dev.values_mut().flatten(), &vars)?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// `--flag`
    Flag(String),
    /// `--flag value`
    Value(String, String),
    /// `--flag "value"`
    Quoted(String, String),
    /// Positional argument
    Arg(String),
}

impl Segment {
    fn push_args(&self, args: &mut Vec<String>) {
        match self {
            Segment::Flag(f) | Segment::Arg(f) => args.push(f.clone()),
            Segment::Value(f, v) | Segment::Quoted(f, v) => {
                args.push(f.clone());
                args.push(v.clone());
            }
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Flag(flag) | Segment::Arg(flag) => f.write_str(flag),
            Segment::Value(flag, value) => write!(f, "{} {}", flag, value),
            Segment::Quoted(flag, value) => write!(f, "{} \"{}\"", flag, value),
        }
    }
}

/// A `docker buildx build` command
///
/// Executed as an argument vector; the [`Display`](fmt::Display) form is the
/// multi-line shell rendering shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    base: Vec<Segment>,
    segments: Vec<Segment>,
}

impl BuildCommand {
    fn new(opts: &BuildOptions) -> Self {
        let mut base = vec![
            Segment::Arg("buildx".to_string()),
            Segment::Arg("build".to_string()),
            Segment::Flag("--cache-to=type=inline,mode=max".to_string()),
        ];
        if !opts.cache {
            base.push(Segment::Flag("--no-cache".to_string()));
        }
        if opts.production {
            base.push(Segment::Flag("--pull".to_string()));
        }
        if opts.pushes() {
            base.push(Segment::Flag("--push".to_string()));
        } else {
            base.push(Segment::Flag("--output=type=docker".to_string()));
        }
        if let Some(platform) = &opts.platform {
            base.push(Segment::Value("--platform".to_string(), platform.clone()));
        }
        Self {
            base,
            segments: Vec::new(),
        }
    }

    fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// Argument vector without the program name
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for segment in self.base.iter().chain(&self.segments) {
            segment.push_args(&mut args);
        }
        args
    }

    pub fn invocation(&self) -> Invocation {
        Invocation::new("docker").args(self.args())
    }
}

impl fmt::Display for BuildCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("docker")?;
        for segment in &self.base {
            write!(f, " {}", segment)?;
        }
        for segment in &self.segments {
            write!(f, "{}{}", SEGMENT_SEPARATOR, segment)?;
        }
        Ok(())
    }
}

/// Generated files for a source-wrapper image and where they go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperFiles {
    pub dockerfile: PathBuf,
    pub dockerignore: PathBuf,
    pub sources: WrapperSources,
}

/// Everything needed to build one image
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuildSpec {
    pub project: String,
    pub image: String,
    pub context_path: PathBuf,
    /// Dockerfile the patched copy is made from
    pub source_dockerfile: PathBuf,
    /// Patched copy passed to `--file`
    pub dockerfile: PathBuf,
    /// Full reference, `registry/image:tag`
    pub tag: String,
    pub original_tag: Option<String>,
    /// Effective options after dev selection and rendering
    pub options: BuildOptionMap,
    pub no_build_info: bool,
    pub user: Option<String>,
    pub wrapper: Option<WrapperFiles>,
    pub command: BuildCommand,
}

/// Build the command and file layout for one image of `repo`
pub fn synthesize_image(
    repo: &PreparedRepo,
    image_name: &str,
    opts: &BuildOptions,
) -> Result<ImageBuildSpec> {
    let name = &repo.project.name;
    let image = repo.manifest.images.get(image_name).ok_or_else(|| {
        Error::NotFoundError(format!("Image {} not declared by {}", image_name, name))
    })?;

    let registry = select_registry(repo, opts)?;
    let choice = select_tag(repo, opts)?;
    let tag = format!("{}/{}:{}", registry, image_name, choice.tag);

    let mut command = BuildCommand::new(opts);
    let label = label_name(name);
    command.push(Segment::Quoted(
        "--label".to_string(),
        format!("{}_TAG={}", label, choice.tag),
    ));
    command.push(Segment::Quoted(
        "--label".to_string(),
        format!("{}_SHA={}", label, repo.git.commit),
    ));
    if opts.cache && opts.cache_from {
        command.push(Segment::Flag(format!(
            "--cache-from=type=registry,ref={}",
            tag
        )));
    }

    let context_path = resolve(&repo.dir, &image.context_path);

    let wrapper = match &repo.manifest.wrapper {
        Some(sources) => {
            let files = WrapperFiles {
                dockerfile: repo.dir.join("Dockerfile"),
                dockerignore: repo.dir.join(".dockerignore"),
                sources: sources.clone(),
            };
            if files.dockerfile.exists() || files.dockerignore.exists() {
                return Err(Error::ConfigError(format!(
                    "Dockerfile path {} or .dockerignore path {} already exists for {}:{}. \
                     This project is set to use a generated Dockerfile and .dockerignore file. \
                     Please remove the existing files and try again.",
                    files.dockerfile.display(),
                    files.dockerignore.display(),
                    name,
                    image_name
                )));
            }
            Some(files)
        }
        None => None,
    };

    let mut source_dockerfile = match (&wrapper, &image.dockerfile) {
        (Some(files), _) => files.dockerfile.clone(),
        (None, Some(path)) => resolve(&repo.dir, path),
        (None, None) => context_path.join("Dockerfile"),
    };

    let mut is_dev = false;
    if !opts.production && wrapper.is_none() {
        if let Some(dir) = source_dockerfile.parent() {
            let dev = dir.join(DEV_DOCKERFILE);
            if dev.is_file() {
                source_dockerfile = dev;
                is_dev = true;
            }
        }
    }

    if wrapper.is_none() && !source_dockerfile.is_file() {
        return Err(Error::NotFoundError(format!(
            "Dockerfile path {} not found for {}:{}",
            source_dockerfile.display(),
            name,
            image_name
        )));
    }

    let options = match (&image.dev_options, is_dev) {
        (Some(dev), true) => dev.clone(),
        _ => image.options.clone(),
    };
    for (key, values) in &options {
        for value in values {
            command.push(Segment::Quoted(format!("--{}", key), value.clone()));
        }
    }

    let dockerfile = source_dockerfile
        .parent()
        .map(|dir| dir.join(PATCHED_DOCKERFILE))
        .unwrap_or_else(|| PathBuf::from(PATCHED_DOCKERFILE));

    command.push(Segment::Value("--tag".to_string(), tag.clone()));
    command.push(Segment::Value(
        "--file".to_string(),
        dockerfile.to_string_lossy().into_owned(),
    ));
    command.push(Segment::Arg(context_path.to_string_lossy().into_owned()));

    Ok(ImageBuildSpec {
        project: name.clone(),
        image: image_name.to_string(),
        context_path,
        source_dockerfile,
        dockerfile,
        tag,
        original_tag: choice.original,
        options,
        no_build_info: image.no_build_info,
        user: image.user.clone(),
        wrapper,
        command,
    })
}
