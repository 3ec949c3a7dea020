// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.
//!
//! [`FakeTools`] plays `git` and `docker`: clones copy a fixture source tree,
//! git metadata comes from the registered [`FakeRepo`], and every docker
//! build is recorded together with the files present while it ran.

#![allow(dead_code)]

use cork_kube::process::{CommandOutput, CommandRunner, Invocation, OutputMode};
use cork_kube::{BuildSession, CorkConfig, Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Git state reported for a working copy
#[derive(Debug, Clone)]
pub struct FakeRepo {
    pub url: String,
    /// Files copied into a clone
    pub source: PathBuf,
    pub commit: String,
    pub tags: Vec<String>,
    pub branch: String,
}

/// A recorded `docker buildx build`
#[derive(Debug, Clone)]
pub struct DockerBuild {
    pub args: Vec<String>,
    pub tag: String,
    pub dockerfile: PathBuf,
    pub context: PathBuf,
    /// Patched Dockerfile content at build time
    pub dockerfile_content: String,
    /// Provenance JSON present at build time
    pub provenance: Option<String>,
}

#[derive(Default)]
pub struct FakeTools {
    remotes: Mutex<HashMap<String, FakeRepo>>,
    checkouts: Mutex<HashMap<PathBuf, FakeRepo>>,
    fail_tags: Mutex<Vec<String>>,
    pub commands: Mutex<Vec<String>>,
    pub builds: Mutex<Vec<DockerBuild>>,
}

impl FakeTools {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `repo.url` clonable
    pub fn add_remote(&self, repo: FakeRepo) {
        self.remotes.lock().unwrap().insert(repo.url.clone(), repo);
    }

    /// Report `repo` for an existing working copy
    pub fn add_checkout(&self, dir: &Path, repo: FakeRepo) {
        self.checkouts.lock().unwrap().insert(dir.to_path_buf(), repo);
    }

    /// Fail docker builds whose tag contains `pattern`
    pub fn fail_builds_matching(&self, pattern: &str) {
        self.fail_tags.lock().unwrap().push(pattern.to_string());
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn builds(&self) -> Vec<DockerBuild> {
        self.builds.lock().unwrap().clone()
    }

    pub fn built_tags(&self) -> Vec<String> {
        self.builds().into_iter().map(|b| b.tag).collect()
    }

    fn checkout(&self, dir: &Path) -> Result<FakeRepo> {
        self.checkouts
            .lock()
            .unwrap()
            .get(dir)
            .cloned()
            .ok_or_else(|| failed(&format!("not a git repository: {}", dir.display())))
    }

    fn git(&self, args: &[String]) -> Result<CommandOutput> {
        if args.first().map(String::as_str) == Some("-c") {
            // git -c advice.detachedHead=false clone <url> --branch <v> --depth 1 <dir>
            let url = &args[3];
            let dir = PathBuf::from(&args[8]);
            let repo = self
                .remotes
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| failed(&format!("repository not found: {}", url)))?;
            copy_dir(&repo.source, &dir);
            self.add_checkout(&dir, repo);
            return Ok(CommandOutput::default());
        }

        let dir = PathBuf::from(&args[1]);
        let repo = self.checkout(&dir)?;
        let sub: Vec<&str> = args[2..].iter().map(String::as_str).collect();
        let stdout = match sub.as_slice() {
            ["remote", "-v"] => format!(
                "origin\t{url} (fetch)\norigin\t{url} (push)\n",
                url = repo.url
            ),
            ["log", "-1", "--pretty=%h"] => format!("{}\n", repo.commit),
            ["tag", "--contains", "HEAD"] => repo.tags.join("\n"),
            ["rev-parse", "--abbrev-ref", "HEAD"] => {
                if repo.branch.is_empty() {
                    "HEAD\n".to_string()
                } else {
                    format!("{}\n", repo.branch)
                }
            }
            ["log", "-1", "--format=%cI"] => "2024-05-01T12:00:00-07:00\n".to_string(),
            _ => String::new(),
        };
        Ok(CommandOutput {
            stdout,
            stderr: String::new(),
        })
    }

    fn docker(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let args = invocation.args.clone();
        let value_of = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .map(|i| args[i + 1].clone())
                .unwrap_or_default()
        };
        let tag = value_of("--tag");
        let dockerfile = PathBuf::from(value_of("--file"));
        let context = PathBuf::from(args.last().cloned().unwrap_or_default());
        let image = tag
            .rsplit('/')
            .next()
            .and_then(|s| s.split(':').next())
            .unwrap_or_default()
            .to_string();

        self.builds.lock().unwrap().push(DockerBuild {
            dockerfile_content: fs::read_to_string(&dockerfile).unwrap_or_default(),
            provenance: fs::read_to_string(context.join(format!("{}.cork-build.json", image))).ok(),
            args,
            tag: tag.clone(),
            dockerfile,
            context,
        });

        if self.fail_tags.lock().unwrap().iter().any(|p| tag.contains(p.as_str())) {
            return Err(Error::CommandFailed {
                command: invocation.command_line(),
                status: "exit status: 1".to_string(),
                stderr: String::new(),
            });
        }
        Ok(CommandOutput::default())
    }
}

fn failed(stderr: &str) -> Error {
    Error::CommandFailed {
        command: "git".to_string(),
        status: "exit status: 128".to_string(),
        stderr: stderr.to_string(),
    }
}

impl CommandRunner for FakeTools {
    fn run(&self, invocation: &Invocation, _mode: OutputMode) -> Result<CommandOutput> {
        self.commands.lock().unwrap().push(invocation.command_line());
        match invocation.program.as_str() {
            "git" => self.git(&invocation.args),
            "docker" => self.docker(invocation),
            other => panic!("unexpected program: {}", other),
        }
    }
}

/// Recursively copy `from` into `to`
pub fn copy_dir(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), target).unwrap();
        }
    }
}

/// All files below `dir`, relative to it
pub fn list_files(dir: &Path) -> Vec<String> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(&current).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path.strip_prefix(dir).unwrap().to_string_lossy().into_owned());
            }
        }
    }
    files.sort();
    files
}

/// A temporary home: registry directory, build root, sources and config
pub struct Fixture {
    pub root: TempDir,
    pub tools: Arc<FakeTools>,
}

impl Fixture {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("registry/repositories")).unwrap();
        fs::create_dir_all(root.path().join("sources")).unwrap();
        Self {
            root,
            tools: FakeTools::new(),
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn registry_dir(&self) -> PathBuf {
        self.path().join("registry")
    }

    pub fn build_root(&self) -> PathBuf {
        self.path().join("build-root")
    }

    pub fn url(name: &str) -> String {
        format!("https://github.com/org/{}", name)
    }

    /// Write `repositories/<name>.json`
    pub fn descriptor(&self, name: &str, json: &str) -> &Self {
        fs::write(
            self.registry_dir().join("repositories").join(format!("{}.json", name)),
            json,
        )
        .unwrap();
        self
    }

    /// Create a source tree for `name` with a `.cork-build` and Dockerfiles
    pub fn source(&self, name: &str, manifest: &str, files: &[&str]) -> PathBuf {
        let dir = self.path().join("sources").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(".cork-build"), manifest).unwrap();
        for file in files {
            let path = dir.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, format!("FROM scratch\n# {}\n", file)).unwrap();
        }
        dir
    }

    /// Make `name` clonable from its source tree
    pub fn remote(&self, name: &str, tags: &[&str], branch: &str) {
        self.tools.add_remote(FakeRepo {
            url: Self::url(name),
            source: self.path().join("sources").join(name),
            commit: format!("{}1234", &name[..1]),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            branch: branch.to_string(),
        });
    }

    /// Register the source tree of `name` as a local working copy
    pub fn local(&self, name: &str, branch: &str) -> PathBuf {
        let dir = self.path().join("sources").join(name);
        self.tools.add_checkout(
            &dir,
            FakeRepo {
                url: format!("git@github.com:org/{}.git", name),
                source: dir.clone(),
                commit: "local01".to_string(),
                tags: Vec::new(),
                branch: branch.to_string(),
            },
        );
        dir
    }

    /// Session with a global config holding `build_json` as its `build` section
    pub fn session(&self, build_json: &str) -> BuildSession {
        let global = self.path().join("cork-kube-config");
        fs::write(&global, format!(r#"{{"build": {}}}"#, build_json)).unwrap();
        let config = CorkConfig::load_from(&global, None, &self.build_root()).unwrap();

        let mut env = BTreeMap::new();
        env.insert(
            "CORK_BUILD_REGISTRY".to_string(),
            self.registry_dir().to_string_lossy().into_owned(),
        );
        env.insert("HOME".to_string(), "/home/builder".to_string());
        BuildSession::with_runner(config, self.tools.clone(), env)
    }
}
