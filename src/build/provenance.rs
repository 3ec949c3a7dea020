// src/build/provenance.rs

//! Temporary files written around a single image build
//!
//! The provenance JSON and the patched Dockerfile (plus the generated sources
//! of a source-wrapper image) exist only while the builder runs. They are
//! removed when the [`BuildArtifacts`] guard is dropped, whether the build
//! succeeded or not.

use super::command::ImageBuildSpec;
use crate::error::{Error, Result};
use crate::git::GitInfo;
use crate::manifest::provenance_file_name;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory inside the image holding provenance files
pub const BUILD_INFO_DIR: &str = "/cork-build-info";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProvenanceRecord<'a> {
    #[serde(flatten)]
    git: &'a GitInfo,
    image_tag: &'a str,
}

/// Files created for one image build; removed on drop
#[derive(Debug, Default)]
pub struct BuildArtifacts {
    paths: Vec<PathBuf>,
}

impl BuildArtifacts {
    /// Write every file the build of `spec` needs
    ///
    /// Files already written are removed again if a later step fails.
    pub fn write(spec: &ImageBuildSpec, git: &GitInfo) -> Result<Self> {
        let mut artifacts = BuildArtifacts::default();

        if let Some(wrapper) = &spec.wrapper {
            artifacts.create(&wrapper.dockerfile, &wrapper.sources.dockerfile)?;
            artifacts.create(&wrapper.dockerignore, &wrapper.sources.dockerignore)?;
        }

        if !spec.context_path.is_dir() {
            return Err(Error::NotFoundError(format!(
                "Context path {} not found for {}:{}",
                spec.context_path.display(),
                spec.project,
                spec.image
            )));
        }

        let info_name = provenance_file_name(&spec.image);
        let record = ProvenanceRecord {
            git,
            image_tag: &spec.tag,
        };
        let json = serde_json::to_string_pretty(&record).map_err(|e| {
            Error::ConfigError(format!("Failed to serialize build info: {}", e))
        })?;
        artifacts.create(&spec.context_path.join(&info_name), &json)?;

        let mut dockerfile = fs::read_to_string(&spec.source_dockerfile)?;
        if !spec.no_build_info {
            dockerfile.push_str(&format!(
                "\n# Copy git info\nUSER root\nRUN mkdir -p {dir}\nCOPY {info} {dir}/{image}.json\n",
                dir = BUILD_INFO_DIR,
                info = info_name,
                image = spec.image
            ));
            if let Some(user) = &spec.user {
                dockerfile.push_str(&format!("USER {}", user));
            }
        }
        artifacts.create(&spec.dockerfile, &dockerfile)?;

        Ok(artifacts)
    }

    fn create(&mut self, path: &Path, content: &str) -> Result<()> {
        fs::write(path, content)?;
        debug!("Wrote {}", path.display());
        self.paths.push(path.to_path_buf());
        Ok(())
    }

    /// Files currently owned by the guard
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Drop for BuildArtifacts {
    fn drop(&mut self) {
        for path in self.paths.drain(..).rev() {
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}
