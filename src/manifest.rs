// src/manifest.rs

//! `.cork-build` manifests
//!
//! A manifest lives at the root of a repository and declares the images the
//! repository produces. Repositories registered as `source-wrapper` have no
//! manifest; one is synthesised instead.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Manifest file name at the repository root
pub const MANIFEST_FILE_NAME: &str = ".cork-build";

/// Option key -> values; every value becomes one `--<key> "<value>"` flag
pub type BuildOptionMap = IndexMap<String, Vec<String>>;

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many_map<'de, D>(deserializer: D) -> std::result::Result<BuildOptionMap, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: IndexMap<String, OneOrMany> = IndexMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| {
            let values = match value {
                OneOrMany::One(v) => vec![v],
                OneOrMany::Many(v) => v,
            };
            (key, values)
        })
        .collect())
}

fn optional_one_or_many_map<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<BuildOptionMap>, D::Error>
where
    D: Deserializer<'de>,
{
    one_or_many_map(deserializer).map(Some)
}

/// One image declared by a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    /// Build context, relative to the repository root
    pub context_path: PathBuf,

    /// Dockerfile relative to the repository root; `<contextPath>/Dockerfile` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<PathBuf>,

    #[serde(default, deserialize_with = "one_or_many_map")]
    pub options: BuildOptionMap,

    /// Replaces `options` when a `Dockerfile.dev` is used
    #[serde(
        default,
        deserialize_with = "optional_one_or_many_map",
        skip_serializing_if = "Option::is_none"
    )]
    pub dev_options: Option<BuildOptionMap>,

    /// Skip baking `/cork-build-info/<image>.json` into the image
    #[serde(default)]
    pub no_build_info: bool,

    /// User restored after the provenance layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl ImageConfig {
    fn with_context(context_path: impl Into<PathBuf>) -> Self {
        Self {
            context_path: context_path.into(),
            dockerfile: None,
            options: IndexMap::new(),
            dev_options: None,
            no_build_info: false,
            user: None,
        }
    }
}

/// Generated sources for a `source-wrapper` project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperSources {
    pub dockerfile: String,
    pub dockerignore: String,
}

impl WrapperSources {
    fn for_image(image: &str) -> Self {
        Self {
            dockerfile: format!(
                "FROM alpine:latest\n\nRUN mkdir /src\nWORKDIR /src\nCOPY . /src\nRUN rm {}\n",
                provenance_file_name(image)
            ),
            dockerignore: ".git\ncorkbuild.Dockerfile\nDockerfile".to_string(),
        }
    }
}

/// Name of the provenance file written into an image's build context
pub fn provenance_file_name(image: &str) -> String {
    format!("{}.cork-build.json", image)
}

/// Parsed `.cork-build` file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildManifest {
    /// Registry for production pushes when the registry descriptor has none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,

    /// Alias -> repository URL; every URL must be a direct dependency
    #[serde(default)]
    pub repositories: IndexMap<String, String>,

    #[serde(default)]
    pub images: IndexMap<String, ImageConfig>,

    /// Generated Dockerfile and `.dockerignore` for source-wrapper projects
    #[serde(skip)]
    pub wrapper: Option<WrapperSources>,
}

impl BuildManifest {
    /// Read `<dir>/.cork-build`
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE_NAME);
        if !path.is_file() {
            return Err(Error::NotFoundError(format!(
                "No build script ({}) found",
                path.display()
            )));
        }

        let content = fs::read_to_string(&path)?;
        let manifest: BuildManifest =
            serde_json::from_str(&content).map_err(|e| Error::parse(&path, e))?;
        debug!(
            "Loaded {} with {} image(s)",
            path.display(),
            manifest.images.len()
        );
        Ok(manifest)
    }

    /// Manifest for a `source-wrapper` project: one image wrapping the checkout
    pub fn source_wrapper(repo_name: &str, registry: Option<String>) -> Self {
        let image = repo_name.to_lowercase();
        let mut images = IndexMap::new();
        images.insert(image.clone(), ImageConfig::with_context("."));

        Self {
            registry,
            repositories: IndexMap::new(),
            images,
            wrapper: Some(WrapperSources::for_image(&image)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_values_normalize_to_lists() {
        let manifest: BuildManifest = serde_json::from_str(
            r#"{
                "registry": "us-docker.pkg.dev/org/pub",
                "repositories": {"lib": "https://github.com/org/lib"},
                "images": {
                    "app": {
                        "contextPath": ".",
                        "options": {
                            "build-arg": ["A=1", "B=${lib.lib-base}"],
                            "target": "prod"
                        },
                        "devOptions": {"target": "dev"},
                        "user": "node"
                    }
                }
            }"#,
        )
        .unwrap();

        let app = &manifest.images["app"];
        assert_eq!(app.options["build-arg"], vec!["A=1", "B=${lib.lib-base}"]);
        assert_eq!(app.options["target"], vec!["prod"]);
        assert_eq!(app.dev_options.as_ref().unwrap()["target"], vec!["dev"]);
        assert_eq!(app.user.as_deref(), Some("node"));
        assert!(!app.no_build_info);
        assert!(manifest.wrapper.is_none());
    }

    #[test]
    fn test_load_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let err = BuildManifest::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::NotFoundError(_)));
    }

    #[test]
    fn test_load_invalid_manifest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE_NAME), r#"{"images": {"x": {}}}"#).unwrap();
        let err = BuildManifest::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains(".cork-build"));
    }

    #[test]
    fn test_source_wrapper_manifest() {
        let manifest = BuildManifest::source_wrapper("My-Data", Some("reg.io/org".to_string()));
        assert_eq!(manifest.images.keys().collect::<Vec<_>>(), vec!["my-data"]);
        assert_eq!(manifest.images["my-data"].context_path, PathBuf::from("."));

        let wrapper = manifest.wrapper.unwrap();
        assert!(wrapper.dockerfile.starts_with("FROM alpine:latest\n"));
        assert!(wrapper.dockerfile.contains("RUN rm my-data.cork-build.json\n"));
        assert_eq!(wrapper.dockerignore, ".git\ncorkbuild.Dockerfile\nDockerfile");
    }
}
