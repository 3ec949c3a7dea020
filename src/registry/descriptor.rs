// src/registry/descriptor.rs

//! Repository descriptor schema

use crate::error::{Error, Result};
use crate::git::repo_name_from_url;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Key prefix marking a secret version inside a build entry
pub const SECRET_PREFIX: &str = "secret.";

/// Build entry key used when no entry exists for the requested version
pub const WILDCARD_VERSION: &str = "*";

/// How a repository's images are produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildType {
    /// Images declared by the repository's `.cork-build` manifest
    #[default]
    CorkBuildFile,
    /// The repository source wrapped into a single generated image
    SourceWrapper,
}

impl BuildType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CorkBuildFile => "cork-build-file",
            Self::SourceWrapper => "source-wrapper",
        }
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named secret a repository needs at deploy time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretRequirement {
    pub name: String,

    /// Secret-manager to environment mappings, opaque to the build engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mappings: Option<serde_json::Value>,

    /// Version pinned by the selected build entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// One registry entry (`repositories/<name>.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    /// Canonical repository URL
    pub repository: String,

    /// Dependency short name -> repository URL
    #[serde(default)]
    pub dependencies: IndexMap<String, String>,

    /// Version (or `*`) -> dependency name or `secret.<name>` -> required version
    #[serde(default)]
    pub builds: IndexMap<String, IndexMap<String, String>>,

    /// Default container registry for the repository's images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,

    #[serde(default, rename = "type")]
    pub kind: BuildType,

    #[serde(default)]
    pub secrets: Vec<SecretRequirement>,
}

impl RepositoryDescriptor {
    /// Registry key: the repository URL's last path segment
    pub fn name(&self) -> String {
        repo_name_from_url(&self.repository)
    }

    /// Build entry for `version`, falling back to the wildcard entry
    pub fn build_entry(&self, version: &str) -> Option<&IndexMap<String, String>> {
        self.builds
            .get(version)
            .or_else(|| self.builds.get(WILDCARD_VERSION))
    }

    /// Check internal references, naming `path` in any error
    pub fn validate(&self, path: &Path) -> Result<()> {
        if self.repository.trim().is_empty() {
            return Err(Error::parse(path, "`repository` must not be empty"));
        }

        for (version, entry) in &self.builds {
            for key in entry.keys() {
                if key.starts_with(SECRET_PREFIX) {
                    continue;
                }
                if !self.dependencies.contains_key(key) {
                    return Err(Error::parse(
                        path,
                        format!(
                            "build '{}' requires '{}', which is not listed in `dependencies`",
                            version, key
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(json: &str) -> RepositoryDescriptor {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_full_descriptor() {
        let d = descriptor(
            r#"{
                "repository": "https://github.com/org/app.git",
                "registry": "us-docker.pkg.dev/org/pub",
                "type": "source-wrapper",
                "dependencies": {"lib": "https://github.com/org/lib"},
                "builds": {"v1.0.0": {"lib": "v2.0.0", "secret.db": "3"}},
                "secrets": [{"name": "db", "mappings": [{"env": "DB_PASS"}]}]
            }"#,
        );
        assert_eq!(d.name(), "app");
        assert_eq!(d.kind, BuildType::SourceWrapper);
        assert_eq!(d.secrets[0].version, None);
        assert!(d.validate(Path::new("app.json")).is_ok());
    }

    #[test]
    fn test_defaults() {
        let d = descriptor(r#"{"repository": "https://github.com/org/lib"}"#);
        assert_eq!(d.kind, BuildType::CorkBuildFile);
        assert!(d.builds.is_empty());
        assert!(d.registry.is_none());
    }

    #[test]
    fn test_build_entry_wildcard_fallback() {
        let d = descriptor(
            r#"{"repository": "https://github.com/org/lib",
                "builds": {"v1": {}, "*": {}}}"#,
        );
        assert!(std::ptr::eq(d.build_entry("v1").unwrap(), &d.builds["v1"]));
        assert!(std::ptr::eq(d.build_entry("v9").unwrap(), &d.builds["*"]));
    }

    #[test]
    fn test_validate_rejects_unknown_dependency() {
        let d = descriptor(
            r#"{"repository": "https://github.com/org/app",
                "builds": {"v1": {"missing": "v2"}}}"#,
        );
        let err = d.validate(Path::new("app.json")).unwrap_err();
        assert!(err.to_string().contains("missing"));
        assert!(err.to_string().contains("app.json"));
    }

    #[test]
    fn test_validate_rejects_empty_repository() {
        let d = descriptor(r#"{"repository": " "}"#);
        assert!(d.validate(Path::new("x.json")).is_err());
    }
}
