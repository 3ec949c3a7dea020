// src/commands/registry.rs
//! Registry and local repository management

use super::{load_config, open_session};
use anyhow::{Context, Result, bail};
use cork_kube::config::RegistryLocation;
use cork_kube::git::git_info;
use cork_kube::SystemRunner;
use std::path::Path;
use tracing::info;

/// Register a local working copy in the global config
pub fn cmd_register_local_repo(dir: &Path) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let dir = cwd.join(dir);
    if !dir.is_dir() {
        bail!("Directory not found: {}", dir.display());
    }

    let info = git_info(&SystemRunner, &dir, None)
        .with_context(|| format!("Failed to read git info for {}", dir.display()))?;
    if info.name.is_empty() {
        bail!(
            "Could not find repository name for {}. Is it a git repository?",
            dir.display()
        );
    }

    let mut config = load_config()?;
    config
        .global_build_mut()
        .register_local_repo(&info.name, dir.clone(), info.remote.clone());
    config.save_global()?;

    println!(
        "Registered repository {} ({}) to {}",
        info.name,
        info.remote,
        dir.display()
    );
    Ok(())
}

/// Print registered local working copies
pub fn cmd_show_local_repos() -> Result<()> {
    let config = load_config()?;
    println!("{}", serde_yaml::to_string(&config.build().local_repos)?);
    Ok(())
}

/// Print registry projects and their versions
pub fn cmd_list(project: Option<&str>, names: bool, registry: Option<String>) -> Result<()> {
    let session = open_session(registry)?;
    let listing = session.registry()?.listing(project);
    info!("Listing {} project(s)", listing.len());

    let yaml = if names {
        serde_yaml::to_string(&listing.keys().collect::<Vec<_>>())?
    } else {
        serde_yaml::to_string(&listing)?
    };
    println!("{}", yaml);
    Ok(())
}

/// Point the registry at a URL or directory
pub fn cmd_set_registry_location(location: &str) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let mut config = load_config()?;
    match config
        .global_build_mut()
        .set_registry_location(location, &cwd)?
    {
        RegistryLocation::Remote(url) => println!("Setting registry url: {}", url),
        RegistryLocation::Directory(dir) => {
            println!("Setting local registry dir: {}", dir.display())
        }
    }
    config.save_global()?;
    Ok(())
}

/// Drop the local registry directory setting
pub fn cmd_reset_registry_location() -> Result<()> {
    let mut config = load_config()?;
    match config.global_build_mut().reset_registry_location() {
        Some(dir) => println!("No longer using local registry dir: {}", dir.display()),
        None => println!("No local registry dir configured"),
    }
    config.save_global()?;
    Ok(())
}

/// Set the Cloud Build project
pub fn cmd_set_gcb_project(project: &str) -> Result<()> {
    let mut config = load_config()?;
    config.global_build_mut().gcb_project = Some(project.to_string());
    config.save_global()?;
    println!("Using Google Cloud project {} for builds", project);
    Ok(())
}
