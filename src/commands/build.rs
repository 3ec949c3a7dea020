// src/commands/build.rs
//! Image build commands

use super::open_session;
use crate::cli::{ExecArgs, GcbArgs};
use anyhow::{Context, Result};
use cork_kube::build::gcb::{self, GcbOptions};
use cork_kube::build::split_list;
use cork_kube::{BuildExecutor, BuildOptions};
use tracing::info;

fn exec_options(args: ExecArgs) -> Result<BuildOptions> {
    let mut opts = BuildOptions::new(args.project, args.version);
    opts.production = args.production;
    opts.push = !args.no_push;
    opts.use_remote = split_list(&args.use_remote);
    opts.use_registry = split_list(&args.use_registry);
    opts.dry_run = args.dry_run;
    if let Some(selection) = args.tag_selection.as_deref() {
        opts.tag_selection = selection
            .parse()
            .with_context(|| format!("Invalid --tag-selection '{}'", selection))?;
    }
    if let Some(tag) = args.override_tag.as_deref() {
        opts.override_tag = tag
            .parse()
            .with_context(|| format!("Invalid --override-tag '{}'", tag))?;
    }
    opts.filter = split_list(&args.filter);
    opts.depth = args.depth;
    opts.cache = !args.no_cache;
    opts.cache_from = !args.no_cache_from;
    opts.platform = args.platform;
    opts.local_dev_registry = args.local_dev_registry;
    opts.jobs = args.jobs;
    opts.keep_going = args.keep_going;
    Ok(opts)
}

/// Build a project's images
pub fn cmd_build_exec(args: ExecArgs) -> Result<()> {
    info!("Building {}@{}", args.project, args.version);
    let session = open_session(args.cork_build_registry.clone())?;
    let opts = exec_options(args)?;
    let project = format!("{}@{}", opts.project, opts.version);

    let executor = BuildExecutor::new(&session, opts);
    executor
        .run()
        .with_context(|| format!("Build of {} failed", project))?;
    Ok(())
}

/// Submit a build to Google Cloud Build
pub fn cmd_build_gcb(args: GcbArgs) -> Result<()> {
    info!("Submitting {}@{} to Cloud Build", args.project, args.version);
    let session = open_session(args.cork_build_registry.clone())?;

    let mut opts = GcbOptions::new(args.project, args.version);
    opts.gcb_project = args.gcb_project;
    opts.cache = !args.no_cache;
    opts.high_cpu = args.high_cpu;
    opts.depth = args.depth;
    opts.prepend_build_steps = args.prepend_build_steps;
    opts.dry_run = args.dry_run;

    gcb::submit(&session, &opts).context("Cloud Build submission failed")?;
    Ok(())
}
