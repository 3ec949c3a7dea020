// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Common arguments: project and version to build
fn project_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("project")
            .short('p')
            .long("project")
            .required(true)
            .help("Project name"),
    )
    .arg(
        Arg::new("version")
            .short('v')
            .long("version")
            .required(true)
            .help("Version to build"),
    )
}

/// Common argument: registry location override
fn registry_arg() -> Arg {
    Arg::new("cork_build_registry")
        .long("cork-build-registry")
        .value_name("LOCATION")
        .help("Registry location (directory or git URL)")
}

fn flag(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).long(name).action(ArgAction::SetTrue).help(help)
}

fn build_cli() -> Command {
    let exec = project_args(Command::new("exec").about("Build a project's images"))
        .arg(flag("production", "Use real registry names and push images").short('m'))
        .arg(flag("no-push", "Do not push images (production builds only)"))
        .arg(Arg::new("use-remote").short('r').long("use-remote").help("Clone instead of using a local copy"))
        .arg(Arg::new("use-registry").long("use-registry").help("Take these projects' images from their registry"))
        .arg(flag("dry-run", "Only print the docker build commands").short('d'))
        .arg(Arg::new("tag-selection").short('s').long("tag-selection").help("auto, force-tag or force-branch"))
        .arg(Arg::new("override-tag").short('o').long("override-tag").help("Override the image tag"))
        .arg(Arg::new("filter").short('f').long("filter").help("Image names to build"))
        .arg(Arg::new("depth").long("depth").default_value("1").help("Levels of dependencies to build, or ALL"))
        .arg(flag("no-cache", "Do not use the build cache"))
        .arg(flag("no-cache-from", "Do not pass --cache-from"))
        .arg(Arg::new("platform").long("platform").help("Target platform"))
        .arg(Arg::new("local-dev-registry").long("local-dev-registry").help("Registry for development builds"))
        .arg(registry_arg())
        .arg(Arg::new("jobs").short('j').long("jobs").default_value("1").help("Maximum concurrent image builds"))
        .arg(flag("keep-going", "Keep building independent projects after a failure"));

    let gcb = project_args(Command::new("gcb").about("Submit a project build to Google Cloud Build"))
        .arg(registry_arg())
        .arg(Arg::new("gcb-project").long("gcb-project").help("Google Cloud project"))
        .arg(flag("no-cache", "Do not use the build cache"))
        .arg(flag("high-cpu", "Use the high cpu machine type"))
        .arg(Arg::new("depth").long("depth").default_value("1").help("Levels of dependencies to build, or ALL"))
        .arg(Arg::new("prepend-build-steps").long("prepend-build-steps").help("YAML file of steps to run first"))
        .arg(flag("dry-run", "Only print the gcloud command").short('d'));

    Command::new("cork-kube")
        .version(env!("CARGO_PKG_VERSION"))
        .author("UC Davis Library")
        .about("Build container images for related git repositories")
        .subcommand(
            Command::new("build")
                .about("Build container images from the cork-build registry")
                .subcommand(exec)
                .subcommand(gcb)
                .subcommand(
                    Command::new("register-local-repo")
                        .about("Register a local working copy to use instead of a clone")
                        .arg(Arg::new("dir").required(true).help("Repository directory")),
                )
                .subcommand(Command::new("show-local-repos").about("Show registered local working copies"))
                .subcommand(
                    Command::new("list")
                        .about("List registry projects and their versions")
                        .arg(Arg::new("project").short('p').long("project").help("Only show this project"))
                        .arg(flag("names", "Only list project names").short('n'))
                        .arg(registry_arg()),
                )
                .subcommand(
                    Command::new("set-registry-location")
                        .about("Set the registry location")
                        .arg(Arg::new("location").required(true).help("Directory or git URL")),
                )
                .subcommand(
                    Command::new("reset-registry-location")
                        .about("Use the remote registry again"),
                )
                .subcommand(
                    Command::new("set-gcb-project")
                        .about("Set the Google Cloud project used by build gcb")
                        .arg(Arg::new("project").required(true).help("Google Cloud project id")),
                ),
        )
}

/// Write `<page>.1` for `cmd`, then `<page>-<sub>.1` for each subcommand
fn write_pages(cmd: &Command, page: &str, out: &Path) -> io::Result<usize> {
    let mut buffer = Vec::new();
    Man::new(cmd.clone())
        .title(page.to_uppercase())
        .render(&mut buffer)?;
    fs::write(out.join(format!("{}.1", page)), buffer)?;

    let mut written = 1;
    for sub in cmd.get_subcommands() {
        written += write_pages(sub, &format!("{}-{}", page, sub.get_name()), out)?;
    }
    Ok(written)
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let Some(root) = env::var_os("CARGO_MANIFEST_DIR") else {
        println!("cargo:warning=CARGO_MANIFEST_DIR not set; skipping man pages");
        return;
    };
    let out = PathBuf::from(root).join("man");

    let result = fs::create_dir_all(&out)
        .and_then(|()| write_pages(&build_cli(), "cork-kube", &out));
    if let Err(e) = result {
        println!("cargo:warning=Man pages for cork-kube not generated: {}", e);
    }
}
