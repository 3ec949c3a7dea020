// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{BuildCommands, Cli, Commands};

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build(command) => match command {
            BuildCommands::Exec(args) => commands::cmd_build_exec(args),
            BuildCommands::Gcb(args) => commands::cmd_build_gcb(args),
            BuildCommands::RegisterLocalRepo { dir } => commands::cmd_register_local_repo(&dir),
            BuildCommands::ShowLocalRepos => commands::cmd_show_local_repos(),
            BuildCommands::List {
                project,
                names,
                cork_build_registry,
            } => commands::cmd_list(project.as_deref(), names, cork_build_registry),
            BuildCommands::SetRegistryLocation { location } => {
                commands::cmd_set_registry_location(&location)
            }
            BuildCommands::ResetRegistryLocation => commands::cmd_reset_registry_location(),
            BuildCommands::SetGcbProject { project } => commands::cmd_set_gcb_project(&project),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use cork_kube::Depth;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_exec() {
        let cli = Cli::try_parse_from([
            "cork-kube",
            "build",
            "exec",
            "-p",
            "app",
            "-v",
            "v1.0.0",
            "--depth",
            "ALL",
            "--use-registry",
            "lib,ui",
            "-o",
            "app=pr-1",
            "--jobs",
            "4",
        ])
        .unwrap();

        let Commands::Build(BuildCommands::Exec(args)) = cli.command else {
            panic!("expected build exec");
        };
        assert_eq!(args.project, "app");
        assert_eq!(args.version, "v1.0.0");
        assert_eq!(args.depth, Depth::All);
        assert_eq!(args.use_registry, vec!["lib,ui"]);
        assert_eq!(args.override_tag.as_deref(), Some("app=pr-1"));
        assert_eq!(args.jobs, 4);
        assert!(!args.production);
    }

    #[test]
    fn test_parse_rejects_bad_depth() {
        assert!(Cli::try_parse_from([
            "cork-kube", "build", "exec", "-p", "app", "-v", "v1", "--depth", "0"
        ])
        .is_err());
    }
}
