// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use xcer::transaction::{self, Candidate, InstallOutcome, RemoveOutcome};
use xcer::{Config, Context};

#[derive(Parser)]
#[command(name = "xcli")]
#[command(author, version, about = "Minimal package manager with dependency resolution and conflict detection", long_about = None)]
struct Cli {
    /// Configuration file (default: search ~/.config/xology, /etc, ./)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Do not ask for confirmation
    #[arg(short = 'y', long, global = true)]
    noconfirm: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install packages and their dependencies
    Add {
        /// Package names
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Remove installed packages
    Del {
        /// Package names
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Upgrade every installed package with a newer index version
    Upd,
    /// List installed packages
    List,
    /// Search the remote index by package name
    Search {
        /// Search terms
        #[arg(required = true)]
        terms: Vec<String>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: clap_complete::Shell,
    },
}

/// Print the plan and ask whether to go ahead
fn confirm_plan(candidates: &[Candidate], noconfirm: bool, prompt: &str) -> xcer::Result<bool> {
    println!("\nPackages to add:");
    for c in candidates {
        match &c.installed_version {
            Some(old) => println!("  {}-{} (upgrade from {})", c.name, c.version, old),
            None => println!("  {}-{}", c.name, c.version),
        }
    }
    println!();

    let proceed = noconfirm || ask(prompt)?;
    if proceed {
        println!(":: Downloading packages...");
    }
    Ok(proceed)
}

/// `[Y/n]` prompt on stdin. End of input declines.
fn ask(prompt: &str) -> xcer::Result<bool> {
    print!("{} [Y/n] ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer)? == 0 {
        println!();
        return Ok(false);
    }

    Ok(matches!(
        answer.trim().to_lowercase().as_str(),
        "" | "y" | "yes"
    ))
}

fn report_install(outcome: InstallOutcome) {
    match outcome {
        InstallOutcome::NothingToDo => {
            println!("-> Nothing to do. All packages are up to date.");
        }
        InstallOutcome::Aborted => println!("-> Aborting."),
        InstallOutcome::Installed(installed) => {
            for c in &installed {
                println!("-> Installed {}-{}", c.name, c.version);
            }
            println!("\n-> Installation complete.");
        }
    }
}

/// Load configuration and build the session context
fn load_context(config_path: Option<&PathBuf>) -> Result<Context> {
    let config = match config_path {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    info!(
        "Using root {} and database {}",
        config.root_dir.display(),
        config.db_path.display()
    );

    let ctx = Context::new(config)?.with_progress(io::stderr().is_terminal());
    info!("Using repository {}", ctx.config().repo_url);
    Ok(ctx)
}

fn run(cli: Cli) -> Result<()> {
    let noconfirm = cli.noconfirm;
    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Add { names } => {
            let ctx = load_context(config_path)?;
            println!(":: Synchronizing package databases...");
            let index = ctx.fetch_index()?;

            println!("-> Resolving dependencies...");
            let outcome = transaction::install_from_index(&ctx, &index, &names, |plan| {
                confirm_plan(plan, noconfirm, ":: Proceed with installation?")
            })?;
            report_install(outcome);
        }
        Commands::Del { names } => {
            let ctx = load_context(config_path)?;
            for name in &names {
                match transaction::remove(&ctx, name)? {
                    RemoveOutcome::NotInstalled => {
                        println!("-> Package '{}' is not installed.", name);
                    }
                    RemoveOutcome::Removed(record) => {
                        println!("-> Uninstalled {}.", record.key());
                    }
                }
            }
        }
        Commands::Upd => {
            let ctx = load_context(config_path)?;
            println!(":: Starting system upgrade...");
            let index = ctx.fetch_index()?;

            let pending = transaction::pending_upgrades(&ctx, &index)?;
            if pending.is_empty() {
                println!("-> There is nothing to do.");
                return Ok(());
            }

            println!("-> The following packages will be upgraded:");
            for p in &pending {
                println!("  {} {} -> {}", p.name, p.installed, p.available);
            }

            let names: Vec<String> = pending.into_iter().map(|p| p.name).collect();
            let outcome = transaction::install_from_index(&ctx, &index, &names, |plan| {
                confirm_plan(plan, noconfirm, ":: Proceed with upgrade?")
            })?;
            report_install(outcome);
        }
        Commands::List => {
            let ctx = load_context(config_path)?;
            let installed = ctx.db().list_installed()?;
            if installed.is_empty() {
                println!("-> No packages installed.");
            }
            for (name, version) in &installed {
                println!("{} {}", name, version);
            }
        }
        Commands::Search { terms } => {
            let ctx = load_context(config_path)?;
            println!(":: Searching remote repository...");
            let index = ctx.fetch_index()?;

            let found = index.search(&terms);
            if found.is_empty() {
                println!("-> No packages found.");
            }
            for entry in found {
                println!("{} {}", entry.name, entry.version);
            }
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "xcli", &mut io::stdout());
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    // Argument errors exit 1 like every other failure; --help/--version exit 0
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<xcer::Error>() {
                Some(err) if !err.is_internal() => eprintln!("error: {}", err),
                _ => {
                    eprintln!("\nAn unexpected error occurred. Detailed report:");
                    eprintln!("{:?}", e);
                }
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_add_requires_names() {
        assert!(Cli::try_parse_from(["xcli", "add"]).is_err());
        let cli = Cli::try_parse_from(["xcli", "add", "a", "b"]).unwrap();
        assert!(matches!(cli.command, Commands::Add { names } if names == vec!["a", "b"]));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["xcli"]).is_err());
        assert!(Cli::try_parse_from(["xcli", "bogus"]).is_err());
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::try_parse_from(["xcli", "upd", "-y", "--config", "/tmp/x.conf"]).unwrap();
        assert!(cli.noconfirm);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/x.conf")));
        assert!(matches!(cli.command, Commands::Upd));
    }

    #[test]
    fn test_list_and_search_parse() {
        assert!(matches!(
            Cli::try_parse_from(["xcli", "list"]).unwrap().command,
            Commands::List
        ));
        assert!(Cli::try_parse_from(["xcli", "search"]).is_err());
    }
}
