// src/bin/xcbuild.rs

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use xcer::packages::builder;

#[derive(Parser)]
#[command(name = "xcbuild")]
#[command(author, about = "Build xcer package archives from a directory tree", long_about = None)]
struct Cli {
    /// Package name
    name: String,

    /// Package version (must not contain '-')
    #[arg(short = 'V', long = "version", value_name = "VERSION")]
    version: String,

    /// Runtime dependency (repeatable)
    #[arg(short, long = "depends", value_name = "NAME")]
    depends: Vec<String>,

    /// Directory tree to package [default: source_packages/<name>]
    #[arg(short, long, value_name = "DIR")]
    source: Option<PathBuf>,

    /// Directory the archive is written to
    #[arg(short, long, value_name = "DIR", default_value = "remote_repo_server")]
    output: PathBuf,

    /// Regenerate packages.json in the output directory using this base URL
    #[arg(long, value_name = "BASE_URL")]
    index: Option<String>,
}

fn run(cli: Cli) -> Result<()> {
    let source = cli
        .source
        .unwrap_or_else(|| PathBuf::from("source_packages").join(&cli.name));

    println!(":: Building {}-{}...", cli.name, cli.version);
    let archive = builder::build_package(&source, &cli.name, &cli.version, &cli.depends, &cli.output)?;
    println!("-> Created {}", archive.display());

    if let Some(base_url) = &cli.index {
        let index = builder::write_index(&cli.output, base_url)?;
        println!("-> Updated {}", index.display());
    }

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

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
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
