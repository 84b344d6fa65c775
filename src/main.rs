use anyhow::{bail, Context, Result};
use clap::Parser;
use fp_patterns::args::{Cli, Commands, ConfigAction};
use fp_patterns::config::{self, DetectorConfig};
use fp_patterns::pipeline;
use log::info;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::process;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    if let Err(e) = run() {
        log::error!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let overlay = cli.overlay()?;

    if let Some(command) = &cli.command {
        match command {
            Commands::Config { action } => match action {
                ConfigAction::Show => {
                    let resolved = config::resolve(cli.config.as_deref(), overlay)?;
                    print!("{}", resolved.config.to_kdl());
                }
                ConfigAction::Init { force } => {
                    let path = config::default_config_path()
                        .context("Could not determine the config directory")?;
                    if path.exists() && !force {
                        bail!(
                            "{} already exists, use --force to overwrite it",
                            path.display()
                        );
                    }
                    if let Some(dir) = path.parent() {
                        std::fs::create_dir_all(dir)
                            .with_context(|| format!("Failed to create {}", dir.display()))?;
                    }
                    std::fs::write(&path, DetectorConfig::default().to_kdl())
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Wrote default configuration to {}", path.display());
                }
                ConfigAction::Path => {
                    let path = config::default_config_path()
                        .context("Could not determine the config directory")?;
                    println!("{}", path.display());
                }
            },
        }
        return Ok(());
    }

    let resolved = config::resolve(cli.config.as_deref(), overlay)?;
    match &resolved.file {
        Some(path) => info!("Configuration: {:?} (file {})", resolved.config, path.display()),
        None => info!("Configuration: {:?}", resolved.config),
    }

    let input: Box<dyn Read> = match &cli.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open input {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };
    let output: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(
            File::create(path)
                .with_context(|| format!("Failed to create output {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };

    pipeline::run(input, BufWriter::new(output), &resolved.config, cli.policy())?;
    Ok(())
}
