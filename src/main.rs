use anyhow::{Result, bail};
use clap::{CommandFactory, Parser};
use dictapi::cli::{Cli, Commands};
use dictapi::config::Config;
use dictapi::media::MediaTools;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    match cli.command {
        None => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(dir) = cli.audio_dir {
                config.audio.dir = dir;
            }
            if let Some(path) = cli.transcript {
                config.transcript.path = Some(path);
            }
            if cli.no_timestamps {
                config.transcript.timestamps = false;
            }
            tracing::info!(version = %dictapi::version_string(), "starting session");
            dictapi::app::run_session(config, cli.script.as_deref())?;
        }
        Some(Commands::Check) => {
            let config = load_config(cli.config.as_deref())?;
            check_tools(&config)?;
        }
        Some(Commands::Config) => {
            let config = load_config(cli.config.as_deref())?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "dictapi",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Logs go to stderr; stdout carries the transcript and command replies.
///
/// `RUST_LOG` takes precedence over `-q`/`-v`.
fn init_tracing(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose > 1)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/dictapi/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides())
}

fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let mut missing = 0;
    for (program, available) in MediaTools::check(&config.tools) {
        if available {
            println!("{}: {}", program, "✓ OK".green());
        } else {
            println!("{}: {}", program, "✗ NOT FOUND".red());
            missing += 1;
        }
    }

    if missing > 0 {
        bail!("{missing} tool(s) missing");
    }
    Ok(())
}
