//! Command-line interface for dictapi
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Dictaphone control backend
#[derive(Parser, Debug)]
#[command(
    name = "dictapi",
    version,
    about = "Dictaphone control backend: reads transport commands from stdin"
)]
pub struct Cli {
    /// Subcommand to execute (default: interactive session)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Directory for new recordings
    #[arg(long, value_name = "DIR")]
    pub audio_dir: Option<PathBuf>,

    /// Append the transcript to this file instead of stdout
    #[arg(long, value_name = "PATH")]
    pub transcript: Option<PathBuf>,

    /// Write transcript lines without the timestamp prefix
    #[arg(long)]
    pub no_timestamps: bool,

    /// Transcript to replay with `open` before reading commands
    #[arg(value_name = "SCRIPT")]
    pub script: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that the configured external tools are installed
    Check,

    /// Print the effective configuration as TOML
    Config,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_command() {
        let cli = Cli::try_parse_from(["dictapi"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
        assert!(cli.audio_dir.is_none());
        assert!(cli.transcript.is_none());
        assert!(cli.script.is_none());
        assert!(!cli.no_timestamps);
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_parse_verbose_repeated_flags() {
        let cli = Cli::try_parse_from(["dictapi", "-v", "-v"]).unwrap();
        assert_eq!(cli.verbose, 2);
        let cli = Cli::try_parse_from(["dictapi", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_parse_session_options() {
        let cli = Cli::try_parse_from([
            "dictapi",
            "--audio-dir",
            "/tmp/takes",
            "--transcript",
            "/tmp/session.log",
            "--no-timestamps",
            "old-session.log",
        ])
        .unwrap();

        assert_eq!(cli.audio_dir, Some(PathBuf::from("/tmp/takes")));
        assert_eq!(cli.transcript, Some(PathBuf::from("/tmp/session.log")));
        assert!(cli.no_timestamps);
        assert_eq!(cli.script, Some(PathBuf::from("old-session.log")));
    }

    #[test]
    fn test_parse_check() {
        let cli = Cli::try_parse_from(["dictapi", "check"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Check)));
    }

    #[test]
    fn test_global_options_after_command() {
        let cli = Cli::try_parse_from(["dictapi", "check", "--config", "/tmp/config.toml", "-q"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/config.toml")));
        assert!(cli.quiet);
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["dictapi", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Completions { shell: Shell::Bash })
        ));
    }

    #[test]
    fn test_help_flag() {
        let err = Cli::try_parse_from(["dictapi", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
