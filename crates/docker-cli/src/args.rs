use std::ffi::OsString;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "docker")]
#[command(about = "A self-sufficient runtime for containers")]
#[command(version)]
pub struct Cli {
    /// Location of client config files (default: ~/.docker)
    #[arg(long, value_name = "DIR")]
    pub config: Option<PathBuf>,

    /// Name of the context to use to connect to the daemon
    #[arg(short = 'c', long)]
    pub context: Option<String>,

    /// Daemon socket to connect to
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Enable debug mode
    #[arg(short = 'D', long)]
    pub debug: bool,

    /// Set the logging level
    #[arg(short = 'l', long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error | Self::Fatal => "error",
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Display system-wide information
    Info {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: Format,
    },

    /// Manage Docker
    System {
        #[command(subcommand)]
        action: SystemAction,
    },

    /// Show the Docker version information
    Version,

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    #[command(external_subcommand)]
    External(Vec<OsString>),
}

#[derive(Subcommand)]
pub enum SystemAction {
    /// Display system-wide information
    Info {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: Format,
    },
}

/// Global flags needed before full argument parsing (plugin discovery and
/// logging both run ahead of it)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub debug: bool,
    pub log_level: LogLevel,
}

impl GlobalOptions {
    /// Lenient parse of the top-level flags; anything clap rejects falls back
    /// to defaults so the full parse can report it later
    pub fn scan(args: &[OsString]) -> Self {
        let lenient = Cli::command()
            .ignore_errors(true)
            .disable_help_flag(true)
            .disable_version_flag(true)
            .disable_help_subcommand(true);

        let Ok(matches) = lenient.try_get_matches_from(args) else {
            return Self::default();
        };

        Self {
            config: matches.try_get_one::<PathBuf>("config").ok().flatten().cloned(),
            debug: matches
                .try_get_one::<bool>("debug")
                .ok()
                .flatten()
                .copied()
                .unwrap_or_default(),
            log_level: matches
                .try_get_one::<LogLevel>("log_level")
                .ok()
                .flatten()
                .copied()
                .unwrap_or_default(),
        }
    }
}
