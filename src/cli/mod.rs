//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to the task
//! runner.

mod tasks;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::mode::Mode;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// Assetpipe - build images, icons, styles and scripts; serve with live reload
#[derive(Parser, Debug)]
#[command(name = "assetpipe")]
#[command(about = "Assetpipe - front-end asset pipeline with a live-reload dev server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: assetpipe.toml found walking up from the current directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the source directory
    #[arg(long, global = true, value_name = "DIR")]
    pub src: Option<PathBuf>,

    /// Override the output directory
    #[arg(long, global = true, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Production build: minify, add .min suffixes, no source maps (default: from NODE_ENV)
    #[arg(long, global = true, conflicts_with = "development")]
    pub production: bool,

    /// Development build: source maps, no minification (default: from NODE_ENV)
    #[arg(long, global = true)]
    pub development: bool,

    /// More log output (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Mode from the flags, falling back to `NODE_ENV`.
    pub fn mode(&self) -> Mode {
        if self.production {
            Mode::Production
        } else if self.development {
            Mode::Development
        } else {
            Mode::from_env()
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Recompress every image into the images output directory
    #[command(alias = "minImage")]
    MinifyImages,

    /// Generate favicon-{W}x{H}.png for every configured size
    #[command(alias = "icon")]
    BuildIcons,

    /// Compile, prefix and (in production) minify the stylesheet
    Styles,

    /// Transpile and (in production) minify scripts
    Scripts,

    /// Lint scripts, writing fixes back; fails on remaining errors
    Lint,

    /// Build styles and scripts, then serve the output with live reload
    Serve {
        /// Port to listen on (0 picks a free port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List available tasks
    Tasks,
}

impl Commands {
    /// Registry name of the task this command runs.
    pub fn task_name(&self) -> Option<&'static str> {
        match self {
            Commands::MinifyImages => Some("minify-images"),
            Commands::BuildIcons => Some("build-icons"),
            Commands::Styles => Some("styles"),
            Commands::Scripts => Some("scripts"),
            Commands::Lint => Some("lint"),
            Commands::Serve { .. } => Some("serve"),
            Commands::Tasks => None,
        }
    }
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    crate::logging::init_logging(cli.verbose);
    tasks::run_cli(&cli)
}
