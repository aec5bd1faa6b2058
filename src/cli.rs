//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Loam static site engine CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Project root directory (default: current directory)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Output directory path (relative to project root)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file name (default: loam.toml)
    #[arg(short = 'C', long, default_value = "loam.toml")]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Build arguments for the Build command
#[derive(clap::Args, Debug, Clone)]
pub struct BuildArgs {
    /// Clean output directory completely before building
    #[arg(long)]
    pub clean: bool,

    /// Pre-render server-routed pages into static HTML
    #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub prerender: Option<bool>,

    /// Override the optimization mode (none, default, inline, static)
    #[arg(long)]
    pub optimization: Option<String>,

    /// Override base path the site is mounted under.
    ///
    /// Useful for CI/CD deployments where the production URL differs from local
    /// development. This avoids modifying loam.toml, keeping the source file clean.
    ///
    /// Example: deploying to a GitHub Pages project site:
    ///   loam build --base-path "/my-project"
    #[arg(long = "base-path")]
    pub base_path: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build the site into the output directory
    Build {
        #[command(flatten)]
        build_args: BuildArgs,
    },

    /// Serve the site from source for local development
    Serve {
        /// Interface to bind on
        #[arg(long)]
        host: Option<String>,

        /// The port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[allow(unused)]
impl Cli {
    pub const fn is_build(&self) -> bool {
        matches!(self.command, Commands::Build { .. })
    }
    pub const fn is_serve(&self) -> bool {
        matches!(self.command, Commands::Serve { .. })
    }
}
