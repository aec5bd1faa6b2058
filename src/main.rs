//! Loam - a plugin-driven static site engine.

mod adapt;
mod build;
mod bundler;
mod cli;
mod compilation;
mod config;
mod graph;
mod logger;
mod pipeline;
mod plugins;
mod serve;

use anyhow::Result;
use build::build_site;
use clap::Parser;
use cli::{Cli, Commands};
use compilation::{Compilation, CompilationContext};
use config::SiteConfig;
use graph::build_graph;
use plugins::{registry::PluginRegistry, standard::standard_plugins};
use serve::serve_site;
use std::{path::Path, sync::Arc};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let sets = standard_plugins();
    PluginRegistry::validate(&sets)?;

    let context = CompilationContext::resolve(&config)?;
    let seed = Arc::new(Compilation::seed(context, config));
    let graph = build_graph(&sets, &seed)?;
    let compilation = Arc::new(seed.with_graph(graph));
    let registry = Arc::new(PluginRegistry::new(sets, &compilation)?);

    match &cli.command {
        Commands::Build { build_args } => build_site(&compilation, &registry, build_args.clean),
        Commands::Serve { .. } => serve_site(compilation, registry),
    }
}

/// Load and validate configuration from CLI arguments.
///
/// A missing config file is not an error; the engine runs on defaults so
/// a bare pages directory is already a working site.
fn load_config(cli: &Cli) -> Result<SiteConfig> {
    let root = cli.root.as_deref().unwrap_or(Path::new("./"));
    let config_path = root.join(&cli.config);

    let mut config = if config_path.exists() {
        SiteConfig::from_path(&config_path)?
    } else {
        SiteConfig::default()
    };
    config.update_with_cli(cli)?;
    config.validate()?;

    Ok(config)
}
