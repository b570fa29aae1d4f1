//! tfkit CLI - Terraform lifecycle management
//!
//! Loads a deployment file, builds operation contexts backed by JSON runtime
//! property files and dispatches lifecycle operations.

mod cli;
mod commands;
mod host;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider (required for rustls 0.23+)
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Validate => commands::validate::run(config),
        Commands::Install(args) => commands::driver::install(args, config).await,
        Commands::Uninstall(args) => commands::driver::uninstall(args, config).await,
        Commands::Link(args) => commands::driver::link(args, config).await,
        Commands::Apply(args) => commands::module::apply(args, config).await,
        Commands::Destroy(args) => commands::module::destroy(args, config).await,
        Commands::StatePull(args) => commands::module::state_pull(args, config).await,
        Commands::CheckDrift(args) => commands::module::check_drift(args, config).await,
        Commands::Reload(args) => commands::module::reload(args, config).await,
        Commands::Refresh(args) => commands::workflow::refresh(args, config).await,
        Commands::ReloadAll(args) => commands::workflow::reload_all(args, config).await,
        Commands::Show(args) => commands::show::run(args, config),
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            // Driver output is logged at info
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
