//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// tfkit - Terraform lifecycle management for declarative deployments
#[derive(Parser, Debug)]
#[command(name = "tfkit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the deployment file (defaults to ./tfkit.yaml)
    #[arg(short, long, global = true, env = "TFKIT_CONFIG")]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the deployment file and every resource_config in it
    Validate,

    /// Install the Terraform executable and plugins for an instance
    Install(InstanceArgs),

    /// Remove an installed executable, its plugins and storage
    Uninstall(InstanceArgs),

    /// Point a module instance at the driver installed by another instance
    Link(LinkArgs),

    /// Run init, plan and apply and record the resulting resources
    Apply(InstanceArgs),

    /// Destroy the resources of a module instance
    Destroy(InstanceArgs),

    /// Refresh and record the current resources
    StatePull(InstanceArgs),

    /// Plan against the current state and record drifted resources
    CheckDrift(InstanceArgs),

    /// Apply a module instance from a new template source
    Reload(ReloadArgs),

    /// Refresh every selected module instance
    Refresh(FilterArgs),

    /// Reload every selected module instance
    ReloadAll(ReloadAllArgs),

    /// Show recorded resources and drift of an instance
    Show(ShowArgs),
}

#[derive(Args, Debug)]
pub struct InstanceArgs {
    /// Node instance id
    pub instance: String,
}

#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Module instance that uses the driver
    #[arg(long)]
    pub source: String,

    /// Instance that installed the driver
    #[arg(long)]
    pub target: String,
}

#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Path or URL of the new template
    #[arg(long)]
    pub source: Option<String>,

    /// Username for a protected template URL
    #[arg(long, requires = "source")]
    pub username: Option<String>,

    /// Password for a protected template URL
    #[arg(long, requires = "username")]
    pub password: Option<String>,

    /// Destroy the resources of the previous template first
    #[arg(long)]
    pub destroy_previous: bool,
}

#[derive(Args, Debug)]
pub struct ReloadArgs {
    /// Node instance id
    pub instance: String,

    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only instances of these nodes
    #[arg(long = "node-id")]
    pub node_ids: Vec<String>,

    /// Only these instances
    #[arg(long = "instance-id")]
    pub instance_ids: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ReloadAllArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Node instance id
    pub instance: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
