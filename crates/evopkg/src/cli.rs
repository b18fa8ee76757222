//! Command-line arguments

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use evopkg_pkg::BackendKind;

#[derive(Parser, Debug)]
#[command(name = "evopkg", version)]
#[command(about = "One package manager grammar for every backend", long_about = None)]
pub struct Cli {
    /// Configuration file (overrides the default lookup)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Render results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the package managers found on this host
    Detect,

    /// Run a command typed in any package manager's grammar
    Run(RunArgs),

    /// Compare packages across package managers
    Compare(CompareArgs),

    /// Show which package managers carry the packages
    Locate(LocateArgs),

    /// Manage command aliases
    #[command(subcommand)]
    Alias(AliasCommand),

    /// Entry point for installed alias shims
    #[command(hide = true)]
    Shim {
        /// Alias the shim was installed as
        name: String,
        /// Arguments the shim received
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Grammar the command is typed in (defaults to the native one)
    #[arg(short, long, value_parser = parse_backend)]
    pub syntax: Option<BackendKind>,

    /// Package manager that runs the command (defaults to automatic choice)
    #[arg(short, long, value_parser = parse_backend)]
    pub backend: Option<BackendKind>,

    /// Print the translated command instead of running it
    #[arg(long)]
    pub dry_run: bool,

    /// Verb followed by its arguments, e.g. `-S vim` or `install vim`
    #[arg(
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub argv: Vec<String>,
}

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Limit the comparison to these package managers
    #[arg(short, long = "backend", value_parser = parse_backend)]
    pub backends: Vec<BackendKind>,

    /// Ignore cached answers
    #[arg(long)]
    pub refresh: bool,

    /// Packages to compare
    #[arg(required = true)]
    pub packages: Vec<String>,
}

#[derive(Args, Debug)]
pub struct LocateArgs {
    /// Limit the search to these package managers
    #[arg(short, long = "backend", value_parser = parse_backend)]
    pub backends: Vec<BackendKind>,

    /// Packages to locate
    #[arg(required = true)]
    pub packages: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum AliasCommand {
    /// Create an alias that accepts another package manager's grammar
    Create {
        name: String,
        /// Grammar the alias accepts
        #[arg(value_parser = parse_backend)]
        syntax: BackendKind,
    },
    /// Remove an alias (succeeds if it does not exist)
    Remove { name: String },
    /// List aliases
    List,
    /// Show one alias
    Show { name: String },
    /// Install a simulator named after a package manager that is not installed
    Simulate {
        #[arg(value_parser = parse_backend)]
        syntax: BackendKind,
    },
}

fn parse_backend(value: &str) -> Result<BackendKind, String> {
    value.parse().map_err(|e: evopkg_pkg::PackageError| e.to_string())
}
