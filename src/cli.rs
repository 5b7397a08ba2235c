//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for the runtime agent.

use clap::{Parser, Subcommand};

/// Runtime Agent - manages pods and volume claims on remote clusters
///
/// Reads a runtimes document naming each remote cluster, connects to a
/// cluster the first time a task targets it, and executes pod and volume
/// claim tasks there.
#[derive(Parser, Debug)]
#[command(name = "runtime-agent")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the agent
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Display version information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Inspect configured runtimes
    Runtimes {
        #[command(subcommand)]
        subcommand: RuntimesSubcommand,
    },

    /// Check the agent's own cluster and report runtime states
    Status {
        /// Path to configuration file
        #[arg(short, long, env = "RUNTIME_AGENT_CONFIG")]
        config: Option<String>,
    },

    /// Execute task envelopes (JSON object or array of objects)
    Exec {
        /// Path to configuration file
        #[arg(short, long, env = "RUNTIME_AGENT_CONFIG")]
        config: Option<String>,

        /// File containing the envelope; "-" or absent reads stdin
        #[arg(short, long)]
        file: Option<String>,
    },
}

/// Runtimes subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum RuntimesSubcommand {
    /// List runtimes from the runtimes document (no network access)
    List {
        /// Path to configuration file
        #[arg(short, long, env = "RUNTIME_AGENT_CONFIG")]
        config: Option<String>,
    },

    /// Connect to one runtime and report its API server
    Check {
        /// Runtime name
        name: String,

        /// Path to configuration file
        #[arg(short, long, env = "RUNTIME_AGENT_CONFIG")]
        config: Option<String>,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}
