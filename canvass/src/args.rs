use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Run surveys against populations of agents, scenarios and models.
#[derive(Debug, Parser)]
#[command(name = "canvass", version, about)]
pub struct Args {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "canvass.toml")]
    pub config: PathBuf,

    /// Log level filter. Overrides CANVASS_LOG.
    #[arg(long, global = true, env = "CANVASS_LOG", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Execute a survey job. Re-running an interrupted job resumes from
    /// the cache.
    Run {
        /// Survey document (JSON).
        survey: PathBuf,

        /// Agents file: a JSON list of agents.
        #[arg(long)]
        agents: Option<PathBuf>,

        /// Scenarios file: a JSON list of scenarios.
        #[arg(long)]
        scenarios: Option<PathBuf>,

        /// Models as `service/model_name`. Repeatable. Defaults to the
        /// test model.
        #[arg(long = "model")]
        models: Vec<String>,

        /// Iterations per combination.
        #[arg(long, default_value_t = 1)]
        iterations: u32,

        /// Bypass cache lookups while still writing entries back.
        #[arg(long)]
        fresh: bool,

        /// Write the result rows to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Report how much of a job is already satisfied by the cache.
    Status,

    /// Validate a survey document and print a summary.
    Validate {
        /// Survey document (JSON).
        survey: PathBuf,
    },
}
