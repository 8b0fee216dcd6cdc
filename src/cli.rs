//! CLI definitions for SocialHands.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// SocialHands CLI.
#[derive(Parser)]
#[command(name = "socialhands")]
#[command(about = "Autonomous social media agent")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "config/default.toml",
        env = "SOCIALHANDS_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run API, scheduler and worker in one process (default)
    Run {
        /// Override the configured API host
        #[arg(long)]
        host: Option<String>,

        /// Override the configured API port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run the API and the scheduler without a worker
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },

    /// Run a worker that claims and executes jobs
    Worker {
        /// Worker identity reported in heartbeats
        #[arg(long)]
        id: Option<String>,
    },

    /// Queue a job of a registered type
    Enqueue {
        /// Job type, e.g. twitter-post
        job_type: String,

        /// JSON payload
        #[arg(long, default_value = "{}")]
        data: String,

        #[arg(long, default_value_t = 0)]
        priority: i32,
    },

    /// Dispatcher control
    Dispatcher {
        #[command(subcommand)]
        action: DispatcherAction,
    },

    /// Print the control-plane status as JSON
    Status,

    /// Print the plan for a date
    Schedule {
        /// Date (YYYY-MM-DD), default today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[derive(Subcommand)]
pub(crate) enum DispatcherAction {
    /// Allow workers to claim jobs
    Start,
    /// Stop new claims
    Stop,
    /// Show whether claims are allowed
    Status,
}

/// Which long-running components a process hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Roles {
    pub api: bool,
    pub scheduler: bool,
    pub worker: bool,
}

impl Roles {
    pub const ALL: Roles = Roles {
        api: true,
        scheduler: true,
        worker: true,
    };
    pub const SERVE: Roles = Roles {
        api: true,
        scheduler: true,
        worker: false,
    };
    pub const WORKER: Roles = Roles {
        api: false,
        scheduler: false,
        worker: true,
    };
}
