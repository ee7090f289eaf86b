use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "steward")]
#[command(about = "Organizes files by confidence and risk, with rollback", long_about = None)]
pub struct Cli {
    /// Print machine-readable JSON instead of a summary
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Evaluate the configured paths without moving anything
    Plan,
    /// Evaluate and carry out auto/review actions
    Organize,
    /// Continue an interrupted or cancelled run
    Resume { run_id: i64 },
    /// Derive (and optionally apply) the rollback of a run
    Rollback {
        /// Defaults to the most recent run
        run_id: Option<i64>,
        /// Emit a POSIX shell script instead of JSON
        #[arg(long)]
        script: bool,
        /// Move files back now
        #[arg(long)]
        apply: bool,
    },
    /// List proposals still waiting for a decision
    Proposals {
        /// Defaults to the most recent run
        run_id: Option<i64>,
    },
    /// Accept or reject a proposal and learn from it
    Feedback {
        proposal_id: i64,
        #[arg(long, conflicts_with = "reject", required_unless_present = "reject")]
        accept: bool,
        #[arg(long)]
        reject: bool,
    },
    /// List duplicate groups under the configured paths; nothing is moved
    Duplicates,
    /// Browse past runs and their operation log
    History {
        /// Show the operation log of one run instead of the run list
        #[arg(long)]
        run: Option<i64>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Show the current weight vector
    Weights,
    /// Print configuration values
    PrintConfig,
}
