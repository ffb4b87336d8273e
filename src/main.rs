use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use stagegate::commands::{commit, evaluate, graph, history, init, stage};

#[derive(Parser)]
#[command(name = "stagegate")]
#[command(about = "Stage-gate workflow transition engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Workspace directory
    #[arg(long, global = true, default_value = ".gate")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a workspace from a workflow template
    Init {
        /// Path to the template YAML file
        template: PathBuf,
    },

    /// Show the stage graph with statuses and guarded edges
    Graph,

    /// Start the project (first stage enters InProgress)
    Start,

    /// Evaluate the gate for a transition
    Evaluate {
        /// From-stage id (default: current stage)
        #[arg(long)]
        from: Option<String>,

        /// To-stage id (default: next stage)
        #[arg(long)]
        to: Option<String>,

        /// Re-run a single condition instead of the whole set
        #[arg(long)]
        condition: Option<String>,
    },

    /// Evaluate and, if admissible, commit a transition
    Commit {
        /// From-stage id (default: current stage)
        #[arg(long)]
        from: Option<String>,

        /// To-stage id (default: next stage)
        #[arg(long)]
        to: Option<String>,

        /// Notes recorded on the transition
        #[arg(long)]
        notes: Option<String>,
    },

    /// Mark a stage stalled
    Block {
        /// Stage id
        stage: String,
    },

    /// Recover a stalled stage
    Unblock {
        /// Stage id
        stage: String,
    },

    /// Move one stage backward under explicit authorization
    Regress {
        /// Who authorized the regression
        #[arg(long)]
        authorized_by: String,

        /// Why the regression is needed
        #[arg(long)]
        reason: String,

        /// Notes recorded on the transition
        #[arg(long)]
        notes: Option<String>,
    },

    /// Show the transition history
    History,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { template } => init::init(&template, &cli.dir),
        Commands::Graph => graph::show(&cli.dir),
        Commands::Start => stage::start(&cli.dir),
        Commands::Evaluate {
            from,
            to,
            condition,
        } => evaluate::evaluate(&cli.dir, from, to, condition),
        Commands::Commit { from, to, notes } => commit::commit(&cli.dir, from, to, notes),
        Commands::Block { stage } => stage::block(&cli.dir, &stage),
        Commands::Unblock { stage } => stage::unblock(&cli.dir, &stage),
        Commands::Regress {
            authorized_by,
            reason,
            notes,
        } => stage::regress(&cli.dir, authorized_by, reason, notes),
        Commands::History => history::show(&cli.dir),
    }
}
