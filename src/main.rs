//! regent: agentic regression testing with a human in the loop.
//!
//! Quick start:
//!   regent init                  # write .regent.yaml
//!   regent plan --app shop ...   # plan tests, ask for approval
//!   regent approvals list        # decide what is waiting
//!
//! For more info: regent --help

use clap::{Parser, Subcommand};
use colored::Colorize;
use regent::cli;
use regent::cli::approvals::ApprovalsCommand;
use regent::cli::desk::DeskCommand;
use regent::cli::execute::ExecuteOptions;
use regent::cli::feedback::FeedbackCommand;
use regent::cli::plan::PlanOptions;
use regent::cli::runs::RunsCommand;
use regent::config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Agentic regression testing with human approval checkpoints.
#[derive(Parser)]
#[command(
    name = "regent",
    version,
    about = "Plan and run regression tests with a human in the loop",
    long_about = "regent plans test cases for a feature, asks a human to approve\n\
                  them, runs them and collects feedback on the results.\n\n\
                  Quick start:\n  \
                  regent init               # write a settings file\n  \
                  regent plan --app <name>  # plan tests for a feature\n  \
                  regent approvals list     # decide pending approvals"
)]
struct Cli {
    /// Settings file (default: nearest .regent.yaml)
    #[arg(long, global = true, env = "REGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a settings file from a template
    Init {
        #[arg(short, long, default_value = "review-plan")]
        template: String,
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate and lint a settings file
    Check {
        /// Path to the settings file (default: nearest .regent.yaml)
        path: Option<PathBuf>,
    },

    /// List and decide approvals
    Approvals {
        #[command(subcommand)]
        command: ApprovalsCommand,
    },

    /// Record and inspect feedback
    Feedback {
        #[command(subcommand)]
        command: FeedbackCommand,
    },

    /// Plan test cases for a feature
    Plan {
        #[arg(long, required_unless_present = "resume")]
        app: Option<String>,
        #[arg(long, required_unless_present = "resume")]
        feature: Option<String>,
        /// Markdown test plan to process
        #[arg(long)]
        plan_file: PathBuf,
        /// YAML knowledge base of similar tests and patterns
        #[arg(long)]
        knowledge: Option<PathBuf>,
        /// JSON discovery result for the application
        #[arg(long)]
        discovery: Option<PathBuf>,
        /// Ask for approval of the plan
        #[arg(long)]
        hitl: bool,
        /// Continue a run from its last checkpoint
        #[arg(long)]
        resume: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Browse planning runs
    Runs {
        #[command(subcommand)]
        command: RunsCommand,
    },

    /// Run test cases with the shell adapter
    Execute {
        /// YAML list of test cases
        #[arg(long)]
        cases: PathBuf,
        /// Working directory for the commands
        #[arg(long)]
        workspace: Option<PathBuf>,
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long)]
        sequential: bool,
        /// Ask for feedback on failed tests
        #[arg(long)]
        feedback: bool,
        #[arg(long)]
        json: bool,
    },

    /// Serve approval decisions over a Unix socket
    Desk {
        #[command(subcommand)]
        command: DeskCommand,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let directive = if cli.verbose { "regent=info" } else { "regent=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!();
        eprintln!("  {} {}", "✗".red().bold(), e);
        for cause in e.chain().skip(1) {
            eprintln!("  {} {}", "caused by:".dimmed(), cause);
        }
        eprintln!();
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let command = match cli.command {
        Some(Commands::Init {
            template,
            output,
            force,
        }) => return cli::init::run_init(Some(&template), output.as_deref(), force),
        Some(Commands::Check { path }) => {
            return cli::check::run_check(path.as_deref().or(cli.config.as_deref()))
        }
        other => other,
    };

    let (settings, source) = config::load_settings(cli.config.as_deref())?;

    match command {
        None => cli::status::show_status(&settings, source.as_deref()),
        Some(Commands::Approvals { command }) => cli::approvals::run_approvals(&settings, command),
        Some(Commands::Feedback { command }) => cli::feedback::run_feedback(&settings, command),
        Some(Commands::Plan {
            app,
            feature,
            plan_file,
            knowledge,
            discovery,
            hitl,
            resume,
            json,
        }) => {
            let options = PlanOptions {
                app,
                feature,
                plan_file,
                knowledge,
                discovery,
                hitl,
                resume,
                json,
            };
            cli::plan::run_plan(&settings, options).await
        }
        Some(Commands::Runs { command }) => cli::runs::run_runs(&settings, command),
        Some(Commands::Execute {
            cases,
            workspace,
            workers,
            sequential,
            feedback,
            json,
        }) => {
            let options = ExecuteOptions {
                cases,
                workspace,
                workers,
                sequential,
                feedback,
                json,
            };
            cli::execute::run_execute(&settings, options).await
        }
        Some(Commands::Desk { command }) => cli::desk::run_desk(&settings, command).await,
        // Handled before settings are loaded.
        Some(Commands::Init { .. }) | Some(Commands::Check { .. }) => Ok(()),
    }
}
