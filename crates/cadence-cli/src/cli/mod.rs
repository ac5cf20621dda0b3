//! CLI command definitions for the `cadence` binary.
//!
//! Uses clap derive macros for argument parsing. `cadence run` drives a
//! workflow; `cadence sessions ...` inspects and maintains stored runs.

pub mod input;
pub mod run;
pub mod session;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Run multi-step AI workflows from YAML.
#[derive(Parser)]
#[command(name = "cadence", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans to stdout through OpenTelemetry.
    #[arg(long, global = true, hide = true, env = "CADENCE_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a workflow, or resume a previous session.
    Run {
        /// Path to the workflow YAML file.
        workflow: PathBuf,

        /// Resume from a step: `STEP` (latest session) or `TIMESTAMP:STEP`.
        #[arg(long, value_name = "[TS:]STEP")]
        replay: Option<String>,

        /// Stop before this step runs.
        #[arg(long, value_name = "STEP")]
        pause: Option<String>,

        /// Resource to bind as the workflow target.
        #[arg(long)]
        target: Option<String>,

        /// Never prompt; input steps without a default put the session in
        /// the waiting state.
        #[arg(long)]
        non_interactive: bool,
    },

    /// Inspect and maintain stored sessions.
    #[command(alias = "session")]
    Sessions {
        #[command(subcommand)]
        action: SessionsCommand,
    },
}

#[derive(Subcommand)]
pub enum SessionsCommand {
    /// List sessions, newest first.
    #[command(alias = "ls")]
    List {
        /// Filter by status (running, waiting, completed, failed).
        #[arg(long)]
        status: Option<String>,

        /// Filter by workflow name.
        #[arg(long)]
        workflow: Option<String>,

        /// Maximum number of sessions to show.
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Delete sessions created more than N days ago.
    Cleanup {
        #[arg(long, value_name = "N")]
        older_than_days: u32,
    },

    /// Deliver an external event to a session (e.g. an input answer).
    Event {
        /// Session key, `<workflow_key>/<timestamp>`.
        session: String,

        /// Event name; input steps match on their name.
        name: String,

        /// JSON payload (a bare word is stored as a string).
        #[arg(long)]
        payload: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_resume_options() {
        let cli = Cli::try_parse_from([
            "cadence", "run", "review/workflow.yml", "--replay", "20250301_101500_000:lint", "--pause",
            "summarize", "--target", "src/lib.rs", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run { workflow, replay, pause, target, non_interactive } => {
                assert_eq!(workflow, PathBuf::from("review/workflow.yml"));
                assert_eq!(replay.as_deref(), Some("20250301_101500_000:lint"));
                assert_eq!(pause.as_deref(), Some("summarize"));
                assert_eq!(target.as_deref(), Some("src/lib.rs"));
                assert!(!non_interactive);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn sessions_subcommands_parse() {
        let cli = Cli::try_parse_from(["cadence", "sessions", "cleanup", "--older-than-days", "7"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Sessions { action: SessionsCommand::Cleanup { older_than_days: 7 } }
        ));

        let cli = Cli::try_parse_from([
            "cadence", "sessions", "event", "review_0123456789ab/20250301_101500_000", "approve", "--payload",
            "true", "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Sessions { action: SessionsCommand::Event { session, name, payload } } => {
                assert_eq!(session, "review_0123456789ab/20250301_101500_000");
                assert_eq!(name, "approve");
                assert_eq!(payload.as_deref(), Some("true"));
            }
            _ => panic!("expected sessions event"),
        }
    }
}
