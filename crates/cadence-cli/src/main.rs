//! Cadence CLI entry point.
//!
//! Binary name: `cadence`
//!
//! Parses CLI arguments, initializes tracing and the engine's collaborators,
//! then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;

use cadence_observe::{TracingOptions, directive_for_verbosity, init_tracing, shutdown_tracing};

use cli::run::RunArgs;
use cli::{Cli, Commands, SessionsCommand};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let tracing = TracingOptions {
        default_directive: directive_for_verbosity(cli.verbose, cli.quiet).to_string(),
        otel: cli.otel,
        ..TracingOptions::default()
    };
    if let Err(e) = init_tracing(&tracing) {
        eprintln!("Warning: tracing setup failed: {e}");
    }

    let result = dispatch(cli).await;
    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init().await?;

    match cli.command {
        Commands::Run {
            workflow,
            replay,
            pause,
            target,
            non_interactive,
        } => {
            let args = RunArgs {
                replay,
                pause,
                target,
                non_interactive,
            };
            cli::run::run_workflow(&state, &workflow, args, cli.json, cli.quiet).await?;
        }

        Commands::Sessions { action } => match action {
            SessionsCommand::List {
                status,
                workflow,
                limit,
            } => {
                cli::session::list_sessions(&state, status.as_deref(), workflow, limit, cli.json).await?;
            }
            SessionsCommand::Cleanup { older_than_days } => {
                cli::session::cleanup_sessions(&state, older_than_days, cli.json).await?;
            }
            SessionsCommand::Event {
                session,
                name,
                payload,
            } => {
                cli::session::add_event(&state, &session, &name, payload.as_deref(), cli.json).await?;
            }
        },
    }

    Ok(())
}
