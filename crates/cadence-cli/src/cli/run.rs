//! `cadence run`: execute or resume a workflow.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;
use tokio::sync::broadcast;

use cadence_core::workflow::executor::{ExecutionOutcome, RunReport, WorkflowExecutor};
use cadence_infra::identity::load_workflow;
use cadence_types::event::WorkflowEvent;

use super::input::TerminalInput;
use crate::state::AppState;

pub struct RunArgs {
    pub replay: Option<String>,
    pub pause: Option<String>,
    pub target: Option<String>,
    pub non_interactive: bool,
}

/// Load the workflow at `path`, run it and print the result. A paused or
/// waiting run is not an error.
pub async fn run_workflow(state: &AppState, path: &Path, args: RunArgs, json: bool, quiet: bool) -> Result<()> {
    let workflow = load_workflow(path, args.target)
        .with_context(|| format!("Failed to load workflow {}", path.display()))?;

    let mut builder = WorkflowExecutor::builder(workflow, state.repository.clone(), state.completion.clone())
        .commands(state.commands.clone())
        .agent(state.agent.clone())
        .input(Arc::new(TerminalInput::new(!args.non_interactive && !json)))
        .pause_at(args.pause);
    if let Some(model) = &state.config.default_model {
        builder = builder.default_model(model.clone());
    }
    let executor = builder.build();

    let progress = (!json && !quiet).then(|| tokio::spawn(print_progress(executor.subscribe())));

    let result = executor.run(args.replay.as_deref()).await;

    // Dropping the executor closes the bus, which ends the progress task.
    drop(executor);
    if let Some(handle) = progress {
        handle.await.ok();
    }

    let report = result?;
    if json {
        print_json(&report)?;
    } else {
        print_report(&report, quiet);
    }
    Ok(())
}

async fn print_progress(mut events: broadcast::Receiver<WorkflowEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "progress display fell behind");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            WorkflowEvent::WorkflowStarted { workflow, session, resumed_from } => {
                eprintln!();
                match resumed_from {
                    Some(step) => eprintln!(
                        "  {} Resuming '{}' at {}",
                        style("*").cyan().bold(),
                        style(&workflow).cyan(),
                        style(&step).bold()
                    ),
                    None => eprintln!("  {} Running '{}'", style("*").cyan().bold(), style(&workflow).cyan()),
                }
                eprintln!("  {}", style(format!("session {session}")).dim());
                eprintln!();
            }
            WorkflowEvent::StepStarted { step, kind } => {
                eprintln!("  {} {} {}", style(">").blue(), step, style(format!("({kind})")).dim());
            }
            WorkflowEvent::StepRetry { step, attempt, delay_ms, error } => {
                eprintln!(
                    "    {} {} attempt {} failed, retrying in {}ms: {}",
                    style("!").yellow(),
                    step,
                    attempt,
                    delay_ms,
                    style(error).dim()
                );
            }
            WorkflowEvent::StepCompleted { step, attempts, duration_ms } => {
                let retries = if attempts > 1 { format!(", {attempts} attempts") } else { String::new() };
                eprintln!(
                    "  {} {} {}",
                    style("✓").green(),
                    step,
                    style(format!("({duration_ms}ms{retries})")).dim()
                );
            }
            WorkflowEvent::StepFailed { step, attempts, error, .. } => {
                eprintln!(
                    "  {} {} failed after {} attempt{}: {}",
                    style("✗").red(),
                    step,
                    attempts,
                    if attempts == 1 { "" } else { "s" },
                    error
                );
            }
            WorkflowEvent::WorkflowCompleted { .. }
            | WorkflowEvent::WorkflowFailed { .. }
            | WorkflowEvent::WorkflowPaused { .. } => {}
        }
    }
}

fn print_report(report: &RunReport, quiet: bool) {
    if !report.final_output.trim().is_empty() {
        println!("{}", report.final_output.trim_end());
    }
    if quiet {
        return;
    }

    let session = report.session.key();
    eprintln!();
    match &report.outcome {
        ExecutionOutcome::Completed => eprintln!(
            "  {} Completed in {:.1}s",
            style("✓").green().bold(),
            report.duration.as_secs_f64()
        ),
        ExecutionOutcome::Paused { step, resume_at } => {
            eprintln!("  {} Paused before '{}'", style("||").yellow().bold(), style(step).bold());
            eprintln!(
                "  Resume with: {}",
                style(format!("cadence run <workflow> --replay {}:{resume_at}", report.session.timestamp)).yellow()
            );
        }
        ExecutionOutcome::Waiting { step, resume_at } => {
            eprintln!("  {} '{}' is waiting for input", style("?").yellow().bold(), style(step).bold());
            eprintln!(
                "  Answer with: {}",
                style(format!("cadence sessions event {session} {step} --payload <JSON>")).yellow()
            );
            eprintln!(
                "  Then resume: {}",
                style(format!("cadence run <workflow> --replay {}:{resume_at}", report.session.timestamp)).yellow()
            );
        }
    }
    eprintln!("  {}", style(format!("session {session}")).dim());
    eprintln!();
}

fn outcome_json(outcome: &ExecutionOutcome) -> serde_json::Value {
    match outcome {
        ExecutionOutcome::Completed => serde_json::json!({ "status": "completed" }),
        ExecutionOutcome::Paused { step, resume_at } => {
            serde_json::json!({ "status": "paused", "step": step, "resume_at": resume_at })
        }
        ExecutionOutcome::Waiting { step, resume_at } => {
            serde_json::json!({ "status": "waiting", "step": step, "resume_at": resume_at })
        }
    }
}

fn print_json(report: &RunReport) -> Result<()> {
    let out = serde_json::json!({
        "session": report.session.key(),
        "outcome": outcome_json(&report.outcome),
        "output": report.output,
        "final_output": report.final_output,
        "duration_ms": report.duration.as_millis() as u64,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_status_and_step() {
        assert_eq!(outcome_json(&ExecutionOutcome::Completed)["status"], "completed");

        let paused = outcome_json(&ExecutionOutcome::Paused {
            step: "deploy".into(),
            resume_at: "deploy".into(),
        });
        assert_eq!(paused["status"], "paused");
        assert_eq!(paused["step"], "deploy");

        let waiting = outcome_json(&ExecutionOutcome::Waiting {
            step: "approve".into(),
            resume_at: "if_ready".into(),
        });
        assert_eq!(waiting["status"], "waiting");
        assert_eq!(waiting["step"], "approve");
        assert_eq!(waiting["resume_at"], "if_ready");
    }
}
