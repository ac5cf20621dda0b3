//! Session management CLI commands: list, cleanup, event.

use anyhow::{Context, Result, bail};
use chrono::{Duration, Utc};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::Value;

use cadence_types::state::{Session, SessionEvent, SessionFilter, SessionStatus};

use crate::state::AppState;

/// List stored sessions, newest first.
///
/// # Examples
///
/// ```bash
/// cadence sessions list --status waiting
/// cadence sessions list --workflow review --json
/// ```
pub async fn list_sessions(
    state: &AppState,
    status: Option<&str>,
    workflow: Option<String>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let status = status
        .map(str::parse::<SessionStatus>)
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let filter = SessionFilter {
        status,
        workflow_name: workflow,
        older_than: None,
        limit: Some(limit),
    };

    let sessions = state
        .repository
        .list_sessions(&filter)
        .await
        .context("Failed to list sessions")?;

    if json {
        let out: Vec<Value> = sessions.iter().map(session_json).collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!();
        println!(
            "  {} No sessions found. Start one with: {}",
            style("i").blue().bold(),
            style("cadence run <workflow.yml>").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Workflow").fg(Color::White),
        Cell::new("Session").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Step").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);

    for session in &sessions {
        let status_cell = match session.status {
            SessionStatus::Running => Cell::new("running").fg(Color::Blue),
            SessionStatus::Waiting => Cell::new("waiting").fg(Color::Yellow),
            SessionStatus::Completed => Cell::new("completed").fg(Color::Green),
            SessionStatus::Failed => Cell::new("failed").fg(Color::Red),
        };

        table.add_row(vec![
            Cell::new(&session.workflow_name).fg(Color::Cyan),
            Cell::new(session.key()).fg(Color::White),
            status_cell,
            Cell::new(session.current_step.as_deref().unwrap_or("-")).fg(Color::DarkGrey),
            Cell::new(session.updated_at.format("%Y-%m-%d %H:%M").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} session{}",
        style(sessions.len()).bold(),
        if sessions.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}

fn session_json(session: &Session) -> Value {
    serde_json::json!({
        "key": session.key(),
        "workflow_name": session.workflow_name,
        "workflow_path": session.workflow_path,
        "timestamp": session.timestamp.as_str(),
        "status": session.status.as_str(),
        "current_step": session.current_step,
        "created_at": session.created_at.to_rfc3339(),
        "updated_at": session.updated_at.to_rfc3339(),
    })
}

/// Delete sessions created more than `days` days ago.
pub async fn cleanup_sessions(state: &AppState, days: u32, json: bool) -> Result<()> {
    let cutoff = Utc::now() - Duration::days(i64::from(days));
    let removed = state
        .repository
        .cleanup_sessions(cutoff)
        .await
        .context("Failed to clean up sessions")?;

    tracing::info!(removed, days, "cleaned up sessions");

    if json {
        let out = serde_json::json!({ "removed": removed, "older_than_days": days });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  {} Removed {} session{} older than {} day{}",
            style("*").green().bold(),
            style(removed).bold(),
            if removed == 1 { "" } else { "s" },
            days,
            if days == 1 { "" } else { "s" }
        );
        println!();
    }
    Ok(())
}

/// Parse an event payload: JSON when it parses, otherwise the raw string.
pub fn parse_payload(raw: Option<&str>) -> Value {
    match raw {
        None => Value::Null,
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
    }
}

/// Store an external event on a session.
pub async fn add_event(
    state: &AppState,
    session_key: &str,
    name: &str,
    payload: Option<&str>,
    json: bool,
) -> Result<()> {
    if !session_key.contains('/') {
        bail!("Session key '{session_key}' should look like <workflow_key>/<timestamp>");
    }
    let event = SessionEvent {
        name: name.to_string(),
        payload: parse_payload(payload),
        created_at: Utc::now(),
    };

    state
        .repository
        .add_event(session_key, &event)
        .await
        .with_context(|| format!("Failed to add event to session '{session_key}'"))?;

    if json {
        let out = serde_json::json!({
            "session": session_key,
            "name": event.name,
            "payload": event.payload,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  {} Event '{}' delivered to {}",
            style("*").green().bold(),
            style(name).cyan(),
            style(session_key).dim()
        );
        println!();
    }
    Ok(())
}
