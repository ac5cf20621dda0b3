//! Workflow memory: transcript, step outputs and rendered output fragments.
//!
//! `WorkflowMemory` is the mutable state that flows through a run. It is
//! shared between the coordinator and parallel workers as [`SharedMemory`];
//! every mutation takes the write lock for the duration of a single insert,
//! so concurrent siblings writing distinct keys never conflict.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::RwLock;

use cadence_types::llm::Message;
use cadence_types::state::ExecutionSnapshot;

/// Memory handle shared by every step of a run.
pub type SharedMemory = Arc<RwLock<WorkflowMemory>>;

/// Mutable execution state accumulated across a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMemory {
    /// Role-tagged conversation with the completion backend.
    pub transcript: Vec<Message>,
    /// Step results keyed by step name (or label), in execution order.
    pub output: Map<String, Value>,
    /// Rendered fragments printed at the end of the run.
    pub final_output: Vec<String>,
    /// Per-step key/value annotations.
    pub metadata: Map<String, Value>,
}

impl WorkflowMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap in the shared handle used by the engine.
    pub fn into_shared(self) -> SharedMemory {
        Arc::new(RwLock::new(self))
    }

    /// Record a step result. A key seen before keeps its original position.
    pub fn record_output(&mut self, key: &str, value: Value) {
        self.output.insert(key.to_string(), value);
    }

    pub fn get_output(&self, key: &str) -> Option<&Value> {
        self.output.get(key)
    }

    /// Attach a metadata entry to a step.
    pub fn set_metadata(&mut self, step: &str, key: &str, value: Value) {
        let entry = self
            .metadata
            .entry(step.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = entry {
            map.insert(key.to_string(), value);
        }
    }

    /// Immutable copy of the current state for persistence.
    pub fn snapshot(&self, step_name: &str, sequence_order: usize) -> ExecutionSnapshot {
        ExecutionSnapshot {
            step_name: step_name.to_string(),
            sequence_order,
            transcript: self.transcript.clone(),
            output: self.output.clone(),
            final_output: self.final_output.clone(),
            metadata: self.metadata.clone(),
            created_at: Utc::now(),
        }
    }

    /// Rebuild memory from a persisted snapshot.
    pub fn from_snapshot(snapshot: &ExecutionSnapshot) -> Self {
        Self {
            transcript: snapshot.transcript.clone(),
            output: snapshot.output.clone(),
            final_output: snapshot.final_output.clone(),
            metadata: snapshot.metadata.clone(),
        }
    }

    /// Final output joined for display.
    pub fn rendered_final_output(&self) -> String {
        self.final_output.join("\n\n")
    }

    /// Build the JSON object expressions evaluate against.
    ///
    /// Shape:
    /// ```json
    /// {
    ///   "output": { "<step>": <value>, ... },
    ///   "metadata": { ... },
    ///   "final_output": "...",
    ///   "variables": { ... },
    ///   "workflow": { "name": "...", "target": "...", "session": "..." },
    ///   "<loop variable>": <value>
    /// }
    /// ```
    pub fn to_expression_context(&self, variables: &Map<String, Value>, workflow: &Value) -> Value {
        let mut scope = Map::new();
        scope.insert("output".into(), Value::Object(self.output.clone()));
        scope.insert("metadata".into(), Value::Object(self.metadata.clone()));
        scope.insert("final_output".into(), json!(self.rendered_final_output()));
        scope.insert("variables".into(), Value::Object(variables.clone()));
        scope.insert("workflow".into(), workflow.clone());
        for (name, value) in variables {
            if !scope.contains_key(name) {
                scope.insert(name.clone(), value.clone());
            }
        }
        Value::Object(scope)
    }
}

/// Render a JSON value for interpolation: strings verbatim, everything else
/// as compact JSON.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_preserves_insertion_order() {
        let mut memory = WorkflowMemory::new();
        memory.record_output("zeta", json!(1));
        memory.record_output("alpha", json!(2));
        memory.record_output("mid", json!(3));
        memory.record_output("zeta", json!(4));

        let keys: Vec<&str> = memory.output.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(memory.get_output("zeta"), Some(&json!(4)));
    }

    #[test]
    fn snapshot_round_trip() {
        let mut memory = WorkflowMemory::new();
        memory.transcript.push(Message::user("hi"));
        memory.record_output("a", json!("x"));
        memory.final_output.push("done".into());
        memory.set_metadata("a", "attempts", json!(2));

        let snapshot = memory.snapshot("a", 0);
        assert_eq!(snapshot.step_name, "a");
        assert_eq!(WorkflowMemory::from_snapshot(&snapshot), memory);
    }

    #[test]
    fn expression_context_exposes_loop_variables() {
        let mut memory = WorkflowMemory::new();
        memory.record_output("fetch", json!("data"));
        let mut vars = Map::new();
        vars.insert("file".into(), json!("a.rs"));

        let scope = memory.to_expression_context(&vars, &json!({"name": "w"}));
        assert_eq!(scope["output"]["fetch"], "data");
        assert_eq!(scope["file"], "a.rs");
        assert_eq!(scope["variables"]["file"], "a.rs");
        assert_eq!(scope["workflow"]["name"], "w");
    }

    #[test]
    fn renders_values() {
        assert_eq!(value_to_string(&json!("plain")), "plain");
        assert_eq!(value_to_string(&json!([1, 2])), "[1,2]");
        assert_eq!(value_to_string(&Value::Null), "");
    }
}
