//! Execution state: best-effort snapshot persistence and replay.
//!
//! - `manager` -- writes a snapshot of workflow memory after every step
//! - `replay` -- resolves a resume request to a session, a restart index
//!   and the snapshot to restore

pub mod manager;
pub mod replay;

pub use manager::StateManager;
pub use replay::{ReplayPlan, ReplayRequest, resolve_replay};
