//! Workflow identity: the deterministic key both state backends file
//! sessions under.
//!
//! `<sanitized name>_<first 12 hex chars of sha256(absolute path)>`, so two
//! workflows with the same name in different directories never share
//! sessions.

use std::path::Path;

use sha2::{Digest, Sha256};

use cadence_core::workflow::definition::{Workflow, load_workflow_file};
use cadence_core::workflow::error::WorkflowError;
use cadence_types::state::WorkflowIdentity;

const PATH_HASH_LEN: usize = 12;

/// Lowercase hex SHA-256 of `content`.
pub fn sha256_hex(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// Name with every character outside `[A-Za-z0-9_-]` replaced by `_`.
pub fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if sanitized.is_empty() { "workflow".to_string() } else { sanitized }
}

pub fn workflow_identity(name: &str, path: &Path) -> WorkflowIdentity {
    let path = path.to_string_lossy().into_owned();
    let hash = sha256_hex(&path);
    WorkflowIdentity {
        key: format!("{}_{}", sanitize_name(name), &hash[..PATH_HASH_LEN]),
        name: name.to_string(),
        path,
    }
}

/// Load the workflow document at `path` with its identity, optionally
/// binding a target resource over the document's own.
pub fn load_workflow(path: &Path, target: Option<String>) -> Result<Workflow, WorkflowError> {
    let (mut config, absolute) = load_workflow_file(path)?;
    if target.is_some() {
        config.target = target;
    }
    let identity = workflow_identity(&config.name, &absolute);
    Ok(Workflow::new(config, absolute, identity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_value() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn key_is_stable_and_path_sensitive() {
        let a = workflow_identity("code review", Path::new("/srv/a/workflow.yml"));
        let again = workflow_identity("code review", Path::new("/srv/a/workflow.yml"));
        let b = workflow_identity("code review", Path::new("/srv/b/workflow.yml"));

        assert_eq!(a, again);
        assert_ne!(a.key, b.key);
        assert!(a.key.starts_with("code_review_"));
        assert_eq!(a.key.len(), "code_review_".len() + 12);
        assert_eq!(a.name, "code review");
    }

    #[test]
    fn loads_document_and_overrides_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workflow.yml");
        std::fs::write(&path, "name: docs\ntarget: README.md\nsteps:\n  - summarize\n").unwrap();

        let workflow = load_workflow(&path, None).unwrap();
        assert_eq!(workflow.config.target.as_deref(), Some("README.md"));
        assert_eq!(workflow.dir, std::fs::canonicalize(dir.path()).unwrap());

        let retargeted = load_workflow(&path, Some("CHANGELOG.md".into())).unwrap();
        assert_eq!(retargeted.config.target.as_deref(), Some("CHANGELOG.md"));
        assert_eq!(retargeted.identity, workflow.identity);
    }
}
