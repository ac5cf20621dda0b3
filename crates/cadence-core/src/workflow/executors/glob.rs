//! Glob steps: expand a wildcard pattern relative to the workflow directory.
//!
//! The result is the sorted, newline-joined list of matching files.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;
use walkdir::WalkDir;

use cadence_types::step::{Step, StepKind};

use super::{StepExecutor, unsupported};
use crate::workflow::context::ExecutionContext;
use crate::workflow::error::{StepError, WorkflowError};
use crate::workflow::runtime::Runtime;

#[derive(Debug, Default, Clone, Copy)]
pub struct GlobExecutor;

impl StepExecutor for GlobExecutor {
    fn execute<'a>(
        &'a self,
        step: Step,
        ctx: ExecutionContext,
        rt: &'a Arc<Runtime>,
    ) -> BoxFuture<'a, Result<Value, WorkflowError>> {
        Box::pin(async move {
            let kind = step.kind();
            let Step::Glob { pattern } = step else {
                return Err(unsupported("glob", kind));
            };

            let dir = rt.dir().to_path_buf();
            let matches = rt
                .errors
                .with_error_handling(&ctx.current_step, StepKind::Glob, &ctx.retry, || {
                    let dir = dir.clone();
                    let pattern = pattern.clone();
                    async move {
                        tokio::task::spawn_blocking(move || expand(&dir, &pattern))
                            .await
                            .map_err(|e| StepError::execution(format!("glob worker failed: {e}")))
                    }
                })
                .await?;
            Ok(Value::String(matches.join("\n")))
        })
    }
}

/// Files under `dir` matching `pattern`, sorted, relative to `dir` unless
/// the pattern is absolute.
pub fn expand(dir: &Path, pattern: &str) -> Vec<String> {
    let pattern_path = Path::new(pattern);
    let absolute = pattern_path.is_absolute();

    // Walk from the longest wildcard-free prefix.
    let mut base = PathBuf::new();
    let mut rest = Vec::new();
    for component in pattern_path.components() {
        let text = component.as_os_str().to_string_lossy();
        if rest.is_empty() && !has_wildcard(&text) {
            base.push(component);
        } else if !matches!(component, Component::CurDir) {
            rest.push(text.into_owned());
        }
    }
    if rest.is_empty() {
        // No wildcard survived: a plain path.
        let path = dir.join(&base);
        return if path.is_file() {
            vec![pattern.to_string()]
        } else {
            Vec::new()
        };
    }

    let rest = rest.join("/");
    let root = if absolute { base.clone() } else { dir.join(&base) };
    let max_depth = if rest.contains("**") {
        usize::MAX
    } else {
        rest.split('/').count()
    };

    let mut found: Vec<String> = WalkDir::new(&root)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != ".git")
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let relative = e.path().strip_prefix(&root).ok()?;
            let relative = relative.to_string_lossy().replace('\\', "/");
            glob_match(&rest, &relative).then(|| {
                let shown = base.join(&relative);
                shown.to_string_lossy().into_owned()
            })
        })
        .collect();
    found.sort();
    found
}

fn has_wildcard(text: &str) -> bool {
    text.contains(['*', '?', '['])
}

/// Path-aware glob matching.
///
/// Supports `*` (any run of characters except `/`), `**` (any run including
/// `/`), `?` (one character except `/`) and `[...]` classes with `!`
/// negation and `a-z` ranges.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    match_from(&pattern, 0, &text, 0)
}

fn match_from(pattern: &[char], mut pi: usize, text: &[char], mut ti: usize) -> bool {
    while pi < pattern.len() {
        match pattern[pi] {
            '*' => {
                let double = pattern.get(pi + 1) == Some(&'*');
                pi += if double { 2 } else { 1 };
                if double && pattern.get(pi) == Some(&'/') {
                    // `**/` also matches zero directories.
                    if match_from(pattern, pi + 1, text, ti) {
                        return true;
                    }
                }
                if pi >= pattern.len() {
                    return double || !text[ti..].contains(&'/');
                }
                while ti <= text.len() {
                    if match_from(pattern, pi, text, ti) {
                        return true;
                    }
                    if ti == text.len() || (!double && text[ti] == '/') {
                        return false;
                    }
                    ti += 1;
                }
                return false;
            }
            '?' => {
                if ti >= text.len() || text[ti] == '/' {
                    return false;
                }
                pi += 1;
                ti += 1;
            }
            '[' => {
                if ti >= text.len() {
                    return false;
                }
                let Some((matched, next)) = match_class(pattern, pi + 1, text[ti]) else {
                    // Unterminated class: treat '[' literally.
                    if text[ti] != '[' {
                        return false;
                    }
                    pi += 1;
                    ti += 1;
                    continue;
                };
                if !matched {
                    return false;
                }
                pi = next;
                ti += 1;
            }
            c => {
                if ti >= text.len() || text[ti] != c {
                    return false;
                }
                pi += 1;
                ti += 1;
            }
        }
    }
    ti == text.len()
}

/// Match `c` against the class starting at `pi` (just past `[`). Returns
/// whether it matched and the index after the closing `]`.
fn match_class(pattern: &[char], mut pi: usize, c: char) -> Option<(bool, usize)> {
    let negated = pattern.get(pi) == Some(&'!');
    if negated {
        pi += 1;
    }
    let mut matched = false;
    let mut first = true;
    while pi < pattern.len() {
        if pattern[pi] == ']' && !first {
            return Some((matched != negated, pi + 1));
        }
        first = false;
        if pattern.get(pi + 1) == Some(&'-') && pi + 2 < pattern.len() && pattern[pi + 2] != ']' {
            if pattern[pi] <= c && c <= pattern[pi + 2] {
                matched = true;
            }
            pi += 3;
        } else {
            if pattern[pi] == c {
                matched = true;
            }
            pi += 1;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn star_stays_within_a_segment() {
        assert!(glob_match("*.rs", "main.rs"));
        assert!(!glob_match("*.rs", "src/main.rs"));
        assert!(glob_match("src/*.rs", "src/main.rs"));
    }

    #[test]
    fn double_star_crosses_segments() {
        assert!(glob_match("**/*.rs", "main.rs"));
        assert!(glob_match("**/*.rs", "a/b/c.rs"));
        assert!(glob_match("src/**", "src/a/b"));
        assert!(!glob_match("**/*.rs", "a/b/c.py"));
    }

    #[test]
    fn classes_and_single_chars() {
        assert!(glob_match("file[0-9].txt", "file7.txt"));
        assert!(!glob_match("file[!0-9].txt", "file7.txt"));
        assert!(glob_match("?.md", "a.md"));
        assert!(!glob_match("?.md", "ab.md"));
    }

    #[test]
    fn expands_relative_to_directory_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        fs::write(dir.path().join("src/b.rs"), "").unwrap();
        fs::write(dir.path().join("src/a.rs"), "").unwrap();
        fs::write(dir.path().join("src/nested/c.rs"), "").unwrap();
        fs::write(dir.path().join("src/notes.md"), "").unwrap();

        assert_eq!(expand(dir.path(), "src/*.rs"), vec!["src/a.rs", "src/b.rs"]);
        assert_eq!(
            expand(dir.path(), "src/**/*.rs"),
            vec!["src/a.rs", "src/b.rs", "src/nested/c.rs"]
        );
        assert!(expand(dir.path(), "docs/*.md").is_empty());
    }
}
