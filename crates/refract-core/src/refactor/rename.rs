//! Symbol rename across the workspace.
//!
//! The analyzer's usage list decides which files and lines are touched;
//! within those lines a word-boundary pattern swaps the name. This keeps
//! rename from rewriting identically-named text in unrelated files, while
//! staying heuristic: same-named symbols on unrelated types in the same
//! usage list will still be renamed together.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::analyzer;
use crate::editor::{self, LineEdit, ReplaceOptions};
use crate::error::EngineError;
use crate::index::WorkspaceIndex;
use crate::refactor::{is_identifier, EditPreview, FileFailure};

/// Result of a rename preview or apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameReport {
    pub old_name: String,
    pub new_name: String,
    /// True when no file was written.
    pub preview: bool,
    /// Every line the rename touches.
    pub edits: Vec<EditPreview>,
    pub files_changed: usize,
    pub total_replacements: usize,
    pub failures: Vec<FileFailure>,
}

/// Rename a symbol everywhere the analyzer sees it.
///
/// `preview == true` enumerates every file/line without writing; apply
/// performs the same edits file by file, continuing past per-file failures.
pub fn rename(
    index: &WorkspaceIndex,
    old_name: &str,
    new_name: &str,
    preview: bool,
    backup: bool,
) -> Result<RenameReport, EngineError> {
    if !is_identifier(old_name) {
        return Err(EngineError::validation(format!(
            "'{}' is not a valid symbol name",
            old_name
        )));
    }
    if !is_identifier(new_name) {
        return Err(EngineError::validation(format!(
            "'{}' is not a valid symbol name",
            new_name
        )));
    }
    if old_name == new_name {
        return Err(EngineError::validation(
            "old and new names are identical",
        ));
    }

    let usages = analyzer::find_usages(index, old_name, None)?;
    if usages.is_empty() {
        return Err(EngineError::not_found(format!("symbol '{}'", old_name)));
    }

    let word_re = Regex::new(&format!(r"\b{}\b", regex::escape(old_name)))
        .map_err(|e| EngineError::internal(format!("rename regex: {}", e)))?;

    // Group target lines by file, deduplicated.
    let mut lines_by_file: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for usage in &usages {
        let entry = lines_by_file.entry(usage.file.clone()).or_default();
        if !entry.contains(&usage.line) {
            entry.push(usage.line);
        }
    }

    let mut edits = Vec::new();
    let mut failures = Vec::new();
    let mut files_changed = 0usize;
    let mut total_replacements = 0usize;
    let options = ReplaceOptions {
        normalize_indent: false,
        backup,
    };

    for (display, lines) in &lines_by_file {
        let Some(record) = index
            .files()
            .iter()
            .find(|f| f.display_path(index.merged) == *display)
        else {
            failures.push(FileFailure {
                file: display.clone(),
                error: "file disappeared from index".to_string(),
            });
            continue;
        };

        let content = match std::fs::read_to_string(&record.absolute_path) {
            Ok(c) => c,
            Err(err) => {
                failures.push(FileFailure {
                    file: display.clone(),
                    error: format!("read failed: {}", err),
                });
                continue;
            }
        };
        let file_lines: Vec<&str> = content.lines().collect();

        let mut line_edits = Vec::new();
        for &line_no in lines {
            let Some(before) = file_lines.get(line_no.saturating_sub(1) as usize) else {
                failures.push(FileFailure {
                    file: display.clone(),
                    error: format!("line {} no longer exists; reindex and retry", line_no),
                });
                continue;
            };
            let hits = word_re.find_iter(before).count();
            if hits == 0 {
                // Index is stale for this line; skip it rather than guess.
                continue;
            }
            let after = word_re.replace_all(before, new_name).into_owned();
            total_replacements += hits;
            edits.push(EditPreview {
                file: display.clone(),
                line: line_no,
                before: before.trim().to_string(),
                after: after.trim().to_string(),
            });
            line_edits.push(LineEdit {
                line: line_no,
                new_text: after,
            });
        }

        if line_edits.is_empty() {
            continue;
        }
        if preview {
            files_changed += 1;
            continue;
        }
        match editor::apply_line_edits(&record.absolute_path, &line_edits, &options) {
            Ok(changed) if changed > 0 => files_changed += 1,
            Ok(_) => {}
            Err(err) => failures.push(FileFailure {
                file: display.clone(),
                error: err.to_string(),
            }),
        }
    }

    info!(
        old = old_name,
        new = new_name,
        preview,
        files = files_changed,
        replacements = total_replacements,
        "rename complete"
    );
    Ok(RenameReport {
        old_name: old_name.to_string(),
        new_name: new_name.to_string(),
        preview,
        edits,
        files_changed,
        total_replacements,
        failures,
    })
}

// ============================================================================
// Tests
// ============================================================================
