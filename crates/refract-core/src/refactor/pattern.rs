//! Bulk pattern replacement across the indexed tree.
//!
//! Applies one regex to every indexed file (optionally filtered by a path
//! glob), writing through the editor chokepoint. A failing file is recorded
//! and skipped; the operation always reports applied/skipped counts instead
//! of aborting on first error.

use globset::Glob;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::editor::{self, ReplaceOptions};
use crate::error::EngineError;
use crate::index::WorkspaceIndex;
use crate::refactor::{EditPreview, FileFailure};

/// Cap on per-line previews carried in one report.
const MAX_PREVIEW_LINES: usize = 200;

/// Result of a bulk pattern replacement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternReplaceReport {
    pub pattern: String,
    pub preview: bool,
    pub files_scanned: usize,
    pub files_changed: usize,
    pub total_replacements: usize,
    /// Per-line previews, truncated to a cap; `previews_truncated` says so.
    pub edits: Vec<EditPreview>,
    pub previews_truncated: bool,
    pub failures: Vec<FileFailure>,
}

/// Replace every match of `pattern` across the workspace.
pub fn pattern_replace(
    index: &WorkspaceIndex,
    pattern: &str,
    replacement: &str,
    file_glob: Option<&str>,
    preview: bool,
    backup: bool,
) -> Result<PatternReplaceReport, EngineError> {
    if pattern.is_empty() {
        return Err(EngineError::validation("pattern must not be empty"));
    }
    let regex = Regex::new(pattern)
        .map_err(|e| EngineError::validation(format!("invalid pattern: {}", e)))?;
    let glob = match file_glob {
        Some(g) => Some(
            Glob::new(g)
                .map_err(|e| EngineError::validation(format!("invalid file glob: {}", e)))?
                .compile_matcher(),
        ),
        None => None,
    };

    let options = ReplaceOptions {
        normalize_indent: false,
        backup,
    };
    let mut report = PatternReplaceReport {
        pattern: pattern.to_string(),
        preview,
        files_scanned: 0,
        files_changed: 0,
        total_replacements: 0,
        edits: Vec::new(),
        previews_truncated: false,
        failures: Vec::new(),
    };

    for file in index.files() {
        if let Some(matcher) = &glob {
            if !matcher.is_match(&file.relative_path) {
                continue;
            }
        }
        report.files_scanned += 1;
        let display = file.display_path(index.merged);

        let content = match std::fs::read_to_string(&file.absolute_path) {
            Ok(c) => c,
            Err(err) => {
                report.failures.push(FileFailure {
                    file: display,
                    error: format!("read failed: {}", err),
                });
                continue;
            }
        };
        let count = regex.find_iter(&content).count();
        if count == 0 {
            continue;
        }

        for (idx, line) in content.lines().enumerate() {
            if !regex.is_match(line) {
                continue;
            }
            if report.edits.len() >= MAX_PREVIEW_LINES {
                report.previews_truncated = true;
                break;
            }
            report.edits.push(EditPreview {
                file: display.clone(),
                line: idx as u32 + 1,
                before: line.trim().to_string(),
                after: regex.replace_all(line, replacement).trim().to_string(),
            });
        }

        if preview {
            report.files_changed += 1;
            report.total_replacements += count;
            continue;
        }
        match editor::apply_regex(&file.absolute_path, &regex, replacement, &options) {
            Ok(applied) => {
                report.files_changed += 1;
                report.total_replacements += applied;
            }
            Err(err) => report.failures.push(FileFailure {
                file: display,
                error: err.to_string(),
            }),
        }
    }

    info!(
        pattern,
        preview,
        files = report.files_changed,
        replacements = report.total_replacements,
        "pattern replace complete"
    );
    Ok(report)
}

// ============================================================================
// Tests
// ============================================================================
