//! Move a file to a new relative path, rewriting its namespace declaration.
//!
//! The move itself and the namespace rewrite in the moved file are
//! high-confidence and performed directly; references in *other* files
//! (types declared in the moved file, imports of the old namespace) are only
//! flagged as "may need updating". Cross-file import rewriting is
//! lower-confidence than the move, so the caller decides.

use std::fs;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::editor::{self, ReplaceOptions};
use crate::error::EngineError;
use crate::index::WorkspaceIndex;
use crate::resolve;

/// Namespace rewrite performed in the moved file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceChange {
    pub old: String,
    pub new: String,
}

/// A file that may need manual follow-up after the move.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlaggedReference {
    pub file: String,
    pub reason: String,
}

/// Result of a move-file operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveFileReport {
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_change: Option<NamespaceChange>,
    /// Files referencing the moved types or the old namespace.
    pub flagged: Vec<FlaggedReference>,
    /// Warnings about steps that could not be completed (the move itself
    /// succeeded if this function returned Ok).
    pub warnings: Vec<String>,
}

/// Move a file within its workspace root.
pub fn move_file(
    index: &WorkspaceIndex,
    path_input: &str,
    new_relative: &str,
    backup: bool,
) -> Result<MoveFileReport, EngineError> {
    let record = resolve::resolve(index, path_input)?;
    let new_rel = normalize_relative(new_relative)?;

    let new_abs = record.root.join(&new_rel);
    if new_abs == record.absolute_path {
        return Err(EngineError::validation(
            "destination equals the current path",
        ));
    }
    if new_abs.exists() {
        return Err(EngineError::validation(format!(
            "destination already exists: {}",
            new_rel
        )));
    }
    if let Some(parent) = new_abs.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| EngineError::io(parent.display().to_string(), e))?;
    }
    fs::rename(&record.absolute_path, &new_abs)
        .map_err(|e| EngineError::io(record.absolute_path.display().to_string(), e))?;
    info!(from = %record.relative_path, to = %new_rel, "moved file");

    let mut warnings = Vec::new();

    // Rewrite the namespace declaration when the new directory implies a
    // different one.
    let namespace_change = match &record.namespace {
        Some(old_ns) => {
            let new_ns = namespace_for(old_ns, &new_rel);
            if new_ns != *old_ns {
                let options = ReplaceOptions {
                    normalize_indent: false,
                    backup,
                };
                match editor::replace(
                    &new_abs,
                    &format!("namespace {}", old_ns),
                    &format!("namespace {}", new_ns),
                    &options,
                ) {
                    Ok(_) => Some(NamespaceChange {
                        old: old_ns.clone(),
                        new: new_ns,
                    }),
                    Err(err) => {
                        warnings.push(format!(
                            "file moved, but namespace rewrite failed: {}",
                            err
                        ));
                        None
                    }
                }
            } else {
                None
            }
        }
        None => None,
    };

    // Flag files that reference the moved declarations or import the old
    // namespace. These are not rewritten.
    let moved_types: Vec<&str> = record.types.iter().map(|t| t.name.as_str()).collect();
    let old_display = record.display_path(index.merged);
    let mut flagged = Vec::new();
    for other in index.files() {
        let other_display = other.display_path(index.merged);
        if other_display == old_display {
            continue;
        }
        for ty in &moved_types {
            if other.dependencies.iter().any(|d| d == ty) {
                flagged.push(FlaggedReference {
                    file: other_display.clone(),
                    reason: format!("references type '{}' declared in the moved file", ty),
                });
            }
        }
        if let Some(old_ns) = &record.namespace {
            if other.imports.iter().any(|i| i == old_ns) {
                flagged.push(FlaggedReference {
                    file: other_display.clone(),
                    reason: format!("imports namespace '{}'", old_ns),
                });
            }
        }
    }

    Ok(MoveFileReport {
        from: old_display,
        to: new_rel,
        namespace_change,
        flagged,
        warnings,
    })
}

/// Validate and normalize a caller-supplied destination path.
fn normalize_relative(input: &str) -> Result<String, EngineError> {
    let normalized = input.trim().replace('\\', "/");
    if normalized.is_empty() {
        return Err(EngineError::validation("new path must not be empty"));
    }
    if normalized.starts_with('/') || normalized.split('/').any(|seg| seg == "..") {
        return Err(EngineError::validation(
            "new path must be relative to the workspace root without '..'",
        ));
    }
    Ok(normalized)
}

/// New namespace implied by a relative path: the old namespace's first
/// segment stays as the project root, the destination directories supply the
/// rest.
fn namespace_for(old_namespace: &str, new_relative: &str) -> String {
    let root = old_namespace.split('.').next().unwrap_or(old_namespace);
    let mut segments = vec![root.to_string()];
    let dirs: Vec<&str> = new_relative.split('/').collect();
    for dir in &dirs[..dirs.len().saturating_sub(1)] {
        if !dir.is_empty() {
            segments.push((*dir).to_string());
        }
    }
    segments.join(".")
}

// ============================================================================
// Tests
// ============================================================================
