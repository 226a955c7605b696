//! Add a parameter to a method and a default argument to every call site.
//!
//! The declaration is rewritten through the safe editor's exactly-one-match
//! primitive using the indexed signature text; call sites come from the
//! index's call-site list and are rewritten line by line with a
//! paren-matching argument scan. Preview and apply share the matching code,
//! so the preview can never diverge from what apply does.
//!
//! Operates file by file: one file failing (stale index, unreadable, call no
//! longer on the recorded line) is reported and does not abort the rest.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::editor::{self, LineEdit, ReplaceOptions};
use crate::error::EngineError;
use crate::index::WorkspaceIndex;
use crate::refactor::{is_identifier, EditPreview, FileFailure};

/// Arguments for the add-parameter operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddParameterRequest {
    pub type_name: String,
    pub method_name: String,
    pub parameter_type: String,
    pub parameter_name: String,
    /// Expression appended to every existing call.
    pub default_value: String,
    pub preview: bool,
}

/// Per-file outcome of the call-site rewrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
    pub file: String,
    pub call_sites_rewritten: usize,
}

/// Result of an add-parameter preview or apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddParameterReport {
    pub preview: bool,
    /// The declaration change.
    pub declaration: EditPreview,
    /// Files whose call sites were rewritten, with counts.
    pub files: Vec<FileOutcome>,
    pub total_call_sites: usize,
    pub failures: Vec<FileFailure>,
}

/// Append `parameter_type parameter_name` to a method's declaration and
/// `default_value` to every recorded call of it.
pub fn add_parameter(
    index: &WorkspaceIndex,
    request: &AddParameterRequest,
    backup: bool,
) -> Result<AddParameterReport, EngineError> {
    validate(request)?;

    // Locate the single declaration.
    let declarations = index.members_named(Some(&request.type_name), &request.method_name);
    let (decl_file, _decl_type, decl_member) = match declarations.len() {
        0 => {
            return Err(EngineError::not_found(format!(
                "method '{}.{}'",
                request.type_name, request.method_name
            )));
        }
        1 => declarations[0],
        _ => {
            let candidates = declarations
                .iter()
                .map(|(f, _, m)| {
                    format!("{}:{}", f.display_path(index.merged), m.span.start)
                })
                .collect();
            return Err(EngineError::ambiguous(
                format!(
                    "method '{}.{}' (overloads are not supported)",
                    request.type_name, request.method_name
                ),
                candidates,
            ));
        }
    };

    let new_signature = append_parameter(
        &decl_member.signature,
        &request.parameter_type,
        &request.parameter_name,
    )
    .ok_or_else(|| {
        EngineError::internal(format!(
            "cannot locate parameter list in signature '{}'",
            decl_member.signature
        ))
    })?;
    let declaration = EditPreview {
        file: decl_file.display_path(index.merged),
        line: decl_member.span.start,
        before: decl_member.signature.clone(),
        after: new_signature.clone(),
    };

    let options = ReplaceOptions {
        normalize_indent: false,
        backup,
    };
    let mut failures = Vec::new();

    if !request.preview {
        if let Err(err) = editor::replace(
            &decl_file.absolute_path,
            &decl_member.signature,
            &new_signature,
            &options,
        ) {
            // Without the declaration there is no point rewriting calls.
            return Err(err);
        }
    }

    // Every recorded call of this method name; unresolved receivers pass the
    // type filter on purpose (heuristic over-match beats silent misses).
    let call_re = Regex::new(&format!(r"\b{}\s*\(", regex::escape(&request.method_name)))
        .map_err(|e| EngineError::internal(format!("call regex: {}", e)))?;
    let mut sites_by_file: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for site in index.call_sites_of(Some(&request.type_name), &request.method_name) {
        let entry = sites_by_file.entry(site.file.clone()).or_default();
        if !entry.contains(&site.line) {
            entry.push(site.line);
        }
    }

    let mut files = Vec::new();
    let mut total_call_sites = 0usize;

    for (display, lines) in &sites_by_file {
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
        let mut rewritten_here = 0usize;
        for &line_no in lines {
            let Some(before) = file_lines.get(line_no.saturating_sub(1) as usize) else {
                failures.push(FileFailure {
                    file: display.clone(),
                    error: format!("line {} no longer exists; reindex and retry", line_no),
                });
                continue;
            };
            match append_argument(before, &call_re, &request.default_value) {
                Some((after, count)) => {
                    rewritten_here += count;
                    line_edits.push(LineEdit {
                        line: line_no,
                        new_text: after,
                    });
                }
                None => {
                    failures.push(FileFailure {
                        file: display.clone(),
                        error: format!(
                            "line {} no longer contains a call to {}; reindex and retry",
                            line_no, request.method_name
                        ),
                    });
                }
            }
        }

        if line_edits.is_empty() {
            continue;
        }
        if !request.preview {
            if let Err(err) = editor::apply_line_edits(&record.absolute_path, &line_edits, &options)
            {
                failures.push(FileFailure {
                    file: display.clone(),
                    error: err.to_string(),
                });
                continue;
            }
        }
        total_call_sites += rewritten_here;
        files.push(FileOutcome {
            file: display.clone(),
            call_sites_rewritten: rewritten_here,
        });
    }

    info!(
        method = %format!("{}.{}", request.type_name, request.method_name),
        preview = request.preview,
        call_sites = total_call_sites,
        "add-parameter complete"
    );
    Ok(AddParameterReport {
        preview: request.preview,
        declaration,
        files,
        total_call_sites,
        failures,
    })
}

fn validate(request: &AddParameterRequest) -> Result<(), EngineError> {
    if !is_identifier(&request.type_name) {
        return Err(EngineError::validation("type_name is not a valid identifier"));
    }
    if !is_identifier(&request.method_name) {
        return Err(EngineError::validation(
            "method_name is not a valid identifier",
        ));
    }
    if !is_identifier(&request.parameter_name) {
        return Err(EngineError::validation(
            "parameter_name is not a valid identifier",
        ));
    }
    if request.parameter_type.trim().is_empty() {
        return Err(EngineError::validation("parameter_type must not be empty"));
    }
    if request.default_value.trim().is_empty() {
        return Err(EngineError::validation("default_value must not be empty"));
    }
    Ok(())
}

// ============================================================================
// Isolated rewriting functions
// ============================================================================

/// Append `ptype pname` inside a declaration's parameter list.
///
/// `Run()` becomes `Run(bool flag)`; `Run(int x)` becomes
/// `Run(int x, bool flag)`. Returns `None` when the signature has no
/// parseable parameter list.
pub fn append_parameter(signature: &str, ptype: &str, pname: &str) -> Option<String> {
    let open = signature.find('(')?;
    let close = matching_paren(signature, open)?;
    let existing = signature[open + 1..close].trim();
    let inserted = if existing.is_empty() {
        format!("{} {}", ptype, pname)
    } else {
        format!("{}, {} {}", &signature[open + 1..close], ptype, pname)
    };
    Some(format!(
        "{}({}{}",
        &signature[..open],
        inserted,
        &signature[close..]
    ))
}

/// Append `default_value` to every call of the method on one line.
///
/// Arguments are scanned with paren matching, so nested calls inside the
/// argument list keep their own parentheses intact. Returns the rewritten
/// line and the number of calls touched, or `None` when the line contains no
/// complete call.
pub fn append_argument(line: &str, call_re: &Regex, default_value: &str) -> Option<(String, usize)> {
    let mut out = String::with_capacity(line.len() + default_value.len() + 2);
    let mut copied = 0usize;
    let mut count = 0usize;

    for m in call_re.find_iter(line) {
        if m.start() < copied {
            // Inside an argument list we already rewrote.
            continue;
        }
        let open = m.end() - 1;
        let Some(close) = matching_paren(line, open) else {
            continue;
        };
        let args = line[open + 1..close].trim();
        out.push_str(&line[copied..close]);
        if args.is_empty() {
            out.push_str(default_value);
        } else {
            out.push_str(", ");
            out.push_str(default_value);
        }
        copied = close;
        count += 1;
    }

    if count == 0 {
        return None;
    }
    out.push_str(&line[copied..]);
    Some((out, count))
}

/// Index of the `)` matching the `(` at `open`, skipping string literals.
fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'(') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut in_char = false;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            match b {
                b'\\' => i += 1,
                b'"' => in_string = false,
                _ => {}
            }
        } else if in_char {
            match b {
                b'\\' => i += 1,
                b'\'' => in_char = false,
                _ => {}
            }
        } else {
            match b {
                b'"' => in_string = true,
                b'\'' => in_char = true,
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

// ============================================================================
// Tests
// ============================================================================
