//! Safe text editing: the single chokepoint for file mutations.
//!
//! Every mutating operation in the engine writes through this module. The
//! core primitive is [`replace`]: an exactly-one-match substring replacement
//! that detects the file's line-ending convention, normalizes the search and
//! replacement text to it, and refuses to write when the target is absent or
//! ambiguous. Zero matches produce a fuzzy-match diagnostic pointing at the
//! closest region; two or more matches are a uniqueness violation the caller
//! must disambiguate. In both failure cases the file is left untouched.
//!
//! Bulk refactorings use the line-edit and regex entry points, which share
//! the same line-ending handling and backup behavior. Backups are best-effort
//! sibling files, not transactional with the primary write.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineError;

// ============================================================================
// Line Endings
// ============================================================================

/// Line-ending convention of a file, detected by first occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    CrLf,
    Cr,
    Lf,
}

impl LineEnding {
    /// Detect from the first terminator in the content; defaults to LF for
    /// single-line content.
    pub fn detect(content: &str) -> Self {
        let bytes = content.as_bytes();
        for (i, &b) in bytes.iter().enumerate() {
            match b {
                b'\r' => {
                    return if bytes.get(i + 1) == Some(&b'\n') {
                        LineEnding::CrLf
                    } else {
                        LineEnding::Cr
                    };
                }
                b'\n' => return LineEnding::Lf,
                _ => {}
            }
        }
        LineEnding::Lf
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::CrLf => "\r\n",
            LineEnding::Cr => "\r",
            LineEnding::Lf => "\n",
        }
    }
}

/// Rewrite any mix of CRLF/CR/LF terminators in `text` to `ending`.
///
/// Callers pass search/replacement text in whatever convention they have;
/// the file's own convention always wins.
pub fn normalize_newlines(text: &str, ending: LineEnding) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    match ending {
        LineEnding::Lf => unified,
        _ => unified.replace('\n', ending.as_str()),
    }
}

// ============================================================================
// Options and Outcome
// ============================================================================

/// Options for [`replace`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaceOptions {
    /// Match ignoring per-line leading/trailing whitespace differences. The
    /// replaced extent is still the file's actual matched text.
    pub normalize_indent: bool,
    /// Copy the original to a sibling `.bak` before writing.
    pub backup: bool,
}

/// Result of a successful [`replace`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceOutcome {
    pub file: String,
    /// The file text that was actually replaced (indentation included when
    /// indent-normalized matching widened the extent).
    pub matched_text: String,
    /// 1-indexed line where the match started.
    pub first_line: u32,
    /// 1-indexed line where the match ended.
    pub last_line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
}

// ============================================================================
// Replace Primitive
// ============================================================================

/// Replace exactly one occurrence of `old_text` in `path` with `new_text`.
///
/// Line endings of both texts are normalized to the file's convention before
/// matching, and the rest of the file is preserved byte-for-byte. Zero
/// matches fail with a fuzzy diagnostic; more than one match fails with a
/// uniqueness violation. On failure the file is not modified.
pub fn replace(
    path: &Path,
    old_text: &str,
    new_text: &str,
    options: &ReplaceOptions,
) -> Result<ReplaceOutcome, EngineError> {
    if old_text.is_empty() {
        return Err(EngineError::validation("old_text must not be empty"));
    }
    let display = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|e| EngineError::io(&display, e))?;

    let ending = LineEnding::detect(&content);
    let old_n = normalize_newlines(old_text, ending);
    let new_n = normalize_newlines(new_text, ending);

    let matches: Vec<(usize, usize)> = if options.normalize_indent {
        find_indent_matches(&content, &old_n, ending)
    } else {
        content
            .match_indices(&old_n)
            .map(|(start, m)| (start, start + m.len()))
            .collect()
    };

    match matches.len() {
        0 => Err(EngineError::NotFound {
            what: format!("text in {}", display),
            suggestions: Vec::new(),
            detail: fuzzy_diagnostic(&content, &old_n),
        }),
        1 => {
            let (start, end) = matches[0];
            let backup_path = if options.backup {
                Some(write_backup(path, &display)?)
            } else {
                None
            };
            let matched_text = content[start..end].to_string();
            let mut updated = String::with_capacity(content.len() + new_n.len());
            updated.push_str(&content[..start]);
            updated.push_str(&new_n);
            updated.push_str(&content[end..]);
            fs::write(path, &updated).map_err(|e| EngineError::io(&display, e))?;
            let log_file = display.as_str();
            debug!(file = %log_file, "replaced one occurrence");
            Ok(ReplaceOutcome {
                file: display,
                first_line: line_of_offset(&content, start),
                last_line: line_of_offset(&content, end.saturating_sub(1).max(start)),
                matched_text,
                backup_path,
            })
        }
        n => Err(EngineError::Uniqueness {
            file: display,
            matches: n,
            needle_preview: preview_of(&old_n),
        }),
    }
}

/// Find matches of `needle` in `content` comparing trimmed lines.
///
/// A match covers whole file lines: from the start of the first matched line
/// through the end of the last matched line (terminator excluded), so the
/// replaced extent includes the file's actual indentation.
fn find_indent_matches(content: &str, needle: &str, ending: LineEnding) -> Vec<(usize, usize)> {
    let mut needle_lines: Vec<&str> = needle.split(ending.as_str()).map(str::trim).collect();
    // A trailing terminator in the needle yields an empty last element; drop
    // it so "foo\n" matches the line "foo".
    if needle_lines.len() > 1 && needle_lines.last().map(|l| l.is_empty()).unwrap_or(false) {
        needle_lines.pop();
    }
    if needle_lines.is_empty() {
        return Vec::new();
    }

    let lines = file_lines(content);
    let mut matches = Vec::new();
    if lines.len() < needle_lines.len() {
        return matches;
    }
    for start in 0..=(lines.len() - needle_lines.len()) {
        let all_match = needle_lines
            .iter()
            .enumerate()
            .all(|(j, nl)| lines[start + j].text.trim() == *nl);
        if all_match {
            let first = &lines[start];
            let last = &lines[start + needle_lines.len() - 1];
            matches.push((first.start, last.start + last.text.len()));
        }
    }
    matches
}

/// One physical line with its byte offset, terminator excluded.
struct FileLine<'a> {
    start: usize,
    text: &'a str,
}

fn file_lines(content: &str) -> Vec<FileLine<'_>> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for piece in content.split_inclusive('\n') {
        let text = piece.trim_end_matches('\n').trim_end_matches('\r');
        lines.push(FileLine { start: offset, text });
        offset += piece.len();
    }
    if content.is_empty() {
        lines.push(FileLine { start: 0, text: "" });
    }
    lines
}

fn line_of_offset(content: &str, offset: usize) -> u32 {
    content[..offset.min(content.len())]
        .bytes()
        .filter(|&b| b == b'\n')
        .count() as u32
        + 1
}

fn preview_of(text: &str) -> String {
    let first = text.lines().next().unwrap_or("");
    if first.chars().count() > 60 {
        format!("{}...", first.chars().take(60).collect::<String>())
    } else {
        first.to_string()
    }
}

// ============================================================================
// Fuzzy Diagnostic
// ============================================================================

/// Length of the anchor prefix scanned for in the file.
const ANCHOR_PREFIX: usize = 20;

/// Build an actionable hint for a zero-match failure.
///
/// Anchors on the first non-trivial line of the search text, finds the file
/// region that lines up best with the remaining lines, and annotates each
/// line with whether only indentation or actual content differs.
pub fn fuzzy_diagnostic(content: &str, needle: &str) -> Option<String> {
    let needle_lines: Vec<&str> = needle.lines().collect();
    let anchor_idx = needle_lines.iter().position(|l| l.trim().len() >= 3)?;
    let anchor = needle_lines[anchor_idx].trim();
    let anchor_key: String = anchor.chars().take(ANCHOR_PREFIX).collect();

    let file_lines: Vec<&str> = content.lines().collect();
    let mut best: Option<(usize, usize)> = None; // (score, start line idx)
    for (i, line) in file_lines.iter().enumerate() {
        if !line.trim_start().starts_with(&anchor_key) && !line.contains(&anchor_key) {
            continue;
        }
        let mut score = 1usize;
        for (j, nl) in needle_lines.iter().enumerate().skip(anchor_idx + 1) {
            let file_idx = i + (j - anchor_idx);
            let Some(fl) = file_lines.get(file_idx) else {
                break;
            };
            let nl_trim = nl.trim();
            let fl_trim = fl.trim();
            if fl_trim == nl_trim {
                score += 2;
            } else if !nl_trim.is_empty()
                && fl_trim.starts_with(&nl_trim.chars().take(10).collect::<String>())
            {
                score += 1;
            }
        }
        if best.map(|(s, _)| score > s).unwrap_or(true) {
            best = Some((score, i));
        }
    }

    let (_, start) = best?;
    let mut out = format!("closest match starts at line {}:", start + 1);
    for (j, nl) in needle_lines.iter().enumerate().skip(anchor_idx) {
        let file_idx = start + (j - anchor_idx);
        let file_line = file_lines.get(file_idx).copied().unwrap_or("");
        let verdict = if file_line == *nl {
            "matches"
        } else if file_line.trim() == nl.trim() {
            "indentation differs"
        } else {
            "content differs"
        };
        out.push_str(&format!(
            "\n  line {}: {} | {}",
            file_idx + 1,
            verdict,
            preview_of(file_line.trim_start())
        ));
    }
    Some(out)
}

// ============================================================================
// Line Edits (bulk-refactoring entry point)
// ============================================================================

/// Replacement of one whole line, addressed by 1-indexed number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineEdit {
    pub line: u32,
    pub new_text: String,
}

/// Rewrite whole lines in place, preserving the file's line endings.
///
/// Every edit's line must exist; otherwise nothing is written. Returns the
/// number of lines changed (edits whose text already matches count as zero).
pub fn apply_line_edits(
    path: &Path,
    edits: &[LineEdit],
    options: &ReplaceOptions,
) -> Result<usize, EngineError> {
    if edits.is_empty() {
        return Ok(0);
    }
    let display = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|e| EngineError::io(&display, e))?;
    let ending = LineEnding::detect(&content);
    let had_trailing_newline = content.ends_with('\n') || content.ends_with('\r');

    let mut lines: Vec<String> = content
        .split_inclusive('\n')
        .map(|piece| piece.trim_end_matches('\n').trim_end_matches('\r').to_string())
        .collect();
    if content.is_empty() {
        lines.push(String::new());
    }

    for edit in edits {
        let idx = edit.line.saturating_sub(1) as usize;
        if edit.line == 0 || idx >= lines.len() {
            return Err(EngineError::validation(format!(
                "line {} does not exist in {} ({} lines)",
                edit.line,
                display,
                lines.len()
            )));
        }
    }

    let mut changed = 0usize;
    for edit in edits {
        let idx = (edit.line - 1) as usize;
        let new_text = normalize_newlines(&edit.new_text, LineEnding::Lf);
        if lines[idx] != new_text {
            lines[idx] = new_text;
            changed += 1;
        }
    }
    if changed == 0 {
        return Ok(0);
    }

    if options.backup {
        write_backup(path, &display)?;
    }
    let mut updated = lines.join(ending.as_str());
    if had_trailing_newline {
        updated.push_str(ending.as_str());
    }
    fs::write(path, updated).map_err(|e| EngineError::io(&display, e))?;
    let log_file = display.as_str();
    debug!(file = %log_file, changed, "applied line edits");
    Ok(changed)
}

// ============================================================================
// Regex Replacement (bulk-refactoring entry point)
// ============================================================================

/// Replace every match of `pattern` in the file.
///
/// Shares the chokepoint's line-ending and backup behavior. When nothing
/// matches, the file is left untouched and zero is returned.
pub fn apply_regex(
    path: &Path,
    pattern: &Regex,
    replacement: &str,
    options: &ReplaceOptions,
) -> Result<usize, EngineError> {
    let display = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|e| EngineError::io(&display, e))?;

    let count = pattern.find_iter(&content).count();
    if count == 0 {
        return Ok(0);
    }
    if options.backup {
        write_backup(path, &display)?;
    }
    let updated = pattern.replace_all(&content, replacement);
    fs::write(path, updated.as_bytes()).map_err(|e| EngineError::io(&display, e))?;
    let log_file = display.as_str();
    debug!(file = %log_file, count, "applied regex replacement");
    Ok(count)
}

// ============================================================================
// Backups
// ============================================================================

/// Sibling backup path: `Foo.cs` -> `Foo.cs.bak`.
pub fn backup_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".bak");
    path.with_file_name(name)
}

fn write_backup(path: &Path, display: &str) -> Result<PathBuf, EngineError> {
    let backup = backup_path_for(path);
    fs::copy(path, &backup).map_err(|e| EngineError::io(display, e))?;
    Ok(backup)
}

/// Restore a file from its sibling backup: copy back, then delete the backup.
pub fn restore_backup(path: &Path) -> Result<(), EngineError> {
    let display = path.display().to_string();
    let backup = backup_path_for(path);
    if !backup.exists() {
        return Err(EngineError::not_found(format!(
            "backup for {}",
            display
        )));
    }
    fs::copy(&backup, path).map_err(|e| EngineError::io(&display, e))?;
    fs::remove_file(&backup).map_err(|e| EngineError::io(backup.display().to_string(), e))?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
