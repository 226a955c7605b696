//! File path resolution against the index.
//!
//! A caller-supplied path string is matched against the index's file records
//! with a three-way outcome: exactly one match succeeds, several matches
//! return an ambiguity error enumerating resubmittable `workspace/path`
//! forms, and zero matches return a not-found error carrying up to ten
//! candidate suggestions. Silently picking the first of several equally valid
//! matches is never acceptable once workspaces are merged.
//!
//! Strategies are tried in order; the first one producing any match decides
//! the outcome:
//!
//! 1. exact relative-path match (case-insensitive, slash-normalized)
//! 2. bare file-name match, when the input has no separators
//! 3. first segment matched against a root's leaf name or a merged
//!    workspace tag, remainder matched within that root/workspace
//! 4. `..`-containing inputs resolved lexically against each root and
//!    matched by absolute path

use std::path::{Component, Path, PathBuf};

use crate::error::EngineError;
use crate::index::{FileRecord, WorkspaceIndex};

/// Maximum number of suggestions carried by a not-found outcome.
const MAX_SUGGESTIONS: usize = 10;

/// Resolve a path string to exactly one indexed file.
pub fn resolve<'a>(
    index: &'a WorkspaceIndex,
    input: &str,
) -> Result<&'a FileRecord, EngineError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(EngineError::validation("path must not be empty"));
    }
    let normalized = normalize(trimmed);

    let strategies: [fn(&WorkspaceIndex, &str) -> Vec<usize>; 4] = [
        match_exact_relative,
        match_bare_file_name,
        match_root_prefixed,
        match_parent_relative,
    ];

    for strategy in strategies {
        let matches = strategy(index, &normalized);
        match matches.len() {
            0 => continue,
            1 => return Ok(&index.files()[matches[0]]),
            _ => {
                let candidates: Vec<String> = matches
                    .iter()
                    .map(|&i| disambiguated_form(index, &index.files()[i]))
                    .collect();
                return Err(EngineError::ambiguous(format!("path '{}'", trimmed), candidates));
            }
        }
    }

    Err(EngineError::not_found_with_suggestions(
        format!("file '{}'", trimmed),
        suggestions_for(index, &normalized),
    ))
}

// ============================================================================
// Strategies
// ============================================================================

/// Strategy 1: exact relative path, case-insensitive.
fn match_exact_relative(index: &WorkspaceIndex, normalized: &str) -> Vec<usize> {
    let wanted = normalized.to_lowercase();
    index
        .files()
        .iter()
        .enumerate()
        .filter(|(_, f)| f.relative_path.to_lowercase() == wanted)
        .map(|(i, _)| i)
        .collect()
}

/// Strategy 2: bare file name, only for inputs without separators.
fn match_bare_file_name(index: &WorkspaceIndex, normalized: &str) -> Vec<usize> {
    if normalized.contains('/') {
        return Vec::new();
    }
    let wanted = normalized.to_lowercase();
    index
        .files()
        .iter()
        .enumerate()
        .filter(|(_, f)| f.file_name.to_lowercase() == wanted)
        .map(|(i, _)| i)
        .collect()
}

/// Strategy 3: first segment names a root directory leaf or a workspace tag.
fn match_root_prefixed(index: &WorkspaceIndex, normalized: &str) -> Vec<usize> {
    let Some((head, rest)) = normalized.split_once('/') else {
        return Vec::new();
    };
    if rest.is_empty() {
        return Vec::new();
    }
    let head_lower = head.to_lowercase();
    let rest_lower = rest.to_lowercase();

    index
        .files()
        .iter()
        .enumerate()
        .filter(|(_, f)| {
            if f.relative_path.to_lowercase() != rest_lower {
                return false;
            }
            let root_leaf = f
                .root
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if root_leaf == head_lower {
                return true;
            }
            f.workspace
                .as_deref()
                .map(|tag| tag.to_lowercase() == head_lower)
                .unwrap_or(false)
        })
        .map(|(i, _)| i)
        .collect()
}

/// Strategy 4: inputs containing `..`, resolved against each root.
fn match_parent_relative(index: &WorkspaceIndex, normalized: &str) -> Vec<usize> {
    if !normalized.split('/').any(|seg| seg == "..") {
        return Vec::new();
    }
    let mut matches = Vec::new();
    for (i, file) in index.files().iter().enumerate() {
        let resolved = lexical_resolve(&file.root, normalized);
        let resolved_str = resolved.to_string_lossy().to_lowercase();
        let absolute_str = file.absolute_path.to_string_lossy().to_lowercase();
        if resolved_str == absolute_str {
            matches.push(i);
        }
    }
    matches
}

// ============================================================================
// Helpers
// ============================================================================

/// Normalize separators, strip a leading `./`.
fn normalize(input: &str) -> String {
    let mut s = input.replace('\\', "/");
    while let Some(stripped) = s.strip_prefix("./") {
        s = stripped.to_string();
    }
    s
}

/// Lexically resolve a relative path (possibly containing `..`) against a
/// base directory, without touching the filesystem.
fn lexical_resolve(base: &Path, relative: &str) -> PathBuf {
    let mut out = PathBuf::from(base);
    for component in Path::new(relative).components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            Component::Normal(seg) => out.push(seg),
            Component::RootDir | Component::Prefix(_) => {}
        }
    }
    out
}

/// The form a caller can resubmit to address exactly this file.
fn disambiguated_form(index: &WorkspaceIndex, file: &FileRecord) -> String {
    if index.merged {
        file.display_path(true)
    } else {
        // Multiple matches inside one workspace: qualify with the root leaf.
        let leaf = file
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}/{}", leaf, file.relative_path)
    }
}

/// Up to [`MAX_SUGGESTIONS`] candidate paths, nearest file names first,
/// grouped by workspace when merged.
fn suggestions_for(index: &WorkspaceIndex, normalized: &str) -> Vec<String> {
    let wanted_name = normalized
        .rsplit('/')
        .next()
        .unwrap_or(normalized)
        .to_lowercase();

    let mut scored: Vec<(usize, &FileRecord)> = index
        .files()
        .iter()
        .map(|f| {
            (
                crate::dupes::levenshtein(&f.file_name.to_lowercase(), &wanted_name),
                f,
            )
        })
        .collect();
    scored.sort_by(|a, b| {
        a.0.cmp(&b.0).then_with(|| {
            (a.1.workspace.as_deref(), a.1.relative_path.as_str())
                .cmp(&(b.1.workspace.as_deref(), b.1.relative_path.as_str()))
        })
    });
    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, f)| f.display_path(index.merged))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::CFamilyParser;
    use crate::index::{IndexBuilder, WorkspaceRoot};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn single_root() -> (TempDir, WorkspaceIndex) {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Services/Sync.cs", "public class Sync { }\n");
        write(dir.path(), "Models/Item.cs", "public class Item { }\n");
        write(dir.path(), "Models/Sub/Item.cs", "public class Item2 { }\n");
        let parser = CFamilyParser::new();
        let index = IndexBuilder::new()
            .build("one", &[WorkspaceRoot::new(dir.path())], &parser, 1)
            .unwrap();
        (dir, index)
    }

    fn merged_roots() -> (TempDir, TempDir, WorkspaceIndex) {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        write(a.path(), "File.cs", "public class A { }\n");
        write(b.path(), "File.cs", "public class B { }\n");
        let parser = CFamilyParser::new();
        let index = IndexBuilder::new()
            .build(
                "merged",
                &[
                    WorkspaceRoot::with_tag(a.path(), "ProjA"),
                    WorkspaceRoot::with_tag(b.path(), "ProjB"),
                ],
                &parser,
                1,
            )
            .unwrap();
        (a, b, index)
    }

    #[test]
    fn exact_relative_match() {
        let (_dir, index) = single_root();
        let file = resolve(&index, "Services/Sync.cs").unwrap();
        assert_eq!(file.relative_path, "Services/Sync.cs");
    }

    #[test]
    fn match_is_case_insensitive_and_slash_normalized() {
        let (_dir, index) = single_root();
        let file = resolve(&index, "services\\sync.CS").unwrap();
        assert_eq!(file.relative_path, "Services/Sync.cs");
    }

    #[test]
    fn leading_dot_slash_is_stripped() {
        let (_dir, index) = single_root();
        assert!(resolve(&index, "./Services/Sync.cs").is_ok());
    }

    #[test]
    fn bare_file_name_unique() {
        let (_dir, index) = single_root();
        let file = resolve(&index, "Sync.cs").unwrap();
        assert_eq!(file.relative_path, "Services/Sync.cs");
    }

    #[test]
    fn bare_file_name_ambiguous_within_one_root() {
        let (_dir, index) = single_root();
        let err = resolve(&index, "Item.cs").unwrap_err();
        match err {
            EngineError::Ambiguous { candidates, .. } => {
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("expected ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn merged_same_relative_path_is_ambiguous() {
        let (_a, _b, index) = merged_roots();
        let err = resolve(&index, "File.cs").unwrap_err();
        match err {
            EngineError::Ambiguous { candidates, .. } => {
                assert!(candidates.contains(&"ProjA/File.cs".to_string()));
                assert!(candidates.contains(&"ProjB/File.cs".to_string()));
            }
            other => panic!("expected ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn workspace_tag_prefix_disambiguates() {
        let (_a, _b, index) = merged_roots();
        let file = resolve(&index, "ProjA/File.cs").unwrap();
        assert_eq!(file.workspace.as_deref(), Some("ProjA"));
        let file = resolve(&index, "ProjB/File.cs").unwrap();
        assert_eq!(file.workspace.as_deref(), Some("ProjB"));
    }

    #[test]
    fn root_leaf_prefix_is_stripped() {
        let (dir, index) = single_root();
        let leaf = dir.path().file_name().unwrap().to_string_lossy().into_owned();
        let file = resolve(&index, &format!("{}/Services/Sync.cs", leaf)).unwrap();
        assert_eq!(file.relative_path, "Services/Sync.cs");
    }

    #[test]
    fn parent_segments_resolve_against_roots() {
        let (_dir, index) = single_root();
        let file = resolve(&index, "Models/../Services/Sync.cs").unwrap();
        assert_eq!(file.relative_path, "Services/Sync.cs");
    }

    #[test]
    fn not_found_carries_bounded_suggestions() {
        let (_dir, index) = single_root();
        let err = resolve(&index, "Sink.cs").unwrap_err();
        match err {
            EngineError::NotFound { suggestions, .. } => {
                assert!(!suggestions.is_empty());
                assert!(suggestions.len() <= MAX_SUGGESTIONS);
                // Closest name first.
                assert_eq!(suggestions[0], "Services/Sync.cs");
            }
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[test]
    fn empty_input_is_a_validation_error() {
        let (_dir, index) = single_root();
        assert!(matches!(
            resolve(&index, "  "),
            Err(EngineError::Validation { .. })
        ));
    }

    #[test]
    fn resolve_is_idempotent() {
        let (_dir, index) = single_root();
        let first = resolve(&index, "Sync.cs").unwrap().relative_path.clone();
        let second = resolve(&index, "Sync.cs").unwrap().relative_path.clone();
        assert_eq!(first, second);
    }
}
