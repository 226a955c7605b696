//! Reference and call-graph analysis over the index.
//!
//! Everything here is syntax-level name matching, not type-checked
//! resolution. Results can miss calls hidden behind indirection (stored
//! delegates, reflection) and can over-match same-named symbols on unrelated
//! types when no type hint is given. Callers must treat results as "at least
//! these", never "exactly these".
//!
//! Read-only: the analyzer borrows an index snapshot and reads source files
//! from disk for context lines; it never mutates either.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::EngineError;
use crate::index::{FileRecord, WorkspaceIndex};
use crate::structure::MemberKind;

// ============================================================================
// Usage Kinds
// ============================================================================

/// How a symbol occurrence relates to the symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageKind {
    Definition,
    Reference,
    Implementation,
    Override,
    Invocation,
}

impl UsageKind {
    /// Parse a caller-supplied kind hint.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "definition" => Some(UsageKind::Definition),
            "reference" => Some(UsageKind::Reference),
            "implementation" => Some(UsageKind::Implementation),
            "override" => Some(UsageKind::Override),
            "invocation" => Some(UsageKind::Invocation),
            _ => None,
        }
    }
}

/// One occurrence of a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolUsage {
    /// Display path of the file.
    pub file: String,
    /// 1-indexed line.
    pub line: u32,
    /// 1-indexed column.
    pub column: u32,
    /// Trimmed text of the line, for caller context.
    pub context: String,
    /// Occurrence classification.
    pub kind: UsageKind,
}

// ============================================================================
// Find Usages
// ============================================================================

/// Find all usages of a symbol name, optionally filtered by kind.
///
/// Declarations come from the index's type/member records; invocations from
/// the call-site list; remaining word-boundary mentions in source files are
/// classified as plain references.
pub fn find_usages(
    index: &WorkspaceIndex,
    symbol: &str,
    kind_hint: Option<UsageKind>,
) -> Result<Vec<SymbolUsage>, EngineError> {
    if symbol.trim().is_empty() {
        return Err(EngineError::validation("symbol name must not be empty"));
    }
    let word_re = Regex::new(&format!(r"\b{}\b", regex::escape(symbol)))
        .map_err(|e| EngineError::internal(format!("usage regex: {}", e)))?;

    let mut sources = SourceCache::default();
    let mut usages: Vec<SymbolUsage> = Vec::new();
    // (file, line) pairs already classified as something stronger than a
    // plain reference.
    let mut claimed: HashSet<(String, u32)> = HashSet::new();

    // Type declarations, implementations, member definitions and overrides.
    for file in index.files() {
        let display = file.display_path(index.merged);
        for ty in &file.types {
            if ty.name == symbol {
                push_usage(
                    &mut usages,
                    &mut claimed,
                    &mut sources,
                    file,
                    &display,
                    ty.span.start,
                    symbol,
                    UsageKind::Definition,
                );
            }
            if ty.interfaces.iter().any(|i| i == symbol)
                || ty.base_type.as_deref() == Some(symbol)
            {
                push_usage(
                    &mut usages,
                    &mut claimed,
                    &mut sources,
                    file,
                    &display,
                    ty.span.start,
                    symbol,
                    UsageKind::Implementation,
                );
            }
            for member in &ty.members {
                if member.name == symbol {
                    let kind = if member.is_override {
                        UsageKind::Override
                    } else {
                        UsageKind::Definition
                    };
                    push_usage(
                        &mut usages,
                        &mut claimed,
                        &mut sources,
                        file,
                        &display,
                        member.span.start,
                        symbol,
                        kind,
                    );
                }
            }
        }
    }

    // Invocations from the call-site list.
    for site in index.call_sites() {
        if site.callee_member != symbol {
            continue;
        }
        if let Some(file) = file_by_display(index, &site.file) {
            push_usage(
                &mut usages,
                &mut claimed,
                &mut sources,
                file,
                &site.file,
                site.line,
                symbol,
                UsageKind::Invocation,
            );
        }
    }

    // Remaining textual mentions become plain references.
    for file in index.files() {
        if !file.extension.eq_ignore_ascii_case("cs") {
            continue;
        }
        let display = file.display_path(index.merged);
        let Some(content) = sources.get(file) else {
            continue;
        };
        for (idx, line) in content.lines().enumerate() {
            let line_no = idx as u32 + 1;
            if claimed.contains(&(display.clone(), line_no)) {
                continue;
            }
            if let Some(m) = word_re.find(line) {
                usages.push(SymbolUsage {
                    file: display.clone(),
                    line: line_no,
                    column: m.start() as u32 + 1,
                    context: line.trim().to_string(),
                    kind: UsageKind::Reference,
                });
            }
        }
    }

    if let Some(hint) = kind_hint {
        usages.retain(|u| u.kind == hint);
    }
    usages.sort_by(|a, b| {
        (a.file.as_str(), a.line, a.column).cmp(&(b.file.as_str(), b.line, b.column))
    });
    Ok(usages)
}

#[allow(clippy::too_many_arguments)]
fn push_usage(
    usages: &mut Vec<SymbolUsage>,
    claimed: &mut HashSet<(String, u32)>,
    sources: &mut SourceCache,
    file: &FileRecord,
    display: &str,
    line: u32,
    symbol: &str,
    kind: UsageKind,
) {
    let (context, column) = sources.line_context(file, line, symbol);
    claimed.insert((display.to_string(), line));
    usages.push(SymbolUsage {
        file: display.to_string(),
        line,
        column,
        context,
        kind,
    });
}

fn file_by_display<'a>(index: &'a WorkspaceIndex, display: &str) -> Option<&'a FileRecord> {
    index
        .files()
        .iter()
        .find(|f| f.display_path(index.merged) == display)
}

/// Per-call cache of file contents read for context lines.
#[derive(Default)]
struct SourceCache {
    contents: HashMap<String, Option<String>>,
}

impl SourceCache {
    fn get(&mut self, file: &FileRecord) -> Option<&str> {
        let key = file.absolute_path.to_string_lossy().into_owned();
        self.contents
            .entry(key)
            .or_insert_with(|| match std::fs::read_to_string(&file.absolute_path) {
                Ok(c) => Some(c),
                Err(err) => {
                    warn!(file = %file.relative_path, error = %err, "cannot read source for context");
                    None
                }
            })
            .as_deref()
    }

    /// Context text and 1-indexed column of `symbol` on the given line.
    fn line_context(&mut self, file: &FileRecord, line: u32, symbol: &str) -> (String, u32) {
        let Some(content) = self.get(file) else {
            return (String::new(), 1);
        };
        let Some(text) = content.lines().nth(line.saturating_sub(1) as usize) else {
            return (String::new(), 1);
        };
        let column = text.find(symbol).map(|p| p as u32 + 1).unwrap_or(1);
        (text.trim().to_string(), column)
    }
}

// ============================================================================
// Call Graph
// ============================================================================

/// Hard cap on traversal depth; dense graphs make deeper chains useless.
pub const MAX_CALL_DEPTH: u32 = 5;

/// One direct caller of the queried method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerEntry {
    pub caller_type: String,
    pub caller_member: String,
    pub file: String,
    pub line: u32,
    /// Transitive callers (`Type.Member` forms), present only when the query
    /// depth exceeds 1.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub upstream_callers: Vec<String>,
}

/// One direct callee of the queried method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalleeEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callee_type: Option<String>,
    pub callee_member: String,
    pub file: String,
    pub line: u32,
    /// Transitive callees (`Type.Member` forms), present only when the query
    /// depth exceeds 1.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub downstream_callees: Vec<String>,
}

/// Callers and callees of one method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallGraph {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    pub depth: u32,
    pub callers: Vec<CallerEntry>,
    pub callees: Vec<CalleeEntry>,
}

/// Build the call graph around one method.
///
/// Direct callers/callees come from call-site lookups keyed by method name
/// (and type name, when given, to disambiguate same-named methods). With
/// `depth > 1` each direct entry carries its transitive chain, capped at
/// `depth` hops and guarded against cycles.
pub fn call_graph(
    index: &WorkspaceIndex,
    type_name: Option<&str>,
    method: &str,
    depth: u32,
) -> Result<CallGraph, EngineError> {
    if method.trim().is_empty() {
        return Err(EngineError::validation("method name must not be empty"));
    }
    let depth = depth.clamp(1, MAX_CALL_DEPTH);

    let definitions = index.members_named(type_name, method);
    let direct_callers = index.call_sites_of(type_name, method);
    if definitions.is_empty() && direct_callers.is_empty() {
        let suggestions = member_name_suggestions(index, method);
        return Err(EngineError::not_found_with_suggestions(
            match type_name {
                Some(t) => format!("method '{}.{}'", t, method),
                None => format!("method '{}'", method),
            },
            suggestions,
        ));
    }

    let callers = direct_callers
        .iter()
        .map(|site| {
            let upstream_callers = if depth > 1 {
                walk_upstream(index, &site.caller_type, &site.caller_member, depth - 1)
            } else {
                Vec::new()
            };
            CallerEntry {
                caller_type: site.caller_type.clone(),
                caller_member: site.caller_member.clone(),
                file: site.file.clone(),
                line: site.line,
                upstream_callers,
            }
        })
        .collect();

    // Outgoing calls of each definition body.
    let mut callees = Vec::new();
    for (_, ty, _) in &definitions {
        for site in index.call_sites() {
            if site.caller_type != ty.name || site.caller_member != method {
                continue;
            }
            let downstream_callees = if depth > 1 {
                walk_downstream(index, site.callee_type.as_deref(), &site.callee_member, depth - 1)
            } else {
                Vec::new()
            };
            callees.push(CalleeEntry {
                callee_type: site.callee_type.clone(),
                callee_member: site.callee_member.clone(),
                file: site.file.clone(),
                line: site.line,
                downstream_callees,
            });
        }
    }

    Ok(CallGraph {
        method: method.to_string(),
        type_name: type_name.map(str::to_string),
        depth,
        callers,
        callees,
    })
}

/// Transitive callers of (type, member), up to `hops` further levels.
fn walk_upstream(index: &WorkspaceIndex, ty: &str, member: &str, hops: u32) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut frontier = vec![(ty.to_string(), member.to_string())];
    let mut out = Vec::new();
    for _ in 0..hops {
        let mut next = Vec::new();
        for (t, m) in frontier.drain(..) {
            for site in index.call_sites_of(Some(&t), &m) {
                let key = format!("{}.{}", site.caller_type, site.caller_member);
                if seen.insert(key.clone()) {
                    out.push(key);
                    next.push((site.caller_type.clone(), site.caller_member.clone()));
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    out
}

/// Transitive callees of (type, member), up to `hops` further levels.
fn walk_downstream(
    index: &WorkspaceIndex,
    ty: Option<&str>,
    member: &str,
    hops: u32,
) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut frontier = vec![(ty.map(str::to_string), member.to_string())];
    let mut out = Vec::new();
    for _ in 0..hops {
        let mut next = Vec::new();
        for (t, m) in frontier.drain(..) {
            for site in index.call_sites() {
                if site.caller_member != m {
                    continue;
                }
                if let Some(wanted) = &t {
                    if &site.caller_type != wanted {
                        continue;
                    }
                }
                let shown = match &site.callee_type {
                    Some(ct) => format!("{}.{}", ct, site.callee_member),
                    None => site.callee_member.clone(),
                };
                if seen.insert(shown.clone()) {
                    out.push(shown);
                    next.push((site.callee_type.clone(), site.callee_member.clone()));
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    out
}

fn member_name_suggestions(index: &WorkspaceIndex, wanted: &str) -> Vec<String> {
    let wanted_lower = wanted.to_lowercase();
    let mut names: Vec<(usize, String)> = index
        .files()
        .iter()
        .flat_map(|f| f.types.iter())
        .flat_map(|t| {
            t.members
                .iter()
                .filter(|m| m.kind == MemberKind::Method)
                .map(move |m| format!("{}.{}", t.name, m.name))
        })
        .map(|qualified| {
            let name = qualified.rsplit('.').next().unwrap_or(&qualified).to_lowercase();
            (crate::dupes::levenshtein(&name, &wanted_lower), qualified)
        })
        .collect();
    names.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    names.dedup_by(|a, b| a.1 == b.1);
    names.into_iter().take(10).map(|(_, n)| n).collect()
}

// ============================================================================
// Text Search
// ============================================================================

/// One plain-text search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub file: String,
    pub line: u32,
    pub context: String,
}

/// Case-insensitive substring search across indexed source files.
pub fn search_text(
    index: &WorkspaceIndex,
    query: &str,
    max_results: usize,
) -> Result<Vec<SearchHit>, EngineError> {
    if query.is_empty() {
        return Err(EngineError::validation("search query must not be empty"));
    }
    let needle = query.to_lowercase();
    let mut hits = Vec::new();
    for file in index.files() {
        let Ok(content) = std::fs::read_to_string(&file.absolute_path) else {
            continue;
        };
        let display = file.display_path(index.merged);
        for (idx, line) in content.lines().enumerate() {
            if line.to_lowercase().contains(&needle) {
                hits.push(SearchHit {
                    file: display.clone(),
                    line: idx as u32 + 1,
                    context: line.trim().to_string(),
                });
                if hits.len() >= max_results {
                    return Ok(hits);
                }
            }
        }
    }
    Ok(hits)
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

    /// Foo.Save called from Bar.Run and Baz.Init; IStore implemented by Foo.
    fn graph_workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "Foo.cs",
            r#"namespace App
{
    public class Foo : IStore
    {
        public void Save()
        {
            Flush();
        }

        private void Flush()
        {
        }
    }
}
"#,
        );
        write(
            dir.path(),
            "Bar.cs",
            r#"namespace App
{
    public class Bar
    {
        public void Run()
        {
            Foo.Save();
        }
    }
}
"#,
        );
        write(
            dir.path(),
            "Baz.cs",
            r#"namespace App
{
    public class Baz
    {
        public void Init()
        {
            Foo.Save();
        }

        public void Outer()
        {
            Init();
        }
    }
}
"#,
        );
        write(
            dir.path(),
            "IStore.cs",
            r#"namespace App
{
    public interface IStore
    {
        void Save();
    }
}
"#,
        );
        dir
    }

    fn build(dir: &TempDir) -> crate::index::WorkspaceIndex {
        let parser = CFamilyParser::new();
        IndexBuilder::new()
            .build("graph", &[WorkspaceRoot::new(dir.path())], &parser, 1)
            .unwrap()
    }

    mod usages {
        use super::*;

        #[test]
        fn definitions_overrides_and_invocations_are_classified() {
            let dir = graph_workspace();
            let index = build(&dir);
            let usages = find_usages(&index, "Save", None).unwrap();

            let defs: Vec<_> = usages
                .iter()
                .filter(|u| u.kind == UsageKind::Definition)
                .collect();
            // Foo.Save and IStore.Save.
            assert_eq!(defs.len(), 2);

            let invocations: Vec<_> = usages
                .iter()
                .filter(|u| u.kind == UsageKind::Invocation)
                .collect();
            assert_eq!(invocations.len(), 2);
            assert!(invocations.iter().all(|u| u.context.contains("Foo.Save()")));
        }

        #[test]
        fn interface_implementation_is_reported() {
            let dir = graph_workspace();
            let index = build(&dir);
            let usages = find_usages(&index, "IStore", None).unwrap();
            assert!(usages
                .iter()
                .any(|u| u.kind == UsageKind::Implementation && u.file == "Foo.cs"));
            assert!(usages
                .iter()
                .any(|u| u.kind == UsageKind::Definition && u.file == "IStore.cs"));
        }

        #[test]
        fn kind_hint_filters() {
            let dir = graph_workspace();
            let index = build(&dir);
            let only_defs = find_usages(&index, "Save", Some(UsageKind::Definition)).unwrap();
            assert!(only_defs.iter().all(|u| u.kind == UsageKind::Definition));
            assert_eq!(only_defs.len(), 2);
        }

        #[test]
        fn results_are_sorted_by_location() {
            let dir = graph_workspace();
            let index = build(&dir);
            let usages = find_usages(&index, "Foo", None).unwrap();
            let mut sorted = usages.clone();
            sorted.sort_by(|a, b| {
                (a.file.as_str(), a.line, a.column).cmp(&(b.file.as_str(), b.line, b.column))
            });
            assert_eq!(
                usages.iter().map(|u| (&u.file, u.line)).collect::<Vec<_>>(),
                sorted.iter().map(|u| (&u.file, u.line)).collect::<Vec<_>>()
            );
        }

        #[test]
        fn empty_symbol_is_rejected() {
            let dir = graph_workspace();
            let index = build(&dir);
            assert!(matches!(
                find_usages(&index, " ", None),
                Err(EngineError::Validation { .. })
            ));
        }
    }

    mod graph {
        use super::*;

        #[test]
        fn depth_one_returns_exactly_direct_callers() {
            let dir = graph_workspace();
            let index = build(&dir);
            let graph = call_graph(&index, Some("Foo"), "Save", 1).unwrap();

            assert_eq!(graph.callers.len(), 2);
            let caller_names: Vec<String> = graph
                .callers
                .iter()
                .map(|c| format!("{}.{}", c.caller_type, c.caller_member))
                .collect();
            assert!(caller_names.contains(&"Bar.Run".to_string()));
            assert!(caller_names.contains(&"Baz.Init".to_string()));

            // Depth 1 must leave chains empty.
            assert!(graph.callers.iter().all(|c| c.upstream_callers.is_empty()));
            assert!(graph.callees.iter().all(|c| c.downstream_callees.is_empty()));
        }

        #[test]
        fn depth_two_walks_one_more_hop() {
            let dir = graph_workspace();
            let index = build(&dir);
            let graph = call_graph(&index, Some("Foo"), "Save", 2).unwrap();

            let baz = graph
                .callers
                .iter()
                .find(|c| c.caller_type == "Baz")
                .unwrap();
            assert_eq!(baz.upstream_callers, vec!["Baz.Outer".to_string()]);

            let bar = graph
                .callers
                .iter()
                .find(|c| c.caller_type == "Bar")
                .unwrap();
            assert!(bar.upstream_callers.is_empty());
        }

        #[test]
        fn callees_come_from_the_definition_body() {
            let dir = graph_workspace();
            let index = build(&dir);
            let graph = call_graph(&index, Some("Foo"), "Save", 1).unwrap();
            assert_eq!(graph.callees.len(), 1);
            assert_eq!(graph.callees[0].callee_member, "Flush");
            assert_eq!(graph.callees[0].callee_type.as_deref(), Some("Foo"));
        }

        #[test]
        fn unknown_method_not_found_with_suggestions() {
            let dir = graph_workspace();
            let index = build(&dir);
            let err = call_graph(&index, None, "Sve", 1).unwrap_err();
            match err {
                EngineError::NotFound { suggestions, .. } => {
                    assert!(suggestions.iter().any(|s| s.ends_with(".Save")));
                }
                other => panic!("expected not found, got {:?}", other),
            }
        }

        #[test]
        fn depth_is_clamped() {
            let dir = graph_workspace();
            let index = build(&dir);
            let graph = call_graph(&index, Some("Foo"), "Save", 99).unwrap();
            assert_eq!(graph.depth, MAX_CALL_DEPTH);
        }
    }

    mod search {
        use super::*;

        #[test]
        fn search_finds_lines_case_insensitively() {
            let dir = graph_workspace();
            let index = build(&dir);
            let hits = search_text(&index, "foo.save", 100).unwrap();
            assert_eq!(hits.len(), 2);
        }

        #[test]
        fn search_caps_results() {
            let dir = graph_workspace();
            let index = build(&dir);
            let hits = search_text(&index, "void", 3).unwrap();
            assert_eq!(hits.len(), 3);
        }
    }
}
