//! Structural parser seam and the reference C#-family adapter.
//!
//! The engine consumes [`FileStructure`] values through the
//! [`StructuralParser`] trait and never re-derives declarations from raw text
//! itself. `CFamilyParser` is the reference adapter: a regex-driven,
//! syntax-level extractor for C#-style sources (namespaces, usings, type and
//! member declarations, call mentions inside bodies).
//!
//! The parsing functions here are deliberately isolated and fixture-tested:
//! line-oriented regex matching is the most likely source of silent false
//! negatives (nested parens in arguments, multi-line signatures, braces in
//! string literals), so each one is small enough to test on its own. Results
//! are heuristic: downstream consumers treat them as "at least these", never
//! "exactly these".

use regex::Regex;

use crate::structure::{
    AccessLevel, FileStructure, MemberKind, MemberRecord, TypeKind, TypeRecord,
};
use crate::types::LineSpan;

// ============================================================================
// Parser Trait
// ============================================================================

/// Converts one file's source text into its structural records.
///
/// Implementations must be pure with respect to the source text: no
/// filesystem access, no global state.
pub trait StructuralParser: Send + Sync {
    /// Parse the structure of a single source file.
    fn parse(&self, source: &str) -> FileStructure;

    /// Find call mentions in a stretch of body text.
    ///
    /// Used by the index builder to derive [`crate::index::CallSite`]s from
    /// member bodies; kept on the trait so index and adapter agree on what a
    /// call looks like.
    fn calls_in(&self, text: &str) -> Vec<RawCall>;

    /// File extensions (without dot) this parser understands.
    fn extensions(&self) -> &[&str];
}

// ============================================================================
// Raw Call Mentions
// ============================================================================

/// A call mention found inside a member body, before index-level resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCall {
    /// Qualifier before the dot (`Foo` in `Foo.Bar(..)`), if any.
    pub qualifier: Option<String>,
    /// Called method name.
    pub name: String,
    /// 0-based line offset within the scanned text.
    pub line_offset: u32,
    /// 1-based column of the method name.
    pub col: u32,
}

/// Keywords that look like calls to the call-site regex but are not.
const CALL_KEYWORDS: &[&str] = &[
    "if", "for", "foreach", "while", "switch", "catch", "using", "lock",
    "return", "nameof", "typeof", "sizeof", "checked", "unchecked", "base",
    "this", "when", "fixed", "throw",
];

// ============================================================================
// CFamilyParser
// ============================================================================

/// Regex-driven structural parser for C#-family source files.
pub struct CFamilyParser {
    import_re: Regex,
    namespace_re: Regex,
    type_re: Regex,
    method_re: Regex,
    ctor_re: Regex,
    property_re: Regex,
    field_re: Regex,
    event_re: Regex,
    call_re: Regex,
}

impl CFamilyParser {
    /// Build the adapter with its compiled patterns.
    pub fn new() -> Self {
        const MODS: &str = r"(?:(?:public|internal|protected|private|static|virtual|override|abstract|async|sealed|partial|readonly|extern|new|unsafe)\s+)*";
        CFamilyParser {
            import_re: Regex::new(r"^\s*(?:global\s+)?using\s+(?:static\s+)?([A-Za-z_][\w.]*)\s*;")
                .expect("import regex"),
            namespace_re: Regex::new(r"^\s*namespace\s+([A-Za-z_][\w.]*)").expect("namespace regex"),
            type_re: Regex::new(&format!(
                r"^\s*(?P<mods>{MODS})(?P<kind>class|interface|struct|enum|record|delegate)\s+(?P<name>[A-Za-z_]\w*)(?P<rest>[^\r\n]*)$"
            ))
            .expect("type regex"),
            method_re: Regex::new(&format!(
                r"^\s*(?P<mods>{MODS})(?P<ret>[A-Za-z_][\w.<>\[\],? ]*?)\s+(?P<name>[A-Za-z_]\w*)\s*\((?P<params>[^)]*)\)\s*(?P<tail>.*)$"
            ))
            .expect("method regex"),
            ctor_re: Regex::new(&format!(
                r"^\s*(?P<mods>{MODS})(?P<name>[A-Za-z_]\w*)\s*\((?P<params>[^)]*)\)\s*(?P<tail>[:{{].*|)$"
            ))
            .expect("ctor regex"),
            property_re: Regex::new(&format!(
                r"^\s*(?P<mods>{MODS})(?P<ret>[A-Za-z_][\w.<>\[\],? ]*?)\s+(?P<name>[A-Za-z_]\w*)\s*(?P<tail>\{{.*|=>.*)$"
            ))
            .expect("property regex"),
            field_re: Regex::new(&format!(
                r"^\s*(?P<mods>{MODS})(?P<ret>[A-Za-z_][\w.<>\[\],? ]*?)\s+(?P<name>[A-Za-z_]\w*)\s*(?:=[^=][^;]*)?;\s*$"
            ))
            .expect("field regex"),
            event_re: Regex::new(&format!(
                r"^\s*(?P<mods>{MODS})event\s+(?P<ret>[A-Za-z_][\w.<>]*)\s+(?P<name>[A-Za-z_]\w*)"
            ))
            .expect("event regex"),
            call_re: Regex::new(
                r"(?:(?P<qual>[A-Za-z_]\w*)\s*\.\s*)?(?P<name>[A-Za-z_]\w*)\s*\(",
            )
            .expect("call regex"),
        }
    }

    // ------------------------------------------------------------------
    // Isolated parsing functions
    // ------------------------------------------------------------------

    /// Extract `using` directives.
    pub fn parse_imports(&self, source: &str) -> Vec<String> {
        source
            .lines()
            .filter_map(|line| self.import_re.captures(line))
            .map(|c| c[1].to_string())
            .collect()
    }

    /// Extract the first declared namespace, if any.
    pub fn parse_namespace(&self, source: &str) -> Option<String> {
        source
            .lines()
            .find_map(|line| self.namespace_re.captures(line))
            .map(|c| c[1].to_string())
    }

    /// Find call mentions in a stretch of body text.
    ///
    /// Line comments are stripped before matching; constructor invocations
    /// (`new Foo(..)`) and control-flow keywords are skipped. String-literal
    /// contents are not masked, which can over-match; accepted as part of the
    /// syntax-level contract.
    pub fn find_calls(&self, text: &str) -> Vec<RawCall> {
        let mut out = Vec::new();
        for (offset, raw_line) in text.lines().enumerate() {
            let line = strip_line_comment(raw_line);
            for caps in self.call_re.captures_iter(line) {
                let name_match = caps.name("name").expect("name group");
                let name = name_match.as_str();
                if CALL_KEYWORDS.contains(&name) {
                    continue;
                }
                // Skip `new Foo(` object creations.
                let start = caps.get(0).expect("whole match").start();
                if preceded_by_new(line, start) {
                    continue;
                }
                let qualifier = caps.name("qual").map(|m| m.as_str().to_string());
                if let Some(q) = &qualifier {
                    if CALL_KEYWORDS.contains(&q.as_str()) {
                        continue;
                    }
                }
                out.push(RawCall {
                    qualifier,
                    name: name.to_string(),
                    line_offset: offset as u32,
                    col: name_match.start() as u32 + 1,
                });
            }
        }
        out
    }

    /// Parse one line as a member declaration header inside `type_name`.
    fn parse_member_header(&self, line: &str, type_name: &str) -> Option<MemberHeader> {
        let trimmed = line.trim_start();
        if trimmed.is_empty()
            || trimmed.starts_with("//")
            || trimmed.starts_with('[')
            || trimmed.starts_with('#')
        {
            return None;
        }
        if starts_with_control_keyword(trimmed) {
            return None;
        }

        if let Some(caps) = self.event_re.captures(line) {
            return Some(MemberHeader {
                kind: MemberKind::Event,
                name: caps["name"].to_string(),
                return_type: caps["ret"].to_string(),
                mods: caps["mods"].to_string(),
                params: String::new(),
            });
        }

        // Constructor: the declared name equals the containing type's name.
        if let Some(caps) = self.ctor_re.captures(line) {
            if &caps["name"] == type_name {
                return Some(MemberHeader {
                    kind: MemberKind::Constructor,
                    name: caps["name"].to_string(),
                    return_type: "void".to_string(),
                    mods: caps["mods"].to_string(),
                    params: caps["params"].to_string(),
                });
            }
        }

        if let Some(caps) = self.method_re.captures(line) {
            let ret = caps["ret"].trim().to_string();
            let tail = caps["tail"].trim_start();
            let tail_ok = tail.is_empty()
                || tail.starts_with('{')
                || tail.starts_with("=>")
                || tail.starts_with(';')
                || tail.starts_with("where");
            if tail_ok && !ret.is_empty() && TypeKind::from_keyword(&ret).is_none() {
                return Some(MemberHeader {
                    kind: MemberKind::Method,
                    name: caps["name"].to_string(),
                    return_type: ret,
                    mods: caps["mods"].to_string(),
                    params: caps["params"].to_string(),
                });
            }
        }

        // Property before field: `Type Name {` / `Type Name =>`.
        if !trimmed.contains('(') {
            if let Some(caps) = self.property_re.captures(line) {
                let ret = caps["ret"].trim().to_string();
                if TypeKind::from_keyword(&ret).is_none() {
                    return Some(MemberHeader {
                        kind: MemberKind::Property,
                        name: caps["name"].to_string(),
                        return_type: ret,
                        mods: caps["mods"].to_string(),
                        params: String::new(),
                    });
                }
            }
            if let Some(caps) = self.field_re.captures(line) {
                let ret = caps["ret"].trim().to_string();
                if TypeKind::from_keyword(&ret).is_none() && ret != "return" {
                    return Some(MemberHeader {
                        kind: MemberKind::Field,
                        name: caps["name"].to_string(),
                        return_type: ret,
                        mods: caps["mods"].to_string(),
                        params: String::new(),
                    });
                }
            }
        }

        None
    }
}

impl Default for CFamilyParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Intermediate result of matching a member declaration line.
struct MemberHeader {
    kind: MemberKind,
    name: String,
    return_type: String,
    mods: String,
    params: String,
}

impl MemberHeader {
    fn access(&self) -> AccessLevel {
        self.mods
            .split_whitespace()
            .find_map(AccessLevel::from_keyword)
            .unwrap_or_default()
    }

    fn has_mod(&self, word: &str) -> bool {
        self.mods.split_whitespace().any(|m| m == word)
    }
}

impl StructuralParser for CFamilyParser {
    fn parse(&self, source: &str) -> FileStructure {
        let lines: Vec<&str> = source.lines().collect();
        let namespace = self.parse_namespace(source);
        let imports = self.parse_imports(source);
        let mut types = Vec::new();

        let mut i = 0usize;
        while i < lines.len() {
            let line = lines[i];
            let Some(caps) = self.type_re.captures(line) else {
                i += 1;
                continue;
            };
            let kind = TypeKind::from_keyword(&caps["kind"]).expect("matched keyword");
            let rest = caps["rest"].to_string();
            // `delegate <return-type> Name(..)`: the first identifier after
            // the keyword is the return type, not the declared name.
            let name = if kind == TypeKind::Delegate {
                delegate_name(&caps["name"], &rest)
            } else {
                caps["name"].to_string()
            };
            let doc = collect_doc(&lines, i);

            if kind == TypeKind::Delegate {
                types.push(TypeRecord {
                    qualified_name: qualify(&namespace, &name),
                    name,
                    kind,
                    base_type: None,
                    interfaces: Vec::new(),
                    members: Vec::new(),
                    is_abstract: false,
                    span: LineSpan::new(i as u32 + 1, i as u32 + 1),
                    doc,
                });
                i += 1;
                continue;
            }

            let (base_type, interfaces) = parse_base_list(&rest, &lines, i);
            let end = match find_block_end(&lines, i) {
                Some(end) => end,
                None => {
                    // Single-line declaration (`record Point(int X, int Y);`).
                    types.push(TypeRecord {
                        qualified_name: qualify(&namespace, &name),
                        name,
                        kind,
                        base_type,
                        interfaces,
                        members: Vec::new(),
                        is_abstract: false,
                        span: LineSpan::new(i as u32 + 1, i as u32 + 1),
                        doc,
                    });
                    i += 1;
                    continue;
                }
            };

            let members = if kind == TypeKind::Enum {
                Vec::new()
            } else {
                self.parse_members(&lines, i, end, &name)
            };

            types.push(TypeRecord {
                qualified_name: qualify(&namespace, &name),
                name,
                kind,
                base_type,
                interfaces,
                members,
                is_abstract: caps["mods"].split_whitespace().any(|m| m == "abstract"),
                span: LineSpan::new(i as u32 + 1, end as u32 + 1),
                doc,
            });
            i += 1;
        }

        FileStructure {
            namespace,
            types,
            imports,
        }
    }

    fn calls_in(&self, text: &str) -> Vec<RawCall> {
        self.find_calls(text)
    }

    fn extensions(&self) -> &[&str] {
        &["cs"]
    }
}

impl CFamilyParser {
    /// Scan a type's block for member declarations at nesting depth one.
    fn parse_members(
        &self,
        lines: &[&str],
        type_start: usize,
        type_end: usize,
        type_name: &str,
    ) -> Vec<MemberRecord> {
        let mut members = Vec::new();
        let body_start = match opening_brace_line(lines, type_start, type_end) {
            Some(l) => l,
            None => return members,
        };

        let mut depth = 0i32;
        let mut i = body_start;
        while i <= type_end && i < lines.len() {
            let line = lines[i];
            if depth == 1 && i > body_start {
                if let Some(header) = self.parse_member_header(line, type_name) {
                    let member = self.build_member(lines, i, type_end, header);
                    let member_end = member.span.end as usize - 1;
                    members.push(member);
                    i = member_end + 1;
                    continue;
                }
            }
            depth += brace_delta(line);
            i += 1;
        }
        members
    }

    /// Materialize a member record: span, body text, calls, doc.
    fn build_member(
        &self,
        lines: &[&str],
        decl_line: usize,
        type_end: usize,
        header: MemberHeader,
    ) -> MemberRecord {
        let line = lines[decl_line];
        let signature = signature_of(line);
        let doc = collect_doc(lines, decl_line);

        let (end_line, body_start, body) = match header.kind {
            MemberKind::Field | MemberKind::Event => (decl_line, None, String::new()),
            _ => member_extent(lines, decl_line, type_end),
        };

        let calls = if body.is_empty() {
            Vec::new()
        } else {
            self.find_calls(&body).into_iter().map(|c| c.name).collect()
        };

        MemberRecord {
            name: header.name.clone(),
            kind: header.kind,
            return_type: header.return_type.clone(),
            signature,
            access: header.access(),
            span: LineSpan::new(decl_line as u32 + 1, end_line as u32 + 1),
            body_start_line: body_start.map(|l| l as u32 + 1).unwrap_or(0),
            body,
            parameter_types: parse_parameter_types(&header.params),
            calls,
            is_static: header.has_mod("static"),
            is_async: header.has_mod("async"),
            is_virtual: header.has_mod("virtual"),
            is_override: header.has_mod("override"),
            is_abstract: header.has_mod("abstract"),
            doc,
        }
    }
}

// ============================================================================
// Line-Level Helpers
// ============================================================================

/// Strip a trailing `// ...` comment from a line.
fn strip_line_comment(line: &str) -> &str {
    match line.find("//") {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Whether the call match at `start` is preceded by the `new` keyword.
fn preceded_by_new(line: &str, start: usize) -> bool {
    line[..start]
        .trim_end()
        .rsplit(|c: char| !c.is_alphanumeric() && c != '_')
        .next()
        .map(|w| w == "new")
        .unwrap_or(false)
}

/// Whether a trimmed line begins with a control-flow keyword.
fn starts_with_control_keyword(trimmed: &str) -> bool {
    const CONTROL: &[&str] = &[
        "if", "else", "for", "foreach", "while", "do", "switch", "case",
        "return", "throw", "try", "catch", "finally", "using", "break",
        "continue", "yield", "lock", "goto",
    ];
    let word: String = trimmed
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    CONTROL.contains(&word.as_str())
}

/// Brace stats of one line, skipping string/char literals and anything after
/// `//`: (net depth change, saw an opening brace).
fn line_brace_stats(line: &str) -> (i32, bool) {
    let mut delta = 0i32;
    let mut saw_open = false;
    let mut chars = line.chars().peekable();
    let mut in_string = false;
    let mut in_char = false;
    while let Some(c) = chars.next() {
        if in_string {
            match c {
                '\\' => {
                    chars.next();
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if in_char {
            match c {
                '\\' => {
                    chars.next();
                }
                '\'' => in_char = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '\'' => in_char = true,
            '/' if chars.peek() == Some(&'/') => break,
            '{' => {
                delta += 1;
                saw_open = true;
            }
            '}' => delta -= 1,
            _ => {}
        }
    }
    (delta, saw_open)
}

/// Net brace depth change of one line.
fn brace_delta(line: &str) -> i32 {
    line_brace_stats(line).0
}

/// Find the line index of a block's closing brace, starting at `start`.
///
/// Returns `None` when the declaration has no block (terminated by `;`
/// before any `{`).
fn find_block_end(lines: &[&str], start: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut seen_open = false;
    for (i, line) in lines.iter().enumerate().skip(start) {
        if !seen_open {
            let code = strip_line_comment(line);
            if let Some(semi) = code.find(';') {
                if !code[..semi].contains('{') {
                    return None;
                }
            }
        }
        let (delta, saw_open) = line_brace_stats(line);
        if saw_open {
            seen_open = true;
        }
        depth += delta;
        if seen_open && depth <= 0 {
            return Some(i);
        }
    }
    None
}

/// Line index of the block's opening brace within `[start, end]`.
fn opening_brace_line(lines: &[&str], start: usize, end: usize) -> Option<usize> {
    (start..=end.min(lines.len().saturating_sub(1))).find(|&i| line_brace_stats(lines[i]).1)
}

/// Extent, body start line, and body text of a method/property/constructor.
///
/// Handles brace blocks, expression bodies (`=> ...;`), and bodyless
/// declarations (`;` on abstract/interface members). The middle element is
/// the 0-based line where the body text begins, `None` for bodyless members.
fn member_extent(
    lines: &[&str],
    decl_line: usize,
    type_end: usize,
) -> (usize, Option<usize>, String) {
    let header = strip_line_comment(lines[decl_line]);

    // Bodyless declaration.
    if header.trim_end().ends_with(';') && !header.contains("=>") && !header.contains('{') {
        return (decl_line, None, String::new());
    }

    // Single-line brace block: `public string Name { get; set; }`.
    let (delta, saw_open) = line_brace_stats(header);
    if saw_open && delta == 0 {
        let inner = header
            .find('{')
            .and_then(|o| header.rfind('}').map(|c| &header[o + 1..c]))
            .unwrap_or("");
        return (decl_line, Some(decl_line), inner.trim().to_string());
    }

    // Expression body: text after `=>` through the terminating `;`.
    if let Some(arrow) = header.find("=>") {
        let mut body = header[arrow + 2..].trim().trim_end_matches(';').to_string();
        if header.trim_end().ends_with(';') {
            return (decl_line, Some(decl_line), body);
        }
        for (i, line) in lines.iter().enumerate().skip(decl_line + 1) {
            let code = strip_line_comment(line);
            body.push('\n');
            body.push_str(code.trim().trim_end_matches(';'));
            if code.contains(';') || i >= type_end {
                return (i, Some(decl_line), body);
            }
        }
        return (type_end, Some(decl_line), body);
    }

    // Brace block.
    match find_block_end(lines, decl_line) {
        Some(end) => {
            let open = opening_brace_line(lines, decl_line, end).unwrap_or(decl_line);
            if open == end {
                // `{ ... }` on one line: take what's between the braces.
                let code = strip_line_comment(lines[open]);
                let inner = code
                    .find('{')
                    .and_then(|o| code.rfind('}').map(|c| &code[o + 1..c]))
                    .unwrap_or("");
                (end, Some(open), inner.to_string())
            } else {
                (end, Some(open + 1), lines[open + 1..end].to_vec().join("\n"))
            }
        }
        None => (decl_line, None, String::new()),
    }
}

/// Trimmed declaration text up to the body-start token.
fn signature_of(line: &str) -> String {
    let code = strip_line_comment(line);
    let cut = code
        .find('{')
        .or_else(|| code.find("=>"))
        .or_else(|| code.rfind(';'))
        .unwrap_or(code.len());
    code[..cut].trim().to_string()
}

/// Split `rest` of a type declaration line into base type and interfaces.
///
/// Convention: a base segment starting with `I` followed by an uppercase
/// letter is an interface; the first non-interface name is the base type.
fn parse_base_list(rest: &str, _lines: &[&str], _decl: usize) -> (Option<String>, Vec<String>) {
    let Some(colon) = rest.find(':') else {
        return (None, Vec::new());
    };
    let list = rest[colon + 1..]
        .split(|c| c == '{' || c == ';')
        .next()
        .unwrap_or("");
    let mut base = None;
    let mut interfaces = Vec::new();
    for part in list.split(',') {
        let name = part.trim().split('<').next().unwrap_or("").trim().to_string();
        if name.is_empty() || name == "where" {
            continue;
        }
        if looks_like_interface(&name) {
            interfaces.push(name);
        } else if base.is_none() {
            base = Some(name);
        } else {
            interfaces.push(name);
        }
    }
    (base, interfaces)
}

fn looks_like_interface(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next() == Some('I') && chars.next().map(|c| c.is_uppercase()).unwrap_or(false)
}

/// Parameter type names from a parameter-list string.
fn parse_parameter_types(params: &str) -> Vec<String> {
    params
        .split(',')
        .filter_map(|p| {
            let p = p.split('=').next().unwrap_or("").trim();
            if p.is_empty() {
                return None;
            }
            let words: Vec<&str> = p.split_whitespace().collect();
            if words.len() < 2 {
                return None;
            }
            // Drop modifiers (`ref`, `out`, `in`, `params`, `this`), keep the type.
            let ty_words: Vec<&str> = words[..words.len() - 1]
                .iter()
                .copied()
                .filter(|w| !matches!(*w, "ref" | "out" | "in" | "params" | "this"))
                .collect();
            if ty_words.is_empty() {
                None
            } else {
                Some(ty_words.join(" "))
            }
        })
        .collect()
}

/// Doc text from contiguous `///` lines directly above a declaration.
fn collect_doc(lines: &[&str], decl_line: usize) -> Option<String> {
    let mut collected = Vec::new();
    let mut i = decl_line;
    while i > 0 {
        i -= 1;
        let trimmed = lines[i].trim_start();
        if let Some(text) = trimmed.strip_prefix("///") {
            collected.push(text.trim().to_string());
        } else if trimmed.starts_with('[') {
            continue;
        } else {
            break;
        }
    }
    if collected.is_empty() {
        None
    } else {
        collected.reverse();
        Some(collected.join("\n"))
    }
}

/// Declared name of a delegate: the identifier adjacent to the parameter
/// list's opening paren (the regex's name capture holds the return type).
fn delegate_name(first_ident: &str, rest: &str) -> String {
    match rest.find('(') {
        Some(p) => rest[..p]
            .rsplit(|c: char| !(c.is_alphanumeric() || c == '_'))
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| first_ident.to_string()),
        None => first_ident.to_string(),
    }
}

/// Qualify a type name with its namespace.
fn qualify(namespace: &Option<String>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{}.{}", ns, name),
        None => name.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> CFamilyParser {
        CFamilyParser::new()
    }

    const FIXTURE: &str = r#"using System;
using System.Collections.Generic;
using static System.Math;

namespace App.Services
{
    /// <summary>Synchronizes things.</summary>
    public class SyncService : ServiceBase, IDisposable
    {
        private readonly int _retries = 3;

        public string Name { get; set; }

        public SyncService(int retries)
        {
            _retries = retries;
        }

        /// Runs one sync pass.
        public async Task<bool> Run(int count)
        {
            var items = Collect(count);
            Log.Write("starting"); // trace
            return Process(items);
        }

        public override string ToString() => Name.Trim();

        private List<int> Collect(int count)
        {
            if (count > 0)
            {
                Helper.Expand(count);
            }
            return new List<int>();
        }
    }

    public interface IWorker
    {
        void Work();
    }

    public enum Mode
    {
        Fast,
        Slow,
    }

    public delegate void Notify(string message);
}
"#;

    mod imports_and_namespace {
        use super::*;

        #[test]
        fn parses_usings_including_static_and_global() {
            let imports = parser().parse_imports(FIXTURE);
            assert_eq!(
                imports,
                vec!["System", "System.Collections.Generic", "System.Math"]
            );
        }

        #[test]
        fn parses_namespace() {
            assert_eq!(
                parser().parse_namespace(FIXTURE),
                Some("App.Services".to_string())
            );
        }

        #[test]
        fn file_scoped_namespace() {
            let src = "namespace App.Models;\n\npublic class M { }\n";
            assert_eq!(parser().parse_namespace(src), Some("App.Models".to_string()));
        }
    }

    mod type_declarations {
        use super::*;

        #[test]
        fn finds_all_type_kinds() {
            let parsed = parser().parse(FIXTURE);
            let names: Vec<&str> = parsed.type_names();
            assert_eq!(names, vec!["SyncService", "IWorker", "Mode", "Notify"]);

            let svc = &parsed.types[0];
            assert_eq!(svc.kind, TypeKind::Class);
            assert_eq!(svc.qualified_name, "App.Services.SyncService");
            assert_eq!(parsed.types[1].kind, TypeKind::Interface);
            assert_eq!(parsed.types[2].kind, TypeKind::Enum);
            assert_eq!(parsed.types[3].kind, TypeKind::Delegate);
        }

        #[test]
        fn base_and_interfaces_split() {
            let parsed = parser().parse(FIXTURE);
            let svc = &parsed.types[0];
            assert_eq!(svc.base_type.as_deref(), Some("ServiceBase"));
            assert_eq!(svc.interfaces, vec!["IDisposable"]);
        }

        #[test]
        fn doc_comment_is_captured() {
            let parsed = parser().parse(FIXTURE);
            let svc = &parsed.types[0];
            assert!(svc.doc.as_deref().unwrap().contains("Synchronizes"));
        }

        #[test]
        fn type_span_covers_block() {
            let parsed = parser().parse(FIXTURE);
            let svc = &parsed.types[0];
            assert!(svc.span.start < svc.span.end);
            assert!(svc.span.line_count() > 20);
        }

        #[test]
        fn enum_has_no_members() {
            let parsed = parser().parse(FIXTURE);
            assert!(parsed.types[2].members.is_empty());
        }
    }

    mod member_declarations {
        use super::*;

        #[test]
        fn finds_fields_properties_ctor_methods() {
            let parsed = parser().parse(FIXTURE);
            let svc = &parsed.types[0];
            let kinds: Vec<(String, MemberKind)> = svc
                .members
                .iter()
                .map(|m| (m.name.clone(), m.kind))
                .collect();
            assert!(kinds.contains(&("_retries".to_string(), MemberKind::Field)));
            assert!(kinds.contains(&("Name".to_string(), MemberKind::Property)));
            assert!(kinds.contains(&("SyncService".to_string(), MemberKind::Constructor)));
            assert!(kinds.contains(&("Run".to_string(), MemberKind::Method)));
            assert!(kinds.contains(&("Collect".to_string(), MemberKind::Method)));
        }

        #[test]
        fn method_flags_and_access() {
            let parsed = parser().parse(FIXTURE);
            let svc = &parsed.types[0];
            let run = svc.member("Run").unwrap();
            assert!(run.is_async);
            assert_eq!(run.access, AccessLevel::Public);
            assert_eq!(run.return_type, "Task<bool>");

            let to_string = svc.member("ToString").unwrap();
            assert!(to_string.is_override);

            let collect = svc.member("Collect").unwrap();
            assert_eq!(collect.access, AccessLevel::Private);
        }

        #[test]
        fn body_text_matches_source_lines() {
            let parsed = parser().parse(FIXTURE);
            let run = parsed.types[0].member("Run").unwrap();
            assert!(run.body.contains("var items = Collect(count);"));
            assert!(run.body.contains("return Process(items);"));
        }

        #[test]
        fn expression_bodied_member_captured() {
            let parsed = parser().parse(FIXTURE);
            let to_string = parsed.types[0].member("ToString").unwrap();
            assert_eq!(to_string.span.start, to_string.span.end);
            assert!(to_string.body.contains("Name.Trim()"));
        }

        #[test]
        fn interface_methods_are_bodyless() {
            let parsed = parser().parse(FIXTURE);
            let worker = &parsed.types[1];
            let work = worker.member("Work").unwrap();
            assert!(work.body.is_empty());
            assert_eq!(work.span.start, work.span.end);
        }

        #[test]
        fn member_calls_are_recorded() {
            let parsed = parser().parse(FIXTURE);
            let run = parsed.types[0].member("Run").unwrap();
            assert!(run.calls.contains(&"Collect".to_string()));
            assert!(run.calls.contains(&"Write".to_string()));
            assert!(run.calls.contains(&"Process".to_string()));
        }

        #[test]
        fn signature_is_declaration_text() {
            let parsed = parser().parse(FIXTURE);
            let collect = parsed.types[0].member("Collect").unwrap();
            assert_eq!(collect.signature, "private List<int> Collect(int count)");
        }

        #[test]
        fn parameter_types_parsed() {
            let parsed = parser().parse(FIXTURE);
            let ctor = parsed.types[0].member("SyncService").unwrap();
            assert_eq!(ctor.parameter_types, vec!["int"]);
        }
    }

    mod call_sites {
        use super::*;

        #[test]
        fn qualified_and_bare_calls() {
            let calls = parser().find_calls("var x = Helper.Expand(3);\nRun();");
            assert_eq!(calls.len(), 2);
            assert_eq!(calls[0].qualifier.as_deref(), Some("Helper"));
            assert_eq!(calls[0].name, "Expand");
            assert_eq!(calls[1].qualifier, None);
            assert_eq!(calls[1].name, "Run");
            assert_eq!(calls[1].line_offset, 1);
        }

        #[test]
        fn keywords_are_not_calls() {
            let calls = parser().find_calls("if (x) { foreach (var y in z) { } }\nreturn (a);");
            assert!(calls.is_empty());
        }

        #[test]
        fn object_creation_is_skipped() {
            let calls = parser().find_calls("var s = new StringBuilder();");
            assert!(calls.is_empty());
        }

        #[test]
        fn comment_tail_is_ignored() {
            let calls = parser().find_calls("DoWork(); // Cleanup() later");
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].name, "DoWork");
        }

        #[test]
        fn column_is_one_indexed() {
            let calls = parser().find_calls("Go();");
            assert_eq!(calls[0].col, 1);
        }
    }

    mod brace_helpers {
        use super::*;

        #[test]
        fn brace_delta_skips_strings_and_comments() {
            assert_eq!(brace_delta("if (x) {"), 1);
            assert_eq!(brace_delta("}"), -1);
            assert_eq!(brace_delta(r#"var s = "{{{";"#), 0);
            assert_eq!(brace_delta("var c = '{';"), 0);
            assert_eq!(brace_delta("x(); // {"), 0);
        }

        #[test]
        fn find_block_end_none_for_semicolon_decl() {
            let lines = vec!["public delegate void D(int x);", "class C", "{", "}"];
            assert_eq!(find_block_end(&lines, 0), None);
            assert_eq!(find_block_end(&lines, 1), Some(3));
        }
    }
}
