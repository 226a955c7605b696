//! Workspace index: the in-memory structural model of a source tree.
//!
//! The index aggregates per-file [`FileStructure`]s into one unified model:
//! every indexed file, a type-name -> base-types hierarchy, a type -> type
//! dependency map, and the flat call-site list derived from member bodies.
//!
//! An index is built once per workspace load (or merge of several roots) and
//! is immutable afterwards; refresh replaces it wholesale. Files are ordered
//! deterministically (workspace tag, then relative path) and the index id is
//! a content hash over that ordering, so identical trees produce identical
//! ids.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::adapter::StructuralParser;
use crate::error::EngineError;
use crate::structure::{MemberRecord, TypeRecord};

// ============================================================================
// Language Detection
// ============================================================================

/// Detected language of an indexed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLanguage {
    /// C#-family source understood by the structural parser.
    CSharp,
    /// Markup views (.xaml, .cshtml, .razor).
    Markup,
    /// Configuration and project files (.json, .xml, .config, .csproj).
    Config,
    /// Anything else we index for path resolution only.
    Unknown,
}

impl SourceLanguage {
    /// Detect language from a file extension (without dot, lowercased).
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "cs" => SourceLanguage::CSharp,
            "xaml" | "axaml" | "cshtml" | "razor" => SourceLanguage::Markup,
            "json" | "xml" | "config" | "csproj" | "sln" | "props" | "targets" => {
                SourceLanguage::Config
            }
            _ => SourceLanguage::Unknown,
        }
    }
}

// ============================================================================
// Role Classification
// ============================================================================

/// Coarse role of a file inside the application's architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRole {
    View,
    Model,
    Service,
    Controller,
    Test,
    Config,
    Utility,
    Unknown,
}

impl FileRole {
    /// Classify from the relative path. Tests win over everything so that
    /// `Services/SyncServiceTests.cs` lands in the test bucket.
    pub fn classify(relative_path: &str, language: SourceLanguage) -> Self {
        let lower = relative_path.to_lowercase();
        let file_name = lower.rsplit('/').next().unwrap_or(&lower);

        if file_name.contains("test") || file_name.contains("spec") || lower.contains("/tests/") {
            return FileRole::Test;
        }
        if language == SourceLanguage::Config {
            return FileRole::Config;
        }
        if language == SourceLanguage::Markup
            || lower.contains("/views/")
            || file_name.ends_with("view.cs")
            || file_name.ends_with("window.cs")
            || file_name.ends_with("page.cs")
        {
            return FileRole::View;
        }
        if lower.contains("/controllers/") || file_name.ends_with("controller.cs") {
            return FileRole::Controller;
        }
        if lower.contains("/services/") || file_name.ends_with("service.cs") {
            return FileRole::Service;
        }
        if lower.contains("/models/") || file_name.ends_with("model.cs") || lower.contains("/entities/") {
            return FileRole::Model;
        }
        if file_name.ends_with("helper.cs")
            || file_name.ends_with("helpers.cs")
            || file_name.ends_with("util.cs")
            || file_name.ends_with("utils.cs")
            || file_name.ends_with("extensions.cs")
        {
            return FileRole::Utility;
        }
        FileRole::Unknown
    }
}

// ============================================================================
// Workspace Roots
// ============================================================================

/// One root directory contributing files to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRoot {
    /// Absolute root directory.
    pub path: PathBuf,
    /// Workspace tag used for disambiguation when several roots are merged.
    /// Defaults to the root directory's leaf name.
    pub tag: String,
}

impl WorkspaceRoot {
    /// Create a root tagged with its leaf directory name.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tag = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workspace".to_string());
        WorkspaceRoot { path, tag }
    }

    /// Create a root with an explicit tag.
    pub fn with_tag(path: impl Into<PathBuf>, tag: impl Into<String>) -> Self {
        WorkspaceRoot {
            path: path.into(),
            tag: tag.into(),
        }
    }
}

// ============================================================================
// File Record
// ============================================================================

/// One indexed file.
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    /// Absolute path on disk.
    pub absolute_path: PathBuf,
    /// Path relative to its root, forward slashes.
    pub relative_path: String,
    /// Owning root directory.
    pub root: PathBuf,
    /// Source-workspace tag; set when several workspaces are merged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// File name with extension.
    pub file_name: String,
    /// Extension without dot, lowercased.
    pub extension: String,
    /// Detected language.
    pub language: SourceLanguage,
    /// Coarse architectural role.
    pub role: FileRole,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Rough token estimate (bytes / 4).
    pub token_estimate: u64,
    /// Declared namespace, if the structural parser found one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Types declared in the file.
    pub types: Vec<TypeRecord>,
    /// Import directives.
    pub imports: Vec<String>,
    /// Outgoing type-name dependencies.
    pub dependencies: Vec<String>,
}

impl FileRecord {
    /// Display path: `tag/relative` in merged indexes, plain relative
    /// otherwise. This is the form the resolver accepts back verbatim.
    pub fn display_path(&self, merged: bool) -> String {
        match (&self.workspace, merged) {
            (Some(tag), true) => format!("{}/{}", tag, self.relative_path),
            _ => self.relative_path.clone(),
        }
    }

    /// Look up a declared type by simple name.
    pub fn type_named(&self, name: &str) -> Option<&TypeRecord> {
        self.types.iter().find(|t| t.name == name)
    }
}

// ============================================================================
// Call Sites
// ============================================================================

/// A recorded invocation of one method from inside another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallSite {
    /// Type containing the calling member.
    pub caller_type: String,
    /// Calling member name.
    pub caller_member: String,
    /// Callee type, when the qualifier resolves to a known type or the call
    /// is unqualified inside a type declaring the method. `None` when the
    /// receiver cannot be determined syntactically.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callee_type: Option<String>,
    /// Called method name.
    pub callee_member: String,
    /// Display path of the file containing the call.
    pub file: String,
    /// 1-indexed line of the call.
    pub line: u32,
}

// ============================================================================
// Index Stats
// ============================================================================

/// Summary counts for one built index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndexStats {
    pub files: usize,
    pub types: usize,
    pub members: usize,
    pub call_sites: usize,
}

// ============================================================================
// Cross-Workspace References
// ============================================================================

/// A type in one merged workspace depending on a type in another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrossWorkspaceRef {
    pub from_workspace: String,
    pub from_type: String,
    pub to_workspace: String,
    pub to_type: String,
}

// ============================================================================
// Workspace Index
// ============================================================================

/// The unified structural model of one (possibly merged) workspace.
///
/// Treated as immutable during a tool call; replaced wholesale on refresh.
/// The generation counter distinguishes successive rebuilds so in-flight
/// readers holding an older `Arc` are unaffected by a refresh.
#[derive(Debug)]
pub struct WorkspaceIndex {
    /// Workspace display name.
    pub name: String,
    /// Deterministic content-derived id (`idx_<hex>`).
    pub index_id: String,
    /// Build timestamp.
    pub built_at: DateTime<Utc>,
    /// Monotonic rebuild counter, assigned by the session.
    pub generation: u64,
    /// Roots contributing files.
    pub roots: Vec<WorkspaceRoot>,
    /// Whether more than one workspace was merged.
    pub merged: bool,
    files: Vec<FileRecord>,
    /// Type name -> base type and interface names.
    pub type_hierarchy: BTreeMap<String, Vec<String>>,
    /// Type name -> names of types it depends on.
    pub dependencies: BTreeMap<String, Vec<String>>,
    /// Dependencies crossing workspace boundaries; empty unless merged.
    pub cross_references: Vec<CrossWorkspaceRef>,
    call_sites: Vec<CallSite>,
}

impl WorkspaceIndex {
    /// All files, in deterministic (workspace, relative path) order.
    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    /// All call sites, ordered by (file, line).
    pub fn call_sites(&self) -> &[CallSite] {
        &self.call_sites
    }

    /// Summary counts.
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            files: self.files.len(),
            types: self.files.iter().map(|f| f.types.len()).sum(),
            members: self
                .files
                .iter()
                .flat_map(|f| &f.types)
                .map(|t| t.members.len())
                .sum(),
            call_sites: self.call_sites.len(),
        }
    }

    /// Every (file, type) pair declaring the given simple type name.
    pub fn types_named<'a>(&'a self, name: &str) -> Vec<(&'a FileRecord, &'a TypeRecord)> {
        self.files
            .iter()
            .flat_map(|f| f.types.iter().map(move |t| (f, t)))
            .filter(|(_, t)| t.name == name)
            .collect()
    }

    /// Every (file, type, member) triple for the given member name,
    /// optionally restricted to one type.
    pub fn members_named<'a>(
        &'a self,
        type_name: Option<&str>,
        member_name: &str,
    ) -> Vec<(&'a FileRecord, &'a TypeRecord, &'a MemberRecord)> {
        self.files
            .iter()
            .flat_map(|f| f.types.iter().map(move |t| (f, t)))
            .filter(|(_, t)| type_name.map(|n| t.name == n).unwrap_or(true))
            .flat_map(|(f, t)| {
                t.members
                    .iter()
                    .filter(|m| m.name == member_name)
                    .map(move |m| (f, t, m))
            })
            .collect()
    }

    /// Call sites invoking the given method, optionally filtered by callee
    /// type (sites with an unresolved callee type pass the filter).
    pub fn call_sites_of<'a>(
        &'a self,
        type_name: Option<&str>,
        method_name: &str,
    ) -> Vec<&'a CallSite> {
        self.call_sites
            .iter()
            .filter(|c| c.callee_member == method_name)
            .filter(|c| match (type_name, &c.callee_type) {
                (Some(wanted), Some(got)) => wanted == got,
                _ => true,
            })
            .collect()
    }

    /// Set of every declared simple type name.
    pub fn type_name_set(&self) -> HashSet<&str> {
        self.files
            .iter()
            .flat_map(|f| f.types.iter().map(|t| t.name.as_str()))
            .collect()
    }
}

// ============================================================================
// Index Builder
// ============================================================================

/// Directories never worth indexing.
const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".vs",
    ".idea",
    "bin",
    "obj",
    "packages",
    "node_modules",
    "TestResults",
    "artifacts",
];

/// Extensions recorded in the index (parsed or resolution-only).
const INDEXED_EXTENSIONS: &[&str] = &[
    "cs", "xaml", "axaml", "cshtml", "razor", "json", "xml", "config", "csproj", "sln",
];

/// Builds a [`WorkspaceIndex`] from one or more roots.
pub struct IndexBuilder {
    exclude_patterns: Vec<String>,
    max_file_size: u64,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        IndexBuilder {
            exclude_patterns: Vec::new(),
            max_file_size: 2 * 1024 * 1024,
        }
    }
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an exclusion glob (matched against relative paths).
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    /// Skip files larger than this many bytes.
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Build an index over the given roots.
    ///
    /// Root tags must be unique; with several roots the index is flagged as
    /// merged and every file carries its workspace tag. Unreadable files are
    /// skipped with a warning rather than failing the whole build.
    pub fn build(
        &self,
        name: &str,
        roots: &[WorkspaceRoot],
        parser: &dyn StructuralParser,
        generation: u64,
    ) -> Result<WorkspaceIndex, EngineError> {
        if roots.is_empty() {
            return Err(EngineError::validation("at least one workspace root is required"));
        }
        let mut seen_tags = HashSet::new();
        for root in roots {
            if !root.path.is_dir() {
                return Err(EngineError::validation(format!(
                    "workspace root is not a directory: {}",
                    root.path.display()
                )));
            }
            if !seen_tags.insert(root.tag.as_str()) {
                return Err(EngineError::validation(format!(
                    "duplicate workspace tag '{}'; pass explicit tags when merging",
                    root.tag
                )));
            }
        }
        let merged = roots.len() > 1;
        let exclude_set = build_glob_set(&self.exclude_patterns)?;

        let mut files = Vec::new();
        let mut hasher = Sha256::new();

        for root in roots {
            let scanned = self.scan_root(root, merged, parser, &exclude_set)?;
            debug!(root = %root.path.display(), files = scanned.len(), "scanned root");
            files.extend(scanned);
        }

        // Deterministic ordering: (workspace tag, relative path).
        files.sort_by(|a, b| {
            (a.workspace.as_deref(), a.relative_path.as_str())
                .cmp(&(b.workspace.as_deref(), b.relative_path.as_str()))
        });

        for file in &files {
            hasher.update(file.display_path(merged).as_bytes());
            hasher.update(b":");
            hasher.update(file.size_bytes.to_le_bytes());
            hasher.update(b"\n");
        }
        let digest = hasher.finalize();
        let index_id = format!("idx_{}", hex::encode(&digest[..6]));

        let known_types: HashSet<String> = files
            .iter()
            .flat_map(|f| f.types.iter().map(|t| t.name.clone()))
            .collect();

        let mut type_hierarchy = BTreeMap::new();
        let mut dependencies: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut call_sites = Vec::new();

        for file in &mut files {
            let display = match (&file.workspace, merged) {
                (Some(tag), true) => format!("{}/{}", tag, file.relative_path),
                _ => file.relative_path.clone(),
            };
            let mut file_deps: HashSet<String> = HashSet::new();

            for ty in &file.types {
                let mut bases = Vec::new();
                if let Some(base) = &ty.base_type {
                    bases.push(base.clone());
                }
                bases.extend(ty.interfaces.iter().cloned());
                if !bases.is_empty() {
                    type_hierarchy.insert(ty.name.clone(), bases.clone());
                }

                let mut deps: HashSet<String> = bases
                    .iter()
                    .filter(|b| known_types.contains(*b))
                    .cloned()
                    .collect();

                for member in &ty.members {
                    for pt in &member.parameter_types {
                        let simple = pt.split('<').next().unwrap_or(pt).trim();
                        if known_types.contains(simple) && simple != ty.name {
                            deps.insert(simple.to_string());
                        }
                    }
                    for site in derive_call_sites(parser, ty, member, &display, &known_types) {
                        if let Some(ct) = &site.callee_type {
                            if ct != &ty.name {
                                deps.insert(ct.clone());
                            }
                        }
                        call_sites.push(site);
                    }
                }

                if !deps.is_empty() {
                    let mut sorted: Vec<String> = deps.iter().cloned().collect();
                    sorted.sort();
                    dependencies.insert(ty.name.clone(), sorted.clone());
                }
                file_deps.extend(deps);
            }

            let mut sorted_deps: Vec<String> = file_deps.into_iter().collect();
            sorted_deps.sort();
            file.dependencies = sorted_deps;
        }

        call_sites.sort_by(|a, b| (a.file.as_str(), a.line).cmp(&(b.file.as_str(), b.line)));

        // In a merged index, surface which dependencies cross workspaces.
        let mut cross_references = Vec::new();
        if merged {
            let type_owner: std::collections::HashMap<&str, &str> = files
                .iter()
                .flat_map(|f| {
                    f.types
                        .iter()
                        .filter_map(move |t| f.workspace.as_deref().map(|w| (t.name.as_str(), w)))
                })
                .collect();
            for (ty, deps) in &dependencies {
                let Some(owner) = type_owner.get(ty.as_str()) else {
                    continue;
                };
                for dep in deps {
                    if let Some(dep_owner) = type_owner.get(dep.as_str()) {
                        if dep_owner != owner {
                            cross_references.push(CrossWorkspaceRef {
                                from_workspace: (*owner).to_string(),
                                from_type: ty.clone(),
                                to_workspace: (*dep_owner).to_string(),
                                to_type: dep.clone(),
                            });
                        }
                    }
                }
            }
        }

        Ok(WorkspaceIndex {
            name: name.to_string(),
            index_id,
            built_at: Utc::now(),
            generation,
            roots: roots.to_vec(),
            merged,
            files,
            type_hierarchy,
            dependencies,
            cross_references,
            call_sites,
        })
    }

    fn scan_root(
        &self,
        root: &WorkspaceRoot,
        merged: bool,
        parser: &dyn StructuralParser,
        exclude_set: &GlobSet,
    ) -> Result<Vec<FileRecord>, EngineError> {
        let root_path = root
            .path
            .canonicalize()
            .map_err(|e| EngineError::io(root.path.display().to_string(), e))?;

        let mut records = Vec::new();
        for entry in WalkDir::new(&root_path)
            .into_iter()
            .filter_entry(|e| !is_excluded_dir(e.path()))
        {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let absolute = entry.path().to_path_buf();
            let extension = absolute
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if !INDEXED_EXTENSIONS.contains(&extension.as_str()) {
                continue;
            }
            let relative = absolute
                .strip_prefix(&root_path)
                .map_err(|e| EngineError::internal(format!("path outside root: {}", e)))?
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");
            if exclude_set.is_match(&relative) {
                continue;
            }
            let metadata = match fs::metadata(&absolute) {
                Ok(m) => m,
                Err(err) => {
                    warn!(file = %absolute.display(), error = %err, "skipping unreadable file");
                    continue;
                }
            };
            if metadata.len() > self.max_file_size {
                debug!(file = %relative, size = metadata.len(), "skipping oversized file");
                continue;
            }

            let language = SourceLanguage::from_extension(&extension);
            let structure = if parser.extensions().contains(&extension.as_str()) {
                match fs::read_to_string(&absolute) {
                    Ok(source) => parser.parse(&source),
                    Err(err) => {
                        warn!(file = %relative, error = %err, "skipping unparsable file");
                        Default::default()
                    }
                }
            } else {
                Default::default()
            };

            let file_name = absolute
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            records.push(FileRecord {
                role: FileRole::classify(&relative, language),
                relative_path: relative,
                absolute_path: absolute,
                root: root_path.clone(),
                workspace: if merged { Some(root.tag.clone()) } else { None },
                file_name,
                extension,
                language,
                size_bytes: metadata.len(),
                token_estimate: metadata.len() / 4,
                namespace: structure.namespace,
                types: structure.types,
                imports: structure.imports,
                dependencies: Vec::new(),
            });
        }
        Ok(records)
    }
}

/// Derive call sites for one member by scanning its recorded body.
///
/// Callee type resolution is heuristic: a qualifier naming a known type wins;
/// an unqualified call to a method the containing type declares is attributed
/// to that type; everything else stays unresolved.
fn derive_call_sites(
    parser: &dyn StructuralParser,
    ty: &TypeRecord,
    member: &MemberRecord,
    display_path: &str,
    known_types: &HashSet<String>,
) -> Vec<CallSite> {
    if member.body.is_empty() || member.body_start_line == 0 {
        return Vec::new();
    }
    let body_first_line = member.body_start_line;
    parser
        .calls_in(&member.body)
        .into_iter()
        .map(|call| {
            let callee_type = match &call.qualifier {
                Some(q) if known_types.contains(q) => Some(q.clone()),
                Some(_) => None,
                None => {
                    if ty.members.iter().any(|m| m.name == call.name) {
                        Some(ty.name.clone())
                    } else {
                        None
                    }
                }
            };
            CallSite {
                caller_type: ty.name.clone(),
                caller_member: member.name.clone(),
                callee_type,
                callee_member: call.name,
                file: display_path.to_string(),
                line: body_first_line + call.line_offset,
            }
        })
        .collect()
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet, EngineError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            EngineError::validation(format!("invalid exclude pattern '{}': {}", pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| EngineError::internal(format!("glob set build failed: {}", e)))
}

fn is_excluded_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| DEFAULT_EXCLUDE_DIRS.contains(&name))
        .unwrap_or(false)
        && path.is_dir()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::CFamilyParser;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn sample_workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "Services/SyncService.cs",
            r#"using System;

namespace App.Services
{
    public class SyncService : ServiceBase, IWorker
    {
        public void Run()
        {
            Collect();
            Log.Write("go");
        }

        private void Collect()
        {
            Store.Save(1);
        }
    }
}
"#,
        );
        write(
            dir.path(),
            "Models/Store.cs",
            r#"namespace App.Models
{
    public class Store
    {
        public static void Save(int n)
        {
        }
    }
}
"#,
        );
        write(
            dir.path(),
            "Contracts/IWorker.cs",
            r#"namespace App.Contracts
{
    public interface IWorker
    {
        void Run();
    }
}
"#,
        );
        write(dir.path(), "bin/Generated.cs", "public class Junk { }");
        write(dir.path(), "app.config", "<configuration />");
        dir
    }

    fn build(dir: &TempDir) -> WorkspaceIndex {
        let parser = CFamilyParser::new();
        IndexBuilder::new()
            .build(
                "sample",
                &[WorkspaceRoot::new(dir.path())],
                &parser,
                1,
            )
            .unwrap()
    }

    mod scanning {
        use super::*;

        #[test]
        fn indexes_source_and_config_but_not_bin() {
            let dir = sample_workspace();
            let index = build(&dir);
            let paths: Vec<&str> = index.files().iter().map(|f| f.relative_path.as_str()).collect();
            assert!(paths.contains(&"Services/SyncService.cs"));
            assert!(paths.contains(&"app.config"));
            assert!(!paths.iter().any(|p| p.starts_with("bin/")));
        }

        #[test]
        fn files_sorted_deterministically() {
            let dir = sample_workspace();
            let index = build(&dir);
            let mut paths: Vec<String> = index
                .files()
                .iter()
                .map(|f| f.relative_path.clone())
                .collect();
            let original = paths.clone();
            paths.sort();
            assert_eq!(paths, original);
        }

        #[test]
        fn identical_trees_produce_identical_ids() {
            let dir = sample_workspace();
            let a = build(&dir);
            let b = build(&dir);
            assert_eq!(a.index_id, b.index_id);
        }

        #[test]
        fn roles_are_classified() {
            let dir = sample_workspace();
            let index = build(&dir);
            let svc = index
                .files()
                .iter()
                .find(|f| f.relative_path == "Services/SyncService.cs")
                .unwrap();
            assert_eq!(svc.role, FileRole::Service);
            let config = index
                .files()
                .iter()
                .find(|f| f.relative_path == "app.config")
                .unwrap();
            assert_eq!(config.role, FileRole::Config);
            let model = index
                .files()
                .iter()
                .find(|f| f.relative_path == "Models/Store.cs")
                .unwrap();
            assert_eq!(model.role, FileRole::Model);
        }
    }

    mod model {
        use super::*;

        #[test]
        fn hierarchy_records_base_and_interfaces() {
            let dir = sample_workspace();
            let index = build(&dir);
            let bases = index.type_hierarchy.get("SyncService").unwrap();
            assert!(bases.contains(&"ServiceBase".to_string()));
            assert!(bases.contains(&"IWorker".to_string()));
        }

        #[test]
        fn dependencies_track_known_types_only() {
            let dir = sample_workspace();
            let index = build(&dir);
            let deps = index.dependencies.get("SyncService").unwrap();
            // Store is known (qualified call), IWorker is known (interface);
            // ServiceBase and Log are not declared anywhere.
            assert!(deps.contains(&"Store".to_string()));
            assert!(deps.contains(&"IWorker".to_string()));
            assert!(!deps.contains(&"ServiceBase".to_string()));
            assert!(!deps.contains(&"Log".to_string()));
        }

        #[test]
        fn call_sites_are_derived_with_lines() {
            let dir = sample_workspace();
            let index = build(&dir);
            let saves = index.call_sites_of(Some("Store"), "Save");
            assert_eq!(saves.len(), 1);
            assert_eq!(saves[0].caller_type, "SyncService");
            assert_eq!(saves[0].caller_member, "Collect");
            assert_eq!(saves[0].file, "Services/SyncService.cs");
            assert!(saves[0].line > 1);

            // Unqualified self-call resolves to the containing type.
            let collects = index.call_sites_of(Some("SyncService"), "Collect");
            assert_eq!(collects.len(), 1);
            assert_eq!(collects[0].caller_member, "Run");
        }

        #[test]
        fn stats_count_everything() {
            let dir = sample_workspace();
            let index = build(&dir);
            let stats = index.stats();
            assert_eq!(stats.files, 4);
            assert_eq!(stats.types, 3);
            assert!(stats.members >= 4);
            assert!(stats.call_sites >= 3);
        }
    }

    mod merging {
        use super::*;

        #[test]
        fn merged_roots_tag_files() {
            let a = sample_workspace();
            let b = TempDir::new().unwrap();
            write(b.path(), "File.cs", "public class Extra { }\n");

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
            assert!(index.merged);
            assert!(index.files().iter().all(|f| f.workspace.is_some()));
            let extra = index
                .files()
                .iter()
                .find(|f| f.relative_path == "File.cs")
                .unwrap();
            assert_eq!(extra.display_path(true), "ProjB/File.cs");
        }

        #[test]
        fn cross_workspace_dependencies_are_surfaced() {
            let a = sample_workspace();
            let b = TempDir::new().unwrap();
            write(
                b.path(),
                "Extra.cs",
                r#"namespace Other
{
    public class Extra
    {
        public void Go()
        {
            SyncService.Run();
        }
    }
}
"#,
            );
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
            assert!(index.cross_references.iter().any(|r| {
                r.from_workspace == "ProjB"
                    && r.from_type == "Extra"
                    && r.to_workspace == "ProjA"
                    && r.to_type == "SyncService"
            }));
        }

        #[test]
        fn duplicate_tags_are_rejected() {
            let a = TempDir::new().unwrap();
            let b = TempDir::new().unwrap();
            let parser = CFamilyParser::new();
            let err = IndexBuilder::new()
                .build(
                    "merged",
                    &[
                        WorkspaceRoot::with_tag(a.path(), "Proj"),
                        WorkspaceRoot::with_tag(b.path(), "Proj"),
                    ],
                    &parser,
                    1,
                )
                .unwrap_err();
            assert!(matches!(err, EngineError::Validation { .. }));
        }

        #[test]
        fn empty_roots_are_rejected() {
            let parser = CFamilyParser::new();
            let err = IndexBuilder::new().build("x", &[], &parser, 1).unwrap_err();
            assert!(matches!(err, EngineError::Validation { .. }));
        }
    }

    mod lookups {
        use super::*;

        #[test]
        fn types_named_finds_declarations() {
            let dir = sample_workspace();
            let index = build(&dir);
            assert_eq!(index.types_named("SyncService").len(), 1);
            assert_eq!(index.types_named("Missing").len(), 0);
        }

        #[test]
        fn members_named_with_type_filter() {
            let dir = sample_workspace();
            let index = build(&dir);
            // Run is declared on SyncService and IWorker.
            assert_eq!(index.members_named(None, "Run").len(), 2);
            assert_eq!(index.members_named(Some("SyncService"), "Run").len(), 1);
        }
    }
}
