//! Workspace session: ownership of the index and the mutation lock.
//!
//! A session owns one (possibly merged) workspace. The index lives behind an
//! `RwLock<Arc<WorkspaceIndex>>`: read operations clone the `Arc` and work on
//! that snapshot without blocking anything, while refresh builds a brand-new
//! index and swaps it in wholesale, bumping a generation counter. In-flight
//! readers on the old snapshot are unaffected.
//!
//! Mutating operations serialize on a coarse per-workspace mutex around their
//! read-decide-write sequence. That is deliberately simple: tool calls arrive
//! one at a time in practice, the lock only defends against overlap. The
//! session does not watch the filesystem; callers refresh explicitly after a
//! successful mutation.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::info;

use crate::adapter::{CFamilyParser, StructuralParser};
use crate::analyzer::{self, CallGraph, SearchHit, SymbolUsage, UsageKind};
use crate::dupes::{self, DuplicateCluster};
use crate::editor::{self, ReplaceOptions, ReplaceOutcome};
use crate::error::EngineError;
use crate::index::{IndexBuilder, IndexStats, WorkspaceIndex, WorkspaceRoot};
use crate::refactor::generate::{self, ExtractedMethod};
use crate::refactor::movefile::{self, MoveFileReport};
use crate::refactor::parameter::{self, AddParameterReport, AddParameterRequest};
use crate::refactor::pattern::{self, PatternReplaceReport};
use crate::refactor::rename::{self, RenameReport};
use crate::resolve;
use crate::structure::TypeRecord;

// ============================================================================
// Options
// ============================================================================

/// Session-wide behavior switches.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Write sibling `.bak` files before every mutation.
    pub backups: bool,
    /// Extra exclusion globs for the index scan.
    pub exclude: Vec<String>,
    /// Skip files larger than this many bytes during indexing.
    pub max_file_size: Option<u64>,
}

// ============================================================================
// Session
// ============================================================================

/// One open workspace (or merge of workspaces) and its current index.
pub struct WorkspaceSession {
    name: String,
    roots: Vec<WorkspaceRoot>,
    options: SessionOptions,
    parser: Box<dyn StructuralParser>,
    index: RwLock<Arc<WorkspaceIndex>>,
    generation: AtomicU64,
    write_lock: Mutex<()>,
}

impl WorkspaceSession {
    /// Open a session over a single root, building the initial index.
    pub fn open(root: &Path, options: SessionOptions) -> Result<Self, EngineError> {
        let root = WorkspaceRoot::new(root);
        let name = root.tag.clone();
        Self::open_with(name, vec![root], options)
    }

    /// Open a session merging several roots. Tags must be unique.
    pub fn open_merged(
        name: impl Into<String>,
        roots: Vec<WorkspaceRoot>,
        options: SessionOptions,
    ) -> Result<Self, EngineError> {
        Self::open_with(name.into(), roots, options)
    }

    fn open_with(
        name: String,
        roots: Vec<WorkspaceRoot>,
        options: SessionOptions,
    ) -> Result<Self, EngineError> {
        let parser: Box<dyn StructuralParser> = Box::new(CFamilyParser::new());
        let index = Self::build_index(&name, &roots, &options, parser.as_ref(), 1)?;
        info!(workspace = %name, files = index.stats().files, "session opened");
        Ok(WorkspaceSession {
            name,
            roots,
            options,
            parser,
            index: RwLock::new(Arc::new(index)),
            generation: AtomicU64::new(1),
            write_lock: Mutex::new(()),
        })
    }

    fn build_index(
        name: &str,
        roots: &[WorkspaceRoot],
        options: &SessionOptions,
        parser: &dyn StructuralParser,
        generation: u64,
    ) -> Result<WorkspaceIndex, EngineError> {
        let mut builder = IndexBuilder::new();
        for pattern in &options.exclude {
            builder = builder.exclude(pattern.clone());
        }
        if let Some(max) = options.max_file_size {
            builder = builder.max_file_size(max);
        }
        builder.build(name, roots, parser, generation)
    }

    /// The current index snapshot. Cheap (`Arc` clone); never blocks on
    /// mutations, and stays valid across a concurrent refresh.
    pub fn index(&self) -> Arc<WorkspaceIndex> {
        self.index
            .read()
            .expect("index RwLock poisoned")
            .clone()
    }

    /// Rebuild the index from disk and swap it in wholesale.
    pub fn refresh(&self) -> Result<IndexStats, EngineError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let rebuilt = Self::build_index(
            &self.name,
            &self.roots,
            &self.options,
            self.parser.as_ref(),
            generation,
        )?;
        let stats = rebuilt.stats();
        *self.index.write().expect("index RwLock poisoned") = Arc::new(rebuilt);
        info!(workspace = %self.name, generation, files = stats.files, "index refreshed");
        Ok(stats)
    }

    /// Exclusive section for a read-decide-write sequence.
    fn mutation_guard(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().expect("write lock poisoned")
    }

    fn replace_options(&self, normalize_indent: bool) -> ReplaceOptions {
        ReplaceOptions {
            normalize_indent,
            backup: self.options.backups,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn roots(&self) -> &[WorkspaceRoot] {
        &self.roots
    }

    // ------------------------------------------------------------------
    // Read-only operations (no lock: snapshots are immutable)
    // ------------------------------------------------------------------

    pub fn find_usages(
        &self,
        symbol: &str,
        kind_hint: Option<UsageKind>,
    ) -> Result<Vec<SymbolUsage>, EngineError> {
        analyzer::find_usages(&self.index(), symbol, kind_hint)
    }

    pub fn call_graph(
        &self,
        type_name: Option<&str>,
        method: &str,
        depth: u32,
    ) -> Result<CallGraph, EngineError> {
        analyzer::call_graph(&self.index(), type_name, method, depth)
    }

    pub fn search_text(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, EngineError> {
        analyzer::search_text(&self.index(), query, max_results)
    }

    pub fn find_duplicates(
        &self,
        min_lines: u32,
        min_similarity: f64,
        max_results: usize,
    ) -> Result<Vec<DuplicateCluster>, EngineError> {
        dupes::find_duplicates(&self.index(), min_lines, min_similarity, max_results)
    }

    /// Resolve a type by name, erroring with candidates when ambiguous.
    pub fn type_named(&self, name: &str) -> Result<TypeRecord, EngineError> {
        let index = self.index();
        let matches = index.types_named(name);
        match matches.len() {
            0 => Err(EngineError::not_found(format!("type '{}'", name))),
            1 => Ok(matches[0].1.clone()),
            _ => Err(EngineError::ambiguous(
                format!("type '{}'", name),
                matches
                    .iter()
                    .map(|(f, t)| format!("{}:{}", f.display_path(index.merged), t.span.start))
                    .collect(),
            )),
        }
    }

    /// Read a resolved file's content (for extract-method input).
    pub fn read_file(&self, path_input: &str) -> Result<(String, String), EngineError> {
        let index = self.index();
        let record = resolve::resolve(&index, path_input)?;
        let content = std::fs::read_to_string(&record.absolute_path)
            .map_err(|e| EngineError::io(record.absolute_path.display().to_string(), e))?;
        Ok((record.display_path(index.merged), content))
    }

    pub fn extract_method(
        &self,
        path_input: &str,
        start_line: u32,
        end_line: u32,
        method_name: &str,
    ) -> Result<ExtractedMethod, EngineError> {
        let (_, content) = self.read_file(path_input)?;
        generate::extract_method(&content, start_line, end_line, method_name)
    }

    pub fn generate_interface(
        &self,
        type_name: &str,
        interface_name: Option<&str>,
    ) -> Result<String, EngineError> {
        let ty = self.type_named(type_name)?;
        generate::generate_interface(&ty, interface_name)
    }

    pub fn generate_constructor(&self, type_name: &str) -> Result<String, EngineError> {
        let ty = self.type_named(type_name)?;
        generate::generate_constructor(&ty)
    }

    pub fn implement_interface(&self, interface_name: &str) -> Result<String, EngineError> {
        let ty = self.type_named(interface_name)?;
        generate::implement_interface(&ty)
    }

    // ------------------------------------------------------------------
    // Mutating operations (serialized by the workspace mutex)
    // ------------------------------------------------------------------

    /// The safe-replace primitive, addressed through the path resolver.
    pub fn replace_text(
        &self,
        path_input: &str,
        old_text: &str,
        new_text: &str,
        normalize_indent: bool,
    ) -> Result<ReplaceOutcome, EngineError> {
        let _guard = self.mutation_guard();
        let index = self.index();
        let record = resolve::resolve(&index, path_input)?;
        editor::replace(
            &record.absolute_path,
            old_text,
            new_text,
            &self.replace_options(normalize_indent),
        )
    }

    /// Restore a file from its sibling backup.
    pub fn restore_backup(&self, path_input: &str) -> Result<String, EngineError> {
        let _guard = self.mutation_guard();
        let index = self.index();
        let record = resolve::resolve(&index, path_input)?;
        editor::restore_backup(&record.absolute_path)?;
        Ok(record.display_path(index.merged))
    }

    pub fn rename(
        &self,
        old_name: &str,
        new_name: &str,
        preview: bool,
    ) -> Result<RenameReport, EngineError> {
        let _guard = self.mutation_guard();
        rename::rename(
            &self.index(),
            old_name,
            new_name,
            preview,
            self.options.backups,
        )
    }

    pub fn add_parameter(
        &self,
        request: &AddParameterRequest,
    ) -> Result<AddParameterReport, EngineError> {
        let _guard = self.mutation_guard();
        parameter::add_parameter(&self.index(), request, self.options.backups)
    }

    pub fn move_file(
        &self,
        path_input: &str,
        new_relative: &str,
    ) -> Result<MoveFileReport, EngineError> {
        let _guard = self.mutation_guard();
        movefile::move_file(&self.index(), path_input, new_relative, self.options.backups)
    }

    pub fn pattern_replace(
        &self,
        pattern: &str,
        replacement: &str,
        file_glob: Option<&str>,
        preview: bool,
    ) -> Result<PatternReplaceReport, EngineError> {
        let _guard = self.mutation_guard();
        pattern::pattern_replace(
            &self.index(),
            pattern,
            replacement,
            file_glob,
            preview,
            self.options.backups,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Services")).unwrap();
        fs::write(
            dir.path().join("Services/Svc.cs"),
            r#"namespace App.Services
{
    public class Svc
    {
        public void Run()
        {
        }
    }
}
"#,
        )
        .unwrap();
        dir
    }

    #[test]
    fn open_builds_an_initial_index() {
        let dir = workspace();
        let session = WorkspaceSession::open(dir.path(), SessionOptions::default()).unwrap();
        let stats = session.index().stats();
        assert_eq!(stats.files, 1);
        assert_eq!(stats.types, 1);
        assert_eq!(session.index().generation, 1);
    }

    #[test]
    fn refresh_swaps_wholesale_and_bumps_generation() {
        let dir = workspace();
        let session = WorkspaceSession::open(dir.path(), SessionOptions::default()).unwrap();

        let old_snapshot = session.index();
        fs::write(
            dir.path().join("Services/New.cs"),
            "namespace App.Services { public class Fresh { } }\n",
        )
        .unwrap();

        let stats = session.refresh().unwrap();
        assert_eq!(stats.files, 2);
        let new_snapshot = session.index();
        assert_eq!(new_snapshot.generation, 2);

        // The old snapshot is unaffected by the swap.
        assert_eq!(old_snapshot.generation, 1);
        assert_eq!(old_snapshot.stats().files, 1);
    }

    #[test]
    fn stale_reads_survive_concurrent_refresh() {
        let dir = workspace();
        let session =
            Arc::new(WorkspaceSession::open(dir.path(), SessionOptions::default()).unwrap());
        let snapshot = session.index();

        let refresher = {
            let session = Arc::clone(&session);
            std::thread::spawn(move || session.refresh().unwrap())
        };
        refresher.join().unwrap();

        // Reading from the pre-refresh snapshot still works.
        assert_eq!(snapshot.files().len(), 1);
        assert!(snapshot.types_named("Svc").len() == 1);
    }

    #[test]
    fn replace_text_goes_through_resolver_and_editor() {
        let dir = workspace();
        let session = WorkspaceSession::open(dir.path(), SessionOptions::default()).unwrap();
        let outcome = session
            .replace_text("Svc.cs", "public void Run()", "public void Start()", false)
            .unwrap();
        assert_eq!(outcome.first_line, 5);
        let content = fs::read_to_string(dir.path().join("Services/Svc.cs")).unwrap();
        assert!(content.contains("public void Start()"));
    }

    #[test]
    fn backups_follow_session_options() {
        let dir = workspace();
        let options = SessionOptions {
            backups: true,
            ..Default::default()
        };
        let session = WorkspaceSession::open(dir.path(), options).unwrap();
        session
            .replace_text("Svc.cs", "public void Run()", "public void Start()", false)
            .unwrap();
        assert!(dir.path().join("Services/Svc.cs.bak").exists());

        session.restore_backup("Svc.cs").unwrap();
        let content = fs::read_to_string(dir.path().join("Services/Svc.cs")).unwrap();
        assert!(content.contains("public void Run()"));
        assert!(!dir.path().join("Services/Svc.cs.bak").exists());
    }

    #[test]
    fn type_named_resolves_and_rejects_unknown() {
        let dir = workspace();
        let session = WorkspaceSession::open(dir.path(), SessionOptions::default()).unwrap();
        assert_eq!(session.type_named("Svc").unwrap().name, "Svc");
        assert!(matches!(
            session.type_named("Nope"),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn session_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WorkspaceSession>();
    }
}
