//! MCP server front door for agent integration.
//!
//! Exposes the engine's query and mutation operations as MCP tools over
//! stdio (JSON-RPC 2.0). Every tool validates its arguments up front and
//! returns a descriptive error payload instead of raising; the transport
//! surfaces whatever comes back verbatim to the remote caller.
//!
//! Session management:
//! - A session is lazily opened on the first tool call and reused across
//!   calls to the same workspace.
//! - A tool naming a different workspace closes the old session and opens a
//!   new one.
//! - Mutating tools report `reindex_recommended`; the caller decides when to
//!   refresh (`index_workspace` with `force_refresh`).

#![cfg(feature = "mcp")]

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, ErrorCode, Implementation, ProtocolVersion, ServerCapabilities,
        ServerInfo,
    },
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::analyzer::UsageKind;
use crate::buildrun::BuildRunner;
use crate::error::EngineError;
use crate::index::WorkspaceRoot;
use crate::output::{
    error_json, to_json, AddParameterResponse, BuildResponse, CallGraphResponse,
    DuplicatesResponse, FileSummary, FilesResponse, GeneratedResponse, IndexResponse,
    MoveFileResponse, PatternReplaceResponse, RenameResponse, ReplaceResponse, RestoreResponse,
    SearchResponse, UsagesResponse,
};
use crate::refactor::parameter::AddParameterRequest;
use crate::session::{SessionOptions, WorkspaceSession};

// ============================================================================
// Tool Parameters
// ============================================================================

fn default_true() -> bool {
    true
}

fn default_depth() -> u32 {
    1
}

fn default_min_lines() -> u32 {
    5
}

fn default_min_similarity() -> f64 {
    80.0
}

fn default_max_results() -> usize {
    10
}

fn default_search_results() -> usize {
    50
}

/// Parameters for the index tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct IndexParams {
    /// Path to workspace (optional, defaults to current directory).
    #[schemars(description = "Path to workspace (optional, defaults to current directory)")]
    pub workspace_path: Option<String>,

    /// Additional roots to merge into one index (each tagged by its leaf name).
    #[schemars(description = "Additional roots to merge into one index")]
    #[serde(default)]
    pub merge_roots: Vec<String>,

    /// Rebuild the index even if one exists for this workspace.
    #[schemars(description = "Rebuild the index even if one exists for this workspace")]
    #[serde(default)]
    pub force_refresh: bool,
}

/// Parameters for the list-files tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListFilesParams {
    /// Filter by role (view, model, service, controller, test, config, utility, unknown).
    #[schemars(description = "Filter by role: view|model|service|controller|test|config|utility|unknown")]
    pub role: Option<String>,

    #[schemars(description = "Path to workspace (optional)")]
    pub workspace_path: Option<String>,
}

/// Parameters for the text-search tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Substring to search for (case-insensitive).
    #[schemars(description = "Substring to search for (case-insensitive)")]
    pub query: String,

    /// Maximum hits to return.
    #[schemars(description = "Maximum hits to return")]
    #[serde(default = "default_search_results")]
    pub max_results: usize,

    #[schemars(description = "Path to workspace (optional)")]
    pub workspace_path: Option<String>,
}

/// Parameters for the find-usages tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FindUsagesParams {
    /// Symbol name to look up.
    #[schemars(description = "Symbol name to look up")]
    pub symbol: String,

    /// Optional kind filter: definition|reference|implementation|override|invocation.
    #[schemars(description = "Optional kind filter: definition|reference|implementation|override|invocation")]
    pub kind: Option<String>,

    #[schemars(description = "Path to workspace (optional)")]
    pub workspace_path: Option<String>,
}

/// Parameters for the call-graph tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CallGraphParams {
    /// Method name to chart.
    #[schemars(description = "Method name to chart")]
    pub method_name: String,

    /// Type name, to disambiguate same-named methods.
    #[schemars(description = "Type name, to disambiguate same-named methods")]
    pub type_name: Option<String>,

    /// Traversal depth (1 = direct callers/callees only).
    #[schemars(description = "Traversal depth (1 = direct callers/callees only)")]
    #[serde(default = "default_depth")]
    pub depth: u32,

    #[schemars(description = "Path to workspace (optional)")]
    pub workspace_path: Option<String>,
}

/// Parameters for the replace-text tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReplaceTextParams {
    /// File path (relative, bare name, or workspace/path form).
    #[schemars(description = "File path (relative, bare name, or workspace/path form)")]
    pub file: String,

    /// Text to replace; must occur exactly once.
    #[schemars(description = "Text to replace; must occur exactly once")]
    pub old_text: String,

    /// Replacement text.
    #[schemars(description = "Replacement text")]
    pub new_text: String,

    /// Match ignoring per-line indentation differences.
    #[schemars(description = "Match ignoring per-line indentation differences")]
    #[serde(default)]
    pub normalize_indent: bool,

    #[schemars(description = "Path to workspace (optional)")]
    pub workspace_path: Option<String>,
}

/// Parameters for the restore-backup tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RestoreBackupParams {
    /// File whose sibling .bak should be restored.
    #[schemars(description = "File whose sibling .bak should be restored")]
    pub file: String,

    #[schemars(description = "Path to workspace (optional)")]
    pub workspace_path: Option<String>,
}

/// Parameters for the rename tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RenameParams {
    /// Current symbol name.
    #[schemars(description = "Current symbol name")]
    pub old_name: String,

    /// New symbol name.
    #[schemars(description = "New symbol name")]
    pub new_name: String,

    /// Preview without writing (default true).
    #[schemars(description = "Preview without writing (default true)")]
    #[serde(default = "default_true")]
    pub preview: bool,

    #[schemars(description = "Path to workspace (optional)")]
    pub workspace_path: Option<String>,
}

/// Parameters for the add-parameter tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AddParameterParams {
    /// Type declaring the method.
    #[schemars(description = "Type declaring the method")]
    pub type_name: String,

    /// Method to extend.
    #[schemars(description = "Method to extend")]
    pub method_name: String,

    /// Type of the new parameter.
    #[schemars(description = "Type of the new parameter")]
    pub parameter_type: String,

    /// Name of the new parameter.
    #[schemars(description = "Name of the new parameter")]
    pub parameter_name: String,

    /// Expression appended to every existing call.
    #[schemars(description = "Expression appended to every existing call")]
    pub default_value: String,

    /// Preview without writing (default true).
    #[schemars(description = "Preview without writing (default true)")]
    #[serde(default = "default_true")]
    pub preview: bool,

    #[schemars(description = "Path to workspace (optional)")]
    pub workspace_path: Option<String>,
}

/// Parameters for the move-file tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MoveFileParams {
    /// File to move.
    #[schemars(description = "File to move")]
    pub file: String,

    /// New path relative to the workspace root.
    #[schemars(description = "New path relative to the workspace root")]
    pub new_path: String,

    #[schemars(description = "Path to workspace (optional)")]
    pub workspace_path: Option<String>,
}

/// Parameters for the pattern-replace tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PatternReplaceParams {
    /// Regex applied to every indexed file.
    #[schemars(description = "Regex applied to every indexed file")]
    pub pattern: String,

    /// Replacement text ($1-style capture references allowed).
    #[schemars(description = "Replacement text ($1-style capture references allowed)")]
    pub replacement: String,

    /// Optional glob restricting which files are touched.
    #[schemars(description = "Optional glob restricting which files are touched")]
    pub file_glob: Option<String>,

    /// Preview without writing (default true).
    #[schemars(description = "Preview without writing (default true)")]
    #[serde(default = "default_true")]
    pub preview: bool,

    #[schemars(description = "Path to workspace (optional)")]
    pub workspace_path: Option<String>,
}

/// Parameters for the extract-method tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExtractMethodParams {
    /// File containing the lines to extract.
    #[schemars(description = "File containing the lines to extract")]
    pub file: String,

    /// First line of the range (1-based).
    #[schemars(description = "First line of the range (1-based)")]
    pub start_line: u32,

    /// Last line of the range (1-based, inclusive).
    #[schemars(description = "Last line of the range (1-based, inclusive)")]
    pub end_line: u32,

    /// Name for the new method.
    #[schemars(description = "Name for the new method")]
    pub method_name: String,

    #[schemars(description = "Path to workspace (optional)")]
    pub workspace_path: Option<String>,
}

/// Parameters for type-based generators.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TypeTargetParams {
    /// Type to operate on.
    #[schemars(description = "Type to operate on")]
    pub type_name: String,

    /// Name for a generated interface (defaults to I<TypeName>).
    #[schemars(description = "Name for a generated interface (defaults to I<TypeName>)")]
    pub interface_name: Option<String>,

    #[schemars(description = "Path to workspace (optional)")]
    pub workspace_path: Option<String>,
}

/// Parameters for the duplicate-detection tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FindDuplicatesParams {
    /// Minimum body length in lines.
    #[schemars(description = "Minimum body length in lines")]
    #[serde(default = "default_min_lines")]
    pub min_lines: u32,

    /// Similarity threshold percentage in (0, 100].
    #[schemars(description = "Similarity threshold percentage in (0, 100]")]
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,

    /// Maximum clusters to report.
    #[schemars(description = "Maximum clusters to report")]
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[schemars(description = "Path to workspace (optional)")]
    pub workspace_path: Option<String>,
}

/// Parameters for the build tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RunBuildParams {
    /// Optional project or solution file to build.
    #[schemars(description = "Optional project or solution file to build")]
    pub target: Option<String>,

    #[schemars(description = "Path to workspace (optional)")]
    pub workspace_path: Option<String>,
}

// ============================================================================
// MCP Server
// ============================================================================

/// MCP server exposing the refract engine.
#[derive(Clone)]
pub struct RefractServer {
    tool_router: ToolRouter<Self>,
    /// Lazily-initialized session, reused across tool calls.
    session: Arc<Mutex<Option<Arc<WorkspaceSession>>>>,
    /// Current workspace path (for detecting workspace switches).
    workspace_path: Arc<Mutex<Option<PathBuf>>>,
}

impl RefractServer {
    pub fn new() -> Self {
        Self {
            tool_router: Self::tool_router(),
            session: Arc::new(Mutex::new(None)),
            workspace_path: Arc::new(Mutex::new(None)),
        }
    }

    /// Get or initialize a session for the given workspace.
    ///
    /// Reuses the current session when the workspace matches; otherwise opens
    /// a new one (building the index) and drops the old.
    pub async fn get_session(
        &self,
        workspace_path: Option<&str>,
    ) -> Result<Arc<WorkspaceSession>, McpError> {
        let mut session_guard = self.session.lock().await;
        let mut workspace_guard = self.workspace_path.lock().await;

        let target = match workspace_path {
            Some(path) => PathBuf::from(path),
            None => std::env::current_dir().map_err(|e| {
                McpError::internal_error(
                    "Failed to get current directory",
                    Some(serde_json::json!({ "error": e.to_string() })),
                )
            })?,
        };
        let target = target.canonicalize().map_err(|e| {
            McpError::invalid_params(
                "Invalid workspace path",
                Some(serde_json::json!({
                    "path": target.display().to_string(),
                    "error": e.to_string()
                })),
            )
        })?;

        let need_new = match (&*session_guard, &*workspace_guard) {
            (Some(_), Some(current)) => current != &target,
            _ => true,
        };
        if need_new {
            let options = SessionOptions {
                backups: true,
                ..Default::default()
            };
            let session = WorkspaceSession::open(&target, options).map_err(engine_error)?;
            *session_guard = Some(Arc::new(session));
            *workspace_guard = Some(target);
        }

        Ok(session_guard.as_ref().expect("session just ensured").clone())
    }

    fn text_result(json: String) -> CallToolResult {
        CallToolResult::success(vec![Content::text(json)])
    }
}

#[tool_router]
impl RefractServer {
    // ========================================================================
    // Index Tools
    // ========================================================================

    /// Build (or rebuild) the workspace index.
    #[tool(description = "Build or refresh the structural index of the workspace")]
    async fn index_workspace(
        &self,
        Parameters(params): Parameters<IndexParams>,
    ) -> Result<CallToolResult, McpError> {
        if !params.merge_roots.is_empty() {
            // Merged indexes always rebuild the session.
            let mut roots = Vec::new();
            if let Some(primary) = &params.workspace_path {
                roots.push(WorkspaceRoot::new(PathBuf::from(primary)));
            }
            for extra in &params.merge_roots {
                roots.push(WorkspaceRoot::new(PathBuf::from(extra)));
            }
            let options = SessionOptions {
                backups: true,
                ..Default::default()
            };
            let session = WorkspaceSession::open_merged("merged", roots, options)
                .map_err(engine_error)?;
            let json = to_json(&IndexResponse::new(&session.index())).map_err(engine_error)?;

            let mut session_guard = self.session.lock().await;
            let mut workspace_guard = self.workspace_path.lock().await;
            *session_guard = Some(Arc::new(session));
            *workspace_guard = params.workspace_path.as_ref().map(PathBuf::from);
            return Ok(Self::text_result(json));
        }

        let session = self.get_session(params.workspace_path.as_deref()).await?;
        if params.force_refresh {
            session.refresh().map_err(engine_error)?;
        }
        let json = to_json(&IndexResponse::new(&session.index())).map_err(engine_error)?;
        Ok(Self::text_result(json))
    }

    /// List indexed files, optionally filtered by role.
    #[tool(description = "List indexed files with language, role, and declared types")]
    async fn list_files(
        &self,
        Parameters(params): Parameters<ListFilesParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.get_session(params.workspace_path.as_deref()).await?;
        let index = session.index();
        let role_filter = params.role.as_deref().map(str::to_lowercase);
        let files: Vec<FileSummary> = index
            .files()
            .iter()
            .filter(|f| match &role_filter {
                Some(wanted) => format!("{:?}", f.role).to_lowercase() == *wanted,
                None => true,
            })
            .map(|f| FileSummary::new(f, index.merged))
            .collect();
        let json = to_json(&FilesResponse::new(files)).map_err(engine_error)?;
        Ok(Self::text_result(json))
    }

    /// Case-insensitive substring search across indexed files.
    #[tool(description = "Search indexed files for a substring (case-insensitive)")]
    async fn search_text(
        &self,
        Parameters(params): Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.get_session(params.workspace_path.as_deref()).await?;
        let hits = session
            .search_text(&params.query, params.max_results)
            .map_err(engine_error)?;
        let json = to_json(&SearchResponse::new(params.query, hits)).map_err(engine_error)?;
        Ok(Self::text_result(json))
    }

    // ========================================================================
    // Analysis Tools
    // ========================================================================

    /// Find all usages of a symbol (heuristic, syntax-level).
    #[tool(description = "Find definitions, references, implementations, overrides, and invocations of a symbol")]
    async fn find_usages(
        &self,
        Parameters(params): Parameters<FindUsagesParams>,
    ) -> Result<CallToolResult, McpError> {
        let kind_hint = match &params.kind {
            Some(raw) => Some(UsageKind::parse(raw).ok_or_else(|| {
                McpError::invalid_params(
                    "Invalid usage kind",
                    Some(serde_json::json!({
                        "kind": raw,
                        "valid_kinds": ["definition", "reference", "implementation", "override", "invocation"]
                    })),
                )
            })?),
            None => None,
        };
        let session = self.get_session(params.workspace_path.as_deref()).await?;
        let usages = session
            .find_usages(&params.symbol, kind_hint)
            .map_err(engine_error)?;
        let json = to_json(&UsagesResponse::new(params.symbol, usages)).map_err(engine_error)?;
        Ok(Self::text_result(json))
    }

    /// Chart callers and callees of a method.
    #[tool(description = "Get callers and callees of a method, with bounded-depth chains")]
    async fn get_call_graph(
        &self,
        Parameters(params): Parameters<CallGraphParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.get_session(params.workspace_path.as_deref()).await?;
        let graph = session
            .call_graph(params.type_name.as_deref(), &params.method_name, params.depth)
            .map_err(engine_error)?;
        let json = to_json(&CallGraphResponse::new(graph)).map_err(engine_error)?;
        Ok(Self::text_result(json))
    }

    /// Find clusters of near-duplicate method bodies.
    #[tool(description = "Find clusters of near-duplicate method bodies")]
    async fn find_duplicates(
        &self,
        Parameters(params): Parameters<FindDuplicatesParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.get_session(params.workspace_path.as_deref()).await?;
        let clusters = session
            .find_duplicates(params.min_lines, params.min_similarity, params.max_results)
            .map_err(engine_error)?;
        let json = to_json(&DuplicatesResponse::new(clusters)).map_err(engine_error)?;
        Ok(Self::text_result(json))
    }

    // ========================================================================
    // Mutation Tools
    // ========================================================================

    /// Replace exactly one occurrence of a text in a file.
    #[tool(description = "Safely replace exactly one occurrence of a text in a file")]
    async fn replace_text(
        &self,
        Parameters(params): Parameters<ReplaceTextParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.get_session(params.workspace_path.as_deref()).await?;
        let outcome = session
            .replace_text(
                &params.file,
                &params.old_text,
                &params.new_text,
                params.normalize_indent,
            )
            .map_err(engine_error)?;
        let json = to_json(&ReplaceResponse::new(outcome)).map_err(engine_error)?;
        Ok(Self::text_result(json))
    }

    /// Restore a file from its sibling backup.
    #[tool(description = "Restore a file from its sibling .bak backup")]
    async fn restore_backup(
        &self,
        Parameters(params): Parameters<RestoreBackupParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.get_session(params.workspace_path.as_deref()).await?;
        let file = session.restore_backup(&params.file).map_err(engine_error)?;
        let json = to_json(&RestoreResponse::new(file)).map_err(engine_error)?;
        Ok(Self::text_result(json))
    }

    /// Rename a symbol across the workspace.
    #[tool(description = "Rename a symbol across the workspace (preview by default)")]
    async fn rename_symbol(
        &self,
        Parameters(params): Parameters<RenameParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.get_session(params.workspace_path.as_deref()).await?;
        let report = session
            .rename(&params.old_name, &params.new_name, params.preview)
            .map_err(engine_error)?;
        let json = to_json(&RenameResponse::new(report)).map_err(engine_error)?;
        Ok(Self::text_result(json))
    }

    /// Add a parameter to a method and a default argument at every call site.
    #[tool(description = "Add a parameter to a method and a default argument at every call site (preview by default)")]
    async fn add_parameter(
        &self,
        Parameters(params): Parameters<AddParameterParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.get_session(params.workspace_path.as_deref()).await?;
        let request = AddParameterRequest {
            type_name: params.type_name,
            method_name: params.method_name,
            parameter_type: params.parameter_type,
            parameter_name: params.parameter_name,
            default_value: params.default_value,
            preview: params.preview,
        };
        let report = session.add_parameter(&request).map_err(engine_error)?;
        let json = to_json(&AddParameterResponse::new(report)).map_err(engine_error)?;
        Ok(Self::text_result(json))
    }

    /// Move a file, rewriting its namespace and flagging referencing files.
    #[tool(description = "Move a file to a new path, rewriting its namespace and flagging referencing files")]
    async fn move_file(
        &self,
        Parameters(params): Parameters<MoveFileParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.get_session(params.workspace_path.as_deref()).await?;
        let report = session
            .move_file(&params.file, &params.new_path)
            .map_err(engine_error)?;
        let json = to_json(&MoveFileResponse::new(report)).map_err(engine_error)?;
        Ok(Self::text_result(json))
    }

    /// Apply a regex replacement across the tree.
    #[tool(description = "Apply a regex replacement across the tree with per-file outcomes (preview by default)")]
    async fn pattern_replace(
        &self,
        Parameters(params): Parameters<PatternReplaceParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.get_session(params.workspace_path.as_deref()).await?;
        let report = session
            .pattern_replace(
                &params.pattern,
                &params.replacement,
                params.file_glob.as_deref(),
                params.preview,
            )
            .map_err(engine_error)?;
        let json = to_json(&PatternReplaceResponse::new(report)).map_err(engine_error)?;
        Ok(Self::text_result(json))
    }

    // ========================================================================
    // Generator Tools
    // ========================================================================

    /// Extract a line range into a new method (returns text, writes nothing).
    #[tool(description = "Extract a line range into a new method; returns text to apply, writes nothing")]
    async fn extract_method(
        &self,
        Parameters(params): Parameters<ExtractMethodParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.get_session(params.workspace_path.as_deref()).await?;
        let extracted = session
            .extract_method(
                &params.file,
                params.start_line,
                params.end_line,
                &params.method_name,
            )
            .map_err(engine_error)?;
        let json = to_json(&GeneratedResponse::extraction(extracted)).map_err(engine_error)?;
        Ok(Self::text_result(json))
    }

    /// Generate an interface from a type's public members.
    #[tool(description = "Generate an interface from a type's public members; returns text, writes nothing")]
    async fn generate_interface(
        &self,
        Parameters(params): Parameters<TypeTargetParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.get_session(params.workspace_path.as_deref()).await?;
        let text = session
            .generate_interface(&params.type_name, params.interface_name.as_deref())
            .map_err(engine_error)?;
        let json =
            to_json(&GeneratedResponse::text_only("interface", text)).map_err(engine_error)?;
        Ok(Self::text_result(json))
    }

    /// Generate a constructor assigning every declared field.
    #[tool(description = "Generate a constructor assigning every declared field; returns text, writes nothing")]
    async fn generate_constructor(
        &self,
        Parameters(params): Parameters<TypeTargetParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.get_session(params.workspace_path.as_deref()).await?;
        let text = session
            .generate_constructor(&params.type_name)
            .map_err(engine_error)?;
        let json =
            to_json(&GeneratedResponse::text_only("constructor", text)).map_err(engine_error)?;
        Ok(Self::text_result(json))
    }

    /// Generate stub implementations for an interface's members.
    #[tool(description = "Generate stub implementations for an interface's members; returns text, writes nothing")]
    async fn implement_interface(
        &self,
        Parameters(params): Parameters<TypeTargetParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.get_session(params.workspace_path.as_deref()).await?;
        let text = session
            .implement_interface(&params.type_name)
            .map_err(engine_error)?;
        let json = to_json(&GeneratedResponse::text_only("stubs", text)).map_err(engine_error)?;
        Ok(Self::text_result(json))
    }

    // ========================================================================
    // Build Tool
    // ========================================================================

    /// Run the external build tool with a hard timeout.
    #[tool(description = "Run the external build tool and return parsed diagnostics")]
    async fn run_build(
        &self,
        Parameters(params): Parameters<RunBuildParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.get_session(params.workspace_path.as_deref()).await?;
        let working_dir = session.roots()[0].path.clone();
        let target = params.target.clone();
        // Builds can run for minutes; keep the async runtime responsive.
        let report = tokio::task::spawn_blocking(move || {
            BuildRunner::dotnet()?.run(&working_dir, target.as_deref())
        })
        .await
        .map_err(|e| {
            McpError::internal_error(
                "Build task failed",
                Some(serde_json::json!({ "error": e.to_string() })),
            )
        })?
        .map_err(engine_error)?;
        let json = to_json(&BuildResponse::new(report)).map_err(engine_error)?;
        Ok(Self::text_result(json))
    }
}

impl Default for RefractServer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Error Conversions
// ============================================================================

/// Custom JSON-RPC error codes, in the server-defined -32000..-32099 range.
mod error_codes {
    /// Resolution error (not found, ambiguous).
    pub const RESOLUTION_ERROR: i32 = -32000;
    /// Apply error (uniqueness violation, IO failure).
    pub const APPLY_ERROR: i32 = -32001;
    /// External build failed or timed out.
    pub const EXTERNAL_TOOL_ERROR: i32 = -32002;
}

/// Bridge an engine error into a JSON-RPC error.
///
/// The JSON rendering carries the full actionable payload (suggestions,
/// candidates, fuzzy diagnostics) so the remote caller can retry.
fn engine_error(err: EngineError) -> McpError {
    let data = serde_json::from_str(&error_json(&err)).ok();
    match &err {
        EngineError::Validation { .. } => McpError::invalid_params(err.to_string(), data),
        EngineError::NotFound { .. } | EngineError::Ambiguous { .. } => McpError::new(
            ErrorCode(error_codes::RESOLUTION_ERROR),
            err.to_string(),
            data,
        ),
        EngineError::Uniqueness { .. } | EngineError::Io { .. } => {
            McpError::new(ErrorCode(error_codes::APPLY_ERROR), err.to_string(), data)
        }
        EngineError::BuildTimeout { .. } | EngineError::BuildFailure { .. } => McpError::new(
            ErrorCode(error_codes::EXTERNAL_TOOL_ERROR),
            err.to_string(),
            data,
        ),
        EngineError::Internal { .. } => McpError::internal_error(err.to_string(), data),
    }
}

// ============================================================================
// ServerHandler Implementation
// ============================================================================

#[tool_handler]
impl ServerHandler for RefractServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "refract".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Refract is a code intelligence and refactoring engine. \
                 Build the index with index_workspace, query it with find_usages, \
                 get_call_graph, search_text, and find_duplicates, and mutate \
                 files with replace_text, rename_symbol, add_parameter, move_file, \
                 and pattern_replace. Mutating tools preview by default; re-run \
                 index_workspace with force_refresh after applying changes."
                    .to_string(),
            ),
        }
    }
}

// ============================================================================
// Entry Point
// ============================================================================

/// Run the MCP server on stdio until the client disconnects.
pub async fn run_mcp_server() -> Result<(), EngineError> {
    let server = RefractServer::new();
    let service = server
        .serve(stdio())
        .await
        .map_err(|e| EngineError::internal(format!("MCP server failed to start: {}", e)))?;

    service
        .waiting()
        .await
        .map_err(|e| EngineError::internal(format!("MCP server error: {}", e)))?;

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
