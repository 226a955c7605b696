//! JSON output types: the agent contract.
//!
//! Every operation result is rendered as a status-first JSON object carrying
//! `schema_version`, so remote callers can dispatch on shape. Errors are
//! rendered through [`error_json`], which never fails and never panics; the
//! transport surfaces the string verbatim.

use serde::Serialize;

use crate::analyzer::{CallGraph, SearchHit, SymbolUsage};
use crate::buildrun::BuildReport;
use crate::dupes::DuplicateCluster;
use crate::editor::ReplaceOutcome;
use crate::error::EngineError;
use crate::index::{FileRecord, IndexStats, WorkspaceIndex};
use crate::refactor::generate::ExtractedMethod;
use crate::refactor::movefile::MoveFileReport;
use crate::refactor::parameter::AddParameterReport;
use crate::refactor::pattern::PatternReplaceReport;
use crate::refactor::rename::RenameReport;

/// Current schema version for all responses.
pub const SCHEMA_VERSION: &str = "1";

/// Serialize any response type to pretty JSON.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, EngineError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| EngineError::internal(format!("JSON serialization error: {}", e)))
}

// ============================================================================
// Error Rendering
// ============================================================================

/// Render an error as a descriptive JSON string. Infallible by construction.
pub fn error_json(err: &EngineError) -> String {
    let mut body = serde_json::json!({
        "status": "error",
        "schema_version": SCHEMA_VERSION,
        "code": err.error_code().code(),
        "message": err.to_string(),
    });
    match err {
        EngineError::NotFound {
            suggestions,
            detail,
            ..
        } => {
            if !suggestions.is_empty() {
                body["suggestions"] = serde_json::json!(suggestions);
            }
            if let Some(detail) = detail {
                body["detail"] = serde_json::json!(detail);
            }
        }
        EngineError::Ambiguous { candidates, .. } => {
            body["candidates"] = serde_json::json!(candidates);
        }
        EngineError::Uniqueness {
            matches,
            needle_preview,
            ..
        } => {
            body["matches"] = serde_json::json!(matches);
            body["needle"] = serde_json::json!(needle_preview);
        }
        _ => {}
    }
    body.to_string()
}

// ============================================================================
// Read Responses
// ============================================================================

/// Response for index build/refresh.
#[derive(Debug, Clone, Serialize)]
pub struct IndexResponse {
    pub status: &'static str,
    pub schema_version: &'static str,
    pub workspace: String,
    pub index_id: String,
    pub generation: u64,
    pub merged: bool,
    pub stats: IndexStats,
}

impl IndexResponse {
    pub fn new(index: &WorkspaceIndex) -> Self {
        IndexResponse {
            status: "ok",
            schema_version: SCHEMA_VERSION,
            workspace: index.name.clone(),
            index_id: index.index_id.clone(),
            generation: index.generation,
            merged: index.merged,
            stats: index.stats(),
        }
    }
}

/// One file entry in a listing.
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub path: String,
    pub language: crate::index::SourceLanguage,
    pub role: crate::index::FileRole,
    pub types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub size_bytes: u64,
    pub token_estimate: u64,
}

impl FileSummary {
    pub fn new(record: &FileRecord, merged: bool) -> Self {
        FileSummary {
            path: record.display_path(merged),
            language: record.language,
            role: record.role,
            types: record.types.iter().map(|t| t.name.clone()).collect(),
            namespace: record.namespace.clone(),
            size_bytes: record.size_bytes,
            token_estimate: record.token_estimate,
        }
    }
}

/// Response for file listings.
#[derive(Debug, Clone, Serialize)]
pub struct FilesResponse {
    pub status: &'static str,
    pub schema_version: &'static str,
    pub count: usize,
    pub files: Vec<FileSummary>,
}

impl FilesResponse {
    pub fn new(files: Vec<FileSummary>) -> Self {
        FilesResponse {
            status: "ok",
            schema_version: SCHEMA_VERSION,
            count: files.len(),
            files,
        }
    }
}

/// Response for find-usages.
#[derive(Debug, Clone, Serialize)]
pub struct UsagesResponse {
    pub status: &'static str,
    pub schema_version: &'static str,
    pub symbol: String,
    pub count: usize,
    /// Heuristic, syntax-level matches: "at least these", not "exactly these".
    pub usages: Vec<SymbolUsage>,
}

impl UsagesResponse {
    pub fn new(symbol: impl Into<String>, usages: Vec<SymbolUsage>) -> Self {
        UsagesResponse {
            status: "ok",
            schema_version: SCHEMA_VERSION,
            symbol: symbol.into(),
            count: usages.len(),
            usages,
        }
    }
}

/// Response for call-graph queries.
#[derive(Debug, Clone, Serialize)]
pub struct CallGraphResponse {
    pub status: &'static str,
    pub schema_version: &'static str,
    #[serde(flatten)]
    pub graph: CallGraph,
}

impl CallGraphResponse {
    pub fn new(graph: CallGraph) -> Self {
        CallGraphResponse {
            status: "ok",
            schema_version: SCHEMA_VERSION,
            graph,
        }
    }
}

/// Response for text search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub status: &'static str,
    pub schema_version: &'static str,
    pub query: String,
    pub count: usize,
    pub hits: Vec<SearchHit>,
}

impl SearchResponse {
    pub fn new(query: impl Into<String>, hits: Vec<SearchHit>) -> Self {
        SearchResponse {
            status: "ok",
            schema_version: SCHEMA_VERSION,
            query: query.into(),
            count: hits.len(),
            hits,
        }
    }
}

/// Response for duplicate detection.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicatesResponse {
    pub status: &'static str,
    pub schema_version: &'static str,
    pub count: usize,
    pub total_estimated_savings_lines: u32,
    pub clusters: Vec<DuplicateCluster>,
}

impl DuplicatesResponse {
    pub fn new(clusters: Vec<DuplicateCluster>) -> Self {
        DuplicatesResponse {
            status: "ok",
            schema_version: SCHEMA_VERSION,
            count: clusters.len(),
            total_estimated_savings_lines: clusters
                .iter()
                .map(|c| c.estimated_savings_lines)
                .sum(),
            clusters,
        }
    }
}

// ============================================================================
// Mutation Responses
// ============================================================================

/// Response for the safe-replace primitive.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaceResponse {
    pub status: &'static str,
    pub schema_version: &'static str,
    #[serde(flatten)]
    pub outcome: ReplaceOutcome,
    /// The index is stale after any write until refreshed.
    pub reindex_recommended: bool,
}

impl ReplaceResponse {
    pub fn new(outcome: ReplaceOutcome) -> Self {
        ReplaceResponse {
            status: "ok",
            schema_version: SCHEMA_VERSION,
            outcome,
            reindex_recommended: true,
        }
    }
}

/// Response for backup restoration.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreResponse {
    pub status: &'static str,
    pub schema_version: &'static str,
    pub file: String,
    pub reindex_recommended: bool,
}

impl RestoreResponse {
    pub fn new(file: String) -> Self {
        RestoreResponse {
            status: "ok",
            schema_version: SCHEMA_VERSION,
            file,
            reindex_recommended: true,
        }
    }
}

/// Response for rename preview/apply.
#[derive(Debug, Clone, Serialize)]
pub struct RenameResponse {
    pub status: &'static str,
    pub schema_version: &'static str,
    #[serde(flatten)]
    pub report: RenameReport,
    pub reindex_recommended: bool,
}

impl RenameResponse {
    pub fn new(report: RenameReport) -> Self {
        let reindex = !report.preview && report.files_changed > 0;
        RenameResponse {
            status: "ok",
            schema_version: SCHEMA_VERSION,
            report,
            reindex_recommended: reindex,
        }
    }
}

/// Response for add-parameter preview/apply.
#[derive(Debug, Clone, Serialize)]
pub struct AddParameterResponse {
    pub status: &'static str,
    pub schema_version: &'static str,
    #[serde(flatten)]
    pub report: AddParameterReport,
    pub reindex_recommended: bool,
}

impl AddParameterResponse {
    pub fn new(report: AddParameterReport) -> Self {
        let reindex = !report.preview;
        AddParameterResponse {
            status: "ok",
            schema_version: SCHEMA_VERSION,
            report,
            reindex_recommended: reindex,
        }
    }
}

/// Response for move-file.
#[derive(Debug, Clone, Serialize)]
pub struct MoveFileResponse {
    pub status: &'static str,
    pub schema_version: &'static str,
    #[serde(flatten)]
    pub report: MoveFileReport,
    pub reindex_recommended: bool,
}

impl MoveFileResponse {
    pub fn new(report: MoveFileReport) -> Self {
        MoveFileResponse {
            status: "ok",
            schema_version: SCHEMA_VERSION,
            report,
            reindex_recommended: true,
        }
    }
}

/// Response for bulk pattern replacement.
#[derive(Debug, Clone, Serialize)]
pub struct PatternReplaceResponse {
    pub status: &'static str,
    pub schema_version: &'static str,
    #[serde(flatten)]
    pub report: PatternReplaceReport,
    pub reindex_recommended: bool,
}

impl PatternReplaceResponse {
    pub fn new(report: PatternReplaceReport) -> Self {
        let reindex = !report.preview && report.files_changed > 0;
        PatternReplaceResponse {
            status: "ok",
            schema_version: SCHEMA_VERSION,
            report,
            reindex_recommended: reindex,
        }
    }
}

// ============================================================================
// Generator Responses
// ============================================================================

/// Response for the pure generators: text for the caller to apply.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedResponse {
    pub status: &'static str,
    pub schema_version: &'static str,
    /// What was generated (extract_method, interface, constructor, stubs).
    pub kind: &'static str,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaced_span: Option<crate::types::LineSpan>,
}

impl GeneratedResponse {
    pub fn text_only(kind: &'static str, text: String) -> Self {
        GeneratedResponse {
            status: "ok",
            schema_version: SCHEMA_VERSION,
            kind,
            text,
            call_text: None,
            replaced_span: None,
        }
    }

    pub fn extraction(extracted: ExtractedMethod) -> Self {
        GeneratedResponse {
            status: "ok",
            schema_version: SCHEMA_VERSION,
            kind: "extract_method",
            text: extracted.method_text,
            call_text: Some(extracted.call_text),
            replaced_span: Some(extracted.replaced_span),
        }
    }
}

// ============================================================================
// Build Response
// ============================================================================

/// Response for an external build run.
#[derive(Debug, Clone, Serialize)]
pub struct BuildResponse {
    pub status: &'static str,
    pub schema_version: &'static str,
    #[serde(flatten)]
    pub report: BuildReport,
}

impl BuildResponse {
    pub fn new(report: BuildReport) -> Self {
        BuildResponse {
            status: "ok",
            schema_version: SCHEMA_VERSION,
            report,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_json_is_valid_and_status_first() {
        let err = EngineError::validation("missing field");
        let rendered = error_json(&err);
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["schema_version"], SCHEMA_VERSION);
        assert_eq!(value["code"], 2);
        assert!(value["message"].as_str().unwrap().contains("missing field"));
    }

    #[test]
    fn not_found_error_carries_suggestions_and_detail() {
        let err = EngineError::NotFound {
            what: "file 'X.cs'".to_string(),
            suggestions: vec!["A.cs".to_string(), "B.cs".to_string()],
            detail: Some("closest match starts at line 3".to_string()),
        };
        let value: serde_json::Value = serde_json::from_str(&error_json(&err)).unwrap();
        assert_eq!(value["code"], 3);
        assert_eq!(value["suggestions"].as_array().unwrap().len(), 2);
        assert!(value["detail"].as_str().unwrap().contains("line 3"));
    }

    #[test]
    fn ambiguous_error_carries_candidates() {
        let err = EngineError::ambiguous(
            "path 'File.cs'",
            vec!["ProjA/File.cs".to_string(), "ProjB/File.cs".to_string()],
        );
        let value: serde_json::Value = serde_json::from_str(&error_json(&err)).unwrap();
        assert_eq!(value["candidates"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn uniqueness_error_carries_match_count() {
        let err = EngineError::Uniqueness {
            file: "A.cs".to_string(),
            matches: 4,
            needle_preview: "Run()".to_string(),
        };
        let value: serde_json::Value = serde_json::from_str(&error_json(&err)).unwrap();
        assert_eq!(value["code"], 4);
        assert_eq!(value["matches"], 4);
        assert_eq!(value["needle"], "Run()");
    }

    #[test]
    fn ok_responses_have_status_and_version() {
        let response = SearchResponse::new("query", Vec::new());
        let json = to_json(&response).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["schema_version"], SCHEMA_VERSION);
        assert_eq!(value["count"], 0);
    }
}
