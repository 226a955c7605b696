//! CLI front door: every MCP tool is also a subcommand for local use.
//!
//! Results are printed to stdout as JSON (the same response types the MCP
//! server emits); logs go to stderr so stdout stays a clean machine channel.
//! Errors are rendered as descriptive JSON error objects and mapped to the
//! stable exit codes of [`OutputErrorCode`].

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::buildrun::BuildRunner;
use crate::error::{EngineError, OutputErrorCode};
use crate::index::WorkspaceRoot;
use crate::output::{
    error_json, to_json, AddParameterResponse, BuildResponse, CallGraphResponse,
    DuplicatesResponse, FileSummary, FilesResponse, GeneratedResponse, IndexResponse,
    MoveFileResponse, PatternReplaceResponse, RenameResponse, ReplaceResponse, RestoreResponse,
    SearchResponse, UsagesResponse,
};
use crate::analyzer::UsageKind;
use crate::refactor::parameter::AddParameterRequest;
use crate::session::{SessionOptions, WorkspaceSession};

/// Index-backed code intelligence and refactoring engine for AI coding agents.
#[derive(Parser)]
#[command(name = "refract")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Workspace root directory (default: current directory)
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Additional roots merged into one index (repeatable)
    #[arg(long = "merge-root", global = true)]
    merge_roots: Vec<PathBuf>,

    /// Disable sibling .bak backups before mutations
    #[arg(long, global = true)]
    no_backups: bool,

    /// Emit logs as JSON lines (stderr)
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index and print its stats.
    Index,

    /// List indexed files.
    Files {
        /// Filter by role: view|model|service|controller|test|config|utility|unknown
        #[arg(long)]
        role: Option<String>,
    },

    /// Search indexed files for a substring.
    Search {
        query: String,
        #[arg(long, default_value_t = 50)]
        max_results: usize,
    },

    /// Find usages of a symbol.
    Usages {
        symbol: String,
        /// Filter: definition|reference|implementation|override|invocation
        #[arg(long)]
        kind: Option<String>,
    },

    /// Chart callers and callees of a method.
    Callgraph {
        method: String,
        #[arg(long)]
        type_name: Option<String>,
        #[arg(long, default_value_t = 1)]
        depth: u32,
    },

    /// Find clusters of near-duplicate method bodies.
    Dupes {
        #[arg(long, default_value_t = 5)]
        min_lines: u32,
        #[arg(long, default_value_t = 80.0)]
        min_similarity: f64,
        #[arg(long, default_value_t = 10)]
        max_results: usize,
    },

    /// Replace exactly one occurrence of a text in a file.
    Replace {
        file: String,
        old_text: String,
        new_text: String,
        /// Match ignoring per-line indentation differences
        #[arg(long)]
        normalize_indent: bool,
    },

    /// Restore a file from its sibling .bak backup.
    Restore { file: String },

    /// Rename a symbol across the workspace.
    Rename {
        old_name: String,
        new_name: String,
        /// Apply changes (default: preview)
        #[arg(long)]
        apply: bool,
    },

    /// Add a parameter to a method and a default argument at every call site.
    #[command(name = "add-param")]
    AddParam {
        #[arg(long)]
        type_name: String,
        #[arg(long)]
        method: String,
        #[arg(long)]
        param_type: String,
        #[arg(long)]
        param_name: String,
        #[arg(long)]
        default_value: String,
        /// Apply changes (default: preview)
        #[arg(long)]
        apply: bool,
    },

    /// Move a file, rewriting its namespace and flagging referencers.
    #[command(name = "move-file")]
    MoveFile { file: String, new_path: String },

    /// Apply a regex replacement across the tree.
    Pattern {
        pattern: String,
        replacement: String,
        #[arg(long)]
        glob: Option<String>,
        /// Apply changes (default: preview)
        #[arg(long)]
        apply: bool,
    },

    /// Extract a line range into a new method (prints text, writes nothing).
    Extract {
        file: String,
        start_line: u32,
        end_line: u32,
        method_name: String,
    },

    /// Generate an interface from a type's public members.
    #[command(name = "gen-interface")]
    GenInterface {
        type_name: String,
        #[arg(long)]
        name: Option<String>,
    },

    /// Generate a constructor assigning every declared field.
    #[command(name = "gen-ctor")]
    GenCtor { type_name: String },

    /// Generate stub implementations for an interface.
    #[command(name = "impl-interface")]
    ImplInterface { interface_name: String },

    /// Run the external build tool and print parsed diagnostics.
    Build {
        /// Project or solution file to build
        #[arg(long)]
        target: Option<String>,
    },

    /// Run the MCP server on stdio.
    #[cfg(feature = "mcp")]
    Mcp,
}

/// Parse arguments, run the command, and map errors to exit codes.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match execute(&cli) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!("{}", error_json(&err));
            exit_code_for(&err)
        }
    }
}

fn exit_code_for(err: &EngineError) -> ExitCode {
    ExitCode::from(OutputErrorCode::from(err).code())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("refract=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

fn open_session(cli: &Cli) -> Result<WorkspaceSession, EngineError> {
    let options = SessionOptions {
        backups: !cli.no_backups,
        ..Default::default()
    };
    let primary = cli
        .workspace
        .clone()
        .map(Ok)
        .unwrap_or_else(std::env::current_dir)
        .map_err(|e| EngineError::io("current directory", e))?;

    if cli.merge_roots.is_empty() {
        WorkspaceSession::open(&primary, options)
    } else {
        let mut roots = vec![WorkspaceRoot::new(primary)];
        roots.extend(cli.merge_roots.iter().map(WorkspaceRoot::new));
        WorkspaceSession::open_merged("merged", roots, options)
    }
}

fn execute(cli: &Cli) -> Result<String, EngineError> {
    #[cfg(feature = "mcp")]
    if matches!(&cli.command, Commands::Mcp) {
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| EngineError::internal(format!("tokio runtime: {}", e)))?;
        runtime.block_on(crate::mcp::run_mcp_server())?;
        return Ok(error_free_shutdown());
    }

    let session = open_session(cli)?;
    match &cli.command {
        Commands::Index => to_json(&IndexResponse::new(&session.index())),

        Commands::Files { role } => {
            let index = session.index();
            let wanted = role.as_deref().map(str::to_lowercase);
            let files: Vec<FileSummary> = index
                .files()
                .iter()
                .filter(|f| match &wanted {
                    Some(r) => format!("{:?}", f.role).to_lowercase() == *r,
                    None => true,
                })
                .map(|f| FileSummary::new(f, index.merged))
                .collect();
            to_json(&FilesResponse::new(files))
        }

        Commands::Search { query, max_results } => {
            let hits = session.search_text(query, *max_results)?;
            to_json(&SearchResponse::new(query.clone(), hits))
        }

        Commands::Usages { symbol, kind } => {
            let hint = match kind {
                Some(raw) => Some(UsageKind::parse(raw).ok_or_else(|| {
                    EngineError::validation(format!("invalid usage kind '{}'", raw))
                })?),
                None => None,
            };
            let usages = session.find_usages(symbol, hint)?;
            to_json(&UsagesResponse::new(symbol.clone(), usages))
        }

        Commands::Callgraph {
            method,
            type_name,
            depth,
        } => {
            let graph = session.call_graph(type_name.as_deref(), method, *depth)?;
            to_json(&CallGraphResponse::new(graph))
        }

        Commands::Dupes {
            min_lines,
            min_similarity,
            max_results,
        } => {
            let clusters = session.find_duplicates(*min_lines, *min_similarity, *max_results)?;
            to_json(&DuplicatesResponse::new(clusters))
        }

        Commands::Replace {
            file,
            old_text,
            new_text,
            normalize_indent,
        } => {
            let outcome = session.replace_text(file, old_text, new_text, *normalize_indent)?;
            to_json(&ReplaceResponse::new(outcome))
        }

        Commands::Restore { file } => {
            let restored = session.restore_backup(file)?;
            to_json(&RestoreResponse::new(restored))
        }

        Commands::Rename {
            old_name,
            new_name,
            apply,
        } => {
            let report = session.rename(old_name, new_name, !apply)?;
            to_json(&RenameResponse::new(report))
        }

        Commands::AddParam {
            type_name,
            method,
            param_type,
            param_name,
            default_value,
            apply,
        } => {
            let request = AddParameterRequest {
                type_name: type_name.clone(),
                method_name: method.clone(),
                parameter_type: param_type.clone(),
                parameter_name: param_name.clone(),
                default_value: default_value.clone(),
                preview: !apply,
            };
            let report = session.add_parameter(&request)?;
            to_json(&AddParameterResponse::new(report))
        }

        Commands::MoveFile { file, new_path } => {
            let report = session.move_file(file, new_path)?;
            to_json(&MoveFileResponse::new(report))
        }

        Commands::Pattern {
            pattern,
            replacement,
            glob,
            apply,
        } => {
            let report =
                session.pattern_replace(pattern, replacement, glob.as_deref(), !apply)?;
            to_json(&PatternReplaceResponse::new(report))
        }

        Commands::Extract {
            file,
            start_line,
            end_line,
            method_name,
        } => {
            let extracted = session.extract_method(file, *start_line, *end_line, method_name)?;
            to_json(&GeneratedResponse::extraction(extracted))
        }

        Commands::GenInterface { type_name, name } => {
            let text = session.generate_interface(type_name, name.as_deref())?;
            to_json(&GeneratedResponse::text_only("interface", text))
        }

        Commands::GenCtor { type_name } => {
            let text = session.generate_constructor(type_name)?;
            to_json(&GeneratedResponse::text_only("constructor", text))
        }

        Commands::ImplInterface { interface_name } => {
            let text = session.implement_interface(interface_name)?;
            to_json(&GeneratedResponse::text_only("stubs", text))
        }

        Commands::Build { target } => {
            let working_dir = session.roots()[0].path.clone();
            let report = BuildRunner::dotnet()?.run(&working_dir, target.as_deref())?;
            to_json(&BuildResponse::new(report))
        }

        #[cfg(feature = "mcp")]
        Commands::Mcp => unreachable!("handled before session open"),
    }
}

#[cfg(feature = "mcp")]
fn error_free_shutdown() -> String {
    serde_json::json!({
        "status": "ok",
        "schema_version": crate::output::SCHEMA_VERSION,
        "message": "mcp server stopped"
    })
    .to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn rename_defaults_to_preview() {
        let cli = Cli::try_parse_from(["refract", "rename", "Old", "New"]).unwrap();
        match cli.command {
            Commands::Rename { apply, .. } => assert!(!apply),
            _ => panic!("expected rename"),
        }
    }

    #[test]
    fn add_param_requires_all_arguments() {
        assert!(Cli::try_parse_from(["refract", "add-param", "--type-name", "T"]).is_err());
        let cli = Cli::try_parse_from([
            "refract",
            "add-param",
            "--type-name",
            "Svc",
            "--method",
            "Run",
            "--param-type",
            "bool",
            "--param-name",
            "flag",
            "--default-value",
            "false",
        ])
        .unwrap();
        match cli.command {
            Commands::AddParam { apply, .. } => assert!(!apply),
            _ => panic!("expected add-param"),
        }
    }

    #[test]
    fn merge_roots_are_repeatable() {
        let cli = Cli::try_parse_from([
            "refract",
            "--merge-root",
            "/a",
            "--merge-root",
            "/b",
            "index",
        ])
        .unwrap();
        assert_eq!(cli.merge_roots.len(), 2);
    }

    #[test]
    fn exit_codes_follow_error_taxonomy() {
        // ExitCode is opaque; assert on the underlying stable codes.
        assert_eq!(OutputErrorCode::from(&EngineError::validation("x")).code(), 2);
        assert_eq!(OutputErrorCode::from(&EngineError::not_found("x")).code(), 3);
        assert_eq!(
            OutputErrorCode::from(&EngineError::BuildTimeout { seconds: 120 }).code(),
            5
        );
        assert_eq!(OutputErrorCode::from(&EngineError::internal("x")).code(), 10);
    }
}
