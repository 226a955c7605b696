//! External build tool invocation.
//!
//! The build tool is a collaborator, not part of the engine: we spawn it as a
//! subprocess, drain stdout/stderr concurrently, enforce a hard wall-clock
//! timeout (kill and report rather than hang), and parse its output with
//! line-oriented patterns of the form `file(line,col): error CODE: message`.
//! Unmatched bare `error CODE: message` lines are captured as a fallback.
//!
//! The diagnostic patterns are deliberately isolated and fixture-tested;
//! they are the most likely source of silent false negatives.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use wait_timeout::ChildExt;

use crate::error::EngineError;

/// Default wall-clock limit for one build invocation.
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(120);

// ============================================================================
// Diagnostics
// ============================================================================

/// Severity of a build diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildSeverity {
    Error,
    Warning,
}

/// One parsed compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDiagnostic {
    /// Source file, when the line carried a location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub col: Option<u32>,
    pub severity: BuildSeverity,
    /// Compiler code (`CS0103`, `NU1605`, ...).
    pub code: String,
    pub message: String,
}

/// Line-oriented diagnostic parser.
pub struct DiagnosticParser {
    located_re: Regex,
    bare_re: Regex,
}

impl DiagnosticParser {
    pub fn new() -> Self {
        DiagnosticParser {
            located_re: Regex::new(
                r"^\s*(?P<file>[^(]+?)\((?P<line>\d+),(?P<col>\d+)\):\s+(?P<sev>error|warning)\s+(?P<code>[A-Za-z]+\d+):\s+(?P<msg>.+)$",
            )
            .expect("located diagnostic regex"),
            bare_re: Regex::new(
                r"\b(?P<sev>error|warning)\s+(?P<code>[A-Za-z]+\d+)\s*:\s*(?P<msg>.+)$",
            )
            .expect("bare diagnostic regex"),
        }
    }

    /// Parse one output line into a diagnostic, if it matches either form.
    pub fn parse_line(&self, line: &str) -> Option<BuildDiagnostic> {
        if let Some(caps) = self.located_re.captures(line) {
            return Some(BuildDiagnostic {
                file: Some(caps["file"].trim().to_string()),
                line: caps["line"].parse().ok(),
                col: caps["col"].parse().ok(),
                severity: severity_of(&caps["sev"]),
                code: caps["code"].to_string(),
                message: strip_project_suffix(&caps["msg"]),
            });
        }
        if let Some(caps) = self.bare_re.captures(line) {
            return Some(BuildDiagnostic {
                file: None,
                line: None,
                col: None,
                severity: severity_of(&caps["sev"]),
                code: caps["code"].to_string(),
                message: strip_project_suffix(&caps["msg"]),
            });
        }
        None
    }
}

impl Default for DiagnosticParser {
    fn default() -> Self {
        Self::new()
    }
}

fn severity_of(word: &str) -> BuildSeverity {
    if word == "error" {
        BuildSeverity::Error
    } else {
        BuildSeverity::Warning
    }
}

/// MSBuild appends ` [C:\path\Proj.csproj]` to diagnostic lines.
fn strip_project_suffix(message: &str) -> String {
    let trimmed = message.trim_end();
    if trimmed.ends_with(']') {
        if let Some(idx) = trimmed.rfind(" [") {
            return trimmed[..idx].trim_end().to_string();
        }
    }
    trimmed.to_string()
}

// ============================================================================
// Build Report
// ============================================================================

/// Outcome of one build invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub errors: Vec<BuildDiagnostic>,
    pub warnings: Vec<BuildDiagnostic>,
    pub duration_ms: u64,
}

// ============================================================================
// Build Runner
// ============================================================================

/// Spawns the external build tool with a hard timeout.
pub struct BuildRunner {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl BuildRunner {
    /// Runner for `dotnet build`, located via PATH.
    pub fn dotnet() -> Result<Self, EngineError> {
        let program = which::which("dotnet").map_err(|e| EngineError::BuildFailure {
            message: format!("dotnet not found on PATH: {}", e),
        })?;
        Ok(BuildRunner {
            program,
            args: vec!["build".to_string()],
            timeout: DEFAULT_BUILD_TIMEOUT,
        })
    }

    /// Runner for an arbitrary program and fixed arguments.
    pub fn custom(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        BuildRunner {
            program: program.into(),
            args,
            timeout: DEFAULT_BUILD_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the build in `working_dir`, optionally against one target file.
    ///
    /// stdout and stderr are drained on their own threads while waiting, so a
    /// chatty build cannot deadlock the pipe. On timeout the subprocess is
    /// killed and a distinct error is returned.
    pub fn run(&self, working_dir: &Path, target: Option<&str>) -> Result<BuildReport, EngineError> {
        let started = Instant::now();
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(target) = target {
            command.arg(target);
        }
        info!(program = %self.program.display(), dir = %working_dir.display(), "starting build");

        let mut child = command.spawn().map_err(|e| EngineError::BuildFailure {
            message: format!("failed to spawn {}: {}", self.program.display(), e),
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let out_handle = thread::spawn(move || drain_lines(stdout));
        let err_handle = thread::spawn(move || drain_lines(stderr));

        let status = child
            .wait_timeout(self.timeout)
            .map_err(|e| EngineError::BuildFailure {
                message: format!("wait failed: {}", e),
            })?;

        let status = match status {
            Some(status) => status,
            None => {
                warn!(timeout_s = self.timeout.as_secs(), "build timed out; killing");
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineError::BuildTimeout {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        let mut lines = out_handle.join().unwrap_or_default();
        lines.extend(err_handle.join().unwrap_or_default());

        let parser = DiagnosticParser::new();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        for line in &lines {
            if let Some(diag) = parser.parse_line(line) {
                let bucket = match diag.severity {
                    BuildSeverity::Error => &mut errors,
                    BuildSeverity::Warning => &mut warnings,
                };
                // MSBuild repeats diagnostics in the final summary.
                if !bucket.contains(&diag) {
                    bucket.push(diag);
                }
            }
        }

        Ok(BuildReport {
            success: status.success() && errors.is_empty(),
            exit_code: status.code(),
            errors,
            warnings,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

fn drain_lines<R: std::io::Read>(source: Option<R>) -> Vec<String> {
    match source {
        Some(reader) => BufReader::new(reader)
            .lines()
            .map_while(Result::ok)
            .collect(),
        None => Vec::new(),
    }
}

// ============================================================================
// Tests
// ============================================================================
