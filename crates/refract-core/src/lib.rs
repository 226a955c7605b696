//! Core engine for refract.
//!
//! This crate provides the language-agnostic engine behind the refract front
//! doors:
//! - Workspace index: files, types, members, call sites, hierarchy/dependency
//!   maps, built once and replaced wholesale on refresh
//! - Structural-parser contract and the reference C#-family adapter
//! - File path resolution with three-way (found/ambiguous/not-found) outcomes
//! - Reference and call-graph analysis (heuristic, syntax-level)
//! - Safe text editing: the exactly-one-match replacement chokepoint
//! - Refactoring operations: rename, add parameter, move file, bulk pattern
//!   replace, and the pure generators
//! - Duplicate detection over normalized method bodies
//! - External build invocation with timeout and diagnostic parsing
//! - Session ownership, error taxonomy, and JSON output types

pub mod adapter;
pub mod analyzer;
pub mod buildrun;
pub mod dupes;
pub mod editor;
pub mod error;
pub mod index;
pub mod output;
pub mod refactor;
pub mod resolve;
pub mod session;
pub mod structure;
pub mod types;
