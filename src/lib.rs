//! Refract: index-backed code intelligence and refactoring for AI agents.
//!
//! The engine builds a structural index of a source tree and exposes
//! query/mutation operations (find usages, call graphs, rename, add
//! parameter, move file, bulk pattern replace, duplicate detection) so an
//! external agent can understand and safely edit a large codebase without
//! holding it in context.

// Core engine - re-exported from refract-core
pub use refract_core::adapter;
pub use refract_core::analyzer;
pub use refract_core::buildrun;
pub use refract_core::dupes;
pub use refract_core::editor;
pub use refract_core::error;
pub use refract_core::index;
pub use refract_core::output;
pub use refract_core::refactor;
pub use refract_core::resolve;
pub use refract_core::session;
pub use refract_core::structure;
pub use refract_core::types;

// Front doors for agents
pub mod cli;
#[cfg(feature = "mcp")]
pub mod mcp;
