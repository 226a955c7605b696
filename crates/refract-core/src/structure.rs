//! Output contract of the structural parser.
//!
//! The engine never derives declarations from raw text itself: a
//! [`crate::adapter::StructuralParser`] turns one file's source text into a
//! [`FileStructure`], and everything downstream (index, analyzer,
//! refactorings) consumes these records. Member bodies are captured verbatim
//! so mutating operations can match against on-disk text; they go stale after
//! any write until the index is rebuilt.
//!
//! All "kind" classifications are closed enums with exhaustive matching, not
//! open string tags, so adding a kind is a compile-time event.

use serde::{Deserialize, Serialize};

use crate::types::LineSpan;

// ============================================================================
// Kind Enums
// ============================================================================

/// Kind of a declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Class,
    Interface,
    Struct,
    Enum,
    Record,
    Delegate,
}

impl TypeKind {
    /// The declaration keyword as it appears in source.
    pub fn keyword(&self) -> &'static str {
        match self {
            TypeKind::Class => "class",
            TypeKind::Interface => "interface",
            TypeKind::Struct => "struct",
            TypeKind::Enum => "enum",
            TypeKind::Record => "record",
            TypeKind::Delegate => "delegate",
        }
    }

    /// Parse a declaration keyword.
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "class" => Some(TypeKind::Class),
            "interface" => Some(TypeKind::Interface),
            "struct" => Some(TypeKind::Struct),
            "enum" => Some(TypeKind::Enum),
            "record" => Some(TypeKind::Record),
            "delegate" => Some(TypeKind::Delegate),
            _ => None,
        }
    }
}

impl std::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Kind of a type member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Method,
    Property,
    Field,
    Event,
    Constructor,
}

impl std::fmt::Display for MemberKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MemberKind::Method => "method",
            MemberKind::Property => "property",
            MemberKind::Field => "field",
            MemberKind::Event => "event",
            MemberKind::Constructor => "constructor",
        };
        f.write_str(s)
    }
}

/// Declared access level of a member or type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Public,
    Internal,
    Protected,
    Private,
    /// No explicit modifier in source.
    #[default]
    Unspecified,
}

impl AccessLevel {
    /// Parse an access modifier keyword.
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "public" => Some(AccessLevel::Public),
            "internal" => Some(AccessLevel::Internal),
            "protected" => Some(AccessLevel::Protected),
            "private" => Some(AccessLevel::Private),
            _ => None,
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// One member of a declared type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRecord {
    /// Member name.
    pub name: String,
    /// Member kind.
    pub kind: MemberKind,
    /// Return type text ("void" for constructors and void methods).
    pub return_type: String,
    /// Full signature text as it appears on the declaration line.
    pub signature: String,
    /// Declared access level.
    pub access: AccessLevel,
    /// Line span of the whole member (declaration through closing brace).
    pub span: LineSpan,
    /// 1-indexed file line where the captured body text begins; 0 when the
    /// member has no body.
    pub body_start_line: u32,
    /// Verbatim body text. Stale after any write until reindexed.
    pub body: String,
    /// Declared parameter type names, in order.
    pub parameter_types: Vec<String>,
    /// Names of methods this member's body calls.
    pub calls: Vec<String>,
    pub is_static: bool,
    pub is_async: bool,
    pub is_virtual: bool,
    pub is_override: bool,
    pub is_abstract: bool,
    /// Doc comment text, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

impl MemberRecord {
    /// Number of source lines the member covers.
    pub fn line_count(&self) -> u32 {
        self.span.line_count()
    }

    /// Number of lines in the captured body text.
    pub fn body_line_count(&self) -> usize {
        if self.body.is_empty() {
            0
        } else {
            self.body.lines().count()
        }
    }
}

/// One declared type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeRecord {
    /// Simple type name.
    pub name: String,
    /// Namespace-qualified name.
    pub qualified_name: String,
    /// Type kind.
    pub kind: TypeKind,
    /// Base type name, if one is declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_type: Option<String>,
    /// Implemented interface names.
    pub interfaces: Vec<String>,
    /// Members in declaration order.
    pub members: Vec<MemberRecord>,
    pub is_abstract: bool,
    /// Line span of the declaration.
    pub span: LineSpan,
    /// Doc comment text, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

impl TypeRecord {
    /// Look up a member by name (first match in declaration order).
    pub fn member(&self, name: &str) -> Option<&MemberRecord> {
        self.members.iter().find(|m| m.name == name)
    }

    /// All members of the given kind.
    pub fn members_of_kind(&self, kind: MemberKind) -> impl Iterator<Item = &MemberRecord> {
        self.members.iter().filter(move |m| m.kind == kind)
    }
}

/// Parsed structure of one source file: the structural parser's output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileStructure {
    /// Declared namespace/module, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Types declared in the file.
    pub types: Vec<TypeRecord>,
    /// Import/using directives (namespace names).
    pub imports: Vec<String>,
}

impl FileStructure {
    /// Names of all types declared in the file.
    pub fn type_names(&self) -> Vec<&str> {
        self.types.iter().map(|t| t.name.as_str()).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_member(name: &str, kind: MemberKind) -> MemberRecord {
        MemberRecord {
            name: name.to_string(),
            kind,
            return_type: "void".to_string(),
            signature: format!("public void {}()", name),
            access: AccessLevel::Public,
            span: LineSpan::new(3, 6),
            body_start_line: 4,
            body: "DoWork();\nreturn;".to_string(),
            parameter_types: Vec::new(),
            calls: vec!["DoWork".to_string()],
            is_static: false,
            is_async: false,
            is_virtual: false,
            is_override: false,
            is_abstract: false,
            doc: None,
        }
    }

    #[test]
    fn type_kind_keyword_roundtrip() {
        for kind in [
            TypeKind::Class,
            TypeKind::Interface,
            TypeKind::Struct,
            TypeKind::Enum,
            TypeKind::Record,
            TypeKind::Delegate,
        ] {
            assert_eq!(TypeKind::from_keyword(kind.keyword()), Some(kind));
        }
        assert_eq!(TypeKind::from_keyword("module"), None);
    }

    #[test]
    fn access_level_defaults_to_unspecified() {
        assert_eq!(AccessLevel::default(), AccessLevel::Unspecified);
        assert_eq!(AccessLevel::from_keyword("public"), Some(AccessLevel::Public));
        assert_eq!(AccessLevel::from_keyword("static"), None);
    }

    #[test]
    fn member_lookup_by_name() {
        let ty = TypeRecord {
            name: "Svc".to_string(),
            qualified_name: "App.Svc".to_string(),
            kind: TypeKind::Class,
            base_type: None,
            interfaces: Vec::new(),
            members: vec![
                sample_member("Run", MemberKind::Method),
                sample_member("Stop", MemberKind::Method),
            ],
            is_abstract: false,
            span: LineSpan::new(1, 20),
            doc: None,
        };
        assert!(ty.member("Run").is_some());
        assert!(ty.member("Missing").is_none());
        assert_eq!(ty.members_of_kind(MemberKind::Method).count(), 2);
        assert_eq!(ty.members_of_kind(MemberKind::Field).count(), 0);
    }

    #[test]
    fn body_line_count_handles_empty_body() {
        let mut m = sample_member("Run", MemberKind::Method);
        assert_eq!(m.body_line_count(), 2);
        m.body.clear();
        assert_eq!(m.body_line_count(), 0);
    }

    #[test]
    fn kinds_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&TypeKind::Interface).unwrap(),
            "\"interface\""
        );
        assert_eq!(
            serde_json::to_string(&MemberKind::Constructor).unwrap(),
            "\"constructor\""
        );
    }
}
