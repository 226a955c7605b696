//! Pure source generators: extract method, interface, constructor, stubs.
//!
//! These functions only produce text. Applying the text to a file is the
//! caller's job (via the safe editor), which keeps "generate" and "apply"
//! independently testable and lets an agent review generated code before it
//! lands anywhere.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::refactor::is_identifier;
use crate::structure::{AccessLevel, MemberKind, TypeRecord};
use crate::types::LineSpan;

/// Result of extracting a line range into a new method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedMethod {
    /// Full text of the new method.
    pub method_text: String,
    /// The call that replaces the extracted lines.
    pub call_text: String,
    /// The lines the caller should replace with `call_text`.
    pub replaced_span: LineSpan,
}

/// Extract a line range of `source` into a new private method.
///
/// The extracted lines are re-indented relative to their common leading
/// whitespace. No data-flow analysis is attempted: parameters and return
/// values are the caller's responsibility to wire up.
pub fn extract_method(
    source: &str,
    start_line: u32,
    end_line: u32,
    method_name: &str,
) -> Result<ExtractedMethod, EngineError> {
    if !is_identifier(method_name) {
        return Err(EngineError::validation(format!(
            "'{}' is not a valid method name",
            method_name
        )));
    }
    if start_line == 0 || end_line < start_line {
        return Err(EngineError::validation(
            "start_line must be >= 1 and end_line >= start_line",
        ));
    }
    let lines: Vec<&str> = source.lines().collect();
    if end_line as usize > lines.len() {
        return Err(EngineError::validation(format!(
            "line range {}..{} exceeds file length {}",
            start_line,
            end_line,
            lines.len()
        )));
    }
    let selected = &lines[(start_line - 1) as usize..end_line as usize];
    if selected.iter().all(|l| l.trim().is_empty()) {
        return Err(EngineError::validation("selected lines are empty"));
    }

    let common_indent = selected
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut body = String::new();
    for line in selected {
        if line.trim().is_empty() {
            body.push('\n');
        } else {
            body.push_str("    ");
            body.push_str(&line[common_indent.min(line.len())..]);
            body.push('\n');
        }
    }

    let method_text = format!("private void {}()\n{{\n{}}}\n", method_name, body);
    Ok(ExtractedMethod {
        method_text,
        call_text: format!("{}();", method_name),
        replaced_span: LineSpan::new(start_line, end_line),
    })
}

/// Generate an interface from a type's public members.
///
/// Methods and properties only; fields, events, and constructors do not
/// belong on an interface. The name defaults to `I<TypeName>`.
pub fn generate_interface(ty: &TypeRecord, interface_name: Option<&str>) -> Result<String, EngineError> {
    let name = match interface_name {
        Some(n) if !is_identifier(n) => {
            return Err(EngineError::validation(format!(
                "'{}' is not a valid interface name",
                n
            )));
        }
        Some(n) => n.to_string(),
        None => format!("I{}", ty.name),
    };

    let mut lines = vec![format!("public interface {}", name), "{".to_string()];
    let mut wrote_any = false;
    for member in &ty.members {
        if member.access != AccessLevel::Public {
            continue;
        }
        match member.kind {
            MemberKind::Method => {
                let params = parameter_list_of(&member.signature);
                lines.push(format!(
                    "    {} {}({});",
                    member.return_type, member.name, params
                ));
                wrote_any = true;
            }
            MemberKind::Property => {
                lines.push(format!(
                    "    {} {} {{ get; set; }}",
                    member.return_type, member.name
                ));
                wrote_any = true;
            }
            MemberKind::Field | MemberKind::Event | MemberKind::Constructor => {}
        }
    }
    if !wrote_any {
        return Err(EngineError::validation(format!(
            "type '{}' has no public methods or properties to lift",
            ty.name
        )));
    }
    lines.push("}".to_string());
    Ok(lines.join("\n") + "\n")
}

/// Generate a constructor assigning every declared field from a parameter.
pub fn generate_constructor(ty: &TypeRecord) -> Result<String, EngineError> {
    let fields: Vec<_> = ty
        .members
        .iter()
        .filter(|m| m.kind == MemberKind::Field && !m.is_static)
        .collect();
    if fields.is_empty() {
        return Err(EngineError::validation(format!(
            "type '{}' has no instance fields",
            ty.name
        )));
    }

    let params: Vec<String> = fields
        .iter()
        .map(|f| format!("{} {}", f.return_type, parameter_name_for(&f.name)))
        .collect();
    let mut lines = vec![
        format!("public {}({})", ty.name, params.join(", ")),
        "{".to_string(),
    ];
    for field in &fields {
        lines.push(format!(
            "    {} = {};",
            field.name,
            parameter_name_for(&field.name)
        ));
    }
    lines.push("}".to_string());
    Ok(lines.join("\n") + "\n")
}

/// Generate stub implementations for every member of an interface.
pub fn implement_interface(interface: &TypeRecord) -> Result<String, EngineError> {
    let mut lines = Vec::new();
    for member in &interface.members {
        match member.kind {
            MemberKind::Method => {
                let params = parameter_list_of(&member.signature);
                if !lines.is_empty() {
                    lines.push(String::new());
                }
                lines.push(format!(
                    "public {} {}({})",
                    member.return_type, member.name, params
                ));
                lines.push("{".to_string());
                lines.push("    throw new NotImplementedException();".to_string());
                lines.push("}".to_string());
            }
            MemberKind::Property => {
                if !lines.is_empty() {
                    lines.push(String::new());
                }
                lines.push(format!(
                    "public {} {} {{ get; set; }}",
                    member.return_type, member.name
                ));
            }
            MemberKind::Field | MemberKind::Event | MemberKind::Constructor => {}
        }
    }
    if lines.is_empty() {
        return Err(EngineError::validation(format!(
            "interface '{}' has no members to implement",
            interface.name
        )));
    }
    Ok(lines.join("\n") + "\n")
}

/// The parameter list text of a declaration signature (between the parens).
fn parameter_list_of(signature: &str) -> String {
    let Some(open) = signature.find('(') else {
        return String::new();
    };
    let Some(close) = signature.rfind(')') else {
        return String::new();
    };
    if close <= open {
        return String::new();
    }
    signature[open + 1..close].trim().to_string()
}

/// Parameter name for a field: strip the `_` prefix, lowercase the first
/// letter.
fn parameter_name_for(field_name: &str) -> String {
    let stripped = field_name.trim_start_matches('_');
    if stripped.is_empty() {
        return field_name.to_string();
    }
    let mut chars = stripped.chars();
    let first = chars.next().unwrap_or('x');
    format!("{}{}", first.to_lowercase(), chars.as_str())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{CFamilyParser, StructuralParser};

    fn parsed_type(source: &str, name: &str) -> TypeRecord {
        let parser = CFamilyParser::new();
        parser
            .parse(source)
            .types
            .into_iter()
            .find(|t| t.name == name)
            .expect("type in fixture")
    }

    mod extract {
        use super::*;

        const SOURCE: &str = "void Outer()\n{\n    if (ready)\n    {\n        Connect();\n        Sync();\n    }\n}\n";

        #[test]
        fn extracts_and_reindents() {
            let extracted = extract_method(SOURCE, 5, 6, "ConnectAndSync").unwrap();
            assert_eq!(
                extracted.method_text,
                "private void ConnectAndSync()\n{\n    Connect();\n    Sync();\n}\n"
            );
            assert_eq!(extracted.call_text, "ConnectAndSync();");
            assert_eq!(extracted.replaced_span, LineSpan::new(5, 6));
        }

        #[test]
        fn rejects_bad_ranges() {
            assert!(extract_method(SOURCE, 0, 2, "M").is_err());
            assert!(extract_method(SOURCE, 6, 5, "M").is_err());
            assert!(extract_method(SOURCE, 5, 99, "M").is_err());
        }

        #[test]
        fn rejects_bad_names_and_empty_selections() {
            assert!(extract_method(SOURCE, 5, 6, "2bad").is_err());
            assert!(extract_method("\n\n\n", 1, 2, "M").is_err());
        }
    }

    mod interface_generation {
        use super::*;

        const SOURCE: &str = r#"public class Svc
{
    private int _count;

    public string Name { get; set; }

    public Svc(int count)
    {
        _count = count;
    }

    public bool Run(int retries, string label)
    {
        return true;
    }

    private void Hidden()
    {
    }
}
"#;

        #[test]
        fn lifts_public_methods_and_properties() {
            let ty = parsed_type(SOURCE, "Svc");
            let text = generate_interface(&ty, None).unwrap();
            assert!(text.starts_with("public interface ISvc\n{"));
            assert!(text.contains("bool Run(int retries, string label);"));
            assert!(text.contains("string Name { get; set; }"));
            assert!(!text.contains("Hidden"));
            assert!(!text.contains("_count"));
            assert!(!text.contains("Svc(int count)"));
        }

        #[test]
        fn explicit_name_is_used() {
            let ty = parsed_type(SOURCE, "Svc");
            let text = generate_interface(&ty, Some("IRunner")).unwrap();
            assert!(text.starts_with("public interface IRunner"));
        }

        #[test]
        fn type_without_public_surface_is_rejected() {
            let ty = parsed_type("public class Empty\n{\n    private int _x;\n}\n", "Empty");
            assert!(generate_interface(&ty, None).is_err());
        }
    }

    mod constructor_generation {
        use super::*;

        #[test]
        fn assigns_every_instance_field() {
            let ty = parsed_type(
                "public class Box\n{\n    private readonly int _size;\n    private string _label;\n    private static int Counter;\n}\n",
                "Box",
            );
            let text = generate_constructor(&ty).unwrap();
            assert!(text.starts_with("public Box(int size, string label)"));
            assert!(text.contains("    _size = size;"));
            assert!(text.contains("    _label = label;"));
            assert!(!text.contains("Counter"));
        }

        #[test]
        fn fieldless_type_is_rejected() {
            let ty = parsed_type("public class Nothing\n{\n}\n", "Nothing");
            assert!(generate_constructor(&ty).is_err());
        }
    }

    mod stub_generation {
        use super::*;

        #[test]
        fn stubs_every_interface_member() {
            let ty = parsed_type(
                "public interface IWorker\n{\n    void Work(int shift);\n    string Name { get; set; }\n}\n",
                "IWorker",
            );
            let text = implement_interface(&ty).unwrap();
            assert!(text.contains("public void Work(int shift)"));
            assert!(text.contains("    throw new NotImplementedException();"));
            assert!(text.contains("public string Name { get; set; }"));
        }

        #[test]
        fn empty_interface_is_rejected() {
            let ty = parsed_type("public interface INothing\n{\n}\n", "INothing");
            assert!(implement_interface(&ty).is_err());
        }
    }
}
