//! End-to-end tests through the session facade: index a temp workspace, then
//! exercise queries and refactorings the way a remote agent would.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use refract::error::EngineError;
use refract::index::WorkspaceRoot;
use refract::refactor::parameter::AddParameterRequest;
use refract::resolve;
use refract::session::{SessionOptions, WorkspaceSession};

fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// A small application: Foo.Save called from Bar.Run and Baz.Init, plus a
/// service with three call sites of Svc.Run for the add-parameter scenario.
fn sample_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "Models/Foo.cs",
        r#"namespace App.Models
{
    public class Foo
    {
        public void Save()
        {
            Validate();
        }

        private void Validate()
        {
        }
    }
}
"#,
    );
    write(
        dir.path(),
        "Services/Bar.cs",
        r#"namespace App.Services
{
    public class Bar
    {
        public void Run()
        {
            Foo.Save();
        }
    }
}
"#,
    );
    write(
        dir.path(),
        "Services/Baz.cs",
        r#"namespace App.Services
{
    public class Baz
    {
        public void Init()
        {
            Foo.Save();
        }
    }
}
"#,
    );
    write(
        dir.path(),
        "Services/Svc.cs",
        r#"namespace App.Services
{
    public class Svc
    {
        public void Run(int x)
        {
        }
    }
}
"#,
    );
    write(
        dir.path(),
        "Services/CallerA.cs",
        r#"namespace App.Services
{
    public class CallerA
    {
        public void Go()
        {
            Svc.Run();
        }
    }
}
"#,
    );
    write(
        dir.path(),
        "Services/CallerB.cs",
        r#"namespace App.Services
{
    public class CallerB
    {
        public void Go()
        {
            Svc.Run(x);
            Svc.Run(y);
        }
    }
}
"#,
    );
    write(
        dir.path(),
        "Util/Quiet.cs",
        r#"namespace App.Util
{
    public class Quiet
    {
        public void Noop()
        {
        }
    }
}
"#,
    );
    dir
}

fn open(dir: &TempDir) -> WorkspaceSession {
    WorkspaceSession::open(dir.path(), SessionOptions::default()).unwrap()
}

#[test]
fn index_then_query_call_graph_scenario() {
    let dir = sample_workspace();
    let session = open(&dir);

    // Foo.Save called from Bar.Run and Baz.Init: exactly 2 callers at depth 1,
    // no upstream chains.
    let graph = session.call_graph(Some("Foo"), "Save", 1).unwrap();
    assert_eq!(graph.callers.len(), 2);
    let callers: Vec<String> = graph
        .callers
        .iter()
        .map(|c| format!("{}.{}", c.caller_type, c.caller_member))
        .collect();
    assert!(callers.contains(&"Bar.Run".to_string()));
    assert!(callers.contains(&"Baz.Init".to_string()));
    assert!(graph.callers.iter().all(|c| c.upstream_callers.is_empty()));
    assert!(graph.callees.iter().all(|c| c.downstream_callees.is_empty()));
}

#[test]
fn add_parameter_scenario_from_the_contract() {
    let dir = sample_workspace();
    let session = open(&dir);

    let request = AddParameterRequest {
        type_name: "Svc".to_string(),
        method_name: "Run".to_string(),
        parameter_type: "bool".to_string(),
        parameter_name: "flag".to_string(),
        default_value: "false".to_string(),
        preview: false,
    };
    let report = session.add_parameter(&request).unwrap();
    assert_eq!(report.total_call_sites, 3);
    assert!(report.failures.is_empty());

    let svc = fs::read_to_string(dir.path().join("Services/Svc.cs")).unwrap();
    assert!(svc.contains("public void Run(int x, bool flag)"));
    let a = fs::read_to_string(dir.path().join("Services/CallerA.cs")).unwrap();
    assert!(a.contains("Svc.Run(false);"));
    let b = fs::read_to_string(dir.path().join("Services/CallerB.cs")).unwrap();
    assert!(b.contains("Svc.Run(x, false);"));
    assert!(b.contains("Svc.Run(y, false);"));

    // The file with no call sites is untouched and unreported.
    assert!(report.files.iter().all(|f| !f.file.contains("Quiet")));
    let quiet = fs::read_to_string(dir.path().join("Util/Quiet.cs")).unwrap();
    assert!(!quiet.contains("false"));
}

#[test]
fn rename_preview_then_apply_then_refresh() {
    let dir = sample_workspace();
    let session = open(&dir);

    let preview = session.rename("Save", "Persist", true).unwrap();
    assert!(preview.preview);
    assert!(preview.files_changed >= 3);
    let untouched = fs::read_to_string(dir.path().join("Models/Foo.cs")).unwrap();
    assert!(untouched.contains("public void Save()"));

    let applied = session.rename("Save", "Persist", false).unwrap();
    assert!(applied.failures.is_empty());
    let foo = fs::read_to_string(dir.path().join("Models/Foo.cs")).unwrap();
    assert!(foo.contains("public void Persist()"));

    // After refresh, the new name resolves and the old one is gone.
    session.refresh().unwrap();
    let graph = session.call_graph(Some("Foo"), "Persist", 1).unwrap();
    assert_eq!(graph.callers.len(), 2);
    assert!(session.call_graph(Some("Foo"), "Save", 1).is_err());
}

#[test]
fn merged_workspace_resolution_is_three_way() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    write(a.path(), "File.cs", "namespace A { public class One { } }\n");
    write(b.path(), "File.cs", "namespace B { public class Two { } }\n");

    let session = WorkspaceSession::open_merged(
        "merged",
        vec![
            WorkspaceRoot::with_tag(a.path(), "ProjA"),
            WorkspaceRoot::with_tag(b.path(), "ProjB"),
        ],
        SessionOptions::default(),
    )
    .unwrap();
    let index = session.index();

    // Bare name is ambiguous, each listed candidate resolves uniquely.
    let err = resolve::resolve(&index, "File.cs").unwrap_err();
    let candidates = match err {
        EngineError::Ambiguous { candidates, .. } => candidates,
        other => panic!("expected ambiguity, got {:?}", other),
    };
    assert_eq!(candidates.len(), 2);
    for candidate in candidates {
        assert!(resolve::resolve(&index, &candidate).is_ok());
    }
}

#[test]
fn replace_text_enforces_uniqueness_end_to_end() {
    let dir = sample_workspace();
    let session = open(&dir);

    // "public void Go()" appears in CallerA and CallerB, but replace targets
    // one resolved file, so each is unambiguous.
    let outcome = session
        .replace_text("CallerA.cs", "public void Go()", "public void Start()", false)
        .unwrap();
    assert_eq!(outcome.matched_text, "public void Go()");

    // A needle occurring twice within one file is refused.
    write(
        dir.path(),
        "Services/Twice.cs",
        "namespace App\n{\n    public class Twice\n    {\n        // mark\n        // mark\n    }\n}\n",
    );
    session.refresh().unwrap();
    let err = session
        .replace_text("Twice.cs", "// mark", "// done", false)
        .unwrap_err();
    assert!(matches!(err, EngineError::Uniqueness { matches: 2, .. }));
}

#[test]
fn duplicate_detection_over_the_workspace() {
    let dir = sample_workspace();
    write(
        dir.path(),
        "Dup/A.cs",
        r#"namespace App.Dup
{
    public class A
    {
        public void First()
        {
            var total = 0;
            foreach (var item in Items)
            {
                total += item.Value;
            }
            Publish(total);
        }
    }
}
"#,
    );
    write(
        dir.path(),
        "Dup/B.cs",
        r#"namespace App.Dup
{
    public class B
    {
        public void Second()
        {
            var total = 0;
            foreach (var item in Items)
            {
                total += item.Value;
            }
            Publish(total);
        }
    }
}
"#,
    );
    let session = open(&dir);
    let clusters = session.find_duplicates(3, 90.0, 10).unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].members.len(), 2);
    assert_eq!(clusters[0].similarity, 100.0);
}

#[test]
fn generators_return_text_without_writing() {
    let dir = sample_workspace();
    let session = open(&dir);
    let before = fs::read_to_string(dir.path().join("Services/Svc.cs")).unwrap();

    let interface = session.generate_interface("Svc", None).unwrap();
    assert!(interface.contains("public interface ISvc"));
    assert!(interface.contains("void Run(int x);"));

    let extracted = session
        .extract_method("Models/Foo.cs", 7, 7, "SaveCore")
        .unwrap();
    assert!(extracted.method_text.contains("private void SaveCore()"));

    // Nothing was written by either generator.
    assert_eq!(
        fs::read_to_string(dir.path().join("Services/Svc.cs")).unwrap(),
        before
    );
}

#[test]
fn move_file_updates_namespace_and_flags_referencers() {
    let dir = sample_workspace();
    let session = open(&dir);

    let report = session.move_file("Models/Foo.cs", "Domain/Foo.cs").unwrap();
    assert!(!dir.path().join("Models/Foo.cs").exists());
    let moved = fs::read_to_string(dir.path().join("Domain/Foo.cs")).unwrap();
    assert!(moved.contains("namespace App.Domain"));

    // Bar and Baz call Foo.Save, so they are flagged, not rewritten.
    assert!(report.flagged.iter().any(|f| f.file == "Services/Bar.cs"));
    assert!(report.flagged.iter().any(|f| f.file == "Services/Baz.cs"));
    let bar = fs::read_to_string(dir.path().join("Services/Bar.cs")).unwrap();
    assert!(bar.contains("Foo.Save();"));
}

#[test]
fn pattern_replace_reports_per_file_outcomes() {
    let dir = sample_workspace();
    let session = open(&dir);

    let report = session
        .pattern_replace(r"Foo\.Save", "Foo.Store", None, false)
        .unwrap();
    assert_eq!(report.files_changed, 2);
    assert_eq!(report.total_replacements, 2);
    assert!(report.failures.is_empty());
    let bar = fs::read_to_string(dir.path().join("Services/Bar.cs")).unwrap();
    assert!(bar.contains("Foo.Store();"));
}
