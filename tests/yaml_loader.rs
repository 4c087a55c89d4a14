use odlc::OdlError;
use std::io::Write;

struct TempFile {
    path: std::path::PathBuf,
}

impl TempFile {
    fn with(contents: &str) -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "odlc-yaml-loader-test-{}-{}.yaml",
            std::process::id(),
            contents.len()
        ));
        let mut f = std::fs::File::create(&path).expect("create temp file");
        f.write_all(contents.as_bytes()).expect("write temp file");
        TempFile { path }
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[test]
fn loads_a_real_document_into_a_source_tree() {
    let file = TempFile::with(
        "generate_team:\n  generator: Drafter\n  validators: [Reviewer]\n  loop: 2\n  output: Draft\n",
    );
    let tree = odlc::yaml::load_source(&file.path).expect("valid YAML should load");
    assert!(tree.get("generate_team").is_some());
}

#[test]
fn missing_file_reports_the_requested_path() {
    let missing = std::env::temp_dir().join("odlc-does-not-exist-9182.odl.yaml");
    let err = odlc::yaml::load_source(&missing).unwrap_err();
    match err {
        OdlError::Io { path, .. } => assert_eq!(path, missing),
        other => panic!("expected OdlError::Io, got {other}"),
    }
}

#[test]
fn unreadable_directory_is_an_io_error_not_a_panic() {
    let err = odlc::yaml::load_source(std::env::temp_dir()).unwrap_err();
    assert!(matches!(err, OdlError::Io { .. }));
}

#[test]
fn malformed_yaml_reports_the_offending_path() {
    let file = TempFile::with("worker: [unterminated");
    let err = odlc::yaml::load_source(&file.path).unwrap_err();
    match err {
        OdlError::Yaml { path, .. } => assert_eq!(path, file.path),
        other => panic!("expected OdlError::Yaml, got {other}"),
    }
}

#[test]
fn non_string_mapping_key_fails_loudly_instead_of_being_stringified() {
    let file = TempFile::with("worker:\n  agent: D\n  output: Draft\n  briefing:\n    1: oops\n");
    let err = odlc::yaml::load_source(&file.path).unwrap_err();
    assert!(matches!(err, OdlError::Conversion(_)));
}

#[test]
fn yaml_anchors_and_aliases_resolve_before_reaching_the_parser() {
    let file = TempFile::with(
        "briefing: &shared\n  mode: review\nworker:\n  agent: Drafter\n  output: Draft\n  briefing:\n    global: *shared\n",
    );
    let tree = odlc::yaml::load_source(&file.path).expect("anchors should resolve");
    let resolved = &tree["worker"]["briefing"]["global"]["mode"];
    assert_eq!(resolved.as_str(), Some("review"));
}
