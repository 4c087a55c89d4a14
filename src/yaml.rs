// src/yaml.rs
//
// =============================================================================
// ODLC: YAML CONCRETE SYNTAX FRONT END
// =============================================================================
//
// The core (`compile`) never touches a filesystem; this module is the one
// piece of I/O in the crate outside the CLI itself. It loads a `.odl.yaml`
// file into the generic tree-of-mappings the Parser consumes, performing no
// semantic validation of its own beyond the key-shape check below.

use std::fs;
use std::path::Path;

use crate::error::OdlError;
use crate::SourceTree;

/// Load and deserialize a YAML source file into a raw source tree.
///
/// This round-trips through `serde_yaml::Value` rather than deserializing
/// straight to JSON so that YAML-native constructs (anchors, aliases,
/// non-quoted scalars) are resolved by the YAML data model before the tree
/// is converted to the `serde_json::Value` representation the rest of the
/// compiler is built around (`Parser`, `Node::params`, and every stage after
/// it already speak `serde_json::Value`; carrying a second, YAML-native tree
/// type through the pipeline would buy fidelity for document shapes ODL
/// sources never actually use). The one real fidelity gap that conversion
/// opens — `serde_json` silently stringifies non-string mapping keys rather
/// than rejecting them — is closed explicitly by `reject_non_string_keys`
/// below, so a YAML document using, say, an integer key fails loudly here
/// instead of quietly losing information.
pub fn load_source(path: impl AsRef<Path>) -> Result<SourceTree, OdlError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| OdlError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let yaml_value: serde_yaml::Value =
        serde_yaml::from_str(&raw).map_err(|source| OdlError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;

    reject_non_string_keys(&yaml_value).map_err(|key| {
        OdlError::Conversion(format!(
            "'{}': mapping key '{key}' is not a string; ODL documents require string keys",
            path.display()
        ))
    })?;

    serde_json::to_value(yaml_value).map_err(|e| OdlError::Conversion(e.to_string()))
}

/// Walk a YAML value looking for a mapping key that isn't a plain string.
/// `serde_json::to_value` would otherwise stringify such a key silently
/// (`1` becomes `"1"`), which is exactly the kind of quiet data loss this
/// loader is supposed to prevent.
fn reject_non_string_keys(value: &serde_yaml::Value) -> Result<(), String> {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, val) in map {
                if !matches!(key, serde_yaml::Value::String(_)) {
                    return Err(format!("{key:?}"));
                }
                reject_non_string_keys(val)?;
            }
            Ok(())
        }
        serde_yaml::Value::Sequence(items) => items.iter().try_for_each(reject_non_string_keys),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_simple_document() {
        let mut file = tempfile_with(
            "worker:\n  agent: Drafter\n  output: Draft\n  inputs: [Spec]\n",
        );
        let tree = load_source(file.path()).expect("should load");
        assert!(tree.get("worker").is_some());
        file.close();
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_source("/nonexistent/path/does-not-exist.odl.yaml").unwrap_err();
        assert!(matches!(err, OdlError::Io { .. }));
    }

    #[test]
    fn malformed_yaml_is_yaml_error() {
        let mut file = tempfile_with("worker: [unterminated");
        let err = load_source(file.path()).unwrap_err();
        assert!(matches!(err, OdlError::Yaml { .. }));
        file.close();
    }

    #[test]
    fn non_string_mapping_key_is_rejected_rather_than_silently_stringified() {
        let mut file = tempfile_with("worker:\n  agent: D\n  output: Draft\n  briefing:\n    1: oops\n");
        let err = load_source(file.path()).unwrap_err();
        assert!(matches!(err, OdlError::Conversion(_)));
        file.close();
    }

    struct TempFile {
        path: std::path::PathBuf,
    }

    impl TempFile {
        fn path(&self) -> &std::path::Path {
            &self.path
        }

        fn close(self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn tempfile_with(contents: &str) -> TempFile {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "odlc-test-{}-{}.yaml",
            std::process::id(),
            contents.len()
        ));
        let mut f = std::fs::File::create(&path).expect("create temp file");
        f.write_all(contents.as_bytes()).expect("write temp file");
        TempFile { path }
    }
}
