// src/error.rs
//
// =============================================================================
// ODLC: ERROR TAXONOMY
// =============================================================================
//
// Every stage reports through `CompileErrorKind`. Syntax and Resolve batch
// errors (`CompileErrors`); every other stage fails fast with a single
// `CompileError`. `OdlError` is the outer type that additionally covers the
// I/O and YAML front end (see `yaml.rs`), which sits outside the pure core.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// The taxonomy from the spec's error handling design, one variant per kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileErrorKind {
    #[error("node is not a single-keyed mapping: {0}")]
    MalformedNode(String),

    #[error("unknown opcode '{0}'")]
    UnknownOpCode(String),

    #[error("reserved artifact name '{0}' (contains '__')")]
    ReservedName(String),

    #[error("private artifact name '{0}' (starts with '_')")]
    PrivateName(String),

    #[error("missing required field '{0}'")]
    MissingRequiredField(String),

    #[error("project document '{0}' cannot be used as an output")]
    ExternalWriteAttempt(String),

    #[error("fan_out nodes cannot be nested")]
    NestedFanOut,

    #[error("undefined reference to artifact '{0}'")]
    UndefinedReference(String),

    #[error("ambiguous producer for artifact '{name}': visible producers {producers:?}")]
    AmbiguousProducer {
        name: String,
        producers: Vec<String>,
    },

    #[error("modifier '@{0}' is only valid on inputs inside a serial body nested under a loop or iterate")]
    InvalidModifier(String),

    #[error("dynamic variable '{0}' is not bound in this context")]
    UnboundDynamicVariable(String),

    #[error("circular dependency: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),

    #[error("internal assembly error: {0}")]
    InternalAssemblyError(String),
}

/// A single error, annotated with the offending node's path once known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub path: Option<String>,
    pub kind: CompileErrorKind,
}

impl CompileError {
    pub fn new(path: Option<String>, kind: CompileErrorKind) -> Self {
        Self { path, kind }
    }

    pub fn at(path: impl Into<String>, kind: CompileErrorKind) -> Self {
        Self::new(Some(path.into()), kind)
    }

    pub fn without_path(kind: CompileErrorKind) -> Self {
        Self::new(None, kind)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "[{path}] {}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for CompileError {}

/// A batched report of one or more `CompileError`s, produced by stages that
/// collect every error in the tree rather than failing on the first one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileErrors(pub Vec<CompileError>);

impl CompileErrors {
    pub fn new(errors: Vec<CompileError>) -> Self {
        Self(errors)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result<T>(errors: Vec<CompileError>, ok: T) -> Result<T, Self> {
        if errors.is_empty() {
            Ok(ok)
        } else {
            Err(Self(errors))
        }
    }
}

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} error(s) during compilation:", self.0.len())?;
        for e in &self.0 {
            writeln!(f, "  - {e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileErrors {}

impl From<CompileError> for CompileErrors {
    fn from(e: CompileError) -> Self {
        Self(vec![e])
    }
}

/// The outer error type: I/O and YAML-loading failures from the concrete
/// syntax front end, plus anything that escapes the pure core.
#[derive(Debug, Error)]
pub enum OdlError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML in '{path}': {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to convert YAML document to source tree: {0}")]
    Conversion(String),

    #[error(transparent)]
    Compile(#[from] CompileErrors),
}
