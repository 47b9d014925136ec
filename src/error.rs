//! Error types for shape catalogs, graph construction and generation runs.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::Generated;

/// Problems with type expressions or shape definitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("invalid type expression `{input}` at offset {offset}: {message}")]
    Parse {
        input: String,
        offset: usize,
        message: String,
    },

    #[error("invalid identifier `{0}`")]
    InvalidIdentifier(String),

    #[error("shape `{0}` is already defined")]
    DuplicateShape(String),

    #[error("shape `{shape}` refers to unknown shape `{missing}`")]
    UnknownReference { shape: String, missing: String },

    #[error("shape `{shape}` uses undeclared type variable `{var}`")]
    UndeclaredVariable { shape: String, var: String },

    #[error("shape `{shape}` passes {actual} type argument(s) to `{reference}`, which expects {expected}")]
    Arity {
        shape: String,
        reference: String,
        expected: usize,
        actual: usize,
    },

    #[error("shape `{shape}` can only extend a record, found `{supertype}`")]
    InvalidSupertype { shape: String, supertype: String },

    #[error("shape `{0}` has a cyclic `extends` chain")]
    CyclicSupertype(String),

    #[error("shape `{shape}` declares field `{field}` more than once (including inherited fields)")]
    DuplicateField { shape: String, field: String },

    #[error("enum shape `{0}` has no variants")]
    EmptyEnum(String),
}

/// A generic argument (or an erased container argument) with no binding in
/// either the enclosing scope or the root scope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "unresolved type argument `{argument}` in `{raw}`{}",
    .field.as_ref().map(|f| format!(" (declared by field {f})")).unwrap_or_default()
)]
pub struct UnresolvedTypeError {
    /// The raw shape reference that was being resolved.
    pub raw: String,
    /// The type variable or type parameter that had no binding.
    pub argument: String,
    /// `Declaring.field` of the member whose type was being resolved.
    pub field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("unknown setting `{0}`")]
    UnknownKey(String),

    #[error("invalid value `{value}` for setting `{key}`: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Fatal problems while turning a root shape plus configuration into a
/// node graph.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Unresolved(#[from] UnresolvedTypeError),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("unknown shape `{0}`")]
    UnknownShape(String),

    #[error("shape `{shape}` expects {expected} type argument(s), got {actual}")]
    ArityMismatch {
        shape: String,
        expected: usize,
        actual: usize,
    },

    #[error("subtype `{subtype}` is not compatible with `{declared}` at {position}")]
    IncompatibleSubtype {
        declared: String,
        subtype: String,
        position: String,
    },

    #[error("no generator registered for leaf shape `{0}`")]
    MissingLeafGenerator(String),

    #[error("assignment to {destination}: {reason}")]
    AssignmentOrigin { destination: String, reason: String },
}

/// Errors surfaced by a generation run.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("could not produce a unique value for {node} within {attempts} attempts")]
    UniqueRetryExhausted { node: String, attempts: usize },

    #[error("no value for {node} passed its filters within {attempts} attempts")]
    FilterRetryExhausted { node: String, attempts: usize },

    #[error("assignment cycle: {destination} needs {origin}, which is still being generated")]
    AssignmentCycle { destination: String, origin: String },

    /// Strict mode only. The generated instances are still valid and are
    /// handed back alongside the offending selectors.
    #[error("selectors matched no nodes: {}", .selectors.join(", "))]
    UnmatchedSelectors {
        selectors: Vec<String>,
        generated: Vec<Generated>,
    },
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {message}", .path.display())]
    Json { path: PathBuf, message: String },

    #[error("glob pattern matched no files: {0}")]
    NoMatches(String),

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Glob(#[from] glob::GlobError),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter `{filter}`: {message}")]
    Filter { filter: String, message: String },

    #[error("failed to install the tracing subscriber: {0}")]
    Install(String),
}
