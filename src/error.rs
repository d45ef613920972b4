//! Error taxonomy.
//!
//! - [`SchemaError`]: build time, aborts schema construction.
//! - [`SyntaxError`]: one request, the query text could not be parsed.
//! - [`ValidationError`]: one request, collected; the operation is not executed.
//! - [`FieldError`]: one field, collected; drives null propagation.
use std::fmt;
use serde::Serialize;

/// 1-based line/column into the query text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("`{0}` is not a valid GraphQL name")]
    InvalidName(String),
    #[error("names starting with `__` are reserved for introspection: `{0}`")]
    ReservedName(String),
    #[error("type name `{0}` is already registered")]
    DuplicateTypeName(String),
    #[error("enum `{0}` is already registered")]
    DuplicateEnum(String),
    #[error("enum `{0}` must declare at least one value")]
    EmptyEnum(String),
    #[error("enum `{name}` declares the value `{value}` more than once")]
    DuplicateEnumValue { name: String, value: String },
    #[error("enum type `{0}` is used before it was registered")]
    UnregisteredEnum(String),
    #[error("field `{field}` is declared more than once on `{type_name}`")]
    DuplicateField { type_name: String, field: String },
    #[error("unsupported type for `{context}`: {reason}")]
    Unsupported { context: String, reason: String },
    #[error("root type `{0}` must be an object type")]
    RootNotObject(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (at {pos})")]
pub struct SyntaxError {
    pub message: String,
    pub pos: Pos,
}

impl SyntaxError {
    pub(crate) fn new(message: impl Into<String>, pos: Pos) -> Self {
        Self { message: message.into(), pos }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
    pub locations: Vec<Pos>,
}

impl ValidationError {
    pub(crate) fn new(message: impl Into<String>, pos: Pos) -> Self {
        Self { message: message.into(), locations: vec![pos] }
    }
}

/// Error returned by a resolver. The engine attaches the path and location.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct FieldError {
    pub message: String,
    pub extensions: Option<serde_json::Map<String, serde_json::Value>>,
}

impl FieldError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), extensions: None }
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extensions
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.into(), value.into());
        self
    }
}

impl From<String> for FieldError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for FieldError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Resolver errors are any `Display`; a `FieldError` keeps its extensions.
pub(crate) fn into_field_error<E: fmt::Display + 'static>(error: E) -> FieldError {
    let any: &dyn std::any::Any = &error;
    match any.downcast_ref::<FieldError>() {
        Some(field_error) => field_error.clone(),
        None => FieldError::new(error.to_string()),
    }
}

/// The transport handed over something that is not a GraphQL request.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("unsupported HTTP method `{0}`")]
    UnsupportedMethod(String),
    #[error("unsupported content type `{0}`")]
    UnsupportedContentType(String),
    #[error("missing `query`")]
    MissingQuery,
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),
    #[error("invalid `variables`: {0}")]
    InvalidVariables(String),
    #[error("could not read form: {0}")]
    Form(String),
    #[error("root value type does not match the schema's `{0}` root")]
    RootMismatch(&'static str),
}

/// One entry of the response path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}
