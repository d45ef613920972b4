//! Reflected host types served as a GraphQL-style schema.
//!
//! Host types describe themselves through [`OutputType`], [`InputType`],
//! [`Arguments`] and [`Enum`]; [`Schema::builder`] walks them into a type
//! graph, and [`Schema::execute`] runs queries against a pair of root values.
pub mod demo;
pub mod error;
pub mod introspection;
pub mod naming;
pub mod parser;
pub mod path_de;
pub mod reflect;
pub mod registry;
pub mod request;
pub mod resolve;
pub mod response;
pub mod schema;
pub mod validation;
pub mod value;

pub use error::{FieldError, PathSegment, Pos, RequestError, SchemaError, SyntaxError, ValidationError};
pub use reflect::{
    Arguments, Enum, Id, InputDescriptor, InputField, InputType, ObjDescriptor, OutputType, Reflector, Resolved,
    Upload, UploadedFile,
};
pub use request::{CancelToken, FormCallbacks, FormSource, HttpRequest, Request, ResolveOptions};
pub use resolve::Ctx;
pub use response::{Response, ResponseError};
pub use schema::{Schema, SchemaBuilder, TypeKind, TypeRef};
pub use value::{ConstValue, Value, Variables};
