//! The immutable schema: every reachable type, built once from the two root types.
use std::any::TypeId;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use crate::error::SchemaError;
use crate::introspection;
use crate::reflect::{
    Enum, InputDescriptor, InputObjectType, ObjDescriptor, ObjectType, OutputType, Reflector,
};
use crate::registry::{Registry, UPLOAD_SCALAR};

/// `__TypeKind`. There are no interfaces or unions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeKind {
    Scalar,
    Object,
    Enum,
    InputObject,
    List,
    NonNull,
}

/// A type as written in a signature: a named type under list/non-null wrappers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named { kind: TypeKind, name: String },
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    fn non_null(self) -> Self {
        Self::NonNull(Box::new(self))
    }

    pub fn named_type(&self) -> &str {
        match self {
            Self::Named { name, .. } => name,
            Self::List(inner) | Self::NonNull(inner) => inner.named_type(),
        }
    }

    /// Output wrap rule: a reflected value is non-null unless it sits behind an
    /// `Option` (or is the result of a plain function).
    pub fn output(desc: &ObjDescriptor) -> Self {
        match desc {
            ObjDescriptor::Ptr(inner) => Self::output_nullable(inner),
            ObjDescriptor::Method { out_type, is_type_method: false, .. } => Self::output_nullable(out_type),
            ObjDescriptor::Method { out_type, .. } => Self::output(out_type),
            other => Self::output_nullable(other).non_null(),
        }
    }

    fn output_nullable(desc: &ObjDescriptor) -> Self {
        match desc {
            ObjDescriptor::Array(elem) => Self::List(Box::new(Self::output(elem))),
            ObjDescriptor::ObjRef(name) => Self::Named { kind: TypeKind::Object, name: name.clone() },
            ObjDescriptor::Data { kind, is_id } => Self::Named {
                kind: TypeKind::Scalar,
                name: Registry::scalar_name(*kind, *is_id).to_string(),
            },
            ObjDescriptor::Enum(name) => Self::Named { kind: TypeKind::Enum, name: name.clone() },
            // Option<Option<T>> and Option<fn> collapse into one nullable layer.
            ObjDescriptor::Ptr(inner) => Self::output_nullable(inner),
            ObjDescriptor::Method { out_type, .. } => Self::output_nullable(out_type),
        }
    }

    pub fn input(desc: &InputDescriptor) -> Self {
        match desc {
            InputDescriptor::Ptr(inner) => Self::input_nullable(inner),
            other => Self::input_nullable(other).non_null(),
        }
    }

    fn input_nullable(desc: &InputDescriptor) -> Self {
        match desc {
            InputDescriptor::Struct(name) => Self::Named { kind: TypeKind::InputObject, name: name.clone() },
            InputDescriptor::List(elem) => Self::List(Box::new(Self::input(elem))),
            InputDescriptor::Data { kind, is_id } => Self::Named {
                kind: TypeKind::Scalar,
                name: Registry::scalar_name(*kind, *is_id).to_string(),
            },
            InputDescriptor::Enum(name) => Self::Named { kind: TypeKind::Enum, name: name.clone() },
            InputDescriptor::Upload => Self::Named { kind: TypeKind::Scalar, name: UPLOAD_SCALAR.to_string() },
            InputDescriptor::Ptr(inner) => Self::input_nullable(inner),
        }
    }
}

impl Display for TypeRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named { name, .. } => f.write_str(name),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

pub struct Schema {
    pub(crate) registry: Registry,
    pub(crate) objects: BTreeMap<String, ObjectType>,
    pub(crate) inputs: BTreeMap<String, InputObjectType>,
    query: String,
    mutation: String,
    query_type_id: TypeId,
    mutation_type_id: TypeId,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Shorthand for a schema without host enums.
    pub fn new<Q: OutputType, M: OutputType>() -> Result<Self, SchemaError> {
        Self::builder().build::<Q, M>()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn query_type(&self) -> &ObjectType {
        &self.objects[&self.query]
    }

    pub fn mutation_type(&self) -> &ObjectType {
        &self.objects[&self.mutation]
    }

    pub(crate) fn root_type_ids(&self) -> (TypeId, TypeId) {
        (self.query_type_id, self.mutation_type_id)
    }

    pub fn object(&self, name: &str) -> Option<&ObjectType> {
        self.objects.get(name)
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectType> {
        self.objects.values()
    }

    pub fn input_object(&self, name: &str) -> Option<&InputObjectType> {
        self.inputs.get(name)
    }

    pub fn input_objects(&self) -> impl Iterator<Item = &InputObjectType> {
        self.inputs.values()
    }

    /// Kind of a named type. Lookup order: scalar, enum, object, input object.
    pub fn kind_of(&self, name: &str) -> Option<TypeKind> {
        if self.registry.is_scalar(name) {
            Some(TypeKind::Scalar)
        } else if self.registry.enum_type(name).is_some() {
            Some(TypeKind::Enum)
        } else if self.objects.contains_key(name) {
            Some(TypeKind::Object)
        } else if self.inputs.contains_key(name) {
            Some(TypeKind::InputObject)
        } else {
            None
        }
    }

    pub fn is_input_type(&self, name: &str) -> bool {
        matches!(
            self.kind_of(name),
            Some(TypeKind::Scalar | TypeKind::Enum | TypeKind::InputObject)
        )
    }
}

pub struct SchemaBuilder {
    reflector: Reflector,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self { reflector: Reflector::new() }
    }

    /// Enums must be registered before any type that mentions them is described.
    pub fn register_enum<E: Enum>(mut self) -> Result<Self, SchemaError> {
        self.reflector.claim_type_name(E::NAME)?;
        self.reflector
            .registry
            .register_enum(E::NAME, E::DESCRIPTION, TypeId::of::<E>(), E::symbols())?;
        Ok(self)
    }

    pub fn build<Q: OutputType, M: OutputType>(self) -> Result<Schema, SchemaError> {
        let mut r = self.reflector;
        let query = root_name::<Q>(Q::describe(&mut r)?)?;
        let mutation = root_name::<M>(M::describe(&mut r)?)?;

        r.allow_reserved = true;
        introspection::install(&mut r, &query)?;

        tracing::debug!(
            query = %query,
            mutation = %mutation,
            objects = r.objects.len(),
            inputs = r.inputs.len(),
            enums = r.registry.enums().count(),
            "schema built"
        );
        Ok(Schema {
            registry: r.registry,
            objects: r.objects,
            inputs: r.inputs,
            query,
            mutation,
            query_type_id: TypeId::of::<Q>(),
            mutation_type_id: TypeId::of::<M>(),
        })
    }
}

fn root_name<T>(desc: ObjDescriptor) -> Result<String, SchemaError> {
    match desc {
        ObjDescriptor::ObjRef(name) => Ok(name),
        _ => Err(SchemaError::RootNotObject(std::any::type_name::<T>().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DataKind;

    fn int() -> ObjDescriptor {
        ObjDescriptor::Data { kind: DataKind::Int, is_id: false }
    }

    #[test]
    fn wrap_rule() {
        assert_eq!(TypeRef::output(&int()).to_string(), "Int!");
        assert_eq!(TypeRef::output(&ObjDescriptor::Ptr(Box::new(int()))).to_string(), "Int");
        let list = ObjDescriptor::Array(Box::new(ObjDescriptor::Ptr(Box::new(int()))));
        assert_eq!(TypeRef::output(&list).to_string(), "[Int]!");
        assert_eq!(
            TypeRef::output(&ObjDescriptor::Ptr(Box::new(ObjDescriptor::Array(Box::new(int()))))).to_string(),
            "[Int!]"
        );
        let function = ObjDescriptor::Method {
            in_fields: Vec::new(),
            out_type: Box::new(ObjDescriptor::ObjRef("__Type".into())),
            is_type_method: false,
        };
        assert_eq!(TypeRef::output(&function).to_string(), "__Type");
        let method = ObjDescriptor::Method {
            in_fields: Vec::new(),
            out_type: Box::new(ObjDescriptor::Data { kind: DataKind::String, is_id: true }),
            is_type_method: true,
        };
        assert_eq!(TypeRef::output(&method).to_string(), "ID!");
    }

    #[test]
    fn input_wrap_rule() {
        let upload = InputDescriptor::Upload;
        assert_eq!(TypeRef::input(&upload).to_string(), "Upload!");
        let list = InputDescriptor::Ptr(Box::new(InputDescriptor::List(Box::new(InputDescriptor::Struct(
            "BookInput".into(),
        )))));
        assert_eq!(TypeRef::input(&list).to_string(), "[BookInput!]");
        assert_eq!(TypeRef::input(&list).named_type(), "BookInput");
    }

    #[test]
    fn scalar_roots_are_rejected() {
        assert!(matches!(Schema::new::<String, String>(), Err(SchemaError::RootNotObject(_))));
    }
}
