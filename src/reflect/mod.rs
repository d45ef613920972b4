//! Host type reflection.
//!
//! Host types describe themselves once, during schema construction, into
//! [`ObjDescriptor`]s and [`InputDescriptor`]s. Object and input object types are
//! memoized by [`TypeId`]: the name is claimed before the builder runs, so a type
//! that (transitively) contains itself describes to `ObjRef(name)` instead of
//! recursing.
pub mod impls;
pub mod input;
pub mod object;

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::SchemaError;
use crate::naming;
use crate::registry::{DataKind, Registry};
use crate::value::ConstValue;

pub use impls::{Id, IdRepr, Upload, UploadedFile};
pub use input::{InputFieldsBuilder, InputObjectType};
pub use object::{FieldNode, ObjectBuilder, ObjectType};

// ————————————————————————————————————————————————————————————————————————————
// DESCRIPTORS
// ————————————————————————————————————————————————————————————————————————————

/// Reflected output shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjDescriptor {
    /// `Vec<T>`, `[T; N]`: a list.
    Array(Box<ObjDescriptor>),
    /// An object type registered under this name.
    ObjRef(String),
    Data { kind: DataKind, is_id: bool },
    Enum(String),
    /// `Option<T>`: drops the non-null wrapper.
    Ptr(Box<ObjDescriptor>),
    /// A resolver. Functions that are not type methods always yield a nullable result.
    Method {
        in_fields: Vec<InputField>,
        out_type: Box<ObjDescriptor>,
        is_type_method: bool,
    },
}

impl ObjDescriptor {
    pub fn is_nullable(&self) -> bool {
        match self {
            Self::Ptr(_) => true,
            Self::Method { is_type_method: false, .. } => true,
            Self::Method { out_type, .. } => out_type.is_nullable(),
            _ => false,
        }
    }

    /// The named type at the bottom of the wrappers.
    pub fn named(&self) -> &ObjDescriptor {
        match self {
            Self::Array(inner) | Self::Ptr(inner) => inner.named(),
            Self::Method { out_type, .. } => out_type.named(),
            other => other,
        }
    }
}

/// Reflected input shape.
#[derive(Debug, Clone, PartialEq)]
pub enum InputDescriptor {
    /// An input object registered under this name.
    Struct(String),
    List(Box<InputDescriptor>),
    Ptr(Box<InputDescriptor>),
    Data { kind: DataKind, is_id: bool },
    Enum(String),
    Upload,
}

impl InputDescriptor {
    pub fn is_nullable(&self) -> bool {
        matches!(self, Self::Ptr(_))
    }
}

/// An argument or an input object field.
#[derive(Debug, Clone, PartialEq)]
pub struct InputField {
    /// GraphQL name.
    pub name: String,
    /// Rust identifier, the key the value is deserialized from.
    pub ident: String,
    pub description: Option<String>,
    pub ty: InputDescriptor,
    /// Already in deserializable form.
    pub default: Option<serde_json::Value>,
}

impl InputField {
    /// Non-null and without a default.
    pub fn is_required(&self) -> bool {
        !self.ty.is_nullable() && self.default.is_none()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// HOST TRAITS
// ————————————————————————————————————————————————————————————————————————————

/// A live object handed to the engine, borrowed from its parent or produced by a resolver.
pub enum ObjectValue<'a> {
    Borrowed(&'a (dyn Any + Send + Sync)),
    Owned(Box<dyn Any + Send + Sync>),
}

impl ObjectValue<'_> {
    pub fn as_any(&self) -> &(dyn Any + Send + Sync) {
        match self {
            Self::Borrowed(value) => *value,
            Self::Owned(value) => &**value,
        }
    }
}

/// A resolved value, before it is completed against its declared type.
pub enum Resolved<'a> {
    Null,
    Leaf(ConstValue),
    Enum(&'static str),
    List(Vec<Resolved<'a>>),
    Object(ObjectValue<'a>),
    /// A value behind an `Arc` that other owners still hold.
    Shared(SharedValue),
}

/// Keeps the `Arc` alive while its subtree is completed; whatever sits
/// inside is resolved by borrowing from it.
pub struct SharedValue {
    owner: Arc<dyn Any + Send + Sync>,
    project: for<'x> fn(&'x (dyn Any + Send + Sync)) -> Resolved<'x>,
}

impl SharedValue {
    pub fn new<T: OutputType>(owner: Arc<T>) -> Self {
        let owner: Arc<dyn Any + Send + Sync> = owner;
        Self { owner, project: project::<T> }
    }

    pub fn resolve(&self) -> Resolved<'_> {
        (self.project)(&*self.owner)
    }
}

fn project<T: OutputType>(value: &(dyn Any + Send + Sync)) -> Resolved<'_> {
    value.downcast_ref::<T>().map_or(Resolved::Null, T::resolve)
}

/// A host type that can appear as a field result.
///
/// The default `resolve` methods treat `Self` as an object; scalars, enums and
/// wrappers override them.
pub trait OutputType: Send + Sync + 'static {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError>;

    fn resolve(&self) -> Resolved<'_>
    where
        Self: Sized,
    {
        Resolved::Object(ObjectValue::Borrowed(self))
    }

    fn resolve_owned<'a>(self) -> Resolved<'a>
    where
        Self: Sized,
    {
        Resolved::Object(ObjectValue::Owned(Box::new(self)))
    }
}

/// A host type that can be read from an argument.
pub trait InputType: serde::de::DeserializeOwned + 'static {
    fn describe(r: &mut Reflector) -> Result<InputDescriptor, SchemaError>;
}

/// The argument struct of a resolver method, flattened into the field's arguments.
pub trait Arguments: serde::de::DeserializeOwned + 'static {
    fn describe(r: &mut Reflector) -> Result<Vec<InputField>, SchemaError>;

    fn from_arguments(value: serde_json::Value) -> Result<Self, String> {
        crate::path_de::from_value_with_path(value)
    }
}

impl Arguments for () {
    fn describe(_: &mut Reflector) -> Result<Vec<InputField>, SchemaError> {
        Ok(Vec::new())
    }

    fn from_arguments(_: serde_json::Value) -> Result<Self, String> {
        Ok(())
    }
}

/// A host enum: a closed set of symbols. Register it with
/// [`SchemaBuilder::register_enum`](crate::schema::SchemaBuilder::register_enum).
pub trait Enum: Send + Sync + 'static {
    const NAME: &'static str;
    const DESCRIPTION: Option<&'static str> = None;

    fn symbols() -> &'static [&'static str];
    fn symbol(&self) -> &'static str;
}

// ————————————————————————————————————————————————————————————————————————————
// REFLECTOR
// ————————————————————————————————————————————————————————————————————————————

/// Collects the type graph. Only reachable during schema construction.
pub struct Reflector {
    pub(crate) registry: Registry,
    pub(crate) objects: BTreeMap<String, ObjectType>,
    pub(crate) inputs: BTreeMap<String, InputObjectType>,
    object_ids: HashMap<TypeId, String>,
    input_ids: HashMap<TypeId, String>,
    pub(crate) allow_reserved: bool,
}

impl Reflector {
    pub(crate) fn new() -> Self {
        Self {
            registry: Registry::new(),
            objects: BTreeMap::new(),
            inputs: BTreeMap::new(),
            object_ids: HashMap::new(),
            input_ids: HashMap::new(),
            allow_reserved: false,
        }
    }

    pub fn describe<T: OutputType>(&mut self) -> Result<ObjDescriptor, SchemaError> {
        T::describe(self)
    }

    pub fn describe_input<T: InputType>(&mut self) -> Result<InputDescriptor, SchemaError> {
        T::describe(self)
    }

    /// Registers `T` as the object type `name`, or returns the existing
    /// registration when `T` was seen before.
    pub fn object<T, F>(&mut self, name: &str, build: F) -> Result<ObjDescriptor, SchemaError>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&mut ObjectBuilder<'_, T>) -> Result<(), SchemaError>,
    {
        let type_id = TypeId::of::<T>();
        if let Some(existing) = self.object_ids.get(&type_id) {
            return Ok(ObjDescriptor::ObjRef(existing.clone()));
        }
        self.claim_type_name(name)?;
        self.object_ids.insert(type_id, name.to_string());
        self.objects.insert(name.to_string(), ObjectType::placeholder(name, type_id));

        let mut builder = ObjectBuilder::new(self, name);
        build(&mut builder)?;
        let (description, fields) = builder.finish()?;
        tracing::debug!(name, fields = fields.len(), "registered object type");

        if let Some(slot) = self.objects.get_mut(name) {
            slot.description = description;
            slot.fields = fields;
        }
        Ok(ObjDescriptor::ObjRef(name.to_string()))
    }

    /// Registers `T` as the input object type `name`, memoized like [`Reflector::object`].
    pub fn input_object<T, F>(&mut self, name: &str, build: F) -> Result<InputDescriptor, SchemaError>
    where
        T: 'static,
        F: FnOnce(&mut InputFieldsBuilder<'_>) -> Result<(), SchemaError>,
    {
        let type_id = TypeId::of::<T>();
        if let Some(existing) = self.input_ids.get(&type_id) {
            return Ok(InputDescriptor::Struct(existing.clone()));
        }
        self.claim_type_name(name)?;
        self.input_ids.insert(type_id, name.to_string());
        self.inputs.insert(name.to_string(), InputObjectType::placeholder(name, type_id));

        let mut builder = InputFieldsBuilder::new(self, name);
        build(&mut builder)?;
        let (description, fields) = builder.finish()?;
        tracing::debug!(name, fields = fields.len(), "registered input type");

        if let Some(slot) = self.inputs.get_mut(name) {
            slot.description = description;
            slot.fields = fields;
        }
        Ok(InputDescriptor::Struct(name.to_string()))
    }

    /// Argument list of a method. `owner` only names the struct in errors.
    pub fn arguments<F>(&mut self, owner: &str, build: F) -> Result<Vec<InputField>, SchemaError>
    where
        F: FnOnce(&mut InputFieldsBuilder<'_>) -> Result<(), SchemaError>,
    {
        let mut builder = InputFieldsBuilder::new(self, owner);
        build(&mut builder)?;
        Ok(builder.finish()?.1)
    }

    pub fn enum_type<E: Enum>(&mut self) -> Result<ObjDescriptor, SchemaError> {
        self.enum_name::<E>().map(ObjDescriptor::Enum)
    }

    pub fn input_enum<E: Enum>(&mut self) -> Result<InputDescriptor, SchemaError> {
        self.enum_name::<E>().map(InputDescriptor::Enum)
    }

    fn enum_name<E: Enum>(&self) -> Result<String, SchemaError> {
        self.registry
            .enum_by_type(TypeId::of::<E>())
            .map(|e| e.name.clone())
            .ok_or_else(|| SchemaError::UnregisteredEnum(E::NAME.to_string()))
    }

    pub(crate) fn enable_upload(&mut self) {
        self.registry.enable_upload();
    }

    pub(crate) fn check_name(&self, name: &str) -> Result<(), SchemaError> {
        if !naming::is_valid_name(name) {
            return Err(SchemaError::InvalidName(name.to_string()));
        }
        if naming::is_reserved(name) && !self.allow_reserved {
            return Err(SchemaError::ReservedName(name.to_string()));
        }
        Ok(())
    }

    /// Type names share one namespace across objects, inputs, enums and scalars.
    pub(crate) fn claim_type_name(&self, name: &str) -> Result<(), SchemaError> {
        self.check_name(name)?;
        let taken = self.objects.contains_key(name)
            || self.inputs.contains_key(name)
            || self.registry.enum_type(name).is_some()
            || self.registry.is_scalar(name)
            || name == crate::registry::UPLOAD_SCALAR;
        if taken {
            return Err(SchemaError::DuplicateTypeName(name.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;

    struct Node {
        label: String,
        children: Vec<Node>,
        parent: Option<Box<Node>>,
    }

    impl OutputType for Node {
        fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
            r.object::<Self, _>("Node", |b| {
                b.field("label", |n| &n.label)?;
                b.field("children", |n| &n.children)?;
                b.field("parent", |n| &n.parent)?;
                Ok(())
            })
        }
    }

    #[test]
    fn self_reference_becomes_obj_ref() {
        let mut r = Reflector::new();
        let root = r.describe::<Node>().unwrap();
        assert_eq!(root, ObjDescriptor::ObjRef("Node".into()));

        let node = &r.objects["Node"];
        let names: Vec<_> = node.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["children", "label", "parent"]);
        assert_eq!(
            node.field("children").unwrap().shape,
            ObjDescriptor::Array(Box::new(ObjDescriptor::ObjRef("Node".into())))
        );
        assert_eq!(
            node.field("parent").unwrap().shape,
            ObjDescriptor::Ptr(Box::new(ObjDescriptor::ObjRef("Node".into())))
        );
        assert_eq!(r.objects.len(), 1);
    }

    struct Clash;

    impl OutputType for Clash {
        fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
            r.object::<Self, _>("Node", |_| Ok(()))
        }
    }

    #[test]
    fn distinct_types_cannot_share_a_name() {
        let mut r = Reflector::new();
        r.describe::<Node>().unwrap();
        assert_eq!(r.describe::<Clash>(), Err(SchemaError::DuplicateTypeName("Node".into())));
    }

    struct Twice;

    impl OutputType for Twice {
        fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
            r.object::<Self, _>("Twice", |b| {
                b.method("value", |_, _, ()| Ok::<_, FieldError>(1))?;
                b.method("value", |_, _, ()| Ok::<_, FieldError>(2))?;
                Ok(())
            })
        }
    }

    #[test]
    fn duplicate_fields_are_rejected() {
        let mut r = Reflector::new();
        assert!(matches!(r.describe::<Twice>(), Err(SchemaError::DuplicateField { .. })));
    }

    #[test]
    fn unregistered_enum_is_a_schema_error() {
        struct Mood;
        impl Enum for Mood {
            const NAME: &'static str = "Mood";
            fn symbols() -> &'static [&'static str] {
                &["HAPPY"]
            }
            fn symbol(&self) -> &'static str {
                "HAPPY"
            }
        }
        let mut r = Reflector::new();
        assert_eq!(r.enum_type::<Mood>(), Err(SchemaError::UnregisteredEnum("Mood".into())));
    }

    #[test]
    fn reserved_and_invalid_type_names() {
        let r = Reflector::new();
        assert_eq!(r.claim_type_name("__Mine"), Err(SchemaError::ReservedName("__Mine".into())));
        assert_eq!(r.claim_type_name("9lives"), Err(SchemaError::InvalidName("9lives".into())));
        assert_eq!(r.claim_type_name("String"), Err(SchemaError::DuplicateTypeName("String".into())));
    }
}
