//! Object types and the builder host types use to declare their fields.
use std::any::{Any, TypeId};
use std::fmt::{self, Display};
use std::marker::PhantomData;

use serde_json::Value as Json;

use super::{Arguments, ObjDescriptor, OutputType, Reflector, Resolved};
use crate::error::{FieldError, SchemaError, into_field_error};
use crate::naming;
use crate::reflect::InputField;
use crate::resolve::Ctx;

pub(crate) type ResolverFn = dyn for<'v> Fn(&'v (dyn Any + Send + Sync), &Ctx<'_>, Json) -> Result<Resolved<'v>, FieldError>
    + Send
    + Sync;

fn resolver<F>(f: F) -> Box<ResolverFn>
where
    F: for<'v> Fn(&'v (dyn Any + Send + Sync), &Ctx<'_>, Json) -> Result<Resolved<'v>, FieldError>
        + Send
        + Sync
        + 'static,
{
    Box::new(f)
}

fn downcast<'v, T: 'static>(value: &'v (dyn Any + Send + Sync), type_name: &str) -> Result<&'v T, FieldError> {
    value
        .downcast_ref::<T>()
        .ok_or_else(|| FieldError::new(format!("internal: parent value is not a `{type_name}`")))
}

pub struct FieldNode {
    pub name: String,
    pub description: Option<String>,
    pub shape: ObjDescriptor,
    resolver: Box<ResolverFn>,
}

impl FieldNode {
    pub fn arguments(&self) -> &[InputField] {
        match &self.shape {
            ObjDescriptor::Method { in_fields, .. } => in_fields,
            _ => &[],
        }
    }

    pub fn is_nullable(&self) -> bool {
        self.shape.is_nullable()
    }

    pub(crate) fn invoke<'v>(
        &self,
        parent: &'v (dyn Any + Send + Sync),
        ctx: &Ctx<'_>,
        arguments: Json,
    ) -> Result<Resolved<'v>, FieldError> {
        (self.resolver)(parent, ctx, arguments)
    }

    /// A field that ignores its parent value. Always nullable.
    pub(crate) fn function<A, R, E, F>(r: &mut Reflector, name: &str, f: F) -> Result<Self, SchemaError>
    where
        A: Arguments,
        R: OutputType,
        E: Display + 'static,
        F: Fn(&Ctx<'_>, A) -> Result<R, E> + Send + Sync + 'static,
    {
        let shape = ObjDescriptor::Method {
            in_fields: A::describe(r)?,
            out_type: Box::new(R::describe(r)?),
            is_type_method: false,
        };
        let resolver = resolver(move |_, ctx, arguments| {
            let arguments = A::from_arguments(arguments).map_err(FieldError::new)?;
            f(ctx, arguments).map(R::resolve_owned).map_err(into_field_error)
        });
        Ok(Self { name: name.to_string(), description: None, shape, resolver })
    }
}

impl fmt::Debug for FieldNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldNode")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ObjectType {
    pub name: String,
    pub description: Option<String>,
    pub type_id: TypeId,
    /// Sorted by name.
    pub fields: Vec<FieldNode>,
}

impl ObjectType {
    pub(crate) fn placeholder(name: &str, type_id: TypeId) -> Self {
        Self { name: name.to_string(), description: None, type_id, fields: Vec::new() }
    }

    pub fn field(&self, name: &str) -> Option<&FieldNode> {
        self.fields
            .binary_search_by(|f| f.name.as_str().cmp(name))
            .ok()
            .map(|index| &self.fields[index])
    }

    pub(crate) fn insert_field(&mut self, node: FieldNode) -> Result<(), SchemaError> {
        match self.fields.binary_search_by(|f| f.name.cmp(&node.name)) {
            Ok(_) => Err(SchemaError::DuplicateField { type_name: self.name.clone(), field: node.name }),
            Err(index) => {
                self.fields.insert(index, node);
                Ok(())
            }
        }
    }
}

/// Declares the fields of the object type backing `T`.
///
/// ```ignore
/// r.object::<Book, _>("Book", |b| {
///     b.description("A book on the shelf.");
///     b.field("title", |book| &book.title)?;
///     b.method("shout", |book, _, ()| Ok::<_, FieldError>(book.title.to_uppercase()))?;
///     Ok(())
/// })
/// ```
pub struct ObjectBuilder<'r, T> {
    reflector: &'r mut Reflector,
    type_name: String,
    description: Option<String>,
    fields: Vec<FieldNode>,
    _marker: PhantomData<fn(&T)>,
}

impl<'r, T: Send + Sync + 'static> ObjectBuilder<'r, T> {
    pub(crate) fn new(reflector: &'r mut Reflector, type_name: &str) -> Self {
        Self {
            reflector,
            type_name: type_name.to_string(),
            description: None,
            fields: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn description(&mut self, text: impl Into<String>) -> &mut Self {
        self.description = Some(text.into());
        self
    }

    /// Describes the most recently declared field.
    pub fn doc(&mut self, text: impl Into<String>) -> &mut Self {
        if let Some(last) = self.fields.last_mut() {
            last.description = Some(text.into());
        }
        self
    }

    /// A plain data field, read by borrowing from the parent.
    pub fn field<R: OutputType>(&mut self, ident: &str, get: fn(&T) -> &R) -> Result<&mut Self, SchemaError> {
        let shape = R::describe(self.reflector)?;
        let type_name = self.type_name.clone();
        let resolver = resolver(move |value, _, _| Ok(get(downcast::<T>(value, &type_name)?).resolve()));
        self.push(ident, shape, resolver)
    }

    /// A derived field without arguments.
    pub fn computed<R, F>(&mut self, ident: &str, f: F) -> Result<&mut Self, SchemaError>
    where
        R: OutputType,
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        let shape = ObjDescriptor::Method {
            in_fields: Vec::new(),
            out_type: Box::new(R::describe(self.reflector)?),
            is_type_method: true,
        };
        let type_name = self.type_name.clone();
        let resolver = resolver(move |value, _, _| Ok(f(downcast::<T>(value, &type_name)?).resolve_owned()));
        self.push(ident, shape, resolver)
    }

    /// A resolver method. Its nullability is that of `R`; an `Err` nulls the
    /// field and propagates like any other null.
    pub fn method<A, R, E, F>(&mut self, ident: &str, f: F) -> Result<&mut Self, SchemaError>
    where
        A: Arguments,
        R: OutputType,
        E: Display + 'static,
        F: Fn(&T, &Ctx<'_>, A) -> Result<R, E> + Send + Sync + 'static,
    {
        let shape = ObjDescriptor::Method {
            in_fields: A::describe(self.reflector)?,
            out_type: Box::new(R::describe(self.reflector)?),
            is_type_method: true,
        };
        let type_name = self.type_name.clone();
        let resolver = resolver(move |value, ctx, arguments| {
            let this = downcast::<T>(value, &type_name)?;
            let arguments = A::from_arguments(arguments).map_err(FieldError::new)?;
            f(this, ctx, arguments).map(R::resolve_owned).map_err(into_field_error)
        });
        self.push(ident, shape, resolver)
    }

    /// A resolver that does not read the parent. Always nullable.
    pub fn function<A, R, E, F>(&mut self, ident: &str, f: F) -> Result<&mut Self, SchemaError>
    where
        A: Arguments,
        R: OutputType,
        E: Display + 'static,
        F: Fn(&Ctx<'_>, A) -> Result<R, E> + Send + Sync + 'static,
    {
        let name = self.field_name(ident)?;
        let node = FieldNode::function(self.reflector, &name, f)?;
        self.fields.push(node);
        Ok(self)
    }

    fn field_name(&self, ident: &str) -> Result<String, SchemaError> {
        let name = naming::field_name(ident);
        self.reflector.check_name(&name)?;
        Ok(name)
    }

    fn push(&mut self, ident: &str, shape: ObjDescriptor, resolver: Box<ResolverFn>) -> Result<&mut Self, SchemaError> {
        let name = self.field_name(ident)?;
        self.fields.push(FieldNode { name, description: None, shape, resolver });
        Ok(self)
    }

    pub(crate) fn finish(self) -> Result<(Option<String>, Vec<FieldNode>), SchemaError> {
        let mut fields = self.fields;
        fields.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(pair) = fields.windows(2).find(|pair| pair[0].name == pair[1].name) {
            return Err(SchemaError::DuplicateField {
                type_name: self.type_name,
                field: pair[0].name.clone(),
            });
        }
        Ok((self.description, fields))
    }
}
