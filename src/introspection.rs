//! The `__schema` / `__type` surface, projected on demand from the built schema.
//!
//! Every view is computed from `Ctx::schema` when a field is resolved, so the
//! same schema always answers with the same (sorted) output.
use std::any::TypeId;
use std::collections::BTreeMap;
use std::convert::Infallible;

use serde::Deserialize;
use serde_json::Value as Json;

use crate::error::SchemaError;
use crate::naming;
use crate::reflect::{
    Arguments, Enum, FieldNode, InputDescriptor, InputField, ObjDescriptor,
    OutputType, Reflector, Resolved,
};
use crate::schema::{Schema, TypeKind, TypeRef};
use crate::value::ConstValue;

/// The query most GraphQL tooling sends to discover a schema.
pub const INTROSPECTION_QUERY: &str = r#"
query IntrospectionQuery {
  __schema {
    queryType { name }
    mutationType { name }
    subscriptionType { name }
    types { ...FullType }
    directives { name description locations args { ...InputValue } }
  }
}

fragment FullType on __Type {
  kind
  name
  description
  fields(includeDeprecated: true) {
    name
    description
    args { ...InputValue }
    type { ...TypeRef }
    isDeprecated
    deprecationReason
  }
  inputFields { ...InputValue }
  interfaces { ...TypeRef }
  enumValues(includeDeprecated: true) { name description isDeprecated deprecationReason }
  possibleTypes { ...TypeRef }
}

fragment InputValue on __InputValue {
  name
  description
  type { ...TypeRef }
  defaultValue
}

fragment TypeRef on __Type {
  kind
  name
  ofType { kind name ofType { kind name ofType { kind name ofType { kind name } } } }
}
"#;

impl Enum for TypeKind {
    const NAME: &'static str = "__TypeKind";
    const DESCRIPTION: Option<&'static str> = Some("An enum describing what kind of type a given `__Type` is.");

    fn symbols() -> &'static [&'static str] {
        &["SCALAR", "OBJECT", "ENUM", "INPUT_OBJECT", "LIST", "NON_NULL"]
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::Scalar => "SCALAR",
            Self::Object => "OBJECT",
            Self::Enum => "ENUM",
            Self::InputObject => "INPUT_OBJECT",
            Self::List => "LIST",
            Self::NonNull => "NON_NULL",
        }
    }
}

impl OutputType for TypeKind {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        r.enum_type::<Self>()
    }

    fn resolve(&self) -> Resolved<'_> {
        Resolved::Enum(self.symbol())
    }

    fn resolve_owned<'a>(self) -> Resolved<'a> {
        Resolved::Enum(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveLocation {
    Query,
    Mutation,
    Field,
    FragmentDefinition,
    FragmentSpread,
    InlineFragment,
}

impl Enum for DirectiveLocation {
    const NAME: &'static str = "__DirectiveLocation";

    fn symbols() -> &'static [&'static str] {
        &["QUERY", "MUTATION", "FIELD", "FRAGMENT_DEFINITION", "FRAGMENT_SPREAD", "INLINE_FRAGMENT"]
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::Query => "QUERY",
            Self::Mutation => "MUTATION",
            Self::Field => "FIELD",
            Self::FragmentDefinition => "FRAGMENT_DEFINITION",
            Self::FragmentSpread => "FRAGMENT_SPREAD",
            Self::InlineFragment => "INLINE_FRAGMENT",
        }
    }
}

impl OutputType for DirectiveLocation {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        r.enum_type::<Self>()
    }

    fn resolve(&self) -> Resolved<'_> {
        Resolved::Enum(self.symbol())
    }

    fn resolve_owned<'a>(self) -> Resolved<'a> {
        Resolved::Enum(self.symbol())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// VIEWS
// ————————————————————————————————————————————————————————————————————————————

pub struct SchemaView;

impl OutputType for SchemaView {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        r.object::<Self, _>("__Schema", |b| {
            b.description(
                "A GraphQL Schema defines the capabilities of a GraphQL server. It exposes all available \
                 types and directives on the server, as well as the entry points for query and mutation operations.",
            );
            b.computed("description", |_| None::<String>)?;
            b.method("types", |_, ctx, ()| Ok::<_, Infallible>(ctx.schema().types()))?;
            b.method("query_type", |_, ctx, ()| {
                Ok::<_, Infallible>(TypeView::named(TypeKind::Object, &ctx.schema().query_type().name))
            })?;
            b.method("mutation_type", |_, ctx, ()| {
                Ok::<_, Infallible>(Some(TypeView::named(TypeKind::Object, &ctx.schema().mutation_type().name)))
            })?;
            b.computed("subscription_type", |_| None::<TypeView>)?;
            b.computed("directives", |_| Vec::<DirectiveView>::new())?;
            Ok(())
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeView {
    kind: TypeKind,
    name: Option<String>,
    of_type: Option<Box<TypeView>>,
}

#[derive(Deserialize)]
struct DeprecatedArgs {
    #[serde(default)]
    #[allow(dead_code)]
    include_deprecated: Option<bool>,
}

impl Arguments for DeprecatedArgs {
    fn describe(r: &mut Reflector) -> Result<Vec<InputField>, SchemaError> {
        r.arguments("DeprecatedArgs", |b| {
            b.field_with_default::<Option<bool>>("include_deprecated", Some(false))?;
            Ok(())
        })
    }
}

impl OutputType for TypeView {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        r.object::<Self, _>("__Type", |b| {
            b.field("kind", |t| &t.kind)?;
            b.field("name", |t| &t.name)?;
            b.method("description", |t, ctx, ()| Ok::<_, Infallible>(t.description(ctx.schema())))?;
            b.method("fields", |t, ctx, _: DeprecatedArgs| Ok::<_, Infallible>(t.fields(ctx.schema())))?;
            b.computed("interfaces", |t| (t.kind == TypeKind::Object).then(Vec::<TypeView>::new))?;
            b.computed("possible_types", |_| None::<Vec<TypeView>>)?;
            b.method("enum_values", |t, ctx, _: DeprecatedArgs| {
                Ok::<_, Infallible>(t.enum_values(ctx.schema()))
            })?;
            b.method("input_fields", |t, ctx, ()| Ok::<_, Infallible>(t.input_fields(ctx.schema())))?;
            b.field("of_type", |t| &t.of_type)?;
            Ok(())
        })
    }
}

impl TypeView {
    pub fn named(kind: TypeKind, name: &str) -> Self {
        Self { kind, name: Some(name.to_string()), of_type: None }
    }

    pub fn from_ref(ty: &TypeRef) -> Self {
        match ty {
            TypeRef::Named { kind, name } => Self::named(*kind, name),
            TypeRef::List(inner) => Self { kind: TypeKind::List, name: None, of_type: Some(Box::new(Self::from_ref(inner))) },
            TypeRef::NonNull(inner) => {
                Self { kind: TypeKind::NonNull, name: None, of_type: Some(Box::new(Self::from_ref(inner))) }
            }
        }
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn description(&self, schema: &Schema) -> Option<String> {
        let name = self.name.as_deref()?;
        match self.kind {
            TypeKind::Scalar => schema.registry.scalar(name).map(|s| s.description.to_string()),
            TypeKind::Enum => schema.registry.enum_type(name)?.description.clone(),
            TypeKind::Object => schema.object(name)?.description.clone(),
            TypeKind::InputObject => schema.input_object(name)?.description.clone(),
            TypeKind::List | TypeKind::NonNull => None,
        }
    }

    fn fields(&self, schema: &Schema) -> Option<Vec<FieldView>> {
        if self.kind != TypeKind::Object {
            return None;
        }
        let object = schema.object(self.name.as_deref()?)?;
        Some(
            object
                .fields
                .iter()
                .filter(|f| !naming::is_reserved(&f.name))
                .map(|f| FieldView::new(schema, f))
                .collect(),
        )
    }

    fn enum_values(&self, schema: &Schema) -> Option<Vec<EnumValueView>> {
        if self.kind != TypeKind::Enum {
            return None;
        }
        let ty = schema.registry.enum_type(self.name.as_deref()?)?;
        Some(ty.values.iter().map(|v| EnumValueView { name: v.clone() }).collect())
    }

    fn input_fields(&self, schema: &Schema) -> Option<Vec<InputValueView>> {
        if self.kind != TypeKind::InputObject {
            return None;
        }
        let ty = schema.input_object(self.name.as_deref()?)?;
        let mut fields: Vec<_> = ty.fields.iter().map(|f| InputValueView::new(schema, f)).collect();
        fields.sort_by(|a, b| a.name.cmp(&b.name));
        Some(fields)
    }
}

pub struct FieldView {
    name: String,
    description: Option<String>,
    args: Vec<InputValueView>,
    ty: TypeView,
}

impl FieldView {
    fn new(schema: &Schema, node: &FieldNode) -> Self {
        let mut args: Vec<_> = node.arguments().iter().map(|a| InputValueView::new(schema, a)).collect();
        args.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            name: node.name.clone(),
            description: node.description.clone(),
            args,
            ty: TypeView::from_ref(&TypeRef::output(&node.shape)),
        }
    }
}

impl OutputType for FieldView {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        r.object::<Self, _>("__Field", |b| {
            b.field("name", |f| &f.name)?;
            b.field("description", |f| &f.description)?;
            b.field("args", |f| &f.args)?;
            b.field("r#type", |f| &f.ty)?;
            b.computed("is_deprecated", |_| false)?;
            b.computed("deprecation_reason", |_| None::<String>)?;
            Ok(())
        })
    }
}

pub struct InputValueView {
    name: String,
    description: Option<String>,
    ty: TypeView,
    default_value: Option<String>,
}

impl InputValueView {
    fn new(schema: &Schema, field: &InputField) -> Self {
        Self {
            name: field.name.clone(),
            description: field.description.clone(),
            ty: TypeView::from_ref(&TypeRef::input(&field.ty)),
            default_value: field
                .default
                .as_ref()
                .map(|d| default_literal(schema, &field.ty, d).to_string()),
        }
    }
}

impl OutputType for InputValueView {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        r.object::<Self, _>("__InputValue", |b| {
            b.field("name", |v| &v.name)?;
            b.field("description", |v| &v.description)?;
            b.field("r#type", |v| &v.ty)?;
            b.field("default_value", |v| &v.default_value)?;
            b.computed("is_deprecated", |_| false)?;
            b.computed("deprecation_reason", |_| None::<String>)?;
            Ok(())
        })
    }
}

/// Defaults are stored keyed by Rust identifier; print them with GraphQL names
/// and bare enum symbols.
fn default_literal(schema: &Schema, ty: &InputDescriptor, value: &Json) -> ConstValue {
    match (ty, value) {
        (_, Json::Null) => ConstValue::Null,
        (InputDescriptor::Ptr(inner), _) => default_literal(schema, inner, value),
        (InputDescriptor::Enum(_), Json::String(symbol)) => ConstValue::Enum(symbol.clone()),
        (InputDescriptor::List(elem), Json::Array(items)) => {
            ConstValue::List(items.iter().map(|item| default_literal(schema, elem, item)).collect())
        }
        (InputDescriptor::Struct(name), Json::Object(entries)) => match schema.input_object(name) {
            Some(ty) => ConstValue::Object(
                ty.fields
                    .iter()
                    .filter_map(|f| entries.get(&f.ident).map(|v| (f.name.clone(), default_literal(schema, &f.ty, v))))
                    .collect(),
            ),
            None => ConstValue::from_json(value.clone()),
        },
        _ => ConstValue::from_json(value.clone()),
    }
}

pub struct EnumValueView {
    name: String,
}

impl OutputType for EnumValueView {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        r.object::<Self, _>("__EnumValue", |b| {
            b.field("name", |v| &v.name)?;
            b.computed("description", |_| None::<String>)?;
            b.computed("is_deprecated", |_| false)?;
            b.computed("deprecation_reason", |_| None::<String>)?;
            Ok(())
        })
    }
}

/// Listed by `__Schema.directives`, which is always empty: `@skip` and
/// `@include` are built into the engine.
pub struct DirectiveView {
    name: String,
    description: Option<String>,
    locations: Vec<DirectiveLocation>,
    args: Vec<InputValueView>,
}

impl OutputType for DirectiveView {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        r.object::<Self, _>("__Directive", |b| {
            b.field("name", |d| &d.name)?;
            b.field("description", |d| &d.description)?;
            b.field("locations", |d| &d.locations)?;
            b.field("args", |d| &d.args)?;
            b.computed("is_repeatable", |_| false)?;
            Ok(())
        })
    }
}

// ————————————————————————————————————————————————————————————————————————————
// LOOKUP
// ————————————————————————————————————————————————————————————————————————————

impl Schema {
    /// `__type(name:)`.
    pub fn type_view(&self, name: &str) -> Option<TypeView> {
        self.lookup_type(name, true, true)
    }

    /// Scalars, then enums, then objects (when `outputs`), then input objects (when `inputs`).
    pub fn lookup_type(&self, name: &str, outputs: bool, inputs: bool) -> Option<TypeView> {
        if self.registry.is_scalar(name) {
            return Some(TypeView::named(TypeKind::Scalar, name));
        }
        if self.registry.enum_type(name).is_some() {
            return Some(TypeView::named(TypeKind::Enum, name));
        }
        if outputs && self.objects.contains_key(name) {
            return Some(TypeView::named(TypeKind::Object, name));
        }
        if inputs && self.inputs.contains_key(name) {
            return Some(TypeView::named(TypeKind::InputObject, name));
        }
        None
    }

    /// Every named type, sorted by name.
    pub fn types(&self) -> Vec<TypeView> {
        let mut all = BTreeMap::new();
        for scalar in self.registry.scalars() {
            all.insert(scalar.name.to_string(), TypeKind::Scalar);
        }
        for ty in self.registry.enums() {
            all.insert(ty.name.clone(), TypeKind::Enum);
        }
        for name in self.objects.keys() {
            all.insert(name.clone(), TypeKind::Object);
        }
        for name in self.inputs.keys() {
            all.insert(name.clone(), TypeKind::InputObject);
        }
        all.into_iter().map(|(name, kind)| TypeView::named(kind, &name)).collect()
    }
}

#[derive(Deserialize)]
struct TypeArgs {
    name: String,
}

impl Arguments for TypeArgs {
    fn describe(r: &mut Reflector) -> Result<Vec<InputField>, SchemaError> {
        r.arguments("TypeArgs", |b| {
            b.field::<String>("name")?;
            Ok(())
        })
    }
}

/// Registers the introspection types and adds `__schema` and `__type` to the query root.
pub(crate) fn install(r: &mut Reflector, query_root: &str) -> Result<(), SchemaError> {
    r.registry
        .register_enum(TypeKind::NAME, TypeKind::DESCRIPTION, TypeId::of::<TypeKind>(), TypeKind::symbols())?;
    r.registry.register_enum(
        DirectiveLocation::NAME,
        DirectiveLocation::DESCRIPTION,
        TypeId::of::<DirectiveLocation>(),
        DirectiveLocation::symbols(),
    )?;

    let mut schema_field = FieldNode::function(r, "__schema", |_, ()| Ok::<_, Infallible>(SchemaView))?;
    if let ObjDescriptor::Method { is_type_method, .. } = &mut schema_field.shape {
        *is_type_method = true;
    }
    let type_field = FieldNode::function(r, "__type", |ctx, args: TypeArgs| {
        Ok::<_, Infallible>(ctx.schema().type_view(&args.name))
    })?;

    let root = r
        .objects
        .get_mut(query_root)
        .ok_or_else(|| SchemaError::RootNotObject(query_root.to_string()))?;
    root.insert_field(schema_field)?;
    root.insert_field(type_field)?;
    Ok(())
}
