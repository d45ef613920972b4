//! Execution of a validated operation against the host root values.
//!
//! Completion returns `Err(Bubble)` when a null lands in a non-null position.
//! The first nullable ancestor turns it back into `null`, so each failure is
//! recorded once no matter how far it propagates. Top-level fields stop the
//! propagation: `data` itself is never nulled out.
mod coerce;
mod ctx;
mod timing;

pub(crate) use coerce::Coercion;
pub use ctx::Ctx;

use std::any::{Any, TypeId};
use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::{Map, Value as Json};

use crate::error::{FieldError, PathSegment, Pos, RequestError, ValidationError};
use crate::parser::{self, ast::*};
use crate::reflect::{FieldNode, ObjDescriptor, ObjectType, Resolved};
use crate::request::Request;
use crate::response::Response;
use crate::schema::{Schema, TypeRef};
use crate::validation;
use crate::value::{ConstValue, Variables};
use timing::{ResolverTiming, Timing};

type AnyValue = dyn Any + Send + Sync;

/// Fields sharing one response key, merged.
type FieldGroup<'d> = Vec<(&'d Field, Pos)>;

struct Bubble;

struct Site<'s> {
    parent: &'s str,
    field: &'s str,
    pos: Pos,
}

impl Schema {
    /// Runs one request: parse, validate, resolve. Always produces an envelope.
    ///
    /// `query_root` and `mutation_root` must be values of the root types the
    /// schema was built from.
    pub fn execute<Q, M>(&self, query_root: &Q, mutation_root: &M, request: Request<'_>) -> Response
    where
        Q: Any + Send + Sync,
        M: Any + Send + Sync,
    {
        let (query_id, mutation_id) = self.root_type_ids();
        for (root, expected, actual) in [
            ("query", query_id, TypeId::of::<Q>()),
            ("mutation", mutation_id, TypeId::of::<M>()),
        ] {
            if expected != actual {
                tracing::warn!(root, "rejected request: root value type mismatch");
                return Response::from_request_error(&RequestError::RootMismatch(root));
            }
        }

        let Request { query, operation_name, variables, form, options, form_values } = request;
        let mut timing = options.tracing.then(Timing::start);

        let started = timing.as_ref().map(Timing::offset);
        let document = match parser::parse_query_with_depth(&query, options.max_depth) {
            Ok(document) => document,
            Err(err) => {
                tracing::debug!(error = %err, "syntax error");
                return Response::from_syntax_error(err);
            }
        };
        if let (Some(timing), Some(started)) = (timing.as_mut(), started) {
            timing.parsed(started);
        }

        let started = timing.as_ref().map(Timing::offset);
        if let Err(errors) = validation::validate(self, &document, operation_name.as_deref(), &variables) {
            tracing::debug!(errors = errors.len(), "validation failed");
            return Response::from_validation_errors(errors);
        }
        let operation = match document.operation(operation_name.as_deref()) {
            Ok(operation) => operation,
            Err(message) => {
                return Response::from_validation_errors(vec![ValidationError { message, locations: Vec::new() }]);
            }
        };
        if let (Some(timing), Some(started)) = (timing.as_mut(), started) {
            timing.validated(started);
        }

        let variables = effective_variables(operation, &variables);
        let (root, root_value): (&ObjectType, &AnyValue) = match operation.kind {
            OperationKind::Mutation => (self.mutation_type(), mutation_root),
            OperationKind::Query | OperationKind::Subscription => (self.query_type(), query_root),
        };
        tracing::debug!(
            kind = %operation.kind,
            name = operation.name.as_ref().map(|n| n.node.as_str()),
            "executing operation"
        );

        let ctx = Ctx::new(self, form, form_values, &options, timing);
        let data = Executor { schema: self, document: &document, variables: &variables, ctx: &ctx }.root(
            root,
            root_value,
            &operation.selection_set,
        );
        let (errors, timing) = ctx.finish();
        tracing::debug!(errors = errors.len(), "operation finished");

        let extensions = timing.map(|timing| {
            let mut extensions = Map::new();
            extensions.insert("tracing".to_string(), timing.into_extension());
            extensions
        });
        Response { data, errors, extensions }
    }
}

/// Provided values win over defaults; undeclared variables are dropped.
fn effective_variables(operation: &OperationDefinition, provided: &Variables) -> Variables {
    operation
        .variables
        .iter()
        .filter_map(|definition| {
            let name = &definition.name.node;
            provided
                .get(name)
                .cloned()
                .or_else(|| definition.default_value.as_ref().map(|d| d.node.clone()))
                .map(|value| (name.clone(), value))
        })
        .collect()
}

struct Executor<'e> {
    schema: &'e Schema,
    document: &'e Document,
    variables: &'e Variables,
    ctx: &'e Ctx<'e>,
}

impl<'e> Executor<'e> {
    fn root(&self, object: &'e ObjectType, value: &AnyValue, set: &'e SelectionSet) -> Json {
        let mut fields = IndexMap::new();
        self.collect(object, set, &mut fields, &mut HashSet::new());
        let mut data = Map::new();
        for (key, group) in fields {
            let value = self.field(object, value, key, &group).unwrap_or(Json::Null);
            data.insert(key.to_string(), value);
        }
        Json::Object(data)
    }

    fn object(&self, object: &'e ObjectType, value: &AnyValue, group: &[(&'e Field, Pos)]) -> Result<Json, Bubble> {
        let mut fields = IndexMap::new();
        let mut visited = HashSet::new();
        for (field, _) in group {
            if let Some(set) = &field.selection_set {
                self.collect(object, set, &mut fields, &mut visited);
            }
        }
        let mut out = Map::new();
        for (key, group) in fields {
            out.insert(key.to_string(), self.field(object, value, key, &group)?);
        }
        Ok(Json::Object(out))
    }

    /// Flattens fragments into response-key order. Type conditions match by
    /// name: every type with fields is an object type.
    fn collect(
        &self,
        object: &ObjectType,
        set: &'e SelectionSet,
        out: &mut IndexMap<&'e str, FieldGroup<'e>>,
        visited: &mut HashSet<&'e str>,
    ) {
        for item in &set.items {
            if !self.included(item.directives()) {
                continue;
            }
            match &item.node {
                Selection::Field(field) => out.entry(field.response_key()).or_default().push((field, item.pos)),
                Selection::InlineFragment(fragment) => {
                    let applies = match &fragment.type_condition {
                        Some(condition) => condition.node == object.name,
                        None => true,
                    };
                    if applies {
                        self.collect(object, &fragment.selection_set.node, out, visited);
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let name = spread.fragment_name.node.as_str();
                    if !visited.insert(name) {
                        continue;
                    }
                    if let Some(fragment) = self.document.fragment(name) {
                        if fragment.type_condition.node == object.name {
                            self.collect(object, &fragment.selection_set.node, out, visited);
                        }
                    }
                }
            }
        }
    }

    /// `@skip(if:)` and `@include(if:)`.
    fn included(&self, directives: &[Positioned<Directive>]) -> bool {
        directives.iter().all(|directive| {
            let flag = directive
                .argument("if")
                .and_then(|value| value.node.resolve(&mut |name| self.variables.get(name).cloned()));
            !matches!(
                (directive.name.node.as_str(), flag),
                ("skip", Some(ConstValue::Boolean(true))) | ("include", Some(ConstValue::Boolean(false)))
            )
        })
    }

    fn field(&self, object: &'e ObjectType, parent: &AnyValue, key: &str, group: &[(&'e Field, Pos)]) -> Result<Json, Bubble> {
        let Some(&(field, pos)) = group.first() else {
            return Ok(Json::Null);
        };
        if field.name.node == "__typename" {
            return Ok(Json::String(object.name.clone()));
        }
        let Some(node) = object.field(&field.name.node) else {
            return Ok(Json::Null);
        };
        self.ctx.push(PathSegment::Field(key.to_string()));
        let result = self.resolve_field(object, node, parent, field, pos, group);
        self.ctx.pop();
        result
    }

    fn resolve_field(
        &self,
        object: &'e ObjectType,
        node: &'e FieldNode,
        parent: &AnyValue,
        field: &'e Field,
        pos: Pos,
        group: &[(&'e Field, Pos)],
    ) -> Result<Json, Bubble> {
        tracing::trace!(parent = %object.name, field = %node.name, "resolving field");
        if let Some(reason) = self.ctx.interruption() {
            return self.fail(&node.shape, FieldError::new(reason), pos);
        }
        let arguments = match self.arguments(node, field) {
            Ok(arguments) => arguments,
            Err(message) => return self.fail(&node.shape, FieldError::new(message), pos),
        };

        let started = self.ctx.timing.as_ref().map(|timing| timing.borrow().offset());
        let resolved = node.invoke(parent, self.ctx, arguments);
        if let (Some(timing), Some(started)) = (&self.ctx.timing, started) {
            let entry = ResolverTiming {
                path: self.ctx.path(),
                parent_type: object.name.clone(),
                field_name: node.name.clone(),
                return_type: TypeRef::output(&node.shape).to_string(),
                start_offset: 0,
                duration: 0,
            };
            timing.borrow_mut().resolver(started, entry);
        }

        match resolved {
            Ok(resolved) => {
                let site = Site { parent: &object.name, field: &node.name, pos };
                self.complete(&node.shape, resolved, &site, group)
            }
            Err(err) => self.fail(&node.shape, err, pos),
        }
    }

    fn arguments(&self, node: &FieldNode, field: &Field) -> Result<Json, String> {
        let supplied = field
            .arguments
            .iter()
            .filter_map(|(name, value)| {
                let value = value.node.resolve(&mut |var| self.variables.get(var).cloned())?;
                Some((name.node.clone(), value))
            })
            .collect();
        Coercion::execution(self.schema, self.ctx).arguments(node.arguments(), &supplied)
    }

    fn fail(&self, shape: &ObjDescriptor, error: FieldError, pos: Pos) -> Result<Json, Bubble> {
        self.ctx.record(error, pos);
        if shape.is_nullable() { Ok(Json::Null) } else { Err(Bubble) }
    }

    fn complete(
        &self,
        shape: &ObjDescriptor,
        resolved: Resolved<'_>,
        site: &Site<'_>,
        group: &[(&'e Field, Pos)],
    ) -> Result<Json, Bubble> {
        if let Resolved::Shared(shared) = resolved {
            return self.complete(shape, shared.resolve(), site, group);
        }
        match shape {
            ObjDescriptor::Ptr(inner) | ObjDescriptor::Method { out_type: inner, is_type_method: false, .. } => {
                match resolved {
                    Resolved::Null => Ok(Json::Null),
                    resolved => Ok(self.complete(inner, resolved, site, group).unwrap_or(Json::Null)),
                }
            }
            ObjDescriptor::Method { out_type, .. } => self.complete(out_type, resolved, site, group),
            _ if matches!(resolved, Resolved::Null) => {
                let message = format!("Cannot return null for non-nullable field {}.{}.", site.parent, site.field);
                self.ctx.record(FieldError::new(message), site.pos);
                Err(Bubble)
            }
            ObjDescriptor::Array(elem) => {
                let Resolved::List(items) = resolved else {
                    return self.mismatch(site, "a list");
                };
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    self.ctx.push(PathSegment::Index(index));
                    let value = self.complete(elem, item, site, group);
                    self.ctx.pop();
                    out.push(value?);
                }
                Ok(Json::Array(out))
            }
            ObjDescriptor::Data { kind, is_id } => {
                let Resolved::Leaf(value) = resolved else {
                    return self.mismatch(site, "a scalar");
                };
                self.schema.registry.data_scalar(*kind, *is_id).serialize(&value).map_err(|message| {
                    self.ctx.record(FieldError::new(message), site.pos);
                    Bubble
                })
            }
            ObjDescriptor::Enum(name) => {
                let Resolved::Enum(symbol) = resolved else {
                    return self.mismatch(site, "an enum value");
                };
                match self.schema.registry.enum_type(name) {
                    Some(ty) if ty.contains(symbol) => Ok(Json::String(symbol.to_string())),
                    _ => {
                        let message = format!("Enum \"{name}\" cannot represent value: \"{symbol}\"");
                        self.ctx.record(FieldError::new(message), site.pos);
                        Err(Bubble)
                    }
                }
            }
            ObjDescriptor::ObjRef(name) => {
                let (Resolved::Object(value), Some(object)) = (resolved, self.schema.object(name)) else {
                    return self.mismatch(site, "an object");
                };
                self.object(object, value.as_any(), group)
            }
        }
    }

    fn mismatch(&self, site: &Site<'_>, expected: &str) -> Result<Json, Bubble> {
        let message = format!("internal: {}.{} resolved to something other than {expected}", site.parent, site.field);
        self.ctx.record(FieldError::new(message), site.pos);
        Err(Bubble)
    }
}
