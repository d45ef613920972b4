//! Static checks of a parsed document against the schema.
//!
//! Every violation is collected (sorted into document order at the end); the
//! operation runs only when the list stays empty.
use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::error::{Pos, ValidationError};
use crate::parser::ast::*;
use crate::reflect::{FieldNode, InputDescriptor, ObjDescriptor, ObjectType};
use crate::registry::{DataKind, UPLOAD_SCALAR};
use crate::resolve::Coercion;
use crate::schema::{Schema, TypeKind, TypeRef};
use crate::value::{ConstValue, Value, Variables};

/// Validates the whole document, then the variable values of the operation
/// that would run.
pub fn validate(
    schema: &Schema,
    document: &Document,
    operation_name: Option<&str>,
    variables: &Variables,
) -> Result<(), Vec<ValidationError>> {
    let mut validator = Validator { schema, document, errors: Vec::new() };
    validator.document(operation_name, variables);
    let mut errors = validator.errors;
    if errors.is_empty() {
        return Ok(());
    }
    errors.sort_by_key(|e| (e.locations.is_empty(), e.locations.first().copied()));
    Err(errors)
}

struct Usage {
    name: String,
    pos: Pos,
    /// Set when the variable is the whole argument value: the argument type
    /// and whether the argument has a default.
    expected: Option<(TypeRef, bool)>,
}

#[derive(Default)]
struct Scope<'d> {
    usages: Vec<Usage>,
    spreads: Vec<&'d str>,
}

struct Validator<'d> {
    schema: &'d Schema,
    document: &'d Document,
    errors: Vec<ValidationError>,
}

impl<'d> Validator<'d> {
    fn error(&mut self, message: impl Into<String>, pos: Pos) {
        self.errors.push(ValidationError::new(message, pos));
    }

    fn document(&mut self, operation_name: Option<&str>, variables: &Variables) {
        let document = self.document;

        let mut names = HashSet::new();
        for operation in &document.operations {
            match &operation.name {
                Some(name) if !names.insert(name.node.as_str()) => {
                    self.error(format!("There can be only one operation named \"{}\".", name.node), name.pos);
                }
                None if document.operations.len() > 1 => {
                    self.error("This anonymous operation must be the only defined operation.", operation.pos);
                }
                _ => {}
            }
        }

        let mut names = HashSet::new();
        let mut fragments: HashMap<&'d str, Scope<'d>> = HashMap::new();
        for fragment in &document.fragments {
            let name = fragment.name.node.as_str();
            if !names.insert(name) {
                self.error(format!("There can be only one fragment named \"{name}\"."), fragment.name.pos);
            }
            self.misplaced_directives(&fragment.directives, "FRAGMENT_DEFINITION");
            let mut scope = Scope::default();
            if let Some(object) = self.condition_type(&fragment.type_condition, Some(name)) {
                self.selection_set(object, &fragment.selection_set, &mut scope);
            }
            fragments.entry(name).or_insert(scope);
        }

        let mut used = HashSet::new();
        for operation in &document.operations {
            let location = match operation.kind {
                OperationKind::Query => "QUERY",
                OperationKind::Mutation => "MUTATION",
                OperationKind::Subscription => "SUBSCRIPTION",
            };
            self.misplaced_directives(&operation.directives, location);
            let mut scope = Scope::default();
            let root = match operation.kind {
                OperationKind::Query => Some(self.schema.query_type()),
                OperationKind::Mutation => Some(self.schema.mutation_type()),
                OperationKind::Subscription => {
                    self.error("Subscriptions are not supported.", operation.pos);
                    None
                }
            };
            if let Some(root) = root {
                self.selection_set(root, &operation.selection_set, &mut scope);
            }
            let reachable = reachable(&scope.spreads, &fragments);
            self.variable_definitions(operation, &scope, &reachable, &fragments);
            used.extend(reachable);
        }

        for fragment in &document.fragments {
            let name = fragment.name.node.as_str();
            if !used.contains(name) {
                self.error(format!("Fragment \"{name}\" is never used."), fragment.pos);
            }
            let spreads = fragments.get(name).map(|scope| scope.spreads.as_slice()).unwrap_or_default();
            if reachable(spreads, &fragments).contains(&name) {
                self.error(format!("Cannot spread fragment \"{name}\" within itself."), fragment.pos);
            }
        }

        match document.operation(operation_name) {
            Ok(operation) => self.variable_values(operation, variables),
            Err(message) => self.errors.push(ValidationError { message, locations: Vec::new() }),
        }
    }

    // ————————————————————————————————————————————————————————————————————————
    // SELECTIONS
    // ————————————————————————————————————————————————————————————————————————

    fn condition_type(&mut self, condition: &Positioned<String>, fragment: Option<&str>) -> Option<&'d ObjectType> {
        let schema = self.schema;
        let name = condition.node.as_str();
        match schema.kind_of(name) {
            Some(TypeKind::Object) => schema.object(name),
            Some(_) => {
                let message = match fragment {
                    Some(fragment) => format!("Fragment \"{fragment}\" cannot condition on non composite type \"{name}\"."),
                    None => format!("Fragment cannot condition on non composite type \"{name}\"."),
                };
                self.error(message, condition.pos);
                None
            }
            None => {
                self.error(format!("Unknown type \"{name}\"."), condition.pos);
                None
            }
        }
    }

    fn selection_set(&mut self, object: &'d ObjectType, set: &'d SelectionSet, scope: &mut Scope<'d>) {
        self.selections(object, set, scope);
        self.overlaps(object, set);
    }

    fn selections(&mut self, object: &'d ObjectType, set: &'d SelectionSet, scope: &mut Scope<'d>) {
        for item in &set.items {
            self.directives(item.directives(), scope);
            match &item.node {
                Selection::Field(field) => self.field(object, field, item.pos, scope),
                Selection::FragmentSpread(spread) => {
                    let name = &spread.fragment_name;
                    scope.spreads.push(name.node.as_str());
                    match self.document.fragment(&name.node) {
                        None => self.error(format!("Unknown fragment \"{}\".", name.node), name.pos),
                        Some(fragment) => {
                            let condition = &fragment.type_condition.node;
                            if self.schema.object(condition).is_some() && *condition != object.name {
                                self.error(
                                    format!(
                                        "Fragment \"{}\" cannot be spread here as objects of type \"{}\" can never be of type \"{condition}\".",
                                        name.node, object.name
                                    ),
                                    item.pos,
                                );
                            }
                        }
                    }
                }
                Selection::InlineFragment(fragment) => {
                    let target = match &fragment.type_condition {
                        None => Some(object),
                        Some(condition) => self.condition_type(condition, None),
                    };
                    let Some(target) = target else { continue };
                    if target.name != object.name {
                        self.error(
                            format!(
                                "Fragment cannot be spread here as objects of type \"{}\" can never be of type \"{}\".",
                                object.name, target.name
                            ),
                            item.pos,
                        );
                        self.selection_set(target, &fragment.selection_set, scope);
                    } else {
                        self.selections(target, &fragment.selection_set, scope);
                    }
                }
            }
        }
    }

    fn field(&mut self, object: &'d ObjectType, field: &'d Field, pos: Pos, scope: &mut Scope<'d>) {
        self.unique_arguments(&field.arguments);
        let name = field.name.node.as_str();
        if name == "__typename" {
            for (argument, _) in &field.arguments {
                self.error(
                    format!("Unknown argument \"{}\" on field \"{}.__typename\".", argument.node, object.name),
                    argument.pos,
                );
            }
            if let Some(set) = &field.selection_set {
                self.error(
                    "Field \"__typename\" must not have a selection since type \"String!\" has no subfields.",
                    set.pos,
                );
            }
            return;
        }
        let Some(node) = object.field(name) else {
            self.error(format!("Cannot query field \"{name}\" on type \"{}\".", object.name), pos);
            return;
        };
        self.arguments(object, node, field, pos, scope);

        let ty = TypeRef::output(&node.shape);
        match (node.shape.named(), &field.selection_set) {
            (ObjDescriptor::ObjRef(child), Some(set)) => {
                if let Some(child) = self.schema.object(child) {
                    self.selection_set(child, set, scope);
                }
            }
            (ObjDescriptor::ObjRef(_), None) => self.error(
                format!("Field \"{name}\" of type \"{ty}\" must have a selection of subfields. Did you mean \"{name} {{ ... }}\"?"),
                pos,
            ),
            (_, Some(set)) => self.error(
                format!("Field \"{name}\" must not have a selection since type \"{ty}\" has no subfields."),
                set.pos,
            ),
            (_, None) => {}
        }
    }

    fn arguments(&mut self, object: &ObjectType, node: &FieldNode, field: &'d Field, pos: Pos, scope: &mut Scope<'d>) {
        let declared = node.arguments();
        for (name, value) in &field.arguments {
            match declared.iter().find(|d| d.name == name.node) {
                Some(decl) => self.argument_value(&decl.ty, decl.default.is_some(), name, value, scope),
                None => {
                    self.error(
                        format!("Unknown argument \"{}\" on field \"{}.{}\".", name.node, object.name, node.name),
                        name.pos,
                    );
                    nested_usages(value, scope);
                }
            }
        }
        for decl in declared.iter().filter(|d| d.is_required()) {
            if field.argument(&decl.name).is_none() {
                self.error(
                    format!(
                        "Field \"{}\" argument \"{}\" of type \"{}\" is required, but it was not provided.",
                        node.name,
                        decl.name,
                        TypeRef::input(&decl.ty)
                    ),
                    pos,
                );
            }
        }
    }

    /// Literals without variables are coerced right away; variables are
    /// checked against their definitions per operation.
    fn argument_value(
        &mut self,
        ty: &InputDescriptor,
        has_default: bool,
        name: &Positioned<String>,
        value: &Positioned<Value>,
        scope: &mut Scope<'d>,
    ) {
        if let Value::Variable(variable) = &value.node {
            scope.usages.push(Usage {
                name: variable.clone(),
                pos: value.pos,
                expected: Some((TypeRef::input(ty), has_default)),
            });
            return;
        }
        match value.node.as_const() {
            Some(literal) => {
                if let Err(reason) = Coercion::literal(self.schema).input(ty, &literal) {
                    self.error(format!("Argument \"{}\" has invalid value {literal}: {reason}", name.node), value.pos);
                }
            }
            None => nested_usages(value, scope),
        }
    }

    fn unique_arguments(&mut self, arguments: &Arguments) {
        let mut seen = HashSet::new();
        for (name, _) in arguments {
            if !seen.insert(name.node.as_str()) {
                self.error(format!("There can be only one argument named \"{}\".", name.node), name.pos);
            }
        }
    }

    /// Only `@skip(if:)` and `@include(if:)` exist, on selections.
    fn directives(&mut self, directives: &[Positioned<Directive>], scope: &mut Scope<'d>) {
        let flag = InputDescriptor::Data { kind: DataKind::Boolean, is_id: false };
        let mut seen = HashSet::new();
        for directive in directives {
            let name = directive.name.node.as_str();
            if name != "skip" && name != "include" {
                self.error(format!("Unknown directive \"@{name}\"."), directive.pos);
                continue;
            }
            if !seen.insert(name) {
                self.error(format!("The directive \"@{name}\" can only be used once at this location."), directive.pos);
            }
            self.unique_arguments(&directive.arguments);
            for (argument, value) in &directive.arguments {
                if argument.node == "if" {
                    self.argument_value(&flag, false, argument, value, scope);
                } else {
                    self.error(
                        format!("Unknown argument \"{}\" on directive \"@{name}\".", argument.node),
                        argument.pos,
                    );
                }
            }
            if directive.argument("if").is_none() {
                self.error(
                    format!("Directive \"@{name}\" argument \"if\" of type \"Boolean!\" is required, but it was not provided."),
                    directive.pos,
                );
            }
        }
    }

    fn misplaced_directives(&mut self, directives: &[Positioned<Directive>], location: &str) {
        for directive in directives {
            let name = directive.name.node.as_str();
            let message = match name {
                "skip" | "include" => format!("Directive \"@{name}\" may not be used on {location}."),
                _ => format!("Unknown directive \"@{name}\"."),
            };
            self.error(message, directive.pos);
        }
    }

    /// Fields sharing a response key must be the same field with the same arguments.
    fn overlaps(&mut self, object: &ObjectType, set: &'d SelectionSet) {
        let mut fields: IndexMap<&str, Vec<(&Field, Pos)>> = IndexMap::new();
        self.collect(object, set, &mut fields, &mut HashSet::new());
        for (key, group) in fields {
            let [(first, first_pos), rest @ ..] = group.as_slice() else { continue };
            let Some((other, other_pos)) = rest.iter().find(|(other, _)| {
                other.name.node != first.name.node || !same_arguments(&first.arguments, &other.arguments)
            }) else {
                continue;
            };
            let message = if other.name.node != first.name.node {
                format!(
                    "Fields \"{key}\" conflict because \"{}\" and \"{}\" are different fields. Use different aliases on the fields to fetch both if this was intentional.",
                    first.name.node, other.name.node
                )
            } else {
                format!(
                    "Fields \"{key}\" conflict because they have differing arguments. Use different aliases on the fields to fetch both if this was intentional."
                )
            };
            self.errors.push(ValidationError { message, locations: vec![*first_pos, *other_pos] });
        }
    }

    fn collect(
        &self,
        object: &ObjectType,
        set: &'d SelectionSet,
        out: &mut IndexMap<&'d str, Vec<(&'d Field, Pos)>>,
        visited: &mut HashSet<&'d str>,
    ) {
        for item in &set.items {
            match &item.node {
                Selection::Field(field) => out.entry(field.response_key()).or_default().push((field, item.pos)),
                Selection::InlineFragment(fragment) => {
                    let applies = match &fragment.type_condition {
                        Some(condition) => condition.node == object.name,
                        None => true,
                    };
                    if applies {
                        self.collect(object, &fragment.selection_set, out, visited);
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let name = spread.fragment_name.node.as_str();
                    if !visited.insert(name) {
                        continue;
                    }
                    if let Some(fragment) = self.document.fragment(name) {
                        if fragment.type_condition.node == object.name {
                            self.collect(object, &fragment.selection_set, out, visited);
                        }
                    }
                }
            }
        }
    }

    // ————————————————————————————————————————————————————————————————————————
    // VARIABLES
    // ————————————————————————————————————————————————————————————————————————

    fn variable_definitions(
        &mut self,
        operation: &'d Positioned<OperationDefinition>,
        scope: &Scope<'d>,
        reachable: &[&'d str],
        fragments: &HashMap<&'d str, Scope<'d>>,
    ) {
        let in_operation = match &operation.name {
            Some(name) => format!(" by operation \"{}\"", name.node),
            None => String::new(),
        };

        let mut seen = HashSet::new();
        for definition in &operation.variables {
            let name = definition.name.node.as_str();
            if !seen.insert(name) {
                self.error(format!("There can be only one variable named \"${name}\"."), definition.name.pos);
            }
            self.misplaced_directives(&definition.directives, "VARIABLE_DEFINITION");
            let named = definition.ty.named_type();
            match self.schema.kind_of(named) {
                None => self.error(format!("Unknown type \"{named}\"."), definition.ty.pos),
                Some(TypeKind::Object) => self.error(
                    format!("Variable \"${name}\" cannot be non-input type \"{}\".", definition.ty.node),
                    definition.ty.pos,
                ),
                Some(_) => {
                    let (Some(default), Some(ty)) = (&definition.default_value, descriptor(self.schema, &definition.ty))
                    else {
                        continue;
                    };
                    if let Err(reason) = Coercion::literal(self.schema).input(&ty, &default.node) {
                        self.error(
                            format!(
                                "Variable \"${name}\" of type \"{}\" has invalid default value {}: {reason}",
                                definition.ty.node, default.node
                            ),
                            default.pos,
                        );
                    }
                }
            }
        }

        let usages: Vec<&Usage> = scope
            .usages
            .iter()
            .chain(reachable.iter().filter_map(|name| fragments.get(name)).flat_map(|s| s.usages.iter()))
            .collect();
        for usage in &usages {
            let Some(definition) = operation.variables.iter().find(|d| d.name.node == usage.name) else {
                self.error(format!("Variable \"${}\" is not defined{in_operation}.", usage.name), usage.pos);
                continue;
            };
            let Some((expected, location_default)) = &usage.expected else { continue };
            let variable_default = definition.default_value.as_ref().is_some_and(|d| d.node != ConstValue::Null);
            if !allowed(&definition.ty, variable_default, expected, *location_default) {
                self.error(
                    format!(
                        "Variable \"${}\" of type \"{}\" used in position expecting type \"{expected}\".",
                        usage.name, definition.ty.node
                    ),
                    usage.pos,
                );
            }
        }
        for definition in &operation.variables {
            if !usages.iter().any(|usage| usage.name == definition.name.node) {
                let message = match &operation.name {
                    Some(op) => format!("Variable \"${}\" is never used in operation \"{}\".", definition.name.node, op.node),
                    None => format!("Variable \"${}\" is never used.", definition.name.node),
                };
                self.error(message, definition.pos);
            }
        }
    }

    fn variable_values(&mut self, operation: &OperationDefinition, variables: &Variables) {
        for definition in &operation.variables {
            let Some(ty) = descriptor(self.schema, &definition.ty) else { continue };
            let name = &definition.name.node;
            match variables.get(name) {
                Some(value) => {
                    if let Err(reason) = Coercion::variables(self.schema).input(&ty, value) {
                        self.error(format!("Variable \"${name}\" got invalid value {value}; {reason}"), definition.name.pos);
                    }
                }
                None if definition.default_value.is_none() && !definition.ty.is_nullable() => self.error(
                    format!("Variable \"${name}\" of required type \"{}\" was not provided.", definition.ty.node),
                    definition.name.pos,
                ),
                None => {}
            }
        }
    }
}

fn nested_usages(value: &Positioned<Value>, scope: &mut Scope<'_>) {
    let mut names = Vec::new();
    value.node.variables(&mut names);
    scope
        .usages
        .extend(names.into_iter().map(|name| Usage { name, pos: value.pos, expected: None }));
}

fn same_arguments(a: &Arguments, b: &Arguments) -> bool {
    fn sorted(arguments: &Arguments) -> Vec<(&str, &Value)> {
        let mut pairs: Vec<_> = arguments.iter().map(|(n, v)| (n.node.as_str(), &v.node)).collect();
        pairs.sort_by(|x, y| x.0.cmp(y.0));
        pairs
    }
    sorted(a) == sorted(b)
}

/// Fragments reachable through `spreads`, excluding undefined ones.
fn reachable<'d>(spreads: &[&'d str], fragments: &HashMap<&'d str, Scope<'d>>) -> Vec<&'d str> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut stack = spreads.to_vec();
    while let Some(name) = stack.pop() {
        if !seen.insert(name) {
            continue;
        }
        let Some(scope) = fragments.get(name) else { continue };
        order.push(name);
        stack.extend(scope.spreads.iter().copied());
    }
    order
}

/// The input shape a variable definition declares.
fn descriptor(schema: &Schema, ty: &AstType) -> Option<InputDescriptor> {
    fn nullable(ty: InputDescriptor) -> InputDescriptor {
        InputDescriptor::Ptr(Box::new(ty))
    }
    match ty {
        AstType::NonNull(inner) => match descriptor(schema, inner)? {
            InputDescriptor::Ptr(inner) => Some(*inner),
            other => Some(other),
        },
        AstType::List(inner) => Some(nullable(InputDescriptor::List(Box::new(descriptor(schema, inner)?)))),
        AstType::Named(name) => {
            let named = match (schema.kind_of(name)?, name.as_str()) {
                (TypeKind::Scalar, UPLOAD_SCALAR) => InputDescriptor::Upload,
                (TypeKind::Scalar, "Boolean") => InputDescriptor::Data { kind: DataKind::Boolean, is_id: false },
                (TypeKind::Scalar, "Int") => InputDescriptor::Data { kind: DataKind::Int, is_id: false },
                (TypeKind::Scalar, "Float") => InputDescriptor::Data { kind: DataKind::Float, is_id: false },
                (TypeKind::Scalar, "ID") => InputDescriptor::Data { kind: DataKind::String, is_id: true },
                (TypeKind::Scalar, _) => InputDescriptor::Data { kind: DataKind::String, is_id: false },
                (TypeKind::Enum, _) => InputDescriptor::Enum(name.clone()),
                (TypeKind::InputObject, _) => InputDescriptor::Struct(name.clone()),
                _ => return None,
            };
            Some(nullable(named))
        }
    }
}

/// A nullable variable may fill a non-null position when either side has a default.
fn allowed(variable: &AstType, variable_default: bool, location: &TypeRef, location_default: bool) -> bool {
    match location {
        TypeRef::NonNull(inner) if variable.is_nullable() => {
            (variable_default || location_default) && is_subtype(variable, inner)
        }
        _ => is_subtype(variable, location),
    }
}

fn is_subtype(variable: &AstType, location: &TypeRef) -> bool {
    match (variable, location) {
        (AstType::NonNull(variable), TypeRef::NonNull(location)) => is_subtype(variable, location),
        (AstType::NonNull(variable), location) => is_subtype(variable, location),
        (_, TypeRef::NonNull(_)) => false,
        (AstType::List(variable), TypeRef::List(location)) => is_subtype(variable, location),
        (AstType::Named(variable), TypeRef::Named { name, .. }) => variable == name,
        _ => false,
    }
}
