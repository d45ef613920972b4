//! Executable document AST.
use std::fmt;
use std::ops::Deref;

use serde::Serialize;

use crate::error::Pos;
use crate::value::{ConstValue, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Positioned<T> {
    pub pos: Pos,
    pub node: T,
}

impl<T> Positioned<T> {
    pub fn new(node: T, pos: Pos) -> Self {
        Self { pos, node }
    }
}

impl<T> Deref for Positioned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.node
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub operations: Vec<Positioned<OperationDefinition>>,
    pub fragments: Vec<Positioned<FragmentDefinition>>,
}

impl Document {
    pub fn fragment(&self, name: &str) -> Option<&Positioned<FragmentDefinition>> {
        self.fragments.iter().find(|f| f.name.node == name)
    }

    /// Picks the operation to run. `None` works only when the document has one operation.
    pub fn operation(&self, name: Option<&str>) -> Result<&Positioned<OperationDefinition>, String> {
        match name {
            Some(name) => self
                .operations
                .iter()
                .find(|op| op.name.as_ref().is_some_and(|n| n.node == name))
                .ok_or_else(|| format!("Unknown operation named \"{name}\".")),
            None => match self.operations.as_slice() {
                [single] => Ok(single),
                [] => Err("Document does not contain any operation.".to_string()),
                _ => Err("Must provide operation name if query contains multiple operations.".to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationDefinition {
    pub kind: OperationKind,
    pub name: Option<Positioned<String>>,
    pub variables: Vec<Positioned<VariableDefinition>>,
    pub directives: Vec<Positioned<Directive>>,
    pub selection_set: Positioned<SelectionSet>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableDefinition {
    pub name: Positioned<String>,
    pub ty: Positioned<AstType>,
    pub default_value: Option<Positioned<ConstValue>>,
    pub directives: Vec<Positioned<Directive>>,
}

/// A type reference as written in a variable definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "of")]
pub enum AstType {
    Named(String),
    List(Box<AstType>),
    NonNull(Box<AstType>),
}

impl AstType {
    pub fn named_type(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::List(inner) | Self::NonNull(inner) => inner.named_type(),
        }
    }

    pub fn is_nullable(&self) -> bool {
        !matches!(self, Self::NonNull(_))
    }
}

impl fmt::Display for AstType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionSet {
    pub items: Vec<Positioned<Selection>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum Selection {
    Field(Field),
    FragmentSpread(FragmentSpread),
    InlineFragment(InlineFragment),
}

impl Selection {
    pub fn directives(&self) -> &[Positioned<Directive>] {
        match self {
            Self::Field(field) => &field.directives,
            Self::FragmentSpread(spread) => &spread.directives,
            Self::InlineFragment(fragment) => &fragment.directives,
        }
    }
}

pub type Arguments = Vec<(Positioned<String>, Positioned<Value>)>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub alias: Option<Positioned<String>>,
    pub name: Positioned<String>,
    pub arguments: Arguments,
    pub directives: Vec<Positioned<Directive>>,
    pub selection_set: Option<Positioned<SelectionSet>>,
}

impl Field {
    /// The key the field's value is stored under in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_ref().map_or(&self.name.node, |alias| &alias.node)
    }

    pub fn argument(&self, name: &str) -> Option<&Positioned<Value>> {
        find_argument(&self.arguments, name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FragmentSpread {
    pub fragment_name: Positioned<String>,
    pub directives: Vec<Positioned<Directive>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineFragment {
    pub type_condition: Option<Positioned<String>>,
    pub directives: Vec<Positioned<Directive>>,
    pub selection_set: Positioned<SelectionSet>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FragmentDefinition {
    pub name: Positioned<String>,
    pub type_condition: Positioned<String>,
    pub directives: Vec<Positioned<Directive>>,
    pub selection_set: Positioned<SelectionSet>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Directive {
    pub name: Positioned<String>,
    pub arguments: Arguments,
}

impl Directive {
    pub fn argument(&self, name: &str) -> Option<&Positioned<Value>> {
        find_argument(&self.arguments, name)
    }
}

fn find_argument<'a>(arguments: &'a Arguments, name: &str) -> Option<&'a Positioned<Value>> {
    arguments.iter().find(|(n, _)| n.node == name).map(|(_, value)| value)
}
