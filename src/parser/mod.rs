//! Recursive descent parser for executable GraphQL documents.
pub mod ast;
pub mod lexer;

use std::mem;

use indexmap::IndexMap;

use crate::error::{Pos, SyntaxError};
use crate::value::Value;
use ast::*;
use lexer::{Lexer, Spanned, Token};

pub const DEFAULT_MAX_DEPTH: usize = 64;

pub fn parse_query(source: &str) -> Result<Document, SyntaxError> {
    parse_query_with_depth(source, DEFAULT_MAX_DEPTH)
}

/// `max_depth` bounds the nesting of selection sets and list/object literals.
pub fn parse_query_with_depth(source: &str, max_depth: usize) -> Result<Document, SyntaxError> {
    let document = Parser::new(source, max_depth)?.document()?;
    tracing::trace!(
        operations = document.operations.len(),
        fragments = document.fragments.len(),
        "parsed document"
    );
    Ok(document)
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Spanned,
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, max_depth: usize) -> Result<Self, SyntaxError> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current, depth: 0, max_depth })
    }

    // ————————————————————————————————————————————————————————————————————————
    // TOKEN STREAM
    // ————————————————————————————————————————————————————————————————————————

    fn advance(&mut self) -> Result<Spanned, SyntaxError> {
        let next = self.lexer.next_token()?;
        Ok(mem::replace(&mut self.current, next))
    }

    fn at(&self, token: &Token) -> bool {
        &self.current.token == token
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(&self.current.token, Token::Name(name) if name == keyword)
    }

    fn skip(&mut self, token: &Token) -> Result<bool, SyntaxError> {
        if self.at(token) {
            self.advance()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn expect(&mut self, token: Token) -> Result<Pos, SyntaxError> {
        if self.at(&token) {
            return Ok(self.advance()?.pos);
        }
        Err(SyntaxError::new(format!("Expected {token}, found {}", self.current.token), self.current.pos))
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<Pos, SyntaxError> {
        if self.at_keyword(keyword) {
            return Ok(self.advance()?.pos);
        }
        Err(SyntaxError::new(format!("Expected \"{keyword}\", found {}", self.current.token), self.current.pos))
    }

    fn name(&mut self) -> Result<Positioned<String>, SyntaxError> {
        if let Token::Name(_) = self.current.token {
            let Spanned { token, pos } = self.advance()?;
            if let Token::Name(name) = token {
                return Ok(Positioned::new(name, pos));
            }
        }
        Err(SyntaxError::new(format!("Expected Name, found {}", self.current.token), self.current.pos))
    }

    fn unexpected(&self) -> SyntaxError {
        SyntaxError::new(format!("Unexpected {}", self.current.token), self.current.pos)
    }

    fn enter(&mut self, pos: Pos) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(SyntaxError::new(
                format!("Query is nested deeper than the maximum depth of {}", self.max_depth),
                pos,
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ————————————————————————————————————————————————————————————————————————
    // DEFINITIONS
    // ————————————————————————————————————————————————————————————————————————

    fn document(mut self) -> Result<Document, SyntaxError> {
        let mut document = Document { operations: Vec::new(), fragments: Vec::new() };
        loop {
            if self.at(&Token::Eof) {
                if document.operations.is_empty() && document.fragments.is_empty() {
                    return Err(self.unexpected());
                }
                return Ok(document);
            } else if self.at(&Token::LBrace) {
                document.operations.push(self.shorthand_query()?);
            } else if ["query", "mutation", "subscription"].iter().any(|k| self.at_keyword(k)) {
                document.operations.push(self.operation()?);
            } else if self.at_keyword("fragment") {
                document.fragments.push(self.fragment_definition()?);
            } else {
                return Err(self.unexpected());
            }
        }
    }

    fn shorthand_query(&mut self) -> Result<Positioned<OperationDefinition>, SyntaxError> {
        let pos = self.current.pos;
        let selection_set = self.selection_set()?;
        Ok(Positioned::new(
            OperationDefinition {
                kind: OperationKind::Query,
                name: None,
                variables: Vec::new(),
                directives: Vec::new(),
                selection_set,
            },
            pos,
        ))
    }

    fn operation(&mut self) -> Result<Positioned<OperationDefinition>, SyntaxError> {
        let keyword = self.name()?;
        let kind = match keyword.node.as_str() {
            "query" => OperationKind::Query,
            "mutation" => OperationKind::Mutation,
            _ => OperationKind::Subscription,
        };
        let name = match self.current.token {
            Token::Name(_) => Some(self.name()?),
            _ => None,
        };
        let variables = self.variable_definitions()?;
        let directives = self.directives(true)?;
        let selection_set = self.selection_set()?;
        Ok(Positioned::new(
            OperationDefinition { kind, name, variables, directives, selection_set },
            keyword.pos,
        ))
    }

    fn variable_definitions(&mut self) -> Result<Vec<Positioned<VariableDefinition>>, SyntaxError> {
        let mut out = Vec::new();
        if !self.skip(&Token::LParen)? {
            return Ok(out);
        }
        loop {
            let Spanned { token, pos } = self.advance()?;
            let Token::Variable(name) = token else {
                return Err(SyntaxError::new(format!("Expected Variable, found {token}"), pos));
            };
            let name = Positioned::new(name, pos);
            self.expect(Token::Colon)?;
            let ty = self.ty()?;
            let default_value = if self.skip(&Token::Equals)? {
                let value = self.value(true)?;
                Some(Positioned::new(value.node.as_const().unwrap_or_default(), value.pos))
            } else {
                None
            };
            let directives = self.directives(true)?;
            out.push(Positioned::new(VariableDefinition { name, ty, default_value, directives }, pos));
            if self.skip(&Token::RParen)? {
                return Ok(out);
            }
        }
    }

    fn ty(&mut self) -> Result<Positioned<AstType>, SyntaxError> {
        let pos = self.current.pos;
        let base = if self.skip(&Token::LBracket)? {
            self.enter(pos)?;
            let inner = self.ty()?;
            self.expect(Token::RBracket)?;
            self.leave();
            AstType::List(Box::new(inner.node))
        } else {
            AstType::Named(self.name()?.node)
        };
        let ty = if self.skip(&Token::Bang)? { AstType::NonNull(Box::new(base)) } else { base };
        Ok(Positioned::new(ty, pos))
    }

    fn fragment_definition(&mut self) -> Result<Positioned<FragmentDefinition>, SyntaxError> {
        let pos = self.expect_keyword("fragment")?;
        if self.at_keyword("on") {
            return Err(self.unexpected());
        }
        let name = self.name()?;
        self.expect_keyword("on")?;
        let type_condition = self.name()?;
        let directives = self.directives(true)?;
        let selection_set = self.selection_set()?;
        Ok(Positioned::new(FragmentDefinition { name, type_condition, directives, selection_set }, pos))
    }

    // ————————————————————————————————————————————————————————————————————————
    // SELECTIONS
    // ————————————————————————————————————————————————————————————————————————

    fn selection_set(&mut self) -> Result<Positioned<SelectionSet>, SyntaxError> {
        let pos = self.expect(Token::LBrace)?;
        self.enter(pos)?;
        let mut items = Vec::new();
        loop {
            if self.at(&Token::RBrace) && !items.is_empty() {
                self.advance()?;
                break;
            }
            items.push(self.selection()?);
        }
        self.leave();
        Ok(Positioned::new(SelectionSet { items }, pos))
    }

    fn selection(&mut self) -> Result<Positioned<Selection>, SyntaxError> {
        let pos = self.current.pos;
        if !self.skip(&Token::Spread)? {
            return Ok(Positioned::new(Selection::Field(self.field()?), pos));
        }
        let is_spread = matches!(&self.current.token, Token::Name(name) if name != "on");
        let selection = if is_spread {
            let fragment_name = self.name()?;
            let directives = self.directives(false)?;
            Selection::FragmentSpread(FragmentSpread { fragment_name, directives })
        } else {
            let type_condition = if self.at_keyword("on") {
                self.advance()?;
                Some(self.name()?)
            } else {
                None
            };
            let directives = self.directives(false)?;
            let selection_set = self.selection_set()?;
            Selection::InlineFragment(InlineFragment { type_condition, directives, selection_set })
        };
        Ok(Positioned::new(selection, pos))
    }

    fn field(&mut self) -> Result<Field, SyntaxError> {
        let first = self.name()?;
        let (alias, name) = if self.skip(&Token::Colon)? { (Some(first), self.name()?) } else { (None, first) };
        let arguments = self.arguments(false)?;
        let directives = self.directives(false)?;
        let selection_set = if self.at(&Token::LBrace) { Some(self.selection_set()?) } else { None };
        Ok(Field { alias, name, arguments, directives, selection_set })
    }

    fn arguments(&mut self, is_const: bool) -> Result<Arguments, SyntaxError> {
        let mut out = Vec::new();
        if !self.skip(&Token::LParen)? {
            return Ok(out);
        }
        loop {
            let name = self.name()?;
            self.expect(Token::Colon)?;
            let value = self.value(is_const)?;
            out.push((name, value));
            if self.skip(&Token::RParen)? {
                return Ok(out);
            }
        }
    }

    fn directives(&mut self, is_const: bool) -> Result<Vec<Positioned<Directive>>, SyntaxError> {
        let mut out = Vec::new();
        while self.at(&Token::At) {
            let pos = self.advance()?.pos;
            let name = self.name()?;
            let arguments = self.arguments(is_const)?;
            out.push(Positioned::new(Directive { name, arguments }, pos));
        }
        Ok(out)
    }

    // ————————————————————————————————————————————————————————————————————————
    // VALUES
    // ————————————————————————————————————————————————————————————————————————

    fn value(&mut self, is_const: bool) -> Result<Positioned<Value>, SyntaxError> {
        let pos = self.current.pos;
        let value = match &self.current.token {
            Token::Variable(name) if is_const => {
                return Err(SyntaxError::new(format!("Unexpected variable \"${name}\" in constant value"), pos));
            }
            Token::LBracket => {
                self.advance()?;
                self.enter(pos)?;
                let mut items = Vec::new();
                while !self.skip(&Token::RBracket)? {
                    items.push(self.value(is_const)?.node);
                }
                self.leave();
                Value::List(items)
            }
            Token::LBrace => {
                self.advance()?;
                self.enter(pos)?;
                let mut entries = IndexMap::new();
                while !self.skip(&Token::RBrace)? {
                    let key = self.name()?;
                    self.expect(Token::Colon)?;
                    let value = self.value(is_const)?;
                    if entries.insert(key.node.clone(), value.node).is_some() {
                        return Err(SyntaxError::new(
                            format!("There can be only one input field named \"{}\".", key.node),
                            key.pos,
                        ));
                    }
                }
                self.leave();
                Value::Object(entries)
            }
            Token::Name(name) => {
                let value = match name.as_str() {
                    "true" => Value::Boolean(true),
                    "false" => Value::Boolean(false),
                    "null" => Value::Null,
                    _ => Value::Enum(name.clone()),
                };
                self.advance()?;
                value
            }
            _ => match self.advance()?.token {
                Token::Variable(name) => Value::Variable(name),
                Token::Int(i) => Value::Int(i),
                Token::Float(f) => Value::Float(f),
                Token::String(s) => Value::String(s),
                other => return Err(SyntaxError::new(format!("Unexpected {other}"), pos)),
            },
        };
        Ok(Positioned::new(value, pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(selection: &Positioned<Selection>) -> &Field {
        match &selection.node {
            Selection::Field(field) => field,
            other => panic!("expected a field, got {other:?}"),
        }
    }

    #[test]
    fn shorthand_query() {
        let doc = parse_query("{ hello }").unwrap();
        assert_eq!(doc.operations.len(), 1);
        let op = &doc.operations[0];
        assert_eq!(op.kind, OperationKind::Query);
        assert!(op.name.is_none());
        let hello = field(&op.selection_set.items[0]);
        assert_eq!(hello.name.node, "hello");
        assert_eq!(hello.name.pos, Pos { line: 1, column: 3 });
        assert!(hello.selection_set.is_none());
    }

    #[test]
    fn full_operation() {
        let doc = parse_query(
            r#"
            query Find($id: ID!, $tags: [String!] = ["a"]) @cached {
              found: book(id: $id, filter: {genre: FANTASY, tags: $tags}) {
                title
                ...Meta @include(if: true)
                ... on Book { year }
                ... @skip(if: false) { id }
              }
            }
            fragment Meta on Book { rating }
            "#,
        )
        .unwrap();
        let op = &doc.operations[0];
        assert_eq!(op.name.as_ref().unwrap().node, "Find");
        assert_eq!(op.variables.len(), 2);
        assert_eq!(op.variables[0].ty.node.to_string(), "ID!");
        assert_eq!(op.variables[1].ty.node.to_string(), "[String!]");
        assert!(op.variables[1].default_value.is_some());
        assert_eq!(op.directives[0].name.node, "cached");

        let book = field(&op.selection_set.items[0]);
        assert_eq!(book.response_key(), "found");
        assert_eq!(book.argument("id").unwrap().node, Value::Variable("id".into()));
        let items = &book.selection_set.as_ref().unwrap().items;
        assert_eq!(items.len(), 4);
        assert!(matches!(&items[1].node, Selection::FragmentSpread(s) if s.fragment_name.node == "Meta"));
        assert!(
            matches!(&items[2].node, Selection::InlineFragment(f) if f.type_condition.as_ref().unwrap().node == "Book")
        );
        assert!(matches!(&items[3].node, Selection::InlineFragment(f) if f.type_condition.is_none()));
        assert_eq!(doc.fragment("Meta").unwrap().type_condition.node, "Book");
    }

    #[test]
    fn syntax_errors_carry_positions() {
        let err = parse_query("{ hello").unwrap_err();
        assert_eq!(err.pos, Pos { line: 1, column: 8 });
        assert!(err.message.contains("<EOF>"), "{}", err.message);

        assert!(parse_query("").is_err());
        assert!(parse_query("{ }").is_err());
        assert!(parse_query("query ($x: Int = $y) { a }").is_err());
        assert!(parse_query("{ a(x: {k: 1, k: 2}) }").is_err());
        assert!(parse_query("fragment on on T { a }").is_err());
        assert!(parse_query("type Query { a: Int }").is_err());
    }

    #[test]
    fn depth_guard() {
        let deep = format!("{}{}", "{ a ".repeat(10), "}".repeat(10));
        assert!(parse_query_with_depth(&deep, 10).is_ok());
        let err = parse_query_with_depth(&deep, 9).unwrap_err();
        assert!(err.message.contains("maximum depth"), "{}", err.message);
    }
}
