//! Recursive descent parser for executable GraphQL documents.

use std::sync::Arc;

use crate::ast::*;
use crate::error::{codes, SyntaxError, SyntaxResult};
use crate::lexer::{block_string_value, string_value, Lexer};
use crate::span::Span;
use crate::token::{Token, TokenKind};

/// Parser for query documents.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    prev_end: u32,
}

/// Parses a source string into a document.
pub fn parse(source: &str) -> SyntaxResult<Document> {
    Parser::new(source).parse_document()
}

impl<'a> Parser<'a> {
    /// Creates a new parser.
    pub fn new(source: &'a str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        Self {
            lexer,
            current,
            prev_end: 0,
        }
    }

    #[inline]
    fn at(&self) -> TokenKind {
        self.current.kind
    }

    #[inline]
    fn at_kind(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn advance(&mut self) {
        self.prev_end = self.current.span.end;
        self.current = self.lexer.next_token();
    }

    fn expect(&mut self, kind: TokenKind) -> SyntaxResult<()> {
        if self.at_kind(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(kind.as_str()))
        }
    }

    fn current_text(&self) -> &'a str {
        self.lexer.span_text(self.current.span)
    }

    fn span_from(&self, start: u32) -> Span {
        Span::new(start, self.prev_end.max(start))
    }

    /// Builds an error for the current token.
    fn unexpected(&self, expected: &str) -> SyntaxError {
        match self.at() {
            TokenKind::Error if self.current_text().starts_with('"') => SyntaxError::new(
                codes::UNTERMINATED_STRING,
                "unterminated string",
                self.current.span,
            ),
            TokenKind::Error
                if self
                    .current_text()
                    .starts_with(|c: char| c == '-' || c.is_ascii_digit()) =>
            {
                SyntaxError::new(
                    codes::INVALID_NUMBER,
                    format!("invalid number `{}`", self.current_text()),
                    self.current.span,
                )
            }
            TokenKind::Error => SyntaxError::new(
                codes::INVALID_CHARACTER,
                format!("unexpected character `{}`", self.current_text()),
                self.current.span,
            ),
            found => SyntaxError::new(
                codes::UNEXPECTED_TOKEN,
                format!("expected {expected}, found {found}"),
                self.current.span,
            ),
        }
    }

    /// Parses a document.
    pub fn parse_document(&mut self) -> SyntaxResult<Document> {
        let start = self.current.span.start;
        let mut definitions = Vec::new();

        while !self.at_kind(TokenKind::Eof) {
            definitions.push(self.parse_definition()?);
        }

        if definitions.is_empty() {
            return Err(SyntaxError::new(
                codes::EMPTY_DOCUMENT,
                "document contains no definitions",
                self.current.span,
            ));
        }

        Ok(Document {
            definitions,
            span: self.span_from(start),
        })
    }

    fn parse_definition(&mut self) -> SyntaxResult<Definition> {
        match self.at() {
            TokenKind::Query | TokenKind::Mutation | TokenKind::Subscription | TokenKind::LBrace => {
                Ok(Definition::Operation(self.parse_operation()?))
            }
            TokenKind::Fragment => Ok(Definition::Fragment(self.parse_fragment_definition()?)),
            _ => Err(self.unexpected("definition")),
        }
    }

    fn parse_name(&mut self) -> SyntaxResult<Name> {
        if self.at_kind(TokenKind::Name) || self.at().is_keyword() {
            let name = Name::new(self.current_text(), self.current.span);
            self.advance();
            Ok(name)
        } else {
            Err(self.unexpected("name"))
        }
    }

    fn parse_operation(&mut self) -> SyntaxResult<OperationDefinition> {
        let start = self.current.span.start;

        if self.at_kind(TokenKind::LBrace) {
            let selection_set = self.parse_selection_set()?;
            return Ok(OperationDefinition {
                operation: OperationType::Query,
                name: None,
                variables: Vec::new(),
                directives: Vec::new(),
                selection_set,
                span: self.span_from(start),
            });
        }

        let operation = match self.at() {
            TokenKind::Mutation => OperationType::Mutation,
            TokenKind::Subscription => OperationType::Subscription,
            _ => OperationType::Query,
        };
        self.advance();

        let name = if self.at_kind(TokenKind::Name) || self.at().is_keyword() {
            Some(self.parse_name()?)
        } else {
            None
        };

        let variables = if self.at_kind(TokenKind::LParen) {
            self.advance();
            let mut vars = Vec::new();
            while !self.at_kind(TokenKind::RParen) {
                vars.push(self.parse_variable_definition()?);
            }
            self.expect(TokenKind::RParen)?;
            vars
        } else {
            Vec::new()
        };

        let directives = self.parse_directives(false)?;
        let selection_set = self.parse_selection_set()?;

        Ok(OperationDefinition {
            operation,
            name,
            variables,
            directives,
            selection_set,
            span: self.span_from(start),
        })
    }

    fn parse_variable_definition(&mut self) -> SyntaxResult<VariableDefinition> {
        let start = self.current.span.start;
        self.expect(TokenKind::Dollar)?;
        let name = self.parse_name()?;
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type()?;

        let default_value = if self.at_kind(TokenKind::Eq) {
            self.advance();
            Some(self.parse_value(true)?)
        } else {
            None
        };

        let directives = self.parse_directives(true)?;

        Ok(VariableDefinition {
            name,
            ty,
            default_value,
            directives,
            span: self.span_from(start),
        })
    }

    fn parse_type(&mut self) -> SyntaxResult<Type> {
        let start = self.current.span.start;

        let ty = if self.at_kind(TokenKind::LBracket) {
            self.advance();
            let inner = self.parse_type()?;
            self.expect(TokenKind::RBracket)?;
            Type::List(Box::new(inner), self.span_from(start))
        } else {
            Type::Named(self.parse_name()?)
        };

        if self.at_kind(TokenKind::Bang) {
            self.advance();
            Ok(Type::NonNull(Box::new(ty), self.span_from(start)))
        } else {
            Ok(ty)
        }
    }

    fn parse_fragment_definition(&mut self) -> SyntaxResult<FragmentDefinition> {
        let start = self.current.span.start;
        self.advance(); // fragment

        if self.at_kind(TokenKind::On) {
            return Err(self.unexpected("fragment name"));
        }
        let name = self.parse_name()?;
        self.expect(TokenKind::On)?;
        let type_condition = self.parse_name()?;
        let directives = self.parse_directives(false)?;
        let selection_set = self.parse_selection_set()?;

        Ok(FragmentDefinition {
            name,
            type_condition,
            directives,
            selection_set,
            span: self.span_from(start),
        })
    }

    fn parse_selection_set(&mut self) -> SyntaxResult<SelectionSet> {
        let start = self.current.span.start;
        self.expect(TokenKind::LBrace)?;

        let mut selections = Vec::new();
        while !self.at_kind(TokenKind::RBrace) {
            if self.at_kind(TokenKind::Eof) {
                return Err(self.unexpected("}"));
            }
            selections.push(self.parse_selection()?);
        }
        self.expect(TokenKind::RBrace)?;

        if selections.is_empty() {
            return Err(SyntaxError::new(
                codes::UNEXPECTED_TOKEN,
                "selection set must not be empty",
                self.span_from(start),
            ));
        }

        Ok(SelectionSet {
            selections,
            span: self.span_from(start),
        })
    }

    fn parse_selection(&mut self) -> SyntaxResult<Selection> {
        if !self.at_kind(TokenKind::Spread) {
            return Ok(Selection::Field(self.parse_field_selection()?));
        }

        let start = self.current.span.start;
        self.advance(); // ...

        if self.at_kind(TokenKind::On) {
            self.advance();
            let type_condition = Some(self.parse_name()?);
            let directives = self.parse_directives(false)?;
            let selection_set = self.parse_selection_set()?;
            Ok(Selection::InlineFragment(InlineFragment {
                type_condition,
                directives,
                selection_set,
                span: self.span_from(start),
            }))
        } else if self.at_kind(TokenKind::LBrace) || self.at_kind(TokenKind::At) {
            let directives = self.parse_directives(false)?;
            let selection_set = self.parse_selection_set()?;
            Ok(Selection::InlineFragment(InlineFragment {
                type_condition: None,
                directives,
                selection_set,
                span: self.span_from(start),
            }))
        } else {
            let name = self.parse_name()?;
            let directives = self.parse_directives(false)?;
            Ok(Selection::FragmentSpread(FragmentSpread {
                name,
                directives,
                span: self.span_from(start),
            }))
        }
    }

    fn parse_field_selection(&mut self) -> SyntaxResult<FieldSelection> {
        let start = self.current.span.start;

        let first_name = self.parse_name()?;
        let (alias, name) = if self.at_kind(TokenKind::Colon) {
            self.advance();
            (Some(first_name), self.parse_name()?)
        } else {
            (None, first_name)
        };

        let arguments = self.parse_arguments(false)?;
        let directives = self.parse_directives(false)?;

        let selection_set = if self.at_kind(TokenKind::LBrace) {
            Some(Arc::new(self.parse_selection_set()?))
        } else {
            None
        };

        Ok(FieldSelection {
            alias,
            name,
            arguments,
            directives,
            selection_set,
            span: self.span_from(start),
        })
    }

    fn parse_directives(&mut self, is_const: bool) -> SyntaxResult<Vec<Directive>> {
        let mut directives = Vec::new();
        while self.at_kind(TokenKind::At) {
            let start = self.current.span.start;
            self.advance(); // @
            let name = self.parse_name()?;
            let arguments = self.parse_arguments(is_const)?;
            directives.push(Directive {
                name,
                arguments,
                span: self.span_from(start),
            });
        }
        Ok(directives)
    }

    fn parse_arguments(&mut self, is_const: bool) -> SyntaxResult<Vec<Argument>> {
        if !self.at_kind(TokenKind::LParen) {
            return Ok(Vec::new());
        }
        self.advance();

        let mut args = Vec::new();
        while !self.at_kind(TokenKind::RParen) {
            let start = self.current.span.start;
            let name = self.parse_name()?;
            self.expect(TokenKind::Colon)?;
            let value = self.parse_value(is_const)?;
            args.push(Argument {
                name,
                value,
                span: self.span_from(start),
            });
        }
        self.expect(TokenKind::RParen)?;

        if args.is_empty() {
            return Err(self.unexpected("argument"));
        }
        Ok(args)
    }

    /// Parses a value. Variables are rejected in constant positions.
    fn parse_value(&mut self, is_const: bool) -> SyntaxResult<Value> {
        let start = self.current.span.start;

        match self.at() {
            TokenKind::Dollar if !is_const => {
                self.advance();
                Ok(Value::Variable(self.parse_name()?))
            }
            TokenKind::IntLiteral => {
                let value = self.current_text().parse().map_err(|_| {
                    SyntaxError::new(
                        codes::INVALID_NUMBER,
                        format!("integer `{}` is out of range", self.current_text()),
                        self.current.span,
                    )
                })?;
                self.advance();
                Ok(Value::Int(value, self.span_from(start)))
            }
            TokenKind::FloatLiteral => {
                let value = self.current_text().parse().map_err(|_| {
                    SyntaxError::new(
                        codes::INVALID_NUMBER,
                        format!("invalid float `{}`", self.current_text()),
                        self.current.span,
                    )
                })?;
                self.advance();
                Ok(Value::Float(value, self.span_from(start)))
            }
            TokenKind::StringLiteral => {
                let value = string_value(self.current_text()).ok_or_else(|| {
                    SyntaxError::new(
                        codes::UNTERMINATED_STRING,
                        "invalid escape sequence in string",
                        self.current.span,
                    )
                })?;
                self.advance();
                Ok(Value::String(value, self.span_from(start)))
            }
            TokenKind::BlockStringLiteral => {
                let value = block_string_value(self.current_text());
                self.advance();
                Ok(Value::String(value, self.span_from(start)))
            }
            TokenKind::True => {
                self.advance();
                Ok(Value::Boolean(true, self.span_from(start)))
            }
            TokenKind::False => {
                self.advance();
                Ok(Value::Boolean(false, self.span_from(start)))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Value::Null(self.span_from(start)))
            }
            TokenKind::LBracket => {
                self.advance();
                let mut values = Vec::new();
                while !self.at_kind(TokenKind::RBracket) {
                    values.push(self.parse_value(is_const)?);
                }
                self.expect(TokenKind::RBracket)?;
                Ok(Value::List(values, self.span_from(start)))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut fields = Vec::new();
                while !self.at_kind(TokenKind::RBrace) {
                    let name = self.parse_name()?;
                    self.expect(TokenKind::Colon)?;
                    let value = self.parse_value(is_const)?;
                    fields.push((name, value));
                }
                self.expect(TokenKind::RBrace)?;
                Ok(Value::Object(fields, self.span_from(start)))
            }
            TokenKind::Name
            | TokenKind::Query
            | TokenKind::Mutation
            | TokenKind::Subscription
            | TokenKind::Fragment
            | TokenKind::On => Ok(Value::Enum(self.parse_name()?)),
            _ => Err(self.unexpected("value")),
        }
    }
}
