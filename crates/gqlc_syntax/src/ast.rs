//! Owned AST for executable GraphQL documents.
//!
//! Nodes own their strings so documents can be shared across tasks and cached.
//! Field sub-selections are reference counted: a selection set keeps a stable
//! identity for as long as any document or copy refers to it.

use std::fmt;
use std::sync::Arc;

use crate::span::Span;

/// A query document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub definitions: Vec<Definition>,
    pub span: Span,
}

impl Document {
    /// Returns the operations in this document.
    pub fn operations(&self) -> impl Iterator<Item = &OperationDefinition> {
        self.definitions.iter().filter_map(|def| match def {
            Definition::Operation(op) => Some(op),
            Definition::Fragment(_) => None,
        })
    }

    /// Returns the fragment definitions in this document.
    pub fn fragments(&self) -> impl Iterator<Item = &FragmentDefinition> {
        self.definitions.iter().filter_map(|def| match def {
            Definition::Fragment(frag) => Some(frag),
            Definition::Operation(_) => None,
        })
    }

    /// Finds a fragment definition by name.
    #[must_use]
    pub fn fragment(&self, name: &str) -> Option<&FragmentDefinition> {
        self.fragments().find(|frag| frag.name.value == name)
    }

    /// Selects the operation to run.
    ///
    /// With no name the document must contain exactly one operation.
    #[must_use]
    pub fn operation(&self, name: Option<&str>) -> Option<&OperationDefinition> {
        match name {
            Some(name) => self
                .operations()
                .find(|op| op.name.as_ref().is_some_and(|n| n.value == name)),
            None => {
                let mut ops = self.operations();
                let first = ops.next()?;
                ops.next().is_none().then_some(first)
            }
        }
    }
}

/// Top-level definition.
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    Operation(OperationDefinition),
    Fragment(FragmentDefinition),
}

/// Operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
}

impl OperationType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }
}

/// Operation definition.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationDefinition {
    pub operation: OperationType,
    pub name: Option<Name>,
    pub variables: Vec<VariableDefinition>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
    pub span: Span,
}

/// Variable definition.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: Name,
    pub ty: Type,
    pub default_value: Option<Value>,
    pub directives: Vec<Directive>,
    pub span: Span,
}

/// Fragment definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentDefinition {
    pub name: Name,
    pub type_condition: Name,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
    pub span: Span,
}

/// Selection set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectionSet {
    pub selections: Vec<Selection>,
    pub span: Span,
}

impl SelectionSet {
    /// Creates a selection set from selections.
    #[must_use]
    pub fn new(selections: Vec<Selection>) -> Self {
        Self {
            selections,
            span: Span::synthetic(),
        }
    }
}

/// Selection.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(FieldSelection),
    FragmentSpread(FragmentSpread),
    InlineFragment(InlineFragment),
}

/// Field selection.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSelection {
    pub alias: Option<Name>,
    pub name: Name,
    pub arguments: Vec<Argument>,
    pub directives: Vec<Directive>,
    pub selection_set: Option<Arc<SelectionSet>>,
    pub span: Span,
}

impl FieldSelection {
    /// Creates a bare field selection.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            alias: None,
            name: Name::synthetic(name),
            arguments: Vec::new(),
            directives: Vec::new(),
            selection_set: None,
            span: Span::synthetic(),
        }
    }

    /// Adds an argument.
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.push(Argument {
            name: Name::synthetic(name),
            value,
            span: Span::synthetic(),
        });
        self
    }

    /// Sets the sub-selection.
    #[must_use]
    pub fn with_selection_set(mut self, selection_set: SelectionSet) -> Self {
        self.selection_set = Some(Arc::new(selection_set));
        self
    }

    /// The key this field occupies in a response object.
    #[must_use]
    pub fn response_key(&self) -> &str {
        self.alias.as_ref().map_or(&self.name.value, |a| &a.value)
    }
}

/// Fragment spread.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentSpread {
    pub name: Name,
    pub directives: Vec<Directive>,
    pub span: Span,
}

/// Inline fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineFragment {
    pub type_condition: Option<Name>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
    pub span: Span,
}

/// Directive usage.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: Name,
    pub arguments: Vec<Argument>,
    pub span: Span,
}

/// Argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: Name,
    pub value: Value,
    pub span: Span,
}

/// Input value literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Variable(Name),
    Int(i64, Span),
    Float(f64, Span),
    String(String, Span),
    Boolean(bool, Span),
    Null(Span),
    Enum(Name),
    List(Vec<Value>, Span),
    Object(Vec<(Name, Value)>, Span),
}

impl Value {
    /// Creates a variable reference.
    #[must_use]
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(Name::synthetic(name))
    }

    /// Calls `f` for every variable referenced by this value, including nested ones.
    pub fn for_each_variable<'v>(&'v self, f: &mut impl FnMut(&'v str)) {
        match self {
            Self::Variable(name) => f(&name.value),
            Self::List(items, _) => items.iter().for_each(|item| item.for_each_variable(f)),
            Self::Object(fields, _) => fields
                .iter()
                .for_each(|(_, value)| value.for_each_variable(f)),
            _ => {}
        }
    }
}

/// Type reference in a variable definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Named(Name),
    List(Box<Type>, Span),
    NonNull(Box<Type>, Span),
}

impl Type {
    /// Creates a named type.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(Name::synthetic(name))
    }

    /// Wraps this type as non-null.
    #[must_use]
    pub fn non_null(self) -> Self {
        Self::NonNull(Box::new(self), Span::synthetic())
    }

    /// Returns true for non-null types.
    #[must_use]
    pub const fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(..))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{}", name.value),
            Self::List(inner, _) => write!(f, "[{inner}]"),
            Self::NonNull(inner, _) => write!(f, "{inner}!"),
        }
    }
}

/// Name with span.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name {
    pub value: String,
    pub span: Span,
}

impl Name {
    pub fn new(value: impl Into<String>, span: Span) -> Self {
        Self {
            value: value.into(),
            span,
        }
    }

    /// Creates a name that does not come from source text.
    pub fn synthetic(value: impl Into<String>) -> Self {
        Self::new(value, Span::synthetic())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}
