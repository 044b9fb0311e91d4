//! Rewrites a continuation field's subtree into a standalone document.
//!
//! The document carries copies of every fragment the subtree spreads and
//! the definitions of every variable it references, so it can be executed
//! without the request it came from. Subtrees of identity-addressable types
//! are nested under a lookup field (`node(id: $id)` by default) so they can
//! be re-entered from the query root.

use crate::config::Lookup;
use crate::error::ContinuationError;
use crate::token::CONTINUATION_TYPE;
use gqlc_runtime::{ResolverInfo, TypeRef};
use gqlc_syntax::ast::{
    self, Argument, Definition, Directive, Document, FieldSelection, FragmentDefinition, Name,
    OperationDefinition, OperationType, Selection, SelectionSet, VariableDefinition,
};
use gqlc_syntax::Span;
use indexmap::IndexMap;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

/// Name of every extracted operation.
pub const OPERATION_NAME: &str = "ContinuationQuery";

/// How a subtree is re-entered from the query root.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeWrap {
    pub lookup: Lookup,
    /// Declared type of the lookup argument, used for the identifier variable.
    pub argument_type: ast::Type,
}

impl NodeWrap {
    pub fn new(lookup: Lookup, argument_type: &TypeRef) -> Self {
        Self {
            lookup,
            argument_type: ast_type(argument_type),
        }
    }
}

fn ast_type(ty: &TypeRef) -> ast::Type {
    match ty {
        TypeRef::Named(name) => ast::Type::named(name.clone()),
        TypeRef::List(inner) => ast::Type::List(Box::new(ast_type(inner)), Span::synthetic()),
        TypeRef::NonNull(inner) => ast_type(inner).non_null(),
    }
}

/// A standalone document for a continuation subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    pub document: Arc<Document>,
    /// Variables of the originating operation the document references.
    pub variable_names: Vec<String>,
    /// Variable that receives the node identifier, when wrapped.
    pub node_variable: Option<String>,
    /// Field to unwrap from the response, when wrapped.
    pub target_field: Option<String>,
}

/// Extracts the subquery for `selection_set`.
///
/// Fragments on `Continuation` are dropped only at the top of the subtree.
/// Nested ones are kept on purpose so that tokens issued inside the subquery
/// still carry their `continuationId`.
pub fn extract(
    selection_set: &SelectionSet,
    fragments: &IndexMap<String, FragmentDefinition>,
    variable_definitions: &[VariableDefinition],
    node: Option<&NodeWrap>,
) -> Result<Subquery, ContinuationError> {
    let mut extractor = Extractor {
        fragments,
        copied: IndexMap::new(),
        variables: Vec::new(),
        seen_variables: FxHashSet::default(),
    };
    let mut root = extractor.selection_set(selection_set, true)?;

    let has_typename = root
        .selections
        .iter()
        .any(|s| matches!(s, Selection::Field(field) if field.response_key() == "__typename"));
    if !has_typename {
        root.selections
            .insert(0, Selection::Field(FieldSelection::new("__typename")));
    }

    let mut definitions: Vec<VariableDefinition> = extractor
        .variables
        .iter()
        .filter_map(|name| {
            variable_definitions
                .iter()
                .find(|def| def.name.value == *name)
                .cloned()
        })
        .collect();

    let mut node_variable = None;
    let mut target_field = None;
    if let Some(node) = node {
        let mut variable = node.lookup.argument.clone();
        while extractor.seen_variables.contains(&variable) {
            variable.push('_');
        }
        definitions.push(VariableDefinition {
            name: Name::synthetic(variable.clone()),
            ty: node.argument_type.clone(),
            default_value: None,
            directives: Vec::new(),
            span: Span::synthetic(),
        });
        let lookup = FieldSelection::new(node.lookup.field.clone())
            .with_argument(node.lookup.argument.clone(), ast::Value::variable(variable.clone()))
            .with_selection_set(root);
        root = SelectionSet::new(vec![Selection::Field(lookup)]);
        node_variable = Some(variable);
        target_field = Some(node.lookup.field.clone());
    }

    let mut document_definitions: Vec<Definition> = extractor
        .copied
        .into_values()
        .map(Definition::Fragment)
        .collect();
    document_definitions.push(Definition::Operation(OperationDefinition {
        operation: OperationType::Query,
        name: Some(Name::synthetic(OPERATION_NAME)),
        variables: definitions,
        directives: Vec::new(),
        selection_set: root,
        span: Span::synthetic(),
    }));

    Ok(Subquery {
        document: Arc::new(Document {
            definitions: document_definitions,
            span: Span::synthetic(),
        }),
        variable_names: extractor.variables,
        node_variable,
        target_field,
    })
}

struct Extractor<'a> {
    fragments: &'a IndexMap<String, FragmentDefinition>,
    copied: IndexMap<String, FragmentDefinition>,
    variables: Vec<String>,
    seen_variables: FxHashSet<String>,
}

impl Extractor<'_> {
    /// Copies a selection set, recording the variables and fragments it uses.
    ///
    /// `Continuation` fragments are dropped only at the top of the subtree:
    /// deeper ones belong to nested continuation fields, whose tokens must
    /// keep their identifiers.
    fn selection_set(
        &mut self,
        set: &SelectionSet,
        top: bool,
    ) -> Result<SelectionSet, ContinuationError> {
        let mut selections = Vec::with_capacity(set.selections.len());
        for selection in &set.selections {
            match selection {
                Selection::Field(field) => {
                    self.arguments(&field.arguments);
                    self.directives(&field.directives);
                    let mut field = field.clone();
                    if let Some(sub) = &field.selection_set {
                        field.selection_set = Some(Arc::new(self.selection_set(sub, false)?));
                    }
                    selections.push(Selection::Field(field));
                }
                Selection::InlineFragment(inline) => {
                    let on_continuation = inline
                        .type_condition
                        .as_ref()
                        .is_some_and(|name| name.value == CONTINUATION_TYPE);
                    if top && on_continuation {
                        continue;
                    }
                    self.directives(&inline.directives);
                    let mut inline = inline.clone();
                    inline.selection_set = self.selection_set(&inline.selection_set, false)?;
                    selections.push(Selection::InlineFragment(inline));
                }
                Selection::FragmentSpread(spread) => {
                    let name = &spread.name.value;
                    let fragments = self.fragments;
                    let fragment = fragments
                        .get(name)
                        .ok_or_else(|| ContinuationError::UnknownFragment(name.clone()))?;
                    if top && fragment.type_condition.value == CONTINUATION_TYPE {
                        continue;
                    }
                    self.directives(&spread.directives);
                    self.copy_fragment(fragment)?;
                    selections.push(selection.clone());
                }
            }
        }
        Ok(SelectionSet {
            selections,
            span: set.span,
        })
    }

    fn copy_fragment(&mut self, fragment: &FragmentDefinition) -> Result<(), ContinuationError> {
        let name = &fragment.name.value;
        if self.copied.contains_key(name) {
            return Ok(());
        }
        // Reserve the slot first so cyclic spreads terminate.
        self.copied.insert(name.clone(), fragment.clone());
        self.directives(&fragment.directives);
        let selection_set = self.selection_set(&fragment.selection_set, false)?;
        if let Some(copy) = self.copied.get_mut(name) {
            copy.selection_set = selection_set;
        }
        Ok(())
    }

    fn arguments(&mut self, arguments: &[Argument]) {
        for argument in arguments {
            argument.value.for_each_variable(&mut |name| {
                if self.seen_variables.insert(name.to_string()) {
                    self.variables.push(name.to_string());
                }
            });
        }
    }

    fn directives(&mut self, directives: &[Directive]) {
        for directive in directives {
            self.arguments(&directive.arguments);
        }
    }
}

#[derive(Default)]
struct SubqueryCache(Mutex<FxHashMap<(usize, String), (Arc<SelectionSet>, Arc<Subquery>)>>);

/// Extracts the subquery of the field described by `info`, once per execution.
///
/// Results are keyed by the address of the field's selection set and the
/// parent type. The cache holds the selection set, so its address cannot be
/// reused while the entry exists.
pub fn extract_for_field(
    info: &ResolverInfo,
    node: Option<&NodeWrap>,
) -> Result<Arc<Subquery>, ContinuationError> {
    let selection_set = info
        .selection_set
        .as_ref()
        .ok_or_else(|| ContinuationError::MissingSelectionSet(info.field_name.clone()))?;
    let key = (Arc::as_ptr(selection_set) as usize, info.parent_type.clone());

    let cache = info.scope.extension_or_insert_with(SubqueryCache::default);
    if let Some((_, subquery)) = cache.0.lock().get(&key) {
        return Ok(Arc::clone(subquery));
    }

    let subquery = Arc::new(extract(
        selection_set,
        &info.fragments,
        &info.variable_definitions,
        node,
    )?);
    cache
        .0
        .lock()
        .insert(key, (Arc::clone(selection_set), Arc::clone(&subquery)));
    Ok(subquery)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gqlc_syntax::{parse, print};

    struct Fixture {
        selection_set: Arc<SelectionSet>,
        fragments: IndexMap<String, FragmentDefinition>,
        variables: Vec<VariableDefinition>,
    }

    /// Finds the first field named `continuation`, depth first.
    fn continuation_field(set: &SelectionSet) -> Option<&FieldSelection> {
        set.selections.iter().find_map(|selection| match selection {
            Selection::Field(field) if field.name.value == "continuation" => Some(field),
            Selection::Field(field) => field
                .selection_set
                .as_deref()
                .and_then(continuation_field),
            _ => None,
        })
    }

    fn fixture(source: &str) -> Fixture {
        let document = parse(source).unwrap();
        let operation = document.operation(None).unwrap();
        let field = continuation_field(&operation.selection_set).unwrap();
        Fixture {
            selection_set: field.selection_set.clone().unwrap(),
            fragments: document
                .fragments()
                .map(|f| (f.name.value.clone(), f.clone()))
                .collect(),
            variables: operation.variables.clone(),
        }
    }

    fn node_wrap() -> NodeWrap {
        NodeWrap::new(Lookup::default(), &TypeRef::required("ID"))
    }

    #[test]
    fn test_query_subtree() {
        let f = fixture(
            r"
            query Q($testArg: Int!, $unused: String) {
              continuation {
                ...ContinuationFields
                ... on Continuation { continuationId }
                ...QueryFields
                remoteStats { data testArg(testArg: $testArg) }
              }
            }
            fragment ContinuationFields on Continuation { continuationId }
            fragment QueryFields on Query { viewer { name } }
            ",
        );
        let subquery = extract(&f.selection_set, &f.fragments, &f.variables, None).unwrap();

        assert_eq!(subquery.variable_names, vec!["testArg".to_string()]);
        assert_eq!(subquery.target_field, None);
        insta::assert_snapshot!(print(&subquery.document), @r"
        fragment QueryFields on Query {
          viewer {
            name
          }
        }

        query ContinuationQuery($testArg: Int!) {
          __typename
          ...QueryFields
          remoteStats {
            data
            testArg(testArg: $testArg)
          }
        }
        ");
    }

    #[test]
    fn test_node_subtree_is_wrapped() {
        let f = fixture(
            r"
            query Q($withError: Boolean = false) {
              viewer {
                continuation(waitMs: 10) {
                  ... on User {
                    remoteProfile(simulateDelayMax: 50) {
                      data
                      errorField @include(if: $withError)
                    }
                  }
                }
              }
            }
            ",
        );
        let subquery =
            extract(&f.selection_set, &f.fragments, &f.variables, Some(&node_wrap())).unwrap();

        assert_eq!(subquery.target_field.as_deref(), Some("node"));
        assert_eq!(subquery.node_variable.as_deref(), Some("id"));
        assert_eq!(subquery.variable_names, vec!["withError".to_string()]);
        insta::assert_snapshot!(print(&subquery.document), @r"
        query ContinuationQuery($withError: Boolean = false, $id: ID!) {
          node(id: $id) {
            __typename
            ... on User {
              remoteProfile(simulateDelayMax: 50) {
                data
                errorField @include(if: $withError)
              }
            }
          }
        }
        ");
    }

    #[test]
    fn test_identifier_variable_avoids_collisions() {
        let f = fixture(
            r"
            query Q($id: ID!) {
              viewer { continuation { friend(id: $id) { name } } }
            }
            ",
        );
        let subquery =
            extract(&f.selection_set, &f.fragments, &f.variables, Some(&node_wrap())).unwrap();
        assert_eq!(subquery.node_variable.as_deref(), Some("id_"));
        let printed = print(&subquery.document);
        assert!(printed.contains("query ContinuationQuery($id: ID!, $id_: ID!)"));
        assert!(printed.contains("node(id: $id_)"));
    }

    #[test]
    fn test_existing_typename_is_kept() {
        let f = fixture("{ continuation { __typename remoteStats { data } } }");
        let subquery = extract(&f.selection_set, &f.fragments, &f.variables, None).unwrap();
        assert_eq!(print(&subquery.document).matches("__typename").count(), 1);
    }

    #[test]
    fn test_nested_continuation_fragments_are_kept() {
        let f = fixture(
            r"
            query Q {
              continuation {
                ...ContinuationFields
                viewer { continuation { ...ContinuationFields ...UserFields } }
              }
            }
            fragment ContinuationFields on Continuation { continuationId }
            fragment UserFields on User { name ...UserFields }
            ",
        );
        let subquery = extract(&f.selection_set, &f.fragments, &f.variables, None).unwrap();
        let names: Vec<_> = subquery.document.fragments().map(|f| f.name.value.as_str()).collect();
        assert_eq!(names, vec!["ContinuationFields", "UserFields"]);
    }

    #[test]
    fn test_unknown_fragment_is_an_error() {
        let f = fixture("{ continuation { ...Missing } }");
        let error = extract(&f.selection_set, &f.fragments, &f.variables, None).unwrap_err();
        assert_eq!(error, ContinuationError::UnknownFragment("Missing".into()));
    }

    #[test]
    fn test_extraction_is_cached_per_execution() {
        let f = fixture("{ continuation { remoteStats { data } } }");
        let info = ResolverInfo::new("continuation", "Query")
            .with_selection_set(Arc::clone(&f.selection_set));
        let first = extract_for_field(&info, None).unwrap();
        let second = extract_for_field(&info, None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other_scope = ResolverInfo::new("continuation", "Query")
            .with_selection_set(Arc::clone(&f.selection_set));
        assert!(!Arc::ptr_eq(&first, &extract_for_field(&other_scope, None).unwrap()));
    }

    #[test]
    fn test_leaf_field_is_an_error() {
        let info = ResolverInfo::new("continuation", "Query");
        assert_eq!(
            extract_for_field(&info, None).unwrap_err(),
            ContinuationError::MissingSelectionSet("continuation".into())
        );
    }
}
