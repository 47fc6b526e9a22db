//! The context stack (spec §4.4 "Context stack"): every nested scope of a
//! query (subqueries, `GROUP BY`, triple blocks) owns one node here, linked
//! to its parent by index rather than by reference, so the compiler can
//! walk up to "the nearest enclosing `SELECT`" without fighting the
//! borrow checker over a tree of owned parents.

use std::collections::HashSet;

use rustc_hash::FxHashMap;

use crate::binding::Binding;
use crate::data_table::DataTable;
use crate::path::PathArena;

/// Handle to a node in a [`ContextStack`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(usize);

#[derive(Debug, Default)]
pub struct SelectContextData {
    /// Ordered, positional literal/parameter bindings; only populated on
    /// the root `SELECT` context (spec invariant: every literal is appended
    /// to the *root*'s array, regardless of how deeply nested the
    /// expression that introduced it is).
    pub literal_bindings: Vec<Binding>,
    pub generated_variable_counter: u32,
    pub table_counter: u32,
    pub path_elements: PathArena,
    /// De-duplicates `UNION` views the graph resolver has already emitted
    /// for a given (graph pattern, access-mode) pair within this query.
    pub union_views: HashSet<(String, String)>,
    /// `WITH RECURSIVE` members the property path engine needs hoisted to
    /// this query's top-level `WITH` clause.
    pub ctes: Vec<(String, String)>,
}

impl SelectContextData {
    pub fn register_ctes(&mut self, ctes: Vec<(String, String)>) {
        self.ctes.extend(ctes);
    }
}

#[derive(Debug, Default)]
pub struct TripleContextData {
    pub sql_tables: Vec<DataTable>,
    pub variable_bindings: FxHashMap<String, Vec<Binding>>,
}

#[derive(Debug)]
pub enum ContextKind {
    Select(SelectContextData),
    Triple(TripleContextData),
    Plain,
}

#[derive(Debug)]
struct ContextNode {
    parent: Option<ContextId>,
    variable_set: HashSet<String>,
    kind: ContextKind,
}

/// Owns every [`ContextNode`] produced while compiling one query.
#[derive(Debug)]
pub struct ContextStack {
    nodes: Vec<ContextNode>,
    current: ContextId,
}

impl ContextStack {
    /// Starts a new stack with a single root `SELECT` context current.
    pub fn new() -> Self {
        Self {
            nodes: vec![ContextNode {
                parent: None,
                variable_set: HashSet::new(),
                kind: ContextKind::Select(SelectContextData::default()),
            }],
            current: ContextId(0),
        }
    }

    pub fn root(&self) -> ContextId {
        ContextId(0)
    }

    pub fn current(&self) -> ContextId {
        self.current
    }

    pub fn push(&mut self, kind: ContextKind) -> ContextId {
        let parent = Some(self.current);
        self.nodes.push(ContextNode { parent, variable_set: HashSet::new(), kind });
        let id = ContextId(self.nodes.len() - 1);
        self.current = id;
        id
    }

    /// Restores `current` to `id`'s parent. Panics if `id` is the root,
    /// which has none — a compiler bug, not a runtime condition.
    pub fn pop_to_parent_of(&mut self, id: ContextId) {
        self.current = self.nodes[id.0].parent.expect("cannot pop the root context");
    }

    pub fn declare_variable(&mut self, at: ContextId, name: impl Into<String>) {
        self.nodes[at.0].variable_set.insert(name.into());
    }

    pub fn is_declared(&self, at: ContextId, name: &str) -> bool {
        self.nodes[at.0].variable_set.contains(name)
    }

    /// Walks from `from` up to the root, looking for `name` declared along
    /// the way. Variables are visible to every descendant of the scope
    /// that declares them.
    pub fn resolve_declaring_scope(&self, from: ContextId, name: &str) -> Option<ContextId> {
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            if self.nodes[id.0].variable_set.contains(name) {
                return Some(id);
            }
            cursor = self.nodes[id.0].parent;
        }
        None
    }

    /// The nearest ancestor of `from` (inclusive) that is a `SELECT`
    /// context, i.e. the scope that owns a fresh sub-query's variables.
    pub fn nearest_select(&self, from: ContextId) -> ContextId {
        let mut cursor = from;
        loop {
            if matches!(self.nodes[cursor.0].kind, ContextKind::Select(_)) {
                return cursor;
            }
            cursor = self.nodes[cursor.0].parent.expect("no enclosing SELECT context");
        }
    }

    /// The nearest ancestor of `from` (inclusive) that is a triple-block
    /// context, i.e. the scope a resolved predicate/table should be
    /// attached to.
    pub fn nearest_triple(&self, from: ContextId) -> ContextId {
        let mut cursor = from;
        loop {
            if matches!(self.nodes[cursor.0].kind, ContextKind::Triple(_)) {
                return cursor;
            }
            cursor = self.nodes[cursor.0].parent.expect("no enclosing triple context");
        }
    }

    /// The root `SELECT` context, which owns the query's one positional
    /// bindings array.
    pub fn root_select(&self) -> ContextId {
        self.root()
    }

    pub fn select_mut(&mut self, id: ContextId) -> &mut SelectContextData {
        match &mut self.nodes[id.0].kind {
            ContextKind::Select(data) => data,
            _ => panic!("context {} is not a SELECT context", id.0),
        }
    }

    pub fn select(&self, id: ContextId) -> &SelectContextData {
        match &self.nodes[id.0].kind {
            ContextKind::Select(data) => data,
            _ => panic!("context {} is not a SELECT context", id.0),
        }
    }

    pub fn triple_mut(&mut self, id: ContextId) -> &mut TripleContextData {
        match &mut self.nodes[id.0].kind {
            ContextKind::Triple(data) => data,
            _ => panic!("context {} is not a triple context", id.0),
        }
    }

    pub fn triple(&self, id: ContextId) -> &TripleContextData {
        match &self.nodes[id.0].kind {
            ContextKind::Triple(data) => data,
            _ => panic!("context {} is not a triple context", id.0),
        }
    }

    /// Registers a literal or parameter binding against the root `SELECT`
    /// context and returns its `?N` placeholder text.
    pub fn bind_literal(&mut self, mut binding: Binding) -> String {
        let root = self.root_select();
        let data = self.select_mut(root);
        let placeholder = format!("?{}", data.literal_bindings.len() + 1);
        match &mut binding {
            Binding::Literal(lit) => lit.placeholder = placeholder.clone(),
            Binding::Parameter(param) => param.placeholder = placeholder.clone(),
            Binding::Variable(_) => {}
        }
        data.literal_bindings.push(binding);
        placeholder
    }

    pub fn fresh_variable_name(&mut self, at: ContextId) -> String {
        let select = self.nearest_select(at);
        let data = self.select_mut(select);
        data.generated_variable_counter += 1;
        format!("_rdfsql_gen_{}", data.generated_variable_counter)
    }

    pub fn fresh_table_alias(&mut self, at: ContextId) -> String {
        let select = self.nearest_select(at);
        let data = self.select_mut(select);
        data.table_counter += 1;
        format!("t{}", data.table_counter)
    }
}

impl Default for ContextStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_variable_visible_to_descendant_scope() {
        let mut stack = ContextStack::new();
        let root = stack.current();
        stack.declare_variable(root, "x");
        let child = stack.push(ContextKind::Triple(TripleContextData::default()));
        assert_eq!(stack.resolve_declaring_scope(child, "x"), Some(root));
        stack.pop_to_parent_of(child);
        assert_eq!(stack.current(), root);
    }

    #[test]
    fn literal_bindings_always_land_on_the_root_select() {
        let mut stack = ContextStack::new();
        let child = stack.push(ContextKind::Select(SelectContextData::default()));
        stack.current = child;
        let placeholder = stack.bind_literal(Binding::Parameter(crate::binding::ParameterBinding {
            name: "p".into(),
            placeholder: String::new(),
        }));
        assert_eq!(placeholder, "?1");
        assert_eq!(stack.select(stack.root_select()).literal_bindings.len(), 1);
    }

    #[test]
    fn table_aliases_are_unique_per_query() {
        let mut stack = ContextStack::new();
        let root = stack.current();
        assert_eq!(stack.fresh_table_alias(root), "t1");
        assert_eq!(stack.fresh_table_alias(root), "t2");
    }
}
