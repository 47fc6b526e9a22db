//! The graph resolver (spec §4.6 "Resolve the active graph"): turns a
//! pattern's `GRAPH` clause (or the dataset's `FROM`/`FROM NAMED` clauses)
//! into either a fixed graph id or a `WHERE` predicate over a table's
//! `graph` column.
//!
//! Grounded on `ActiveGraph` from the DataFusion lineage this crate
//! descends from: the four cases there (default graph only, all graphs,
//! an explicit `FROM`/`FROM NAMED` union, any named graph) are exactly the
//! four a SQL `WHERE` clause needs to special-case.

use rdfsql_model::{GraphName, Variable};

use crate::error::{CompileError, CompileResult};

/// The security policy's graph superset (spec §4.6 `policy.graphs`): `None`
/// is unrestricted, `Some` is the exhaustive list of graphs a caller may
/// read or write at all, independent of any dataset clause.
#[derive(Clone, Debug, Default)]
pub struct GraphPolicy {
    pub graphs: Option<Vec<GraphName>>,
}

impl GraphPolicy {
    pub fn unrestricted() -> Self {
        Self { graphs: None }
    }

    pub fn restricted(graphs: Vec<GraphName>) -> Self {
        Self { graphs: Some(graphs) }
    }

    pub fn permits(&self, graph: &GraphName) -> bool {
        self.graphs.as_ref().is_none_or(|allowed| allowed.contains(graph))
    }
}

/// Narrows `active` to `policy`'s superset (spec §4.6 `get_graphs`: "the
/// filtered intersection of the storage layer's graph list with
/// `policy.graphs`"). An explicit dataset graph the policy doesn't admit is
/// a hard failure rather than a silent narrowing, since `FROM <g>` on a
/// graph the caller has no access to should surface as disallowed, not
/// quietly compile to an empty result.
pub fn apply_policy(active: ActiveGraph, policy: &GraphPolicy) -> CompileResult<ActiveGraph> {
    let Some(allowed) = &policy.graphs else { return Ok(active) };
    match active {
        ActiveGraph::DefaultGraph => Ok(ActiveGraph::DefaultGraph),
        ActiveGraph::AllGraphs | ActiveGraph::AnyNamedGraph => Ok(ActiveGraph::Union(allowed.clone())),
        ActiveGraph::Union(graphs) => {
            if let Some(denied) = graphs.iter().find(|g| !policy.permits(g)) {
                return Err(CompileError::PolicyViolation(denied.to_string()));
            }
            Ok(ActiveGraph::Union(graphs))
        }
    }
}

/// Which graphs a triple block is allowed to read from, plus (for `GRAPH
/// ?g { ... }`) the variable that its actual matched graph should bind to.
///
/// Grounded on spec §4.8's GRAPH bullet: a variable graph name doesn't just
/// filter which graphs are visible, it also has to rebind `?g` per solution
/// row to whichever graph a pattern's triples actually came from, rather
/// than to an arbitrary fixed graph.
#[derive(Clone, Debug, Default)]
pub struct GraphScope {
    pub active: ActiveGraph,
    pub bind_var: Option<Variable>,
    /// Carried so a nested `GRAPH <iri>`/`GRAPH ?g` clause re-applies the
    /// same policy to its own, narrower active graph (spec §4.6: a policy
    /// bounds every graph resolution point, not just the dataset's).
    pub policy: GraphPolicy,
}

impl GraphScope {
    pub fn new(active: ActiveGraph) -> Self {
        Self { active, bind_var: None, policy: GraphPolicy::unrestricted() }
    }

    pub fn with_bind_var(active: ActiveGraph, var: Variable) -> Self {
        Self { active, bind_var: Some(var), policy: GraphPolicy::unrestricted() }
    }

    /// Applies `policy` to this scope's own active graph and remembers it
    /// so child scopes narrow the same way (see [`Self::narrow`]).
    pub fn with_policy(mut self, policy: GraphPolicy) -> CompileResult<Self> {
        self.active = apply_policy(self.active, &policy)?;
        self.policy = policy;
        Ok(self)
    }

    /// Narrows a nested `GRAPH` clause's active graph to this scope's
    /// policy, for `compile_graph_pattern` building the inner [`GraphScope`].
    pub fn narrow(&self, active: ActiveGraph) -> CompileResult<ActiveGraph> {
        apply_policy(active, &self.policy)
    }
}

/// Which graphs a triple block is allowed to read from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ActiveGraph {
    /// Only the unnamed default graph.
    #[default]
    DefaultGraph,
    /// Every graph, default and named alike (no `GRAPH` clause, no
    /// `FROM`/`FROM NAMED`).
    AllGraphs,
    /// Exactly the listed graphs (`FROM <g1> FROM NAMED <g2>`, or a `GRAPH
    /// <iri> { ... }` pattern).
    Union(Vec<GraphName>),
    /// Any named graph, as in `GRAPH ?g { ... }` with no dataset clauses
    /// restricting which named graphs exist.
    AnyNamedGraph,
}

/// Compiles an [`ActiveGraph`] into a `WHERE`-clause fragment (without the
/// leading `AND`/`WHERE`) over `column`, binding any explicit graph IRIs
/// through `bind_iri`. Returns `None` when the active graph imposes no
/// constraint at all.
pub fn compile_graph_filter(
    active: &ActiveGraph,
    column: &str,
    bind_iri: &mut dyn FnMut(&GraphName) -> String,
) -> Option<String> {
    match active {
        ActiveGraph::DefaultGraph => Some(format!("{column} IS NULL")),
        ActiveGraph::AllGraphs | ActiveGraph::AnyNamedGraph => None,
        ActiveGraph::Union(graphs) => {
            if graphs.is_empty() {
                // An empty FROM/FROM NAMED union matches nothing.
                return Some("1 = 0".to_owned());
            }
            let placeholders: Vec<String> = graphs.iter().map(|g| bind_iri(g)).collect();
            Some(format!("{column} IN ({})", placeholders.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::NamedNode;

    #[test]
    fn default_graph_filters_to_null() {
        let filter = compile_graph_filter(&ActiveGraph::DefaultGraph, "t1.graph", &mut |_| {
            unreachable!("no IRIs to bind")
        });
        assert_eq!(filter.as_deref(), Some("t1.graph IS NULL"));
    }

    #[test]
    fn all_graphs_imposes_no_filter() {
        assert_eq!(
            compile_graph_filter(&ActiveGraph::AllGraphs, "t1.graph", &mut |_| unreachable!()),
            None
        );
    }

    #[test]
    fn union_binds_each_graph_and_builds_in_list() {
        let graphs = vec![GraphName::NamedNode(NamedNode::new("http://ex/g1").expect("valid"))];
        let mut seen = Vec::new();
        let filter = compile_graph_filter(&ActiveGraph::Union(graphs), "t1.graph", &mut |g| {
            seen.push(format!("{g}"));
            "?1".to_owned()
        });
        assert_eq!(filter.as_deref(), Some("t1.graph IN (?1)"));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn empty_union_matches_nothing() {
        let filter =
            compile_graph_filter(&ActiveGraph::Union(Vec::new()), "t1.graph", &mut |_| unreachable!());
        assert_eq!(filter.as_deref(), Some("1 = 0"));
    }

    fn graph(iri: &str) -> GraphName {
        GraphName::NamedNode(NamedNode::new(iri).expect("valid"))
    }

    #[test]
    fn unrestricted_policy_leaves_active_graph_untouched() {
        let policy = GraphPolicy::unrestricted();
        assert_eq!(apply_policy(ActiveGraph::AllGraphs, &policy).unwrap(), ActiveGraph::AllGraphs);
    }

    #[test]
    fn restricted_policy_narrows_all_graphs_to_its_own_set() {
        let policy = GraphPolicy::restricted(vec![graph("http://ex/g1")]);
        assert_eq!(
            apply_policy(ActiveGraph::AllGraphs, &policy).unwrap(),
            ActiveGraph::Union(vec![graph("http://ex/g1")])
        );
        assert_eq!(
            apply_policy(ActiveGraph::AnyNamedGraph, &policy).unwrap(),
            ActiveGraph::Union(vec![graph("http://ex/g1")])
        );
    }

    #[test]
    fn restricted_policy_leaves_default_graph_alone() {
        let policy = GraphPolicy::restricted(vec![graph("http://ex/g1")]);
        assert_eq!(apply_policy(ActiveGraph::DefaultGraph, &policy).unwrap(), ActiveGraph::DefaultGraph);
    }

    #[test]
    fn restricted_policy_rejects_an_explicit_disallowed_graph() {
        let policy = GraphPolicy::restricted(vec![graph("http://ex/g1")]);
        let err = apply_policy(ActiveGraph::Union(vec![graph("http://ex/other")]), &policy).unwrap_err();
        assert!(matches!(err, CompileError::PolicyViolation(_)));
    }
}
