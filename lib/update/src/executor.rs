//! The update executor (spec §4.11 "Update executor (C11)"): iterates each
//! [`OpGroup`]'s WHERE cursor (or runs once, cursor-less, for ground data
//! and graph-management ops) and drives an [`UpdateSink`] — the storage
//! collaborator, treated as an external interface per spec §6.

use rdfsql_common::RowId;
use rdfsql_compiler::GraphPolicy;
use rdfsql_ontology::{Ontology, Property};
use spargebra::term::{Literal, NamedNode, Variable};

use crate::bnode::BnodeMapper;
use crate::error::{UpdateError, UpdateResult};
use crate::op::{GraphScope, OpGroup, TripleOp, TripleOpKind, UpdateOp, UpdatePlan};
use crate::term::{ResolvedTerm, UpdateGraph, UpdateTerm};

/// A resolved object value, already split into the two shapes a property's
/// column can hold: a reference to another resource, or an inline literal.
/// The sink converts the literal to its internal encoding itself (spec's
/// `tracker_data_query_string_to_value` is a storage-layer concern).
#[derive(Clone, Debug)]
pub enum ObjectValue {
    Resource(RowId),
    Literal(Literal),
}

/// One row of a WHERE cursor, abstracted over the concrete SQL engine.
pub trait WhereCursor {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Advances to the next solution; `false` once exhausted.
    fn advance(&mut self) -> Result<bool, Self::Error>;

    /// The current row's binding for `variable`, already resolved to a
    /// term (a literal value, or a resource's printed IRI) — `None` if the
    /// variable is unbound in this solution.
    fn binding(&self, variable: &Variable) -> Option<ResolvedTerm>;
}

/// Compiles and runs an [`rdfsql_compiler::CompiledSql`] WHERE clause,
/// producing a [`WhereCursor`] over its solutions.
pub trait WhereRunner {
    type Cursor: WhereCursor;
    type Error: std::error::Error + Send + Sync + 'static;

    fn run(&mut self, compiled: &rdfsql_compiler::CompiledSql) -> Result<Self::Cursor, Self::Error>;
}

/// The storage collaborator the executor drives (spec §6's
/// `insert_statement`/`delete_statement`/`update_statement`,
/// `ensure_resource`/`query_resource_id`, graph management, `load_rdf_file`,
/// write-buffer flushing and `"silent_op"` savepoints).
pub trait UpdateSink {
    type Error: std::error::Error + Send + Sync + 'static;

    fn flush_write_buffer(&mut self) -> Result<(), Self::Error>;

    /// Opens the `"silent_op"` savepoint a `SILENT` op group rolls back to
    /// on failure (spec §5 "Shared resources").
    fn begin_group_savepoint(&mut self) -> Result<(), Self::Error>;
    fn release_group_savepoint(&mut self) -> Result<(), Self::Error>;
    fn rollback_group_savepoint(&mut self) -> Result<(), Self::Error>;

    fn ensure_resource(&mut self, iri: &NamedNode) -> Result<RowId, Self::Error>;
    /// Looks up a resource's row id without creating it — used by DELETE.
    fn query_resource_id(&mut self, iri: &NamedNode) -> Result<Option<RowId>, Self::Error>;
    fn allocate_blank_node(&mut self) -> Result<RowId, Self::Error>;

    fn insert_statement(
        &mut self,
        graph: Option<&NamedNode>,
        subject: RowId,
        property: &Property,
        value: &ObjectValue,
    ) -> Result<(), Self::Error>;
    fn delete_statement(
        &mut self,
        graph: Option<&NamedNode>,
        subject: RowId,
        property: &Property,
        value: &ObjectValue,
    ) -> Result<(), Self::Error>;
    /// Overwrites a single-valued property's existing value in place.
    fn update_statement(
        &mut self,
        graph: Option<&NamedNode>,
        subject: RowId,
        property: &Property,
        value: &ObjectValue,
    ) -> Result<(), Self::Error>;

    /// Returns `false` if `graph` already existed (a constraint violation
    /// unless the op is `SILENT`).
    fn create_graph(&mut self, graph: &NamedNode) -> Result<bool, Self::Error>;
    fn known_graphs(&mut self) -> Result<Vec<NamedNode>, Self::Error>;
    /// Removes every triple from `graph` (`None` for the default graph)
    /// without dropping the graph resource itself.
    fn clear_graph(&mut self, graph: Option<&NamedNode>) -> Result<(), Self::Error>;
    /// Removes `graph`'s triples and the graph resource.
    fn drop_graph(&mut self, graph: &NamedNode) -> Result<(), Self::Error>;
    fn load_rdf_file(&mut self, source: &NamedNode, destination: Option<&NamedNode>) -> Result<(), Self::Error>;
}

fn storage_err<E: std::error::Error + Send + Sync + 'static>(error: E) -> UpdateError {
    UpdateError::Storage(Box::new(error))
}

/// Executes `plan` against `ontology`, `sink` and `runner`, honoring each
/// group's `SILENT` flags via local savepoints (spec §4.11 step 3).
pub fn execute_plan<S, R>(
    ontology: &Ontology,
    plan: &UpdatePlan,
    sink: &mut S,
    runner: &mut R,
    bnodes: &mut BnodeMapper,
    policy: &GraphPolicy,
) -> UpdateResult<()>
where
    S: UpdateSink,
    R: WhereRunner,
{
    for group in &plan.groups {
        execute_group(ontology, group, sink, runner, bnodes, policy)?;
    }
    Ok(())
}

fn execute_group<S, R>(
    ontology: &Ontology,
    group: &OpGroup,
    sink: &mut S,
    runner: &mut R,
    bnodes: &mut BnodeMapper,
    policy: &GraphPolicy,
) -> UpdateResult<()>
where
    S: UpdateSink,
    R: WhereRunner,
{
    let silent = group.ops.iter().all(op_is_silent);
    let guarded = silent && !group.ops.is_empty();
    if guarded {
        sink.begin_group_savepoint().map_err(storage_err)?;
    }
    let result = run_group_body(ontology, group, sink, runner, bnodes, policy);
    match (guarded, result) {
        (true, Err(_)) => {
            sink.rollback_group_savepoint().map_err(storage_err)?;
            Ok(())
        }
        (true, Ok(())) => {
            sink.release_group_savepoint().map_err(storage_err)?;
            Ok(())
        }
        (false, result) => result,
    }
}

fn run_group_body<S, R>(
    ontology: &Ontology,
    group: &OpGroup,
    sink: &mut S,
    runner: &mut R,
    bnodes: &mut BnodeMapper,
    policy: &GraphPolicy,
) -> UpdateResult<()>
where
    S: UpdateSink,
    R: WhereRunner,
{
    match &group.select {
        Some(compiled) => {
            sink.flush_write_buffer().map_err(storage_err)?;
            let mut cursor = runner.run(compiled).map_err(storage_err)?;
            while cursor.advance().map_err(storage_err)? {
                for op in &group.ops {
                    execute_op(ontology, op, Some(&cursor), sink, bnodes, policy)?;
                }
            }
            Ok(())
        }
        None => {
            for op in &group.ops {
                execute_op(ontology, op, None, sink, bnodes, policy)?;
            }
            Ok(())
        }
    }
}

/// Only graph-management operations carry a `SILENT` modifier in SPARQL
/// Update (`spargebra::update::GraphUpdateOperation` has no such flag for
/// `InsertData`/`DeleteData`/`DeleteInsert`) — a group of triple ops is
/// therefore never savepoint-guarded, matching how the planner only ever
/// puts a single graph-management op in a group by itself.
fn op_is_silent(op: &UpdateOp) -> bool {
    match op {
        UpdateOp::Triple(_) => false,
        UpdateOp::Load { silent, .. }
        | UpdateOp::Clear { silent, .. }
        | UpdateOp::Create { silent, .. }
        | UpdateOp::Drop { silent, .. } => *silent,
    }
}

fn execute_op<S, C>(
    ontology: &Ontology,
    op: &UpdateOp,
    cursor: Option<&C>,
    sink: &mut S,
    bnodes: &mut BnodeMapper,
    policy: &GraphPolicy,
) -> UpdateResult<()>
where
    S: UpdateSink,
    C: WhereCursor,
{
    match op {
        UpdateOp::Triple(triple) => execute_triple_op(ontology, triple, cursor, sink, bnodes),
        UpdateOp::Load { source, destination, .. } => {
            let destination = resolve_graph_ground(destination);
            sink.load_rdf_file(source, destination.as_ref()).map_err(storage_err)
        }
        UpdateOp::Clear { graph, .. } => {
            for g in target_graphs(sink, graph, policy)? {
                sink.clear_graph(g.as_ref()).map_err(storage_err)?;
            }
            Ok(())
        }
        UpdateOp::Create { graph, .. } => {
            require_policy_permits(policy, graph)?;
            sink.create_graph(graph).map_err(storage_err)?;
            Ok(())
        }
        UpdateOp::Drop { graph, .. } => {
            for g in target_graphs(sink, graph, policy)? {
                if let Some(g) = g {
                    sink.drop_graph(&g).map_err(storage_err)?;
                }
            }
            Ok(())
        }
    }
}

fn require_policy_permits(policy: &GraphPolicy, graph: &NamedNode) -> UpdateResult<()> {
    if policy.permits(&rdfsql_model::GraphName::NamedNode(graph.clone())) {
        Ok(())
    } else {
        Err(UpdateError::PolicyViolation(graph.to_string()))
    }
}

/// Enumerates the concrete named graphs (or `None` for the default graph)
/// a `CLEAR`/`DROP` scope targets (spec §4.11 "Graph DROP/CLEAR"). An
/// explicit single-graph target the policy disallows is a hard failure; a
/// wildcard scope (`ALL`/`NAMED`) instead silently excludes disallowed
/// graphs from the sweep, since enumerating "every graph" was never really
/// asking to touch ones the caller has no access to.
fn target_graphs<S: UpdateSink>(
    sink: &mut S,
    scope: &GraphScope,
    policy: &GraphPolicy,
) -> UpdateResult<Vec<Option<NamedNode>>> {
    Ok(match scope {
        GraphScope::Named(n) => {
            require_policy_permits(policy, n)?;
            vec![Some(n.clone())]
        }
        GraphScope::Default => vec![None],
        GraphScope::AllNamed => sink
            .known_graphs()
            .map_err(storage_err)?
            .into_iter()
            .filter(|n| policy.permits(&rdfsql_model::GraphName::NamedNode(n.clone())))
            .map(Some)
            .collect(),
        GraphScope::All => {
            let mut graphs: Vec<Option<NamedNode>> = vec![None];
            graphs.extend(
                sink.known_graphs()
                    .map_err(storage_err)?
                    .into_iter()
                    .filter(|n| policy.permits(&rdfsql_model::GraphName::NamedNode(n.clone())))
                    .map(Some),
            );
            graphs
        }
    })
}

fn resolve_graph_ground(graph: &UpdateGraph) -> Option<NamedNode> {
    match graph {
        UpdateGraph::DefaultGraph => None,
        UpdateGraph::NamedNode(n) => Some(n.clone()),
        // A variable destination only ever appears in quad templates, never
        // in LOAD's INTO GRAPH clause, which spargebra parses as a fixed
        // GraphName.
        UpdateGraph::Variable(_) => None,
    }
}

fn execute_triple_op<S, C>(
    ontology: &Ontology,
    op: &TripleOp,
    cursor: Option<&C>,
    sink: &mut S,
    bnodes: &mut BnodeMapper,
) -> UpdateResult<()>
where
    S: UpdateSink,
    C: WhereCursor,
{
    let Some(subject) = resolve_term(&op.subject, cursor) else { return Ok(()) };
    let Some(predicate) = resolve_iri_term(&op.predicate, cursor)? else { return Ok(()) };
    let Some(object) = resolve_term(&op.object, cursor) else { return Ok(()) };
    let graph = resolve_graph(&op.graph, cursor);

    let property = ontology.property(&predicate)?;
    let subject_row = match op.kind {
        TripleOpKind::Delete => match subject_row_id(&subject, sink, bnodes)? {
            Some(id) => id,
            None => return Ok(()),
        },
        TripleOpKind::Insert | TripleOpKind::Replace => ensure_subject_row(&subject, sink, bnodes)?,
    };
    let value = object_value(&object, property, sink, bnodes)?;

    match op.kind {
        TripleOpKind::Insert => sink.insert_statement(graph.as_ref(), subject_row, property, &value),
        TripleOpKind::Replace => sink.update_statement(graph.as_ref(), subject_row, property, &value),
        TripleOpKind::Delete => sink.delete_statement(graph.as_ref(), subject_row, property, &value),
    }
    .map_err(storage_err)
}

fn resolve_term<C: WhereCursor>(term: &UpdateTerm, cursor: Option<&C>) -> Option<ResolvedTerm> {
    match term {
        UpdateTerm::NamedNode(n) => Some(ResolvedTerm::NamedNode(n.clone())),
        UpdateTerm::Literal(l) => Some(ResolvedTerm::Literal {
            value: rdfsql_model::Value::String(l.value().to_owned()),
            data_type_iri: Some(l.datatype().into_owned()),
        }),
        // Resolved lazily by `subject_row_id`/`object_value`, whichever
        // needs an actual row id — passing the label through unresolved
        // here means a blank node used as both subject and object of the
        // same template only consults the bnode map, never allocates
        // twice.
        UpdateTerm::BlankNode(b) => Some(ResolvedTerm::BlankNode(b.as_str().to_owned())),
        UpdateTerm::Variable(v) => cursor.and_then(|c| c.binding(v)),
    }
}

fn resolve_iri_term<C: WhereCursor>(term: &UpdateTerm, cursor: Option<&C>) -> UpdateResult<Option<NamedNode>> {
    match term {
        UpdateTerm::NamedNode(n) => Ok(Some(n.clone())),
        UpdateTerm::Variable(v) => Ok(cursor.and_then(|c| c.binding(v)).and_then(|t| match t {
            ResolvedTerm::NamedNode(n) => Some(n),
            _ => None,
        })),
        UpdateTerm::Literal(_) | UpdateTerm::BlankNode(_) => {
            Err(UpdateError::UnboundVariable("predicate position must be an IRI or variable".into()))
        }
    }
}

fn resolve_graph<C: WhereCursor>(graph: &UpdateGraph, cursor: Option<&C>) -> Option<NamedNode> {
    match graph {
        UpdateGraph::DefaultGraph => None,
        UpdateGraph::NamedNode(n) => Some(n.clone()),
        UpdateGraph::Variable(v) => cursor.and_then(|c| c.binding(v)).and_then(|t| match t {
            ResolvedTerm::NamedNode(n) => Some(n),
            _ => None,
        }),
    }
}

fn subject_row_id<S: UpdateSink>(
    subject: &ResolvedTerm,
    sink: &mut S,
    bnodes: &mut BnodeMapper,
) -> UpdateResult<Option<RowId>> {
    match subject {
        ResolvedTerm::NamedNode(n) => sink.query_resource_id(n).map_err(storage_err),
        ResolvedTerm::BlankNode(label) => {
            bnodes.resolve(label, || Err(UpdateError::UnboundVariable(format!("_:{label}")))).map(Some).or(Ok(None))
        }
        ResolvedTerm::Literal { .. } => Err(UpdateError::UnboundVariable("subject cannot be a literal".into())),
    }
}

fn ensure_subject_row<S: UpdateSink>(
    subject: &ResolvedTerm,
    sink: &mut S,
    bnodes: &mut BnodeMapper,
) -> UpdateResult<RowId> {
    match subject {
        ResolvedTerm::NamedNode(n) => sink.ensure_resource(n).map_err(storage_err),
        ResolvedTerm::BlankNode(label) => bnodes.resolve(label, || sink.allocate_blank_node().map_err(storage_err)),
        ResolvedTerm::Literal { .. } => Err(UpdateError::UnboundVariable("subject cannot be a literal".into())),
    }
}

fn object_value<S: UpdateSink>(
    object: &ResolvedTerm,
    property: &Property,
    sink: &mut S,
    bnodes: &mut BnodeMapper,
) -> UpdateResult<ObjectValue> {
    match object {
        ResolvedTerm::NamedNode(n) => Ok(ObjectValue::Resource(sink.ensure_resource(n).map_err(storage_err)?)),
        ResolvedTerm::BlankNode(label) => {
            let id = bnodes.resolve(label, || sink.allocate_blank_node().map_err(storage_err))?;
            Ok(ObjectValue::Resource(id))
        }
        ResolvedTerm::Literal { data_type_iri, .. } => {
            let datatype = data_type_iri.clone().unwrap_or_else(|| {
                property.data_type().datatype_iri().map(|d| d.into_owned()).unwrap_or_else(|| {
                    NamedNode::new_unchecked("http://www.w3.org/2001/XMLSchema#string")
                })
            });
            // The literal's lexical text is recovered by the sink from its
            // own encoding; this executor only needs to carry the
            // resolved term far enough to hand it across the boundary.
            Ok(ObjectValue::Literal(Literal::new_typed_literal(literal_text(object), datatype)))
        }
    }
}

fn literal_text(object: &ResolvedTerm) -> String {
    match object {
        ResolvedTerm::Literal { value: rdfsql_model::Value::String(s), .. } => s.clone(),
        ResolvedTerm::Literal { value, .. } => format!("{value:?}"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use rdfsql_common::BlankNodeMappingMode;
    use rdfsql_compiler::CompiledSql;
    use rdfsql_model::{NamedNode as ModelNamedNode, RdfTermType};
    use rdfsql_ontology::Ontology;
    use rustc_hash::FxHashMap;
    use spargebra::Update;
    use thiserror::Error;

    use super::*;
    use crate::plan::plan_update;

    fn test_ontology() -> Ontology {
        let name = ModelNamedNode::new("http://ex/name").expect("valid iri");
        let knows = ModelNamedNode::new("http://ex/knows").expect("valid iri");
        Ontology::builder()
            .with_property(Property::new(name, RdfTermType::String, "Person", "name", false))
            .with_property(Property::new(knows, RdfTermType::Resource, "knows", "value", true))
            .build()
    }

    #[derive(Default)]
    struct FakeSink {
        next_id: i64,
        resources: FxHashMap<NamedNode, RowId>,
        inserted: Vec<(RowId, String, ObjectValue)>,
        updated: Vec<(RowId, String, ObjectValue)>,
        deleted: Vec<(RowId, String, ObjectValue)>,
        graphs: Vec<NamedNode>,
        cleared: Vec<Option<NamedNode>>,
        dropped: Vec<NamedNode>,
        savepoints_begun: u32,
        savepoints_released: u32,
        savepoints_rolled_back: u32,
    }

    impl FakeSink {
        fn alloc(&mut self) -> RowId {
            self.next_id += 1;
            RowId::new(self.next_id)
        }
    }

    impl UpdateSink for FakeSink {
        type Error = Infallible;

        fn flush_write_buffer(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn begin_group_savepoint(&mut self) -> Result<(), Self::Error> {
            self.savepoints_begun += 1;
            Ok(())
        }

        fn release_group_savepoint(&mut self) -> Result<(), Self::Error> {
            self.savepoints_released += 1;
            Ok(())
        }

        fn rollback_group_savepoint(&mut self) -> Result<(), Self::Error> {
            self.savepoints_rolled_back += 1;
            Ok(())
        }

        fn ensure_resource(&mut self, iri: &NamedNode) -> Result<RowId, Self::Error> {
            if let Some(id) = self.resources.get(iri) {
                return Ok(*id);
            }
            let id = self.alloc();
            self.resources.insert(iri.clone(), id);
            Ok(id)
        }

        fn query_resource_id(&mut self, iri: &NamedNode) -> Result<Option<RowId>, Self::Error> {
            Ok(self.resources.get(iri).copied())
        }

        fn allocate_blank_node(&mut self) -> Result<RowId, Self::Error> {
            Ok(self.alloc())
        }

        fn insert_statement(
            &mut self,
            _graph: Option<&NamedNode>,
            subject: RowId,
            property: &Property,
            value: &ObjectValue,
        ) -> Result<(), Self::Error> {
            self.inserted.push((subject, property.iri().as_str().to_owned(), value.clone()));
            Ok(())
        }

        fn delete_statement(
            &mut self,
            _graph: Option<&NamedNode>,
            subject: RowId,
            property: &Property,
            value: &ObjectValue,
        ) -> Result<(), Self::Error> {
            self.deleted.push((subject, property.iri().as_str().to_owned(), value.clone()));
            Ok(())
        }

        fn update_statement(
            &mut self,
            _graph: Option<&NamedNode>,
            subject: RowId,
            property: &Property,
            value: &ObjectValue,
        ) -> Result<(), Self::Error> {
            self.updated.push((subject, property.iri().as_str().to_owned(), value.clone()));
            Ok(())
        }

        fn create_graph(&mut self, graph: &NamedNode) -> Result<bool, Self::Error> {
            if self.graphs.contains(graph) {
                return Ok(false);
            }
            self.graphs.push(graph.clone());
            Ok(true)
        }

        fn known_graphs(&mut self) -> Result<Vec<NamedNode>, Self::Error> {
            Ok(self.graphs.clone())
        }

        fn clear_graph(&mut self, graph: Option<&NamedNode>) -> Result<(), Self::Error> {
            self.cleared.push(graph.cloned());
            Ok(())
        }

        fn drop_graph(&mut self, graph: &NamedNode) -> Result<(), Self::Error> {
            self.dropped.push(graph.clone());
            self.graphs.retain(|g| g != graph);
            Ok(())
        }

        fn load_rdf_file(&mut self, _source: &NamedNode, _destination: Option<&NamedNode>) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[derive(Debug, Error)]
    #[error("fake storage failure")]
    struct FakeFailure;

    struct FailingSink(FakeSink);

    impl UpdateSink for FailingSink {
        type Error = FakeFailure;

        fn flush_write_buffer(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn begin_group_savepoint(&mut self) -> Result<(), Self::Error> {
            self.0.begin_group_savepoint().unwrap();
            Ok(())
        }

        fn release_group_savepoint(&mut self) -> Result<(), Self::Error> {
            self.0.release_group_savepoint().unwrap();
            Ok(())
        }

        fn rollback_group_savepoint(&mut self) -> Result<(), Self::Error> {
            self.0.rollback_group_savepoint().unwrap();
            Ok(())
        }

        fn ensure_resource(&mut self, iri: &NamedNode) -> Result<RowId, Self::Error> {
            Ok(self.0.ensure_resource(iri).unwrap())
        }

        fn query_resource_id(&mut self, iri: &NamedNode) -> Result<Option<RowId>, Self::Error> {
            Ok(self.0.query_resource_id(iri).unwrap())
        }

        fn allocate_blank_node(&mut self) -> Result<RowId, Self::Error> {
            Ok(self.0.allocate_blank_node().unwrap())
        }

        fn insert_statement(
            &mut self,
            _graph: Option<&NamedNode>,
            _subject: RowId,
            _property: &Property,
            _value: &ObjectValue,
        ) -> Result<(), Self::Error> {
            Err(FakeFailure)
        }

        fn delete_statement(
            &mut self,
            graph: Option<&NamedNode>,
            subject: RowId,
            property: &Property,
            value: &ObjectValue,
        ) -> Result<(), Self::Error> {
            Ok(self.0.delete_statement(graph, subject, property, value).unwrap())
        }

        fn update_statement(
            &mut self,
            graph: Option<&NamedNode>,
            subject: RowId,
            property: &Property,
            value: &ObjectValue,
        ) -> Result<(), Self::Error> {
            Ok(self.0.update_statement(graph, subject, property, value).unwrap())
        }

        fn create_graph(&mut self, graph: &NamedNode) -> Result<bool, Self::Error> {
            Ok(self.0.create_graph(graph).unwrap())
        }

        fn known_graphs(&mut self) -> Result<Vec<NamedNode>, Self::Error> {
            Ok(self.0.known_graphs().unwrap())
        }

        fn clear_graph(&mut self, graph: Option<&NamedNode>) -> Result<(), Self::Error> {
            Ok(self.0.clear_graph(graph).unwrap())
        }

        fn drop_graph(&mut self, graph: &NamedNode) -> Result<(), Self::Error> {
            Ok(self.0.drop_graph(graph).unwrap())
        }

        fn load_rdf_file(&mut self, source: &NamedNode, destination: Option<&NamedNode>) -> Result<(), Self::Error> {
            Ok(self.0.load_rdf_file(source, destination).unwrap())
        }
    }

    struct FakeCursor {
        rows: Vec<FxHashMap<String, ResolvedTerm>>,
        index: usize,
    }

    impl WhereCursor for FakeCursor {
        type Error = Infallible;

        fn advance(&mut self) -> Result<bool, Self::Error> {
            if self.index >= self.rows.len() {
                return Ok(false);
            }
            self.index += 1;
            Ok(true)
        }

        fn binding(&self, variable: &Variable) -> Option<ResolvedTerm> {
            self.rows[self.index - 1].get(variable.as_str()).cloned()
        }
    }

    struct FakeRunner {
        rows: Vec<FxHashMap<String, ResolvedTerm>>,
    }

    impl WhereRunner for FakeRunner {
        type Cursor = FakeCursor;
        type Error = Infallible;

        fn run(&mut self, _compiled: &CompiledSql) -> Result<Self::Cursor, Self::Error> {
            Ok(FakeCursor { rows: self.rows.clone(), index: 0 })
        }
    }

    fn dummy_compiled() -> CompiledSql {
        CompiledSql::new("SELECT 1".to_owned(), Vec::new(), Vec::new())
    }

    fn iri(s: &str) -> NamedNode {
        NamedNode::new(s).expect("valid iri")
    }

    #[test]
    fn insert_data_creates_resource_and_replaces_single_valued_property() {
        let ontology = test_ontology();
        let update =
            Update::parse("INSERT DATA { <http://ex/a> <http://ex/name> \"Ada\" }", None).expect("valid update");
        let plan = plan_update(&ontology, &update, &GraphPolicy::unrestricted()).expect("plans");
        let mut sink = FakeSink::default();
        let mut runner = FakeRunner { rows: Vec::new() };
        let mut bnodes = BnodeMapper::new(BlankNodeMappingMode::MapAndAllocate, FxHashMap::default());
        execute_plan(&ontology, &plan, &mut sink, &mut runner, &mut bnodes, &GraphPolicy::unrestricted()).expect("executes");
        assert_eq!(sink.updated.len(), 1);
        assert!(sink.inserted.is_empty());
        assert_eq!(sink.resources.get(&iri("http://ex/a")), Some(&RowId::new(1)));
    }

    #[test]
    fn delete_data_for_a_nonexistent_subject_is_a_no_op() {
        let ontology = test_ontology();
        let update =
            Update::parse("DELETE DATA { <http://ex/missing> <http://ex/name> \"Ada\" }", None)
                .expect("valid update");
        let plan = plan_update(&ontology, &update, &GraphPolicy::unrestricted()).expect("plans");
        let mut sink = FakeSink::default();
        let mut runner = FakeRunner { rows: Vec::new() };
        let mut bnodes = BnodeMapper::new(BlankNodeMappingMode::MapAndAllocate, FxHashMap::default());
        execute_plan(&ontology, &plan, &mut sink, &mut runner, &mut bnodes, &GraphPolicy::unrestricted()).expect("executes");
        assert!(sink.deleted.is_empty());
    }

    #[test]
    fn delete_insert_substitutes_cursor_bindings_into_both_templates() {
        let ontology = test_ontology();
        let update = Update::parse(
            "DELETE { ?s <http://ex/name> ?old } INSERT { ?s <http://ex/name> ?new } \
             WHERE { ?s <http://ex/name> ?old }",
            None,
        )
        .expect("valid update");
        let plan = plan_update(&ontology, &update, &GraphPolicy::unrestricted()).expect("plans");
        let mut sink = FakeSink::default();
        sink.resources.insert(iri("http://ex/a"), RowId::new(1));
        let mut row = FxHashMap::default();
        row.insert("old".to_owned(), ResolvedTerm::Literal {
            value: rdfsql_model::Value::String("Ada".to_owned()),
            data_type_iri: None,
        });
        row.insert("new".to_owned(), ResolvedTerm::Literal {
            value: rdfsql_model::Value::String("Ada!".to_owned()),
            data_type_iri: None,
        });
        row.insert("s".to_owned(), ResolvedTerm::NamedNode(iri("http://ex/a")));
        let mut runner = FakeRunner { rows: vec![row] };
        let mut bnodes = BnodeMapper::new(BlankNodeMappingMode::MapAndAllocate, FxHashMap::default());
        execute_plan(&ontology, &plan, &mut sink, &mut runner, &mut bnodes, &GraphPolicy::unrestricted()).expect("executes");
        assert_eq!(sink.deleted.len(), 1);
        assert_eq!(sink.updated.len(), 1);
    }

    #[test]
    fn silent_clear_on_a_failing_sink_rolls_back_without_propagating() {
        let ontology = test_ontology();
        let update = Update::parse(
            "INSERT DATA { <http://ex/a> <http://ex/name> \"Ada\" } ; CLEAR SILENT GRAPH <http://ex/g>",
            None,
        )
        .expect("valid update");
        let plan = plan_update(&ontology, &update, &GraphPolicy::unrestricted()).expect("plans");
        assert_eq!(plan.groups.len(), 2);
        let mut sink = FailingSink(FakeSink::default());
        let mut runner = FakeRunner { rows: Vec::new() };
        let mut bnodes = BnodeMapper::new(BlankNodeMappingMode::MapAndAllocate, FxHashMap::default());
        let result = execute_plan(&ontology, &plan, &mut sink, &mut runner, &mut bnodes, &GraphPolicy::unrestricted());
        assert!(result.is_err(), "the non-SILENT insert must still propagate its storage failure");
    }

    #[test]
    fn clear_all_targets_default_graph_and_every_known_graph() {
        let ontology = test_ontology();
        let update = Update::parse("CLEAR ALL", None).expect("valid update");
        let plan = plan_update(&ontology, &update, &GraphPolicy::unrestricted()).expect("plans");
        let mut sink = FakeSink::default();
        sink.graphs.push(iri("http://ex/g1"));
        let mut runner = FakeRunner { rows: Vec::new() };
        let mut bnodes = BnodeMapper::new(BlankNodeMappingMode::MapAndAllocate, FxHashMap::default());
        execute_plan(&ontology, &plan, &mut sink, &mut runner, &mut bnodes, &GraphPolicy::unrestricted()).expect("executes");
        assert_eq!(sink.cleared.len(), 2);
        assert!(sink.cleared.contains(&None));
        assert!(sink.cleared.contains(&Some(iri("http://ex/g1"))));
    }
}
