//! The SPARQL engine facade (spec §6 "Query API" / "Update API"): a
//! `SparqlEngine` compiles SPARQL text once into a `QueryHandle`/
//! `UpdateHandle`, then runs it against any number of parameter bindings
//! without re-parsing or re-planning.

use std::collections::HashMap;
use std::sync::Mutex;

use rdfsql_common::{BlankNodeMappingMode, EngineError, EngineResult, RowId};
use rdfsql_compiler::{compile_query, compile_update_where, CompiledSql, GraphPolicy};
use rdfsql_model::{GraphName, NamedNode, RdfTermType, Value};
use rdfsql_ontology::Ontology;
use rdfsql_update::{execute_plan, plan_update, BnodeMapper, UpdatePlan};
use rustc_hash::FxHashMap;
use spargebra::{Query, Update};

use crate::cache::StatementCache;
use crate::error::{from_compile, from_rusqlite, from_update};
use crate::options::EngineOptions;
use crate::storage::SqliteStorage;
use crate::value_codec;

/// A parsed and compiled query (spec §6 `open`'s return value).
pub struct QueryHandle {
    query: Query,
    compiled: CompiledSql,
}

impl QueryHandle {
    /// `true` only for `DESCRIBE`/`CONSTRUCT` (spec §6) — the two forms
    /// whose result is itself an RDF graph the caller may choose to
    /// serialize instead of reading as a solution sequence.
    pub fn is_serializable(&self) -> bool {
        matches!(self.query, Query::Describe { .. } | Query::Construct { .. })
    }
}

/// A parsed and planned update (spec §6 `open_update`'s return value).
pub struct UpdateHandle {
    plan: UpdatePlan,
}

struct CursorRow {
    values: Vec<Value>,
    types: Vec<RdfTermType>,
}

/// A query's result set, materialized up front for the same reason
/// [`crate::storage::SqliteWhereCursor`] is: a `rusqlite::Statement` and
/// the `Rows` it hands out borrow each other, so a cursor returned by
/// value can't also hold an open one.
pub struct Cursor {
    variable_names: Vec<String>,
    rows: Vec<CursorRow>,
    position: Option<usize>,
}

impl Cursor {
    /// Advances to the next row; `false` once exhausted (spec §6 `next()`).
    pub fn next(&mut self) -> bool {
        let next = self.position.map_or(0, |p| p + 1);
        self.position = Some(next);
        next < self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.variable_names.len()
    }

    pub fn variable_name(&self, i: usize) -> &str {
        &self.variable_names[i]
    }

    /// Column `i`'s value in the current row (spec §6 `get_value`).
    pub fn get_value(&self, i: usize) -> &Value {
        &self.current_row().values[i]
    }

    /// The "value-type column" spec §6 appends after each projected
    /// expression: the RDF type tag column `i`'s value actually resolved
    /// to, not just its statically compiled one (most top-level query
    /// columns compile as [`RdfTermType::Unknown`] — see
    /// `value_codec::decode_column_with_type`).
    pub fn value_type(&self, i: usize) -> RdfTermType {
        self.current_row().types[i]
    }

    fn current_row(&self) -> &CursorRow {
        let position = self.position.expect("next() must be called before reading a column");
        &self.rows[position]
    }
}

/// spec §6's `manager`: owns the storage collaborator and the
/// generation-keyed statement cache, and compiles/plans/executes SPARQL
/// text against it.
pub struct SparqlEngine {
    storage: Mutex<SqliteStorage>,
    cache: StatementCache,
    policy: GraphPolicy,
}

impl SparqlEngine {
    pub fn open(path: &str, ontology: Ontology, options: EngineOptions) -> EngineResult<Self> {
        let cache = StatementCache::new(options.statement_cache_size);
        let policy = resolve_policy(options.policy_graphs.as_deref())?;
        let storage = SqliteStorage::open(path, ontology, options)?;
        Ok(Self { storage: Mutex::new(storage), cache, policy })
    }

    fn storage(&self) -> std::sync::MutexGuard<'_, SqliteStorage> {
        self.storage.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Parses and compiles `sparql_text` as a query (spec §6 `open`).
    pub fn open_query(&self, sparql_text: &str) -> EngineResult<QueryHandle> {
        let query = Query::parse(sparql_text, None).map_err(|e| EngineError::Parse(e.to_string()))?;
        let storage = self.storage();
        self.cache.sync_generation(storage.generation());
        let compiled = compile_query(storage.ontology(), &query, &self.policy).map_err(from_compile)?;
        self.cache.insert(compiled.text.clone(), true);
        Ok(QueryHandle { query, compiled })
    }

    /// Runs `handle` against `parameters` (spec §6 `execute_cursor`).
    pub fn execute_cursor(&self, handle: &QueryHandle, parameters: &HashMap<String, Value>) -> EngineResult<Cursor> {
        let parameters: FxHashMap<String, Value> = parameters.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let storage = self.storage();
        let conn = storage.connection();
        let mut stmt = conn.prepare(&handle.compiled.text).map_err(from_rusqlite)?;
        for (idx, binding) in handle.compiled.bindings.iter().enumerate() {
            crate::binder::bind_one(conn, &mut stmt, idx + 1, binding, &parameters)?;
        }
        let variable_names: Vec<String> =
            handle.compiled.columns.iter().map(|c| c.variable.as_str().to_owned()).collect();

        let mut rows_out = Vec::new();
        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next().map_err(from_rusqlite)? {
            let mut values = Vec::with_capacity(variable_names.len());
            let mut types = Vec::with_capacity(variable_names.len());
            for (idx, column) in handle.compiled.columns.iter().enumerate() {
                let (value, resolved) = value_codec::decode_column_with_type(conn, row, idx, column.data_type)?;
                values.push(value);
                types.push(resolved);
            }
            rows_out.push(CursorRow { values, types });
        }
        Ok(Cursor { variable_names, rows: rows_out, position: None })
    }

    /// Parses and plans `sparql_text` as an update (spec §6 `open_update`).
    pub fn open_update(&self, sparql_text: &str) -> EngineResult<UpdateHandle> {
        let update = Update::parse(sparql_text, None).map_err(|e| EngineError::Parse(e.to_string()))?;
        let storage = self.storage();
        let plan = plan_update(storage.ontology(), &update, &self.policy).map_err(from_update)?;
        Ok(UpdateHandle { plan })
    }

    /// Runs `handle` against `parameters`/`bnode_map_in`, committing the
    /// whole plan in one transaction (spec §6 `execute_update`). When
    /// `collect_bnodes` is set, returns every blank node this call
    /// allocated, labelled by its update-text identifier.
    ///
    /// spec §6 describes `bnodes_out` as a 3-level array keyed by op-group
    /// and then solution row; [`BnodeMapper`] (spec §4.11) tracks its
    /// fresh allocations as one flat list rather than per-group-per-row,
    /// so this reports them as a single flattened row instead of
    /// reproducing that exact nesting — see DESIGN.md.
    pub fn execute_update(
        &self,
        handle: &UpdateHandle,
        parameters: &HashMap<String, Value>,
        bnode_map_in: HashMap<String, i64>,
        collect_bnodes: bool,
    ) -> EngineResult<Vec<HashMap<String, String>>> {
        let parameters: FxHashMap<String, Value> = parameters.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let map_in: FxHashMap<String, RowId> = bnode_map_in.into_iter().map(|(k, v)| (k, RowId::new(v))).collect();
        let mut bnodes = BnodeMapper::new(BlankNodeMappingMode::MapAndAllocate, map_in);

        let storage = self.storage();
        storage.begin_update_transaction()?;
        let (mut sink, mut runner) = storage.split_for_update(&parameters);
        let result =
            execute_plan(storage.ontology(), &handle.plan, &mut sink, &mut runner, &mut bnodes, &self.policy).map_err(from_update);
        drop(sink);
        drop(runner);

        match result {
            Ok(()) => storage.commit_update_transaction()?,
            Err(err) => {
                storage.rollback_update_transaction()?;
                return Err(err);
            }
        }
        self.cache.sync_generation(storage.generation());

        if !collect_bnodes {
            return Ok(Vec::new());
        }
        let row: HashMap<String, String> =
            bnodes.fresh_bindings().iter().map(|(label, id)| (label.clone(), format!("urn:bnode:{}", id.get()))).collect();
        Ok(vec![row])
    }
}

/// Parses `EngineOptions::policy_graphs` into a [`GraphPolicy`] at open time
/// (spec §4.6 `policy.graphs`): absent means unrestricted, present means the
/// engine rejects any graph not in the list for the lifetime of the handle.
fn resolve_policy(graphs: Option<&[String]>) -> EngineResult<GraphPolicy> {
    let Some(graphs) = graphs else { return Ok(GraphPolicy::unrestricted()) };
    let parsed = graphs
        .iter()
        .map(|iri| NamedNode::new(iri).map(GraphName::NamedNode).map_err(|e| EngineError::Parse(e.to_string())))
        .collect::<EngineResult<Vec<_>>>()?;
    Ok(GraphPolicy::restricted(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdfsql_model::NamedNode;
    use rdfsql_ontology::Property;

    fn test_ontology() -> Ontology {
        let name = NamedNode::new("http://ex/name").expect("valid iri");
        let knows = NamedNode::new("http://ex/knows").expect("valid iri");
        Ontology::builder()
            .with_property(Property::new(name, RdfTermType::String, "Person", "name", false))
            .with_property(Property::new(knows, RdfTermType::Resource, "knows", "value", true))
            .build()
    }

    fn open_engine() -> SparqlEngine {
        SparqlEngine::open(":memory:", test_ontology(), EngineOptions::default()).expect("opens")
    }

    #[test]
    fn insert_then_select_round_trips_a_literal() {
        let engine = open_engine();
        let insert = engine.open_update("INSERT DATA { <http://ex/a> <http://ex/name> \"Ada\" }").expect("plans");
        engine.execute_update(&insert, &HashMap::new(), HashMap::new(), false).expect("executes");

        let select = engine.open_query("SELECT ?name WHERE { <http://ex/a> <http://ex/name> ?name }").expect("compiles");
        let mut cursor = engine.execute_cursor(&select, &HashMap::new()).expect("runs");
        assert!(cursor.next());
        assert_eq!(cursor.get_value(0), &Value::String("Ada".to_owned()));
        assert!(!cursor.next());
    }

    #[test]
    fn delete_insert_rewrites_a_binding() {
        let engine = open_engine();
        let insert = engine.open_update("INSERT DATA { <http://ex/a> <http://ex/name> \"Ada\" }").expect("plans");
        engine.execute_update(&insert, &HashMap::new(), HashMap::new(), false).expect("executes");

        let rewrite = engine
            .open_update(
                "DELETE { <http://ex/a> <http://ex/name> ?old } \
                 INSERT { <http://ex/a> <http://ex/name> \"Augusta\" } \
                 WHERE { <http://ex/a> <http://ex/name> ?old }",
            )
            .expect("plans");
        engine.execute_update(&rewrite, &HashMap::new(), HashMap::new(), false).expect("executes");

        let select = engine.open_query("SELECT ?name WHERE { <http://ex/a> <http://ex/name> ?name }").expect("compiles");
        let mut cursor = engine.execute_cursor(&select, &HashMap::new()).expect("runs");
        assert!(cursor.next());
        assert_eq!(cursor.get_value(0), &Value::String("Augusta".to_owned()));
    }

    #[test]
    fn insert_data_with_a_labelled_blank_node_reports_it_back() {
        let engine = open_engine();
        let insert = engine.open_update("INSERT DATA { _:x <http://ex/name> \"Anon\" }").expect("plans");
        let bnodes = engine.execute_update(&insert, &HashMap::new(), HashMap::new(), true).expect("executes");
        assert_eq!(bnodes.len(), 1);
        assert!(bnodes[0].contains_key("x"));
    }

    #[test]
    fn construct_and_describe_are_serializable_select_and_ask_are_not() {
        let engine = open_engine();
        let construct = engine.open_query("CONSTRUCT { ?s <http://ex/name> ?o } WHERE { ?s <http://ex/name> ?o }").expect("compiles");
        assert!(construct.is_serializable());

        let describe = engine.open_query("DESCRIBE <http://ex/a>").expect("compiles");
        assert!(describe.is_serializable());

        let select = engine.open_query("SELECT ?s WHERE { ?s <http://ex/name> ?o }").expect("compiles");
        assert!(!select.is_serializable());

        let ask = engine.open_query("ASK { ?s <http://ex/name> ?o }").expect("compiles");
        assert!(!ask.is_serializable());
    }

    #[test]
    fn a_malformed_query_is_a_parse_error() {
        let engine = open_engine();
        let err = engine.open_query("SELECT ?x WHERE {").expect_err("must fail");
        assert!(matches!(err, EngineError::Parse(_)));
    }

    #[test]
    fn a_policy_denies_queries_against_graphs_outside_its_allow_list() {
        let options = EngineOptions { policy_graphs: Some(vec!["http://ex/allowed".to_owned()]), ..EngineOptions::default() };
        let engine = SparqlEngine::open(":memory:", test_ontology(), options).expect("opens");

        engine
            .open_query("SELECT ?s WHERE { GRAPH <http://ex/allowed> { ?s <http://ex/name> ?o } }")
            .expect("allowed graph compiles");

        let err = engine
            .open_query("SELECT ?s WHERE { GRAPH <http://ex/other> { ?s <http://ex/name> ?o } }")
            .expect_err("must be rejected");
        assert!(matches!(err, EngineError::ConstraintViolation(_)));
    }

    #[test]
    fn a_policy_denies_creating_a_graph_outside_its_allow_list() {
        let options = EngineOptions { policy_graphs: Some(vec!["http://ex/allowed".to_owned()]), ..EngineOptions::default() };
        let engine = SparqlEngine::open(":memory:", test_ontology(), options).expect("opens");

        let create = engine.open_update("CREATE GRAPH <http://ex/other>").expect("plans");
        let err = engine.execute_update(&create, &HashMap::new(), HashMap::new(), false).expect_err("must fail");
        assert!(matches!(err, EngineError::ConstraintViolation(_)));
    }
}
