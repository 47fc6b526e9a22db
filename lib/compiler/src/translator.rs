//! The query translator (spec §4.8 "Compile a query"): the top-level
//! dispatcher that walks a `spargebra` algebra tree and composes the
//! fragments `triples`, `path`, `graph` and `expr` produce into one
//! parameterized SQL statement.
//!
//! Every [`GraphPattern`] compiles to a standalone, complete `SELECT`
//! statement whose output columns are named exactly after the SPARQL
//! variables it binds. Combinators (`Join`, `Filter`, `Union`, ...) treat
//! their children's statements as opaque derived tables — this costs some
//! query-planning elegance next to a single flattened `FROM`, but keeps
//! each rewrite rule a pure, local function of its children's output
//! shape, which is what makes the recursion tractable grounded on a rule
//! dispatch rather than a mutable accumulator threaded through the whole
//! tree.

use itertools::Itertools;
use rdfsql_model::{GraphName, NamedNodePattern, RdfTermType, Variable};
use rdfsql_ontology::Ontology;
use spargebra::algebra::{AggregationFunction, GraphPattern, OrderComparator};
use spargebra::term::GroundTerm;
use spargebra::Query;

use crate::binding::{Binding, LiteralBinding, VariableBinding};
use crate::context::{ContextId, ContextKind, ContextStack, TripleContextData};
use crate::error::{CompileError, CompileResult};
use crate::expr::ExprCompiler;
use crate::graph::{ActiveGraph, GraphPolicy, GraphScope};
use crate::sql::{CompiledSql, ProjectedColumn};
use crate::triples::compile_bgp;

/// A compiled graph pattern: a complete, standalone `SELECT` statement,
/// plus the variables (in output order) it projects.
struct PatternSql {
    select: String,
    variables: Vec<Variable>,
}

/// Compiles a parsed `SELECT`/`ASK`/`CONSTRUCT`/`DESCRIBE` query into SQL,
/// bounding every graph it can read by `policy` (spec §4.6 `policy.graphs`).
pub fn compile_query(ontology: &Ontology, query: &Query, policy: &GraphPolicy) -> CompileResult<CompiledSql> {
    let mut ctx = ContextStack::new();
    let root = ctx.current();
    match query {
        Query::Select { dataset, pattern, .. } => {
            let graph_scope = dataset_scope(dataset.as_ref(), policy)?;
            let compiled = compile_pattern(&mut ctx, root, ontology, &graph_scope, pattern)?;
            finish(ctx, compiled)
        }
        Query::Ask { dataset, pattern, .. } => {
            let graph_scope = dataset_scope(dataset.as_ref(), policy)?;
            let compiled = compile_pattern(&mut ctx, root, ontology, &graph_scope, pattern)?;
            let select = format!("SELECT EXISTS ({}) AS \"_askResult\"", compiled.select);
            finish(ctx, PatternSql { select, variables: vec![Variable::new_unchecked("_askResult")] })
        }
        Query::Construct { pattern, dataset, .. } => {
            // CONSTRUCT's output is a triple stream, not a SQL result set; the
            // translator only needs to compile the WHERE pattern here, the
            // engine facade re-runs the template client-side per solution row
            // (spec §4.8, Non-goal on re-implementing the RDF serializer).
            let graph_scope = dataset_scope(dataset.as_ref(), policy)?;
            let compiled = compile_pattern(&mut ctx, root, ontology, &graph_scope, pattern)?;
            finish(ctx, compiled)
        }
        Query::Describe { pattern, dataset, .. } => {
            let graph_scope = dataset_scope(dataset.as_ref(), policy)?;
            let compiled = compile_pattern(&mut ctx, root, ontology, &graph_scope, pattern)?;
            finish(ctx, compiled)
        }
    }
}

/// Compiles an update's `WHERE`/`USING` pattern the same way a `SELECT`'s
/// is compiled (spec §4.10 `prepare_update_where_clause_select`): one
/// throwaway root context, every referenced variable projected in output
/// order. The update executor drives this as an ordinary cursor and
/// substitutes each row's bindings into the operation's quad templates.
pub fn compile_update_where(
    ontology: &Ontology,
    dataset: Option<&spargebra::algebra::QueryDataset>,
    pattern: &GraphPattern,
    policy: &GraphPolicy,
) -> CompileResult<CompiledSql> {
    let mut ctx = ContextStack::new();
    let root = ctx.current();
    let graph_scope = dataset_scope(dataset, policy)?;
    let compiled = compile_pattern(&mut ctx, root, ontology, &graph_scope, pattern)?;
    finish(ctx, compiled)
}

fn dataset_scope(
    dataset: Option<&spargebra::algebra::QueryDataset>,
    policy: &GraphPolicy,
) -> CompileResult<GraphScope> {
    GraphScope::new(dataset_to_active_graph(dataset)).with_policy(policy.clone())
}

fn finish(ctx: ContextStack, pattern: PatternSql) -> CompileResult<CompiledSql> {
    let root = ctx.root_select();
    let bindings: Vec<Binding> = ctx.select(root).literal_bindings.clone();
    let columns = pattern
        .variables
        .iter()
        .map(|v| ProjectedColumn { variable: v.clone(), data_type: RdfTermType::Unknown })
        .collect();
    let mut text = pattern.select;
    let ctes = collect_ctes(&ctx, root);
    if !ctes.is_empty() {
        let with_clause = ctes.iter().map(|(name, body)| format!("{name} AS (\n{body}\n)")).join(",\n");
        text = format!("WITH RECURSIVE {with_clause}\n{text}");
    }
    Ok(CompiledSql::new(text, bindings, columns))
}

fn collect_ctes(ctx: &ContextStack, root: ContextId) -> Vec<(String, String)> {
    ctx.select(root).ctes.clone()
}

fn dataset_to_active_graph(dataset: Option<&spargebra::algebra::QueryDataset>) -> ActiveGraph {
    match dataset {
        // No FROM/FROM NAMED at all: the default dataset is every graph
        // merged together (spec §4.6 "anon_graphs: ... null = all graphs
        // merged"), not just the unnamed default graph.
        None => ActiveGraph::AllGraphs,
        Some(dataset) => {
            let mut graphs: Vec<GraphName> =
                dataset.default.iter().map(|n| GraphName::NamedNode(n.clone())).collect();
            if let Some(named) = &dataset.named {
                graphs.extend(named.iter().map(|n| GraphName::NamedNode(n.clone())));
            }
            ActiveGraph::Union(graphs)
        }
    }
}

fn compile_pattern(
    ctx: &mut ContextStack,
    scope: ContextId,
    ontology: &Ontology,
    graph_scope: &GraphScope,
    pattern: &GraphPattern,
) -> CompileResult<PatternSql> {
    match pattern {
        GraphPattern::Bgp(patterns) => compile_bgp_pattern(ctx, scope, ontology, graph_scope, patterns),
        GraphPattern::Path { subject, path, object } => {
            compile_path_pattern(ctx, scope, graph_scope, subject, path, object)
        }
        GraphPattern::Join { left, right } => {
            compile_join(ctx, scope, ontology, graph_scope, left, right, JoinKind::Inner, None)
        }
        GraphPattern::LeftJoin { left, right, expr } => {
            compile_join(ctx, scope, ontology, graph_scope, left, right, JoinKind::Left, expr.as_ref())
        }
        GraphPattern::Filter { expr, inner } => {
            let inner_sql = compile_pattern(ctx, scope, ontology, graph_scope, inner)?;
            let (alias, inner_scope) = wrap_as_source(ctx, scope, &inner_sql);
            let cond = compile_expr(ctx, inner_scope, ontology, graph_scope, expr)?;
            ctx.pop_to_parent_of(inner_scope);
            Ok(PatternSql {
                select: format!(
                    "SELECT * FROM ({}) AS \"{alias}\" WHERE {}",
                    inner_sql.select, cond
                ),
                variables: inner_sql.variables,
            })
        }
        GraphPattern::Union { left, right } => compile_union(ctx, scope, ontology, graph_scope, left, right),
        GraphPattern::Graph { graph_name, inner } => {
            compile_graph_pattern(ctx, scope, ontology, graph_scope, graph_name, inner)
        }
        GraphPattern::Extend { inner, var, expr } => {
            let inner_sql = compile_pattern(ctx, scope, ontology, graph_scope, inner)?;
            let (alias, inner_scope) = wrap_as_source(ctx, scope, &inner_sql);
            let value = compile_expr(ctx, inner_scope, ontology, graph_scope, expr)?;
            ctx.pop_to_parent_of(inner_scope);
            let mut variables = inner_sql.variables.clone();
            variables.retain(|v| v != var);
            variables.push(var.clone());
            Ok(PatternSql {
                select: format!(
                    "SELECT *, {value} AS \"{}\" FROM ({}) AS \"{alias}\"",
                    var.as_str(),
                    inner_sql.select
                ),
                variables,
            })
        }
        GraphPattern::Minus { left, right } => compile_minus(ctx, scope, ontology, graph_scope, left, right),
        GraphPattern::Table { variables, rows } => compile_values(variables, rows),
        GraphPattern::OrderBy { inner, condition } => {
            let inner_sql = compile_pattern(ctx, scope, ontology, graph_scope, inner)?;
            let (alias, inner_scope) = wrap_as_source(ctx, scope, &inner_sql);
            let mut terms = Vec::with_capacity(condition.len());
            for comparator in condition {
                let (expr, desc) = match comparator {
                    OrderComparator::Asc(e) => (e, false),
                    OrderComparator::Desc(e) => (e, true),
                };
                let compiled = compile_expr_typed(ctx, inner_scope, ontology, graph_scope, expr)?;
                // spec §4.8/§4.9: string comparators sort under the locale
                // collation rather than SQLite's default byte order, and
                // date/dateTime/time comparators sort on their chronological
                // value rather than their ISO text (which two differently-
                // formatted-but-equal instants wouldn't share).
                let sql = match compiled.data_type {
                    RdfTermType::String | RdfTermType::LangString => format!("{} COLLATE TRACKER", compiled.sql),
                    RdfTermType::Date | RdfTermType::DateTime | RdfTermType::Time => {
                        format!("sparql_time_sort({})", compiled.sql)
                    }
                    _ => compiled.sql,
                };
                terms.push(if desc { format!("{sql} DESC") } else { format!("{sql} ASC") });
            }
            ctx.pop_to_parent_of(inner_scope);
            Ok(PatternSql {
                select: format!(
                    "SELECT * FROM ({}) AS \"{alias}\" ORDER BY {}",
                    inner_sql.select,
                    terms.join(", ")
                ),
                variables: inner_sql.variables,
            })
        }
        GraphPattern::Project { inner, projection } => {
            let inner_sql = compile_pattern(ctx, scope, ontology, graph_scope, inner)?;
            let (alias, _) = wrap_as_source(ctx, scope, &inner_sql);
            let cols = projection.iter().map(|v| format!("\"{}\"", v.as_str())).join(", ");
            Ok(PatternSql {
                select: format!("SELECT {cols} FROM ({}) AS \"{alias}\"", inner_sql.select),
                variables: projection.clone(),
            })
        }
        GraphPattern::Distinct { inner } => {
            let inner_sql = compile_pattern(ctx, scope, ontology, graph_scope, inner)?;
            Ok(PatternSql {
                select: replace_select_keyword(&inner_sql.select, "SELECT DISTINCT"),
                variables: inner_sql.variables,
            })
        }
        GraphPattern::Reduced { inner } => compile_pattern(ctx, scope, ontology, graph_scope, inner),
        GraphPattern::Slice { inner, start, length } => {
            let inner_sql = compile_pattern(ctx, scope, ontology, graph_scope, inner)?;
            let limit = length.map(|l| l.to_string()).unwrap_or_else(|| "-1".to_owned());
            Ok(PatternSql {
                select: format!("{} LIMIT {limit} OFFSET {start}", inner_sql.select),
                variables: inner_sql.variables,
            })
        }
        GraphPattern::Group { inner, by, aggregates } => {
            compile_group(ctx, scope, ontology, graph_scope, inner, by, aggregates)
        }
        GraphPattern::Service { silent, .. } => {
            if *silent {
                Ok(PatternSql { select: "SELECT 1 WHERE 0".to_owned(), variables: Vec::new() })
            } else {
                Err(CompileError::Unsupported("SERVICE (federated query)".to_owned()))
            }
        }
    }
}

fn compile_bgp_pattern(
    ctx: &mut ContextStack,
    scope: ContextId,
    ontology: &Ontology,
    graph_scope: &GraphScope,
    patterns: &[spargebra::term::TriplePattern],
) -> CompileResult<PatternSql> {
    let triple_scope = ctx.push(ContextKind::Triple(TripleContextData::default()));
    let compiled = compile_bgp(ctx, triple_scope, ontology, graph_scope, patterns)?;
    let variables = variables_of_triple_scope(ctx, triple_scope);
    let select_list = if variables.is_empty() {
        "1 AS \"_unit\"".to_owned()
    } else {
        variables
            .iter()
            .map(|v| {
                let binding = ctx.triple(triple_scope).variable_bindings[v.as_str()][0].clone();
                format!("{} AS \"{}\"", binding.sql_expression(), v.as_str())
            })
            .join(", ")
    };
    let from = if compiled.joins.is_empty() { "(SELECT 1) AS \"_unit\"".to_owned() } else { compiled.joins.join(", ") };
    let where_clause = if compiled.conditions.is_empty() { "1 = 1".to_owned() } else { compiled.conditions.join(" AND ") };
    ctx.pop_to_parent_of(triple_scope);
    Ok(PatternSql { select: format!("SELECT {select_list} FROM {from} WHERE {where_clause}"), variables })
}

fn variables_of_triple_scope(ctx: &ContextStack, triple_scope: ContextId) -> Vec<Variable> {
    ctx.triple(triple_scope)
        .variable_bindings
        .keys()
        .filter(|k| !k.starts_with("_:"))
        .map(|k| Variable::new_unchecked(k.clone()))
        .sorted_by(|a, b| a.as_str().cmp(b.as_str()))
        .collect()
}

fn compile_path_pattern(
    ctx: &mut ContextStack,
    scope: ContextId,
    graph_scope: &GraphScope,
    subject: &spargebra::term::TermPattern,
    path: &spargebra::algebra::PropertyPathExpression,
    object: &spargebra::term::TermPattern,
) -> CompileResult<PatternSql> {
    use crate::path::PathCompiler;

    let root = ctx.root_select();
    let path_id = ctx.select_mut(root).path_elements.from_expression(path);
    let arena_snapshot = ctx.select(root).path_elements.clone();
    let mut bind_iri = |iri: &rdfsql_model::NamedNode| {
        format!("__IRI_PLACEHOLDER__{}", iri.as_str())
    };
    let mut compiler = PathCompiler::new(&mut bind_iri);
    let compiled = compiler.compile(&arena_snapshot, path_id);

    // Resolve placeholder markers to real positional bindings now that we're
    // back under a mutable borrow of `ctx`.
    let select_with_placeholders = compiled.select;
    let (select, ctes) = resolve_iri_placeholders(ctx, select_with_placeholders, compiled.ctes);
    ctx.select_mut(root).register_ctes(ctes);

    let triple_scope = ctx.push(ContextKind::Triple(TripleContextData::default()));
    let alias = ctx.fresh_table_alias(triple_scope);
    let graph_column = format!("\"{alias}\".\"graph\"");
    let mut conditions = Vec::new();
    if let Some(filter) = crate::graph::compile_graph_filter(&graph_scope.active, &graph_column, &mut |g| {
        ctx.bind_literal(Binding::Literal(LiteralBinding {
            bytes: g.to_string().into_bytes(),
            data_type: RdfTermType::Resource,
            placeholder: String::new(),
        }))
    }) {
        conditions.push(filter);
    }
    if let Some(var) = &graph_scope.bind_var {
        crate::triples::bind_variable(ctx, triple_scope, &alias, "graph", RdfTermType::Resource, var, &mut conditions);
    }
    bind_path_endpoint(ctx, triple_scope, &alias, "source", subject, &mut conditions)?;
    bind_path_endpoint(ctx, triple_scope, &alias, "target", object, &mut conditions)?;
    let variables = variables_of_triple_scope(ctx, triple_scope);
    let select_list = variables
        .iter()
        .map(|v| {
            let binding = ctx.triple(triple_scope).variable_bindings[v.as_str()][0].clone();
            format!("{} AS \"{}\"", binding.sql_expression(), v.as_str())
        })
        .join(", ");
    let select_list = if select_list.is_empty() { "1 AS \"_unit\"".to_owned() } else { select_list };
    let where_clause = if conditions.is_empty() { "1 = 1".to_owned() } else { conditions.join(" AND ") };
    ctx.pop_to_parent_of(triple_scope);
    Ok(PatternSql {
        select: format!("SELECT {select_list} FROM ({select}) AS \"{alias}\" WHERE {where_clause}"),
        variables,
    })
}

fn bind_path_endpoint(
    ctx: &mut ContextStack,
    scope: ContextId,
    alias: &str,
    column: &str,
    term: &spargebra::term::TermPattern,
    conditions: &mut Vec<String>,
) -> CompileResult<()> {
    match term {
        spargebra::term::TermPattern::Variable(var) => {
            let binding = Binding::Variable(VariableBinding {
                variable: var.clone(),
                class: None,
                sql_query_tablename: alias.to_owned(),
                sql_db_column_name: column.to_owned(),
                data_type: RdfTermType::Resource,
                nullable: false,
            });
            ctx.triple_mut(scope).variable_bindings.entry(var.as_str().to_owned()).or_default().push(binding);
            ctx.declare_variable(ctx.nearest_select(scope), var.as_str());
            Ok(())
        }
        spargebra::term::TermPattern::NamedNode(iri) => {
            let placeholder = ctx.bind_literal(Binding::Literal(LiteralBinding {
                bytes: iri.as_str().as_bytes().to_vec(),
                data_type: RdfTermType::Resource,
                placeholder: String::new(),
            }));
            conditions.push(format!("\"{alias}\".\"{column}\" = {placeholder}"));
            Ok(())
        }
        spargebra::term::TermPattern::BlankNode(_) | spargebra::term::TermPattern::Literal(_) => {
            Err(CompileError::Type("property path endpoints must be IRIs or variables".to_owned()))
        }
        #[cfg(feature = "rdf-star")]
        spargebra::term::TermPattern::Triple(_) => {
            Err(CompileError::Unsupported("RDF-star triple terms".to_owned()))
        }
    }
}

/// The path engine is compiled before the enclosing triple scope exists, so
/// IRI literals it needs bound are marked with a textual placeholder and
/// resolved here, once we're back in a context where `ctx.bind_literal` can
/// be called without a borrow conflict with the arena snapshot.
fn resolve_iri_placeholders_in(ctx: &mut ContextStack, text: String) -> String {
    let mut out = text;
    while let Some(start) = out.find("__IRI_PLACEHOLDER__") {
        let rest = &out[start + "__IRI_PLACEHOLDER__".len()..];
        let end = rest.find(|c: char| c == ' ' || c == ')' || c == ',').unwrap_or(rest.len());
        let iri = rest[..end].to_owned();
        let placeholder = ctx.bind_literal(Binding::Literal(LiteralBinding {
            bytes: iri.as_bytes().to_vec(),
            data_type: RdfTermType::Resource,
            placeholder: String::new(),
        }));
        out = format!("{}{}{}", &out[..start], placeholder, &rest[end..]);
    }
    out
}

fn resolve_iri_placeholders(
    ctx: &mut ContextStack,
    select: String,
    ctes: Vec<(String, String)>,
) -> (String, Vec<(String, String)>) {
    let select = resolve_iri_placeholders_in(ctx, select);
    let mut resolved_ctes = Vec::with_capacity(ctes.len());
    for (name, body) in ctes {
        resolved_ctes.push((name, resolve_iri_placeholders_in(ctx, body)));
    }
    (select, resolved_ctes)
}

enum JoinKind {
    Inner,
    Left,
}

#[allow(clippy::too_many_arguments, reason = "mirrors the Join/LeftJoin algebra node's own arity")]
fn compile_join(
    ctx: &mut ContextStack,
    scope: ContextId,
    ontology: &Ontology,
    graph_scope: &GraphScope,
    left: &GraphPattern,
    right: &GraphPattern,
    kind: JoinKind,
    extra_filter: Option<&spargebra::algebra::Expression>,
) -> CompileResult<PatternSql> {
    let left_sql = compile_pattern(ctx, scope, ontology, graph_scope, left)?;
    let right_sql = compile_pattern(ctx, scope, ontology, graph_scope, right)?;
    let (left_alias, left_scope) = wrap_as_source(ctx, scope, &left_sql);
    let (right_alias, right_scope) = wrap_as_source(ctx, scope, &right_sql);

    let shared: Vec<Variable> =
        left_sql.variables.iter().filter(|v| right_sql.variables.contains(v)).cloned().collect();
    let mut on_terms: Vec<String> = shared
        .iter()
        .map(|v| format!("\"{left_alias}\".\"{}\" = \"{right_alias}\".\"{}\"", v.as_str(), v.as_str()))
        .collect();

    let combined_scope = combine_scopes(ctx, scope, &[left_scope, right_scope]);
    if let Some(extra) = extra_filter {
        on_terms.push(compile_expr(ctx, combined_scope, ontology, graph_scope, extra)?);
    }
    let on_clause = if on_terms.is_empty() { "1 = 1".to_owned() } else { on_terms.join(" AND ") };

    let mut variables = left_sql.variables.clone();
    for v in &right_sql.variables {
        if !variables.contains(v) {
            variables.push(v.clone());
        }
    }
    let select_list = variables
        .iter()
        .map(|v| {
            if shared.contains(v) {
                format!(
                    "COALESCE(\"{left_alias}\".\"{}\", \"{right_alias}\".\"{}\") AS \"{}\"",
                    v.as_str(),
                    v.as_str(),
                    v.as_str()
                )
            } else if left_sql.variables.contains(v) {
                format!("\"{left_alias}\".\"{}\" AS \"{}\"", v.as_str(), v.as_str())
            } else {
                format!("\"{right_alias}\".\"{}\" AS \"{}\"", v.as_str(), v.as_str())
            }
        })
        .join(", ");
    let join_keyword = match kind {
        JoinKind::Inner => "JOIN",
        JoinKind::Left => "LEFT JOIN",
    };
    ctx.pop_to_parent_of(combined_scope);
    Ok(PatternSql {
        select: format!(
            "SELECT {select_list} FROM ({}) AS \"{left_alias}\" {join_keyword} ({}) AS \"{right_alias}\" ON {on_clause}",
            left_sql.select, right_sql.select
        ),
        variables,
    })
}

fn compile_union(
    ctx: &mut ContextStack,
    scope: ContextId,
    ontology: &Ontology,
    graph_scope: &GraphScope,
    left: &GraphPattern,
    right: &GraphPattern,
) -> CompileResult<PatternSql> {
    let left_sql = compile_pattern(ctx, scope, ontology, graph_scope, left)?;
    let right_sql = compile_pattern(ctx, scope, ontology, graph_scope, right)?;
    let (left_alias, _) = wrap_as_source(ctx, scope, &left_sql);
    let (right_alias, _) = wrap_as_source(ctx, scope, &right_sql);

    let mut variables = left_sql.variables.clone();
    for v in &right_sql.variables {
        if !variables.contains(v) {
            variables.push(v.clone());
        }
    }
    let left_cols = variables
        .iter()
        .map(|v| {
            if left_sql.variables.contains(v) {
                format!("\"{}\" AS \"{}\"", v.as_str(), v.as_str())
            } else {
                format!("NULL AS \"{}\"", v.as_str())
            }
        })
        .join(", ");
    let right_cols = variables
        .iter()
        .map(|v| {
            if right_sql.variables.contains(v) {
                format!("\"{}\" AS \"{}\"", v.as_str(), v.as_str())
            } else {
                format!("NULL AS \"{}\"", v.as_str())
            }
        })
        .join(", ");
    Ok(PatternSql {
        select: format!(
            "SELECT {left_cols} FROM ({}) AS \"{left_alias}\" UNION ALL SELECT {right_cols} FROM ({}) AS \"{right_alias}\"",
            left_sql.select, right_sql.select
        ),
        variables,
    })
}

fn compile_minus(
    ctx: &mut ContextStack,
    scope: ContextId,
    ontology: &Ontology,
    graph_scope: &GraphScope,
    left: &GraphPattern,
    right: &GraphPattern,
) -> CompileResult<PatternSql> {
    let left_sql = compile_pattern(ctx, scope, ontology, graph_scope, left)?;
    let right_sql = compile_pattern(ctx, scope, ontology, graph_scope, right)?;
    let shared: Vec<&Variable> =
        left_sql.variables.iter().filter(|v| right_sql.variables.contains(v)).collect();
    if shared.is_empty() {
        // Disjoint domains: MINUS never excludes anything (SPARQL semantics).
        return Ok(left_sql);
    }
    let (left_alias, _) = wrap_as_source(ctx, scope, &left_sql);
    let (right_alias, _) = wrap_as_source(ctx, scope, &right_sql);
    let conditions = shared
        .iter()
        .map(|v| format!("\"{left_alias}\".\"{}\" = \"{right_alias}\".\"{}\"", v.as_str(), v.as_str()))
        .join(" AND ");
    Ok(PatternSql {
        select: format!(
            "SELECT * FROM ({}) AS \"{left_alias}\" WHERE NOT EXISTS (SELECT 1 FROM ({}) AS \"{right_alias}\" WHERE {conditions})",
            left_sql.select, right_sql.select
        ),
        variables: left_sql.variables,
    })
}

fn compile_graph_pattern(
    ctx: &mut ContextStack,
    scope: ContextId,
    ontology: &Ontology,
    outer_scope: &GraphScope,
    graph_name: &NamedNodePattern,
    inner: &GraphPattern,
) -> CompileResult<PatternSql> {
    // A nested `GRAPH` clause's own graph set is still bounded by the
    // enclosing scope's policy (spec §4.6: policy applies at every graph
    // resolution point, not just the dataset's).
    match graph_name {
        NamedNodePattern::NamedNode(iri) => {
            let active = outer_scope.narrow(ActiveGraph::Union(vec![GraphName::NamedNode(iri.clone())]))?;
            let inner_scope = GraphScope::new(active).with_policy(outer_scope.policy.clone())?;
            compile_pattern(ctx, scope, ontology, &inner_scope, inner)
        }
        NamedNodePattern::Variable(graph_var) => {
            // Binding `?g` is the graph resolver's job, same as binding a
            // subject or object variable: every table a pattern inside this
            // block joins in has its own `graph` column, so `?g` is just
            // another slot each of them binds to (triples::bind_variable),
            // which also ties separate patterns in the same block to one
            // shared graph the ordinary way repeated variables do.
            let active = outer_scope.narrow(ActiveGraph::AnyNamedGraph)?;
            let inner_scope = GraphScope::with_bind_var(active, graph_var.clone()).with_policy(outer_scope.policy.clone())?;
            compile_pattern(ctx, scope, ontology, &inner_scope, inner)
        }
    }
}

fn compile_values(
    variables: &[Variable],
    rows: &[Vec<Option<GroundTerm>>],
) -> CompileResult<PatternSql> {
    if rows.is_empty() {
        let cols = variables.iter().map(|v| format!("NULL AS \"{}\"", v.as_str())).join(", ");
        return Ok(PatternSql { select: format!("SELECT {cols} WHERE 0"), variables: variables.to_vec() });
    }
    let mut row_selects = Vec::with_capacity(rows.len());
    for row in rows {
        let cols = row
            .iter()
            .zip(variables)
            .map(|(value, var)| match value {
                None => format!("NULL AS \"{}\"", var.as_str()),
                Some(GroundTerm::NamedNode(iri)) => {
                    format!("'{}' AS \"{}\"", escape_sql_string(iri.as_str()), var.as_str())
                }
                Some(GroundTerm::Literal(lit)) => {
                    format!("'{}' AS \"{}\"", escape_sql_string(lit.value()), var.as_str())
                }
                #[cfg(feature = "rdf-star")]
                Some(GroundTerm::Triple(_)) => "NULL".to_owned(),
            })
            .join(", ");
        row_selects.push(format!("SELECT {cols}"));
    }
    Ok(PatternSql { select: row_selects.join(" UNION ALL "), variables: variables.to_vec() })
}

fn escape_sql_string(s: &str) -> String {
    s.replace('\'', "''")
}

fn compile_group(
    ctx: &mut ContextStack,
    scope: ContextId,
    ontology: &Ontology,
    graph_scope: &GraphScope,
    inner: &GraphPattern,
    by: &[Variable],
    aggregates: &[(Variable, AggregationFunction)],
) -> CompileResult<PatternSql> {
    let inner_sql = compile_pattern(ctx, scope, ontology, graph_scope, inner)?;
    let (alias, inner_scope) = wrap_as_source(ctx, scope, &inner_sql);

    let mut select_parts: Vec<String> =
        by.iter().map(|v| format!("\"{}\" AS \"{}\"", v.as_str(), v.as_str())).collect();
    let mut variables: Vec<Variable> = by.to_vec();
    for (var, aggregate) in aggregates {
        let sql = compile_aggregate(ctx, inner_scope, ontology, graph_scope, aggregate)?;
        select_parts.push(format!("{sql} AS \"{}\"", var.as_str()));
        variables.push(var.clone());
    }
    ctx.pop_to_parent_of(inner_scope);

    let group_by = if by.is_empty() {
        String::new()
    } else {
        format!(" GROUP BY {}", by.iter().map(|v| format!("\"{}\"", v.as_str())).join(", "))
    };
    Ok(PatternSql {
        select: format!(
            "SELECT {} FROM ({}) AS \"{alias}\"{group_by}",
            select_parts.join(", "),
            inner_sql.select
        ),
        variables,
    })
}

fn compile_aggregate(
    ctx: &mut ContextStack,
    scope: ContextId,
    ontology: &Ontology,
    graph_scope: &GraphScope,
    aggregate: &AggregationFunction,
) -> CompileResult<String> {
    match aggregate {
        AggregationFunction::Count { expr: None, distinct } => {
            Ok(if *distinct { "COUNT(DISTINCT *)".to_owned() } else { "COUNT(*)".to_owned() })
        }
        AggregationFunction::Count { expr: Some(expr), distinct } => {
            let inner = compile_expr(ctx, scope, ontology, graph_scope, expr)?;
            Ok(aggregate_call("COUNT", &inner, *distinct))
        }
        AggregationFunction::Sum { expr, distinct } => {
            let inner = compile_expr(ctx, scope, ontology, graph_scope, expr)?;
            Ok(aggregate_call("SUM", &inner, *distinct))
        }
        AggregationFunction::Avg { expr, distinct } => {
            let inner = compile_expr(ctx, scope, ontology, graph_scope, expr)?;
            Ok(aggregate_call("AVG", &inner, *distinct))
        }
        AggregationFunction::Min { expr, distinct } => {
            let inner = compile_expr(ctx, scope, ontology, graph_scope, expr)?;
            Ok(aggregate_call("MIN", &inner, *distinct))
        }
        AggregationFunction::Max { expr, distinct } => {
            let inner = compile_expr(ctx, scope, ontology, graph_scope, expr)?;
            Ok(aggregate_call("MAX", &inner, *distinct))
        }
        AggregationFunction::Sample { expr, .. } => {
            let inner = compile_expr(ctx, scope, ontology, graph_scope, expr)?;
            Ok(format!("MIN({inner})"))
        }
        AggregationFunction::GroupConcat { expr, distinct, separator } => {
            let inner = compile_expr(ctx, scope, ontology, graph_scope, expr)?;
            let sep = separator.clone().unwrap_or_else(|| " ".to_owned());
            let call = aggregate_call("GROUP_CONCAT", &format!("{inner}, '{}'", escape_sql_string(&sep)), *distinct);
            Ok(call)
        }
        AggregationFunction::Custom { name, expr, distinct } => {
            let inner = compile_expr(ctx, scope, ontology, graph_scope, expr)?;
            let fn_name = format!("sparql_agg_{}", name.as_str().chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect::<String>());
            Ok(aggregate_call(&fn_name, &inner, *distinct))
        }
    }
}

fn aggregate_call(fn_name: &str, inner: &str, distinct: bool) -> String {
    if distinct {
        format!("{fn_name}(DISTINCT {inner})")
    } else {
        format!("{fn_name}({inner})")
    }
}

fn compile_expr(
    ctx: &mut ContextStack,
    scope: ContextId,
    ontology: &Ontology,
    graph_scope: &GraphScope,
    expr: &spargebra::algebra::Expression,
) -> CompileResult<String> {
    Ok(compile_expr_typed(ctx, scope, ontology, graph_scope, expr)?.sql)
}

/// Like [`compile_expr`], but keeps the [`RdfTermType`] the expression
/// evaluates to, for callers (`ORDER BY`) that need to pick a collation or
/// sort transform based on it.
fn compile_expr_typed(
    ctx: &mut ContextStack,
    scope: ContextId,
    ontology: &Ontology,
    graph_scope: &GraphScope,
    expr: &spargebra::algebra::Expression,
) -> CompileResult<crate::expr::ExprSql> {
    // An `EXISTS {...}` subquery isn't bounded by the enclosing dataset's
    // FROM/FROM NAMED (it is its own pattern), but it must still honor the
    // enclosing scope's security policy (spec §4.6) — otherwise a FILTER
    // could probe for the existence of triples in a policy-disallowed
    // graph the rest of the query could never touch.
    let mut exists = |ctx: &mut ContextStack, scope: ContextId, pattern: &GraphPattern| {
        let inner_scope = GraphScope::new(ActiveGraph::AllGraphs).with_policy(graph_scope.policy.clone())?;
        let compiled = compile_pattern(ctx, scope, ontology, &inner_scope, pattern)?;
        Ok(compiled.select)
    };
    let mut compiler = ExprCompiler { ctx, scope, exists: &mut exists };
    compiler.compile(expr)
}

fn wrap_as_source(ctx: &mut ContextStack, scope: ContextId, pattern: &PatternSql) -> (String, ContextId) {
    let alias = ctx.fresh_table_alias(scope);
    let new_scope = ctx.push(ContextKind::Triple(TripleContextData::default()));
    for var in &pattern.variables {
        let binding = Binding::Variable(VariableBinding {
            variable: var.clone(),
            class: None,
            sql_query_tablename: alias.clone(),
            sql_db_column_name: var.as_str().to_owned(),
            data_type: RdfTermType::Unknown,
            nullable: true,
        });
        ctx.triple_mut(new_scope).variable_bindings.entry(var.as_str().to_owned()).or_default().push(binding);
        ctx.declare_variable(ctx.nearest_select(new_scope), var.as_str());
    }
    (alias, new_scope)
}

fn combine_scopes(ctx: &mut ContextStack, scope: ContextId, scopes: &[ContextId]) -> ContextId {
    let combined = ctx.push(ContextKind::Triple(TripleContextData::default()));
    for &source in scopes {
        let entries: Vec<(String, Binding)> = ctx
            .triple(source)
            .variable_bindings
            .iter()
            .map(|(k, v)| (k.clone(), v[0].clone()))
            .collect();
        for (key, binding) in entries {
            ctx.triple_mut(combined).variable_bindings.entry(key.clone()).or_insert_with(|| vec![binding]);
            ctx.declare_variable(ctx.nearest_select(scope), &key);
        }
    }
    combined
}

fn replace_select_keyword(select: &str, replacement: &str) -> String {
    if let Some(rest) = select.strip_prefix("SELECT ") {
        format!("{replacement} {rest}")
    } else {
        format!("{replacement} * FROM ({select}) AS \"_distinct\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdfsql_model::NamedNode;
    use rdfsql_ontology::{Class, Property};

    fn test_ontology() -> Ontology {
        let knows = NamedNode::new("http://ex/knows").expect("valid iri");
        let name = NamedNode::new("http://ex/name").expect("valid iri");
        let tag = NamedNode::new("http://ex/tag").expect("valid iri");
        let born = NamedNode::new("http://ex/born").expect("valid iri");
        let person = NamedNode::new("http://ex/Person").expect("valid iri");
        Ontology::builder()
            .with_class(Class::new(person, "Person"))
            .with_property(Property::new(knows, RdfTermType::Resource, "knows", "value", true))
            .with_property(Property::new(name, RdfTermType::String, "Person", "name", false))
            .with_property(Property::new(tag, RdfTermType::String, "tag", "value", true))
            .with_property(Property::new(born, RdfTermType::Date, "Person", "born", false))
            .build()
    }

    fn compile(sparql: &str) -> CompiledSql {
        let ontology = test_ontology();
        let query = Query::parse(sparql, None).expect("valid query");
        compile_query(&ontology, &query, &GraphPolicy::unrestricted()).expect("compiles")
    }

    #[test]
    fn union_compiles_to_union_all_over_both_branches() {
        let compiled = compile(
            "SELECT ?p WHERE { { ?p <http://ex/name> \"Ada\" } UNION { ?p <http://ex/name> \"Bob\" } }",
        );
        assert!(compiled.text.contains("UNION ALL"));
    }

    #[test]
    fn minus_compiles_to_not_exists() {
        let compiled = compile(
            "SELECT ?p WHERE { ?p <http://ex/knows> ?q MINUS { ?p <http://ex/name> \"Ada\" } }",
        );
        assert!(compiled.text.contains("NOT EXISTS"));
    }

    #[test]
    fn order_by_a_string_variable_uses_the_tracker_collation() {
        let compiled = compile("SELECT ?name WHERE { ?p <http://ex/name> ?name } ORDER BY ?name");
        assert!(compiled.text.contains("COLLATE TRACKER"));
    }

    #[test]
    fn order_by_a_date_variable_wraps_it_for_chronological_sort() {
        let compiled = compile("SELECT ?born WHERE { ?p <http://ex/born> ?born } ORDER BY ?born");
        assert!(compiled.text.contains("sparql_time_sort("));
    }

    #[test]
    fn distinct_rewrites_the_root_select_keyword() {
        let compiled = compile("SELECT DISTINCT ?p WHERE { ?p <http://ex/knows> ?q }");
        assert!(compiled.text.contains("SELECT DISTINCT"));
    }

    #[test]
    fn slice_compiles_to_limit_and_offset() {
        let compiled = compile("SELECT ?p WHERE { ?p <http://ex/knows> ?q } LIMIT 5 OFFSET 10");
        assert!(compiled.text.contains("LIMIT 5 OFFSET 10"));
    }

    #[test]
    fn graph_variable_projects_the_matched_graph_as_a_column() {
        let compiled = compile("SELECT ?g ?p WHERE { GRAPH ?g { ?p <http://ex/knows> ?q } }");
        assert!(compiled.columns.iter().any(|c| c.variable.as_str() == "g"));
        assert!(compiled.text.contains("\"g\""));
    }

    #[test]
    fn ask_wraps_the_pattern_in_an_exists_projection() {
        let ontology = test_ontology();
        let query = Query::parse("ASK { ?p <http://ex/knows> ?q }", None).expect("valid query");
        let compiled = compile_query(&ontology, &query, &GraphPolicy::unrestricted()).expect("compiles");
        assert!(compiled.text.contains("EXISTS ("));
        assert_eq!(compiled.columns.len(), 1);
    }

    #[test]
    fn group_concat_aggregate_compiles_with_its_separator() {
        let compiled = compile(
            "SELECT ?p (GROUP_CONCAT(?tag; SEPARATOR=\",\") AS ?tags) \
             WHERE { ?p <http://ex/tag> ?tag } GROUP BY ?p",
        );
        assert!(compiled.text.contains("GROUP_CONCAT("));
        assert!(compiled.text.contains("','"));
    }

    #[test]
    fn an_unknown_dataset_graph_outside_the_policy_is_rejected() {
        let ontology = test_ontology();
        let query = Query::parse(
            "SELECT ?p WHERE { ?p <http://ex/knows> ?q }",
            None,
        )
        .expect("valid query");
        let dataset_query = Query::parse(
            "SELECT ?p FROM <http://ex/denied> WHERE { ?p <http://ex/knows> ?q }",
            None,
        )
        .expect("valid query");
        let policy = GraphPolicy::restricted(vec![GraphName::NamedNode(
            NamedNode::new("http://ex/allowed").expect("valid iri"),
        )]);
        compile_query(&ontology, &query, &policy).expect("dataset-less query still compiles under a restricted policy");
        let err = compile_query(&ontology, &dataset_query, &policy).expect_err("must be rejected");
        assert!(matches!(err, CompileError::PolicyViolation(_)));
    }
}
