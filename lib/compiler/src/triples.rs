//! The triple block compiler (spec §4.6 "Compile a triple block"): turns a
//! basic graph pattern into `FROM`/`JOIN` table references plus the
//! equality conditions that tie repeated variables and bound terms
//! together.

use rdfsql_model::{NamedNodePattern, RdfTermType, TermPattern, TriplePattern};
use rdfsql_ontology::Ontology;

use crate::binding::{Binding, LiteralBinding, VariableBinding};
use crate::context::{ContextId, ContextStack};
use crate::data_table::DataTable;
use crate::error::CompileResult;
use crate::graph::{compile_graph_filter, GraphScope};

/// Generic fallback relation scanned when a pattern's predicate is itself a
/// variable, or it has no narrower table to resolve to.
const GENERIC_TRIPLES_TABLE: &str = "tracker_triples";

/// `fts:match`, the pseudo-predicate a full-text filter triple uses in place
/// of an ordinary property IRI (spec §4.7 step 1).
const FTS_MATCH_IRI: &str = "http://www.tracker-project.org/ontologies/fts#match";

/// The SQL fragments produced for one basic graph pattern: the `JOIN`
/// clauses to append to the enclosing query's `FROM`, and the `WHERE`
/// conditions (already ANDed together) that constrain them.
pub struct CompiledBgp {
    pub joins: Vec<String>,
    pub conditions: Vec<String>,
}

pub fn compile_bgp(
    ctx: &mut ContextStack,
    scope: ContextId,
    ontology: &Ontology,
    graph_scope: &GraphScope,
    patterns: &[TriplePattern],
) -> CompileResult<CompiledBgp> {
    let mut joins = Vec::new();
    let mut conditions = Vec::new();

    for pattern in patterns {
        let alias = ctx.fresh_table_alias(scope);
        let resolved = resolve_pattern_table(ontology, pattern, &alias)?;
        let ResolvedPatternTable { table, subject_col, predicate_col, object_col, graph_col, fts_rank_col } = resolved;
        joins.push(table.sql_from_fragment());

        if let Some(graph_col) = &graph_col {
            let graph_column_sql = format!("\"{alias}\".\"{graph_col}\"");
            if let Some(filter) = compile_graph_filter(&graph_scope.active, &graph_column_sql, &mut |g| {
                ctx.bind_literal(Binding::Literal(LiteralBinding {
                    bytes: g.to_string().into_bytes(),
                    data_type: RdfTermType::Resource,
                    placeholder: String::new(),
                }))
            }) {
                conditions.push(filter);
            }
            if let Some(var) = &graph_scope.bind_var {
                bind_variable(ctx, scope, &alias, graph_col, RdfTermType::Resource, var, &mut conditions);
            }
        }

        bind_slot(ctx, scope, &alias, &subject_col, RdfTermType::Resource, &pattern.subject, &mut conditions)?;
        if let Some(predicate_col) = &predicate_col {
            bind_predicate_slot(ctx, scope, &alias, predicate_col, &pattern.predicate, &mut conditions)?;
        }
        if table.fts {
            // An fts5 table is queried with `MATCH` against the whole table,
            // never `column = value` (spec §4.7 step 1, §4.9).
            match &pattern.object {
                TermPattern::Literal(lit) => {
                    let placeholder = ctx.bind_literal(Binding::Literal(LiteralBinding {
                        bytes: lit.value().as_bytes().to_vec(),
                        data_type: RdfTermType::String,
                        placeholder: String::new(),
                    }));
                    conditions.push(format!("\"{alias}\" MATCH {placeholder}"));
                }
                TermPattern::Variable(_) => {
                    return Err(crate::error::CompileError::Unsupported(
                        "fts:match requires a literal query text".to_owned(),
                    ));
                }
                _ => return Err(crate::error::CompileError::Type("fts:match's object must be a string literal".to_owned())),
            }
        } else if let Some(object_col) = &object_col {
            bind_slot(ctx, scope, &alias, object_col, object_data_type(ontology, pattern), &pattern.object, &mut conditions)?;
        }
        if let Some(rank_col) = &fts_rank_col {
            bind_fts_subvariables(ctx, scope, &alias, rank_col, &pattern.subject);
        }
    }

    Ok(CompiledBgp { joins, conditions })
}

struct ResolvedPatternTable {
    table: DataTable,
    subject_col: String,
    predicate_col: Option<String>,
    /// `None` for an `rdf:type` pattern dispatched to a class table: the
    /// object term (the class itself) is already pinned by which table got
    /// picked, there is no value column left to bind it against.
    object_col: Option<String>,
    graph_col: Option<String>,
    /// Set for an `fts:match` pattern whose subject is a variable: the name
    /// of the FTS5 table's rank column, so `fts:rank(?s)` etc. has something
    /// to bind to (spec §4.7 step 5).
    fts_rank_col: Option<String>,
}

fn resolve_pattern_table(
    ontology: &Ontology,
    pattern: &TriplePattern,
    alias: &str,
) -> CompileResult<ResolvedPatternTable> {
    match &pattern.predicate {
        NamedNodePattern::NamedNode(iri) if is_rdf_type(iri) => Ok(resolve_type_pattern_table(ontology, pattern, alias)),
        NamedNodePattern::NamedNode(iri) if iri.as_str() == FTS_MATCH_IRI => {
            resolve_fts_pattern_table(ontology, pattern, alias)
        }
        NamedNodePattern::NamedNode(iri) => {
            let property = ontology.property(iri)?;
            let table = DataTable::new(property.sql_table_name(), alias);
            Ok(ResolvedPatternTable {
                table,
                subject_col: "ID".to_owned(),
                predicate_col: None,
                object_col: Some(property.sql_db_column_name().to_owned()),
                graph_col: Some("graph".to_owned()),
                fts_rank_col: None,
            })
        }
        NamedNodePattern::Variable(var) => {
            let table = DataTable::new(GENERIC_TRIPLES_TABLE, alias).with_predicate_variable(var.clone());
            Ok(ResolvedPatternTable {
                table,
                subject_col: "subject".to_owned(),
                predicate_col: Some("predicate".to_owned()),
                object_col: Some("object".to_owned()),
                graph_col: Some("graph".to_owned()),
                fts_rank_col: None,
            })
        }
    }
}

/// `rdf:type` + a statically-known, ontology-registered class object
/// dispatches straight to that class's domain table (spec §4.7 step 1,
/// "rdf:type + literal object -> class table (domain-filtered)") instead of
/// scanning the generic triples relation. An unbound type variable, or a
/// class IRI the ontology doesn't recognize, falls back to the generic
/// table the same way an ordinary unresolved predicate would.
fn resolve_type_pattern_table(ontology: &Ontology, pattern: &TriplePattern, alias: &str) -> ResolvedPatternTable {
    if let TermPattern::NamedNode(class_iri) = &pattern.object {
        if let Some(class) = ontology.try_class(class_iri) {
            let table = DataTable::new(class.sql_table_name(), alias);
            return ResolvedPatternTable {
                table,
                subject_col: "ID".to_owned(),
                predicate_col: None,
                object_col: None,
                graph_col: Some("graph".to_owned()),
                fts_rank_col: None,
            };
        }
    }
    let table = DataTable::new(GENERIC_TRIPLES_TABLE, alias);
    ResolvedPatternTable {
        table,
        subject_col: "subject".to_owned(),
        predicate_col: Some("predicate".to_owned()),
        object_col: Some("object".to_owned()),
        graph_col: Some("graph".to_owned()),
        fts_rank_col: None,
    }
}

/// `fts:match` dispatches to the fulltext-indexed property's FTS5 virtual
/// table (spec §4.7 step 1/§4.9): the object is the match query text, the
/// rank column is exposed so a variable subject can also pull
/// `fts:rank`/`fts:offsets`/`fts:snippet` off it.
fn resolve_fts_pattern_table(ontology: &Ontology, pattern: &TriplePattern, alias: &str) -> CompileResult<ResolvedPatternTable> {
    let TermPattern::Variable(subject_var) = &pattern.subject else {
        return Err(crate::error::CompileError::Unsupported(
            "fts:match requires a variable subject".to_owned(),
        ));
    };
    let property = ontology
        .properties()
        .find(|p| p.is_fulltext_indexed())
        .ok_or_else(|| crate::error::CompileError::Unsupported("no fulltext-indexed property in the ontology".to_owned()))?;
    let fts_table = fts_table_name(property.sql_table_name());
    let table = DataTable::new(fts_table, alias).with_fts(true).with_predicate_variable(subject_var.clone());
    Ok(ResolvedPatternTable {
        table,
        subject_col: "ID".to_owned(),
        predicate_col: None,
        object_col: Some(property.sql_db_column_name().to_owned()),
        // The fts5 shadow table carries no `graph` column of its own (it
        // indexes only the text column via an external-content table); an
        // `fts:match` triple inside a `GRAPH` block is not yet
        // graph-filtered, see DESIGN.md.
        graph_col: None,
        fts_rank_col: Some("rank".to_owned()),
    })
}

/// Name of the FTS5 shadow table that indexes a fulltext property's own
/// table (spec §1 "an integrated full-text index extension").
pub fn fts_table_name(property_table: &str) -> String {
    format!("{property_table}_fts")
}

/// Binds a variable subject's synthetic `$var:ftsRank`/`$var:ftsOffsets`/
/// `$var:ftsSnippet` sub-variables (spec §4.7 step 5, §4.9) to the FTS5
/// table's `rank`/`offsets`/`snippet` columns, so `expr.rs`'s
/// `fts:rank`/`fts:offsets`/`fts:snippet` calls on that subject have
/// something to resolve to instead of erroring as unbound.
fn bind_fts_subvariables(ctx: &mut ContextStack, scope: ContextId, alias: &str, _rank_col: &str, subject: &TermPattern) {
    let TermPattern::Variable(var) = subject else { return };
    let triple_scope = ctx.nearest_triple(scope);
    for (suffix, column, data_type) in [
        ("ftsRank", "rank", RdfTermType::Double),
        ("ftsOffsets", "offsets", RdfTermType::String),
        ("ftsSnippet", "snippet", RdfTermType::String),
    ] {
        let key = format!("{}:{suffix}", var.as_str());
        let binding = Binding::Variable(VariableBinding {
            variable: rdfsql_model::Variable::new_unchecked(key.clone()),
            class: None,
            sql_query_tablename: alias.to_owned(),
            sql_db_column_name: column.to_owned(),
            data_type,
            nullable: true,
        });
        ctx.triple_mut(triple_scope).variable_bindings.entry(key).or_default().push(binding);
    }
}

fn is_rdf_type(iri: &rdfsql_model::NamedNode) -> bool {
    iri.as_str() == oxrdf::vocab::rdf::TYPE.as_str()
}

fn object_data_type(ontology: &Ontology, pattern: &TriplePattern) -> RdfTermType {
    match &pattern.predicate {
        NamedNodePattern::NamedNode(iri) if is_rdf_type(iri) => RdfTermType::Resource,
        NamedNodePattern::NamedNode(iri) if iri.as_str() == FTS_MATCH_IRI => RdfTermType::String,
        NamedNodePattern::NamedNode(iri) => {
            ontology.property(iri).map(|p| p.data_type()).unwrap_or(RdfTermType::Unknown)
        }
        NamedNodePattern::Variable(_) => RdfTermType::Unknown,
    }
}

fn bind_predicate_slot(
    ctx: &mut ContextStack,
    scope: ContextId,
    alias: &str,
    column: &str,
    predicate: &NamedNodePattern,
    conditions: &mut Vec<String>,
) -> CompileResult<()> {
    match predicate {
        NamedNodePattern::NamedNode(iri) => {
            let placeholder = ctx.bind_literal(Binding::Literal(LiteralBinding {
                bytes: iri.as_str().as_bytes().to_vec(),
                data_type: RdfTermType::Resource,
                placeholder: String::new(),
            }));
            conditions.push(format!("\"{alias}\".\"{column}\" = {placeholder}"));
            Ok(())
        }
        NamedNodePattern::Variable(var) => {
            bind_variable(ctx, scope, alias, column, RdfTermType::Resource, var, conditions);
            Ok(())
        }
    }
}

fn bind_slot(
    ctx: &mut ContextStack,
    scope: ContextId,
    alias: &str,
    column: &str,
    data_type: RdfTermType,
    term: &TermPattern,
    conditions: &mut Vec<String>,
) -> CompileResult<()> {
    match term {
        TermPattern::NamedNode(iri) => {
            let placeholder = ctx.bind_literal(Binding::Literal(LiteralBinding {
                bytes: iri.as_str().as_bytes().to_vec(),
                data_type: RdfTermType::Resource,
                placeholder: String::new(),
            }));
            conditions.push(format!("\"{alias}\".\"{column}\" = {placeholder}"));
        }
        TermPattern::Literal(lit) => {
            let placeholder = ctx.bind_literal(Binding::Literal(LiteralBinding {
                bytes: lit.value().as_bytes().to_vec(),
                data_type,
                placeholder: String::new(),
            }));
            conditions.push(format!("\"{alias}\".\"{column}\" = {placeholder}"));
        }
        TermPattern::BlankNode(bnode) => {
            let synthetic = format!("_:{}", bnode.as_str());
            bind_variable_key(ctx, scope, alias, column, RdfTermType::Resource, &synthetic, conditions);
        }
        TermPattern::Variable(var) => {
            bind_variable(ctx, scope, alias, column, data_type, var, conditions);
        }
        #[cfg(feature = "rdf-star")]
        TermPattern::Triple(_) => {
            return Err(crate::error::CompileError::Unsupported("RDF-star triple terms".to_owned()));
        }
    }
    Ok(())
}

pub(crate) fn bind_variable(
    ctx: &mut ContextStack,
    scope: ContextId,
    alias: &str,
    column: &str,
    data_type: RdfTermType,
    var: &rdfsql_model::Variable,
    conditions: &mut Vec<String>,
) {
    bind_variable_key(ctx, scope, alias, column, data_type, var.as_str(), conditions);
    ctx.declare_variable(ctx.nearest_select(scope), var.as_str());
}

fn bind_variable_key(
    ctx: &mut ContextStack,
    scope: ContextId,
    alias: &str,
    column: &str,
    data_type: RdfTermType,
    key: &str,
    conditions: &mut Vec<String>,
) {
    let triple_scope = ctx.nearest_triple(scope);
    let existing = ctx.triple(triple_scope).variable_bindings.get(key).and_then(|b| b.first()).cloned();
    if let Some(existing) = existing {
        conditions.push(format!("\"{alias}\".\"{column}\" = {}", existing.sql_expression()));
    } else {
        let binding = Binding::Variable(VariableBinding {
            variable: rdfsql_model::Variable::new_unchecked(key.trim_start_matches("_:")),
            class: None,
            sql_query_tablename: alias.to_owned(),
            sql_db_column_name: column.to_owned(),
            data_type,
            nullable: false,
        });
        ctx.triple_mut(triple_scope).variable_bindings.entry(key.to_owned()).or_default().push(binding);
    }
}

#[cfg(test)]
mod tests {
    use rdfsql_model::NamedNode;
    use rdfsql_ontology::{Class, Ontology, Property};

    use crate::graph::GraphPolicy;

    fn ontology_with_person_class() -> Ontology {
        let person = NamedNode::new("http://ex/Person").expect("valid iri");
        let name = NamedNode::new("http://ex/name").expect("valid iri");
        Ontology::builder()
            .with_class(Class::new(person, "Person"))
            .with_property(Property::new(name, rdfsql_model::RdfTermType::String, "Person", "name", false))
            .build()
    }

    fn ontology_with_fulltext_property() -> Ontology {
        let body = NamedNode::new("http://ex/body").expect("valid iri");
        Ontology::builder()
            .with_property(
                Property::new(body, rdfsql_model::RdfTermType::String, "Document", "body", false)
                    .with_fulltext_indexed(true),
            )
            .build()
    }

    #[test]
    fn rdf_type_with_a_known_class_dispatches_to_the_class_table_not_the_generic_one() {
        let ontology = ontology_with_person_class();
        let query = spargebra::Query::parse(
            "SELECT ?p WHERE { ?p a <http://ex/Person> }",
            None,
        )
        .expect("valid query");
        let compiled = crate::compile_query(&ontology, &query, &GraphPolicy::unrestricted()).expect("compiles");
        assert!(compiled.text.contains("\"Person\""));
        assert!(!compiled.text.contains("tracker_triples"));
    }

    #[test]
    fn rdf_type_with_an_unregistered_class_falls_back_to_the_generic_table() {
        let ontology = ontology_with_person_class();
        let query = spargebra::Query::parse(
            "SELECT ?p WHERE { ?p a <http://ex/Unregistered> }",
            None,
        )
        .expect("valid query");
        let compiled = crate::compile_query(&ontology, &query, &GraphPolicy::unrestricted()).expect("compiles");
        assert!(compiled.text.contains("tracker_triples"));
    }

    #[test]
    fn fts_match_dispatches_to_the_fts5_shadow_table() {
        let ontology = ontology_with_fulltext_property();
        let query = spargebra::Query::parse(
            "PREFIX fts: <http://www.tracker-project.org/ontologies/fts#> \
             SELECT ?doc WHERE { ?doc fts:match \"hello world\" }",
            None,
        )
        .expect("valid query");
        let compiled = crate::compile_query(&ontology, &query, &GraphPolicy::unrestricted()).expect("compiles");
        assert!(compiled.text.contains("body_fts"));
        assert!(compiled.text.contains("MATCH"));
    }

    #[test]
    fn fts_match_with_no_fulltext_property_in_the_ontology_is_unsupported() {
        let ontology = ontology_with_person_class();
        let query = spargebra::Query::parse(
            "PREFIX fts: <http://www.tracker-project.org/ontologies/fts#> \
             SELECT ?doc WHERE { ?doc fts:match \"hello\" }",
            None,
        )
        .expect("valid query");
        let err = crate::compile_query(&ontology, &query, &GraphPolicy::unrestricted()).expect_err("must fail");
        assert!(matches!(err, crate::CompileError::Unsupported(_)));
    }
}
