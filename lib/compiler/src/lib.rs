//! Compiles SPARQL 1.1 algebra trees, as parsed by `spargebra`, into
//! parameterized SQL text against an ontology-mapped relational schema.
//!
//! The pipeline mirrors the module breakdown used throughout this crate:
//! a [`string_builder`] assembles SQL text with placeholders that later
//! passes can still splice into; [`context`] tracks the nested scopes a
//! query introduces; [`graph`] resolves `GRAPH`/`FROM`/`FROM NAMED`
//! clauses; [`path`] lowers property paths to derived tables and recursive
//! CTEs; [`triples`] compiles basic graph patterns; [`expr`] compiles
//! scalar expressions; and [`translator`] dispatches over the rest of the
//! algebra to tie everything together.

pub mod binding;
pub mod context;
pub mod data_table;
pub mod error;
pub mod expr;
pub mod graph;
pub mod path;
pub mod sql;
pub mod string_builder;
pub mod token;
mod translator;
pub mod triples;

pub use error::{CompileError, CompileResult};
pub use sql::{CompiledSql, ProjectedColumn};
pub use graph::GraphPolicy;
pub use translator::{compile_query, compile_update_where};

#[cfg(test)]
mod tests {
    use super::*;
    use rdfsql_ontology::{Class, Ontology, Property};
    use rdfsql_model::{NamedNode, RdfTermType};

    fn test_ontology() -> Ontology {
        let knows = NamedNode::new("http://ex/knows").expect("valid iri");
        let name = NamedNode::new("http://ex/name").expect("valid iri");
        let person = NamedNode::new("http://ex/Person").expect("valid iri");
        Ontology::builder()
            .with_class(Class::new(person, "Person"))
            .with_property(Property::new(knows.clone(), RdfTermType::Resource, "knows", "value", true))
            .with_property(Property::new(name, RdfTermType::String, "Person", "name", false))
            .build()
    }

    #[test]
    fn compiles_a_simple_select_with_one_triple() {
        let ontology = test_ontology();
        let query = spargebra::Query::parse(
            "SELECT ?name WHERE { ?p <http://ex/name> ?name }",
            None,
        )
        .expect("valid query");
        let compiled = compile_query(&ontology, &query, &GraphPolicy::unrestricted()).expect("compiles");
        assert!(compiled.text.contains("SELECT"));
        assert!(compiled.text.contains("\"Person\""));
        assert_eq!(compiled.bindings.len(), 1);
    }

    #[test]
    fn compiles_an_optional_join() {
        let ontology = test_ontology();
        let query = spargebra::Query::parse(
            "SELECT ?p ?name WHERE { ?p <http://ex/knows> ?friend . OPTIONAL { ?p <http://ex/name> ?name } }",
            None,
        )
        .expect("valid query");
        let compiled = compile_query(&ontology, &query, &GraphPolicy::unrestricted()).expect("compiles");
        assert!(compiled.text.contains("LEFT JOIN"));
    }

    #[test]
    fn compiles_a_property_path() {
        let ontology = test_ontology();
        let query = spargebra::Query::parse(
            "SELECT ?p ?q WHERE { ?p <http://ex/knows>+ ?q }",
            None,
        )
        .expect("valid query");
        let compiled = compile_query(&ontology, &query, &GraphPolicy::unrestricted()).expect("compiles");
        assert!(compiled.text.contains("WITH RECURSIVE"));
    }

    #[test]
    fn unbound_variable_in_filter_is_an_error() {
        let ontology = test_ontology();
        let query = spargebra::Query::parse(
            "SELECT ?p WHERE { ?p <http://ex/knows> ?q . FILTER(?unbound = 1) }",
            None,
        )
        .expect("valid query");
        let err = compile_query(&ontology, &query, &GraphPolicy::unrestricted()).expect_err("must fail");
        assert!(matches!(err, CompileError::UnboundVariable(_)));
    }
}
