use rdfsql_model::NamedNode;

/// A class (`rdfs:Class`/`rdfs:Resource` subclass) in the ontology. Every
/// class owns a table named after it (`tracker-data-manager.c`'s
/// class-to-table convention) that holds at least the `ID` column shared by
/// all resources of that class, used as the `rdf:type`-domain index so that
/// `?x a <Class>` can be resolved without scanning `tracker_triples`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Class {
    iri: NamedNode,
    sql_table_name: String,
    /// Direct superclasses; used to widen a domain-index lookup to the
    /// tables of parent classes when an object may be stored there too.
    super_classes: Vec<NamedNode>,
}

impl Class {
    pub fn new(iri: NamedNode, sql_table_name: impl Into<String>) -> Self {
        Self {
            iri,
            sql_table_name: sql_table_name.into(),
            super_classes: Vec::new(),
        }
    }

    pub fn with_super_classes(mut self, super_classes: Vec<NamedNode>) -> Self {
        self.super_classes = super_classes;
        self
    }

    pub fn iri(&self) -> &NamedNode {
        &self.iri
    }

    pub fn sql_table_name(&self) -> &str {
        &self.sql_table_name
    }

    pub fn super_classes(&self) -> &[NamedNode] {
        &self.super_classes
    }
}
