//! The ontology catalog (spec §1, §6): maps property/class IRIs onto the
//! concrete SQL tables and columns the storage layer keeps them in.
//!
//! This is a read-only snapshot for the lifetime of a database
//! [`rdfsql_common::Generation`] — the compiler re-runs, rather than mutating
//! an existing catalog, whenever storage reports a new generation.

mod class;
mod error;
mod property;

pub use class::Class;
pub use error::{OntologyError, OntologyResult};
pub use property::Property;

use rdfsql_model::NamedNode;
use rustc_hash::FxHashMap;

/// An immutable snapshot of the dataset's classes and properties.
#[derive(Debug, Default)]
pub struct Ontology {
    classes: FxHashMap<NamedNode, Class>,
    properties: FxHashMap<NamedNode, Property>,
}

impl Ontology {
    pub fn builder() -> OntologyBuilder {
        OntologyBuilder::default()
    }

    pub fn class(&self, iri: &NamedNode) -> OntologyResult<&Class> {
        self.classes
            .get(iri)
            .ok_or_else(|| OntologyError::UnknownClass(iri.as_str().to_owned()))
    }

    pub fn property(&self, iri: &NamedNode) -> OntologyResult<&Property> {
        self.properties
            .get(iri)
            .ok_or_else(|| OntologyError::UnknownProperty(iri.as_str().to_owned()))
    }

    pub fn try_property(&self, iri: &NamedNode) -> Option<&Property> {
        self.properties.get(iri)
    }

    pub fn try_class(&self, iri: &NamedNode) -> Option<&Class> {
        self.classes.get(iri)
    }

    pub fn classes(&self) -> impl Iterator<Item = &Class> {
        self.classes.values()
    }

    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }
}

/// Incrementally builds an [`Ontology`], mirroring how the storage layer's
/// `get_ontologies()` collaborator (spec §6) assembles one from the schema.
#[derive(Debug, Default)]
pub struct OntologyBuilder {
    classes: FxHashMap<NamedNode, Class>,
    properties: FxHashMap<NamedNode, Property>,
}

impl OntologyBuilder {
    pub fn with_class(mut self, class: Class) -> Self {
        self.classes.insert(class.iri().clone(), class);
        self
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.insert(property.iri().clone(), property);
        self
    }

    pub fn build(self) -> Ontology {
        Ontology {
            classes: self.classes,
            properties: self.properties,
        }
    }
}
