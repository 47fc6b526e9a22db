//! RDF term and value model shared by the ontology catalog, compiler, update
//! executor and engine crates.
//!
//! Large portions of the term types are re-exported from
//! [Oxigraph](https://github.com/oxigraph/oxigraph)'s `oxrdf`, which is also
//! what the `spargebra` parser produces terms in.

mod rdf_type;
mod value;

pub use rdf_type::RdfTermType;
pub use value::Value;

pub use oxiri::Iri;
pub use oxrdf::{
    BlankNode, BlankNodeRef, GraphName, GraphNameRef, Literal, LiteralRef, NamedNode,
    NamedNodeRef, NamedOrBlankNode, NamedOrBlankNodeRef, Quad, QuadRef, Term, TermRef, Triple,
    TripleRef, Variable, VariableRef,
};
pub use spargebra::algebra::PropertyPathExpression;
pub use spargebra::term::{GroundTerm, NamedNodePattern, TermPattern, TriplePattern};
