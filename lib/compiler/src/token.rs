//! Tokens: the tagged union every subject/predicate/object/graph slot of a
//! triple pattern is normalized to before it is compiled or, in the update
//! executor, resolved against a solution row.

use rdfsql_model::Variable;

use crate::path::PathElementId;

/// One component (subject, predicate, object or graph) of a triple pattern
/// or quad, after the parser's term has been classified.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    /// Present syntactically but carries no information yet (e.g. the
    /// subject slot of a pattern whose subject is a bare `[]`).
    Unset,
    /// A bound term known at compile time: an IRI, a literal, or (in the
    /// update executor) a blank node already mapped to a storage id.
    Literal(LiteralToken),
    /// A SPARQL variable, resolved against whichever binding scope is
    /// current.
    Variable(Variable),
    /// A `SPARQL Update` parameter substituted in at execution time (e.g.
    /// graph names passed in from outside the update string).
    Parameter(String),
    /// The object slot is a property path rather than a single predicate;
    /// resolved through the path engine instead of a plain join.
    Path(PathElementId),
    /// A blank node already allocated a storage row id (update execution).
    Bnode(i64),
    /// A blank node referred to by its surface label, not yet allocated.
    BnodeLabel(String),
}

impl Token {
    pub const fn is_unset(&self) -> bool {
        matches!(self, Token::Unset)
    }

    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Token::Variable(var) => Some(var),
            _ => None,
        }
    }
}

/// A literal or resource value known at compile (or update-plan) time.
#[derive(Clone, Debug, PartialEq)]
pub struct LiteralToken {
    pub bytes: Vec<u8>,
    pub data_type: rdfsql_model::RdfTermType,
}

impl LiteralToken {
    pub fn new(bytes: impl Into<Vec<u8>>, data_type: rdfsql_model::RdfTermType) -> Self {
        Self { bytes: bytes.into(), data_type }
    }
}
