use rdfsql_model::Value;
use spargebra::term::{
    BlankNode, GraphName, GraphNamePattern, GroundSubject, GroundTerm, GroundTermPattern, Literal,
    NamedNode, NamedNodePattern, Subject, TermPattern, Variable,
};

use crate::error::{UpdateError, UpdateResult};

/// One slot of a quad template after it has been lowered out of
/// `spargebra`'s pattern types: either a value fixed by the update text
/// itself, or a reference to a column the WHERE cursor must supply.
#[derive(Clone, Debug)]
pub enum UpdateTerm {
    NamedNode(NamedNode),
    /// A labelled blank node from the update text (`_:a`). Resolved against
    /// the caller's bnode map (spec §4.11, `BlankNodeMappingMode`) rather
    /// than a cursor column. Only ever produced for an `INSERT` template —
    /// `DELETE`/`DELETE DATA` templates cannot name a blank node, since its
    /// internal row id cannot be addressed from outside.
    BlankNode(BlankNode),
    Literal(Literal),
    Variable(Variable),
}

impl UpdateTerm {
    pub fn variable(&self) -> Option<&Variable> {
        match self {
            Self::Variable(v) => Some(v),
            _ => None,
        }
    }

    /// Rejects `Literal`/`BlankNode` — not legal in predicate position.
    pub fn require_predicate_shape(self) -> UpdateResult<Self> {
        match &self {
            Self::Literal(_) | Self::BlankNode(_) => {
                Err(UpdateError::UnboundVariable("predicate position must be an IRI or variable".into()))
            }
            _ => Ok(self),
        }
    }
}

impl From<NamedNode> for UpdateTerm {
    fn from(value: NamedNode) -> Self {
        Self::NamedNode(value)
    }
}

impl From<Subject> for UpdateTerm {
    fn from(value: Subject) -> Self {
        match value {
            Subject::NamedNode(n) => Self::NamedNode(n),
            Subject::BlankNode(b) => Self::BlankNode(b),
        }
    }
}

impl From<GroundSubject> for UpdateTerm {
    fn from(value: GroundSubject) -> Self {
        match value {
            GroundSubject::NamedNode(n) => Self::NamedNode(n),
        }
    }
}

impl From<GroundTerm> for UpdateTerm {
    fn from(value: GroundTerm) -> Self {
        match value {
            GroundTerm::NamedNode(n) => Self::NamedNode(n),
            GroundTerm::Literal(l) => Self::Literal(l),
        }
    }
}

impl From<GroundTermPattern> for UpdateTerm {
    fn from(value: GroundTermPattern) -> Self {
        match value {
            GroundTermPattern::NamedNode(n) => Self::NamedNode(n),
            GroundTermPattern::Literal(l) => Self::Literal(l),
            GroundTermPattern::Variable(v) => Self::Variable(v),
        }
    }
}

impl From<TermPattern> for UpdateTerm {
    fn from(value: TermPattern) -> Self {
        match value {
            TermPattern::NamedNode(n) => Self::NamedNode(n),
            TermPattern::BlankNode(b) => Self::BlankNode(b),
            TermPattern::Literal(l) => Self::Literal(l),
            TermPattern::Variable(v) => Self::Variable(v),
        }
    }
}

impl From<NamedNodePattern> for UpdateTerm {
    fn from(value: NamedNodePattern) -> Self {
        match value {
            NamedNodePattern::NamedNode(n) => Self::NamedNode(n),
            NamedNodePattern::Variable(v) => Self::Variable(v),
        }
    }
}

/// The graph a quad template targets: the default graph, a fixed named
/// graph, or one supplied by the WHERE cursor.
#[derive(Clone, Debug)]
pub enum UpdateGraph {
    DefaultGraph,
    NamedNode(NamedNode),
    Variable(Variable),
}

impl From<GraphName> for UpdateGraph {
    fn from(value: GraphName) -> Self {
        match value {
            GraphName::NamedNode(n) => Self::NamedNode(n),
            GraphName::DefaultGraph => Self::DefaultGraph,
        }
    }
}

impl From<GraphNamePattern> for UpdateGraph {
    fn from(value: GraphNamePattern) -> Self {
        match value {
            GraphNamePattern::NamedNode(n) => Self::NamedNode(n),
            GraphNamePattern::DefaultGraph => Self::DefaultGraph,
            GraphNamePattern::Variable(v) => Self::Variable(v),
        }
    }
}

/// One fully-resolved quad, ready to hand to an [`crate::executor::UpdateSink`].
/// Produced by substituting a WHERE-cursor row's bindings (or nothing, for
/// `INSERT DATA`/`DELETE DATA`) into an [`UpdateTerm`] template.
#[derive(Clone, Debug)]
pub struct ResolvedQuad {
    pub subject: ResolvedTerm,
    pub predicate: NamedNode,
    pub object: ResolvedTerm,
    pub graph: Option<NamedNode>,
}

/// A term after WHERE-cursor substitution: still either a resource IRI/
/// blank-node label or a literal value, but no longer a variable.
#[derive(Clone, Debug)]
pub enum ResolvedTerm {
    NamedNode(NamedNode),
    BlankNode(String),
    Literal { value: Value, data_type_iri: Option<NamedNode> },
}
