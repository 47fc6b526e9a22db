use oxrdf::NamedNodeRef;
use oxrdf::vocab::xsd;

/// The RDF type tag carried alongside every compiled column (spec §3
/// "Tokens", §4.9 `DATATYPE`/`SparqlDataType`). `Resource` covers both IRIs
/// and blank nodes, which share the row-id representation in storage; the
/// concrete kind is recovered, when needed, from the resource row itself.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum RdfTermType {
    /// An IRI or blank node, represented internally by a row id.
    Resource,
    Boolean,
    Integer,
    Double,
    /// `xsd:string` with no language tag.
    String,
    /// `rdf:langString`, stored as `utf8-text "\0" lang-tag`.
    LangString,
    Date,
    DateTime,
    Time,
    Duration,
    /// Any other literal datatype not given first-class treatment.
    OtherLiteral,
    /// Not yet known at compile time (e.g. an unbound predicate-variable
    /// object); resolved per-row via a `$var:type` sub-variable.
    Unknown,
}

impl RdfTermType {
    /// The `xsd`/`rdf` IRI this tag prints as from `DATATYPE()`.
    pub fn datatype_iri(self) -> Option<NamedNodeRef<'static>> {
        match self {
            RdfTermType::Boolean => Some(xsd::BOOLEAN),
            RdfTermType::Integer => Some(xsd::INTEGER),
            RdfTermType::Double => Some(xsd::DOUBLE),
            RdfTermType::String => Some(xsd::STRING),
            RdfTermType::Date => Some(xsd::DATE),
            RdfTermType::DateTime => Some(xsd::DATE_TIME),
            RdfTermType::Time => Some(xsd::TIME),
            RdfTermType::Duration => Some(xsd::DURATION),
            RdfTermType::Resource | RdfTermType::LangString | RdfTermType::OtherLiteral => None,
            RdfTermType::Unknown => None,
        }
    }

    pub const fn is_numeric(self) -> bool {
        matches!(self, RdfTermType::Integer | RdfTermType::Double)
    }

    pub const fn is_date_like(self) -> bool {
        matches!(self, RdfTermType::Date | RdfTermType::DateTime | RdfTermType::Time)
    }
}
