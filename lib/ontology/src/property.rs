use rdfsql_model::NamedNode;
use rdfsql_model::RdfTermType;

/// A property in the ontology, resolved to the concrete column (or side
/// table, for multi-valued properties) the storage layer keeps its values
/// in (spec §3 "Data tables", §4.7 "Resolve predicate").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Property {
    iri: NamedNode,
    data_type: RdfTermType,
    domain: Option<NamedNode>,
    range: Option<NamedNode>,
    multi_valued: bool,
    sql_table_name: String,
    sql_db_column_name: String,
    /// Secondary tables indexed by a domain class, used when the subject's
    /// statically-known class admits a narrower scan than the property's
    /// own table (spec §4.7 step 1, "domain-index table").
    domain_index_tables: Vec<String>,
    fulltext_indexed: bool,
}

impl Property {
    #[allow(clippy::fn_params_excessive_bools, reason = "constructor mirrors a DB row shape")]
    pub fn new(
        iri: NamedNode,
        data_type: RdfTermType,
        sql_table_name: impl Into<String>,
        sql_db_column_name: impl Into<String>,
        multi_valued: bool,
    ) -> Self {
        Self {
            iri,
            data_type,
            domain: None,
            range: None,
            multi_valued,
            sql_table_name: sql_table_name.into(),
            sql_db_column_name: sql_db_column_name.into(),
            domain_index_tables: Vec::new(),
            fulltext_indexed: false,
        }
    }

    pub fn with_domain(mut self, domain: NamedNode) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn with_range(mut self, range: NamedNode) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_domain_index_tables(mut self, tables: Vec<String>) -> Self {
        self.domain_index_tables = tables;
        self
    }

    pub fn with_fulltext_indexed(mut self, value: bool) -> Self {
        self.fulltext_indexed = value;
        self
    }

    pub fn iri(&self) -> &NamedNode {
        &self.iri
    }

    pub fn data_type(&self) -> RdfTermType {
        self.data_type
    }

    pub fn domain(&self) -> Option<&NamedNode> {
        self.domain.as_ref()
    }

    pub fn range(&self) -> Option<&NamedNode> {
        self.range.as_ref()
    }

    pub fn is_multi_valued(&self) -> bool {
        self.multi_valued
    }

    pub fn sql_table_name(&self) -> &str {
        &self.sql_table_name
    }

    pub fn sql_db_column_name(&self) -> &str {
        &self.sql_db_column_name
    }

    pub fn domain_index_tables(&self) -> &[String] {
        &self.domain_index_tables
    }

    pub fn is_fulltext_indexed(&self) -> bool {
        self.fulltext_indexed
    }

    /// Whether the column this property is stored in may hold NULL (a
    /// subject for which it is unset). Only single-valued properties get a
    /// dedicated column that can be null; multi-valued properties instead
    /// have zero or more rows in their side table, so "absence" there is
    /// "no row" rather than a nullable column.
    pub fn nullable(&self) -> bool {
        !self.multi_valued
    }
}
