use oxsdatatypes::DateTime;

/// A value bound by a `Cursor` column (spec §6 Query API). Resources are
/// reported as their canonical IRI string, printed by the `SparqlPrintValue`
/// SQL function (§4.9) from the row id stored internally; `Value` itself
/// never carries a row id.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int64(i64),
    Double(f64),
    Boolean(bool),
    String(String),
    /// An `xsd:dateTime` or `xsd:date`/`xsd:time`, always carrying its
    /// (possibly absent) timezone offset.
    DateTime(DateTime),
    Bytes(Vec<u8>),
    /// `rdf:langString`: `utf8-text "\0" lang-tag`, exactly as produced by
    /// `tracker_sparql_string_join`/collated comparisons in the original
    /// implementation.
    LangString(Vec<u8>),
}

impl Value {
    /// Splits a `LangString` payload into its text and language tag. Panics
    /// if called on a non-`LangString` value or if the payload is malformed
    /// (both are programmer errors: this accessor is only ever called after
    /// a caller has matched on `Value::LangString`).
    pub fn lang_string_parts(bytes: &[u8]) -> (&str, &str) {
        let nul = bytes
            .iter()
            .position(|b| *b == 0)
            .expect("langstring payload must contain a NUL separator");
        let (text, rest) = bytes.split_at(nul);
        (
            std::str::from_utf8(text).expect("langstring text must be valid UTF-8"),
            std::str::from_utf8(&rest[1..]).expect("langstring language tag must be valid UTF-8"),
        )
    }

    pub fn encode_lang_string(text: &str, language: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(text.len() + 1 + language.len());
        out.extend_from_slice(text.as_bytes());
        out.push(0);
        out.extend_from_slice(language.as_bytes());
        out
    }
}
