//! A minimal line-based loader for the ontology catalog a command needs to
//! open a database. Building and migrating a real catalog is out of scope
//! (spec's Non-goals list names "the on-disk schema migration code" and
//! "the outer CLI" itself); this just gets a `rdfsql_ontology::Ontology`
//! into the CLI's hands from a text file so `query`/`update` have something
//! to compile against.
//!
//! Each non-empty, non-`#`-prefixed line is either:
//!
//! ```text
//! class <iri> <table> [super=<iri>,<iri>,...]
//! property <iri> <type> <table> <column> <single|multi> [domain=<iri>] [range=<iri>] [fulltext]
//! ```
//!
//! `<type>` is one of `resource`, `boolean`, `integer`, `double`, `string`,
//! `langstring`, `date`, `datetime`, `time`, `duration`, `other`.

use anyhow::{bail, Context, Result};
use rdfsql_model::{NamedNode, RdfTermType};
use rdfsql_ontology::{Class, Ontology, Property};
use std::fs;
use std::path::Path;

pub fn load(path: &Path) -> Result<Ontology> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading ontology catalog {}", path.display()))?;
    let mut builder = Ontology::builder();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parsed = parse_line(line)
            .with_context(|| format!("{}:{}: {line}", path.display(), lineno + 1))?;
        builder = match parsed {
            Entry::Class(class) => builder.with_class(class),
            Entry::Property(property) => builder.with_property(property),
        };
    }
    Ok(builder.build())
}

enum Entry {
    Class(Class),
    Property(Property),
}

fn parse_line(line: &str) -> Result<Entry> {
    let mut words = line.split_whitespace();
    let kind = words.next().context("empty line")?;
    match kind {
        "class" => {
            let iri = named_node(words.next().context("missing class IRI")?)?;
            let table = words.next().context("missing class table")?;
            let mut class = Class::new(iri, table);
            for field in words {
                if let Some(supers) = field.strip_prefix("super=") {
                    let super_classes =
                        supers.split(',').filter(|s| !s.is_empty()).map(named_node).collect::<Result<Vec<_>>>()?;
                    class = class.with_super_classes(super_classes);
                } else {
                    bail!("unknown class field '{field}'");
                }
            }
            Ok(Entry::Class(class))
        }
        "property" => {
            let iri = named_node(words.next().context("missing property IRI")?)?;
            let data_type = parse_type(words.next().context("missing property type")?)?;
            let table = words.next().context("missing property table")?;
            let column = words.next().context("missing property column")?;
            let multi_valued = match words.next().context("missing single/multi marker")? {
                "single" => false,
                "multi" => true,
                other => bail!("expected 'single' or 'multi', found '{other}'"),
            };
            let mut property = Property::new(iri, data_type, table, column, multi_valued);
            for field in words {
                if let Some(domain) = field.strip_prefix("domain=") {
                    property = property.with_domain(named_node(domain)?);
                } else if let Some(range) = field.strip_prefix("range=") {
                    property = property.with_range(named_node(range)?);
                } else if field == "fulltext" {
                    property = property.with_fulltext_indexed(true);
                } else {
                    bail!("unknown property field '{field}'");
                }
            }
            Ok(Entry::Property(property))
        }
        other => bail!("unknown catalog entry kind '{other}'"),
    }
}

fn named_node(text: &str) -> Result<NamedNode> {
    NamedNode::new(text).with_context(|| format!("invalid IRI '{text}'"))
}

fn parse_type(text: &str) -> Result<RdfTermType> {
    Ok(match text {
        "resource" => RdfTermType::Resource,
        "boolean" => RdfTermType::Boolean,
        "integer" => RdfTermType::Integer,
        "double" => RdfTermType::Double,
        "string" => RdfTermType::String,
        "langstring" => RdfTermType::LangString,
        "date" => RdfTermType::Date,
        "datetime" => RdfTermType::DateTime,
        "time" => RdfTermType::Time,
        "duration" => RdfTermType::Duration,
        "other" => RdfTermType::OtherLiteral,
        other => bail!("unknown data type '{other}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_catalog(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("creates temp file");
        file.write_all(contents.as_bytes()).expect("writes catalog");
        file
    }

    #[test]
    fn loads_a_class_and_a_property() {
        let file = write_catalog(
            "# a demo catalog\n\
             class <http://ex/Person> Person\n\
             property <http://ex/name> string Person name single domain=<http://ex/Person>\n\
             property <http://ex/knows> resource knows value multi fulltext\n",
        );
        let ontology = load(file.path()).expect("parses");
        let name = NamedNode::new("http://ex/name").expect("valid iri");
        let property = ontology.property(&name).expect("present");
        assert_eq!(property.sql_table_name(), "Person");
        assert!(!property.is_multi_valued());

        let knows = NamedNode::new("http://ex/knows").expect("valid iri");
        assert!(ontology.property(&knows).expect("present").is_fulltext_indexed());
    }

    #[test]
    fn rejects_an_unknown_field() {
        let file = write_catalog("class <http://ex/Person> Person weird=1\n");
        assert!(load(file.path()).is_err());
    }
}
