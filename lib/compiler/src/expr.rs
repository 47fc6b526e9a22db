//! The expression compiler (spec §4.9 "Compile an expression"): turns a
//! `spargebra` scalar expression tree into a SQL scalar expression plus the
//! [`RdfTermType`] it evaluates to, so callers (`FILTER`, `BIND`, `ORDER
//! BY`, aggregate arguments) can decide whether a further cast is needed.
//!
//! Builtin calls lower to the SQL engine's registered scalar functions
//! (`sparql_*`), the same naming convention the ontology catalog uses for
//! its own collations — grounded on the teacher's `ExpressionRewriter`,
//! which does the equivalent dispatch over DataFusion's builtin registry.

use rdfsql_model::RdfTermType;
use spargebra::algebra::{Expression, Function};

use crate::binding::{Binding, LiteralBinding};
use crate::context::ContextStack;
use crate::error::{CompileError, CompileResult};

/// A compiled scalar expression: the SQL text to splice in, and the RDF
/// type tag it produces.
#[derive(Clone, Debug)]
pub struct ExprSql {
    pub sql: String,
    pub data_type: RdfTermType,
}

impl ExprSql {
    fn new(sql: impl Into<String>, data_type: RdfTermType) -> Self {
        Self { sql: sql.into(), data_type }
    }
}

/// Compiles expressions against one query's [`ContextStack`]. `exists` is
/// invoked for `EXISTS`/`NOT EXISTS` subpatterns, deferring to the query
/// translator (which owns pattern compilation) without a module cycle.
pub struct ExprCompiler<'a> {
    pub ctx: &'a mut ContextStack,
    pub scope: crate::context::ContextId,
    pub exists: &'a mut dyn FnMut(
        &mut ContextStack,
        crate::context::ContextId,
        &spargebra::algebra::GraphPattern,
    ) -> CompileResult<String>,
}

impl ExprCompiler<'_> {
    pub fn compile(&mut self, expr: &Expression) -> CompileResult<ExprSql> {
        match expr {
            Expression::NamedNode(iri) => {
                let placeholder = self.ctx.bind_literal(Binding::Literal(LiteralBinding {
                    bytes: iri.as_str().as_bytes().to_vec(),
                    data_type: RdfTermType::Resource,
                    placeholder: String::new(),
                }));
                Ok(ExprSql::new(placeholder, RdfTermType::Resource))
            }
            Expression::Literal(lit) => self.compile_literal(lit),
            Expression::Variable(var) => self.compile_variable(var),
            Expression::Or(a, b) => self.binary_bool("OR", a, b),
            Expression::And(a, b) => self.binary_bool("AND", a, b),
            Expression::Equal(a, b) => self.compile_comparison("=", a, b),
            Expression::SameTerm(a, b) => self.compile_comparison("IS", a, b),
            Expression::Greater(a, b) => self.compile_comparison(">", a, b),
            Expression::GreaterOrEqual(a, b) => self.compile_comparison(">=", a, b),
            Expression::Less(a, b) => self.compile_comparison("<", a, b),
            Expression::LessOrEqual(a, b) => self.compile_comparison("<=", a, b),
            Expression::In(needle, haystack) => self.compile_in(needle, haystack),
            Expression::Add(a, b) => self.binary_numeric("+", a, b),
            Expression::Subtract(a, b) => self.binary_numeric("-", a, b),
            Expression::Multiply(a, b) => self.binary_numeric("*", a, b),
            Expression::Divide(a, b) => self.binary_numeric("/", a, b),
            Expression::UnaryPlus(inner) => self.compile(inner),
            Expression::UnaryMinus(inner) => {
                let inner = self.compile(inner)?;
                Ok(ExprSql::new(format!("(-({}))", inner.sql), inner.data_type))
            }
            Expression::Not(inner) => {
                let inner = self.compile(inner)?;
                Ok(ExprSql::new(format!("(NOT ({}))", inner.sql), RdfTermType::Boolean))
            }
            Expression::Bound(var) => Ok(ExprSql::new(
                format!("({} IS NOT NULL)", self.variable_sql(var)?),
                RdfTermType::Boolean,
            )),
            Expression::If(cond, then, otherwise) => {
                let cond = self.compile(cond)?;
                let then = self.compile(then)?;
                let otherwise = self.compile(otherwise)?;
                Ok(ExprSql::new(
                    format!("(CASE WHEN {} THEN {} ELSE {} END)", cond.sql, then.sql, otherwise.sql),
                    then.data_type,
                ))
            }
            Expression::Coalesce(parts) => {
                let compiled: Vec<String> =
                    parts.iter().map(|p| self.compile(p).map(|e| e.sql)).collect::<CompileResult<_>>()?;
                Ok(ExprSql::new(format!("COALESCE({})", compiled.join(", ")), RdfTermType::Unknown))
            }
            Expression::Exists(pattern) => {
                let sql = (self.exists)(self.ctx, self.scope, pattern)?;
                Ok(ExprSql::new(format!("EXISTS ({sql})"), RdfTermType::Boolean))
            }
            Expression::FunctionCall(function, args) => self.compile_function(function, args),
        }
    }

    fn compile_literal(&mut self, lit: &rdfsql_model::Literal) -> CompileResult<ExprSql> {
        let data_type = classify_literal_datatype(lit);
        let bytes = if let Some(lang) = lit.language() {
            rdfsql_model::Value::encode_lang_string(lit.value(), lang)
        } else {
            lit.value().as_bytes().to_vec()
        };
        let placeholder =
            self.ctx.bind_literal(Binding::Literal(LiteralBinding { bytes, data_type, placeholder: String::new() }));
        Ok(ExprSql::new(placeholder, data_type))
    }

    fn compile_variable(&mut self, var: &rdfsql_model::Variable) -> CompileResult<ExprSql> {
        let sql = self.variable_sql(var)?;
        let data_type = self.variable_data_type(var);
        Ok(ExprSql::new(sql, data_type))
    }

    /// `fts:rank(?s)`/`fts:offsets(?s)`/`fts:snippet(?s)` (spec §4.9) don't
    /// resolve like an ordinary function call: they read one of the
    /// sub-variables `triples::bind_fts_subvariables` bound alongside `?s`
    /// when its triple matched through an `fts:match` pattern, rather than
    /// computing something from `?s`'s own SQL expression.
    fn compile_fts_subvariable(&mut self, args: &[Expression], suffix: &str) -> CompileResult<ExprSql> {
        let Some(Expression::Variable(var)) = args.first() else {
            return Err(CompileError::Unsupported(format!("fts:{suffix} requires a variable argument")));
        };
        let key = format!("{}:{suffix}", var.as_str());
        let scope = self
            .ctx
            .resolve_declaring_scope(self.scope, var.as_str())
            .ok_or_else(|| CompileError::UnboundVariable(var.as_str().to_owned()))?;
        let triple_scope = self.ctx.nearest_triple(scope);
        let binding = self
            .ctx
            .triple(triple_scope)
            .variable_bindings
            .get(&key)
            .and_then(|b| b.first())
            .ok_or_else(|| CompileError::Unsupported(format!("?{} was not matched via fts:match", var.as_str())))?;
        let data_type = if suffix == "ftsRank" { RdfTermType::Double } else { RdfTermType::String };
        Ok(ExprSql::new(binding.sql_expression(), data_type))
    }

    fn variable_sql(&mut self, var: &rdfsql_model::Variable) -> CompileResult<String> {
        let scope = self.ctx.resolve_declaring_scope(self.scope, var.as_str()).ok_or_else(|| {
            CompileError::UnboundVariable(var.as_str().to_owned())
        })?;
        let triple_scope = self.ctx.nearest_triple(scope);
        let bindings = self.ctx.triple(triple_scope).variable_bindings.get(var.as_str());
        match bindings.and_then(|b| b.first()) {
            Some(binding) => Ok(binding.sql_expression()),
            None => Err(CompileError::UnboundVariable(var.as_str().to_owned())),
        }
    }

    fn variable_data_type(&self, var: &rdfsql_model::Variable) -> RdfTermType {
        self.ctx
            .resolve_declaring_scope(self.scope, var.as_str())
            .map(|scope| self.ctx.nearest_triple(scope))
            .and_then(|triple_scope| self.ctx.triple(triple_scope).variable_bindings.get(var.as_str()))
            .and_then(|bindings| bindings.first())
            .map(Binding::data_type)
            .unwrap_or(RdfTermType::Unknown)
    }

    fn binary_bool(&mut self, op: &str, a: &Expression, b: &Expression) -> CompileResult<ExprSql> {
        let a = self.compile(a)?;
        let b = self.compile(b)?;
        Ok(ExprSql::new(format!("({} {op} {})", a.sql, b.sql), RdfTermType::Boolean))
    }

    fn binary_numeric(&mut self, op: &str, a: &Expression, b: &Expression) -> CompileResult<ExprSql> {
        let a = self.compile(a)?;
        let b = self.compile(b)?;
        let data_type =
            if a.data_type == RdfTermType::Double || b.data_type == RdfTermType::Double {
                RdfTermType::Double
            } else {
                RdfTermType::Integer
            };
        Ok(ExprSql::new(format!("({} {op} {})", a.sql, b.sql), data_type))
    }

    fn compile_comparison(&mut self, op: &str, a: &Expression, b: &Expression) -> CompileResult<ExprSql> {
        let a = self.compile(a)?;
        let b = self.compile(b)?;
        // `SameTerm` compares literal identity, not value, so a date/time
        // operand is never normalized there even if both sides are temporal.
        let (a_sql, b_sql) = if op != "IS" && is_temporal(a.data_type) && is_temporal(b.data_type) {
            (format!("sparql_time_sort({})", a.sql), format!("sparql_time_sort({})", b.sql))
        } else {
            (a.sql, b.sql)
        };
        Ok(ExprSql::new(format!("({a_sql} {op} {b_sql})"), RdfTermType::Boolean))
    }

    fn compile_in(&mut self, needle: &Expression, haystack: &[Expression]) -> CompileResult<ExprSql> {
        let needle = self.compile(needle)?;
        let items: Vec<String> =
            haystack.iter().map(|e| self.compile(e).map(|e| e.sql)).collect::<CompileResult<_>>()?;
        if items.is_empty() {
            return Ok(ExprSql::new("0", RdfTermType::Boolean));
        }
        Ok(ExprSql::new(format!("({} IN ({}))", needle.sql, items.join(", ")), RdfTermType::Boolean))
    }

    fn compile_function(&mut self, function: &Function, args: &[Expression]) -> CompileResult<ExprSql> {
        if let Function::Custom(iri) = function {
            if let Some(suffix) = fts_subvariable_suffix(iri.as_str()) {
                return self.compile_fts_subvariable(args, suffix);
            }
        }
        let compiled: Vec<ExprSql> = args.iter().map(|a| self.compile(a)).collect::<CompileResult<_>>()?;
        let sqls: Vec<&str> = compiled.iter().map(|e| e.sql.as_str()).collect();
        match function {
            Function::Str => Ok(ExprSql::new(format!("sparql_str({})", sqls[0]), RdfTermType::String)),
            Function::Lang => Ok(ExprSql::new(format!("sparql_lang({})", sqls[0]), RdfTermType::String)),
            Function::LangMatches => Ok(ExprSql::new(
                format!("sparql_lang_matches({}, {})", sqls[0], sqls[1]),
                RdfTermType::Boolean,
            )),
            Function::Datatype => {
                Ok(ExprSql::new(format!("sparql_datatype({})", sqls[0]), RdfTermType::Resource))
            }
            Function::Iri => Ok(ExprSql::new(format!("sparql_iri({})", sqls[0]), RdfTermType::Resource)),
            Function::BNode if sqls.is_empty() => {
                Ok(ExprSql::new("sparql_bnode()".to_owned(), RdfTermType::Resource))
            }
            Function::BNode => {
                Ok(ExprSql::new(format!("sparql_bnode({})", sqls[0]), RdfTermType::Resource))
            }
            Function::Rand => Ok(ExprSql::new("sparql_rand()".to_owned(), RdfTermType::Double)),
            Function::Abs => Ok(ExprSql::new(format!("ABS({})", sqls[0]), compiled[0].data_type)),
            Function::Ceil => Ok(ExprSql::new(format!("sparql_ceil({})", sqls[0]), RdfTermType::Integer)),
            Function::Floor => Ok(ExprSql::new(format!("sparql_floor({})", sqls[0]), RdfTermType::Integer)),
            Function::Round => Ok(ExprSql::new(format!("sparql_round({})", sqls[0]), RdfTermType::Integer)),
            Function::Concat => Ok(ExprSql::new(format!("({})", sqls.join(" || ")), RdfTermType::String)),
            Function::SubStr if sqls.len() == 2 => Ok(ExprSql::new(
                format!("substr({}, {})", sqls[0], sqls[1]),
                RdfTermType::String,
            )),
            Function::SubStr => Ok(ExprSql::new(
                format!("substr({}, {}, {})", sqls[0], sqls[1], sqls[2]),
                RdfTermType::String,
            )),
            Function::StrLen => Ok(ExprSql::new(format!("length({})", sqls[0]), RdfTermType::Integer)),
            Function::Replace if sqls.len() == 3 => Ok(ExprSql::new(
                format!("sparql_replace({}, {}, {})", sqls[0], sqls[1], sqls[2]),
                RdfTermType::String,
            )),
            Function::Replace => Ok(ExprSql::new(
                format!("sparql_replace({}, {}, {}, {})", sqls[0], sqls[1], sqls[2], sqls[3]),
                RdfTermType::String,
            )),
            Function::UCase => Ok(ExprSql::new(format!("upper({})", sqls[0]), RdfTermType::String)),
            Function::LCase => Ok(ExprSql::new(format!("lower({})", sqls[0]), RdfTermType::String)),
            Function::EncodeForUri => {
                Ok(ExprSql::new(format!("sparql_encode_for_uri({})", sqls[0]), RdfTermType::String))
            }
            Function::Contains => Ok(ExprSql::new(
                format!("sparql_contains({}, {})", sqls[0], sqls[1]),
                RdfTermType::Boolean,
            )),
            Function::StrStarts => Ok(ExprSql::new(
                format!("sparql_starts_with({}, {})", sqls[0], sqls[1]),
                RdfTermType::Boolean,
            )),
            Function::StrEnds => Ok(ExprSql::new(
                format!("sparql_ends_with({}, {})", sqls[0], sqls[1]),
                RdfTermType::Boolean,
            )),
            Function::StrBefore => Ok(ExprSql::new(
                format!("sparql_str_before({}, {})", sqls[0], sqls[1]),
                RdfTermType::String,
            )),
            Function::StrAfter => Ok(ExprSql::new(
                format!("sparql_str_after({}, {})", sqls[0], sqls[1]),
                RdfTermType::String,
            )),
            Function::Year => Ok(ExprSql::new(format!("sparql_year({})", sqls[0]), RdfTermType::Integer)),
            Function::Month => Ok(ExprSql::new(format!("sparql_month({})", sqls[0]), RdfTermType::Integer)),
            Function::Day => Ok(ExprSql::new(format!("sparql_day({})", sqls[0]), RdfTermType::Integer)),
            Function::Hours => Ok(ExprSql::new(format!("sparql_hours({})", sqls[0]), RdfTermType::Integer)),
            Function::Minutes => {
                Ok(ExprSql::new(format!("sparql_minutes({})", sqls[0]), RdfTermType::Integer))
            }
            Function::Seconds => {
                Ok(ExprSql::new(format!("sparql_seconds({})", sqls[0]), RdfTermType::Double))
            }
            Function::Timezone => {
                Ok(ExprSql::new(format!("sparql_timezone({})", sqls[0]), RdfTermType::String))
            }
            Function::Tz => Ok(ExprSql::new(format!("sparql_tz({})", sqls[0]), RdfTermType::String)),
            Function::Now => Ok(ExprSql::new("sparql_now()".to_owned(), RdfTermType::DateTime)),
            Function::Uuid => Ok(ExprSql::new("sparql_uuid()".to_owned(), RdfTermType::Resource)),
            Function::StrUuid => Ok(ExprSql::new("sparql_str_uuid()".to_owned(), RdfTermType::String)),
            Function::Md5 => Ok(ExprSql::new(format!("sparql_md5({})", sqls[0]), RdfTermType::String)),
            Function::Sha1 => Ok(ExprSql::new(format!("sparql_sha1({})", sqls[0]), RdfTermType::String)),
            Function::Sha256 => {
                Ok(ExprSql::new(format!("sparql_sha256({})", sqls[0]), RdfTermType::String))
            }
            Function::Sha384 => {
                Ok(ExprSql::new(format!("sparql_sha384({})", sqls[0]), RdfTermType::String))
            }
            Function::Sha512 => {
                Ok(ExprSql::new(format!("sparql_sha512({})", sqls[0]), RdfTermType::String))
            }
            Function::StrLang => Ok(ExprSql::new(
                format!("sparql_str_lang({}, {})", sqls[0], sqls[1]),
                RdfTermType::LangString,
            )),
            Function::StrDt => {
                Ok(ExprSql::new(format!("sparql_str_dt({}, {})", sqls[0], sqls[1]), RdfTermType::Unknown))
            }
            Function::IsIri => {
                Ok(ExprSql::new(format!("sparql_is_iri({})", sqls[0]), RdfTermType::Boolean))
            }
            Function::IsBlank => {
                Ok(ExprSql::new(format!("sparql_is_blank({})", sqls[0]), RdfTermType::Boolean))
            }
            Function::IsLiteral => {
                Ok(ExprSql::new(format!("sparql_is_literal({})", sqls[0]), RdfTermType::Boolean))
            }
            Function::IsNumeric => {
                Ok(ExprSql::new(format!("sparql_is_numeric({})", sqls[0]), RdfTermType::Boolean))
            }
            Function::Regex if sqls.len() == 2 => {
                Ok(ExprSql::new(format!("sparql_regex({}, {})", sqls[0], sqls[1]), RdfTermType::Boolean))
            }
            Function::Regex => Ok(ExprSql::new(
                format!("sparql_regex({}, {}, {})", sqls[0], sqls[1], sqls[2]),
                RdfTermType::Boolean,
            )),
            Function::Triple | Function::Subject | Function::Predicate | Function::Object | Function::IsTriple => {
                Err(CompileError::Unsupported("RDF-star term constructors/accessors".to_owned()))
            }
            Function::Custom(iri) => {
                Ok(ExprSql::new(format!("sparql_custom_{}({})", sanitize_fn_name(iri.as_str()), sqls.join(", ")), RdfTermType::Unknown))
            }
        }
    }
}

const FTS_RANK_IRI: &str = "http://www.tracker-project.org/ontologies/fts#rank";
const FTS_OFFSETS_IRI: &str = "http://www.tracker-project.org/ontologies/fts#offsets";
const FTS_SNIPPET_IRI: &str = "http://www.tracker-project.org/ontologies/fts#snippet";

fn fts_subvariable_suffix(iri: &str) -> Option<&'static str> {
    match iri {
        FTS_RANK_IRI => Some("ftsRank"),
        FTS_OFFSETS_IRI => Some("ftsOffsets"),
        FTS_SNIPPET_IRI => Some("ftsSnippet"),
        _ => None,
    }
}

fn is_temporal(data_type: RdfTermType) -> bool {
    matches!(data_type, RdfTermType::Date | RdfTermType::DateTime | RdfTermType::Time)
}

fn classify_literal_datatype(lit: &rdfsql_model::Literal) -> RdfTermType {
    if lit.is_plain() || lit.language().is_some() {
        return if lit.language().is_some() { RdfTermType::LangString } else { RdfTermType::String };
    }
    let datatype = lit.datatype();
    if datatype == oxrdf::vocab::xsd::BOOLEAN {
        RdfTermType::Boolean
    } else if datatype == oxrdf::vocab::xsd::INTEGER {
        RdfTermType::Integer
    } else if datatype == oxrdf::vocab::xsd::DOUBLE || datatype == oxrdf::vocab::xsd::DECIMAL {
        RdfTermType::Double
    } else if datatype == oxrdf::vocab::xsd::DATE_TIME {
        RdfTermType::DateTime
    } else if datatype == oxrdf::vocab::xsd::DATE {
        RdfTermType::Date
    } else if datatype == oxrdf::vocab::xsd::TIME {
        RdfTermType::Time
    } else if datatype == oxrdf::vocab::xsd::DURATION {
        RdfTermType::Duration
    } else if datatype == oxrdf::vocab::xsd::STRING {
        RdfTermType::String
    } else {
        RdfTermType::OtherLiteral
    }
}

fn sanitize_fn_name(iri: &str) -> String {
    iri.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect()
}

#[cfg(test)]
mod tests {
    use rdfsql_model::{NamedNode, RdfTermType};
    use rdfsql_ontology::{Ontology, Property};

    use crate::graph::GraphPolicy;

    fn test_ontology() -> Ontology {
        let name = NamedNode::new("http://ex/name").expect("valid iri");
        let born = NamedNode::new("http://ex/born").expect("valid iri");
        let age = NamedNode::new("http://ex/age").expect("valid iri");
        Ontology::builder()
            .with_property(Property::new(name, RdfTermType::String, "Person", "name", false))
            .with_property(Property::new(born, RdfTermType::Date, "Person", "born", false))
            .with_property(Property::new(age, RdfTermType::Integer, "Person", "age", false))
            .build()
    }

    fn compile(sparql: &str) -> crate::CompiledSql {
        let ontology = test_ontology();
        let query = spargebra::Query::parse(sparql, None).expect("valid query");
        crate::compile_query(&ontology, &query, &GraphPolicy::unrestricted()).expect("compiles")
    }

    #[test]
    fn comparing_two_date_variables_wraps_both_sides_for_chronological_order() {
        let compiled = compile(
            "SELECT ?p WHERE { ?p <http://ex/born> ?a . ?p <http://ex/born> ?b . FILTER(?a < ?b) }",
        );
        assert_eq!(compiled.text.matches("sparql_time_sort(").count(), 2);
    }

    #[test]
    fn comparing_two_plain_integers_does_not_get_the_temporal_wrapper() {
        let compiled = compile("SELECT ?p WHERE { ?p <http://ex/age> ?a . FILTER(?a > 18) }");
        assert!(!compiled.text.contains("sparql_time_sort"));
    }

    #[test]
    fn regex_with_two_args_compiles_without_a_flags_argument() {
        let compiled = compile("SELECT ?p WHERE { ?p <http://ex/name> ?n . FILTER(REGEX(?n, \"^A\")) }");
        assert!(compiled.text.contains("sparql_regex("));
    }

    #[test]
    fn str_len_compiles_to_the_plain_sql_length_builtin() {
        let compiled = compile("SELECT ?p WHERE { ?p <http://ex/name> ?n . FILTER(STRLEN(?n) > 0) }");
        assert!(compiled.text.contains("length("));
    }

    #[test]
    fn an_empty_in_list_compiles_to_a_constant_false() {
        let compiled = compile("SELECT ?p WHERE { ?p <http://ex/name> ?n . FILTER(?n IN ()) }");
        assert!(compiled.text.contains("WHERE 0"));
    }

    #[test]
    fn ucase_and_concat_compile_to_their_sql_equivalents() {
        let compiled = compile(
            "SELECT ?p WHERE { ?p <http://ex/name> ?n . FILTER(UCASE(CONCAT(?n, \"!\")) = \"ADA!\") }",
        );
        assert!(compiled.text.contains("upper("));
        assert!(compiled.text.contains(" || "));
    }

    #[test]
    fn an_unbound_filter_variable_is_an_unbound_variable_error() {
        let ontology = test_ontology();
        let query = spargebra::Query::parse(
            "SELECT ?p WHERE { ?p <http://ex/name> ?n . FILTER(?ghost = 1) }",
            None,
        )
        .expect("valid query");
        let err = crate::compile_query(&ontology, &query, &GraphPolicy::unrestricted()).expect_err("must fail");
        assert!(matches!(err, crate::CompileError::UnboundVariable(_)));
    }
}
