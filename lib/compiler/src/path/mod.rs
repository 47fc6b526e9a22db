//! Property path compilation (spec §4.5 "Property paths").
//!
//! Every [`PathElement`] compiles to a derived table with exactly three
//! columns, `graph`, `source` and `target` — the graph a solution came from
//! and the two endpoints the path connects. Sequencing, alternation and
//! inversion are then just joins, unions and column swaps over that shape,
//! the same decomposition as `PathToJoinsRule` in the DataFusion lineage
//! this crate descends from, but emitting SQL text instead of logical plan
//! nodes. `ZeroOrMore`/`OneOrMore` lower to a `WITH RECURSIVE` CTE, hoisted
//! by the caller to the enclosing query's `WITH` clause so SQLite only has
//! to plan the recursion once.

use rdfsql_model::NamedNode;

/// Handle to a node in a [`PathArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PathElementId(usize);

#[derive(Clone, Debug)]
pub enum PathElement {
    Predicate(NamedNode),
    Inverse(PathElementId),
    Sequence(PathElementId, PathElementId),
    Alternative(PathElementId, PathElementId),
    ZeroOrMore(PathElementId),
    OneOrMore(PathElementId),
    ZeroOrOne(PathElementId),
    /// `!(iri1|...|irin)`, already normalized so that an inverted negated
    /// set (`!^iri`) shows up as `Inverse(NegatedPropertySet(..))`.
    NegatedPropertySet(Vec<NamedNode>),
}

/// Owns every [`PathElement`] produced while compiling one query, so nested
/// paths can refer to their children by a plain `Copy` id instead of boxing.
#[derive(Clone, Debug, Default)]
pub struct PathArena {
    elements: Vec<PathElement>,
}

impl PathArena {
    pub fn push(&mut self, element: PathElement) -> PathElementId {
        self.elements.push(element);
        PathElementId(self.elements.len() - 1)
    }

    pub fn get(&self, id: PathElementId) -> &PathElement {
        &self.elements[id.0]
    }

    /// Translates a parsed `spargebra` property path expression into this
    /// arena's representation.
    pub fn from_expression(
        &mut self,
        expr: &spargebra::algebra::PropertyPathExpression,
    ) -> PathElementId {
        use spargebra::algebra::PropertyPathExpression as Ppe;
        match expr {
            Ppe::NamedNode(iri) => self.push(PathElement::Predicate(iri.clone())),
            Ppe::Reverse(inner) => {
                if let Ppe::NegatedPropertySet(nodes) = inner.as_ref() {
                    let negated = self.push(PathElement::NegatedPropertySet(nodes.clone()));
                    self.push(PathElement::Inverse(negated))
                } else {
                    let inner = self.from_expression(inner);
                    self.push(PathElement::Inverse(inner))
                }
            }
            Ppe::Sequence(lhs, rhs) => {
                let lhs = self.from_expression(lhs);
                let rhs = self.from_expression(rhs);
                self.push(PathElement::Sequence(lhs, rhs))
            }
            Ppe::Alternative(lhs, rhs) => {
                let lhs = self.from_expression(lhs);
                let rhs = self.from_expression(rhs);
                self.push(PathElement::Alternative(lhs, rhs))
            }
            Ppe::ZeroOrMore(inner) => {
                let inner = self.from_expression(inner);
                self.push(PathElement::ZeroOrMore(inner))
            }
            Ppe::OneOrMore(inner) => {
                let inner = self.from_expression(inner);
                self.push(PathElement::OneOrMore(inner))
            }
            Ppe::ZeroOrOne(inner) => {
                let inner = self.from_expression(inner);
                self.push(PathElement::ZeroOrOne(inner))
            }
            Ppe::NegatedPropertySet(nodes) => {
                self.push(PathElement::NegatedPropertySet(nodes.clone()))
            }
        }
    }
}

/// A compiled path: a `(graph, source, target)` derived-table query, plus
/// any `WITH RECURSIVE` members it needs hoisted to the statement's `WITH`
/// clause.
#[derive(Debug)]
pub struct PathSql {
    pub select: String,
    pub ctes: Vec<(String, String)>,
}

/// Compiles [`PathElement`]s to SQL, binding any literal IRIs it encounters
/// through `bind_iri` so the caller's parameter list stays in sync.
pub struct PathCompiler<'a> {
    next_id: u32,
    bind_iri: &'a mut dyn FnMut(&NamedNode) -> String,
}

impl<'a> PathCompiler<'a> {
    pub fn new(bind_iri: &'a mut dyn FnMut(&NamedNode) -> String) -> Self {
        Self { next_id: 0, bind_iri }
    }

    pub fn compile(&mut self, arena: &PathArena, id: PathElementId) -> PathSql {
        match arena.get(id).clone() {
            PathElement::Predicate(iri) => {
                let param = (self.bind_iri)(&iri);
                PathSql {
                    select: format!(
                        "SELECT graph, subject AS source, object AS target FROM tracker_triples WHERE predicate = {param}"
                    ),
                    ctes: Vec::new(),
                }
            }
            PathElement::NegatedPropertySet(nodes) => {
                let params: Vec<String> = nodes.iter().map(|n| (self.bind_iri)(n)).collect();
                let list = params.join(", ");
                PathSql {
                    select: format!(
                        "SELECT graph, subject AS source, object AS target FROM tracker_triples WHERE predicate NOT IN ({list})"
                    ),
                    ctes: Vec::new(),
                }
            }
            PathElement::Inverse(inner) => {
                let inner = self.compile(arena, inner);
                PathSql {
                    select: format!(
                        "SELECT graph, target AS source, source AS target FROM ({}) rev",
                        inner.select
                    ),
                    ctes: inner.ctes,
                }
            }
            PathElement::Sequence(lhs, rhs) => {
                let lhs_sql = self.compile(arena, lhs);
                let rhs_sql = self.compile(arena, rhs);
                let mut ctes = lhs_sql.ctes;
                ctes.extend(rhs_sql.ctes);
                PathSql {
                    select: format!(
                        "SELECT DISTINCT lhs.graph AS graph, lhs.source AS source, rhs.target AS target \
                         FROM ({}) lhs JOIN ({}) rhs ON lhs.target = rhs.source AND lhs.graph = rhs.graph",
                        lhs_sql.select, rhs_sql.select
                    ),
                    ctes,
                }
            }
            PathElement::Alternative(lhs, rhs) => {
                let lhs_sql = self.compile(arena, lhs);
                let rhs_sql = self.compile(arena, rhs);
                let mut ctes = lhs_sql.ctes;
                ctes.extend(rhs_sql.ctes);
                PathSql {
                    select: format!("({}) UNION ({})", lhs_sql.select, rhs_sql.select),
                    ctes,
                }
            }
            PathElement::ZeroOrOne(inner) => {
                let inner_sql = self.compile(arena, inner);
                let zero = self.zero_length_paths();
                PathSql {
                    select: format!("({zero}) UNION ({})", inner_sql.select),
                    ctes: inner_sql.ctes,
                }
            }
            PathElement::ZeroOrMore(inner) => {
                let one_or_more = self.compile_one_or_more(arena, inner);
                let zero = self.zero_length_paths();
                PathSql {
                    select: format!("({zero}) UNION ({})", one_or_more.select),
                    ctes: one_or_more.ctes,
                }
            }
            PathElement::OneOrMore(inner) => self.compile_one_or_more(arena, inner),
        }
    }

    fn compile_one_or_more(&mut self, arena: &PathArena, inner: PathElementId) -> PathSql {
        let inner_sql = self.compile(arena, inner);
        let mut ctes = inner_sql.ctes;
        let name = self.fresh_cte_name();
        let recursive = format!(
            "{name}(graph, source, target) AS (\n\
             SELECT graph, source, target FROM ({})\n\
             UNION\n\
             SELECT p.graph, p.source, i.target FROM {name} p \
             JOIN ({}) i ON p.target = i.source AND p.graph = i.graph\n\
             )",
            inner_sql.select, inner_sql.select
        );
        ctes.push((name.clone(), recursive));
        PathSql { select: format!("SELECT graph, source, target FROM {name}"), ctes }
    }

    fn zero_length_paths(&mut self) -> String {
        "SELECT DISTINCT graph, subject AS source, subject AS target FROM tracker_triples \
         UNION \
         SELECT DISTINCT graph, object AS source, object AS target FROM tracker_triples"
            .to_owned()
    }

    fn fresh_cte_name(&mut self) -> String {
        self.next_id += 1;
        format!("path_{}", self.next_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::NamedNode;

    fn iri(s: &str) -> NamedNode {
        NamedNode::new(s).expect("valid iri")
    }

    #[test]
    fn predicate_leaf_binds_and_scans() {
        let mut arena = PathArena::default();
        let id = arena.push(PathElement::Predicate(iri("http://ex/p")));
        let mut calls = Vec::new();
        let mut bind = |n: &NamedNode| {
            calls.push(n.as_str().to_owned());
            "?1".to_owned()
        };
        let mut compiler = PathCompiler::new(&mut bind);
        let sql = compiler.compile(&arena, id);
        assert!(sql.select.contains("predicate = ?1"));
        assert_eq!(calls, vec!["http://ex/p".to_owned()]);
    }

    #[test]
    fn one_or_more_produces_a_recursive_cte() {
        let mut arena = PathArena::default();
        let p = arena.push(PathElement::Predicate(iri("http://ex/p")));
        let plus = arena.push(PathElement::OneOrMore(p));
        let mut bind = |_: &NamedNode| "?1".to_owned();
        let mut compiler = PathCompiler::new(&mut bind);
        let sql = compiler.compile(&arena, plus);
        assert_eq!(sql.ctes.len(), 1);
        assert!(sql.ctes[0].1.contains("UNION"));
        assert!(sql.select.contains(&sql.ctes[0].0));
    }

    #[test]
    fn inverse_swaps_source_and_target() {
        let mut arena = PathArena::default();
        let p = arena.push(PathElement::Predicate(iri("http://ex/p")));
        let inv = arena.push(PathElement::Inverse(p));
        let mut bind = |_: &NamedNode| "?1".to_owned();
        let mut compiler = PathCompiler::new(&mut bind);
        let sql = compiler.compile(&arena, inv);
        assert!(sql.select.contains("target AS source, source AS target"));
    }
}
