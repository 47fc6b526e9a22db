//! The update planner (spec §4.10 "Update planner (C10)"): turns a parsed
//! `spargebra::Update` into an ordered [`UpdatePlan`] of [`OpGroup`]s, each
//! either a WHERE-cursor-driven run of triple templates or a single,
//! cursor-less graph-management op.

use rdfsql_compiler::{compile_update_where, GraphPolicy};
use rdfsql_ontology::Ontology;
use spargebra::term::GraphTarget;
use spargebra::update::GraphUpdateOperation;
use spargebra::Update;

use crate::error::UpdateResult;
use crate::op::{GraphScope, OpGroup, TripleOp, TripleOpKind, UpdateOp, UpdatePlan};
use crate::term::{UpdateGraph, UpdateTerm};

/// Compiles every operation of `update` into an [`UpdatePlan`], resolving
/// each `DeleteInsert`'s `WHERE` clause against `ontology` up front so a
/// planning-time failure (unknown property, unbound filter variable, ...)
/// surfaces before any storage operation runs.
pub fn plan_update(ontology: &Ontology, update: &Update, policy: &GraphPolicy) -> UpdateResult<UpdatePlan> {
    let groups = update
        .operations
        .iter()
        .map(|operation| plan_operation(ontology, operation, policy))
        .collect::<UpdateResult<Vec<_>>>()?;
    Ok(UpdatePlan { groups })
}

fn plan_operation(ontology: &Ontology, operation: &GraphUpdateOperation, policy: &GraphPolicy) -> UpdateResult<OpGroup> {
    match operation {
        GraphUpdateOperation::InsertData { data } => {
            let ops = data
                .iter()
                .map(|quad| {
                    triple_op(
                        ontology,
                        quad.subject.clone().into(),
                        quad.predicate.clone().into(),
                        quad.object.clone().into(),
                        quad.graph_name.clone().into(),
                    )
                })
                .collect::<UpdateResult<Vec<_>>>()?;
            Ok(OpGroup { ops, select: None })
        }
        GraphUpdateOperation::DeleteData { data } => {
            let ops = data
                .iter()
                .map(|quad| {
                    Ok(UpdateOp::Triple(TripleOp {
                        kind: TripleOpKind::Delete,
                        subject: quad.subject.clone().into(),
                        predicate: UpdateTerm::from(quad.predicate.clone()).require_predicate_shape()?,
                        object: quad.object.clone().into(),
                        graph: quad.graph_name.clone().into(),
                    }))
                })
                .collect::<UpdateResult<Vec<_>>>()?;
            Ok(OpGroup { ops, select: None })
        }
        GraphUpdateOperation::DeleteInsert { delete, insert, using, pattern } => {
            let select = compile_update_where(ontology, using.as_ref(), pattern, policy)?;
            let mut ops = Vec::with_capacity(delete.len() + insert.len());
            for quad in delete {
                ops.push(UpdateOp::Triple(TripleOp {
                    kind: TripleOpKind::Delete,
                    subject: quad.subject.clone().into(),
                    predicate: UpdateTerm::from(quad.predicate.clone()).require_predicate_shape()?,
                    object: quad.object.clone().into(),
                    graph: quad.graph_name.clone().into(),
                }));
            }
            for quad in insert {
                ops.push(triple_op(
                    ontology,
                    quad.subject.clone().into(),
                    quad.predicate.clone().into(),
                    quad.object.clone().into(),
                    quad.graph_name.clone().into(),
                )?);
            }
            Ok(OpGroup { ops, select: Some(select) })
        }
        GraphUpdateOperation::Load { silent, source, destination } => Ok(OpGroup {
            ops: vec![UpdateOp::Load {
                silent: *silent,
                source: source.clone(),
                destination: destination.clone().into(),
            }],
            select: None,
        }),
        GraphUpdateOperation::Clear { silent, graph } => {
            Ok(OpGroup { ops: vec![UpdateOp::Clear { silent: *silent, graph: graph_scope(graph) }], select: None })
        }
        GraphUpdateOperation::Create { silent, graph } => {
            Ok(OpGroup { ops: vec![UpdateOp::Create { silent: *silent, graph: graph.clone() }], select: None })
        }
        GraphUpdateOperation::Drop { silent, graph } => {
            Ok(OpGroup { ops: vec![UpdateOp::Drop { silent: *silent, graph: graph_scope(graph) }], select: None })
        }
    }
}

/// Builds the INSERT side of a quad template, choosing `Insert` (append a
/// new row) for a multi-valued property and `Replace` (overwrite the
/// existing value) for a single-valued one. When the predicate is itself a
/// variable its multiplicity cannot be known until the WHERE cursor
/// resolves it, so this conservatively always appends (`Insert`) — see
/// DESIGN.md.
fn triple_op(
    ontology: &Ontology,
    subject: UpdateTerm,
    predicate: UpdateTerm,
    object: UpdateTerm,
    graph: UpdateGraph,
) -> UpdateResult<UpdateOp> {
    let predicate = predicate.require_predicate_shape()?;
    let kind = match &predicate {
        UpdateTerm::NamedNode(iri) => match ontology.property(iri) {
            Ok(property) if !property.is_multi_valued() => TripleOpKind::Replace,
            Ok(_) => TripleOpKind::Insert,
            Err(_) => TripleOpKind::Insert,
        },
        _ => TripleOpKind::Insert,
    };
    Ok(UpdateOp::Triple(TripleOp { kind, subject, predicate, object, graph }))
}

fn graph_scope(target: &GraphTarget) -> GraphScope {
    match target {
        GraphTarget::NamedNode(n) => GraphScope::Named(n.clone()),
        GraphTarget::DefaultGraph => GraphScope::Default,
        GraphTarget::NamedGraphs => GraphScope::AllNamed,
        GraphTarget::AllGraphs => GraphScope::All,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdfsql_model::{NamedNode, RdfTermType};
    use rdfsql_ontology::Property;

    fn test_ontology() -> Ontology {
        let knows = NamedNode::new("http://ex/knows").expect("valid iri");
        let name = NamedNode::new("http://ex/name").expect("valid iri");
        Ontology::builder()
            .with_property(Property::new(knows, RdfTermType::Resource, "knows", "value", true))
            .with_property(Property::new(name, RdfTermType::String, "Person", "name", false))
            .build()
    }

    #[test]
    fn insert_data_is_one_cursorless_group() {
        let ontology = test_ontology();
        let update = Update::parse(
            "INSERT DATA { <http://ex/a> <http://ex/name> \"Ada\" }",
            None,
        )
        .expect("valid update");
        let plan = plan_update(&ontology, &update, &GraphPolicy::unrestricted()).expect("plans");
        assert_eq!(plan.groups.len(), 1);
        assert!(plan.groups[0].select.is_none());
        assert_eq!(plan.groups[0].ops.len(), 1);
        assert!(matches!(
            &plan.groups[0].ops[0],
            UpdateOp::Triple(TripleOp { kind: TripleOpKind::Replace, .. })
        ));
    }

    #[test]
    fn insert_data_multi_valued_property_appends() {
        let ontology = test_ontology();
        let update =
            Update::parse("INSERT DATA { <http://ex/a> <http://ex/knows> <http://ex/b> }", None)
                .expect("valid update");
        let plan = plan_update(&ontology, &update, &GraphPolicy::unrestricted()).expect("plans");
        assert!(matches!(
            &plan.groups[0].ops[0],
            UpdateOp::Triple(TripleOp { kind: TripleOpKind::Insert, .. })
        ));
    }

    #[test]
    fn delete_insert_compiles_a_where_cursor() {
        let ontology = test_ontology();
        let update = Update::parse(
            "DELETE { ?s <http://ex/name> ?old } INSERT { ?s <http://ex/name> ?new } \
             WHERE { ?s <http://ex/name> ?old . BIND(CONCAT(?old, \"!\") AS ?new) }",
            None,
        )
        .expect("valid update");
        let plan = plan_update(&ontology, &update, &GraphPolicy::unrestricted()).expect("plans");
        assert_eq!(plan.groups.len(), 1);
        assert!(plan.groups[0].select.is_some());
        assert_eq!(plan.groups[0].ops.len(), 2);
    }

    #[test]
    fn clear_all_is_a_graph_scope_op() {
        let ontology = test_ontology();
        let update = Update::parse("CLEAR ALL", None).expect("valid update");
        let plan = plan_update(&ontology, &update, &GraphPolicy::unrestricted()).expect("plans");
        assert!(matches!(&plan.groups[0].ops[0], UpdateOp::Clear { graph: GraphScope::All, .. }));
    }
}
