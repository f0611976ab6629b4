//! Predicate and graph resolution for entity properties.

use oxrdf::{GraphName, NamedNode};

use crate::entity::Entity;
use crate::error::{Result, TriplebindError};
use crate::mapper::Mapper;
use crate::model::PropertySpec;
use crate::store::TripleStore;

/// Resolves the predicate of `name` from, in order: the explicit predicate,
/// the property namespace, the entity's default namespace and the model
/// namespace. Empty settings count as absent.
pub fn resolve_predicate(
    name: &str,
    spec: &PropertySpec,
    default_namespace: Option<&str>,
    class_namespace: Option<&str>,
) -> Result<NamedNode> {
    let iri = if let Some(predicate) = present(spec.predicate.as_deref()) {
        predicate.to_owned()
    } else if let Some(ns) = present(spec.ns.as_deref())
        .or_else(|| present(default_namespace))
        .or_else(|| present(class_namespace))
    {
        format!("{ns}{name}")
    } else {
        return Err(TriplebindError::Configuration(format!(
            "no predicate, namespace or default namespace for property '{name}'"
        )));
    };
    NamedNode::new(iri).map_err(|e| {
        TriplebindError::Configuration(format!("predicate of property '{name}' is not an IRI: {e}"))
    })
}

fn present(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

pub fn predicate_for(entity: &Entity, name: &str) -> Result<NamedNode> {
    let spec = entity.definition(name)?;
    resolve_predicate(
        name,
        spec,
        entity.default_namespace(),
        entity.model().namespace.as_deref(),
    )
}

/// The graph the entity's own triples (e.g. its type) live in.
pub fn entity_graph(entity: &Entity) -> GraphName {
    entity
        .mapper()
        .graph_for_type(entity.model_name())
        .or_else(|| entity.default_graph().cloned())
        .map_or(GraphName::DefaultGraph, GraphName::from)
}

/// The graph an instance of `model_name` keeps its own triples in, when it
/// is created without an explicit default graph.
pub fn model_graph(mapper: &Mapper, model_name: &str) -> Result<Option<NamedNode>> {
    if let Some(graph) = mapper.graph_for_type(model_name) {
        return Ok(Some(graph));
    }
    let model = mapper.class_for_model(model_name)?;
    match present(model.default_graph.as_deref()) {
        Some(graph) => Ok(Some(NamedNode::new(graph)?)),
        None if model.solid => Ok(model
            .rdf_type
            .as_deref()
            .map(NamedNode::new)
            .transpose()?
            .and_then(|t| mapper.store().discover_default_graph_by_type(&t))),
        None => Ok(None),
    }
}

/// The graph the triples of property `name` live in.
///
/// Inverse relations are stored with the related entity as subject, so they
/// follow the related model's graph when it has one.
pub fn graph_for(entity: &Entity, name: Option<&str>) -> Result<GraphName> {
    let Some(name) = name else {
        return Ok(entity_graph(entity));
    };
    let spec = entity.definition(name)?;
    if spec.inverse {
        if let Some(model) = spec.model.as_deref() {
            if let Some(graph) = model_graph(entity.mapper(), model)? {
                return Ok(GraphName::from(graph));
            }
        }
    }
    match spec.graph.as_deref().filter(|g| !g.is_empty()) {
        Some(graph) => Ok(GraphName::from(NamedNode::new(graph).map_err(|e| {
            TriplebindError::Configuration(format!("graph of property '{name}' is not an IRI: {e}"))
        })?)),
        None => Ok(entity_graph(entity)),
    }
}
