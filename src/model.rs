use std::collections::HashMap;
use std::sync::Arc;

// used to keep the one-to-one mapping between model names and their rdf types
use bimap::BiMap;
use serde::Deserialize;

use crate::datatype::PropertyKind;
use crate::error::{Result, TriplebindError};
use crate::store::StatementHasher;

// ------------- PropertySpec -------------
/// Declarative specification of one property.
///
/// Built with the type constructors ([`PropertySpec::string`],
/// [`PropertySpec::belongs_to`], ...) and refined with the chained options,
/// or deserialized from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PropertySpec {
    #[serde(rename = "type")]
    pub kind: PropertyKind,
    #[serde(default)]
    pub predicate: Option<String>,
    #[serde(default)]
    pub ns: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub inverse: bool,
    #[serde(default)]
    pub inverse_property: Option<String>,
    #[serde(default)]
    pub graph: Option<String>,
    #[serde(default)]
    pub propagate_default_graph: bool,
}

impl PropertySpec {
    pub fn new(kind: PropertyKind) -> Self {
        Self {
            kind,
            predicate: None,
            ns: None,
            model: None,
            inverse: false,
            inverse_property: None,
            graph: None,
            propagate_default_graph: false,
        }
    }
    pub fn string() -> Self {
        Self::new(PropertyKind::String)
    }
    pub fn integer() -> Self {
        Self::new(PropertyKind::Integer)
    }
    pub fn boolean() -> Self {
        Self::new(PropertyKind::Boolean)
    }
    pub fn date_time() -> Self {
        Self::new(PropertyKind::DateTime)
    }
    pub fn term() -> Self {
        Self::new(PropertyKind::Term)
    }
    pub fn belongs_to(model: impl Into<String>) -> Self {
        Self::new(PropertyKind::BelongsTo).model(model)
    }
    pub fn has_many(model: impl Into<String>) -> Self {
        Self::new(PropertyKind::HasMany).model(model)
    }

    pub fn predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }
    pub fn ns(mut self, ns: impl Into<String>) -> Self {
        self.ns = Some(ns.into());
        self
    }
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
    /// Read and write the relation with the entity as object rather than subject.
    pub fn inverse(mut self) -> Self {
        self.inverse = true;
        self
    }
    /// The property on the related model to invalidate when this relation changes.
    pub fn inverse_property(mut self, name: impl Into<String>) -> Self {
        self.inverse_property = Some(name.into());
        self
    }
    pub fn graph(mut self, graph: impl Into<String>) -> Self {
        self.graph = Some(graph.into());
        self
    }
    pub fn propagate_default_graph(mut self) -> Self {
        self.propagate_default_graph = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttributeConfig {
    pub name: String,
    #[serde(flatten)]
    pub spec: PropertySpec,
}

// ------------- ModelConfig -------------
/// Everything that is fixed per model: its rdf type, namespace, default graph,
/// autosave flag and the ordered attribute definitions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    #[serde(default)]
    pub rdf_type: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub default_graph: Option<String>,
    #[serde(default)]
    pub autosave: bool,
    /// Discover the default graph from the store's type index.
    #[serde(default)]
    pub solid: bool,
    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,
}

impl ModelConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rdf_type: None,
            namespace: None,
            default_graph: None,
            autosave: false,
            solid: false,
            attributes: Vec::new(),
        }
    }
    pub fn rdf_type(mut self, rdf_type: impl Into<String>) -> Self {
        self.rdf_type = Some(rdf_type.into());
        self
    }
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
    pub fn default_graph(mut self, graph: impl Into<String>) -> Self {
        self.default_graph = Some(graph.into());
        self
    }
    pub fn autosave(mut self, autosave: bool) -> Self {
        self.autosave = autosave;
        self
    }
    pub fn solid(mut self) -> Self {
        self.solid = true;
        self
    }
    /// Declares (or redeclares) an attribute, keeping declaration order.
    pub fn attribute(mut self, name: impl Into<String>, spec: PropertySpec) -> Self {
        let name = name.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.spec = spec,
            None => self.attributes.push(AttributeConfig { name, spec }),
        }
        self
    }

    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }
    pub fn attribute_definition(&self, name: &str) -> Option<&PropertySpec> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.spec)
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(TriplebindError::Configuration("model without a name".into()));
        }
        for attribute in &self.attributes {
            if attribute.spec.kind.is_relation() && attribute.spec.model.is_none() {
                return Err(TriplebindError::Configuration(format!(
                    "relation '{}' on model '{}' does not name its related model",
                    attribute.name, self.name
                )));
            }
        }
        Ok(())
    }
}

// ------------- ModelRegistry -------------
#[derive(Debug, Default)]
pub struct ModelRegistry {
    kept: HashMap<String, Arc<ModelConfig>, StatementHasher>,
    types: BiMap<String, String>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }
    /// Registers a model, replacing an earlier registration with the same name.
    /// An rdf type already bound to another model is rejected.
    pub fn keep(&mut self, model: ModelConfig) -> Result<(Arc<ModelConfig>, bool)> {
        model.validate()?;
        let name = model.name.clone();
        if let Some(rdf_type) = &model.rdf_type {
            if let Some(other) = self.types.get_by_right(rdf_type).filter(|other| **other != name) {
                return Err(TriplebindError::Configuration(format!(
                    "rdf type '{rdf_type}' of model '{name}' is already bound to model '{other}'"
                )));
            }
            self.types.insert(name.clone(), rdf_type.clone());
        } else {
            self.types.remove_by_left(&name);
        }
        let kept = Arc::new(model);
        let previously_kept = self.kept.insert(name, Arc::clone(&kept)).is_some();
        Ok((kept, previously_kept))
    }
    pub fn get(&self, name: &str) -> Option<Arc<ModelConfig>> {
        self.kept.get(name).map(Arc::clone)
    }
    pub fn model_for_type(&self, rdf_type: &str) -> Option<Arc<ModelConfig>> {
        self.types
            .get_by_right(rdf_type)
            .and_then(|name| self.get(name))
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}
