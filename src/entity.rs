use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use oxrdf::vocab::rdf;
use oxrdf::{GraphName, NamedNode, Term};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::commit::{CommitTicket, Draft, TripleDiff, commit};
use crate::datatype::{PropertyKind, Value, term_for, value_from};
use crate::error::{Result, TriplebindError};
use crate::mapper::Mapper;
use crate::model::{ModelConfig, PropertySpec};
use crate::resolve::{entity_graph, graph_for, predicate_for};
use crate::store::{Statement, StatementHasher, TripleStore};

// ------------- Options -------------
/// Construction options for an entity. Everything is optional; what is not
/// given falls back to the model configuration.
#[derive(Debug, Clone, Default)]
pub struct EntityOptions {
    pub default_graph: Option<String>,
    pub default_namespace: Option<String>,
    pub model_name: Option<String>,
    pub uri: Option<String>,
    pub uuid: Option<String>,
    pub rdf_type: Option<String>,
    pub values: Vec<(String, Value)>,
}

impl EntityOptions {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn default_graph(mut self, graph: impl Into<String>) -> Self {
        self.default_graph = Some(graph.into());
        self
    }
    pub fn default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = Some(namespace.into());
        self
    }
    pub fn model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
        self
    }
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }
    /// The identifier a generated uri ends in, instead of a fresh v4 uuid.
    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }
    pub fn rdf_type(mut self, rdf_type: impl Into<String>) -> Self {
        self.rdf_type = Some(rdf_type.into());
        self
    }
    /// An initial property value, written through the normal write path.
    pub fn value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.push((name.into(), value.into()));
        self
    }
}

// ------------- Listeners -------------
/// What a change listener is told about a write.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub updated_field: String,
    pub new_value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type ChangeListener = Arc<dyn Fn(&Entity, &Change) + Send + Sync>;

/// The triples a write would commit, and the related entities whose
/// membership in the relation changes.
#[derive(Debug, Clone)]
pub struct PropertyDiff {
    pub diff: TripleDiff,
    pub added: Vec<Entity>,
    pub removed: Vec<Entity>,
    /// The value the cache holds after the write.
    pub value: Value,
}

// ------------- Entity -------------
struct EntityInner {
    mapper: Arc<Mapper>,
    model: Arc<ModelConfig>,
    model_name: String,
    uri: NamedNode,
    rdf_type: Option<NamedNode>,
    default_namespace: Option<String>,
    default_graph: Option<NamedNode>,
    cache: Mutex<HashMap<String, Value, StatementHasher>>,
    listeners: Mutex<Vec<(ListenerId, ChangeListener)>>,
    listener_sequence: AtomicU64,
}

/// Handle on one resource in the store, typed by its model.
///
/// Clones share the property cache and the listeners. Two handles are equal
/// when they denote the same uri; separately created handles for one uri have
/// separate caches.
#[derive(Clone)]
pub struct Entity {
    inner: Arc<EntityInner>,
}

impl Entity {
    pub(crate) fn new(mapper: Arc<Mapper>, model: Arc<ModelConfig>, options: EntityOptions) -> Result<Self> {
        Self::build(mapper, model, options, true)
    }

    fn build(
        mapper: Arc<Mapper>,
        model: Arc<ModelConfig>,
        options: EntityOptions,
        assert_type: bool,
    ) -> Result<Self> {
        let EntityOptions {
            default_graph,
            default_namespace,
            model_name,
            uri,
            uuid,
            rdf_type,
            values,
        } = options;
        let rdf_type = rdf_type
            .or_else(|| model.rdf_type.clone())
            .map(NamedNode::new)
            .transpose()?;
        let default_graph = match default_graph.or_else(|| model.default_graph.clone()) {
            Some(graph) => Some(NamedNode::new(graph)?),
            None if model.solid => rdf_type
                .as_ref()
                .and_then(|t| mapper.store().discover_default_graph_by_type(t)),
            None => None,
        };
        let uri = match uri {
            Some(uri) => NamedNode::new(uri)?,
            None => {
                let Some(graph) = &default_graph else {
                    return Err(TriplebindError::Configuration(format!(
                        "no uri given and model '{}' has no default graph to mint one in",
                        model.name
                    )));
                };
                let id = uuid.unwrap_or_else(|| Uuid::new_v4().to_string());
                NamedNode::new(format!("{}#{}", graph.as_str(), id))?
            }
        };
        let model_name = model_name.unwrap_or_else(|| model.name.clone());
        let entity = Entity {
            inner: Arc::new(EntityInner {
                mapper,
                model,
                model_name,
                uri,
                rdf_type,
                default_namespace,
                default_graph,
                cache: Mutex::new(HashMap::default()),
                listeners: Mutex::new(Vec::new()),
                listener_sequence: AtomicU64::new(0),
            }),
        };
        if assert_type {
            entity.assert_type();
        }
        for (name, value) in values {
            entity.set(&name, value)?;
        }
        Ok(entity)
    }

    // functions to access the resolved identity and configuration
    pub fn uri(&self) -> &NamedNode {
        &self.inner.uri
    }
    pub fn rdf_type(&self) -> Option<&NamedNode> {
        self.inner.rdf_type.as_ref()
    }
    pub fn model(&self) -> &Arc<ModelConfig> {
        &self.inner.model
    }
    pub fn model_name(&self) -> &str {
        &self.inner.model_name
    }
    pub fn mapper(&self) -> &Arc<Mapper> {
        &self.inner.mapper
    }
    pub fn default_namespace(&self) -> Option<&str> {
        self.inner.default_namespace.as_deref()
    }
    pub fn default_graph(&self) -> Option<&NamedNode> {
        self.inner.default_graph.as_ref()
    }
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.inner.model.attributes()
    }
    pub fn definition(&self, name: &str) -> Result<&PropertySpec> {
        self.inner
            .model
            .attribute_definition(name)
            .ok_or_else(|| TriplebindError::UnknownAttribute {
                model: self.inner.model.name.clone(),
                attribute: name.to_owned(),
            })
    }

    fn autosave(&self) -> bool {
        self.mapper().autosave_for_type(self.model_name())
    }
    fn cache(&self) -> MutexGuard<'_, HashMap<String, Value, StatementHasher>> {
        self.inner.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
    fn cached(&self, name: &str) -> Option<Value> {
        self.cache().get(name).cloned()
    }
    fn type_statement(&self, rdf_type: &NamedNode) -> Statement {
        Statement::new(self.uri().clone(), rdf::TYPE.into_owned(), rdf_type.clone(), entity_graph(self))
    }

    // The type triple is only inserted when the store does not have it yet.
    fn assert_type(&self) -> Option<CommitTicket> {
        let statement = self.type_statement(self.rdf_type()?);
        let exists = self
            .mapper()
            .store()
            .any(
                Some(&statement.subject),
                Some(&statement.predicate),
                Some(&statement.object),
                Some(&statement.graph),
            )
            .is_some();
        if exists {
            return None;
        }
        let diff = TripleDiff { deletes: Vec::new(), inserts: vec![statement] };
        Some(commit(self.mapper(), self.uri(), diff, self.autosave()))
    }

    // ------------- Read path -------------
    /// The value of property `name`, read from the store on first access and
    /// from the cache afterwards.
    pub fn get(&self, name: &str) -> Result<Value> {
        let spec = self.definition(name)?;
        if let Some(value) = self.cached(name) {
            return Ok(value);
        }
        let value = self.read(name, spec)?;
        self.cache().insert(name.to_owned(), value.clone());
        Ok(value)
    }

    /// Reads property `name` from the store, replacing whatever was cached.
    pub fn materialize(&self, name: &str) -> Result<Value> {
        let spec = self.definition(name)?;
        let value = self.read(name, spec)?;
        self.cache().insert(name.to_owned(), value.clone());
        Ok(value)
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.cache().contains_key(name)
    }
    /// Forgets the cached value, so the next read goes to the store.
    pub fn invalidate(&self, name: &str) {
        self.cache().remove(name);
    }
    pub fn invalidate_all(&self) {
        self.cache().clear();
    }

    fn read(&self, name: &str, spec: &PropertySpec) -> Result<Value> {
        let predicate = predicate_for(self, name)?;
        let graph = graph_for(self, Some(name))?;
        let store = self.mapper().store();
        let me = Term::from(self.uri().clone());
        let (subject, object) = if spec.inverse { (None, Some(&me)) } else { (Some(&me), None) };
        let value = if spec.kind == PropertyKind::HasMany {
            let mut members = Vec::new();
            for statement in store.match_pattern(subject, Some(&predicate), object, Some(&graph)) {
                let term = if spec.inverse { statement.subject } else { statement.object };
                if let Some(member) = self.related(name, spec, term)? {
                    members.push(member);
                }
            }
            Value::Entities(members)
        } else {
            let term = store
                .any(subject, Some(&predicate), object, Some(&graph))
                .map(|s| if spec.inverse { s.subject } else { s.object });
            match (spec.kind, term) {
                (PropertyKind::BelongsTo, Some(term)) => self
                    .related(name, spec, term)?
                    .map_or(Value::Null, Value::Entity),
                (PropertyKind::BelongsTo, None) => Value::Null,
                (kind, term) => value_from(kind, term.as_ref()),
            }
        };
        debug!(uri = %self.uri(), attribute = name, %value, "materialized");
        Ok(value)
    }

    // Wraps a matched term as an entity of the relation's model. Reading never
    // writes, so the related entity's type triple is not asserted here.
    fn related(&self, name: &str, spec: &PropertySpec, term: Term) -> Result<Option<Entity>> {
        let uri = match term {
            Term::NamedNode(uri) => uri,
            other => {
                warn!(uri = %self.uri(), attribute = name, term = %other, "related term is not a named node, skipped");
                return Ok(None);
            }
        };
        let model_name = spec.model.as_deref().ok_or_else(|| {
            TriplebindError::Configuration(format!("relation '{name}' does not name its related model"))
        })?;
        let model = self.mapper().class_for_model(model_name)?;
        let mut options = EntityOptions::new().uri(uri.into_string());
        if spec.propagate_default_graph {
            if let Some(graph) = self.default_graph() {
                options = options.default_graph(graph.as_str());
            }
        }
        Entity::build(Arc::clone(self.mapper()), model, options, false).map(Some)
    }

    // ------------- Write path -------------
    /// Computes what assigning `value` to `name` would commit, without
    /// committing it.
    pub fn plan(&self, name: &str, value: &Value) -> Result<PropertyDiff> {
        let spec = self.definition(name)?;
        let predicate = predicate_for(self, name)?;
        let graph = graph_for(self, Some(name))?;
        match spec.kind {
            PropertyKind::HasMany => self.plan_members(name, spec, value, &predicate, &graph),
            PropertyKind::BelongsTo => {
                let next = match value {
                    Value::Null => None,
                    Value::Entity(e) => Some(e.clone()),
                    Value::Term(t @ Term::NamedNode(_)) => self.related(name, spec, t.clone())?,
                    other => {
                        return Err(TriplebindError::TypeMismatch {
                            attribute: name.to_owned(),
                            expected: spec.kind.name(),
                            found: other.variant(),
                        });
                    }
                };
                let previous = match self.cached(name) {
                    Some(value) => value.as_entity().cloned(),
                    None => self.read(name, spec)?.as_entity().cloned(),
                };
                let inserts = next
                    .iter()
                    .map(|e| self.draft(spec, &predicate, e.uri().clone().into(), &graph))
                    .collect();
                let changed = previous != next;
                Ok(PropertyDiff {
                    diff: TripleDiff::from_drafts(self.current(spec, &predicate, &graph), inserts),
                    added: next.iter().filter(|_| changed).cloned().collect(),
                    removed: previous.into_iter().filter(|_| changed).collect(),
                    value: next.map_or(Value::Null, Value::Entity),
                })
            }
            kind => {
                let inserts = term_for(name, kind, value)?
                    .map(|term| self.draft(spec, &predicate, term, &graph))
                    .into_iter()
                    .collect();
                Ok(PropertyDiff {
                    diff: TripleDiff::from_drafts(self.current(spec, &predicate, &graph), inserts),
                    added: Vec::new(),
                    removed: Vec::new(),
                    value: value.clone(),
                })
            }
        }
    }

    fn plan_members(
        &self,
        name: &str,
        spec: &PropertySpec,
        value: &Value,
        predicate: &NamedNode,
        graph: &GraphName,
    ) -> Result<PropertyDiff> {
        let assigned = value.as_entities().ok_or_else(|| TriplebindError::TypeMismatch {
            attribute: name.to_owned(),
            expected: spec.kind.name(),
            found: value.variant(),
        })?;
        let mut next: Vec<Entity> = Vec::with_capacity(assigned.len());
        for member in assigned {
            if !next.contains(member) {
                next.push(member.clone());
            }
        }
        let prior = match self.cached(name) {
            Some(value) => value.as_entities().map(<[Entity]>::to_vec).unwrap_or_default(),
            None => {
                if next.is_empty() {
                    warn!(
                        uri = %self.uri(),
                        attribute = name,
                        "clearing a relation that was never read, only members found in the store are removed"
                    );
                }
                let stored = self.read(name, spec)?;
                stored.as_entities().map(<[Entity]>::to_vec).unwrap_or_default()
            }
        };
        let added: Vec<Entity> = next.iter().filter(|e| !prior.contains(e)).cloned().collect();
        let removed: Vec<Entity> = prior.into_iter().filter(|e| !next.contains(e)).collect();
        let drafts = |members: &[Entity]| -> Vec<Draft> {
            members
                .iter()
                .map(|e| self.draft(spec, predicate, e.uri().clone().into(), graph))
                .collect()
        };
        Ok(PropertyDiff {
            diff: TripleDiff::from_drafts(drafts(&removed), drafts(&added)),
            added,
            removed,
            value: Value::Entities(next),
        })
    }

    // Every statement currently held for the property.
    fn current(&self, spec: &PropertySpec, predicate: &NamedNode, graph: &GraphName) -> Vec<Draft> {
        let me = Term::from(self.uri().clone());
        let (subject, object) = if spec.inverse { (None, Some(&me)) } else { (Some(&me), None) };
        self.mapper()
            .store()
            .match_pattern(subject, Some(predicate), object, Some(graph))
            .into_iter()
            .map(Draft::from)
            .collect()
    }

    fn draft(&self, spec: &PropertySpec, predicate: &NamedNode, term: Term, graph: &GraphName) -> Draft {
        let me = Term::from(self.uri().clone());
        let (subject, object) = if spec.inverse { (term, me) } else { (me, term) };
        Draft::new(Some(subject), Some(predicate.clone()), Some(object), graph.clone())
    }

    /// Assigns `value` to property `name`.
    ///
    /// The local store and the cache are updated and the change listeners are
    /// called before this returns. With autosave, the returned ticket settles
    /// once the remote update has.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<CommitTicket> {
        let spec = self.definition(name)?;
        let planned = self.plan(name, &value.into())?;
        let ticket = commit(self.mapper(), self.uri(), planned.diff, self.autosave());
        if let Some(inverse) = spec.inverse_property.as_deref() {
            for related in planned.added.iter().chain(&planned.removed) {
                related.invalidate(inverse);
            }
        }
        self.cache().insert(name.to_owned(), planned.value.clone());
        self.notify(&Change {
            updated_field: name.to_owned(),
            new_value: planned.value,
        });
        Ok(ticket)
    }

    // ------------- Listeners -------------
    pub fn add_change_listener(&self, listener: impl Fn(&Entity, &Change) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.inner.listener_sequence.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Returns whether the listener was registered.
    pub fn remove_change_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    fn notify(&self, change: &Change) {
        // listeners may write to the entity, so they run without the lock held
        let listeners: Vec<ChangeListener> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(self, change);
        }
    }

    // ------------- Destruction -------------
    /// Clears every declared attribute and retracts the type triple.
    ///
    /// The handle stays usable; callers drop it themselves.
    pub fn destroy(&self) -> Result<Vec<CommitTicket>> {
        let names: Vec<String> = self.attributes().map(str::to_owned).collect();
        let mut tickets = Vec::with_capacity(names.len() + 1);
        for name in names {
            tickets.push(self.set(&name, Value::Null)?);
        }
        if let Some(rdf_type) = self.rdf_type() {
            let diff = TripleDiff {
                deletes: vec![self.type_statement(rdf_type)],
                inserts: Vec::new(),
            };
            tickets.push(commit(self.mapper(), self.uri(), diff, self.autosave()));
        }
        debug!(uri = %self.uri(), "destroyed");
        Ok(tickets)
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.uri() == other.uri()
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uri().hash(state);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Entity")
            .field("uri", &self.uri().as_str())
            .field("model", &self.model_name())
            .finish()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.uri())
    }
}
