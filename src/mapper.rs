use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use oxrdf::NamedNode;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::commit::{CommitListener, CommitListeners, CommitReport};
use crate::config::{PersistenceMode, Settings};
use crate::entity::{Entity, EntityOptions};
use crate::error::{Result, TriplebindError};
use crate::model::{ModelConfig, ModelRegistry};
use crate::persist::Persistor;
use crate::store::{MemoryStore, StatementHasher, TripleStore};

// ------------- Mapper -------------
/// Binds a triple store to the registered models.
///
/// This is the model aware half of the store contract: type graphs, model
/// lookup, autosave flags and entity creation. Entities keep an `Arc` to the
/// mapper that created them.
pub struct Mapper {
    store: Arc<dyn TripleStore>,
    model_registry: Arc<Mutex<ModelRegistry>>,
    type_graphs: Arc<Mutex<HashMap<String, NamedNode, StatementHasher>>>,
    commit_listeners: CommitListeners,
    in_flight: Arc<Mutex<Vec<JoinHandle<()>>>>,
    // settles when the most recently started remote update is done
    last_push: Mutex<Option<oneshot::Receiver<()>>>,
    persistor: Option<Arc<Persistor>>,
}

impl Mapper {
    pub fn new(store: Arc<dyn TripleStore>) -> Arc<Self> {
        Arc::new(Self::with_store(store, None))
    }

    fn with_store(store: Arc<dyn TripleStore>, persistor: Option<Arc<Persistor>>) -> Self {
        Self {
            store,
            model_registry: Arc::new(Mutex::new(ModelRegistry::new())),
            type_graphs: Arc::new(Mutex::new(HashMap::default())),
            commit_listeners: CommitListeners::default(),
            in_flight: Arc::new(Mutex::new(Vec::new())),
            last_push: Mutex::new(None),
            persistor,
        }
    }

    /// Opens a mapper as described by the settings: an in-memory store, backed
    /// by a restored SQLite persistor in file mode, with the configured models
    /// and type graphs registered.
    pub fn open(settings: &Settings) -> Result<Arc<Self>> {
        let mapper = match &settings.persistence {
            PersistenceMode::InMemory => Self::with_store(Arc::new(MemoryStore::new()), None),
            PersistenceMode::File(path) => {
                let persistor = Arc::new(Persistor::open(path)?);
                let store = MemoryStore::with_remote(persistor.clone());
                persistor.restore(&store)?;
                info!(path = %path, statements = store.len(), "opened persisted store");
                Self::with_store(Arc::new(store), Some(persistor))
            }
        };
        for model in &settings.models {
            mapper.register(model.clone())?;
        }
        for (model, graph) in &settings.type_graphs {
            mapper.set_graph_for_type(model, NamedNode::new(graph.as_str())?);
        }
        Ok(Arc::new(mapper))
    }

    // functions to access the owned store and registries
    pub fn store(&self) -> Arc<dyn TripleStore> {
        Arc::clone(&self.store)
    }
    pub fn model_registry(&self) -> Arc<Mutex<ModelRegistry>> {
        Arc::clone(&self.model_registry)
    }
    pub fn persistor(&self) -> Option<Arc<Persistor>> {
        self.persistor.clone()
    }
    pub fn commit_listeners(&self) -> &CommitListeners {
        &self.commit_listeners
    }

    pub fn register(&self, model: ModelConfig) -> Result<Arc<ModelConfig>> {
        let (kept, previously_kept) = self
            .model_registry
            .lock()
            .map_err(|e| TriplebindError::Lock(e.to_string()))?
            .keep(model)?;
        if previously_kept {
            warn!(model = %kept.name, "model registered again, replacing the earlier one");
        }
        Ok(kept)
    }

    pub fn class_for_model(&self, model_name: &str) -> Result<Arc<ModelConfig>> {
        self.model_registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model_name)
            .ok_or_else(|| TriplebindError::Configuration(format!("unknown model '{model_name}'")))
    }

    pub fn model_for_type(&self, rdf_type: &NamedNode) -> Option<Arc<ModelConfig>> {
        self.model_registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .model_for_type(rdf_type.as_str())
    }

    pub fn set_graph_for_type(&self, model_name: &str, graph: NamedNode) {
        self.type_graphs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(model_name.to_owned(), graph);
    }

    pub fn graph_for_type(&self, model_name: &str) -> Option<NamedNode> {
        self.type_graphs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model_name)
            .cloned()
    }

    /// Unknown models never autosave.
    pub fn autosave_for_type(&self, model_name: &str) -> bool {
        self.model_registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model_name)
            .is_some_and(|model| model.autosave)
    }

    /// Creates (or wraps) an entity of a registered model.
    pub fn create(self: &Arc<Self>, model_name: &str, options: EntityOptions) -> Result<Entity> {
        let model = self.class_for_model(model_name)?;
        Entity::new(Arc::clone(self), model, options)
    }

    /// Calls `listener` with the outcome of every commit once it is known.
    pub fn on_commit(&self, listener: impl Fn(&CommitReport) + Send + Sync + 'static) {
        let listener: CommitListener = Arc::new(listener);
        self.commit_listeners.add(listener);
    }

    /// Takes a place in the line of remote updates. The returned receiver
    /// settles once the previous update is done; the sender releases the next.
    pub(crate) fn next_in_line(&self) -> (Option<oneshot::Receiver<()>>, oneshot::Sender<()>) {
        let (done, settled) = oneshot::channel();
        let previous = self
            .last_push
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(settled);
        (previous, done)
    }

    pub(crate) fn track(&self, task: JoinHandle<()>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.retain(|t| !t.is_finished());
        in_flight.push(task);
    }

    /// Waits until every remote update started so far has settled.
    pub async fn flush(&self) {
        loop {
            let pending: Vec<JoinHandle<()>> = {
                let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
                in_flight.drain(..).collect()
            };
            if pending.is_empty() {
                return;
            }
            for result in futures_util::future::join_all(pending).await {
                if let Err(e) = result {
                    warn!(error = %e, "remote update task did not finish");
                }
            }
        }
    }
}
