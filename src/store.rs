use std::sync::{Arc, Mutex, PoisonError};

// the remote update is asynchronous and has to be callable through a trait object
use async_trait::async_trait;

// the RDF term model
use oxrdf::{GraphName, NamedNode, Term};

// keepers and lookups use HashSet and HashMap with a fast hasher
use core::hash::{BuildHasher, BuildHasherDefault};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use seahash::SeaHasher;

// used to print out readable forms of a statement
use std::fmt;

use tracing::{debug, warn};

use crate::error::SyncError;

pub type StatementHasher = BuildHasherDefault<SeaHasher>;

pub const SOLID: &str = "http://www.w3.org/ns/solid/terms#";

// ------------- Statement -------------
/// One triple scoped to a named graph (or the default graph).
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Statement {
    pub subject: Term,
    pub predicate: NamedNode,
    pub object: Term,
    pub graph: GraphName,
}

impl Statement {
    pub fn new(
        subject: impl Into<Term>,
        predicate: NamedNode,
        object: impl Into<Term>,
        graph: impl Into<GraphName>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate,
            object: object.into(),
            graph: graph.into(),
        }
    }
    fn matches(
        &self,
        subject: Option<&Term>,
        predicate: Option<&NamedNode>,
        object: Option<&Term>,
        graph: Option<&GraphName>,
    ) -> bool {
        subject.is_none_or(|s| *s == self.subject)
            && predicate.is_none_or(|p| *p == self.predicate)
            && object.is_none_or(|o| *o == self.object)
            && graph.is_none_or(|g| *g == self.graph)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.graph {
            GraphName::DefaultGraph => {
                write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
            }
            graph => write!(f, "{} {} {} {} .", self.subject, self.predicate, self.object, graph),
        }
    }
}

// ------------- Contracts -------------
/// The graph primitives the mapping layer consumes.
///
/// `None` in any position of `match_pattern`/`any` is a wildcard. The local
/// mutations (`add_all`, `remove_statements`) are synchronous; `update` pushes
/// a diff to whatever remote the store synchronizes with.
#[async_trait]
pub trait TripleStore: Send + Sync {
    fn match_pattern(
        &self,
        subject: Option<&Term>,
        predicate: Option<&NamedNode>,
        object: Option<&Term>,
        graph: Option<&GraphName>,
    ) -> Vec<Statement>;

    fn any(
        &self,
        subject: Option<&Term>,
        predicate: Option<&NamedNode>,
        object: Option<&Term>,
        graph: Option<&GraphName>,
    ) -> Option<Statement> {
        self.match_pattern(subject, predicate, object, graph).into_iter().next()
    }

    fn add_all(&self, statements: &[Statement]);

    fn remove_statements(&self, statements: &[Statement]);

    async fn update(&self, deletes: Vec<Statement>, inserts: Vec<Statement>) -> Result<(), SyncError>;

    /// The graph instances of `rdf_type` are registered in, if the store can tell.
    fn discover_default_graph_by_type(&self, rdf_type: &NamedNode) -> Option<NamedNode>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Destination of the store's `update`, e.g. a pod, an endpoint or a local database.
#[async_trait]
pub trait RemoteSync: Send + Sync {
    async fn update(&self, deletes: &[Statement], inserts: &[Statement]) -> Result<(), SyncError>;
}

// ------------- Lookups -------------
#[derive(Debug)]
pub struct Lookup<K, V, H = StatementHasher> {
    index: HashMap<K, HashSet<V, H>, H>,
}
impl<K: Eq + Hash, V: Eq + Hash, H: BuildHasher + Default> Lookup<K, V, H> {
    pub fn new() -> Self {
        Self {
            index: HashMap::<K, HashSet<V, H>, H>::default(),
        }
    }
    pub fn insert(&mut self, key: K, value: V) {
        let set = self.index.entry(key).or_default();
        set.insert(value);
    }
    pub fn remove(&mut self, key: &K, value: &V) {
        if let Some(set) = self.index.get_mut(key) {
            set.remove(value);
            if set.is_empty() {
                self.index.remove(key);
            }
        }
    }
    pub fn lookup(&self, key: &K) -> Option<&HashSet<V, H>> {
        self.index.get(key)
    }
}
impl<K: Eq + Hash, V: Eq + Hash, H: BuildHasher + Default> Default for Lookup<K, V, H> {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- StatementKeeper -------------
// Owns every statement once and remembers the order they arrived in, so that
// matches come back in insertion order.
#[derive(Debug, Default)]
pub struct StatementKeeper {
    kept: HashMap<Arc<Statement>, u64, StatementHasher>,
    sequence: u64,
    subject_lookup: Lookup<Term, Arc<Statement>>,
    predicate_lookup: Lookup<NamedNode, Arc<Statement>>,
    object_lookup: Lookup<Term, Arc<Statement>>,
}
impl StatementKeeper {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn keep(&mut self, statement: Statement) -> (Arc<Statement>, bool) {
        let keepsake = Arc::new(statement);
        match self.kept.entry(Arc::clone(&keepsake)) {
            Entry::Occupied(e) => (Arc::clone(e.key()), true),
            Entry::Vacant(e) => {
                self.sequence += 1;
                e.insert(self.sequence);
                self.subject_lookup
                    .insert(keepsake.subject.clone(), Arc::clone(&keepsake));
                self.predicate_lookup
                    .insert(keepsake.predicate.clone(), Arc::clone(&keepsake));
                self.object_lookup
                    .insert(keepsake.object.clone(), Arc::clone(&keepsake));
                (keepsake, false)
            }
        }
    }
    pub fn release(&mut self, statement: &Statement) -> bool {
        let Some((kept, _)) = self.kept.remove_entry(statement) else {
            return false;
        };
        self.subject_lookup.remove(&kept.subject, &kept);
        self.predicate_lookup.remove(&kept.predicate, &kept);
        self.object_lookup.remove(&kept.object, &kept);
        true
    }
    pub fn find(
        &self,
        subject: Option<&Term>,
        predicate: Option<&NamedNode>,
        object: Option<&Term>,
        graph: Option<&GraphName>,
    ) -> Vec<Statement> {
        // start from the narrowest index that a bound position offers
        let mut candidates: Option<&HashSet<Arc<Statement>, StatementHasher>> = None;
        let indexed = [
            subject.map(|s| self.subject_lookup.lookup(s)),
            predicate.map(|p| self.predicate_lookup.lookup(p)),
            object.map(|o| self.object_lookup.lookup(o)),
        ];
        for index in indexed.into_iter().flatten() {
            match index {
                None => return Vec::new(),
                Some(set) => {
                    if candidates.is_none_or(|c| set.len() < c.len()) {
                        candidates = Some(set);
                    }
                }
            }
        }
        let mut found: Vec<(u64, &Arc<Statement>)> = match candidates {
            Some(set) => set
                .iter()
                .filter(|s| s.matches(subject, predicate, object, graph))
                .map(|s| (self.kept.get(s).copied().unwrap_or_default(), s))
                .collect(),
            None => self
                .kept
                .iter()
                .filter(|(s, _)| s.matches(subject, predicate, object, graph))
                .map(|(s, n)| (*n, s))
                .collect(),
        };
        found.sort_unstable_by_key(|(n, _)| *n);
        found.into_iter().map(|(_, s)| Statement::clone(s)).collect()
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}

// ------------- MemoryStore -------------
/// An indexed in-memory triple store, optionally synchronized with a remote.
pub struct MemoryStore {
    statement_keeper: Arc<Mutex<StatementKeeper>>,
    remote: Option<Arc<dyn RemoteSync>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            statement_keeper: Arc::new(Mutex::new(StatementKeeper::new())),
            remote: None,
        }
    }
    pub fn with_remote(remote: Arc<dyn RemoteSync>) -> Self {
        Self {
            statement_keeper: Arc::new(Mutex::new(StatementKeeper::new())),
            remote: Some(remote),
        }
    }
    pub fn statement_keeper(&self) -> Arc<Mutex<StatementKeeper>> {
        Arc::clone(&self.statement_keeper)
    }
    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }
    fn keeper(&self) -> std::sync::MutexGuard<'_, StatementKeeper> {
        self.statement_keeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
    // The first object of `(subject, predicate, ?)` that is a named node.
    fn named_object(&self, subject: &Term, predicate: &NamedNode) -> Option<NamedNode> {
        self.match_pattern(Some(subject), Some(predicate), None, None)
            .into_iter()
            .find_map(|s| match s.object {
                Term::NamedNode(n) => Some(n),
                _ => None,
            })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TripleStore for MemoryStore {
    fn match_pattern(
        &self,
        subject: Option<&Term>,
        predicate: Option<&NamedNode>,
        object: Option<&Term>,
        graph: Option<&GraphName>,
    ) -> Vec<Statement> {
        self.keeper().find(subject, predicate, object, graph)
    }

    fn add_all(&self, statements: &[Statement]) {
        let mut keeper = self.keeper();
        for statement in statements {
            keeper.keep(statement.clone());
        }
    }

    fn remove_statements(&self, statements: &[Statement]) {
        let mut keeper = self.keeper();
        for statement in statements {
            if !keeper.release(statement) {
                debug!(%statement, "statement to remove was not kept");
            }
        }
    }

    async fn update(&self, deletes: Vec<Statement>, inserts: Vec<Statement>) -> Result<(), SyncError> {
        match &self.remote {
            Some(remote) => remote.update(&deletes, &inserts).await,
            None => {
                debug!(deletes = deletes.len(), inserts = inserts.len(), "no remote to update");
                Ok(())
            }
        }
    }

    fn discover_default_graph_by_type(&self, rdf_type: &NamedNode) -> Option<NamedNode> {
        let for_class = NamedNode::new_unchecked(format!("{SOLID}forClass"));
        let instance = NamedNode::new_unchecked(format!("{SOLID}instance"));
        let container = NamedNode::new_unchecked(format!("{SOLID}instanceContainer"));
        let class_term = Term::from(rdf_type.clone());
        for registration in self.match_pattern(None, Some(&for_class), Some(&class_term), None) {
            let found = self
                .named_object(&registration.subject, &instance)
                .or_else(|| self.named_object(&registration.subject, &container));
            if found.is_some() {
                return found;
            }
            warn!(registration = %registration.subject, "type registration without an instance");
        }
        None
    }

    fn len(&self) -> usize {
        self.keeper().len()
    }
}
