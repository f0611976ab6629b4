use std::sync::{Arc, Mutex, PoisonError};

use oxrdf::{GraphName, NamedNode, Term};
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::error::SyncError;
use crate::mapper::Mapper;
use crate::store::{Statement, TripleStore};

// ------------- Drafts -------------
/// A triple under construction; any position may still be missing.
#[derive(Debug, Clone)]
pub struct Draft {
    pub subject: Option<Term>,
    pub predicate: Option<NamedNode>,
    pub object: Option<Term>,
    pub graph: GraphName,
}

impl Draft {
    pub fn new(
        subject: Option<Term>,
        predicate: Option<NamedNode>,
        object: Option<Term>,
        graph: GraphName,
    ) -> Self {
        Self { subject, predicate, object, graph }
    }
    /// The statement, if subject, predicate and object are all present and
    /// the subject is a node.
    pub fn complete(self) -> Option<Statement> {
        let subject = match self.subject? {
            Term::Literal(_) => return None,
            subject => subject,
        };
        Some(Statement {
            subject,
            predicate: self.predicate?,
            object: self.object?,
            graph: self.graph,
        })
    }
}

impl From<Statement> for Draft {
    fn from(s: Statement) -> Self {
        Self::new(Some(s.subject), Some(s.predicate), Some(s.object), s.graph)
    }
}

// ------------- TripleDiff -------------
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TripleDiff {
    pub deletes: Vec<Statement>,
    pub inserts: Vec<Statement>,
}

impl TripleDiff {
    /// Builds the diff, silently dropping malformed drafts.
    pub fn from_drafts(deletes: Vec<Draft>, inserts: Vec<Draft>) -> Self {
        Self {
            deletes: deletes.into_iter().filter_map(Draft::complete).collect(),
            inserts: inserts.into_iter().filter_map(Draft::complete).collect(),
        }
    }
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.inserts.is_empty()
    }
}

// ------------- Outcomes -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Applied to the local store only (the model does not autosave, or nothing changed).
    Local,
    /// Applied locally and accepted by the store's remote update.
    Synced,
    /// Applied locally; the remote update failed. Local state is not rolled back.
    Failed(SyncError),
}

impl CommitOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, CommitOutcome::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct CommitReport {
    pub uri: NamedNode,
    pub deletes: usize,
    pub inserts: usize,
    pub outcome: CommitOutcome,
}

pub type CommitListener = Arc<dyn Fn(&CommitReport) + Send + Sync>;

#[derive(Clone, Default)]
pub struct CommitListeners(Arc<Mutex<Vec<CommitListener>>>);

impl CommitListeners {
    pub fn add(&self, listener: CommitListener) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }
    pub fn notify(&self, report: &CommitReport) {
        // listeners may commit themselves, so they run without the lock held
        let listeners: Vec<CommitListener> = self
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener(report);
        }
    }
}

/// Handle on the outcome of one commit.
///
/// The local part of a commit has already happened when the ticket is
/// handed out. Dropping the ticket does not cancel a pending remote update.
#[derive(Debug)]
pub struct CommitTicket {
    uri: NamedNode,
    settled: Option<CommitOutcome>,
    pending: Option<oneshot::Receiver<CommitOutcome>>,
}

impl CommitTicket {
    fn settled(uri: NamedNode, outcome: CommitOutcome) -> Self {
        Self { uri, settled: Some(outcome), pending: None }
    }
    pub fn uri(&self) -> &NamedNode {
        &self.uri
    }
    /// Whether a remote update was started for this commit.
    pub fn is_remote(&self) -> bool {
        self.pending.is_some()
    }
    /// Waits for the remote update, if any, and returns the outcome.
    pub async fn outcome(self) -> CommitOutcome {
        if let Some(outcome) = self.settled {
            return outcome;
        }
        match self.pending {
            Some(receiver) => receiver.await.unwrap_or_else(|_| {
                CommitOutcome::Failed(SyncError::new("remote update was dropped before it settled"))
            }),
            None => CommitOutcome::Local,
        }
    }
    /// Waits for every ticket, keeping their order.
    pub async fn all(tickets: Vec<CommitTicket>) -> Vec<CommitOutcome> {
        futures_util::future::join_all(tickets.into_iter().map(CommitTicket::outcome)).await
    }
}

/// Applies `diff` to the local store and, when `autosave` is set, pushes it
/// through the store's remote update on the current async runtime.
pub(crate) fn commit(mapper: &Mapper, uri: &NamedNode, diff: TripleDiff, autosave: bool) -> CommitTicket {
    if diff.is_empty() {
        return CommitTicket::settled(uri.clone(), CommitOutcome::Local);
    }
    let store = mapper.store();
    store.remove_statements(&diff.deletes);
    store.add_all(&diff.inserts);
    debug!(uri = %uri, deletes = diff.deletes.len(), inserts = diff.inserts.len(), "committed locally");

    let report = |outcome: CommitOutcome| CommitReport {
        uri: uri.clone(),
        deletes: diff.deletes.len(),
        inserts: diff.inserts.len(),
        outcome,
    };
    if !autosave {
        mapper.commit_listeners().notify(&report(CommitOutcome::Local));
        return CommitTicket::settled(uri.clone(), CommitOutcome::Local);
    }

    let runtime = match tokio::runtime::Handle::try_current() {
        Ok(runtime) => runtime,
        Err(e) => {
            let failure = SyncError::new("no async runtime to run the remote update on")
                .with_response(e.to_string());
            log_failure(uri, &failure);
            let outcome = CommitOutcome::Failed(failure);
            mapper.commit_listeners().notify(&report(outcome.clone()));
            return CommitTicket::settled(uri.clone(), outcome);
        }
    };

    let (sender, receiver) = oneshot::channel();
    let listeners = mapper.commit_listeners().clone();
    let report = report(CommitOutcome::Local);
    let task_uri = uri.clone();
    let TripleDiff { deletes, inserts } = diff;
    let (previous, done) = mapper.next_in_line();
    let task = runtime.spawn(async move {
        // updates reach the remote in commit order
        if let Some(previous) = previous {
            let _ = previous.await;
        }
        let outcome = match store.update(deletes, inserts).await {
            Ok(()) => {
                debug!(uri = %task_uri, "remote update settled");
                CommitOutcome::Synced
            }
            Err(failure) => {
                log_failure(&task_uri, &failure);
                CommitOutcome::Failed(failure)
            }
        };
        let _ = done.send(());
        listeners.notify(&CommitReport { outcome: outcome.clone(), ..report });
        // nobody may be waiting on the ticket
        let _ = sender.send(outcome);
    });
    mapper.track(task);
    CommitTicket { uri: uri.clone(), settled: None, pending: Some(receiver) }
}

fn log_failure(uri: &NamedNode, failure: &SyncError) {
    error!(
        uri = %uri,
        message = %failure.message,
        response = ?failure.response,
        "remote update failed, local state is kept"
    );
}
