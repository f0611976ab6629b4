// used for persistence
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use oxrdf::{BlankNode, GraphName, Literal, NamedNode, Term};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Result, SyncError, TriplebindError};
use crate::store::{MemoryStore, RemoteSync, Statement, TripleStore};

// Term kinds as they are written to the Statement table
const NAMED_NODE: i64 = 0;
const BLANK_NODE: i64 = 1;
const LITERAL: i64 = 2;

// One side of a term in its column form: (kind, value, datatype, language)
type TermColumns = (i64, String, String, String);

#[derive(Serialize)]
struct LedgerPayload {
    recorded: String,
    deletes: Vec<String>,
    inserts: Vec<String>,
}

// ------------- Persistence -------------
/// SQLite backed remote for a [`MemoryStore`].
///
/// Every update is applied in a single transaction and appended to a ledger
/// in which each entry's superhash chains the previous one.
pub struct Persistor {
    db: Arc<Mutex<Connection>>,
}

impl Persistor {
    pub fn open(path: &str) -> Result<Self> {
        Self::new(Connection::open(path)?)
    }
    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }
    pub fn new(connection: Connection) -> Result<Self> {
        // The "STRICT" keyword introduced in 3.37.0 breaks JDBC connections, which makes
        // debugging using an external tool like DBeaver impossible
        connection.execute_batch(
            "
            create table if not exists Statement (
                Graph text not null,
                Subject text not null,
                SubjectKind integer not null,
                Predicate text not null,
                Object text not null,
                ObjectKind integer not null,
                Datatype text not null,
                Language text not null,
                constraint unique_Statement unique (
                    Graph,
                    Subject,
                    SubjectKind,
                    Predicate,
                    Object,
                    ObjectKind,
                    Datatype,
                    Language
                )
            );-- STRICT;
            create table if not exists Ledger (
                Ledger_Identity integer,
                Recorded text not null,
                Deletes integer not null,
                Inserts integer not null,
                Payload text not null,
                Superhash text not null,
                constraint referenceable_Ledger_Identity primary key (
                    Ledger_Identity
                )
            );-- STRICT;
            ",
        )?;
        Ok(Self {
            db: Arc::new(Mutex::new(connection)),
        })
    }

    /// Head of the ledger, `None` until the first update has been recorded.
    pub fn current_superhash(&self) -> Option<String> {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        db.query_row(
            "select Superhash from Ledger order by Ledger_Identity desc limit 1",
            [],
            |r| r.get(0),
        )
        .optional()
        .ok()
        .flatten()
    }

    pub fn ledger_len(&self) -> Result<usize> {
        let db = self.db.lock().map_err(|e| TriplebindError::Lock(e.to_string()))?;
        let n: i64 = db.query_row("select count(*) from Ledger", [], |r| r.get(0))?;
        Ok(usize::try_from(n).unwrap_or_default())
    }

    /// Recomputes the hash chain and compares it to what was recorded.
    pub fn verify_ledger(&self) -> Result<bool> {
        let db = self.db.lock().map_err(|e| TriplebindError::Lock(e.to_string()))?;
        let mut statement =
            db.prepare("select Payload, Superhash from Ledger order by Ledger_Identity")?;
        let rows = statement.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut previous: Option<String> = None;
        for row in rows {
            let (payload, recorded) = row?;
            let expected = chain(previous.as_deref(), &payload);
            if expected != recorded {
                return Ok(false);
            }
            previous = Some(recorded);
        }
        Ok(true)
    }

    pub fn persist(&self, deletes: &[Statement], inserts: &[Statement]) -> Result<()> {
        let mut db = self.db.lock().map_err(|e| TriplebindError::Lock(e.to_string()))?;
        let tx = db.transaction()?;
        for statement in deletes {
            let (graph, subject, object) = columns(statement);
            tx.execute(
                "
                delete from Statement
                    where Graph = ? and Subject = ? and SubjectKind = ?
                    and Predicate = ? and Object = ? and ObjectKind = ?
                    and Datatype = ? and Language = ?
            ",
                params![
                    graph,
                    subject.1,
                    subject.0,
                    statement.predicate.as_str(),
                    object.1,
                    object.0,
                    object.2,
                    object.3
                ],
            )?;
        }
        for statement in inserts {
            let (graph, subject, object) = columns(statement);
            tx.execute(
                "
                insert or ignore into Statement (
                    Graph,
                    Subject,
                    SubjectKind,
                    Predicate,
                    Object,
                    ObjectKind,
                    Datatype,
                    Language
                ) values (?, ?, ?, ?, ?, ?, ?, ?)
            ",
                params![
                    graph,
                    subject.1,
                    subject.0,
                    statement.predicate.as_str(),
                    object.1,
                    object.0,
                    object.2,
                    object.3
                ],
            )?;
        }
        append_ledger(&tx, deletes, inserts)?;
        tx.commit()?;
        Ok(())
    }

    /// Loads every persisted statement into the store, without pushing them back.
    pub fn restore(&self, store: &MemoryStore) -> Result<usize> {
        let db = self.db.lock().map_err(|e| TriplebindError::Lock(e.to_string()))?;
        let mut all_statements = db.prepare(
            "
            select Graph, Subject, SubjectKind, Predicate, Object, ObjectKind, Datatype, Language
                from Statement
        ",
        )?;
        let mut rows = all_statements.query([])?;
        let mut restored = Vec::new();
        while let Some(row) = rows.next()? {
            let graph: String = row.get(0)?;
            let subject = decode((row.get(2)?, row.get(1)?, String::new(), String::new()))?;
            let predicate = NamedNode::new(row.get::<_, String>(3)?)?;
            let object = decode((row.get(5)?, row.get(4)?, row.get(6)?, row.get(7)?))?;
            let graph = if graph.is_empty() {
                GraphName::DefaultGraph
            } else {
                GraphName::from(NamedNode::new(graph)?)
            };
            restored.push(Statement {
                subject,
                predicate,
                object,
                graph,
            });
        }
        store.add_all(&restored);
        info!(statements = restored.len(), "restored persisted statements");
        Ok(restored.len())
    }
}

#[async_trait]
impl RemoteSync for Persistor {
    // The mapper hands updates over one at a time, in commit order.
    async fn update(&self, deletes: &[Statement], inserts: &[Statement]) -> std::result::Result<(), SyncError> {
        self.persist(deletes, inserts).map_err(|e| {
            SyncError::new("could not persist the update").with_response(e.to_string())
        })
    }
}

fn append_ledger(tx: &Transaction, deletes: &[Statement], inserts: &[Statement]) -> Result<()> {
    let recorded = Utc::now().to_rfc3339();
    let payload = LedgerPayload {
        recorded: recorded.clone(),
        deletes: deletes.iter().map(ToString::to_string).collect(),
        inserts: inserts.iter().map(ToString::to_string).collect(),
    };
    let payload = serde_json::to_string(&payload)
        .map_err(|e| TriplebindError::Persistence(e.to_string()))?;
    let previous: Option<String> = tx
        .query_row(
            "select Superhash from Ledger order by Ledger_Identity desc limit 1",
            [],
            |r| r.get(0),
        )
        .optional()?;
    let superhash = chain(previous.as_deref(), &payload);
    tx.execute(
        "
        insert into Ledger (
            Recorded,
            Deletes,
            Inserts,
            Payload,
            Superhash
        ) values (?, ?, ?, ?, ?)
    ",
        params![
            recorded,
            deletes.len() as i64,
            inserts.len() as i64,
            payload,
            superhash
        ],
    )?;
    debug!(%superhash, "ledger appended");
    Ok(())
}

// superhash = blake3(previous superhash || blake3(payload))
fn chain(previous: Option<&str>, payload: &str) -> String {
    let payload_hash = blake3::hash(payload.as_bytes());
    let mut hasher = blake3::Hasher::new();
    if let Some(previous) = previous {
        hasher.update(previous.as_bytes());
    }
    hasher.update(payload_hash.as_bytes());
    hasher.finalize().to_hex().to_string()
}

fn columns(statement: &Statement) -> (String, TermColumns, TermColumns) {
    let graph = match &statement.graph {
        GraphName::NamedNode(n) => n.as_str().to_owned(),
        GraphName::BlankNode(b) => b.as_str().to_owned(),
        GraphName::DefaultGraph => String::new(),
    };
    (graph, encode(&statement.subject), encode(&statement.object))
}

fn encode(term: &Term) -> TermColumns {
    match term {
        Term::NamedNode(n) => (NAMED_NODE, n.as_str().to_owned(), String::new(), String::new()),
        Term::BlankNode(b) => (BLANK_NODE, b.as_str().to_owned(), String::new(), String::new()),
        Term::Literal(l) => (
            LITERAL,
            l.value().to_owned(),
            l.datatype().as_str().to_owned(),
            l.language().unwrap_or_default().to_owned(),
        ),
        #[allow(unreachable_patterns)]
        other => (LITERAL, other.to_string(), String::new(), String::new()),
    }
}

fn decode((kind, value, datatype, language): TermColumns) -> Result<Term> {
    let term = match kind {
        NAMED_NODE => Term::from(NamedNode::new(value)?),
        BLANK_NODE => Term::from(
            BlankNode::new(value).map_err(|e| TriplebindError::Persistence(e.to_string()))?,
        ),
        LITERAL if !language.is_empty() => Term::from(
            Literal::new_language_tagged_literal(value, language)
                .map_err(|e| TriplebindError::Persistence(e.to_string()))?,
        ),
        LITERAL if datatype.is_empty() => Term::from(Literal::new_simple_literal(value)),
        LITERAL => Term::from(Literal::new_typed_literal(value, NamedNode::new(datatype)?)),
        other => {
            return Err(TriplebindError::Persistence(format!("unknown term kind {other}")));
        }
    };
    Ok(term)
}
