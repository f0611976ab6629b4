//! Triplebind – lazy, cached mapping of typed entities onto an RDF triple store.
//!
//! An [`entity::Entity`] is a handle on one resource (a named node) in a
//! [`store::TripleStore`]. Its model, a [`model::ModelConfig`], declares the
//! rdf type, namespace, default graph, autosave flag and an ordered list of
//! properties, each described by a [`model::PropertySpec`]:
//! * scalars: `string`, `integer`, `boolean`, `dateTime` and raw `term`s,
//! * relations: `belongsTo` (one related entity) and `hasMany` (a set of them),
//!   optionally read and written in the inverse direction.
//!
//! Reads are lazy: the first [`entity::Entity::get`] of a property resolves its
//! predicate and graph (see [`resolve`]), matches the store and caches the
//! converted value. Writes ([`entity::Entity::set`]) diff the new value against
//! the store, apply the diff locally, update the cache and call the change
//! listeners before returning. Models with autosave also push the diff through
//! the store's asynchronous `update`; its outcome comes back on a
//! [`commit::CommitTicket`] and through [`mapper::Mapper::on_commit`], and a
//! failure never rolls back the local state.
//!
//! ## Modules
//! * [`store`] – statements, the store contract and an indexed in-memory store.
//! * [`persist`] – SQLite persistence with a blake3 ledger, usable as the remote.
//! * [`model`] – property specifications, model configuration and the registry.
//! * [`resolve`] – predicate and graph resolution.
//! * [`commit`] – triple diffs, local apply and remote push.
//! * [`entity`] – the entity handle: construction, read, write, listeners, destroy.
//! * [`mapper`] – binds a store to the registered models and creates entities.
//! * [`config`] – settings and logging setup.
//!
//! ## Quick Start
//! ```
//! use triplebind::{entity::EntityOptions, mapper::Mapper, model::{ModelConfig, PropertySpec}, store::MemoryStore};
//! use std::sync::Arc;
//! let mapper = Mapper::new(Arc::new(MemoryStore::new()));
//! mapper.register(
//!     ModelConfig::new("person")
//!         .rdf_type("http://xmlns.com/foaf/0.1/Person")
//!         .namespace("http://xmlns.com/foaf/0.1/")
//!         .default_graph("http://example.org/people")
//!         .attribute("name", PropertySpec::string()),
//! ).unwrap();
//! let alice = mapper.create("person", EntityOptions::new().uuid("alice")).unwrap();
//! alice.set("name", "Alice").unwrap();
//! assert_eq!(alice.uri().as_str(), "http://example.org/people#alice");
//! assert_eq!(alice.get("name").unwrap().as_str(), Some("Alice"));
//! ```

pub mod commit;
pub mod config;
pub mod datatype;
pub mod entity;
pub mod error;
pub mod mapper;
pub mod model;
pub mod persist;
pub mod resolve;
pub mod store;
