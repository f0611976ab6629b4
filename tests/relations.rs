use std::io;
use std::sync::{Arc, Mutex};

use oxrdf::{GraphName, Literal, NamedNode, Term};
use triplebind::datatype::Value;
use triplebind::entity::{Entity, EntityOptions};
use triplebind::mapper::Mapper;
use triplebind::model::{ModelConfig, PropertySpec};
use triplebind::store::{MemoryStore, Statement, TripleStore};

const FOAF: &str = "http://xmlns.com/foaf/0.1/";
const WORKS_FOR: &str = "http://schema.org/worksFor";
const PEOPLE: &str = "http://example.org/people";
const ORGS: &str = "http://example.org/orgs";

// Each model only declares its default graph.
fn unplaced() -> Arc<Mapper> {
    let mapper = Mapper::new(Arc::new(MemoryStore::new()));
    mapper
        .register(
            ModelConfig::new("person")
                .rdf_type(format!("{FOAF}Person"))
                .namespace(FOAF)
                .default_graph(PEOPLE)
                .attribute("name", PropertySpec::string())
                .attribute(
                    "employer",
                    PropertySpec::belongs_to("org")
                        .predicate(WORKS_FOR)
                        .inverse_property("employees"),
                )
                .attribute("knows", PropertySpec::has_many("person")),
        )
        .expect("register person");
    mapper
        .register(
            ModelConfig::new("org")
                .rdf_type(format!("{FOAF}Organization"))
                .namespace(FOAF)
                .default_graph(ORGS)
                .attribute("name", PropertySpec::string())
                .attribute(
                    "employees",
                    PropertySpec::has_many("person")
                        .predicate(WORKS_FOR)
                        .inverse()
                        .inverse_property("employer"),
                ),
        )
        .expect("register org");
    mapper
}

fn setup() -> Arc<Mapper> {
    let mapper = unplaced();
    // worksFor triples have a person as subject, so they live with the people
    mapper.set_graph_for_type("person", NamedNode::new(PEOPLE).unwrap());
    mapper
}

fn create(mapper: &Arc<Mapper>, model: &str, id: &str) -> Entity {
    mapper
        .create(model, EntityOptions::new().uuid(id))
        .expect("create entity")
}

fn members(value: Value) -> Vec<Entity> {
    value.as_entities().expect("a set of entities").to_vec()
}

fn node(iri: &str) -> NamedNode {
    NamedNode::new(iri).unwrap()
}

#[test]
fn belongs_to_reads_back_the_related_entity() {
    let mapper = setup();
    let alice = create(&mapper, "person", "alice");
    let acme = create(&mapper, "org", "acme");
    acme.set("name", "ACME").unwrap();
    alice.set("employer", &acme).unwrap();

    let fresh = mapper
        .create("person", EntityOptions::new().uri(alice.uri().as_str()))
        .unwrap();
    let employer = fresh.get("employer").unwrap();
    let employer = employer.as_entity().expect("an employer");
    assert_eq!(employer, &acme);
    assert_eq!(employer.model_name(), "org");
    assert_eq!(employer.get("name").unwrap(), Value::from("ACME"));
}

#[test]
fn inverse_collection_follows_the_forward_relation() {
    let mapper = setup();
    let alice = create(&mapper, "person", "alice");
    let acme = create(&mapper, "org", "acme");
    // read once so that the inverse is cached
    assert!(members(acme.get("employees").unwrap()).is_empty());

    alice.set("employer", &acme).unwrap();
    assert!(!acme.is_cached("employees"));
    assert_eq!(members(acme.get("employees").unwrap()), vec![alice.clone()]);

    alice.set("employer", Value::Null).unwrap();
    assert!(members(acme.get("employees").unwrap()).is_empty());
}

#[test]
fn moving_a_relation_invalidates_both_sides() {
    let mapper = setup();
    let alice = create(&mapper, "person", "alice");
    let acme = create(&mapper, "org", "acme");
    let globex = create(&mapper, "org", "globex");
    alice.set("employer", &acme).unwrap();
    assert_eq!(members(acme.get("employees").unwrap()).len(), 1);
    assert!(members(globex.get("employees").unwrap()).is_empty());

    alice.set("employer", &globex).unwrap();
    assert!(members(acme.get("employees").unwrap()).is_empty());
    assert_eq!(members(globex.get("employees").unwrap()), vec![alice.clone()]);
    // the old worksFor triple is gone
    let subject = Term::from(alice.uri().clone());
    assert_eq!(
        mapper
            .store()
            .match_pattern(Some(&subject), Some(&node(WORKS_FOR)), None, None)
            .len(),
        1
    );
}

#[test]
fn has_many_diff_only_touches_changed_members() {
    let mapper = setup();
    let alice = create(&mapper, "person", "alice");
    let a = create(&mapper, "person", "a");
    let b = create(&mapper, "person", "b");
    let c = create(&mapper, "person", "c");
    alice.set("knows", vec![a.clone(), b.clone()]).unwrap();

    let planned = alice
        .plan("knows", &Value::from(vec![b.clone(), c.clone()]))
        .unwrap();
    assert_eq!(planned.added, vec![c.clone()]);
    assert_eq!(planned.removed, vec![a.clone()]);
    assert_eq!(planned.diff.inserts.len(), 1);
    assert_eq!(planned.diff.deletes.len(), 1);
    assert_eq!(planned.diff.inserts[0].object, Term::from(c.uri().clone()));
    assert_eq!(planned.diff.deletes[0].object, Term::from(a.uri().clone()));

    alice.set("knows", vec![b.clone(), c.clone()]).unwrap();
    let subject = Term::from(alice.uri().clone());
    let objects: Vec<Term> = mapper
        .store()
        .match_pattern(Some(&subject), Some(&node(&format!("{FOAF}knows"))), None, None)
        .into_iter()
        .map(|s| s.object)
        .collect();
    assert_eq!(objects, vec![Term::from(b.uri().clone()), Term::from(c.uri().clone())]);
}

#[test]
fn duplicate_members_are_written_once() {
    let mapper = setup();
    let alice = create(&mapper, "person", "alice");
    let b = create(&mapper, "person", "b");
    alice.set("knows", vec![b.clone(), b.clone()]).unwrap();
    assert_eq!(members(alice.get("knows").unwrap()), vec![b]);
}

#[test]
fn clearing_an_unread_relation_removes_only_its_members() {
    let mapper = setup();
    let alice = create(&mapper, "person", "alice");
    let a = create(&mapper, "person", "a");
    let b = create(&mapper, "person", "b");
    alice.set("knows", vec![a, b]).unwrap();
    let knows = node(&format!("{FOAF}knows"));
    // triples matching the predicate that are not members of the relation
    let literal = Statement::new(
        alice.uri().clone(),
        knows.clone(),
        Literal::new_simple_literal("nobody"),
        node(PEOPLE),
    );
    let elsewhere = Statement::new(
        alice.uri().clone(),
        knows.clone(),
        node("http://example.org/people#zed"),
        GraphName::DefaultGraph,
    );
    mapper.store().add_all(&[literal.clone(), elsewhere.clone()]);

    let unread = mapper
        .create("person", EntityOptions::new().uri(alice.uri().as_str()))
        .unwrap();
    assert!(!unread.is_cached("knows"));
    unread.set("knows", Vec::<Entity>::new()).unwrap();

    let subject = Term::from(alice.uri().clone());
    let left = mapper
        .store()
        .match_pattern(Some(&subject), Some(&knows), None, None);
    assert_eq!(left, vec![literal, elsewhere]);
    assert!(members(unread.get("knows").unwrap()).is_empty());
}

#[test]
fn null_clears_a_has_many() {
    let mapper = setup();
    let alice = create(&mapper, "person", "alice");
    let b = create(&mapper, "person", "b");
    alice.set("knows", vec![b]).unwrap();
    alice.set("knows", Value::Null).unwrap();
    assert!(members(alice.get("knows").unwrap()).is_empty());
    let fresh = mapper
        .create("person", EntityOptions::new().uri(alice.uri().as_str()))
        .unwrap();
    assert!(members(fresh.get("knows").unwrap()).is_empty());
}

#[test]
fn writing_the_inverse_side_writes_forward_triples() {
    let mapper = setup();
    let alice = create(&mapper, "person", "alice");
    let bob = create(&mapper, "person", "bob");
    let acme = create(&mapper, "org", "acme");
    assert!(alice.get("employer").unwrap().is_null());

    acme.set("employees", vec![alice.clone(), bob.clone()]).unwrap();
    let expected = Statement::new(
        alice.uri().clone(),
        node(WORKS_FOR),
        acme.uri().clone(),
        node(PEOPLE),
    );
    assert!(
        mapper
            .store()
            .any(Some(&expected.subject), Some(&expected.predicate), Some(&expected.object), Some(&expected.graph))
            .is_some()
    );
    // alice's cached employer was invalidated by the write
    assert_eq!(alice.get("employer").unwrap().as_entity(), Some(&acme));

    acme.set("employees", vec![bob.clone()]).unwrap();
    assert!(alice.get("employer").unwrap().is_null());
    assert_eq!(bob.get("employer").unwrap().as_entity(), Some(&acme));
}

#[test]
fn non_node_objects_are_skipped_when_reading_relations() {
    let mapper = setup();
    let alice = create(&mapper, "person", "alice");
    let b = create(&mapper, "person", "b");
    alice.set("knows", vec![b.clone()]).unwrap();
    mapper.store().add_all(&[Statement::new(
        alice.uri().clone(),
        node(&format!("{FOAF}knows")),
        Literal::new_simple_literal("someone"),
        node(PEOPLE),
    )]);
    alice.invalidate("knows");
    assert_eq!(members(alice.get("knows").unwrap()), vec![b]);
}

#[test]
fn inverse_follows_the_related_default_graph() {
    let mapper = unplaced();
    let alice = create(&mapper, "person", "alice");
    let acme = create(&mapper, "org", "acme");
    assert!(members(acme.get("employees").unwrap()).is_empty());

    alice.set("employer", &acme).unwrap();
    let works_for = mapper
        .store()
        .any(Some(&Term::from(alice.uri().clone())), Some(&node(WORKS_FOR)), None, None)
        .unwrap();
    assert_eq!(works_for.graph, GraphName::from(node(PEOPLE)));
    assert_eq!(members(acme.get("employees").unwrap()), vec![alice.clone()]);

    let fresh = mapper
        .create("org", EntityOptions::new().uri(acme.uri().as_str()))
        .unwrap();
    assert_eq!(members(fresh.get("employees").unwrap()), vec![alice]);
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn clearing_an_unread_relation_is_logged() {
    let mapper = setup();
    let alice = create(&mapper, "person", "alice");
    let a = create(&mapper, "person", "a");
    alice.set("knows", vec![a]).unwrap();
    let unread = mapper
        .create("person", EntityOptions::new().uri(alice.uri().as_str()))
        .unwrap();

    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        unread.set("knows", Vec::<Entity>::new()).unwrap();
        // clearing once the relation is cached stays quiet
        alice.get("knows").unwrap();
        alice.set("knows", Vec::<Entity>::new()).unwrap();
    });

    let logged = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
    let warnings: Vec<&str> = logged
        .lines()
        .filter(|line| line.contains("clearing a relation that was never read"))
        .collect();
    assert_eq!(warnings.len(), 1, "{logged}");
    assert!(warnings[0].contains("WARN"));
    assert!(warnings[0].contains("knows"));
}
