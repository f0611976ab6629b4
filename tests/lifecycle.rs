use std::sync::{Arc, Mutex};

use oxrdf::vocab::rdf;
use oxrdf::{GraphName, NamedNode, Term};
use triplebind::datatype::Value;
use triplebind::entity::{Change, EntityOptions};
use triplebind::error::TriplebindError;
use triplebind::mapper::Mapper;
use triplebind::model::{ModelConfig, PropertySpec};
use triplebind::store::{MemoryStore, TripleStore};

const SCHEMA: &str = "http://schema.org/";
const BOOKS: &str = "http://example.org/books";

fn setup() -> Arc<Mapper> {
    let mapper = Mapper::new(Arc::new(MemoryStore::new()));
    mapper
        .register(
            ModelConfig::new("book")
                .rdf_type(format!("{SCHEMA}Book"))
                .namespace(SCHEMA)
                .default_graph(BOOKS)
                .attribute("name", PropertySpec::string())
                .attribute("numberOfPages", PropertySpec::integer())
                .attribute("author", PropertySpec::belongs_to("person").propagate_default_graph())
                .attribute("about", PropertySpec::has_many("person")),
        )
        .expect("register book");
    mapper
        .register(
            ModelConfig::new("person")
                .rdf_type(format!("{SCHEMA}Person"))
                .namespace(SCHEMA)
                .default_graph("http://example.org/people")
                .attribute("name", PropertySpec::string()),
        )
        .expect("register person");
    mapper
}

fn type_triples(mapper: &Mapper, uri: &NamedNode) -> usize {
    let subject = Term::from(uri.clone());
    mapper
        .store()
        .match_pattern(Some(&subject), Some(&rdf::TYPE.into_owned()), None, None)
        .len()
}

#[test]
fn uris_are_minted_in_the_default_graph() {
    let mapper = setup();
    let book = mapper.create("book", EntityOptions::new()).unwrap();
    let prefix = format!("{BOOKS}#");
    assert!(book.uri().as_str().starts_with(&prefix));
    assert!(book.uri().as_str().len() > prefix.len());

    let other = mapper.create("book", EntityOptions::new()).unwrap();
    assert_ne!(book.uri(), other.uri());

    let named = mapper.create("book", EntityOptions::new().uuid("dune")).unwrap();
    assert_eq!(named.uri().as_str(), "http://example.org/books#dune");

    let explicit = mapper
        .create("book", EntityOptions::new().uri("urn:isbn:9780441013593"))
        .unwrap();
    assert_eq!(explicit.uri().as_str(), "urn:isbn:9780441013593");
}

#[test]
fn minting_without_a_default_graph_is_a_configuration_error() {
    let mapper = Mapper::new(Arc::new(MemoryStore::new()));
    mapper
        .register(ModelConfig::new("tag").namespace(SCHEMA))
        .unwrap();
    assert!(matches!(
        mapper.create("tag", EntityOptions::new()),
        Err(TriplebindError::Configuration(_))
    ));
    assert!(matches!(
        mapper.create("tag", EntityOptions::new().uri("not an iri")),
        Err(TriplebindError::InvalidIri(_))
    ));
    assert!(matches!(
        mapper.create("unknown", EntityOptions::new()),
        Err(TriplebindError::Configuration(_))
    ));
}

#[test]
fn type_triple_is_asserted_once() {
    let mapper = setup();
    let book = mapper.create("book", EntityOptions::new().uuid("dune")).unwrap();
    assert_eq!(type_triples(&mapper, book.uri()), 1);
    let again = mapper
        .create("book", EntityOptions::new().uri(book.uri().as_str()))
        .unwrap();
    assert_eq!(again, book);
    assert_eq!(type_triples(&mapper, book.uri()), 1);
    let statement = mapper
        .store()
        .any(Some(&Term::from(book.uri().clone())), Some(&rdf::TYPE.into_owned()), None, None)
        .unwrap();
    assert_eq!(statement.object, Term::from(NamedNode::new(format!("{SCHEMA}Book")).unwrap()));
    assert_eq!(statement.graph, GraphName::from(NamedNode::new(BOOKS).unwrap()));
}

#[test]
fn instance_rdf_type_overrides_the_model() {
    let mapper = setup();
    let book = mapper
        .create("book", EntityOptions::new().uuid("atlas").rdf_type(format!("{SCHEMA}Atlas")))
        .unwrap();
    assert_eq!(book.rdf_type().map(NamedNode::as_str), Some("http://schema.org/Atlas"));
    let subject = Term::from(book.uri().clone());
    let found = mapper
        .store()
        .any(Some(&subject), Some(&rdf::TYPE.into_owned()), None, None)
        .unwrap();
    assert_eq!(found.object, Term::from(NamedNode::new(format!("{SCHEMA}Atlas")).unwrap()));
}

#[test]
fn initial_values_go_through_the_write_path() {
    let mapper = setup();
    let book = mapper
        .create(
            "book",
            EntityOptions::new()
                .uuid("dune")
                .value("name", "Dune")
                .value("numberOfPages", 412),
        )
        .unwrap();
    assert!(book.is_cached("name"));
    let fresh = mapper
        .create("book", EntityOptions::new().uri(book.uri().as_str()))
        .unwrap();
    assert_eq!(fresh.get("name").unwrap(), Value::from("Dune"));
    assert_eq!(fresh.get("numberOfPages").unwrap(), Value::Integer(412));

    assert!(matches!(
        mapper.create("book", EntityOptions::new().value("isbn", "123")),
        Err(TriplebindError::UnknownAttribute { .. })
    ));
}

#[test]
fn destroy_retracts_attributes_and_type() {
    let mapper = setup();
    let herbert = mapper.create("person", EntityOptions::new().uuid("herbert")).unwrap();
    let book = mapper.create("book", EntityOptions::new().uuid("dune")).unwrap();
    book.set("name", "Dune").unwrap();
    book.set("author", &herbert).unwrap();
    book.set("about", vec![herbert.clone()]).unwrap();

    let tickets = book.destroy().unwrap();
    // one per attribute plus the type triple
    assert_eq!(tickets.len(), 5);
    assert_eq!(type_triples(&mapper, book.uri()), 0);
    let subject = Term::from(book.uri().clone());
    assert!(
        mapper
            .store()
            .match_pattern(Some(&subject), None, None, None)
            .is_empty()
    );
    // the related entity is untouched
    assert_eq!(type_triples(&mapper, herbert.uri()), 1);
    assert!(book.get("name").unwrap().is_null());
}

#[test]
fn listeners_see_every_write_until_removed() {
    let mapper = setup();
    let book = mapper.create("book", EntityOptions::new().uuid("dune")).unwrap();
    let seen: Arc<Mutex<Vec<(String, Change)>>> = Arc::default();
    let recorded = Arc::clone(&seen);
    let id = book.add_change_listener(move |entity, change| {
        recorded
            .lock()
            .unwrap()
            .push((entity.uri().to_string(), change.clone()));
    });
    book.set("name", "Dune").unwrap();
    book.set("numberOfPages", 412).unwrap();
    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "<http://example.org/books#dune>");
        assert_eq!(
            seen[0].1,
            Change { updated_field: "name".into(), new_value: Value::from("Dune") }
        );
        assert_eq!(seen[1].1.updated_field, "numberOfPages");
        assert_eq!(seen[1].1.new_value, Value::Integer(412));
    }

    assert!(book.remove_change_listener(id));
    assert!(!book.remove_change_listener(id));
    book.set("name", "Dune Messiah").unwrap();
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[test]
fn listeners_run_after_the_store_is_updated() {
    let mapper = setup();
    let book = mapper.create("book", EntityOptions::new().uuid("dune")).unwrap();
    let store = mapper.store();
    let names: Arc<Mutex<Vec<Option<String>>>> = Arc::default();
    let recorded = Arc::clone(&names);
    let predicate = NamedNode::new(format!("{SCHEMA}name")).unwrap();
    book.add_change_listener(move |entity, _| {
        let subject = Term::from(entity.uri().clone());
        let name = store
            .any(Some(&subject), Some(&predicate), None, None)
            .and_then(|s| match s.object {
                Term::Literal(l) => Some(l.value().to_owned()),
                _ => None,
            });
        recorded.lock().unwrap().push(name);
    });
    book.set("name", "Dune").unwrap();
    assert_eq!(*names.lock().unwrap(), vec![Some("Dune".to_string())]);
}

#[test]
fn related_entities_can_inherit_the_default_graph() {
    let mapper = setup();
    let herbert = mapper.create("person", EntityOptions::new().uuid("herbert")).unwrap();
    let book = mapper
        .create("book", EntityOptions::new().uuid("dune").default_graph("http://example.org/shelf"))
        .unwrap();
    book.set("author", &herbert).unwrap();
    book.invalidate("author");
    let author = book.get("author").unwrap();
    let author = author.as_entity().unwrap();
    assert_eq!(author, &herbert);
    assert_eq!(author.default_graph().map(NamedNode::as_str), Some("http://example.org/shelf"));

    book.set("about", vec![herbert.clone()]).unwrap();
    book.invalidate("about");
    let about = book.get("about").unwrap();
    // `about` does not propagate
    assert_eq!(
        about.as_entities().unwrap()[0].default_graph().map(NamedNode::as_str),
        Some("http://example.org/people")
    );
}
