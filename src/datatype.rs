// used for dateTime property values
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
// the RDF terms values are written as
use oxrdf::vocab::xsd;
use oxrdf::{Literal, Term};
// property kinds can be declared in configuration files
use serde::Deserialize;

// used to print out readable forms of a value
use std::fmt;

use crate::entity::Entity;
use crate::error::{Result, TriplebindError};

/// The declared type of a property, which decides how its triples are read and written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyKind {
    String,
    Integer,
    Boolean,
    DateTime,
    Term,
    BelongsTo,
    HasMany,
}

impl PropertyKind {
    pub fn is_relation(&self) -> bool {
        matches!(self, PropertyKind::BelongsTo | PropertyKind::HasMany)
    }
    pub fn name(&self) -> &'static str {
        match self {
            PropertyKind::String => "string",
            PropertyKind::Integer => "integer",
            PropertyKind::Boolean => "boolean",
            PropertyKind::DateTime => "dateTime",
            PropertyKind::Term => "term",
            PropertyKind::BelongsTo => "belongsTo",
            PropertyKind::HasMany => "hasMany",
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A materialized or assigned property value.
///
/// `Null` doubles as "absent": reading a single valued property without a
/// matching triple yields `Null`, and assigning `Null` retracts the triples.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Integer(i64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Term(Term),
    Entity(Entity),
    Entities(Vec<Entity>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
    pub fn variant(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::Boolean(_) => "boolean",
            Value::DateTime(_) => "dateTime",
            Value::Term(_) => "term",
            Value::Entity(_) => "entity",
            Value::Entities(_) => "entities",
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }
    pub fn as_date_time(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::DateTime(d) => Some(d),
            _ => None,
        }
    }
    pub fn as_term(&self) -> Option<&Term> {
        match self {
            Value::Term(t) => Some(t),
            _ => None,
        }
    }
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Value::Entity(e) => Some(e),
            _ => None,
        }
    }
    /// The members of a hasMany value; `Null` reads as the empty set.
    pub fn as_entities(&self) -> Option<&[Entity]> {
        match self {
            Value::Entities(es) => Some(es),
            Value::Null => Some(&[]),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::String(s.to_owned()) }
}
impl From<String> for Value {
    fn from(s: String) -> Self { Value::String(s) }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self { Value::Integer(i) }
}
impl From<i32> for Value {
    fn from(i: i32) -> Self { Value::Integer(i64::from(i)) }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self { Value::Boolean(b) }
}
impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self { Value::DateTime(d) }
}
impl From<Term> for Value {
    fn from(t: Term) -> Self { Value::Term(t) }
}
impl From<Entity> for Value {
    fn from(e: Entity) -> Self { Value::Entity(e) }
}
impl From<&Entity> for Value {
    fn from(e: &Entity) -> Self { Value::Entity(e.clone()) }
}
impl From<Vec<Entity>> for Value {
    fn from(es: Vec<Entity>) -> Self { Value::Entities(es) }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        o.map_or(Value::Null, Into::into)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::String(s) => write!(f, "{}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::DateTime(d) => write!(f, "{}", date_time_lexical(d)),
            Value::Term(t) => write!(f, "{}", t),
            Value::Entity(e) => write!(f, "{}", e.uri()),
            Value::Entities(es) => {
                let uris: Vec<String> = es.iter().map(|e| e.uri().to_string()).collect();
                write!(f, "[{}]", uris.join(", "))
            }
        }
    }
}

// ------------- Term conversion -------------

/// Lexical form used for dateTime literals, e.g. `2024-03-17T08:30:00.000Z`.
pub fn date_time_lexical(d: &DateTime<Utc>) -> String {
    d.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The object term a scalar value is written as, or `None` for `Null`.
///
/// Raw terms pass through for every scalar kind.
pub fn term_for(attribute: &str, kind: PropertyKind, value: &Value) -> Result<Option<Term>> {
    let term = match (kind, value) {
        (_, Value::Null) => None,
        (_, Value::Term(t)) => Some(t.clone()),
        (PropertyKind::String, Value::String(s)) => {
            Some(Literal::new_simple_literal(s.as_str()).into())
        }
        (PropertyKind::Integer, Value::Integer(i)) => {
            Some(Literal::new_typed_literal(i.to_string(), xsd::DECIMAL).into())
        }
        (PropertyKind::Boolean, Value::Boolean(b)) => {
            Some(Literal::new_typed_literal(b.to_string(), xsd::BOOLEAN).into())
        }
        (PropertyKind::DateTime, Value::DateTime(d)) => {
            Some(Literal::new_typed_literal(date_time_lexical(d), xsd::DATE_TIME).into())
        }
        (PropertyKind::Term, Value::Entity(e)) => Some(e.uri().clone().into()),
        (_, other) => {
            return Err(TriplebindError::TypeMismatch {
                attribute: attribute.to_owned(),
                expected: kind.name(),
                found: other.variant(),
            });
        }
    };
    Ok(term)
}

/// Converts a matched term into the value of a scalar property.
///
/// Relations are materialized by the entity itself since they need the mapper.
pub fn value_from(kind: PropertyKind, term: Option<&Term>) -> Value {
    let Some(term) = term else {
        return Value::Null;
    };
    match kind {
        PropertyKind::Term => Value::Term(term.clone()),
        PropertyKind::String => Value::String(lexical(term).to_owned()),
        PropertyKind::Integer => parse_integer(lexical(term)).map_or(Value::Null, Value::Integer),
        PropertyKind::Boolean => Value::Boolean(matches!(lexical(term), "true" | "1")),
        PropertyKind::DateTime => parse_date_time(lexical(term)).map_or(Value::Null, Value::DateTime),
        PropertyKind::BelongsTo | PropertyKind::HasMany => Value::Term(term.clone()),
    }
}

// The literal value, or the identifier itself for named and blank nodes.
fn lexical(term: &Term) -> &str {
    match term {
        Term::Literal(l) => l.value(),
        Term::NamedNode(n) => n.as_str(),
        Term::BlankNode(b) => b.as_str(),
        #[allow(unreachable_patterns)]
        _ => "",
    }
}

/// Integers are written as decimals, so a decimal lexical form is truncated.
pub fn parse_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(i);
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() => Some(f.trunc() as i64),
        _ => None,
    }
}

pub fn parse_date_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Utc));
    }
    // no offset given, read it as UTC
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc())
}
