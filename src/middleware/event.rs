//! Event classification: which semantic event a request belongs to.
//!
//! Log lines carry an [`EventIdentity`] so that every request hitting the same
//! controller action can be found with one filter, whatever its path params.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

/// Controller/action metadata attached to a route.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Endpoint {
    controller: String,
    action: String,
}

impl Endpoint {
    pub fn new(controller: impl Into<String>, action: impl Into<String>) -> Self {
        Self { controller: controller.into(), action: action.into() }
    }

    pub fn controller(&self) -> &str { &self.controller }
    pub fn action(&self) -> &str { &self.action }
}

/// Log-correlation identity of a request.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct EventIdentity {
    pub id: i32,
    pub name: String,
}

impl EventIdentity {
    /// Id given to every key missing from the table.
    pub const UNMAPPED: i32 = -1;

    pub fn new(id: i32, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }

    pub fn is_mapped(&self) -> bool {
        self.id != Self::UNMAPPED
    }
}

impl fmt::Display for EventIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.id)
    }
}

/// Lookup table from `"{controller}_{action}"` to [`EventIdentity`].
///
/// Built once at startup and shared read-only by every request; there is no
/// way to mutate a table once it is handed to a [`RequestLog`](super::RequestLog).
///
/// Deserializes from a JSON object of key → id:
///
/// ```rust
/// use tollgate::middleware::EventTable;
///
/// let table: EventTable = serde_json::from_str(r#"{ "Items_Create": 7 }"#).unwrap();
/// assert_eq!(table.classify("Items", "Create").id, 7);
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(from = "HashMap<String, i32>")]
pub struct EventTable {
    events: HashMap<String, EventIdentity>,
}

impl EventTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry for a controller action. Returns `self` for chaining.
    pub fn with(self, controller: &str, action: &str, id: i32) -> Self {
        self.with_key(Self::key(controller, action), id)
    }

    /// Adds an entry under a raw lookup key.
    pub fn with_key(mut self, key: impl Into<String>, id: i32) -> Self {
        let key = key.into();
        self.events.insert(key.clone(), EventIdentity::new(id, key));
        self
    }

    /// The lookup key for a controller action.
    pub fn key(controller: &str, action: &str) -> String {
        format!("{controller}_{action}")
    }

    /// Resolves the identity for a controller action. Unknown keys get
    /// `{ id: -1, name: key }`.
    pub fn classify(&self, controller: &str, action: &str) -> EventIdentity {
        let key = Self::key(controller, action);
        match self.events.get(&key) {
            Some(identity) => identity.clone(),
            None => EventIdentity::new(EventIdentity::UNMAPPED, key),
        }
    }

    /// Resolves the identity for a route; routes without metadata classify
    /// with empty segments (key `"_"`).
    pub fn resolve(&self, endpoint: Option<&Endpoint>) -> EventIdentity {
        match endpoint {
            Some(e) => self.classify(&e.controller, &e.action),
            None => self.classify("", ""),
        }
    }

    pub fn len(&self) -> usize { self.events.len() }
    pub fn is_empty(&self) -> bool { self.events.is_empty() }
}

impl From<HashMap<String, i32>> for EventTable {
    fn from(map: HashMap<String, i32>) -> Self {
        map.into_iter().collect()
    }
}

impl FromIterator<(String, i32)> for EventTable {
    fn from_iter<I: IntoIterator<Item = (String, i32)>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), |table, (key, id)| table.with_key(key, id))
    }
}
