use crate::client::RedditClientError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod comment;
pub mod post;

pub use comment::CommentData;
pub use post::PostData;

/// Wire tag of a paginated collection.
pub const LISTING_MARKER: &str = "Listing";

/// Kinds of thing the API returns. Tags outside the table below parse as
/// [`Kind::Unknown`] and keep their raw tag on the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Comment,
    Account,
    Link,
    Message,
    Subreddit,
    Award,
    More,
    Listing,
    Unknown,
}

const KIND_TABLE: &[(&str, Kind)] = &[
    ("t1", Kind::Comment),
    ("t2", Kind::Account),
    ("t3", Kind::Link),
    ("t4", Kind::Message),
    ("t5", Kind::Subreddit),
    ("t6", Kind::Award),
    ("more", Kind::More),
    (LISTING_MARKER, Kind::Listing),
];

impl Kind {
    pub fn from_tag(tag: &str) -> Kind {
        KIND_TABLE
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, kind)| *kind)
            .unwrap_or(Kind::Unknown)
    }

    /// The wire tag, or `None` for [`Kind::Unknown`].
    pub fn tag(self) -> Option<&'static str> {
        KIND_TABLE
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(t, _)| *t)
    }
}

/// One remote item.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub kind: Kind,
    /// Raw wire tag, e.g. `t1`.
    pub tag: String,
    pub id: String,
    /// Globally unique `tag_id` key, e.g. `t1_abc123`.
    pub full_id: String,
    /// Full id of the parent thing. A lookup key, never an owning link.
    pub parent_id: Option<String>,
    /// The thing's `data` object without its `replies` field.
    pub payload: Value,
    /// Things parsed out of a nested `replies` listing.
    pub replies: Vec<Thing>,
}

impl Entry {
    fn from_data(tag: &str, kind: Kind, data: Value) -> Result<Self, RedditClientError> {
        let mut data = into_object(tag, data)?;

        let id = string_field(&data, "id")
            .ok_or_else(|| RedditClientError::format(format!("{} with an id", tag), "no id"))?;
        let full_id = string_field(&data, "name").unwrap_or_else(|| format!("{}_{}", tag, id));
        let parent_id = string_field(&data, "parent_id");

        let replies = match data.remove("replies") {
            Some(listing @ Value::Object(_)) => Page::from_value(listing)?.things,
            _ => Vec::new(),
        };

        Ok(Self {
            kind,
            tag: tag.to_string(),
            id,
            full_id,
            parent_id,
            payload: Value::Object(data),
            replies,
        })
    }

    /// Full id of the post this entry belongs to, when the API reports one.
    pub fn link_id(&self) -> Option<&str> {
        self.payload["link_id"].as_str()
    }

    /// Decode the payload into a typed view.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, RedditClientError> {
        Ok(T::deserialize(&self.payload)?)
    }
}

/// Placeholder for children the server left out of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct Continuation {
    pub id: String,
    pub full_id: String,
    pub parent_id: Option<String>,
    /// Omitted child ids, in server order. Empty for a
    /// "continue this thread" marker.
    pub children: Vec<String>,
    pub count: i64,
}

#[derive(Deserialize)]
struct RawContinuation {
    #[serde(default)]
    id: String,
    name: Option<String>,
    parent_id: Option<String>,
    #[serde(default)]
    children: Vec<String>,
    #[serde(default)]
    count: i64,
}

impl Continuation {
    fn from_data(data: Value) -> Result<Self, RedditClientError> {
        let raw: RawContinuation = serde_json::from_value(data)?;
        let full_id = raw.name.unwrap_or_else(|| format!("more_{}", raw.id));
        Ok(Self {
            id: raw.id,
            full_id,
            parent_id: raw.parent_id,
            children: raw.children,
            count: raw.count,
        })
    }

    /// A marker whose subtree has to be fetched through the parent's
    /// permalink rather than by child ids.
    pub fn is_continue_thread(&self) -> bool {
        self.children.is_empty()
    }
}

/// A parsed child of a listing.
#[derive(Debug, Clone, PartialEq)]
pub enum Thing {
    Entry(Entry),
    Continuation(Continuation),
}

#[derive(Deserialize)]
struct RawThing {
    kind: String,
    #[serde(default)]
    data: Value,
}

impl Thing {
    pub fn from_value(value: Value) -> Result<Self, RedditClientError> {
        let raw: RawThing = serde_json::from_value(value)?;
        match Kind::from_tag(&raw.kind) {
            Kind::More => Ok(Thing::Continuation(Continuation::from_data(raw.data)?)),
            Kind::Listing => Err(RedditClientError::format("thing", LISTING_MARKER)),
            kind => Ok(Thing::Entry(Entry::from_data(&raw.kind, kind, raw.data)?)),
        }
    }

    pub fn full_id(&self) -> &str {
        match self {
            Thing::Entry(entry) => &entry.full_id,
            Thing::Continuation(more) => &more.full_id,
        }
    }

    pub fn parent_id(&self) -> Option<&str> {
        match self {
            Thing::Entry(entry) => entry.parent_id.as_deref(),
            Thing::Continuation(more) => more.parent_id.as_deref(),
        }
    }

    pub fn as_entry(&self) -> Option<&Entry> {
        match self {
            Thing::Entry(entry) => Some(entry),
            Thing::Continuation(_) => None,
        }
    }
}

/// One fetched page of a listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub things: Vec<Thing>,
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Deserialize)]
struct RawEnvelope {
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize, Default)]
struct RawListingData {
    after: Option<String>,
    before: Option<String>,
    #[serde(default)]
    children: Vec<Value>,
}

impl Page {
    /// Parse a listing object. Anything not tagged `Listing` is a
    /// [`RedditClientError::FormatError`].
    pub fn from_value(value: Value) -> Result<Self, RedditClientError> {
        let envelope: RawEnvelope = serde_json::from_value(value)
            .map_err(|_| RedditClientError::format(LISTING_MARKER, "untagged JSON"))?;

        if envelope.kind != LISTING_MARKER {
            return Err(RedditClientError::format(LISTING_MARKER, envelope.kind));
        }

        let data: RawListingData = if envelope.data.is_null() {
            RawListingData::default()
        } else {
            serde_json::from_value(envelope.data)?
        };

        let things = data
            .children
            .into_iter()
            .map(Thing::from_value)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            things,
            after: data.after.filter(|s| !s.is_empty()),
            before: data.before.filter(|s| !s.is_empty()),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.things.is_empty()
    }
}

/// Flatten nested reply listings into a pre-order sequence. Entries in the
/// result have their `replies` moved out.
pub fn flatten(things: Vec<Thing>) -> Vec<Thing> {
    let mut out = Vec::with_capacity(things.len());
    // Reversed so popping yields the original order.
    let mut stack: Vec<Thing> = things.into_iter().rev().collect();

    while let Some(thing) = stack.pop() {
        match thing {
            Thing::Entry(mut entry) => {
                let replies = std::mem::take(&mut entry.replies);
                out.push(Thing::Entry(entry));
                stack.extend(replies.into_iter().rev());
            }
            more @ Thing::Continuation(_) => out.push(more),
        }
    }

    out
}

/// Form body of `POST /api/comment`.
#[derive(Serialize, Debug, Clone)]
pub struct CommentForm {
    pub api_type: String,
    /// Full id of the post or comment being replied to.
    #[serde(rename = "thing_id")]
    pub parent: String,
    #[serde(rename = "text")]
    pub body: String,
}

impl CommentForm {
    pub fn new(parent: &str, body: &str) -> Self {
        Self {
            api_type: "json".to_string(),
            parent: parent.to_string(),
            body: body.to_string(),
        }
    }
}

fn into_object(tag: &str, data: Value) -> Result<Map<String, Value>, RedditClientError> {
    match data {
        Value::Object(map) => Ok(map),
        _ => Err(RedditClientError::format(
            format!("{} data object", tag),
            "non-object data",
        )),
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}
