//! The message envelope exchanged with the server.
//!
//! Wire shape (one JSON object per text frame):
//!
//! ```json
//! { "name": "query_tracks", "type": "request", "id": "cubelink-12", "options": { "limit": 50 } }
//! ```
//!
//! Envelopes are immutable once built. The local `timestamp` records when the
//! envelope was built or decoded and never goes on the wire.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::EnvelopeError;
use crate::ids::MessageId;

/// Discriminator between the three envelope kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Sent by the client, answered by exactly one response.
    Request,
    /// Answer to a request, echoing its id.
    Response,
    /// Unsolicited server push.
    Broadcast,
}

/// A request, response, or broadcast.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    name: String,
    #[serde(rename = "type")]
    kind: MessageKind,
    #[serde(default)]
    id: MessageId,
    #[serde(default)]
    options: Map<String, Value>,
    #[serde(skip, default = "Utc::now")]
    timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Start building a request with a fresh correlation id.
    pub fn request(name: impl Into<String>) -> EnvelopeBuilder {
        EnvelopeBuilder::new(MessageKind::Request, name.into(), MessageId::next())
    }

    /// Start building the response to `request`, echoing its id and name.
    pub fn response_to(request: &Envelope) -> EnvelopeBuilder {
        EnvelopeBuilder::new(MessageKind::Response, request.name.clone(), request.id.clone())
    }

    /// Start building a broadcast.
    pub fn broadcast(name: impl Into<String>) -> EnvelopeBuilder {
        EnvelopeBuilder::new(MessageKind::Broadcast, name.into(), MessageId::default())
    }

    /// Decode an envelope from a text frame.
    pub fn decode(text: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode the envelope as a text frame.
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Correlation id.
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// Envelope kind.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Message name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the name matches `name`, ignoring ASCII case.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// When this envelope was built or decoded.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// All options.
    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    /// Raw option value.
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// String option.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.option(key).and_then(Value::as_str)
    }

    /// Signed integer option.
    pub fn option_i64(&self, key: &str) -> Option<i64> {
        self.option(key).and_then(Value::as_i64)
    }

    /// Unsigned integer option.
    pub fn option_u64(&self, key: &str) -> Option<u64> {
        self.option(key).and_then(Value::as_u64)
    }

    /// Floating point option (integers are widened).
    pub fn option_f64(&self, key: &str) -> Option<f64> {
        self.option(key).and_then(Value::as_f64)
    }

    /// Boolean option.
    pub fn option_bool(&self, key: &str) -> Option<bool> {
        self.option(key).and_then(Value::as_bool)
    }

    /// List option.
    pub fn option_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.option(key).and_then(Value::as_array)
    }

    /// Nested object option.
    pub fn option_object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.option(key).and_then(Value::as_object)
    }

    /// Deserialize an option into `T`.
    ///
    /// Returns `Ok(None)` when the key is absent.
    pub fn option_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, EnvelopeError> {
        match self.option(key) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|source| EnvelopeError::Option {
                    key: key.to_owned(),
                    source,
                }),
            None => Ok(None),
        }
    }
}

/// Builder for [`Envelope`].
#[derive(Debug)]
#[must_use]
pub struct EnvelopeBuilder {
    name: String,
    kind: MessageKind,
    id: MessageId,
    options: Map<String, Value>,
}

impl EnvelopeBuilder {
    fn new(kind: MessageKind, name: String, id: MessageId) -> Self {
        Self {
            name,
            kind,
            id,
            options: Map::new(),
        }
    }

    /// Override the correlation id.
    pub fn id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = id.into();
        self
    }

    /// Add or replace one option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.options.insert(key.into(), value.into());
        self
    }

    /// Merge a whole option map, replacing existing keys.
    pub fn options(mut self, options: Map<String, Value>) -> Self {
        self.options.extend(options);
        self
    }

    /// Finish the envelope.
    pub fn build(self) -> Envelope {
        Envelope {
            name: self.name,
            kind: self.kind,
            id: self.id,
            options: self.options,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn request_gets_fresh_id() {
        let a = Envelope::request("ping").build();
        let b = Envelope::request("ping").build();
        assert_eq!(a.kind(), MessageKind::Request);
        assert!(a.id().sequence().is_some());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn response_echoes_request() {
        let request = Envelope::request("query_albums").option("filter", "abc").build();
        let response = Envelope::response_to(&request).option("data", json!([])).build();
        assert_eq!(response.id(), request.id());
        assert_eq!(response.name(), "query_albums");
        assert_eq!(response.kind(), MessageKind::Response);
        assert!(response.option("filter").is_none());
    }

    #[test]
    fn broadcast_has_empty_id() {
        let b = Envelope::broadcast("play_queue_changed").build();
        assert!(b.id().is_empty());
        assert_eq!(b.kind(), MessageKind::Broadcast);
    }

    #[test]
    fn wire_shape() {
        let env = Envelope::request("authenticate")
            .id("cubelink-1")
            .option("password", "secret")
            .build();
        let value: Value = serde_json::from_str(&env.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "authenticate",
                "type": "request",
                "id": "cubelink-1",
                "options": { "password": "secret" }
            })
        );
    }

    #[test]
    fn option_types_survive_the_wire() {
        let env = Envelope::request("mixed")
            .option("s", "text")
            .option("i", -42)
            .option("u", 7_u64)
            .option("b", true)
            .option("list", json!([1, "two", false]))
            .option("nested", json!({ "inner": { "deep": 1.5 } }))
            .build();
        let decoded = Envelope::decode(&env.encode().unwrap()).unwrap();

        assert_eq!(decoded.id(), env.id());
        assert_eq!(decoded.option_str("s"), Some("text"));
        assert_eq!(decoded.option_i64("i"), Some(-42));
        assert_eq!(decoded.option_u64("u"), Some(7));
        assert_eq!(decoded.option_bool("b"), Some(true));
        assert_eq!(decoded.option_array("list").unwrap().len(), 3);
        assert_eq!(
            decoded.option_object("nested").unwrap()["inner"]["deep"],
            json!(1.5)
        );
    }

    #[test]
    fn accessors_reject_wrong_types() {
        let env = Envelope::request("x").option("n", 5).build();
        assert_eq!(env.option_str("n"), None);
        assert_eq!(env.option_bool("n"), None);
        assert_eq!(env.option_f64("n"), Some(5.0));
        assert_eq!(env.option_i64("missing"), None);
    }

    #[test]
    fn option_as_deserializes() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Range {
            offset: u32,
            limit: u32,
        }

        let env = Envelope::request("x")
            .option("range", json!({ "offset": 10, "limit": 20 }))
            .option("bad", "nope")
            .build();
        assert_eq!(
            env.option_as::<Range>("range").unwrap(),
            Some(Range { offset: 10, limit: 20 })
        );
        assert_eq!(env.option_as::<Range>("missing").unwrap(), None);
        assert_matches!(
            env.option_as::<Range>("bad"),
            Err(EnvelopeError::Option { key, .. }) if key == "bad"
        );
    }

    #[test]
    fn decode_tolerates_missing_id_and_options() {
        let env = Envelope::decode(r#"{"name":"play_queue_changed","type":"broadcast"}"#).unwrap();
        assert!(env.id().is_empty());
        assert!(env.options().is_empty());
        assert_eq!(env.kind(), MessageKind::Broadcast);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert_matches!(Envelope::decode("not json"), Err(EnvelopeError::Json(_)));
        assert_matches!(
            Envelope::decode(r#"{"name":"x","type":"sideways"}"#),
            Err(EnvelopeError::Json(_))
        );
    }

    #[test]
    fn name_match_ignores_case() {
        let env = Envelope::request("Authenticate").build();
        assert!(env.is_named("authenticate"));
        assert!(!env.is_named("ping"));
    }

    #[test]
    fn options_merge_replaces_keys() {
        let mut extra = Map::new();
        let _ = extra.insert("a".into(), json!(2));
        let env = Envelope::request("x").option("a", 1).options(extra).build();
        assert_eq!(env.option_i64("a"), Some(2));
    }
}
