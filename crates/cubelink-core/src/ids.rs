//! Identifier newtypes.
//!
//! [`MessageId`] is the correlation id carried on the wire. It is drawn from a
//! process-wide counter so ids never collide and increase for the lifetime of
//! the process, even under concurrent submission.
//!
//! [`SubscriberId`] and [`InterceptorId`] name local registrations and are
//! UUID v7 (time-ordered) generated via [`uuid::Uuid::now_v7`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of every locally generated message id.
const MESSAGE_ID_PREFIX: &str = "cubelink";

static NEXT_MESSAGE_SEQ: AtomicU64 = AtomicU64::new(1);

/// Correlation id of an envelope.
///
/// Requests get a fresh id from [`MessageId::next`]; responses echo the
/// request's id verbatim. Ids decoded from the wire are kept as-is.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Allocate the next process-unique id.
    #[must_use]
    pub fn next() -> Self {
        let seq = NEXT_MESSAGE_SEQ.fetch_add(1, Ordering::Relaxed);
        Self(format!("{MESSAGE_ID_PREFIX}-{seq}"))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is empty (typical for broadcasts).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sequence number of a locally generated id, if this is one.
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.0
            .strip_prefix(MESSAGE_ID_PREFIX)?
            .strip_prefix('-')?
            .parse()
            .ok()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

macro_rules! registration_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

registration_id! {
    /// Identity of a registered subscriber.
    SubscriberId
}

registration_id! {
    /// Handle for removing a registered interceptor.
    InterceptorId
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn message_ids_increase() {
        let a = MessageId::next();
        let b = MessageId::next();
        assert!(b.sequence().unwrap() > a.sequence().unwrap());
        assert_ne!(a, b);
    }

    #[test]
    fn message_ids_unique_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| (0..500).map(|_| MessageId::next()).collect::<Vec<_>>()))
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate message id");
            }
        }
        assert_eq!(seen.len(), 4000);
    }

    #[test]
    fn foreign_id_has_no_sequence() {
        assert_eq!(MessageId::from("abc").sequence(), None);
        assert_eq!(MessageId::from("cubelink-x").sequence(), None);
        assert_eq!(MessageId::from(String::from("abc")).as_str(), "abc");
        assert!(MessageId::default().is_empty());
    }

    #[test]
    fn message_id_serializes_transparently() {
        let id = MessageId::from("cubelink-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"cubelink-7\"");
    }

    #[test]
    fn subscriber_id_is_uuid_v7() {
        let id = SubscriberId::new();
        let parsed = Uuid::parse_str(id.as_str()).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn registration_ids_are_unique() {
        assert_ne!(SubscriberId::new(), SubscriberId::new());
        assert_ne!(InterceptorId::new(), InterceptorId::new());
    }
}
