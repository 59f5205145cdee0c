//! Branded ID newtypes for transport workspaces and rooms.
//!
//! Both are plain strings on the wire (`#[serde(transparent)]`); the newtype
//! only keeps a room id from being passed where a workspace id is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing id.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the id and return the inner string.
            pub fn into_inner(self) -> String {
                self.0
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

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(
    /// Transport workspace grouping all rooms of one session.
    WorkspaceId
);

branded_id!(
    /// A single pub/sub room inside a workspace.
    RoomId
);

impl WorkspaceId {
    /// Generate a fresh random workspace id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_workspace_ids_are_distinct() {
        let a = WorkspaceId::generate();
        let b = WorkspaceId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn serializes_as_plain_string() {
        let room = RoomId::new("s1-front");
        let json = serde_json::to_value(&room).unwrap();
        assert_eq!(json, serde_json::json!("s1-front"));

        let back: RoomId = serde_json::from_value(json).unwrap();
        assert_eq!(back, room);
    }

    #[test]
    fn display_matches_inner() {
        let ws = WorkspaceId::from("ws-1");
        assert_eq!(ws.to_string(), "ws-1");
        assert_eq!(ws.into_inner(), "ws-1");
    }
}
