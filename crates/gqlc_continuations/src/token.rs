//! Continuation identifiers and tokens.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use uuid::Uuid;

/// Name of the object type standing in for a deferred subtree.
pub const CONTINUATION_TYPE: &str = "Continuation";

/// Opaque identifier of a continuation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationId(String);

impl ContinuationId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContinuationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ContinuationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ContinuationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The value returned in place of a subtree that missed its deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken {
    pub continuation_id: ContinuationId,
}

impl ContinuationToken {
    pub fn new(continuation_id: ContinuationId) -> Self {
        Self { continuation_id }
    }

    /// Wire shape of the token.
    pub fn to_value(&self) -> Value {
        json!({
            "__typename": CONTINUATION_TYPE,
            "continuationId": self.continuation_id.as_str(),
        })
    }

    /// Recognizes a token in materialized response data.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.get("__typename")?.as_str()? != CONTINUATION_TYPE {
            return None;
        }
        let id = obj.get("continuationId")?.as_str()?;
        Some(Self::new(ContinuationId::from(id)))
    }
}
