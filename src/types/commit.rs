use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hash::ObjectId;

/// a commit object pointing to a tree with metadata
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// root tree id
    pub tree: ObjectId,
    /// parent commit ids (empty for initial, 1 for linear, 2+ for merge)
    pub parents: Vec<ObjectId>,
    /// author identity
    pub author: String,
    /// unix timestamp (seconds since epoch)
    pub timestamp: i64,
    /// commit message
    pub message: String,
    /// optional key-value metadata (uses BTreeMap for deterministic serialization)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Commit {
    /// create a new commit stamped with the current time
    pub fn new(
        tree: ObjectId,
        parents: Vec<ObjectId>,
        author: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::with_timestamp(tree, parents, author, now_secs(), message)
    }

    /// create a new commit with explicit timestamp
    pub fn with_timestamp(
        tree: ObjectId,
        parents: Vec<ObjectId>,
        author: impl Into<String>,
        timestamp: i64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tree,
            parents,
            author: author.into(),
            timestamp,
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// add metadata key-value pair
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// first parent, if any
    pub fn parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    /// is this an initial commit (no parents)
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// is this a merge commit (multiple parents)
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// first line of the message
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

pub(crate) fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
