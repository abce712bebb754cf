use serde::{Deserialize, Serialize};

use crate::hash::ObjectId;
use crate::object::ObjectKind;

/// an annotated tag pointing at another object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub target: ObjectId,
    pub target_kind: ObjectKind,
    pub name: String,
    pub tagger: String,
    pub timestamp: i64,
    pub message: String,
}

impl Tag {
    pub fn new(
        target: ObjectId,
        target_kind: ObjectKind,
        name: impl Into<String>,
        tagger: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            target,
            target_kind,
            name: name.into(),
            tagger: tagger.into(),
            timestamp: super::commit::now_secs(),
            message: message.into(),
        }
    }
}
