use std::path::PathBuf;

use crate::hash::ObjectId;
use crate::object::ObjectKind;
use crate::refs::Reference;

/// error type for cairn operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("repository not found at {0}")]
    NoRepo(PathBuf),

    #[error("repository already exists at {0}")]
    RepoExists(PathBuf),

    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("corrupt object: hash mismatch for {0}")]
    CorruptObject(ObjectId),

    #[error("corrupt object: {0}")]
    CorruptObjectMessage(String),

    #[error("object {id} is a {actual}, expected a {expected}")]
    UnexpectedKind {
        id: ObjectId,
        expected: ObjectKind,
        actual: ObjectKind,
    },

    #[error("invalid object type: {0}")]
    InvalidObjectType(String),

    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("invalid ref name: {0}")]
    InvalidRef(String),

    #[error("symbolic ref chain starting at {name} exceeds {hops} hops")]
    ReferenceCycle { name: String, hops: usize },

    #[error("ref {name} changed concurrently: expected {}, found {}", display_expected(.expected), display_actual(.actual))]
    Conflict {
        name: String,
        expected: Option<ObjectId>,
        actual: Option<Reference>,
    },

    #[error("nothing to commit: tree {tree} matches parent")]
    EmptyCommit { tree: ObjectId },

    #[error("merge has conflicts in {} path(s): {}", .paths.len(), .paths.join(", "))]
    MergeConflict { paths: Vec<String> },

    #[error("merge aborted: {0}")]
    MergeAborted(#[source] Box<Error>),

    #[error("refusing to merge unrelated histories {ours} and {theirs}")]
    UnrelatedHistories { ours: ObjectId, theirs: ObjectId },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("invalid tree entry name: {0}")]
    InvalidEntryName(String),

    #[error("duplicate tree entry name: {0}")]
    DuplicateEntryName(String),

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("lock contention on {0}")]
    LockContention(PathBuf),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cbor serialization error: {0}")]
    CborEncode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("cbor deserialization error: {0}")]
    CborDecode(#[from] ciborium::de::Error<std::io::Error>),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("invalid hash hex: {0}")]
    InvalidHashHex(String),
}

impl Error {
    /// true for errors a caller is expected to handle by re-reading and retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict { .. } | Error::LockContention(_))
    }
}

fn display_expected(expected: &Option<ObjectId>) -> String {
    match expected {
        Some(id) => id.to_hex(),
        None => "no ref".to_string(),
    }
}

fn display_actual(actual: &Option<Reference>) -> String {
    match actual {
        Some(reference) => reference.to_string(),
        None => "no ref".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}
