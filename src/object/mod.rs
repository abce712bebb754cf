//! content-addressed object storage
//!
//! every object lives at `objects/<2 hex>/<62 hex>` as the zstd-compressed
//! form of `"<kind> <len>\0" ++ body`. blob bodies are raw bytes; tree,
//! commit and tag bodies are CBOR.

pub mod blob;
pub mod commit;
mod store;
pub mod tag;
pub mod tree;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::repo::Repo;

pub use blob::{read_blob, write_blob};
pub use commit::{read_commit, write_commit};
pub use store::{contains, get, list_objects, object_path, put, read_header, RawObject};
pub use tag::{read_tag, write_tag};
pub use tree::{empty_tree, read_tree, write_tree};

/// the four object kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
            ObjectKind::Tag => "tag",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "blob" => Ok(ObjectKind::Blob),
            "tree" => Ok(ObjectKind::Tree),
            "commit" => Ok(ObjectKind::Commit),
            "tag" => Ok(ObjectKind::Tag),
            other => Err(Error::InvalidObjectType(other.to_string())),
        }
    }
}

/// read an object and insist on its kind
pub(crate) fn get_expecting(repo: &Repo, id: &ObjectId, expected: ObjectKind) -> Result<Vec<u8>> {
    let object = get(repo, id)?;
    if object.kind != expected {
        return Err(Error::UnexpectedKind {
            id: *id,
            expected,
            actual: object.kind,
        });
    }
    Ok(object.content)
}

/// encode a structured body and store it
pub(crate) fn put_cbor<T: Serialize>(repo: &Repo, kind: ObjectKind, value: &T) -> Result<ObjectId> {
    let mut body = Vec::new();
    ciborium::into_writer(value, &mut body)?;
    put(repo, kind, &body)
}

/// follow tag objects until a commit is reached
pub fn peel_to_commit(repo: &Repo, id: &ObjectId) -> Result<ObjectId> {
    let mut current = *id;
    // tags can point at tags; the chain is finite because ids are content hashes
    loop {
        let object = get(repo, &current)?;
        match object.kind {
            ObjectKind::Commit => return Ok(current),
            ObjectKind::Tag => {
                let tag: crate::types::Tag = ciborium::from_reader(&object.content[..])?;
                current = tag.target;
            }
            actual => {
                return Err(Error::UnexpectedKind {
                    id: current,
                    expected: ObjectKind::Commit,
                    actual,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Commit, Tag};
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempdir().unwrap();
        let repo = Repo::init(&dir.path().join("repo")).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_kind_parse_and_display() {
        for kind in [
            ObjectKind::Blob,
            ObjectKind::Tree,
            ObjectKind::Commit,
            ObjectKind::Tag,
        ] {
            assert_eq!(kind.to_string().parse::<ObjectKind>().unwrap(), kind);
        }
        assert!(matches!(
            "widget".parse::<ObjectKind>(),
            Err(Error::InvalidObjectType(_))
        ));
    }

    #[test]
    fn test_get_expecting_wrong_kind() {
        let (_dir, repo) = test_repo();

        let id = write_blob(&repo, b"not a tree").unwrap();
        let result = get_expecting(&repo, &id, ObjectKind::Tree);

        assert!(matches!(
            result,
            Err(Error::UnexpectedKind {
                expected: ObjectKind::Tree,
                actual: ObjectKind::Blob,
                ..
            })
        ));
    }

    #[test]
    fn test_peel_through_tags() {
        let (_dir, repo) = test_repo();

        let tree = write_tree(&repo, &crate::types::Tree::empty()).unwrap();
        let commit = write_commit(&repo, &Commit::with_timestamp(tree, vec![], "a", 1, "c")).unwrap();

        let inner = write_tag(
            &repo,
            &Tag::new(commit, ObjectKind::Commit, "v1", "tagger", "inner"),
        )
        .unwrap();
        let outer = write_tag(
            &repo,
            &Tag::new(inner, ObjectKind::Tag, "v1-alias", "tagger", "outer"),
        )
        .unwrap();

        assert_eq!(peel_to_commit(&repo, &commit).unwrap(), commit);
        assert_eq!(peel_to_commit(&repo, &outer).unwrap(), commit);
    }

    #[test]
    fn test_peel_blob_fails() {
        let (_dir, repo) = test_repo();

        let blob = write_blob(&repo, b"data").unwrap();
        assert!(matches!(
            peel_to_commit(&repo, &blob),
            Err(Error::UnexpectedKind { .. })
        ));
    }
}
