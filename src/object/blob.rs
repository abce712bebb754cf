use crate::error::Result;
use crate::hash::ObjectId;
use crate::object::{get_expecting, put, ObjectKind};
use crate::repo::Repo;

/// write a blob to the object store
pub fn write_blob(repo: &Repo, content: &[u8]) -> Result<ObjectId> {
    put(repo, ObjectKind::Blob, content)
}

/// read blob content
pub fn read_blob(repo: &Repo, id: &ObjectId) -> Result<Vec<u8>> {
    get_expecting(repo, id, ObjectKind::Blob)
}
