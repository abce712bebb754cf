use crate::error::Result;
use crate::hash::ObjectId;
use crate::object::{get_expecting, put_cbor, ObjectKind};
use crate::repo::Repo;
use crate::types::Commit;

/// write a commit to the object store
///
/// this only stores the object; `ops::commit` is the checked entry point
/// that enforces parent existence and the empty-commit guard.
pub fn write_commit(repo: &Repo, commit: &Commit) -> Result<ObjectId> {
    put_cbor(repo, ObjectKind::Commit, commit)
}

/// read a commit from the object store
pub fn read_commit(repo: &Repo, id: &ObjectId) -> Result<Commit> {
    let body = get_expecting(repo, id, ObjectKind::Commit)?;
    let commit: Commit = ciborium::from_reader(&body[..])?;
    Ok(commit)
}
