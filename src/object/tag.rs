use crate::error::Result;
use crate::hash::ObjectId;
use crate::object::{get_expecting, put_cbor, ObjectKind};
use crate::repo::Repo;
use crate::types::Tag;

/// write an annotated tag object
pub fn write_tag(repo: &Repo, tag: &Tag) -> Result<ObjectId> {
    put_cbor(repo, ObjectKind::Tag, tag)
}

/// read an annotated tag object
pub fn read_tag(repo: &Repo, id: &ObjectId) -> Result<Tag> {
    let body = get_expecting(repo, id, ObjectKind::Tag)?;
    let tag: Tag = ciborium::from_reader(&body[..])?;
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_and_read_tag() {
        let dir = tempdir().unwrap();
        let repo = Repo::init(&dir.path().join("repo")).unwrap();

        let tag = Tag::new(ObjectId::ZERO, ObjectKind::Commit, "v1.0", "tagger", "release");
        let id = write_tag(&repo, &tag).unwrap();

        assert_eq!(read_tag(&repo, &id).unwrap(), tag);
    }
}
