use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::object::{get_expecting, put_cbor, ObjectKind};
use crate::repo::Repo;
use crate::types::Tree;

/// write a tree to the object store
pub fn write_tree(repo: &Repo, tree: &Tree) -> Result<ObjectId> {
    put_cbor(repo, ObjectKind::Tree, tree)
}

/// read a tree from the object store
///
/// a stored tree with unsorted, duplicate or unsafe names is reported as
/// `CorruptObjectMessage`.
pub fn read_tree(repo: &Repo, id: &ObjectId) -> Result<Tree> {
    let body = get_expecting(repo, id, ObjectKind::Tree)?;
    decode_tree(id, &body)
}

pub(crate) fn decode_tree(id: &ObjectId, body: &[u8]) -> Result<Tree> {
    let tree: Tree = ciborium::from_reader(body)?;
    tree.validate()
        .map_err(|e| Error::CorruptObjectMessage(format!("tree {}: {}", id, e)))?;
    Ok(tree)
}

/// write (or find) the empty tree
pub fn empty_tree(repo: &Repo) -> Result<ObjectId> {
    write_tree(repo, &Tree::empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{put, write_blob};
    use crate::types::{EntryMode, TreeEntry};
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempdir().unwrap();
        let repo = Repo::init(&dir.path().join("repo")).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_write_and_read_tree() {
        let (_dir, repo) = test_repo();

        let blob = write_blob(&repo, b"content").unwrap();
        let sub = empty_tree(&repo).unwrap();
        let tree = Tree::new(vec![
            TreeEntry::new("file.txt", EntryMode::Regular, blob),
            TreeEntry::new("run.sh", EntryMode::Executable, blob),
            TreeEntry::new("subdir", EntryMode::Directory, sub),
        ])
        .unwrap();

        let id = write_tree(&repo, &tree).unwrap();
        assert_eq!(read_tree(&repo, &id).unwrap(), tree);
    }

    #[test]
    fn test_tree_deduplication() {
        let (_dir, repo) = test_repo();

        let tree = Tree::new(vec![TreeEntry::new(
            "foo",
            EntryMode::Regular,
            ObjectId::ZERO,
        )])
        .unwrap();

        let h1 = write_tree(&repo, &tree).unwrap();
        let h2 = write_tree(&repo, &tree).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_empty_tree() {
        let (_dir, repo) = test_repo();

        let id = empty_tree(&repo).unwrap();
        assert!(read_tree(&repo, &id).unwrap().is_empty());
        assert_eq!(empty_tree(&repo).unwrap(), id);
    }

    #[test]
    fn test_read_rejects_unsafe_stored_tree() {
        let (_dir, repo) = test_repo();
        let blob = write_blob(&repo, b"x").unwrap();

        // same CBOR shape as a Tree, written around the validating constructor
        #[derive(serde::Serialize)]
        struct Loose {
            entries: Vec<TreeEntry>,
        }
        let store = |entries: Vec<TreeEntry>| {
            let mut body = Vec::new();
            ciborium::into_writer(&Loose { entries }, &mut body).unwrap();
            put(&repo, ObjectKind::Tree, &body).unwrap()
        };

        let escaping = store(vec![TreeEntry::new("..", EntryMode::Regular, blob)]);
        let nested = store(vec![TreeEntry::new("a/b", EntryMode::Regular, blob)]);
        let unsorted = store(vec![
            TreeEntry::new("b", EntryMode::Regular, blob),
            TreeEntry::new("a", EntryMode::Regular, blob),
        ]);
        let duplicate = store(vec![
            TreeEntry::new("a", EntryMode::Regular, blob),
            TreeEntry::new("a", EntryMode::Executable, blob),
        ]);

        for id in [escaping, nested, unsorted, duplicate] {
            assert!(matches!(
                read_tree(&repo, &id),
                Err(Error::CorruptObjectMessage(_))
            ));
        }
    }

    #[test]
    fn test_read_blob_as_tree() {
        let (_dir, repo) = test_repo();

        let blob = write_blob(&repo, b"x").unwrap();
        assert!(matches!(
            read_tree(&repo, &blob),
            Err(Error::UnexpectedKind { .. })
        ));
    }
}
