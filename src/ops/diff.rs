use crate::error::Result;
use crate::hash::ObjectId;
use crate::object::read_commit;
use crate::ops::{flatten_tree, resolve_commit};
use crate::repo::Repo;
use crate::types::{ChangeKind, DiffEntry};

/// compare two refs and return list of changes
pub fn diff(repo: &Repo, rev1: &str, rev2: &str) -> Result<Vec<DiffEntry>> {
    let commit1 = resolve_commit(repo, rev1)?;
    let commit2 = resolve_commit(repo, rev2)?;

    let tree1 = read_commit(repo, &commit1)?.tree;
    let tree2 = read_commit(repo, &commit2)?.tree;

    diff_trees(repo, &tree1, &tree2)
}

/// compare two trees file by file, sorted by path
pub fn diff_trees(repo: &Repo, tree1: &ObjectId, tree2: &ObjectId) -> Result<Vec<DiffEntry>> {
    // if trees are identical, no changes
    if tree1 == tree2 {
        return Ok(vec![]);
    }

    let old = flatten_tree(repo, tree1)?;
    let new = flatten_tree(repo, tree2)?;

    let mut all_paths: Vec<&String> = old.keys().chain(new.keys()).collect();
    all_paths.sort();
    all_paths.dedup();

    let mut changes = Vec::new();
    for path in all_paths {
        let kind = match (old.get(path), new.get(path)) {
            (None, Some(_)) => ChangeKind::Added,
            (Some(_), None) => ChangeKind::Deleted,
            (Some(a), Some(b)) if a.id != b.id => ChangeKind::Modified,
            (Some(a), Some(b)) if a.mode != b.mode => ChangeKind::ModeChanged,
            _ => continue,
        };
        changes.push(DiffEntry {
            path: path.clone(),
            kind,
        });
    }

    Ok(changes)
}
