use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::index::normalize_path;
use crate::object::{read_commit, read_tree};
use crate::ops::resolve_commit;
use crate::repo::Repo;
use crate::types::{PathState, Tree, TreeEntry};

/// list tree entry with full path
#[derive(Debug, Clone)]
pub struct LsTreeEntry {
    pub path: String,
    pub entry: TreeEntry,
}

/// list the entries of a commit's tree, optionally below a directory
pub fn ls_tree(repo: &Repo, rev: &str, path: Option<&str>) -> Result<Vec<LsTreeEntry>> {
    let commit_id = resolve_commit(repo, rev)?;
    let root = read_commit(repo, &commit_id)?.tree;

    match path {
        Some(p) => ls_tree_at_path(repo, &root, p),
        None => Ok(ls_tree_flat(&read_tree(repo, &root)?, "")),
    }
}

/// list every entry of a commit's tree, directories included
pub fn ls_tree_recursive(repo: &Repo, rev: &str) -> Result<Vec<LsTreeEntry>> {
    let commit_id = resolve_commit(repo, rev)?;
    let tree = read_tree(repo, &read_commit(repo, &commit_id)?.tree)?;

    let mut entries = Vec::new();
    ls_tree_recursive_impl(repo, &tree, "", &mut entries)?;
    Ok(entries)
}

/// every file (non-directory entry) below a tree, keyed by full path
pub fn flatten_tree(repo: &Repo, tree_id: &ObjectId) -> Result<BTreeMap<String, PathState>> {
    let mut files = BTreeMap::new();
    let mut stack = vec![(String::new(), *tree_id)];

    while let Some((prefix, id)) = stack.pop() {
        for entry in read_tree(repo, &id)?.into_entries() {
            let path = join(&prefix, &entry.name);
            if entry.is_directory() {
                stack.push((path, entry.id));
            } else {
                files.insert(path, PathState::new(entry.mode, entry.id));
            }
        }
    }

    Ok(files)
}

/// list tree at a specific path
fn ls_tree_at_path(repo: &Repo, root: &ObjectId, path: &str) -> Result<Vec<LsTreeEntry>> {
    let path = normalize_path(path)?;
    let mut current = read_tree(repo, root)?;
    let mut prefix = String::new();
    let components: Vec<&str> = path.split('/').collect();

    for (i, component) in components.iter().enumerate() {
        let entry = current
            .get(component)
            .cloned()
            .ok_or_else(|| Error::PathNotFound(path.clone()))?;
        let full_path = join(&prefix, component);

        if entry.is_directory() {
            current = read_tree(repo, &entry.id)?;
            prefix = full_path;
        } else if i == components.len() - 1 {
            // a file names just itself
            return Ok(vec![LsTreeEntry {
                path: full_path,
                entry,
            }]);
        } else {
            return Err(Error::PathNotFound(path.clone()));
        }
    }

    Ok(ls_tree_flat(&current, &prefix))
}

/// list tree contents flat (non-recursive)
fn ls_tree_flat(tree: &Tree, prefix: &str) -> Vec<LsTreeEntry> {
    tree.entries()
        .iter()
        .map(|entry| LsTreeEntry {
            path: join(prefix, &entry.name),
            entry: entry.clone(),
        })
        .collect()
}

fn ls_tree_recursive_impl(
    repo: &Repo,
    tree: &Tree,
    prefix: &str,
    entries: &mut Vec<LsTreeEntry>,
) -> Result<()> {
    for entry in tree.entries() {
        let path = join(prefix, &entry.name);

        entries.push(LsTreeEntry {
            path: path.clone(),
            entry: entry.clone(),
        });

        if entry.is_directory() {
            let subtree = read_tree(repo, &entry.id)?;
            ls_tree_recursive_impl(repo, &subtree, &path, entries)?;
        }
    }

    Ok(())
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

impl std::fmt::Display for LsTreeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {}    {}",
            self.entry.mode,
            self.entry.kind(),
            self.entry.id.short(),
            self.path
        )
    }
}
