use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::index::Index;
use crate::object::{self, read_commit, write_commit, ObjectKind};
use crate::refs::{self, HEAD};
use crate::repo::Repo;
use crate::types::{now_secs, Commit};

/// knobs for creating a commit
#[derive(Clone, Debug, Default)]
pub struct CommitOptions {
    /// defaults to the configured user identity
    pub author: Option<String>,
    /// unix seconds; defaults to now
    pub timestamp: Option<i64>,
    /// skip the nothing-to-commit guard
    pub allow_empty: bool,
    /// extra key/value pairs recorded in the commit
    pub metadata: BTreeMap<String, String>,
}

impl CommitOptions {
    fn author(&self, repo: &Repo) -> String {
        self.author
            .clone()
            .unwrap_or_else(|| repo.config().author())
    }
}

/// write a commit object for `tree` on top of `parents`
///
/// the tree must exist and every parent must be a stored commit. with a
/// single parent whose tree equals `tree`, fails with `EmptyCommit` unless
/// `allow_empty` is set. no refs are touched.
pub fn commit(
    repo: &Repo,
    tree: &ObjectId,
    parents: &[ObjectId],
    message: &str,
    opts: &CommitOptions,
) -> Result<ObjectId> {
    let (kind, _) = object::read_header(repo, tree)?;
    if kind != ObjectKind::Tree {
        return Err(Error::UnexpectedKind {
            id: *tree,
            expected: ObjectKind::Tree,
            actual: kind,
        });
    }

    let mut parent_trees = Vec::with_capacity(parents.len());
    for parent in parents {
        parent_trees.push(read_commit(repo, parent)?.tree);
    }

    if !opts.allow_empty && parent_trees.len() == 1 && parent_trees[0] == *tree {
        return Err(Error::EmptyCommit { tree: *tree });
    }

    let commit = opts.metadata.iter().fold(
        Commit::with_timestamp(
            *tree,
            parents.to_vec(),
            opts.author(repo),
            opts.timestamp.unwrap_or_else(now_secs),
            message,
        ),
        |commit, (key, value)| commit.with_metadata(key, value),
    );
    let id = write_commit(repo, &commit)?;

    tracing::debug!(commit = %id, tree = %tree, parents = parents.len(), "wrote commit");
    Ok(id)
}

/// commit the index on top of the branch HEAD points at
pub fn commit_index(
    repo: &Repo,
    index: &Index,
    message: &str,
    opts: &CommitOptions,
) -> Result<ObjectId> {
    commit_index_to(repo, HEAD, index, message, opts)
}

/// commit the index on top of `ref_name` and advance it
///
/// symbolic refs are followed to the ref that actually moves. an unborn
/// branch gets a root commit. the final compare-and-swap fails with
/// `Conflict` if the branch moved since it was read.
pub fn commit_index_to(
    repo: &Repo,
    ref_name: &str,
    index: &Index,
    message: &str,
    opts: &CommitOptions,
) -> Result<ObjectId> {
    let target = refs::resolve_target_name(repo, ref_name)?;
    let old_tip = refs::resolve_opt(repo, &target)?;

    let tree = index.build_tree(repo)?;
    let parents: Vec<ObjectId> = old_tip.into_iter().collect();
    let id = commit(repo, &tree, &parents, message, opts)?;

    refs::update_ref(repo, &target, old_tip, id)?;

    tracing::info!(
        branch = %target,
        commit = %id,
        summary = message.lines().next().unwrap_or(""),
        "committed"
    );
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{empty_tree, write_blob};
    use crate::refs::{read_ref, update_ref, Reference};
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempdir().unwrap();
        let repo = Repo::init(&dir.path().join("repo")).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_first_commit_is_root_on_unborn_branch() {
        let (_dir, repo) = test_repo();
        let mut index = Index::new();
        index.stage(&repo, "file.txt", b"content").unwrap();

        let id = commit_index(&repo, &index, "first", &CommitOptions::default()).unwrap();

        let commit = read_commit(&repo, &id).unwrap();
        assert!(commit.is_root());
        assert_eq!(commit.message, "first");
        assert_eq!(commit.author, repo.config().author());
        assert_eq!(refs::resolve(&repo, "refs/heads/main").unwrap(), id);
        // HEAD stays symbolic
        assert!(read_ref(&repo, HEAD).unwrap().is_symbolic());
    }

    #[test]
    fn test_second_commit_links_parent() {
        let (_dir, repo) = test_repo();
        let mut index = Index::new();

        index.stage(&repo, "file.txt", b"v1").unwrap();
        let first = commit_index(&repo, &index, "one", &CommitOptions::default()).unwrap();

        index.stage(&repo, "file.txt", b"v2").unwrap();
        let second = commit_index(&repo, &index, "two", &CommitOptions::default()).unwrap();

        assert_eq!(read_commit(&repo, &second).unwrap().parents, vec![first]);
        assert_eq!(refs::resolve(&repo, HEAD).unwrap(), second);
    }

    #[test]
    fn test_empty_commit_guard() {
        let (_dir, repo) = test_repo();
        let mut index = Index::new();
        index.stage(&repo, "file.txt", b"v1").unwrap();
        let first = commit_index(&repo, &index, "one", &CommitOptions::default()).unwrap();

        let result = commit_index(&repo, &index, "again", &CommitOptions::default());
        assert!(matches!(result, Err(Error::EmptyCommit { .. })));
        assert_eq!(refs::resolve(&repo, HEAD).unwrap(), first);

        let opts = CommitOptions {
            allow_empty: true,
            ..Default::default()
        };
        let forced = commit_index(&repo, &index, "again", &opts).unwrap();
        assert_ne!(forced, first);
        assert_eq!(refs::resolve(&repo, HEAD).unwrap(), forced);
    }

    #[test]
    fn test_root_commit_of_empty_tree_allowed() {
        let (_dir, repo) = test_repo();
        let tree = empty_tree(&repo).unwrap();

        assert!(commit(&repo, &tree, &[], "root", &CommitOptions::default()).is_ok());
    }

    #[test]
    fn test_missing_parent_rejected() {
        let (_dir, repo) = test_repo();
        let tree = empty_tree(&repo).unwrap();

        let result = commit(&repo, &tree, &[ObjectId::ZERO], "orphan", &CommitOptions::default());
        assert!(matches!(result, Err(Error::ObjectNotFound(_))));
    }

    #[test]
    fn test_non_commit_parent_rejected() {
        let (_dir, repo) = test_repo();
        let tree = empty_tree(&repo).unwrap();
        let blob = write_blob(&repo, b"not a commit").unwrap();

        let result = commit(&repo, &tree, &[blob], "bad", &CommitOptions::default());
        assert!(matches!(result, Err(Error::UnexpectedKind { .. })));
    }

    #[test]
    fn test_tree_must_be_a_tree() {
        let (_dir, repo) = test_repo();
        let blob = write_blob(&repo, b"x").unwrap();

        let result = commit(&repo, &blob, &[], "bad", &CommitOptions::default());
        assert!(matches!(
            result,
            Err(Error::UnexpectedKind {
                expected: ObjectKind::Tree,
                ..
            })
        ));
        assert!(matches!(
            commit(&repo, &ObjectId::ZERO, &[], "bad", &CommitOptions::default()),
            Err(Error::ObjectNotFound(_))
        ));
    }

    #[test]
    fn test_explicit_author_and_timestamp() {
        let (_dir, repo) = test_repo();
        let tree = empty_tree(&repo).unwrap();
        let opts = CommitOptions {
            author: Some("Ada <ada@example.com>".to_string()),
            timestamp: Some(42),
            ..Default::default()
        };

        let id = commit(&repo, &tree, &[], "msg", &opts).unwrap();
        let commit = read_commit(&repo, &id).unwrap();
        assert_eq!(commit.author, "Ada <ada@example.com>");
        assert_eq!(commit.timestamp, 42);
    }

    #[test]
    fn test_metadata_is_recorded_and_hashed() {
        let (_dir, repo) = test_repo();
        let tree = empty_tree(&repo).unwrap();
        let plain = CommitOptions {
            timestamp: Some(7),
            ..Default::default()
        };
        let mut tagged = plain.clone();
        tagged
            .metadata
            .insert("change-id".to_string(), "I1234".to_string());

        let without = commit(&repo, &tree, &[], "msg", &plain).unwrap();
        let with = commit(&repo, &tree, &[], "msg", &tagged).unwrap();

        assert_ne!(without, with);
        assert!(read_commit(&repo, &without).unwrap().metadata.is_empty());
        assert_eq!(
            read_commit(&repo, &with).unwrap().metadata.get("change-id"),
            Some(&"I1234".to_string())
        );
    }

    #[test]
    fn test_commit_index_loses_race() {
        let (_dir, repo) = test_repo();
        let mut index = Index::new();
        index.stage(&repo, "a", b"a").unwrap();
        let first = commit_index(&repo, &index, "one", &CommitOptions::default()).unwrap();

        // someone else moves the branch between our read and our update
        let tree = empty_tree(&repo).unwrap();
        let theirs = commit(&repo, &tree, &[first], "theirs", &CommitOptions::default()).unwrap();
        update_ref(&repo, "refs/heads/main", Some(first), theirs).unwrap();

        index.stage(&repo, "b", b"b").unwrap();
        let opts = CommitOptions::default();
        let tree = index.build_tree(&repo).unwrap();
        let ours = commit(&repo, &tree, &[first], "ours", &opts).unwrap();
        let result = update_ref(&repo, "refs/heads/main", Some(first), ours);

        match result {
            Err(Error::Conflict { actual, .. }) => {
                assert_eq!(actual, Some(Reference::Direct(theirs)));
            }
            other => panic!("expected conflict, got {:?}", other),
        }

        // retrying on top of the new tip works
        let retried = commit_index(&repo, &index, "ours", &opts).unwrap();
        assert_eq!(read_commit(&repo, &retried).unwrap().parents, vec![theirs]);
    }

    #[test]
    fn test_commit_index_to_other_branch() {
        let (_dir, repo) = test_repo();
        let mut index = Index::new();
        index.stage(&repo, "a", b"a").unwrap();

        let id = commit_index_to(
            &repo,
            "refs/heads/topic",
            &index,
            "topic",
            &CommitOptions::default(),
        )
        .unwrap();

        assert_eq!(refs::resolve(&repo, "refs/heads/topic").unwrap(), id);
        assert!(refs::resolve_opt(&repo, HEAD).unwrap().is_none());
    }
}
